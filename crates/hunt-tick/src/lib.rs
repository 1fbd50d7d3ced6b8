//! Per-room phase countdown.
//!
//! A [`Countdown`] is the one timer a room owns. It counts whole seconds
//! down from the armed duration and, on reaching zero, hands back the
//! action it was armed with. Arming always replaces whatever was running,
//! so a room never has two live timers.
//!
//! The countdown never spawns anything. It sits inside the room actor's
//! `tokio::select!` loop next to the command channel:
//!
//! ```ignore
//! loop {
//!     let deadline = room.timer.deadline();
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         () = hunt_tick::sleep_until(deadline) => {
//!             if let Some(tick) = room.timer.advance() { /* announce, maybe fire */ }
//!         }
//!     }
//! }
//! ```
//!
//! With nothing armed the deadline is `None` and [`sleep_until`] pends
//! forever, so the select only wakes for commands.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::trace;

/// Length of one countdown step.
pub const STEP: Duration = Duration::from_secs(1);

struct Armed<A> {
    remaining: u32,
    next: Instant,
    announce: bool,
    action: A,
}

/// One step of a running countdown, returned by [`Countdown::advance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick<A> {
    /// Seconds left after this step.
    pub remaining: u32,
    /// Whether clients should be told about this step.
    pub announce: bool,
    /// The armed action, present only on the step that reached zero.
    pub expired: Option<A>,
}

/// A cancellable one-second countdown carrying a completion action `A`.
pub struct Countdown<A> {
    armed: Option<Armed<A>>,
}

impl<A> Default for Countdown<A> {
    fn default() -> Self {
        Self { armed: None }
    }
}

impl<A> Countdown<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts counting down from `secs`, replacing any running countdown.
    /// Every step is announced.
    pub fn arm(&mut self, secs: u32, action: A) {
        self.start(secs, action, true);
    }

    /// Like [`arm`](Self::arm), but steps are not announced to clients.
    pub fn arm_quiet(&mut self, secs: u32, action: A) {
        self.start(secs, action, false);
    }

    fn start(&mut self, secs: u32, action: A, announce: bool) {
        self.cancel();
        trace!(secs, announce, "countdown armed");
        self.armed = Some(Armed {
            remaining: secs,
            next: Instant::now() + STEP,
            announce,
            action,
        });
    }

    /// Stops the countdown without firing its action. Returns `true` if
    /// something was running. Safe to call when idle.
    pub fn cancel(&mut self) -> bool {
        self.armed.take().is_some()
    }

    pub fn is_active(&self) -> bool {
        self.armed.is_some()
    }

    /// Seconds left, or `None` when idle.
    pub fn remaining(&self) -> Option<u32> {
        self.armed.as_ref().map(|a| a.remaining)
    }

    /// The action the running countdown will fire.
    pub fn action(&self) -> Option<&A> {
        self.armed.as_ref().map(|a| &a.action)
    }

    /// `true` if the running countdown announces its steps.
    pub fn is_announced(&self) -> bool {
        self.armed.as_ref().is_some_and(|a| a.announce)
    }

    /// When the next step is due, or `None` when idle.
    pub fn deadline(&self) -> Option<Instant> {
        self.armed.as_ref().map(|a| a.next)
    }

    /// Takes one step. Returns `None` when idle.
    ///
    /// The step that reaches zero disarms the countdown and carries the
    /// action in [`Tick::expired`].
    pub fn advance(&mut self) -> Option<Tick<A>> {
        let armed = self.armed.as_mut()?;
        armed.remaining = armed.remaining.saturating_sub(1);
        armed.next += STEP;
        let (remaining, announce) = (armed.remaining, armed.announce);

        let expired = if remaining == 0 {
            self.armed.take().map(|a| a.action)
        } else {
            None
        };
        Some(Tick {
            remaining,
            announce,
            expired,
        })
    }
}

/// Sleeps until `deadline`, or forever when there is none.
pub async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_new_countdown_is_idle() {
        let mut countdown = Countdown::<&str>::new();
        assert!(!countdown.is_active());
        assert_eq!(countdown.remaining(), None);
        assert_eq!(countdown.deadline(), None);
        assert_eq!(countdown.advance(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_advance_counts_down_then_expires() {
        let mut countdown = Countdown::new();
        countdown.arm(2, "night");

        let first = countdown.advance().unwrap();
        assert_eq!(first.remaining, 1);
        assert_eq!(first.expired, None);
        assert!(countdown.is_active());

        let second = countdown.advance().unwrap();
        assert_eq!(second.remaining, 0);
        assert_eq!(second.expired, Some("night"));
        assert!(!countdown.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let mut countdown = Countdown::new();
        countdown.arm(5, ());
        assert!(countdown.cancel());
        assert!(!countdown.cancel());
        assert!(!countdown.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_countdown_does_not_announce() {
        let mut countdown = Countdown::new();
        countdown.arm_quiet(2, 1u8);
        assert!(!countdown.is_announced());
        assert!(!countdown.advance().unwrap().announce);
    }
}
