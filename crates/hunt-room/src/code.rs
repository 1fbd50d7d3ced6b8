//! Room code generation.

use hunt_protocol::RoomCode;
use rand::Rng;

/// Draws a random code of [`RoomCode::LEN`] characters, each uniform over
/// [`RoomCode::ALPHABET`]. Uniqueness is the registry's job.
pub fn generate_room_code<R: Rng + ?Sized>(rng: &mut R) -> RoomCode {
    let code: String = (0..RoomCode::LEN)
        .map(|_| char::from(RoomCode::ALPHABET[rng.random_range(0..RoomCode::ALPHABET.len())]))
        .collect();
    RoomCode::new(code)
}
