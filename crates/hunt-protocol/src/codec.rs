//! Codec trait and implementations for turning messages into bytes.
//!
//! The gateway only knows it holds "something that implements [`Codec`]".
//! [`JsonCodec`] is the one the server ships with: browser clients speak
//! JSON, and every frame can be read straight out of DevTools.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes Rust values to bytes and decodes bytes back.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task on the runtime.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value cannot be represented
    /// in this format.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or do not
    /// match the expected type (unknown `type` tag, missing field).
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] backed by `serde_json`.
///
/// ```rust
/// use hunt_protocol::{ClientCommand, Codec, JsonCodec, RoomCode};
///
/// let codec = JsonCodec;
/// let cmd: ClientCommand =
///     codec.decode(br#"{"type":"join_room","code":"ab12cd","name":"Mina"}"#).unwrap();
/// assert_eq!(
///     cmd,
///     ClientCommand::JoinRoom { code: RoomCode::new("ab12cd"), name: "Mina".into() }
/// );
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
