//! Codec trait and implementations for serializing/deserializing messages.
//!
//! The protocol layer doesn't care HOW messages become bytes — anything
//! implementing [`Codec`] will do. [`JsonCodec`] is the default: the quiz
//! frontend is a browser client, so human-readable JSON over text frames
//! is the natural wire format. A binary codec could be slotted in without
//! touching any other layer.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes Rust types to bytes and decodes bytes back.
///
/// `Send + Sync + 'static` because the codec is shared across connection
/// handler tasks for the lifetime of the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the bytes are malformed or
    /// don't match the expected type — including an unknown `action` tag.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
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

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{ClientRequest, PlayerId};

    #[test]
    fn test_json_codec_round_trip() {
        let codec = JsonCodec;
        let req = ClientRequest::Signal {
            player_id: PlayerId(1),
            local_ts: 999,
        };
        let bytes = codec.encode(&req).unwrap();
        let back: ClientRequest = codec.decode(&bytes).unwrap();
        assert_eq!(req, back);
    }

    #[test]
    fn test_json_codec_decode_failure_is_decode_error() {
        let codec = JsonCodec;
        let result: Result<ClientRequest, _> = codec.decode(b"{broken");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
