use slotwire::{DecodeError, EncodeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MultipartError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// A numbered part holds text that is not a JSON token.
    #[error("part `{name}` is not a valid token: {source}")]
    InvalidPart {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    /// A numbered part is binary where slot text was expected.
    #[error("part `{0}` must be text")]
    BinarySlot(String),
    #[error("payload has no root part")]
    MissingRoot,
}
