//! Error types for slot-array encoding and decoding.

use thiserror::Error;

/// Errors raised while walking a [`Document`](crate::Document) into slots.
///
/// Any of these aborts the whole encode call; no partial slot array is
/// returned.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The value has no wire mapping and no extension hook claimed it.
    #[error("cannot encode value of kind `{0}`")]
    Unsupported(String),
    /// A `Value::Node` points outside its document's arena.
    #[error("dangling node reference {0}")]
    DanglingNode(usize),
    /// A sequence handle was already drained by an earlier encode.
    #[error("sequence at slot {0} was already consumed")]
    SequenceConsumed(usize),
    /// An extension hook refused a value it had claimed.
    #[error("extension `{name}` failed: {reason}")]
    Extension { name: String, reason: String },
    /// The value nests deeper than the encoder's depth limit.
    #[error("value nests deeper than {0} levels")]
    TooDeep(usize),
    /// Writing a chunk to the output failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised while interpreting slots back into a [`Document`](crate::Document).
///
/// Errors that concern one field carry the slot id they were raised for.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The slot text itself is not a valid slot array.
    #[error("invalid slot array at byte {offset}: {reason}")]
    InvalidDocument { offset: usize, reason: String },
    /// A string token starts with `$` but its tag is not registered.
    #[error("unknown tag in token `{0}`")]
    UnknownTag(String),
    /// A tag is known but its payload (id, digits, date) does not parse.
    #[error("invalid token `{0}`")]
    InvalidToken(String),
    /// A token references a slot that the array does not hold.
    #[error("missing slot {0}")]
    MissingSlot(usize),
    /// The slot body does not have the shape its tag requires.
    #[error("malformed body in slot {id}: {reason}")]
    Malformed { id: usize, reason: String },
    /// A deferred or sequence slot is absent and immediate resolution was requested.
    #[error("slot {0} is unresolved")]
    Unresolved(usize),
    /// A streamed patch addresses an id with no registered placeholder.
    #[error("no placeholder registered for slot {0}")]
    UnknownPlaceholder(usize),
    /// Tokens reference each other more deeply than `max_depth` allows.
    #[error("slot references nest deeper than {0} levels")]
    TooDeep(usize),
    /// A buffer body is not valid base-64.
    #[error("invalid buffer in slot {id}: {source}")]
    Buffer {
        id: usize,
        #[source]
        source: base64::DecodeError,
    },
    /// The stream ended before the root chunk arrived.
    #[error("stream ended before the root value was decoded")]
    UnexpectedEnd,
    /// A single chunk exceeded the configured length limit.
    #[error("chunk of {0} bytes exceeds the configured limit")]
    ChunkTooLarge(usize),
    #[error("chunk is not valid UTF-8")]
    InvalidUtf8,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    pub(crate) fn malformed(id: usize, reason: impl Into<String>) -> Self {
        DecodeError::Malformed {
            id,
            reason: reason.into(),
        }
    }
}

/// Errors raised by [`Channel`](crate::Channel) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("send on a closed channel")]
    Closed,
}
