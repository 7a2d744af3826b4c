//! Chunked transport for documents with values that settle later.
//!
//! The first chunk is the slot array of the root document, with the slots of
//! pending deferred values and sequences left empty. Each later chunk is a
//! sparse slot array addressed to one of those ids: a deferred body, or the
//! next item (or completion sentinel) of a sequence. Ids reserved by a patch
//! never collide with earlier ones, so a patch may itself introduce new
//! pending values. Chunks are separated by a blank line.

mod decoder;
mod encoder;
mod pending;

pub use decoder::{
    decode_stream, decode_stream_with_hook, DecodedStream, MalformedChunk, StreamDecodeOptions,
    DEFAULT_MAX_CHUNK_LEN,
};
pub use encoder::{encode_complete, encode_stream, encode_to_string, write_stream};

/// Separator written after every chunk.
pub const CHUNK_SEPARATOR: &str = "\n\n";
