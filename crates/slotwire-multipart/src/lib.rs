//! Multipart binding for slotwire documents.
//!
//! Instead of one slot-array text, a document becomes a [`Payload`] of named
//! parts. Each slot token is its own text part, and buffer and form contents
//! travel as raw parts rather than base-64 text.

mod decode;
mod encode;
mod error;
mod payload;

pub use decode::decode_multipart;
pub use encode::encode_multipart;
pub use error::MultipartError;
pub use payload::{Part, Payload};

/// Extension name for buffers whose bytes live in a `"{id}_file"` part.
pub const BUFFER_EXTENSION: &str = "buffer";
/// Extension name for forms whose entries live in `"{id}_{field}"` parts.
pub const FORM_EXTENSION: &str = "form";
