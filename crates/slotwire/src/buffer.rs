//! Base-64 bodies for binary buffers.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::DecodeError;
use crate::value::{Buffer, BufferKind};

pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes the body stored in slot `id` into a buffer of `kind`.
///
/// The byte length must be a whole number of `kind` elements.
pub fn from_base64(id: usize, kind: BufferKind, text: &str) -> Result<Buffer, DecodeError> {
    let bytes = STANDARD
        .decode(text)
        .map_err(|source| DecodeError::Buffer { id, source })?;
    check_width(id, kind, &bytes)?;
    Ok(Buffer { kind, bytes })
}

pub fn check_width(id: usize, kind: BufferKind, bytes: &[u8]) -> Result<(), DecodeError> {
    if bytes.len() % kind.width() != 0 {
        return Err(DecodeError::malformed(
            id,
            format!(
                "{} bytes is not a multiple of the {}-byte element width",
                bytes.len(),
                kind.width()
            ),
        ));
    }
    Ok(())
}

impl Buffer {
    /// Reads the elements as `f64`, or `None` for other kinds.
    pub fn to_f64s(&self) -> Option<Vec<f64>> {
        if self.kind != BufferKind::F64 {
            return None;
        }
        Some(
            self.bytes
                .chunks_exact(8)
                .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                .collect(),
        )
    }

    pub fn to_i32s(&self) -> Option<Vec<i32>> {
        if self.kind != BufferKind::I32 {
            return None;
        }
        Some(
            self.bytes
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    }
}
