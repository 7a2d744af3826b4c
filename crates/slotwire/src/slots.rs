//! Text form of a slot array.
//!
//! A slot array is written as a JSON array whose absent slots are empty
//! positions, so a sparse patch addressed to slot 3 reads `[,,,"x"]`. An
//! empty position is not the same as `null`: `null` is a token, a hole is
//! "nothing written here".

use serde_json::Value as JsonValue;

use crate::error::DecodeError;

/// Ordered, sparse-capable slot array. Index 0 is the root slot.
pub type Slots = Vec<Option<JsonValue>>;

/// Writes `slots` as one line of text.
pub fn stringify(slots: &[Option<JsonValue>]) -> String {
    let mut out = String::with_capacity(slots.len() * 8 + 2);
    out.push('[');
    for (i, slot) in slots.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if let Some(token) = slot {
            // Serializing an in-memory `serde_json::Value` cannot fail.
            out.push_str(&token.to_string());
        }
    }
    out.push(']');
    out
}

/// Parses the text written by [`stringify`].
pub fn parse(text: &str) -> Result<Slots, DecodeError> {
    let bytes = text.as_bytes();
    let mut x = skip_ws(bytes, 0);
    if bytes.get(x) != Some(&b'[') {
        return Err(invalid(x, "expected `[`"));
    }
    x += 1;
    let mut slots = Slots::new();
    x = skip_ws(bytes, x);
    if bytes.get(x) == Some(&b']') {
        return finish(bytes, x + 1, slots);
    }
    loop {
        x = skip_ws(bytes, x);
        match bytes.get(x) {
            None => return Err(invalid(x, "unterminated slot array")),
            Some(b',') | Some(b']') => slots.push(None),
            Some(_) => {
                let mut values =
                    serde_json::Deserializer::from_str(&text[x..]).into_iter::<JsonValue>();
                let token = match values.next() {
                    Some(Ok(token)) => token,
                    Some(Err(e)) => return Err(invalid(x, e.to_string())),
                    None => return Err(invalid(x, "expected a token")),
                };
                x += values.byte_offset();
                slots.push(Some(token));
                x = skip_ws(bytes, x);
            }
        }
        match bytes.get(x) {
            Some(b',') => x += 1,
            Some(b']') => return finish(bytes, x + 1, slots),
            _ => return Err(invalid(x, "expected `,` or `]`")),
        }
    }
}

fn finish(bytes: &[u8], x: usize, slots: Slots) -> Result<Slots, DecodeError> {
    let x = skip_ws(bytes, x);
    if x != bytes.len() {
        return Err(invalid(x, "trailing characters"));
    }
    Ok(slots)
}

fn skip_ws(bytes: &[u8], mut x: usize) -> usize {
    while let Some(b' ' | b'\t' | b'\n' | b'\r') = bytes.get(x) {
        x += 1;
    }
    x
}

fn invalid(offset: usize, reason: impl Into<String>) -> DecodeError {
    DecodeError::InvalidDocument {
        offset,
        reason: reason.into(),
    }
}

/// Copies every written slot of `patch` into `target`, growing it as needed.
pub fn merge(target: &mut Slots, patch: Slots) {
    if target.len() < patch.len() {
        target.resize(patch.len(), None);
    }
    for (i, slot) in patch.into_iter().enumerate() {
        if slot.is_some() {
            target[i] = slot;
        }
    }
}
