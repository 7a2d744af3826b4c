use std::collections::HashMap;

use serde_json::Value as JsonValue;
use slotwire::{
    Buffer, BufferKind, DecodeError, DecodeHook, Decoder, DecodeOptions, Document, Form,
    FormEntry, Node, Slots, Value,
};

use crate::error::MultipartError;
use crate::payload::{Part, Payload};
use crate::{BUFFER_EXTENSION, FORM_EXTENSION};

/// Reads buffer and form contents back from named parts.
pub(crate) struct PartReader<'p> {
    payload: &'p Payload,
}

impl PartReader<'_> {
    fn buffer(&self, id: usize, body: &JsonValue) -> Result<Node, DecodeError> {
        let kind = body
            .as_str()
            .and_then(|code| {
                let mut chars = code.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => BufferKind::from_code(c),
                    _ => None,
                }
            })
            .ok_or_else(|| malformed(id, "buffer body must be a kind code"))?;
        let name = format!("{id}_file");
        let bytes = match self.payload.get(&name) {
            Some(Part::Binary(bytes)) => bytes.to_vec(),
            Some(Part::Text(_)) => return Err(malformed(id, format!("part `{name}` must be binary"))),
            None => return Err(DecodeError::MissingSlot(id)),
        };
        if bytes.len() % kind.width() != 0 {
            return Err(malformed(id, "buffer length does not match its element width"));
        }
        Ok(Node::Buffer(Buffer { kind, bytes }))
    }

    fn form(&self, id: usize, body: &JsonValue) -> Result<Node, DecodeError> {
        let fields = body
            .as_array()
            .ok_or_else(|| malformed(id, "form body must list field names"))?;
        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut form = Form::new();
        for field in fields {
            let field = field
                .as_str()
                .ok_or_else(|| malformed(id, "form field names must be text"))?;
            let index = seen.entry(field).or_default();
            let name = format!("{id}_{field}");
            let entry = match self.payload.get_all(&name).nth(*index) {
                Some(Part::Text(text)) => FormEntry::Text(text.clone()),
                Some(Part::Binary(bytes)) => FormEntry::Binary(bytes.to_vec()),
                None => return Err(malformed(id, format!("missing part `{name}`"))),
            };
            *index += 1;
            form.append(field, entry);
        }
        Ok(Node::Form(form))
    }
}

impl DecodeHook for PartReader<'_> {
    fn decode(
        &mut self,
        name: &str,
        id: usize,
        body: &JsonValue,
        doc: &mut Document,
    ) -> Result<Option<Value>, DecodeError> {
        let node = match name {
            BUFFER_EXTENSION => self.buffer(id, body)?,
            FORM_EXTENSION => self.form(id, body)?,
            _ => return Ok(None),
        };
        Ok(Some(Value::Node(doc.insert(node))))
    }
}

fn malformed(id: usize, reason: impl Into<String>) -> DecodeError {
    DecodeError::Malformed {
        id,
        reason: reason.into(),
    }
}

/// Rebuilds the document written by [`encode_multipart`](crate::encode_multipart).
pub fn decode_multipart(payload: &Payload) -> Result<Document, MultipartError> {
    let mut slots = Slots::new();
    for (name, part) in payload.iter() {
        let Ok(id) = name.parse::<usize>() else {
            continue;
        };
        let text = part
            .as_text()
            .ok_or_else(|| MultipartError::BinarySlot(name.to_owned()))?;
        let token = serde_json::from_str(text).map_err(|source| MultipartError::InvalidPart {
            name: name.to_owned(),
            source,
        })?;
        if slots.len() <= id {
            slots.resize(id + 1, None);
        }
        slots[id] = Some(token);
    }
    if !matches!(slots.first(), Some(Some(_))) {
        return Err(MultipartError::MissingRoot);
    }
    let mut decoder = Decoder::with_hook(PartReader { payload }, DecodeOptions::default());
    let decoded = decoder.decode(&slots)?;
    tracing::debug!(nodes = decoded.value.len(), "decoded multipart payload");
    Ok(decoded.value)
}
