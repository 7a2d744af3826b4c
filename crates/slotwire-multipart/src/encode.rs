use bytes::Bytes;
use serde_json::Value as JsonValue;
use slotwire::{Document, EncodeError, EncodeHook, Encoder, Extension, FormEntry, Node, Value};

use crate::error::MultipartError;
use crate::payload::{Part, Payload};
use crate::{BUFFER_EXTENSION, FORM_EXTENSION};

/// Moves buffer and form contents out of the slot text into named parts.
#[derive(Debug, Default)]
pub(crate) struct PartRouter {
    parts: Vec<(String, Part)>,
}

impl EncodeHook for PartRouter {
    fn encode(
        &mut self,
        doc: &Document,
        value: &Value,
        id: usize,
    ) -> Result<Option<Extension>, EncodeError> {
        let Some(node) = value.as_node() else {
            return Ok(None);
        };
        match doc.get(node) {
            Some(Node::Buffer(buffer)) => {
                self.parts.push((
                    format!("{id}_file"),
                    Part::Binary(Bytes::copy_from_slice(&buffer.bytes)),
                ));
                let body = JsonValue::String(buffer.kind.code().to_string());
                Ok(Some(Extension::new(BUFFER_EXTENSION, body)))
            }
            Some(Node::Form(form)) => {
                let mut fields = Vec::with_capacity(form.entries.len());
                for (field, entry) in &form.entries {
                    let part = match entry {
                        FormEntry::Text(text) => Part::Text(text.clone()),
                        FormEntry::Binary(bytes) => Part::Binary(Bytes::copy_from_slice(bytes)),
                    };
                    self.parts.push((format!("{id}_{field}"), part));
                    fields.push(JsonValue::String(field.clone()));
                }
                Ok(Some(Extension::new(FORM_EXTENSION, JsonValue::Array(fields))))
            }
            _ => Ok(None),
        }
    }
}

/// Encodes `doc` into a payload, waiting for every deferred value and
/// sequence first.
///
/// Part `"{id}"` holds the token of slot `id` (part `"0"` is the root).
/// Buffer bytes go to `"{id}_file"`, form entries to `"{id}_{field}"`.
pub async fn encode_multipart(doc: &Document) -> Result<Payload, MultipartError> {
    let mut encoder = Encoder::with_hook(PartRouter::default());
    let encoded = encoder.encode(doc)?;
    let slots = encoder.complete(encoded).await?;
    let router = encoder.into_hook();

    let mut payload = Payload::new();
    for (id, token) in slots.iter().enumerate() {
        if let Some(token) = token {
            payload.append(id.to_string(), Part::Text(token.to_string()));
        }
    }
    tracing::debug!(
        slots = payload.len(),
        binary = router.parts.len(),
        "encoded multipart payload"
    );
    for (name, part) in router.parts {
        payload.append(name, part);
    }
    Ok(payload)
}
