#![allow(dead_code)]

use serde_json::{json, Value as JsonValue};
use slotwire::{
    DecodeError, DecodeHook, Document, EncodeError, EncodeHook, Extension, HostValue, Node, Value,
};

pub const POINT: &str = "point";

pub fn point(doc: &mut Document, x: i64, y: i64) -> Value {
    Value::Node(doc.insert(Node::Host(HostValue::new(POINT, (x, y)))))
}

pub fn point_at(doc: &Document, value: &Value) -> Option<(i64, i64)> {
    match doc.get(value.as_node()?) {
        Some(Node::Host(host)) if host.type_name == POINT => host.downcast_ref::<(i64, i64)>().copied(),
        _ => None,
    }
}

/// Writes `point` host nodes as `$_pt_<id>` with an `[x, y]` body.
pub struct PointWriter;

impl EncodeHook for PointWriter {
    fn encode(
        &mut self,
        doc: &Document,
        value: &Value,
        _: usize,
    ) -> Result<Option<Extension>, EncodeError> {
        Ok(point_at(doc, value).map(|(x, y)| Extension::new("pt", json!([x, y]))))
    }
}

pub struct PointReader;

impl DecodeHook for PointReader {
    fn decode(
        &mut self,
        name: &str,
        id: usize,
        body: &JsonValue,
        doc: &mut Document,
    ) -> Result<Option<Value>, DecodeError> {
        if name != "pt" {
            return Ok(None);
        }
        let coords = body
            .as_array()
            .map(|xy| xy.iter().filter_map(JsonValue::as_i64).collect::<Vec<_>>())
            .unwrap_or_default();
        let [x, y] = coords[..] else {
            return Err(DecodeError::Malformed {
                id,
                reason: "point body must be [x, y]".to_owned(),
            });
        };
        Ok(Some(point(doc, x, y)))
    }
}
