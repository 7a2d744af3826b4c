//! Extension point for values the core tag set does not cover.
//!
//! An [`EncodeHook`] sees every value before default dispatch. When it
//! claims one, the walker reserves a slot, stores the returned body there
//! and emits `$_<name>_<id>`. A matching [`DecodeHook`] turns that body back
//! into a value.

use serde_json::Value as JsonValue;

use crate::error::{DecodeError, EncodeError};
use crate::value::{Document, Value};

/// Body produced by an [`EncodeHook`] for a claimed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Extension {
    pub name: String,
    pub body: JsonValue,
}

impl Extension {
    pub fn new(name: impl Into<String>, body: JsonValue) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }
}

pub trait EncodeHook {
    /// Returns `Some` to take over encoding of `value`. `id` is the slot the
    /// body will be stored in if the value is claimed.
    fn encode(
        &mut self,
        doc: &Document,
        value: &Value,
        id: usize,
    ) -> Result<Option<Extension>, EncodeError>;
}

pub trait DecodeHook {
    /// Returns `Some` when `name` belongs to this hook. Nodes the hook
    /// creates go into `doc`.
    fn decode(
        &mut self,
        name: &str,
        id: usize,
        body: &JsonValue,
        doc: &mut Document,
    ) -> Result<Option<Value>, DecodeError>;
}

impl EncodeHook for () {
    fn encode(&mut self, _: &Document, _: &Value, _: usize) -> Result<Option<Extension>, EncodeError> {
        Ok(None)
    }
}

impl DecodeHook for () {
    fn decode(
        &mut self,
        _: &str,
        _: usize,
        _: &JsonValue,
        _: &mut Document,
    ) -> Result<Option<Value>, DecodeError> {
        Ok(None)
    }
}

/// First hook to claim a value wins.
impl EncodeHook for Vec<Box<dyn EncodeHook + Send>> {
    fn encode(
        &mut self,
        doc: &Document,
        value: &Value,
        id: usize,
    ) -> Result<Option<Extension>, EncodeError> {
        for hook in self.iter_mut() {
            if let Some(ext) = hook.encode(doc, value, id)? {
                return Ok(Some(ext));
            }
        }
        Ok(None)
    }
}

impl DecodeHook for Vec<Box<dyn DecodeHook + Send>> {
    fn decode(
        &mut self,
        name: &str,
        id: usize,
        body: &JsonValue,
        doc: &mut Document,
    ) -> Result<Option<Value>, DecodeError> {
        for hook in self.iter_mut() {
            if let Some(value) = hook.decode(name, id, body, doc)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}
