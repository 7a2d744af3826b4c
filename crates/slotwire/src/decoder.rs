//! Tag interpreter: turns a slot array back into a [`Document`].
//!
//! Mirrors the encoder walk. The identity table is keyed by slot id, one per
//! document being built, so every token that names the same slot yields the
//! same [`NodeId`] and cycles close on themselves.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::buffer::from_base64;
use crate::channel::Channel;
use crate::deferred::{Deferred, Settlement};
use crate::error::DecodeError;
use crate::hook::DecodeHook;
use crate::sequence::Sequence;
use crate::slots::{self, Slots};
use crate::tags::{RefKind, Tag};
use crate::value::{BigInt, BufferKind, Document, Form, FormEntry, Node, NodeId, Value};

/// Nesting limit used when none is configured.
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Options for [`Decoder`].
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    /// When set, a deferred or sequence whose slot is absent (or, for a
    /// sequence, not yet terminated) becomes a placeholder instead of an
    /// error.
    pub defer_unresolved: bool,
    /// Deepest chain of nested tokens a read may follow before failing with
    /// [`DecodeError::TooDeep`]. Settlement bodies count toward the chain
    /// they are reached from.
    pub max_depth: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            defer_unresolved: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl DecodeOptions {
    pub fn deferred() -> Self {
        Self {
            defer_unresolved: true,
            ..Self::default()
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Something a later patch is expected to settle.
#[derive(Debug, Clone)]
pub enum Placeholder {
    Deferred(Deferred),
    Sequence(Channel<Document>),
}

/// A decoded value plus the placeholders created while decoding it.
#[derive(Debug)]
pub struct Decoded<T = Document> {
    pub value: T,
    pub placeholders: Vec<(usize, Placeholder)>,
}

/// Items carried by one sequence body.
#[derive(Debug, Default)]
pub struct Items {
    pub items: Vec<Document>,
    /// The body ended with the completion sentinel.
    pub done: bool,
}

#[derive(Default)]
struct Handles {
    deferred: HashMap<usize, Deferred>,
    sequences: HashMap<usize, Sequence>,
}

/// Slot-array decoder.
///
/// [`decode`](Decoder::decode) starts a fresh id space; the
/// `decode_settlement` / `decode_items` calls used for patches keep
/// resolving deferred and sequence ids against it.
///
/// Deferred and sequence handles are kept until the next `decode`, settled
/// or not: the encoder keeps its own handle map for the same span and may
/// point a later patch back at any of them. A streaming decoder therefore
/// holds one entry per distinct deferred or sequence the stream has named.
pub struct Decoder<H = ()> {
    hook: H,
    options: DecodeOptions,
    handles: Handles,
}

impl Default for Decoder<()> {
    fn default() -> Self {
        Self::new(DecodeOptions::default())
    }
}

impl Decoder<()> {
    pub fn new(options: DecodeOptions) -> Self {
        Self::with_hook((), options)
    }
}

impl<H: DecodeHook> Decoder<H> {
    pub fn with_hook(hook: H, options: DecodeOptions) -> Self {
        Self {
            hook,
            options,
            handles: Handles::default(),
        }
    }

    pub fn options(&self) -> DecodeOptions {
        self.options
    }

    pub fn hook_mut(&mut self) -> &mut H {
        &mut self.hook
    }

    pub fn into_hook(self) -> H {
        self.hook
    }

    /// Decodes a full document rooted at slot 0.
    pub fn decode(&mut self, slots: &Slots) -> Result<Decoded, DecodeError> {
        self.handles = Handles::default();
        self.run(slots, |read| {
            let root = read.slot(0)?;
            read.document(root)
        })
    }

    /// Decodes the body of the deferred slot `id`.
    pub fn decode_settlement(
        &mut self,
        slots: &Slots,
        id: usize,
    ) -> Result<Decoded<Settlement>, DecodeError> {
        self.run(slots, |read| read.settlement(id))
    }

    /// Decodes the item list of the sequence slot `id`.
    pub fn decode_items(&mut self, slots: &Slots, id: usize) -> Result<Decoded<Items>, DecodeError> {
        self.run(slots, |read| read.items(id))
    }

    /// Whether `id` names a deferred this decoder has already produced.
    pub fn knows_deferred(&self, id: usize) -> bool {
        self.handles.deferred.contains_key(&id)
    }

    pub fn knows_sequence(&self, id: usize) -> bool {
        self.handles.sequences.contains_key(&id)
    }

    /// Runs one read against `slots`. Handles first seen during the read are
    /// kept only if it succeeds.
    fn run<T, F>(&mut self, slots: &Slots, f: F) -> Result<Decoded<T>, DecodeError>
    where
        F: for<'d> FnOnce(&mut Read<'d, H>) -> Result<T, DecodeError>,
    {
        let mut read = Read {
            slots,
            hook: &mut self.hook,
            options: self.options,
            known: &self.handles,
            fresh: Handles::default(),
            placeholders: Vec::new(),
            depth: 0,
        };
        let value = f(&mut read)?;
        let Read {
            fresh,
            placeholders,
            ..
        } = read;
        self.handles.deferred.extend(fresh.deferred);
        self.handles.sequences.extend(fresh.sequences);
        Ok(Decoded {
            value,
            placeholders,
        })
    }
}

/// Decodes a complete slot array; any unresolved deferred or sequence is an
/// error.
pub fn decode(slots: &Slots) -> Result<Document, DecodeError> {
    Ok(Decoder::default().decode(slots)?.value)
}

/// Parses and decodes slot text.
pub fn decode_str(text: &str) -> Result<Document, DecodeError> {
    decode(&slots::parse(text)?)
}

/// Identity table for one document: slot id → value already produced.
type IdTable = HashMap<usize, Value>;

struct Read<'d, H> {
    slots: &'d Slots,
    hook: &'d mut H,
    options: DecodeOptions,
    known: &'d Handles,
    fresh: Handles,
    placeholders: Vec<(usize, Placeholder)>,
    depth: usize,
}

impl<'d, H: DecodeHook> Read<'d, H> {
    fn slot(&self, id: usize) -> Result<&'d JsonValue, DecodeError> {
        self.slots
            .get(id)
            .and_then(Option::as_ref)
            .ok_or(DecodeError::MissingSlot(id))
    }

    fn has_slot(&self, id: usize) -> bool {
        matches!(self.slots.get(id), Some(Some(_)))
    }

    fn document(&mut self, token: &'d JsonValue) -> Result<Document, DecodeError> {
        let mut doc = Document::new();
        let mut ids = IdTable::new();
        let root = self.token(&mut doc, &mut ids, token)?;
        doc.set_root(root);
        Ok(doc)
    }

    fn settlement(&mut self, id: usize) -> Result<Settlement, DecodeError> {
        let token = self.slot(id)?;
        if let JsonValue::String(s) = token {
            if let Some(Tag::Ref(RefKind::Rejected, reason)) = Tag::parse(s) {
                let reason = self.slot(reason)?;
                return Ok(Settlement::Rejected(self.document(reason)?));
            }
        }
        Ok(Settlement::Resolved(self.document(token)?))
    }

    fn items(&mut self, id: usize) -> Result<Items, DecodeError> {
        let body = self
            .slot(id)?
            .as_array()
            .ok_or_else(|| DecodeError::malformed(id, "sequence body must be an array"))?;
        let mut out = Items::default();
        for (i, token) in body.iter().enumerate() {
            if token.as_str() == Some(crate::tags::DONE) {
                if i + 1 != body.len() {
                    return Err(DecodeError::malformed(id, "items after completion"));
                }
                out.done = true;
                break;
            }
            out.items.push(self.document(token)?);
        }
        Ok(out)
    }

    /// Every nested read passes through here, so this is where depth is
    /// counted.
    fn token(
        &mut self,
        doc: &mut Document,
        ids: &mut IdTable,
        token: &'d JsonValue,
    ) -> Result<Value, DecodeError> {
        if self.depth >= self.options.max_depth {
            return Err(DecodeError::TooDeep(self.options.max_depth));
        }
        self.depth += 1;
        let value = self.value(doc, ids, token);
        self.depth -= 1;
        value
    }

    fn value(
        &mut self,
        doc: &mut Document,
        ids: &mut IdTable,
        token: &'d JsonValue,
    ) -> Result<Value, DecodeError> {
        match token {
            JsonValue::Null => Ok(Value::Null),
            JsonValue::Bool(b) => Ok(Value::Bool(*b)),
            JsonValue::Number(n) => n
                .as_f64()
                .map(Value::Number)
                .ok_or_else(|| DecodeError::InvalidToken(n.to_string())),
            JsonValue::String(s) => self.tagged(doc, ids, s),
            JsonValue::Array(_) | JsonValue::Object(_) => {
                Err(DecodeError::InvalidToken(token.to_string()))
            }
        }
    }

    fn tagged(
        &mut self,
        doc: &mut Document,
        ids: &mut IdTable,
        s: &'d str,
    ) -> Result<Value, DecodeError> {
        let tag = Tag::parse(s).ok_or_else(|| DecodeError::UnknownTag(s.to_owned()))?;
        let value = match tag {
            Tag::Text(text) => Value::Str(text.to_owned()),
            Tag::Undefined => Value::Undefined,
            Tag::Number(n) => Value::Number(n),
            Tag::Date("") => Value::Date(None),
            Tag::Date(iso) => {
                let date = DateTime::parse_from_rfc3339(iso)
                    .map_err(|_| DecodeError::InvalidToken(s.to_owned()))?;
                Value::Date(Some(date.with_timezone(&Utc)))
            }
            Tag::BigInt(digits) => Value::BigInt(
                BigInt::parse(digits).ok_or_else(|| DecodeError::InvalidToken(s.to_owned()))?,
            ),
            Tag::Symbol(name) => Value::Symbol(name.to_owned()),
            Tag::Ref(kind, id) => return self.reference(doc, ids, kind, id),
            Tag::Extension { name, id } => {
                if let Some(value) = ids.get(&id) {
                    return Ok(value.clone());
                }
                let body = self.slot(id)?;
                let value = self
                    .hook
                    .decode(name, id, body, doc)?
                    .ok_or_else(|| DecodeError::UnknownTag(s.to_owned()))?;
                ids.insert(id, value.clone());
                value
            }
            // Only meaningful inside a sequence body.
            Tag::Done => return Err(DecodeError::InvalidToken(s.to_owned())),
        };
        Ok(value)
    }

    fn reference(
        &mut self,
        doc: &mut Document,
        ids: &mut IdTable,
        kind: RefKind,
        id: usize,
    ) -> Result<Value, DecodeError> {
        if let Some(value) = ids.get(&id) {
            return Ok(value.clone());
        }
        match kind {
            RefKind::List | RefKind::Set => {
                let body = self.array(id)?;
                let node = doc.insert(Node::List(Vec::new()));
                ids.insert(id, Value::Node(node));
                let items = body
                    .iter()
                    .map(|item| self.token(doc, ids, item))
                    .collect::<Result<Vec<_>, _>>()?;
                let filled = if kind == RefKind::List {
                    Node::List(items)
                } else {
                    Node::Set(items)
                };
                replace(doc, node, filled);
                Ok(Value::Node(node))
            }
            RefKind::Map => {
                let body = self.array(id)?;
                let node = doc.insert(Node::Map(Vec::new()));
                ids.insert(id, Value::Node(node));
                let mut entries = Vec::with_capacity(body.len());
                for pair in body {
                    let [key, value] = pair.as_array().map(Vec::as_slice).unwrap_or_default() else {
                        return Err(DecodeError::malformed(id, "map entries must be pairs"));
                    };
                    let key = self.token(doc, ids, key)?;
                    let value = self.token(doc, ids, value)?;
                    entries.push((key, value));
                }
                replace(doc, node, Node::Map(entries));
                Ok(Value::Node(node))
            }
            RefKind::Record => {
                let body = self
                    .slot(id)?
                    .as_object()
                    .ok_or_else(|| DecodeError::malformed(id, "record body must be an object"))?;
                let node = doc.insert(Node::Record(IndexMap::new()));
                ids.insert(id, Value::Node(node));
                let mut fields = IndexMap::with_capacity(body.len());
                for (key, token) in body {
                    fields.insert(key.clone(), self.token(doc, ids, token)?);
                }
                replace(doc, node, Node::Record(fields));
                Ok(Value::Node(node))
            }
            RefKind::Error => {
                let body = self.slot(id)?;
                let text = |field: &str| {
                    body.get(field)
                        .and_then(JsonValue::as_str)
                        .map(str::to_owned)
                        .ok_or_else(|| DecodeError::malformed(id, format!("error `{field}` must be text")))
                };
                let node = doc.insert(Node::Error {
                    name: text("name")?,
                    message: text("message")?,
                });
                ids.insert(id, Value::Node(node));
                Ok(Value::Node(node))
            }
            RefKind::Buffer(buffer_kind) => {
                let text = self.text(id)?;
                let node = doc.insert(Node::Buffer(from_base64(id, buffer_kind, text)?));
                ids.insert(id, Value::Node(node));
                Ok(Value::Node(node))
            }
            RefKind::Form => {
                let body = self.array(id)?;
                let mut form = Form::new();
                for entry in body {
                    let [JsonValue::String(field), JsonValue::String(token)] =
                        entry.as_array().map(Vec::as_slice).unwrap_or_default()
                    else {
                        return Err(DecodeError::malformed(id, "form entries must be [field, token]"));
                    };
                    let entry = match Tag::parse(token) {
                        Some(Tag::Text(text)) => FormEntry::Text(text.to_owned()),
                        Some(Tag::Ref(RefKind::Buffer(BufferKind::Raw), part)) => {
                            FormEntry::Binary(from_base64(part, BufferKind::Raw, self.text(part)?)?.bytes)
                        }
                        _ => return Err(DecodeError::malformed(id, format!("bad form entry `{token}`"))),
                    };
                    form.append(field.clone(), entry);
                }
                let node = doc.insert(Node::Form(form));
                ids.insert(id, Value::Node(node));
                Ok(Value::Node(node))
            }
            RefKind::Deferred => {
                let handle = self.deferred_handle(id)?;
                let node = doc.insert(Node::Deferred(handle));
                ids.insert(id, Value::Node(node));
                Ok(Value::Node(node))
            }
            RefKind::Sequence => {
                let handle = self.sequence_handle(id)?;
                let node = doc.insert(Node::Sequence(handle));
                ids.insert(id, Value::Node(node));
                Ok(Value::Node(node))
            }
            RefKind::Rejected => Err(DecodeError::InvalidToken(kind.token(id))),
        }
    }

    fn array(&self, id: usize) -> Result<&'d Vec<JsonValue>, DecodeError> {
        self.slot(id)?
            .as_array()
            .ok_or_else(|| DecodeError::malformed(id, "body must be an array"))
    }

    fn text(&self, id: usize) -> Result<&'d str, DecodeError> {
        self.slot(id)?
            .as_str()
            .ok_or_else(|| DecodeError::malformed(id, "body must be text"))
    }

    fn deferred_handle(&mut self, id: usize) -> Result<Deferred, DecodeError> {
        if let Some(handle) = self
            .known
            .deferred
            .get(&id)
            .or_else(|| self.fresh.deferred.get(&id))
        {
            return Ok(handle.clone());
        }
        let handle = Deferred::new();
        // Registered before the body is read so the body can refer back to it.
        self.fresh.deferred.insert(id, handle.clone());
        if self.has_slot(id) {
            let settlement = self.settlement(id)?;
            handle.settle(settlement);
        } else if self.options.defer_unresolved {
            self.placeholders
                .push((id, Placeholder::Deferred(handle.clone())));
        } else {
            return Err(DecodeError::Unresolved(id));
        }
        Ok(handle)
    }

    fn sequence_handle(&mut self, id: usize) -> Result<Sequence, DecodeError> {
        if let Some(handle) = self
            .known
            .sequences
            .get(&id)
            .or_else(|| self.fresh.sequences.get(&id))
        {
            return Ok(handle.clone());
        }
        let channel = Channel::new();
        let handle = Sequence::from_channel(channel.clone());
        self.fresh.sequences.insert(id, handle.clone());
        let items = if self.has_slot(id) {
            self.items(id)?
        } else {
            Items::default()
        };
        for item in items.items {
            channel
                .send(item)
                .map_err(|e| DecodeError::malformed(id, e.to_string()))?;
        }
        if items.done {
            channel.close();
        } else if self.options.defer_unresolved {
            self.placeholders.push((id, Placeholder::Sequence(channel)));
        } else {
            return Err(DecodeError::Unresolved(id));
        }
        Ok(handle)
    }
}

fn replace(doc: &mut Document, id: NodeId, node: Node) {
    if let Some(slot) = doc.get_mut(id) {
        *slot = node;
    }
}
