//! Graph walker: turns a [`Document`] into a slot array.
//!
//! Slots are assigned in pre-order. A compound value reserves its slot and
//! registers its identity before any child is visited, so a child that
//! reaches back to an ancestor (or to any already-visited node) becomes a
//! back-reference token instead of a second traversal.
//!
//! Deferred values that are already settled are written inline. Pending
//! ones, and every sequence, leave their slot empty and are returned in
//! [`Encoded`] so a caller can fill them in later under the same id.

use std::collections::HashMap;

use chrono::SecondsFormat;
use serde_json::{Map, Value as JsonValue};

use crate::buffer::to_base64;
use crate::decoder::DEFAULT_MAX_DEPTH;
use crate::deferred::{Deferred, Settlement};
use crate::error::EncodeError;
use crate::hook::EncodeHook;
use crate::sequence::Sequence;
use crate::slots::Slots;
use crate::tags::{self, RefKind};
use crate::value::{BufferKind, Document, FormEntry, Node, NodeId, Value};

/// Largest magnitude an `f64` holds without losing integer precision.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Output of one walk.
#[derive(Debug, Default)]
pub struct Encoded {
    pub slots: Slots,
    /// Deferred values still pending, with the slot reserved for each.
    pub deferred: Vec<(usize, Deferred)>,
    /// Sequences whose items have not been pulled yet.
    pub sequences: Vec<(usize, Sequence)>,
}

impl Encoded {
    pub fn is_complete(&self) -> bool {
        self.deferred.is_empty() && self.sequences.is_empty()
    }
}

/// Deferred/sequence handles seen so far, keyed by shared-state identity.
/// Handle clones are kept so the keys stay valid.
#[derive(Default)]
struct Handles {
    deferred: HashMap<usize, (Deferred, usize)>,
    sequences: HashMap<usize, (Sequence, usize)>,
}

/// Slot-array encoder.
///
/// One [`encode`](Encoder::encode) call starts a fresh id space. The
/// `encode_settlement` / `encode_item` calls that follow continue it, so a
/// stream of patches never reuses an id.
pub struct Encoder<H = ()> {
    hook: H,
    next_id: usize,
    max_depth: usize,
    handles: Handles,
}

impl Default for Encoder<()> {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<()> {
    pub fn new() -> Self {
        Self::with_hook(())
    }
}

impl<H: EncodeHook> Encoder<H> {
    pub fn with_hook(hook: H) -> Self {
        Self {
            hook,
            next_id: 1,
            max_depth: DEFAULT_MAX_DEPTH,
            handles: Handles::default(),
        }
    }

    /// Deepest chain of nested values a walk follows before failing with
    /// [`EncodeError::TooDeep`].
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn hook(&self) -> &H {
        &self.hook
    }

    pub fn hook_mut(&mut self) -> &mut H {
        &mut self.hook
    }

    pub fn into_hook(self) -> H {
        self.hook
    }

    /// Id the next reserved slot will get.
    pub fn next_id(&self) -> usize {
        self.next_id
    }

    /// Walks `doc` from the root slot.
    pub fn encode(&mut self, doc: &Document) -> Result<Encoded, EncodeError> {
        self.next_id = 1;
        self.handles = Handles::default();
        self.run(|walk| {
            let token = walk.document(doc)?;
            walk.put(0, token);
            Ok(())
        })
    }

    /// Encodes a settlement into the slot reserved for a pending deferred.
    pub fn encode_settlement(
        &mut self,
        id: usize,
        settlement: &Settlement,
    ) -> Result<Encoded, EncodeError> {
        self.run(|walk| {
            let token = walk.settlement(settlement)?;
            walk.put(id, token);
            Ok(())
        })
    }

    /// Encodes one sequence item, or the completion sentinel for `None`,
    /// as a one-element body for slot `id`.
    pub fn encode_item(&mut self, id: usize, item: Option<&Document>) -> Result<Encoded, EncodeError> {
        self.run(|walk| {
            let token = match item {
                Some(doc) => walk.document(doc)?,
                None => JsonValue::String(tags::DONE.to_owned()),
            };
            walk.put(id, JsonValue::Array(vec![token]));
            Ok(())
        })
    }

    /// Runs a walk and commits its id/handle reservations only on success.
    fn run<F>(&mut self, f: F) -> Result<Encoded, EncodeError>
    where
        F: FnOnce(&mut Walk<'_, H>) -> Result<(), EncodeError>,
    {
        let mut walk = Walk {
            hook: &mut self.hook,
            handles: &self.handles,
            next_id: self.next_id,
            depth: 0,
            max_depth: self.max_depth,
            new_deferred: HashMap::new(),
            new_sequences: HashMap::new(),
            out: Encoded::default(),
        };
        f(&mut walk)?;
        let Walk {
            next_id,
            new_deferred,
            new_sequences,
            out,
            ..
        } = walk;
        self.next_id = next_id;
        self.handles.deferred.extend(new_deferred);
        self.handles.sequences.extend(new_sequences);
        Ok(out)
    }
}

/// Encodes `doc` with no extension hook.
pub fn encode(doc: &Document) -> Result<Encoded, EncodeError> {
    Encoder::new().encode(doc)
}

/// Identity table for one document: node → token already emitted for it.
type RefTable = HashMap<NodeId, JsonValue>;

struct Walk<'e, H> {
    hook: &'e mut H,
    handles: &'e Handles,
    next_id: usize,
    depth: usize,
    max_depth: usize,
    new_deferred: HashMap<usize, (Deferred, usize)>,
    new_sequences: HashMap<usize, (Sequence, usize)>,
    out: Encoded,
}

impl<H: EncodeHook> Walk<'_, H> {
    fn reserve(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn put(&mut self, id: usize, token: JsonValue) {
        let slots = &mut self.out.slots;
        if slots.len() <= id {
            slots.resize(id + 1, None);
        }
        slots[id] = Some(token);
    }

    /// Each document is its own identity scope.
    fn document(&mut self, doc: &Document) -> Result<JsonValue, EncodeError> {
        let mut refs = RefTable::new();
        self.value(doc, &mut refs, doc.root())
    }

    fn settlement(&mut self, settlement: &Settlement) -> Result<JsonValue, EncodeError> {
        match settlement {
            Settlement::Resolved(doc) => self.document(doc),
            Settlement::Rejected(reason) => {
                let id = self.reserve();
                let token = self.document(reason)?;
                self.put(id, token);
                Ok(JsonValue::String(RefKind::Rejected.token(id)))
            }
        }
    }

    fn value(
        &mut self,
        doc: &Document,
        refs: &mut RefTable,
        value: &Value,
    ) -> Result<JsonValue, EncodeError> {
        if self.depth >= self.max_depth {
            return Err(EncodeError::TooDeep(self.max_depth));
        }
        self.depth += 1;
        let token = self.token(doc, refs, value);
        self.depth -= 1;
        token
    }

    fn token(
        &mut self,
        doc: &Document,
        refs: &mut RefTable,
        value: &Value,
    ) -> Result<JsonValue, EncodeError> {
        if let Value::Node(node) = value {
            if let Some(token) = refs.get(node) {
                return Ok(token.clone());
            }
        }
        if let Some(token) = self.intercept(doc, refs, value)? {
            return Ok(token);
        }
        let token = match value {
            Value::Undefined => JsonValue::String(tags::UNDEFINED.to_owned()),
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Number(n) => number(*n),
            Value::BigInt(n) => JsonValue::String(format!("{}{}{n}", tags::SIGIL, tags::BIGINT)),
            Value::Str(s) => JsonValue::String(tags::text_token(s)),
            Value::Symbol(name) => {
                JsonValue::String(format!("{}{}{name}", tags::SIGIL, tags::SYMBOL))
            }
            Value::Date(date) => {
                let iso = date
                    .as_ref()
                    .map(|d| d.to_rfc3339_opts(SecondsFormat::Millis, true))
                    .unwrap_or_default();
                JsonValue::String(format!("{}{}{iso}", tags::SIGIL, tags::DATE))
            }
            Value::Node(node) => return self.node(doc, refs, *node),
        };
        Ok(token)
    }

    fn intercept(
        &mut self,
        doc: &Document,
        refs: &mut RefTable,
        value: &Value,
    ) -> Result<Option<JsonValue>, EncodeError> {
        let id = self.next_id;
        let Some(ext) = self.hook.encode(doc, value, id)? else {
            return Ok(None);
        };
        if ext.name.is_empty() || ext.name.chars().any(char::is_control) {
            return Err(EncodeError::Extension {
                name: ext.name,
                reason: "extension names must be non-empty printable text".to_owned(),
            });
        }
        let id = self.reserve();
        let token = JsonValue::String(tags::extension_token(&ext.name, id));
        if let Value::Node(node) = value {
            refs.insert(*node, token.clone());
        }
        self.put(id, ext.body);
        Ok(Some(token))
    }

    /// Reserves a slot for `node` and registers it before children are walked.
    fn register(&mut self, refs: &mut RefTable, node: NodeId, kind: RefKind) -> (usize, JsonValue) {
        let id = self.reserve();
        let token = JsonValue::String(kind.token(id));
        refs.insert(node, token.clone());
        (id, token)
    }

    fn node(
        &mut self,
        doc: &Document,
        refs: &mut RefTable,
        node: NodeId,
    ) -> Result<JsonValue, EncodeError> {
        let entry = doc
            .get(node)
            .ok_or(EncodeError::DanglingNode(node.index()))?;
        match entry {
            Node::List(items) | Node::Set(items) => {
                let kind = if matches!(entry, Node::List(_)) {
                    RefKind::List
                } else {
                    RefKind::Set
                };
                let (id, token) = self.register(refs, node, kind);
                let body = items
                    .iter()
                    .map(|item| self.value(doc, refs, item))
                    .collect::<Result<Vec<_>, _>>()?;
                self.put(id, JsonValue::Array(body));
                Ok(token)
            }
            Node::Map(entries) => {
                let (id, token) = self.register(refs, node, RefKind::Map);
                let mut body = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = self.value(doc, refs, key)?;
                    let value = self.value(doc, refs, value)?;
                    body.push(JsonValue::Array(vec![key, value]));
                }
                self.put(id, JsonValue::Array(body));
                Ok(token)
            }
            Node::Record(fields) => {
                let (id, token) = self.register(refs, node, RefKind::Record);
                let mut body = Map::with_capacity(fields.len());
                for (key, value) in fields {
                    body.insert(key.clone(), self.value(doc, refs, value)?);
                }
                self.put(id, JsonValue::Object(body));
                Ok(token)
            }
            Node::Error { name, message } => {
                let (id, token) = self.register(refs, node, RefKind::Error);
                let mut body = Map::new();
                body.insert("name".to_owned(), JsonValue::String(name.clone()));
                body.insert("message".to_owned(), JsonValue::String(message.clone()));
                self.put(id, JsonValue::Object(body));
                Ok(token)
            }
            Node::Buffer(buffer) => {
                let (id, token) = self.register(refs, node, RefKind::Buffer(buffer.kind));
                self.put(id, JsonValue::String(to_base64(&buffer.bytes)));
                Ok(token)
            }
            Node::Form(form) => {
                let (id, token) = self.register(refs, node, RefKind::Form);
                let mut body = Vec::with_capacity(form.entries.len());
                for (field, entry) in &form.entries {
                    let entry = match entry {
                        FormEntry::Text(text) => JsonValue::String(tags::text_token(text)),
                        FormEntry::Binary(bytes) => {
                            let part = self.reserve();
                            self.put(part, JsonValue::String(to_base64(bytes)));
                            JsonValue::String(RefKind::Buffer(BufferKind::Raw).token(part))
                        }
                    };
                    body.push(JsonValue::Array(vec![JsonValue::String(field.clone()), entry]));
                }
                self.put(id, JsonValue::Array(body));
                Ok(token)
            }
            Node::Deferred(deferred) => self.deferred(refs, node, deferred),
            Node::Sequence(sequence) => self.sequence(refs, node, sequence),
            Node::Host(host) => Err(EncodeError::Unsupported(host.type_name.clone())),
        }
    }

    fn deferred(
        &mut self,
        refs: &mut RefTable,
        node: NodeId,
        deferred: &Deferred,
    ) -> Result<JsonValue, EncodeError> {
        let key = deferred.key();
        let seen = self
            .handles
            .deferred
            .get(&key)
            .or_else(|| self.new_deferred.get(&key));
        if let Some((_, id)) = seen {
            let token = JsonValue::String(RefKind::Deferred.token(*id));
            refs.insert(node, token.clone());
            return Ok(token);
        }
        let (id, token) = self.register(refs, node, RefKind::Deferred);
        self.new_deferred.insert(key, (deferred.clone(), id));
        match deferred.settlement() {
            Some(settlement) => {
                let body = self.settlement(&settlement)?;
                self.put(id, body);
            }
            None => self.out.deferred.push((id, deferred.clone())),
        }
        Ok(token)
    }

    fn sequence(
        &mut self,
        refs: &mut RefTable,
        node: NodeId,
        sequence: &Sequence,
    ) -> Result<JsonValue, EncodeError> {
        let key = sequence.key();
        let seen = self
            .handles
            .sequences
            .get(&key)
            .or_else(|| self.new_sequences.get(&key));
        if let Some((_, id)) = seen {
            let token = JsonValue::String(RefKind::Sequence.token(*id));
            refs.insert(node, token.clone());
            return Ok(token);
        }
        let (id, token) = self.register(refs, node, RefKind::Sequence);
        if sequence.is_consumed() {
            return Err(EncodeError::SequenceConsumed(id));
        }
        self.new_sequences.insert(key, (sequence.clone(), id));
        self.out.sequences.push((id, sequence.clone()));
        Ok(token)
    }
}

fn number(n: f64) -> JsonValue {
    if n.is_nan() {
        return JsonValue::String(tags::NAN.to_owned());
    }
    if n.is_infinite() {
        let token = if n > 0.0 {
            tags::POSITIVE_INFINITY
        } else {
            tags::NEGATIVE_INFINITY
        };
        return JsonValue::String(token.to_owned());
    }
    if n == 0.0 && n.is_sign_negative() {
        return JsonValue::String(tags::NEGATIVE_ZERO.to_owned());
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return JsonValue::from(n as i64);
    }
    JsonValue::from(n)
}
