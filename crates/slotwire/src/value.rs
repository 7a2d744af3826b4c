//! The value graph that the codec walks: an arena of identity-bearing
//! [`Node`]s plus inline [`Value`]s that point into it.
//!
//! A [`Document`] is one identity scope. Two `Value::Node` handles with the
//! same [`NodeId`] are the same instance; structurally equal nodes at
//! different ids are distinct instances and are encoded separately.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::deferred::Deferred;
use crate::sequence::Sequence;

/// Stable arena index of a [`Node`] inside its [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// An inline value. Anything with identity lives in the arena and is
/// reached through [`Value::Node`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(BigInt),
    Str(String),
    /// An interned, process-wide identifier, compared by name.
    Symbol(String),
    /// `None` is an invalid date.
    Date(Option<DateTime<Utc>>),
    Node(NodeId),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Value::Node(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<BigInt> for Value {
    fn from(n: BigInt) -> Self {
        Value::BigInt(n)
    }
}

impl From<NodeId> for Value {
    fn from(id: NodeId) -> Self {
        Value::Node(id)
    }
}

/// An identity-bearing value stored in a [`Document`] arena.
#[derive(Debug, Clone)]
pub enum Node {
    List(Vec<Value>),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Record(IndexMap<String, Value>),
    Error { name: String, message: String },
    Buffer(Buffer),
    Form(Form),
    Deferred(Deferred),
    Sequence(Sequence),
    /// A host value with no wire mapping of its own (a callable, a handle).
    /// Only an extension hook can encode it.
    Host(HostValue),
}

impl Node {
    /// Short kind name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::List(_) => "list",
            Node::Set(_) => "set",
            Node::Map(_) => "map",
            Node::Record(_) => "record",
            Node::Error { .. } => "error",
            Node::Buffer(_) => "buffer",
            Node::Form(_) => "form",
            Node::Deferred(_) => "deferred",
            Node::Sequence(_) => "sequence",
            Node::Host(_) => "host",
        }
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        Document::from_value(value)
    }
}

/// An arena-backed value graph with a root.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: Value,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: Value::Undefined,
        }
    }

    /// A document whose root is a single inline value.
    pub fn from_value(root: Value) -> Self {
        Self {
            nodes: Vec::new(),
            root,
        }
    }

    /// A document whose root is a single node.
    pub fn from_node(node: Node) -> Self {
        let mut doc = Self::new();
        let id = doc.insert(node);
        doc.root = Value::Node(id);
        doc
    }

    pub fn insert(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn set_root(&mut self, root: impl Into<Value>) {
        self.root = root.into();
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node behind the root, if the root is a node.
    pub fn root_node(&self) -> Option<&Node> {
        self.root.as_node().and_then(|id| self.get(id))
    }

    /// Field lookup on a record node.
    pub fn field(&self, record: NodeId, key: &str) -> Option<&Value> {
        match self.get(record)? {
            Node::Record(fields) => fields.get(key),
            _ => None,
        }
    }

    /// Inserts an empty record and returns its id.
    pub fn record(&mut self) -> NodeId {
        self.insert(Node::Record(IndexMap::new()))
    }

    /// Sets a field on a record node; ignored for other node kinds.
    pub fn set_field(&mut self, record: NodeId, key: impl Into<String>, value: impl Into<Value>) {
        if let Some(Node::Record(fields)) = self.get_mut(record) {
            fields.insert(key.into(), value.into());
        }
    }

    pub fn list(&mut self, items: Vec<Value>) -> NodeId {
        self.insert(Node::List(items))
    }
}

/// Arbitrary-precision integer carried as normalized decimal text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BigInt(String);

impl BigInt {
    /// Parses optional `-` followed by ASCII digits. Leading zeros and
    /// negative zero are normalized away.
    pub fn parse(s: &str) -> Option<Self> {
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let digits = digits.trim_start_matches('0');
        if digits.is_empty() {
            return Some(BigInt("0".to_owned()));
        }
        let text = if negative {
            format!("-{digits}")
        } else {
            digits.to_owned()
        };
        Some(BigInt(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for BigInt {
    fn from(n: i64) -> Self {
        BigInt(n.to_string())
    }
}

impl From<i128> for BigInt {
    fn from(n: i128) -> Self {
        BigInt(n.to_string())
    }
}

impl fmt::Display for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Element interpretation of a binary buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Untyped byte storage.
    Raw,
    /// Untyped view over byte storage.
    View,
    I8,
    U8,
    U8Clamped,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
    I64,
    U64,
}

impl BufferKind {
    pub const ALL: [BufferKind; 13] = [
        BufferKind::Raw,
        BufferKind::View,
        BufferKind::I8,
        BufferKind::U8,
        BufferKind::U8Clamped,
        BufferKind::I16,
        BufferKind::U16,
        BufferKind::I32,
        BufferKind::U32,
        BufferKind::F32,
        BufferKind::F64,
        BufferKind::I64,
        BufferKind::U64,
    ];

    /// Element width in bytes.
    pub fn width(self) -> usize {
        match self {
            BufferKind::Raw
            | BufferKind::View
            | BufferKind::I8
            | BufferKind::U8
            | BufferKind::U8Clamped => 1,
            BufferKind::I16 | BufferKind::U16 => 2,
            BufferKind::I32 | BufferKind::U32 | BufferKind::F32 => 4,
            BufferKind::F64 | BufferKind::I64 | BufferKind::U64 => 8,
        }
    }

    pub fn code(self) -> char {
        match self {
            BufferKind::Raw => 'r',
            BufferKind::View => 'v',
            BufferKind::I8 => 'c',
            BufferKind::U8 => 'C',
            BufferKind::U8Clamped => 'K',
            BufferKind::I16 => 's',
            BufferKind::U16 => 'S',
            BufferKind::I32 => 'l',
            BufferKind::U32 => 'L',
            BufferKind::F32 => 'f',
            BufferKind::F64 => 'd',
            BufferKind::I64 => 'q',
            BufferKind::U64 => 'Q',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        BufferKind::ALL.into_iter().find(|kind| kind.code() == code)
    }
}

/// Binary data with an element kind. Bytes are little-endian.
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer {
    pub kind: BufferKind,
    pub bytes: Vec<u8>,
}

impl Buffer {
    pub fn raw(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: BufferKind::Raw,
            bytes: bytes.into(),
        }
    }

    pub fn from_f64s(values: &[f64]) -> Self {
        Self {
            kind: BufferKind::F64,
            bytes: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    pub fn from_i32s(values: &[i32]) -> Self {
        Self {
            kind: BufferKind::I32,
            bytes: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    /// Number of elements of `kind` width.
    pub fn len(&self) -> usize {
        self.bytes.len() / self.kind.width()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// One entry of a multipart sub-document.
#[derive(Debug, Clone, PartialEq)]
pub enum FormEntry {
    Text(String),
    Binary(Vec<u8>),
}

/// A multipart sub-document: ordered fields, names may repeat.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Form {
    pub entries: Vec<(String, FormEntry)>,
}

impl Form {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, name: impl Into<String>, entry: FormEntry) {
        self.entries.push((name.into(), entry));
    }

    pub fn get(&self, name: &str) -> Option<&FormEntry> {
        self.entries
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, entry)| entry)
    }
}

/// Opaque host payload.
#[derive(Clone)]
pub struct HostValue {
    pub type_name: String,
    pub payload: Arc<dyn Any + Send + Sync>,
}

impl HostValue {
    pub fn new<T: Any + Send + Sync>(type_name: impl Into<String>, payload: T) -> Self {
        Self {
            type_name: type_name.into(),
            payload: Arc::new(payload),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref()
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}
