mod common;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use serde_json::{json, Value as JsonValue};
use slotwire::{
    decode, decode_str, deep_equal, encode, same_number, BigInt, Buffer, BufferKind, DecodeError,
    DecodeHook, DecodeOptions, Decoder, Deferred, Document, EncodeError, EncodeHook, Encoder,
    Extension, Form, FormEntry, Node, Slots, Value,
};

use common::{point, point_at, PointReader, PointWriter};

fn round_trip(doc: &Document) -> Document {
    let encoded = encode(doc).expect("encode must succeed");
    assert!(encoded.is_complete(), "fixture must not leave pending values");
    let text = slotwire::slots::stringify(&encoded.slots);
    decode_str(&text).expect("decode must succeed")
}

#[test]
fn self_referencing_record_decodes_to_one_instance() {
    let mut doc = Document::new();
    let rec = doc.record();
    doc.set_field(rec, "value", 23.0);
    doc.set_field(rec, "self", rec);
    doc.set_root(rec);

    let encoded = encode(&doc).expect("encode must succeed");
    assert_eq!(
        encoded.slots,
        vec![Some(json!("$o1")), Some(json!({"value": 23, "self": "$o1"}))]
    );

    let back = decode(&encoded.slots).expect("decode must succeed");
    let root = back.root().as_node().expect("root must be a node");
    assert_eq!(back.field(root, "self"), Some(&Value::Node(root)));
    assert_eq!(back.len(), 1);
}

#[test]
fn shared_subgraph_decodes_to_one_instance() {
    let mut doc = Document::new();
    let shared = doc.record();
    doc.set_field(shared, "n", 1.0);
    let left = doc.list(vec![Value::Node(shared)]);
    let right = doc.insert(Node::Set(vec![Value::Node(shared)]));
    let root = doc.record();
    doc.set_field(root, "left", left);
    doc.set_field(root, "right", right);
    doc.set_root(root);

    let back = round_trip(&doc);
    assert!(deep_equal(&doc, &back));

    let root = back.root().as_node().expect("root must be a node");
    let first = match back.get(back.field(root, "left").and_then(Value::as_node).expect("left")) {
        Some(Node::List(items)) => items[0].clone(),
        other => panic!("expected list, got {other:?}"),
    };
    let second = match back.get(back.field(root, "right").and_then(Value::as_node).expect("right")) {
        Some(Node::Set(items)) => items[0].clone(),
        other => panic!("expected set, got {other:?}"),
    };
    assert_eq!(first, second);
}

#[test]
fn literal_edge_cases() {
    let big = BigInt::parse("9007199254740993123456789").expect("digits must parse");
    let mut doc = Document::new();
    let list = doc.list(vec![
        Value::Number(f64::NAN),
        Value::Number(f64::INFINITY),
        Value::Number(f64::NEG_INFINITY),
        Value::Number(-0.0),
        Value::BigInt(big.clone()),
        Value::Number(9_007_199_254_740_993.0),
        Value::str("$u"),
        Value::Undefined,
        Value::Null,
        Value::Date(None),
        Value::Date(Some(Utc.with_ymd_and_hms(2024, 2, 29, 12, 30, 0).unwrap())),
    ]);
    doc.set_root(list);

    let encoded = encode(&doc).expect("encode must succeed");
    assert_eq!(
        encoded.slots[1],
        Some(json!([
            "$NaN",
            "$Infinity",
            "$-Infinity",
            "$-0",
            "$n9007199254740993123456789",
            9_007_199_254_740_992.0,
            "$$u",
            "$u",
            null,
            "$D",
            "$D2024-02-29T12:30:00.000Z"
        ]))
    );

    let back = decode(&encoded.slots).expect("decode must succeed");
    assert!(deep_equal(&doc, &back));
    let items = match back.root_node() {
        Some(Node::List(items)) => items.clone(),
        other => panic!("expected list, got {other:?}"),
    };
    assert_eq!(items[4], Value::BigInt(big));
    assert!(same_number(items[3].as_f64().expect("number"), -0.0));
}

#[test]
fn sparse_list_keeps_its_length() {
    let mut items = vec![Value::Undefined; 6];
    items[1] = Value::str("one");
    items[4] = Value::Number(4.0);
    let mut doc = Document::new();
    let list = doc.list(items);
    doc.set_root(list);

    let encoded = encode(&doc).expect("encode must succeed");
    assert_eq!(
        encoded.slots[1],
        Some(json!(["$u", "one", "$u", "$u", 4, "$u"]))
    );
    let back = round_trip(&doc);
    match back.root_node() {
        Some(Node::List(items)) => {
            assert_eq!(items.len(), 6);
            assert_eq!(items[1], Value::str("one"));
            assert_eq!(items[4], Value::Number(4.0));
            assert_eq!(items[5], Value::Undefined);
        }
        other => panic!("expected list, got {other:?}"),
    }
}

#[test]
fn resolved_deferred_matches_wrapped_data() {
    let mut payload = Document::new();
    let rec = payload.record();
    payload.set_field(rec, "ok", true);
    payload.set_root(rec);

    let deferred = Deferred::resolved(payload.clone());
    let encoded = encode(&Document::from_node(Node::Deferred(deferred))).expect("encode must succeed");
    assert!(encoded.is_complete());
    assert_eq!(
        encoded.slots,
        vec![Some(json!("$P1")), Some(json!("$o2")), Some(json!({"ok": true}))]
    );

    let back = decode(&encoded.slots).expect("decode must succeed");
    let settled = match back.root_node() {
        Some(Node::Deferred(d)) => d.settlement().expect("must be settled"),
        other => panic!("expected deferred, got {other:?}"),
    };
    assert!(deep_equal(settled.document(), &payload));
}

#[test]
fn typed_buffers_and_forms() {
    let mut doc = Document::new();
    let mut form = Form::new();
    form.append("name", FormEntry::Text("report".to_owned()));
    form.append("file", FormEntry::Binary(vec![0, 159, 146, 150]));
    let form = doc.insert(Node::Form(form));
    let floats = doc.insert(Node::Buffer(Buffer::from_f64s(&[0.5, -2.0])));
    let bytes = doc.insert(Node::Buffer(Buffer {
        kind: BufferKind::U8Clamped,
        bytes: vec![255, 0, 7],
    }));
    let root = doc.list(vec![Value::Node(form), Value::Node(floats), Value::Node(bytes)]);
    doc.set_root(root);

    let encoded = encode(&doc).expect("encode must succeed");
    assert_eq!(encoded.slots[1], Some(json!(["$F2", "$bd4", "$bK5"])));
    assert_eq!(
        encoded.slots[2],
        Some(json!([["name", "report"], ["file", "$br3"]]))
    );

    let back = decode(&encoded.slots).expect("decode must succeed");
    assert!(deep_equal(&doc, &back));
}

#[test]
fn unknown_marker_is_rejected() {
    assert!(matches!(
        decode_str(r#"["$Q1"]"#),
        Err(slotwire::DecodeError::UnknownTag(_))
    ));
}

fn points_record() -> Document {
    let mut doc = Document::new();
    let rec = doc.record();
    let shared = point(&mut doc, 1, 2);
    let other = point(&mut doc, 3, 4);
    doc.set_field(rec, "a", shared.clone());
    doc.set_field(rec, "b", shared);
    doc.set_field(rec, "c", other);
    doc.set_root(rec);
    doc
}

fn field_points(doc: &Document) -> Vec<(Value, Option<(i64, i64)>)> {
    let root = doc.root().as_node().expect("root must be a node");
    ["a", "b", "c"]
        .iter()
        .map(|name| {
            let value = doc.field(root, name).cloned().expect("field must exist");
            let xy = point_at(doc, &value);
            (value, xy)
        })
        .collect()
}

#[test]
fn extension_pair_round_trips_shared_nodes() {
    let doc = points_record();
    let encoded = Encoder::with_hook(PointWriter)
        .encode(&doc)
        .expect("encode must succeed");
    assert_eq!(
        encoded.slots,
        vec![
            Some(json!("$o1")),
            Some(json!({"a": "$_pt_2", "b": "$_pt_2", "c": "$_pt_3"})),
            Some(json!([1, 2])),
            Some(json!([3, 4])),
        ]
    );

    let text = slotwire::slots::stringify(&encoded.slots);
    let slots = slotwire::slots::parse(&text).expect("slot text must parse");
    let back = Decoder::with_hook(PointReader, DecodeOptions::default())
        .decode(&slots)
        .expect("decode must succeed")
        .value;
    let fields = field_points(&back);
    assert_eq!(fields[0].1, Some((1, 2)));
    assert_eq!(fields[2].1, Some((3, 4)));
    assert_eq!(fields[0].0, fields[1].0, "shared point must decode to one node");
    assert_ne!(fields[0].0, fields[2].0);
}

#[test]
fn extension_tokens_need_a_decode_hook() {
    let encoded = Encoder::with_hook(PointWriter)
        .encode(&points_record())
        .expect("encode must succeed");
    assert!(matches!(
        decode(&encoded.slots),
        Err(DecodeError::UnknownTag(tag)) if tag == "$_pt_2"
    ));
}

#[test]
fn hook_chains_try_each_hook_in_order() {
    let writers: Vec<Box<dyn EncodeHook + Send>> = vec![Box::new(()), Box::new(PointWriter)];
    let encoded = Encoder::with_hook(writers)
        .encode(&points_record())
        .expect("encode must succeed");
    assert_eq!(encoded.slots[2], Some(json!([1, 2])));

    let readers: Vec<Box<dyn DecodeHook + Send>> = vec![Box::new(()), Box::new(PointReader)];
    let back = Decoder::with_hook(readers, DecodeOptions::default())
        .decode(&encoded.slots)
        .expect("decode must succeed")
        .value;
    let fields = field_points(&back);
    assert_eq!(fields[1].1, Some((1, 2)));
    assert_eq!(fields[0].0, fields[1].0);
}

struct Nameless;

impl EncodeHook for Nameless {
    fn encode(
        &mut self,
        _: &Document,
        value: &Value,
        _: usize,
    ) -> Result<Option<Extension>, EncodeError> {
        Ok(matches!(value, Value::Bool(_)).then(|| Extension::new("", JsonValue::Null)))
    }
}

#[test]
fn extension_with_empty_name_is_refused() {
    let mut doc = Document::new();
    let list = doc.list(vec![Value::Number(1.0), Value::Bool(true)]);
    doc.set_root(list);

    let mut encoder = Encoder::with_hook(Nameless);
    let err = encoder.encode(&doc).expect_err("empty name must be refused");
    assert!(matches!(err, EncodeError::Extension { name, .. } if name.is_empty()));
    assert_eq!(encoder.next_id(), 1);
}

fn list_chain(len: usize) -> Slots {
    let mut slots = vec![Some(json!("$a1"))];
    slots.extend((1..len).map(|i| Some(json!([format!("$a{}", i + 1)]))));
    slots.push(Some(json!([])));
    slots
}

#[test]
fn deep_reference_chain_is_an_error() {
    let err = decode(&list_chain(100_000)).expect_err("deep chain must be refused");
    assert!(matches!(err, DecodeError::TooDeep(_)));

    let back = decode(&list_chain(50)).expect("shallow chain must decode");
    assert_eq!(back.len(), 50);
}

#[test]
fn deep_document_is_refused_by_the_encoder() {
    let mut doc = Document::new();
    let mut inner = doc.list(vec![]);
    for _ in 0..100_000 {
        inner = doc.list(vec![Value::Node(inner)]);
    }
    doc.set_root(inner);
    assert!(matches!(encode(&doc), Err(EncodeError::TooDeep(_))));
}

proptest! {
    #[test]
    fn numbers_round_trip(n in any::<f64>()) {
        let back = round_trip(&Document::from_value(Value::Number(n)));
        let got = back.root().as_f64().expect("number");
        prop_assert!(same_number(n, got), "{n} decoded as {got}");
    }

    #[test]
    fn text_round_trips(s in ".*") {
        let back = round_trip(&Document::from_value(Value::str(s.clone())));
        prop_assert_eq!(back.root(), &Value::Str(s));
    }

    #[test]
    fn bigints_round_trip(n in any::<i128>()) {
        let back = round_trip(&Document::from_value(Value::BigInt(BigInt::from(n))));
        prop_assert_eq!(back.root(), &Value::BigInt(BigInt::from(n)));
    }
}
