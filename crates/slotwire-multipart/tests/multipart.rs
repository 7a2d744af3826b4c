use slotwire::{deep_equal, Buffer, BufferKind, Deferred, Document, Form, FormEntry, Node, Value};
use slotwire_multipart::{decode_multipart, encode_multipart, MultipartError, Part, Payload};

fn upload_document(blob: &[u8]) -> Document {
    let mut form = Form::new();
    form.append("title", FormEntry::Text("quarterly".to_owned()));
    form.append("attachment", FormEntry::Binary(blob.to_vec()));

    let mut doc = Document::new();
    let rec = doc.record();
    let form = doc.insert(Node::Form(form));
    doc.set_field(rec, "kind", "upload");
    doc.set_field(rec, "body", form);
    doc.set_root(rec);
    doc
}

fn form_field<'a>(doc: &'a Document, field: &str) -> &'a Form {
    let root = doc.root().as_node().expect("root must be a node");
    let node = doc
        .field(root, field)
        .and_then(Value::as_node)
        .expect("field must be a node");
    match doc.get(node) {
        Some(Node::Form(form)) => form,
        other => panic!("expected form, got {other:?}"),
    }
}

#[tokio::test]
async fn nested_form_with_binary_part_round_trips() {
    let blob: Vec<u8> = (0..=255u8).chain([0, 0, 10, 13]).collect();
    let doc = upload_document(&blob);

    let payload = encode_multipart(&doc).await.expect("encode must succeed");
    assert_eq!(
        payload.get("0").and_then(Part::as_text),
        Some("\"$o1\"")
    );
    assert_eq!(
        payload.get("2_attachment").and_then(Part::as_binary).map(|b| &b[..]),
        Some(blob.as_slice())
    );

    let back = decode_multipart(&payload).expect("decode must succeed");
    assert!(deep_equal(&doc, &back));

    let form = form_field(&back, "body");
    assert_eq!(form.get("title"), Some(&FormEntry::Text("quarterly".to_owned())));
    match form.get("attachment") {
        Some(FormEntry::Binary(bytes)) => {
            assert_eq!(bytes.len(), blob.len());
            assert_eq!(bytes, &blob);
        }
        other => panic!("expected binary entry, got {other:?}"),
    }
}

#[tokio::test]
async fn buffers_travel_as_raw_parts() {
    let mut doc = Document::new();
    let shared = doc.insert(Node::Buffer(Buffer::from_f64s(&[1.0, 2.5])));
    let list = doc.list(vec![Value::Node(shared), Value::Node(shared)]);
    doc.set_root(list);

    let payload = encode_multipart(&doc).await.expect("encode must succeed");
    assert_eq!(
        payload.get("1").and_then(Part::as_text),
        Some(r#"["$_buffer_2","$_buffer_2"]"#)
    );
    assert_eq!(payload.get("2").and_then(Part::as_text), Some("\"d\""));
    assert_eq!(payload.get_all("2_file").count(), 1);

    let back = decode_multipart(&payload).expect("decode must succeed");
    assert!(deep_equal(&doc, &back));
    match back.root_node() {
        Some(Node::List(items)) => assert_eq!(items[0], items[1]),
        other => panic!("expected list, got {other:?}"),
    }
}

#[tokio::test]
async fn repeated_form_fields_keep_their_order() {
    let mut form = Form::new();
    form.append("tag", FormEntry::Text("a".to_owned()));
    form.append("tag", FormEntry::Binary(vec![1, 2]));
    form.append("tag", FormEntry::Text("c".to_owned()));
    let doc = Document::from_node(Node::Form(form.clone()));

    let payload = encode_multipart(&doc).await.expect("encode must succeed");
    let back = decode_multipart(&payload).expect("decode must succeed");
    match back.root_node() {
        Some(Node::Form(got)) => assert_eq!(got, &form),
        other => panic!("expected form, got {other:?}"),
    }
}

#[tokio::test]
async fn settled_deferred_contents_are_routed_too() {
    let later = Deferred::new();
    let doc = Document::from_node(Node::Deferred(later.clone()));
    later.resolve(Document::from_node(Node::Buffer(Buffer {
        kind: BufferKind::U16,
        bytes: vec![1, 0, 2, 0],
    })));

    let payload = encode_multipart(&doc).await.expect("encode must succeed");
    assert!(payload.get("2_file").is_some());
    let back = decode_multipart(&payload).expect("decode must succeed");
    assert!(deep_equal(&doc, &back));
}

#[test]
fn missing_root_part() {
    let mut payload = Payload::new();
    payload.append("1", Part::Text("[]".to_owned()));
    assert!(matches!(
        decode_multipart(&payload),
        Err(MultipartError::MissingRoot)
    ));
}

#[test]
fn missing_binary_part_is_reported() {
    let mut payload = Payload::new();
    payload.append("0", Part::Text("\"$_buffer_1\"".to_owned()));
    payload.append("1", Part::Text("\"r\"".to_owned()));
    assert!(matches!(
        decode_multipart(&payload),
        Err(MultipartError::Decode(_))
    ));
}
