//! Tagged slot-array codec for value graphs with cycles, shared nodes,
//! deferred values and asynchronous sequences.
//!
//! A [`Document`] is encoded into a flat array of JSON tokens ("slots"). Slot
//! 0 holds the root token; every compound value gets its own slot and is
//! referenced by `$`-tagged id tokens, so each node is written once however
//! many times it is reached. See [`tags`] for the token grammar.

mod buffer;
mod channel;
mod decoder;
mod deferred;
mod encoder;
mod equal;
mod error;
mod hook;
mod sequence;
mod value;

pub mod slots;
pub mod stream;
pub mod tags;

pub use buffer::{from_base64, to_base64};
pub use channel::Channel;
pub use decoder::{
    decode, decode_str, DecodeOptions, Decoded, Decoder, Items, Placeholder, DEFAULT_MAX_DEPTH,
};
pub use deferred::{Deferred, DeferredStatus, Settlement};
pub use encoder::{encode, Encoded, Encoder};
pub use equal::{deep_equal, same_number};
pub use error::{ChannelError, DecodeError, EncodeError};
pub use hook::{DecodeHook, EncodeHook, Extension};
pub use sequence::Sequence;
pub use slots::Slots;
pub use stream::{
    decode_stream, decode_stream_with_hook, encode_complete, encode_stream, encode_to_string,
    write_stream, DecodedStream, MalformedChunk, StreamDecodeOptions, DEFAULT_MAX_CHUNK_LEN,
};
pub use value::{
    BigInt, Buffer, BufferKind, Document, Form, FormEntry, HostValue, Node, NodeId, Value,
};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn text_round_trip_of_a_mixed_record() {
        let mut doc = Document::new();
        let rec = doc.record();
        let tags = doc.insert(Node::Set(vec![Value::str("a"), Value::str("$b")]));
        let bytes = doc.insert(Node::Buffer(Buffer::from_i32s(&[1, -2, 3])));
        let failure = doc.insert(Node::Error {
            name: "RangeError".to_owned(),
            message: "too far".to_owned(),
        });
        doc.set_field(rec, "tags", tags);
        doc.set_field(rec, "bytes", bytes);
        doc.set_field(rec, "failure", failure);
        doc.set_field(rec, "big", BigInt::from(i128::MAX));
        doc.set_field(rec, "sym", Value::Symbol("iterator".to_owned()));
        doc.set_root(rec);

        let text = encode_to_string(&doc).await.unwrap();
        let back = decode_str(&text).unwrap();
        assert!(deep_equal(&doc, &back));

        let root = back.root().as_node().unwrap();
        let bytes = back.field(root, "bytes").and_then(Value::as_node).unwrap();
        match back.get(bytes) {
            Some(Node::Buffer(buf)) => assert_eq!(buf.to_i32s(), Some(vec![1, -2, 3])),
            other => panic!("expected buffer, got {other:?}"),
        }
    }

    #[test]
    fn map_keys_may_be_compound() {
        let mut doc = Document::new();
        let key = doc.list(vec![Value::Number(1.0)]);
        let map = doc.insert(Node::Map(vec![(Value::Node(key), Value::Node(key))]));
        doc.set_root(map);
        let encoded = encode(&doc).unwrap();
        assert_eq!(encoded.slots[1], Some(json!([["$a2", "$a2"]])));
        let back = decode(&encoded.slots).unwrap();
        assert!(deep_equal(&doc, &back));
    }
}
