//! Asynchronous sequences of documents.

use std::fmt;
use std::sync::{Arc, Mutex};

use futures::stream::{self, BoxStream, Stream, StreamExt};

use crate::channel::Channel;
use crate::value::{Document, Node};

/// Shareable handle to a one-shot stream of [`Document`]s.
///
/// Clones refer to the same underlying stream. Whoever calls
/// [`take`](Sequence::take) first owns the items; later calls get `None`.
#[derive(Clone)]
pub struct Sequence {
    source: Arc<Mutex<Option<BoxStream<'static, Document>>>>,
}

impl Sequence {
    pub fn from_stream<S>(source: S) -> Self
    where
        S: Stream<Item = Document> + Send + 'static,
    {
        Self {
            source: Arc::new(Mutex::new(Some(source.boxed()))),
        }
    }

    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Document>,
        I::IntoIter: Send + 'static,
    {
        Self::from_stream(stream::iter(items))
    }

    /// A sequence fed by `channel` until it is closed.
    pub fn from_channel(channel: Channel<Document>) -> Self {
        Self::from_stream(channel.into_stream())
    }

    /// Takes ownership of the item stream.
    pub fn take(&self) -> Option<BoxStream<'static, Document>> {
        self.source
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    pub fn is_consumed(&self) -> bool {
        self.source
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }

    /// Drains the remaining items.
    pub async fn collect(&self) -> Vec<Document> {
        match self.take() {
            Some(items) => items.collect().await,
            None => Vec::new(),
        }
    }

    pub(crate) fn key(&self) -> usize {
        Arc::as_ptr(&self.source) as *const () as usize
    }

    pub fn same(&self, other: &Sequence) -> bool {
        Arc::ptr_eq(&self.source, &other.source)
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence")
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

impl From<Sequence> for Node {
    fn from(sequence: Sequence) -> Self {
        Node::Sequence(sequence)
    }
}

/// Pulls items from a sequence, splicing nested sequences into the parent
/// item stream in place.
pub(crate) struct FlatCursor {
    stack: Vec<BoxStream<'static, Document>>,
}

impl FlatCursor {
    pub(crate) fn new(source: BoxStream<'static, Document>) -> Self {
        Self {
            stack: vec![source],
        }
    }

    pub(crate) async fn next(&mut self) -> Option<Document> {
        loop {
            let top = self.stack.last_mut()?;
            let Some(doc) = top.next().await else {
                self.stack.pop();
                continue;
            };
            if let Some(Node::Sequence(inner)) = doc.root_node() {
                if let Some(inner) = inner.take() {
                    tracing::trace!("flattening nested sequence");
                    self.stack.push(inner);
                }
                continue;
            }
            return Some(doc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn num(n: f64) -> Document {
        Value::Number(n).into()
    }

    #[tokio::test]
    async fn take_is_one_shot() {
        let seq = Sequence::from_items(vec![num(1.0), num(2.0)]);
        let alias = seq.clone();
        assert_eq!(seq.collect().await.len(), 2);
        assert!(alias.is_consumed());
        assert!(alias.collect().await.is_empty());
    }

    #[tokio::test]
    async fn nested_sequences_are_spliced_in_order() {
        let inner = Sequence::from_items(vec![num(2.0), num(3.0)]);
        let outer = Sequence::from_items(vec![
            num(1.0),
            Document::from_node(Node::Sequence(inner)),
            num(4.0),
        ]);
        let mut cursor = FlatCursor::new(outer.take().unwrap());
        let mut seen = Vec::new();
        while let Some(doc) = cursor.next().await {
            seen.push(doc.root().as_f64().unwrap());
        }
        assert_eq!(seen, vec![1.0, 2.0, 3.0, 4.0]);
    }
}
