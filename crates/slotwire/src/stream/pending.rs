//! Deferred values and sequence cursors an encoder is still waiting on.

use futures::future::BoxFuture;
use futures::stream::{self, FuturesUnordered, StreamExt};
use serde_json::Value as JsonValue;

use crate::deferred::Settlement;
use crate::encoder::{Encoded, Encoder};
use crate::error::EncodeError;
use crate::hook::EncodeHook;
use crate::sequence::FlatCursor;
use crate::slots::{self, Slots};
use crate::value::Document;

pub(crate) enum Event {
    Settled {
        id: usize,
        settlement: Settlement,
    },
    Item {
        id: usize,
        cursor: FlatCursor,
        item: Option<Document>,
    },
}

/// A sparse slot array addressed to one reserved id.
pub(crate) struct Patch {
    pub(crate) slots: Slots,
    /// Set when the patch carries items for a sequence body.
    pub(crate) sequence: Option<usize>,
}

impl Patch {
    /// Folds this patch into a complete slot array. Sequence items are
    /// appended to the body already there.
    pub(crate) fn merge_into(mut self, target: &mut Slots) {
        if let Some(id) = self.sequence {
            if let Some(Some(JsonValue::Array(items))) = self.slots.get_mut(id).map(Option::take) {
                if target.len() <= id {
                    target.resize(id + 1, None);
                }
                match &mut target[id] {
                    Some(JsonValue::Array(body)) => body.extend(items),
                    slot => *slot = Some(JsonValue::Array(items)),
                }
            }
        }
        slots::merge(target, self.slots);
    }
}

#[derive(Default)]
pub(crate) struct Pending {
    inflight: FuturesUnordered<BoxFuture<'static, Event>>,
}

impl Pending {
    /// Starts waiting on everything `encoded` left unresolved.
    pub(crate) fn track(&mut self, encoded: &mut Encoded) {
        for (id, deferred) in encoded.deferred.drain(..) {
            self.inflight.push(Box::pin(async move {
                let settlement = deferred.settled().await;
                Event::Settled { id, settlement }
            }));
        }
        for (id, sequence) in encoded.sequences.drain(..) {
            let source = sequence.take().unwrap_or_else(|| stream::empty().boxed());
            self.pull(id, FlatCursor::new(source));
        }
    }

    fn pull(&mut self, id: usize, mut cursor: FlatCursor) {
        self.inflight.push(Box::pin(async move {
            let item = cursor.next().await;
            Event::Item { id, cursor, item }
        }));
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }

    /// Next event in completion order, or `None` once nothing is pending.
    pub(crate) async fn next(&mut self) -> Option<Event> {
        self.inflight.next().await
    }

    /// Encodes `event` as a patch and tracks whatever the patch left pending.
    pub(crate) fn apply<H: EncodeHook>(
        &mut self,
        encoder: &mut Encoder<H>,
        event: Event,
    ) -> Result<Patch, EncodeError> {
        let (mut encoded, sequence) = match event {
            Event::Settled { id, settlement } => {
                tracing::debug!(id, status = ?settlement.status(), "deferred settled");
                (encoder.encode_settlement(id, &settlement)?, None)
            }
            Event::Item {
                id,
                cursor,
                item: Some(item),
            } => {
                tracing::trace!(id, "sequence item");
                let encoded = encoder.encode_item(id, Some(&item))?;
                self.pull(id, cursor);
                (encoded, Some(id))
            }
            Event::Item { id, item: None, .. } => {
                tracing::debug!(id, "sequence complete");
                (encoder.encode_item(id, None)?, Some(id))
            }
        };
        self.track(&mut encoded);
        Ok(Patch {
            slots: encoded.slots,
            sequence,
        })
    }
}
