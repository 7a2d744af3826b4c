use futures::stream::{self, BoxStream, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::pending::Pending;
use super::CHUNK_SEPARATOR;
use crate::encoder::{Encoded, Encoder};
use crate::error::EncodeError;
use crate::hook::EncodeHook;
use crate::slots::{self, Slots};
use crate::value::Document;

impl<H: EncodeHook> Encoder<H> {
    /// Waits for every deferred value and sequence in `encoded` and returns
    /// one slot array with all of their bodies filled in.
    pub async fn complete(&mut self, mut encoded: Encoded) -> Result<Slots, EncodeError> {
        let mut pending = Pending::default();
        pending.track(&mut encoded);
        let mut out = encoded.slots;
        while let Some(event) = pending.next().await {
            pending.apply(self, event)?.merge_into(&mut out);
        }
        Ok(out)
    }
}

impl<H: EncodeHook + Send + 'static> Encoder<H> {
    /// Encodes `doc` and yields the initial chunk followed by one patch
    /// chunk per settlement, sequence item or sequence completion.
    ///
    /// The stream ends once nothing is pending. An encode failure is
    /// yielded as the last item.
    pub fn into_stream(
        mut self,
        doc: &Document,
    ) -> Result<BoxStream<'static, Result<String, EncodeError>>, EncodeError> {
        let mut encoded = self.encode(doc)?;
        let mut pending = Pending::default();
        pending.track(&mut encoded);
        tracing::debug!(
            slots = encoded.slots.len(),
            pending = !pending.is_empty(),
            "initial chunk"
        );
        let state = StreamState {
            encoder: self,
            pending,
            first: Some(chunk(&encoded.slots)),
            failed: false,
        };
        Ok(stream::unfold(state, |mut state| async move {
            if let Some(first) = state.first.take() {
                return Some((Ok(first), state));
            }
            if state.failed {
                return None;
            }
            let event = state.pending.next().await?;
            match state.pending.apply(&mut state.encoder, event) {
                Ok(patch) => Some((Ok(chunk(&patch.slots)), state)),
                Err(e) => {
                    tracing::warn!(error = %e, "stream encode failed");
                    state.failed = true;
                    Some((Err(e), state))
                }
            }
        })
        .boxed())
    }
}

struct StreamState<H> {
    encoder: Encoder<H>,
    pending: Pending,
    first: Option<String>,
    failed: bool,
}

fn chunk(slots: &Slots) -> String {
    let mut text = slots::stringify(slots);
    text.push_str(CHUNK_SEPARATOR);
    text
}

/// Encodes `doc`, waits for everything pending and returns the complete
/// slot array.
pub async fn encode_complete(doc: &Document) -> Result<Slots, EncodeError> {
    let mut encoder = Encoder::new();
    let encoded = encoder.encode(doc)?;
    encoder.complete(encoded).await
}

/// [`encode_complete`] rendered as slot text.
pub async fn encode_to_string(doc: &Document) -> Result<String, EncodeError> {
    Ok(slots::stringify(&encode_complete(doc).await?))
}

/// Chunked encoding of `doc` with no extension hook.
pub fn encode_stream(
    doc: &Document,
) -> Result<BoxStream<'static, Result<String, EncodeError>>, EncodeError> {
    Encoder::new().into_stream(doc)
}

/// Writes the chunks of `doc` to `writer`, flushing after each one so the
/// initial chunk is on the wire before any deferred value settles.
pub async fn write_stream<W>(doc: &Document, writer: &mut W) -> Result<(), EncodeError>
where
    W: AsyncWrite + Unpin,
{
    let mut chunks = encode_stream(doc)?;
    while let Some(chunk) = chunks.next().await {
        writer.write_all(chunk?.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}
