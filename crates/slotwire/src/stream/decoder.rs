use std::collections::HashMap;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::task::JoinHandle;

use crate::channel::Channel;
use crate::decoder::{DecodeOptions, Decoder, Items, Placeholder, DEFAULT_MAX_DEPTH};
use crate::deferred::{Deferred, Settlement};
use crate::error::DecodeError;
use crate::hook::DecodeHook;
use crate::slots;
use crate::value::Document;

/// Largest chunk accepted by default.
pub const DEFAULT_MAX_CHUNK_LEN: usize = 64 * 1024 * 1024;

/// What to do with a patch chunk that fails to parse or decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedChunk {
    /// Stop reading; reject and close everything still open.
    #[default]
    Abort,
    /// Log the chunk and keep reading.
    Skip,
}

#[derive(Debug, Clone, Copy)]
pub struct StreamDecodeOptions {
    pub on_malformed: MalformedChunk,
    /// Bytes read for one chunk before the stream fails with
    /// [`DecodeError::ChunkTooLarge`].
    pub max_chunk_len: usize,
    /// Nesting limit applied to the root chunk and to every patch.
    pub max_depth: usize,
}

impl Default for StreamDecodeOptions {
    fn default() -> Self {
        Self {
            on_malformed: MalformedChunk::Abort,
            max_chunk_len: DEFAULT_MAX_CHUNK_LEN,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl StreamDecodeOptions {
    pub fn with_on_malformed(mut self, on_malformed: MalformedChunk) -> Self {
        self.on_malformed = on_malformed;
        self
    }

    pub fn with_max_chunk_len(mut self, max_chunk_len: usize) -> Self {
        self.max_chunk_len = max_chunk_len;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    fn decode_options(&self) -> DecodeOptions {
        DecodeOptions::deferred().with_max_depth(self.max_depth)
    }
}

/// The root value of a stream plus the task that settles its placeholders.
#[derive(Debug)]
pub struct DecodedStream {
    pub value: Document,
    /// Finishes once every placeholder is settled, or with the error that
    /// stopped the stream.
    pub done: JoinHandle<Result<(), DecodeError>>,
}

/// Reads the root chunk from `reader` and returns its value. Remaining
/// chunks are applied by a spawned task as they arrive.
///
/// Must be called within a tokio runtime.
pub async fn decode_stream<R>(
    reader: R,
    options: StreamDecodeOptions,
) -> Result<DecodedStream, DecodeError>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    decode_stream_with_hook(reader, (), options).await
}

/// [`decode_stream`] with an extension hook. The hook moves into the task
/// that applies patches, so extension tokens may appear in any chunk.
pub async fn decode_stream_with_hook<R, H>(
    reader: R,
    hook: H,
    options: StreamDecodeOptions,
) -> Result<DecodedStream, DecodeError>
where
    R: AsyncRead + Unpin + Send + 'static,
    H: DecodeHook + Send + 'static,
{
    let mut chunks = ChunkReader::new(reader, options.max_chunk_len);
    let text = chunks.next().await?.ok_or(DecodeError::UnexpectedEnd)?;
    let mut decoder = Decoder::with_hook(hook, options.decode_options());
    let decoded = decoder.decode(&slots::parse(&text)?)?;
    tracing::debug!(
        placeholders = decoded.placeholders.len(),
        "decoded root chunk"
    );
    let mut open = Open::default();
    open.register(decoded.placeholders);
    let done = tokio::spawn(pump(chunks, decoder, open, options));
    Ok(DecodedStream {
        value: decoded.value,
        done,
    })
}

async fn pump<R, H>(
    mut chunks: ChunkReader<R>,
    mut decoder: Decoder<H>,
    mut open: Open,
    options: StreamDecodeOptions,
) -> Result<(), DecodeError>
where
    R: AsyncRead + Unpin,
    H: DecodeHook,
{
    while !open.is_empty() {
        let text = match chunks.next().await {
            Ok(Some(text)) => text,
            Ok(None) => {
                open.abort("stream ended before every value settled");
                return Err(DecodeError::UnexpectedEnd);
            }
            Err(e) => {
                open.abort(&e.to_string());
                return Err(e);
            }
        };
        if let Err(e) = apply(&mut decoder, &mut open, &text) {
            match options.on_malformed {
                MalformedChunk::Skip => {
                    tracing::warn!(error = %e, "skipping malformed chunk");
                }
                MalformedChunk::Abort => {
                    tracing::warn!(error = %e, "aborting stream on malformed chunk");
                    open.abort(&e.to_string());
                    return Err(e);
                }
            }
        }
    }
    tracing::debug!("all placeholders settled");
    Ok(())
}

/// Applies one patch chunk. The patch is addressed to its lowest written id.
fn apply<H: DecodeHook>(
    decoder: &mut Decoder<H>,
    open: &mut Open,
    text: &str,
) -> Result<(), DecodeError> {
    let patch = slots::parse(text)?;
    let id = patch
        .iter()
        .position(Option::is_some)
        .ok_or_else(|| DecodeError::InvalidDocument {
            offset: 0,
            reason: "patch writes no slot".to_owned(),
        })?;
    if open.deferred.contains_key(&id) {
        let decoded = decoder.decode_settlement(&patch, id)?;
        open.register(decoded.placeholders);
        open.settle(id, decoded.value);
    } else if open.sequences.contains_key(&id) {
        let decoded = decoder.decode_items(&patch, id)?;
        open.register(decoded.placeholders);
        open.push(id, decoded.value);
    } else {
        return Err(DecodeError::UnknownPlaceholder(id));
    }
    Ok(())
}

/// Placeholders still waiting for a patch.
#[derive(Default)]
struct Open {
    deferred: HashMap<usize, Deferred>,
    sequences: HashMap<usize, Channel<Document>>,
}

impl Open {
    fn register(&mut self, placeholders: Vec<(usize, Placeholder)>) {
        for (id, placeholder) in placeholders {
            match placeholder {
                Placeholder::Deferred(deferred) => {
                    self.deferred.insert(id, deferred);
                }
                Placeholder::Sequence(channel) => {
                    self.sequences.insert(id, channel);
                }
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.deferred.is_empty() && self.sequences.is_empty()
    }

    fn settle(&mut self, id: usize, settlement: Settlement) {
        if let Some(deferred) = self.deferred.remove(&id) {
            tracing::debug!(id, status = ?settlement.status(), "placeholder settled");
            deferred.settle(settlement);
        }
    }

    fn push(&mut self, id: usize, items: Items) {
        let Some(channel) = self.sequences.get(&id) else {
            return;
        };
        for item in items.items {
            if channel.send(item).is_err() {
                break;
            }
        }
        if items.done {
            tracing::debug!(id, "sequence closed");
            channel.close();
            self.sequences.remove(&id);
        }
    }

    fn abort(&mut self, reason: &str) {
        for (id, deferred) in self.deferred.drain() {
            tracing::debug!(id, "rejecting unsettled placeholder");
            deferred.reject_with_error("StreamError", reason);
        }
        for (_, channel) in self.sequences.drain() {
            channel.close();
        }
    }
}

/// Splits a byte stream into chunks separated by blank lines.
struct ChunkReader<R> {
    reader: BufReader<R>,
    max_len: usize,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    fn new(reader: R, max_len: usize) -> Self {
        Self {
            reader: BufReader::new(reader),
            max_len,
        }
    }

    /// Next non-empty chunk, or `None` at end of input. A final chunk with
    /// no trailing separator is still returned.
    ///
    /// At most `max_len + 1` bytes of a chunk are ever buffered.
    async fn next(&mut self) -> Result<Option<String>, DecodeError> {
        let mut buf = Vec::new();
        loop {
            let start = buf.len();
            let room = (self.max_len.saturating_add(1) - buf.len()) as u64;
            let n = (&mut self.reader)
                .take(room)
                .read_until(b'\n', &mut buf)
                .await?;
            if buf.len() > self.max_len {
                return Err(DecodeError::ChunkTooLarge(buf.len()));
            }
            let line_is_blank = buf[start..].iter().all(u8::is_ascii_whitespace);
            if n == 0 || line_is_blank {
                if buf.iter().all(u8::is_ascii_whitespace) {
                    if n == 0 {
                        return Ok(None);
                    }
                    buf.clear();
                    continue;
                }
                let text = String::from_utf8(buf).map_err(|_| DecodeError::InvalidUtf8)?;
                return Ok(Some(text.trim().to_owned()));
            }
        }
    }
}
