//! Unbounded FIFO handoff between producers and one consumer.
//!
//! A `send` goes straight to the oldest waiting `recv` when there is one and
//! is buffered otherwise. Once closed and drained, `recv` yields `None`.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::oneshot;

use crate::error::ChannelError;

struct Inner<T> {
    items: VecDeque<T>,
    receivers: VecDeque<oneshot::Sender<Option<T>>>,
    closed: bool,
}

pub struct Channel<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Channel<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                items: VecDeque::new(),
                receivers: VecDeque::new(),
                closed: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // A poisoned queue still holds consistent data: every critical
        // section below is a handful of non-panicking container ops.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn send(&self, item: T) -> Result<(), ChannelError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(ChannelError::Closed);
        }
        if let Some(item) = hand_off(&mut inner, item) {
            inner.items.push_back(item);
        }
        Ok(())
    }

    /// Next item, or `None` once closed and drained.
    ///
    /// Cancel-safe: if the future is dropped after an item was handed to it,
    /// the item goes back to the front of the queue.
    pub async fn recv(&self) -> Option<T> {
        let rx = {
            let mut inner = self.lock();
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if inner.closed {
                return None;
            }
            let (tx, rx) = oneshot::channel();
            inner.receivers.push_back(tx);
            rx
        };
        let mut waiting = Waiting {
            channel: self,
            rx: Some(rx),
        };
        let item = match waiting.rx.as_mut() {
            Some(rx) => rx.await.unwrap_or(None),
            None => None,
        };
        waiting.rx = None;
        item
    }

    /// Returns an item taken by a cancelled `recv`, ahead of anything
    /// buffered after it.
    fn requeue(&self, item: T) {
        let mut inner = self.lock();
        if let Some(item) = hand_off(&mut inner, item) {
            inner.items.push_front(item);
        }
    }

    /// Marks the end of the item stream. Waiting receivers get `None`;
    /// buffered items stay readable.
    pub fn close(&self) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        for waiter in inner.receivers.drain(..) {
            let _ = waiter.send(None);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of buffered, not yet received items.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Gives `item` to the oldest receiver still waiting, or returns it.
fn hand_off<T>(inner: &mut Inner<T>, mut item: T) -> Option<T> {
    while let Some(waiter) = inner.receivers.pop_front() {
        match waiter.send(Some(item)) {
            Ok(()) => return None,
            // Receiver gave up waiting; hand the item to the next one.
            Err(Some(returned)) => item = returned,
            Err(None) => return None,
        }
    }
    Some(item)
}

/// A `recv` in flight.
struct Waiting<'c, T> {
    channel: &'c Channel<T>,
    rx: Option<oneshot::Receiver<Option<T>>>,
}

impl<T> Drop for Waiting<'_, T> {
    fn drop(&mut self) {
        let Some(mut rx) = self.rx.take() else {
            return;
        };
        rx.close();
        if let Ok(Some(item)) = rx.try_recv() {
            self.channel.requeue(item);
        }
    }
}

impl<T: Send + 'static> Channel<T> {
    /// Repeated `recv` until the terminal `None`.
    pub fn into_stream(self) -> BoxStream<'static, T> {
        stream::unfold(self, |channel| async move {
            let item = channel.recv().await?;
            Some((item, channel))
        })
        .boxed()
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Channel")
            .field("buffered", &inner.items.len())
            .field("waiting", &inner.receivers.len())
            .field("closed", &inner.closed)
            .finish()
    }
}
