//! Settle-once future with external `resolve`/`reject` and a synchronously
//! readable status.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::value::{Document, Node};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredStatus {
    Pending,
    Resolved,
    Rejected,
}

/// The outcome a [`Deferred`] settled with.
#[derive(Debug, Clone)]
pub enum Settlement {
    Resolved(Document),
    Rejected(Document),
}

impl Settlement {
    pub fn status(&self) -> DeferredStatus {
        match self {
            Settlement::Resolved(_) => DeferredStatus::Resolved,
            Settlement::Rejected(_) => DeferredStatus::Rejected,
        }
    }

    pub fn document(&self) -> &Document {
        match self {
            Settlement::Resolved(doc) | Settlement::Rejected(doc) => doc,
        }
    }

    pub fn into_result(self) -> Result<Document, Document> {
        match self {
            Settlement::Resolved(doc) => Ok(doc),
            Settlement::Rejected(doc) => Err(doc),
        }
    }
}

/// Shareable handle to a value that becomes available later.
///
/// Clones observe the same settlement. The first call to [`resolve`] or
/// [`reject`] wins; later calls return `false` and change nothing.
///
/// [`resolve`]: Deferred::resolve
/// [`reject`]: Deferred::reject
#[derive(Clone)]
pub struct Deferred {
    state: Arc<watch::Sender<Option<Settlement>>>,
}

impl Default for Deferred {
    fn default() -> Self {
        Self::new()
    }
}

impl Deferred {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            state: Arc::new(tx),
        }
    }

    pub fn resolved(doc: Document) -> Self {
        let deferred = Self::new();
        deferred.resolve(doc);
        deferred
    }

    pub fn rejected(reason: Document) -> Self {
        let deferred = Self::new();
        deferred.reject(reason);
        deferred
    }

    pub fn resolve(&self, doc: Document) -> bool {
        self.settle(Settlement::Resolved(doc))
    }

    pub fn reject(&self, reason: Document) -> bool {
        self.settle(Settlement::Rejected(reason))
    }

    /// Rejects with a single error node.
    pub fn reject_with_error(&self, name: &str, message: impl Into<String>) -> bool {
        self.reject(Document::from_node(Node::Error {
            name: name.to_owned(),
            message: message.into(),
        }))
    }

    pub fn settle(&self, settlement: Settlement) -> bool {
        let mut slot = Some(settlement);
        self.state.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = slot.take();
            true
        })
    }

    pub fn status(&self) -> DeferredStatus {
        match &*self.state.borrow() {
            None => DeferredStatus::Pending,
            Some(settlement) => settlement.status(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status() == DeferredStatus::Pending
    }

    /// Snapshot of the settlement, if any.
    pub fn settlement(&self) -> Option<Settlement> {
        (*self.state.borrow()).clone()
    }

    /// Waits for settlement. Returns immediately when already settled.
    pub async fn settled(&self) -> Settlement {
        let mut rx = self.state.subscribe();
        loop {
            if let Some(settlement) = (*rx.borrow_and_update()).clone() {
                return settlement;
            }
            // The sender lives in `self`, so `changed` cannot observe a
            // closed channel while we wait.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Waits for settlement and returns the resolved document or the
    /// rejection reason.
    pub async fn wait(&self) -> Result<Document, Document> {
        self.settled().await.into_result()
    }

    /// Identity of the underlying shared state.
    pub(crate) fn key(&self) -> usize {
        Arc::as_ptr(&self.state) as *const () as usize
    }

    pub fn same(&self, other: &Deferred) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("status", &self.status())
            .finish()
    }
}

impl From<Deferred> for Node {
    fn from(deferred: Deferred) -> Self {
        Node::Deferred(deferred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn settles_at_most_once() {
        let deferred = Deferred::new();
        assert_eq!(deferred.status(), DeferredStatus::Pending);
        assert!(deferred.resolve(Value::Number(1.0).into()));
        assert!(!deferred.resolve(Value::Number(2.0).into()));
        assert!(!deferred.reject_with_error("Error", "late"));
        assert_eq!(deferred.status(), DeferredStatus::Resolved);
        let doc = deferred.settlement().unwrap().into_result().unwrap();
        assert_eq!(doc.root(), &Value::Number(1.0));
    }

    #[tokio::test]
    async fn waiters_wake_on_settlement() {
        let deferred = Deferred::new();
        let waiter = {
            let deferred = deferred.clone();
            tokio::spawn(async move { deferred.wait().await })
        };
        tokio::task::yield_now().await;
        deferred.reject_with_error("Error", "boom");
        let reason = waiter.await.unwrap().unwrap_err();
        assert!(matches!(reason.root_node(), Some(Node::Error { message, .. }) if message == "boom"));
    }

    #[tokio::test]
    async fn already_settled_returns_immediately() {
        let deferred = Deferred::resolved(Value::Bool(true).into());
        let doc = deferred.wait().await.unwrap();
        assert_eq!(doc.root(), &Value::Bool(true));
    }
}
