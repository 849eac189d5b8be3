//! Remote store boundary
//!
//! The store owns point lookups, queries, and push subscriptions. This crate
//! only wraps its subscription primitive: open a listener for a descriptor,
//! receive a full snapshot on every change, receive at most one terminal
//! error, and detach through the returned [`ListenerRegistration`].

#[cfg(feature = "memory-store")]
mod memory;

#[cfg(feature = "memory-store")]
pub use memory::MemoryStore;

use crate::descriptor::{DocRef, Query};
use crate::error::StoreError;
use crate::record::{Document, Fields};
use std::sync::Arc;

/// Current state of one record. `fields` is `None` when the record does not exist.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub id: String,
    pub path: String,
    pub fields: Option<Fields>,
}

impl DocumentSnapshot {
    pub fn exists(&self) -> bool {
        self.fields.is_some()
    }

    pub fn document(&self) -> Option<Document> {
        self.fields
            .as_ref()
            .map(|fields| Document::new(self.id.clone(), self.path.clone(), fields.clone()))
    }
}

/// Full current result of a query, in the query's order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySnapshot {
    pub docs: Vec<Document>,
}

impl QuerySnapshot {
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

pub type DocumentCallback = Arc<dyn Fn(DocumentSnapshot) + Send + Sync>;
pub type QueryCallback = Arc<dyn Fn(QuerySnapshot) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(StoreError) + Send + Sync>;

/// The push-subscription primitive of the remote store.
///
/// Implementations may deliver callbacks on any thread and at any time after
/// `subscribe_*` returns, including (racily) after the registration was
/// removed; subscribers must tolerate late callbacks.
pub trait RemoteStore: Send + Sync {
    fn subscribe_document(
        &self,
        doc: &DocRef,
        on_snapshot: DocumentCallback,
        on_error: ErrorCallback,
    ) -> ListenerRegistration;

    fn subscribe_query(
        &self,
        query: &Query,
        on_snapshot: QueryCallback,
        on_error: ErrorCallback,
    ) -> ListenerRegistration;
}

/// Handle to an open store listener. Removing it (explicitly or by drop)
/// synchronously detaches the listener from the store.
#[must_use = "dropping a registration detaches the listener"]
pub struct ListenerRegistration {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerRegistration {
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// Registration with nothing to detach.
    pub fn noop() -> Self {
        Self { detach: None }
    }

    pub fn remove(mut self) {
        self.detach_now();
    }

    fn detach_now(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.detach_now();
    }
}

impl std::fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}
