//! In-process remote store
//!
//! Holds records in memory, evaluates queries, enforces simple read rules and
//! pushes snapshots to listeners. Deliveries are queued and only run on
//! [`MemoryStore::flush`], which models one turn of the event loop: a freshly
//! opened subscription stays pending until the next flush, exactly as it
//! would while waiting on the network.

use super::{
    DocumentCallback, DocumentSnapshot, ErrorCallback, ListenerRegistration, QueryCallback,
    QuerySnapshot, RemoteStore,
};
use crate::descriptor::{CollectionPath, Direction, DocRef, FilterOp, Query};
use crate::error::StoreError;
use crate::record::{Document, Fields};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, trace};

enum Listener {
    Document {
        doc: DocRef,
        on_snapshot: DocumentCallback,
        on_error: ErrorCallback,
        last: Option<DocumentSnapshot>,
    },
    Query {
        query: Query,
        on_snapshot: QueryCallback,
        on_error: ErrorCallback,
        last: Option<QuerySnapshot>,
    },
}

impl Listener {
    fn path(&self) -> String {
        match self {
            Listener::Document { doc, .. } => doc.path(),
            Listener::Query { query, .. } => query.collection.as_path(),
        }
    }
}

enum Delivery {
    Document(u64, DocumentSnapshot),
    Query(u64, QuerySnapshot),
    Error(u64, StoreError),
}

#[derive(Default)]
struct State {
    /// collection path -> record id -> fields
    records: BTreeMap<String, BTreeMap<String, Fields>>,
    listeners: BTreeMap<u64, Listener>,
    next_listener: u64,
    denied_prefixes: Vec<String>,
    queue: VecDeque<Delivery>,
    subscribe_calls: usize,
    unsubscribe_calls: usize,
}

impl State {
    fn is_denied(&self, path: &str) -> bool {
        self.denied_prefixes.iter().any(|prefix| path_has_prefix(path, prefix))
    }

    fn document_snapshot(&self, doc: &DocRef) -> DocumentSnapshot {
        let fields = self
            .records
            .get(&doc.parent().as_path())
            .and_then(|records| records.get(doc.id()))
            .cloned();
        DocumentSnapshot {
            id: doc.id().to_string(),
            path: doc.path(),
            fields,
        }
    }

    fn query_snapshot(&self, query: &Query) -> QuerySnapshot {
        let collection = query.collection.as_path();
        let mut docs: Vec<Document> = self
            .records
            .get(&collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|(_, fields)| matches_query(fields, query))
                    .map(|(id, fields)| {
                        Document::new(id.clone(), format!("{}/{}", collection, id), fields.clone())
                    })
                    .collect()
            })
            .unwrap_or_default();

        docs.sort_by(|a, b| compare_documents(a, b, query));
        if let Some(limit) = query.limit {
            docs.truncate(limit as usize);
        }
        QuerySnapshot { docs }
    }

    /// Queue fresh snapshots for every listener whose result changed.
    fn notify(&mut self, changed_collection: &str) {
        let mut deliveries = Vec::new();
        for (id, listener) in self.listeners.iter() {
            match listener {
                Listener::Document { doc, last, .. } if doc.parent().as_path() == changed_collection => {
                    let snapshot = self.document_snapshot(doc);
                    if last.as_ref() != Some(&snapshot) {
                        deliveries.push(Delivery::Document(*id, snapshot));
                    }
                }
                Listener::Query { query, last, .. } if query.collection.as_path() == changed_collection => {
                    let snapshot = self.query_snapshot(query);
                    if last.as_ref() != Some(&snapshot) {
                        deliveries.push(Delivery::Query(*id, snapshot));
                    }
                }
                _ => {}
            }
        }
        for delivery in deliveries {
            self.record_last(&delivery);
            self.queue.push_back(delivery);
        }
    }

    fn record_last(&mut self, delivery: &Delivery) {
        match delivery {
            Delivery::Document(id, snapshot) => {
                if let Some(Listener::Document { last, .. }) = self.listeners.get_mut(id) {
                    *last = Some(snapshot.clone());
                }
            }
            Delivery::Query(id, snapshot) => {
                if let Some(Listener::Query { last, .. }) = self.listeners.get_mut(id) {
                    *last = Some(snapshot.clone());
                }
            }
            Delivery::Error(..) => {}
        }
    }

    fn register(&mut self, listener: Listener) -> u64 {
        self.subscribe_calls += 1;
        self.next_listener += 1;
        let id = self.next_listener;
        let path = listener.path();
        let denied = self.is_denied(&path);
        let first = if denied {
            Delivery::Error(
                id,
                StoreError::permission_denied(format!(
                    "Missing or insufficient permissions for {}",
                    path
                )),
            )
        } else {
            match &listener {
                Listener::Document { doc, .. } => Delivery::Document(id, self.document_snapshot(doc)),
                Listener::Query { query, .. } => Delivery::Query(id, self.query_snapshot(query)),
            }
        };
        self.listeners.insert(id, listener);
        self.record_last(&first);
        self.queue.push_back(first);
        debug!(listener = id, path = %path, denied, "Listener registered");
        id
    }
}

/// In-memory implementation of [`RemoteStore`].
///
/// # Example
///
/// ```rust,ignore
/// let store = MemoryStore::new();
/// let users = CollectionPath::new("users");
/// store.set(&users.doc("u1"), json!({"name": "Sarah"}));
/// store.deny_prefix("conversations");
/// store.flush();
/// ```
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create or replace a record.
    pub fn set(&self, doc: &DocRef, fields: Value) {
        let fields = into_fields(fields);
        let mut state = self.lock();
        let collection = doc.parent().as_path();
        state
            .records
            .entry(collection.clone())
            .or_default()
            .insert(doc.id().to_string(), fields);
        trace!(path = %doc, "Record set");
        state.notify(&collection);
    }

    /// Merge `fields` into an existing record. Returns false if the record does not exist.
    pub fn update(&self, doc: &DocRef, fields: Value) -> bool {
        let patch = into_fields(fields);
        let mut state = self.lock();
        let collection = doc.parent().as_path();
        let Some(existing) = state
            .records
            .get_mut(&collection)
            .and_then(|records| records.get_mut(doc.id()))
        else {
            return false;
        };
        existing.extend(patch);
        trace!(path = %doc, "Record updated");
        state.notify(&collection);
        true
    }

    /// Create a record with a store-assigned id.
    pub fn add(&self, collection: &CollectionPath, fields: Value) -> DocRef {
        let doc = collection.doc(uuid::Uuid::new_v4().simple().to_string());
        self.set(&doc, fields);
        doc
    }

    /// Returns false if the record did not exist.
    pub fn delete(&self, doc: &DocRef) -> bool {
        let mut state = self.lock();
        let collection = doc.parent().as_path();
        let removed = state
            .records
            .get_mut(&collection)
            .and_then(|records| records.remove(doc.id()))
            .is_some();
        if removed {
            trace!(path = %doc, "Record deleted");
            state.notify(&collection);
        }
        removed
    }

    /// Current fields of a record, bypassing listeners and rules.
    pub fn get(&self, doc: &DocRef) -> Option<Fields> {
        self.lock().document_snapshot(doc).fields
    }

    /// Deny reads under `prefix` (a path or path prefix, segment-aligned).
    /// Open listeners under it receive a terminal permission-denied error.
    pub fn deny_prefix(&self, prefix: impl Into<String>) {
        let prefix = prefix.into();
        let mut state = self.lock();
        let affected: Vec<u64> = state
            .listeners
            .iter()
            .filter(|(_, l)| path_has_prefix(&l.path(), &prefix))
            .map(|(id, _)| *id)
            .collect();
        for id in affected {
            state.queue.push_back(Delivery::Error(
                id,
                StoreError::permission_denied(format!("Read access to {} revoked", prefix)),
            ));
        }
        state.denied_prefixes.push(prefix);
    }

    pub fn allow_prefix(&self, prefix: &str) {
        self.lock().denied_prefixes.retain(|p| p != prefix);
    }

    /// Deliver `error` to every open listener under `prefix`.
    pub fn fail_listeners(&self, prefix: &str, error: StoreError) -> usize {
        let mut state = self.lock();
        let affected: Vec<u64> = state
            .listeners
            .iter()
            .filter(|(_, l)| path_has_prefix(&l.path(), prefix))
            .map(|(id, _)| *id)
            .collect();
        for id in &affected {
            state.queue.push_back(Delivery::Error(*id, error.clone()));
        }
        affected.len()
    }

    /// Run queued deliveries until the queue is empty. Callbacks run without
    /// the store lock held, so they may subscribe, unsubscribe, or write.
    /// Returns the number of callbacks invoked.
    pub fn flush(&self) -> usize {
        let mut delivered = 0;
        loop {
            let next = {
                let mut state = self.lock();
                let Some(delivery) = state.queue.pop_front() else {
                    break;
                };
                match delivery {
                    Delivery::Document(id, snapshot) => match state.listeners.get(&id) {
                        Some(Listener::Document { on_snapshot, .. }) => {
                            let cb = on_snapshot.clone();
                            Some(Box::new(move || cb(snapshot)) as Box<dyn FnOnce()>)
                        }
                        _ => None,
                    },
                    Delivery::Query(id, snapshot) => match state.listeners.get(&id) {
                        Some(Listener::Query { on_snapshot, .. }) => {
                            let cb = on_snapshot.clone();
                            Some(Box::new(move || cb(snapshot)) as Box<dyn FnOnce()>)
                        }
                        _ => None,
                    },
                    // Errors are terminal: the listener is dropped from the store.
                    Delivery::Error(id, error) => state.listeners.remove(&id).map(|listener| {
                        let cb = match listener {
                            Listener::Document { on_error, .. } | Listener::Query { on_error, .. } => on_error,
                        };
                        Box::new(move || cb(error)) as Box<dyn FnOnce()>
                    }),
                }
            };
            if let Some(deliver) = next {
                deliver();
                delivered += 1;
            }
        }
        delivered
    }

    pub fn pending_deliveries(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn active_listeners(&self) -> usize {
        self.lock().listeners.len()
    }

    pub fn subscribe_calls(&self) -> usize {
        self.lock().subscribe_calls
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.lock().unsubscribe_calls
    }

    fn registration(&self, id: u64) -> ListenerRegistration {
        let state: Weak<Mutex<State>> = Arc::downgrade(&self.state);
        ListenerRegistration::new(move || {
            if let Some(state) = state.upgrade() {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                state.unsubscribe_calls += 1;
                if state.listeners.remove(&id).is_some() {
                    debug!(listener = id, "Listener removed");
                }
            }
        })
    }
}

impl RemoteStore for MemoryStore {
    fn subscribe_document(
        &self,
        doc: &DocRef,
        on_snapshot: DocumentCallback,
        on_error: ErrorCallback,
    ) -> ListenerRegistration {
        let id = self.lock().register(Listener::Document {
            doc: doc.clone(),
            on_snapshot,
            on_error,
            last: None,
        });
        self.registration(id)
    }

    fn subscribe_query(
        &self,
        query: &Query,
        on_snapshot: QueryCallback,
        on_error: ErrorCallback,
    ) -> ListenerRegistration {
        let id = self.lock().register(Listener::Query {
            query: query.clone(),
            on_snapshot,
            on_error,
            last: None,
        });
        self.registration(id)
    }
}

fn into_fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Fields::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

fn path_has_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_matches('/');
    prefix.is_empty()
        || path == prefix
        || (path.starts_with(prefix) && path[prefix.len()..].starts_with('/'))
}

/// Dotted field lookup: `avatar.url`.
fn field<'a>(fields: &'a Fields, name: &str) -> Option<&'a Value> {
    let mut parts = name.split('.');
    let mut current = fields.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: by type first, then by value.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(a, b)| compare_values(a, b))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(_), Value::Object(_)) => a.to_string().cmp(&b.to_string()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn matches_query(fields: &Fields, query: &Query) -> bool {
    let filters_pass = query.filters.iter().all(|filter| {
        let Some(actual) = field(fields, &filter.field) else {
            return false;
        };
        let expected = &filter.value;
        let same_type = type_rank(actual) == type_rank(expected);
        match filter.op {
            FilterOp::Eq => actual == expected,
            FilterOp::NotEq => actual != expected,
            FilterOp::Lt => same_type && compare_values(actual, expected) == Ordering::Less,
            FilterOp::Le => same_type && compare_values(actual, expected) != Ordering::Greater,
            FilterOp::Gt => same_type && compare_values(actual, expected) == Ordering::Greater,
            FilterOp::Ge => same_type && compare_values(actual, expected) != Ordering::Less,
            FilterOp::ArrayContains => actual
                .as_array()
                .is_some_and(|items| items.contains(expected)),
            FilterOp::In => expected
                .as_array()
                .is_some_and(|options| options.contains(actual)),
        }
    });
    // Records without a sort field never appear in an ordered query.
    filters_pass && query.order_by.iter().all(|o| field(fields, &o.field).is_some())
}

fn compare_documents(a: &Document, b: &Document, query: &Query) -> Ordering {
    for order in &query.order_by {
        let (Some(x), Some(y)) = (field(&a.fields, &order.field), field(&b.fields, &order.field)) else {
            continue;
        };
        let ord = compare_values(x, y);
        let ord = match order.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.id.cmp(&b.id)
}
