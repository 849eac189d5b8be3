//! Multi-record subscription

use super::binding::{Binding, Sink};
use super::{SubscriptionError, SubscriptionResult};
use crate::descriptor::{FilterOrder, Query};
use crate::record::Record;
use crate::store::{ListenerRegistration, QuerySnapshot, RemoteStore};
use crate::surface::ErrorSurface;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::watch;

/// Live view of a query result.
///
/// Settles with the records in the query's sort order; no matches is an
/// empty list, a failure is no list at all.
pub struct CollectionSubscription<T = Record> {
    store: Arc<dyn RemoteStore>,
    binding: Binding<Query, Vec<T>>,
    _record: PhantomData<fn() -> T>,
}

impl<T> CollectionSubscription<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(store: Arc<dyn RemoteStore>, surface: ErrorSurface, policy: FilterOrder) -> Self {
        Self {
            store,
            binding: Binding::new(surface, policy),
            _record: PhantomData,
        }
    }

    /// Bind to `query`, or to nothing with `None`.
    ///
    /// Returns true if the store listener changed. A query equal to the
    /// current one (under the configured filter-order policy) returns false.
    pub fn bind(&mut self, query: Option<Query>) -> bool {
        let store = &self.store;
        self.binding.bind(query, |query, sink| open(store.as_ref(), query, sink))
    }

    pub fn retry(&mut self) -> bool {
        let store = &self.store;
        self.binding.retry(|query, sink| open(store.as_ref(), query, sink))
    }

    pub fn target(&self) -> Option<&Query> {
        self.binding.target()
    }

    pub fn result(&self) -> SubscriptionResult<Vec<T>> {
        self.binding.result()
    }

    pub fn values(&self) -> Option<Vec<T>> {
        self.result().into_value()
    }

    pub fn is_loading(&self) -> bool {
        self.result().is_loading()
    }

    pub fn error(&self) -> Option<SubscriptionError> {
        self.result().error().cloned()
    }

    pub fn watch(&self) -> watch::Receiver<SubscriptionResult<Vec<T>>> {
        self.binding.watch()
    }
}

fn open<T>(store: &dyn RemoteStore, query: &Query, sink: Arc<Sink<Vec<T>>>) -> ListenerRegistration
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    let on_snapshot = sink.clone();
    store.subscribe_query(
        query,
        Arc::new(move |snapshot: QuerySnapshot| {
            let decoded: Result<Vec<T>, _> = snapshot.docs.iter().map(|doc| doc.decode::<T>()).collect();
            match decoded {
                Ok(records) => on_snapshot.settle(records),
                Err(e) => on_snapshot.reject(e.to_string()),
            }
        }),
        Arc::new(move |error| sink.fail(error)),
    )
}

#[cfg(all(test, feature = "memory-store"))]
mod tests {
    use super::*;
    use crate::descriptor::{CollectionPath, Direction, Operation};
    use crate::error::StoreError;
    use crate::store::MemoryStore;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct LostFoundItem {
        id: String,
        #[serde(rename = "type")]
        kind: String,
        name: String,
        created_at: i64,
    }

    fn items() -> CollectionPath {
        CollectionPath::new("lostAndFoundItems")
    }

    fn lost() -> Query {
        Query::new(items())
            .where_eq("type", "lost")
            .order_by("createdAt", Direction::Desc)
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.set(&items().doc("a"), json!({"type": "lost", "name": "Keys", "createdAt": 10}));
        store.set(&items().doc("b"), json!({"type": "found", "name": "Wallet", "createdAt": 20}));
        store.set(&items().doc("c"), json!({"type": "lost", "name": "Scarf", "createdAt": 30}));
        store
    }

    fn names(sub: &CollectionSubscription<LostFoundItem>) -> Vec<String> {
        sub.values().unwrap().into_iter().map(|i| i.name).collect()
    }

    #[test]
    fn test_settles_in_sort_order_with_ids() {
        let store = seeded();
        let mut sub = CollectionSubscription::new(Arc::new(store.clone()), ErrorSurface::new(), FilterOrder::Sensitive);
        sub.bind(Some(lost()));
        assert!(sub.is_loading());
        store.flush();

        let values: Vec<LostFoundItem> = sub.values().unwrap();
        assert_eq!(values[0].id, "c");
        assert_eq!(values[0].kind, "lost");
        assert_eq!(values[0].created_at, 30);
        assert_eq!(names(&sub), vec!["Scarf", "Keys"]);

        store.set(&items().doc("d"), json!({"type": "lost", "name": "Umbrella", "createdAt": 40}));
        store.flush();
        assert_eq!(names(&sub), vec!["Umbrella", "Scarf", "Keys"]);
    }

    #[test]
    fn test_no_matches_is_an_empty_list() {
        let store = MemoryStore::new();
        let mut sub: CollectionSubscription<LostFoundItem> =
            CollectionSubscription::new(Arc::new(store.clone()), ErrorSurface::new(), FilterOrder::Sensitive);
        sub.bind(Some(lost()));
        store.flush();

        assert_eq!(sub.result(), SubscriptionResult::Settled(vec![]));
    }

    #[test]
    fn test_rebuilt_query_does_not_resubscribe() {
        let store = seeded();
        let mut sub: CollectionSubscription<LostFoundItem> =
            CollectionSubscription::new(Arc::new(store.clone()), ErrorSurface::new(), FilterOrder::Sensitive);
        sub.bind(Some(lost()));
        store.flush();
        let mut rx = sub.watch();
        rx.borrow_and_update();

        for _ in 0..5 {
            assert!(!sub.bind(Some(lost())));
        }
        assert!(!rx.has_changed().unwrap());
        assert_eq!(store.subscribe_calls(), 1);
        assert_eq!(store.unsubscribe_calls(), 0);
    }

    #[test]
    fn test_filter_order_policy_controls_resubscription() {
        let store = seeded();
        let ab = Query::new(items()).where_eq("type", "lost").where_eq("name", "Keys");
        let ba = Query::new(items()).where_eq("name", "Keys").where_eq("type", "lost");

        let mut strict: CollectionSubscription =
            CollectionSubscription::new(Arc::new(store.clone()), ErrorSurface::new(), FilterOrder::Sensitive);
        strict.bind(Some(ab.clone()));
        assert!(strict.bind(Some(ba.clone())));

        let mut relaxed: CollectionSubscription =
            CollectionSubscription::new(Arc::new(store.clone()), ErrorSurface::new(), FilterOrder::Insensitive);
        relaxed.bind(Some(ab));
        assert!(!relaxed.bind(Some(ba)));
    }

    #[test]
    fn test_at_most_one_listener_across_changes() {
        let store = seeded();
        let mut sub: CollectionSubscription<LostFoundItem> =
            CollectionSubscription::new(Arc::new(store.clone()), ErrorSurface::new(), FilterOrder::Sensitive);

        let sequence = vec![
            Some(lost()),
            Some(lost()),
            Some(Query::new(items()).where_eq("type", "found").order_by("createdAt", Direction::Desc)),
            None,
            Some(lost().limit(1)),
            Some(lost()),
        ];
        for query in sequence {
            sub.bind(query);
            assert!(store.active_listeners() <= 1);
            store.flush();
            assert!(store.active_listeners() <= 1);
        }
        assert_eq!(names(&sub), vec!["Scarf", "Keys"]);
        assert_eq!(store.subscribe_calls() - store.unsubscribe_calls(), 1);
    }

    #[test]
    fn test_permission_denied_yields_no_list_and_one_publish() {
        let store = seeded();
        store.deny_prefix("lostAndFoundItems");
        let surface = ErrorSurface::new();
        let published = Arc::new(Mutex::new(Vec::new()));
        let p = published.clone();
        let _h = surface.subscribe(move |e| p.lock().unwrap().push(e.clone()));

        let mut sub: CollectionSubscription<LostFoundItem> =
            CollectionSubscription::new(Arc::new(store.clone()), surface, FilterOrder::Sensitive);
        sub.bind(Some(lost()));
        store.flush();
        // Re-evaluating with the same query neither retries nor republishes.
        sub.bind(Some(lost()));
        store.flush();

        assert_eq!(sub.values(), None);
        assert!(sub.error().unwrap().is_permission_denied());
        let published = published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].path, "lostAndFoundItems");
        assert_eq!(published[0].operation, Operation::List);
    }

    #[test]
    fn test_revoked_access_fails_open_subscription() {
        let store = seeded();
        let mut sub: CollectionSubscription<LostFoundItem> =
            CollectionSubscription::new(Arc::new(store.clone()), ErrorSurface::new(), FilterOrder::Sensitive);
        sub.bind(Some(lost()));
        store.flush();
        assert!(sub.result().is_settled());

        store.deny_prefix("lostAndFoundItems");
        store.flush();
        assert!(sub.error().unwrap().is_permission_denied());
        assert_eq!(store.active_listeners(), 0);
    }

    #[test]
    fn test_transient_error_then_retry() {
        let store = seeded();
        let mut sub: CollectionSubscription<LostFoundItem> =
            CollectionSubscription::new(Arc::new(store.clone()), ErrorSurface::new(), FilterOrder::Sensitive);
        sub.bind(Some(lost()));
        store.flush();
        store.fail_listeners("lostAndFoundItems", StoreError::unavailable("offline"));
        store.flush();
        assert!(matches!(sub.error(), Some(SubscriptionError::Remote { .. })));

        assert!(sub.retry());
        store.flush();
        assert_eq!(names(&sub), vec!["Scarf", "Keys"]);
    }
}
