//! Single-record subscription

use super::binding::{Binding, Sink};
use super::{SubscriptionError, SubscriptionResult};
use crate::descriptor::{DocRef, FilterOrder};
use crate::record::Record;
use crate::store::{DocumentSnapshot, ListenerRegistration, RemoteStore};
use crate::surface::ErrorSurface;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::watch;

/// Live view of one record.
///
/// Settles with `Some(record)` (id merged into the fields) while the record
/// exists and with `None` while it does not; absence is not an error.
/// Dropping the subscription detaches its store listener.
pub struct DocSubscription<T = Record> {
    store: Arc<dyn RemoteStore>,
    binding: Binding<DocRef, Option<T>>,
    _record: PhantomData<fn() -> T>,
}

impl<T> DocSubscription<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(store: Arc<dyn RemoteStore>, surface: ErrorSurface) -> Self {
        Self {
            store,
            // Point lookups have no filters; the policy is irrelevant.
            binding: Binding::new(surface, FilterOrder::Sensitive),
            _record: PhantomData,
        }
    }

    /// Bind to `doc`, or to nothing with `None`.
    ///
    /// Returns true if the store listener changed. Binding a descriptor equal
    /// to the current one returns false and leaves the result untouched.
    pub fn bind(&mut self, doc: Option<DocRef>) -> bool {
        let store = &self.store;
        self.binding.bind(doc, |doc, sink| open(store.as_ref(), doc, sink))
    }

    /// Reopen the current record after a failure.
    pub fn retry(&mut self) -> bool {
        let store = &self.store;
        self.binding.retry(|doc, sink| open(store.as_ref(), doc, sink))
    }

    pub fn target(&self) -> Option<&DocRef> {
        self.binding.target()
    }

    pub fn result(&self) -> SubscriptionResult<Option<T>> {
        self.binding.result()
    }

    /// The record, if settled and present.
    pub fn value(&self) -> Option<T> {
        self.result().into_value().flatten()
    }

    pub fn is_loading(&self) -> bool {
        self.result().is_loading()
    }

    pub fn error(&self) -> Option<SubscriptionError> {
        self.result().error().cloned()
    }

    /// Receiver that observes every change of [`DocSubscription::result`].
    pub fn watch(&self) -> watch::Receiver<SubscriptionResult<Option<T>>> {
        self.binding.watch()
    }
}

fn open<T>(store: &dyn RemoteStore, doc: &DocRef, sink: Arc<Sink<Option<T>>>) -> ListenerRegistration
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    let on_snapshot = sink.clone();
    store.subscribe_document(
        doc,
        Arc::new(move |snapshot: DocumentSnapshot| match snapshot.document() {
            None => on_snapshot.settle(None),
            Some(document) => match document.decode::<T>() {
                Ok(record) => on_snapshot.settle(Some(record)),
                Err(e) => on_snapshot.reject(e.to_string()),
            },
        }),
        Arc::new(move |error| sink.fail(error)),
    )
}

#[cfg(all(test, feature = "memory-store"))]
mod tests {
    use super::*;
    use crate::descriptor::{CollectionPath, Operation, Query};
    use crate::error::StoreError;
    use crate::record::UserProfile;
    use crate::store::{DocumentCallback, ErrorCallback, MemoryStore, QueryCallback};
    use crate::surface::AccessDeniedError;
    use serde_json::json;
    use std::sync::Mutex;

    fn users() -> CollectionPath {
        CollectionPath::new("users")
    }

    fn setup() -> (MemoryStore, ErrorSurface, DocSubscription<UserProfile>) {
        let store = MemoryStore::new();
        let surface = ErrorSurface::new();
        let sub = DocSubscription::new(Arc::new(store.clone()), surface.clone());
        (store, surface, sub)
    }

    #[test]
    fn test_pending_then_settled_with_id() {
        let (store, _, mut sub) = setup();
        store.set(&users().doc("u1"), json!({"uid": "u1", "name": "Sarah Miller"}));

        assert_eq!(sub.result(), SubscriptionResult::Idle);
        assert!(sub.bind(Some(users().doc("u1"))));
        assert!(sub.is_loading());

        store.flush();
        let profile = sub.value().unwrap();
        assert_eq!(profile.id, "u1");
        assert_eq!(profile.name, "Sarah Miller");
    }

    #[test]
    fn test_absent_record_settles_as_none() {
        let (store, _, mut sub) = setup();
        sub.bind(Some(users().doc("ghost")));
        store.flush();

        assert_eq!(sub.result(), SubscriptionResult::Settled(None));
        assert!(sub.error().is_none());
    }

    #[test]
    fn test_every_push_resettles() {
        let (store, _, mut sub) = setup();
        sub.bind(Some(users().doc("u1")));
        store.flush();
        assert_eq!(sub.value(), None);

        store.set(&users().doc("u1"), json!({"name": "Sarah"}));
        store.flush();
        assert_eq!(sub.value().unwrap().name, "Sarah");

        store.update(&users().doc("u1"), json!({"name": "Sarah M."}));
        store.flush();
        assert_eq!(sub.value().unwrap().name, "Sarah M.");
    }

    #[test]
    fn test_equal_descriptor_is_a_no_op() {
        let (store, _, mut sub) = setup();
        store.set(&users().doc("u1"), json!({"name": "Sarah"}));
        sub.bind(Some(users().doc("u1")));
        store.flush();

        let mut rx = sub.watch();
        rx.borrow_and_update();
        // Rebuilt from scratch, equal by content only.
        assert!(!sub.bind(Some(DocRef::parse("users/u1").unwrap())));

        assert!(!rx.has_changed().unwrap());
        assert_eq!(store.subscribe_calls(), 1);
        assert_eq!(store.unsubscribe_calls(), 0);
        assert!(sub.result().is_settled());
    }

    #[test]
    fn test_rebind_closes_old_listener_first() {
        let (store, _, mut sub) = setup();
        store.set(&users().doc("u1"), json!({"name": "One"}));
        store.set(&users().doc("u2"), json!({"name": "Two"}));

        sub.bind(Some(users().doc("u1")));
        store.flush();
        sub.bind(Some(users().doc("u2")));
        assert!(sub.is_loading());
        assert_eq!(store.active_listeners(), 1);

        store.flush();
        assert_eq!(sub.value().unwrap().name, "Two");

        // Writes to the old record no longer reach the subscription.
        store.set(&users().doc("u1"), json!({"name": "One again"}));
        store.flush();
        assert_eq!(sub.value().unwrap().name, "Two");
    }

    #[test]
    fn test_unbind_and_drop_detach() {
        let (store, _, mut sub) = setup();
        sub.bind(Some(users().doc("u1")));
        assert!(sub.bind(None));
        assert_eq!(sub.result(), SubscriptionResult::Idle);
        assert_eq!(store.active_listeners(), 0);
        assert!(!sub.bind(None));

        sub.bind(Some(users().doc("u1")));
        drop(sub);
        assert_eq!(store.active_listeners(), 0);
        assert_eq!(store.flush(), 0);
    }

    #[test]
    fn test_permission_denied_publishes_once() {
        let (store, surface, mut sub) = setup();
        store.deny_prefix("users");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _h = surface.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

        sub.bind(Some(users().doc("u1")));
        store.flush();

        assert!(matches!(sub.error(), Some(SubscriptionError::PermissionDenied(_))));
        assert_eq!(sub.value(), None);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![AccessDeniedError::new("users/u1", Operation::Get)]
        );
    }

    #[test]
    fn test_transient_error_is_not_published_and_can_retry() {
        let (store, surface, mut sub) = setup();
        let published = Arc::new(Mutex::new(0));
        let p = published.clone();
        let _h = surface.subscribe(move |_| *p.lock().unwrap() += 1);

        store.set(&users().doc("u1"), json!({"name": "Sarah"}));
        sub.bind(Some(users().doc("u1")));
        store.flush();
        store.fail_listeners("users", StoreError::unavailable("offline"));
        store.flush();

        assert!(matches!(sub.error(), Some(SubscriptionError::Remote { .. })));
        assert_eq!(*published.lock().unwrap(), 0);

        // Re-supplying the same descriptor does not resubscribe; retry does.
        assert!(!sub.bind(Some(users().doc("u1"))));
        assert!(sub.retry());
        assert!(sub.is_loading());
        store.flush();
        assert_eq!(sub.value().unwrap().name, "Sarah");
        assert!(!sub.retry());
    }

    #[test]
    fn test_decode_failure_recovers_on_next_push() {
        let (store, _, mut sub) = setup();
        store.set(&users().doc("u1"), json!({"name": 7}));
        sub.bind(Some(users().doc("u1")));
        store.flush();
        assert!(matches!(sub.error(), Some(SubscriptionError::Decode { .. })));

        store.set(&users().doc("u1"), json!({"name": "Fixed"}));
        store.flush();
        assert_eq!(sub.value().unwrap().name, "Fixed");
    }

    /// Store that hands callbacks back to the test instead of managing them.
    #[derive(Default)]
    struct CapturingStore {
        snapshots: Mutex<Vec<DocumentCallback>>,
        errors: Mutex<Vec<ErrorCallback>>,
    }

    impl RemoteStore for CapturingStore {
        fn subscribe_document(
            &self,
            _doc: &DocRef,
            on_snapshot: DocumentCallback,
            on_error: ErrorCallback,
        ) -> ListenerRegistration {
            self.snapshots.lock().unwrap().push(on_snapshot);
            self.errors.lock().unwrap().push(on_error);
            ListenerRegistration::noop()
        }

        fn subscribe_query(
            &self,
            _query: &Query,
            _on_snapshot: QueryCallback,
            _on_error: ErrorCallback,
        ) -> ListenerRegistration {
            ListenerRegistration::noop()
        }
    }

    fn existing(id: &str, name: &str) -> DocumentSnapshot {
        let fields = match json!({ "name": name }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        DocumentSnapshot {
            id: id.to_string(),
            path: format!("users/{}", id),
            fields: Some(fields),
        }
    }

    #[test]
    fn test_late_callbacks_are_ignored() {
        let store = Arc::new(CapturingStore::default());
        let surface = ErrorSurface::new();
        let mut sub: DocSubscription<UserProfile> = DocSubscription::new(store.clone(), surface.clone());

        sub.bind(Some(users().doc("u1")));
        sub.bind(Some(users().doc("u2")));
        let stale = store.snapshots.lock().unwrap()[0].clone();
        let current = store.snapshots.lock().unwrap()[1].clone();

        stale(existing("u1", "Stale"));
        assert!(sub.is_loading());
        current(existing("u2", "Fresh"));
        assert_eq!(sub.value().unwrap().name, "Fresh");

        // Stale error: not applied, not published.
        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        let _h = surface.subscribe(move |_| *c.lock().unwrap() += 1);
        let stale_error = store.errors.lock().unwrap()[0].clone();
        stale_error(StoreError::permission_denied("late"));
        assert_eq!(*count.lock().unwrap(), 0);
        assert!(sub.result().is_settled());

        // Teardown then push: no write, no panic.
        let rx = sub.watch();
        drop(sub);
        current(existing("u2", "After teardown"));
        assert_eq!(rx.borrow().clone().into_value().flatten().unwrap().name, "Fresh");
    }

    #[test]
    fn test_error_is_terminal_for_the_subscription() {
        let store = Arc::new(CapturingStore::default());
        let mut sub: DocSubscription<UserProfile> = DocSubscription::new(store.clone(), ErrorSurface::new());
        sub.bind(Some(users().doc("u1")));

        let on_error = store.errors.lock().unwrap()[0].clone();
        let on_snapshot = store.snapshots.lock().unwrap()[0].clone();
        on_error(StoreError::unavailable("gone"));
        on_snapshot(existing("u1", "Too late"));

        assert!(sub.error().is_some());
    }
}
