//! Descriptor-to-listener binding shared by both hook kinds

use super::{SubscriptionError, SubscriptionResult};
use crate::descriptor::{FilterOrder, Operation, Target};
use crate::error::StoreError;
use crate::store::ListenerRegistration;
use crate::surface::ErrorSurface;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;
use tracing::{debug, error, trace};

/// Shared between the binding and the store callbacks. `generation` names the
/// only subscription allowed to write; anything else is a late callback.
struct Slot<V> {
    generation: u64,
    tx: watch::Sender<SubscriptionResult<V>>,
}

fn lock<V>(slot: &Mutex<Slot<V>>) -> MutexGuard<'_, Slot<V>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Write handle given to the store callbacks of one subscription.
pub(crate) struct Sink<V> {
    slot: Weak<Mutex<Slot<V>>>,
    generation: u64,
    surface: ErrorSurface,
    path: String,
    operation: Operation,
}

impl<V: Send + Sync + 'static> Sink<V> {
    /// Apply `f` if this subscription is still the current one.
    fn with_current(&self, f: impl FnOnce(&mut Slot<V>)) -> bool {
        let Some(slot) = self.slot.upgrade() else {
            trace!(path = %self.path, "Push after teardown ignored");
            return false;
        };
        let mut slot = lock(&slot);
        if slot.generation != self.generation {
            trace!(path = %self.path, "Push for closed subscription ignored");
            return false;
        }
        f(&mut *slot);
        true
    }

    pub(crate) fn settle(&self, value: V) {
        self.with_current(|slot| {
            trace!(path = %self.path, "Subscription settled");
            slot.tx.send_replace(SubscriptionResult::Settled(value));
        });
    }

    /// Non-terminal failure: the listener stays open and a later push may settle again.
    pub(crate) fn reject(&self, message: String) {
        self.with_current(|slot| {
            error!(path = %self.path, error = %message, "Failed to decode pushed record");
            slot.tx.send_replace(SubscriptionResult::Failed(SubscriptionError::Decode {
                path: self.path.clone(),
                message,
            }));
        });
    }

    /// Terminal failure reported by the store.
    pub(crate) fn fail(&self, error: StoreError) {
        let failure = SubscriptionError::from_store(error, &self.path, self.operation);
        let applied = self.with_current(|slot| {
            error!(
                path = %self.path,
                operation = %self.operation,
                error = %failure,
                "Subscription failed"
            );
            // Nothing written for this generation after a terminal error.
            slot.generation += 1;
            slot.tx.send_replace(SubscriptionResult::Failed(failure.clone()));
        });
        // Published outside the slot lock: listeners may read the subscription.
        if applied {
            if let SubscriptionError::PermissionDenied(denied) = failure {
                self.surface.publish(denied);
            }
        }
    }
}

/// Holds the current descriptor and its single open listener.
pub(crate) struct Binding<D: Target, V> {
    slot: Arc<Mutex<Slot<V>>>,
    rx: watch::Receiver<SubscriptionResult<V>>,
    target: Option<D>,
    registration: Option<ListenerRegistration>,
    policy: FilterOrder,
    surface: ErrorSurface,
}

impl<D: Target, V: Clone + Send + Sync + 'static> Binding<D, V> {
    pub(crate) fn new(surface: ErrorSurface, policy: FilterOrder) -> Self {
        let (tx, rx) = watch::channel(SubscriptionResult::Idle);
        Self {
            slot: Arc::new(Mutex::new(Slot { generation: 0, tx })),
            rx,
            target: None,
            registration: None,
            policy,
            surface,
        }
    }

    pub(crate) fn target(&self) -> Option<&D> {
        self.target.as_ref()
    }

    pub(crate) fn result(&self) -> SubscriptionResult<V> {
        self.rx.borrow().clone()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<SubscriptionResult<V>> {
        self.rx.clone()
    }

    /// Point the binding at `target`. Returns true if a listener was closed or
    /// opened; an equal descriptor changes nothing.
    pub(crate) fn bind(
        &mut self,
        target: Option<D>,
        open: impl FnOnce(&D, Arc<Sink<V>>) -> ListenerRegistration,
    ) -> bool {
        match target {
            None => {
                if self.target.is_none() && self.registration.is_none() {
                    return false;
                }
                self.close();
                self.target = None;
                lock(&self.slot).tx.send_replace(SubscriptionResult::Idle);
                true
            }
            Some(next) => {
                if let Some(current) = &self.target {
                    if current.same_target(&next, self.policy) {
                        trace!(path = %next.path(), "Equal descriptor, keeping subscription");
                        return false;
                    }
                }
                self.open(next, open);
                true
            }
        }
    }

    /// Reopen the current descriptor after a failure. Returns false when there
    /// is nothing to retry.
    pub(crate) fn retry(&mut self, open: impl FnOnce(&D, Arc<Sink<V>>) -> ListenerRegistration) -> bool {
        if !matches!(*self.rx.borrow(), SubscriptionResult::Failed(_)) {
            return false;
        }
        let Some(target) = self.target.take() else {
            return false;
        };
        debug!(path = %target.path(), "Retrying subscription");
        self.open(target, open);
        true
    }

    fn open(&mut self, target: D, open: impl FnOnce(&D, Arc<Sink<V>>) -> ListenerRegistration) {
        // The old listener is detached before the new one exists.
        self.close();
        let generation = {
            let mut slot = lock(&self.slot);
            slot.generation += 1;
            slot.tx.send_if_modified(|state| {
                if matches!(state, SubscriptionResult::Pending) {
                    false
                } else {
                    *state = SubscriptionResult::Pending;
                    true
                }
            });
            slot.generation
        };
        let sink = Arc::new(Sink {
            slot: Arc::downgrade(&self.slot),
            generation,
            surface: self.surface.clone(),
            path: target.path(),
            operation: target.operation(),
        });
        debug!(path = %sink.path, operation = %sink.operation, "Opening subscription");
        self.registration = Some(open(&target, sink));
        self.target = Some(target);
    }

    fn close(&mut self) {
        lock(&self.slot).generation += 1;
        if let Some(registration) = self.registration.take() {
            if let Some(target) = &self.target {
                debug!(path = %target.path(), "Closing subscription");
            }
            registration.remove();
        }
    }
}

impl<D: Target, V> Drop for Binding<D, V> {
    fn drop(&mut self) {
        lock(&self.slot).generation += 1;
        if let Some(registration) = self.registration.take() {
            registration.remove();
        }
    }
}
