//! Error surface
//!
//! Process-wide, fire-and-forget channel for access-denied errors raised deep
//! in the subscription layer. A diagnostics overlay (or the logger from
//! [`ErrorSurface::attach_logger`]) attaches once and sees every denial
//! without each call site wiring its own handler.
//!
//! The surface is an explicit value: the application builds one and hands it
//! to its [`ClientContext`](crate::context::ClientContext); tests build their
//! own isolated instances.

use crate::descriptor::Operation;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use thiserror::Error;
use tracing::{debug, warn};

/// Name of the single event published on the surface.
pub const PERMISSION_ERROR_EVENT: &str = "permission-error";

/// A subscription was refused because the identity may not read the resource.
#[derive(Error, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[error("Missing or insufficient permissions: {operation} on {path}")]
pub struct AccessDeniedError {
    /// Record path (`users/u1`) or collection path (`conversations`)
    pub path: String,
    pub operation: Operation,
}

impl AccessDeniedError {
    pub fn new(path: impl Into<String>, operation: Operation) -> Self {
        Self {
            path: path.into(),
            operation,
        }
    }

    pub fn event_name(&self) -> &'static str {
        PERMISSION_ERROR_EVENT
    }
}

type Handler = Arc<dyn Fn(&AccessDeniedError) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: Vec<(u64, Handler)>,
}

/// Registry of access-denied listeners.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct ErrorSurface {
    registry: Arc<Mutex<Registry>>,
}

impl ErrorSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver `event` to every handler attached when the publish started.
    ///
    /// Handlers run outside the registry lock, so they may attach or detach
    /// (themselves or others) without skipping or repeating anyone in this
    /// round. A panicking handler is logged and the rest still run.
    pub fn publish(&self, event: AccessDeniedError) {
        let handlers: Vec<Handler> = self.lock().handlers.iter().map(|(_, h)| h.clone()).collect();
        debug!(
            event = PERMISSION_ERROR_EVENT,
            path = %event.path,
            operation = %event.operation,
            listeners = handlers.len(),
            "Publishing access-denied error"
        );
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                warn!(path = %event.path, "Error surface listener panicked");
            }
        }
    }

    /// Attach a handler. It stays attached until the returned [`Detach`] is
    /// dropped or [`Detach::detach`] is called.
    pub fn subscribe(&self, handler: impl Fn(&AccessDeniedError) + Send + Sync + 'static) -> Detach {
        let mut registry = self.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.handlers.push((id, Arc::new(handler)));
        Detach {
            registry: Arc::downgrade(&self.registry),
            id: Some(id),
        }
    }

    /// Attach a listener that logs every access-denied error.
    pub fn attach_logger(&self) -> Detach {
        self.subscribe(|event| {
            warn!(
                event = PERMISSION_ERROR_EVENT,
                path = %event.path,
                operation = %event.operation,
                "Access denied"
            );
        })
    }

    pub fn listener_count(&self) -> usize {
        self.lock().handlers.len()
    }
}

impl std::fmt::Debug for ErrorSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorSurface")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Disposer returned by [`ErrorSurface::subscribe`].
#[must_use = "dropping the handle detaches the listener"]
pub struct Detach {
    registry: Weak<Mutex<Registry>>,
    id: Option<u64>,
}

impl Detach {
    pub fn detach(mut self) {
        self.detach_now();
    }

    fn detach_now(&mut self) {
        let (Some(id), Some(registry)) = (self.id.take(), self.registry.upgrade()) else {
            return;
        };
        registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .retain(|(handler_id, _)| *handler_id != id);
    }
}

impl Drop for Detach {
    fn drop(&mut self) {
        self.detach_now();
    }
}
