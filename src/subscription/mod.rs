//! Live subscriptions
//!
//! [`DocSubscription`] binds one record address, [`CollectionSubscription`]
//! binds one query. Both turn a descriptor that may be rebuilt at any time
//! into at most one open store listener, and expose the latest
//! [`SubscriptionResult`] both by value and through a `watch` channel.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut profile = ctx.doc_subscription::<UserProfile>();
//! profile.bind(Some(CollectionPath::new("users").doc(uid)));
//!
//! // Rebinding an equal descriptor is free: no resubscribe, no flicker.
//! profile.bind(Some(CollectionPath::new("users").doc(uid)));
//!
//! match profile.result() {
//!     SubscriptionResult::Settled(Some(p)) => render(p),
//!     SubscriptionResult::Settled(None) => render_absent(),
//!     SubscriptionResult::Failed(e) => render_error(e),
//!     _ => spinner(),
//! }
//! ```

mod binding;
mod collection;
mod document;

pub use collection::CollectionSubscription;
pub use document::DocSubscription;

use crate::descriptor::Operation;
use crate::error::StoreError;
use crate::surface::AccessDeniedError;
use thiserror::Error;

/// Why a subscription is in the failed state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubscriptionError {
    /// Terminal; also published on the error surface.
    #[error(transparent)]
    PermissionDenied(AccessDeniedError),

    /// Terminal for this subscription; the caller may retry.
    #[error("Remote error on {path}: {source}")]
    Remote {
        path: String,
        #[source]
        source: StoreError,
    },

    /// A pushed record did not match the requested type. Cleared by the next
    /// push that decodes.
    #[error("Failed to decode {path}: {message}")]
    Decode { path: String, message: String },
}

impl SubscriptionError {
    /// Classify a terminal store error for the subscription at `path`.
    pub fn from_store(error: StoreError, path: &str, operation: Operation) -> Self {
        if error.is_permission_denied() {
            Self::PermissionDenied(AccessDeniedError::new(path, operation))
        } else {
            Self::Remote {
                path: path.to_string(),
                source: error,
            }
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}

/// Latest state of one subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionResult<V> {
    /// No descriptor bound; nothing is being fetched.
    Idle,
    /// Waiting for the first push of the current descriptor.
    Pending,
    /// Last push from the store.
    Settled(V),
    /// The subscription failed; no further pushes will arrive.
    Failed(SubscriptionError),
}

impl<V> SubscriptionResult<V> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Settled(_))
    }

    pub fn value(&self) -> Option<&V> {
        match self {
            Self::Settled(v) => Some(v),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&SubscriptionError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<V> {
        match self {
            Self::Settled(v) => Some(v),
            _ => None,
        }
    }
}

impl<V> Default for SubscriptionResult<V> {
    fn default() -> Self {
        Self::Idle
    }
}
