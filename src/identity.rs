//! Identity provider boundary
//!
//! The authenticated principal is owned by an external provider; this crate
//! only reads it (current value plus a change feed) and asks it to sign out.

use crate::error::{ClientError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

/// An authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Stable id; also the key of the principal's profile record
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Identity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            display_name: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Snapshot of the provider: still resolving, or resolved to a principal or to nobody.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    pub loading: bool,
    pub identity: Option<Identity>,
}

impl AuthState {
    /// Provider has not reported yet.
    pub fn loading() -> Self {
        Self {
            loading: true,
            identity: None,
        }
    }

    pub fn signed_out() -> Self {
        Self {
            loading: false,
            identity: None,
        }
    }

    pub fn signed_in(identity: Identity) -> Self {
        Self {
            loading: false,
            identity: Some(identity),
        }
    }
}

/// Source of the current principal.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn current(&self) -> AuthState;

    /// Receiver that observes every change of [`IdentityProvider::current`].
    fn watch(&self) -> watch::Receiver<AuthState>;

    async fn sign_out(&self) -> Result<()>;
}

/// In-process identity provider driven by the application (or a test).
///
/// Starts in the loading state until [`LocalIdentity::resolve`] or
/// [`LocalIdentity::sign_in`] is called.
#[derive(Debug)]
pub struct LocalIdentity {
    tx: watch::Sender<AuthState>,
}

impl LocalIdentity {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(AuthState::loading());
        Self { tx }
    }

    /// Provider already resolved to `identity`.
    pub fn resolved(identity: Option<Identity>) -> Self {
        let provider = Self::new();
        provider.resolve(identity);
        provider
    }

    /// Finish the initial load.
    pub fn resolve(&self, identity: Option<Identity>) {
        self.tx.send_replace(AuthState {
            loading: false,
            identity,
        });
    }

    pub fn sign_in(&self, identity: Identity) {
        info!(uid = %identity.uid, "Signed in");
        self.tx.send_replace(AuthState::signed_in(identity));
    }
}

impl Default for LocalIdentity {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentity {
    fn current(&self) -> AuthState {
        self.tx.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }

    async fn sign_out(&self) -> Result<()> {
        let state = self.current();
        if state.loading {
            return Err(ClientError::Identity(
                "cannot sign out before the provider has resolved".into(),
            ));
        }
        if let Some(identity) = state.identity {
            info!(uid = %identity.uid, "Signed out");
        }
        self.tx.send_replace(AuthState::signed_out());
        Ok(())
    }
}
