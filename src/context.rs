//! Identity & store accessors
//!
//! [`ClientContext`] is the one place the application hands over its remote
//! store, identity provider and error surface. Everything else (hooks, the
//! session gate) is built from it.

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::identity::{AuthState, IdentityProvider};
use crate::routes::RouteClassifier;
use crate::store::RemoteStore;
use crate::subscription::{CollectionSubscription, DocSubscription};
use crate::surface::ErrorSurface;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Shared handles for one client. Cheap to clone.
#[derive(Clone)]
pub struct ClientContext {
    store: Arc<dyn RemoteStore>,
    identity: Arc<dyn IdentityProvider>,
    routes: Arc<dyn RouteClassifier>,
    errors: ErrorSurface,
    config: ClientConfig,
}

impl ClientContext {
    pub fn builder() -> ClientContextBuilder {
        ClientContextBuilder::default()
    }

    /// Handle to the remote store (read-only, shared by every hook).
    pub fn store(&self) -> Arc<dyn RemoteStore> {
        self.store.clone()
    }

    pub fn identity(&self) -> Arc<dyn IdentityProvider> {
        self.identity.clone()
    }

    /// Current authenticated state.
    pub fn auth_state(&self) -> AuthState {
        self.identity.current()
    }

    pub fn routes(&self) -> Arc<dyn RouteClassifier> {
        self.routes.clone()
    }

    pub fn errors(&self) -> &ErrorSurface {
        &self.errors
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn doc_subscription<T>(&self) -> DocSubscription<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        DocSubscription::new(self.store.clone(), self.errors.clone())
    }

    pub fn collection_subscription<T>(&self) -> CollectionSubscription<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        CollectionSubscription::new(self.store.clone(), self.errors.clone(), self.config.filter_order)
    }
}

impl std::fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientContext")
            .field("config", &self.config)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ClientContext`]. Store and identity provider are required.
#[derive(Default)]
pub struct ClientContextBuilder {
    store: Option<Arc<dyn RemoteStore>>,
    identity: Option<Arc<dyn IdentityProvider>>,
    routes: Option<Arc<dyn RouteClassifier>>,
    errors: Option<ErrorSurface>,
    config: Option<ClientConfig>,
}

impl ClientContextBuilder {
    pub fn store(mut self, store: Arc<dyn RemoteStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Override the route table derived from the config.
    pub fn routes(mut self, routes: Arc<dyn RouteClassifier>) -> Self {
        self.routes = Some(routes);
        self
    }

    pub fn errors(mut self, errors: ErrorSurface) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<ClientContext> {
        let store = self
            .store
            .ok_or_else(|| ClientError::Config("remote store not configured".into()))?;
        let identity = self
            .identity
            .ok_or_else(|| ClientError::Config("identity provider not configured".into()))?;
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let routes = self
            .routes
            .unwrap_or_else(|| Arc::new(config.route_table()) as Arc<dyn RouteClassifier>);
        Ok(ClientContext {
            store,
            identity,
            routes,
            errors: self.errors.unwrap_or_default(),
            config,
        })
    }
}
