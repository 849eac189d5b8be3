//! Live driver for the session state machine

use super::{evaluate, GateInputs, SessionKind, SessionState};
use crate::context::ClientContext;
use crate::descriptor::CollectionPath;
use crate::error::{ClientError, Result};
use crate::identity::{AuthState, IdentityProvider};
use crate::record::UserProfile;
use crate::routes::{RouteClass, RouteClassifier};
use crate::subscription::{DocSubscription, SubscriptionError, SubscriptionResult};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Performs client-side navigation.
pub trait Navigator: Send + Sync {
    fn redirect(&self, to: &str);
}

impl<F> Navigator for F
where
    F: Fn(&str) + Send + Sync,
{
    fn redirect(&self, to: &str) {
        self(to)
    }
}

/// Keeps the gate inputs live for one client.
///
/// Owns the subscription to the viewer's profile record, bound only on
/// protected routes and rebound whenever the identity changes. Each redirect
/// is issued once per entry into a redirect state on a given route;
/// re-evaluating with unchanged inputs never navigates again.
pub struct SessionGate<P = UserProfile> {
    identity: Arc<dyn IdentityProvider>,
    routes: Arc<dyn RouteClassifier>,
    navigator: Arc<dyn Navigator>,
    profiles: CollectionPath,
    home_route: String,
    login_route: String,
    profile: DocSubscription<P>,
    auth_rx: watch::Receiver<AuthState>,
    profile_rx: watch::Receiver<SubscriptionResult<Option<P>>>,
    route: String,
    state: SessionState<P>,
    redirected: Option<(SessionKind, String)>,
}

impl<P> SessionGate<P>
where
    P: DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Gate for a client currently showing `route`. Starts in
    /// [`SessionState::Loading`]; call [`SessionGate::refresh`] to evaluate.
    pub fn new(ctx: &ClientContext, navigator: Arc<dyn Navigator>, route: impl Into<String>) -> Self {
        let identity = ctx.identity();
        let auth_rx = identity.watch();
        let profile = ctx.doc_subscription::<P>();
        let profile_rx = profile.watch();
        let config = ctx.config();
        Self {
            identity,
            routes: ctx.routes(),
            navigator,
            profiles: config.profiles(),
            home_route: config.home_route.clone(),
            login_route: config.login_route.clone(),
            profile,
            auth_rx,
            profile_rx,
            route: route.into(),
            state: SessionState::Loading,
            redirected: None,
        }
    }

    pub fn state(&self) -> &SessionState<P> {
        &self.state
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    /// The client moved to `route`.
    pub fn navigate(&mut self, route: impl Into<String>) -> &SessionState<P> {
        self.route = route.into();
        self.refresh()
    }

    /// Re-evaluate against the latest identity and profile.
    pub fn refresh(&mut self) -> &SessionState<P> {
        let auth = self.auth_rx.borrow_and_update().clone();
        let route = self.routes.classify(&self.route);
        // Public routes never show the profile; nothing is read for them.
        let doc = match (&auth.identity, auth.loading, route) {
            (Some(identity), false, RouteClass::Protected) => Some(self.profiles.doc(&identity.uid)),
            _ => None,
        };
        self.profile.bind(doc);

        let result = self.profile_rx.borrow_and_update().clone();
        let next = evaluate(&GateInputs {
            auth: &auth,
            route,
            profile: &result,
            profile_key: self.profile.target().map(|doc| doc.id()),
        });
        self.enter(next);
        &self.state
    }

    /// Last error of the profile subscription, including a transient one the
    /// gate reports as [`SessionState::Loading`].
    pub fn profile_error(&self) -> Option<SubscriptionError> {
        self.profile.error()
    }

    /// Reopen the profile subscription after a failure and re-evaluate.
    pub fn retry_profile(&mut self) -> &SessionState<P> {
        if self.profile.retry() {
            info!(route = %self.route, "Retrying profile subscription");
        }
        self.refresh()
    }

    fn enter(&mut self, next: SessionState<P>) {
        let from = self.state.kind();
        let to = next.kind();
        self.state = next;
        if from != to {
            info!(from = %from, to = %to, route = %self.route, "Session state changed");
        }
        let target = match to {
            SessionKind::RedirectingToHome => self.home_route.clone(),
            SessionKind::RedirectingToLogin => self.login_route.clone(),
            _ => {
                self.redirected = None;
                return;
            }
        };
        // One redirect per (state, route) entry.
        let entry = (to, self.route.clone());
        if self.redirected.as_ref() == Some(&entry) {
            return;
        }
        debug!(from = %self.route, to = %target, "Redirecting");
        self.redirected = Some(entry);
        self.navigator.redirect(&target);
    }

    /// Wait until the identity or the profile changes.
    pub async fn changed(&mut self) -> Result<()> {
        tokio::select! {
            r = self.auth_rx.changed() => {
                r.map_err(|_| ClientError::Identity("identity provider closed".into()))
            }
            r = self.profile_rx.changed() => {
                r.map_err(|_| ClientError::Identity("profile subscription closed".into()))
            }
        }
    }

    /// Wait for the next change and re-evaluate.
    pub async fn next(&mut self) -> Result<&SessionState<P>> {
        self.changed().await?;
        Ok(self.refresh())
    }

    /// Recovery offered while the profile is missing: sign out so the visitor
    /// lands on the login route and can try again.
    pub async fn sign_out_and_retry(&mut self) -> Result<&SessionState<P>> {
        if self.state.kind() != SessionKind::ProfileMissing {
            return Err(ClientError::Identity(format!(
                "sign out and retry is only offered when the profile is missing (state: {})",
                self.state.kind()
            )));
        }
        info!(route = %self.route, "Signing out after missing profile");
        self.identity.sign_out().await?;
        Ok(self.refresh())
    }
}

impl<P> std::fmt::Debug for SessionGate<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGate")
            .field("route", &self.route)
            .field("state", &self.state.kind())
            .finish_non_exhaustive()
    }
}
