//! Session gate
//!
//! Decides, from the authentication state, the route classification and the
//! viewer's own profile record, what the client may show. [`evaluate`] is the
//! whole decision as one ordered transition function; [`SessionGate`] keeps
//! its inputs live and performs the redirects.
//!
//! | # | auth loading | identity | route     | profile            | state                    |
//! |---|--------------|----------|-----------|--------------------|--------------------------|
//! | 1 | yes          | any      | any       | any                | `Loading`                |
//! | 2 | no           | none     | protected | any                | `RedirectingToLogin`     |
//! | 3 | no           | none     | public    | any                | `PublicUnauthenticated`  |
//! | 4 | no           | some     | public    | any                | `RedirectingToHome`      |
//! | 5 | no           | some     | protected | idle / pending     | `Loading`                |
//! |   |              |          |           | transient failure  | `Loading`                |
//! | 6 | no           | some     | protected | absent / denied    | `ProfileMissing`         |
//! |   |              |          |           | / undecodable      |                          |
//! | 7 | no           | some     | protected | present            | `ProtectedAuthenticated` |
//!
//! A transient store failure says nothing about whether the profile exists,
//! so it keeps the loader up until [`SessionGate::retry_profile`] reopens the
//! subscription.

mod gate;

pub use gate::{Navigator, SessionGate};

use crate::identity::{AuthState, Identity};
use crate::record::UserProfile;
use crate::routes::RouteClass;
use crate::subscription::{SubscriptionError, SubscriptionResult};

/// What the client may render.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState<P = UserProfile> {
    /// Not enough is known yet; show a loading indicator.
    Loading,
    /// Anonymous visitor on a public route; render it.
    PublicUnauthenticated,
    /// Signed-in principal on a public route; navigating home.
    RedirectingToHome,
    /// Anonymous visitor on a protected route; navigating to login.
    RedirectingToLogin,
    /// Render the app shell and the route. The profile is always present.
    ProtectedAuthenticated { identity: Identity, profile: P },
    /// Signed in, but no usable profile record. Recoverable through an
    /// explicit sign-out-and-retry; never redirected automatically.
    ProfileMissing {
        identity: Identity,
        /// Set when the profile read was denied or the record did not decode
        cause: Option<SubscriptionError>,
    },
}

/// Discriminant of [`SessionState`], for comparisons and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    Loading,
    PublicUnauthenticated,
    RedirectingToHome,
    RedirectingToLogin,
    ProtectedAuthenticated,
    ProfileMissing,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::PublicUnauthenticated => "public-unauthenticated",
            Self::RedirectingToHome => "redirecting-to-home",
            Self::RedirectingToLogin => "redirecting-to-login",
            Self::ProtectedAuthenticated => "protected-authenticated",
            Self::ProfileMissing => "profile-missing",
        }
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl<P> SessionState<P> {
    pub fn kind(&self) -> SessionKind {
        match self {
            Self::Loading => SessionKind::Loading,
            Self::PublicUnauthenticated => SessionKind::PublicUnauthenticated,
            Self::RedirectingToHome => SessionKind::RedirectingToHome,
            Self::RedirectingToLogin => SessionKind::RedirectingToLogin,
            Self::ProtectedAuthenticated { .. } => SessionKind::ProtectedAuthenticated,
            Self::ProfileMissing { .. } => SessionKind::ProfileMissing,
        }
    }

    /// Loading and both redirect states show only a loading indicator.
    pub fn shows_loader(&self) -> bool {
        matches!(
            self,
            Self::Loading | Self::RedirectingToHome | Self::RedirectingToLogin
        )
    }

    /// The route's own content is rendered.
    pub fn renders_route(&self) -> bool {
        matches!(
            self,
            Self::PublicUnauthenticated | Self::ProtectedAuthenticated { .. }
        )
    }

    pub fn profile(&self) -> Option<&P> {
        match self {
            Self::ProtectedAuthenticated { profile, .. } => Some(profile),
            _ => None,
        }
    }
}

/// Everything the gate decides on.
#[derive(Debug, Clone, Copy)]
pub struct GateInputs<'a, P> {
    pub auth: &'a AuthState,
    pub route: RouteClass,
    /// Result of the profile subscription
    pub profile: &'a SubscriptionResult<Option<P>>,
    /// Record id the profile subscription is bound to, if any
    pub profile_key: Option<&'a str>,
}

/// The ordered transition function; first matching row wins.
pub fn evaluate<P: Clone>(inputs: &GateInputs<'_, P>) -> SessionState<P> {
    if inputs.auth.loading {
        return SessionState::Loading;
    }
    let Some(identity) = &inputs.auth.identity else {
        return match inputs.route {
            RouteClass::Protected => SessionState::RedirectingToLogin,
            RouteClass::Public => SessionState::PublicUnauthenticated,
        };
    };
    if inputs.route == RouteClass::Public {
        return SessionState::RedirectingToHome;
    }
    // A result for some other principal's profile counts as not loaded yet.
    if inputs.profile_key != Some(identity.uid.as_str()) {
        return SessionState::Loading;
    }
    match inputs.profile {
        SubscriptionResult::Idle
        | SubscriptionResult::Pending
        | SubscriptionResult::Failed(SubscriptionError::Remote { .. }) => SessionState::Loading,
        SubscriptionResult::Settled(None) => SessionState::ProfileMissing {
            identity: identity.clone(),
            cause: None,
        },
        SubscriptionResult::Failed(error) => SessionState::ProfileMissing {
            identity: identity.clone(),
            cause: Some(error.clone()),
        },
        SubscriptionResult::Settled(Some(profile)) => SessionState::ProtectedAuthenticated {
            identity: identity.clone(),
            profile: profile.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Operation;
    use crate::error::StoreError;
    use crate::surface::AccessDeniedError;

    fn profile(uid: &str) -> UserProfile {
        UserProfile {
            id: uid.to_string(),
            uid: uid.to_string(),
            name: "Sarah Miller".to_string(),
            email: "sarah.m@example.com".to_string(),
            avatar: Default::default(),
            bio: String::new(),
        }
    }

    fn eval(
        auth: AuthState,
        route: RouteClass,
        result: SubscriptionResult<Option<UserProfile>>,
    ) -> SessionState {
        let key = auth.identity.as_ref().map(|i| i.uid.clone());
        evaluate(&GateInputs {
            auth: &auth,
            route,
            profile: &result,
            profile_key: key.as_deref(),
        })
    }

    #[test]
    fn test_auth_loading_wins() {
        for route in [RouteClass::Public, RouteClass::Protected] {
            for result in [
                SubscriptionResult::Idle,
                SubscriptionResult::Pending,
                SubscriptionResult::Settled(None),
                SubscriptionResult::Settled(Some(profile("u1"))),
            ] {
                let auth = AuthState {
                    loading: true,
                    identity: Some(Identity::new("u1")),
                };
                assert_eq!(eval(auth, route, result.clone()), SessionState::Loading);
                assert_eq!(eval(AuthState::loading(), route, result), SessionState::Loading);
            }
        }
    }

    #[test]
    fn test_anonymous_visitor() {
        assert_eq!(
            eval(AuthState::signed_out(), RouteClass::Public, SubscriptionResult::Idle),
            SessionState::PublicUnauthenticated
        );
        assert_eq!(
            eval(AuthState::signed_out(), RouteClass::Protected, SubscriptionResult::Idle),
            SessionState::RedirectingToLogin
        );
    }

    #[test]
    fn test_signed_in_on_public_route_goes_home() {
        let auth = AuthState::signed_in(Identity::new("u1"));
        assert_eq!(
            eval(auth, RouteClass::Public, SubscriptionResult::Settled(Some(profile("u1")))),
            SessionState::RedirectingToHome
        );
    }

    #[test]
    fn test_profile_loading_shows_loader() {
        let auth = AuthState::signed_in(Identity::new("u1"));
        let state = eval(auth, RouteClass::Protected, SubscriptionResult::Pending);
        assert_eq!(state, SessionState::Loading);
        assert!(state.shows_loader());
    }

    #[test]
    fn test_absent_profile_is_missing_not_anonymous() {
        let auth = AuthState::signed_in(Identity::new("u1"));
        let state = eval(auth, RouteClass::Protected, SubscriptionResult::Settled(None));
        assert_eq!(
            state,
            SessionState::ProfileMissing {
                identity: Identity::new("u1"),
                cause: None
            }
        );
        assert!(!state.renders_route());
        assert!(state.profile().is_none());
    }

    #[test]
    fn test_failed_profile_is_missing_with_cause() {
        let auth = AuthState::signed_in(Identity::new("u1"));
        let denied = SubscriptionError::PermissionDenied(AccessDeniedError::new("users/u1", Operation::Get));
        let state = eval(auth, RouteClass::Protected, SubscriptionResult::Failed(denied.clone()));
        assert_eq!(
            state,
            SessionState::ProfileMissing {
                identity: Identity::new("u1"),
                cause: Some(denied)
            }
        );
    }

    #[test]
    fn test_transient_profile_failure_keeps_loader() {
        let auth = AuthState::signed_in(Identity::new("u1"));
        let unavailable = SubscriptionError::from_store(
            StoreError::unavailable("backend restarting"),
            "users/u1",
            Operation::Get,
        );
        let state = eval(auth, RouteClass::Protected, SubscriptionResult::Failed(unavailable));
        assert_eq!(state, SessionState::Loading);
    }

    #[test]
    fn test_undecodable_profile_is_missing() {
        let auth = AuthState::signed_in(Identity::new("u1"));
        let bad = SubscriptionError::Decode {
            path: "users/u1".into(),
            message: "invalid type: integer `5`, expected a string".into(),
        };
        let state = eval(auth, RouteClass::Protected, SubscriptionResult::Failed(bad));
        assert_eq!(state.kind(), SessionKind::ProfileMissing);
    }

    #[test]
    fn test_present_profile_renders_protected_view() {
        let auth = AuthState::signed_in(Identity::new("u1"));
        let state = eval(auth, RouteClass::Protected, SubscriptionResult::Settled(Some(profile("u1"))));
        assert_eq!(state.kind(), SessionKind::ProtectedAuthenticated);
        assert_eq!(state.profile().unwrap().uid, "u1");
        assert!(state.renders_route());
    }

    #[test]
    fn test_profile_of_another_identity_is_not_trusted() {
        let auth = AuthState::signed_in(Identity::new("u2"));
        let result = SubscriptionResult::Settled(Some(profile("u1")));
        let state = evaluate(&GateInputs {
            auth: &auth,
            route: RouteClass::Protected,
            profile: &result,
            profile_key: Some("u1"),
        });
        assert_eq!(state, SessionState::Loading);
    }
}
