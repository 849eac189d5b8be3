//! Connect Hub SDK - live records and session gating
//!
//! Client-side core of Connect Hub: keeps screen state consistent with a
//! remote document store that pushes full snapshots, and decides on every
//! navigation whether the viewer may see protected content.
//!
//! # Architecture
//!
//! - **Descriptors**: structural addresses of a record or a query; two
//!   descriptors built independently with the same content are equal
//! - **Subscriptions**: one live listener per hook, rebound only when the
//!   descriptor really changes, torn down on drop
//! - **Error surface**: injectable pub/sub registry for access-denied events
//! - **Session gate**: explicit state machine over identity, route and profile
//!
//! # Example
//!
//! ```rust,ignore
//! use connect_hub_sdk::{ClientContext, CollectionPath, Direction, Query, SessionGate};
//!
//! let ctx = ClientContext::builder()
//!     .store(store)
//!     .identity(identity)
//!     .build()?;
//!
//! let _diagnostics = ctx.errors().attach_logger();
//!
//! // Newest listings, kept live
//! let mut listings = ctx.collection_subscription::<Listing>();
//! listings.bind(Some(Query::new(CollectionPath::new("listings")).order_by("createdAt", Direction::Desc)));
//!
//! // Gate for the current route
//! let mut gate: SessionGate = SessionGate::new(&ctx, navigator, "/marketplace");
//! while let Ok(state) = gate.next().await {
//!     render(state);
//! }
//! ```

// Subscription descriptors and structural equality
pub mod descriptor;

// Remote store boundary
pub mod store;

// Record shapes
pub mod record;

// Live single- and multi-record hooks
pub mod subscription;

// Access-denied pub/sub
pub mod surface;

// Identity provider boundary
pub mod identity;

// Public/protected route classification
pub mod routes;

// Session gate state machine
pub mod session;

// Identity & store accessors
pub mod context;

// Configuration
pub mod config;

// Error types
pub mod error;

// Re-export descriptor types
pub use descriptor::{
    descriptors_equal, CollectionPath, Descriptor, Direction, DocRef, Filter, FilterOp, FilterOrder,
    Operation, OrderBy, Query, Target,
};

// Re-export store types
pub use store::{DocumentSnapshot, ListenerRegistration, QuerySnapshot, RemoteStore};
#[cfg(feature = "memory-store")]
pub use store::MemoryStore;

pub use record::{Document, Fields, ImageRef, Record, UserProfile};

// Re-export subscription types
pub use subscription::{CollectionSubscription, DocSubscription, SubscriptionError, SubscriptionResult};

pub use surface::{AccessDeniedError, Detach, ErrorSurface, PERMISSION_ERROR_EVENT};

pub use identity::{AuthState, Identity, IdentityProvider, LocalIdentity};

pub use routes::{RouteClass, RouteClassifier, RouteTable};

// Re-export session types
pub use session::{evaluate, GateInputs, Navigator, SessionGate, SessionKind, SessionState};

pub use context::{ClientContext, ClientContextBuilder};

pub use config::ClientConfig;

// Re-export error types
pub use error::{ClientError, ErrorCode, Result, StoreError};
