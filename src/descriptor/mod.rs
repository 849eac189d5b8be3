//! Subscription descriptors
//!
//! A descriptor says *what* to fetch: one record address or one query.
//! Descriptors are plain values and are expected to be rebuilt freely (on
//! every render pass, every gate refresh); [`descriptors_equal`] decides
//! whether two of them name the same remote subscription by comparing their
//! content, never their identity.

mod path;
mod query;

pub use path::{CollectionPath, DocRef};
pub use query::{Direction, Filter, FilterOp, FilterOrder, OrderBy, Query};

use serde::{Deserialize, Serialize};

/// Kind of read a subscription performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Point read of a single record
    Get,
    /// Query over a collection
    List,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::List => "list",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Either kind of subscription target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Descriptor {
    Document(DocRef),
    Query(Query),
}

impl Descriptor {
    pub fn operation(&self) -> Operation {
        match self {
            Self::Document(_) => Operation::Get,
            Self::Query(_) => Operation::List,
        }
    }

    /// Resource path reported in access-denied errors.
    pub fn path(&self) -> String {
        match self {
            Self::Document(doc) => doc.path(),
            Self::Query(query) => query.collection.as_path(),
        }
    }
}

impl From<DocRef> for Descriptor {
    fn from(doc: DocRef) -> Self {
        Self::Document(doc)
    }
}

impl From<Query> for Descriptor {
    fn from(query: Query) -> Self {
        Self::Query(query)
    }
}

/// A value that can be the target of a live subscription.
pub trait Target: Clone + Send + Sync + 'static {
    /// Content equality under the given filter-order policy.
    fn same_target(&self, other: &Self, policy: FilterOrder) -> bool;

    fn operation(&self) -> Operation;

    fn path(&self) -> String;
}

impl Target for DocRef {
    fn same_target(&self, other: &Self, _policy: FilterOrder) -> bool {
        self == other
    }

    fn operation(&self) -> Operation {
        Operation::Get
    }

    fn path(&self) -> String {
        DocRef::path(self)
    }
}

impl Target for Query {
    fn same_target(&self, other: &Self, policy: FilterOrder) -> bool {
        self.same_as(other, policy)
    }

    fn operation(&self) -> Operation {
        Operation::List
    }

    fn path(&self) -> String {
        self.collection.as_path()
    }
}

impl Target for Descriptor {
    fn same_target(&self, other: &Self, policy: FilterOrder) -> bool {
        match (self, other) {
            (Self::Document(a), Self::Document(b)) => a.same_target(b, policy),
            (Self::Query(a), Self::Query(b)) => a.same_target(b, policy),
            _ => false,
        }
    }

    fn operation(&self) -> Operation {
        Descriptor::operation(self)
    }

    fn path(&self) -> String {
        Descriptor::path(self)
    }
}

/// True iff both sides would resolve to the identical remote subscription.
///
/// `None` means "no subscription": two `None`s are equal, `None` never
/// equals a descriptor.
pub fn descriptors_equal<T: Target>(a: Option<&T>, b: Option<&T>, policy: FilterOrder) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.same_target(b, policy),
        _ => false,
    }
}
