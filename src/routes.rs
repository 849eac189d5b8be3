//! Route classification
//!
//! Every navigable path is either public (login, signup) or protected (the
//! rest of the app). The classification is static for the life of the client.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Public or protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteClass {
    /// Reachable without an identity; an identity is sent home
    Public,
    /// Requires an identity and its profile record
    #[default]
    Protected,
}

impl RouteClass {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "public" => Some(Self::Public),
            "protected" | "private" => Some(Self::Protected),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Protected => "protected",
        }
    }

    pub fn is_public(&self) -> bool {
        *self == Self::Public
    }
}

impl std::fmt::Display for RouteClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Maps a route path to its classification.
pub trait RouteClassifier: Send + Sync {
    fn classify(&self, path: &str) -> RouteClass;
}

/// Static table: the listed paths are public, everything else is protected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    public: BTreeSet<String>,
}

impl RouteTable {
    pub fn new<I, S>(public: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            public: public.into_iter().map(|p| normalize(p.as_ref())).collect(),
        }
    }

    pub fn public_routes(&self) -> impl Iterator<Item = &str> {
        self.public.iter().map(String::as_str)
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new(["/login", "/signup"])
    }
}

impl RouteClassifier for RouteTable {
    fn classify(&self, path: &str) -> RouteClass {
        if self.public.contains(&normalize(path)) {
            RouteClass::Public
        } else {
            RouteClass::Protected
        }
    }
}

/// Strip query, fragment and trailing slash: `/login/?next=/` → `/login`.
pub fn normalize(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
