//! Client configuration

use crate::descriptor::{CollectionPath, FilterOrder};
use crate::error::{ClientError, Result};
use crate::routes::{normalize, RouteTable};
use serde::{Deserialize, Serialize};

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Collection holding profile records keyed by identity id
    pub profile_collection: String,
    /// Where an authenticated principal is sent from a public route
    pub home_route: String,
    /// Where an anonymous visitor is sent from a protected route
    pub login_route: String,
    /// Routes reachable without an identity
    pub public_routes: Vec<String>,
    /// Whether filter order distinguishes two queries
    pub filter_order: FilterOrder,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            profile_collection: "users".to_string(),
            home_route: "/".to_string(),
            login_route: "/login".to_string(),
            public_routes: vec!["/login".to_string(), "/signup".to_string()],
            filter_order: FilterOrder::Sensitive,
        }
    }
}

impl ClientConfig {
    /// Create config from environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            profile_collection: std::env::var("CONNECT_HUB_PROFILE_COLLECTION")
                .unwrap_or(defaults.profile_collection),
            home_route: std::env::var("CONNECT_HUB_HOME_ROUTE").unwrap_or(defaults.home_route),
            login_route: std::env::var("CONNECT_HUB_LOGIN_ROUTE").unwrap_or(defaults.login_route),
            public_routes: std::env::var("CONNECT_HUB_PUBLIC_ROUTES")
                .ok()
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or(defaults.public_routes),
            filter_order: std::env::var("CONNECT_HUB_FILTER_ORDER")
                .ok()
                .and_then(|s| FilterOrder::from_str(&s))
                .unwrap_or(defaults.filter_order),
        }
    }

    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        CollectionPath::parse(&self.profile_collection)
            .map_err(|e| ClientError::Config(format!("profile_collection: {}", e)))?;
        for route in [&self.home_route, &self.login_route].into_iter().chain(&self.public_routes) {
            if !route.starts_with('/') {
                return Err(ClientError::Config(format!(
                    "route '{}' must start with '/'",
                    route
                )));
            }
        }
        let login = normalize(&self.login_route);
        if !self.public_routes.iter().any(|r| normalize(r) == login) {
            return Err(ClientError::Config(format!(
                "login route '{}' must be public",
                self.login_route
            )));
        }
        if self.public_routes.iter().any(|r| normalize(r) == normalize(&self.home_route)) {
            return Err(ClientError::Config(format!(
                "home route '{}' must be protected",
                self.home_route
            )));
        }
        Ok(())
    }

    pub fn profiles(&self) -> CollectionPath {
        CollectionPath::new(self.profile_collection.clone())
    }

    pub fn route_table(&self) -> RouteTable {
        RouteTable::new(&self.public_routes)
    }
}
