use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Default session lifetime in seconds.
pub const DEFAULT_LIFETIME_SECS: u64 = 3600;

/// Recognized session store options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session lifetime in seconds, measured from the most recent write.
    #[serde(default = "default_lifetime")]
    pub lifetime: u64,
    /// Database name.
    #[serde(default)]
    pub database: String,
    /// Collection name.
    #[serde(default)]
    pub collection: String,
    /// Connection target(s). Several targets describe a sharded or replicated deployment.
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Keep the underlying connection open across operations.
    #[serde(default)]
    pub persistent: bool,
}

fn default_lifetime() -> u64 {
    DEFAULT_LIFETIME_SECS
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime: DEFAULT_LIFETIME_SECS,
            database: String::new(),
            collection: String::new(),
            hosts: Vec::new(),
            username: None,
            password: None,
            persistent: false,
        }
    }
}

impl SessionConfig {
    /// Config with the required names set and defaults elsewhere.
    pub fn new(
        database: impl Into<String>,
        collection: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
            hosts: vec![host.into()],
            ..Self::default()
        }
    }

    pub fn with_lifetime(mut self, lifetime: u64) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Reject configurations the store cannot start with.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.database.trim().is_empty() {
            return Err(SessionError::Configuration(
                "a database must be specified for session storage".to_string(),
            ));
        }
        if self.collection.trim().is_empty() {
            return Err(SessionError::Configuration(
                "a collection must be specified for session storage".to_string(),
            ));
        }
        if self.lifetime == 0 {
            return Err(SessionError::Configuration(
                "session lifetime must be greater than zero".to_string(),
            ));
        }
        if self.hosts.iter().all(|h| h.trim().is_empty()) {
            return Err(SessionError::Configuration(
                "at least one connection target must be specified".to_string(),
            ));
        }
        Ok(())
    }
}
