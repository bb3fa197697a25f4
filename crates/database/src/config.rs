//! Façade configuration.

use kvorm_core::{Error, Result};
use serde::{Deserialize, Serialize};

pub use kvorm_query::CompilerOptions;
pub use kvorm_storage::{RetryPolicy, SessionConfig};

/// Settings of a [`crate::Database`].
///
/// Every field has a default, so partial JSON documents are accepted:
///
/// ```rust
/// use kvorm_database::DatabaseConfig;
///
/// let config = DatabaseConfig::from_json(r#"{ "session": { "lock_ttl_ms": 250 } }"#).unwrap();
/// assert_eq!(config.session.lock_ttl_ms, 250);
/// assert_eq!(config.tree_cache_size, 64);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub compiler: CompilerOptions,
    pub session: SessionConfig,
    pub retry: RetryPolicy,
    /// Compiled trees kept per database. 0 disables the cache.
    pub tree_cache_size: usize,
    /// Record sets kept per request.
    pub record_cache_size: usize,
    /// Narrow backend reads with id / secondary-index hints.
    pub use_index_hints: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            compiler: CompilerOptions::default(),
            session: SessionConfig::default(),
            retry: RetryPolicy::default(),
            tree_cache_size: 64,
            record_cache_size: 32,
            use_index_hints: true,
        }
    }
}

impl DatabaseConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::invalid_operation(format!("invalid configuration: {}", e)))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::invalid_operation(format!("invalid configuration: {}", e)))
    }

    pub fn compiler(mut self, options: CompilerOptions) -> Self {
        self.compiler = options;
        self
    }

    pub fn session(mut self, config: SessionConfig) -> Self {
        self.session = config;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn tree_cache_size(mut self, size: usize) -> Self {
        self.tree_cache_size = size;
        self
    }

    pub fn record_cache_size(mut self, size: usize) -> Self {
        self.record_cache_size = size;
        self
    }

    pub fn use_index_hints(mut self, enabled: bool) -> Self {
        self.use_index_hints = enabled;
        self
    }
}
