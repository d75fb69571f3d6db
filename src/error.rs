//! Error types for swcache
//!
//! All modules use `SwcacheResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for swcache operations
pub type SwcacheResult<T> = Result<T, SwcacheError>;

/// All errors that can occur in swcache
#[derive(Error, Debug)]
pub enum SwcacheError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Invalid cache version '{version}': {reason}")]
    VersionInvalid { version: String, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Storage errors
    #[error("Invalid cache store name: {0}")]
    StoreNameInvalid(String),

    #[error("Corrupt cache entry in store {store}: {reason}")]
    StoreCorrupt { store: String, reason: String },

    #[error("Cache storage error in {store}: {reason}")]
    Storage { store: String, reason: String },

    // Network errors
    #[error("Network request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    #[error("Failed to fetch {url}: no network and no cached copy")]
    FetchFailed { url: String },

    #[error("Invalid URL '{input}': {reason}")]
    InvalidUrl { input: String, reason: String },

    // Protocol errors
    #[error("Rejected message: {0}")]
    Protocol(String),

    // Lifecycle errors
    #[error("No controller registered for this origin")]
    NotRegistered,

    #[error("No waiting worker to promote")]
    NoWaitingWorker,

    #[error("Invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("TOML edit error: {0}")]
    TomlEdit(#[from] toml_edit::TomlError),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl SwcacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a network error for a URL
    pub fn network(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a storage error for a named store
    pub fn storage(store: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Storage {
            store: store.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error is a transient I/O or storage failure.
    ///
    /// The controller logs and swallows these instead of failing the
    /// surrounding request or install.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network { .. }
                | Self::Storage { .. }
                | Self::StoreCorrupt { .. }
                | Self::Io { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ConfigInvalid { .. } => Some("Run: swcache config show"),
            Self::VersionInvalid { .. } => Some("Use a semantic version such as 1.0.1"),
            Self::FetchFailed { .. } => {
                Some("Check that the origin is reachable, or run: swcache install")
            }
            Self::Network { .. } => Some("Check origin.url in your configuration"),
            Self::NotRegistered => Some("Run: swcache run"),
            Self::StoreCorrupt { .. } => Some("Run: swcache clear"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SwcacheError::FetchFailed {
            url: "https://example.com/".to_string(),
        };
        assert!(err.to_string().contains("no network and no cached copy"));
    }

    #[test]
    fn error_hint() {
        assert_eq!(SwcacheError::NotRegistered.hint(), Some("Run: swcache run"));
        assert_eq!(SwcacheError::Protocol("x".into()).hint(), None);
    }

    #[test]
    fn error_transient() {
        assert!(SwcacheError::network("https://a/", "timeout").is_transient());
        assert!(SwcacheError::storage("quiz-app-v1", "disk full").is_transient());
        assert!(!SwcacheError::NoWaitingWorker.is_transient());
        assert!(!SwcacheError::Protocol("bad".into()).is_transient());
    }
}
