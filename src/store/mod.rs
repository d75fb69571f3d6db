//! Durable cache stores
//!
//! A store is a named mapping from a [`RequestKey`] to a stored
//! [`Response`]. Store names carry the flavor and version tag
//! (`quiz-app-v1.0.1`), so superseded versions can be found by name alone.
//!
//! # Backends
//!
//! | Backend | Durability | Used by |
//! |---------|------------|---------|
//! | [`MemoryStorage`] | process lifetime | tests, embedding |
//! | [`DiskStorage`] | state directory | CLI |

pub mod disk;
pub mod memory;

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

use crate::error::{SwcacheError, SwcacheResult};
use crate::net::{Method, Request, Response};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// Normalized cache key: a retrieval method plus a fragment-less URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: Method,
    pub url: String,
}

impl RequestKey {
    /// Key for a GET of `url`
    pub fn get(url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: Method::Get,
            url: url.to_string(),
        }
    }

    /// Key for `request`, or `None` when its method is not cacheable
    pub fn for_request(request: &Request) -> Option<Self> {
        request
            .method
            .is_retrieval()
            .then(|| Self::get(&request.url))
    }

    /// Stable file-system safe digest of the key
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.method.as_str().as_bytes());
        hasher.update(b" ");
        hasher.update(self.url.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Named cache stores for one origin
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a store, creating it if absent
    async fn open(&self, name: &str) -> SwcacheResult<()>;

    /// Whether a store exists
    async fn has(&self, name: &str) -> SwcacheResult<bool>;

    /// Names of all existing stores
    async fn keys(&self) -> SwcacheResult<Vec<String>>;

    /// Delete a store; returns whether it existed
    async fn delete(&self, name: &str) -> SwcacheResult<bool>;

    /// Look up a key in one store. A missing store is a miss, not an error,
    /// and is not created.
    async fn match_in(&self, name: &str, key: &RequestKey) -> SwcacheResult<Option<Response>>;

    /// Store a response, creating the store if absent
    async fn put(&self, name: &str, key: &RequestKey, response: &Response) -> SwcacheResult<()>;

    /// Keys stored in one store
    async fn entries(&self, name: &str) -> SwcacheResult<Vec<RequestKey>>;
}

/// Reject store names that could escape the stores directory
pub fn validate_store_name(name: &str) -> SwcacheResult<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(SwcacheError::StoreNameInvalid(name.to_string()))
    }
}
