//! File-system cache storage
//!
//! Layout: one directory per store under the stores root, two files per
//! entry named by the key digest:
//!
//! ```text
//! stores/quiz-app-v1.0.1/<sha256>.json   key, status, headers, stored_at
//! stores/quiz-app-v1.0.1/<sha256>.body   raw body bytes
//! ```
//!
//! The body is written before the metadata, so a crash mid-put leaves an
//! orphan body that is never matched.

use super::{validate_store_name, CacheStorage, RequestKey};
use crate::error::{SwcacheError, SwcacheResult};
use crate::net::Response;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Metadata file contents
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    key: RequestKey,
    response: Response,
    stored_at: DateTime<Utc>,
}

/// [`CacheStorage`] persisted under a root directory
pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn store_dir(&self, name: &str) -> SwcacheResult<PathBuf> {
        validate_store_name(name)?;
        Ok(self.root.join(name))
    }

    fn entry_paths(&self, name: &str, key: &RequestKey) -> SwcacheResult<(PathBuf, PathBuf)> {
        let dir = self.store_dir(name)?;
        let digest = key.digest();
        Ok((
            dir.join(format!("{}.json", digest)),
            dir.join(format!("{}.body", digest)),
        ))
    }

    /// When an entry was written, if present
    pub async fn stored_at(&self, name: &str, key: &RequestKey) -> SwcacheResult<Option<DateTime<Utc>>> {
        let (meta_path, _) = self.entry_paths(name, key)?;
        Ok(read_entry(name, &meta_path).await?.map(|e| e.stored_at))
    }
}

async fn read_entry(store: &str, path: &Path) -> SwcacheResult<Option<StoredEntry>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(SwcacheError::io(
                format!("reading cache entry {}", path.display()),
                e,
            ))
        }
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| SwcacheError::StoreCorrupt {
            store: store.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, name: &str) -> SwcacheResult<()> {
        let dir = self.store_dir(name)?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| SwcacheError::io(format!("creating store {}", dir.display()), e))
    }

    async fn has(&self, name: &str) -> SwcacheResult<bool> {
        Ok(self.store_dir(name)?.is_dir())
    }

    async fn keys(&self) -> SwcacheResult<Vec<String>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(SwcacheError::io("reading stores directory", e)),
        };

        let mut names = vec![];
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SwcacheError::io("reading store entry", e))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if let (true, Some(name)) = (is_dir, entry.file_name().to_str()) {
                if validate_store_name(name).is_ok() {
                    names.push(name.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> SwcacheResult<bool> {
        let dir = self.store_dir(name)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(store = %name, "deleted store directory");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SwcacheError::io(format!("deleting store {}", dir.display()), e)),
        }
    }

    async fn match_in(&self, name: &str, key: &RequestKey) -> SwcacheResult<Option<Response>> {
        let (meta_path, body_path) = self.entry_paths(name, key)?;
        let Some(entry) = read_entry(name, &meta_path).await? else {
            return Ok(None);
        };
        if &entry.key != key {
            return Ok(None);
        }

        let body = fs::read(&body_path).await.map_err(|e| SwcacheError::StoreCorrupt {
            store: name.to_string(),
            reason: format!("{}: {}", body_path.display(), e),
        })?;

        Ok(Some(Response {
            body,
            ..entry.response
        }))
    }

    async fn put(&self, name: &str, key: &RequestKey, response: &Response) -> SwcacheResult<()> {
        self.open(name).await?;
        let (meta_path, body_path) = self.entry_paths(name, key)?;

        fs::write(&body_path, &response.body)
            .await
            .map_err(|e| SwcacheError::storage(name, format!("writing body: {}", e)))?;

        let entry = StoredEntry {
            key: key.clone(),
            response: response.clone(),
            stored_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&entry)?;
        fs::write(&meta_path, content)
            .await
            .map_err(|e| SwcacheError::storage(name, format!("writing metadata: {}", e)))?;

        Ok(())
    }

    async fn entries(&self, name: &str) -> SwcacheResult<Vec<RequestKey>> {
        let dir = self.store_dir(name)?;
        let mut dir_entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(SwcacheError::io(format!("reading store {}", dir.display()), e)),
        };

        let mut keys = vec![];
        while let Some(entry) = dir_entries
            .next_entry()
            .await
            .map_err(|e| SwcacheError::io("reading cache entry", e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                // Unreadable entries are skipped here; match_in reports them
                if let Ok(Some(stored)) = read_entry(name, &path).await {
                    keys.push(stored.key);
                }
            }
        }

        keys.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(keys)
    }
}
