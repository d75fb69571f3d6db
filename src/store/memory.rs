//! In-memory cache storage

use super::{validate_store_name, CacheStorage, RequestKey};
use crate::error::{SwcacheError, SwcacheResult};
use crate::net::Response;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

type Store = BTreeMap<String, (RequestKey, Response)>;

/// Process-local [`CacheStorage`]
#[derive(Default)]
pub struct MemoryStorage {
    stores: RwLock<BTreeMap<String, Store>>,
    creations: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stores created so far
    pub fn creations(&self) -> usize {
        self.creations.load(Ordering::SeqCst)
    }

    /// Make every subsequent `put` fail, to exercise storage-failure paths
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> SwcacheResult<()> {
        validate_store_name(name)?;
        let mut stores = self.stores.write().await;
        if !stores.contains_key(name) {
            stores.insert(name.to_string(), Store::new());
            self.creations.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn has(&self, name: &str) -> SwcacheResult<bool> {
        Ok(self.stores.read().await.contains_key(name))
    }

    async fn keys(&self) -> SwcacheResult<Vec<String>> {
        Ok(self.stores.read().await.keys().cloned().collect())
    }

    async fn delete(&self, name: &str) -> SwcacheResult<bool> {
        Ok(self.stores.write().await.remove(name).is_some())
    }

    async fn match_in(&self, name: &str, key: &RequestKey) -> SwcacheResult<Option<Response>> {
        let stores = self.stores.read().await;
        Ok(stores
            .get(name)
            .and_then(|store| store.get(&key.to_string()))
            .map(|(_, response)| response.clone()))
    }

    async fn put(&self, name: &str, key: &RequestKey, response: &Response) -> SwcacheResult<()> {
        validate_store_name(name)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SwcacheError::storage(name, "write rejected"));
        }
        let mut stores = self.stores.write().await;
        let store = stores.entry(name.to_string()).or_insert_with(|| {
            self.creations.fetch_add(1, Ordering::SeqCst);
            Store::new()
        });
        store.insert(key.to_string(), (key.clone(), response.clone()));
        Ok(())
    }

    async fn entries(&self, name: &str) -> SwcacheResult<Vec<RequestKey>> {
        let stores = self.stores.read().await;
        Ok(stores
            .get(name)
            .map(|store| store.values().map(|(key, _)| key.clone()).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn key(path: &str) -> RequestKey {
        RequestKey::get(&Url::parse(&format!("https://a.example{}", path)).unwrap())
    }

    #[tokio::test]
    async fn put_then_match() {
        let storage = MemoryStorage::new();
        let resp = Response::new("https://a.example/", 200, "home");
        storage.put("main-v1", &key("/"), &resp).await.unwrap();

        let hit = storage.match_in("main-v1", &key("/")).await.unwrap();
        assert_eq!(hit.unwrap().body, b"home");
        assert!(storage.match_in("main-v1", &key("/x")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn match_does_not_create_store() {
        let storage = MemoryStorage::new();
        assert!(storage.match_in("ghost", &key("/")).await.unwrap().is_none());
        assert!(!storage.has("ghost").await.unwrap());
        assert_eq!(storage.creations(), 0);
    }

    #[tokio::test]
    async fn open_is_idempotent() {
        let storage = MemoryStorage::new();
        storage.open("main-v1").await.unwrap();
        storage.open("main-v1").await.unwrap();
        assert_eq!(storage.creations(), 1);
        assert_eq!(storage.keys().await.unwrap(), vec!["main-v1".to_string()]);
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let storage = MemoryStorage::new();
        storage.open("main-v1").await.unwrap();
        assert!(storage.delete("main-v1").await.unwrap());
        assert!(!storage.delete("main-v1").await.unwrap());
    }

    #[tokio::test]
    async fn failing_writes() {
        let storage = MemoryStorage::new();
        storage.fail_writes(true);
        let resp = Response::new("https://a.example/", 200, "home");
        let err = storage.put("main-v1", &key("/"), &resp).await.unwrap_err();
        assert!(err.is_transient());
    }
}
