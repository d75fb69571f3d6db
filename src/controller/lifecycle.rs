//! Install and activate transitions

use super::progress::{essential_percent, ramp_steps, ProgressTracker, ESSENTIAL_BAND};
use super::CacheController;
use crate::error::{SwcacheError, SwcacheResult};
use crate::net::Request;
use crate::protocol::ControllerMessage;
use crate::store::RequestKey;
use futures_util::future::join_all;
use tracing::{debug, info, warn};

/// Outcome of an install run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Store that was primed (`None` when caching was skipped)
    pub store: Option<String>,
    /// Essential assets stored
    pub cached: Vec<String>,
    /// Essential assets that could not be fetched or stored
    pub failed: Vec<(String, String)>,
    /// Caching was skipped because the origin is a preview host
    pub skipped: bool,
}

/// Outcome of an activate run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
    /// Superseded stores that were deleted
    pub deleted: Vec<String>,
    /// Stores whose deletion failed, with the reason
    pub failed: Vec<(String, String)>,
}

impl CacheController {
    /// Run the install transition.
    ///
    /// Never fails: individual asset and storage failures are logged and
    /// reported, and the session always ends with `cache-complete`. The
    /// caller decides whether the new version waits or activates.
    pub async fn install(&self) -> InstallReport {
        if self.bypasses_host(self.env.origin_host()) {
            info!(host = %self.env.origin_host(), "preview host, skipping cache install");
            return InstallReport {
                skipped: true,
                ..InstallReport::default()
            };
        }

        let store = self.store_name().to_string();
        if let Err(e) = self.env.storage.open(&store).await {
            warn!(store = %store, "failed to open store: {}", e);
        }

        info!(store = %store, flavor = %self.flavor, "caching essential assets");
        self.broadcast(ControllerMessage::CacheStarted);

        let assets = self.build.assets_for(self.flavor).to_vec();
        let mut tracker = ProgressTracker::new();
        let mut report = InstallReport {
            store: Some(store.clone()),
            ..InstallReport::default()
        };

        for (index, asset) in assets.iter().enumerate() {
            match self.prime(&store, asset).await {
                Ok(()) => {
                    debug!(store = %store, asset = %asset, "cached essential asset");
                    report.cached.push(asset.clone());
                }
                Err(e) => {
                    warn!(store = %store, asset = %asset, "essential asset not cached: {}", e);
                    report.failed.push((asset.clone(), e.to_string()));
                }
            }

            let progress = tracker.advance(essential_percent(index + 1, assets.len()));
            self.broadcast(ControllerMessage::CacheProgress {
                progress,
                file: Some(asset.clone()),
            });
        }

        for step in ramp_steps(ESSENTIAL_BAND.max(tracker.current()), self.build.ramp_step_percent) {
            tokio::time::sleep(self.build.ramp_step).await;
            let progress = tracker.advance(step);
            self.broadcast(ControllerMessage::CacheProgress {
                progress,
                file: None,
            });
        }

        self.broadcast(ControllerMessage::CacheComplete);
        info!(
            store = %store,
            cached = report.cached.len(),
            failed = report.failed.len(),
            "install complete"
        );
        report
    }

    /// Fetch one essential asset and store it
    async fn prime(&self, store: &str, asset: &str) -> SwcacheResult<()> {
        let url = Request::resolve(&self.env.origin, asset)?;
        let request = Request::get(url);
        let response = self.env.fetcher.fetch(&request).await?;
        if !response.is_ok() {
            return Err(SwcacheError::network(
                request.url.as_str(),
                format!("status {}", response.status),
            ));
        }
        self.env
            .storage
            .put(store, &RequestKey::get(&request.url), &response)
            .await
    }

    /// Run the activate transition's garbage collection.
    ///
    /// Deletes every store at the origin that is not one of this build's
    /// live stores, in a single pass. Claiming pages is the host's job;
    /// it calls [`CacheController::notify_activated`] once it has.
    pub async fn activate(&self) -> ActivateReport {
        let names = match self.env.storage.keys().await {
            Ok(names) => names,
            Err(e) => {
                warn!("failed to enumerate stores: {}", e);
                return ActivateReport::default();
            }
        };

        let superseded: Vec<String> = names
            .into_iter()
            .filter(|name| !self.build.is_current_store(name))
            .collect();

        let results = join_all(
            superseded
                .iter()
                .map(|name| self.env.storage.delete(name)),
        )
        .await;

        let mut report = ActivateReport::default();
        for (name, result) in superseded.into_iter().zip(results) {
            match result {
                Ok(_) => {
                    info!(store = %name, "deleted superseded store");
                    report.deleted.push(name);
                }
                Err(e) => {
                    warn!(store = %name, "failed to delete store: {}", e);
                    report.failed.push((name, e.to_string()));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::super::{ControllerBuild, Flavor};
    use super::*;
    use crate::config::Config;
    use crate::net::Response;
    use crate::store::{CacheStorage, MemoryStorage};
    use crate::testing::{controller_with, drain, origin, StubFetcher};
    use std::sync::Arc;

    fn two_asset_config() -> Config {
        let mut config = Config::default();
        config.cache.main_assets = vec!["/".to_string(), "/index.html".to_string()];
        config.cache.ramp_step_ms = 0;
        config
    }

    #[tokio::test]
    async fn install_primes_essential_assets_for_offline_use() {
        let storage = Arc::new(MemoryStorage::new());
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.route("/", 200, "root");
        fetcher.route("/index.html", 200, "<html>");
        let (controller, mut rx) =
            controller_with(&two_asset_config(), Flavor::Main, storage.clone(), fetcher.clone());

        let report = controller.install().await;
        assert_eq!(report.cached, vec!["/", "/index.html"]);
        assert!(report.failed.is_empty());

        fetcher.set_online(false);
        for path in ["/", "/index.html"] {
            let key = RequestKey::get(&origin().join(path).unwrap());
            let hit = storage.match_in("quiz-app-v1.0.1", &key).await.unwrap();
            assert!(hit.is_some(), "{} should be cached", path);
        }

        let messages = drain(&mut rx);
        assert_eq!(messages.first(), Some(&ControllerMessage::CacheStarted));
        assert_eq!(messages.last(), Some(&ControllerMessage::CacheComplete));
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_ends_with_one_complete() {
        let storage = Arc::new(MemoryStorage::new());
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.route("/", 200, "root");
        fetcher.route("/index.html", 200, "<html>");
        let (controller, mut rx) =
            controller_with(&two_asset_config(), Flavor::Main, storage, fetcher);

        controller.install().await;
        let messages = drain(&mut rx);

        let progress: Vec<u8> = messages
            .iter()
            .filter_map(|m| match m {
                ControllerMessage::CacheProgress { progress, .. } => Some(*progress),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![25, 50, 60, 70, 80, 90, 100]);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));

        let completes = messages
            .iter()
            .filter(|m| **m == ControllerMessage::CacheComplete)
            .count();
        assert_eq!(completes, 1);
    }

    #[tokio::test]
    async fn failed_asset_does_not_abort_install() {
        let storage = Arc::new(MemoryStorage::new());
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.route("/index.html", 200, "<html>");
        let (controller, mut rx) =
            controller_with(&two_asset_config(), Flavor::Main, storage.clone(), fetcher);

        let report = controller.install().await;
        assert_eq!(report.cached, vec!["/index.html"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "/");
        assert!(drain(&mut rx).contains(&ControllerMessage::CacheComplete));
    }

    #[tokio::test]
    async fn storage_failures_are_swallowed() {
        let storage = Arc::new(MemoryStorage::new());
        storage.fail_writes(true);
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.route("/", 200, "root");
        fetcher.route("/index.html", 200, "<html>");
        let (controller, mut rx) =
            controller_with(&two_asset_config(), Flavor::Main, storage, fetcher);

        let report = controller.install().await;
        assert!(report.cached.is_empty());
        assert_eq!(report.failed.len(), 2);
        assert!(drain(&mut rx).contains(&ControllerMessage::CacheComplete));
    }

    #[tokio::test]
    async fn preview_host_never_touches_storage() {
        let mut config = two_asset_config();
        config.bypass.hostname_suffixes = vec!["example.com".to_string()];
        let storage = Arc::new(MemoryStorage::new());
        let fetcher = Arc::new(StubFetcher::new());
        let (controller, mut rx) =
            controller_with(&config, Flavor::Main, storage.clone(), fetcher.clone());

        let report = controller.install().await;
        assert!(report.skipped);
        assert_eq!(storage.creations(), 0);
        assert!(fetcher.calls().is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn admin_flavor_primes_admin_store() {
        let mut config = two_asset_config();
        config.cache.admin_assets = vec!["/admin".to_string()];
        let storage = Arc::new(MemoryStorage::new());
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.route("/admin", 200, "admin shell");
        let (controller, _rx) =
            controller_with(&config, Flavor::Admin, storage.clone(), fetcher);

        let report = controller.install().await;
        assert_eq!(report.store.as_deref(), Some("quiz-admin-v1.0.1"));
        assert_eq!(
            storage.keys().await.unwrap(),
            vec!["quiz-admin-v1.0.1".to_string()]
        );
    }

    #[tokio::test]
    async fn activate_keeps_only_current_stores() {
        let mut config = two_asset_config();
        config.cache.app_prefix = "v".to_string();
        config.cache.version = "2.0.0".to_string();
        let storage = Arc::new(MemoryStorage::new());
        let doc = Response::new("https://quiz.example.com/", 200, "x");
        let key = RequestKey::get(&origin());
        storage.put("v-v1.0.0", &key, &doc).await.unwrap();
        storage.put("v-v2.0.0", &key, &doc).await.unwrap();
        storage.put("quiz-admin-v0.9.0", &key, &doc).await.unwrap();

        let build = ControllerBuild::from_config(&config).unwrap();
        assert_eq!(build.main_store, "v-v2.0.0");
        let (controller, _rx) =
            controller_with(&config, Flavor::Main, storage.clone(), Arc::new(StubFetcher::new()));

        let report = controller.activate().await;
        assert_eq!(report.deleted.len(), 2);
        assert_eq!(storage.keys().await.unwrap(), vec!["v-v2.0.0".to_string()]);
    }
}
