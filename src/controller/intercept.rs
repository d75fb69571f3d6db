//! Request interception

use super::{CacheController, Flavor};
use crate::bypass::{BypassReason, RequestClass};
use crate::error::{SwcacheError, SwcacheResult};
use crate::net::{Request, Response};
use crate::store::RequestKey;
use std::fmt;
use tracing::{debug, warn};

/// Where an intercepted response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    /// Offline document served to a navigation with no cached copy
    Fallback,
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Network => write!(f, "network"),
            Self::Fallback => write!(f, "offline fallback"),
        }
    }
}

/// Controller's answer to a fetch event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interception {
    /// Not intercepted; the page talks to the network as if no controller
    /// were installed
    Bypass(BypassReason),
    Respond {
        response: Response,
        source: ResponseSource,
    },
}

/// A background cache write that did not land
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundFailure {
    pub store: String,
    pub key: RequestKey,
    pub reason: String,
}

impl CacheController {
    /// Answer one fetch event: cache-first, then network, then the offline
    /// document for navigations.
    ///
    /// Successful network responses are written to the store in the
    /// background; the caller gets the response without waiting for it.
    pub async fn handle_fetch(&self, request: &Request) -> SwcacheResult<Interception> {
        if let RequestClass::Bypass(reason) =
            RequestClass::classify(&self.build.bypass, self.env.origin_host(), request)
        {
            debug!(url = %request.url, %reason, "bypassing request");
            return Ok(Interception::Bypass(reason));
        }

        let Some(key) = RequestKey::for_request(request) else {
            return Ok(Interception::Bypass(BypassReason::NonRetrievalMethod));
        };
        let flavor = Flavor::of_path(request.url.path(), &self.build.admin_namespace);
        let store = self.build.store_for(flavor).to_string();

        if let Some(response) = self.lookup(&store, &key).await {
            debug!(store = %store, key = %key, "cache hit");
            return Ok(Interception::Respond {
                response,
                source: ResponseSource::Cache,
            });
        }

        match self.env.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.populate(store, key, response.clone());
                }
                Ok(Interception::Respond {
                    response,
                    source: ResponseSource::Network,
                })
            }
            Err(e) => {
                debug!(url = %request.url, "network failed: {}", e);
                self.offline(&store, &key, request).await
            }
        }
    }

    /// Cache lookup where storage errors count as a miss
    async fn lookup(&self, store: &str, key: &RequestKey) -> Option<Response> {
        match self.env.storage.match_in(store, key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(store = %store, key = %key, "cache lookup failed: {}", e);
                None
            }
        }
    }

    async fn offline(
        &self,
        store: &str,
        key: &RequestKey,
        request: &Request,
    ) -> SwcacheResult<Interception> {
        // The store may have been written since the first lookup
        if let Some(response) = self.lookup(store, key).await {
            return Ok(Interception::Respond {
                response,
                source: ResponseSource::Cache,
            });
        }

        if request.is_navigation() {
            let url = Request::resolve(&self.env.origin, &self.build.offline_document)?;
            if let Some(response) = self.lookup(store, &RequestKey::get(&url)).await {
                debug!(url = %request.url, "serving offline document");
                return Ok(Interception::Respond {
                    response,
                    source: ResponseSource::Fallback,
                });
            }
        }

        Err(SwcacheError::FetchFailed {
            url: request.url.to_string(),
        })
    }

    /// Detached store write; failures go to the failure channel
    fn populate(&self, store: String, key: RequestKey, response: Response) {
        let storage = self.env.storage.clone();
        let failures = self.failures.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = storage.put(&store, &key, &response).await {
                warn!(store = %store, key = %key, "background cache write failed: {}", e);
                let _ = failures.send(BackgroundFailure {
                    store,
                    key,
                    reason: e.to_string(),
                });
            }
        });
        self.track(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::net::{Method, ResponseKind};
    use crate::store::{CacheStorage, MemoryStorage};
    use crate::testing::{controller_with, origin, StubFetcher};
    use std::sync::Arc;

    fn url(path: &str) -> url::Url {
        origin().join(path).unwrap()
    }

    fn setup() -> (Arc<MemoryStorage>, Arc<StubFetcher>, super::super::CacheController) {
        let storage = Arc::new(MemoryStorage::new());
        let fetcher = Arc::new(StubFetcher::new());
        let (controller, _rx) = controller_with(
            &Config::default(),
            Flavor::Main,
            storage.clone(),
            fetcher.clone(),
        );
        (storage, fetcher, controller)
    }

    #[tokio::test]
    async fn cache_hit_skips_network() {
        let (storage, fetcher, controller) = setup();
        let cached = Response::new(url("/quiz/1").as_str(), 200, "cached");
        storage
            .put("quiz-app-v1.0.1", &RequestKey::get(&url("/quiz/1")), &cached)
            .await
            .unwrap();
        fetcher.route("/quiz/1", 200, "fresh");

        let result = controller.handle_fetch(&Request::get(url("/quiz/1"))).await.unwrap();
        assert_eq!(
            result,
            Interception::Respond {
                response: cached,
                source: ResponseSource::Cache
            }
        );
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn miss_fetches_and_populates_in_background() {
        let (storage, fetcher, controller) = setup();
        fetcher.route("/quiz/2", 200, "fresh");

        let result = controller.handle_fetch(&Request::get(url("/quiz/2"))).await.unwrap();
        assert!(matches!(
            result,
            Interception::Respond { source: ResponseSource::Network, .. }
        ));

        controller.settle().await;
        let hit = storage
            .match_in("quiz-app-v1.0.1", &RequestKey::get(&url("/quiz/2")))
            .await
            .unwrap();
        assert_eq!(hit.unwrap().body, b"fresh");

        fetcher.set_online(false);
        let again = controller.handle_fetch(&Request::get(url("/quiz/2"))).await.unwrap();
        assert!(matches!(
            again,
            Interception::Respond { source: ResponseSource::Cache, .. }
        ));
    }

    #[tokio::test]
    async fn error_and_opaque_responses_are_not_stored() {
        let (storage, fetcher, controller) = setup();
        fetcher.route("/missing", 404, "nope");
        fetcher.route_response(
            "/cdn.js",
            Response::new(url("/cdn.js").as_str(), 200, "x").with_kind(ResponseKind::Opaque),
        );

        for path in ["/missing", "/cdn.js"] {
            let result = controller.handle_fetch(&Request::get(url(path))).await.unwrap();
            assert!(matches!(
                result,
                Interception::Respond { source: ResponseSource::Network, .. }
            ));
        }
        controller.settle().await;
        assert!(storage
            .entries("quiz-app-v1.0.1")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn bypassed_requests_are_not_touched() {
        let (storage, fetcher, controller) = setup();
        let cases = [
            (
                Request::get(url("/api/scores")),
                BypassReason::ApiNamespace,
            ),
            (
                Request::get(url("/admin/dashboard")),
                BypassReason::ControlNamespace,
            ),
            (
                Request::get(url("/gitpush")),
                BypassReason::ControlNamespace,
            ),
            (
                Request::get(url("/quiz")).with_method(Method::Post),
                BypassReason::NonRetrievalMethod,
            ),
        ];

        for (request, reason) in cases {
            let result = controller.handle_fetch(&request).await.unwrap();
            assert_eq!(result, Interception::Bypass(reason));
        }
        assert!(fetcher.calls().is_empty());
        assert_eq!(storage.creations(), 0);
    }

    #[tokio::test]
    async fn offline_navigation_gets_offline_document() {
        let (storage, fetcher, controller) = setup();
        let shell = Response::new(url("/index.html").as_str(), 200, "<html>shell</html>");
        storage
            .put("quiz-app-v1.0.1", &RequestKey::get(&url("/index.html")), &shell)
            .await
            .unwrap();
        fetcher.set_online(false);

        let result = controller
            .handle_fetch(&Request::navigate(url("/quiz/never-seen")))
            .await
            .unwrap();
        assert_eq!(
            result,
            Interception::Respond {
                response: shell,
                source: ResponseSource::Fallback
            }
        );
    }

    #[tokio::test]
    async fn offline_subresource_without_copy_fails() {
        let (_storage, fetcher, controller) = setup();
        fetcher.set_online(false);

        let err = controller
            .handle_fetch(&Request::get(url("/static/img/logo.png")))
            .await
            .unwrap_err();
        assert!(matches!(err, SwcacheError::FetchFailed { .. }));
    }

    #[tokio::test]
    async fn background_write_failure_is_reported_not_raised() {
        let (storage, fetcher, controller) = setup();
        storage.fail_writes(true);
        fetcher.route("/quiz/3", 200, "fresh");
        let mut failures = controller.subscribe_failures();

        let result = controller.handle_fetch(&Request::get(url("/quiz/3"))).await.unwrap();
        assert!(matches!(
            result,
            Interception::Respond { source: ResponseSource::Network, .. }
        ));

        controller.settle().await;
        let failure = failures.try_recv().unwrap();
        assert_eq!(failure.store, "quiz-app-v1.0.1");
        assert_eq!(failure.key, RequestKey::get(&url("/quiz/3")));
    }

    #[tokio::test]
    async fn preview_origin_bypasses_everything() {
        let mut config = Config::default();
        config.bypass.hostname_suffixes = vec!["example.com".to_string()];
        let fetcher = Arc::new(StubFetcher::new());
        let (controller, _rx) = controller_with(
            &config,
            Flavor::Main,
            Arc::new(MemoryStorage::new()),
            fetcher.clone(),
        );

        let result = controller.handle_fetch(&Request::get(url("/index.html"))).await.unwrap();
        assert_eq!(result, Interception::Bypass(BypassReason::PreviewHost));
        assert!(fetcher.calls().is_empty());
    }
}
