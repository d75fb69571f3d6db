//! Blocking HTTP client adapter
//!
//! ureq is synchronous; every request runs on the blocking pool so the
//! controller's async handlers never stall the runtime.

use super::{Fetcher, Method, Request, RequestMode, Response, ResponseKind};
use crate::error::{SwcacheError, SwcacheResult};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// [`Fetcher`] backed by a shared ureq agent
#[derive(Clone)]
pub struct UreqFetcher {
    agent: ureq::Agent,
    origin: Url,
}

impl UreqFetcher {
    /// Create a fetcher for pages served from `origin`
    pub fn new(origin: Url, timeout_secs: u64) -> Self {
        let timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build()
            .into();
        Self { agent, origin }
    }

    fn kind_for(&self, request: &Request, acao: bool) -> ResponseKind {
        if request.url.origin() == self.origin.origin() {
            ResponseKind::Basic
        } else if request.mode != RequestMode::NoCors && acao {
            ResponseKind::Cors
        } else {
            ResponseKind::Opaque
        }
    }
}

#[async_trait]
impl Fetcher for UreqFetcher {
    async fn fetch(&self, request: &Request) -> SwcacheResult<Response> {
        let agent = self.agent.clone();
        let req = request.clone();
        let url = request.url.to_string();

        let (status, headers, body) = tokio::task::spawn_blocking(move || blocking_call(&agent, &req))
            .await
            .map_err(|e| SwcacheError::Internal(format!("fetch task failed: {}", e)))??;

        debug!(url = %url, status, bytes = body.len(), "network response");

        let acao = headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("access-control-allow-origin"));

        Ok(Response {
            status,
            headers,
            body,
            kind: self.kind_for(request, acao),
            url,
        })
    }
}

type RawResponse = (u16, Vec<(String, String)>, Vec<u8>);

fn blocking_call(agent: &ureq::Agent, request: &Request) -> SwcacheResult<RawResponse> {
    let url = request.url.as_str();
    let net_err = |e: ureq::Error| SwcacheError::network(url, e.to_string());

    let result = match &request.method {
        Method::Get => with_headers(agent.get(url), &request.headers).call(),
        Method::Head => with_headers(agent.head(url), &request.headers).call(),
        Method::Delete => with_headers(agent.delete(url), &request.headers).call(),
        Method::Options => with_headers(agent.options(url), &request.headers).call(),
        Method::Post => with_headers(agent.post(url), &request.headers).send_empty(),
        Method::Put => with_headers(agent.put(url), &request.headers).send_empty(),
        Method::Patch => with_headers(agent.patch(url), &request.headers).send_empty(),
        Method::Other(m) => {
            return Err(SwcacheError::network(
                url,
                format!("unsupported method {}", m),
            ))
        }
    };

    let mut response = result.map_err(net_err)?;
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    let body = response.body_mut().read_to_vec().map_err(net_err)?;

    Ok((status, headers, body))
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}
