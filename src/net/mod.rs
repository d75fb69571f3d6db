//! Request/response model and the network seam
//!
//! The controller never talks to the network directly; it goes through a
//! [`Fetcher`], which is a real HTTP client in the CLI and a scripted stub
//! in tests.

pub mod http;

pub use http::UreqFetcher;

use crate::error::{SwcacheError, SwcacheResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// HTTP request method
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Other(String),
}

impl Method {
    /// Whether the method is a pure retrieval that may be cached
    pub fn is_retrieval(&self) -> bool {
        matches!(self, Self::Get)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Other(m) => m,
        }
    }
}

impl FromStr for Method {
    type Err = SwcacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        if upper.is_empty() {
            return Err(SwcacheError::User("empty HTTP method".to_string()));
        }
        Ok(match upper.as_str() {
            "GET" => Self::Get,
            "HEAD" => Self::Head,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "PATCH" => Self::Patch,
            "DELETE" => Self::Delete,
            "OPTIONS" => Self::Options,
            _ => Self::Other(upper),
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the page issued the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Top-level page navigation
    Navigate,
    SameOrigin,
    Cors,
    NoCors,
}

/// An intercepted request
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
    pub headers: Vec<(String, String)>,
}

impl Request {
    /// A plain GET for a subresource
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::Get,
            url,
            mode: RequestMode::Cors,
            headers: Vec::new(),
        }
    }

    /// A page navigation
    pub fn navigate(url: Url) -> Self {
        Self {
            mode: RequestMode::Navigate,
            ..Self::get(url)
        }
    }

    /// Resolve `path_or_url` against `origin`
    pub fn resolve(origin: &Url, path_or_url: &str) -> SwcacheResult<Url> {
        origin
            .join(path_or_url)
            .map_err(|e| SwcacheError::InvalidUrl {
                input: path_or_url.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }
}

/// Response type as seen by the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// Same-origin response
    Basic,
    /// Cross-origin response with CORS approval
    Cors,
    /// Cross-origin response the page cannot inspect
    Opaque,
}

/// A response from the network or from a cache store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    #[serde(skip)]
    pub body: Vec<u8>,
    pub kind: ResponseKind,
    pub url: String,
}

impl Response {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            kind: ResponseKind::Basic,
            url: url.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_kind(mut self, kind: ResponseKind) -> Self {
        self.kind = kind;
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the response may be written to a cache store
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && matches!(self.kind, ResponseKind::Basic | ResponseKind::Cors)
    }
}

/// Network access
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform the request. HTTP error statuses are responses, not errors;
    /// `Err` means the network itself failed.
    async fn fetch(&self, request: &Request) -> SwcacheResult<Response>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parse() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!(
            "PROPFIND".parse::<Method>().unwrap(),
            Method::Other("PROPFIND".into())
        );
        assert!("".parse::<Method>().is_err());
    }

    #[test]
    fn only_get_is_retrieval() {
        assert!(Method::Get.is_retrieval());
        assert!(!Method::Head.is_retrieval());
        assert!(!Method::Post.is_retrieval());
    }

    #[test]
    fn cacheable_requires_200_and_readable_kind() {
        let ok = Response::new("https://a/", 200, "x");
        assert!(ok.is_cacheable());
        assert!(ok.clone().with_kind(ResponseKind::Cors).is_cacheable());
        assert!(!ok.clone().with_kind(ResponseKind::Opaque).is_cacheable());
        assert!(!Response::new("https://a/", 206, "x").is_cacheable());
        assert!(!Response::new("https://a/", 404, "x").is_cacheable());
    }

    #[test]
    fn header_lookup_ignores_case() {
        let resp = Response::new("https://a/", 200, "").with_header("Content-Type", "text/html");
        assert_eq!(resp.header("content-type"), Some("text/html"));
        assert_eq!(resp.header("etag"), None);
    }

    #[test]
    fn resolve_relative_path() {
        let origin = Url::parse("https://quiz.example.com").unwrap();
        let url = Request::resolve(&origin, "/index.html").unwrap();
        assert_eq!(url.as_str(), "https://quiz.example.com/index.html");
    }
}
