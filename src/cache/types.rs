//! Core types for cached requests and responses.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use sha2::{Digest, Sha256};
use std::str::FromStr;
use url::Url;

/// How the request was initiated by the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
  /// Top-level document load
  Navigate,
  /// Same-origin sub-resource (scripts, images, styles)
  #[default]
  SameOrigin,
  /// Cross-origin request without CORS (opaque response)
  NoCors,
}

/// A request as seen by the fetch handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
  pub method: Method,
  pub url: Url,
  pub mode: RequestMode,
}

impl FetchRequest {
  pub fn new(method: Method, url: Url, mode: RequestMode) -> Self {
    Self { method, url, mode }
  }

  /// A plain GET for a sub-resource.
  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url, RequestMode::SameOrigin)
  }

  /// A top-level navigation to `url`.
  pub fn navigate(url: Url) -> Self {
    Self::new(Method::GET, url, RequestMode::Navigate)
  }

  pub fn is_navigation(&self) -> bool {
    self.mode == RequestMode::Navigate
  }
}

/// Identity of a request inside a bucket: method plus URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  method: String,
  url: String,
}

impl RequestKey {
  pub fn new(method: &Method, url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self {
      method: method.as_str().to_string(),
      url: url.into(),
    }
  }

  pub fn for_request(request: &FetchRequest) -> Self {
    Self::new(&request.method, &request.url)
  }

  pub(crate) fn from_parts(method: String, url: String) -> Self {
    Self { method, url }
  }

  pub fn method(&self) -> &str {
    &self.method
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  /// SHA256 of `"<METHOD> <url>"`, used as the stable storage key.
  pub fn storage_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// Classification of a response relative to the worker's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
  /// Same-origin, fully readable
  Basic,
  /// Cross-origin with CORS
  Cors,
  /// Cross-origin without CORS, unreadable
  Opaque,
  /// Network error placeholder
  Error,
}

impl ResponseType {
  pub fn as_str(&self) -> &'static str {
    match self {
      ResponseType::Basic => "basic",
      ResponseType::Cors => "cors",
      ResponseType::Opaque => "opaque",
      ResponseType::Error => "error",
    }
  }
}

impl FromStr for ResponseType {
  type Err = color_eyre::Report;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "basic" => Ok(ResponseType::Basic),
      "cors" => Ok(ResponseType::Cors),
      "opaque" => Ok(ResponseType::Opaque),
      "error" => Ok(ResponseType::Error),
      other => Err(eyre!("Unknown response type '{}'", other)),
    }
  }
}

/// A response body with its status, headers and type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  pub response_type: ResponseType,
}

impl StoredResponse {
  /// A same-origin 200 response with no headers.
  pub fn basic(body: impl Into<Vec<u8>>) -> Self {
    Self {
      status: 200,
      headers: Vec::new(),
      body: body.into(),
      response_type: ResponseType::Basic,
    }
  }

  pub fn with_status(mut self, status: u16) -> Self {
    self.status = status;
    self
  }

  pub fn with_type(mut self, response_type: ResponseType) -> Self {
    self.response_type = response_type;
    self
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  /// Status in the 200-299 range.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Only exact 200s of type basic are written through during fetch handling.
  pub fn is_cacheable(&self) -> bool {
    self.status == 200 && self.response_type == ResponseType::Basic
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

/// A response read back from a bucket.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  pub key: RequestKey,
  pub response: StoredResponse,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

/// Where a fetch response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Served verbatim from the current bucket
  Cache,
  /// Fetched from the network (and possibly written through)
  Network,
  /// Network failed on a navigation; cached root document served instead
  OfflineFallback,
}

/// Response produced by an intercepted fetch, with metadata about the source.
#[derive(Debug, Clone)]
pub struct FetchResult {
  pub response: StoredResponse,
  pub source: CacheSource,
}

impl FetchResult {
  pub fn from_cache(response: StoredResponse) -> Self {
    Self {
      response,
      source: CacheSource::Cache,
    }
  }

  pub fn from_network(response: StoredResponse) -> Self {
    Self {
      response,
      source: CacheSource::Network,
    }
  }

  pub fn offline(response: StoredResponse) -> Self {
    Self {
      response,
      source: CacheSource::OfflineFallback,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_request_key_ignores_fragment() {
    let a = RequestKey::new(&Method::GET, &url("http://localhost:8000/#features"));
    let b = RequestKey::new(&Method::GET, &url("http://localhost:8000/"));
    assert_eq!(a, b);
    assert_eq!(a.storage_hash(), b.storage_hash());
  }

  #[test]
  fn test_request_key_keeps_query() {
    let a = RequestKey::new(&Method::GET, &url("http://localhost:8000/css/style.css?v=2"));
    let b = RequestKey::new(&Method::GET, &url("http://localhost:8000/css/style.css"));
    assert_ne!(a.storage_hash(), b.storage_hash());
  }

  #[test]
  fn test_storage_hash_depends_on_method() {
    let u = url("http://localhost:8000/api/partnership");
    let get = RequestKey::new(&Method::GET, &u);
    let post = RequestKey::new(&Method::POST, &u);
    assert_ne!(get.storage_hash(), post.storage_hash());
    assert_eq!(get.storage_hash().len(), 64);
  }

  #[test]
  fn test_cacheable_requires_200_basic() {
    assert!(StoredResponse::basic("ok").is_cacheable());
    assert!(!StoredResponse::basic("").with_status(204).is_cacheable());
    assert!(!StoredResponse::basic("").with_status(404).is_cacheable());
    assert!(!StoredResponse::basic("x")
      .with_type(ResponseType::Opaque)
      .is_cacheable());
    assert!(!StoredResponse::basic("x")
      .with_type(ResponseType::Cors)
      .is_cacheable());
  }

  #[test]
  fn test_is_ok_range() {
    assert!(StoredResponse::basic("").with_status(204).is_ok());
    assert!(!StoredResponse::basic("").with_status(304).is_ok());
    assert!(!StoredResponse::basic("").with_status(500).is_ok());
  }

  #[test]
  fn test_header_lookup_is_case_insensitive() {
    let response = StoredResponse::basic("body").with_header("Content-Type", "text/css");
    assert_eq!(response.header("content-type"), Some("text/css"));
    assert_eq!(response.header("etag"), None);
  }

  #[test]
  fn test_response_type_round_trips_through_str() {
    for ty in [
      ResponseType::Basic,
      ResponseType::Cors,
      ResponseType::Opaque,
      ResponseType::Error,
    ] {
      assert_eq!(ty.as_str().parse::<ResponseType>().unwrap(), ty);
    }
  }
}
