//! Network access for the hosting runtime.

use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use url::{Origin, Url};

use crate::cache::{FetchRequest, RequestMode, ResponseType, StoredResponse};

/// Something that can perform a request on the network.
///
/// An `Err` means the request never produced a response (DNS failure,
/// refused connection, no connectivity). HTTP error statuses are `Ok`.
pub trait Network: Send + Sync {
  fn fetch(&self, request: &FetchRequest) -> impl Future<Output = Result<StoredResponse>> + Send;
}

/// HTTP network client backed by reqwest.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
  origin: Origin,
}

impl HttpNetwork {
  /// Create a client that classifies responses relative to `origin`.
  pub fn new(origin: &Url) -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("luccabot-sw/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      origin: origin.origin(),
    })
  }
}

/// Response type as the page would see it.
///
/// Same-origin final URLs are `basic`. Cross-origin ones are `opaque` for
/// no-cors requests and `cors` otherwise.
pub fn classify_response(origin: &Origin, mode: RequestMode, final_url: &Url) -> ResponseType {
  if &final_url.origin() == origin {
    ResponseType::Basic
  } else if mode == RequestMode::NoCors {
    ResponseType::Opaque
  } else {
    ResponseType::Cors
  }
}

impl Network for HttpNetwork {
  async fn fetch(&self, request: &FetchRequest) -> Result<StoredResponse> {
    let response = self
      .client
      .request(request.method.clone(), request.url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Network request to {} failed: {}", request.url, e))?;

    let status = response.status().as_u16();
    let response_type = classify_response(&self.origin, request.mode, response.url());
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

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read response body from {}: {}", request.url, e))?;

    Ok(StoredResponse {
      status,
      headers,
      body: body.to_vec(),
      response_type,
    })
  }
}
