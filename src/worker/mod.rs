//! Offline cache controller.
//!
//! One `Controller` per worker version. Its lifecycle is the pure state
//! machine in [`lifecycle`]; the controller runs the resulting effects
//! against cache storage, the network and the host.

mod controller;
mod lifecycle;
mod notification;

pub use controller::Controller;
pub use lifecycle::{MessageKind, WorkerState};
pub use notification::{Notification, NotificationAction, NotificationTemplate};

use color_eyre::{eyre::eyre, Result};
use semver::Version;
use url::Url;

use crate::cache::CacheName;

/// Everything one worker version needs to know, passed in at construction.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
  /// Name of this version's bucket
  pub cache_name: CacheName,
  /// Origin the worker serves; only same-origin GETs are intercepted
  pub origin: Url,
  /// Root-relative paths precached at install, in order
  pub static_assets: Vec<String>,
  /// Background sync tag that flushes queued analytics
  pub analytics_tag: String,
  pub notification: NotificationTemplate,
}

impl WorkerConfig {
  /// The same configuration for another release.
  pub fn with_version(&self, version: Version) -> Self {
    Self {
      cache_name: self.cache_name.with_version(version),
      ..self.clone()
    }
  }

  /// Resolve a root-relative path (or absolute URL) against the origin.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid path '{}': {}", path, e))
  }

  pub fn root_url(&self) -> Url {
    let mut root = self.origin.clone();
    root.set_path("/");
    root.set_query(None);
    root.set_fragment(None);
    root
  }

  pub fn is_same_origin(&self, url: &Url) -> bool {
    url.origin() == self.origin.origin()
  }
}

#[cfg(test)]
pub(crate) mod test_support {
  use super::*;

  /// Config for `luccabot-pwa-v1.0.0` on `http://localhost:8000`.
  pub fn worker_config(assets: &[&str]) -> WorkerConfig {
    WorkerConfig {
      cache_name: "luccabot-pwa-v1.0.0".parse().unwrap(),
      origin: Url::parse("http://localhost:8000").unwrap(),
      static_assets: assets.iter().map(|a| a.to_string()).collect(),
      analytics_tag: "analytics-sync".to_string(),
      notification: NotificationTemplate::default(),
    }
  }
}
