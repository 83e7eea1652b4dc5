use color_eyre::{eyre::eyre, Result};
use semver::Version;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::cache::CacheName;
use crate::worker::{NotificationTemplate, WorkerConfig};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin of the landing page the worker serves
  pub origin: String,
  pub cache: CacheConfig,
  /// Root-relative paths precached at install, in order
  pub static_assets: Vec<String>,
  pub sync: SyncConfig,
  pub notification: NotificationTemplate,
  pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub app: String,
  pub purpose: String,
  /// Bump on every deploy to invalidate the previous bucket
  pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  pub analytics_tag: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// SQLite file (default: $XDG_DATA_HOME/luccabot-sw/cache.db)
  pub path: Option<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:8000".to_string(),
      cache: CacheConfig::default(),
      static_assets: [
        "/",
        "/css/style.css",
        "/js/script.js",
        "/images/hero-1.jpg",
        "/images/feature-1.jpg",
        "/manifest.json",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
      sync: SyncConfig::default(),
      notification: NotificationTemplate::default(),
      storage: StorageConfig::default(),
    }
  }
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      app: "luccabot".to_string(),
      purpose: "pwa".to_string(),
      version: "1.0.0".to_string(),
    }
  }
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      analytics_tag: "analytics-sync".to_string(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./luccabot-sw.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/luccabot-sw/config.yaml
  ///
  /// Falls back to the built-in defaults when no file is found. The
  /// `LUCCABOT_SW_ORIGIN` environment variable overrides the origin.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    if let Ok(origin) = std::env::var("LUCCABOT_SW_ORIGIN") {
      config.origin = origin;
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("luccabot-sw.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("luccabot-sw").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Validate and convert into the settings a worker version is built from.
  pub fn worker_config(&self) -> Result<WorkerConfig> {
    let origin = Url::parse(&self.origin)
      .map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))?;
    if !matches!(origin.scheme(), "http" | "https") {
      return Err(eyre!("Origin must be an http(s) URL, got '{}'", self.origin));
    }

    let version = Version::parse(&self.cache.version)
      .map_err(|e| eyre!("Invalid cache version '{}': {}", self.cache.version, e))?;
    let cache_name = CacheName::new(&self.cache.app, &self.cache.purpose, version)?;

    if let Some(bad) = self.static_assets.iter().find(|a| !a.starts_with('/')) {
      return Err(eyre!("Static asset '{}' must be a root-relative path", bad));
    }

    Ok(WorkerConfig {
      cache_name,
      origin,
      static_assets: self.static_assets.clone(),
      analytics_tag: self.sync.analytics_tag.clone(),
      notification: self.notification.clone(),
    })
  }
}
