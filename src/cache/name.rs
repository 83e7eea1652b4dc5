//! Cache version tags.

use color_eyre::{eyre::eyre, Result};
use semver::Version;
use std::fmt;
use std::str::FromStr;

/// Name of a versioned cache bucket, rendered as `<app>-<purpose>-v<semver>`.
///
/// Bumping the version is the only way old assets get invalidated: the next
/// activation deletes every bucket whose name differs from the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheName {
  app: String,
  purpose: String,
  version: Version,
}

impl CacheName {
  pub fn new(app: impl Into<String>, purpose: impl Into<String>, version: Version) -> Result<Self> {
    let app = app.into();
    let purpose = purpose.into();

    if app.is_empty() || app.contains('-') {
      return Err(eyre!("Invalid cache app name '{}': must be non-empty without '-'", app));
    }
    if purpose.is_empty() || purpose.contains('-') {
      return Err(eyre!(
        "Invalid cache purpose '{}': must be non-empty without '-'",
        purpose
      ));
    }

    Ok(Self {
      app,
      purpose,
      version,
    })
  }

  pub fn version(&self) -> &Version {
    &self.version
  }

  /// The same app and purpose at another version.
  pub fn with_version(&self, version: Version) -> Self {
    Self {
      app: self.app.clone(),
      purpose: self.purpose.clone(),
      version,
    }
  }

  /// Whether `other` belongs to the same app and purpose, regardless of version.
  pub fn same_family(&self, other: &CacheName) -> bool {
    self.app == other.app && self.purpose == other.purpose
  }
}

impl fmt::Display for CacheName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}-v{}", self.app, self.purpose, self.version)
  }
}

impl FromStr for CacheName {
  type Err = color_eyre::Report;

  fn from_str(s: &str) -> Result<Self> {
    let (app, rest) = s
      .split_once('-')
      .ok_or_else(|| eyre!("Cache name '{}' is missing an app prefix", s))?;
    let (purpose, version) = rest
      .split_once("-v")
      .ok_or_else(|| eyre!("Cache name '{}' is missing a '-v<version>' suffix", s))?;
    let version = Version::parse(version)
      .map_err(|e| eyre!("Cache name '{}' has an invalid version: {}", s, e))?;

    Self::new(app, purpose, version)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_display_format() {
    let name = CacheName::new("luccabot", "pwa", Version::new(1, 0, 0)).unwrap();
    assert_eq!(name.to_string(), "luccabot-pwa-v1.0.0");
  }

  #[test]
  fn test_parse_with_prerelease() {
    let name: CacheName = "luccabot-pwa-v2.1.0-rc.1".parse().unwrap();
    assert_eq!(name.version(), &Version::parse("2.1.0-rc.1").unwrap());
    assert_eq!(name.to_string(), "luccabot-pwa-v2.1.0-rc.1");
  }

  #[test]
  fn test_parse_rejects_foreign_names() {
    assert!("workbox-precache".parse::<CacheName>().is_err());
    assert!("luccabot-pwa-vnext".parse::<CacheName>().is_err());
    assert!("luccabot".parse::<CacheName>().is_err());
  }

  #[test]
  fn test_rejects_dash_in_parts() {
    assert!(CacheName::new("lucca-bot", "pwa", Version::new(1, 0, 0)).is_err());
    assert!(CacheName::new("luccabot", "", Version::new(1, 0, 0)).is_err());
  }

  #[test]
  fn test_same_family() {
    let current: CacheName = "luccabot-pwa-v1.0.0".parse().unwrap();
    let old = current.with_version(Version::new(0, 9, 0));
    let other: CacheName = "luccabot-images-v1.0.0".parse().unwrap();

    assert!(current.same_family(&old));
    assert!(!current.same_family(&other));
    assert_ne!(current, old);
  }
}
