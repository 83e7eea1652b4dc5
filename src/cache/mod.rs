//! Versioned response cache.
//!
//! This module provides the storage side of the offline cache controller:
//! - Named buckets mapping request identity (method + URL) to responses
//! - Version tags of the form `<app>-<purpose>-v<semver>`
//! - A SQLite backend that survives restarts of the hosting runtime

mod name;
mod storage;
mod types;

pub use name::CacheName;
pub use storage::{CacheStorage, SqliteStorage};
pub use types::{
  CacheSource, FetchRequest, FetchResult, RequestKey, RequestMode, ResponseType,
  StoredResponse,
};
