//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::types::{CachedEntry, RequestKey, ResponseType, StoredResponse};

/// Trait for cache storage backends.
///
/// A backend holds any number of named buckets, each a mapping from
/// request identity to stored response.
pub trait CacheStorage: Send + Sync {
  /// Names of all existing buckets, oldest first.
  fn bucket_names(&self) -> Result<Vec<String>>;

  /// Whether a bucket with this name exists.
  fn has_bucket(&self, bucket: &str) -> Result<bool>;

  /// Create the bucket if it does not exist yet.
  fn open_bucket(&self, bucket: &str) -> Result<()>;

  /// Delete a bucket and all its entries. Returns false if it did not exist.
  fn delete_bucket(&self, bucket: &str) -> Result<bool>;

  /// Look up a stored response.
  fn match_request(&self, bucket: &str, key: &RequestKey) -> Result<Option<CachedEntry>>;

  /// Store a single response in an existing bucket, replacing any entry for
  /// the same key. Returns false without writing if the bucket is missing.
  fn put(&self, bucket: &str, key: &RequestKey, response: &StoredResponse) -> Result<bool>;

  /// Store every entry in one transaction: either all land or none do, and
  /// the bucket only comes into existence if the whole batch commits.
  fn put_all(&self, bucket: &str, entries: &[(RequestKey, StoredResponse)]) -> Result<()>;

  /// Number of entries in a bucket (0 for a missing bucket).
  fn entry_count(&self, bucket: &str) -> Result<usize>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the storage at `path`, or at the default location.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Storage that lives only as long as this value.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("luccabot-sw").join("cache.db"))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- One row per named bucket
CREATE TABLE IF NOT EXISTS buckets (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Stored responses, keyed by sha256("<METHOD> <url>")
CREATE TABLE IF NOT EXISTS entries (
    bucket TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    response_type TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (bucket, key_hash),
    FOREIGN KEY (bucket) REFERENCES buckets(name) ON DELETE CASCADE
);
"#;

fn insert_bucket(conn: &Connection, bucket: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO buckets (name) VALUES (?)",
      params![bucket],
    )
    .map_err(|e| eyre!("Failed to create bucket {}: {}", bucket, e))?;
  Ok(())
}

fn insert_entry(
  conn: &Connection,
  bucket: &str,
  key: &RequestKey,
  response: &StoredResponse,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO entries
         (bucket, key_hash, method, url, status, response_type, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        bucket,
        key.storage_hash(),
        key.method(),
        key.url(),
        response.status,
        response.response_type.as_str(),
        headers,
        response.body,
      ],
    )
    .map_err(|e| eyre!("Failed to store {} in {}: {}", key.url(), bucket, e))?;

  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn bucket_names(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT name FROM buckets ORDER BY created_at, rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list buckets: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read bucket name: {}", e))?;

    Ok(names)
  }

  fn has_bucket(&self, bucket: &str) -> Result<bool> {
    let conn = self.lock()?;

    let found = conn
      .query_row(
        "SELECT 1 FROM buckets WHERE name = ?",
        params![bucket],
        |_| Ok(()),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up bucket {}: {}", bucket, e))?;

    Ok(found.is_some())
  }

  fn open_bucket(&self, bucket: &str) -> Result<()> {
    let conn = self.lock()?;
    insert_bucket(&conn, bucket)
  }

  fn delete_bucket(&self, bucket: &str) -> Result<bool> {
    let conn = self.lock()?;
    let tx = conn
      .unchecked_transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM entries WHERE bucket = ?", params![bucket])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", bucket, e))?;
    let removed = tx
      .execute("DELETE FROM buckets WHERE name = ?", params![bucket])
      .map_err(|e| eyre!("Failed to delete bucket {}: {}", bucket, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn match_request(&self, bucket: &str, key: &RequestKey) -> Result<Option<CachedEntry>> {
    let conn = self.lock()?;

    let row: Option<(String, String, u16, String, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT method, url, status, response_type, headers, body, cached_at FROM entries
         WHERE bucket = ? AND key_hash = ?",
        params![bucket, key.storage_hash()],
        |row| {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
          ))
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {} in {}: {}", key.url(), bucket, e))?;

    let Some((method, url, status, response_type, headers, body, cached_at)) = row else {
      return Ok(None);
    };

    let headers: Vec<(String, String)> = serde_json::from_str(&headers)
      .map_err(|e| eyre!("Failed to deserialize headers for {}: {}", url, e))?;

    Ok(Some(CachedEntry {
      key: RequestKey::from_parts(method, url),
      response: StoredResponse {
        status,
        headers,
        body,
        response_type: response_type.parse::<ResponseType>()?,
      },
      cached_at: parse_datetime(&cached_at)?,
    }))
  }

  fn put(&self, bucket: &str, key: &RequestKey, response: &StoredResponse) -> Result<bool> {
    let conn = self.lock()?;
    let tx = conn
      .unchecked_transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    // Only install creates buckets
    let exists = tx
      .query_row(
        "SELECT 1 FROM buckets WHERE name = ?",
        params![bucket],
        |_| Ok(()),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up bucket {}: {}", bucket, e))?
      .is_some();
    if !exists {
      return Ok(false);
    }

    insert_entry(&tx, bucket, key, response)?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(true)
  }

  fn put_all(&self, bucket: &str, entries: &[(RequestKey, StoredResponse)]) -> Result<()> {
    let conn = self.lock()?;
    let tx = conn
      .unchecked_transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    insert_bucket(&tx, bucket)?;
    for (key, response) in entries {
      insert_entry(&tx, bucket, key, response)?;
    }

    // Dropping the transaction on an early return rolls everything back
    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn entry_count(&self, bucket: &str) -> Result<usize> {
    let conn = self.lock()?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM entries WHERE bucket = ?",
        params![bucket],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries of {}: {}", bucket, e))?;

    Ok(count as usize)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
