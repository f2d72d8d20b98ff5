//! Expiring key/value store persisted to a CSV snapshot
//!
//! Provides a `CacheStore` that maps a key (e.g. a city name) to a previously
//! fetched text result and the time it was fetched. Lookups serve the stored
//! result while it is younger than the TTL and otherwise run the supplied fetch
//! operation inline. The store only touches disk when `load` or `save` is
//! called explicitly.

use chrono::{Duration, NaiveDateTime};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::future::Future;
use std::io;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// How long a cached result stays fresh, in hours
pub const CACHE_TTL_HOURS: i64 = 10;

/// Timestamp layout used in the snapshot file
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Header row written at the top of every snapshot
const HEADER: [&str; 3] = ["key", "result", "timestamp"];

/// Errors that can occur while loading or saving the snapshot
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing the snapshot failed
    #[error("Cache file I/O failed: {0}")]
    Io(#[from] io::Error),

    /// The snapshot is not valid CSV or a record is missing a field
    #[error("Malformed cache record: {0}")]
    Csv(#[from] csv::Error),

    /// A record carries a timestamp that is not `YYYY-MM-DD HH:MM:SS`
    #[error("Invalid timestamp '{value}' for key '{key}'")]
    InvalidTimestamp { key: String, value: String },
}

/// A cached result and the moment it was computed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// The cached payload, encoded as text by the caller
    pub result: String,
    /// When the payload was fetched
    pub fetched_at: NaiveDateTime,
}

impl CacheEntry {
    /// Returns true while `now - fetched_at` is below the TTL
    pub fn is_fresh(&self, now: NaiveDateTime) -> bool {
        now - self.fetched_at < Duration::hours(CACHE_TTL_HOURS)
    }
}

/// One row of the snapshot file
#[derive(Debug, serde::Deserialize)]
struct CacheRecord {
    key: String,
    result: String,
    timestamp: String,
}

/// In-memory cache with an explicit CSV snapshot
///
/// Entries are kept in a `BTreeMap` so a save always writes rows sorted by
/// key. Stale entries are never evicted; they are treated as misses until a
/// fresh fetch overwrites them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStore {
    entries: BTreeMap<String, CacheEntry>,
}

impl CacheStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a store from the snapshot at `path`
    ///
    /// A missing file yields an empty store. Any malformed record fails the
    /// whole load.
    ///
    /// # Arguments
    /// * `path` - Location of the CSV snapshot
    ///
    /// # Returns
    /// * `Ok(CacheStore)` with every record from the file
    /// * `Err(CacheError)` if the file cannot be read or a record is malformed
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No cache snapshot at {}, starting empty", path.display());
                return Ok(Self::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(file);

        let mut entries = BTreeMap::new();
        for record in reader.deserialize::<CacheRecord>() {
            let record = record?;
            let fetched_at = NaiveDateTime::parse_from_str(&record.timestamp, TIMESTAMP_FORMAT)
                .map_err(|_| CacheError::InvalidTimestamp {
                    key: record.key.clone(),
                    value: record.timestamp.clone(),
                })?;
            entries.insert(
                record.key,
                CacheEntry {
                    result: record.result,
                    fetched_at,
                },
            );
        }

        debug!("Loaded {} cache entries from {}", entries.len(), path.display());
        Ok(Self { entries })
    }

    /// Writes every entry to `path`, replacing the file
    ///
    /// Missing parent directories are created first. Timestamps are written
    /// at whole-second precision.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)?;

        writer.write_record(HEADER)?;
        for (key, entry) in &self.entries {
            let timestamp = entry.fetched_at.format(TIMESTAMP_FORMAT).to_string();
            writer.write_record([key.as_str(), entry.result.as_str(), timestamp.as_str()])?;
        }
        writer.flush()?;

        debug!("Saved {} cache entries to {}", self.entries.len(), path.display());
        Ok(())
    }

    /// Returns the stored result for `key` if it is still fresh at `now`
    ///
    /// This is the lookup without a fetch operation: a missing or stale key
    /// yields `None` and the store is left untouched.
    pub fn get(&self, key: &str, now: NaiveDateTime) -> Option<&str> {
        match self.entries.get(key) {
            Some(entry) if entry.is_fresh(now) => {
                info!("Using cached result for '{}'", key);
                Some(entry.result.as_str())
            }
            Some(_) => {
                info!("Cached result for '{}' has expired", key);
                None
            }
            None => {
                debug!("No cached result for '{}'", key);
                None
            }
        }
    }

    /// Returns the fresh cached result for `key`, or runs `fetch` and stores its result
    ///
    /// `fetch` is called at most once. When it fails nothing is written and
    /// its error is returned unchanged.
    ///
    /// # Arguments
    /// * `key` - Cache key (e.g. a city name)
    /// * `now` - The time of the lookup, also recorded as the fetch time
    /// * `fetch` - Operation producing the real value on a miss
    pub fn get_or_fetch<F, E>(&mut self, key: &str, now: NaiveDateTime, fetch: F) -> Result<String, E>
    where
        F: FnOnce() -> Result<String, E>,
    {
        if let Some(result) = self.get(key, now) {
            return Ok(result.to_string());
        }

        info!("Cache miss, fetching '{}'", key);
        let result = fetch()?;
        self.insert(key, result.clone(), now);
        Ok(result)
    }

    /// Async form of [`CacheStore::get_or_fetch`]
    ///
    /// The future returned by `fetch` is awaited inline before this call returns.
    pub async fn get_or_fetch_async<F, Fut, E>(
        &mut self,
        key: &str,
        now: NaiveDateTime,
        fetch: F,
    ) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        if let Some(result) = self.get(key, now) {
            return Ok(result.to_string());
        }

        info!("Cache miss, fetching '{}'", key);
        let result = fetch().await?;
        self.insert(key, result.clone(), now);
        Ok(result)
    }

    /// Stores `result` under `key`, replacing any previous entry
    pub fn insert(&mut self, key: impl Into<String>, result: String, fetched_at: NaiveDateTime) {
        self.entries
            .insert(key.into(), CacheEntry { result, fetched_at });
    }

    /// Drops the entry for `key`, returning it if present
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        self.entries.remove(key)
    }

    /// Returns the raw entry for `key`, fresh or not
    pub fn entry(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Iterates over all entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CacheEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
