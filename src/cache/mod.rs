//! Cache module for avoiding repeat API calls
//!
//! This module provides an expiring key/value store whose entries stay fresh for
//! a fixed TTL. The store lives in memory while the process runs and is written
//! to, or reloaded from, a CSV snapshot only on explicit request.

mod store;

pub use store::{CacheEntry, CacheError, CacheStore, CACHE_TTL_HOURS, TIMESTAMP_FORMAT};
