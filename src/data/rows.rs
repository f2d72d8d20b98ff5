//! Query result loading
//!
//! Query results arrive as a JSON array of row objects, one object per result
//! row keyed by column name.

use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading query rows
#[derive(Debug, Error)]
pub enum RowsError {
    /// The rows file could not be read
    #[error("Failed to read rows from {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The rows file is not an array of the expected rows
    #[error("Invalid rows in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Loads typed rows from a JSON file
///
/// # Arguments
/// * `path` - JSON file holding an array of row objects
/// * `limit` - Keep at most this many rows, like a query `LIMIT`; `None` keeps all
pub fn load_rows<T: DeserializeOwned>(path: &Path, limit: Option<usize>) -> Result<Vec<T>, RowsError> {
    let content = fs::read_to_string(path).map_err(|source| RowsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut rows: Vec<T> = serde_json::from_str(&content).map_err(|source| RowsError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(limit) = limit {
        rows.truncate(limit);
    }
    Ok(rows)
}
