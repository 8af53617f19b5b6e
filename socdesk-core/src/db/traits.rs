//! Storage backend abstraction
//!
//! This module defines the trait that every case storage backend implements.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{IncidentError, Result};
use crate::models::{CaseMap, CaseStatus};

/// Types of storage backends available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Single JSON document holding every case
    Json,
    /// SQLite database, one row per case
    Sqlite,
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendType::Json => write!(f, "JSON"),
            BackendType::Sqlite => write!(f, "SQLite"),
        }
    }
}

impl FromStr for BackendType {
    type Err = IncidentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(BackendType::Json),
            "sqlite" | "sqlite3" | "db" => Ok(BackendType::Sqlite),
            other => Err(IncidentError::invalid_input(
                "backend",
                format!("unknown backend '{}' (expected json or sqlite)", other),
            )),
        }
    }
}

impl BackendType {
    /// Infers the backend from a file extension, defaulting to JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("db") | Some("sqlite") | Some("sqlite3") => BackendType::Sqlite,
            _ => BackendType::Json,
        }
    }
}

/// Core trait for case storage backends
///
/// Backends move the whole collection at once: `load()` reads every case,
/// `save()` replaces every case. Validation and locking live above this layer
/// in [`crate::storage::IncidentStore`].
pub trait CaseBackend: Send + Sync {
    /// Returns the backend type
    fn backend_type(&self) -> BackendType;

    /// Returns the path to the database file
    fn path(&self) -> &Path;

    /// Loads the entire case collection.
    /// Fails with `StorageUnavailable` on I/O failure and `MalformedData`
    /// when the content cannot be parsed or contains duplicate ids.
    fn load(&self) -> Result<CaseMap>;

    /// Replaces the persisted collection with `cases`
    fn save(&self, cases: &CaseMap) -> Result<()>;

    /// Returns true if the database file exists
    fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Creates the database with an empty collection if it doesn't exist
    fn create_if_not_exists(&self) -> Result<()> {
        if !self.exists() {
            self.save(&CaseMap::new())?;
        }
        Ok(())
    }

    /// Returns statistics about the database
    fn stats(&self) -> Result<DatabaseStats> {
        let cases = self.load()?;
        Ok(DatabaseStats {
            case_count: cases.len(),
            open_count: cases
                .values()
                .filter(|c| c.status == CaseStatus::Open)
                .count(),
            note_count: cases.values().map(|c| c.notes.len()).sum(),
            backend_type: self.backend_type(),
        })
    }
}

/// Statistics about a database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    pub case_count: usize,
    pub open_count: usize,
    pub note_count: usize,
    pub backend_type: BackendType,
}
