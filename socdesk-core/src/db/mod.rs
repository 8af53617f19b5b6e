//! Storage backends for the incident case collection
//!
//! The store works against the [`CaseBackend`] trait so the single JSON file
//! can be swapped for an embedded database without changing the record
//! manager's contract.

mod json_backend;
mod migration;
mod sqlite_backend;
mod traits;

pub use json_backend::JsonBackend;
pub use migration::{export_backend_to_json, export_to_json, import_from_json, migrate};
pub use sqlite_backend::SqliteBackend;
pub use traits::{BackendType, CaseBackend, DatabaseStats};

use std::path::Path;

use crate::error::{IncidentError, Result};
use crate::models::{Case, CaseMap};

/// Creates a backend based on the file extension or explicit type
pub fn create_backend(
    path: &Path,
    backend_type: Option<BackendType>,
) -> Result<Box<dyn CaseBackend>> {
    let bt = backend_type.unwrap_or_else(|| BackendType::from_path(path));

    match bt {
        BackendType::Json => Ok(Box::new(JsonBackend::new(path))),
        BackendType::Sqlite => Ok(Box::new(SqliteBackend::new(path)?)),
    }
}

/// Keys decoded cases by id, rejecting duplicates and normalizing note indices
pub(crate) fn index_cases(cases: Vec<Case>, path: &Path) -> Result<CaseMap> {
    let mut map = CaseMap::new();
    for mut case in cases {
        if case.id.trim().is_empty() {
            return Err(IncidentError::malformed(path, "case with empty IncidentID"));
        }
        case.reindex_notes();
        let id = case.id.clone();
        if map.insert(id.clone(), case).is_some() {
            return Err(IncidentError::malformed(
                path,
                format!("duplicate IncidentID '{}'", id),
            ));
        }
    }
    Ok(map)
}
