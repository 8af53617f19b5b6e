//! Migration utilities for moving the case collection between backends
//!
//! Also provides JSON export/import for backups and interoperability.

use std::fs;
use std::path::Path;

use super::traits::CaseBackend;
use super::{create_backend, index_cases, BackendType};
use crate::error::{IncidentError, Result};
use crate::models::{Case, CaseMap};

/// Copies every case from one database to another
///
/// # Arguments
/// * `from` - Path to the source database
/// * `from_type` - Source backend; inferred from the extension when `None`
/// * `to` - Path to the destination database (replaced wholesale)
/// * `to_type` - Destination backend; inferred from the extension when `None`
///
/// # Returns
/// The number of cases migrated
pub fn migrate<P1: AsRef<Path>, P2: AsRef<Path>>(
    from: P1,
    from_type: Option<BackendType>,
    to: P2,
    to_type: Option<BackendType>,
) -> Result<usize> {
    let source = create_backend(from.as_ref(), from_type)?;
    let destination = create_backend(to.as_ref(), to_type)?;

    let cases = source.load()?;
    destination.save(&cases)?;

    tracing::info!(
        from = %source.path().display(),
        to = %destination.path().display(),
        count = cases.len(),
        "migrated case collection"
    );
    Ok(cases.len())
}

/// Exports a case collection to a pretty-printed JSON file
pub fn export_to_json<P: AsRef<Path>>(cases: &CaseMap, json_path: P) -> Result<()> {
    let path = json_path.as_ref();
    let records: Vec<&Case> = cases.values().collect();
    let json =
        serde_json::to_string_pretty(&records).map_err(|e| IncidentError::storage(path, e))?;

    fs::write(path, json).map_err(|e| IncidentError::storage(path, e))
}

/// Imports a case collection from a JSON file
pub fn import_from_json<P: AsRef<Path>>(json_path: P) -> Result<CaseMap> {
    let path = json_path.as_ref();
    let json = fs::read_to_string(path).map_err(|e| IncidentError::storage(path, e))?;

    let cases: Vec<Case> =
        serde_json::from_str(&json).map_err(|e| IncidentError::malformed(path, e))?;

    index_cases(cases, path)
}

/// Exports data from any backend to a JSON file
pub fn export_backend_to_json<P: AsRef<Path>>(
    backend: &dyn CaseBackend,
    json_path: P,
) -> Result<usize> {
    let cases = backend.load()?;
    export_to_json(&cases, json_path)?;
    Ok(cases.len())
}
