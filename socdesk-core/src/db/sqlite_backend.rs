//! SQLite database storage backend
//!
//! Each case is stored as one row holding its JSON record. Status and
//! severity are duplicated into columns so the table stays queryable from
//! the sqlite3 shell.

use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::index_cases;
use super::traits::{BackendType, CaseBackend};
use crate::error::{IncidentError, Result};
use crate::models::{Case, CaseMap};

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

/// SQLite backend implementation
pub struct SqliteBackend {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Opens (or creates) a SQLite database at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Create parent directories if needed
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| IncidentError::storage(&path, e))?;
        }

        let conn = Connection::open(&path).map_err(|e| IncidentError::storage(&path, e))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| IncidentError::storage(&path, e))?;

        let backend = Self {
            path,
            conn: Mutex::new(conn),
        };

        backend.init_schema()?;
        Ok(backend)
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| IncidentError::storage(&self.path, "connection mutex poisoned"))
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.connection()?;

        // A missing table reads as version 0
        let current_version: i32 = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0);

        if current_version == 0 {
            conn.execute_batch(include_str!("schema.sql"))
                .map_err(|e| IncidentError::storage(&self.path, e))?;
        } else if current_version != SCHEMA_VERSION {
            return Err(IncidentError::malformed(
                &self.path,
                format!(
                    "schema version {} is not supported, expected {}",
                    current_version, SCHEMA_VERSION
                ),
            ));
        }

        Ok(())
    }
}

impl CaseBackend for SqliteBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Sqlite
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<CaseMap> {
        let conn = self.connection()?;
        let storage_err = |e: rusqlite::Error| IncidentError::storage(&self.path, e);

        let mut stmt = conn
            .prepare("SELECT id, body FROM cases ORDER BY id")
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(storage_err)?;

        let mut cases = Vec::new();
        for row in rows {
            let (id, body) = row.map_err(storage_err)?;
            let case: Case = serde_json::from_str(&body).map_err(|e| {
                IncidentError::malformed(&self.path, format!("case {}: {}", id, e))
            })?;
            if case.id != id {
                return Err(IncidentError::malformed(
                    &self.path,
                    format!("row {} holds record for {}", id, case.id),
                ));
            }
            cases.push(case);
        }

        index_cases(cases, &self.path)
    }

    fn save(&self, cases: &CaseMap) -> Result<()> {
        let mut conn = self.connection()?;
        let storage_err = |e: rusqlite::Error| IncidentError::storage(&self.path, e);

        // Rolled back on drop unless committed
        let tx = conn.transaction().map_err(storage_err)?;
        tx.execute("DELETE FROM cases", []).map_err(storage_err)?;

        for case in cases.values() {
            let body = serde_json::to_string(case)
                .map_err(|e| IncidentError::storage(&self.path, e))?;
            tx.execute(
                "INSERT INTO cases (id, status, severity, body) VALUES (?1, ?2, ?3, ?4)",
                params![case.id, case.status.as_str(), case.severity.as_str(), body],
            )
            .map_err(storage_err)?;
        }

        tx.commit().map_err(storage_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CaseStatus, NewCase, Note};
    use tempfile::NamedTempFile;

    #[test]
    fn test_sqlite_backend_create_and_load() {
        let temp_file = NamedTempFile::with_suffix(".db").unwrap();
        let backend = SqliteBackend::new(temp_file.path()).unwrap();

        backend.create_if_not_exists().unwrap();

        assert!(backend.load().unwrap().is_empty());
    }

    #[test]
    fn test_sqlite_backend_save_and_load() {
        let temp_file = NamedTempFile::with_suffix(".db").unwrap();
        let backend = SqliteBackend::new(temp_file.path()).unwrap();

        let mut case = Case::new(NewCase::new("INC-9"));
        case.status = CaseStatus::Resolved;
        case.notes
            .push(Note::new("host reimaged".to_string(), "SOC-User".to_string()));

        let mut cases = CaseMap::new();
        cases.insert(case.id.clone(), case.clone());
        backend.save(&cases).unwrap();

        let loaded = backend.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["INC-9"], case);

        // Saving a smaller collection replaces the rows wholesale
        backend.save(&CaseMap::new()).unwrap();
        assert!(backend.load().unwrap().is_empty());
    }

    #[test]
    fn test_sqlite_backend_reopen_keeps_schema() {
        let temp_file = NamedTempFile::with_suffix(".db").unwrap();
        {
            let backend = SqliteBackend::new(temp_file.path()).unwrap();
            let mut cases = CaseMap::new();
            cases.insert("INC-1".to_string(), Case::new(NewCase::new("INC-1")));
            backend.save(&cases).unwrap();
        }

        let reopened = SqliteBackend::new(temp_file.path()).unwrap();
        assert!(reopened.load().unwrap().contains_key("INC-1"));
        assert_eq!(reopened.stats().unwrap().case_count, 1);
    }
}
