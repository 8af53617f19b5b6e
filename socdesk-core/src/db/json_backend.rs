//! JSON file storage backend
//!
//! All cases live in one JSON array. Saves go to a temporary sibling file
//! which is then renamed over the target, so a failed write never leaves a
//! half-written database behind.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::index_cases;
use super::traits::{BackendType, CaseBackend};
use crate::error::{IncidentError, Result};
use crate::models::{Case, CaseMap};

/// JSON file backend implementation
pub struct JsonBackend {
    path: PathBuf,
}

impl JsonBackend {
    /// Creates a new JSON backend for the given file path
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl CaseBackend for JsonBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Json
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<CaseMap> {
        // A database that was never written is an empty one
        if !self.path.exists() {
            return Ok(CaseMap::new());
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|e| IncidentError::storage(&self.path, e))?;
        if content.trim().is_empty() {
            return Ok(CaseMap::new());
        }

        let cases: Vec<Case> = serde_json::from_str(&content)
            .map_err(|e| IncidentError::malformed(&self.path, e))?;

        index_cases(cases, &self.path)
    }

    fn save(&self, cases: &CaseMap) -> Result<()> {
        let dir = self.parent_dir();
        fs::create_dir_all(dir).map_err(|e| IncidentError::storage(&self.path, e))?;

        let records: Vec<&Case> = cases.values().collect();
        let json = serde_json::to_string_pretty(&records)
            .map_err(|e| IncidentError::storage(&self.path, e))?;

        let mut staged =
            NamedTempFile::new_in(dir).map_err(|e| IncidentError::storage(&self.path, e))?;
        let write_all = |file: &mut NamedTempFile| -> std::io::Result<()> {
            file.write_all(json.as_bytes())?;
            file.write_all(b"\n")?;
            file.as_file().sync_all()
        };
        write_all(&mut staged).map_err(|e| IncidentError::storage(&self.path, e))?;
        staged
            .persist(&self.path)
            .map_err(|e| IncidentError::storage(&self.path, e.error))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewCase, Note, Severity};
    use tempfile::TempDir;

    #[test]
    fn test_json_backend_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let backend = JsonBackend::new(temp_dir.path().join("db.json"));

        assert!(!backend.exists());
        assert!(backend.load().unwrap().is_empty());
    }

    #[test]
    fn test_json_backend_create_if_not_exists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("db.json");
        let backend = JsonBackend::new(&path);

        backend.create_if_not_exists().unwrap();
        assert!(backend.exists());
        assert_eq!(fs::read_to_string(&path).unwrap().trim(), "[]");

        let mut cases = CaseMap::new();
        cases.insert("INC-1".to_string(), Case::new(NewCase::new("INC-1")));
        backend.save(&cases).unwrap();
        backend.create_if_not_exists().unwrap();
        assert_eq!(backend.load().unwrap().len(), 1);
    }

    #[test]
    fn test_json_backend_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let backend = JsonBackend::new(temp_dir.path().join("nested").join("db.json"));

        let mut new_case = NewCase::new("INC-20241129-001");
        new_case.severity = Severity::Critical;
        new_case.description = "Credential stuffing against VPN".to_string();
        let mut case = Case::new(new_case);
        case.notes
            .push(Note::new("rotated credentials".to_string(), "dana".to_string()));

        let mut cases = CaseMap::new();
        cases.insert(case.id.clone(), case.clone());
        backend.save(&cases).unwrap();

        let loaded = backend.load().unwrap();
        assert_eq!(loaded.get("INC-20241129-001"), Some(&case));
    }

    #[test]
    fn test_json_backend_writes_original_layout() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("db.json");
        let backend = JsonBackend::new(&path);

        let mut cases = CaseMap::new();
        for id in ["INC-2", "INC-1"] {
            cases.insert(id.to_string(), Case::new(NewCase::new(id)));
        }
        backend.save(&cases).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let records = raw.as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["IncidentID"], "INC-1");
        assert_eq!(records[1]["IncidentID"], "INC-2");
        assert_eq!(records[0]["CaseStatus"], "Open");
    }

    #[test]
    fn test_json_backend_malformed_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("db.json");
        fs::write(&path, "{ not json").unwrap();

        let err = JsonBackend::new(&path).load().unwrap_err();
        assert!(matches!(err, IncidentError::MalformedData { .. }));
    }

    #[test]
    fn test_json_backend_reindexes_legacy_note_ids() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("db.json");
        fs::write(
            &path,
            r#"[{"IncidentID": "INC-1", "CaseStatus": "Open", "SeverityLevel": "High",
                 "Notes": [{"NoteId": 4, "Note": "a"}, {"NoteId": 9, "Note": "b"}]}]"#,
        )
        .unwrap();

        let cases = JsonBackend::new(&path).load().unwrap();
        let notes = &cases["INC-1"].notes;
        assert_eq!(notes[0].index, 0);
        assert_eq!(notes[1].index, 1);
        assert_eq!(notes[1].text, "b");
    }
}
