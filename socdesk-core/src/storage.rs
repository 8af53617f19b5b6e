use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::db::{create_backend, BackendType, CaseBackend};
use crate::error::{IncidentError, Result};
use crate::models::{Case, CaseMap};

/// How long to wait for another process to release the database lock
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The full case collection held in memory over a persistent backend
///
/// The in-memory mapping only changes when a backend read or write has
/// succeeded, so a failed load never adopts partial data and a failed save
/// never leaves memory ahead of disk. An advisory lock on `<db>.lock`
/// serializes load-modify-save cycles across processes.
pub struct IncidentStore {
    backend: Box<dyn CaseBackend>,
    lock_file_path: PathBuf,
    cases: CaseMap,
}

impl IncidentStore {
    /// Creates an empty store over `backend` without reading it
    pub fn new(backend: Box<dyn CaseBackend>) -> Self {
        let lock_file_path = lock_path_for(backend.path());
        Self {
            backend,
            lock_file_path,
            cases: CaseMap::new(),
        }
    }

    /// Opens the database at `path` and loads it
    pub fn open<P: AsRef<Path>>(path: P, backend_type: Option<BackendType>) -> Result<Self> {
        let backend = create_backend(path.as_ref(), backend_type)?;
        let mut store = Self::new(backend);
        store.load()?;
        Ok(store)
    }

    /// Returns the path to the database file
    pub fn path(&self) -> &Path {
        self.backend.path()
    }

    pub fn backend(&self) -> &dyn CaseBackend {
        self.backend.as_ref()
    }

    /// Reads the persisted collection, replacing the in-memory mapping only
    /// if the read and parse both succeed
    pub fn load(&mut self) -> Result<()> {
        let _lock = self.acquire_read_lock()?;
        let cases = self.backend.load()?;
        tracing::debug!(path = %self.path().display(), count = cases.len(), "loaded cases");
        self.cases = cases;
        Ok(())
    }

    /// Writes the full in-memory mapping back to the backend
    pub fn save(&self) -> Result<()> {
        let _lock = self.acquire_write_lock()?;
        self.backend.save(&self.cases)?;
        tracing::debug!(path = %self.path().display(), count = self.cases.len(), "saved cases");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&Case> {
        self.cases
            .get(id)
            .ok_or_else(|| IncidentError::NotFound(id.to_string()))
    }

    /// Inserts or replaces a case in memory. Does not persist.
    pub fn put(&mut self, case: Case) -> Option<Case> {
        self.cases.insert(case.id.clone(), case)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.cases.contains_key(id)
    }

    pub fn cases(&self) -> &CaseMap {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Perform an atomic update operation with proper locking
    ///
    /// Holding the exclusive lock, this reloads the latest collection from
    /// disk, applies `update_fn` to a staged copy and persists the copy. The
    /// staged copy is adopted only once the write succeeds; if `update_fn`
    /// fails nothing is written.
    pub fn update_atomically<T, F>(&mut self, update_fn: F) -> Result<T>
    where
        F: FnOnce(&mut CaseMap) -> Result<T>,
    {
        let _lock = self.acquire_write_lock()?;

        // Another process may have written since our last load
        self.cases = self.backend.load()?;

        let mut staged = self.cases.clone();
        let output = update_fn(&mut staged)?;

        if let Err(e) = self.backend.save(&staged) {
            tracing::warn!(path = %self.path().display(), error = %e, "save failed, mutation discarded");
            return Err(e);
        }

        self.cases = staged;
        Ok(output)
    }

    fn open_lock_file(&self) -> Result<File> {
        if let Some(parent) = self
            .lock_file_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            fs::create_dir_all(parent)
                .map_err(|e| IncidentError::storage(&self.lock_file_path, e))?;
        }

        OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.lock_file_path)
            .map_err(|e| IncidentError::storage(&self.lock_file_path, e))
    }

    /// Acquire an exclusive lock for writing.
    /// The returned handle must be held for the duration of the operation.
    fn acquire_write_lock(&self) -> Result<File> {
        let mut lock_file = self.open_lock_file()?;
        self.wait_for_lock(|f| FileExt::try_lock_exclusive(f), &lock_file)?;

        // Lock holder info, for debugging stale locks
        let _ = lock_file.set_len(0);
        let _ = writeln!(
            lock_file,
            "Locked by PID {} at {}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        );

        Ok(lock_file)
    }

    /// Acquire a shared lock for reading
    fn acquire_read_lock(&self) -> Result<File> {
        let lock_file = self.open_lock_file()?;
        self.wait_for_lock(|f| FileExt::try_lock_shared(f), &lock_file)?;
        Ok(lock_file)
    }

    fn wait_for_lock<F>(&self, try_lock: F, lock_file: &File) -> Result<()>
    where
        F: Fn(&File) -> std::io::Result<()>,
    {
        let start = Instant::now();

        loop {
            match try_lock(lock_file) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() > LOCK_TIMEOUT {
                        return Err(IncidentError::storage(
                            self.path(),
                            "timeout waiting for database lock - another process may be writing",
                        ));
                    }
                    std::thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(e) => return Err(IncidentError::storage(&self.lock_file_path, e)),
            }
        }
    }
}

/// `db.json` -> `db.json.lock`
fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::JsonBackend;
    use crate::models::{NewCase, Severity};
    use tempfile::TempDir;

    fn store_at(dir: &TempDir) -> IncidentStore {
        IncidentStore::open(dir.path().join("db.json"), None).unwrap()
    }

    #[test]
    fn test_lock_path() {
        assert_eq!(
            lock_path_for(Path::new("/tmp/db.json")),
            PathBuf::from("/tmp/db.json.lock")
        );
        assert_eq!(lock_path_for(Path::new("cases.db")), PathBuf::from("cases.db.lock"));
    }

    #[test]
    fn test_save_then_load_reproduces_cases() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = store_at(&temp_dir);

        let mut new_case = NewCase::new("INC-1");
        new_case.severity = Severity::High;
        let case = Case::new(new_case);
        store.put(case.clone());
        store.save().unwrap();

        // Simulates a process restart
        let reopened = store_at(&temp_dir);
        assert_eq!(reopened.get("INC-1").unwrap(), &case);
    }

    #[test]
    fn test_get_missing_case() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_at(&temp_dir);
        assert!(matches!(
            store.get("INC-404"),
            Err(IncidentError::NotFound(id)) if id == "INC-404"
        ));
    }

    #[test]
    fn test_put_does_not_persist() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = store_at(&temp_dir);
        store.put(Case::new(NewCase::new("INC-1")));

        assert!(store.contains("INC-1"));
        assert!(store_at(&temp_dir).is_empty());
    }

    #[test]
    fn test_failed_load_keeps_previous_mapping() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("db.json");
        let mut store = store_at(&temp_dir);
        store.put(Case::new(NewCase::new("INC-1")));
        store.save().unwrap();

        fs::write(&path, "[{\"IncidentID\": ").unwrap();
        let err = store.load().unwrap_err();

        assert!(matches!(err, IncidentError::MalformedData { .. }));
        assert!(err.is_fatal());
        assert!(store.contains("INC-1"));
    }

    #[test]
    fn test_unreadable_medium_is_storage_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        // A directory where the database file should be
        let path = temp_dir.path().join("db.json");
        fs::create_dir(&path).unwrap();

        let mut store = IncidentStore::new(Box::new(JsonBackend::new(&path)));
        let err = store.load().unwrap_err();
        assert!(matches!(err, IncidentError::StorageUnavailable { .. }));
    }

    #[test]
    fn test_failed_save_leaves_memory_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("db.json");
        fs::create_dir(&path).unwrap();

        let mut store = IncidentStore::new(Box::new(JsonBackend::new(&path)));
        store.put(Case::new(NewCase::new("INC-1")));

        let err = store.save().unwrap_err();
        assert!(matches!(err, IncidentError::StorageUnavailable { .. }));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_update_atomically_discards_failed_update() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = store_at(&temp_dir);
        store
            .update_atomically(|cases| {
                cases.insert("INC-1".to_string(), Case::new(NewCase::new("INC-1")));
                Ok(())
            })
            .unwrap();

        let result: Result<()> = store.update_atomically(|cases| {
            cases.remove("INC-1");
            Err(IncidentError::NotFound("INC-2".to_string()))
        });

        assert!(result.is_err());
        assert!(store.contains("INC-1"));
        assert!(store_at(&temp_dir).contains("INC-1"));
    }

    #[test]
    fn test_update_atomically_sees_other_writers() {
        let temp_dir = TempDir::new().unwrap();
        let mut first = store_at(&temp_dir);
        let mut second = store_at(&temp_dir);

        first
            .update_atomically(|cases| {
                cases.insert("INC-A".to_string(), Case::new(NewCase::new("INC-A")));
                Ok(())
            })
            .unwrap();
        // `second` loaded before INC-A existed; its update must not drop it
        second
            .update_atomically(|cases| {
                cases.insert("INC-B".to_string(), Case::new(NewCase::new("INC-B")));
                Ok(())
            })
            .unwrap();

        let reopened = store_at(&temp_dir);
        assert!(reopened.contains("INC-A"));
        assert!(reopened.contains("INC-B"));
    }
}
