use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::db::BackendType;
use crate::error::{IncidentError, Result};
use crate::models::DEFAULT_ANALYST;

/// Environment variable naming an alternative config file
pub const CONFIG_PATH_ENV: &str = "SOCDESK_CONFIG";
/// Environment variable naming the database file
pub const DB_PATH_ENV: &str = "SOCDESK_DB";
/// Database used when nothing else is configured
pub const DEFAULT_DB_PATH: &str = "db.json";

/// User configuration, stored as YAML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeskConfig {
    /// Path to the case database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,

    /// Storage backend; inferred from the database extension when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendType>,

    /// Author recorded on notes added without one
    #[serde(default = "default_analyst")]
    pub analyst: String,
}

fn default_analyst() -> String {
    DEFAULT_ANALYST.to_string()
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            backend: None,
            analyst: default_analyst(),
        }
    }
}

impl DeskConfig {
    /// Loads the config from `path`; a missing file yields the defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| IncidentError::storage(path, e))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content).map_err(|e| IncidentError::malformed(path, e))
    }

    /// Save the config to the specified path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self).map_err(|e| IncidentError::storage(path, e))?;

        // Ensure parent directories exist
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| IncidentError::storage(path, e))?;
        }

        fs::write(path, content).map_err(|e| IncidentError::storage(path, e))
    }

    /// Picks the database path.
    ///
    /// Priority: explicit override, then `SOCDESK_DB`, then `db_path` from
    /// this config, then `db.json` in the working directory.
    pub fn resolve_db_path(&self, explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }

        if let Ok(path) = env::var(DB_PATH_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        self.db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH))
    }
}

/// Gets the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    // Check if SOCDESK_CONFIG environment variable is set
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        return Ok(PathBuf::from(path));
    }

    // Default to ~/.socdesk.yaml
    let home_dir = dirs::home_dir().ok_or_else(|| {
        IncidentError::storage(CONFIG_PATH_ENV, "failed to determine home directory")
    })?;

    Ok(home_dir.join(".socdesk.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = DeskConfig::load(temp_dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, DeskConfig::default());
        assert_eq!(config.analyst, DEFAULT_ANALYST);
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("conf").join("socdesk.yaml");

        let config = DeskConfig {
            db_path: Some(PathBuf::from("/var/lib/soc/cases.db")),
            backend: Some(BackendType::Sqlite),
            analyst: "dana".to_string(),
        };
        config.save(&path).unwrap();

        assert_eq!(DeskConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("socdesk.yaml");
        fs::write(&path, "backend: json\n").unwrap();

        let config = DeskConfig::load(&path).unwrap();
        assert_eq!(config.backend, Some(BackendType::Json));
        assert_eq!(config.analyst, DEFAULT_ANALYST);
        assert!(config.db_path.is_none());
    }

    #[test]
    fn test_malformed_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("socdesk.yaml");
        fs::write(&path, "backend: [json\n").unwrap();

        assert!(matches!(
            DeskConfig::load(&path),
            Err(IncidentError::MalformedData { .. })
        ));
    }

    #[test]
    fn test_explicit_db_path_wins() {
        let config = DeskConfig {
            db_path: Some(PathBuf::from("from-config.json")),
            ..DeskConfig::default()
        };
        assert_eq!(
            config.resolve_db_path(Some(Path::new("explicit.json"))),
            PathBuf::from("explicit.json")
        );
    }
}
