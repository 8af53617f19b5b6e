pub mod config;
pub mod db;
pub mod error;
pub mod manager;
pub mod models;
pub mod storage;
pub mod tools;

// Re-export commonly used types
pub use config::{get_config_path, DeskConfig};
pub use db::{create_backend, BackendType, CaseBackend, DatabaseStats, JsonBackend, SqliteBackend};
pub use error::{ErrorKind, IncidentError};
pub use manager::IncidentManager;
pub use models::{
    Case, CaseFilter, CaseMap, CaseStatus, CaseSummary, NewCase, Note, NoteRemoval,
    Severity, DEFAULT_ANALYST,
};
pub use storage::IncidentStore;
pub use tools::{find_tool, tool_schemas, Dispatcher, ToolError, ToolReply, ToolSpec, TOOLS};
