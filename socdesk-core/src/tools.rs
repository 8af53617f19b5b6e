//! Tool table and dispatcher
//!
//! The record manager's operations, declared statically with their argument
//! names and types. An external reasoning loop binds against [`TOOLS`] (via
//! [`ToolSpec::json_schema`]) and invokes operations through
//! [`Dispatcher::call`] with JSON arguments.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Mutex;
use thiserror::Error;

use crate::error::IncidentError;
use crate::manager::IncidentManager;
use crate::models::{CaseFilter, NewCase};

const STATUS_VALUES: &[&str] = &["Open", "In Progress", "Resolved", "Closed"];
const SEVERITY_VALUES: &[&str] = &["Low", "Medium", "High", "Critical"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
}

impl ParamType {
    fn json_type(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
        }
    }
}

/// One named argument of a tool
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub param_type: ParamType,
    pub required: bool,
    pub description: &'static str,
    /// Permitted values; empty means unconstrained
    pub allowed: &'static [&'static str],
}

impl ParamSpec {
    const fn required(name: &'static str, param_type: ParamType, description: &'static str) -> Self {
        Self {
            name,
            param_type,
            required: true,
            description,
            allowed: &[],
        }
    }

    const fn optional(name: &'static str, param_type: ParamType, description: &'static str) -> Self {
        Self {
            name,
            param_type,
            required: false,
            description,
            allowed: &[],
        }
    }

    const fn one_of(self, allowed: &'static [&'static str]) -> Self {
        Self { allowed, ..self }
    }
}

/// A callable operation: fixed name, fixed named arguments
#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
}

impl ToolSpec {
    /// Renders the function declaration used for model tool binding
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in self.params {
            let mut property = json!({
                "type": param.param_type.json_type(),
                "description": param.description,
            });
            if !param.allowed.is_empty() {
                property["enum"] = json!(param.allowed);
            }
            if param.param_type == ParamType::Integer {
                property["minimum"] = json!(0);
            }
            properties.insert(param.name.to_string(), property);
        }

        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();

        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            }
        })
    }
}

const INCIDENT_ID: ParamSpec = ParamSpec::required(
    "incident_id",
    ParamType::String,
    "Incident identifier, e.g. INC-20241129-001",
);
const NOTE_INDEX: ParamSpec = ParamSpec::required(
    "note_index",
    ParamType::Integer,
    "0-based position of the note; re-fetch the case after deleting notes",
);

/// Every operation exposed to the dispatcher
pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "create_case",
        description: "Create a new incident case with no notes.",
        params: &[
            INCIDENT_ID,
            ParamSpec::optional("title", ParamType::String, "Short title"),
            ParamSpec::optional("description", ParamType::String, "Description of the incident"),
            ParamSpec::optional(
                "incident_type",
                ParamType::String,
                "Type of the incident, e.g. Phishing Attack, EDR, Malware",
            ),
            ParamSpec::optional("severity", ParamType::String, "Initial severity (default Medium)")
                .one_of(SEVERITY_VALUES),
            ParamSpec::optional("status", ParamType::String, "Initial status (default Open)")
                .one_of(STATUS_VALUES),
        ],
    },
    ToolSpec {
        name: "get_case",
        description: "Get the full record of one case including its notes.",
        params: &[INCIDENT_ID],
    },
    ToolSpec {
        name: "list_cases",
        description: "List case summaries ordered by incident id, optionally filtered.",
        params: &[
            ParamSpec::optional("status", ParamType::String, "Only cases with this status")
                .one_of(STATUS_VALUES),
            ParamSpec::optional("severity", ParamType::String, "Only cases with this severity")
                .one_of(SEVERITY_VALUES),
        ],
    },
    ToolSpec {
        name: "list_open_cases",
        description: "List summaries of all currently open cases.",
        params: &[],
    },
    ToolSpec {
        name: "set_status",
        description: "Change the status of a case.",
        params: &[
            INCIDENT_ID,
            ParamSpec::required("status", ParamType::String, "New status").one_of(STATUS_VALUES),
        ],
    },
    ToolSpec {
        name: "set_severity",
        description: "Change the severity level of a case.",
        params: &[
            INCIDENT_ID,
            ParamSpec::required("severity", ParamType::String, "New severity")
                .one_of(SEVERITY_VALUES),
        ],
    },
    ToolSpec {
        name: "add_note",
        description: "Append an analyst note to a case. Returns the note with its index.",
        params: &[
            INCIDENT_ID,
            ParamSpec::required("note", ParamType::String, "Note text"),
            ParamSpec::optional("created_by", ParamType::String, "Author of the note"),
        ],
    },
    ToolSpec {
        name: "edit_note",
        description: "Replace the text of an existing note.",
        params: &[
            INCIDENT_ID,
            NOTE_INDEX,
            ParamSpec::required("new_text", ParamType::String, "Replacement note text"),
        ],
    },
    ToolSpec {
        name: "delete_note",
        description: "Delete a note. Later notes move down one index.",
        params: &[INCIDENT_ID, NOTE_INDEX],
    },
    ToolSpec {
        name: "list_notes",
        description: "List all notes of a case in chronological order.",
        params: &[INCIDENT_ID],
    },
    ToolSpec {
        name: "delete_case",
        description: "Delete a case and all of its notes.",
        params: &[INCIDENT_ID],
    },
];

/// Looks up a tool by name
pub fn find_tool(name: &str) -> Option<&'static ToolSpec> {
    TOOLS.iter().find(|t| t.name == name)
}

/// JSON function declarations for every tool
pub fn tool_schemas() -> Vec<Value> {
    TOOLS.iter().map(ToolSpec::json_schema).collect()
}

/// Errors returned by [`Dispatcher::call`]
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Bad arguments for {tool}: {reason}")]
    BadArguments { tool: String, reason: String },

    #[error(transparent)]
    Incident(#[from] IncidentError),

    #[error("Failed to encode result of {tool}: {reason}")]
    Encoding { tool: String, reason: String },
}

impl ToolError {
    pub fn code(&self) -> &'static str {
        match self {
            ToolError::UnknownTool(_) => "unknown_tool",
            ToolError::BadArguments { .. } => "bad_arguments",
            ToolError::Incident(e) => e.kind().code(),
            ToolError::Encoding { .. } => "encoding_failed",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ToolError::Incident(e) if e.is_fatal())
    }
}

/// Failure half of a [`ToolReply`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub kind: String,
    pub message: String,
    pub fatal: bool,
}

/// Envelope handed back to the reasoning loop for every call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolFailure>,
}

impl From<Result<Value, ToolError>> for ToolReply {
    fn from(outcome: Result<Value, ToolError>) -> Self {
        match outcome {
            Ok(value) => ToolReply {
                ok: true,
                result: Some(value),
                error: None,
            },
            Err(e) => ToolReply {
                ok: false,
                result: None,
                error: Some(ToolFailure {
                    kind: e.code().to_string(),
                    message: e.to_string(),
                    fatal: e.is_fatal(),
                }),
            },
        }
    }
}

#[derive(Deserialize)]
struct CaseArgs {
    incident_id: String,
}

#[derive(Deserialize)]
struct CreateCaseArgs {
    incident_id: String,
    title: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    incident_type: String,
    severity: Option<String>,
    status: Option<String>,
}

#[derive(Deserialize, Default)]
struct ListCasesArgs {
    status: Option<String>,
    severity: Option<String>,
}

#[derive(Deserialize)]
struct StatusArgs {
    incident_id: String,
    status: String,
}

#[derive(Deserialize)]
struct SeverityArgs {
    incident_id: String,
    severity: String,
}

#[derive(Deserialize)]
struct AddNoteArgs {
    incident_id: String,
    note: String,
    created_by: Option<String>,
}

#[derive(Deserialize)]
struct EditNoteArgs {
    incident_id: String,
    note_index: usize,
    new_text: String,
}

#[derive(Deserialize)]
struct NoteArgs {
    incident_id: String,
    note_index: usize,
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: &Value) -> Result<T, ToolError> {
    // Calls without arguments may arrive as null
    let args = if args.is_null() { json!({}) } else { args.clone() };
    serde_json::from_value(args).map_err(|e| ToolError::BadArguments {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

fn to_value<T: Serialize>(tool: &str, value: T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::Encoding {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

/// Routes tool calls to a record manager behind a single mutex
///
/// The mutex is the gate that serializes load-modify-save cycles between
/// in-process callers.
pub struct Dispatcher {
    manager: Mutex<IncidentManager>,
}

impl Dispatcher {
    pub fn new(manager: IncidentManager) -> Self {
        Self {
            manager: Mutex::new(manager),
        }
    }

    /// Invokes the tool `name` and wraps the outcome in a [`ToolReply`]
    pub fn reply(&self, name: &str, args: &Value) -> ToolReply {
        self.call(name, args).into()
    }

    /// Invokes the tool `name` with JSON `args`
    pub fn call(&self, name: &str, args: &Value) -> Result<Value, ToolError> {
        let tool = find_tool(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        // State is only adopted after a successful save, so a poisoned
        // manager is still consistent
        let mut manager = self
            .manager
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        tracing::debug!(tool = tool.name, "dispatching tool call");
        let outcome = Self::invoke(&mut manager, tool.name, args);
        if let Err(e) = &outcome {
            tracing::debug!(tool = tool.name, error = %e, "tool call failed");
        }
        outcome
    }

    fn invoke(
        manager: &mut IncidentManager,
        name: &str,
        args: &Value,
    ) -> Result<Value, ToolError> {
        match name {
            "create_case" => {
                let a: CreateCaseArgs = parse_args(name, args)?;
                let mut new_case = NewCase::new(a.incident_id);
                new_case.title = a.title.filter(|t| !t.trim().is_empty());
                new_case.description = a.description;
                new_case.incident_type = a.incident_type;
                if let Some(severity) = a.severity {
                    new_case.severity = severity.parse()?;
                }
                if let Some(status) = a.status {
                    new_case.status = status.parse()?;
                }
                to_value(name, manager.create_case(new_case)?)
            }
            "get_case" => {
                let a: CaseArgs = parse_args(name, args)?;
                to_value(name, manager.get_case(&a.incident_id)?)
            }
            "list_cases" => {
                let a: ListCasesArgs = parse_args(name, args)?;
                let filter = CaseFilter {
                    status: a.status.map(|s| s.parse()).transpose()?,
                    severity: a.severity.map(|s| s.parse()).transpose()?,
                };
                to_value(name, manager.list_cases(&filter)?)
            }
            "list_open_cases" => to_value(name, manager.list_open_cases()?),
            "set_status" => {
                let a: StatusArgs = parse_args(name, args)?;
                to_value(name, manager.set_status(&a.incident_id, &a.status)?)
            }
            "set_severity" => {
                let a: SeverityArgs = parse_args(name, args)?;
                to_value(name, manager.set_severity(&a.incident_id, &a.severity)?)
            }
            "add_note" => {
                let a: AddNoteArgs = parse_args(name, args)?;
                let note = match a.created_by {
                    Some(author) => manager.add_note_as(&a.incident_id, &a.note, &author)?,
                    None => manager.add_note(&a.incident_id, &a.note)?,
                };
                to_value(name, note)
            }
            "edit_note" => {
                let a: EditNoteArgs = parse_args(name, args)?;
                to_value(name, manager.edit_note(&a.incident_id, a.note_index, &a.new_text)?)
            }
            "delete_note" => {
                let a: NoteArgs = parse_args(name, args)?;
                to_value(name, manager.delete_note(&a.incident_id, a.note_index)?)
            }
            "list_notes" => {
                let a: CaseArgs = parse_args(name, args)?;
                to_value(name, manager.list_notes(&a.incident_id)?)
            }
            "delete_case" => {
                let a: CaseArgs = parse_args(name, args)?;
                to_value(name, manager.delete_case(&a.incident_id)?)
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn dispatcher_at(dir: &TempDir) -> Dispatcher {
        Dispatcher::new(IncidentManager::open(dir.path().join("db.json"), None).unwrap())
    }

    #[test]
    fn test_tool_names_are_unique_and_declared() {
        let names: HashSet<&str> = TOOLS.iter().map(|t| t.name).collect();
        assert_eq!(names.len(), TOOLS.len());
        for expected in [
            "create_case",
            "get_case",
            "list_cases",
            "set_status",
            "set_severity",
            "add_note",
            "edit_note",
            "delete_note",
        ] {
            assert!(find_tool(expected).is_some(), "missing tool {}", expected);
        }
    }

    #[test]
    fn test_json_schema_shape() {
        let schema = find_tool("set_status").unwrap().json_schema();
        let function = &schema["function"];
        assert_eq!(function["name"], "set_status");
        assert_eq!(
            function["parameters"]["required"],
            json!(["incident_id", "status"])
        );
        assert_eq!(
            function["parameters"]["properties"]["status"]["enum"],
            json!(STATUS_VALUES)
        );

        let schema = find_tool("edit_note").unwrap().json_schema();
        let index = &schema["function"]["parameters"]["properties"]["note_index"];
        assert_eq!(index["type"], "integer");
        assert_eq!(tool_schemas().len(), TOOLS.len());
    }

    #[test]
    fn test_every_declared_tool_is_routed() {
        let temp_dir = TempDir::new().unwrap();
        let dispatcher = dispatcher_at(&temp_dir);
        for tool in TOOLS {
            let err = dispatcher.call(tool.name, &json!({})).err();
            assert!(
                !matches!(err, Some(ToolError::UnknownTool(_))),
                "{} is declared but not routed",
                tool.name
            );
        }
    }

    #[test]
    fn test_scenario_through_dispatcher() {
        let temp_dir = TempDir::new().unwrap();
        let dispatcher = dispatcher_at(&temp_dir);

        let case = dispatcher
            .call(
                "create_case",
                &json!({
                    "incident_id": "INC-1",
                    "description": "Credential phishing",
                    "incident_type": "Phishing Attack",
                    "severity": "low",
                }),
            )
            .unwrap();
        assert_eq!(case["SeverityLevel"], "Low");
        assert_eq!(case["CaseStatus"], "Open");

        let note = dispatcher
            .call(
                "add_note",
                &json!({"incident_id": "INC-1", "note": "rotated credentials"}),
            )
            .unwrap();
        assert_eq!(note["Index"], 0);
        assert_eq!(note["Note"], "rotated credentials");

        let case = dispatcher
            .call("set_severity", &json!({"incident_id": "INC-1", "severity": "High"}))
            .unwrap();
        assert_eq!(case["SeverityLevel"], "High");

        let case = dispatcher
            .call("get_case", &json!({"incident_id": "INC-1"}))
            .unwrap();
        assert_eq!(case["SeverityLevel"], "High");
        assert_eq!(case["Notes"][0]["Note"], "rotated credentials");

        let listed = dispatcher
            .call("list_cases", &json!({"severity": "High"}))
            .unwrap();
        assert_eq!(listed[0]["IncidentID"], "INC-1");
        assert_eq!(listed[0]["NoteCount"], 1);
    }

    #[test]
    fn test_delete_note_reports_remaining_notes() {
        let temp_dir = TempDir::new().unwrap();
        let dispatcher = dispatcher_at(&temp_dir);
        dispatcher
            .call("create_case", &json!({"incident_id": "INC-1"}))
            .unwrap();
        for text in ["A", "B", "C"] {
            dispatcher
                .call("add_note", &json!({"incident_id": "INC-1", "note": text}))
                .unwrap();
        }

        let reply = dispatcher
            .call("delete_note", &json!({"incident_id": "INC-1", "note_index": 1}))
            .unwrap();
        assert_eq!(reply["deleted"]["Note"], "B");
        assert_eq!(reply["notes"][1]["Note"], "C");
        assert_eq!(reply["notes"][1]["Index"], 1);

        let persisted = dispatcher
            .call("list_notes", &json!({"incident_id": "INC-1"}))
            .unwrap();
        assert_eq!(reply["notes"], persisted);
    }

    #[test]
    fn test_unencodable_result_is_not_blamed_on_arguments() {
        let mut bad = std::collections::BTreeMap::new();
        bad.insert((1u8, 2u8), "tuple keys have no JSON form");

        let err = to_value("list_cases", bad).unwrap_err();
        assert!(matches!(err, ToolError::Encoding { ref tool, .. } if tool == "list_cases"));
        assert_eq!(err.code(), "encoding_failed");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_error_replies() {
        let temp_dir = TempDir::new().unwrap();
        let dispatcher = dispatcher_at(&temp_dir);

        let reply = dispatcher.reply("add_note", &json!({"incident_id": "INC-999", "note": "x"}));
        assert!(!reply.ok);
        let failure = reply.error.unwrap();
        assert_eq!(failure.kind, "not_found");
        assert!(failure.message.contains("INC-999"));
        assert!(!failure.fatal);

        let reply = dispatcher.reply("summon_analyst", &json!({}));
        assert_eq!(reply.error.unwrap().kind, "unknown_tool");

        let reply = dispatcher.reply("edit_note", &json!({"incident_id": "INC-1", "note_index": -1, "new_text": "x"}));
        assert_eq!(reply.error.unwrap().kind, "bad_arguments");

        dispatcher
            .call("create_case", &json!({"incident_id": "INC-1"}))
            .unwrap();
        let reply = dispatcher.reply("set_status", &json!({"incident_id": "INC-1", "status": "NotARealStatus"}));
        assert_eq!(reply.error.unwrap().kind, "invalid_status");

        let reply = dispatcher.reply("create_case", &json!({"incident_id": "INC-1"}));
        assert_eq!(reply.error.unwrap().kind, "duplicate_id");

        let reply = dispatcher.reply("list_cases", &json!({"severity": "apocalyptic"}));
        assert_eq!(reply.error.unwrap().kind, "invalid_severity");
    }

    #[test]
    fn test_reply_serialization() {
        let reply = ToolReply::from(Ok(json!({"IncidentID": "INC-1"})));
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"ok": true, "result": {"IncidentID": "INC-1"}})
        );

        let reply = ToolReply::from(Err(ToolError::UnknownTool("x".to_string())));
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["ok"], false);
        assert_eq!(value["error"]["kind"], "unknown_tool");
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_concurrent_calls_are_serialized() {
        let temp_dir = TempDir::new().unwrap();
        let dispatcher = Arc::new(dispatcher_at(&temp_dir));
        dispatcher
            .call("create_case", &json!({"incident_id": "INC-1"}))
            .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let dispatcher = Arc::clone(&dispatcher);
                std::thread::spawn(move || {
                    for n in 0..5 {
                        dispatcher
                            .call(
                                "add_note",
                                &json!({"incident_id": "INC-1", "note": format!("w{}-{}", worker, n)}),
                            )
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let notes = dispatcher
            .call("list_notes", &json!({"incident_id": "INC-1"}))
            .unwrap();
        let notes = notes.as_array().unwrap();
        assert_eq!(notes.len(), 20);
        for (position, note) in notes.iter().enumerate() {
            assert_eq!(note["Index"], position);
        }
    }
}
