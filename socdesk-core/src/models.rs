use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::IncidentError;

/// Author recorded on notes when the caller does not name one
pub const DEFAULT_ANALYST: &str = "SOC-User";

/// Timestamp format used for the `Time` field of notes
pub const NOTE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

/// In-memory collection of cases keyed by incident id.
/// Iteration order is the id order, which is also the listing order.
pub type CaseMap = BTreeMap<String, Case>;

/// Lowercases and strips separators so "In Progress", "in_progress" and
/// "IN-PROGRESS" all compare equal
fn normalize_token(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Lifecycle status of a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CaseStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl CaseStatus {
    pub const ALL: [CaseStatus; 4] = [
        CaseStatus::Open,
        CaseStatus::InProgress,
        CaseStatus::Resolved,
        CaseStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Open => "Open",
            CaseStatus::InProgress => "In Progress",
            CaseStatus::Resolved => "Resolved",
            CaseStatus::Closed => "Closed",
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CaseStatus {
    type Err = IncidentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "open" => Ok(CaseStatus::Open),
            "inprogress" => Ok(CaseStatus::InProgress),
            "resolved" => Ok(CaseStatus::Resolved),
            "closed" => Ok(CaseStatus::Closed),
            _ => Err(IncidentError::InvalidStatus(s.to_string())),
        }
    }
}

impl TryFrom<String> for CaseStatus {
    type Error = IncidentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CaseStatus> for String {
    fn from(status: CaseStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Severity of a case, ordered from least to most severe
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = IncidentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(IncidentError::InvalidSeverity(s.to_string())),
        }
    }
}

impl TryFrom<String> for Severity {
    type Error = IncidentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Severity> for String {
    fn from(severity: Severity) -> Self {
        severity.as_str().to_string()
    }
}

fn default_author() -> String {
    DEFAULT_ANALYST.to_string()
}

/// A single analyst note attached to a case
///
/// The index is positional: it is reassigned whenever an earlier note is
/// deleted, so it only identifies a note until the next deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    #[serde(rename = "Index", default)]
    pub index: usize,

    #[serde(rename = "Note")]
    pub text: String,

    #[serde(rename = "CreatedBy", default = "default_author")]
    pub created_by: String,

    #[serde(rename = "Time", default)]
    pub time: String,
}

impl Note {
    /// Creates a note stamped with the current UTC time
    pub fn new(text: String, created_by: String) -> Self {
        Self {
            index: 0,
            text,
            created_by,
            time: Utc::now().format(NOTE_TIME_FORMAT).to_string(),
        }
    }
}

/// Outcome of deleting a note: the removed note and the re-indexed
/// notes left on the case, both taken from the committed state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteRemoval {
    pub deleted: Note,
    pub notes: Vec<Note>,
}

/// One tracked security incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "CaseRecord")]
pub struct Case {
    /// Incident identifier, e.g. "INC-20241129-001"
    #[serde(rename = "IncidentID")]
    pub id: String,

    #[serde(rename = "Title", default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(rename = "CaseDescription", default)]
    pub description: String,

    /// Free-form category such as "Phishing Attack" or "EDR"
    #[serde(rename = "IncidentType", default)]
    pub incident_type: String,

    #[serde(rename = "SeverityLevel", default)]
    pub severity: Severity,

    #[serde(rename = "CaseStatus", default)]
    pub status: CaseStatus,

    /// Notes in chronological order
    #[serde(rename = "Notes")]
    pub notes: Vec<Note>,

    #[serde(rename = "CreatedAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(rename = "UpdatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Any other fields found in the persisted record, written back untouched
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Persisted shape of a case as read from disk.
///
/// Older files keep notes under `AdditionalNotes`, may carry both keys once
/// a note was appended, and may store either as null. `Notes` wins when it is
/// non-empty; only `Notes` is written back.
#[derive(Deserialize)]
struct CaseRecord {
    #[serde(rename = "IncidentID")]
    id: String,
    #[serde(rename = "Title", default)]
    title: Option<String>,
    #[serde(rename = "CaseDescription", default)]
    description: String,
    #[serde(rename = "IncidentType", default)]
    incident_type: String,
    #[serde(rename = "SeverityLevel", default)]
    severity: Severity,
    #[serde(rename = "CaseStatus", default)]
    status: CaseStatus,
    #[serde(rename = "Notes", default)]
    notes: Option<Vec<Note>>,
    #[serde(rename = "AdditionalNotes", default)]
    additional_notes: Option<Vec<Note>>,
    #[serde(rename = "CreatedAt", default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(rename = "UpdatedAt", default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

impl From<CaseRecord> for Case {
    fn from(record: CaseRecord) -> Self {
        let notes = match (record.notes, record.additional_notes) {
            (Some(notes), _) if !notes.is_empty() => notes,
            (_, Some(legacy)) => legacy,
            _ => Vec::new(),
        };

        Self {
            id: record.id,
            title: record.title,
            description: record.description,
            incident_type: record.incident_type,
            severity: record.severity,
            status: record.status,
            notes,
            created_at: record.created_at,
            updated_at: record.updated_at,
            extra: record.extra,
        }
    }
}

impl Case {
    /// Builds a case with an empty note sequence from creation arguments
    pub fn new(new_case: NewCase) -> Self {
        let now = Utc::now();
        Self {
            id: new_case.id,
            title: new_case.title,
            description: new_case.description,
            incident_type: new_case.incident_type,
            severity: new_case.severity,
            status: new_case.status,
            notes: Vec::new(),
            created_at: Some(now),
            updated_at: Some(now),
            extra: BTreeMap::new(),
        }
    }

    pub fn note(&self, index: usize) -> Option<&Note> {
        self.notes.get(index)
    }

    pub fn note_mut(&mut self, index: usize) -> Option<&mut Note> {
        self.notes.get_mut(index)
    }

    /// Rewrites note indices so they are dense and match their position
    pub fn reindex_notes(&mut self) {
        for (position, note) in self.notes.iter_mut().enumerate() {
            note.index = position;
        }
    }

    /// Records a modification time
    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }

    pub fn summary(&self) -> CaseSummary {
        CaseSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            incident_type: self.incident_type.clone(),
            severity: self.severity,
            status: self.status,
            note_count: self.notes.len(),
        }
    }
}

/// Arguments for creating a case
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewCase {
    pub id: String,
    pub title: Option<String>,
    pub description: String,
    pub incident_type: String,
    pub severity: Severity,
    pub status: CaseStatus,
}

impl NewCase {
    /// Creates arguments for an Open, Medium severity case with no description
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// Condensed view of a case used by listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseSummary {
    #[serde(rename = "IncidentID")]
    pub id: String,
    #[serde(rename = "Title", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "IncidentType")]
    pub incident_type: String,
    #[serde(rename = "SeverityLevel")]
    pub severity: Severity,
    #[serde(rename = "CaseStatus")]
    pub status: CaseStatus,
    #[serde(rename = "NoteCount")]
    pub note_count: usize,
}

/// Optional status/severity constraints for listing cases
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaseFilter {
    pub status: Option<CaseStatus>,
    pub severity: Option<Severity>,
}

impl CaseFilter {
    pub fn open() -> Self {
        Self {
            status: Some(CaseStatus::Open),
            severity: None,
        }
    }

    pub fn matches(&self, case: &Case) -> bool {
        self.status.map_or(true, |s| case.status == s)
            && self.severity.map_or(true, |s| case.severity == s)
    }
}
