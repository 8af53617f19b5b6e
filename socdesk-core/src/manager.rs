//! Incident record manager
//!
//! The validated operation surface over the [`IncidentStore`]. Every mutating
//! operation runs as one locked reload-validate-mutate-save cycle, so it is
//! either fully applied and persisted or not applied at all.

use std::path::Path;

use crate::db::BackendType;
use crate::error::{IncidentError, Result};
use crate::models::{
    Case, CaseFilter, CaseMap, CaseStatus, CaseSummary, NewCase, Note, NoteRemoval, Severity,
    DEFAULT_ANALYST,
};
use crate::storage::IncidentStore;

pub struct IncidentManager {
    store: IncidentStore,
    analyst: String,
}

impl IncidentManager {
    pub fn new(store: IncidentStore) -> Self {
        Self {
            store,
            analyst: DEFAULT_ANALYST.to_string(),
        }
    }

    /// Opens the database at `path` and wraps it in a manager
    pub fn open<P: AsRef<Path>>(path: P, backend_type: Option<BackendType>) -> Result<Self> {
        Ok(Self::new(IncidentStore::open(path, backend_type)?))
    }

    /// Sets the author recorded on notes added without an explicit one
    pub fn with_analyst(mut self, analyst: impl Into<String>) -> Self {
        let analyst = analyst.into();
        if !analyst.trim().is_empty() {
            self.analyst = analyst;
        }
        self
    }

    pub fn analyst(&self) -> &str {
        &self.analyst
    }

    pub fn store(&self) -> &IncidentStore {
        &self.store
    }

    // =========================================================================
    // Cases
    // =========================================================================

    /// Creates a case with an empty note sequence
    pub fn create_case(&mut self, new_case: NewCase) -> Result<Case> {
        let mut new_case = new_case;
        new_case.id = new_case.id.trim().to_string();
        if new_case.id.is_empty() {
            return Err(IncidentError::invalid_input(
                "incident id",
                "incident id must not be empty",
            ));
        }

        let case = self.store.update_atomically(|cases| {
            if cases.contains_key(&new_case.id) {
                return Err(IncidentError::DuplicateId(new_case.id.clone()));
            }
            let case = Case::new(new_case);
            cases.insert(case.id.clone(), case.clone());
            Ok(case)
        })?;

        tracing::info!(case = %case.id, severity = %case.severity, status = %case.status, "created case");
        Ok(case)
    }

    /// Returns a snapshot of one case
    pub fn get_case(&mut self, id: &str) -> Result<Case> {
        self.store.load()?;
        self.store.get(id).cloned()
    }

    /// Lists case summaries in id order
    pub fn list_cases(&mut self, filter: &CaseFilter) -> Result<Vec<CaseSummary>> {
        self.store.load()?;
        Ok(self
            .store
            .cases()
            .values()
            .filter(|c| filter.matches(c))
            .map(Case::summary)
            .collect())
    }

    pub fn list_open_cases(&mut self) -> Result<Vec<CaseSummary>> {
        self.list_cases(&CaseFilter::open())
    }

    /// Removes a case together with all of its notes
    pub fn delete_case(&mut self, id: &str) -> Result<Case> {
        let removed = self
            .store
            .update_atomically(|cases| cases.remove(id).ok_or_else(|| not_found(id)))?;

        tracing::info!(case = %id, "deleted case");
        Ok(removed)
    }

    /// Sets the status of a case, rejecting values outside the enumeration
    pub fn set_status(&mut self, id: &str, status: &str) -> Result<Case> {
        let status: CaseStatus = status.parse()?;

        let case = self.store.update_atomically(|cases| {
            let case = case_mut(cases, id)?;
            case.status = status;
            case.touch();
            Ok(case.clone())
        })?;

        tracing::info!(case = %id, status = %status, "status changed");
        Ok(case)
    }

    /// Sets the severity of a case, rejecting values outside the enumeration
    pub fn set_severity(&mut self, id: &str, severity: &str) -> Result<Case> {
        let severity: Severity = severity.parse()?;

        let case = self.store.update_atomically(|cases| {
            let case = case_mut(cases, id)?;
            case.severity = severity;
            case.touch();
            Ok(case.clone())
        })?;

        tracing::info!(case = %id, severity = %severity, "severity changed");
        Ok(case)
    }

    // =========================================================================
    // Notes
    // =========================================================================

    pub fn list_notes(&mut self, id: &str) -> Result<Vec<Note>> {
        self.store.load()?;
        Ok(self.store.get(id)?.notes.clone())
    }

    /// Appends a note authored by the manager's analyst
    pub fn add_note(&mut self, id: &str, text: &str) -> Result<Note> {
        let analyst = self.analyst.clone();
        self.add_note_as(id, text, &analyst)
    }

    /// Appends a note and returns it with its assigned index
    pub fn add_note_as(&mut self, id: &str, text: &str, created_by: &str) -> Result<Note> {
        validate_note_text(text)?;
        let created_by = match created_by.trim() {
            "" => self.analyst.clone(),
            author => author.to_string(),
        };

        let note = self.store.update_atomically(|cases| {
            let case = case_mut(cases, id)?;
            let mut note = Note::new(text.to_string(), created_by);
            note.index = case.notes.len();
            case.notes.push(note.clone());
            case.touch();
            Ok(note)
        })?;

        tracing::info!(case = %id, index = note.index, "added note");
        Ok(note)
    }

    /// Replaces the text of the note at `index`
    pub fn edit_note(&mut self, id: &str, index: usize, text: &str) -> Result<Note> {
        validate_note_text(text)?;

        let note = self.store.update_atomically(|cases| {
            let case = case_mut(cases, id)?;
            let note = case
                .note_mut(index)
                .ok_or_else(|| note_not_found(id, index))?;
            note.text = text.to_string();
            let note = note.clone();
            case.touch();
            Ok(note)
        })?;

        tracing::info!(case = %id, index, "edited note");
        Ok(note)
    }

    /// Deletes the note at `index` and shifts later notes down by one.
    /// Returns the removed note and the notes that remain after the commit.
    pub fn delete_note(&mut self, id: &str, index: usize) -> Result<NoteRemoval> {
        let removed = self.store.update_atomically(|cases| {
            let case = case_mut(cases, id)?;
            if index >= case.notes.len() {
                return Err(note_not_found(id, index));
            }
            let deleted = case.notes.remove(index);
            case.reindex_notes();
            case.touch();
            Ok(NoteRemoval {
                deleted,
                notes: case.notes.clone(),
            })
        })?;

        tracing::info!(case = %id, index, "deleted note");
        Ok(removed)
    }
}

fn not_found(id: &str) -> IncidentError {
    IncidentError::NotFound(id.to_string())
}

fn note_not_found(id: &str, index: usize) -> IncidentError {
    IncidentError::NoteNotFound {
        case_id: id.to_string(),
        index,
    }
}

fn case_mut<'a>(cases: &'a mut CaseMap, id: &str) -> Result<&'a mut Case> {
    cases.get_mut(id).ok_or_else(|| not_found(id))
}

fn validate_note_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(IncidentError::invalid_input(
            "note",
            "note text must not be empty",
        ));
    }
    Ok(())
}
