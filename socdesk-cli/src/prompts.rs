use anyhow::Result;
use inquire::{Confirm, Editor, Select, Text};

use socdesk_core::{CaseStatus, NewCase, Severity};

/// Prompts the user for a new case
pub fn prompt_new_case(id: Option<String>) -> Result<NewCase> {
    let id = match id {
        Some(id) => id,
        None => Text::new("Incident ID:").prompt()?,
    };
    let mut new_case = NewCase::new(id);

    let title = Text::new("Title (optional):").prompt()?;
    if !title.trim().is_empty() {
        new_case.title = Some(title);
    }

    new_case.incident_type = Text::new("Incident type:").prompt()?;

    // Use the Editor type for multiline input
    new_case.description = Editor::new("Description:").prompt()?;

    new_case.severity = Select::new("Severity:", Severity::ALL.to_vec())
        .with_starting_cursor(1)
        .prompt()?;
    new_case.status = Select::new("Status:", CaseStatus::ALL.to_vec()).prompt()?;

    Ok(new_case)
}

/// Prompts for note text, starting from `current` when editing
pub fn prompt_note_text(current: Option<&str>) -> Result<String> {
    let mut editor = Editor::new("Note:");
    if let Some(text) = current {
        editor = editor.with_predefined_text(text);
    }
    Ok(editor.prompt()?)
}

/// Asks for a yes/no confirmation, defaulting to no
pub fn confirm(message: &str) -> Result<bool> {
    Ok(Confirm::new(message).with_default(false).prompt()?)
}
