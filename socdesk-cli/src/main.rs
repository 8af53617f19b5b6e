mod cli;
mod prompts;

use anyhow::{Context, Result};
use clap::Parser;
use colored::{ColoredString, Colorize};
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use socdesk_core::db::{self, export_backend_to_json, import_from_json};
use socdesk_core::{
    get_config_path, BackendType, Case, CaseFilter, CaseStatus, DeskConfig, Dispatcher,
    IncidentManager, IncidentStore, NewCase, Note, Severity,
};

use crate::cli::{Cli, Command, ConfigCommand, DbCommand, NoteCommand};

/// Where the database lives and how to open it
struct Desk {
    config_path: PathBuf,
    config: DeskConfig,
    db_path: PathBuf,
    backend: Option<BackendType>,
    analyst: String,
}

impl Desk {
    fn from_cli(cli: &Cli) -> Result<Self> {
        let config_path = match &cli.config {
            Some(path) => path.clone(),
            None => get_config_path()?,
        };
        let config = DeskConfig::load(&config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?;

        let backend = match &cli.backend {
            Some(name) => Some(name.parse::<BackendType>()?),
            None => config.backend,
        };

        Ok(Self {
            db_path: config.resolve_db_path(cli.db.as_deref()),
            backend,
            analyst: config.analyst.clone(),
            config_path,
            config,
        })
    }

    fn manager(&self) -> Result<IncidentManager> {
        let manager = IncidentManager::open(&self.db_path, self.backend)
            .with_context(|| format!("Failed to open case database {:?}", self.db_path))?;
        Ok(manager.with_analyst(self.analyst.clone()))
    }
}

fn main() -> Result<()> {
    // Logs go to stderr so `call` output stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let desk = Desk::from_cli(&cli)?;
    tracing::debug!(db = %desk.db_path.display(), analyst = %desk.analyst, "using case database");

    match &cli.command {
        Command::Create {
            id,
            title,
            description,
            r#type,
            severity,
            status,
            interactive,
        } => {
            let new_case = if *interactive || id.is_none() {
                prompts::prompt_new_case(id.clone())?
            } else {
                new_case_from_args(id, title, description, r#type, severity, status)?
            };
            let case = desk.manager()?.create_case(new_case)?;
            println!("{} {}", "Case created:".green(), case.id.bold());
        }
        Command::Show { id } => {
            let case = desk.manager()?.get_case(id)?;
            print_case(&case);
        }
        Command::List {
            status,
            severity,
            open,
        } => {
            let filter = if *open {
                CaseFilter {
                    status: Some(CaseStatus::Open),
                    severity: severity.as_deref().map(str::parse::<Severity>).transpose()?,
                }
            } else {
                CaseFilter {
                    status: status.as_deref().map(str::parse::<CaseStatus>).transpose()?,
                    severity: severity.as_deref().map(str::parse::<Severity>).transpose()?,
                }
            };
            list_cases(&mut desk.manager()?, &filter)?;
        }
        Command::Status { id, status } => {
            let case = desk.manager()?.set_status(id, status)?;
            println!("{} {} is now {}", "Updated:".green(), case.id, status_label(case.status));
        }
        Command::Severity { id, severity } => {
            let case = desk.manager()?.set_severity(id, severity)?;
            println!(
                "{} {} is now {}",
                "Updated:".green(),
                case.id,
                severity_label(case.severity)
            );
        }
        Command::Delete { id, yes } => {
            let mut manager = desk.manager()?;
            let case = manager.get_case(id)?;
            println!("Deleting case {} with {} note(s)", case.id.bold(), case.notes.len());
            if !*yes && !prompts::confirm("Are you sure you want to delete this case?")? {
                println!("{}", "Deletion cancelled.".yellow());
                return Ok(());
            }
            manager.delete_case(id)?;
            println!("{}", "Case deleted.".green());
        }
        Command::Note(note_cmd) => {
            handle_note_command(note_cmd, &mut desk.manager()?)?;
        }
        Command::Tools => {
            let schemas = socdesk_core::tool_schemas();
            println!("{}", serde_json::to_string_pretty(&schemas)?);
        }
        Command::Call { tool, args } => {
            let args = read_call_args(args.as_deref())?;
            let dispatcher = Dispatcher::new(desk.manager()?);
            let reply = dispatcher.reply(tool, &args);
            println!("{}", serde_json::to_string_pretty(&reply)?);
            if let Some(failure) = &reply.error {
                std::process::exit(if failure.fatal { 2 } else { 1 });
            }
        }
        Command::Db(db_cmd) => {
            handle_db_command(db_cmd, &desk)?;
        }
        Command::Config(config_cmd) => {
            handle_config_command(config_cmd, &desk)?;
        }
    }

    Ok(())
}

fn new_case_from_args(
    id: &Option<String>,
    title: &Option<String>,
    description: &Option<String>,
    incident_type: &Option<String>,
    severity: &Option<String>,
    status: &Option<String>,
) -> Result<NewCase> {
    let id = match id {
        Some(id) => id.clone(),
        None => anyhow::bail!("Incident ID is required."),
    };

    let mut new_case = NewCase::new(id);
    new_case.title = title.clone();
    new_case.description = description.clone().unwrap_or_default();
    new_case.incident_type = incident_type.clone().unwrap_or_default();
    if let Some(severity) = severity {
        new_case.severity = severity.parse()?;
    }
    if let Some(status) = status {
        new_case.status = status.parse()?;
    }
    Ok(new_case)
}

fn status_label(status: CaseStatus) -> ColoredString {
    colorize_status(status.as_str(), status)
}

fn severity_label(severity: Severity) -> ColoredString {
    colorize_severity(severity.as_str(), severity)
}

fn list_cases(manager: &mut IncidentManager, filter: &CaseFilter) -> Result<()> {
    let cases = manager.list_cases(filter)?;

    if cases.is_empty() {
        println!("{}", "No cases found.".yellow());
        return Ok(());
    }

    println!(
        "{:<22} | {:<30} | {:<20} | {:<11} | {:<8} | {:>5}",
        "Incident ID", "Title", "Type", "Status", "Severity", "Notes"
    );
    println!("{}", "-".repeat(110));

    for case in cases {
        // Pad before coloring so escape codes don't break alignment
        let status = format!("{:<11}", case.status.as_str());
        let severity = format!("{:<8}", case.severity.as_str());
        println!(
            "{:<22} | {:<30} | {:<20} | {} | {} | {:>5}",
            case.id,
            truncate(case.title.as_deref().unwrap_or("-"), 30),
            truncate(&case.incident_type, 20),
            colorize_status(&status, case.status),
            colorize_severity(&severity, case.severity),
            case.note_count
        );
    }

    Ok(())
}

fn colorize_status(text: &str, status: CaseStatus) -> ColoredString {
    match status {
        CaseStatus::Open => text.yellow(),
        CaseStatus::InProgress => text.blue(),
        CaseStatus::Resolved => text.green(),
        CaseStatus::Closed => text.dimmed(),
    }
}

fn colorize_severity(text: &str, severity: Severity) -> ColoredString {
    match severity {
        Severity::Low => text.green(),
        Severity::Medium => text.yellow(),
        Severity::High => text.red(),
        Severity::Critical => text.red().bold(),
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let cut: String = text.chars().take(width.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

fn print_case(case: &Case) {
    println!("{}: {}", "Incident ID".blue(), case.id.bold());
    if let Some(title) = &case.title {
        println!("{}: {}", "Title".blue(), title);
    }
    println!("{}: {}", "Type".blue(), case.incident_type);
    println!("{}: {}", "Status".blue(), status_label(case.status));
    println!("{}: {}", "Severity".blue(), severity_label(case.severity));
    if let Some(created_at) = case.created_at {
        println!("{}: {}", "Created".blue(), created_at.format("%Y-%m-%d %H:%M UTC"));
    }
    if let Some(updated_at) = case.updated_at {
        println!("{}: {}", "Updated".blue(), updated_at.format("%Y-%m-%d %H:%M UTC"));
    }
    println!("{}:", "Description".blue());
    println!("{}", case.description);

    for (key, value) in &case.extra {
        println!("{}: {}", key.blue(), value);
    }

    if !case.notes.is_empty() {
        println!("\n{}:", "Notes".green());
        for note in &case.notes {
            print_note(note);
        }
    }
}

fn print_note(note: &Note) {
    println!(
        "  [{}] {} {}",
        note.index.to_string().yellow(),
        note.time.dimmed(),
        note.created_by.cyan()
    );
    for line in note.text.lines() {
        println!("      {}", line);
    }
}

fn handle_note_command(cmd: &NoteCommand, manager: &mut IncidentManager) -> Result<()> {
    match cmd {
        NoteCommand::Add { id, text, author } => {
            let text = match text {
                Some(text) => text.clone(),
                None => prompts::prompt_note_text(None)?,
            };
            let note = match author {
                Some(author) => manager.add_note_as(id, &text, author)?,
                None => manager.add_note(id, &text)?,
            };
            println!("{} {} note [{}]", "Added".green(), id, note.index);
        }
        NoteCommand::Edit { id, index, text } => {
            let text = match text {
                Some(text) => text.clone(),
                None => {
                    let notes = manager.list_notes(id)?;
                    let current = notes.get(*index).map(|n| n.text.as_str());
                    prompts::prompt_note_text(current)?
                }
            };
            let note = manager.edit_note(id, *index, &text)?;
            println!("{} {} note [{}]", "Edited".green(), id, note.index);
        }
        NoteCommand::Delete { id, index } => {
            let removed = manager.delete_note(id, *index)?;
            println!(
                "{} {} note [{}]: {}",
                "Deleted".green(),
                id,
                index,
                truncate(&removed.deleted.text, 60)
            );
            println!("{}", "Later notes have moved down one index.".dimmed());
        }
        NoteCommand::List { id } => {
            let notes = manager.list_notes(id)?;
            if notes.is_empty() {
                println!("{}", "No notes.".yellow());
            }
            for note in &notes {
                print_note(note);
            }
        }
    }

    Ok(())
}

fn read_call_args(raw: Option<&str>) -> Result<Value> {
    let raw = match raw {
        None => return Ok(Value::Object(Default::default())),
        Some("-") => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read arguments from stdin")?;
            buffer
        }
        Some(raw) => raw.to_string(),
    };

    serde_json::from_str(&raw).context("Tool arguments must be a JSON object")
}

fn handle_db_command(cmd: &DbCommand, desk: &Desk) -> Result<()> {
    match cmd {
        DbCommand::Init => {
            if desk.db_path.exists() {
                println!("{} already exists", desk.db_path.display());
            } else {
                let backend = db::create_backend(&desk.db_path, desk.backend)?;
                backend.create_if_not_exists()?;
                println!(
                    "{} {} ({})",
                    "Created".green(),
                    desk.db_path.display(),
                    backend.backend_type()
                );
            }
        }
        DbCommand::Path => {
            let backend = desk
                .backend
                .unwrap_or_else(|| BackendType::from_path(&desk.db_path));
            println!("{} ({})", desk.db_path.display(), backend);
        }
        DbCommand::Stats => {
            let manager = desk.manager()?;
            let stats = manager.store().backend().stats()?;
            println!("{}: {}", "Backend".blue(), stats.backend_type);
            println!("{}: {}", "Cases".blue(), stats.case_count);
            println!("{}: {}", "Open".blue(), stats.open_count);
            println!("{}: {}", "Notes".blue(), stats.note_count);
        }
        DbCommand::Migrate { to, to_backend } => {
            let to_type = to_backend
                .as_deref()
                .map(str::parse::<BackendType>)
                .transpose()?;
            let count = db::migrate(&desk.db_path, desk.backend, to, to_type)
                .with_context(|| format!("Failed to migrate to {:?}", to))?;
            println!("{} {} case(s) to {}", "Migrated".green(), count, to.display());
        }
        DbCommand::Export { output } => {
            let manager = desk.manager()?;
            let count = export_backend_to_json(manager.store().backend(), output)?;
            println!("{} {} case(s) to {}", "Exported".green(), count, output.display());
        }
        DbCommand::Import { input, yes } => {
            import_cases(desk, input, *yes)?;
        }
    }

    Ok(())
}

fn handle_config_command(cmd: &ConfigCommand, desk: &Desk) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            let config = &desk.config;
            println!("{}: {}", "Config".blue(), desk.config_path.display());
            match &config.db_path {
                Some(path) => println!("{}: {}", "Database".blue(), path.display()),
                None => println!("{}: {}", "Database".blue(), "(not set)".dimmed()),
            }
            match config.backend {
                Some(backend) => println!("{}: {}", "Backend".blue(), backend),
                None => println!("{}: {}", "Backend".blue(), "(from extension)".dimmed()),
            }
            println!("{}: {}", "Analyst".blue(), config.analyst);
        }
        ConfigCommand::Set {
            db_path,
            backend,
            analyst,
        } => {
            let mut config = desk.config.clone();
            if let Some(path) = db_path {
                config.db_path = Some(path.clone());
            }
            if let Some(name) = backend {
                config.backend = Some(name.parse::<BackendType>()?);
            }
            if let Some(name) = analyst.as_deref().map(str::trim) {
                if name.is_empty() {
                    anyhow::bail!("Analyst name must not be empty");
                }
                config.analyst = name.to_string();
            }

            config
                .save(&desk.config_path)
                .with_context(|| format!("Failed to save config to {:?}", desk.config_path))?;
            println!("{} {}", "Saved".green(), desk.config_path.display());
        }
    }

    Ok(())
}

fn import_cases(desk: &Desk, input: &Path, skip_confirm: bool) -> Result<()> {
    let imported = import_from_json(input)
        .with_context(|| format!("Failed to import cases from {:?}", input))?;

    println!(
        "Importing {} case(s) will replace every case in {}",
        imported.len(),
        desk.db_path.display()
    );
    if !skip_confirm && !prompts::confirm("Are you sure?")? {
        println!("{}", "Import cancelled.".yellow());
        return Ok(());
    }

    let mut store = IncidentStore::open(&desk.db_path, desk.backend)?;
    let count = store.update_atomically(|cases| {
        *cases = imported;
        Ok(cases.len())
    })?;
    println!("{} {} case(s)", "Imported".green(), count);
    Ok(())
}
