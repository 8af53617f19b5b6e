use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Incident case desk for SOC analysts")]
pub struct Cli {
    /// Path to the case database (overrides SOCDESK_DB and the config file)
    #[clap(long, global = true)]
    pub db: Option<PathBuf>,

    /// Storage backend: json or sqlite (inferred from the file extension by default)
    #[clap(long, global = true)]
    pub backend: Option<String>,

    /// Path to the config file (defaults to $SOCDESK_CONFIG or ~/.socdesk.yaml)
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new case
    Create {
        /// Incident ID, e.g. INC-20241129-001
        id: Option<String>,

        /// Short title
        #[clap(long)]
        title: Option<String>,

        /// Description of the incident
        #[clap(long, short = 'd')]
        description: Option<String>,

        /// Incident type (Phishing Attack, EDR, Malware, ...)
        #[clap(long, short = 't')]
        r#type: Option<String>,

        /// Initial severity (Low, Medium, High, Critical)
        #[clap(long, short = 's')]
        severity: Option<String>,

        /// Initial status (Open, In Progress, Resolved, Closed)
        #[clap(long)]
        status: Option<String>,

        /// Use interactive mode (prompts)
        #[clap(long, short = 'i')]
        interactive: bool,
    },

    /// Show a case with its notes
    Show {
        /// Incident ID
        id: String,
    },

    /// List cases
    List {
        /// Filter by status
        #[clap(long)]
        status: Option<String>,

        /// Filter by severity
        #[clap(long)]
        severity: Option<String>,

        /// Only open cases
        #[clap(long, conflicts_with = "status")]
        open: bool,
    },

    /// Change the status of a case
    Status {
        /// Incident ID
        id: String,

        /// New status (Open, In Progress, Resolved, Closed)
        status: String,
    },

    /// Change the severity of a case
    Severity {
        /// Incident ID
        id: String,

        /// New severity (Low, Medium, High, Critical)
        severity: String,
    },

    /// Delete a case and its notes
    Delete {
        /// Incident ID
        id: String,

        /// Skip the confirmation prompt
        #[clap(long, short = 'y')]
        yes: bool,
    },

    /// Manage notes on a case
    #[clap(subcommand)]
    Note(NoteCommand),

    /// Print the tool table as JSON function declarations
    Tools,

    /// Invoke a tool with JSON arguments and print the JSON reply
    Call {
        /// Tool name, e.g. add_note
        tool: String,

        /// JSON object of arguments; "-" reads it from stdin
        args: Option<String>,
    },

    /// Database management
    #[clap(subcommand)]
    Db(DbCommand),

    /// Show or change the saved configuration
    #[clap(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
pub enum NoteCommand {
    /// Append a note to a case
    Add {
        /// Incident ID
        id: String,

        /// Note text (opens an editor when omitted)
        text: Option<String>,

        /// Author of the note (defaults to the configured analyst)
        #[clap(long)]
        author: Option<String>,
    },

    /// Replace the text of a note
    Edit {
        /// Incident ID
        id: String,

        /// 0-based note index
        index: usize,

        /// New text (opens an editor when omitted)
        text: Option<String>,
    },

    /// Delete a note; later notes move down one index
    Delete {
        /// Incident ID
        id: String,

        /// 0-based note index
        index: usize,
    },

    /// List the notes of a case
    List {
        /// Incident ID
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum DbCommand {
    /// Create an empty database if none exists yet
    Init,

    /// Print the path and backend of the database in use
    Path,

    /// Print case and note counts
    Stats,

    /// Copy every case into another database
    Migrate {
        /// Destination database path
        to: PathBuf,

        /// Destination backend (inferred from the extension by default)
        #[clap(long)]
        to_backend: Option<String>,
    },

    /// Export every case to a JSON file
    Export {
        /// Output file
        output: PathBuf,
    },

    /// Replace every case with the contents of a JSON file
    Import {
        /// Input file
        input: PathBuf,

        /// Skip the confirmation prompt
        #[clap(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the config file location and its settings
    Show,

    /// Update settings in the config file
    Set {
        /// Default database path
        #[clap(long)]
        db_path: Option<PathBuf>,

        /// Default backend (json or sqlite)
        #[clap(long)]
        backend: Option<String>,

        /// Author recorded on notes added without one
        #[clap(long)]
        analyst: Option<String>,
    },
}
