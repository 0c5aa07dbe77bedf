use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "meterbook")]
#[command(about = "Track utility meter readings and car documents across devices")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to sync settings file
    #[arg(long, global = true, value_name = "PATH")]
    pub config_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record a meter reading
    #[command(alias = "new")]
    Add {
        /// Meter: water-bath, water-kitchen, gas or electric
        meter: String,
        /// Reading value; `.` or `,` as decimal separator
        value: String,
        /// Reading date (YYYY-MM-DD), defaults to today
        #[arg(long, value_name = "DATE")]
        date: Option<String>,
    },
    /// List readings for a meter, newest first
    List {
        /// Meter: water-bath, water-kitchen, gas or electric
        meter: String,
        /// Number of readings to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a reading
    Delete {
        /// Meter the reading belongs to
        meter: String,
        /// Reading ID or unique ID prefix
        id: String,
    },
    /// Show or update car documents
    Car {
        #[command(subcommand)]
        command: Option<CarCommands>,
    },
    /// Show or update unit prices
    Price {
        #[command(subcommand)]
        command: Option<PriceCommands>,
    },
    /// Show due and overdue reminders
    Reminders {
        /// Evaluate as of this date (YYYY-MM-DD), defaults to today
        #[arg(long, value_name = "DATE")]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show consumption between readings
    Usage {
        /// Meter: water-bath, water-kitchen, gas or electric
        meter: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show cost of the latest period per meter
    Cost {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export readings
    Export {
        /// First date included (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        from: Option<String>,
        /// Last date included (YYYY-MM-DD), defaults to today
        #[arg(long, value_name = "DATE")]
        to: Option<String>,
        /// Export format
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Sync with the family group
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
    },
    /// Configure sync settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    #[value(name = "powershell")]
    PowerShell,
}

#[derive(Subcommand)]
pub enum CarCommands {
    /// Show all car documents
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set a car document: itp, rovignette, insurance, casco, oil-change (dates) or oil-change-km
    Set {
        field: String,
        /// Date (YYYY-MM-DD) or kilometers for oil-change-km
        value: String,
    },
}

#[derive(Subcommand)]
pub enum PriceCommands {
    /// Show unit prices
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set a unit price: water, gas or electric
    Set {
        field: String,
        value: String,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Run one sync round now
    Now,
    /// Show sync state and known devices
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Join a family group and enable sync
    Join {
        /// Family/partner code shared by every device
        group: String,
    },
    /// Disable sync; local data is kept
    Disable,
    /// Keep syncing in the foreground until interrupted
    Run,
    /// List recently recorded merge anomalies
    Anomalies {
        /// Number of anomalies to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show effective sync settings
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update sync settings
    Set {
        /// Sync endpoint URL
        #[arg(long, value_name = "URL")]
        endpoint: Option<String>,
        /// Default family group code
        #[arg(long, value_name = "CODE")]
        group: Option<String>,
        /// Bearer token for the sync endpoint
        #[arg(long, value_name = "TOKEN")]
        token: Option<String>,
        /// Seconds between periodic syncs
        #[arg(long, value_name = "SECS")]
        interval_secs: Option<u64>,
        /// Quiet period after a change before syncing it
        #[arg(long, value_name = "MS")]
        debounce_ms: Option<u64>,
    },
    /// Print the settings file path
    Path,
}
