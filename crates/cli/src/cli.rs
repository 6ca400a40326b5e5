//! Command line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use octopod_core::ResultSelection;

/// Config file used when neither `--config` nor `OCTOPOD_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "octopod.toml";

#[derive(Parser, Debug)]
#[command(
    name = "octopod",
    version,
    about = "Upload genotype files to Octopod, run a model and fetch its results",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Path to the TOML configuration file
    #[arg(long, global = true, env = "OCTOPOD_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Account email, overrides [credentials].username
    #[arg(long, global = true)]
    pub username: Option<String>,

    /// Account password, overrides [credentials].password
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Log line format on stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload a file, run a model on it and download the results
    Process(ProcessArgs),
    /// Upload a file (or find an existing copy) and print its id
    Upload(UploadArgs),
    /// Wait for an existing order and download its results
    Wait(WaitArgs),
    /// Print the current state of an order
    Status(StatusArgs),
    /// Inspect the effective configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// Genotype file to upload
    #[arg(long, value_name = "PATH")]
    pub file: PathBuf,

    /// Model to run, e.g. skywalker
    #[arg(long, value_name = "NAME")]
    pub model: String,

    /// Reuse a remote file with the same name instead of uploading
    #[arg(long)]
    pub check_if_file_exists: bool,

    /// Tag id attached to the order (repeatable)
    #[arg(long = "tag", value_name = "ID")]
    pub tags: Vec<String>,

    #[command(flatten)]
    pub wait: WaitOptions,
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// File to upload
    #[arg(long, value_name = "PATH")]
    pub file: PathBuf,

    /// Reuse a remote file with the same name instead of uploading
    #[arg(long)]
    pub check_if_file_exists: bool,
}

#[derive(Args, Debug)]
pub struct WaitArgs {
    /// Order id, as printed by a timed out `process`
    #[arg(long, value_name = "ID")]
    pub order: String,

    #[command(flatten)]
    pub wait: WaitOptions,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Order id
    #[arg(long, value_name = "ID")]
    pub order: String,
}

/// Polling and download options shared by `process` and `wait`.
#[derive(Args, Debug)]
pub struct WaitOptions {
    /// Folder the results are written to
    #[arg(long, value_name = "DIR")]
    pub download_folder: PathBuf,

    /// Seconds between status reads [default: polling.poll_interval_secs]
    #[arg(long, value_name = "SECS")]
    pub poll_interval: Option<u64>,

    /// Seconds to wait for the order [default: polling.timeout_secs]
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Download this result type instead of the first one offered
    #[arg(long, value_name = "TYPE", conflicts_with = "all_results")]
    pub result_type: Option<String>,

    /// Download every result type the order offers
    #[arg(long)]
    pub all_results: bool,
}

impl WaitOptions {
    pub fn selection(&self) -> ResultSelection {
        match (&self.result_type, self.all_results) {
            (Some(result_type), _) => ResultSelection::Named(result_type.clone()),
            (None, true) => ResultSelection::All,
            (None, false) => ResultSelection::First,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the configuration with secrets redacted
    Show,
}
