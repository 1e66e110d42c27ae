use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

/// Configuration for the docx-template command.
#[derive(Parser, Debug, Clone)]
#[command(name = "docx-template")]
#[command(about = "Fill {{placeholders}} and custom properties in DOCX templates")]
pub struct Config {
    /// Directory where saved documents are stored
    #[arg(long, default_value = "./documents", env = "DOCX_TEMPLATE_STORE_DIR")]
    pub store_dir: PathBuf,

    /// Directory for draft snapshots (drafts are disabled when unset)
    #[arg(long, env = "DOCX_TEMPLATE_DRAFTS_DIR")]
    pub drafts_dir: Option<PathBuf>,

    /// Delay before a typed value is applied (milliseconds)
    #[arg(long, default_value = "300", env = "DOCX_TEMPLATE_DEBOUNCE_MS")]
    pub debounce_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

impl Config {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List the fields of a template as JSON
    Scan {
        /// Template file (.docx)
        file: PathBuf,
    },

    /// Fill a template and write or store the result
    Fill {
        /// Template file (.docx)
        file: PathBuf,

        /// Field value, repeatable
        #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_assignment)]
        values: Vec<(String, String)>,

        /// Write the filled document to this path
        #[arg(long, conflicts_with = "save_as")]
        out: Option<PathBuf>,

        /// Save the filled document in the store under this name
        #[arg(long)]
        save_as: Option<String>,

        /// Store folder for --save-as
        #[arg(long, requires = "save_as")]
        folder: Option<String>,
    },
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got {raw:?}")),
    }
}
