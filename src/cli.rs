use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crate::config::{OutputFormat, WatchLogConfig};
use crate::filter::ExtensionFilter;

#[derive(Parser)]
#[command(name = "watchlog")]
#[command(version)]
#[command(about = "Watch a directory, buffer file activity, and write it to SQLite on demand")]
#[command(long_about = "watchlog records create, modify, delete and rename events in one directory, optionally limited to a single extension. Activity is held in memory until you choose to write it to the database, which can then be browsed or cleared.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (TOML)
    #[arg(long, global = true, value_name = "FILE", help = "Path to a TOML config file")]
    pub config: Option<PathBuf>,

    /// Database file
    #[arg(long, global = true, value_name = "FILE", help = "SQLite database file (default: log.db)")]
    pub db: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, help = "Output format")]
    pub output: Option<OutputFormat>,

    /// Enable verbose logging
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Disable colors in output
    #[arg(long, global = true, help = "Disable colored output")]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Watch a directory until Ctrl+C, then offer to write the activity
    Watch {
        #[arg(value_name = "PATH", help = "Directory to watch (defaults to current directory)")]
        path: Option<PathBuf>,

        #[arg(short, long, help = "Extension to record, e.g. .txt, or ALL")]
        ext: Option<ExtensionFilter>,

        #[arg(short = 'y', long, help = "Write buffered activity on exit without asking")]
        yes: bool,

        #[arg(long, conflicts_with = "yes", help = "Discard buffered activity on exit without asking")]
        no_write: bool,
    },
    /// Show stored activity
    List {
        #[arg(short, long, default_value = "ALL", help = "Extension to show, e.g. .txt, or ALL")]
        ext: ExtensionFilter,
    },
    /// Delete all stored activity
    Clear {
        #[arg(short = 'y', long, help = "Skip the confirmation prompt")]
        yes: bool,
    },
}

impl Cli {
    pub fn setup_logging(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };

        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }

    /// Config file and environment, overridden by command-line flags.
    pub fn resolve_config(&self) -> Result<WatchLogConfig> {
        let mut config = WatchLogConfig::load_or_default(self.config.as_ref())?;

        if let Some(db) = &self.db {
            config.store.db_path = db.clone();
        }
        if let Some(format) = self.output {
            config.output.format = format;
        }
        if self.no_color {
            config.output.no_color = true;
        }

        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }
}

pub fn watch_path(path: Option<&PathBuf>) -> PathBuf {
    path.cloned().unwrap_or_else(|| {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    })
}

/// Asks a yes/no question on stdin. Anything but `y`/`yes` means no.
pub fn confirm(prompt: &str) -> Result<bool> {
    let stdin = io::stdin();
    confirm_from(prompt, &mut stdin.lock(), &mut io::stderr())
}

fn confirm_from<R: BufRead, W: Write>(prompt: &str, input: &mut R, out: &mut W) -> Result<bool> {
    write!(out, "{} [y/N] ", prompt)?;
    out.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer).context("Failed to read answer")?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_watch_command() {
        let cli = Cli::try_parse_from(["watchlog", "watch", "/tmp", "--ext", ".txt", "--yes"]).unwrap();
        match cli.command {
            Command::Watch { path, ext, yes, no_write } => {
                assert_eq!(path, Some(PathBuf::from("/tmp")));
                assert_eq!(ext, Some(ExtensionFilter::Only(".txt".to_string())));
                assert!(yes);
                assert!(!no_write);
            }
            _ => panic!("Expected watch command"),
        }
    }

    #[test]
    fn test_rejects_malformed_extension() {
        assert!(Cli::try_parse_from(["watchlog", "watch", "--ext", "txt"]).is_err());
        assert!(Cli::try_parse_from(["watchlog", "watch", "--yes", "--no-write"]).is_err());
    }

    #[test]
    fn test_list_defaults_to_all() {
        let cli = Cli::try_parse_from(["watchlog", "list", "--output", "json"]).unwrap();
        assert_eq!(cli.output, Some(OutputFormat::Json));
        assert!(matches!(cli.command, Command::List { ext: ExtensionFilter::All }));
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from(["watchlog", "--db", "other.db", "--no-color", "clear"]).unwrap();
        let config = cli.resolve_config().unwrap();

        assert_eq!(config.store.db_path, PathBuf::from("other.db"));
        assert!(config.output.no_color);
    }

    #[test]
    fn test_confirm_answers() {
        let mut out = Vec::new();
        assert!(confirm_from("Write?", &mut "y\n".as_bytes(), &mut out).unwrap());
        assert!(confirm_from("Write?", &mut "YES\n".as_bytes(), &mut out).unwrap());
        assert!(!confirm_from("Write?", &mut "n\n".as_bytes(), &mut out).unwrap());
        assert!(!confirm_from("Write?", &mut "".as_bytes(), &mut out).unwrap());
        assert!(String::from_utf8(out).unwrap().starts_with("Write? [y/N] "));
    }
}
