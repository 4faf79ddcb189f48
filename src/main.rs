use clap::Parser;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use watchlog::{
    cli::{confirm, watch_path, Cli, Command},
    config::{OutputConfig, OutputFormat, WatchLogConfig},
    ChangeEntry, ChangeKind, EventFilter, ExtensionFilter, Recorder, SqliteStore, WatchError,
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.setup_logging();

    let config = match cli.resolve_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            std::process::exit(1);
        }
    };

    match &cli.command {
        Command::Watch { path, ext, yes, no_write } => {
            let dir = watch_path(path.as_ref());
            let ext = ext.clone().unwrap_or_else(|| config.watcher.default_extension.clone());
            let write = if *yes {
                Some(true)
            } else if *no_write {
                Some(false)
            } else {
                None
            };
            run_watch(&config, &dir, ext, write)
        }
        Command::List { ext } => run_list(&config, ext),
        Command::Clear { yes } => run_clear(&config, *yes),
    }
}

fn open_recorder(config: &WatchLogConfig) -> Result<Recorder<SqliteStore>> {
    let db_path = &config.store.db_path;
    let store = SqliteStore::open(db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    Ok(Recorder::new(store, EventFilter::new(db_path)))
}

fn run_watch(config: &WatchLogConfig, dir: &Path, ext: ExtensionFilter, write: Option<bool>) -> Result<()> {
    let mut recorder = open_recorder(config)?;
    let output = &config.output;

    match recorder.start(dir, ext) {
        Ok(status) => println!("{}", status),
        Err(err @ WatchError::InvalidPath(_)) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
        Err(err) => anyhow::bail!("Failed to start watching: {}", err),
    }
    println!("Press Ctrl+C to stop");

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let interval = config.watcher.dispatch_interval();
    while running.load(Ordering::SeqCst) {
        if let Err(err) = recorder.pump(interval, |entry| print_entry(entry, output)) {
            eprintln!("{}", err);
            eprintln!("Watching stopped; start again to resume.");
            break;
        }
    }

    if let Some(status) = recorder.stop(|entry| print_entry(entry, output)) {
        println!("{}", status);
    }

    let pending = recorder.buffer().len();
    if pending == 0 {
        return Ok(());
    }

    let write = match write {
        Some(write) => write,
        None => confirm(&format!(
            "Would you like to write the recent activity ({} entries) to the database?",
            pending
        ))?,
    };
    if !write {
        println!("Discarded {} entries", pending);
        return Ok(());
    }

    match recorder.flush() {
        Ok(written) => {
            println!("Write successful! ({} entries)", written);
            Ok(())
        }
        Err(err) => {
            eprintln!("{}", err);
            eprintln!("{} entries were not written.", recorder.buffer().len());
            std::process::exit(1);
        }
    }
}

fn run_list(config: &WatchLogConfig, ext: &ExtensionFilter) -> Result<()> {
    let recorder = open_recorder(config)?;
    let rows = recorder.list(ext)?;

    for row in &rows {
        print_entry(row, &config.output);
    }
    if config.output.format != OutputFormat::Json {
        println!("{} rows", rows.len());
    }
    Ok(())
}

fn run_clear(config: &WatchLogConfig, yes: bool) -> Result<()> {
    if !yes && !confirm("Are you sure you want to clear the database?")? {
        println!("Database left unchanged");
        return Ok(());
    }

    let recorder = open_recorder(config)?;
    let removed = recorder.clear_all()?;
    println!("*Database cleared ({} rows)", removed);
    Ok(())
}

fn print_entry(entry: &ChangeEntry, output: &OutputConfig) {
    match output.format {
        OutputFormat::Text => print_text_entry(entry, output.no_color),
        OutputFormat::Json => match serde_json::to_string(entry) {
            Ok(json) => println!("{}", json),
            Err(err) => tracing::error!("Failed to encode entry: {}", err),
        },
        OutputFormat::Compact => println!("{} {}", entry.kind.short(), entry.path.display()),
    }
}

fn print_text_entry(entry: &ChangeEntry, no_color: bool) {
    if no_color {
        println!("{}", entry.display_line());
        return;
    }

    let color = match entry.kind {
        ChangeKind::Created => "\x1b[32m",  // Green
        ChangeKind::Modified => "\x1b[33m", // Yellow
        ChangeKind::Deleted => "\x1b[31m",  // Red
        ChangeKind::Renamed => "\x1b[34m",  // Blue
    };
    println!(
        "{} {} {}{}\x1b[0m {}",
        entry.filename,
        entry.path.display(),
        color,
        entry.kind,
        entry.timestamp.format("%Y-%m-%d %H:%M:%S")
    );
}
