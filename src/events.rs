use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use chrono::{DateTime, Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use crate::filter::extension_of;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    Renamed,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "Created",
            ChangeKind::Modified => "Modified",
            ChangeKind::Deleted => "Deleted",
            ChangeKind::Renamed => "Renamed",
        }
    }

    /// Single-letter tag used by the compact output mode.
    pub fn short(&self) -> &'static str {
        match self {
            ChangeKind::Created => "C",
            ChangeKind::Modified => "M",
            ChangeKind::Deleted => "D",
            ChangeKind::Renamed => "R",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Created" => Ok(ChangeKind::Created),
            "Modified" | "Changed" => Ok(ChangeKind::Modified),
            "Deleted" => Ok(ChangeKind::Deleted),
            "Renamed" => Ok(ChangeKind::Renamed),
            other => Err(format!("unknown event kind: {}", other)),
        }
    }
}

/// One accepted filesystem event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub extension: String,
    pub filename: String,
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub timestamp: DateTime<Local>,
}

impl ChangeEntry {
    pub fn new(path: PathBuf, kind: ChangeKind) -> Self {
        Self::at(path, kind, Local::now())
    }

    pub fn at(path: PathBuf, kind: ChangeKind, timestamp: DateTime<Local>) -> Self {
        let filename = base_name(&path);
        let extension = extension_of(&filename).to_string();
        Self {
            extension,
            filename,
            path,
            kind,
            timestamp,
        }
    }

    /// Timestamp as stored in the `Date` column.
    pub fn date_string(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, false)
    }

    /// The line shown for an entry in the activity list.
    pub fn display_line(&self) -> String {
        format!(
            "{} {} {} {}",
            self.filename,
            self.path.display(),
            self.kind,
            self.timestamp.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

pub(crate) fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Message carried from the notifier thread to the consumer.
///
/// The two halves of a rename travel separately so the consumer can pair
/// them. `entry` is `None` when the filter rejected that side's path.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Accepted(ChangeEntry),
    MovedFrom {
        entry: Option<ChangeEntry>,
        tracker: Option<usize>,
    },
    MovedTo {
        entry: Option<ChangeEntry>,
        tracker: Option<usize>,
    },
    Failed(String),
}
