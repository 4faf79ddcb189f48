use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

/// Sentinel accepted on the command line and in config for "every extension".
pub const MATCH_ALL: &str = "ALL";

/// Journal files SQLite may create next to the database file.
const JOURNAL_SUFFIXES: [&str; 3] = ["-journal", "-wal", "-shm"];

/// The extension selection a session was started with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ExtensionFilter {
    All,
    Only(String),
}

impl ExtensionFilter {
    pub fn matches(&self, extension: &str) -> bool {
        match self {
            ExtensionFilter::All => true,
            ExtensionFilter::Only(selected) => selected == extension,
        }
    }
}

impl Default for ExtensionFilter {
    fn default() -> Self {
        ExtensionFilter::All
    }
}

impl fmt::Display for ExtensionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtensionFilter::All => f.write_str(MATCH_ALL),
            ExtensionFilter::Only(ext) => f.write_str(ext),
        }
    }
}

impl FromStr for ExtensionFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == MATCH_ALL {
            return Ok(ExtensionFilter::All);
        }
        if s.len() < 2 || !s.starts_with('.') {
            return Err(format!("extension must look like '.txt' or be {}: {:?}", MATCH_ALL, s));
        }
        if s.contains('/') || s.contains(std::path::MAIN_SEPARATOR) {
            return Err(format!("extension must not contain a path separator: {:?}", s));
        }
        Ok(ExtensionFilter::Only(s.to_string()))
    }
}

impl TryFrom<String> for ExtensionFilter {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ExtensionFilter> for String {
    fn from(filter: ExtensionFilter) -> Self {
        filter.to_string()
    }
}

/// Extension of a base name including the leading dot, or `""`.
///
/// Unlike [`Path::extension`] a dot-file such as `.bashrc` counts as having
/// the extension `.bashrc`, and a trailing dot yields no extension.
pub fn extension_of(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx + 1 < name.len() => &name[idx..],
        _ => "",
    }
}

/// Decides which raw notifications become entries.
#[derive(Debug, Clone)]
pub struct EventFilter {
    excluded_names: Vec<OsString>,
}

impl EventFilter {
    /// Builds a filter that suppresses events on `store_file` and its journals.
    pub fn new<P: AsRef<Path>>(store_file: P) -> Self {
        let mut excluded_names = Vec::new();
        if let Some(name) = store_file.as_ref().file_name() {
            excluded_names.push(name.to_os_string());
            for suffix in JOURNAL_SUFFIXES {
                let mut journal = name.to_os_string();
                journal.push(suffix);
                excluded_names.push(journal);
            }
        }
        Self { excluded_names }
    }

    pub fn is_self_event<P: AsRef<Path>>(&self, path: P) -> bool {
        match path.as_ref().file_name() {
            Some(name) => self
                .excluded_names
                .iter()
                .any(|excluded| same_file_name(excluded, name)),
            None => false,
        }
    }

    pub fn accept<P: AsRef<Path>>(&self, path: P, selected: &ExtensionFilter) -> bool {
        let path = path.as_ref();

        // Our own database traffic would otherwise feed back into the buffer
        if self.is_self_event(path) {
            return false;
        }

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_default();
        selected.matches(extension_of(&name))
    }
}

#[cfg(any(windows, target_os = "macos"))]
fn same_file_name(a: &std::ffi::OsStr, b: &std::ffi::OsStr) -> bool {
    a.to_string_lossy().eq_ignore_ascii_case(&b.to_string_lossy())
}

#[cfg(not(any(windows, target_os = "macos")))]
fn same_file_name(a: &std::ffi::OsStr, b: &std::ffi::OsStr) -> bool {
    a == b
}
