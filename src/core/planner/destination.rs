//! Destination layout validation.
//!
//! A merge may only target a folder that is empty or already partitioned as
//! `YEAR/YEAR-MONTH`. The reserved review and quarantine folders are allowed
//! at the top level; hidden entries are ignored everywhere.

use crate::core::config::PlanConfig;
use crate::core::fs::{EntryKind, FileSystem};
use crate::core::metadata::EARLIEST_PLAUSIBLE_YEAR;
use crate::error::PlanError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// What the destination currently looks like
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DestinationState {
    Empty,
    Chronological,
    NonChronological { blocking_paths: Vec<PathBuf> },
}

impl DestinationState {
    pub fn name(&self) -> &'static str {
        match self {
            DestinationState::Empty => "EMPTY",
            DestinationState::Chronological => "CHRONOLOGICAL",
            DestinationState::NonChronological { .. } => "NON_CHRONOLOGICAL",
        }
    }
}

/// Folder-name rules for one plan configuration
struct Layout {
    year: Regex,
    year_month: Regex,
    reserved: Regex,
}

impl Layout {
    fn new(config: &PlanConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            year: Regex::new(r"^(\d{4})$")?,
            year_month: Regex::new(r"^(\d{4})-(0[1-9]|1[0-2])$")?,
            reserved: Regex::new(&format!(
                "^(?:{}|{})$",
                regex::escape(&config.review_dir),
                regex::escape(&config.quarantine_dir)
            ))?,
        })
    }

    fn is_year(&self, name: &str) -> bool {
        self.year
            .captures(name)
            .and_then(|c| c[1].parse::<i32>().ok())
            .is_some_and(|year| year >= EARLIEST_PLAUSIBLE_YEAR)
    }

    fn is_year_month(&self, name: &str, year: &str) -> bool {
        self.year_month
            .captures(name)
            .is_some_and(|c| &c[1] == year)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

fn name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Inspect `root` and classify its layout.
///
/// A missing root counts as empty. A root that is a symlink or a file is an
/// error of its own rather than a blocking path.
pub fn validate_destination(
    fs: &dyn FileSystem,
    root: &Path,
    config: &PlanConfig,
) -> Result<DestinationState, PlanError> {
    let meta = match fs.metadata(root) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("Destination {} does not exist yet", root.display());
            return Ok(DestinationState::Empty);
        }
        Err(source) => {
            return Err(PlanError::Io {
                path: root.to_path_buf(),
                source,
            })
        }
    };
    match meta.kind {
        EntryKind::Directory => {}
        EntryKind::Symlink => {
            return Err(PlanError::DestinationIsSymlink {
                path: root.to_path_buf(),
            })
        }
        EntryKind::File | EntryKind::Other => {
            return Err(PlanError::DestinationNotDirectory {
                path: root.to_path_buf(),
            })
        }
    }

    let layout = Layout::new(config)?;
    let list = |path: &Path| {
        fs.list_dir(path).map_err(|source| PlanError::Io {
            path: path.to_path_buf(),
            source,
        })
    };

    let entries: Vec<_> = list(root)?
        .into_iter()
        .filter(|e| !is_hidden(&e.path))
        .collect();
    if entries.is_empty() {
        return Ok(DestinationState::Empty);
    }

    let mut blocking = Vec::new();
    for entry in entries {
        let name = name_of(&entry.path);
        match entry.kind {
            EntryKind::Directory if layout.reserved.is_match(&name) => {}
            EntryKind::Directory if layout.is_year(&name) => {
                for month in list(&entry.path)?.into_iter().filter(|e| !is_hidden(&e.path)) {
                    let month_ok = month.kind == EntryKind::Directory
                        && layout.is_year_month(&name_of(&month.path), &name);
                    if !month_ok {
                        blocking.push(month.path);
                    }
                }
            }
            _ => blocking.push(entry.path),
        }
    }

    if blocking.is_empty() {
        Ok(DestinationState::Chronological)
    } else {
        blocking.sort();
        warn!(
            "Destination {} is not chronological ({} blocking paths)",
            root.display(),
            blocking.len()
        );
        Ok(DestinationState::NonChronological {
            blocking_paths: blocking,
        })
    }
}
