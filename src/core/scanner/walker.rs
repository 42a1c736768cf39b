//! Directory walking over the filesystem layer.

use super::filter::{FilterDecision, ImageFilter};
use super::{DiscoveredFile, Discovery, PhotoScanner};
use crate::core::config::ScanConfig;
use crate::core::fs::{EntryKind, FileSystem};
use crate::error::ScanError;
use crate::events::{Event, EventSender, ScanEvent};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Scanner implementation walking through a `FileSystem`
pub struct WalkDirScanner<'a> {
    fs: &'a dyn FileSystem,
    config: ScanConfig,
    filter: ImageFilter,
}

impl<'a> WalkDirScanner<'a> {
    /// Create a new scanner with the given configuration
    pub fn new(fs: &'a dyn FileSystem, config: ScanConfig) -> Self {
        let mut filter = ImageFilter::new().with_hidden(config.include_hidden);

        if let Some(ref extensions) = config.extensions {
            filter = filter.with_extensions(extensions.clone());
        }

        Self { fs, config, filter }
    }

    fn check_root(&self, root: &Path) -> Result<(), ScanError> {
        match self.fs.metadata(root) {
            Ok(meta) if meta.kind == EntryKind::Directory => Ok(()),
            Ok(meta) if meta.kind == EntryKind::Symlink && self.config.follow_symlinks => Ok(()),
            Ok(_) => Err(ScanError::NotADirectory {
                path: root.to_path_buf(),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ScanError::DirectoryNotFound {
                path: root.to_path_buf(),
            }),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                Err(ScanError::PermissionDenied {
                    path: root.to_path_buf(),
                })
            }
            Err(e) => Err(ScanError::ReadDirectory {
                path: root.to_path_buf(),
                source: e,
            }),
        }
    }

    /// True when any component below `root` is hidden
    fn in_hidden_tree(root: &Path, path: &Path) -> bool {
        path.strip_prefix(root)
            .map(|relative| {
                relative
                    .components()
                    .any(|c| ImageFilter::is_hidden(&c.as_os_str().to_string_lossy()))
            })
            .unwrap_or(false)
    }

    /// Resolved form of a root, for overlap checks
    fn canonical_root(&self, root: &Path) -> Result<PathBuf, ScanError> {
        self.fs
            .canonicalize(root)
            .map_err(|e| ScanError::ReadDirectory {
                path: root.to_path_buf(),
                source: e,
            })
    }

    /// Scan a single directory. `seen` holds canonical file paths, so a file
    /// reached through two spellings of the same folder is listed once.
    fn scan_directory(
        &self,
        root: &Path,
        canonical_root: &Path,
        seen: &mut HashSet<PathBuf>,
        discovery: &mut Discovery,
        events: &EventSender,
    ) -> Result<(), ScanError> {
        let entries = self
            .fs
            .list_recursive(root, self.config.follow_symlinks)
            .map_err(|e| ScanError::ReadDirectory {
                path: root.to_path_buf(),
                source: e,
            })?;

        for entry in entries {
            if let Some(depth) = self.config.max_depth {
                if entry.depth > depth {
                    continue;
                }
            }
            if !self.config.include_hidden && Self::in_hidden_tree(root, &entry.path) {
                continue;
            }

            match entry.kind {
                EntryKind::Directory => continue,
                EntryKind::Symlink => {
                    debug!("Skipping symlink {}", entry.path.display());
                    events.send(Event::Scan(ScanEvent::Skipped {
                        path: entry.path.clone(),
                        reason: "symlink".to_string(),
                    }));
                    discovery.counts.skipped += 1;
                    continue;
                }
                EntryKind::Other => {
                    discovery.counts.skipped += 1;
                    continue;
                }
                EntryKind::File => {}
            }

            // Overlapping roots must not turn one file into its own duplicate
            let key = match entry.path.strip_prefix(root) {
                Ok(relative) => canonical_root.join(relative),
                Err(_) => entry.path.clone(),
            };
            if !seen.insert(key) {
                continue;
            }

            match self.filter.classify(&entry.path) {
                FilterDecision::Hidden => {}
                FilterDecision::Unsupported => discovery.counts.unsupported += 1,
                FilterDecision::Supported(format) => {
                    discovery.counts.supported += 1;
                    discovery.files.push(DiscoveredFile {
                        path: entry.path,
                        format,
                    });
                }
            }
        }

        Ok(())
    }
}

impl PhotoScanner for WalkDirScanner<'_> {
    fn discover(&self, paths: &[PathBuf], events: &EventSender) -> Result<Discovery, ScanError> {
        if paths.is_empty() {
            return Err(ScanError::NoPaths);
        }

        events.send(Event::Scan(ScanEvent::Started {
            paths: paths.to_vec(),
        }));

        let mut discovery = Discovery::default();
        let mut roots: Vec<PathBuf> = Vec::new();
        let mut seen = HashSet::new();
        for path in paths {
            self.check_root(path)?;
            let canonical = self.canonical_root(path)?;
            if let Some(covering) = roots.iter().find(|earlier| canonical.starts_with(earlier)) {
                debug!(
                    "Skipping {}: already covered by {}",
                    path.display(),
                    covering.display()
                );
                continue;
            }
            self.scan_directory(path, &canonical, &mut seen, &mut discovery, events)?;
            roots.push(canonical);
        }

        info!(
            "Discovered {} supported, {} unsupported, {} skipped",
            discovery.counts.supported, discovery.counts.unsupported, discovery.counts.skipped
        );
        events.send(Event::Scan(ScanEvent::Completed {
            supported: discovery.counts.supported,
            unsupported: discovery.counts.unsupported,
            skipped: discovery.counts.skipped,
        }));

        Ok(discovery)
    }
}
