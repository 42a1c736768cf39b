//! # Filesystem Module
//!
//! The filesystem access layer every phase goes through: reads, listings,
//! no-clobber moves and free-space queries.
//!
//! `FileSystem` is a trait so tests can inject failures (full disks, broken
//! moves, corrupted copies) without touching real hardware.

use crate::core::hasher::hash_reader;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// What kind of entry a path is, without following symlinks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

/// Metadata for one entry
#[derive(Debug, Clone)]
pub struct EntryMetadata {
    pub kind: EntryKind,
    pub len: u64,
    pub modified: SystemTime,
}

/// An entry returned by a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
    /// Depth below the listed root (direct children are 1)
    pub depth: usize,
}

/// Trait for filesystem access
///
/// Implement this trait to substitute the filesystem (e.g., for testing).
pub trait FileSystem: Send + Sync {
    /// Open a file for streaming reads
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;

    /// Metadata without following symlinks
    fn metadata(&self, path: &Path) -> io::Result<EntryMetadata>;

    /// Direct children, sorted by file name
    fn list_dir(&self, path: &Path) -> io::Result<Vec<ListedEntry>>;

    /// Every entry below `root`, depth-first, sorted by file name per directory
    fn list_recursive(&self, root: &Path, follow_symlinks: bool) -> io::Result<Vec<ListedEntry>>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Move a file without ever replacing an existing destination
    fn move_file(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Bytes available to the current user on the volume holding `path`.
    /// `ErrorKind::Unsupported` when the platform cannot tell.
    fn available_space(&self, path: &Path) -> io::Result<u64>;

    /// Absolute path with `.`/`..` and symlinks resolved
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;

    /// True when anything (including a dangling symlink) is at `path`
    fn exists(&self, path: &Path) -> bool {
        self.metadata(path).is_ok()
    }
}

/// The real filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }

    /// Copy into a temp file beside the destination, then persist it without
    /// clobbering and remove the source only after the digests agree.
    fn copy_then_remove(&self, from: &Path, to: &Path) -> io::Result<()> {
        let parent = to.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::NamedTempFile::new_in(parent)?;
        {
            let mut source = File::open(from)?;
            io::copy(&mut source, temp.as_file_mut())?;
            temp.as_file_mut().flush()?;
            temp.as_file().sync_all()?;
        }

        let copied = temp.persist_noclobber(to).map_err(|e| e.error)?;
        drop(copied);

        if hash_reader(File::open(from)?)? != hash_reader(File::open(to)?)? {
            let _ = fs::remove_file(to);
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Copy verification failed for {} -> {}",
                    from.display(),
                    to.display()
                ),
            ));
        }

        fs::remove_file(from)
    }
}

impl FileSystem for LocalFileSystem {
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(path)?))
    }

    fn metadata(&self, path: &Path) -> io::Result<EntryMetadata> {
        let meta = fs::symlink_metadata(path)?;
        let file_type = meta.file_type();
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };
        Ok(EntryMetadata {
            kind,
            len: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        })
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<ListedEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            entries.push(ListedEntry {
                path: entry.path(),
                kind: kind_of(&file_type),
                depth: 1,
            });
        }
        entries.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
        Ok(entries)
    }

    fn list_recursive(&self, root: &Path, follow_symlinks: bool) -> io::Result<Vec<ListedEntry>> {
        let walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(follow_symlinks)
            .sort_by_file_name();

        let mut entries = Vec::new();
        for entry in walker {
            match entry {
                Ok(entry) => {
                    let kind = if entry.path_is_symlink() && !follow_symlinks {
                        EntryKind::Symlink
                    } else {
                        kind_of(&entry.file_type())
                    };
                    entries.push(ListedEntry {
                        path: entry.path().to_path_buf(),
                        kind,
                        depth: entry.depth(),
                    });
                }
                Err(e) if e.depth() == 0 => {
                    return Err(e
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::other("walk failed at root")));
                }
                Err(e) => {
                    // An unreadable subdirectory should not hide the rest of the tree
                    warn!("Skipping unreadable entry: {}", e);
                }
            }
        }
        Ok(entries)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        if fs::symlink_metadata(to).is_ok() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", to.display()),
            ));
        }

        match fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(e) if is_cross_device(&e) => {
                debug!("Cross-device move, copying {} -> {}", from.display(), to.display());
                self.copy_then_remove(from, to)
            }
            Err(e) => Err(e),
        }
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        fs::canonicalize(path)
    }

    fn available_space(&self, path: &Path) -> io::Result<u64> {
        // The destination may not exist yet; ask the nearest existing ancestor
        let mut existing = path.to_path_buf();
        while !existing.exists() {
            match existing.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => existing = parent.to_path_buf(),
                _ => {
                    existing = PathBuf::from(".");
                    break;
                }
            }
        }
        free_space(&existing)
    }
}

fn kind_of(file_type: &fs::FileType) -> EntryKind {
    if file_type.is_symlink() {
        EntryKind::Symlink
    } else if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    }
}

#[cfg(unix)]
fn is_cross_device(error: &io::Error) -> bool {
    error.raw_os_error() == Some(libc::EXDEV)
}

/// ERROR_NOT_SAME_DEVICE
#[cfg(windows)]
fn is_cross_device(error: &io::Error) -> bool {
    error.raw_os_error() == Some(17)
}

#[cfg(not(any(unix, windows)))]
fn is_cross_device(_error: &io::Error) -> bool {
    false
}

#[cfg(unix)]
fn free_space(path: &Path) -> io::Result<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let mut stats: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stats as *mut _) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    let available = (stats.f_bavail as u128).saturating_mul(stats.f_frsize as u128);
    Ok(available.min(u64::MAX as u128) as u64)
}

/// Planning treats `Unsupported` as "free space unknown"
#[cfg(not(unix))]
fn free_space(_path: &Path) -> io::Result<u64> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "free space query is not available on this platform",
    ))
}
