// src/remote/mod.rs

//! Remote directory session
//!
//! Directory semantics (list, exists, mkdir, rename, recursive delete, glob and
//! tree transfers) on top of a [`DirectoryBackend`]. The backend exposes only the
//! primitive calls an SFTP server offers; everything multi-step lives here.
//!
//! # Rename fallback
//!
//! Some SFTP servers refuse to rename a directory that contains subdirectories
//! and answer `OpUnsupported`. [`RemoteSession::move_path`] then relocates the
//! tree entry by entry, deepest first: directories are recreated under the
//! target, files are renamed one at a time, and each emptied source directory is
//! removed on the way up. Files are never deleted by the fallback.

pub mod memory;
pub mod registry;
pub mod sftp;

use crate::error::{Error, Result};
use crate::progress::ProgressTracker;
use crate::stage::{join_remote, Stage, StageRegistry};
use crate::transfer::{Transfer, TransferSummary};
use chrono::{DateTime, Utc};
use glob::{MatchOptions, Pattern};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub use memory::MemoryDirectory;
pub use registry::{Agency, SessionRegistry};

/// One entry of a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteEntry {
    /// Entry name (or path relative to the glob root)
    pub name: String,
    /// True for directories
    pub is_directory: bool,
    /// Last modification time, when the server reports one
    pub modification_time: Option<DateTime<Utc>>,
}

/// Status codes reported by the directory backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    NoSuchFile,
    PermissionDenied,
    OpUnsupported,
    Failure,
    ConnectionLost,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NoSuchFile => "no such file",
            Self::PermissionDenied => "permission denied",
            Self::OpUnsupported => "operation unsupported",
            Self::Failure => "failure",
            Self::ConnectionLost => "connection lost",
        };
        f.write_str(text)
    }
}

/// Status error returned by a backend primitive
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct StatusError {
    pub code: StatusCode,
    pub message: String,
}

impl StatusError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn no_such_file(path: &str) -> Self {
        Self::new(StatusCode::NoSuchFile, path)
    }

    pub fn is_not_found(&self) -> bool {
        self.code == StatusCode::NoSuchFile
    }
}

impl From<StatusError> for Error {
    fn from(err: StatusError) -> Self {
        match err.code {
            StatusCode::NoSuchFile => Error::NotFound(err.message),
            _ => Error::sftp(err.to_string()),
        }
    }
}

/// Primitive operations of a directory-oriented remote filesystem
///
/// Paths are absolute, `/`-separated remote paths. Implementations report
/// failures with the SFTP status code closest to the cause.
pub trait DirectoryBackend: Send {
    /// Immediate children of `path`, unfiltered and unordered
    fn read_dir(&self, path: &str) -> std::result::Result<Vec<RemoteEntry>, StatusError>;

    /// Create a single directory; the parent must exist
    fn create_dir(&self, path: &str) -> std::result::Result<(), StatusError>;

    /// Rename a file or directory
    fn rename(&self, from: &str, to: &str) -> std::result::Result<(), StatusError>;

    /// Remove a single file
    fn remove_file(&self, path: &str) -> std::result::Result<(), StatusError>;

    /// Remove an empty directory
    fn remove_dir(&self, path: &str) -> std::result::Result<(), StatusError>;

    /// Create or truncate a file with the given contents
    fn write_file(&self, path: &str, data: &[u8]) -> std::result::Result<(), StatusError>;

    /// Read a whole file
    fn read_file(&self, path: &str) -> std::result::Result<Vec<u8>, StatusError>;
}

/// Result of an idempotent recursive delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The path did not exist
    Absent,
    /// The path existed; `entries` descendants were deleted
    Removed { entries: usize },
}

/// A descendant found while walking a remote tree
#[derive(Debug, Clone)]
struct TreeEntry {
    /// Path relative to the walk root
    rel: String,
    is_directory: bool,
}

impl TreeEntry {
    fn depth(&self) -> usize {
        self.rel.split('/').count()
    }
}

/// Deepest entries first; ties ordered by path for determinism
fn deepest_first(entries: &mut [TreeEntry]) {
    entries.sort_by(|a, b| b.depth().cmp(&a.depth()).then_with(|| a.rel.cmp(&b.rel)));
}

/// Split a remote path into `(parent, basename)`
fn split_remote(path: &str) -> (String, String) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some(("", name)) => ("/".to_string(), name.to_string()),
        Some((parent, name)) => (parent.to_string(), name.to_string()),
        None => (".".to_string(), trimmed.to_string()),
    }
}

/// Relative local path rendered with `/` separators
fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// An authenticated session against one agency's directory server
pub struct RemoteSession {
    backend: Box<dyn DirectoryBackend>,
    stages: StageRegistry,
}

impl RemoteSession {
    /// Wrap a connected backend
    pub fn new(backend: Box<dyn DirectoryBackend>, stages: StageRegistry) -> Self {
        Self { backend, stages }
    }

    /// Stage layout used by this session
    pub fn stages(&self) -> &StageRegistry {
        &self.stages
    }

    // =========================================================================
    // Listing
    // =========================================================================

    /// Every child of `path` except `.` and `..`, sorted by name
    fn read_entries(&self, path: &str) -> std::result::Result<Vec<RemoteEntry>, StatusError> {
        let mut entries: Vec<RemoteEntry> = self
            .backend
            .read_dir(path)?
            .into_iter()
            .filter(|e| e.name != "." && e.name != "..")
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Children of `path` without dot-prefixed names
    fn list_raw(&self, path: &str) -> std::result::Result<Vec<RemoteEntry>, StatusError> {
        let mut entries = self.read_entries(path)?;
        entries.retain(|e| !e.name.starts_with('.'));
        Ok(entries)
    }

    /// Immediate children of `path`, without dot entries, sorted by name
    pub fn list(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        Ok(self.list_raw(path)?)
    }

    /// Children of a stage directory
    pub fn list_stage(&self, stage: Stage) -> Result<Vec<RemoteEntry>> {
        self.list(&self.stages.path_for(stage))
    }

    fn exists_raw(&self, path: &str) -> std::result::Result<bool, StatusError> {
        if path.trim_end_matches('/').is_empty() {
            return Ok(true);
        }
        let (parent, name) = split_remote(path);
        match self.read_entries(&parent) {
            Ok(entries) => Ok(entries.iter().any(|e| e.name == name)),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// True if `path` exists; a missing parent directory counts as absent
    pub fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.exists_raw(path)?)
    }

    /// Every descendant of `root`, dot entries included, parents before children
    fn walk(&self, root: &str, max_depth: usize) -> std::result::Result<Vec<TreeEntry>, StatusError> {
        let mut out = Vec::new();
        self.walk_into(root, "", 1, max_depth, &mut out)?;
        Ok(out)
    }

    fn walk_into(
        &self,
        dir: &str,
        prefix: &str,
        depth: usize,
        max_depth: usize,
        out: &mut Vec<TreeEntry>,
    ) -> std::result::Result<(), StatusError> {
        for entry in self.read_entries(dir)? {
            let rel = if prefix.is_empty() {
                entry.name.clone()
            } else {
                format!("{}/{}", prefix, entry.name)
            };
            out.push(TreeEntry {
                rel: rel.clone(),
                is_directory: entry.is_directory,
            });
            if entry.is_directory && depth < max_depth {
                self.walk_into(&join_remote(dir, &entry.name), &rel, depth + 1, max_depth, out)?;
            }
        }
        Ok(())
    }

    /// Entries below `root` whose relative path matches `pattern`
    ///
    /// Returned names are relative to `root`. The walk descends only as deep as
    /// the pattern has segments, unless the pattern contains `**`.
    pub fn glob(&self, root: &str, pattern: &str) -> Result<Vec<RemoteEntry>> {
        let compiled = Pattern::new(pattern).map_err(|e| Error::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        let options = MatchOptions {
            require_literal_separator: true,
            ..MatchOptions::new()
        };
        let max_depth = if pattern.contains("**") {
            usize::MAX
        } else {
            pattern.split('/').count()
        };

        let mut matches = Vec::new();
        let mut stack = vec![(root.to_string(), String::new(), 1usize)];
        while let Some((dir, prefix, depth)) = stack.pop() {
            for entry in self.list_raw(&dir)? {
                let rel = if prefix.is_empty() {
                    entry.name.clone()
                } else {
                    format!("{}/{}", prefix, entry.name)
                };
                if entry.is_directory && depth < max_depth {
                    stack.push((join_remote(&dir, &entry.name), rel.clone(), depth + 1));
                }
                if compiled.matches_with(&rel, options) {
                    matches.push(RemoteEntry { name: rel, ..entry });
                }
            }
        }
        matches.sort_by(|a, b| a.name.cmp(&b.name));
        debug!("glob {} '{}': {} matches", root, pattern, matches.len());
        Ok(matches)
    }

    // =========================================================================
    // Structure changes
    // =========================================================================

    fn ensure_dir(
        &self,
        path: &str,
        known: &mut HashSet<String>,
    ) -> std::result::Result<(), StatusError> {
        let absolute = path.starts_with('/');
        let mut current = if absolute { "/".to_string() } else { String::new() };
        let mut missing = false;

        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = if current.is_empty() {
                segment.to_string()
            } else {
                join_remote(&current, segment)
            };
            if known.contains(&current) {
                continue;
            }
            // Everything below a missing segment is missing too.
            if !missing && self.exists_raw(&current)? {
                known.insert(current.clone());
                continue;
            }
            missing = true;
            debug!("Creating {}", current);
            self.backend.create_dir(&current)?;
            known.insert(current.clone());
        }
        Ok(())
    }

    /// Create `path` and every missing ancestor; existing segments are skipped
    pub fn mkdir_recursive(&self, path: &str) -> Result<()> {
        Ok(self.ensure_dir(path, &mut HashSet::new())?)
    }

    /// Create the stage root and every stage directory if missing
    pub fn ensure_layout(&self) -> Result<()> {
        let mut known = HashSet::new();
        for stage in StageRegistry::all() {
            self.ensure_dir(&self.stages.path_for(stage), &mut known)?;
        }
        Ok(())
    }

    /// Move `from` to `to`, falling back to per-entry relocation when the
    /// server cannot rename the directory in one step
    pub fn move_path(&self, from: &str, to: &str) -> Result<()> {
        match self.backend.rename(from, to) {
            Ok(()) => {
                debug!("Renamed {} -> {}", from, to);
                Ok(())
            }
            Err(e) if e.code == StatusCode::OpUnsupported => {
                info!("Rename of {} unsupported, moving entries individually", from);
                Ok(self.move_entries(from, to)?)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn move_entries(&self, from: &str, to: &str) -> std::result::Result<(), StatusError> {
        let mut entries = self.walk(from, usize::MAX)?;
        deepest_first(&mut entries);

        let mut known = HashSet::new();
        self.ensure_dir(to, &mut known)?;

        for entry in &entries {
            let source = join_remote(from, &entry.rel);
            let target = join_remote(to, &entry.rel);
            if entry.is_directory {
                self.ensure_dir(&target, &mut known)?;
                self.backend.remove_dir(&source)?;
            } else {
                let (parent, _) = split_remote(&target);
                self.ensure_dir(&parent, &mut known)?;
                self.backend.rename(&source, &target)?;
            }
        }
        self.backend.remove_dir(from)?;
        debug!("Moved {} entries from {} to {}", entries.len(), from, to);
        Ok(())
    }

    /// Delete everything below `path`, and `path` itself if `include_parent`
    ///
    /// A path that does not exist is reported as [`Removal::Absent`].
    pub fn remove_recursive(&self, path: &str, include_parent: bool) -> Result<Removal> {
        let mut entries = match self.walk(path, usize::MAX) {
            Ok(entries) => entries,
            Err(e) if e.is_not_found() => {
                debug!("Nothing to remove at {}", path);
                return Ok(Removal::Absent);
            }
            Err(e) => return Err(e.into()),
        };
        deepest_first(&mut entries);

        for entry in &entries {
            let target = join_remote(path, &entry.rel);
            if entry.is_directory {
                self.backend.remove_dir(&target)?;
            } else {
                self.backend.remove_file(&target)?;
            }
        }
        if include_parent {
            self.backend.remove_dir(path)?;
        }
        info!("Removed {} ({} entries)", path, entries.len());
        Ok(Removal::Removed {
            entries: entries.len(),
        })
    }

    // =========================================================================
    // Tree transfers
    // =========================================================================

    /// Upload the tree below `local_dir` to `<stage>/<remote_rel>`
    ///
    /// The destination directory chain is created before any file moves; one
    /// progress unit is reported per local file or directory.
    pub fn upload_tree(
        &self,
        local_dir: &Path,
        remote_rel: &str,
        stage: Stage,
        progress: &dyn ProgressTracker,
    ) -> Result<TransferSummary> {
        let dest = join_remote(&self.stages.path_for(stage), remote_rel);
        info!("SFTP upload {} -> {}", local_dir.display(), dest);

        let mut known = HashSet::new();
        self.ensure_dir(&dest, &mut known)?;

        let entries = WalkDir::new(local_dir)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::IoError(format!("walking {}: {}", local_dir.display(), e)))?;

        let mut transfer = Transfer::start(progress, "SFTP upload", entries.len() as u64);
        for entry in &entries {
            let rel = entry
                .path()
                .strip_prefix(local_dir)
                .map(slash_path)
                .map_err(|e| Error::IoError(e.to_string()))?;
            let remote = join_remote(&dest, &rel);

            if entry.file_type().is_dir() {
                if !known.contains(&remote) && !self.exists_raw(&remote)? {
                    debug!("Creating {}", remote);
                    self.backend.create_dir(&remote)?;
                }
                known.insert(remote);
            } else if entry.file_type().is_file() {
                debug!("Uploading {}", rel);
                let data = std::fs::read(entry.path())?;
                self.backend.write_file(&remote, &data)?;
            } else {
                warn!("Skipping non-regular file {}", entry.path().display());
            }
            transfer.advance(&rel);
        }
        Ok(transfer.complete())
    }

    /// Download the tree below `remote_path` into a fresh `local_dir`
    ///
    /// `local_dir` is cleared first. A missing `remote_path` is fatal: it means
    /// the requested package does not exist.
    pub fn download_tree(
        &self,
        remote_path: &str,
        local_dir: &Path,
        progress: &dyn ProgressTracker,
    ) -> Result<TransferSummary> {
        info!("SFTP download {} -> {}", remote_path, local_dir.display());
        if local_dir.exists() {
            std::fs::remove_dir_all(local_dir)?;
        }
        std::fs::create_dir_all(local_dir)?;

        let entries = self.walk(remote_path, usize::MAX).map_err(|e| {
            if e.is_not_found() {
                Error::NotFound(format!("remote package {} does not exist", remote_path))
            } else {
                e.into()
            }
        })?;

        // One extra unit for the local root directory.
        let mut transfer = Transfer::start(progress, "SFTP download", entries.len() as u64 + 1);
        transfer.advance(&local_dir.display().to_string());

        for entry in &entries {
            let local = local_dir.join(&entry.rel);
            if entry.is_directory {
                std::fs::create_dir_all(&local)?;
            } else {
                debug!("Downloading {}", entry.rel);
                let data = self.backend.read_file(&join_remote(remote_path, &entry.rel))?;
                if let Some(parent) = local.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&local, data)?;
            }
            transfer.advance(&entry.rel);
        }
        Ok(transfer.complete())
    }
}
