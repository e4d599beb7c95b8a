// src/remote/memory.rs

//! In-memory directory backend
//!
//! Behaves like a small SFTP server: listings include `.` and `..`, missing
//! paths answer `NoSuchFile`, non-empty directories cannot be removed, and
//! renames onto existing paths fail. Clones share the same tree, so a test can
//! hand one clone to a session and inspect the other.

use super::{DirectoryBackend, RemoteEntry, StatusCode, StatusError};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
}

#[derive(Debug, Clone)]
struct Stored {
    node: Node,
    modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Tree {
    nodes: BTreeMap<String, Stored>,
    nested_rename_unsupported: bool,
    fail_next: Option<StatusCode>,
}

/// Shared in-memory directory tree
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    tree: Arc<Mutex<Tree>>,
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn parent_of(path: &str) -> Option<String> {
    match path.rsplit_once('/') {
        Some(("", _)) if path != "/" => Some("/".to_string()),
        Some((parent, _)) if !parent.is_empty() => Some(parent.to_string()),
        _ => None,
    }
}

fn is_below(path: &str, root: &str) -> bool {
    if root == "/" {
        path != "/"
    } else {
        path.strip_prefix(root).is_some_and(|rest| rest.starts_with('/'))
    }
}

impl Tree {
    fn is_dir(&self, path: &str) -> bool {
        path == "/" || matches!(self.nodes.get(path), Some(Stored { node: Node::Dir, .. }))
    }

    fn exists(&self, path: &str) -> bool {
        path == "/" || self.nodes.contains_key(path)
    }

    fn children(&self, dir: &str) -> impl Iterator<Item = (&String, &Stored)> {
        let dir = dir.to_string();
        self.nodes
            .iter()
            .filter(move |(path, _)| parent_of(path).as_deref() == Some(dir.as_str()))
    }

    fn check_failure(&mut self, path: &str) -> Result<(), StatusError> {
        match self.fail_next.take() {
            Some(code) => Err(StatusError::new(code, format!("injected failure at {}", path))),
            None => Ok(()),
        }
    }

    fn require_parent_dir(&self, path: &str) -> Result<(), StatusError> {
        let parent = parent_of(path).unwrap_or_else(|| "/".to_string());
        if !self.exists(&parent) {
            return Err(StatusError::no_such_file(&parent));
        }
        if !self.is_dir(&parent) {
            return Err(StatusError::new(
                StatusCode::Failure,
                format!("{} is not a directory", parent),
            ));
        }
        Ok(())
    }

    fn insert(&mut self, path: String, node: Node) {
        self.nodes.insert(
            path,
            Stored {
                node,
                modified: Utc::now(),
            },
        );
    }
}

impl MemoryDirectory {
    /// Empty tree containing only `/`
    pub fn new() -> Self {
        Self::default()
    }

    /// Tree whose renames fail with `OpUnsupported` for directories that
    /// contain subdirectories, like some production SFTP servers
    pub fn with_nested_rename_unsupported() -> Self {
        let dir = Self::new();
        dir.lock().nested_rename_unsupported = true;
        dir
    }

    fn lock(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next backend call fail with `code`
    pub fn fail_next(&self, code: StatusCode) {
        self.lock().fail_next = Some(code);
    }

    /// Create a directory and any missing ancestors
    pub fn add_dir(&self, path: &str) {
        let path = normalize(path);
        let mut tree = self.lock();
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = format!("{}/{}", current, segment);
            if !tree.exists(&current) {
                tree.insert(current.clone(), Node::Dir);
            }
        }
    }

    /// Create a file, creating missing ancestors
    pub fn add_file(&self, path: &str, data: &[u8]) {
        let path = normalize(path);
        if let Some(parent) = parent_of(&path) {
            self.add_dir(&parent);
        }
        self.lock().insert(path, Node::File(data.to_vec()));
    }

    /// True if `path` is a directory
    pub fn is_dir(&self, path: &str) -> bool {
        self.lock().is_dir(&normalize(path))
    }

    /// True if `path` exists
    pub fn contains(&self, path: &str) -> bool {
        self.lock().exists(&normalize(path))
    }

    /// Contents of a file
    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        match self.lock().nodes.get(&normalize(path)) {
            Some(Stored {
                node: Node::File(data),
                ..
            }) => Some(data.clone()),
            _ => None,
        }
    }

    /// Every file below `root`, keyed by path relative to `root`
    pub fn files_under(&self, root: &str) -> BTreeMap<String, Vec<u8>> {
        let root = normalize(root);
        self.lock()
            .nodes
            .iter()
            .filter(|(path, _)| is_below(path, &root))
            .filter_map(|(path, stored)| match &stored.node {
                Node::File(data) => {
                    let rel = path[root.len()..].trim_start_matches('/').to_string();
                    Some((rel, data.clone()))
                }
                Node::Dir => None,
            })
            .collect()
    }
}

impl DirectoryBackend for MemoryDirectory {
    fn read_dir(&self, path: &str) -> Result<Vec<RemoteEntry>, StatusError> {
        let path = normalize(path);
        let mut tree = self.lock();
        tree.check_failure(&path)?;
        if !tree.exists(&path) {
            return Err(StatusError::no_such_file(&path));
        }
        if !tree.is_dir(&path) {
            return Err(StatusError::new(
                StatusCode::Failure,
                format!("{} is not a directory", path),
            ));
        }

        let now = Utc::now();
        let mut entries: Vec<RemoteEntry> = [".", ".."]
            .iter()
            .map(|name| RemoteEntry {
                name: name.to_string(),
                is_directory: true,
                modification_time: Some(now),
            })
            .collect();
        entries.extend(tree.children(&path).map(|(child, stored)| RemoteEntry {
            name: child.rsplit('/').next().unwrap_or(child).to_string(),
            is_directory: matches!(stored.node, Node::Dir),
            modification_time: Some(stored.modified),
        }));
        Ok(entries)
    }

    fn create_dir(&self, path: &str) -> Result<(), StatusError> {
        let path = normalize(path);
        let mut tree = self.lock();
        tree.check_failure(&path)?;
        if tree.exists(&path) {
            return Err(StatusError::new(
                StatusCode::Failure,
                format!("{} already exists", path),
            ));
        }
        tree.require_parent_dir(&path)?;
        tree.insert(path, Node::Dir);
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), StatusError> {
        let from = normalize(from);
        let to = normalize(to);
        let mut tree = self.lock();
        tree.check_failure(&from)?;
        if !tree.exists(&from) {
            return Err(StatusError::no_such_file(&from));
        }
        if tree.exists(&to) {
            return Err(StatusError::new(
                StatusCode::Failure,
                format!("{} already exists", to),
            ));
        }
        tree.require_parent_dir(&to)?;

        if tree.is_dir(&from)
            && tree.nested_rename_unsupported
            && tree
                .children(&from)
                .any(|(_, stored)| matches!(stored.node, Node::Dir))
        {
            return Err(StatusError::new(
                StatusCode::OpUnsupported,
                format!("cannot rename {} with nested directories", from),
            ));
        }

        let moved: Vec<String> = tree
            .nodes
            .keys()
            .filter(|path| **path == from || is_below(path, &from))
            .cloned()
            .collect();
        for path in moved {
            if let Some(stored) = tree.nodes.remove(&path) {
                let target = format!("{}{}", to, &path[from.len()..]);
                tree.nodes.insert(target, stored);
            }
        }
        Ok(())
    }

    fn remove_file(&self, path: &str) -> Result<(), StatusError> {
        let path = normalize(path);
        let mut tree = self.lock();
        tree.check_failure(&path)?;
        match tree.nodes.get(&path).map(|s| matches!(s.node, Node::Dir)) {
            None => Err(StatusError::no_such_file(&path)),
            Some(true) => Err(StatusError::new(
                StatusCode::Failure,
                format!("{} is a directory", path),
            )),
            Some(false) => {
                tree.nodes.remove(&path);
                Ok(())
            }
        }
    }

    fn remove_dir(&self, path: &str) -> Result<(), StatusError> {
        let path = normalize(path);
        let mut tree = self.lock();
        tree.check_failure(&path)?;
        match tree.nodes.get(&path).map(|s| matches!(s.node, Node::Dir)) {
            None => Err(StatusError::no_such_file(&path)),
            Some(false) => Err(StatusError::new(
                StatusCode::Failure,
                format!("{} is not a directory", path),
            )),
            Some(true) if tree.children(&path).next().is_some() => Err(StatusError::new(
                StatusCode::Failure,
                format!("{} is not empty", path),
            )),
            Some(true) => {
                tree.nodes.remove(&path);
                Ok(())
            }
        }
    }

    fn write_file(&self, path: &str, data: &[u8]) -> Result<(), StatusError> {
        let path = normalize(path);
        let mut tree = self.lock();
        tree.check_failure(&path)?;
        if tree.is_dir(&path) {
            return Err(StatusError::new(
                StatusCode::Failure,
                format!("{} is a directory", path),
            ));
        }
        tree.require_parent_dir(&path)?;
        tree.insert(path, Node::File(data.to_vec()));
        Ok(())
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>, StatusError> {
        let path = normalize(path);
        let mut tree = self.lock();
        tree.check_failure(&path)?;
        match tree.nodes.get(&path) {
            None => Err(StatusError::no_such_file(&path)),
            Some(Stored {
                node: Node::File(data),
                ..
            }) => Ok(data.clone()),
            Some(_) => Err(StatusError::new(
                StatusCode::Failure,
                format!("{} is a directory", path),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_of() {
        assert_eq!(parent_of("/a"), Some("/".to_string()));
        assert_eq!(parent_of("/a/b"), Some("/a".to_string()));
        assert_eq!(parent_of("/"), None);
    }

    #[test]
    fn test_read_dir_reports_dot_entries() {
        let dir = MemoryDirectory::new();
        dir.add_file("/a/b.txt", b"x");
        let names: Vec<String> = dir.read_dir("/a").unwrap().into_iter().map(|e| e.name).collect();
        assert!(names.contains(&".".to_string()));
        assert!(names.contains(&"b.txt".to_string()));
        assert!(dir.read_dir("/missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_remove_dir_requires_empty() {
        let dir = MemoryDirectory::new();
        dir.add_file("/a/b.txt", b"x");
        assert_eq!(dir.remove_dir("/a").unwrap_err().code, StatusCode::Failure);
        dir.remove_file("/a/b.txt").unwrap();
        dir.remove_dir("/a").unwrap();
        assert!(!dir.contains("/a"));
    }

    #[test]
    fn test_nested_rename_quirk() {
        let dir = MemoryDirectory::with_nested_rename_unsupported();
        dir.add_file("/flat/a.txt", b"a");
        dir.add_file("/nested/sub/b.txt", b"b");

        dir.rename("/flat", "/flat2").unwrap();
        assert_eq!(dir.read("/flat2/a.txt").unwrap(), b"a");

        let err = dir.rename("/nested", "/nested2").unwrap_err();
        assert_eq!(err.code, StatusCode::OpUnsupported);
        assert!(dir.contains("/nested/sub/b.txt"));
    }

    #[test]
    fn test_fail_next_applies_once() {
        let dir = MemoryDirectory::new();
        dir.fail_next(StatusCode::ConnectionLost);
        assert_eq!(dir.read_dir("/").unwrap_err().code, StatusCode::ConnectionLost);
        assert!(dir.read_dir("/").is_ok());
    }
}
