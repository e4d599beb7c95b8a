// src/store/filter.rs

//! Exclusion rules for prefix downloads
//!
//! Keys are matched by their path relative to the download prefix, one path
//! segment at a time. Version-control folders are dropped wherever they
//! appear; temporary folders, trash folders and language subfolders are only
//! dropped as the first segment. Only folder segments are tested, so a file
//! named `fr` at the top level is kept while everything below `fr/` is not.

use crate::error::{Error, Result};
use glob::Pattern;

/// Folder names excluded at any depth
pub const VCS_DIRS: &[&str] = &[".git", ".svn", ".hg"];

/// Folder patterns excluded at the top level
pub const SCRATCH_DIRS: &[&str] = &["tmp", ".tmp", ".Trash*", "trash"];

fn compile(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern).map_err(|e| Error::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

/// Set of folder patterns a download skips
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    anywhere: Vec<Pattern>,
    top_level: Vec<Pattern>,
}

impl ExclusionFilter {
    /// Filter that keeps every key
    pub fn none() -> Self {
        Self::default()
    }

    /// Default rules plus the given language subfolder patterns
    pub fn with_languages<S: AsRef<str>>(language_dirs: &[S]) -> Result<Self> {
        let mut filter = Self::none();
        for dir in VCS_DIRS {
            filter = filter.exclude_anywhere(dir)?;
        }
        for dir in SCRATCH_DIRS {
            filter = filter.exclude_top_level(dir)?;
        }
        for pattern in language_dirs {
            filter = filter.exclude_top_level(pattern.as_ref())?;
        }
        Ok(filter)
    }

    /// Exclude folders matching `pattern` at any depth
    pub fn exclude_anywhere(mut self, pattern: &str) -> Result<Self> {
        self.anywhere.push(compile(pattern)?);
        Ok(self)
    }

    /// Exclude folders matching `pattern` directly below the prefix
    pub fn exclude_top_level(mut self, pattern: &str) -> Result<Self> {
        self.top_level.push(compile(pattern)?);
        Ok(self)
    }

    /// True if the key at relative path `rel` must be skipped
    pub fn is_excluded(&self, rel: &str) -> bool {
        let segments: Vec<&str> = rel.split('/').filter(|s| !s.is_empty()).collect();
        let folder_count = if rel.ends_with('/') {
            segments.len()
        } else {
            segments.len().saturating_sub(1)
        };
        let folders = &segments[..folder_count];

        if let Some(first) = folders.first()
            && self.top_level.iter().any(|p| p.matches(first))
        {
            return true;
        }
        folders
            .iter()
            .any(|segment| self.anywhere.iter().any(|p| p.matches(segment)))
    }
}

/// Path of `key` relative to `prefix`, without a leading separator
pub fn relative_key<'a>(key: &'a str, prefix: &str) -> &'a str {
    key.strip_prefix(prefix)
        .unwrap_or(key)
        .trim_start_matches('/')
}
