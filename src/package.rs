// src/package.rs

//! Package naming and latest-package selection
//!
//! A package is identified by `(name, source language, target language, timestamp)`.
//! Locally it is an archive `{name}-{timestamp}.tar.gz` in the cache directory; on
//! the agency server it is a directory `{name}-{from}-{to}-{timestamp}`.
//!
//! "Latest" is the maximum by plain string order. That only matches chronological
//! order when timestamps are fixed-width and zero-padded, which is why generated
//! timestamps are always `YYYYMMDD`. Names supplied from elsewhere are not
//! rewritten; a warning is logged when a selection sees a non-conforming suffix.

use crate::error::{Error, Result};
use crate::remote::RemoteEntry;
use chrono::{Local, NaiveDate};
use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default source language of a package
pub const DEFAULT_LANGUAGE: &str = "en_US";

/// File extension of local package archives
pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

/// `strftime` format of package timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d";

/// `{base}-{YYYYMMDD}` for the given date
pub fn dated_name(base: &str, date: NaiveDate) -> String {
    format!("{}-{}", base, date.format(TIMESTAMP_FORMAT))
}

/// `{base}-{YYYYMMDD}` for today's local date
pub fn dated_name_today(base: &str) -> String {
    dated_name(base, Local::now().date_naive())
}

/// `{base}-{from}-{to}[-{timestamp}]`
pub fn canonical_name(base: &str, from: &str, to: &str, timestamp: Option<&str>) -> String {
    match timestamp {
        Some(ts) => format!("{}-{}-{}-{}", base, from, to, ts),
        None => format!("{}-{}-{}", base, from, to),
    }
}

/// File name of the archive for a dated package name
pub fn archive_file_name(dated: &str) -> String {
    format!("{}{}", dated, ARCHIVE_EXTENSION)
}

/// Timestamp suffix of an archive or package name (last `-` segment of the stem)
pub fn timestamp_of(name: &str) -> Option<&str> {
    let stem = name.strip_suffix(ARCHIVE_EXTENSION).unwrap_or(name);
    match stem.rsplit_once('-') {
        Some((_, ts)) if !ts.is_empty() => Some(ts),
        _ => None,
    }
}

/// True if `ts` sorts correctly as a string (eight ASCII digits)
pub fn is_sortable_timestamp(ts: &str) -> bool {
    ts.len() == 8 && ts.bytes().all(|b| b.is_ascii_digit())
}

/// Target language directory for a locale code (`fr_FR` -> `fr`)
pub fn language_dir(locale: &str) -> &str {
    locale.split('_').next().unwrap_or(locale)
}

/// Glob pattern matching every package derived from `base`
pub fn name_pattern(base: &str) -> String {
    format!("{}-*", Pattern::escape(base))
}

fn compile_pattern(base: &str) -> Result<Pattern> {
    let pattern = name_pattern(base);
    Pattern::new(&pattern).map_err(|e| Error::InvalidPattern {
        message: e.to_string(),
        pattern,
    })
}

/// Pick the string-maximal candidate, warning about unsortable suffixes
fn select_latest<'a>(candidates: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let mut latest: Option<&str> = None;
    for candidate in candidates {
        let stem = candidate.strip_suffix(ARCHIVE_EXTENSION).unwrap_or(candidate);
        if !timestamp_of(stem).is_some_and(is_sortable_timestamp) {
            warn!(
                "Package '{}' has no fixed-width timestamp; latest selection may be wrong",
                candidate
            );
        }
        if latest.is_none_or(|current| candidate > current) {
            latest = Some(candidate);
        }
    }
    latest
}

/// Latest local archive for `base` in the cache directory
pub fn latest_local(cache_dir: &Path, base: &str) -> Result<PathBuf> {
    let pattern = compile_pattern(base)?;
    let not_found = || {
        Error::PackageNotFound(format!(
            "no archive like '{}' in {}",
            name_pattern(base),
            cache_dir.display()
        ))
    };

    let read_dir = match std::fs::read_dir(cache_dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    for entry in read_dir {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str()
            && pattern.matches(name)
        {
            names.push(name.to_string());
        }
    }

    let latest = select_latest(names.iter().map(String::as_str)).ok_or_else(not_found)?;
    debug!("Latest local package for {}: {}", base, latest);
    Ok(cache_dir.join(latest))
}

/// Latest package for `base` in a prefetched stage listing
pub fn latest_remote(base: &str, entries: &[RemoteEntry]) -> Result<String> {
    let pattern = compile_pattern(base)?;
    select_latest(
        entries
            .iter()
            .map(|e| e.name.as_str())
            .filter(|name| pattern.matches(name)),
    )
    .map(str::to_string)
    .ok_or_else(|| Error::PackageNotFound(format!("no package like '{}'", name_pattern(base))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> RemoteEntry {
        RemoteEntry {
            name: name.to_string(),
            is_directory: true,
            modification_time: None,
        }
    }

    #[test]
    fn test_dated_name_is_zero_padded() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(dated_name("Acme", date), "Acme-20240102");
    }

    #[test]
    fn test_canonical_name() {
        assert_eq!(
            canonical_name("Acme", "en_US", "fr_FR", Some("20240101")),
            "Acme-en_US-fr_FR-20240101"
        );
        assert_eq!(canonical_name("Acme", "en_US", "fr_FR", None), "Acme-en_US-fr_FR");
    }

    #[test]
    fn test_timestamp_of() {
        assert_eq!(timestamp_of("Acme-20240101.tar.gz"), Some("20240101"));
        assert_eq!(timestamp_of("Acme-en_US-fr_FR-20240101"), Some("20240101"));
        assert_eq!(timestamp_of("Acme"), None);
        assert!(is_sortable_timestamp("20240101"));
        assert!(!is_sortable_timestamp("2024011"));
        assert!(!is_sortable_timestamp("2024-1-1"));
    }

    #[test]
    fn test_language_dir() {
        assert_eq!(language_dir("fr_FR"), "fr");
        assert_eq!(language_dir("de"), "de");
    }

    #[test]
    fn test_latest_remote_picks_max() {
        let entries = vec![
            entry("Acme-en_US-fr_FR-20240102"),
            entry("Other-en_US-fr_FR-20991231"),
            entry("Acme-en_US-fr_FR-20240101"),
        ];
        assert_eq!(
            latest_remote("Acme", &entries).unwrap(),
            "Acme-en_US-fr_FR-20240102"
        );
    }

    #[test]
    fn test_latest_remote_mixed_width_is_lexicographic() {
        // Unpadded suffixes compare as strings, so "9" beats "10".
        let entries = vec![entry("Acme-10"), entry("Acme-9")];
        assert_eq!(latest_remote("Acme", &entries).unwrap(), "Acme-9");
    }

    #[test]
    fn test_latest_remote_not_found() {
        let entries = vec![entry("Other-20240101")];
        let err = latest_remote("Acme", &entries).unwrap_err();
        assert!(matches!(err, Error::PackageNotFound(_)));
    }

    #[test]
    fn test_latest_remote_escapes_pattern_chars() {
        let entries = vec![entry("A[1]-20240101"), entry("A1-20240102")];
        assert_eq!(latest_remote("A[1]", &entries).unwrap(), "A[1]-20240101");
    }

    #[test]
    fn test_latest_local() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["Acme-20231231.tar.gz", "Acme-20240115.tar.gz", "Zeta-20250101.tar.gz"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("Acme-29991231")).unwrap();

        let latest = latest_local(dir.path(), "Acme").unwrap();
        assert_eq!(latest, dir.path().join("Acme-20240115.tar.gz"));
    }

    #[test]
    fn test_latest_local_empty_and_missing_cache() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            latest_local(dir.path(), "Acme"),
            Err(Error::PackageNotFound(_))
        ));
        assert!(matches!(
            latest_local(&dir.path().join("missing"), "Acme"),
            Err(Error::PackageNotFound(_))
        ));
    }
}
