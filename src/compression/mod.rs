// src/compression/mod.rs
//! Package archives
//!
//! Packs a directory tree into a gzip-compressed tarball and unpacks it again.
//! Entries are stored relative to the packed directory, so `unpack(pack(dir))`
//! reproduces the same relative file set and contents in a new location.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Archive-related errors
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Source is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Failed to pack {path}: {source}")]
    Pack { path: PathBuf, source: io::Error },

    #[error("Failed to unpack into {path}: {source}")]
    Unpack { path: PathBuf, source: io::Error },
}

impl From<ArchiveError> for crate::Error {
    fn from(err: ArchiveError) -> Self {
        crate::Error::ArchiveError(err.to_string())
    }
}

/// Pack every entry below `src_dir` into a `.tar.gz` stream written to `writer`
///
/// Returns the writer after the gzip trailer has been written.
pub fn pack<W: Write>(src_dir: &Path, writer: W) -> Result<W, ArchiveError> {
    if !src_dir.is_dir() {
        return Err(ArchiveError::NotADirectory(src_dir.to_path_buf()));
    }
    let pack_err = |source| ArchiveError::Pack {
        path: src_dir.to_path_buf(),
        source,
    };

    let encoder = GzEncoder::new(writer, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir_all(".", src_dir).map_err(pack_err)?;
    let encoder = builder.into_inner().map_err(pack_err)?;
    encoder.finish().map_err(pack_err)
}

/// Pack `src_dir` into the archive file at `archive`, replacing it if present
pub fn pack_to_file(src_dir: &Path, archive: &Path) -> Result<(), ArchiveError> {
    let file = File::create(archive).map_err(|source| ArchiveError::Pack {
        path: archive.to_path_buf(),
        source,
    })?;
    let mut writer = pack(src_dir, BufWriter::new(file))?;
    writer.flush().map_err(|source| ArchiveError::Pack {
        path: archive.to_path_buf(),
        source,
    })?;
    debug!("Packed {} -> {}", src_dir.display(), archive.display());
    Ok(())
}

/// Pack `src_dir` into an in-memory archive
pub fn pack_to_vec(src_dir: &Path) -> Result<Vec<u8>, ArchiveError> {
    pack(src_dir, Vec::new())
}

/// Unpack a `.tar.gz` stream into `dest_dir`, creating it if necessary
pub fn unpack<R: Read>(reader: R, dest_dir: &Path) -> Result<(), ArchiveError> {
    let unpack_err = |source| ArchiveError::Unpack {
        path: dest_dir.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(dest_dir).map_err(unpack_err)?;
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    archive.set_preserve_mtime(true);
    archive.unpack(dest_dir).map_err(unpack_err)
}

/// Unpack the archive file at `archive` into `dest_dir`
pub fn unpack_file(archive: &Path, dest_dir: &Path) -> Result<(), ArchiveError> {
    let file = File::open(archive).map_err(|source| ArchiveError::Unpack {
        path: archive.to_path_buf(),
        source,
    })?;
    unpack(BufReader::new(file), dest_dir)?;
    debug!("Unpacked {} -> {}", archive.display(), dest_dir.display());
    Ok(())
}
