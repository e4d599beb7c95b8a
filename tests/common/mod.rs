// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

use taxi::remote::MemoryDirectory;
use taxi::store::MemoryObjects;
use taxi::{PackageController, Settings, SilentProgress};
use tempfile::TempDir;

pub const BUCKET: &str = "content";

/// Controller over in-memory backends with a temporary cache.
///
/// Keep the TempDir alive to prevent cleanup.
pub struct Harness {
    pub controller: PackageController,
    pub server: MemoryDirectory,
    pub objects: MemoryObjects,
    pub cache: TempDir,
}

pub fn harness() -> Harness {
    harness_with_server(MemoryDirectory::new())
}

/// Harness whose SFTP server is supplied by the caller
pub fn harness_with_server(server: MemoryDirectory) -> Harness {
    let cache = tempfile::tempdir().unwrap();
    let mut settings = Settings {
        cache_dir: cache.path().to_path_buf(),
        ..Settings::default()
    };
    settings.s3.default_bucket = Some(BUCKET.to_string());

    let objects = MemoryObjects::new();
    let controller = PackageController::in_memory(
        settings,
        &server,
        &objects,
        Box::new(SilentProgress::new()),
    );
    Harness {
        controller,
        server,
        objects,
        cache,
    }
}

/// Place a translated package in the DEPLOY stage, as an agency would
pub fn deliver(server: &MemoryDirectory, package: &str, files: &[(&str, &[u8])]) {
    for (rel, data) in files {
        server.add_file(&format!("/share/3_deploy/{}/{}", package, rel), data);
    }
}
