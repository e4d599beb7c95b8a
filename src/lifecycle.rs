// src/lifecycle.rs

//! Package lifecycle controller
//!
//! Drives a package through its stages:
//! - `make`: bucket prefix -> filtered download -> dated archive in the cache
//! - `translate`: latest cached archive -> agency OPEN stage
//! - `deploy`: agency DEPLOY stage -> bucket language folder, then DONE
//!
//! The controller owns the per-agency session registry and builds a fresh
//! object store client for every operation. The move from OPEN to DEPLOY is
//! done by the agency's own translation process.

use crate::compression;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::package::{
    archive_file_name, canonical_name, dated_name_today, language_dir, latest_local,
    name_pattern, timestamp_of,
};
use crate::progress::ProgressTracker;
use crate::remote::registry::Connector;
use crate::remote::{
    sftp, Agency, DirectoryBackend, MemoryDirectory, RemoteEntry, Removal, SessionRegistry,
};
use crate::stage::{Stage, StageRegistry};
use crate::store::s3::S3Backend;
use crate::store::{
    ExclusionFilter, MemoryObjects, ObjectBackend, ObjectConnector, ObjectInfo, ObjectStore,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// One package moved to the bucket by `deploy`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployedPackage {
    /// Package directory name on the agency server
    pub name: String,
    /// Objects uploaded from the package
    pub uploaded: usize,
    /// Objects removed from the target folder before the upload
    pub replaced: usize,
}

/// Outcome of `deploy`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployReport {
    pub bucket: String,
    /// Key prefix the packages were deployed to (`path/lang`)
    pub target: String,
    /// Deployed packages in the order they were applied
    pub packages: Vec<DeployedPackage>,
}

/// Stage listings keyed by stage, in pipeline order
pub type StatusReport = BTreeMap<Stage, Vec<RemoteEntry>>;

/// Coordinates archives, the object store and agency sessions
pub struct PackageController {
    settings: Settings,
    sessions: SessionRegistry,
    objects: Box<dyn ObjectConnector>,
    progress: Box<dyn ProgressTracker>,
}

impl PackageController {
    pub fn new(
        settings: Settings,
        connector: Box<dyn Connector>,
        objects: Box<dyn ObjectConnector>,
        progress: Box<dyn ProgressTracker>,
    ) -> Self {
        let stages = StageRegistry::new(settings.stage_root.clone());
        Self {
            sessions: SessionRegistry::new(connector, stages),
            settings,
            objects,
            progress,
        }
    }

    /// Controller talking to the configured SFTP host and S3
    pub fn live(settings: Settings, progress: Box<dyn ProgressTracker>) -> Self {
        let sftp_settings = settings.clone();
        let connector = move |agency: &Agency| sftp::connect_agency(&sftp_settings, agency);
        let s3_settings = settings.s3.clone();
        let objects = move || -> Result<Box<dyn ObjectBackend>> {
            Ok(Box::new(S3Backend::connect(&s3_settings)?))
        };
        Self::new(settings, Box::new(connector), Box::new(objects), progress)
    }

    /// Controller over in-memory backends; every agency shares `server`
    pub fn in_memory(
        settings: Settings,
        server: &MemoryDirectory,
        objects: &MemoryObjects,
        progress: Box<dyn ProgressTracker>,
    ) -> Self {
        let server = server.clone();
        let connector = move |_: &Agency| -> Result<Box<dyn DirectoryBackend>> {
            Ok(Box::new(server.clone()))
        };
        let objects = objects.clone();
        let connect_objects = move || -> Result<Box<dyn ObjectBackend>> {
            Ok(Box::new(objects.clone()))
        };
        Self::new(settings, Box::new(connector), Box::new(connect_objects), progress)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn object_store(&self) -> Result<ObjectStore> {
        Ok(ObjectStore::new(self.objects.connect()?))
    }

    /// Package the content below `source_path` of a bucket
    ///
    /// Version control, scratch and language folders are left out. Returns the
    /// path of the new archive in the cache.
    pub fn make(&self, name: &str, source_path: &str, bucket: Option<&str>) -> Result<PathBuf> {
        let bucket = self.settings.resolve_bucket(bucket)?;
        let filter = ExclusionFilter::with_languages(&self.settings.language_dirs)?;
        let rel = source_path.trim_matches('/');
        let prefix = if rel.is_empty() {
            String::new()
        } else {
            format!("{}/", rel)
        };
        let package = dated_name_today(name);
        info!("Creating package {} from s3://{}/{}", package, bucket, prefix);

        let scratch = tempfile::tempdir()?;
        self.object_store()?.download_prefix(
            &bucket,
            &prefix,
            scratch.path(),
            &filter,
            self.progress.as_ref(),
        )?;

        std::fs::create_dir_all(&self.settings.cache_dir)?;
        let archive = self.settings.cache_dir.join(archive_file_name(&package));
        compression::pack_to_file(&scratch.path().join(rel), &archive)?;
        info!("Package created: {}", archive.display());
        Ok(archive)
    }

    /// Submit the latest cached package for `name` to an agency
    ///
    /// Any earlier submission with the same canonical name is replaced.
    /// Returns the package directory name in the OPEN stage.
    pub fn translate(
        &mut self,
        name: &str,
        from: &str,
        to: &str,
        agency: &Agency,
    ) -> Result<String> {
        let archive = latest_local(&self.settings.cache_dir, name)?;
        let file_name = archive
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::IoError(format!("bad archive name {}", archive.display())))?;
        let remote_name = canonical_name(name, from, to, timestamp_of(file_name));
        info!("Translate {} -> {} for {}", file_name, remote_name, agency);

        let scratch = tempfile::tempdir()?;
        compression::unpack_file(&archive, scratch.path())?;

        let session = self.sessions.session(agency)?;
        let target = session.stages().entry_path(Stage::Open, &remote_name);
        session.remove_recursive(&target, true)?;
        session.upload_tree(scratch.path(), &remote_name, Stage::Open, self.progress.as_ref())?;
        Ok(remote_name)
    }

    /// Deploy every translated package for `name` to `path/<lang>` in a bucket
    ///
    /// Only folders count as packages. They are applied in ascending name order,
    /// each replacing the target folder, so the latest one wins. All of them are
    /// archived to DONE once the uploads have finished, replacing any earlier
    /// archived copy of the same package.
    pub fn deploy(
        &mut self,
        name: &str,
        path: &str,
        from: &str,
        to: &str,
        agency: &Agency,
        bucket: Option<&str>,
    ) -> Result<DeployReport> {
        let bucket = self.settings.resolve_bucket(bucket)?;
        let lang = language_dir(to);
        let base = path.trim_matches('/');
        let target = if base.is_empty() {
            lang.to_string()
        } else {
            format!("{}/{}", base, lang)
        };
        debug!("Deploy {} ({} -> {}) to s3://{}/{}", name, from, to, bucket, target);

        let deploy_cache = self.settings.deploy_cache();
        let session = self.sessions.session(agency)?;
        let deploy_root = session.stages().path_for(Stage::Deploy);
        let packages: Vec<RemoteEntry> = session
            .glob(&deploy_root, &name_pattern(name))?
            .into_iter()
            .filter(|entry| {
                if !entry.is_directory {
                    warn!("Ignoring {}/{}: not a package folder", deploy_root, entry.name);
                }
                entry.is_directory
            })
            .collect();
        if packages.is_empty() {
            return Err(Error::PackageNotFound(format!(
                "no folder like '{}' in {}",
                name_pattern(name),
                deploy_root
            )));
        }

        // A redeployed package supersedes its archived copy.
        for package in &packages {
            let done = session.stages().entry_path(Stage::Done, &package.name);
            if let Removal::Removed { entries } = session.remove_recursive(&done, true)? {
                warn!("Replacing archived {} ({} entries)", done, entries);
            }
        }

        let store = ObjectStore::new(self.objects.connect()?);
        let mut report = DeployReport {
            bucket: bucket.clone(),
            target: target.clone(),
            packages: Vec::new(),
        };
        for package in &packages {
            info!("Deploying {}", package.name);
            let local = deploy_cache.join(&package.name);
            session.download_tree(
                &session.stages().entry_path(Stage::Deploy, &package.name),
                &local,
                self.progress.as_ref(),
            )?;

            let replaced = store.delete_prefix(&bucket, &format!("{}/", target))?;
            let uploaded = store.upload_tree(&bucket, &local, Some(&target), self.progress.as_ref())?;
            report.packages.push(DeployedPackage {
                name: package.name.clone(),
                uploaded,
                replaced,
            });
        }

        for package in &packages {
            session.move_path(
                &session.stages().entry_path(Stage::Deploy, &package.name),
                &session.stages().entry_path(Stage::Done, &package.name),
            )?;
        }
        info!("Deployed {} packages to s3://{}/{}", packages.len(), bucket, target);
        Ok(report)
    }

    /// Listings of one stage, or of all stages
    pub fn status(&mut self, agency: &Agency, stage: Option<Stage>) -> Result<StatusReport> {
        let session = self.sessions.session(agency)?;
        let stages: Vec<Stage> = match stage {
            Some(stage) => vec![stage],
            None => StageRegistry::all().collect(),
        };
        let mut report = StatusReport::new();
        for stage in stages {
            report.insert(stage, session.list_stage(stage)?);
        }
        Ok(report)
    }

    /// Objects under `prefix` in a bucket (the default bucket when `None`)
    pub fn bucket_listing(
        &self,
        bucket: Option<&str>,
        prefix: Option<&str>,
    ) -> Result<(String, Vec<ObjectInfo>)> {
        let bucket = self.settings.resolve_bucket(bucket)?;
        let objects = self.object_store()?.objects(&bucket, prefix)?;
        Ok((bucket, objects))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentProgress;

    struct Fixture {
        controller: PackageController,
        server: MemoryDirectory,
        objects: MemoryObjects,
        _cache: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let cache = tempfile::tempdir().unwrap();
        let settings = Settings {
            cache_dir: cache.path().to_path_buf(),
            ..Settings::default()
        };
        let server = MemoryDirectory::new();
        let objects = MemoryObjects::new();
        let controller = PackageController::in_memory(
            settings,
            &server,
            &objects,
            Box::new(SilentProgress::new()),
        );
        Fixture {
            controller,
            server,
            objects,
            _cache: cache,
        }
    }

    #[test]
    fn test_live_controller_connects_lazily() {
        let mut settings = Settings::default();
        settings.s3.default_bucket = Some("content".to_string());
        let controller = PackageController::live(settings, Box::new(SilentProgress::new()));
        assert_eq!(controller.settings().s3.default_bucket.as_deref(), Some("content"));
        assert!(controller.settings().sftp.host.is_none());
    }

    #[test]
    fn test_make_without_bucket_is_config_error() {
        let fx = fixture();
        let err = fx.controller.make("Acme", "site/", None).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_make_uses_default_bucket() {
        let mut fx = fixture();
        fx.controller.settings.s3.default_bucket = Some("content".to_string());
        fx.objects.insert("content", "site/index.html", b"i");

        let archive = fx.controller.make("Acme", "/site", None).unwrap();
        let dest = tempfile::tempdir().unwrap();
        compression::unpack_file(&archive, dest.path()).unwrap();
        assert_eq!(std::fs::read(dest.path().join("index.html")).unwrap(), b"i");
    }

    #[test]
    fn test_translate_without_archive_is_package_not_found() {
        let mut fx = fixture();
        let err = fx
            .controller
            .translate("Acme", "en_US", "fr_FR", &Agency::named("ag1"))
            .unwrap_err();
        assert!(matches!(err, Error::PackageNotFound(_)));
        assert!(fx.server.files_under("/share/1_open").is_empty());
    }

    #[test]
    fn test_translate_replaces_previous_submission() {
        let mut fx = fixture();
        let cache = fx.controller.settings().cache_dir.clone();
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("a.html"), b"new").unwrap();
        compression::pack_to_file(src.path(), &cache.join("Acme-20240101.tar.gz")).unwrap();
        fx.server
            .add_file("/share/1_open/Acme-en_US-fr_FR-20240101/stale.html", b"old");

        let name = fx
            .controller
            .translate("Acme", "en_US", "fr_FR", &Agency::named("ag1"))
            .unwrap();
        assert_eq!(name, "Acme-en_US-fr_FR-20240101");
        assert_eq!(
            fx.server.files_under("/share/1_open/Acme-en_US-fr_FR-20240101"),
            BTreeMap::from([("a.html".to_string(), b"new".to_vec())])
        );
    }

    #[test]
    fn test_deploy_without_packages_fails_and_moves_nothing() {
        let mut fx = fixture();
        fx.server.add_dir("/share/3_deploy/Other-en_US-fr_FR-20240101");
        let err = fx
            .controller
            .deploy("Acme", "out", "en_US", "fr_FR", &Agency::named("ag1"), Some("b"))
            .unwrap_err();
        assert!(matches!(err, Error::PackageNotFound(_)));
        assert!(fx.server.is_dir("/share/3_deploy/Other-en_US-fr_FR-20240101"));
    }

    #[test]
    fn test_deploy_skips_plain_files_matching_the_name() {
        let mut fx = fixture();
        fx.server.add_file("/share/3_deploy/Acme-notes.txt", b"notes");
        fx.server
            .add_file("/share/3_deploy/Acme-en_US-fr_FR-20240101/index.html", b"bonjour");

        let report = fx
            .controller
            .deploy("Acme", "out", "en_US", "fr_FR", &Agency::named("ag1"), Some("b"))
            .unwrap();
        assert_eq!(report.packages.len(), 1);
        assert_eq!(report.packages[0].name, "Acme-en_US-fr_FR-20240101");
        assert_eq!(fx.objects.object("b", "out/fr/index.html").unwrap(), b"bonjour");
        assert_eq!(fx.server.read("/share/3_deploy/Acme-notes.txt").unwrap(), b"notes");

        fx.server.add_file("/share/3_deploy/Acme-readme.txt", b"r");
        let err = fx
            .controller
            .deploy("Acme", "out", "en_US", "fr_FR", &Agency::named("ag1"), Some("b"))
            .unwrap_err();
        assert!(matches!(err, Error::PackageNotFound(_)));
    }

    #[test]
    fn test_redeploy_replaces_archived_package() {
        let mut fx = fixture();
        fx.server
            .add_file("/share/4_done/Acme-en_US-fr_FR-20240101/index.html", b"first");
        fx.server
            .add_file("/share/4_done/Acme-en_US-fr_FR-20240101/old.html", b"old");
        fx.server
            .add_file("/share/3_deploy/Acme-en_US-fr_FR-20240101/index.html", b"second");

        fx.controller
            .deploy("Acme", "out", "en_US", "fr_FR", &Agency::named("ag1"), Some("b"))
            .unwrap();

        assert_eq!(fx.objects.object("b", "out/fr/index.html").unwrap(), b"second");
        assert!(!fx.server.contains("/share/3_deploy/Acme-en_US-fr_FR-20240101"));
        assert_eq!(
            fx.server.files_under("/share/4_done/Acme-en_US-fr_FR-20240101"),
            BTreeMap::from([("index.html".to_string(), b"second".to_vec())])
        );
    }

    #[test]
    fn test_status_lists_requested_stages() {
        let mut fx = fixture();
        fx.server.add_dir("/share/1_open/Acme-en_US-fr_FR-20240101");
        fx.server.add_dir("/share/4_done/Acme-en_US-de_DE-20231201");

        let report = fx.controller.status(&Agency::default(), None).unwrap();
        assert_eq!(
            report.keys().copied().collect::<Vec<_>>(),
            vec![Stage::Open, Stage::Deploy, Stage::Done]
        );
        assert_eq!(report[&Stage::Open][0].name, "Acme-en_US-fr_FR-20240101");
        assert!(report[&Stage::Deploy].is_empty());

        let report = fx.controller.status(&Agency::default(), Some(Stage::Done)).unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[&Stage::Done].len(), 1);
    }

    #[test]
    fn test_bucket_listing() {
        let fx = fixture();
        fx.objects.insert("b", "site/a.html", b"a");
        fx.objects.insert("b", "other/b.html", b"b");
        let (bucket, objects) = fx.controller.bucket_listing(Some("b"), Some("site/")).unwrap();
        assert_eq!(bucket, "b");
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].size, 1);
    }
}
