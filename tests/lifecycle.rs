// tests/lifecycle.rs

//! End-to-end package lifecycle over in-memory S3 and SFTP backends.

mod common;

use common::{deliver, harness, harness_with_server, BUCKET};
use std::collections::BTreeMap;
use taxi::compression;
use taxi::package::{dated_name_today, timestamp_of};
use taxi::remote::MemoryDirectory;
use taxi::{Agency, Error, Stage};

fn files(entries: &[(&str, &[u8])]) -> BTreeMap<String, Vec<u8>> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_vec()))
        .collect()
}

#[test]
fn test_make_excludes_language_and_vcs_folders() {
    let h = harness();
    h.objects.insert(BUCKET, "site/a.html", b"a");
    h.objects.insert(BUCKET, "site/css/main.css", b"css");
    h.objects.insert(BUCKET, "site/fr/b.html", b"b");
    h.objects.insert(BUCKET, "site/.git/HEAD", b"ref");
    h.objects.insert(BUCKET, "other/c.html", b"c");

    let archive = h.controller.make("Acme", "site/", None).unwrap();
    assert_eq!(
        archive.file_name().unwrap().to_str().unwrap(),
        format!("{}.tar.gz", dated_name_today("Acme"))
    );
    assert!(archive.starts_with(h.cache.path()));

    let dest = tempfile::tempdir().unwrap();
    compression::unpack_file(&archive, dest.path()).unwrap();
    assert_eq!(std::fs::read(dest.path().join("a.html")).unwrap(), b"a");
    assert_eq!(std::fs::read(dest.path().join("css/main.css")).unwrap(), b"css");
    assert!(!dest.path().join("fr").exists());
    assert!(!dest.path().join(".git").exists());
    assert!(!dest.path().join("c.html").exists());
}

#[test]
fn test_make_empty_prefix_fails() {
    let h = harness();
    h.objects.insert(BUCKET, "other/c.html", b"c");
    let err = h.controller.make("Acme", "site", None).unwrap_err();
    assert!(matches!(err, Error::NoFilesDownloaded(_)));
}

#[test]
fn test_translate_uploads_latest_archive_to_open() {
    let mut h = harness();
    let older = tempfile::tempdir().unwrap();
    std::fs::write(older.path().join("a.html"), b"old").unwrap();
    compression::pack_to_file(older.path(), &h.cache.path().join("Acme-20240101.tar.gz"))
        .unwrap();
    let newer = tempfile::tempdir().unwrap();
    std::fs::create_dir(newer.path().join("img")).unwrap();
    std::fs::write(newer.path().join("a.html"), b"new").unwrap();
    std::fs::write(newer.path().join("img/logo.png"), b"png").unwrap();
    compression::pack_to_file(newer.path(), &h.cache.path().join("Acme-20240215.tar.gz"))
        .unwrap();

    let name = h
        .controller
        .translate("Acme", "en_US", "fr_FR", &Agency::named("ag1"))
        .unwrap();

    assert_eq!(name, "Acme-en_US-fr_FR-20240215");
    assert_eq!(
        h.server.files_under("/share/1_open/Acme-en_US-fr_FR-20240215"),
        files(&[("a.html", b"new"), ("img/logo.png", b"png")])
    );
    assert!(!h.server.contains("/share/1_open/Acme-en_US-fr_FR-20240101"));
}

#[test]
fn test_deploy_latest_package_wins() {
    let mut h = harness();
    h.objects.insert(BUCKET, "out/fr/stale.html", b"stale");
    h.objects.insert(BUCKET, "out/de/keep.html", b"de");
    deliver(
        &h.server,
        "Acme-en_US-fr_FR-20240101",
        &[("a.html", b"v1"), ("only-v1.html", b"v1")],
    );
    deliver(&h.server, "Acme-en_US-fr_FR-20240201", &[("a.html", b"v2")]);

    let report = h
        .controller
        .deploy("Acme", "out/", "en_US", "fr_FR", &Agency::named("ag1"), None)
        .unwrap();

    assert_eq!(report.bucket, BUCKET);
    assert_eq!(report.target, "out/fr");
    let names: Vec<&str> = report.packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Acme-en_US-fr_FR-20240101", "Acme-en_US-fr_FR-20240201"]
    );
    assert_eq!(report.packages[0].replaced, 1);
    assert_eq!(report.packages[1].replaced, 2);

    assert_eq!(h.objects.object(BUCKET, "out/fr/a.html").unwrap(), b"v2");
    assert!(h.objects.object(BUCKET, "out/fr/only-v1.html").is_none());
    assert!(h.objects.object(BUCKET, "out/fr/stale.html").is_none());
    assert_eq!(h.objects.object(BUCKET, "out/de/keep.html").unwrap(), b"de");

    assert!(h.server.files_under("/share/3_deploy").is_empty());
    assert_eq!(
        h.server.files_under("/share/4_done/Acme-en_US-fr_FR-20240101"),
        files(&[("a.html", b"v1"), ("only-v1.html", b"v1")])
    );
    assert!(h.server.is_dir("/share/4_done/Acme-en_US-fr_FR-20240201"));
}

#[test]
fn test_deploy_moves_nested_packages_when_rename_unsupported() {
    let mut h = harness_with_server(MemoryDirectory::with_nested_rename_unsupported());
    deliver(
        &h.server,
        "Acme-en_US-de_DE-20240301",
        &[("index.html", b"de"), ("docs/guide/intro.html", b"intro")],
    );

    h.controller
        .deploy("Acme", "", "en_US", "de_DE", &Agency::default(), Some("other"))
        .unwrap();

    assert_eq!(h.objects.object("other", "de/docs/guide/intro.html").unwrap(), b"intro");
    assert!(!h.server.contains("/share/3_deploy/Acme-en_US-de_DE-20240301"));
    assert_eq!(
        h.server.files_under("/share/4_done/Acme-en_US-de_DE-20240301"),
        files(&[("docs/guide/intro.html", b"intro"), ("index.html", b"de")])
    );
}

#[test]
fn test_full_round_trip() {
    let mut h = harness();
    h.objects.insert(BUCKET, "site/index.html", b"hello");
    h.objects.insert(BUCKET, "site/fr/index.html", b"old translation");
    let agency = Agency::named("ag1");

    h.controller.make("Acme", "site", None).unwrap();
    let submitted = h.controller.translate("Acme", "en_US", "fr_FR", &agency).unwrap();
    let today = dated_name_today("Acme");
    let timestamp = timestamp_of(&today).unwrap();
    assert_eq!(submitted, format!("Acme-en_US-fr_FR-{}", timestamp));

    let open = format!("/share/1_open/{}", submitted);
    assert_eq!(h.server.read(&format!("{}/index.html", open)).unwrap(), b"hello");

    // The agency translates and moves the package on
    deliver(&h.server, &submitted, &[("index.html", b"bonjour")]);
    let report = h
        .controller
        .status(&agency, Some(Stage::Deploy))
        .unwrap();
    assert_eq!(report[&Stage::Deploy][0].name, submitted);

    h.controller
        .deploy("Acme", "site", "en_US", "fr_FR", &agency, None)
        .unwrap();
    assert_eq!(h.objects.object(BUCKET, "site/fr/index.html").unwrap(), b"bonjour");
    assert_eq!(h.objects.object(BUCKET, "site/index.html").unwrap(), b"hello");

    let report = h.controller.status(&agency, None).unwrap();
    assert!(report[&Stage::Deploy].is_empty());
    assert_eq!(report[&Stage::Done][0].name, submitted);
}

#[test]
fn test_deploy_keeps_dotfiles() {
    let mut h = harness_with_server(MemoryDirectory::with_nested_rename_unsupported());
    deliver(
        &h.server,
        "Acme-en_US-fr_FR-20240101",
        &[
            ("index.html", b"bonjour"),
            (".htaccess", b"deny from all"),
            ("docs/a.html", b"a"),
        ],
    );

    let report = h
        .controller
        .deploy("Acme", "out", "en_US", "fr_FR", &Agency::named("ag1"), None)
        .unwrap();

    assert_eq!(report.packages[0].uploaded, 3);
    assert_eq!(
        h.objects.object(BUCKET, "out/fr/.htaccess").unwrap(),
        b"deny from all"
    );
    assert!(!h.server.contains("/share/3_deploy/Acme-en_US-fr_FR-20240101"));
    assert_eq!(
        h.server.files_under("/share/4_done/Acme-en_US-fr_FR-20240101"),
        files(&[
            (".htaccess", b"deny from all"),
            ("docs/a.html", b"a"),
            ("index.html", b"bonjour"),
        ])
    );
}
