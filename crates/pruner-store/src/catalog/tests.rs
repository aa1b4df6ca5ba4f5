use std::fs;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use filetime::FileTime;
use httptest::{matchers::*, responders::*, Expectation, Server};
use pruner_domain::{IndexFile, IndexItem};
use tempfile::TempDir;

use super::*;
use crate::CatalogErrorKind;

struct Fixture {
    _temp: TempDir,
    store: CatalogStore,
}

fn fixture(server: &Server) -> Result<Fixture> {
    let temp = tempfile::tempdir()?;
    let mut settings = StoreSettings::new(temp.path().join("cache"), server.url_str("/"));
    settings.http_timeout = Duration::from_secs(5);
    let store = CatalogStore::new(settings)?;
    Ok(Fixture { _temp: temp, store })
}

fn definition_body(name: &str, version: &str) -> String {
    format!(
        r#"{{"name":"{name}","version":"{version}","updated_at":"2025-01-01T00:00:00Z","uninstall":{{"appName":"{name}","bundleId":"com.foo.{name}","forgetPkg":false,"unloadLaunchDaemons":false}}}}"#
    )
}

fn item(id: &str, name: &str, version: &str, updated_at: &str, body: &str) -> IndexItem {
    IndexItem {
        id: id.to_string(),
        name: name.to_string(),
        version: version.to_string(),
        updated_at: updated_at.to_string(),
        path: format!("defs/{name}/{version}.json"),
        sha256: sha256_hex(body.as_bytes()),
    }
}

fn index_json(items: Vec<IndexItem>) -> String {
    serde_json::to_string(&IndexFile {
        schema_version: 1,
        generated_at: "2025-01-01T00:00:00Z".to_string(),
        items,
    })
    .expect("index serializes")
}

macro_rules! index_without_etag {
    () => {
        all_of![
            request::method_path("GET", "/index.json"),
            request::headers(not(contains(key("if-none-match")))),
        ]
    };
}

macro_rules! index_with_etag {
    ($etag:expr) => {
        all_of![
            request::method_path("GET", "/index.json"),
            request::headers(contains(("if-none-match", $etag))),
        ]
    };
}

fn backdate(path: &std::path::Path) -> Result<FileTime> {
    let stamp = FileTime::from_system_time(SystemTime::now() - Duration::from_secs(3600));
    filetime::set_file_mtime(path, stamp)?;
    Ok(stamp)
}

fn mtime(path: &std::path::Path) -> Result<FileTime> {
    Ok(FileTime::from_last_modification_time(&fs::metadata(path)?))
}

#[test]
fn second_sync_against_unchanged_catalog_writes_nothing() -> Result<()> {
    let server = Server::run();
    let body = definition_body("foo", "1");
    let index = index_json(vec![item(
        "com.foo.app",
        "foo",
        "1",
        "2025-01-01T00:00:00Z",
        &body,
    )]);
    server.expect(
        Expectation::matching(index_without_etag!())
            .respond_with(status_code(200).insert_header("ETag", "\"v1\"").body(index)),
    );
    server.expect(
        Expectation::matching(index_with_etag!("\"v1\"")).respond_with(status_code(304)),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", "/defs/foo/1.json"))
            .times(1)
            .respond_with(status_code(200).body(body.clone())),
    );
    let fx = fixture(&server)?;
    let layout = fx.store.layout().clone();

    let first = fx.store.sync_catalog(false)?;
    assert_eq!(first.refresh, Some(RefreshOutcome::Updated));
    assert_eq!(first.fetched, 1);
    assert_eq!(fs::read_to_string(layout.etag_path())?, "\"v1\"");

    let entry = layout.defs_dir().join("com.foo.app@1.json");
    let stamps = [
        backdate(&layout.index_path())?,
        backdate(&layout.etag_path())?,
        backdate(&entry)?,
    ];

    let second = fx.store.sync_catalog(false)?;
    assert_eq!(second.refresh, Some(RefreshOutcome::NotModified));
    assert_eq!((second.hit, second.fetched, second.failed), (1, 0, 0));
    assert!(second.pruned.is_empty());
    assert_eq!(mtime(&layout.index_path())?, stamps[0]);
    assert_eq!(mtime(&layout.etag_path())?, stamps[1]);
    assert_eq!(mtime(&entry)?, stamps[2]);
    assert!(!layout.lease_path().exists(), "lease released after sync");
    Ok(())
}

#[test]
fn success_with_identical_etag_keeps_local_index() -> Result<()> {
    let server = Server::run();
    server.expect(
        Expectation::matching(index_with_etag!("\"same\"")).respond_with(
            status_code(200)
                .insert_header("ETag", "\"same\"")
                .body(index_json(Vec::new())),
        ),
    );
    let fx = fixture(&server)?;
    let layout = fx.store.layout().clone();
    let original = index_json(vec![item("a", "a", "1", "2025-01-01T00:00:00Z", "x")]);
    atomic_write(&layout.index_path(), original.as_bytes())?;
    atomic_write(&layout.etag_path(), b"\"same\"")?;

    assert_eq!(fx.store.refresh(true)?, RefreshOutcome::Unchanged);
    assert_eq!(fs::read_to_string(layout.index_path())?, original);
    Ok(())
}

#[test]
fn orphaned_etag_is_dropped_and_index_fetched_unconditionally() -> Result<()> {
    let server = Server::run();
    server.expect(
        Expectation::matching(index_with_etag!("\"stale\""))
            .times(0)
            .respond_with(status_code(304)),
    );
    server.expect(
        Expectation::matching(index_without_etag!()).times(1).respond_with(
            status_code(200)
                .insert_header("ETag", "\"fresh\"")
                .body(index_json(Vec::new())),
        ),
    );
    let fx = fixture(&server)?;
    let layout = fx.store.layout().clone();
    atomic_write(&layout.etag_path(), b"\"stale\"")?;

    let summary = fx.store.sync_catalog(true)?;
    assert_eq!(summary.refresh, Some(RefreshOutcome::Updated));
    assert!(layout.index_path().is_file());
    assert_eq!(fs::read_to_string(layout.etag_path())?, "\"fresh\"");
    Ok(())
}

#[test]
fn unexpected_status_leaves_local_state_untouched() -> Result<()> {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/index.json"))
            .respond_with(status_code(503)),
    );
    let fx = fixture(&server)?;
    let layout = fx.store.layout().clone();
    let original = index_json(Vec::new());
    atomic_write(&layout.index_path(), original.as_bytes())?;

    assert_eq!(
        fx.store.refresh(false)?,
        RefreshOutcome::Skipped { status: 503 }
    );
    assert_eq!(fs::read_to_string(layout.index_path())?, original);
    assert!(!layout.etag_path().exists());
    Ok(())
}

#[test]
fn fresh_index_skips_network_unless_forced() -> Result<()> {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/index.json"))
            .times(1)
            .respond_with(status_code(304)),
    );
    let temp = tempfile::tempdir()?;
    let mut settings = StoreSettings::new(temp.path(), server.url_str("/"));
    settings.index_ttl = Duration::from_secs(3600);
    let store = CatalogStore::new(settings)?;
    atomic_write(&store.layout().index_path(), index_json(Vec::new()).as_bytes())?;

    assert_eq!(store.refresh(false)?, RefreshOutcome::Fresh);
    assert_eq!(store.refresh(true)?, RefreshOutcome::NotModified);
    Ok(())
}

#[test]
fn corrupt_cache_entry_is_replaced_by_verified_copy() -> Result<()> {
    let server = Server::run();
    let body = definition_body("foo", "1");
    server.expect(
        Expectation::matching(request::method_path("GET", "/defs/foo/1.json"))
            .respond_with(status_code(200).body(body.clone())),
    );
    let fx = fixture(&server)?;
    let entry = item("com.foo.app", "foo", "1", "2025-01-01T00:00:00Z", &body);
    let path = fx.store.layout().entry_path(&entry);
    atomic_write(&path, b"tampered")?;

    let cached = fx.store.ensure_definition(&entry)?;
    assert_eq!(cached.status, EntryStatus::Fetched);
    assert_eq!(fs::read_to_string(&cached.path)?, body);

    let again = fx.store.ensure_definition(&entry)?;
    assert_eq!(again.status, EntryStatus::Hit);
    Ok(())
}

#[test]
fn mismatched_download_is_rejected_and_not_persisted() -> Result<()> {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/defs/foo/1.json"))
            .respond_with(status_code(200).body("not what the index promised")),
    );
    let fx = fixture(&server)?;
    let entry = item(
        "com.foo.app",
        "foo",
        "1",
        "2025-01-01T00:00:00Z",
        &definition_body("foo", "1"),
    );

    let err = fx
        .store
        .ensure_definition(&entry)
        .expect_err("hash mismatch must fail");
    assert_eq!(err.kind(), CatalogErrorKind::Integrity);
    assert!(err.to_string().contains(&entry.sha256));
    assert!(!fx.store.layout().entry_path(&entry).exists());
    Ok(())
}

#[test]
fn sync_prunes_versions_dropped_from_index() -> Result<()> {
    let server = Server::run();
    let v1 = definition_body("foo", "1");
    let v2 = definition_body("foo", "2");
    server.expect(
        Expectation::matching(index_without_etag!()).respond_with(
            status_code(200).insert_header("ETag", "\"a\"").body(index_json(vec![item(
                "com.foo.app",
                "foo",
                "1",
                "2025-01-01T00:00:00Z",
                &v1,
            )])),
        ),
    );
    server.expect(
        Expectation::matching(index_with_etag!("\"a\"")).respond_with(
            status_code(200).insert_header("ETag", "\"b\"").body(index_json(vec![item(
                "com.foo.app",
                "foo",
                "2",
                "2025-02-01T00:00:00Z",
                &v2,
            )])),
        ),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", "/defs/foo/1.json"))
            .respond_with(status_code(200).body(v1)),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", "/defs/foo/2.json"))
            .respond_with(status_code(200).body(v2)),
    );
    let fx = fixture(&server)?;
    let defs = fx.store.layout().defs_dir();

    fx.store.sync_catalog(true)?;
    assert!(defs.join("com.foo.app@1.json").exists());

    let summary = fx.store.sync_catalog(true)?;
    assert_eq!(summary.refresh, Some(RefreshOutcome::Updated));
    assert!(defs.join("com.foo.app@2.json").exists());
    assert!(!defs.join("com.foo.app@1.json").exists());
    assert_eq!(summary.pruned, vec![defs.join("com.foo.app@1.json")]);
    Ok(())
}

#[test]
fn sync_continues_past_failed_items() -> Result<()> {
    let server = Server::run();
    let good = definition_body("good", "1");
    let index = index_json(vec![
        item("com.foo.bad", "bad", "1", "2025-01-01T00:00:00Z", "missing"),
        item("com.foo.good", "good", "1", "2025-01-01T00:00:00Z", &good),
    ]);
    server.expect(
        Expectation::matching(request::method_path("GET", "/index.json"))
            .respond_with(status_code(200).body(index)),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", "/defs/bad/1.json"))
            .respond_with(status_code(404)),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", "/defs/good/1.json"))
            .respond_with(status_code(200).body(good)),
    );
    let fx = fixture(&server)?;

    let summary = fx.store.sync_catalog(false)?;
    assert_eq!((summary.fetched, summary.failed), (1, 1));
    assert!(summary.errors[0].contains("404"));
    assert!(!fx.store.layout().etag_path().exists());
    Ok(())
}

#[test]
fn sync_aborts_without_changes_when_lease_is_held() -> Result<()> {
    let server = Server::run();
    let fx = fixture(&server)?;
    let _held = fx.store.lease().acquire()?;

    let err = fx.store.sync_catalog(true).expect_err("contention");
    assert_eq!(err.kind(), CatalogErrorKind::LockContention);
    assert!(!fx.store.layout().index_path().exists());
    Ok(())
}

#[test]
fn failed_sync_still_releases_the_lease() -> Result<()> {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/index.json"))
            .respond_with(status_code(503)),
    );
    let fx = fixture(&server)?;

    let err = fx.store.sync_catalog(true).expect_err("no index to sync from");
    assert_eq!(err.kind(), CatalogErrorKind::Io);
    assert!(!fx.store.layout().lease_path().exists());
    let _again = fx.store.lease().acquire()?;
    Ok(())
}

#[test]
fn load_definition_selects_by_version_from_verified_cache() -> Result<()> {
    let server = Server::run();
    let fx = fixture(&server)?;
    let layout = fx.store.layout().clone();
    let v1 = definition_body("foo", "v1");
    let v2 = definition_body("foo", "v2");
    let items = vec![
        item("com.foo.app", "foo", "v1", "2025-01-01T00:00:00Z", &v1),
        item("com.foo.app", "foo", "v2", "2025-02-01T00:00:00Z", &v2),
    ];
    for (entry, body) in items.iter().zip([&v1, &v2]) {
        atomic_write(&layout.entry_path(entry), body.as_bytes())?;
    }
    atomic_write(&layout.index_path(), index_json(items).as_bytes())?;

    assert_eq!(fx.store.load_definition("foo", None)?, v2.as_bytes());
    assert_eq!(fx.store.load_definition("foo", Some("v1"))?, v1.as_bytes());

    let err = fx
        .store
        .load_definition("bar", None)
        .expect_err("unknown name");
    assert_eq!(err.kind(), CatalogErrorKind::NotFound);
    Ok(())
}
