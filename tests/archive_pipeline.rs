//! End-to-end archival tests
//!
//! Runs the whole pipeline (catalog lookup, download, fallback, store, ledger,
//! events) against a wiremock server and a throwaway SQLite database.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use archiver::catalog::{Catalog, CatalogError, JsonCatalog};
use archiver::http_client::{HttpClient, HttpSettings};
use archiver::models::{ArchivalStatus, Dataset, Resource};
use archiver::repository::DbContext;
use archiver::services::{
    ArchiveEvent, ArchiveListener, ArchiveService, BlacklistTracker, Downloader,
    BLACKLIST_THRESHOLD,
};
use archiver::storage::ContentStore;
use archiver::work_queue::{
    ArchiveJob, DispatchError, JobDispatcher, JobOutput, LocalDispatcher, PRIORITY_QUEUE,
};

const CACHE_ROOT: &str = "http://cache.example.com/";

/// Catalog wrapper that counts search index refreshes.
struct CountingCatalog {
    inner: JsonCatalog,
    reindexed: AtomicUsize,
}

#[async_trait]
impl Catalog for CountingCatalog {
    async fn get_resource(&self, resource_id: &str) -> Result<Resource, CatalogError> {
        self.inner.get_resource(resource_id).await
    }

    async fn get_dataset(&self, dataset_id: &str) -> Result<Dataset, CatalogError> {
        self.inner.get_dataset(dataset_id).await
    }

    async fn update_search_index(&self, _dataset_id: &str) -> Result<(), CatalogError> {
        self.reindexed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Listener that keeps every event it sees.
#[derive(Default)]
struct RecordingListener {
    events: Mutex<Vec<ArchiveEvent>>,
    reindexes: bool,
}

#[async_trait]
impl ArchiveListener for RecordingListener {
    async fn notify(&self, event: &ArchiveEvent) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn reindexes_datasets(&self) -> bool {
        self.reindexes
    }
}

struct Harness {
    _dir: TempDir,
    ctx: DbContext,
    catalog: Arc<CountingCatalog>,
    service: ArchiveService,
}

fn resource(id: &str, url: &str) -> Resource {
    Resource {
        id: id.to_string(),
        url: url.to_string(),
        format: None,
        dataset_id: String::new(),
    }
}

fn dataset(id: &str, name: &str, resources: Vec<Resource>) -> Dataset {
    Dataset {
        id: id.to_string(),
        name: name.to_string(),
        resources,
    }
}

async fn harness(datasets: Vec<Dataset>, max_content_length: u64) -> Harness {
    harness_with(datasets, max_content_length, |s| s).await
}

async fn harness_with(
    datasets: Vec<Dataset>,
    max_content_length: u64,
    configure: impl FnOnce(ArchiveService) -> ArchiveService,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let ctx = DbContext::new(&dir.path().join("archiver.db"));
    ctx.init_schema().await.unwrap();

    let archive_dir = dir.path().join("archive");
    let http = HttpClient::new(&HttpSettings::default()).unwrap();
    let downloader = Downloader::new(http, max_content_length)
        .with_blacklist(BlacklistTracker::new(ctx.blacklist()))
        .with_temp_dir(dir.path());
    let store = ContentStore::new(archive_dir, Some(CACHE_ROOT.to_string()));

    let catalog = Arc::new(CountingCatalog {
        inner: JsonCatalog::from_datasets(datasets),
        reindexed: AtomicUsize::new(0),
    });
    let service = configure(ArchiveService::new(
        catalog.clone(),
        ctx.archivals(),
        downloader,
        store,
    ));

    Harness {
        _dir: dir,
        ctx,
        catalog,
        service,
    }
}

/// Failures charged to the single tracked prefix.
async fn failure_count(tracker: &BlacklistTracker) -> u32 {
    tracker.entries().await.unwrap()[0].failure_count
}

async fn mount_body(server: &MockServer, at: &str, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(template)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_archives_and_records_content() {
    let server = MockServer::start().await;
    mount_body(
        &server,
        "/files/data.csv",
        ResponseTemplate::new(200)
            .set_body_raw("test", "text/csv"),
    )
    .await;

    let url = format!("{}/files/data.csv", server.uri());
    let h = harness(
        vec![dataset("ds1", "rivers", vec![resource("abcd1234", &url)])],
        1000,
    )
    .await;

    let outcome = h.service.archive_resource("abcd1234", "bulk").await.unwrap();
    let record = outcome.archival;
    assert_eq!(record.status, ArchivalStatus::Archived);
    assert_eq!(record.status.id(), 0);
    assert_eq!(record.size, Some(4));
    assert_eq!(
        record.content_hash.as_deref(),
        Some("a94a8fe5ccb19ba61c4c0873d391e987982fbbd3")
    );
    assert_eq!(record.mime_type.as_deref(), Some("text/csv"));
    assert_eq!(record.request_type.as_deref(), Some("GET"));
    assert_eq!(record.dataset_id, "ds1");
    assert_eq!(record.is_broken(), Some(false));
    assert_eq!(
        record.content_address.as_deref(),
        Some("http://cache.example.com/ab/abcd1234/data.csv")
    );

    let content_path = record.content_path.clone().unwrap();
    assert!(content_path.ends_with("ab/abcd1234/data.csv"));
    assert_eq!(std::fs::read_to_string(&content_path).unwrap(), "test");

    // A second run overwrites the same file and address.
    let again = h.service.archive_resource("abcd1234", "bulk").await.unwrap();
    assert_eq!(again.status(), ArchivalStatus::Archived);
    assert_eq!(again.archival.content_address, record.content_address);
    assert_eq!(again.archival.content_path, record.content_path);
    assert_eq!(again.archival.created_at, record.created_at);
}

#[tokio::test]
async fn test_empty_body_is_download_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let url = format!("{}/empty.csv", server.uri());
    let h = harness(vec![dataset("ds1", "", vec![resource("r1", &url)])], 1000).await;

    let outcome = h.service.archive_resource("r1", "bulk").await.unwrap();
    assert_eq!(outcome.status(), ArchivalStatus::DownloadError);
    assert_eq!(outcome.reason(), Some("Content-length after streaming was 0"));
    assert_eq!(outcome.archival.content_address, None);
    assert_eq!(outcome.archival.is_broken(), Some(true));
}

#[tokio::test]
async fn test_invalid_scheme_is_recorded() {
    let h = harness(
        vec![dataset("ds1", "", vec![resource("r1", "file:///etc/passwd")])],
        1000,
    )
    .await;

    let outcome = h.service.archive_resource("r1", "bulk").await.unwrap();
    assert_eq!(outcome.status(), ArchivalStatus::UrlInvalid);
    assert_eq!(outcome.status().id(), 10);
    assert!(outcome.reason().unwrap().contains("scheme"));
}

#[tokio::test]
async fn test_oversize_declared_length_is_not_downloaded() {
    let server = MockServer::start().await;
    mount_body(
        &server,
        "/big.bin",
        ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 600]),
    )
    .await;

    let url = format!("{}/big.bin", server.uri());
    let h = harness(vec![dataset("ds1", "", vec![resource("r1", &url)])], 500).await;

    let outcome = h.service.archive_resource("r1", "bulk").await.unwrap();
    assert_eq!(outcome.status(), ArchivalStatus::ChoseNotToDownload);
    assert_eq!(outcome.status().id(), 21);
    assert_eq!(outcome.archival.is_broken(), None);
    assert_eq!(
        outcome.reason(),
        Some("Content-length 600 exceeds maximum allowed value 500")
    );
}

#[tokio::test]
async fn test_matching_etag_records_unchanged_content() {
    let server = MockServer::start().await;
    mount_body(
        &server,
        "/data.json",
        ResponseTemplate::new(200)
            .insert_header("etag", "\"v1\"")
            .set_body_string("{\"a\": 1}"),
    )
    .await;

    let url = format!("{}/data.json", server.uri());
    let h = harness(vec![dataset("ds1", "", vec![resource("r1", &url)])], 1000).await;

    let first = h.service.archive_resource("r1", "bulk").await.unwrap();
    assert_eq!(first.status(), ArchivalStatus::Archived);
    assert_eq!(first.archival.etag.as_deref(), Some("\"v1\""));

    let second = h.service.archive_resource("r1", "bulk").await.unwrap();
    assert_eq!(second.status(), ArchivalStatus::ContentUnchanged);
    assert_eq!(second.status().id(), 1);
    assert_eq!(second.archival.consecutive_failures, 0);
    // The previous copy is still the current one.
    assert_eq!(
        second.archival.content_address,
        first.archival.content_address
    );
}

#[tokio::test]
async fn test_wms_fallback_after_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/geo/wms"))
        .and(query_param("version", "1.1.1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<WMT_MS_Capabilities/>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let url = format!("{}/geo/wms?layers=rivers", server.uri());
    let h = harness(vec![dataset("ds1", "", vec![resource("r1", &url)])], 1000).await;

    let outcome = h.service.archive_resource("r1", "bulk").await.unwrap();
    assert_eq!(outcome.status(), ArchivalStatus::Archived);
    assert_eq!(outcome.archival.request_type.as_deref(), Some("WMS 1.1.1"));
    assert_eq!(outcome.archival.size, Some(22));
}

#[tokio::test]
async fn test_failure_streak_resets_on_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let url = format!("{}/flaky.csv", server.uri());
    let h = harness(vec![dataset("ds1", "", vec![resource("r1", &url)])], 1000).await;

    let first = h.service.archive_resource("r1", "bulk").await.unwrap();
    assert_eq!(first.status(), ArchivalStatus::DownloadError);
    assert_eq!(
        first.reason(),
        Some("Server reported status error: 503 Service Unavailable")
    );
    assert_eq!(first.archival.consecutive_failures, 1);
    let first_failure = first.archival.first_failure_at;
    assert!(first_failure.is_some());

    let second = h.service.archive_resource("r1", "bulk").await.unwrap();
    assert_eq!(second.archival.consecutive_failures, 2);
    assert_eq!(second.archival.first_failure_at, first_failure);

    server.reset().await;
    mount_body(
        &server,
        "/flaky.csv",
        ResponseTemplate::new(200).set_body_string("back"),
    )
    .await;

    let third = h.service.archive_resource("r1", "bulk").await.unwrap();
    assert_eq!(third.status(), ArchivalStatus::Archived);
    assert_eq!(third.archival.consecutive_failures, 0);
    assert_eq!(third.archival.first_failure_at, None);
    assert!(third.archival.last_success_at.is_some());
}

#[tokio::test]
async fn test_refused_host_is_blacklisted() {
    // Bind then drop to get a port nothing listens on.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let url = format!("http://127.0.0.1:{}/data.csv", port);
    let h = harness(vec![dataset("ds1", "", vec![resource("r1", &url)])], 1000).await;

    let tracker = BlacklistTracker::new(h.ctx.blacklist());

    // The plain request and all three API variants are charged to the same
    // prefix, since prefixes ignore the query string.
    let first = h.service.archive_resource("r1", "bulk").await.unwrap();
    assert_eq!(first.status(), ArchivalStatus::RequestFailed);
    assert!(first.reason().unwrap().starts_with("Connection error"));
    assert_eq!(failure_count(&tracker).await, 4);

    // The plain request reaches the threshold; the API variants are skipped.
    let second = h.service.archive_resource("r1", "bulk").await.unwrap();
    assert_eq!(second.status(), ArchivalStatus::RequestFailed);
    assert_eq!(failure_count(&tracker).await, BLACKLIST_THRESHOLD);

    // Now nothing goes out on the network.
    let third = h.service.archive_resource("r1", "bulk").await.unwrap();
    assert_eq!(third.status(), ArchivalStatus::ChoseNotToDownload);
    assert!(third.reason().unwrap().contains("blacklisted"));
    assert_eq!(failure_count(&tracker).await, BLACKLIST_THRESHOLD);

    let entries = tracker.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].prefix, url);
    assert_eq!(entries[0].last_error, "connect");
}

#[tokio::test]
async fn test_failed_run_announces_no_content_path() {
    let server = MockServer::start().await;
    mount_body(
        &server,
        "/data.csv",
        ResponseTemplate::new(200).set_body_string("test"),
    )
    .await;

    let listener = Arc::new(RecordingListener::default());
    let url = format!("{}/data.csv", server.uri());
    let h = harness_with(
        vec![dataset("ds1", "", vec![resource("r1", &url)])],
        1000,
        |s| s.with_listener(listener.clone()),
    )
    .await;

    let ok = h.service.archive_resource("r1", "bulk").await.unwrap();
    assert!(ok.archival.content_path.is_some());

    server.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let failed = h.service.archive_resource("r1", "bulk").await.unwrap();
    assert_eq!(failed.status(), ArchivalStatus::DownloadError);
    // The ledger still points at the last good copy...
    assert_eq!(failed.archival.content_path, ok.archival.content_path);
    assert_eq!(failed.archival.request_type, None);

    // ...but only the successful run announced it.
    let events = listener.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            ArchiveEvent::Archived {
                resource_id: "r1".to_string(),
                queue: "bulk".to_string(),
                content_path: ok.archival.content_path.clone(),
                status: ArchivalStatus::Archived,
            },
            ArchiveEvent::Archived {
                resource_id: "r1".to_string(),
                queue: "bulk".to_string(),
                content_path: None,
                status: ArchivalStatus::DownloadError,
            },
        ]
    );
}

#[tokio::test]
async fn test_success_clears_failure_count() {
    let server = MockServer::start().await;
    mount_body(
        &server,
        "/data.csv",
        ResponseTemplate::new(200).set_body_string("test"),
    )
    .await;

    let url = format!("{}/data.csv", server.uri());
    let h = harness(vec![dataset("ds1", "", vec![resource("r1", &url)])], 1000).await;

    let tracker = BlacklistTracker::new(h.ctx.blacklist());
    let parsed = url::Url::parse(&url).unwrap();
    for _ in 0..BLACKLIST_THRESHOLD - 1 {
        tracker.record_failure(&parsed, "timeout").await;
    }
    assert_eq!(tracker.entries().await.unwrap().len(), 1);

    let outcome = h.service.archive_resource("r1", "bulk").await.unwrap();
    assert_eq!(outcome.status(), ArchivalStatus::Archived);
    assert!(tracker.entries().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dataset_archival_emits_and_reindexes() {
    let server = MockServer::start().await;
    mount_body(
        &server,
        "/good.csv",
        ResponseTemplate::new(200).set_body_string("a,b\n1,2\n"),
    )
    .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let listener = Arc::new(RecordingListener::default());
    let h = harness_with(
        vec![dataset(
            "ds1",
            "rivers",
            vec![
                resource("good", &format!("{}/good.csv", server.uri())),
                resource("gone", &format!("{}/gone.csv", server.uri())),
                resource("missing-scheme", "example.com/data.csv"),
            ],
        )],
        1000,
        |s| s.with_listener(listener.clone()),
    )
    .await;

    let outcome = h.service.archive_dataset("rivers", PRIORITY_QUEUE).await.unwrap();
    assert_eq!(outcome.dataset_id, "ds1");
    assert_eq!(outcome.outcomes.len(), 3);
    assert_eq!(outcome.archived(), 1);
    assert!(outcome.errors.is_empty());
    assert_eq!(h.catalog.reindexed.load(Ordering::SeqCst), 1);

    let events = listener.events.lock().unwrap().clone();
    assert_eq!(events.len(), 4);
    assert_eq!(
        events.last(),
        Some(&ArchiveEvent::DatasetArchived {
            dataset_id: "ds1".to_string(),
            queue: PRIORITY_QUEUE.to_string(),
        })
    );
    assert!(events.contains(&ArchiveEvent::Archived {
        resource_id: "gone".to_string(),
        queue: PRIORITY_QUEUE.to_string(),
        content_path: None,
        status: ArchivalStatus::DownloadError,
    }));

    let records = h.ctx.archivals().get_for_dataset("ds1").await.unwrap();
    assert_eq!(records.len(), 3);
    let summary = archiver::models::aggregate(&records).unwrap();
    assert_eq!(summary.status, ArchivalStatus::DownloadError);
    assert_eq!(summary.is_broken, Some(true));
}

#[tokio::test]
async fn test_dataset_without_success_is_not_reindexed() {
    let listener = Arc::new(RecordingListener::default());
    let h = harness_with(
        vec![dataset(
            "ds1",
            "",
            vec![resource("r1", "ftp:/no-host"), resource("r2", "mailto:x@y.z")],
        )],
        1000,
        |s| s.with_listener(listener.clone()),
    )
    .await;

    let outcome = h.service.archive_dataset("ds1", "bulk").await.unwrap();
    assert_eq!(outcome.archived(), 0);
    assert_eq!(h.catalog.reindexed.load(Ordering::SeqCst), 0);

    let events = listener.events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert!(events
        .iter()
        .all(|e| matches!(e, ArchiveEvent::Archived { status, .. } if *status == ArchivalStatus::UrlInvalid)));
}

#[tokio::test]
async fn test_reindexing_listener_suppresses_reindex() {
    let server = MockServer::start().await;
    mount_body(
        &server,
        "/good.csv",
        ResponseTemplate::new(200).set_body_string("ok"),
    )
    .await;

    let listener = Arc::new(RecordingListener {
        reindexes: true,
        ..Default::default()
    });
    let h = harness_with(
        vec![dataset(
            "ds1",
            "",
            vec![resource("r1", &format!("{}/good.csv", server.uri()))],
        )],
        1000,
        |s| s.with_listener(listener.clone()),
    )
    .await;

    let outcome = h.service.archive_dataset("ds1", "bulk").await.unwrap();
    assert_eq!(outcome.archived(), 1);
    assert_eq!(h.catalog.reindexed.load(Ordering::SeqCst), 0);
    assert!(listener
        .events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, ArchiveEvent::DatasetArchived { .. })));
}

#[tokio::test]
async fn test_unknown_resource_is_an_error() {
    let h = harness(vec![dataset("ds1", "", vec![])], 1000).await;
    let err = h.service.archive_resource("nope", "bulk").await.unwrap_err();
    assert!(err.to_string().contains("nope"));
    assert!(h.ctx.archivals().get_for_resource("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn test_local_dispatcher_runs_jobs() {
    let server = MockServer::start().await;
    mount_body(
        &server,
        "/data.csv",
        ResponseTemplate::new(200).set_body_string("test"),
    )
    .await;

    let url = format!("{}/data.csv", server.uri());
    let h = harness(
        vec![dataset(
            "ds1",
            "rivers",
            vec![resource("abcdef", &url), resource("second", &url)],
        )],
        1000,
    )
    .await;
    let dispatcher = LocalDispatcher::new(Arc::new(h.service), 2);

    let handle = dispatcher
        .dispatch(
            ArchiveJob::UpdateResource {
                resource_id: "abcdef".to_string(),
            },
            PRIORITY_QUEUE,
        )
        .await
        .unwrap();
    assert!(handle.id.starts_with("rivers/abcd/"));
    assert_eq!(handle.id.len(), "rivers/abcd/".len() + 4);
    assert_eq!(handle.queue, PRIORITY_QUEUE);
    match handle.wait().await.unwrap() {
        JobOutput::Resource(outcome) => assert_eq!(outcome.status(), ArchivalStatus::Archived),
        JobOutput::Dataset(_) => panic!("expected a resource outcome"),
    }

    let handle = dispatcher
        .dispatch(
            ArchiveJob::UpdateDataset {
                dataset_id: "ds1".to_string(),
            },
            "bulk",
        )
        .await
        .unwrap();
    assert!(handle.id.starts_with("rivers/"));
    assert_eq!(handle.id.len(), "rivers/".len() + 4);
    match handle.wait().await.unwrap() {
        JobOutput::Dataset(outcome) => assert_eq!(outcome.archived(), 2),
        JobOutput::Resource(_) => panic!("expected a dataset outcome"),
    }

    let result = dispatcher
        .dispatch(
            ArchiveJob::UpdateResource {
                resource_id: "missing".to_string(),
            },
            "bulk",
        )
        .await;
    assert!(matches!(result, Err(DispatchError::Catalog(_))));
}
