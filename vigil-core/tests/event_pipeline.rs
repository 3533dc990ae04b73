//! End-to-end pipeline tests: real tempdir watches, real notify events,
//! classification against a stub server, reports captured over HTTP.

mod support;

use std::sync::Arc;
use std::time::Duration;

use vigil_core::{ApiClient, CategoryCache, ScanConfig, WatchService};
use vigil_model::{Category, ChangeType, MonitoredPath};

use support::StubOptions;

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

fn categories() -> Vec<Category> {
    vec![
        Category {
            id: 1,
            name: "Scrap".into(),
            color: "#dc3545".into(),
            keywords: vec!["scrap".into()],
            file_patterns: vec![],
        },
        Category {
            id: 2,
            name: "NC Programs".into(),
            color: "#007bff".into(),
            keywords: vec![],
            file_patterns: vec!["\\.nc$".into()],
        },
    ]
}

fn dir_target(id: i64, path: &std::path::Path) -> MonitoredPath {
    MonitoredPath {
        id,
        path: path.to_string_lossy().into_owned(),
        is_directory: true,
        recursive: true,
        description: None,
    }
}

async fn pipeline(
    stub: &support::StubServer,
) -> (Arc<ApiClient>, WatchService) {
    let api = Arc::new(ApiClient::new(stub.base_url(), Duration::from_secs(5)).unwrap());
    let cache = Arc::new(CategoryCache::new(Arc::clone(&api)));
    let watch = WatchService::new(Arc::clone(&api), cache, ScanConfig::default());
    (api, watch)
}

#[tokio::test]
async fn created_file_is_classified_by_path_pattern() {
    let tmp = tempfile::tempdir().unwrap();
    let stub = support::spawn(StubOptions {
        categories: categories(),
        ..StubOptions::default()
    })
    .await;
    let (_api, watch) = pipeline(&stub).await;

    assert_eq!(watch.start_all(vec![dir_target(7, tmp.path())]).await, 1);
    std::fs::write(tmp.path().join("job42.nc"), "G0 X0 Y0\n").unwrap();

    let event = stub
        .wait_for_event(
            |event| event.file_path.ends_with("job42.nc") && event.category_id.is_some(),
            EVENT_TIMEOUT,
        )
        .await
        .expect("no classified event for job42.nc");
    assert_eq!(event.path_id, 7);
    assert_eq!(event.category_id, Some(2));
    assert_eq!(event.matched_keyword.as_deref(), Some("Pattern: \\.nc$"));

    watch.stop_all().await;
}

#[tokio::test]
async fn content_keyword_match_carries_line_context() {
    let tmp = tempfile::tempdir().unwrap();
    let stub = support::spawn(StubOptions {
        categories: categories(),
        ..StubOptions::default()
    })
    .await;
    let (_api, watch) = pipeline(&stub).await;

    watch.start_all(vec![dir_target(3, tmp.path())]).await;
    std::fs::write(tmp.path().join("part17.log"), "status: scrap detected\n").unwrap();

    let event = stub
        .wait_for_event(
            |event| event.file_path.ends_with("part17.log") && event.category_id == Some(1),
            EVENT_TIMEOUT,
        )
        .await
        .expect("no content-classified event for part17.log");
    assert_eq!(
        event.matched_keyword.as_deref(),
        Some("Content: scrap (Line 1: status: scrap detected)")
    );

    watch.stop_all().await;
}

#[tokio::test]
async fn rename_reports_a_delete_and_a_create() {
    let tmp = tempfile::tempdir().unwrap();
    let stub = support::spawn(StubOptions {
        categories: categories(),
        ..StubOptions::default()
    })
    .await;
    let (_api, watch) = pipeline(&stub).await;

    let old = tmp.path().join("run_a.log");
    std::fs::write(&old, "idle\n").unwrap();
    watch.start_all(vec![dir_target(4, tmp.path())]).await;

    let new = tmp.path().join("run_b.log");
    std::fs::rename(&old, &new).unwrap();

    let deleted = stub
        .wait_for_event(
            |event| {
                event.file_path.ends_with("run_a.log")
                    && event.change_type == ChangeType::Deleted
            },
            EVENT_TIMEOUT,
        )
        .await
        .expect("no deleted event for the old name");
    assert_eq!(deleted.category_id, None);
    assert_eq!(deleted.new_size, None);

    stub.wait_for_event(
        |event| {
            event.file_path.ends_with("run_b.log") && event.change_type == ChangeType::Created
        },
        EVENT_TIMEOUT,
    )
    .await
    .expect("no created event for the new name");

    watch.stop_all().await;
}

#[tokio::test]
async fn deleted_file_reports_null_category_and_size() {
    let tmp = tempfile::tempdir().unwrap();
    let stub = support::spawn(StubOptions {
        categories: categories(),
        ..StubOptions::default()
    })
    .await;
    let (_api, watch) = pipeline(&stub).await;

    let target = tmp.path().join("job42.nc");
    std::fs::write(&target, "G0\n").unwrap();
    watch.start_all(vec![dir_target(5, tmp.path())]).await;

    std::fs::remove_file(&target).unwrap();

    let event = stub
        .wait_for_event(
            |event| {
                event.file_path.ends_with("job42.nc")
                    && event.change_type == ChangeType::Deleted
            },
            EVENT_TIMEOUT,
        )
        .await
        .expect("no deleted event");
    assert_eq!(event.category_id, None);
    assert_eq!(event.matched_keyword, None);
    assert_eq!(event.new_size, None);

    watch.stop_all().await;
}

#[tokio::test]
async fn stop_all_halts_event_delivery() {
    let tmp = tempfile::tempdir().unwrap();
    let stub = support::spawn(StubOptions {
        categories: categories(),
        ..StubOptions::default()
    })
    .await;
    let (_api, watch) = pipeline(&stub).await;

    watch.start_all(vec![dir_target(6, tmp.path())]).await;
    watch.stop_all().await;
    assert!(!watch.is_active().await);

    std::fs::write(tmp.path().join("late.log"), "scrap\n").unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(stub.events().await.is_empty());
}

#[tokio::test]
async fn failed_reports_do_not_break_later_events() {
    let tmp = tempfile::tempdir().unwrap();
    let stub = support::spawn(StubOptions {
        categories: categories(),
        fail_reports: true,
        ..StubOptions::default()
    })
    .await;
    let (_api, watch) = pipeline(&stub).await;

    watch.start_all(vec![dir_target(8, tmp.path())]).await;
    std::fs::write(tmp.path().join("one.log"), "scrap\n").unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    // Every report 500s, nothing is recorded, nothing panics, and the
    // watch set stays alive for the next change.
    assert!(stub.events().await.is_empty());
    assert!(watch.is_active().await);

    watch.stop_all().await;
}

#[tokio::test]
async fn restart_rebuilds_from_the_server_snapshot_skipping_vanished_roots() {
    let keep = tempfile::tempdir().unwrap();
    let vanished = tempfile::tempdir().unwrap();
    let vanished_path = vanished.path().to_path_buf();

    let stub = support::spawn(StubOptions {
        categories: categories(),
        paths: vec![
            dir_target(1, &vanished_path),
            dir_target(2, keep.path()),
        ],
        ..StubOptions::default()
    })
    .await;
    let (_api, watch) = pipeline(&stub).await;

    assert_eq!(watch.restart().await, 2);

    // The directory disappears out-of-band; the next restart skips it and
    // keeps monitoring the survivor.
    drop(vanished);
    assert_eq!(watch.restart().await, 1);
    assert!(watch.is_active().await);

    watch.stop_all().await;
}
