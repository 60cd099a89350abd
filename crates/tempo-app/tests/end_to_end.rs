//! End-to-end flows across the log store, statistics cache, and export.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tempo_app::stats::StatsCache;
use tempo_app::{export_sessions, ExportFormat};
use tempo_core::bus::ChangeBus;
use tempo_core::repository::SessionReader;
use tempo_core::session::model::parse_timestamp;
use tempo_core::session::{EndSessionRequest, SessionUpdate};
use tempo_storage::LogStore;

fn ts(raw: &str) -> NaiveDateTime {
    parse_timestamp(raw).unwrap()
}

async fn track(store: &LogStore, project: &str, start: &str, end: &str, mood: Option<u8>) {
    store.start_session_at(project, ts(start)).await.unwrap();
    store
        .end_session_at(
            EndSessionRequest {
                mood,
                ..Default::default()
            },
            ts(end),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn full_cycle_from_tracking_to_statistics() {
    let dir = tempfile::tempdir().unwrap();
    let bus = ChangeBus::new();
    let store = Arc::new(LogStore::new(dir.path(), bus.clone()));

    // Two sessions in different years for the same project
    track(&store, "P1", "2023-03-10 14:00:00", "2023-03-10 15:30:00", Some(7)).await;
    track(&store, "P1", "2024-03-10 09:00:00", "2024-03-10 09:30:00", None).await;

    let records = store.load_all().await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].partition_year(), 2024);
    assert_eq!(records[1].duration_minutes(), 90);
    assert_eq!(records[1].mood, Some(7));

    // Totals are sourced from both partitions
    let reader: Arc<dyn SessionReader> = store.clone();
    let cache = Arc::new(StatsCache::new(reader, Duration::from_secs(30)));
    let task = cache.spawn_invalidation_task(&bus);
    assert!((cache.total_hours("P1").await - 2.0).abs() < 1e-9);
    assert_eq!(
        cache.last_session_date("P1").await,
        Some(ts("2024-03-10 09:00:00"))
    );

    // A mutation invalidates the cache through the bus
    let gone = records[1].id;
    store.delete_session(gone).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!((cache.total_hours("P1").await - 0.5).abs() < 1e-9);
    task.abort();
}

#[tokio::test]
async fn records_survive_a_process_restart() {
    let dir = tempfile::tempdir().unwrap();

    let first = LogStore::new(dir.path(), ChangeBus::new());
    track(&first, "P1", "2024-03-10 09:00:00", "2024-03-10 10:00:00", Some(5)).await;
    let saved = first.load_all().await.unwrap();
    first
        .update_field(saved[0].id, SessionUpdate::Notes("persisted".into()))
        .await
        .unwrap();
    drop(first);

    let second = LogStore::new(dir.path(), ChangeBus::new());
    let loaded = second.load_all().await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].id, saved[0].id);
    assert_eq!(loaded[0].notes, "persisted");
    assert_eq!(loaded[0].mood, Some(5));
}

#[tokio::test]
async fn exported_csv_matches_the_loaded_set() {
    let dir = tempfile::tempdir().unwrap();
    let store = LogStore::new(dir.path(), ChangeBus::new());
    track(&store, "P1", "2024-03-10 09:00:00", "2024-03-10 10:00:00", None).await;
    track(&store, "P2", "2024-04-01 09:00:00", "2024-04-01 09:45:00", Some(9)).await;

    let records = store.load_all().await.unwrap();
    let out = tempfile::tempdir().unwrap();
    let path = export_sessions(&records, ExportFormat::Csv, out.path())
        .await
        .unwrap();

    let raw = std::fs::read_to_string(path).unwrap();
    let rows = tempo_storage::codec::split_rows(&raw);
    assert_eq!(rows.len(), 3); // header + 2 records
}
