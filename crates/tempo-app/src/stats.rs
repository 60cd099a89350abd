//! Derived per-project statistics.
//!
//! A time-boxed cache over the in-memory session set. The whole cache is
//! invalidated on TTL expiry or on any observed session/project change
//! event; coarse-grained invalidation is the right trade for a tool whose
//! write frequency is a handful of sessions per day.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Days, Local, NaiveDateTime};
use tempo_core::bus::ChangeBus;
use tempo_core::repository::SessionReader;
use tempo_core::session::SessionRecord;
use tempo_core::stats::ProjectStats;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Dates further out than this are treated as corrupt and skipped.
const PLAUSIBLE_FUTURE_YEARS: u64 = 50;

/// Cached per-project aggregates.
pub struct StatsCache {
    reader: Arc<dyn SessionReader>,
    ttl: Duration,
    snapshot: RwLock<Option<Snapshot>>,
}

struct Snapshot {
    computed_at: Instant,
    by_project: HashMap<String, ProjectStats>,
}

impl StatsCache {
    pub fn new(reader: Arc<dyn SessionReader>, ttl: Duration) -> Self {
        Self {
            reader,
            ttl,
            snapshot: RwLock::new(None),
        }
    }

    /// Spawns a task that drops the cache whenever a statistics-relevant
    /// change event is observed.
    ///
    /// The task ends when the bus is dropped; the returned handle can be
    /// used to end it earlier.
    pub fn spawn_invalidation_task(self: &Arc<Self>, bus: &ChangeBus) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event.touches_statistics() => cache.invalidate().await,
                    Ok(_) => {}
                    // Missed events may have included a relevant one
                    Err(RecvError::Lagged(_)) => cache.invalidate().await,
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Total accumulated duration for a project, in hours.
    pub async fn total_hours(&self, project_id: &str) -> f64 {
        self.stats_for(project_id).await.total_hours
    }

    /// Start timestamp of the project's most recent session.
    pub async fn last_session_date(&self, project_id: &str) -> Option<NaiveDateTime> {
        self.stats_for(project_id).await.last_session
    }

    /// Drops the cached snapshot; the next read recomputes.
    pub async fn invalidate(&self) {
        *self.snapshot.write().await = None;
    }

    async fn stats_for(&self, project_id: &str) -> ProjectStats {
        {
            let snapshot = self.snapshot.read().await;
            if let Some(snap) = snapshot.as_ref() {
                if snap.computed_at.elapsed() < self.ttl {
                    return snap.by_project.get(project_id).copied().unwrap_or_default();
                }
            }
        }

        let records = self.reader.snapshot().await;
        let by_project = compute(&records);
        let stats = by_project.get(project_id).copied().unwrap_or_default();
        *self.snapshot.write().await = Some(Snapshot {
            computed_at: Instant::now(),
            by_project,
        });
        stats
    }
}

/// Groups the full session set by project in one scan.
///
/// Non-finite durations and implausibly distant dates are logged and
/// skipped rather than poisoning the aggregates.
pub fn compute(records: &[SessionRecord]) -> HashMap<String, ProjectStats> {
    let horizon = Local::now()
        .naive_local()
        .checked_add_days(Days::new(PLAUSIBLE_FUTURE_YEARS * 365))
        .unwrap_or(NaiveDateTime::MAX);

    let mut by_project: HashMap<String, ProjectStats> = HashMap::new();
    for record in records {
        let hours = record.duration_hours();
        if !hours.is_finite() {
            tracing::warn!("session {}: non-finite duration, skipped", record.id);
            continue;
        }
        if record.started_at > horizon {
            tracing::warn!(
                "session {}: implausible start date {}, skipped",
                record.id,
                record.started_at
            );
            continue;
        }
        by_project
            .entry(record.project_id.clone())
            .or_default()
            .add_session(hours, record.started_at);
    }
    by_project
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempo_core::session::model::parse_timestamp;
    use tempo_core::session::ChangeEvent;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    struct FakeReader {
        records: Mutex<Vec<SessionRecord>>,
    }

    #[async_trait]
    impl SessionReader for FakeReader {
        async fn snapshot(&self) -> Vec<SessionRecord> {
            self.records.lock().await.clone()
        }
    }

    fn record(project: &str, start: &str, end: &str) -> SessionRecord {
        SessionRecord {
            id: Uuid::new_v4(),
            started_at: parse_timestamp(start).unwrap(),
            ended_at: parse_timestamp(end).unwrap(),
            project_id: project.to_string(),
            activity_type_id: None,
            project_phase_id: None,
            notes: String::new(),
            mood: None,
            action: None,
            is_milestone: false,
        }
    }

    fn reader(records: Vec<SessionRecord>) -> Arc<FakeReader> {
        Arc::new(FakeReader {
            records: Mutex::new(records),
        })
    }

    #[tokio::test]
    async fn test_totals_span_partitions() {
        // Two sessions in different years for the same project
        let reader = reader(vec![
            record("p1", "2023-05-01 09:00:00", "2023-05-01 10:30:00"),
            record("p1", "2024-05-01 09:00:00", "2024-05-01 09:30:00"),
            record("p2", "2024-05-01 09:00:00", "2024-05-01 19:00:00"),
        ]);
        let cache = StatsCache::new(reader, Duration::from_secs(30));

        assert!((cache.total_hours("p1").await - 2.0).abs() < 1e-9);
        assert_eq!(
            cache.last_session_date("p1").await,
            parse_timestamp("2024-05-01 09:00:00")
        );
        assert_eq!(cache.total_hours("unknown").await, 0.0);
    }

    #[tokio::test]
    async fn test_serves_cached_value_until_invalidated() {
        let fake = reader(vec![record("p1", "2024-05-01 09:00:00", "2024-05-01 10:00:00")]);
        let cache = StatsCache::new(fake.clone(), Duration::from_secs(600));

        assert_eq!(cache.total_hours("p1").await, 1.0);

        // New data behind the cache's back: still the warm value
        fake.records
            .lock()
            .await
            .push(record("p1", "2024-05-02 09:00:00", "2024-05-02 10:00:00"));
        assert_eq!(cache.total_hours("p1").await, 1.0);

        // After invalidation the fresh data shows up
        cache.invalidate().await;
        assert_eq!(cache.total_hours("p1").await, 2.0);
    }

    #[tokio::test]
    async fn test_event_driven_invalidation() {
        let fake = reader(vec![record("p1", "2024-05-01 09:00:00", "2024-05-01 10:00:00")]);
        let cache = Arc::new(StatsCache::new(fake.clone(), Duration::from_secs(600)));
        let bus = ChangeBus::new();
        let task = cache.spawn_invalidation_task(&bus);

        assert_eq!(cache.total_hours("p1").await, 1.0);

        fake.records
            .lock()
            .await
            .push(record("p1", "2024-05-02 09:00:00", "2024-05-02 10:00:00"));
        bus.publish(ChangeEvent::SessionEnded { id: Uuid::new_v4() });

        // Give the invalidation task a chance to observe the event
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(cache.total_hours("p1").await, 2.0);
        task.abort();
    }

    #[test]
    fn test_compute_skips_implausible_dates() {
        let ok = record("p1", "2024-05-01 09:00:00", "2024-05-01 10:00:00");
        let mut distant = record("p1", "2024-05-01 09:00:00", "2024-05-01 10:00:00");
        distant.started_at = parse_timestamp("2500-01-01 00:00:00").unwrap();
        distant.ended_at = parse_timestamp("2500-01-01 01:00:00").unwrap();

        let by_project = compute(&[ok, distant]);
        assert_eq!(by_project["p1"].total_hours, 1.0);
    }
}
