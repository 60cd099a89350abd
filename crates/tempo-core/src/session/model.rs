//! Session domain model.
//!
//! This module contains the core session entities that the storage engine
//! and application services operate on, independent of any on-disk format.

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wall-clock timestamp format used everywhere a session timestamp is
/// rendered or parsed, including the on-disk partition files.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Formats a timestamp in the canonical `YYYY-MM-DD HH:MM:SS` form.
pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a timestamp in the canonical `YYYY-MM-DD HH:MM:SS` form.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).ok()
}

/// One persisted work session.
///
/// A record is created when a running session is ended, never while it is
/// still being timed. Foreign references (`project_id`,
/// `activity_type_id`, `project_phase_id`) are opaque to the storage
/// engine and resolved by external collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Unique record identifier, generated once at creation
    pub id: Uuid,
    /// When the session started
    pub started_at: NaiveDateTime,
    /// When the session ended (always >= `started_at`)
    pub ended_at: NaiveDateTime,
    /// Owning project reference (required for persistence)
    pub project_id: String,
    /// Optional activity type reference
    pub activity_type_id: Option<String>,
    /// Optional project phase reference
    pub project_phase_id: Option<String>,
    /// Free-text notes
    pub notes: String,
    /// Optional mood rating, 0-10
    pub mood: Option<u8>,
    /// Optional milestone/action text
    pub action: Option<String>,
    /// Whether this session marks a milestone
    pub is_milestone: bool,
}

impl SessionRecord {
    /// Session length in whole minutes, rounded to the nearest minute.
    ///
    /// Zero-duration sessions are valid and return 0.
    pub fn duration_minutes(&self) -> i64 {
        let seconds = (self.ended_at - self.started_at).num_seconds();
        ((seconds as f64) / 60.0).round() as i64
    }

    /// Session length in fractional hours.
    pub fn duration_hours(&self) -> f64 {
        let seconds = (self.ended_at - self.started_at).num_seconds();
        (seconds as f64) / 3600.0
    }

    /// The calendar year that owns this record's partition.
    ///
    /// Partition membership is fully determined by the year component of
    /// the start timestamp.
    pub fn partition_year(&self) -> i32 {
        self.started_at.year()
    }
}

/// The in-progress, not-yet-persisted session being timed.
///
/// This is a transient projection of the current selections plus a start
/// time; it is never written to disk. At most one exists process-wide.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSession {
    /// Project the running session is tracked against
    pub project_id: String,
    /// Optional activity type selection
    pub activity_type_id: Option<String>,
    /// Optional project phase selection
    pub project_phase_id: Option<String>,
    /// When the session was started
    pub started_at: NaiveDateTime,
}

impl ActiveSession {
    /// Starts a new active session for a project.
    ///
    /// Any stale activity/phase selections are cleared; they are chosen
    /// again while the session runs or when it is ended.
    pub fn start(project_id: impl Into<String>, started_at: NaiveDateTime) -> Self {
        Self {
            project_id: project_id.into(),
            activity_type_id: None,
            project_phase_id: None,
            started_at,
        }
    }
}

/// Everything the caller supplies when ending the running session.
///
/// The start time and project come from the active session itself.
#[derive(Debug, Clone, Default)]
pub struct EndSessionRequest {
    /// Free-text notes for the completed session
    pub notes: String,
    /// Optional mood rating, 0-10
    pub mood: Option<u8>,
    /// Activity type reference; overrides the active selection when set
    pub activity_type_id: Option<String>,
    /// Project phase reference; overrides the active selection when set
    pub project_phase_id: Option<String>,
    /// Optional milestone/action text
    pub action: Option<String>,
    /// Whether the completed session marks a milestone
    pub is_milestone: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(raw: &str) -> NaiveDateTime {
        parse_timestamp(raw).unwrap()
    }

    fn record(start: &str, end: &str) -> SessionRecord {
        SessionRecord {
            id: Uuid::new_v4(),
            started_at: ts(start),
            ended_at: ts(end),
            project_id: "proj-1".to_string(),
            activity_type_id: None,
            project_phase_id: None,
            notes: String::new(),
            mood: None,
            action: None,
            is_milestone: false,
        }
    }

    #[test]
    fn test_duration_minutes_rounds() {
        let r = record("2024-01-15 09:00:00", "2024-01-15 10:30:29");
        assert_eq!(r.duration_minutes(), 90);

        let r = record("2024-01-15 09:00:00", "2024-01-15 10:30:30");
        assert_eq!(r.duration_minutes(), 91);
    }

    #[test]
    fn test_zero_duration_is_valid() {
        let r = record("2024-01-15 09:00:00", "2024-01-15 09:00:00");
        assert_eq!(r.duration_minutes(), 0);
        assert_eq!(r.duration_hours(), 0.0);
    }

    #[test]
    fn test_partition_year_from_start() {
        // A session crossing midnight on New Year's Eve belongs to the
        // year it started in.
        let r = record("2023-12-31 23:30:00", "2024-01-01 00:45:00");
        assert_eq!(r.partition_year(), 2023);
    }

    #[test]
    fn test_timestamp_round_trip() {
        let raw = "2024-01-15 09:00:00";
        assert_eq!(format_timestamp(ts(raw)), raw);
    }

    #[test]
    fn test_active_session_clears_selections() {
        let active = ActiveSession::start("proj-1", ts("2024-01-15 09:00:00"));
        assert_eq!(active.activity_type_id, None);
        assert_eq!(active.project_phase_id, None);
    }
}
