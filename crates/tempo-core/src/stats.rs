//! Derived per-project statistics value types.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Aggregates derived from the session set for one project.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProjectStats {
    /// Total accumulated duration in fractional hours
    pub total_hours: f64,
    /// Start timestamp of the most recent session, if any
    pub last_session: Option<NaiveDateTime>,
}

impl ProjectStats {
    /// Folds one session's contribution into the aggregate.
    pub fn add_session(&mut self, hours: f64, started_at: NaiveDateTime) {
        self.total_hours += hours;
        match self.last_session {
            Some(last) if last >= started_at => {}
            _ => self.last_session = Some(started_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn ts(raw: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_keeps_most_recent_session() {
        let mut stats = ProjectStats::default();
        stats.add_session(1.5, ts("2024-01-15 09:00:00"));
        stats.add_session(0.5, ts("2023-06-01 09:00:00"));

        assert_eq!(stats.total_hours, 2.0);
        assert_eq!(stats.last_session, Some(ts("2024-01-15 09:00:00")));
    }
}
