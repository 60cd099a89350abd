//! Change events published by the log store.
//!
//! Events are deliberately lightweight: identifiers and counts only.
//! Collaborators (menu, dashboard, icon) re-pull whatever state they need.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notification that persisted or in-progress state changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// A session started being timed.
    SessionStarted,
    /// A running session was ended and durably persisted.
    SessionEnded { id: Uuid },
    /// A persisted record was edited or deleted.
    SessionChanged { id: Uuid },
    /// The in-memory set was (re)loaded from disk.
    SessionsLoaded { count: usize },
    /// The project catalog changed (published by project collaborators).
    ProjectsChanged,
}

impl ChangeEvent {
    /// Whether this event invalidates derived session statistics.
    pub fn touches_statistics(&self) -> bool {
        !matches!(self, Self::SessionStarted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_tagged_shape() {
        let event = ChangeEvent::SessionsLoaded { count: 3 };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"sessions_loaded","count":3}"#);

        let back: ChangeEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_started_does_not_touch_statistics() {
        assert!(!ChangeEvent::SessionStarted.touches_statistics());
        assert!(ChangeEvent::ProjectsChanged.touches_statistics());
    }
}
