//! Update requests for persisted session records.
//!
//! Field-level edits are modeled as a closed enum instead of a
//! stringly-typed `(field, value)` pair, so an unsupported field or a
//! malformed value is rejected when the request is constructed rather
//! than somewhere down the persistence path.

use super::model::SessionRecord;
use crate::error::{Result, TempoError};
use chrono::NaiveDateTime;

/// A single-field edit to a persisted session record.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// Replace the free-text notes
    Notes(String),
    /// Set or clear the mood rating (0-10)
    Mood(Option<u8>),
    /// Set or clear the milestone/action text
    Action(Option<String>),
    /// Set the milestone flag
    Milestone(bool),
}

impl SessionUpdate {
    /// Builds an update from a raw `(field, value)` pair.
    ///
    /// This is the compatibility entry point for callers that carry field
    /// names as strings (e.g. a web view bridge). Unknown field names and
    /// malformed values fail here with [`TempoError::InvalidField`]; an
    /// empty value clears optional fields.
    pub fn parse(field: &str, value: &str) -> Result<Self> {
        match field {
            "notes" => Ok(Self::Notes(value.to_string())),
            "mood" => {
                if value.is_empty() {
                    return Ok(Self::Mood(None));
                }
                let mood: u8 = value.parse().map_err(|_| {
                    TempoError::invalid_field("mood", format!("not an integer: '{value}'"))
                })?;
                Self::mood(Some(mood))
            }
            "action" => {
                if value.is_empty() {
                    Ok(Self::Action(None))
                } else {
                    Ok(Self::Action(Some(value.to_string())))
                }
            }
            "is_milestone" => match value {
                "1" | "true" => Ok(Self::Milestone(true)),
                "0" | "false" => Ok(Self::Milestone(false)),
                other => Err(TempoError::invalid_field(
                    "is_milestone",
                    format!("expected 1/0 or true/false, got '{other}'"),
                )),
            },
            other => Err(TempoError::invalid_field(
                other,
                "unsupported update field",
            )),
        }
    }

    /// Builds a mood update, rejecting out-of-range ratings.
    pub fn mood(mood: Option<u8>) -> Result<Self> {
        if let Some(m) = mood {
            if m > 10 {
                return Err(TempoError::invalid_field(
                    "mood",
                    format!("rating must be 0-10, got {m}"),
                ));
            }
        }
        Ok(Self::Mood(mood))
    }

    /// The canonical column name this update targets.
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Notes(_) => "notes",
            Self::Mood(_) => "mood",
            Self::Action(_) => "action",
            Self::Milestone(_) => "is_milestone",
        }
    }

    /// Applies the edit to a record in place.
    pub fn apply(&self, record: &mut SessionRecord) {
        match self {
            Self::Notes(notes) => record.notes = notes.clone(),
            Self::Mood(mood) => record.mood = *mood,
            Self::Action(action) => record.action = action.clone(),
            Self::Milestone(flag) => record.is_milestone = *flag,
        }
    }
}

/// A full replacement of every mutable field on a session record.
///
/// Unlike [`SessionUpdate`], this may move the record between partitions
/// when the start date crosses a year boundary.
#[derive(Debug, Clone)]
pub struct SessionEdit {
    pub started_at: NaiveDateTime,
    pub ended_at: NaiveDateTime,
    pub project_id: String,
    pub activity_type_id: Option<String>,
    pub project_phase_id: Option<String>,
    pub notes: String,
    pub mood: Option<u8>,
    pub action: Option<String>,
    pub is_milestone: bool,
}

impl SessionEdit {
    /// Validates the edit and applies it to a record in place.
    ///
    /// The record identity is preserved; only payload and temporal fields
    /// change. Fails when the end precedes the start or the mood rating is
    /// out of range.
    pub fn apply(&self, record: &mut SessionRecord) -> Result<()> {
        if self.ended_at < self.started_at {
            return Err(TempoError::invalid_field(
                "end_date",
                "end must not precede start",
            ));
        }
        if let Some(m) = self.mood {
            if m > 10 {
                return Err(TempoError::invalid_field(
                    "mood",
                    format!("rating must be 0-10, got {m}"),
                ));
            }
        }
        if self.project_id.is_empty() {
            return Err(TempoError::invalid_field("project_id", "must not be empty"));
        }

        record.started_at = self.started_at;
        record.ended_at = self.ended_at;
        record.project_id = self.project_id.clone();
        record.activity_type_id = self.activity_type_id.clone();
        record.project_phase_id = self.project_phase_id.clone();
        record.notes = self.notes.clone();
        record.mood = self.mood;
        record.action = self.action.clone();
        record.is_milestone = self.is_milestone;
        Ok(())
    }
}

impl From<&SessionRecord> for SessionEdit {
    fn from(record: &SessionRecord) -> Self {
        Self {
            started_at: record.started_at,
            ended_at: record.ended_at,
            project_id: record.project_id.clone(),
            activity_type_id: record.activity_type_id.clone(),
            project_phase_id: record.project_phase_id.clone(),
            notes: record.notes.clone(),
            mood: record.mood,
            action: record.action.clone(),
            is_milestone: record.is_milestone,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_fields() {
        assert_eq!(
            SessionUpdate::parse("notes", "focused").unwrap(),
            SessionUpdate::Notes("focused".to_string())
        );
        assert_eq!(
            SessionUpdate::parse("mood", "7").unwrap(),
            SessionUpdate::Mood(Some(7))
        );
        assert_eq!(
            SessionUpdate::parse("mood", "").unwrap(),
            SessionUpdate::Mood(None)
        );
        assert_eq!(
            SessionUpdate::parse("is_milestone", "1").unwrap(),
            SessionUpdate::Milestone(true)
        );
    }

    #[test]
    fn test_parse_unknown_field_fails() {
        let err = SessionUpdate::parse("color", "red").unwrap_err();
        assert!(err.is_invalid_field());
    }

    #[test]
    fn test_parse_malformed_mood_fails() {
        assert!(SessionUpdate::parse("mood", "great").unwrap_err().is_invalid_field());
        assert!(SessionUpdate::parse("mood", "11").unwrap_err().is_invalid_field());
    }

    #[test]
    fn test_apply_field_update() {
        use crate::session::model::parse_timestamp;
        let mut record = SessionRecord {
            id: uuid::Uuid::new_v4(),
            started_at: parse_timestamp("2024-01-15 09:00:00").unwrap(),
            ended_at: parse_timestamp("2024-01-15 10:00:00").unwrap(),
            project_id: "proj-1".to_string(),
            activity_type_id: None,
            project_phase_id: None,
            notes: String::new(),
            mood: None,
            action: None,
            is_milestone: false,
        };

        SessionUpdate::Notes("deep work".to_string()).apply(&mut record);
        SessionUpdate::Mood(Some(8)).apply(&mut record);
        assert_eq!(record.notes, "deep work");
        assert_eq!(record.mood, Some(8));
    }

    #[test]
    fn test_edit_rejects_inverted_interval() {
        use crate::session::model::parse_timestamp;
        let mut record = SessionRecord {
            id: uuid::Uuid::new_v4(),
            started_at: parse_timestamp("2024-01-15 09:00:00").unwrap(),
            ended_at: parse_timestamp("2024-01-15 10:00:00").unwrap(),
            project_id: "proj-1".to_string(),
            activity_type_id: None,
            project_phase_id: None,
            notes: String::new(),
            mood: None,
            action: None,
            is_milestone: false,
        };

        let mut edit = SessionEdit::from(&record);
        edit.ended_at = parse_timestamp("2024-01-15 08:00:00").unwrap();
        assert!(edit.apply(&mut record).is_err());
        // Record untouched on failure
        assert_eq!(
            record.ended_at,
            parse_timestamp("2024-01-15 10:00:00").unwrap()
        );
    }
}
