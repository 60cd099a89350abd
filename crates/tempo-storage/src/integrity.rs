//! Integrity validator.
//!
//! Consistency checks over the loaded session set, with best-effort
//! auto-repair. Repairs only normalize records (fresh identifier on
//! collision, clamped end time); nothing is ever deleted to "fix" it.
//! Unknown project references are report-only: resolving them belongs to
//! the project catalog, not the storage engine.

use std::collections::{BTreeSet, HashMap, HashSet};

use tempo_core::session::SessionRecord;
use uuid::Uuid;

/// One inconsistency detected in the loaded set.
#[derive(Debug, Clone, PartialEq)]
pub enum Finding {
    /// Record references a project unknown to the catalog
    UnknownProject { id: Uuid, project_id: String },
    /// Record ends before it starts
    EndBeforeStart { id: Uuid },
    /// Identifier appears on more than one record
    DuplicateId { id: Uuid, count: usize },
}

/// One normalization performed by auto-repair.
#[derive(Debug, Clone, PartialEq)]
pub enum Repair {
    /// A colliding record received a fresh identifier
    ReassignedId { old: Uuid, new: Uuid },
    /// An inverted interval was clamped to a zero-duration session
    ClampedEnd { id: Uuid },
}

impl Repair {
    /// Identifier of the record after the repair.
    pub fn record_id(&self) -> Uuid {
        match self {
            Self::ReassignedId { new, .. } => *new,
            Self::ClampedEnd { id } => *id,
        }
    }
}

/// Scans the set for inconsistencies without modifying anything.
///
/// `known_projects` is the externally resolved project catalog; when
/// `None`, project references are not checked.
pub fn check(
    records: &[SessionRecord],
    known_projects: Option<&HashSet<String>>,
) -> Vec<Finding> {
    let mut findings = Vec::new();

    let mut seen: HashMap<Uuid, usize> = HashMap::new();
    for record in records {
        *seen.entry(record.id).or_insert(0) += 1;
    }
    for (id, count) in seen {
        if count > 1 {
            findings.push(Finding::DuplicateId { id, count });
        }
    }

    for record in records {
        if record.ended_at < record.started_at {
            findings.push(Finding::EndBeforeStart { id: record.id });
        }
        if let Some(known) = known_projects {
            if !known.contains(&record.project_id) {
                findings.push(Finding::UnknownProject {
                    id: record.id,
                    project_id: record.project_id.clone(),
                });
            }
        }
    }

    findings
}

/// Normalizes the set in place.
///
/// Returns the repairs performed and the partition years whose files must
/// be rewritten. Idempotent: a second pass over repaired records finds
/// nothing to do. Repairs never change a record's start time, so
/// partition membership is stable.
pub fn repair(records: &mut [SessionRecord]) -> (Vec<Repair>, BTreeSet<i32>) {
    let mut repairs = Vec::new();
    let mut years = BTreeSet::new();
    let mut seen: HashSet<Uuid> = HashSet::new();

    for record in records.iter_mut() {
        if !seen.insert(record.id) {
            // First occurrence keeps the identifier; collisions get a
            // fresh one.
            let fresh = Uuid::new_v4();
            repairs.push(Repair::ReassignedId {
                old: record.id,
                new: fresh,
            });
            record.id = fresh;
            seen.insert(fresh);
            years.insert(record.partition_year());
        }

        if record.ended_at < record.started_at {
            record.ended_at = record.started_at;
            repairs.push(Repair::ClampedEnd { id: record.id });
            years.insert(record.partition_year());
        }
    }

    (repairs, years)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_core::session::model::parse_timestamp;

    fn record(start: &str, end: &str, project: &str) -> SessionRecord {
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

    #[test]
    fn test_clean_set_has_no_findings() {
        let records = vec![
            record("2024-01-15 09:00:00", "2024-01-15 10:00:00", "p1"),
            record("2024-01-16 09:00:00", "2024-01-16 10:00:00", "p2"),
        ];
        let known: HashSet<String> = ["p1", "p2"].iter().map(|s| s.to_string()).collect();
        assert!(check(&records, Some(&known)).is_empty());
    }

    #[test]
    fn test_detects_unknown_project_and_inverted_interval() {
        let mut bad = record("2024-01-15 09:00:00", "2024-01-15 08:00:00", "ghost");
        let known: HashSet<String> = ["p1".to_string()].into_iter().collect();

        let findings = check(std::slice::from_ref(&bad), Some(&known));
        assert!(findings.contains(&Finding::EndBeforeStart { id: bad.id }));
        assert!(findings.contains(&Finding::UnknownProject {
            id: bad.id,
            project_id: "ghost".to_string(),
        }));

        // Without a catalog, only the interval is flagged
        bad.project_id = "anything".to_string();
        let findings = check(std::slice::from_ref(&bad), None);
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn test_detects_duplicate_ids() {
        let a = record("2024-01-15 09:00:00", "2024-01-15 10:00:00", "p1");
        let mut b = record("2024-02-15 09:00:00", "2024-02-15 10:00:00", "p1");
        b.id = a.id;

        let findings = check(&[a.clone(), b], None);
        assert_eq!(
            findings,
            vec![Finding::DuplicateId { id: a.id, count: 2 }]
        );
    }

    #[test]
    fn test_repair_is_idempotent_and_lossless() {
        let a = record("2024-01-15 09:00:00", "2024-01-15 10:00:00", "p1");
        let mut b = record("2023-02-15 09:00:00", "2023-02-15 08:00:00", "p1");
        b.id = a.id;
        let mut records = vec![a.clone(), b];

        let (repairs, years) = repair(&mut records);
        assert_eq!(repairs.len(), 2); // reassigned id + clamped end
        assert_eq!(years.into_iter().collect::<Vec<_>>(), vec![2023]);

        // No records lost, first occurrence kept its identifier
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, a.id);
        assert_ne!(records[1].id, a.id);
        assert_eq!(records[1].ended_at, records[1].started_at);

        // Second pass finds nothing
        let (repairs, _) = repair(&mut records);
        assert!(repairs.is_empty());
        assert!(check(&records, None).is_empty());
    }
}
