//! Log store: the orchestration core of the session log.
//!
//! One `LogStore` instance owns the authoritative in-memory session set
//! and the transient active-session slot. All mutation entry points and
//! loads serialize against each other through an internal gate, so no two
//! writers ever race on the same partition file; partition loads within a
//! single operation still run concurrently, one task per year.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use futures::future::join_all;
use tempo_core::bus::ChangeBus;
use tempo_core::config::TempoConfig;
use tempo_core::repository::SessionReader;
use tempo_core::session::{
    ActiveSession, ChangeEvent, EndSessionRequest, SessionEdit, SessionRecord, SessionUpdate,
};
use tempo_core::{Result, TempoError};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::codec::{self, ColumnLayout};
use crate::integrity;
use crate::migration::MigrationEngine;
use crate::partition;
use crate::partition_io::PartitionIo;

/// Orchestrates partition I/O, migration, the in-memory session set, and
/// change notification.
pub struct LogStore {
    io: PartitionIo,
    engine: MigrationEngine,
    bus: ChangeBus,
    /// Serializes mutations and loads against each other
    gate: Mutex<()>,
    /// Authoritative in-memory set, newest first
    sessions: RwLock<Vec<SessionRecord>>,
    /// The single process-wide active session, if any
    active: RwLock<Option<ActiveSession>>,
    /// Partitions already migrated this process lifetime
    migrated: Mutex<BTreeSet<i32>>,
    last_modified: RwLock<Option<NaiveDateTime>>,
}

impl LogStore {
    /// Creates a store over an explicit data directory.
    pub fn new(data_dir: impl Into<PathBuf>, bus: ChangeBus) -> Self {
        let io = PartitionIo::new(data_dir);
        Self {
            engine: MigrationEngine::new(io.clone()),
            io,
            bus,
            gate: Mutex::new(()),
            sessions: RwLock::new(Vec::new()),
            active: RwLock::new(None),
            migrated: Mutex::new(BTreeSet::new()),
            last_modified: RwLock::new(None),
        }
    }

    /// Creates a store at the configured (or default platform) location.
    pub fn from_config(config: &TempoConfig, bus: ChangeBus) -> Result<Self> {
        Ok(Self::new(config.resolve_data_dir()?, bus))
    }

    pub fn data_dir(&self) -> &Path {
        self.io.dir()
    }

    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    // ========================================================================
    // Active session state machine
    // ========================================================================

    /// Starts timing a session for a project.
    ///
    /// A no-op when a session is already active (idempotent guard, not an
    /// error). Stale activity/phase selections are cleared.
    pub async fn start_session(&self, project_id: impl Into<String>) -> Result<()> {
        self.start_session_at(project_id, Local::now().naive_local())
            .await
    }

    /// Starts timing a session with an explicit start instant.
    pub async fn start_session_at(
        &self,
        project_id: impl Into<String>,
        started_at: NaiveDateTime,
    ) -> Result<()> {
        let _gate = self.gate.lock().await;
        {
            let mut active = self.active.write().await;
            if active.is_some() {
                tracing::debug!("start_session ignored: a session is already active");
                return Ok(());
            }
            *active = Some(ActiveSession::start(project_id, started_at));
        }
        self.bus.publish(ChangeEvent::SessionStarted);
        Ok(())
    }

    /// The running session, if any.
    pub async fn active_session(&self) -> Option<ActiveSession> {
        self.active.read().await.clone()
    }

    /// Updates the activity/phase selections on the running session.
    pub async fn set_selections(
        &self,
        activity_type_id: Option<String>,
        project_phase_id: Option<String>,
    ) -> Result<()> {
        let _gate = self.gate.lock().await;
        let mut active = self.active.write().await;
        let Some(active) = active.as_mut() else {
            return Err(TempoError::not_found("active session", "none"));
        };
        active.activity_type_id = activity_type_id;
        active.project_phase_id = project_phase_id;
        Ok(())
    }

    /// Ends the running session, persisting it as a durable record.
    ///
    /// Fails when no session is active or when the active session has no
    /// resolved project. The active slot is cleared only after the append
    /// succeeded: a failed write keeps the timing state intact.
    pub async fn end_session(&self, request: EndSessionRequest) -> Result<SessionRecord> {
        self.end_session_at(request, Local::now().naive_local())
            .await
    }

    /// Ends the running session at an explicit end instant.
    pub async fn end_session_at(
        &self,
        request: EndSessionRequest,
        ended_at: NaiveDateTime,
    ) -> Result<SessionRecord> {
        let _gate = self.gate.lock().await;

        if let Some(m) = request.mood {
            if m > 10 {
                return Err(TempoError::invalid_field(
                    "mood",
                    format!("rating must be 0-10, got {m}"),
                ));
            }
        }

        let active = self
            .active
            .read()
            .await
            .clone()
            .ok_or_else(|| TempoError::validation("no session is active"))?;
        if active.project_id.is_empty() {
            return Err(TempoError::validation(
                "active session has no resolved project",
            ));
        }

        let record = SessionRecord {
            id: Uuid::new_v4(),
            started_at: active.started_at,
            // End never precedes start, even under clock adjustment
            ended_at: ended_at.max(active.started_at),
            project_id: active.project_id,
            activity_type_id: request.activity_type_id.or(active.activity_type_id),
            project_phase_id: request.project_phase_id.or(active.project_phase_id),
            notes: request.notes,
            mood: request.mood,
            action: request.action,
            is_milestone: request.is_milestone,
        };

        // Durable append first; only then clear the active slot.
        let year = record.partition_year();
        self.io.append(year, &codec::encode_record(&record)).await?;

        {
            let mut sessions = self.sessions.write().await;
            sessions.push(record.clone());
            sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        }
        *self.active.write().await = None;
        self.touch().await;
        self.bus.publish(ChangeEvent::SessionEnded { id: record.id });
        Ok(record)
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Loads every partition and replaces the in-memory set.
    ///
    /// Partitions load concurrently, one task per year, each through the
    /// migration engine on its first load this process. A partition that
    /// fails to read or parse contributes nothing and is logged; the load
    /// itself never fails on bad partitions.
    pub async fn load_all(&self) -> Result<Vec<SessionRecord>> {
        let _gate = self.gate.lock().await;
        let records = self.load_partitions(None).await?;

        *self.sessions.write().await = records.clone();
        self.bus.publish(ChangeEvent::SessionsLoaded {
            count: records.len(),
        });
        Ok(records)
    }

    /// Loads only the partitions overlapping `[from, to]`, filtering
    /// records at decode time.
    ///
    /// The authoritative in-memory set is untouched; the emitted
    /// `SessionsLoaded` event drives the asynchronous statistics
    /// recomputation downstream.
    pub async fn load_sessions(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<SessionRecord>> {
        let _gate = self.gate.lock().await;
        let records = self.load_partitions(Some((from, to))).await?;
        self.bus.publish(ChangeEvent::SessionsLoaded {
            count: records.len(),
        });
        Ok(records)
    }

    async fn load_partitions(
        &self,
        range: Option<(NaiveDateTime, NaiveDateTime)>,
    ) -> Result<Vec<SessionRecord>> {
        let years = partition::list_partitions(self.io.dir()).await?;
        let years = match range {
            Some((from, to)) => partition::partitions_in_range(&years, from, to),
            None => years,
        };

        if years.is_empty() {
            if range.is_none() {
                if let Some(mut records) = self.engine.load_legacy().await? {
                    tracing::info!("no partitions found, loaded legacy file");
                    records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
                    return Ok(records);
                }
            }
            return Ok(Vec::new());
        }

        let mut tasks = Vec::with_capacity(years.len());
        for year in years {
            let first_load = self.migrated.lock().await.insert(year);
            let engine = self.engine.clone();
            tasks.push(tokio::spawn(async move {
                let result = if first_load {
                    engine.migrate_filtered(year, range).await
                } else {
                    engine.load_filtered(year, range).await
                };
                (year, result)
            }));
        }

        let mut records = Vec::new();
        for joined in join_all(tasks).await {
            match joined {
                Ok((_, Ok(outcome))) => records.extend(outcome.records),
                Ok((year, Err(err))) => {
                    // Partial data beats no data
                    tracing::warn!("partition {year} contributed nothing: {err}");
                    self.migrated.lock().await.remove(&year);
                }
                Err(err) => tracing::warn!("partition load task failed: {err}"),
            }
        }
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(records)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Applies a single-field edit to a persisted record.
    pub async fn update_field(&self, id: Uuid, update: SessionUpdate) -> Result<()> {
        let _gate = self.gate.lock().await;
        let mut updated = self
            .find(id)
            .await
            .ok_or_else(|| TempoError::not_found("session", id.to_string()))?;
        update.apply(&mut updated);
        self.persist_replacement(id, updated).await
    }

    /// Replaces every mutable field of a persisted record.
    pub async fn update_full(&self, id: Uuid, edit: SessionEdit) -> Result<()> {
        let _gate = self.gate.lock().await;
        let mut updated = self
            .find(id)
            .await
            .ok_or_else(|| TempoError::not_found("session", id.to_string()))?;
        edit.apply(&mut updated)?;
        self.persist_replacement(id, updated).await
    }

    /// Physically deletes a record from its owning partition.
    ///
    /// The owning partition is re-read fresh from disk rather than
    /// rendered from memory, so records added there by external tooling
    /// survive the rewrite. Fails with `NotFound` (and touches nothing)
    /// when the identifier is unknown.
    pub async fn delete_session(&self, id: Uuid) -> Result<()> {
        let _gate = self.gate.lock().await;
        let year = self
            .find(id)
            .await
            .map(|r| r.partition_year())
            .ok_or_else(|| TempoError::not_found("session", id.to_string()))?;

        let raw = self.io.read(year).await?;
        let rows = codec::split_rows(&raw);
        if let Some((header, data_rows)) = rows.split_first() {
            let layout = ColumnLayout::from_header(header);
            let mut kept = Vec::new();
            let mut undecodable = Vec::new();
            let mut found = false;
            for row in data_rows {
                match codec::decode_record(row, &layout) {
                    Ok(decoded) if decoded.record.id == id => found = true,
                    Ok(decoded) => kept.push(decoded.record),
                    // Rows we cannot decode are preserved verbatim
                    Err(_) => undecodable.push(row.clone()),
                }
            }

            if found {
                let mut content = codec::render_partition(&kept);
                for row in undecodable {
                    content.push_str(&row);
                    content.push('\n');
                }
                self.io.write(year, &content).await?;
            } else {
                tracing::warn!("session {id} missing from partition {year} on disk");
            }
        }

        self.sessions.write().await.retain(|r| r.id != id);
        self.touch().await;
        self.bus.publish(ChangeEvent::SessionChanged { id });
        Ok(())
    }

    /// Persists an in-memory replacement of one record, rewriting only
    /// the partitions whose membership changed (one, or two when the
    /// start date crossed a year boundary).
    async fn persist_replacement(&self, id: Uuid, replacement: SessionRecord) -> Result<()> {
        let current = self.sessions.read().await.clone();
        let existing = current
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| TempoError::not_found("session", id.to_string()))?;

        let mut affected = BTreeSet::new();
        affected.insert(existing.partition_year());
        affected.insert(replacement.partition_year());

        let mut next: Vec<SessionRecord> = current.into_iter().filter(|r| r.id != id).collect();
        next.push(replacement);
        next.sort_by(|a, b| b.started_at.cmp(&a.started_at));

        for year in affected {
            let subset: Vec<SessionRecord> = next
                .iter()
                .filter(|r| r.partition_year() == year)
                .cloned()
                .collect();
            // An emptied partition keeps its header-only file
            self.io
                .write(year, &codec::render_partition(&subset))
                .await?;
        }

        *self.sessions.write().await = next;
        self.touch().await;
        self.bus.publish(ChangeEvent::SessionChanged { id });
        Ok(())
    }

    // ========================================================================
    // Integrity
    // ========================================================================

    /// Runs the consistency checks over the loaded set.
    ///
    /// Intended to run once after the first load at process start, but
    /// safe to invoke at any time.
    pub async fn run_integrity_check(
        &self,
        known_projects: Option<&HashSet<String>>,
    ) -> Vec<integrity::Finding> {
        integrity::check(&self.sessions().await, known_projects)
    }

    /// Normalizes repairable inconsistencies and persists the result.
    ///
    /// Returns the repairs performed; an already-consistent set performs
    /// none and touches no file.
    pub async fn auto_repair_issues(&self) -> Result<Vec<integrity::Repair>> {
        let _gate = self.gate.lock().await;
        let mut records = self.sessions.read().await.clone();
        let (repairs, years) = integrity::repair(&mut records);
        if repairs.is_empty() {
            return Ok(repairs);
        }

        for year in years {
            let subset: Vec<SessionRecord> = records
                .iter()
                .filter(|r| r.partition_year() == year)
                .cloned()
                .collect();
            self.io
                .write(year, &codec::render_partition(&subset))
                .await?;
        }

        *self.sessions.write().await = records;
        self.touch().await;
        for repair in &repairs {
            self.bus.publish(ChangeEvent::SessionChanged {
                id: repair.record_id(),
            });
        }
        tracing::info!("auto-repair performed {} normalization(s)", repairs.len());
        Ok(repairs)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// A copy of the in-memory set, newest first.
    pub async fn sessions(&self) -> Vec<SessionRecord> {
        self.sessions.read().await.clone()
    }

    /// Looks up one record by identifier in the in-memory set.
    pub async fn find(&self, id: Uuid) -> Option<SessionRecord> {
        self.sessions.read().await.iter().find(|r| r.id == id).cloned()
    }

    /// When the store last persisted a mutation, if ever.
    pub async fn last_modified(&self) -> Option<NaiveDateTime> {
        *self.last_modified.read().await
    }

    async fn touch(&self) {
        *self.last_modified.write().await = Some(Local::now().naive_local());
    }
}

#[async_trait]
impl SessionReader for LogStore {
    async fn snapshot(&self) -> Vec<SessionRecord> {
        self.sessions().await
    }
}
