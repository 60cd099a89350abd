//! Migration engine.
//!
//! Detects legacy schema shapes per partition (missing identifier column,
//! missing fields, the old `milestone_text` column) and rewrites the
//! partition to the current schema exactly once. Runs lazily on first
//! load of a partition, never eagerly across all partitions.

use chrono::NaiveDateTime;
use tempo_core::session::model::SessionRecord;
use tempo_core::{Result, TempoError};

use crate::codec::{self, ColumnLayout};
use crate::partition_io::PartitionIo;

/// Result of loading one partition through the migration engine.
#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    /// Decoded records, already normalized to the current schema
    pub records: Vec<SessionRecord>,
    /// Whether the partition file was rewritten on disk
    pub rewritten: bool,
}

impl MigrationOutcome {
    fn empty() -> Self {
        Self {
            records: Vec::new(),
            rewritten: false,
        }
    }
}

/// Per-partition schema migration.
///
/// Idempotent: migrating an already-current partition decodes it without
/// touching the file.
#[derive(Debug, Clone)]
pub struct MigrationEngine {
    io: PartitionIo,
}

impl MigrationEngine {
    pub fn new(io: PartitionIo) -> Self {
        Self { io }
    }

    /// Loads a partition, migrating it to the current schema if needed.
    pub async fn migrate(&self, year: i32) -> Result<MigrationOutcome> {
        self.migrate_filtered(year, None).await
    }

    /// Loads a partition with an optional decode-time start-date filter.
    ///
    /// The filter only restricts the returned records; a rewrite always
    /// persists the full set, so filtering never loses data.
    pub async fn migrate_filtered(
        &self,
        year: i32,
        range: Option<(NaiveDateTime, NaiveDateTime)>,
    ) -> Result<MigrationOutcome> {
        let (mut records, needs_rewrite) = self.decode_partition(year).await?;

        let rewritten = if needs_rewrite {
            self.io
                .write(year, &codec::render_partition(&records))
                .await?;
            tracing::info!(
                "migrated partition {year} to current schema ({} records)",
                records.len()
            );
            true
        } else {
            false
        };

        apply_range(&mut records, range);
        Ok(MigrationOutcome { records, rewritten })
    }

    /// Decodes a partition that already went through migration this
    /// process lifetime; never touches the file.
    pub async fn load_filtered(
        &self,
        year: i32,
        range: Option<(NaiveDateTime, NaiveDateTime)>,
    ) -> Result<MigrationOutcome> {
        let (mut records, _) = self.decode_partition(year).await?;
        apply_range(&mut records, range);
        Ok(MigrationOutcome {
            records,
            rewritten: false,
        })
    }

    async fn decode_partition(&self, year: i32) -> Result<(Vec<SessionRecord>, bool)> {
        let raw = self.io.read(year).await?;
        let rows = codec::split_rows(&raw);
        let Some((header, data_rows)) = rows.split_first() else {
            return Ok((Vec::new(), false));
        };

        let layout = ColumnLayout::from_header(header);
        if !layout.is_plausible_header() {
            return Err(TempoError::Serialization {
                format: "CSV".to_string(),
                message: format!("partition {year} has no recognizable header"),
            });
        }

        let mut records = Vec::with_capacity(data_rows.len());
        let mut needs_rewrite = !layout.is_current();

        for row in data_rows {
            match codec::decode_record(row, &layout) {
                Ok(decoded) => {
                    needs_rewrite |= decoded.needs_rewrite;
                    records.push(decoded.record);
                }
                Err(err) => {
                    // Undecodable rows are skipped in memory but left on
                    // disk untouched unless another row forces a rewrite.
                    tracing::warn!("partition {year}: skipping bad row: {err}");
                }
            }
        }

        Ok((records, needs_rewrite))
    }

    /// Loads the legacy monolithic file, if present.
    ///
    /// The legacy file is read-only: it is decoded through its own header
    /// but never rewritten or deleted.
    pub async fn load_legacy(&self) -> Result<Option<Vec<SessionRecord>>> {
        let Some(raw) = self.io.read_legacy().await? else {
            return Ok(None);
        };

        let rows = codec::split_rows(&raw);
        let Some((header, data_rows)) = rows.split_first() else {
            return Ok(Some(Vec::new()));
        };

        let layout = ColumnLayout::from_header(header);
        if !layout.is_plausible_header() {
            return Err(TempoError::Serialization {
                format: "CSV".to_string(),
                message: "legacy file has no recognizable header".to_string(),
            });
        }

        let mut records = Vec::with_capacity(data_rows.len());
        for row in data_rows {
            match codec::decode_record(row, &layout) {
                Ok(decoded) => records.push(decoded.record),
                Err(err) => tracing::warn!("legacy file: skipping bad row: {err}"),
            }
        }
        Ok(Some(records))
    }
}

fn apply_range(
    records: &mut Vec<SessionRecord>,
    range: Option<(NaiveDateTime, NaiveDateTime)>,
) {
    if let Some((from, to)) = range {
        records.retain(|r| r.started_at >= from && r.started_at <= to);
    }
}
