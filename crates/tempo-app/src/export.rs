//! Session export.
//!
//! A pure read-side transform: a set of records becomes a file in one of
//! three formats. The storage engine is not involved beyond reusing the
//! record codec for the csv flavor.

use std::path::{Path, PathBuf};

use chrono::Local;
use tempo_core::session::model::{format_timestamp, SessionRecord};
use tempo_core::{Result, TempoError};
use tempo_storage::codec;

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Text,
    Markdown,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Text => "txt",
            Self::Markdown => "md",
        }
    }

    /// Parses a user-supplied format name.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "text" | "txt" => Ok(Self::Text),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(TempoError::invalid_field(
                "format",
                format!("unsupported export format '{other}'"),
            )),
        }
    }
}

/// Writes the given records to a timestamped file under `dir`.
pub async fn export_sessions(
    records: &[SessionRecord],
    format: ExportFormat,
    dir: &Path,
) -> Result<PathBuf> {
    let content = match format {
        ExportFormat::Csv => codec::render_partition(records),
        ExportFormat::Text => render_text(records),
        ExportFormat::Markdown => render_markdown(records),
    };

    let name = format!(
        "sessions-export-{}.{}",
        Local::now().format("%Y%m%d-%H%M%S"),
        format.extension()
    );
    let path = dir.join(name);

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|err| TempoError::persistence(format!("create export dir: {err}")))?;
    tokio::fs::write(&path, content)
        .await
        .map_err(|err| TempoError::persistence(format!("write export: {err}")))?;

    tracing::info!("exported {} session(s) to {}", records.len(), path.display());
    Ok(path)
}

fn render_text(records: &[SessionRecord]) -> String {
    let mut out = String::new();
    for record in records {
        out.push_str(&format!(
            "{}  {:>5} min  {}",
            format_timestamp(record.started_at),
            record.duration_minutes(),
            record.project_id,
        ));
        if record.is_milestone {
            out.push_str("  [milestone]");
        }
        if let Some(action) = &record.action {
            out.push_str(&format!("  {action}"));
        }
        if !record.notes.is_empty() {
            out.push_str(&format!("  -- {}", record.notes.replace('\n', " ")));
        }
        out.push('\n');
    }
    out
}

fn render_markdown(records: &[SessionRecord]) -> String {
    let mut out = String::from(
        "| Start | End | Project | Minutes | Mood | Milestone | Notes |\n\
         |---|---|---|---|---|---|---|\n",
    );
    for record in records {
        let mood = record.mood.map(|m| m.to_string()).unwrap_or_default();
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} |\n",
            format_timestamp(record.started_at),
            format_timestamp(record.ended_at),
            md_escape(&record.project_id),
            record.duration_minutes(),
            mood,
            if record.is_milestone { "yes" } else { "" },
            md_escape(&record.notes),
        ));
    }
    out
}

fn md_escape(raw: &str) -> String {
    raw.replace('|', "\\|").replace('\n', " ")
}
