//! Partition file I/O.
//!
//! Reads, atomically rewrites, and appends to one year's partition file.
//! A rewrite goes through a temp file in the same directory followed by a
//! rename, so the partition is always either the old complete content or
//! the new complete content, never a partial write.

use std::path::{Path, PathBuf};

use tempo_core::{Result, TempoError};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::codec::{self, ColumnLayout};
use crate::partition::{legacy_path, partition_path};

/// File-level access to the partitions inside one data directory.
#[derive(Debug, Clone)]
pub struct PartitionIo {
    dir: PathBuf,
}

impl PartitionIo {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The data directory this instance operates on.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reads a partition's raw text.
    ///
    /// Fails with `NotFound` when the partition file does not exist.
    pub async fn read(&self, year: i32) -> Result<String> {
        let path = partition_path(&self.dir, year);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(TempoError::not_found("partition", year.to_string()))
            }
            Err(err) => Err(TempoError::io(format!(
                "failed to read {}: {err}",
                path.display()
            ))),
        }
    }

    /// Reads the legacy monolithic file, if present.
    pub async fn read_legacy(&self) -> Result<Option<String>> {
        let path = legacy_path(&self.dir);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(TempoError::io(format!(
                "failed to read {}: {err}",
                path.display()
            ))),
        }
    }

    /// Atomically replaces a partition's full content.
    pub async fn write(&self, year: i32, content: &str) -> Result<()> {
        let path = partition_path(&self.dir, year);
        self.write_path(&path, content).await
    }

    async fn write_path(&self, path: &Path, content: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|err| TempoError::persistence(format!("create data dir: {err}")))?;

        let tmp = path.with_extension("csv.tmp");
        let result: std::io::Result<()> = async {
            let mut file = File::create(&tmp).await?;
            file.write_all(content.as_bytes()).await?;
            file.sync_all().await?;
            fs::rename(&tmp, path).await?;
            Ok(())
        }
        .await;

        result.map_err(|err| {
            TempoError::persistence(format!("atomic write of {}: {err}", path.display()))
        })
    }

    /// Appends one encoded record line to a partition.
    ///
    /// When the partition is missing or lacks a valid header, the file is
    /// (re)written whole with the current header, any rows it already
    /// held, and the new line. Appends need not be atomic: the log store
    /// serializes all mutations to a given partition.
    pub async fn append(&self, year: i32, line: &str) -> Result<()> {
        let path = partition_path(&self.dir, year);
        let existing = match fs::read_to_string(&path).await {
            Ok(content) => Some(content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                return Err(TempoError::persistence(format!(
                    "read before append {}: {err}",
                    path.display()
                )));
            }
        };

        let headerless = existing
            .as_deref()
            .map(|content| !content_has_header(content))
            .unwrap_or(true);

        if headerless {
            let mut content = codec::current_header();
            content.push('\n');
            for row in existing.as_deref().map(codec::split_rows).unwrap_or_default() {
                content.push_str(&row);
                content.push('\n');
            }
            content.push_str(line);
            content.push('\n');
            return self.write_path(&path, &content).await;
        }

        let existing = existing.unwrap_or_default();
        let mut chunk = String::new();
        if !existing.is_empty() && !existing.ends_with('\n') {
            chunk.push('\n');
        }
        chunk.push_str(line);
        chunk.push('\n');

        let result: std::io::Result<()> = async {
            let mut file = OpenOptions::new().append(true).open(&path).await?;
            file.write_all(chunk.as_bytes()).await?;
            file.sync_all().await?;
            Ok(())
        }
        .await;

        result.map_err(|err| {
            TempoError::persistence(format!("append to {}: {err}", path.display()))
        })
    }

    /// Whether the partition file exists.
    pub async fn exists(&self, year: i32) -> bool {
        fs::metadata(partition_path(&self.dir, year)).await.is_ok()
    }

    /// Whether the partition starts with a plausible header line.
    pub async fn has_header(&self, year: i32) -> bool {
        match self.read(year).await {
            Ok(content) => content_has_header(&content),
            Err(_) => false,
        }
    }

    /// Whether the partition holds no data rows (missing, blank, or
    /// header-only).
    pub async fn is_empty(&self, year: i32) -> bool {
        match self.read(year).await {
            Ok(content) => {
                let rows = codec::split_rows(&content);
                match rows.first() {
                    None => true,
                    Some(first) => {
                        content_has_header_row(first) && rows.len() == 1
                    }
                }
            }
            Err(_) => true,
        }
    }
}

fn content_has_header(content: &str) -> bool {
    codec::split_rows(content)
        .first()
        .map(|row| content_has_header_row(row))
        .unwrap_or(false)
}

fn content_has_header_row(row: &str) -> bool {
    ColumnLayout::from_header(row).is_plausible_header()
}
