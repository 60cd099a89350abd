//! Partition locator.
//!
//! Maps a session's start timestamp to the year file that must hold it and
//! enumerates the partitions already on disk. Pure functions plus one
//! directory scan; the log store caches results per load cycle.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDateTime};
use tempo_core::Result;

/// Suffix shared by every partition file (`<year>-data.csv`).
pub const PARTITION_SUFFIX: &str = "-data.csv";

/// Pre-partitioning monolithic file, consulted only when no year
/// partitions exist.
pub const LEGACY_FILE: &str = "sessions-data.csv";

/// The year whose partition must hold a record starting at `ts`.
pub fn partition_key(ts: NaiveDateTime) -> i32 {
    ts.year()
}

/// File name of a year's partition.
pub fn partition_file_name(year: i32) -> String {
    format!("{year}{PARTITION_SUFFIX}")
}

/// Full path of a year's partition inside the data directory.
pub fn partition_path(dir: &Path, year: i32) -> PathBuf {
    dir.join(partition_file_name(year))
}

/// Full path of the legacy monolithic file.
pub fn legacy_path(dir: &Path) -> PathBuf {
    dir.join(LEGACY_FILE)
}

/// Scans the data directory for partition files and returns their years,
/// sorted ascending.
///
/// Files whose stem does not parse as a year (including the legacy
/// monolith) are ignored. A missing directory yields the empty set.
pub async fn list_partitions(dir: &Path) -> Result<BTreeSet<i32>> {
    let mut years = BTreeSet::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(years),
        Err(err) => return Err(err.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(stem) = name.strip_suffix(PARTITION_SUFFIX) {
            if let Ok(year) = stem.parse::<i32>() {
                years.insert(year);
            }
        }
    }
    Ok(years)
}

/// Restricts a partition set to the years overlapping a closed interval.
pub fn partitions_in_range(
    partitions: &BTreeSet<i32>,
    from: NaiveDateTime,
    to: NaiveDateTime,
) -> BTreeSet<i32> {
    let (lo, hi) = (from.year().min(to.year()), from.year().max(to.year()));
    partitions.range(lo..=hi).copied().collect()
}
