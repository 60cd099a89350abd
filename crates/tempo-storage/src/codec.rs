//! Record codec: one session record per delimited line.
//!
//! The codec owns the on-disk schema. Decoding is header-driven: a
//! [`ColumnLayout`] built from a partition's header line maps column names
//! to positions, so partitions written under older schema versions decode
//! alongside current ones. Column names are matched case-insensitively.
//!
//! Fields containing the delimiter, a quote, or a newline are quoted with
//! doubled embedded quotes; decoding reverses this exactly.

use std::collections::HashMap;

use tempo_core::session::model::{format_timestamp, parse_timestamp, SessionRecord};
use tempo_core::{Result, TempoError};
use uuid::Uuid;

/// Column names of the current schema, in write order.
pub const CURRENT_COLUMNS: [&str; 10] = [
    "id",
    "start_date",
    "end_date",
    "project_id",
    "activity_type_id",
    "project_phase_id",
    "action",
    "is_milestone",
    "notes",
    "mood",
];

/// Legacy column superseded by `action` + `is_milestone`.
pub const LEGACY_MILESTONE_TEXT: &str = "milestone_text";

/// The header line written at the top of every partition.
pub fn current_header() -> String {
    CURRENT_COLUMNS.join(",")
}

/// Column-name-to-index map built once per partition read.
///
/// Decoding through a layout keeps old and new schema versions readable
/// without positional coupling.
#[derive(Debug, Clone)]
pub struct ColumnLayout {
    index: HashMap<String, usize>,
}

impl ColumnLayout {
    /// Builds a layout from a raw header line.
    pub fn from_header(header: &str) -> Self {
        let mut index = HashMap::new();
        for (i, name) in split_fields(header).iter().enumerate() {
            // First occurrence wins on duplicate column names
            index.entry(name.trim().to_ascii_lowercase()).or_insert(i);
        }
        Self { index }
    }

    /// The layout of the current schema.
    pub fn current() -> Self {
        Self::from_header(&current_header())
    }

    /// Position of a column, matched by name.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Whether the layout contains a column.
    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Whether this looks like a session header at all.
    ///
    /// Used to distinguish a real header from a file whose first line is
    /// already data.
    pub fn is_plausible_header(&self) -> bool {
        self.has("start_date") && self.has("project_id")
    }

    /// Whether the layout matches the current schema exactly.
    ///
    /// Anything else (missing columns, leftover legacy columns) marks the
    /// partition for rewrite on first load.
    pub fn is_current(&self) -> bool {
        self.index.len() == CURRENT_COLUMNS.len() && CURRENT_COLUMNS.iter().all(|c| self.has(c))
    }
}

/// A decoded record plus whether the owning partition must be rewritten
/// to re-normalize this row (e.g. identifier backfill).
#[derive(Debug, Clone)]
pub struct DecodedRow {
    pub record: SessionRecord,
    pub needs_rewrite: bool,
}

/// Encodes a record as one line under the current schema.
pub fn encode_record(record: &SessionRecord) -> String {
    let mood = record.mood.map(|m| m.to_string()).unwrap_or_default();
    let fields = [
        record.id.to_string(),
        format_timestamp(record.started_at),
        format_timestamp(record.ended_at),
        record.project_id.clone(),
        record.activity_type_id.clone().unwrap_or_default(),
        record.project_phase_id.clone().unwrap_or_default(),
        record.action.clone().unwrap_or_default(),
        if record.is_milestone { "1" } else { "0" }.to_string(),
        record.notes.clone(),
        mood,
    ];
    fields
        .iter()
        .map(|f| escape_field(f))
        .collect::<Vec<_>>()
        .join(",")
}

/// Decodes one logical row through a partition's column layout.
///
/// A row missing its identifier gets a freshly generated one and is
/// flagged `needs_rewrite`. An unparseable start timestamp is fatal for
/// the row (the caller decides whether to skip it); every other field
/// degrades to its absent value.
pub fn decode_record(row: &str, layout: &ColumnLayout) -> Result<DecodedRow> {
    let fields = split_fields(row);
    let get = |name: &str| -> &str {
        layout
            .column(name)
            .and_then(|i| fields.get(i))
            .map(String::as_str)
            .unwrap_or("")
    };

    let mut needs_rewrite = false;

    let id = match Uuid::parse_str(get("id").trim()) {
        Ok(id) => id,
        Err(_) => {
            needs_rewrite = true;
            Uuid::new_v4()
        }
    };

    let raw_start = get("start_date");
    let started_at = parse_timestamp(raw_start).ok_or_else(|| TempoError::Serialization {
        format: "CSV".to_string(),
        message: format!("unparseable start_date '{raw_start}'"),
    })?;

    // A missing end collapses to a zero-duration session; an inverted
    // interval is preserved as-is for the integrity validator to flag.
    let ended_at = match parse_timestamp(get("end_date")) {
        Some(end) => end,
        None => {
            needs_rewrite = true;
            started_at
        }
    };

    let (action, is_milestone) = if layout.has("action") || layout.has("is_milestone") {
        (
            non_empty(get("action")),
            matches!(get("is_milestone").trim(), "1" | "true"),
        )
    } else {
        // Legacy shape: milestone_text carries both the text and the flag.
        let text = get(LEGACY_MILESTONE_TEXT).trim();
        if text.is_empty() {
            (None, false)
        } else {
            (Some(text.to_string()), true)
        }
    };

    let mood = match get("mood").trim() {
        "" => None,
        raw => match raw.parse::<u8>() {
            Ok(m) if m <= 10 => Some(m),
            _ => {
                tracing::warn!("dropping malformed mood value '{}'", raw);
                needs_rewrite = true;
                None
            }
        },
    };

    let record = SessionRecord {
        id,
        started_at,
        ended_at,
        project_id: get("project_id").to_string(),
        activity_type_id: non_empty(get("activity_type_id")),
        project_phase_id: non_empty(get("project_phase_id")),
        notes: get("notes").to_string(),
        mood,
        action,
        is_milestone,
    };

    Ok(DecodedRow {
        record,
        needs_rewrite,
    })
}

/// Renders a full partition file: header plus one line per record.
///
/// Records are written in the order given; on-disk ordering is not part
/// of the format contract.
pub fn render_partition(records: &[SessionRecord]) -> String {
    let mut content = current_header();
    content.push('\n');
    for record in records {
        content.push_str(&encode_record(record));
        content.push('\n');
    }
    content
}

/// Splits raw partition text into logical rows.
///
/// Newlines inside quoted fields do not terminate a row. Blank lines
/// (including leading ones observed in legacy data) are dropped.
pub fn split_rows(text: &str) -> Vec<String> {
    let mut rows = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in text.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '\n' if !in_quotes => {
                push_row(&mut rows, &mut current);
            }
            _ => current.push(ch),
        }
    }
    push_row(&mut rows, &mut current);
    rows
}

fn push_row(rows: &mut Vec<String>, current: &mut String) {
    let row = current.trim_end_matches('\r');
    if !row.trim().is_empty() {
        rows.push(row.to_string());
    }
    current.clear();
}

/// Splits one logical row into unescaped field values.
pub fn split_fields(row: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = row.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    // Doubled quote inside a quoted field
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

fn escape_field(field: &str) -> String {
    if field.contains(|c| matches!(c, ',' | '"' | '\n' | '\r')) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn non_empty(raw: &str) -> Option<String> {
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}
