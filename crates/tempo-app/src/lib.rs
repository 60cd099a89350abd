pub mod export;
pub mod stats;

pub use crate::export::{export_sessions, ExportFormat};
pub use crate::stats::StatsCache;
