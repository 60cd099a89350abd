//! Session domain: records, the active-session projection, update
//! requests, and change events.

pub mod event;
pub mod model;
pub mod update;

pub use event::ChangeEvent;
pub use model::{
    format_timestamp, parse_timestamp, ActiveSession, EndSessionRequest, SessionRecord,
    TIMESTAMP_FORMAT,
};
pub use update::{SessionEdit, SessionUpdate};
