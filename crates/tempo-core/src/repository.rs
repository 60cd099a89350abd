//! Read-side seam between the log store and application services.

use crate::session::model::SessionRecord;
use async_trait::async_trait;

/// Read access to the authoritative in-memory session set.
///
/// Application services (statistics, export) depend on this trait rather
/// than on the concrete log store, so they can be tested against an
/// in-memory fake.
#[async_trait]
pub trait SessionReader: Send + Sync {
    /// A point-in-time copy of the full session set, newest first.
    async fn snapshot(&self) -> Vec<SessionRecord>;
}
