//! Case persistence.
//!
//! Two backends share the same traits: an in-memory store for tests and
//! single-process runs, and a RocksDB store (behind the `heavy-state`
//! feature) for durable deployments. Writes are optimistic: every save
//! names the version it read, and a mismatch is a conflict for the
//! caller to resolve by re-reading.

pub mod memory;
#[cfg(feature = "heavy-state")]
pub mod rocks;
#[cfg(feature = "heavy-state")]
pub mod schema;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::events::types::CaseEvent;
use crate::routing::case::{Case, OverrideRecord};

pub use memory::MemoryStore;
#[cfg(feature = "heavy-state")]
pub use rocks::RocksCaseStore;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("case not found: {case_id}")]
    NotFound { case_id: String },

    #[error("case already exists: {case_id}")]
    AlreadyExists { case_id: String },

    #[error("version conflict on case {case_id}: expected {expected}, found {actual}")]
    VersionConflict {
        case_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("override already recorded for case {case_id}")]
    OverrideExists { case_id: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("lock poisoned")]
    LockPoisoned,

    #[cfg(feature = "heavy-state")]
    #[error("RocksDB error: {0}")]
    Backend(#[from] rocksdb::Error),

    #[cfg(feature = "heavy-state")]
    #[error("column family not found: {0}")]
    ColumnFamilyNotFound(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for cases and their override records.
#[async_trait]
pub trait CaseStore: Send + Sync {
    /// Insert a brand-new case at version 1. Fails if the id is taken.
    async fn insert(&self, case: &mut Case) -> StoreResult<()>;

    /// Load a case by id.
    async fn load(&self, case_id: &str) -> StoreResult<Case>;

    /// Persist a mutated case.
    ///
    /// `expected_version` is the version the caller read before mutating.
    /// If the stored version differs, nothing is written and
    /// [`StoreError::VersionConflict`] is returned. On success the case's
    /// version is bumped to `expected_version + 1`.
    async fn save(&self, case: &mut Case, expected_version: u64) -> StoreResult<()>;

    /// All cases not yet in a terminal state.
    async fn list_open(&self) -> StoreResult<Vec<Case>>;

    /// Record a dispatcher override. At most one per case.
    async fn record_override(&self, record: &OverrideRecord) -> StoreResult<()>;

    /// Fetch the override recorded for a case, if any.
    async fn get_override(&self, case_id: &str) -> StoreResult<Option<OverrideRecord>>;
}

/// Append-only journal of case events, kept for audit and replay.
#[async_trait]
pub trait EventJournal: Send + Sync {
    /// Append one event. Events carry their own timestamps.
    async fn append_event(&self, event: &CaseEvent) -> StoreResult<()>;

    /// All events for one case, oldest first.
    async fn events_for_case(&self, case_id: &str) -> StoreResult<Vec<CaseEvent>>;

    /// Events in a time window (inclusive bounds), oldest first.
    async fn events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<CaseEvent>>;

    /// Drop events older than the cutoff. Returns how many were removed.
    async fn prune_events_before(&self, cutoff: DateTime<Utc>) -> StoreResult<usize>;
}
