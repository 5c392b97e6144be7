//! RocksDB-backed case store for deployments that survive restarts.
//!
//! Column families separate cases, override records, and the event
//! journal. Values are stored as JSON so an operator can inspect a live
//! store with standard tools. Event keys embed a zero-padded timestamp,
//! which makes a forward range scan read the journal in chronological
//! order.

use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use serde::{de::DeserializeOwned, Serialize};

use super::schema::{self, ALL_CFS};
use super::{CaseStore, EventJournal, StoreError, StoreResult};
use crate::events::types::CaseEvent;
use crate::routing::case::{Case, OverrideRecord};

/// RocksDB-backed persistent case store
pub struct RocksCaseStore {
    db: RwLock<DB>,
    path: PathBuf,
}

impl RocksCaseStore {
    /// Open or create a store at the given path
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, &path, cf_descriptors)?;

        Ok(Self {
            db: RwLock::new(db),
            path,
        })
    }

    /// Get the database path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    // =========================================================================
    // Generic operations
    // =========================================================================

    fn put<T: Serialize>(&self, cf_name: &str, key: &str, value: &T) -> StoreResult<()> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf_name.to_string()))?;

        let bytes =
            serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))?;

        db.put_cf(&cf, key.as_bytes(), bytes)?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, cf_name: &str, key: &str) -> StoreResult<Option<T>> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf_name.to_string()))?;

        match db.get_cf(&cf, key.as_bytes())? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn scan_cases(&self) -> StoreResult<Vec<Case>> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = db
            .cf_handle(schema::CF_CASES)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(schema::CF_CASES.to_string()))?;

        let mut cases = Vec::new();
        for result in db.prefix_iterator_cf(&cf, b"case:") {
            let (key, value) = result?;
            if !key.starts_with(b"case:") {
                break;
            }
            let case: Case = serde_json::from_slice(&value)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            cases.push(case);
        }
        Ok(cases)
    }

    fn scan_events(&self, start_nanos: i64, end_nanos: i64) -> StoreResult<Vec<CaseEvent>> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = db
            .cf_handle(schema::CF_EVENTS)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(schema::CF_EVENTS.to_string()))?;

        let start_key = schema::keys::event(start_nanos, "");
        let iter = db.iterator_cf(
            &cf,
            rocksdb::IteratorMode::From(start_key.as_bytes(), rocksdb::Direction::Forward),
        );

        let mut events = Vec::new();
        for result in iter {
            let (key, value) = result?;
            let key_str = String::from_utf8(key.to_vec())
                .map_err(|e| StoreError::Serialization(e.to_string()))?;

            if let Some(ts) = schema::keys::parse_event_timestamp(&key_str) {
                if ts > end_nanos {
                    break;
                }
                let event: CaseEvent = serde_json::from_slice(&value)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                events.push(event);
            }
        }

        Ok(events)
    }
}

#[async_trait]
impl CaseStore for RocksCaseStore {
    async fn insert(&self, case: &mut Case) -> StoreResult<()> {
        let key = schema::keys::case(&case.id);
        let db = self.db.write().map_err(|_| StoreError::LockPoisoned)?;
        let cf = db
            .cf_handle(schema::CF_CASES)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(schema::CF_CASES.to_string()))?;

        if db.get_cf(&cf, key.as_bytes())?.is_some() {
            return Err(StoreError::AlreadyExists {
                case_id: case.id.clone(),
            });
        }

        case.version = 1;
        let bytes =
            serde_json::to_vec(case).map_err(|e| StoreError::Serialization(e.to_string()))?;
        db.put_cf(&cf, key.as_bytes(), bytes)?;
        Ok(())
    }

    async fn load(&self, case_id: &str) -> StoreResult<Case> {
        self.get(schema::CF_CASES, &schema::keys::case(case_id))?
            .ok_or_else(|| StoreError::NotFound {
                case_id: case_id.to_string(),
            })
    }

    async fn save(&self, case: &mut Case, expected_version: u64) -> StoreResult<()> {
        let key = schema::keys::case(&case.id);
        let db = self.db.write().map_err(|_| StoreError::LockPoisoned)?;
        let cf = db
            .cf_handle(schema::CF_CASES)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(schema::CF_CASES.to_string()))?;

        let stored: Case = match db.get_cf(&cf, key.as_bytes())? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            None => {
                return Err(StoreError::NotFound {
                    case_id: case.id.clone(),
                })
            }
        };

        if stored.version != expected_version {
            return Err(StoreError::VersionConflict {
                case_id: case.id.clone(),
                expected: expected_version,
                actual: stored.version,
            });
        }

        case.version = expected_version + 1;
        let bytes =
            serde_json::to_vec(case).map_err(|e| StoreError::Serialization(e.to_string()))?;
        db.put_cf(&cf, key.as_bytes(), bytes)?;
        Ok(())
    }

    async fn list_open(&self) -> StoreResult<Vec<Case>> {
        let mut cases: Vec<Case> = self
            .scan_cases()?
            .into_iter()
            .filter(|c| !c.status.is_terminal())
            .collect();
        cases.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(cases)
    }

    async fn record_override(&self, record: &OverrideRecord) -> StoreResult<()> {
        let key = schema::keys::case_override(&record.case_id);
        let db = self.db.write().map_err(|_| StoreError::LockPoisoned)?;
        let cf = db
            .cf_handle(schema::CF_OVERRIDES)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(schema::CF_OVERRIDES.to_string()))?;

        if db.get_cf(&cf, key.as_bytes())?.is_some() {
            return Err(StoreError::OverrideExists {
                case_id: record.case_id.clone(),
            });
        }

        let bytes =
            serde_json::to_vec(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
        db.put_cf(&cf, key.as_bytes(), bytes)?;
        Ok(())
    }

    async fn get_override(&self, case_id: &str) -> StoreResult<Option<OverrideRecord>> {
        self.get(schema::CF_OVERRIDES, &schema::keys::case_override(case_id))
    }
}

#[async_trait]
impl EventJournal for RocksCaseStore {
    async fn append_event(&self, event: &CaseEvent) -> StoreResult<()> {
        let timestamp_nanos = event.timestamp().timestamp_nanos_opt().unwrap_or(0);
        let key = schema::keys::event(timestamp_nanos, &CaseEvent::new_id());
        self.put(schema::CF_EVENTS, &key, event)
    }

    async fn events_for_case(&self, case_id: &str) -> StoreResult<Vec<CaseEvent>> {
        Ok(self
            .scan_events(0, i64::MAX)?
            .into_iter()
            .filter(|e| e.case_id() == case_id)
            .collect())
    }

    async fn events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<CaseEvent>> {
        let start_nanos = start.timestamp_nanos_opt().unwrap_or(0);
        let end_nanos = end.timestamp_nanos_opt().unwrap_or(i64::MAX);
        self.scan_events(start_nanos, end_nanos)
    }

    async fn prune_events_before(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let cutoff_nanos = cutoff.timestamp_nanos_opt().unwrap_or(0);

        let db = self.db.write().map_err(|_| StoreError::LockPoisoned)?;
        let cf = db
            .cf_handle(schema::CF_EVENTS)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(schema::CF_EVENTS.to_string()))?;

        let mut keys_to_delete = Vec::new();
        for result in db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
            let (key, _) = result?;
            let key_str = String::from_utf8(key.to_vec())
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            match schema::keys::parse_event_timestamp(&key_str) {
                Some(ts) if ts < cutoff_nanos => keys_to_delete.push(key),
                Some(_) => break,
                None => continue,
            }
        }

        let count = keys_to_delete.len();
        for key in keys_to_delete {
            db.delete_cf(&cf, key)?;
        }
        Ok(count)
    }
}
