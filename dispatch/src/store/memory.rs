//! In-memory case store.
//!
//! Backs tests and single-process runs. Same trait surface as the
//! RocksDB store, including the version check on save.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{CaseStore, EventJournal, StoreError, StoreResult};
use crate::events::types::CaseEvent;
use crate::routing::case::{Case, OverrideRecord};

/// HashMap-backed store guarded by read/write locks.
#[derive(Default)]
pub struct MemoryStore {
    cases: RwLock<HashMap<String, Case>>,
    overrides: RwLock<HashMap<String, OverrideRecord>>,
    events: RwLock<Vec<CaseEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CaseStore for MemoryStore {
    async fn insert(&self, case: &mut Case) -> StoreResult<()> {
        let mut cases = self.cases.write().map_err(|_| StoreError::LockPoisoned)?;
        if cases.contains_key(&case.id) {
            return Err(StoreError::AlreadyExists {
                case_id: case.id.clone(),
            });
        }
        case.version = 1;
        cases.insert(case.id.clone(), case.clone());
        Ok(())
    }

    async fn load(&self, case_id: &str) -> StoreResult<Case> {
        let cases = self.cases.read().map_err(|_| StoreError::LockPoisoned)?;
        cases.get(case_id).cloned().ok_or_else(|| StoreError::NotFound {
            case_id: case_id.to_string(),
        })
    }

    async fn save(&self, case: &mut Case, expected_version: u64) -> StoreResult<()> {
        let mut cases = self.cases.write().map_err(|_| StoreError::LockPoisoned)?;
        let current = cases.get(&case.id).ok_or_else(|| StoreError::NotFound {
            case_id: case.id.clone(),
        })?;

        if current.version != expected_version {
            return Err(StoreError::VersionConflict {
                case_id: case.id.clone(),
                expected: expected_version,
                actual: current.version,
            });
        }

        case.version = expected_version + 1;
        cases.insert(case.id.clone(), case.clone());
        Ok(())
    }

    async fn list_open(&self) -> StoreResult<Vec<Case>> {
        let cases = self.cases.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut open: Vec<Case> = cases
            .values()
            .filter(|c| !c.status.is_terminal())
            .cloned()
            .collect();
        open.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(open)
    }

    async fn record_override(&self, record: &OverrideRecord) -> StoreResult<()> {
        let mut overrides = self.overrides.write().map_err(|_| StoreError::LockPoisoned)?;
        if overrides.contains_key(&record.case_id) {
            return Err(StoreError::OverrideExists {
                case_id: record.case_id.clone(),
            });
        }
        overrides.insert(record.case_id.clone(), record.clone());
        Ok(())
    }

    async fn get_override(&self, case_id: &str) -> StoreResult<Option<OverrideRecord>> {
        let overrides = self.overrides.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(overrides.get(case_id).cloned())
    }
}

#[async_trait]
impl EventJournal for MemoryStore {
    async fn append_event(&self, event: &CaseEvent) -> StoreResult<()> {
        let mut events = self.events.write().map_err(|_| StoreError::LockPoisoned)?;
        events.push(event.clone());
        Ok(())
    }

    async fn events_for_case(&self, case_id: &str) -> StoreResult<Vec<CaseEvent>> {
        let events = self.events.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(events
            .iter()
            .filter(|e| e.case_id() == case_id)
            .cloned()
            .collect())
    }

    async fn events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<CaseEvent>> {
        let events = self.events.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(events
            .iter()
            .filter(|e| e.timestamp() >= start && e.timestamp() <= end)
            .cloned()
            .collect())
    }

    async fn prune_events_before(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let mut events = self.events.write().map_err(|_| StoreError::LockPoisoned)?;
        let before = events.len();
        events.retain(|e| e.timestamp() >= cutoff);
        Ok(before - events.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::status::CaseStatus;
    use chrono::Duration;

    #[tokio::test]
    async fn test_insert_and_load() {
        let store = MemoryStore::new();
        let mut case = Case::new(Utc::now());
        let id = case.id.clone();

        store.insert(&mut case).await.unwrap();
        assert_eq!(case.version, 1);

        let loaded = store.load(&id).await.unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = MemoryStore::new();
        let mut case = Case::new(Utc::now());
        store.insert(&mut case).await.unwrap();

        let mut dup = case.clone();
        let err = store.insert(&mut dup).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_save_bumps_version() {
        let store = MemoryStore::new();
        let mut case = Case::new(Utc::now());
        store.insert(&mut case).await.unwrap();

        store.save(&mut case, 1).await.unwrap();
        assert_eq!(case.version, 2);

        let loaded = store.load(&case.id).await.unwrap();
        assert_eq!(loaded.version, 2);
    }

    #[tokio::test]
    async fn test_stale_save_is_a_version_conflict() {
        let store = MemoryStore::new();
        let mut case = Case::new(Utc::now());
        store.insert(&mut case).await.unwrap();

        // Two readers pick up version 1; the first save wins.
        let mut first = store.load(&case.id).await.unwrap();
        let mut second = store.load(&case.id).await.unwrap();

        store.save(&mut first, 1).await.unwrap();

        let err = store.save(&mut second, 1).await.unwrap_err();
        match err {
            StoreError::VersionConflict {
                expected, actual, ..
            } => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            }
            other => panic!("expected a version conflict, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_case_is_not_found() {
        let store = MemoryStore::new();
        let err = store.load("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_open_skips_terminal_cases() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let mut open = Case::new(now);
        store.insert(&mut open).await.unwrap();

        let mut done = Case::new(now + Duration::seconds(1));
        done.status = CaseStatus::Completed;
        store.insert(&mut done).await.unwrap();

        let listed = store.list_open().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, open.id);
    }

    #[tokio::test]
    async fn test_override_is_single_use() {
        let store = MemoryStore::new();
        let record = OverrideRecord::new(
            "case-1",
            "hosp-a",
            90.0,
            "hosp-b",
            70.0,
            "closest trauma unit was on divert",
            "dispatcher-7",
            Utc::now(),
        );

        store.record_override(&record).await.unwrap();
        assert!(store.get_override("case-1").await.unwrap().is_some());

        let err = store.record_override(&record).await.unwrap_err();
        assert!(matches!(err, StoreError::OverrideExists { .. }));
    }

    #[tokio::test]
    async fn test_event_journal_roundtrip() {
        let store = MemoryStore::new();
        let now = Utc::now();

        store
            .append_event(&CaseEvent::CaseCreated {
                case_id: "case-1".to_string(),
                timestamp: now,
            })
            .await
            .unwrap();
        store
            .append_event(&CaseEvent::CaseCreated {
                case_id: "case-2".to_string(),
                timestamp: now + Duration::seconds(5),
            })
            .await
            .unwrap();

        let for_case = store.events_for_case("case-1").await.unwrap();
        assert_eq!(for_case.len(), 1);

        let windowed = store
            .events_between(now + Duration::seconds(1), now + Duration::seconds(10))
            .await
            .unwrap();
        assert_eq!(windowed.len(), 1);
        assert_eq!(windowed[0].case_id(), "case-2");
    }

    #[tokio::test]
    async fn test_prune_drops_only_old_events() {
        let store = MemoryStore::new();
        let now = Utc::now();

        for i in 0..4 {
            store
                .append_event(&CaseEvent::CaseCreated {
                    case_id: format!("case-{i}"),
                    timestamp: now + Duration::seconds(i),
                })
                .await
                .unwrap();
        }

        let removed = store
            .prune_events_before(now + Duration::seconds(2))
            .await
            .unwrap();
        assert_eq!(removed, 2);

        let remaining = store.events_between(now, now + Duration::hours(1)).await.unwrap();
        assert_eq!(remaining.len(), 2);
    }
}
