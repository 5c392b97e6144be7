//! Event history: querying the journal for audit and review.
//!
//! Every state transition leaves an event behind, so the journal is
//! the authoritative answer to "what happened to this case". The
//! history layer adds time-window queries, per-case timelines, and
//! aggregate counts over the raw journal.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use super::types::CaseEvent;
use crate::store::{EventJournal, StoreResult};

/// Read-side view over the event journal.
pub struct EventHistory {
    journal: Arc<dyn EventJournal>,
}

impl EventHistory {
    pub fn new(journal: Arc<dyn EventJournal>) -> Self {
        Self { journal }
    }

    /// Get all events in a time range, oldest first.
    pub async fn get_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<CaseEvent>> {
        let events = self.journal.events_between(start, end).await?;
        debug!(count = events.len(), "retrieved events from history");
        Ok(events)
    }

    /// Get events from the `minutes` before `now`.
    pub async fn get_recent_events(
        &self,
        minutes: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<CaseEvent>> {
        self.get_events(now - Duration::minutes(minutes), now).await
    }

    /// Full timeline for one case, oldest first.
    pub async fn get_case_events(&self, case_id: &str) -> StoreResult<Vec<CaseEvent>> {
        self.journal.events_for_case(case_id).await
    }

    /// Drop events older than `cutoff` to bound journal growth.
    pub async fn prune_before(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let count = self.journal.prune_events_before(cutoff).await?;
        info!(count, cutoff = %cutoff, "pruned old events");
        Ok(count)
    }

    /// Aggregate counts for a time range.
    pub async fn get_stats(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<EventStats> {
        let events = self.get_events(start, end).await?;
        Ok(EventStats::from_events(&events))
    }
}

/// Aggregate statistics for events
#[derive(Debug, Default, serde::Serialize)]
pub struct EventStats {
    pub total_events: usize,
    pub events_by_type: HashMap<String, usize>,
    pub unique_cases: usize,
    pub dispatches: usize,
    pub acceptances: usize,
    pub rejections: usize,
    pub timeouts: usize,
    pub escalations: usize,
    pub overrides: usize,
}

impl EventStats {
    pub fn from_events(events: &[CaseEvent]) -> Self {
        let mut stats = Self::default();
        let mut cases = HashSet::new();

        for event in events {
            stats.total_events += 1;

            let event_type = event.event_type().to_string();
            *stats.events_by_type.entry(event_type).or_insert(0) += 1;

            cases.insert(event.case_id().to_string());

            match event {
                CaseEvent::HospitalNotified { .. } => stats.dispatches += 1,
                CaseEvent::ResponseRecorded { accepted, .. } => {
                    if *accepted {
                        stats.acceptances += 1;
                    } else {
                        stats.rejections += 1;
                    }
                }
                CaseEvent::NotificationExpired { .. } => stats.timeouts += 1,
                CaseEvent::EscalationRaised { .. } => stats.escalations += 1,
                CaseEvent::OverrideConfirmed { .. } => stats.overrides += 1,
                _ => {}
            }
        }

        stats.unique_cases = cases.len();

        stats
    }
}
