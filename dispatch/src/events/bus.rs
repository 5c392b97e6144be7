//! Pub/sub distribution of case events.
//!
//! Tokio broadcast channels fan events out to live subscribers (UI
//! feeds, the CLI follower) while an optional journal keeps the
//! durable record. Persistence happens before broadcast; a journal
//! write failure fails the publish, a missing subscriber does not.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::types::CaseEvent;
use crate::store::EventJournal;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Error type for event bus operations
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("failed to persist event: {0}")]
    PersistFailed(String),
}

/// Result type for event bus operations
pub type EventBusResult<T> = Result<T, EventBusError>;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Event bus with broadcast channels and optional journaling
pub struct EventBus {
    sender: broadcast::Sender<CaseEvent>,
    journal: Option<Arc<dyn EventJournal>>,
}

impl EventBus {
    /// Create a new event bus without persistence
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            journal: None,
        }
    }

    /// Create an event bus that journals every published event
    pub fn with_journal(journal: Arc<dyn EventJournal>) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            journal: Some(journal),
        }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event: journal first, then broadcast.
    pub async fn publish(&self, event: CaseEvent) -> EventBusResult<()> {
        let event_type = event.event_type();

        if let Some(journal) = &self.journal {
            if let Err(e) = journal.append_event(&event).await {
                warn!(event_type, "failed to journal event: {e}");
                return Err(EventBusError::PersistFailed(e.to_string()));
            }
            debug!(event_type, case_id = event.case_id(), "event journaled");
        }

        // No receivers is fine, the journal already has the event.
        match self.sender.send(event) {
            Ok(count) => {
                debug!(event_type, receivers = count, "event published");
            }
            Err(_) => {
                debug!(event_type, "event published (no receivers)");
            }
        }
        Ok(())
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<CaseEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event filter for selective subscription
pub struct EventFilter {
    /// Filter by case ID
    pub case_id: Option<String>,
    /// Filter by hospital ID
    pub hospital_id: Option<String>,
    /// Filter by event types
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a new empty filter (matches all events)
    pub fn new() -> Self {
        Self {
            case_id: None,
            hospital_id: None,
            event_types: None,
        }
    }

    /// Filter by case ID
    pub fn case(mut self, case_id: &str) -> Self {
        self.case_id = Some(case_id.to_string());
        self
    }

    /// Filter by hospital ID
    pub fn hospital(mut self, hospital_id: &str) -> Self {
        self.hospital_id = Some(hospital_id.to_string());
        self
    }

    /// Filter by event types
    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    /// Check if an event matches this filter.
    ///
    /// Events that carry no hospital at all pass a hospital filter;
    /// only a differing hospital is excluded.
    pub fn matches(&self, event: &CaseEvent) -> bool {
        if let Some(ref cid) = self.case_id {
            if event.case_id() != cid {
                return false;
            }
        }

        if let Some(ref hid) = self.hospital_id {
            if let Some(event_hid) = event.hospital_id() {
                if event_hid != hid {
                    return false;
                }
            }
        }

        if let Some(ref types) = self.event_types {
            if !types.contains(&event.event_type().to_string()) {
                return false;
            }
        }

        true
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Filtered event receiver that only yields matching events
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<CaseEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    /// Create a new filtered receiver
    pub fn new(receiver: broadcast::Receiver<CaseEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<CaseEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

/// Extension trait for subscribing with filters
pub trait EventBusExt {
    /// Subscribe with a filter
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver;
}

impl EventBusExt for EventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

impl EventBusExt for SharedEventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Utc;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        let event = CaseEvent::CaseCreated {
            case_id: "case-1".to_string(),
            timestamp: Utc::now(),
        };

        bus.publish(event.clone()).await.unwrap();

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.event_type(), "case_created");
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new().shared();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        let event = CaseEvent::EscalationRaised {
            case_id: "case-1".to_string(),
            reason: crate::routing::EscalationReason::Timeout,
            rejection_count: 0,
            timestamp: Utc::now(),
        };

        bus.publish(event).await.unwrap();

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();

        assert_eq!(e1.event_type(), e2.event_type());
    }

    #[tokio::test]
    async fn test_publish_appends_to_journal() {
        let journal = Arc::new(MemoryStore::new());
        let bus = EventBus::with_journal(journal.clone());

        bus.publish(CaseEvent::CaseCreated {
            case_id: "case-7".to_string(),
            timestamp: Utc::now(),
        })
        .await
        .unwrap();

        use crate::store::EventJournal;
        let recorded = journal.events_for_case("case-7").await.unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].event_type(), "case_created");
    }

    #[test]
    fn test_event_filter() {
        let filter = EventFilter::new()
            .case("case-1")
            .types(vec!["case_created", "hospital_notified"]);

        let matching = CaseEvent::HospitalNotified {
            case_id: "case-1".to_string(),
            hospital_id: "hosp-a".to_string(),
            hospital_name: "General".to_string(),
            score: 88.0,
            timestamp: Utc::now(),
        };

        let wrong_case = CaseEvent::CaseCreated {
            case_id: "case-2".to_string(),
            timestamp: Utc::now(),
        };

        let wrong_type = CaseEvent::CaseClosed {
            case_id: "case-1".to_string(),
            hospital_id: None,
            timestamp: Utc::now(),
        };

        assert!(filter.matches(&matching));
        assert!(!filter.matches(&wrong_case));
        assert!(!filter.matches(&wrong_type));
    }

    #[test]
    fn test_hospital_filter_passes_hospital_free_events() {
        let filter = EventFilter::new().hospital("hosp-a");

        let no_hospital = CaseEvent::CaseCreated {
            case_id: "case-1".to_string(),
            timestamp: Utc::now(),
        };
        let other_hospital = CaseEvent::HospitalNotified {
            case_id: "case-1".to_string(),
            hospital_id: "hosp-b".to_string(),
            hospital_name: "Mercy".to_string(),
            score: 70.0,
            timestamp: Utc::now(),
        };

        assert!(filter.matches(&no_hospital));
        assert!(!filter.matches(&other_hospital));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let bus = EventBus::new();
        let filter = EventFilter::new().case("target-case");
        let mut filtered = bus.subscribe_filtered(filter);

        let bus_clone = bus;
        tokio::spawn(async move {
            bus_clone
                .publish(CaseEvent::CaseCreated {
                    case_id: "other-case".to_string(),
                    timestamp: Utc::now(),
                })
                .await
                .unwrap();

            bus_clone
                .publish(CaseEvent::CaseCreated {
                    case_id: "target-case".to_string(),
                    timestamp: Utc::now(),
                })
                .await
                .unwrap();
        });

        let event = filtered.recv().await.unwrap();
        assert_eq!(event.case_id(), "target-case");
    }
}
