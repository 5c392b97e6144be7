//! Event types for the case lifecycle
//!
//! These events drive the pub/sub system and are persisted for audit
//! and replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::routing::case::{CaseId, EscalationReason, HospitalId};
use crate::triage::TriageSource;

/// Unique identifier for events
pub type EventId = String;

/// All case lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CaseEvent {
    /// A new case was opened
    CaseCreated {
        case_id: CaseId,
        timestamp: DateTime<Utc>,
    },

    /// Triage finished for a case
    ///
    /// `acuity_level` is `None` when the snapshot had no usable readings.
    TriageCompleted {
        case_id: CaseId,
        acuity_level: Option<u8>,
        confidence: Option<f64>,
        source: TriageSource,
        degraded: bool,
        timestamp: DateTime<Utc>,
    },

    /// A hospital was notified and a response window opened
    HospitalNotified {
        case_id: CaseId,
        hospital_id: HospitalId,
        hospital_name: String,
        score: f64,
        timestamp: DateTime<Utc>,
    },

    /// A hospital answered inside its response window
    ResponseRecorded {
        case_id: CaseId,
        hospital_id: HospitalId,
        accepted: bool,
        rejection_count: u32,
        timestamp: DateTime<Utc>,
    },

    /// A response window closed with no answer
    NotificationExpired {
        case_id: CaseId,
        hospital_id: HospitalId,
        waited_seconds: i64,
        timestamp: DateTime<Utc>,
    },

    /// The case crossed its escalation threshold
    EscalationRaised {
        case_id: CaseId,
        reason: EscalationReason,
        rejection_count: u32,
        timestamp: DateTime<Utc>,
    },

    /// A dispatcher manually selected the destination
    OverrideConfirmed {
        case_id: CaseId,
        hospital_id: HospitalId,
        score_delta: f64,
        actor: String,
        timestamp: DateTime<Utc>,
    },

    /// The case reached its terminal state
    CaseClosed {
        case_id: CaseId,
        hospital_id: Option<HospitalId>,
        timestamp: DateTime<Utc>,
    },
}

impl CaseEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            CaseEvent::CaseCreated { timestamp, .. } => *timestamp,
            CaseEvent::TriageCompleted { timestamp, .. } => *timestamp,
            CaseEvent::HospitalNotified { timestamp, .. } => *timestamp,
            CaseEvent::ResponseRecorded { timestamp, .. } => *timestamp,
            CaseEvent::NotificationExpired { timestamp, .. } => *timestamp,
            CaseEvent::EscalationRaised { timestamp, .. } => *timestamp,
            CaseEvent::OverrideConfirmed { timestamp, .. } => *timestamp,
            CaseEvent::CaseClosed { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            CaseEvent::CaseCreated { .. } => "case_created",
            CaseEvent::TriageCompleted { .. } => "triage_completed",
            CaseEvent::HospitalNotified { .. } => "hospital_notified",
            CaseEvent::ResponseRecorded { .. } => "response_recorded",
            CaseEvent::NotificationExpired { .. } => "notification_expired",
            CaseEvent::EscalationRaised { .. } => "escalation_raised",
            CaseEvent::OverrideConfirmed { .. } => "override_confirmed",
            CaseEvent::CaseClosed { .. } => "case_closed",
        }
    }

    /// Get the case this event belongs to
    pub fn case_id(&self) -> &str {
        match self {
            CaseEvent::CaseCreated { case_id, .. } => case_id,
            CaseEvent::TriageCompleted { case_id, .. } => case_id,
            CaseEvent::HospitalNotified { case_id, .. } => case_id,
            CaseEvent::ResponseRecorded { case_id, .. } => case_id,
            CaseEvent::NotificationExpired { case_id, .. } => case_id,
            CaseEvent::EscalationRaised { case_id, .. } => case_id,
            CaseEvent::OverrideConfirmed { case_id, .. } => case_id,
            CaseEvent::CaseClosed { case_id, .. } => case_id,
        }
    }

    /// Get the hospital this event concerns, if any
    pub fn hospital_id(&self) -> Option<&str> {
        match self {
            CaseEvent::HospitalNotified { hospital_id, .. } => Some(hospital_id),
            CaseEvent::ResponseRecorded { hospital_id, .. } => Some(hospital_id),
            CaseEvent::NotificationExpired { hospital_id, .. } => Some(hospital_id),
            CaseEvent::OverrideConfirmed { hospital_id, .. } => Some(hospital_id),
            CaseEvent::CaseClosed { hospital_id, .. } => hospital_id.as_deref(),
            _ => None,
        }
    }

    /// Create a new unique event ID
    pub fn new_id() -> EventId {
        uuid::Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = CaseEvent::HospitalNotified {
            case_id: "case-1".to_string(),
            hospital_id: "hosp-a".to_string(),
            hospital_name: "St. Mary's".to_string(),
            score: 87.5,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"hospital_notified\""));

        let parsed: CaseEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.event_type(), "hospital_notified");
        assert_eq!(parsed.case_id(), "case-1");
    }

    #[test]
    fn test_event_accessors() {
        let event = CaseEvent::EscalationRaised {
            case_id: "case-2".to_string(),
            reason: EscalationReason::Timeout,
            rejection_count: 1,
            timestamp: Utc::now(),
        };

        assert_eq!(event.event_type(), "escalation_raised");
        assert_eq!(event.case_id(), "case-2");
        assert_eq!(event.hospital_id(), None);

        let event = CaseEvent::ResponseRecorded {
            case_id: "case-2".to_string(),
            hospital_id: "hosp-b".to_string(),
            accepted: false,
            rejection_count: 2,
            timestamp: Utc::now(),
        };
        assert_eq!(event.hospital_id(), Some("hosp-b"));
    }

    #[test]
    fn test_insufficient_data_triage_event() {
        let event = CaseEvent::TriageCompleted {
            case_id: "case-3".to_string(),
            acuity_level: None,
            confidence: None,
            source: TriageSource::RuleEngine,
            degraded: false,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "triage_completed");
        assert!(json["acuity_level"].is_null());
    }
}
