//! Ambulance dispatch routing core
//!
//! This library decides where an emergency case goes and keeps an
//! auditable record of every decision along the way:
//! - Deterministic vital-sign triage, with an optional AI classifier in
//!   front of it and the rule cascade as the always-available fallback
//! - A guarded case lifecycle from intake through patient handoff, with
//!   acuity-scaled rejection limits and response deadlines
//! - Rejection-aware hospital re-ranking for dispatcher review after an
//!   escalation
//! - An event journal and live event stream for dashboards and
//!   post-incident review
//!
//! # Usage
//!
//! ```bash
//! # Triage a vitals snapshot from the command line
//! dispatch triage --vitals '{"spo2": 80}'
//!
//! # Show the escalation thresholds per acuity level
//! dispatch thresholds
//!
//! # Run a scripted dispatch scenario against the in-memory store
//! dispatch simulate --acuity 4
//! ```
//!
//! Time never comes from the wall clock inside this crate: every
//! deadline decision takes `now` as an argument, so replay and tests
//! are exact.

pub mod error;
pub mod events;
pub mod notify;
pub mod policy;
pub mod ranking;
pub mod routing;
pub mod store;
pub mod triage;

// Re-export key routing types
pub use routing::{
    Case, CaseId, CaseSnapshot, CaseStatus, DispatchCoordinator, EscalationReason, ExpiryOutcome,
    HospitalId, Notification, NotificationOutcome, OverrideRecord, OverrideRequest,
    ResponseDisposition, SharedDispatchCoordinator, SweepReport, TimeoutCheck,
};

// Re-export key triage types
pub use triage::{
    resolve_triage, AiTriageError, HttpTriageClassifier, TriageAssessment, TriageClassifier,
    TriageLevel, TriageOutcome, TriageResolution, TriageRuleEngine, TriageSource, VitalSigns,
};

// Re-export key policy types
pub use policy::{
    AiTriageConfig, DispatchConfig, EscalationPolicy, EscalationThreshold, RankingPolicy,
    TriagePolicy,
};

// Re-export key store types
pub use store::{CaseStore, EventJournal, MemoryStore, StoreError, StoreResult};
#[cfg(feature = "heavy-state")]
pub use store::RocksCaseStore;

// Re-export key event types
pub use events::{
    CaseEvent, EventBus, EventBusExt, EventFilter, EventHistory, EventStats, FilteredReceiver,
    SharedEventBus,
};

// Re-export ranking types
pub use ranking::{least_risk_recommendation, rerank_with_rejection_penalty, RankedHospital};

// Re-export notification types
pub use notify::{DispatchAlert, HospitalNotifier, LoggingNotifier, RecordingNotifier};

// Re-export error types
pub use error::{DispatchError, DispatchResult};
