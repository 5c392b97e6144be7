//! Patient triage: vitals parsing, the deterministic rule cascade, and
//! the optional AI classifier in front of it.
//!
//! # Pipeline
//!
//! ```text
//! field report ──▶ VitalSigns::from_json ──▶ resolve_triage
//!                                               │
//!                              classifier ok ───┤─── classifier absent,
//!                              (validated)      │    errored, timed out,
//!                                               │    or malformed
//!                                               ▼
//!                                        TriageRuleEngine
//! ```
//!
//! Both paths end in a [`TriageOutcome`]; an all-null snapshot yields
//! `InsufficientData` rather than a default tier.

pub mod ai;
pub mod rules;
pub mod vitals;

// Re-export core types
pub use ai::{
    resolve_triage, AiAssessment, AiTriageError, HttpTriageClassifier, TriageClassifier,
    TriageResolution, TriageSource,
};
pub use rules::{TriageAssessment, TriageLevel, TriageOutcome, TriageRuleEngine};
pub use vitals::{BleedingSeverity, BreathingStatus, Consciousness, VitalSigns};
