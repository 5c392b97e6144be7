//! Deterministic vital-sign triage.
//!
//! Rules are evaluated as an ordered cascade from most to least severe;
//! the first tier with any matching criterion wins, so a patient is never
//! downgraded by a later, milder rule. Missing readings simply skip the
//! rules that need them.

use serde::{Deserialize, Serialize};

use crate::policy::TriagePolicy;
use crate::triage::vitals::{BleedingSeverity, BreathingStatus, Consciousness, VitalSigns};

/// Acuity tier assigned by triage, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageLevel {
    /// Tier 1: life-threatening, immediate intervention.
    Immediate,
    /// Tier 2: critical, rapid intervention.
    Critical,
    /// Tier 3: urgent, prompt care.
    Urgent,
    /// Tier 4: delayed, stable for transport queueing.
    Delayed,
    /// Tier 5: minor. Never produced by the rule cascade; reserved for
    /// upstream classifiers that grade walk-in-level complaints.
    Minor,
}

impl TriageLevel {
    /// Numeric acuity, 1 (most severe) through 5.
    pub fn acuity(&self) -> u8 {
        match self {
            Self::Immediate => 1,
            Self::Critical => 2,
            Self::Urgent => 3,
            Self::Delayed => 4,
            Self::Minor => 5,
        }
    }

    /// Map a numeric acuity back to a level.
    pub fn from_acuity(acuity: u8) -> Option<Self> {
        match acuity {
            1 => Some(Self::Immediate),
            2 => Some(Self::Critical),
            3 => Some(Self::Urgent),
            4 => Some(Self::Delayed),
            5 => Some(Self::Minor),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Critical => "critical",
            Self::Urgent => "urgent",
            Self::Delayed => "delayed",
            Self::Minor => "minor",
        }
    }

    /// Parse a severity label, case-insensitively.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "immediate" => Some(Self::Immediate),
            "critical" => Some(Self::Critical),
            "urgent" => Some(Self::Urgent),
            "delayed" => Some(Self::Delayed),
            "minor" => Some(Self::Minor),
            _ => None,
        }
    }
}

impl std::fmt::Display for TriageLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A completed classification: the tier, how sure the engine is, and
/// which criteria fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageAssessment {
    pub level: TriageLevel,
    /// Fixed per-tier confidence from [`TriagePolicy`].
    pub confidence: f64,
    /// Stable tokens for each criterion that matched, e.g. `spo2_below_85`.
    pub flags: Vec<String>,
}

impl TriageAssessment {
    /// Human-readable one-liner for logs and the CLI.
    pub fn summary(&self) -> String {
        if self.flags.is_empty() {
            format!("{} (no threshold crossed)", self.level)
        } else {
            format!("{} ({})", self.level, self.flags.join(", "))
        }
    }
}

/// Result of running the cascade over one snapshot.
///
/// An all-null snapshot is a first-class outcome, not an error: the
/// caller decides whether to wait for readings or fall back to manual
/// grading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TriageOutcome {
    Classified(TriageAssessment),
    InsufficientData,
}

impl TriageOutcome {
    pub fn assessment(&self) -> Option<&TriageAssessment> {
        match self {
            Self::Classified(assessment) => Some(assessment),
            Self::InsufficientData => None,
        }
    }

    pub fn is_insufficient(&self) -> bool {
        matches!(self, Self::InsufficientData)
    }
}

/// The rule cascade. Holds the confidence table; all thresholds are
/// fixed clinical cutoffs.
#[derive(Debug, Clone, Default)]
pub struct TriageRuleEngine {
    policy: TriagePolicy,
}

impl TriageRuleEngine {
    pub fn new(policy: TriagePolicy) -> Self {
        Self { policy }
    }

    /// Classify one snapshot.
    ///
    /// CPR in progress short-circuits every other rule. Otherwise each
    /// tier is checked in severity order and the first tier with any
    /// matching criterion is assigned, carrying every flag that matched
    /// within that tier.
    pub fn classify(&self, vitals: &VitalSigns) -> TriageOutcome {
        if vitals.is_empty() {
            return TriageOutcome::InsufficientData;
        }

        if vitals.cpr_in_progress == Some(true) {
            return self.classified(TriageLevel::Immediate, vec!["cpr_in_progress".to_string()]);
        }

        let flags = immediate_flags(vitals);
        if !flags.is_empty() {
            return self.classified(TriageLevel::Immediate, flags);
        }

        let flags = critical_flags(vitals);
        if !flags.is_empty() {
            return self.classified(TriageLevel::Critical, flags);
        }

        let flags = urgent_flags(vitals);
        if !flags.is_empty() {
            return self.classified(TriageLevel::Urgent, flags);
        }

        self.classified(TriageLevel::Delayed, vec![])
    }

    fn classified(&self, level: TriageLevel, flags: Vec<String>) -> TriageOutcome {
        TriageOutcome::Classified(TriageAssessment {
            level,
            confidence: self.policy.confidence_for(level.acuity()),
            flags,
        })
    }
}

/// Tier 1: immediately life-threatening findings.
fn immediate_flags(vitals: &VitalSigns) -> Vec<String> {
    let mut flags = Vec::new();

    if matches!(vitals.spo2, Some(spo2) if spo2 < 85.0) {
        flags.push("spo2_below_85".to_string());
    }
    if matches!(vitals.systolic_bp, Some(bp) if bp < 90.0) {
        flags.push("systolic_bp_below_90".to_string());
    }
    if vitals.consciousness == Some(Consciousness::Unresponsive) {
        flags.push("unresponsive".to_string());
    }
    if vitals.breathing == Some(BreathingStatus::NotBreathing) {
        flags.push("not_breathing".to_string());
    }

    flags
}

/// Tier 2: critical derangements.
fn critical_flags(vitals: &VitalSigns) -> Vec<String> {
    let mut flags = Vec::new();

    if matches!(vitals.heart_rate, Some(hr) if hr > 130.0) {
        flags.push("heart_rate_above_130".to_string());
    }
    if matches!(vitals.heart_rate, Some(hr) if hr < 50.0) {
        flags.push("heart_rate_below_50".to_string());
    }
    if matches!(vitals.respiratory_rate, Some(rr) if rr > 30.0) {
        flags.push("respiratory_rate_above_30".to_string());
    }
    if matches!(vitals.spo2, Some(spo2) if spo2 < 92.0) {
        flags.push("spo2_below_92".to_string());
    }
    if vitals.consciousness == Some(Consciousness::RespondsToPain) {
        flags.push("responds_to_pain_only".to_string());
    }
    if vitals.bleeding == Some(BleedingSeverity::Severe) {
        flags.push("severe_bleeding".to_string());
    }
    if matches!(vitals.burns_percentage, Some(burns) if burns > 30.0) {
        flags.push("burns_above_30_percent".to_string());
    }

    flags
}

/// Tier 3: abnormal but not critical findings.
fn urgent_flags(vitals: &VitalSigns) -> Vec<String> {
    let mut flags = Vec::new();

    if matches!(vitals.heart_rate, Some(hr) if !(60.0..=100.0).contains(&hr)) {
        flags.push("heart_rate_outside_60_100".to_string());
    }
    if matches!(vitals.respiratory_rate, Some(rr) if !(12.0..=20.0).contains(&rr)) {
        flags.push("respiratory_rate_outside_12_20".to_string());
    }
    if matches!(vitals.spo2, Some(spo2) if spo2 < 95.0) {
        flags.push("spo2_below_95".to_string());
    }
    if vitals.consciousness == Some(Consciousness::RespondsToVerbal) {
        flags.push("responds_to_verbal_only".to_string());
    }
    if vitals.bleeding == Some(BleedingSeverity::Mild) {
        flags.push("mild_bleeding".to_string());
    }

    flags
}
