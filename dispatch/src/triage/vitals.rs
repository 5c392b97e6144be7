//! Vital-sign snapshot and lenient field intake.
//!
//! Every field is independently nullable: paramedics report what they can
//! measure, and absence of a reading is never treated as a reading of zero.
//! Intake from the field is messy JSON where numerics arrive as numbers or
//! as free text with units ("92%", "118 bpm"); anything that cannot be
//! parsed becomes `None`.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// First numeric token in a free-text reading, e.g. "92%" or "118 bpm".
static NUMERIC_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").unwrap());

/// AVPU consciousness scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consciousness {
    /// Fully alert.
    Alert,
    /// Responds to verbal stimulus.
    RespondsToVerbal,
    /// Responds only to painful stimulus.
    RespondsToPain,
    /// No response.
    Unresponsive,
}

impl std::fmt::Display for Consciousness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alert => write!(f, "alert"),
            Self::RespondsToVerbal => write!(f, "responds_to_verbal"),
            Self::RespondsToPain => write!(f, "responds_to_pain"),
            Self::Unresponsive => write!(f, "unresponsive"),
        }
    }
}

/// Observed breathing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreathingStatus {
    /// Unremarkable breathing.
    Normal,
    /// Breathing with visible effort.
    Labored,
    /// No spontaneous breathing.
    NotBreathing,
}

impl std::fmt::Display for BreathingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Labored => write!(f, "labored"),
            Self::NotBreathing => write!(f, "not_breathing"),
        }
    }
}

/// Reported external bleeding severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BleedingSeverity {
    /// No visible bleeding.
    None,
    /// Controlled or minor bleeding.
    Mild,
    /// Uncontrolled or major bleeding.
    Severe,
}

impl std::fmt::Display for BleedingSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Mild => write!(f, "mild"),
            Self::Severe => write!(f, "severe"),
        }
    }
}

/// One vital-sign snapshot as reported from the field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VitalSigns {
    /// Heart rate in beats per minute.
    pub heart_rate: Option<f64>,
    /// Peripheral oxygen saturation, percent.
    pub spo2: Option<f64>,
    /// Respiratory rate in breaths per minute.
    pub respiratory_rate: Option<f64>,
    /// Systolic blood pressure in mmHg.
    pub systolic_bp: Option<f64>,
    /// AVPU consciousness level.
    pub consciousness: Option<Consciousness>,
    /// Breathing status.
    pub breathing: Option<BreathingStatus>,
    /// Bleeding severity.
    pub bleeding: Option<BleedingSeverity>,
    /// Whether CPR is in progress.
    pub cpr_in_progress: Option<bool>,
    /// Burned body-surface area, percent.
    pub burns_percentage: Option<f64>,
}

impl VitalSigns {
    /// Whether no vital sign at all is present.
    ///
    /// An explicit `cpr_in_progress: false` still counts as a reading.
    pub fn is_empty(&self) -> bool {
        self.heart_rate.is_none()
            && self.spo2.is_none()
            && self.respiratory_rate.is_none()
            && self.systolic_bp.is_none()
            && self.consciousness.is_none()
            && self.breathing.is_none()
            && self.bleeding.is_none()
            && self.cpr_in_progress.is_none()
            && self.burns_percentage.is_none()
    }

    /// Build a snapshot from field-reported JSON.
    ///
    /// Accepts snake_case and camelCase keys plus a few common shorthands.
    /// Numeric fields take numbers or unit-bearing strings; unparseable
    /// values are absent, never zero.
    pub fn from_json(value: &Value) -> Self {
        let obj = match value.as_object() {
            Some(obj) => obj,
            None => return Self::default(),
        };

        let field = |names: &[&str]| names.iter().find_map(|n| obj.get(*n));

        Self {
            heart_rate: field(&["heart_rate", "heartRate", "hr"]).and_then(numeric_from_value),
            spo2: field(&["spo2", "spO2", "oxygen_saturation"]).and_then(numeric_from_value),
            respiratory_rate: field(&["respiratory_rate", "respiratoryRate", "rr"])
                .and_then(numeric_from_value),
            systolic_bp: field(&["systolic_bp", "systolicBP", "bp_systolic"])
                .and_then(numeric_from_value),
            consciousness: field(&["consciousness", "avpu"]).and_then(consciousness_from_value),
            breathing: field(&["breathing", "breathing_status"]).and_then(breathing_from_value),
            bleeding: field(&["bleeding", "bleeding_severity"]).and_then(bleeding_from_value),
            cpr_in_progress: field(&["cpr_in_progress", "cprInProgress", "cpr"])
                .and_then(bool_from_value),
            burns_percentage: field(&["burns_percentage", "burnsPercentage", "burns"])
                .and_then(numeric_from_value),
        }
    }

    // ── builders used by tests and the CLI ──

    pub fn with_heart_rate(mut self, bpm: f64) -> Self {
        self.heart_rate = Some(bpm);
        self
    }

    pub fn with_spo2(mut self, percent: f64) -> Self {
        self.spo2 = Some(percent);
        self
    }

    pub fn with_respiratory_rate(mut self, rate: f64) -> Self {
        self.respiratory_rate = Some(rate);
        self
    }

    pub fn with_systolic_bp(mut self, mmhg: f64) -> Self {
        self.systolic_bp = Some(mmhg);
        self
    }

    pub fn with_consciousness(mut self, level: Consciousness) -> Self {
        self.consciousness = Some(level);
        self
    }

    pub fn with_breathing(mut self, status: BreathingStatus) -> Self {
        self.breathing = Some(status);
        self
    }

    pub fn with_bleeding(mut self, severity: BleedingSeverity) -> Self {
        self.bleeding = Some(severity);
        self
    }

    pub fn with_cpr(mut self, in_progress: bool) -> Self {
        self.cpr_in_progress = Some(in_progress);
        self
    }

    pub fn with_burns(mut self, percent: f64) -> Self {
        self.burns_percentage = Some(percent);
        self
    }
}

/// Extract a numeric reading from a JSON value.
fn numeric_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => NUMERIC_TOKEN
            .find(s)
            .and_then(|m| m.as_str().parse().ok()),
        _ => None,
    }
}

fn consciousness_from_value(value: &Value) -> Option<Consciousness> {
    match value.as_str()?.trim().to_lowercase().as_str() {
        "alert" | "a" => Some(Consciousness::Alert),
        "responds_to_verbal" | "verbal" | "voice" | "v" => Some(Consciousness::RespondsToVerbal),
        "responds_to_pain" | "pain" | "p" => Some(Consciousness::RespondsToPain),
        "unresponsive" | "u" => Some(Consciousness::Unresponsive),
        _ => None,
    }
}

fn breathing_from_value(value: &Value) -> Option<BreathingStatus> {
    match value.as_str()?.trim().to_lowercase().as_str() {
        "normal" => Some(BreathingStatus::Normal),
        "labored" | "laboured" => Some(BreathingStatus::Labored),
        "not_breathing" | "absent" | "apneic" => Some(BreathingStatus::NotBreathing),
        _ => None,
    }
}

fn bleeding_from_value(value: &Value) -> Option<BleedingSeverity> {
    match value.as_str()?.trim().to_lowercase().as_str() {
        "none" => Some(BleedingSeverity::None),
        "mild" | "minor" | "controlled" => Some(BleedingSeverity::Mild),
        "severe" | "major" | "uncontrolled" => Some(BleedingSeverity::Severe),
        _ => None,
    }
}

fn bool_from_value(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" => Some(true),
            "false" | "no" | "n" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
