//! Policy values for triage, escalation, and ranking.
//!
//! Everything here is configuration, not algorithm: the escalation threshold
//! table, the per-tier triage confidence constants, and the rejection penalty
//! factor are policy-tunable numbers. The pure functions elsewhere take these
//! structs as parameters and never read globals, so a policy change is a
//! config change.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Response-deadline and rejection-tolerance limits for one acuity tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EscalationThreshold {
    /// Rejections tolerated before escalation is forced.
    pub max_rejections: u32,
    /// Seconds a notified hospital has to respond.
    pub timeout_seconds: i64,
}

/// The acuity-keyed escalation threshold table.
///
/// More acute tiers get shorter timeouts and fewer rejection chances, since
/// delay is more dangerous. Lookups for unknown or out-of-range acuity fall
/// back to the immediate tier: when the system does not know how urgent a
/// case is, it must assume the worst.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationPolicy {
    /// Acuity 1.
    pub immediate: EscalationThreshold,
    /// Acuity 2.
    pub critical: EscalationThreshold,
    /// Acuity 3.
    pub urgent: EscalationThreshold,
    /// Acuity 4.
    pub delayed: EscalationThreshold,
    /// Acuity 5.
    pub minor: EscalationThreshold,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            immediate: EscalationThreshold {
                max_rejections: 1,
                timeout_seconds: 30,
            },
            critical: EscalationThreshold {
                max_rejections: 2,
                timeout_seconds: 60,
            },
            urgent: EscalationThreshold {
                max_rejections: 2,
                timeout_seconds: 90,
            },
            delayed: EscalationThreshold {
                max_rejections: 3,
                timeout_seconds: 120,
            },
            minor: EscalationThreshold {
                max_rejections: 3,
                timeout_seconds: 180,
            },
        }
    }
}

impl EscalationPolicy {
    /// Look up the thresholds for an acuity level.
    ///
    /// `None` and anything outside 1 to 5 clamp to the immediate tier.
    pub fn thresholds(&self, acuity: Option<u8>) -> EscalationThreshold {
        match acuity {
            Some(1) => self.immediate,
            Some(2) => self.critical,
            Some(3) => self.urgent,
            Some(4) => self.delayed,
            Some(5) => self.minor,
            _ => self.immediate,
        }
    }
}

/// Fixed per-tier confidence constants for the rule engine.
///
/// These reflect rule-certainty, not statistical confidence: a tier-1 match
/// fires on an unambiguous threshold breach, a tier-4 default carries the
/// least certainty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriagePolicy {
    /// Confidence when a tier-1 (immediate) rule matches.
    pub confidence_immediate: f64,
    /// Confidence when a tier-2 (critical) rule matches.
    pub confidence_critical: f64,
    /// Confidence when a tier-3 (urgent) rule matches.
    pub confidence_urgent: f64,
    /// Confidence for the tier-4 (delayed) default.
    pub confidence_delayed: f64,
}

impl Default for TriagePolicy {
    fn default() -> Self {
        Self {
            confidence_immediate: 0.95,
            confidence_critical: 0.85,
            confidence_urgent: 0.75,
            confidence_delayed: 0.60,
        }
    }
}

impl TriagePolicy {
    /// Confidence constant for an acuity level produced by the cascade.
    pub fn confidence_for(&self, acuity: u8) -> f64 {
        match acuity {
            1 => self.confidence_immediate,
            2 => self.confidence_critical,
            3 => self.confidence_urgent,
            _ => self.confidence_delayed,
        }
    }
}

/// Ranking policy values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingPolicy {
    /// Score multiplier for hospitals that rejected or timed out.
    pub rejection_penalty_factor: f64,
}

impl Default for RankingPolicy {
    fn default() -> Self {
        Self {
            rejection_penalty_factor: 0.85,
        }
    }
}

/// Endpoint configuration for the optional AI triage collaborator.
///
/// `url = None` disables the AI path entirely; the rule engine is then the
/// sole classifier rather than a fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiTriageConfig {
    /// Classifier endpoint. Absent means rule-engine-only operation.
    pub url: Option<String>,
    /// Model name passed through to the endpoint.
    pub model: String,
    /// Request timeout before the pipeline falls back.
    pub timeout_seconds: u64,
}

impl Default for AiTriageConfig {
    fn default() -> Self {
        Self {
            url: None,
            model: "triage-v1".to_string(),
            timeout_seconds: 10,
        }
    }
}

impl AiTriageConfig {
    /// Apply environment overrides on top of the current values.
    ///
    /// `DISPATCH_AI_URL`, `DISPATCH_AI_MODEL`, and
    /// `DISPATCH_AI_TIMEOUT_SECS` take precedence over file config.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// The override logic behind [`apply_env`](Self::apply_env), with the
    /// variable source injected so it can be tested without touching
    /// process-global state.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("DISPATCH_AI_URL") {
            if !url.is_empty() {
                self.url = Some(url);
            }
        }
        if let Some(model) = lookup("DISPATCH_AI_MODEL") {
            if !model.is_empty() {
                self.model = model;
            }
        }
        if let Some(secs) = lookup("DISPATCH_AI_TIMEOUT_SECS") {
            if let Ok(parsed) = secs.parse() {
                self.timeout_seconds = parsed;
            }
        }
    }
}

/// Aggregate configuration for the dispatch core.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Escalation threshold table.
    pub escalation: EscalationPolicy,
    /// Triage confidence constants.
    pub triage: TriagePolicy,
    /// Ranking penalty values.
    pub ranking: RankingPolicy,
    /// AI triage endpoint.
    pub ai: AiTriageConfig,
    /// Attempts per transition when the store reports a version conflict.
    pub max_save_retries: u32,
}

impl DispatchConfig {
    /// Load config from a TOML file. Missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read {}", path.display()))?;
        let config: DispatchConfig =
            toml::from_str(&content).context("Failed to parse dispatch config TOML")?;
        Ok(config)
    }

    /// Load from an optional file path, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        if config.max_save_retries == 0 {
            config.max_save_retries = 3;
        }
        config.ai.apply_env();
        Ok(config)
    }
}
