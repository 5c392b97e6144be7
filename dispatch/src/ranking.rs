//! Rejection-penalty re-ranking of hospital candidates.
//!
//! The suitability scores come from an external scoring engine; this
//! module only adjusts them against the case's notification history and
//! re-sorts. Re-ranking is a pure recomputation: it is never persisted,
//! and applying it to its own output yields the same list, because the
//! penalty always derives from the retained original score.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::policy::RankingPolicy;
use crate::routing::case::{HospitalId, Notification, NotificationOutcome};

/// A scored hospital candidate.
///
/// `score` holds the working (possibly penalized) value; when a penalty
/// has been applied, `original_score` keeps the pre-penalty value for
/// audit display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedHospital {
    pub hospital_id: HospitalId,
    pub name: String,
    /// Suitability score, nominally 0-100.
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_minutes: Option<f64>,
    /// Ruled out by the scoring engine (no capacity, missing capability).
    /// Disqualified candidates sort last no matter their score.
    #[serde(default)]
    pub disqualified: bool,
    #[serde(default)]
    pub rejection_penalty_applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_score: Option<f64>,
}

impl RankedHospital {
    pub fn new(hospital_id: impl Into<HospitalId>, name: impl Into<String>, score: f64) -> Self {
        Self {
            hospital_id: hospital_id.into(),
            name: name.into(),
            score,
            distance_km: None,
            eta_minutes: None,
            disqualified: false,
            rejection_penalty_applied: false,
            original_score: None,
        }
    }

    pub fn with_eta(mut self, minutes: f64) -> Self {
        self.eta_minutes = Some(minutes);
        self
    }

    pub fn with_distance(mut self, km: f64) -> Self {
        self.distance_km = Some(km);
        self
    }

    pub fn disqualified(mut self) -> Self {
        self.disqualified = true;
        self
    }

    /// Score before any penalty.
    pub fn base_score(&self) -> f64 {
        self.original_score.unwrap_or(self.score)
    }
}

/// Re-rank candidates against a case's notification history.
///
/// Hospitals that already rejected or timed out get their base score
/// multiplied by the policy's penalty factor, applied once per hospital
/// no matter how many attempts failed. Order: clean candidates first,
/// then penalized, then disqualified; within each band adjusted score
/// descending, ties broken by lower ETA (unknown ETA last), then input
/// order. A penalized hospital never outranks a clean one, even when
/// its penalized score is still higher.
pub fn rerank_with_rejection_penalty(
    candidates: &[RankedHospital],
    notifications: &[Notification],
    policy: &RankingPolicy,
) -> Vec<RankedHospital> {
    let penalized: HashSet<&str> = notifications
        .iter()
        .filter(|n| {
            matches!(
                n.outcome,
                NotificationOutcome::Rejected | NotificationOutcome::TimedOut
            )
        })
        .map(|n| n.hospital_id.as_str())
        .collect();

    let mut ranked: Vec<(usize, RankedHospital)> = candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| {
            let mut entry = candidate.clone();
            let base = entry.base_score();
            if penalized.contains(entry.hospital_id.as_str()) {
                entry.original_score = Some(base);
                entry.score = base * policy.rejection_penalty_factor;
                entry.rejection_penalty_applied = true;
            } else {
                entry.score = base;
            }
            (index, entry)
        })
        .collect();

    ranked.sort_by(|(left_index, left), (right_index, right)| {
        left.disqualified
            .cmp(&right.disqualified)
            .then_with(|| left.rejection_penalty_applied.cmp(&right.rejection_penalty_applied))
            .then_with(|| right.score.total_cmp(&left.score))
            .then_with(|| compare_eta(left.eta_minutes, right.eta_minutes))
            .then_with(|| left_index.cmp(right_index))
    });

    ranked.into_iter().map(|(_, entry)| entry).collect()
}

/// The hospital a dispatcher should try next: the best-ranked candidate
/// that is not disqualified.
pub fn least_risk_recommendation(ranked: &[RankedHospital]) -> Option<&RankedHospital> {
    ranked.iter().find(|h| !h.disqualified)
}

fn compare_eta(left: Option<f64>, right: Option<f64>) -> std::cmp::Ordering {
    match (left, right) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    }
}
