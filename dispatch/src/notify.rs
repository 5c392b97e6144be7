//! Hospital notification boundary.
//!
//! The core only decides that a hospital must be alerted; delivery
//! mechanics (push, SMS, portal webhook) live behind [`HospitalNotifier`].
//! A failed delivery does not roll back the case: the response window is
//! already open and the timeout sweep escalates it if nobody answers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::routing::case::{CaseId, HospitalId};

/// Everything a receiving hospital needs to act on a case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchAlert {
    pub case_id: CaseId,
    pub hospital_id: HospitalId,
    pub hospital_name: String,
    /// Acuity 1-5; `None` when the case was dispatched before triage.
    pub acuity_level: Option<u8>,
    /// Suitability score at notification time.
    pub score: f64,
    pub sent_at: DateTime<Utc>,
    /// Deadline after which the notification expires unanswered.
    pub respond_by: DateTime<Utc>,
    /// One-line case description for the alert body.
    pub summary: String,
}

/// Out-of-band alert delivery.
#[async_trait]
pub trait HospitalNotifier: Send + Sync {
    async fn deliver(&self, alert: &DispatchAlert) -> anyhow::Result<()>;
}

/// Notifier that writes alerts to the log. Default for local runs and
/// the CLI simulator.
#[derive(Debug, Default, Clone)]
pub struct LoggingNotifier;

#[async_trait]
impl HospitalNotifier for LoggingNotifier {
    async fn deliver(&self, alert: &DispatchAlert) -> anyhow::Result<()> {
        tracing::info!(
            case_id = %alert.case_id,
            hospital_id = %alert.hospital_id,
            hospital = %alert.hospital_name,
            score = alert.score,
            respond_by = %alert.respond_by,
            "hospital alert"
        );
        Ok(())
    }
}

/// Notifier that captures alerts in memory.
///
/// Used by tests and dry runs to assert on exactly what would have gone
/// out, and to simulate delivery failures.
#[derive(Default)]
pub struct RecordingNotifier {
    delivered: Mutex<Vec<DispatchAlert>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent deliveries fail until switched back.
    pub fn fail_deliveries(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Alerts delivered so far, in order.
    pub fn delivered(&self) -> Vec<DispatchAlert> {
        self.delivered
            .lock()
            .map(|alerts| alerts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl HospitalNotifier for RecordingNotifier {
    async fn deliver(&self, alert: &DispatchAlert) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("delivery channel unavailable");
        }
        if let Ok(mut alerts) = self.delivered.lock() {
            alerts.push(alert.clone());
        }
        Ok(())
    }
}
