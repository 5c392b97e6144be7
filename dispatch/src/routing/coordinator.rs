//! Dispatch coordinator - the write path for every case.
//!
//! Couples the pure lifecycle operations in [`engine`] to storage, the
//! event stream, and hospital alerting. Each method loads a case,
//! applies one transition, saves under the version it loaded, and
//! publishes the matching event. A concurrent save shows up as a
//! version conflict; response recording re-reads and re-applies, since
//! a hospital's answer must never be dropped because a sweep touched
//! the case first.
//!
//! The coordinator never reads the wall clock. Callers pass `now` in,
//! which is also what lets the timeout tests run on a frozen clock.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::future;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{DispatchError, DispatchResult};
use crate::events::{CaseEvent, SharedEventBus};
use crate::notify::{DispatchAlert, HospitalNotifier};
use crate::policy::DispatchConfig;
use crate::ranking::{rerank_with_rejection_penalty, RankedHospital};
use crate::store::{CaseStore, StoreError};
use crate::triage::{
    resolve_triage, HttpTriageClassifier, TriageClassifier, TriageResolution, TriageRuleEngine,
    VitalSigns,
};

use super::case::{Case, CaseId, EscalationReason, HospitalId, OverrideRecord};
use super::engine::{self, ExpiryOutcome, OverrideRequest, ResponseDisposition, TimeoutCheck};
use super::status::CaseStatus;

/// Shared reference to DispatchCoordinator
pub type SharedDispatchCoordinator = Arc<DispatchCoordinator>;

/// Central write path for case routing.
pub struct DispatchCoordinator {
    store: Arc<dyn CaseStore>,
    bus: SharedEventBus,
    notifier: Arc<dyn HospitalNotifier>,
    config: DispatchConfig,
    rules: TriageRuleEngine,
    classifier: Option<Arc<dyn TriageClassifier>>,
}

impl DispatchCoordinator {
    /// Create a coordinator. The AI classifier is attached only when
    /// the config names an endpoint.
    pub fn new(
        store: Arc<dyn CaseStore>,
        bus: SharedEventBus,
        notifier: Arc<dyn HospitalNotifier>,
        config: DispatchConfig,
    ) -> Self {
        let rules = TriageRuleEngine::new(config.triage.clone());
        let classifier = HttpTriageClassifier::from_config(&config.ai)
            .map(|c| Arc::new(c) as Arc<dyn TriageClassifier>);
        Self {
            store,
            bus,
            notifier,
            config,
            rules,
            classifier,
        }
    }

    /// Replace the classifier, e.g. with a scripted one in tests.
    pub fn with_classifier(mut self, classifier: Arc<dyn TriageClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Create a shared reference to this coordinator
    pub fn shared(self) -> SharedDispatchCoordinator {
        Arc::new(self)
    }

    // =========================================================================
    // Case intake
    // =========================================================================

    /// Register a new incident.
    pub async fn create_case(&self, now: DateTime<Utc>) -> DispatchResult<Case> {
        let mut case = Case::new(now);
        self.store.insert(&mut case).await?;

        self.publish_event(CaseEvent::CaseCreated {
            case_id: case.id.clone(),
            timestamp: now,
        })
        .await;

        info!(case_id = %case.id, "case created");
        Ok(case)
    }

    /// Run the triage pipeline and record its outcome on the case.
    ///
    /// An insufficient-data outcome leaves the case in `Created`, so
    /// triage can run again once readings arrive.
    pub async fn triage_case(
        &self,
        case_id: &str,
        vitals: &VitalSigns,
        now: DateTime<Utc>,
    ) -> DispatchResult<TriageResolution> {
        let mut case = self.store.load(case_id).await?;
        let expected = case.version;

        let resolution = resolve_triage(self.classifier.as_deref(), &self.rules, vitals).await;
        engine::record_triage(&mut case, &resolution.outcome, now)?;
        self.store.save(&mut case, expected).await?;

        let assessment = resolution.assessment();
        self.publish_event(CaseEvent::TriageCompleted {
            case_id: case.id.clone(),
            acuity_level: assessment.map(|a| a.level.acuity()),
            confidence: assessment.map(|a| a.confidence),
            source: resolution.source,
            degraded: resolution.degraded,
            timestamp: now,
        })
        .await;

        info!(
            case_id,
            source = %resolution.source,
            degraded = resolution.degraded,
            "triage recorded"
        );
        Ok(resolution)
    }

    // =========================================================================
    // Routing protocol
    // =========================================================================

    /// Notify the chosen hospital and open its response window.
    ///
    /// The transition is persisted before the alert goes out. A failed
    /// delivery is reported to the caller, but the case stays in
    /// `AwaitingResponse`: the window is already open and the timeout
    /// sweep escalates it if nobody ever answers.
    pub async fn dispatch_case(
        &self,
        case_id: &str,
        candidate: &RankedHospital,
        now: DateTime<Utc>,
    ) -> DispatchResult<DispatchAlert> {
        let mut case = self.store.load(case_id).await?;
        let expected = case.version;

        let notification = engine::dispatch(
            &mut case,
            &candidate.hospital_id,
            &candidate.name,
            candidate.score,
            now,
        )?;
        self.store.save(&mut case, expected).await?;

        self.publish_event(CaseEvent::HospitalNotified {
            case_id: case.id.clone(),
            hospital_id: notification.hospital_id.clone(),
            hospital_name: notification.hospital_name.clone(),
            score: notification.score,
            timestamp: now,
        })
        .await;

        let thresholds = self.config.escalation.thresholds(case.acuity_level);
        let alert = DispatchAlert {
            case_id: case.id.clone(),
            hospital_id: notification.hospital_id.clone(),
            hospital_name: notification.hospital_name.clone(),
            acuity_level: case.acuity_level,
            score: notification.score,
            sent_at: now,
            respond_by: now + Duration::seconds(thresholds.timeout_seconds),
            summary: case.summary(),
        };

        if let Err(e) = self.notifier.deliver(&alert).await {
            warn!(
                case_id = %case.id,
                hospital_id = %alert.hospital_id,
                "alert delivery failed: {e}"
            );
            return Err(DispatchError::notify(
                alert.hospital_id.clone(),
                e.to_string(),
            ));
        }

        info!(
            case_id = %case.id,
            hospital = %alert.hospital_name,
            respond_by = %alert.respond_by,
            "hospital notified"
        );
        Ok(alert)
    }

    /// Record a hospital's accept/reject answer.
    ///
    /// Retries on version conflict by re-reading the case and
    /// re-applying the response, up to the configured attempt limit.
    pub async fn record_hospital_response(
        &self,
        case_id: &str,
        hospital_id: &str,
        accepted: bool,
        now: DateTime<Utc>,
    ) -> DispatchResult<ResponseDisposition> {
        let attempts = self.config.max_save_retries.max(1);

        for attempt in 1..=attempts {
            let mut case = self.store.load(case_id).await?;
            let expected = case.version;

            let disposition = engine::record_response(
                &mut case,
                hospital_id,
                accepted,
                &self.config.escalation,
                now,
            )?;

            match self.store.save(&mut case, expected).await {
                Ok(()) => {
                    self.publish_event(CaseEvent::ResponseRecorded {
                        case_id: case.id.clone(),
                        hospital_id: hospital_id.to_string(),
                        accepted,
                        rejection_count: case.rejection_count,
                        timestamp: now,
                    })
                    .await;

                    if let ResponseDisposition::Escalated(reason) = disposition {
                        self.publish_escalation(&case.id, reason, case.rejection_count, now)
                            .await;
                    }

                    info!(case_id, hospital_id, accepted, attempt, "hospital response recorded");
                    return Ok(disposition);
                }
                Err(StoreError::VersionConflict {
                    expected: want,
                    actual: have,
                    ..
                }) => {
                    warn!(
                        case_id,
                        attempt,
                        expected = want,
                        actual = have,
                        "version conflict, re-reading case"
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(DispatchError::RetriesExhausted {
            case_id: case_id.to_string(),
            attempts,
        })
    }

    /// Expire an unanswered response window and escalate the case.
    pub async fn expire_case(
        &self,
        case_id: &str,
        now: DateTime<Utc>,
    ) -> DispatchResult<ExpiryOutcome> {
        let mut case = self.store.load(case_id).await?;
        let expected = case.version;

        let outcome = engine::expire(&mut case, &self.config.escalation, now)?;
        self.store.save(&mut case, expected).await?;

        self.publish_event(CaseEvent::NotificationExpired {
            case_id: case.id.clone(),
            hospital_id: outcome.hospital_id.clone(),
            waited_seconds: outcome.waited_seconds,
            timestamp: now,
        })
        .await;
        self.publish_escalation(&case.id, outcome.reason, case.rejection_count, now)
            .await;

        warn!(
            case_id,
            hospital_id = %outcome.hospital_id,
            waited_seconds = outcome.waited_seconds,
            reason = %outcome.reason,
            "notification expired, case escalated"
        );
        Ok(outcome)
    }

    /// Expire every open case whose response window has closed.
    ///
    /// The per-case deadline check is pure; only the cases actually due
    /// are touched. Expiries run concurrently, each under its own
    /// version check.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> DispatchResult<SweepReport> {
        let open = self.store.list_open().await?;
        let checked = open.len();

        let due: Vec<CaseId> = open
            .iter()
            .filter(|case| {
                engine::check_timeout(case, &self.config.escalation, now)
                    .map(|check| check.expired)
                    .unwrap_or(false)
            })
            .map(|case| case.id.clone())
            .collect();

        let results = future::join_all(due.iter().map(|id| self.expire_case(id, now))).await;

        let mut report = SweepReport {
            checked,
            ..SweepReport::default()
        };
        for (case_id, result) in due.into_iter().zip(results) {
            match result {
                Ok(_) => report.expired.push(case_id),
                Err(e) => {
                    warn!(case_id = %case_id, "sweep expiry failed: {e}");
                    report.failed.push(case_id);
                }
            }
        }

        if !report.expired.is_empty() {
            info!(
                checked = report.checked,
                expired = report.expired.len(),
                "timeout sweep complete"
            );
        }
        Ok(report)
    }

    /// Confirm a dispatcher's manual destination for an escalated case.
    ///
    /// The audit record is written before the case transition commits.
    /// If the save then fails, the case is still `EscalationRequired`
    /// and the call can be retried; the already-written record for the
    /// same destination and actor is reused on that retry. Losing the
    /// record after the transition committed would be unrecoverable,
    /// since the state machine refuses a second override.
    pub async fn confirm_override(
        &self,
        case_id: &str,
        request: &OverrideRequest,
        now: DateTime<Utc>,
    ) -> DispatchResult<OverrideRecord> {
        let mut case = self.store.load(case_id).await?;
        let expected = case.version;

        let record = engine::confirm_override(&mut case, request, now)?;
        match self.store.record_override(&record).await {
            Ok(()) => {}
            Err(StoreError::OverrideExists { .. }) => {
                // A prior attempt wrote the record but lost the version
                // race on the save. Finishing that commit is fine; a
                // record for a different destination is a real duplicate.
                let prior = self.store.get_override(case_id).await?;
                let resumable = prior.is_some_and(|p| {
                    p.new_hospital_id == record.new_hospital_id && p.actor == record.actor
                });
                if !resumable {
                    return Err(DispatchError::DuplicateOverride {
                        case_id: case_id.to_string(),
                    });
                }
            }
            Err(e) => return Err(e.into()),
        }
        self.store.save(&mut case, expected).await?;

        self.publish_event(CaseEvent::OverrideConfirmed {
            case_id: case.id.clone(),
            hospital_id: record.new_hospital_id.clone(),
            score_delta: record.score_delta,
            actor: record.actor.clone(),
            timestamp: now,
        })
        .await;

        info!(
            case_id,
            hospital_id = %record.new_hospital_id,
            actor = %record.actor,
            "dispatcher override confirmed"
        );
        Ok(record)
    }

    /// Mark the ambulance enroute to the settled hospital.
    pub async fn mark_enroute(&self, case_id: &str, now: DateTime<Utc>) -> DispatchResult<Case> {
        let mut case = self.store.load(case_id).await?;
        let expected = case.version;
        engine::mark_enroute(&mut case, now)?;
        self.store.save(&mut case, expected).await?;
        info!(case_id, "unit enroute");
        Ok(case)
    }

    /// Close out a delivered case.
    pub async fn complete_case(&self, case_id: &str, now: DateTime<Utc>) -> DispatchResult<Case> {
        let mut case = self.store.load(case_id).await?;
        let expected = case.version;
        engine::mark_completed(&mut case, now)?;
        self.store.save(&mut case, expected).await?;

        self.publish_event(CaseEvent::CaseClosed {
            case_id: case.id.clone(),
            hospital_id: case.assigned_hospital_id.clone(),
            timestamp: now,
        })
        .await;

        info!(case_id, "case completed");
        Ok(case)
    }

    // =========================================================================
    // Read side
    // =========================================================================

    /// Re-rank candidates against the case's notification history.
    pub async fn rank_candidates(
        &self,
        case_id: &str,
        candidates: &[RankedHospital],
    ) -> DispatchResult<Vec<RankedHospital>> {
        let case = self.store.load(case_id).await?;
        Ok(rerank_with_rejection_penalty(
            candidates,
            &case.notifications,
            &self.config.ranking,
        ))
    }

    /// Load a case as-is.
    pub async fn get_case(&self, case_id: &str) -> DispatchResult<Case> {
        Ok(self.store.load(case_id).await?)
    }

    /// All cases not yet completed, oldest first.
    pub async fn list_open_cases(&self) -> DispatchResult<Vec<Case>> {
        Ok(self.store.list_open().await?)
    }

    /// Point-in-time view of a case, including its running deadline.
    pub async fn snapshot(
        &self,
        case_id: &str,
        now: DateTime<Utc>,
    ) -> DispatchResult<CaseSnapshot> {
        let case = self.store.load(case_id).await?;
        let timeout = engine::check_timeout(&case, &self.config.escalation, now);
        Ok(CaseSnapshot::from_case(&case, timeout))
    }

    async fn publish_escalation(
        &self,
        case_id: &str,
        reason: EscalationReason,
        rejection_count: u32,
        now: DateTime<Utc>,
    ) {
        self.publish_event(CaseEvent::EscalationRaised {
            case_id: case_id.to_string(),
            reason,
            rejection_count,
            timestamp: now,
        })
        .await;
    }

    /// Publish after the case save has committed. The store holds the
    /// authoritative state at this point, so a failed journal write or
    /// broadcast does not unwind the operation; it is logged for the
    /// operator instead.
    async fn publish_event(&self, event: CaseEvent) {
        let event_type = event.event_type();
        let case_id = event.case_id().to_string();
        if let Err(e) = self.bus.publish(event).await {
            warn!(event_type, case_id = %case_id, "event publish failed: {e}");
        }
    }
}

/// Result of one timeout sweep.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SweepReport {
    /// Open cases examined.
    pub checked: usize,
    /// Cases expired and escalated by this sweep.
    pub expired: Vec<CaseId>,
    /// Cases whose expiry failed; they stay open for the next sweep.
    pub failed: Vec<CaseId>,
}

/// Point-in-time case view for operators.
#[derive(Debug, Clone, Serialize)]
pub struct CaseSnapshot {
    pub case_id: CaseId,
    pub status: CaseStatus,
    pub acuity_level: Option<u8>,
    pub rejection_count: u32,
    pub notifications: usize,
    /// Hospital currently holding an open response window.
    pub pending_hospital: Option<HospitalId>,
    /// Hospital routing settled on, once decided.
    pub assigned_hospital: Option<HospitalId>,
    pub escalation_reason: Option<EscalationReason>,
    /// Running response window, when one is open.
    pub timeout: Option<TimeoutCheck>,
    pub version: u64,
}

impl CaseSnapshot {
    fn from_case(case: &Case, timeout: Option<TimeoutCheck>) -> Self {
        Self {
            case_id: case.id.clone(),
            status: case.status,
            acuity_level: case.acuity_level,
            rejection_count: case.rejection_count,
            notifications: case.notifications.len(),
            pending_hospital: case
                .pending_notification()
                .map(|n| n.hospital_id.clone()),
            assigned_hospital: case.assigned_hospital_id.clone(),
            escalation_reason: case.escalation_reason,
            timeout,
            version: case.version,
        }
    }
}
