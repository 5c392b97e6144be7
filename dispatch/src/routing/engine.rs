//! Pure case lifecycle operations.
//!
//! Every operation takes the current time as a parameter, so deadline
//! behavior replays deterministically in tests and sweeps. Operations
//! mutate the case in memory and report what happened; persistence,
//! retries, and event publishing live in the coordinator.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{DispatchError, DispatchResult};
use crate::policy::EscalationPolicy;
use crate::routing::case::{
    Case, EscalationReason, HospitalId, Notification, NotificationOutcome, OverrideRecord,
};
use crate::routing::status::CaseStatus;
use crate::triage::rules::TriageOutcome;

/// What a recorded hospital response did to the case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDisposition {
    /// The hospital accepted; the case is ready to go enroute.
    Accepted,
    /// Rejected below the escalation threshold; pick the next hospital.
    ReadyForRedispatch,
    /// Rejected at or past a threshold; a dispatcher must take over.
    Escalated(EscalationReason),
}

/// Read-only view of the running response window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeoutCheck {
    /// Hospital the window is waiting on.
    pub hospital_id: HospitalId,
    /// Instant the window closes.
    pub deadline: DateTime<Utc>,
    /// Seconds until the deadline; negative once it has passed.
    pub remaining_seconds: i64,
    /// Whether the window has closed.
    pub expired: bool,
}

/// Result of expiring a notification whose window closed unanswered.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpiryOutcome {
    /// Hospital that never answered.
    pub hospital_id: HospitalId,
    /// Seconds the case waited before expiry.
    pub waited_seconds: i64,
    /// Why the case escalated. Always includes the timeout breach; also
    /// the rejection breach when the count already sat at the limit.
    pub reason: EscalationReason,
}

/// A dispatcher's manual destination choice.
#[derive(Debug, Clone)]
pub struct OverrideRequest {
    pub hospital_id: HospitalId,
    pub hospital_name: String,
    pub score: f64,
    pub reason: String,
    pub actor: String,
}

/// Apply a triage outcome to a freshly created case.
///
/// A classification assigns the acuity exactly once and moves the case to
/// `Triaged`. An insufficient-data outcome changes nothing: the case stays
/// in `Created` so triage can run again when readings arrive.
pub fn record_triage(
    case: &mut Case,
    outcome: &TriageOutcome,
    now: DateTime<Utc>,
) -> DispatchResult<()> {
    if case.status != CaseStatus::Created {
        return Err(DispatchError::invalid_transition(
            case.id.clone(),
            "record_triage",
            case.status,
            "Created",
        ));
    }

    let assessment = match outcome {
        TriageOutcome::Classified(assessment) => assessment,
        TriageOutcome::InsufficientData => return Ok(()),
    };

    if let Some(acuity) = case.acuity_level {
        return Err(DispatchError::AcuityAlreadySet {
            case_id: case.id.clone(),
            acuity,
        });
    }

    case.acuity_level = Some(assessment.level.acuity());
    let reason = format!("triage: {}", assessment.summary());
    advance_or_err(case, CaseStatus::Triaged, now, &reason)
}

/// Notify a hospital and open its response window.
///
/// Legal from `Created`, `Triaged`, or `Dispatched`. Exactly one
/// notification may be pending at a time.
pub fn dispatch(
    case: &mut Case,
    hospital_id: &str,
    hospital_name: &str,
    score: f64,
    now: DateTime<Utc>,
) -> DispatchResult<Notification> {
    if !case.status.can_dispatch() {
        return Err(DispatchError::invalid_transition(
            case.id.clone(),
            "dispatch",
            case.status,
            "Created, Triaged or Dispatched",
        ));
    }

    if let Some(pending) = case.pending_notification() {
        return Err(DispatchError::PendingNotificationExists {
            case_id: case.id.clone(),
            hospital_id: pending.hospital_id.clone(),
        });
    }

    let notification = Notification::new(hospital_id, hospital_name, score, now);
    case.append_notification(notification.clone());

    let reason = format!("notified {hospital_name}");
    advance_or_err(case, CaseStatus::AwaitingResponse, now, &reason)?;
    Ok(notification)
}

/// Record a hospital's answer to the pending notification.
///
/// Acceptance assigns the hospital and settles routing. A rejection
/// resolves the notification, bumps the rejection count, and either
/// frees the case for the next hospital or escalates it when the
/// policy's rejection limit (or, for a late answer, the time limit) has
/// been reached.
pub fn record_response(
    case: &mut Case,
    hospital_id: &str,
    accepted: bool,
    policy: &EscalationPolicy,
    now: DateTime<Utc>,
) -> DispatchResult<ResponseDisposition> {
    let case_id = case.id.clone();

    if case.status != CaseStatus::AwaitingResponse {
        return Err(DispatchError::invalid_transition(
            case_id,
            "record_response",
            case.status,
            "AwaitingResponse",
        ));
    }

    let (pending_hospital, pending_name) = match case.pending_notification() {
        Some(n) => (n.hospital_id.clone(), n.hospital_name.clone()),
        None => return Err(DispatchError::NoPendingNotification { case_id }),
    };
    if pending_hospital != hospital_id {
        return Err(DispatchError::hospital_mismatch(
            case_id,
            pending_hospital,
            hospital_id,
        ));
    }

    // Window elapsed time, captured before any transition clears the stamp.
    let elapsed = case
        .awaiting_response_since
        .map(|since| (now - since).num_seconds())
        .unwrap_or(0);

    if accepted {
        resolve_pending(case, NotificationOutcome::Accepted, now)?;
        case.assigned_hospital_id = Some(pending_hospital.clone());
        case.assigned_hospital_name = Some(pending_name);

        let reason = format!("accepted by {pending_hospital}");
        advance_or_err(case, CaseStatus::Accepted, now, &reason)?;
        return Ok(ResponseDisposition::Accepted);
    }

    resolve_pending(case, NotificationOutcome::Rejected, now)?;
    case.rejection_count += 1;

    let reason = format!("declined by {pending_hospital}");
    advance_or_err(case, CaseStatus::Rejected, now, &reason)?;

    let thresholds = policy.thresholds(case.acuity_level);
    let rejections_breached = case.rejection_count >= thresholds.max_rejections;
    let timeout_breached = elapsed >= thresholds.timeout_seconds;

    match EscalationReason::from_breaches(rejections_breached, timeout_breached) {
        Some(escalation) => {
            case.escalation_reason = Some(escalation);
            let label = escalation.to_string();
            advance_or_err(case, CaseStatus::EscalationRequired, now, &label)?;
            Ok(ResponseDisposition::Escalated(escalation))
        }
        None => {
            advance_or_err(case, CaseStatus::Dispatched, now, "awaiting redispatch")?;
            Ok(ResponseDisposition::ReadyForRedispatch)
        }
    }
}

/// Inspect the response window without touching the case.
///
/// Returns `None` when no window is running. `remaining_seconds` goes
/// negative once the deadline passes, which is useful for reporting how
/// late a sweep found the case.
pub fn check_timeout(
    case: &Case,
    policy: &EscalationPolicy,
    now: DateTime<Utc>,
) -> Option<TimeoutCheck> {
    if case.status != CaseStatus::AwaitingResponse {
        return None;
    }
    let since = case.awaiting_response_since?;
    let pending = case.pending_notification()?;

    let thresholds = policy.thresholds(case.acuity_level);
    let elapsed = (now - since).num_seconds();
    let remaining = thresholds.timeout_seconds - elapsed;

    Some(TimeoutCheck {
        hospital_id: pending.hospital_id.clone(),
        deadline: since + chrono::Duration::seconds(thresholds.timeout_seconds),
        remaining_seconds: remaining,
        expired: remaining <= 0,
    })
}

/// Close an unanswered response window and escalate the case.
///
/// Refused while the window is still open. A timeout never counts as a
/// rejection: the count is left alone, but if it already sits at the
/// policy limit the escalation reason records both breaches.
pub fn expire(
    case: &mut Case,
    policy: &EscalationPolicy,
    now: DateTime<Utc>,
) -> DispatchResult<ExpiryOutcome> {
    let case_id = case.id.clone();

    if case.status != CaseStatus::AwaitingResponse {
        return Err(DispatchError::invalid_transition(
            case_id,
            "expire",
            case.status,
            "AwaitingResponse",
        ));
    }

    let (pending_hospital, sent_at) = match case.pending_notification() {
        Some(n) => (n.hospital_id.clone(), n.sent_at),
        None => return Err(DispatchError::NoPendingNotification { case_id }),
    };

    let since = case.awaiting_response_since.unwrap_or(sent_at);
    let thresholds = policy.thresholds(case.acuity_level);
    let elapsed = (now - since).num_seconds();

    if elapsed < thresholds.timeout_seconds {
        return Err(DispatchError::DeadlineNotReached {
            case_id,
            remaining_seconds: thresholds.timeout_seconds - elapsed,
        });
    }

    resolve_pending(case, NotificationOutcome::TimedOut, now)?;

    let rejections_breached = case.rejection_count >= thresholds.max_rejections;
    let reason = EscalationReason::from_breaches(rejections_breached, true)
        .unwrap_or(EscalationReason::Timeout);
    case.escalation_reason = Some(reason);

    let label = format!("expired after {elapsed}s: {reason}");
    advance_or_err(case, CaseStatus::EscalationRequired, now, &label)?;

    Ok(ExpiryOutcome {
        hospital_id: pending_hospital,
        waited_seconds: elapsed,
        reason,
    })
}

/// Record a dispatcher's manual destination and resume the lifecycle.
///
/// Legal only from `EscalationRequired`, at most once per case. Returns
/// the audit record comparing the manual choice against the last ranked
/// attempt; the caller persists it.
pub fn confirm_override(
    case: &mut Case,
    request: &OverrideRequest,
    now: DateTime<Utc>,
) -> DispatchResult<OverrideRecord> {
    let case_id = case.id.clone();

    if case.status != CaseStatus::EscalationRequired {
        return Err(DispatchError::invalid_transition(
            case_id,
            "confirm_override",
            case.status,
            "EscalationRequired",
        ));
    }

    if case.override_used {
        return Err(DispatchError::DuplicateOverride { case_id });
    }

    let (previous_hospital, previous_score) = case
        .notifications
        .last()
        .map(|n| (n.hospital_id.clone(), n.score))
        .unwrap_or_default();

    let record = OverrideRecord::new(
        case_id,
        previous_hospital,
        previous_score,
        request.hospital_id.clone(),
        request.score,
        request.reason.clone(),
        request.actor.clone(),
        now,
    );

    case.override_used = true;
    case.assigned_hospital_id = Some(request.hospital_id.clone());
    case.assigned_hospital_name = Some(request.hospital_name.clone());

    let reason = format!("override by {}", request.actor);
    advance_or_err(case, CaseStatus::DispatcherOverride, now, &reason)?;
    Ok(record)
}

/// Mark the ambulance enroute to the assigned hospital.
pub fn mark_enroute(case: &mut Case, now: DateTime<Utc>) -> DispatchResult<()> {
    if !matches!(
        case.status,
        CaseStatus::Accepted | CaseStatus::DispatcherOverride
    ) {
        return Err(DispatchError::invalid_transition(
            case.id.clone(),
            "mark_enroute",
            case.status,
            "Accepted or DispatcherOverride",
        ));
    }
    advance_or_err(case, CaseStatus::Enroute, now, "unit enroute")
}

/// Close the case after handoff at the hospital.
pub fn mark_completed(case: &mut Case, now: DateTime<Utc>) -> DispatchResult<()> {
    if case.status != CaseStatus::Enroute {
        return Err(DispatchError::invalid_transition(
            case.id.clone(),
            "mark_completed",
            case.status,
            "Enroute",
        ));
    }
    advance_or_err(case, CaseStatus::Completed, now, "handoff complete")
}

fn advance_or_err(
    case: &mut Case,
    to: CaseStatus,
    now: DateTime<Utc>,
    reason: &str,
) -> DispatchResult<()> {
    let from = case.status;
    if case.advance(to, now, Some(reason)) {
        Ok(())
    } else {
        Err(DispatchError::forbidden_transition(case.id.clone(), from, to))
    }
}

fn resolve_pending(
    case: &mut Case,
    outcome: NotificationOutcome,
    now: DateTime<Utc>,
) -> DispatchResult<()> {
    let case_id = case.id.clone();
    let pending = case
        .pending_notification_mut()
        .ok_or_else(|| DispatchError::NoPendingNotification {
            case_id: case_id.clone(),
        })?;
    if pending.resolve(outcome, now) {
        Ok(())
    } else {
        Err(DispatchError::NoPendingNotification { case_id })
    }
}
