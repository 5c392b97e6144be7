//! Persistent case model for the dispatch protocol.
//!
//! A [`Case`] is one emergency incident. It is mutated exclusively through
//! the transition functions in [`crate::routing::engine`] and persisted as a
//! versioned document; the notification history is append-only so the audit
//! trail survives every routing decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::routing::status::{is_legal_transition, CaseStatus, TransitionRecord};

/// Unique identifier for cases.
pub type CaseId = String;

/// Unique identifier for hospitals.
pub type HospitalId = String;

/// Outcome of one hospital-contact attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationOutcome {
    /// Sent, no response yet. The response deadline is running.
    Pending,
    /// Hospital accepted the case.
    Accepted,
    /// Hospital declined the case.
    Rejected,
    /// Deadline passed with no response.
    TimedOut,
}

impl NotificationOutcome {
    /// Whether the notification has reached a final outcome.
    pub fn is_resolved(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for NotificationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Accepted => write!(f, "accepted"),
            Self::Rejected => write!(f, "rejected"),
            Self::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// Why a case was escalated to a human dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// The rejection threshold for the case's acuity was reached.
    Rejections,
    /// The response deadline expired.
    Timeout,
    /// Both thresholds were breached by the time the triggering event landed.
    Both,
}

impl EscalationReason {
    /// Combine the two breach conditions into a reason.
    ///
    /// Returns `None` when neither threshold is breached. The caller checks
    /// both conditions at the moment its triggering event lands, so whichever
    /// of rejection and expiry arrives second reports `Both`.
    pub fn from_breaches(rejections: bool, timeout: bool) -> Option<Self> {
        match (rejections, timeout) {
            (true, true) => Some(Self::Both),
            (true, false) => Some(Self::Rejections),
            (false, true) => Some(Self::Timeout),
            (false, false) => None,
        }
    }
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejections => write!(f, "rejections"),
            Self::Timeout => write!(f, "timeout"),
            Self::Both => write!(f, "both"),
        }
    }
}

/// One hospital-contact attempt, owned by the case.
///
/// Appended when a notification goes out; resolved exactly once when the
/// hospital answers or the deadline expires. Never mutated after that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Hospital that was notified.
    pub hospital_id: HospitalId,

    /// Hospital name, denormalized for audit readability.
    pub hospital_name: String,

    /// Suitability score the hospital carried at notification time.
    pub score: f64,

    /// Current outcome.
    pub outcome: NotificationOutcome,

    /// When the notification was sent.
    pub sent_at: DateTime<Utc>,

    /// When the outcome was resolved. `None` while pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Notification {
    /// Create a pending notification.
    pub fn new(
        hospital_id: impl Into<HospitalId>,
        hospital_name: impl Into<String>,
        score: f64,
        sent_at: DateTime<Utc>,
    ) -> Self {
        Self {
            hospital_id: hospital_id.into(),
            hospital_name: hospital_name.into(),
            score,
            outcome: NotificationOutcome::Pending,
            sent_at,
            resolved_at: None,
        }
    }

    /// Whether this notification is still awaiting resolution.
    pub fn is_pending(&self) -> bool {
        self.outcome == NotificationOutcome::Pending
    }

    /// Resolve the notification exactly once.
    ///
    /// Returns `false` if it was already resolved; the caller turns that
    /// into an error rather than double-resolving.
    pub fn resolve(&mut self, outcome: NotificationOutcome, at: DateTime<Utc>) -> bool {
        if self.outcome.is_resolved() {
            return false;
        }
        self.outcome = outcome;
        self.resolved_at = Some(at);
        true
    }
}

/// Audit record of a confirmed dispatcher override. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideRecord {
    /// Record identifier.
    pub id: String,

    /// Case the override belongs to.
    pub case_id: CaseId,

    /// Hospital the automatic protocol had last notified.
    pub previous_hospital_id: HospitalId,

    /// Score that hospital carried when notified.
    pub previous_score: f64,

    /// Hospital the dispatcher chose.
    pub new_hospital_id: HospitalId,

    /// Score of the chosen hospital at override time.
    pub new_score: f64,

    /// Score delta (chosen minus previous), retained for audit display.
    pub score_delta: f64,

    /// Operator-supplied reason text.
    pub reason: String,

    /// Identity of the dispatcher who confirmed the override.
    pub actor: String,

    /// When the override was confirmed.
    pub at: DateTime<Utc>,
}

impl OverrideRecord {
    /// Build a record; the score delta is derived, never supplied.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        case_id: impl Into<CaseId>,
        previous_hospital_id: impl Into<HospitalId>,
        previous_score: f64,
        new_hospital_id: impl Into<HospitalId>,
        new_score: f64,
        reason: impl Into<String>,
        actor: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            case_id: case_id.into(),
            previous_hospital_id: previous_hospital_id.into(),
            previous_score,
            new_hospital_id: new_hospital_id.into(),
            new_score,
            score_delta: new_score - previous_score,
            reason: reason.into(),
            actor: actor.into(),
            at,
        }
    }
}

/// One emergency incident moving through the dispatch protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    /// Unique case identifier.
    pub id: CaseId,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,

    /// Current lifecycle state.
    pub status: CaseStatus,

    /// Clinical acuity (1 to 5), set once by triage. `None` until triaged;
    /// policy lookups treat unknown acuity as the most acute tier.
    pub acuity_level: Option<u8>,

    /// Count of notifications resolved as rejected. Monotonic.
    pub rejection_count: u32,

    /// Hospital-contact history, append-only.
    pub notifications: Vec<Notification>,

    /// Set when entering `AwaitingResponse`, cleared on exit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awaiting_response_since: Option<DateTime<Utc>>,

    /// Set when entering `EscalationRequired`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<EscalationReason>,

    /// Whether a dispatcher override was confirmed for this case.
    pub override_used: bool,

    /// Hospital routing settled on, once accepted or overridden.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_hospital_id: Option<HospitalId>,

    /// Name of the assigned hospital.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_hospital_name: Option<String>,

    /// Storage revision. Bumped by the store on every successful save; the
    /// optimistic concurrency check compares against it.
    pub version: u64,

    /// Full transition log for audit replay.
    pub transitions: Vec<TransitionRecord>,
}

impl Case {
    /// Create a fresh case in `Created` with a minted identifier.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            status: CaseStatus::Created,
            acuity_level: None,
            rejection_count: 0,
            notifications: Vec::new(),
            awaiting_response_since: None,
            escalation_reason: None,
            override_used: false,
            assigned_hospital_id: None,
            assigned_hospital_name: None,
            version: 0,
            transitions: Vec::new(),
        }
    }

    /// Use a caller-supplied identifier instead of a minted one.
    pub fn with_id(mut self, id: impl Into<CaseId>) -> Self {
        self.id = id.into();
        self
    }

    /// Pre-set the acuity level (construction-time only; runtime assignment
    /// goes through the triage transition, which enforces set-once).
    pub fn with_acuity(mut self, level: u8) -> Self {
        self.acuity_level = Some(level);
        self
    }

    /// The notification currently awaiting a response, if any.
    pub fn pending_notification(&self) -> Option<&Notification> {
        self.notifications.iter().find(|n| n.is_pending())
    }

    /// Mutable access to the pending notification.
    pub fn pending_notification_mut(&mut self) -> Option<&mut Notification> {
        self.notifications.iter_mut().find(|n| n.is_pending())
    }

    /// Append a notification to the history. The caller has already checked
    /// that no pending notification exists.
    pub fn append_notification(&mut self, notification: Notification) {
        self.updated_at = notification.sent_at;
        self.notifications.push(notification);
    }

    /// Move to a new status along a legal edge, recording the transition.
    ///
    /// Entering `AwaitingResponse` stamps `awaiting_response_since`; leaving
    /// it clears the stamp, so the field is non-null exactly while a response
    /// deadline is running. Returns `false` when the lifecycle graph has no
    /// edge from the current status; the caller turns that into an error.
    #[must_use]
    pub fn advance(&mut self, to: CaseStatus, at: DateTime<Utc>, reason: Option<&str>) -> bool {
        if !is_legal_transition(self.status, to) {
            return false;
        }

        tracing::debug!(
            case_id = %self.id,
            from = %self.status,
            to = %to,
            reason = reason.unwrap_or(""),
            "case transition"
        );

        self.transitions.push(TransitionRecord {
            from: self.status,
            to,
            at,
            reason: reason.map(String::from),
        });

        self.awaiting_response_since = if to == CaseStatus::AwaitingResponse {
            Some(at)
        } else {
            None
        };
        self.status = to;
        self.updated_at = at;
        true
    }

    /// Whether the stored rejection count matches the notification history.
    pub fn rejection_count_consistent(&self) -> bool {
        let rejected = self
            .notifications
            .iter()
            .filter(|n| n.outcome == NotificationOutcome::Rejected)
            .count() as u32;
        rejected == self.rejection_count
    }

    /// One-line trajectory for logs and the CLI.
    pub fn summary(&self) -> String {
        let trail: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        let acuity = self
            .acuity_level
            .map(|a| a.to_string())
            .unwrap_or_else(|| "?".to_string());
        let mut line = format!(
            "case {}: {} (acuity {}, {} notifications, {} rejections)",
            self.id,
            self.status,
            acuity,
            self.notifications.len(),
            self.rejection_count,
        );
        if !trail.is_empty() {
            line.push_str(&format!(" [{}]", trail.join(" -> ")));
        }
        line
    }
}

impl Default for Case {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}
