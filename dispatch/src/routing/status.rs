//! Case lifecycle states and legal transition guards.
//!
//! Provides a typed state model for the dispatch protocol so that:
//! 1. Every state transition is auditable and logged.
//! 2. Illegal transitions are rejected before they reach the store.
//! 3. Offline replay can reconstruct the exact routing history of a case.
//!
//! The transition functions in [`crate::routing::engine`] call
//! [`is_legal_transition`] before mutating a case. A transition that the
//! table forbids is a hard error, never a silent no-op: losing a rejection
//! or an acceptance would corrupt the audit trail.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The set of case lifecycle states.
///
/// Every case starts at `Created` and settles at `Completed`. `Rejected` is
/// transient: a single hospital's rejection passes through it back to
/// `Dispatched` (next candidate) or on to `EscalationRequired` (thresholds
/// breached). A case never rests in `Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    /// Incident recorded, not yet triaged.
    Created,
    /// Acuity assigned by the triage pipeline.
    Triaged,
    /// Ready to notify the next ranked hospital.
    Dispatched,
    /// A pending notification is out; the response deadline is running.
    AwaitingResponse,
    /// The notified hospital accepted. Routing is settled.
    Accepted,
    /// The notified hospital declined. Transient.
    Rejected,
    /// Automatic routing failed; a human dispatcher must decide.
    EscalationRequired,
    /// A dispatcher confirmed a manual hospital choice. Routing is settled.
    DispatcherOverride,
    /// Ambulance en route to the settled hospital.
    Enroute,
    /// Incident closed. Terminal state.
    Completed,
}

impl CaseStatus {
    /// Whether this is the terminal state (no further transitions allowed).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Whether a new hospital notification may be sent from this state.
    pub fn can_dispatch(self) -> bool {
        matches!(self, Self::Created | Self::Triaged | Self::Dispatched)
    }

    /// Whether routing has been decided (automatically or by override).
    pub fn routing_settled(self) -> bool {
        matches!(
            self,
            Self::Accepted | Self::DispatcherOverride | Self::Enroute | Self::Completed
        )
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Triaged => write!(f, "Triaged"),
            Self::Dispatched => write!(f, "Dispatched"),
            Self::AwaitingResponse => write!(f, "AwaitingResponse"),
            Self::Accepted => write!(f, "Accepted"),
            Self::Rejected => write!(f, "Rejected"),
            Self::EscalationRequired => write!(f, "EscalationRequired"),
            Self::DispatcherOverride => write!(f, "DispatcherOverride"),
            Self::Enroute => write!(f, "Enroute"),
            Self::Completed => write!(f, "Completed"),
        }
    }
}

/// Legal transitions between case states.
///
/// The transition table encodes the valid edges in the lifecycle graph:
/// ```text
/// Created → Triaged | AwaitingResponse
/// Triaged → AwaitingResponse
/// Dispatched → AwaitingResponse
/// AwaitingResponse → Accepted | Rejected | EscalationRequired
/// Rejected → Dispatched | EscalationRequired
/// EscalationRequired → DispatcherOverride
/// Accepted → Enroute
/// DispatcherOverride → Enroute
/// Enroute → Completed
/// ```
///
/// `AwaitingResponse → EscalationRequired` is the timeout edge: an expired
/// notification is not a rejection, so it skips `Rejected`.
pub fn is_legal_transition(from: CaseStatus, to: CaseStatus) -> bool {
    use CaseStatus::*;

    matches!(
        (from, to),
        (Created, Triaged)
            // dispatch() is valid from any state where can_dispatch() holds
            | (Created, AwaitingResponse)
            | (Triaged, AwaitingResponse)
            | (Dispatched, AwaitingResponse)
            // Hospital response resolves the pending notification
            | (AwaitingResponse, Accepted)
            | (AwaitingResponse, Rejected)
            // Deadline expiry, tracked distinctly from rejection
            | (AwaitingResponse, EscalationRequired)
            // Rejection is transient: next candidate, or thresholds breached
            | (Rejected, Dispatched)
            | (Rejected, EscalationRequired)
            // The one exit from escalation is a human decision
            | (EscalationRequired, DispatcherOverride)
            // Downstream of routing
            | (Accepted, Enroute)
            | (DispatcherOverride, Enroute)
            | (Enroute, Completed)
    )
}

/// A single recorded state transition, kept on the case for audit replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// The state transitioned from.
    pub from: CaseStatus,
    /// The state transitioned to.
    pub to: CaseStatus,
    /// Wall-clock time of the transition.
    pub at: DateTime<Utc>,
    /// Optional context about why this transition happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
