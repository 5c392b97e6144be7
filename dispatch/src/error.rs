//! Dispatch error types.
//!
//! Structured errors for every case-lifecycle operation. A rejected
//! operation always names the state it found and the state it needed, so
//! a dispatcher (or a retry loop) can see exactly why it was refused.

use thiserror::Error;

use crate::routing::status::CaseStatus;
use crate::store::StoreError;

/// Result type alias for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors that can occur while driving a case through its lifecycle
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Operation called in a state it does not accept
    #[error("case {case_id} is {current}, but {operation} requires {expected}")]
    InvalidTransition {
        case_id: String,
        operation: &'static str,
        current: CaseStatus,
        expected: &'static str,
    },

    /// Transition rejected by the legality table
    #[error("illegal transition for case {case_id}: {from} -> {to}")]
    ForbiddenTransition {
        case_id: String,
        from: CaseStatus,
        to: CaseStatus,
    },

    /// A notification is already awaiting a response
    #[error("case {case_id} already has a pending notification to hospital {hospital_id}")]
    PendingNotificationExists {
        case_id: String,
        hospital_id: String,
    },

    /// No notification is awaiting a response
    #[error("case {case_id} has no pending notification")]
    NoPendingNotification { case_id: String },

    /// Response arrived from a hospital that was never asked
    #[error("case {case_id} is awaiting hospital {expected}, got a response from {got}")]
    HospitalMismatch {
        case_id: String,
        expected: String,
        got: String,
    },

    /// Expiry attempted while the response window is still open
    #[error("case {case_id} cannot expire yet: {remaining_seconds}s left in the response window")]
    DeadlineNotReached {
        case_id: String,
        remaining_seconds: i64,
    },

    /// A dispatcher override was already recorded
    #[error("case {case_id} already has a dispatcher override")]
    DuplicateOverride { case_id: String },

    /// Triage already assigned an acuity to this case
    #[error("case {case_id} already has acuity {acuity}; triage is recorded once")]
    AcuityAlreadySet { case_id: String, acuity: u8 },

    /// Hospital notification channel failed
    #[error("failed to notify hospital {hospital_id}: {message}")]
    Notify { hospital_id: String, message: String },

    /// Optimistic-concurrency retries used up
    #[error("gave up on case {case_id} after {attempts} conflicting write attempts")]
    RetriesExhausted { case_id: String, attempts: u32 },

    /// Persistence error
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DispatchError {
    /// Create an invalid transition error
    pub fn invalid_transition(
        case_id: impl Into<String>,
        operation: &'static str,
        current: CaseStatus,
        expected: &'static str,
    ) -> Self {
        Self::InvalidTransition {
            case_id: case_id.into(),
            operation,
            current,
            expected,
        }
    }

    /// Create a forbidden transition error
    pub fn forbidden_transition(
        case_id: impl Into<String>,
        from: CaseStatus,
        to: CaseStatus,
    ) -> Self {
        Self::ForbiddenTransition {
            case_id: case_id.into(),
            from,
            to,
        }
    }

    /// Create a hospital mismatch error
    pub fn hospital_mismatch(
        case_id: impl Into<String>,
        expected: impl Into<String>,
        got: impl Into<String>,
    ) -> Self {
        Self::HospitalMismatch {
            case_id: case_id.into(),
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Create a notification failure error
    pub fn notify(hospital_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Notify {
            hospital_id: hospital_id.into(),
            message: message.into(),
        }
    }

    /// Check if this error is retryable (transient failure)
    pub fn is_retryable(&self) -> bool {
        match self {
            // Another writer won the version race; re-read and re-apply
            Self::Store(StoreError::VersionConflict { .. }) => true,
            // Network sends may succeed on retry
            Self::Notify { .. } => true,
            // State complaints are facts about the case, not transient
            _ => false,
        }
    }

    /// Get recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::InvalidTransition { .. } | Self::ForbiddenTransition { .. } => Some(
                "Re-read the case to see its current status. Another dispatcher or the \
                 timeout sweep may have advanced it since you last looked.",
            ),
            Self::PendingNotificationExists { .. } => Some(
                "Resolve the pending notification first: record the hospital's response, \
                 or expire it once its deadline has passed.",
            ),
            Self::NoPendingNotification { .. } => {
                Some("There is nothing to resolve. Dispatch the case to a hospital first.")
            }
            Self::HospitalMismatch { .. } => Some(
                "The response names a hospital that is not the pending one. Check the case \
                 history for which hospital was last notified.",
            ),
            Self::DeadlineNotReached { .. } => Some(
                "The response window is still open. Wait for the deadline or record the \
                 hospital's actual response.",
            ),
            Self::DuplicateOverride { .. } => Some(
                "A dispatcher override was already recorded for this case. Overrides are \
                 single-use; the case should proceed to enroute.",
            ),
            Self::AcuityAlreadySet { .. } => Some(
                "Triage is recorded once per case. Open a new case if the patient needs a \
                 fresh assessment.",
            ),
            Self::Notify { .. } => Some(
                "Check the notification endpoint and network. The case is still awaiting a \
                 response, so the timeout sweep will escalate it if nothing lands.",
            ),
            Self::RetriesExhausted { .. } => Some(
                "Concurrent writers kept winning the version race. Re-read the case and \
                 retry the operation.",
            ),
            Self::Store(StoreError::VersionConflict { .. }) => Some(
                "The case changed under you. Re-read it at its current version and \
                 re-apply the operation.",
            ),
            Self::Store(StoreError::NotFound { .. }) => {
                Some("No case with that id. Check the id or list open cases.")
            }
            Self::Store(_) => None,
        }
    }

    /// Get error with recovery suggestion formatted
    pub fn with_suggestion(&self) -> String {
        match self.recovery_suggestion() {
            Some(suggestion) => format!("{}\n\nRecovery: {}", self, suggestion),
            None => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_names_both_states() {
        let err = DispatchError::invalid_transition(
            "case-1",
            "record_response",
            CaseStatus::Triaged,
            "AwaitingResponse",
        );
        let message = err.to_string();
        assert!(message.contains("Triaged"));
        assert!(message.contains("AwaitingResponse"));
        assert!(message.contains("record_response"));
    }

    #[test]
    fn test_version_conflict_is_retryable() {
        let err = DispatchError::from(StoreError::VersionConflict {
            case_id: "case-1".to_string(),
            expected: 3,
            actual: 4,
        });
        assert!(err.is_retryable());

        let err = DispatchError::DuplicateOverride {
            case_id: "case-1".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_state_errors_are_not_retryable() {
        let err = DispatchError::invalid_transition(
            "case-1",
            "expire",
            CaseStatus::Accepted,
            "AwaitingResponse",
        );
        assert!(!err.is_retryable());

        let err = DispatchError::DeadlineNotReached {
            case_id: "case-1".to_string(),
            remaining_seconds: 12,
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_recovery_suggestions() {
        let err = DispatchError::NoPendingNotification {
            case_id: "case-1".to_string(),
        };
        assert!(err.recovery_suggestion().is_some());

        let formatted = err.with_suggestion();
        assert!(formatted.contains("Recovery:"));
        assert!(formatted.contains("case-1"));
    }

    #[test]
    fn test_store_error_wraps_transparently() {
        let err = DispatchError::from(StoreError::NotFound {
            case_id: "missing".to_string(),
        });
        assert!(err.to_string().contains("missing"));
    }
}
