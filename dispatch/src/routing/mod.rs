//! Case lifecycle: the state machine and every operation that moves a
//! case through it.
//!
//! # Lifecycle
//!
//! ```text
//! Created ──▶ Triaged ──▶ Dispatched ──▶ AwaitingResponse ──▶ Accepted ──▶ Enroute ──▶ Completed
//!                             ▲              │       │
//!                             │           Rejected   │ limits breached
//!                             └──(redispatch)─┘      ▼
//!                                           EscalationRequired ──▶ DispatcherOverride ──▶ Enroute
//! ```
//!
//! `Rejected` is transient: a rejection either returns the case to
//! `Dispatched` for the next hospital or escalates it, in the same
//! operation. Every transition is checked against the legality table
//! in [`status`]; an illegal request is a typed error naming the state
//! the case is actually in.
//!
//! All operations take `now` as an argument. Nothing in this module
//! reads the wall clock, which is what makes timeout behavior testable
//! down to the second.

pub mod case;
pub mod coordinator;
pub mod engine;
pub mod status;

pub use case::{
    Case, CaseId, EscalationReason, HospitalId, Notification, NotificationOutcome, OverrideRecord,
};
pub use coordinator::{
    CaseSnapshot, DispatchCoordinator, SharedDispatchCoordinator, SweepReport,
};
pub use engine::{ExpiryOutcome, OverrideRequest, ResponseDisposition, TimeoutCheck};
pub use status::{is_legal_transition, CaseStatus, TransitionRecord};
