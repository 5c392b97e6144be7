//! Event-driven audit trail for dispatch coordination
//!
//! Every consequential thing that happens to a case is recorded as an
//! event and broadcast to live subscribers. The journal is the record
//! of what the system decided and when; regulators and post-incident
//! reviews read it, dashboards follow it live.
//!
//! # Components
//!
//! 1. **Event Types** (`types.rs`): the event variants that cover a
//!    case from creation through handoff.
//!
//! 2. **Event Bus** (`bus.rs`): Tokio broadcast-based pub/sub with
//!    optional journaling through an [`EventJournal`] backend.
//!
//! 3. **Event History** (`history.rs`): time-window queries, per-case
//!    timelines, and aggregate statistics over the journal.
//!
//! # Flow
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Coordinator  │────▶│  Event Bus   │────▶│  Subscribers │
//! │  (publish)   │     │  (broadcast) │     │   (recv)     │
//! └──────────────┘     └──────┬───────┘     └──────────────┘
//!                             │
//!                             ▼
//!                      ┌──────────────┐
//!                      │ EventJournal │
//!                      │  (persist)   │
//!                      └──────────────┘
//! ```
//!
//! [`EventJournal`]: crate::store::EventJournal

pub mod bus;
pub mod history;
pub mod types;

// Re-export core types
pub use bus::{
    EventBus, EventBusError, EventBusExt, EventBusResult, EventFilter, FilteredReceiver,
    SharedEventBus,
};
pub use history::{EventHistory, EventStats};
pub use types::{CaseEvent, EventId};
