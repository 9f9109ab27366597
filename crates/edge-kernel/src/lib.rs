//! `edge-kernel` – Supervision & escalation
//!
//! Owns the single operational state of a runtime context and decides how a
//! fault moves it.  Slot logic never touches the state directly.
//!
//! # Modules
//!
//! - [`transition_table`] – [`TransitionTable`][transition_table::TransitionTable]:
//!   the immutable, authority-annotated edge set that is the only source of
//!   transition legality.
//! - [`supervisor`] – [`Supervisor`][supervisor::Supervisor]: validates,
//!   audits and commits transitions inside one critical section, and exposes
//!   that section as a [`TransitionGuard`][supervisor::TransitionGuard].
//! - [`escalation`] – [`EscalationEngine`][escalation::EscalationEngine]:
//!   precomputed shortest paths from any state to a policy target, applied
//!   hop by hop under one guard.
//! - [`audit`] – the [`AuditSink`][audit::AuditSink] boundary and an
//!   in-memory implementation.
//! - [`fault_queue`] – [`FaultQueue`][fault_queue::FaultQueue]: bounded
//!   fault inbox that never drops protected faults.
//! - [`watchdog`] – [`Watchdog`][watchdog::Watchdog]: deadlines for slot
//!   callbacks.

pub mod audit;
pub mod escalation;
pub mod fault_queue;
pub mod supervisor;
pub mod transition_table;
pub mod watchdog;

pub use audit::{AuditError, AuditSink, MemoryAuditLog};
pub use escalation::{EscalationEngine, EscalationOutcome, EscalationReport};
pub use fault_queue::{Enqueued, FaultQueue, FaultQueueError};
pub use supervisor::{Supervisor, TransitionGuard};
pub use transition_table::{NORMATIVE_EDGES, Rejection, TransitionEdge, TransitionTable};
pub use watchdog::{CallHealth, Watchdog};
