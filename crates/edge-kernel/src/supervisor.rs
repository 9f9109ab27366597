//! [`Supervisor`] – owner of the single operational state.
//!
//! The current state is only ever changed through
//! [`TransitionGuard::transition`], which validates the request against the
//! [`TransitionTable`], persists an [`AuditRecord`] through the
//! [`AuditSink`], swaps the state and publishes a `StateChanged` event, all
//! while holding the supervisor mutex.  Callers that need several transitions
//! to appear as one critical section (fault escalation) hold a
//! [`TransitionGuard`] obtained from [`Supervisor::lock`] across all hops.
//!
//! The audit record is persisted *before* the state is swapped: a sink failure
//! leaves the state untouched, so every committed transition has exactly one
//! record.
//!
//! Plain reads ([`Supervisor::current`], [`Supervisor::snapshot`] and the
//! `allows_*` predicates) never take the mutex.  They load an atomic copy of
//! the state and flags that the guard rewrites after each commit, so slot
//! callbacks running inside the critical section can still observe the state.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use edge_kernel::{MemoryAuditLog, Supervisor, TransitionTable};
//! use edge_types::{Authority, OperationalState, ResultCode};
//!
//! let supervisor = Supervisor::new(TransitionTable::normative(), Arc::new(MemoryAuditLog::new()));
//! assert_eq!(supervisor.current(), OperationalState::Init);
//!
//! supervisor.transition(OperationalState::Run, Authority::Internal, 10).unwrap();
//! assert!(supervisor.allows_user_logic());
//!
//! // Gateway authority holds no transition rights in the normative table.
//! let denied = supervisor.transition(OperationalState::Pause, Authority::Gateway, 20);
//! assert_eq!(ResultCode::of(&denied), ResultCode::Denied);
//! ```

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use edge_middleware::{EventBus, Topic};
use edge_types::{
    AuditKind, AuditRecord, Authority, EdgeError, ErrorDescriptor, Event, EventPayload,
    OperationalState, StateFlags, StateSnapshot, TimeUs,
};
use tracing::{debug, info, warn};

use crate::audit::AuditSink;
use crate::transition_table::{Rejection, TransitionTable};

const EVENT_SOURCE: &str = "edge-kernel::supervisor";

// ────────────────────────────────────────────────────────────────────────────
// Published view
// ────────────────────────────────────────────────────────────────────────────

const FAULT_LATCHED_BIT: u16 = 1 << 8;
const ESCALATION_INCOMPLETE_BIT: u16 = 1 << 9;

/// State ordinal in the low byte, flag bits above it.
fn pack(state: OperationalState, flags: StateFlags) -> u16 {
    let mut bits = state.ordinal() as u16;
    if flags.fault_latched {
        bits |= FAULT_LATCHED_BIT;
    }
    if flags.escalation_incomplete {
        bits |= ESCALATION_INCOMPLETE_BIT;
    }
    bits
}

fn unpack(bits: u16) -> (OperationalState, StateFlags) {
    // Only `pack` writes the mirror, so the ordinal is always in range.
    let state = OperationalState::from_ordinal(usize::from(bits & 0xff))
        .unwrap_or(OperationalState::Stop);
    let flags = StateFlags {
        fault_latched: bits & FAULT_LATCHED_BIT != 0,
        escalation_incomplete: bits & ESCALATION_INCOMPLETE_BIT != 0,
    };
    (state, flags)
}

// ────────────────────────────────────────────────────────────────────────────
// Supervisor
// ────────────────────────────────────────────────────────────────────────────

struct SupervisorCell {
    current: OperationalState,
    since: TimeUs,
    flags: StateFlags,
    sequence: u64,
}

/// Owns the operational state of one runtime context.
pub struct Supervisor {
    table: TransitionTable,
    cell: Mutex<SupervisorCell>,
    /// Last committed state and flags, readable without the mutex.
    published: AtomicU16,
    audit: Arc<dyn AuditSink>,
    bus: Option<EventBus>,
}

impl Supervisor {
    /// Create a supervisor in [`OperationalState::Init`].
    pub fn new(table: TransitionTable, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            table,
            cell: Mutex::new(SupervisorCell {
                current: OperationalState::Init,
                since: 0,
                flags: StateFlags::default(),
                sequence: 0,
            }),
            published: AtomicU16::new(pack(OperationalState::Init, StateFlags::default())),
            audit,
            bus: None,
        }
    }

    /// Publish state changes and audit records on `bus`.
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    pub fn audit_sink(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    /// `true` iff `(from, to, authority)` is an edge of the table.
    pub fn is_allowed(
        &self,
        from: OperationalState,
        to: OperationalState,
        authority: Authority,
    ) -> bool {
        self.table.is_allowed(from, to, authority)
    }

    /// Enter the critical section.
    pub fn lock(&self) -> TransitionGuard<'_> {
        TransitionGuard {
            supervisor: self,
            // The cell is only written after every fallible step succeeded,
            // so a poisoned lock still guards a consistent value.
            cell: self.cell.lock().unwrap_or_else(|e| e.into_inner()),
        }
    }

    /// Last committed state.  Never blocks, so it is safe to call from a
    /// slot callback while a [`TransitionGuard`] is held.
    pub fn current(&self) -> OperationalState {
        unpack(self.published.load(Ordering::Acquire)).0
    }

    /// Copy of the last committed state and flags; never blocks.
    pub fn snapshot(&self, now: TimeUs) -> StateSnapshot {
        let (state, flags) = unpack(self.published.load(Ordering::Acquire));
        StateSnapshot {
            state,
            timestamp: now,
            flags,
        }
    }

    /// Validate and apply `current -> to` on behalf of `authority`.
    ///
    /// # Errors
    ///
    /// - [`EdgeError::Invalid`] – no edge from the current state to `to`.
    /// - [`EdgeError::Denied`] – the edge exists but requires another authority.
    /// - [`EdgeError::Error`] – the audit record could not be persisted; the
    ///   state is unchanged.
    pub fn transition(
        &self,
        to: OperationalState,
        authority: Authority,
        now: TimeUs,
    ) -> Result<AuditRecord, EdgeError> {
        self.lock().transition(to, authority, now)
    }

    pub fn allows_user_logic(&self) -> bool {
        self.current().allows_user_logic()
    }

    pub fn allows_reconfiguration(&self) -> bool {
        self.current().allows_reconfiguration()
    }

    pub fn allows_gateway(&self) -> bool {
        self.current().allows_gateway()
    }

    pub fn allows_update(&self) -> bool {
        self.current().allows_update()
    }

    /// Every audit record persisted so far.
    pub fn audit_trail(&self) -> Result<Vec<AuditRecord>, EdgeError> {
        self.audit
            .records()
            .map_err(|e| EdgeError::Error(format!("audit trail unavailable: {e}")))
    }

    fn publish(&self, topic: Topic, payload: EventPayload) {
        if let Some(bus) = &self.bus {
            let delivered = bus.publish_to(topic, Event::new(EVENT_SOURCE, payload));
            debug!(?topic, delivered, "supervisor event published");
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Critical section
// ────────────────────────────────────────────────────────────────────────────

/// Exclusive access to the supervisor state.  Dropping the guard ends the
/// critical section.
pub struct TransitionGuard<'a> {
    supervisor: &'a Supervisor,
    cell: MutexGuard<'a, SupervisorCell>,
}

impl TransitionGuard<'_> {
    pub fn current(&self) -> OperationalState {
        self.cell.current
    }

    pub fn flags(&self) -> StateFlags {
        self.cell.flags
    }

    /// Time of the last committed transition.
    pub fn since(&self) -> TimeUs {
        self.cell.since
    }

    pub fn snapshot(&self, now: TimeUs) -> StateSnapshot {
        StateSnapshot {
            state: self.cell.current,
            timestamp: now,
            flags: self.cell.flags,
        }
    }

    /// See [`Supervisor::transition`].
    pub fn transition(
        &mut self,
        to: OperationalState,
        authority: Authority,
        now: TimeUs,
    ) -> Result<AuditRecord, EdgeError> {
        self.transition_with(to, authority, now, None)
    }

    /// Apply a transition and attach the triggering error to its record.
    pub fn transition_with(
        &mut self,
        to: OperationalState,
        authority: Authority,
        now: TimeUs,
        error: Option<&ErrorDescriptor>,
    ) -> Result<AuditRecord, EdgeError> {
        let from = self.cell.current;
        if let Some(rejection) = self.supervisor.table.check(from, to, authority) {
            warn!(%from, %to, %authority, ?rejection, "transition rejected");
            return Err(match rejection {
                Rejection::AuthorityMismatch => EdgeError::Denied(format!(
                    "{from} -> {to} is not permitted for {authority} authority"
                )),
                Rejection::NoSuchEdge => {
                    EdgeError::Invalid(format!("no transition {from} -> {to}"))
                }
            });
        }

        let record = self.persist(to, authority, now, AuditKind::Transition, error)?;

        self.cell.current = to;
        self.cell.since = now;
        if to == OperationalState::Fault {
            self.cell.flags.fault_latched = true;
        }
        if from == OperationalState::Safe && to == OperationalState::Init {
            self.cell.flags = StateFlags::default();
        }
        self.republish();

        info!(%from, %to, %authority, sequence = record.sequence, "state transition committed");
        self.supervisor.publish(
            Topic::StateChanges,
            EventPayload::StateChanged {
                from,
                to,
                authority,
                at: now,
            },
        );
        self.supervisor
            .publish(Topic::Audit, EventPayload::Audit(record.clone()));
        Ok(record)
    }

    /// Append an audit-only record (no state change).
    pub fn audit_only(
        &mut self,
        authority: Authority,
        now: TimeUs,
        error: Option<&ErrorDescriptor>,
    ) -> Result<AuditRecord, EdgeError> {
        let state = self.cell.current;
        let record = self.persist(state, authority, now, AuditKind::AuditOnly, error)?;
        debug!(%state, sequence = record.sequence, "audit-only record appended");
        self.supervisor
            .publish(Topic::Audit, EventPayload::Audit(record.clone()));
        Ok(record)
    }

    pub(crate) fn set_escalation_incomplete(&mut self, incomplete: bool) {
        self.cell.flags.escalation_incomplete = incomplete;
        self.republish();
    }

    fn republish(&self) {
        self.supervisor
            .published
            .store(pack(self.cell.current, self.cell.flags), Ordering::Release);
    }

    fn persist(
        &mut self,
        new: OperationalState,
        authority: Authority,
        now: TimeUs,
        kind: AuditKind,
        error: Option<&ErrorDescriptor>,
    ) -> Result<AuditRecord, EdgeError> {
        let record = AuditRecord {
            sequence: self.cell.sequence + 1,
            prior: self.cell.current,
            new,
            authority,
            timestamp: now,
            kind,
            error: error.cloned(),
        };
        self.supervisor
            .audit
            .append(&record)
            .map_err(|e| EdgeError::Error(format!("audit record not persisted: {e}")))?;
        self.cell.sequence = record.sequence;
        Ok(record)
    }
}
