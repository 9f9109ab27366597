//! [`RuntimeContext`] – one supervised edge runtime.
//!
//! Owns the [`Supervisor`], the [`SlotRegistry`], the escalation engine, the
//! fault queue, the event bus and the audit sink, and routes every error
//! through the propagation policy:
//!
//! | Class | Handling |
//! |---|---|
//! | Runtime, Communication, Resource | logged and published on `Faults`; never escalated |
//! | Fault, Safety | escalated by the descriptor's policy |
//! | Violation | durably recorded, then escalated to at least `Safe` |
//!
//! Errors attributed to a slot whose capabilities carry `audit_required`
//! are durably recorded before [`RuntimeContext::handle_error`] returns.
//!
//! # Locking
//!
//! Lock order is supervisor, then registry.  Slot callbacks run with both
//! held.  From inside a callback, state reads and the gateway lane work as
//! usual because they never lock; errors are queued for
//! [`RuntimeContext::process_faults`]; every request that would take either
//! lock is denied.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use edge_kernel::{
    AuditSink, Enqueued, EscalationEngine, EscalationReport, FaultQueue, FaultQueueError,
    MemoryAuditLog, Supervisor, TransitionTable, Watchdog,
};
use edge_middleware::{EventBus, Topic, TopicReceiver};
use edge_slots::{SlotDescriptor, SlotRegistry, SlotSnapshot, in_slot_callback};
use edge_store::{SqliteAuditSink, StoreError};
use edge_types::{
    AuditRecord, Authority, Clock, EdgeError, ErrorClass, ErrorDescriptor, Event, EventPayload,
    OperationalState, SlotId, StateSnapshot, SystemClock,
};
use schemars::schema_for;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, RuntimeConfig};

const EVENT_SOURCE: &str = "edge-runtime::context";

/// Failure to assemble a [`RuntimeContext`].
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("audit store: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    FaultQueue(#[from] FaultQueueError),
}

/// Result of one [`RuntimeContext::process_faults`] pass.
#[derive(Debug, Default)]
pub struct DrainReport {
    pub processed: usize,
    /// Faults whose routing failed, with the error returned.
    pub failures: Vec<(ErrorDescriptor, EdgeError)>,
}

/// JSON schema of the [`Event`] envelope delivered to the gateway.
pub fn gateway_event_schema() -> serde_json::Value {
    serde_json::to_value(schema_for!(Event)).unwrap_or(serde_json::Value::Null)
}

/// Builder for [`RuntimeContext`].
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    clock: Option<Arc<dyn Clock>>,
    audit: Option<Arc<dyn AuditSink>>,
    table: TransitionTable,
}

impl RuntimeBuilder {
    /// Time source; [`SystemClock`] by default.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Audit sink overriding `audit_db_path`.
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn transition_table(mut self, table: TransitionTable) -> Self {
        self.table = table;
        self
    }

    pub fn build(self) -> Result<RuntimeContext, RuntimeError> {
        let config = self.config;
        config.validate()?;

        let audit: Arc<dyn AuditSink> = match (self.audit, &config.audit_db_path) {
            (Some(sink), _) => sink,
            (None, Some(path)) => Arc::new(SqliteAuditSink::open(path)?),
            (None, None) => Arc::new(MemoryAuditLog::new()),
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let bus = EventBus::new(config.event_bus_capacity);
        let watchdog = Arc::new(Watchdog::new());

        let supervisor = Supervisor::new(self.table.clone(), audit.clone()).with_bus(bus.clone());
        let escalation = EscalationEngine::new(&self.table);
        let registry = SlotRegistry::new(config.registry_limits(), clock.clone())
            .with_watchdog(watchdog.clone());
        let faults = FaultQueue::new(config.fault_queue_capacity, config.fault_queue_reserved)?;

        info!(
            transitions = self.table.len(),
            fault_queue_capacity = config.fault_queue_capacity,
            durable_audit = config.audit_db_path.is_some(),
            "runtime context ready"
        );
        Ok(RuntimeContext {
            config,
            clock,
            bus,
            audit,
            supervisor,
            escalation,
            registry: Mutex::new(registry),
            faults,
            watchdog,
            draining: AtomicBool::new(false),
        })
    }
}

/// A supervised runtime: one state machine, its slots and its fault path.
pub struct RuntimeContext {
    config: RuntimeConfig,
    clock: Arc<dyn Clock>,
    bus: EventBus,
    audit: Arc<dyn AuditSink>,
    supervisor: Supervisor,
    escalation: EscalationEngine,
    registry: Mutex<SlotRegistry>,
    faults: FaultQueue,
    watchdog: Arc<Watchdog>,
    draining: AtomicBool,
}

/// Clears the single-drainer flag when a drain pass ends.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RuntimeContext {
    pub fn builder(config: RuntimeConfig) -> RuntimeBuilder {
        RuntimeBuilder {
            config,
            clock: None,
            audit: None,
            table: TransitionTable::normative(),
        }
    }

    /// Context with the system clock and the audit sink `config` selects.
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe(&self, topic: Topic) -> TopicReceiver {
        self.bus.subscribe_to(topic)
    }

    /// Shared with external monitor loops; see [`poll_watchdog`](Self::poll_watchdog).
    pub fn watchdog(&self) -> &Arc<Watchdog> {
        &self.watchdog
    }

    pub fn fault_queue(&self) -> &FaultQueue {
        &self.faults
    }

    /// Lock-free; callable from slot callbacks.
    pub fn current_state(&self) -> OperationalState {
        self.supervisor.current()
    }

    /// Lock-free; callable from slot callbacks.
    pub fn snapshot(&self) -> StateSnapshot {
        self.supervisor.snapshot(self.clock.now_us())
    }

    pub fn audit_trail(&self) -> Result<Vec<AuditRecord>, EdgeError> {
        self.supervisor.audit_trail()
    }

    /// Error descriptors durably recorded so far.
    pub fn recorded_errors(&self) -> Result<Vec<ErrorDescriptor>, EdgeError> {
        self.audit
            .errors()
            .map_err(|e| EdgeError::Error(format!("audit errors unavailable: {e}")))
    }

    /// Registered slot ids in registry order.  Denied from inside a slot
    /// callback, where the registry is already locked.
    pub fn slot_ids(&self) -> Result<Vec<SlotId>, EdgeError> {
        reject_from_callback("slot listing")?;
        Ok(self.lock_registry().ids())
    }

    // ────────────────────────────────────────────────────────────────────────
    // Transitions
    // ────────────────────────────────────────────────────────────────────────

    /// Ask the supervisor for `current -> to` on behalf of `authority`.
    pub fn request_transition(
        &self,
        to: OperationalState,
        authority: Authority,
    ) -> Result<AuditRecord, EdgeError> {
        reject_from_callback("transition request")?;
        self.supervisor.transition(to, authority, self.clock.now_us())
    }

    // ────────────────────────────────────────────────────────────────────────
    // Slots
    // ────────────────────────────────────────────────────────────────────────

    /// Register a slot.  Only while the state allows reconfiguration.
    pub fn register_slot(&self, descriptor: SlotDescriptor) -> Result<(), EdgeError> {
        reject_from_callback("slot registration")?;
        let guard = self.supervisor.lock();
        require(guard.current(), OperationalState::allows_reconfiguration, "register slots")?;
        self.lock_registry().register(descriptor)
    }

    /// Unregister a slot.  Only while the state allows reconfiguration.
    pub fn unregister_slot(&self, slot_id: SlotId) -> Result<SlotDescriptor, EdgeError> {
        reject_from_callback("slot unregistration")?;
        let guard = self.supervisor.lock();
        require(guard.current(), OperationalState::allows_reconfiguration, "unregister slots")?;
        self.lock_registry().unregister(slot_id)
    }

    /// Replace a registered slot with a new version.  Only while the state
    /// allows updates.  Returns the replaced descriptor.
    pub fn update_slot(&self, descriptor: SlotDescriptor) -> Result<SlotDescriptor, EdgeError> {
        reject_from_callback("slot update")?;
        let guard = self.supervisor.lock();
        require(guard.current(), OperationalState::allows_update, "update slots")?;
        self.lock_registry().replace(descriptor)
    }

    /// Initialize every registered slot not yet initialized.
    pub fn initialize_slots(&self) -> Result<usize, EdgeError> {
        reject_from_callback("slot initialization")?;
        let guard = self.supervisor.lock();
        self.lock_registry().initialize_all(guard.current())
    }

    /// Run one execute call of `slot_id`, admitted against the current state.
    ///
    /// The state cannot change while the call runs.  An overrun is reported
    /// as a runtime-timeout fault and returned as [`EdgeError::Timeout`].
    pub fn execute_slot(&self, slot_id: SlotId) -> Result<(), EdgeError> {
        reject_from_callback("slot execution")?;
        let now = self.clock.now_us();
        let result = {
            let guard = self.supervisor.lock();
            self.lock_registry().execute(slot_id, guard.current(), now)
        };
        if let Err(EdgeError::Timeout(_)) = &result {
            self.report(&ErrorDescriptor::slot_timeout(slot_id, self.clock.now_us()));
        }
        result
    }

    /// Bounded snapshot of a slot's internal state.
    pub fn snapshot_slot(&self, slot_id: SlotId) -> Result<SlotSnapshot, EdgeError> {
        reject_from_callback("slot snapshot")?;
        self.lock_registry()
            .snapshot(slot_id, self.config.snapshot_max_bytes)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Faults
    // ────────────────────────────────────────────────────────────────────────

    /// Queue `error` for [`process_faults`](Self::process_faults).
    ///
    /// # Errors
    ///
    /// [`EdgeError::Error`] when an ordinary fault finds the queue full; a
    /// Resource/`QUEUE_FULL` descriptor is reported in its place.
    pub fn raise_fault(&self, error: ErrorDescriptor) -> Result<Enqueued, EdgeError> {
        match self.faults.push(error, self.clock.now_us()) {
            Ok(outcome) => {
                if let Enqueued::Evicted(evicted) = &outcome {
                    self.report(evicted);
                }
                Ok(outcome)
            }
            Err(FaultQueueError::QueueFull { rejected, report }) => {
                self.report(&report);
                Err(EdgeError::Error(format!("fault queue full; dropped {rejected}")))
            }
            Err(other) => Err(EdgeError::Error(other.to_string())),
        }
    }

    /// Route every queued fault.  Only one caller drains at a time; a
    /// concurrent call returns immediately with nothing processed.
    pub fn process_faults(&self) -> DrainReport {
        if in_slot_callback() {
            debug!("fault processing deferred: inside slot callback");
            return DrainReport::default();
        }
        if self.draining.swap(true, Ordering::AcqRel) {
            debug!("fault queue already being drained");
            return DrainReport::default();
        }
        let _guard = DrainGuard(&self.draining);

        let mut report = DrainReport::default();
        while let Some(fault) = self.faults.pop() {
            report.processed += 1;
            if let Err(e) = self.route(&fault) {
                report.failures.push((fault, e));
            }
        }
        if report.processed > 0 {
            debug!(
                processed = report.processed,
                failed = report.failures.len(),
                "fault queue drained"
            );
        }
        report
    }

    /// Classify and route `error` now.
    ///
    /// Returns the escalation report for faults and violations, `None` for
    /// operational errors and for errors raised from inside a slot callback
    /// (those are queued instead).
    pub fn handle_error(
        &self,
        error: ErrorDescriptor,
    ) -> Result<Option<EscalationReport>, EdgeError> {
        if in_slot_callback() {
            debug!(%error, "error raised inside slot callback; queued");
            self.raise_fault(error)?;
            return Ok(None);
        }
        self.route(&error)
    }

    /// Turn slot calls that are past their deadline into runtime-timeout
    /// faults, published on `Faults`.  Safe to call from another thread
    /// while a slot callback is hung.
    pub fn poll_watchdog(&self) -> Vec<ErrorDescriptor> {
        let now = self.clock.now_us();
        self.watchdog
            .check_all(now)
            .into_iter()
            .map(|(slot_id, overrun_us)| {
                warn!(slot_id, overrun_us, "slot call overdue");
                self.publish(Topic::Faults, EventPayload::SlotTimeout { slot_id, overrun_us });
                let timeout = ErrorDescriptor::slot_timeout(slot_id, now);
                self.report(&timeout);
                timeout
            })
            .collect()
    }

    // ────────────────────────────────────────────────────────────────────────
    // Gateway
    // ────────────────────────────────────────────────────────────────────────

    /// Hand `payload` to the gateway lane.  Denied in `Stop`.  Never blocks
    /// on the supervisor, so slots may publish from their callbacks.
    pub fn publish_to_gateway(&self, payload: EventPayload) -> Result<usize, EdgeError> {
        require(self.current_state(), OperationalState::allows_gateway, "reach the gateway")?;
        Ok(self
            .bus
            .publish_to(Topic::Gateway, Event::new(EVENT_SOURCE, payload)))
    }

    /// Publish the current [`StateSnapshot`] to the gateway lane.
    pub fn publish_snapshot(&self) -> Result<usize, EdgeError> {
        self.publish_to_gateway(EventPayload::Snapshot(self.snapshot()))
    }

    // ────────────────────────────────────────────────────────────────────────
    // Internal
    // ────────────────────────────────────────────────────────────────────────

    fn route(&self, error: &ErrorDescriptor) -> Result<Option<EscalationReport>, EdgeError> {
        if self.needs_durable_record(error) {
            self.audit
                .record_error(error)
                .map_err(|e| EdgeError::Error(format!("error descriptor not persisted: {e}")))?;
        }
        self.report(error);

        if !error.requires_escalation() {
            return Ok(None);
        }

        let mut timeouts = Vec::new();
        let result = self.escalation.escalate(
            &self.supervisor,
            error,
            self.clock.now_us(),
            |state, error| {
                let broadcast = self.lock_registry().broadcast_fault(error);
                debug!(%state, delivered = broadcast.delivered, "fault delivered to slots");
                timeouts.extend(broadcast.timeouts);
            },
        );
        for timeout in &timeouts {
            self.report(timeout);
        }
        match result {
            Ok(report) => Ok(Some(report)),
            Err(e) => {
                error!(%error, reason = %e, "escalation incomplete");
                Err(e)
            }
        }
    }

    fn needs_durable_record(&self, error: &ErrorDescriptor) -> bool {
        if error.class == ErrorClass::Violation {
            return true;
        }
        error.slot.is_some_and(|slot_id| {
            self.lock_registry()
                .capabilities(slot_id)
                .is_some_and(|caps| caps.flags.audit_required)
        })
    }

    /// Log and publish a descriptor on `Faults`, mirroring it to the
    /// gateway lane when the state allows.  Takes no lock.
    fn report(&self, error: &ErrorDescriptor) {
        if error.requires_escalation() {
            warn!(%error, "fault raised");
        } else {
            warn!(%error, "operational error reported");
        }
        self.publish(Topic::Faults, EventPayload::Fault(error.clone()));
        if self.supervisor.allows_gateway() {
            self.publish(Topic::Gateway, EventPayload::Fault(error.clone()));
        }
    }

    fn publish(&self, topic: Topic, payload: EventPayload) {
        self.bus.publish_to(topic, Event::new(EVENT_SOURCE, payload));
    }

    fn lock_registry(&self) -> MutexGuard<'_, SlotRegistry> {
        // Registry mutations complete before any fallible callback runs.
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn reject_from_callback(what: &str) -> Result<(), EdgeError> {
    if in_slot_callback() {
        warn!(what, "request from inside a slot callback rejected");
        return Err(EdgeError::Denied(format!(
            "{what} is not permitted from inside a slot callback"
        )));
    }
    Ok(())
}

fn require(
    state: OperationalState,
    predicate: fn(OperationalState) -> bool,
    action: &str,
) -> Result<(), EdgeError> {
    if predicate(state) {
        Ok(())
    } else {
        Err(EdgeError::Denied(format!("cannot {action} in {state}")))
    }
}
