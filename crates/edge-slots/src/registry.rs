//! [`SlotRegistry`] – exclusive owner of every registered slot.
//!
//! The registry enforces admission (contract version, unique id, valid
//! capabilities), gates `execute` by slot type and operational state, and
//! fans faults out to every slot in registration order.
//!
//! # Execute admission
//!
//! | Slot type | Stop | Run | Init / Pause / Fault / Safe |
//! |---|---|---|---|
//! | Logic, ML (with execute) | Denied | runs | Denied |
//! | Logic, ML (no execute) | Denied | Denied | Denied |
//! | Input, Output, Sensor, Actuator (with execute) | Denied | runs | runs |
//! | Input, Output, Sensor, Actuator (no execute) | Denied | Unsupported | Unsupported |
//!
//! A rejected call never reaches the slot.
//!
//! # Callback budgets
//!
//! Every `execute` and `handle_fault` call is armed on the [`Watchdog`] and
//! timed against the registry's [`Clock`].  An overrunning `execute` returns
//! [`EdgeError::Timeout`]; an overrunning fault handler yields a
//! runtime-timeout descriptor in the [`BroadcastReport`].  Neither is retried.
//!
//! While a callback runs, [`in_slot_callback`] is `true` on the calling
//! thread so the runtime can refuse re-entrant requests instead of
//! deadlocking on its own locks.

use std::cell::Cell;
use std::sync::Arc;

use edge_kernel::Watchdog;
use edge_types::{Clock, EdgeError, ErrorDescriptor, OperationalState, SlotId, TimeUs};
use tracing::{debug, info, warn};

use crate::slot::{SLOT_CONTRACT_VERSION, SlotCapabilities, SlotConfig, SlotDescriptor};
use crate::snapshot::{SlotSnapshot, SnapshotBuffer};

thread_local! {
    static IN_CALLBACK: Cell<bool> = const { Cell::new(false) };
}

/// `true` while the current thread is inside a slot callback.
pub fn in_slot_callback() -> bool {
    IN_CALLBACK.with(Cell::get)
}

/// Marks the current thread as inside a slot callback until dropped.
struct CallbackScope {
    previous: bool,
}

impl CallbackScope {
    fn enter() -> Self {
        Self {
            previous: IN_CALLBACK.with(|c| c.replace(true)),
        }
    }
}

impl Drop for CallbackScope {
    fn drop(&mut self) {
        IN_CALLBACK.with(|c| c.set(self.previous));
    }
}

/// Admission and timing limits of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryLimits {
    /// Lowest accepted slot contract version.
    pub min_version: u32,
    pub exec_budget_us: u64,
    pub fault_budget_us: u64,
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self {
            min_version: SLOT_CONTRACT_VERSION,
            exec_budget_us: 10_000,
            fault_budget_us: 1_000,
        }
    }
}

/// Outcome of [`SlotRegistry::broadcast_fault`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Number of fault handlers invoked.
    pub delivered: usize,
    /// One runtime-timeout descriptor per handler that overran its budget.
    pub timeouts: Vec<ErrorDescriptor>,
    /// The broadcast was re-entrant and therefore ignored.
    pub ignored: bool,
}

struct Entry {
    descriptor: SlotDescriptor,
    initialized: bool,
}

/// Ordered set of registered slots.
pub struct SlotRegistry {
    slots: Vec<Entry>,
    limits: RegistryLimits,
    watchdog: Arc<Watchdog>,
    clock: Arc<dyn Clock>,
}

impl SlotRegistry {
    pub fn new(limits: RegistryLimits, clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: Vec::new(),
            limits,
            watchdog: Arc::new(Watchdog::new()),
            clock,
        }
    }

    /// Share `watchdog` with an external monitor loop.
    pub fn with_watchdog(mut self, watchdog: Arc<Watchdog>) -> Self {
        self.watchdog = watchdog;
        self
    }

    pub fn watchdog(&self) -> &Arc<Watchdog> {
        &self.watchdog
    }

    pub fn limits(&self) -> RegistryLimits {
        self.limits
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, slot_id: SlotId) -> bool {
        self.position(slot_id).is_some()
    }

    /// Registered slot ids in registration order.
    pub fn ids(&self) -> Vec<SlotId> {
        self.slots.iter().map(|e| e.descriptor.id()).collect()
    }

    pub fn config(&self, slot_id: SlotId) -> Option<&SlotConfig> {
        self.get(slot_id).map(|e| &e.descriptor.config)
    }

    pub fn capabilities(&self, slot_id: SlotId) -> Option<&SlotCapabilities> {
        self.get(slot_id).map(|e| &e.descriptor.capabilities)
    }

    pub fn is_initialized(&self, slot_id: SlotId) -> bool {
        self.get(slot_id).is_some_and(|e| e.initialized)
    }

    /// Admit `descriptor`.
    ///
    /// # Errors
    ///
    /// - [`EdgeError::Unsupported`] – contract version below the minimum.
    /// - [`EdgeError::Invalid`] – duplicate slot id or invalid capabilities.
    pub fn register(&mut self, descriptor: SlotDescriptor) -> Result<(), EdgeError> {
        self.admit(&descriptor)?;
        if self.contains(descriptor.id()) {
            return Err(EdgeError::Invalid(format!(
                "slot {} is already registered",
                descriptor.id()
            )));
        }
        info!(
            slot_id = descriptor.id(),
            slot_type = %descriptor.config.slot_type,
            version = descriptor.config.version,
            "slot registered"
        );
        self.slots.push(Entry {
            descriptor,
            initialized: false,
        });
        Ok(())
    }

    /// Remove and return a slot.  Must not be called from inside one of the
    /// slot's own callbacks.
    ///
    /// # Errors
    ///
    /// [`EdgeError::Invalid`] if `slot_id` is not registered.
    pub fn unregister(&mut self, slot_id: SlotId) -> Result<SlotDescriptor, EdgeError> {
        let index = self.index_of(slot_id)?;
        let entry = self.slots.remove(index);
        self.watchdog.forget(slot_id);
        info!(slot_id, "slot unregistered");
        Ok(entry.descriptor)
    }

    /// Swap a registered slot for a new version at the same position.
    ///
    /// The replacement passes the same admission checks as
    /// [`register`](Self::register) and is initialized immediately; if
    /// initialization fails the previous slot stays in place.
    pub fn replace(&mut self, descriptor: SlotDescriptor) -> Result<SlotDescriptor, EdgeError> {
        self.admit(&descriptor)?;
        let index = self.index_of(descriptor.id())?;

        let mut entry = Entry {
            descriptor,
            initialized: false,
        };
        {
            let _scope = CallbackScope::enter();
            let config = entry.descriptor.config;
            entry.descriptor.slot.initialize(&config)?;
        }
        entry.initialized = true;

        let old = std::mem::replace(&mut self.slots[index], entry);
        info!(
            slot_id = old.descriptor.id(),
            from_version = old.descriptor.config.version,
            to_version = self.slots[index].descriptor.config.version,
            "slot replaced"
        );
        Ok(old.descriptor)
    }

    /// Run the initialize callback of one slot.
    ///
    /// # Errors
    ///
    /// - [`EdgeError::Denied`] – `state` is not `Init`.
    /// - [`EdgeError::Invalid`] – unknown slot, or already initialized.
    /// - whatever the slot's callback returns.
    pub fn initialize(&mut self, slot_id: SlotId, state: OperationalState) -> Result<(), EdgeError> {
        if state != OperationalState::Init {
            return Err(EdgeError::Denied(format!(
                "slot {slot_id} can only be initialized in Init, not {state}"
            )));
        }
        let index = self.index_of(slot_id)?;
        let entry = &mut self.slots[index];
        if entry.initialized {
            return Err(EdgeError::Invalid(format!("slot {slot_id} is already initialized")));
        }
        let config = entry.descriptor.config;
        {
            let _scope = CallbackScope::enter();
            entry.descriptor.slot.initialize(&config)?;
        }
        entry.initialized = true;
        debug!(slot_id, "slot initialized");
        Ok(())
    }

    /// Initialize every not-yet-initialized slot in registration order.
    /// Stops at the first failing slot.  Returns the number initialized.
    pub fn initialize_all(&mut self, state: OperationalState) -> Result<usize, EdgeError> {
        let pending: Vec<SlotId> = self
            .slots
            .iter()
            .filter(|e| !e.initialized)
            .map(|e| e.descriptor.id())
            .collect();
        for &slot_id in &pending {
            self.initialize(slot_id, state)?;
        }
        Ok(pending.len())
    }

    /// Admit and run one execute call of `slot_id` at `now` in `state`.
    ///
    /// # Errors
    ///
    /// - [`EdgeError::Invalid`] – unknown slot.
    /// - [`EdgeError::Denied`] – rejected by the capability or state gate.
    /// - [`EdgeError::Unsupported`] – a non-logic slot without execute.
    /// - [`EdgeError::Timeout`] – the call overran the execute budget.
    /// - whatever the slot's callback returns.
    pub fn execute(
        &mut self,
        slot_id: SlotId,
        state: OperationalState,
        now: TimeUs,
    ) -> Result<(), EdgeError> {
        let index = self.index_of(slot_id)?;
        let entry = &mut self.slots[index];
        admit_execute(&entry.descriptor, state)?;

        // `now` is the slot's notion of time; the budget runs on the registry
        // clock at both ends.
        let started = self.clock.now_us();
        self.watchdog.arm(slot_id, started, self.limits.exec_budget_us);
        let result = {
            let _scope = CallbackScope::enter();
            entry.descriptor.slot.execute(now)
        };
        let overrun = self.watchdog.disarm(slot_id, self.clock.now_us());

        match (result, overrun) {
            (Ok(()), Some(overrun_us)) => Err(EdgeError::Timeout(format!(
                "slot {slot_id} execute overran its {} µs budget by {overrun_us} µs",
                self.limits.exec_budget_us
            ))),
            (result, _) => result,
        }
    }

    /// Capture the state of `slot_id` into at most `max_len` bytes.
    ///
    /// # Errors
    ///
    /// [`EdgeError::Invalid`] if `slot_id` is not registered.
    pub fn snapshot(&self, slot_id: SlotId, max_len: usize) -> Result<SlotSnapshot, EdgeError> {
        let entry = self
            .get(slot_id)
            .ok_or_else(|| EdgeError::Invalid(format!("slot {slot_id} is not registered")))?;
        let mut buffer = SnapshotBuffer::new(max_len);
        {
            let _scope = CallbackScope::enter();
            entry.descriptor.slot.snapshot(&mut buffer);
        }
        if buffer.is_truncated() {
            debug!(slot_id, max_len, "slot snapshot truncated");
        }
        Ok(buffer.finish(slot_id))
    }

    /// Deliver `error` to every slot's fault handler in registration order.
    pub fn broadcast_fault(&mut self, error: &ErrorDescriptor) -> BroadcastReport {
        if in_slot_callback() {
            warn!(%error, "re-entrant fault broadcast ignored");
            return BroadcastReport {
                ignored: true,
                ..Default::default()
            };
        }

        let mut report = BroadcastReport::default();
        for entry in &mut self.slots {
            let slot_id = entry.descriptor.id();
            let start = self.clock.now_us();
            self.watchdog.arm(slot_id, start, self.limits.fault_budget_us);
            {
                let _scope = CallbackScope::enter();
                entry.descriptor.slot.handle_fault(error);
            }
            let end = self.clock.now_us();
            if self.watchdog.disarm(slot_id, end).is_some() {
                report.timeouts.push(ErrorDescriptor::slot_timeout(slot_id, end));
            }
            report.delivered += 1;
        }
        debug!(%error, delivered = report.delivered, timeouts = report.timeouts.len(), "fault broadcast");
        report
    }

    fn admit(&self, descriptor: &SlotDescriptor) -> Result<(), EdgeError> {
        let version = descriptor.config.version;
        if version < self.limits.min_version {
            warn!(
                slot_id = descriptor.id(),
                version,
                min_version = self.limits.min_version,
                "slot contract version too old"
            );
            return Err(EdgeError::Unsupported(format!(
                "slot {} contract version {version} is below minimum {}",
                descriptor.id(),
                self.limits.min_version
            )));
        }
        descriptor.capabilities.validate()
    }

    fn position(&self, slot_id: SlotId) -> Option<usize> {
        self.slots.iter().position(|e| e.descriptor.id() == slot_id)
    }

    fn index_of(&self, slot_id: SlotId) -> Result<usize, EdgeError> {
        self.position(slot_id)
            .ok_or_else(|| EdgeError::Invalid(format!("slot {slot_id} is not registered")))
    }

    fn get(&self, slot_id: SlotId) -> Option<&Entry> {
        self.position(slot_id).map(|i| &self.slots[i])
    }
}

fn admit_execute(descriptor: &SlotDescriptor, state: OperationalState) -> Result<(), EdgeError> {
    let slot_id = descriptor.id();
    let slot_type = descriptor.config.slot_type;
    if state == OperationalState::Stop {
        return Err(EdgeError::Denied(format!("slot {slot_id}: no execution in Stop")));
    }
    let executable = descriptor.slot.supports_execute();
    if slot_type.runs_user_logic() {
        if !executable {
            return Err(EdgeError::Denied(format!(
                "{slot_type} slot {slot_id} has no execute callback"
            )));
        }
        if !state.allows_user_logic() {
            return Err(EdgeError::Denied(format!(
                "{slot_type} slot {slot_id} cannot run user logic in {state}"
            )));
        }
    } else if !executable {
        return Err(EdgeError::Unsupported(format!(
            "{slot_type} slot {slot_id} has no execute callback"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{CallLog, SimSlot, SlotCall};
    use crate::slot::{ExecModel, SlotType};
    use edge_types::{
        Authority, ErrorClass, FaultPolicy, ManualClock, Origin, ResultCode, Severity, SystemClock,
        codes, describe,
    };
    use OperationalState::*;

    struct Fixture {
        clock: Arc<ManualClock>,
        log: CallLog,
        registry: SlotRegistry,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(1_000));
        let registry = SlotRegistry::new(RegistryLimits::default(), clock.clone());
        Fixture {
            clock,
            log: CallLog::default(),
            registry,
        }
    }

    impl Fixture {
        fn add(&mut self, id: SlotId, slot_type: SlotType) {
            let slot = SimSlot::new(id, self.log.clone()).executable();
            self.registry
                .register(crate::sim::descriptor(id, slot_type, slot))
                .unwrap();
        }
    }

    fn fault() -> ErrorDescriptor {
        describe(
            ErrorClass::Fault,
            codes::fault::IO_FAILURE,
            Severity::Fault,
            Origin::Slot,
            Authority::Slot,
            FaultPolicy::Safe,
            0,
        )
    }

    // ────────────────────────────────────────────────────────────────────────
    // Admission
    // ────────────────────────────────────────────────────────────────────────

    #[test]
    fn old_contract_version_is_unsupported() {
        let mut fx = fixture();
        fx.registry = SlotRegistry::new(
            RegistryLimits {
                min_version: 2,
                ..Default::default()
            },
            fx.clock.clone(),
        );
        let slot = SimSlot::new(1, fx.log.clone());
        let result = fx
            .registry
            .register(crate::sim::descriptor(1, SlotType::Sensor, slot));
        assert_eq!(ResultCode::of(&result), ResultCode::Unsupported);
        assert!(fx.registry.is_empty());
    }

    #[test]
    fn duplicate_id_is_invalid_and_keeps_original() {
        let mut fx = fixture();
        fx.add(1, SlotType::Sensor);
        let dup = crate::sim::descriptor(1, SlotType::Logic, SimSlot::new(1, fx.log.clone()));
        let result = fx.registry.register(dup);
        assert_eq!(ResultCode::of(&result), ResultCode::Invalid);
        assert_eq!(fx.registry.len(), 1);
        assert_eq!(fx.registry.config(1).unwrap().slot_type, SlotType::Sensor);
    }

    #[test]
    fn invalid_capabilities_are_rejected() {
        let mut fx = fixture();
        let mut d = crate::sim::descriptor(1, SlotType::Sensor, SimSlot::new(1, fx.log.clone()));
        d.capabilities.exec_model = ExecModel::Hybrid;
        d.capabilities.max_frequency_hz = 0;
        assert_eq!(ResultCode::of(&fx.registry.register(d)), ResultCode::Invalid);
    }

    #[test]
    fn registration_order_is_preserved() {
        let mut fx = fixture();
        for id in [7, 3, 5] {
            fx.add(id, SlotType::Sensor);
        }
        assert_eq!(fx.registry.ids(), vec![7, 3, 5]);
        fx.registry.unregister(3).unwrap();
        assert_eq!(fx.registry.ids(), vec![7, 5]);
        assert_eq!(
            ResultCode::of(&fx.registry.unregister(3)),
            ResultCode::Invalid
        );
    }

    // ────────────────────────────────────────────────────────────────────────
    // Initialize
    // ────────────────────────────────────────────────────────────────────────

    #[test]
    fn initialize_only_in_init_and_only_once() {
        let mut fx = fixture();
        fx.add(1, SlotType::Sensor);
        fx.add(2, SlotType::Logic);

        assert_eq!(
            ResultCode::of(&fx.registry.initialize(1, Run)),
            ResultCode::Denied
        );
        assert_eq!(fx.registry.initialize_all(Init).unwrap(), 2);
        assert!(fx.registry.is_initialized(1));
        assert_eq!(
            ResultCode::of(&fx.registry.initialize(1, Init)),
            ResultCode::Invalid
        );
        assert_eq!(fx.registry.initialize_all(Init).unwrap(), 0);
        assert_eq!(
            fx.log.calls(),
            vec![SlotCall::Initialize(1), SlotCall::Initialize(2)]
        );
    }

    #[test]
    fn failed_initialize_leaves_slot_uninitialized() {
        let mut fx = fixture();
        let slot = SimSlot::new(1, fx.log.clone()).failing_init();
        fx.registry
            .register(crate::sim::descriptor(1, SlotType::Input, slot))
            .unwrap();
        assert!(fx.registry.initialize(1, Init).is_err());
        assert!(!fx.registry.is_initialized(1));
    }

    // ────────────────────────────────────────────────────────────────────────
    // Execute
    // ────────────────────────────────────────────────────────────────────────

    #[test]
    fn logic_slot_is_denied_outside_run_without_side_effect() {
        let mut fx = fixture();
        fx.add(1, SlotType::Logic);
        for state in [Init, Pause, Fault, Safe, Stop] {
            assert_eq!(
                ResultCode::of(&fx.registry.execute(1, state, 0)),
                ResultCode::Denied,
                "{state}"
            );
        }
        assert!(fx.log.executions(1).is_empty());
        assert!(fx.registry.execute(1, Run, 5).is_ok());
        assert_eq!(fx.log.executions(1), vec![5]);
    }

    #[test]
    fn logic_slot_without_execute_is_denied_even_in_run() {
        let mut fx = fixture();
        let slot = SimSlot::new(1, fx.log.clone());
        fx.registry
            .register(crate::sim::descriptor(1, SlotType::Ml, slot))
            .unwrap();
        assert_eq!(
            ResultCode::of(&fx.registry.execute(1, Run, 0)),
            ResultCode::Denied
        );
    }

    #[test]
    fn sensor_slot_runs_in_every_state_but_stop() {
        let mut fx = fixture();
        fx.add(1, SlotType::Sensor);
        for state in [Init, Run, Pause, Fault, Safe] {
            assert!(fx.registry.execute(1, state, 0).is_ok(), "{state}");
        }
        assert_eq!(
            ResultCode::of(&fx.registry.execute(1, Stop, 0)),
            ResultCode::Denied
        );
        assert_eq!(fx.log.executions(1).len(), 5);
    }

    #[test]
    fn non_logic_slot_without_execute_is_unsupported() {
        let mut fx = fixture();
        let slot = SimSlot::new(1, fx.log.clone());
        fx.registry
            .register(crate::sim::descriptor(1, SlotType::Actuator, slot))
            .unwrap();
        assert_eq!(
            ResultCode::of(&fx.registry.execute(1, Run, 0)),
            ResultCode::Unsupported
        );
    }

    #[test]
    fn unknown_slot_is_invalid() {
        let mut fx = fixture();
        assert_eq!(
            ResultCode::of(&fx.registry.execute(42, Run, 0)),
            ResultCode::Invalid
        );
        assert_eq!(
            ResultCode::of(&fx.registry.snapshot(42, 8)),
            ResultCode::Invalid
        );
    }

    #[test]
    fn overrunning_execute_times_out() {
        let mut fx = fixture();
        let budget = RegistryLimits::default().exec_budget_us;
        let slot = SimSlot::new(1, fx.log.clone())
            .executable()
            .busy_for(fx.clock.clone(), budget + 1);
        fx.registry
            .register(crate::sim::descriptor(1, SlotType::Sensor, slot))
            .unwrap();
        let now = fx.clock.now_us();
        assert_eq!(
            ResultCode::of(&fx.registry.execute(1, Run, now)),
            ResultCode::Timeout
        );
        assert_eq!(fx.log.executions(1).len(), 1, "callback ran once");
    }

    #[test]
    fn execute_budget_ignores_the_callers_time_base() {
        let clock = Arc::new(ManualClock::new(5_000_000));
        let log = CallLog::default();
        let mut registry = SlotRegistry::new(RegistryLimits::default(), clock);
        registry
            .register(crate::sim::descriptor(
                1,
                SlotType::Sensor,
                SimSlot::new(1, log.clone()).executable(),
            ))
            .unwrap();

        registry.execute(1, Run, 0).unwrap();
        registry.execute(1, Run, u64::MAX / 2).unwrap();
        assert_eq!(log.executions(1), vec![0, u64::MAX / 2]);
    }

    #[test]
    fn instant_execute_fits_the_budget_on_the_system_clock() {
        let log = CallLog::default();
        let mut registry = SlotRegistry::new(RegistryLimits::default(), Arc::new(SystemClock));
        registry
            .register(crate::sim::descriptor(
                1,
                SlotType::Sensor,
                SimSlot::new(1, log.clone()).executable(),
            ))
            .unwrap();
        assert!(registry.execute(1, Run, 0).is_ok());
    }

    #[test]
    fn execute_reports_in_callback_flag() {
        struct FlagReader(Arc<std::sync::atomic::AtomicBool>);
        impl crate::slot::Slot for FlagReader {
            fn supports_execute(&self) -> bool {
                true
            }
            fn execute(&mut self, _now: TimeUs) -> Result<(), EdgeError> {
                self.0
                    .store(in_slot_callback(), std::sync::atomic::Ordering::SeqCst);
                Ok(())
            }
        }
        let seen = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let mut fx = fixture();
        fx.registry
            .register(crate::sim::descriptor(
                1,
                SlotType::Input,
                FlagReader(seen.clone()),
            ))
            .unwrap();
        fx.registry.execute(1, Run, 0).unwrap();
        assert!(seen.load(std::sync::atomic::Ordering::SeqCst));
        assert!(!in_slot_callback());
    }

    // ────────────────────────────────────────────────────────────────────────
    // Snapshot
    // ────────────────────────────────────────────────────────────────────────

    #[test]
    fn snapshot_is_bounded() {
        let mut fx = fixture();
        let slot = SimSlot::new(1, fx.log.clone()).with_state(b"0123456789".to_vec());
        fx.registry
            .register(crate::sim::descriptor(1, SlotType::Sensor, slot))
            .unwrap();

        let full = fx.registry.snapshot(1, 64).unwrap();
        assert_eq!(full.bytes, b"0123456789");
        assert!(!full.truncated);

        let cut = fx.registry.snapshot(1, 4).unwrap();
        assert_eq!(cut.bytes, b"0123");
        assert!(cut.truncated);
    }

    // ────────────────────────────────────────────────────────────────────────
    // Broadcast
    // ────────────────────────────────────────────────────────────────────────

    #[test]
    fn broadcast_reaches_every_slot_in_order() {
        let mut fx = fixture();
        for id in [3, 1, 2] {
            fx.add(id, SlotType::Sensor);
        }
        let error = fault();
        let report = fx.registry.broadcast_fault(&error);
        assert_eq!(report.delivered, 3);
        assert!(report.timeouts.is_empty());
        assert_eq!(
            fx.log.calls(),
            vec![
                SlotCall::HandleFault(3, error.clone()),
                SlotCall::HandleFault(1, error.clone()),
                SlotCall::HandleFault(2, error),
            ]
        );
    }

    #[test]
    fn slow_fault_handler_yields_timeout_descriptor() {
        let mut fx = fixture();
        fx.add(1, SlotType::Sensor);
        let slow = SimSlot::new(2, fx.log.clone())
            .slow_fault_handler(fx.clock.clone(), RegistryLimits::default().fault_budget_us + 50);
        fx.registry
            .register(crate::sim::descriptor(2, SlotType::Actuator, slow))
            .unwrap();

        let report = fx.registry.broadcast_fault(&fault());
        assert_eq!(report.delivered, 2);
        assert_eq!(report.timeouts.len(), 1);
        let timeout = &report.timeouts[0];
        assert_eq!(timeout.class, ErrorClass::Runtime);
        assert_eq!(timeout.code, codes::runtime::TIMEOUT);
        assert_eq!(timeout.origin, Origin::Slot);
        assert_eq!(timeout.slot, Some(2));
        // Not retried.
        assert_eq!(fx.log.faults(2).len(), 1);
    }

    #[test]
    fn broadcast_from_inside_a_callback_is_ignored() {
        struct Nested {
            inner: Option<SlotRegistry>,
            report: Arc<std::sync::Mutex<Option<BroadcastReport>>>,
        }
        impl crate::slot::Slot for Nested {
            fn handle_fault(&mut self, error: &ErrorDescriptor) {
                if let Some(inner) = self.inner.as_mut() {
                    let r = inner.broadcast_fault(error);
                    *self.report.lock().unwrap() = Some(r);
                }
            }
        }

        let fx = fixture();
        let mut inner = SlotRegistry::new(RegistryLimits::default(), fx.clock.clone());
        inner
            .register(crate::sim::descriptor(
                9,
                SlotType::Sensor,
                SimSlot::new(9, fx.log.clone()),
            ))
            .unwrap();
        let report = Arc::new(std::sync::Mutex::new(None));
        let mut outer = SlotRegistry::new(RegistryLimits::default(), fx.clock.clone());
        outer
            .register(crate::sim::descriptor(
                1,
                SlotType::Logic,
                Nested {
                    inner: Some(inner),
                    report: report.clone(),
                },
            ))
            .unwrap();

        outer.broadcast_fault(&fault());
        let nested = report.lock().unwrap().clone().unwrap();
        assert!(nested.ignored);
        assert_eq!(nested.delivered, 0);
        assert!(fx.log.faults(9).is_empty());
    }

    // ────────────────────────────────────────────────────────────────────────
    // Replace
    // ────────────────────────────────────────────────────────────────────────

    #[test]
    fn replace_keeps_position_and_initializes() {
        let mut fx = fixture();
        fx.add(1, SlotType::Sensor);
        fx.add(2, SlotType::Sensor);
        let mut new = crate::sim::descriptor(1, SlotType::Sensor, SimSlot::new(1, fx.log.clone()));
        new.config.version = 2;
        let old = fx.registry.replace(new).unwrap();
        assert_eq!(old.config.version, 1);
        assert_eq!(fx.registry.ids(), vec![1, 2]);
        assert_eq!(fx.registry.config(1).unwrap().version, 2);
        assert!(fx.registry.is_initialized(1));
    }

    #[test]
    fn replace_unknown_slot_is_invalid() {
        let mut fx = fixture();
        let d = crate::sim::descriptor(8, SlotType::Sensor, SimSlot::new(8, fx.log.clone()));
        assert_eq!(ResultCode::of(&fx.registry.replace(d)), ResultCode::Invalid);
    }
}
