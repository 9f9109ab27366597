//! In-process simulated slots for headless testing.
//!
//! [`SimSlot`] records every callback invocation into a shared [`CallLog`]
//! so tests can assert on exactly which callbacks ran, in which order and
//! with which arguments.  Optional knobs make a slot executable, slow (by
//! advancing a [`ManualClock`] inside the callback), failing at init, or
//! holding snapshot state.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use edge_slots::registry::{RegistryLimits, SlotRegistry};
//! use edge_slots::sim::{self, CallLog, SimSlot};
//! use edge_slots::slot::SlotType;
//! use edge_types::{ManualClock, OperationalState};
//!
//! let log = CallLog::default();
//! let mut registry = SlotRegistry::new(RegistryLimits::default(), Arc::new(ManualClock::new(0)));
//! registry
//!     .register(sim::descriptor(1, SlotType::Sensor, SimSlot::new(1, log.clone()).executable()))
//!     .expect("sim slot must register");
//! registry.execute(1, OperationalState::Pause, 0).expect("sensors run while paused");
//! assert_eq!(log.executions(1), vec![0]);
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use edge_types::{EdgeError, ErrorDescriptor, FaultPolicy, ManualClock, SlotId, TimeUs};

use crate::slot::{Slot, SlotCapabilities, SlotConfig, SlotDescriptor, SlotType};
use crate::snapshot::SnapshotBuffer;

/// One recorded callback invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotCall {
    Initialize(SlotId),
    Execute(SlotId, TimeUs),
    HandleFault(SlotId, ErrorDescriptor),
    Snapshot(SlotId),
}

/// Shared, append-only record of slot callbacks.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<SlotCall>>>,
}

impl CallLog {
    fn push(&self, call: SlotCall) {
        self.lock().push(call);
    }

    pub fn calls(&self) -> Vec<SlotCall> {
        self.lock().clone()
    }

    /// `now` arguments of every execute call on `slot_id`.
    pub fn executions(&self, slot_id: SlotId) -> Vec<TimeUs> {
        self.lock()
            .iter()
            .filter_map(|c| match c {
                SlotCall::Execute(id, now) if *id == slot_id => Some(*now),
                _ => None,
            })
            .collect()
    }

    /// Faults delivered to `slot_id`.
    pub fn faults(&self, slot_id: SlotId) -> Vec<ErrorDescriptor> {
        self.lock()
            .iter()
            .filter_map(|c| match c {
                SlotCall::HandleFault(id, e) if *id == slot_id => Some(e.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SlotCall>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A simulated slot.  Every callback succeeds unless configured otherwise.
pub struct SimSlot {
    id: SlotId,
    log: CallLog,
    executable: bool,
    fail_init: bool,
    exec_delay: Option<(Arc<ManualClock>, u64)>,
    fault_delay: Option<(Arc<ManualClock>, u64)>,
    state: Vec<u8>,
}

impl SimSlot {
    pub fn new(id: SlotId, log: CallLog) -> Self {
        Self {
            id,
            log,
            executable: false,
            fail_init: false,
            exec_delay: None,
            fault_delay: None,
            state: Vec::new(),
        }
    }

    /// Provide an execute callback.
    pub fn executable(mut self) -> Self {
        self.executable = true;
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Each execute call advances `clock` by `delay_us`.
    pub fn busy_for(mut self, clock: Arc<ManualClock>, delay_us: u64) -> Self {
        self.exec_delay = Some((clock, delay_us));
        self
    }

    /// Each fault handler call advances `clock` by `delay_us`.
    pub fn slow_fault_handler(mut self, clock: Arc<ManualClock>, delay_us: u64) -> Self {
        self.fault_delay = Some((clock, delay_us));
        self
    }

    /// Bytes written by the snapshot callback.
    pub fn with_state(mut self, state: Vec<u8>) -> Self {
        self.state = state;
        self
    }
}

impl Slot for SimSlot {
    fn initialize(&mut self, _config: &SlotConfig) -> Result<(), EdgeError> {
        self.log.push(SlotCall::Initialize(self.id));
        if self.fail_init {
            return Err(EdgeError::Error(format!("sim slot {} failed to initialize", self.id)));
        }
        Ok(())
    }

    fn supports_execute(&self) -> bool {
        self.executable
    }

    fn execute(&mut self, now: TimeUs) -> Result<(), EdgeError> {
        self.log.push(SlotCall::Execute(self.id, now));
        if let Some((clock, delay)) = &self.exec_delay {
            clock.advance(*delay);
        }
        Ok(())
    }

    fn handle_fault(&mut self, error: &ErrorDescriptor) {
        self.log.push(SlotCall::HandleFault(self.id, error.clone()));
        if let Some((clock, delay)) = &self.fault_delay {
            clock.advance(*delay);
        }
    }

    fn snapshot(&self, out: &mut SnapshotBuffer) {
        self.log.push(SlotCall::Snapshot(self.id));
        out.write(&self.state);
    }
}

/// Wrap `slot` in a descriptor with default capabilities and an `Ignore`
/// fault policy.
pub fn descriptor(id: SlotId, slot_type: SlotType, slot: impl Slot + 'static) -> SlotDescriptor {
    SlotDescriptor::new(
        SlotConfig::new(id, slot_type, FaultPolicy::Ignore),
        SlotCapabilities::default(),
        Box::new(slot),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_slot_records_calls() {
        let log = CallLog::default();
        let mut slot = SimSlot::new(4, log.clone()).executable().with_state(vec![1, 2]);
        let cfg = SlotConfig::new(4, SlotType::Logic, FaultPolicy::Pause);
        slot.initialize(&cfg).unwrap();
        slot.execute(17).unwrap();
        let mut buf = SnapshotBuffer::new(1);
        slot.snapshot(&mut buf);

        assert_eq!(
            log.calls(),
            vec![
                SlotCall::Initialize(4),
                SlotCall::Execute(4, 17),
                SlotCall::Snapshot(4)
            ]
        );
        assert!(buf.is_truncated());
        log.clear();
        assert!(log.calls().is_empty());
    }

    #[test]
    fn busy_slot_advances_clock() {
        use edge_types::Clock;
        let clock = Arc::new(ManualClock::new(0));
        let mut slot = SimSlot::new(1, CallLog::default())
            .executable()
            .busy_for(clock.clone(), 250);
        slot.execute(0).unwrap();
        assert_eq!(clock.now_us(), 250);
    }
}
