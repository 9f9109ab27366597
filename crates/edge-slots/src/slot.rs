//! The slot contract: the [`Slot`] callback trait and the immutable
//! configuration a slot is registered with.
//!
//! Slot implementations register through a [`SlotDescriptor`] with the
//! [`SlotRegistry`][crate::registry::SlotRegistry].  The rest of the runtime
//! only ever talks to the trait, so slot variants (input, sensor, ML, ...)
//! can be swapped without touching the supervisor.

use edge_types::{BehaviorFlags, EdgeError, ErrorDescriptor, FaultPolicy, SlotId, TimeUs};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::snapshot::SnapshotBuffer;

/// Highest slot contract version this runtime understands.
pub const SLOT_CONTRACT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotType {
    Input,
    Output,
    Sensor,
    Actuator,
    Logic,
    Ml,
}

impl SlotType {
    /// Logic and ML slots run user logic and are gated by the operational
    /// state.
    pub const fn runs_user_logic(self) -> bool {
        matches!(self, SlotType::Logic | SlotType::Ml)
    }
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SlotType::Input => "input",
            SlotType::Output => "output",
            SlotType::Sensor => "sensor",
            SlotType::Actuator => "actuator",
            SlotType::Logic => "logic",
            SlotType::Ml => "ml",
        };
        f.write_str(s)
    }
}

/// How the external scheduler drives a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecModel {
    #[default]
    EventDriven,
    Cyclic,
    Hybrid,
}

/// What a slot declares about itself.  Immutable after registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SlotCapabilities {
    pub flags: BehaviorFlags,
    pub exec_model: ExecModel,
    pub max_frequency_hz: u32,
    pub min_latency_us: u32,
}

impl SlotCapabilities {
    /// # Errors
    ///
    /// [`EdgeError::Invalid`] when a cyclic or hybrid slot declares no
    /// frequency.
    pub fn validate(&self) -> Result<(), EdgeError> {
        match self.exec_model {
            ExecModel::Cyclic | ExecModel::Hybrid if self.max_frequency_hz == 0 => {
                Err(EdgeError::Invalid(format!(
                    "{:?} slot must declare max_frequency_hz > 0",
                    self.exec_model
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Registration-time configuration of a slot.  Never mutated; changing it
/// means replacing the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotConfig {
    pub slot_id: SlotId,
    pub slot_type: SlotType,
    pub version: u32,
    pub fault_policy: FaultPolicy,
}

impl SlotConfig {
    pub fn new(slot_id: SlotId, slot_type: SlotType, fault_policy: FaultPolicy) -> Self {
        Self {
            slot_id,
            slot_type,
            version: SLOT_CONTRACT_VERSION,
            fault_policy,
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }
}

/// Callback surface of an execution unit.
///
/// Every callback is expected to return within the budget the registry
/// enforces; overruns are reported as runtime-timeout faults.
pub trait Slot: Send {
    /// Called once, while the runtime is in `Init`.
    fn initialize(&mut self, config: &SlotConfig) -> Result<(), EdgeError> {
        let _ = config;
        Ok(())
    }

    /// Whether [`Slot::execute`] is implemented.  Slots without an execute
    /// callback are never executed.
    fn supports_execute(&self) -> bool {
        false
    }

    /// One unit of work at time `now`.
    fn execute(&mut self, now: TimeUs) -> Result<(), EdgeError> {
        let _ = now;
        Err(EdgeError::Unsupported("slot has no execute callback".into()))
    }

    /// Observe a fault being escalated.  Must not raise faults itself.
    fn handle_fault(&mut self, error: &ErrorDescriptor) {
        let _ = error;
    }

    /// Write internal state into `out`.  Writes past the bound are truncated
    /// by the buffer, never an error.
    fn snapshot(&self, out: &mut SnapshotBuffer) {
        let _ = out;
    }
}

/// A slot as handed to the registry: configuration, capabilities and
/// callbacks.
pub struct SlotDescriptor {
    pub config: SlotConfig,
    pub capabilities: SlotCapabilities,
    pub slot: Box<dyn Slot>,
}

impl SlotDescriptor {
    pub fn new(config: SlotConfig, capabilities: SlotCapabilities, slot: Box<dyn Slot>) -> Self {
        Self {
            config,
            capabilities,
            slot,
        }
    }

    pub fn id(&self) -> SlotId {
        self.config.slot_id
    }

    pub fn is_deterministic(&self) -> bool {
        self.capabilities.flags.is_deterministic()
    }

    pub fn is_safety_critical(&self) -> bool {
        self.capabilities.flags.safety_critical
    }

    pub fn is_audit_required(&self) -> bool {
        self.capabilities.flags.audit_required
    }
}

impl fmt::Debug for SlotDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotDescriptor")
            .field("config", &self.config)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}
