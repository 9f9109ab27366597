//! Error/fault classifier.
//!
//! Every error raised inside the runtime is a fully qualified
//! [`ErrorDescriptor`]: class, class-scoped code, severity, origin, authority,
//! fault policy and timestamp.  There is no constructor that omits severity,
//! origin or authority, so anonymous errors cannot exist.
//!
//! [`classify`] splits classes into operational errors (recovered locally by
//! the raising collaborator), faults (always escalated) and contract
//! violations (always escalated, never ignorable).

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::taxonomy::{Authority, EdgeId, FaultPolicy, Origin, Severity, SlotId, TimeUs};

/// Class of an error.  Codes are unique only within a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ErrorClass {
    /// Operational: runtime misbehavior (timeouts, overflow, ...).
    Runtime,
    /// Operational: link or protocol trouble.
    Communication,
    /// Operational: memory, CPU or queue exhaustion.
    Resource,
    /// Functional fault (slot, I/O, power, clock).
    Fault,
    /// Safety fault.
    Safety,
    /// Contract violation.
    Violation,
}

impl ErrorClass {
    /// Operational classes are not escalated by the core.
    pub const fn is_operational(self) -> bool {
        matches!(self, Self::Runtime | Self::Communication | Self::Resource)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Runtime => write!(f, "runtime"),
            Self::Communication => write!(f, "communication"),
            Self::Resource => write!(f, "resource"),
            Self::Fault => write!(f, "fault"),
            Self::Safety => write!(f, "safety"),
            Self::Violation => write!(f, "violation"),
        }
    }
}

/// Class-scoped error codes of the slot contract.
pub mod codes {
    pub mod runtime {
        pub const TIMEOUT: u32 = 0x0001;
        pub const OVERFLOW: u32 = 0x0002;
        pub const UNDERFLOW: u32 = 0x0003;
        pub const INVALID_STATE: u32 = 0x0004;
    }

    pub mod communication {
        pub const LOST: u32 = 0x0101;
        pub const CRC: u32 = 0x0102;
        pub const PROTOCOL: u32 = 0x0103;
    }

    pub mod resource {
        pub const MEMORY: u32 = 0x0201;
        pub const CPU: u32 = 0x0202;
        pub const QUEUE_FULL: u32 = 0x0203;
    }

    pub mod fault {
        pub const SLOT_FAILURE: u32 = 0x1001;
        pub const IO_FAILURE: u32 = 0x1002;
        pub const POWER_FAILURE: u32 = 0x1003;
        pub const CLOCK_FAILURE: u32 = 0x1004;
    }

    pub mod safety {
        pub const LIMIT: u32 = 0x2001;
        pub const OVERRIDE: u32 = 0x2002;
        pub const INTEGRITY: u32 = 0x2003;
    }

    pub mod violation {
        pub const INVALID_TRANSITION: u32 = 0xF001;
        pub const UNAUTHORIZED: u32 = 0xF002;
        pub const INVALID_SLOT: u32 = 0xF003;
        pub const POLICY_BREACH: u32 = 0xF004;
    }
}

/// Result of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub is_fault: bool,
    pub is_violation: bool,
}

/// Classify an error class as fault and/or violation.
pub const fn classify(class: ErrorClass) -> Classification {
    Classification {
        is_fault: matches!(class, ErrorClass::Fault | ErrorClass::Safety),
        is_violation: matches!(class, ErrorClass::Violation),
    }
}

/// A fully qualified error or fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorDescriptor {
    pub class: ErrorClass,
    pub code: EdgeId,
    pub severity: Severity,
    pub origin: Origin,
    pub authority: Authority,
    pub policy: FaultPolicy,
    pub timestamp: TimeUs,
    /// Slot that raised the error, when the origin is a slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<SlotId>,
}

/// Compose an [`ErrorDescriptor`].  Pure and total.
pub fn describe(
    class: ErrorClass,
    code: EdgeId,
    severity: Severity,
    origin: Origin,
    authority: Authority,
    policy: FaultPolicy,
    now: TimeUs,
) -> ErrorDescriptor {
    ErrorDescriptor {
        class,
        code,
        severity,
        origin,
        authority,
        policy,
        timestamp: now,
        slot: None,
    }
}

impl ErrorDescriptor {
    /// Attribute the descriptor to the slot that raised it.
    pub fn with_slot(mut self, slot_id: SlotId) -> Self {
        self.slot = Some(slot_id);
        self
    }

    pub fn classification(&self) -> Classification {
        classify(self.class)
    }

    /// Faults and violations must reach the escalation engine.
    pub fn requires_escalation(&self) -> bool {
        let c = self.classification();
        c.is_fault || c.is_violation
    }

    /// Policy actually applied by escalation.  Violations bypass
    /// [`FaultPolicy::Ignore`] and are contained in `Safe` at minimum.
    pub fn effective_policy(&self) -> FaultPolicy {
        if self.class == ErrorClass::Violation && self.policy == FaultPolicy::Ignore {
            FaultPolicy::Safe
        } else {
            self.policy
        }
    }

    /// Severity actually applied.  Violations are always critical.
    pub fn effective_severity(&self) -> Severity {
        if self.class == ErrorClass::Violation {
            Severity::Critical
        } else {
            self.severity
        }
    }

    /// Protected descriptors may never be dropped by the fault queue: Safety
    /// and Violation errors, and anything of `Fault` severity or above.
    pub fn is_protected(&self) -> bool {
        matches!(self.class, ErrorClass::Safety | ErrorClass::Violation)
            || self.effective_severity() >= Severity::Fault
    }

    /// The runtime-timeout descriptor reported for a slot whose callback
    /// overran its budget.
    pub fn slot_timeout(slot_id: SlotId, now: TimeUs) -> Self {
        describe(
            ErrorClass::Runtime,
            codes::runtime::TIMEOUT,
            Severity::Alarm,
            Origin::Slot,
            Authority::Internal,
            FaultPolicy::Ignore,
            now,
        )
        .with_slot(slot_id)
    }
}

impl fmt::Display for ErrorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{:#06x} severity={} origin={} policy={}",
            self.class, self.code, self.severity, self.origin, self.policy
        )?;
        if let Some(slot) = self.slot {
            write!(f, " slot={slot}")?;
        }
        Ok(())
    }
}
