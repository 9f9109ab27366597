//! Identifiers, time base, severities, authorities, origins, operational
//! states and fault policies shared by every crate of the runtime.
//!
//! Everything in this module is plain data.  The only behavior is the set of
//! per-state capability predicates on [`OperationalState`], which are pure
//! functions of the state value.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Generic numeric identifier (class-scoped error codes, etc.).
pub type EdgeId = u32;
/// Unique identifier of a slot within a registry.
pub type SlotId = u32;
/// Identifier of a raw collaborator event.
pub type EventId = u32;
/// Deterministic time base in microseconds.
pub type TimeUs = u64;

// ────────────────────────────────────────────────────────────────────────────
// Severity
// ────────────────────────────────────────────────────────────────────────────

/// Escalation weight of an event or error.  Ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum Severity {
    Info,
    Warning,
    Alarm,
    Fault,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Alarm => write!(f, "alarm"),
            Self::Fault => write!(f, "fault"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Authority & origin
// ────────────────────────────────────────────────────────────────────────────

/// Actor class on whose behalf an action (e.g. a state transition) is
/// requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Authority {
    /// The supervisory core itself.
    Internal,
    /// A registered slot.
    Slot,
    /// The external gateway collaborator.
    Gateway,
    /// User logic running inside a Logic/ML slot.
    User,
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal => write!(f, "internal"),
            Self::Slot => write!(f, "slot"),
            Self::Gateway => write!(f, "gateway"),
            Self::User => write!(f, "user"),
        }
    }
}

/// Where an event or fault was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Origin {
    Core,
    Slot,
    Gateway,
    Power,
    Unknown,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Core => write!(f, "core"),
            Self::Slot => write!(f, "slot"),
            Self::Gateway => write!(f, "gateway"),
            Self::Power => write!(f, "power"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Operational state
// ────────────────────────────────────────────────────────────────────────────

/// The six operational states of the runtime.
///
/// The declaration order defines the state ordinal
/// (`Init < Run < Pause < Fault < Safe < Stop`), which the escalation engine
/// uses for deterministic tie-breaking.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum OperationalState {
    Init,
    Run,
    Pause,
    Fault,
    Safe,
    Stop,
}

impl OperationalState {
    /// Number of operational states.
    pub const COUNT: usize = 6;

    /// Every state in ordinal order.
    pub const ALL: [OperationalState; Self::COUNT] = [
        Self::Init,
        Self::Run,
        Self::Pause,
        Self::Fault,
        Self::Safe,
        Self::Stop,
    ];

    /// Zero-based ordinal of the state.
    pub const fn ordinal(self) -> usize {
        self as usize
    }

    /// Inverse of [`ordinal`][Self::ordinal].
    pub fn from_ordinal(ordinal: usize) -> Option<Self> {
        Self::ALL.get(ordinal).copied()
    }

    /// User logic (Logic/ML slots) may only execute in `Run`.
    pub const fn allows_user_logic(self) -> bool {
        matches!(self, Self::Run)
    }

    /// Slot configuration may change in `Init` and `Pause`.
    pub const fn allows_reconfiguration(self) -> bool {
        matches!(self, Self::Init | Self::Pause)
    }

    /// External communication is allowed in every state except `Stop`.
    pub const fn allows_gateway(self) -> bool {
        !matches!(self, Self::Stop)
    }

    /// Slot updates are only safe while paused.
    pub const fn allows_update(self) -> bool {
        matches!(self, Self::Pause)
    }

    /// How contained the system is in this state.
    ///
    /// `Init`/`Run` are uncontained, `Pause`/`Fault` hold user logic,
    /// `Safe` holds all outputs and `Stop` is terminal.
    pub const fn containment_rank(self) -> u8 {
        match self {
            Self::Init | Self::Run => 0,
            Self::Pause | Self::Fault => 1,
            Self::Safe => 2,
            Self::Stop => 3,
        }
    }
}

impl fmt::Display for OperationalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "INIT"),
            Self::Run => write!(f, "RUN"),
            Self::Pause => write!(f, "PAUSE"),
            Self::Fault => write!(f, "FAULT"),
            Self::Safe => write!(f, "SAFE"),
            Self::Stop => write!(f, "STOP"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Fault policy
// ────────────────────────────────────────────────────────────────────────────

/// Minimum containment state a fault must be escalated toward.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum FaultPolicy {
    Ignore,
    Pause,
    Safe,
    Stop,
}

impl FaultPolicy {
    /// The state this policy escalates toward, or `None` for
    /// [`FaultPolicy::Ignore`].
    pub const fn target_state(self) -> Option<OperationalState> {
        match self {
            Self::Ignore => None,
            Self::Pause => Some(OperationalState::Pause),
            Self::Safe => Some(OperationalState::Safe),
            Self::Stop => Some(OperationalState::Stop),
        }
    }
}

impl fmt::Display for FaultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ignore => write!(f, "ignore"),
            Self::Pause => write!(f, "pause"),
            Self::Safe => write!(f, "safe"),
            Self::Stop => write!(f, "stop"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OperationalState::*;

    #[test]
    fn ordinals_follow_declaration_order() {
        for (i, state) in OperationalState::ALL.iter().enumerate() {
            assert_eq!(state.ordinal(), i);
            assert_eq!(OperationalState::from_ordinal(i), Some(*state));
        }
        assert_eq!(OperationalState::from_ordinal(6), None);
        assert!(Init < Run && Run < Pause && Pause < Fault && Fault < Safe && Safe < Stop);
    }

    #[test]
    fn user_logic_only_in_run() {
        let allowed: Vec<_> = OperationalState::ALL
            .into_iter()
            .filter(|s| s.allows_user_logic())
            .collect();
        assert_eq!(allowed, vec![Run]);
    }

    #[test]
    fn reconfiguration_in_init_and_pause() {
        let allowed: Vec<_> = OperationalState::ALL
            .into_iter()
            .filter(|s| s.allows_reconfiguration())
            .collect();
        assert_eq!(allowed, vec![Init, Pause]);
    }

    #[test]
    fn gateway_everywhere_but_stop() {
        for state in OperationalState::ALL {
            assert_eq!(state.allows_gateway(), state != Stop);
        }
    }

    #[test]
    fn update_only_in_pause() {
        for state in OperationalState::ALL {
            assert_eq!(state.allows_update(), state == Pause);
        }
    }

    #[test]
    fn policy_targets() {
        assert_eq!(FaultPolicy::Ignore.target_state(), None);
        assert_eq!(FaultPolicy::Pause.target_state(), Some(Pause));
        assert_eq!(FaultPolicy::Safe.target_state(), Some(Safe));
        assert_eq!(FaultPolicy::Stop.target_state(), Some(Stop));
    }

    #[test]
    fn severity_is_ordered() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Alarm < Severity::Fault);
        assert!(Severity::Fault < Severity::Critical);
    }
}
