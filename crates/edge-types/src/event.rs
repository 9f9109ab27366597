//! Audit records, state snapshots and the bus event envelope.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fault::ErrorDescriptor;
use crate::taxonomy::{Authority, OperationalState, SlotId, TimeUs};

/// Flags carried by a [`StateSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct StateFlags {
    /// Set when escalation enters `Fault`; cleared on `Safe -> Init`.
    pub fault_latched: bool,
    /// Set when the last escalation was aborted or its target was
    /// unreachable; the caller must re-evaluate.
    pub escalation_incomplete: bool,
}

/// Point-in-time copy of the supervisor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StateSnapshot {
    pub state: OperationalState,
    pub timestamp: TimeUs,
    pub flags: StateFlags,
}

/// Whether an audit record reflects a committed transition or only records a
/// decision (ignored fault, already-contained state, unreachable target).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum AuditKind {
    Transition,
    AuditOnly,
}

/// Immutable, append-only audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AuditRecord {
    /// Monotonic per-supervisor sequence number, starting at 1.
    pub sequence: u64,
    pub prior: OperationalState,
    pub new: OperationalState,
    pub authority: Authority,
    pub timestamp: TimeUs,
    pub kind: AuditKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescriptor>,
}

impl AuditRecord {
    pub fn is_transition(&self) -> bool {
        self.kind == AuditKind::Transition
    }
}

/// Event envelope routed over the runtime event bus.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"edge-kernel::supervisor"`
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` with a fresh id and the current wall-clock time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data carried on the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "data")]
pub enum EventPayload {
    StateChanged {
        from: OperationalState,
        to: OperationalState,
        authority: Authority,
        at: TimeUs,
    },
    Fault(ErrorDescriptor),
    Snapshot(StateSnapshot),
    SlotTimeout { slot_id: SlotId, overrun_us: u64 },
    Audit(AuditRecord),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_changed_event_roundtrip() {
        let event = Event::new(
            "edge-kernel::supervisor",
            EventPayload::StateChanged {
                from: OperationalState::Init,
                to: OperationalState::Run,
                authority: Authority::Internal,
                at: 42,
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("StateChanged"));
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
        assert!(matches!(
            back.payload,
            EventPayload::StateChanged {
                to: OperationalState::Run,
                ..
            }
        ));
    }

    #[test]
    fn snapshot_is_a_copy() {
        let mut snap = StateSnapshot {
            state: OperationalState::Pause,
            timestamp: 5,
            flags: StateFlags::default(),
        };
        let copy = snap;
        snap.state = OperationalState::Stop;
        assert_eq!(copy.state, OperationalState::Pause);
    }

    #[test]
    fn audit_record_without_error_omits_field() {
        let record = AuditRecord {
            sequence: 1,
            prior: OperationalState::Init,
            new: OperationalState::Run,
            authority: Authority::Internal,
            timestamp: 0,
            kind: AuditKind::Transition,
            error: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("error"));
        assert!(record.is_transition());
    }
}
