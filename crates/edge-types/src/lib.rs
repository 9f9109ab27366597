//! `edge-types` – Taxonomy layer of the edge runtime.
//!
//! Pure data shared by every other crate: identifiers and the microsecond
//! time base, severities, authorities, origins, the six operational states,
//! fault policies, result codes, behavior flags, the error classifier and
//! the event/audit/snapshot records.
//!
//! # Modules
//!
//! - [`taxonomy`] – identifiers, [`Severity`], [`Authority`], [`Origin`],
//!   [`OperationalState`] (with its capability predicates) and
//!   [`FaultPolicy`].
//! - [`fault`] – [`ErrorClass`], class-scoped [`codes`], [`classify`],
//!   [`describe`] and the [`ErrorDescriptor`].
//! - [`result`] – [`ResultCode`] and the crate-wide [`EdgeError`].
//! - [`flags`] – [`BehaviorFlags`] with the determinism exclusion enforced.
//! - [`event`] – [`AuditRecord`], [`StateSnapshot`] and the bus [`Event`].
//! - [`clock`] – [`Clock`] trait, [`SystemClock`] and [`ManualClock`].

pub mod clock;
pub mod event;
pub mod fault;
pub mod flags;
pub mod result;
pub mod taxonomy;

pub use clock::{Clock, ManualClock, SystemClock};
pub use event::{AuditKind, AuditRecord, Event, EventPayload, StateFlags, StateSnapshot};
pub use fault::{Classification, ErrorClass, ErrorDescriptor, classify, codes, describe};
pub use flags::{BehaviorFlags, Determinism};
pub use result::{EdgeError, ResultCode};
pub use taxonomy::{
    Authority, EdgeId, EventId, FaultPolicy, OperationalState, Origin, Severity, SlotId, TimeUs,
};
