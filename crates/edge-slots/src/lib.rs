//! `edge-slots` – Slot contract & registry
//!
//! Slots are isolated, versioned execution units (input, output, sensor,
//! actuator, logic, ML).  This crate defines what a slot must implement and
//! the registry that owns them.
//!
//! # Modules
//!
//! - [`slot`] – the [`Slot`][slot::Slot] callback trait,
//!   [`SlotConfig`][slot::SlotConfig], [`SlotCapabilities`][slot::SlotCapabilities]
//!   and [`SlotDescriptor`][slot::SlotDescriptor].
//! - [`registry`] – [`SlotRegistry`][registry::SlotRegistry]: admission,
//!   state-gated execution, bounded snapshots and ordered fault broadcast.
//! - [`snapshot`] – [`SnapshotBuffer`][snapshot::SnapshotBuffer], the
//!   bounded write target for slot snapshots.
//! - [`sim`] – recording simulated slots for headless tests.

pub mod registry;
pub mod sim;
pub mod slot;
pub mod snapshot;

pub use registry::{BroadcastReport, RegistryLimits, SlotRegistry, in_slot_callback};
pub use slot::{
    ExecModel, SLOT_CONTRACT_VERSION, Slot, SlotCapabilities, SlotConfig, SlotDescriptor, SlotType,
};
pub use snapshot::{SlotSnapshot, SnapshotBuffer};
