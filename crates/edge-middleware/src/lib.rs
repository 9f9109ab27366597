//! `edge-middleware` – Event routing for the edge runtime.
//!
//! Carries state changes, fault reports, audit records and gateway-bound
//! traffic between the supervisory core and its collaborators without caring
//! about the data's meaning.
//!
//! # Modules
//!
//! - [`bus`] – [`EventBus`][bus::EventBus]: one broadcast lane per
//!   [`Topic`][bus::Topic], synchronous publish, async or polled receive.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
