//! `edge-runtime` – The supervised runtime
//!
//! Wires the supervisor, slot registry, escalation engine, fault queue, event
//! bus and audit store into one [`RuntimeContext`][context::RuntimeContext],
//! and routes every error through classification and escalation.
//!
//! # Modules
//!
//! - [`context`] – [`RuntimeContext`][context::RuntimeContext]: state-gated
//!   slot management, fault intake and draining, watchdog polling and the
//!   gateway lane.
//! - [`config`] – [`RuntimeConfig`][config::RuntimeConfig]: queue sizing,
//!   call budgets and the audit database path, loaded from TOML.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: process-wide
//!   `tracing` subscriber with optional OTLP export.
//!
//! # Example
//!
//! ```rust
//! use edge_runtime::{RuntimeConfig, RuntimeContext};
//! use edge_types::{Authority, OperationalState};
//!
//! let ctx = RuntimeContext::new(RuntimeConfig::default()).unwrap();
//! ctx.request_transition(OperationalState::Run, Authority::Internal)
//!     .unwrap();
//! assert_eq!(ctx.current_state(), OperationalState::Run);
//! ```

pub mod config;
pub mod context;
pub mod telemetry;

pub use config::{ConfigError, RuntimeConfig};
pub use context::{DrainReport, RuntimeBuilder, RuntimeContext, RuntimeError, gateway_event_schema};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
