//! `edge-store` – Durable audit trail.
//!
//! Persists audit records and audit-required error descriptors to a local
//! SQLite database so they survive a restart.
//!
//! # Modules
//!
//! - [`audit_store`] – [`SqliteAuditSink`][audit_store::SqliteAuditSink]: an
//!   [`AuditSink`][edge_kernel::AuditSink] whose appends are durable before
//!   they return.

pub mod audit_store;

pub use audit_store::{SqliteAuditSink, StoreError};
