//! Audit/log boundary.
//!
//! Every [`AuditRecord`] and every audit-required [`ErrorDescriptor`] must be
//! durably persisted before the triggering call is considered complete.  The
//! supervisor therefore calls [`AuditSink::append`] *before* committing a
//! transition, and treats a sink failure as a failed transition.
//!
//! [`MemoryAuditLog`] keeps records in process memory; durable sinks (e.g. the
//! SQLite sink in `edge-store`) implement the same trait.

use std::sync::{Mutex, MutexGuard};

use edge_types::{AuditRecord, ErrorDescriptor};
use thiserror::Error;

/// Failure to persist or read back the audit trail.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("audit backend unavailable: {0}")]
    Unavailable(String),
    #[error("audit write failed: {0}")]
    Write(String),
}

/// Durable destination for audit records and audit-required errors.
pub trait AuditSink: Send + Sync {
    /// Persist one audit record.  Must not return before the record is
    /// durable.
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError>;

    /// Persist an error descriptor that requires auditing.
    fn record_error(&self, error: &ErrorDescriptor) -> Result<(), AuditError>;

    /// All audit records in append order.
    fn records(&self) -> Result<Vec<AuditRecord>, AuditError>;

    /// All recorded error descriptors in append order.
    fn errors(&self) -> Result<Vec<ErrorDescriptor>, AuditError>;
}

#[derive(Default)]
struct MemoryLog {
    records: Vec<AuditRecord>,
    errors: Vec<ErrorDescriptor>,
}

/// In-process audit log.
#[derive(Default)]
pub struct MemoryAuditLog {
    inner: Mutex<MemoryLog>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryLog> {
        // Appends are single pushes, so a poisoned log is still consistent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AuditSink for MemoryAuditLog {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.lock().records.push(record.clone());
        Ok(())
    }

    fn record_error(&self, error: &ErrorDescriptor) -> Result<(), AuditError> {
        self.lock().errors.push(error.clone());
        Ok(())
    }

    fn records(&self) -> Result<Vec<AuditRecord>, AuditError> {
        Ok(self.lock().records.clone())
    }

    fn errors(&self) -> Result<Vec<ErrorDescriptor>, AuditError> {
        Ok(self.lock().errors.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_types::{
        AuditKind, Authority, ErrorClass, FaultPolicy, OperationalState, Origin, Severity,
        describe,
    };

    fn record(sequence: u64) -> AuditRecord {
        AuditRecord {
            sequence,
            prior: OperationalState::Init,
            new: OperationalState::Run,
            authority: Authority::Internal,
            timestamp: sequence * 10,
            kind: AuditKind::Transition,
            error: None,
        }
    }

    #[test]
    fn records_keep_append_order() {
        let log = MemoryAuditLog::new();
        log.append(&record(1)).unwrap();
        log.append(&record(2)).unwrap();
        let records = log.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sequence, 1);
        assert_eq!(records[1].sequence, 2);
    }

    #[test]
    fn errors_are_kept_separately() {
        let log = MemoryAuditLog::new();
        let err = describe(
            ErrorClass::Violation,
            0xF002,
            Severity::Critical,
            Origin::Gateway,
            Authority::Gateway,
            FaultPolicy::Safe,
            0,
        );
        log.record_error(&err).unwrap();
        assert!(log.records().unwrap().is_empty());
        assert_eq!(log.errors().unwrap(), vec![err]);
    }
}
