//! [`FaultQueue`] – bounded fault inbox with capacity reserved for protected
//! faults.
//!
//! A descriptor is *protected* when it is a Safety or Violation class error or
//! carries an effective severity of `Fault` or higher.  Protected faults are
//! never dropped:
//!
//! - ordinary faults are rejected once `capacity - reserved` entries are
//!   queued, and the caller receives a Resource/`QUEUE_FULL` descriptor to
//!   report instead;
//! - a protected fault arriving at a full queue evicts the newest ordinary
//!   entry of the lowest severity;
//! - if only protected entries remain, it is accepted over capacity.
//!
//! [`FaultQueue::pop`] serves protected entries first, FIFO within each band.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use edge_types::{
    Authority, ErrorClass, ErrorDescriptor, FaultPolicy, Origin, Severity, TimeUs, codes,
    describe,
};
use thiserror::Error;
use tracing::{debug, warn};

// ────────────────────────────────────────────────────────────────────────────
// Error type
// ────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FaultQueueError {
    #[error("fault queue full; rejected {rejected}")]
    QueueFull {
        rejected: ErrorDescriptor,
        /// Resource/QUEUE_FULL descriptor to report in place of `rejected`.
        report: ErrorDescriptor,
    },
    #[error("invalid fault queue sizing: capacity {capacity}, reserved {reserved}")]
    InvalidCapacity { capacity: usize, reserved: usize },
}

// ────────────────────────────────────────────────────────────────────────────
// Outcomes
// ────────────────────────────────────────────────────────────────────────────

/// How an accepted descriptor entered the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    Accepted,
    /// A protected fault displaced this ordinary entry.
    Evicted(ErrorDescriptor),
    /// Only protected entries were queued; capacity was exceeded.
    OverCapacity,
}

/// The descriptor reported when `rejected` could not be queued.
pub fn queue_full(rejected: &ErrorDescriptor, now: TimeUs) -> ErrorDescriptor {
    let report = describe(
        ErrorClass::Resource,
        codes::resource::QUEUE_FULL,
        Severity::Warning,
        Origin::Core,
        Authority::Internal,
        FaultPolicy::Ignore,
        now,
    );
    match rejected.slot {
        Some(slot) => report.with_slot(slot),
        None => report,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Queue
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Bands {
    protected: VecDeque<ErrorDescriptor>,
    ordinary: VecDeque<ErrorDescriptor>,
}

impl Bands {
    fn len(&self) -> usize {
        self.protected.len() + self.ordinary.len()
    }
}

/// Bounded, thread-safe fault inbox.
pub struct FaultQueue {
    capacity: usize,
    reserved: usize,
    bands: Mutex<Bands>,
}

impl FaultQueue {
    /// # Errors
    ///
    /// [`FaultQueueError::InvalidCapacity`] when `capacity` is zero or
    /// `reserved >= capacity`.
    pub fn new(capacity: usize, reserved: usize) -> Result<Self, FaultQueueError> {
        if capacity == 0 || reserved >= capacity {
            return Err(FaultQueueError::InvalidCapacity { capacity, reserved });
        }
        Ok(Self {
            capacity,
            reserved,
            bands: Mutex::new(Bands::default()),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn reserved(&self) -> usize {
        self.reserved
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue `fault`.
    ///
    /// # Errors
    ///
    /// [`FaultQueueError::QueueFull`] for an ordinary fault once the
    /// unreserved capacity is used.  Protected faults never fail.
    pub fn push(&self, fault: ErrorDescriptor, now: TimeUs) -> Result<Enqueued, FaultQueueError> {
        let mut bands = self.lock();
        let queued = bands.len();

        if !fault.is_protected() {
            if queued >= self.capacity - self.reserved {
                warn!(%fault, queued, "fault queue full; ordinary fault rejected");
                let report = queue_full(&fault, now);
                return Err(FaultQueueError::QueueFull {
                    rejected: fault,
                    report,
                });
            }
            bands.ordinary.push_back(fault);
            return Ok(Enqueued::Accepted);
        }

        let outcome = if queued < self.capacity {
            Enqueued::Accepted
        } else if let Some(index) = newest_lowest_severity(&bands.ordinary) {
            match bands.ordinary.remove(index) {
                Some(evicted) => {
                    warn!(%fault, %evicted, "protected fault evicted an ordinary entry");
                    Enqueued::Evicted(evicted)
                }
                None => Enqueued::OverCapacity,
            }
        } else {
            warn!(%fault, queued, capacity = self.capacity, "protected fault accepted over capacity");
            Enqueued::OverCapacity
        };
        bands.protected.push_back(fault);
        debug!(queued = bands.len(), "protected fault queued");
        Ok(outcome)
    }

    /// Next fault to process: protected band first.
    pub fn pop(&self) -> Option<ErrorDescriptor> {
        let mut bands = self.lock();
        bands
            .protected
            .pop_front()
            .or_else(|| bands.ordinary.pop_front())
    }

    /// Remove and return every queued fault in pop order.
    pub fn drain(&self) -> Vec<ErrorDescriptor> {
        let mut bands = self.lock();
        let mut out: Vec<_> = bands.protected.drain(..).collect();
        out.extend(bands.ordinary.drain(..));
        out
    }

    fn lock(&self) -> MutexGuard<'_, Bands> {
        self.bands.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Index of the most recently queued entry among those with the lowest
/// severity.
fn newest_lowest_severity(entries: &VecDeque<ErrorDescriptor>) -> Option<usize> {
    let lowest = entries.iter().map(ErrorDescriptor::effective_severity).min()?;
    entries
        .iter()
        .rposition(|e| e.effective_severity() == lowest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ordinary(code: u32, severity: Severity) -> ErrorDescriptor {
        describe(
            ErrorClass::Communication,
            code,
            severity,
            Origin::Slot,
            Authority::Slot,
            FaultPolicy::Ignore,
            0,
        )
    }

    fn safety(code: u32) -> ErrorDescriptor {
        describe(
            ErrorClass::Safety,
            code,
            Severity::Fault,
            Origin::Slot,
            Authority::Slot,
            FaultPolicy::Safe,
            0,
        )
    }

    #[test]
    fn rejects_bad_sizing() {
        assert!(matches!(
            FaultQueue::new(0, 0),
            Err(FaultQueueError::InvalidCapacity { .. })
        ));
        assert!(FaultQueue::new(4, 4).is_err());
        assert!(FaultQueue::new(4, 3).is_ok());
    }

    #[test]
    fn ordinary_faults_stop_at_reserved_boundary() {
        let q = FaultQueue::new(4, 2).unwrap();
        q.push(ordinary(1, Severity::Warning), 0).unwrap();
        q.push(ordinary(2, Severity::Warning), 0).unwrap();

        let err = q
            .push(ordinary(3, Severity::Warning).with_slot(7), 99)
            .unwrap_err();
        match err {
            FaultQueueError::QueueFull { rejected, report } => {
                assert_eq!(rejected.code, 3);
                assert_eq!(report.class, ErrorClass::Resource);
                assert_eq!(report.code, codes::resource::QUEUE_FULL);
                assert_eq!(report.slot, Some(7));
                assert_eq!(report.timestamp, 99);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(q.len(), 2);

        // Reserved slots still accept protected faults.
        assert_eq!(q.push(safety(10), 0).unwrap(), Enqueued::Accepted);
        assert_eq!(q.push(safety(11), 0).unwrap(), Enqueued::Accepted);
        assert_eq!(q.len(), 4);
    }

    #[test]
    fn protected_fault_evicts_newest_lowest_severity() {
        let q = FaultQueue::new(3, 1).unwrap();
        q.push(ordinary(1, Severity::Info), 0).unwrap();
        q.push(ordinary(2, Severity::Info), 0).unwrap();
        q.push(safety(10), 0).unwrap();

        let outcome = q.push(safety(11), 0).unwrap();
        assert!(matches!(outcome, Enqueued::Evicted(ref e) if e.code == 2));
        let codes: Vec<_> = q.drain().into_iter().map(|e| e.code).collect();
        assert_eq!(codes, vec![10, 11, 1]);
    }

    #[test]
    fn eviction_prefers_lower_severity_over_recency() {
        let q = FaultQueue::new(3, 1).unwrap();
        q.push(ordinary(1, Severity::Info), 0).unwrap();
        q.push(ordinary(2, Severity::Alarm), 0).unwrap();
        q.push(safety(10), 0).unwrap();
        let outcome = q.push(safety(11), 0).unwrap();
        assert!(matches!(outcome, Enqueued::Evicted(ref e) if e.code == 1));
    }

    #[test]
    fn protected_faults_are_never_dropped() {
        let q = FaultQueue::new(2, 1).unwrap();
        for code in 0..5 {
            assert!(q.push(safety(code), 0).is_ok());
        }
        assert_eq!(q.len(), 5);
        assert!(q.push(ordinary(99, Severity::Info), 0).is_err());
    }

    #[test]
    fn critical_and_violation_are_protected() {
        let q = FaultQueue::new(2, 1).unwrap();
        q.push(ordinary(1, Severity::Info), 0).unwrap();
        assert!(q.push(ordinary(2, Severity::Critical), 0).is_ok());
        let violation = describe(
            ErrorClass::Violation,
            codes::violation::UNAUTHORIZED,
            Severity::Info,
            Origin::Gateway,
            Authority::Gateway,
            FaultPolicy::Ignore,
            0,
        );
        assert!(q.push(violation, 0).is_ok());
    }

    #[test]
    fn fault_severity_faults_bypass_the_ordinary_limit() {
        let q = FaultQueue::new(2, 1).unwrap();
        q.push(ordinary(1, Severity::Warning), 0).unwrap();

        let slot_failure = describe(
            ErrorClass::Fault,
            codes::fault::SLOT_FAILURE,
            Severity::Fault,
            Origin::Slot,
            Authority::Slot,
            FaultPolicy::Safe,
            0,
        );
        assert_eq!(q.push(slot_failure, 0).unwrap(), Enqueued::Accepted);
        assert_eq!(q.pop().map(|e| e.code), Some(codes::fault::SLOT_FAILURE));

        let alarm = describe(
            ErrorClass::Fault,
            codes::fault::SLOT_FAILURE,
            Severity::Alarm,
            Origin::Slot,
            Authority::Slot,
            FaultPolicy::Safe,
            0,
        );
        assert!(matches!(
            q.push(alarm, 0),
            Err(FaultQueueError::QueueFull { .. })
        ));
    }

    #[test]
    fn pop_serves_protected_band_first_fifo() {
        let q = FaultQueue::new(8, 2).unwrap();
        q.push(ordinary(1, Severity::Warning), 0).unwrap();
        q.push(safety(10), 0).unwrap();
        q.push(ordinary(2, Severity::Warning), 0).unwrap();
        q.push(safety(11), 0).unwrap();

        let order: Vec<_> = std::iter::from_fn(|| q.pop()).map(|e| e.code).collect();
        assert_eq!(order, vec![10, 11, 1, 2]);
        assert!(q.is_empty());
    }
}
