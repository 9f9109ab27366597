//! [`Watchdog`] – deadline monitor for slot callbacks.
//!
//! The registry arms the watchdog for a slot before invoking one of its
//! callbacks and disarms it afterwards; [`Watchdog::disarm`] reports how far
//! the call overran its budget.  A callback that never returns stays armed,
//! so an external loop calling [`Watchdog::check_all`] can detect it and
//! raise a runtime-timeout fault.
//!
//! Time is the runtime's microsecond base ([`TimeUs`]) supplied by the
//! caller, so the watchdog works with any [`Clock`](edge_types::Clock).

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use edge_types::{SlotId, TimeUs};
use tracing::warn;

/// Health of a single slot's in-flight call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallHealth {
    /// No callback is in flight.
    Idle,
    /// A callback is running within its budget.
    Running,
    /// A callback is running past its deadline.
    Overdue { overrun_us: u64 },
}

struct Armed {
    started: TimeUs,
    budget_us: u64,
}

impl Armed {
    fn overrun(&self, now: TimeUs) -> Option<u64> {
        let elapsed = now.saturating_sub(self.started);
        (elapsed > self.budget_us).then(|| elapsed - self.budget_us)
    }
}

/// Tracks in-flight slot callbacks and their deadlines.
///
/// # Example
///
/// ```
/// use edge_kernel::watchdog::{CallHealth, Watchdog};
///
/// let wd = Watchdog::new();
/// wd.arm(3, 1_000, 500);
/// assert_eq!(wd.health(3, 1_200), CallHealth::Running);
/// assert_eq!(wd.disarm(3, 1_800), Some(300));
/// assert_eq!(wd.health(3, 1_800), CallHealth::Idle);
/// ```
#[derive(Default)]
pub struct Watchdog {
    calls: Mutex<HashMap<SlotId, Armed>>,
}

impl Watchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the deadline for a call on `slot_id` made at `now`.
    ///
    /// Re-arming an armed slot restarts its deadline.
    pub fn arm(&self, slot_id: SlotId, now: TimeUs, budget_us: u64) {
        self.lock().insert(
            slot_id,
            Armed {
                started: now,
                budget_us,
            },
        );
    }

    /// End the call on `slot_id`.  Returns the overrun in µs when the call
    /// exceeded its budget, `None` when it finished in time or was not armed.
    pub fn disarm(&self, slot_id: SlotId, now: TimeUs) -> Option<u64> {
        let armed = self.lock().remove(&slot_id)?;
        let overrun = armed.overrun(now);
        if let Some(overrun_us) = overrun {
            warn!(slot_id, overrun_us, budget_us = armed.budget_us, "slot call overran budget");
        }
        overrun
    }

    pub fn health(&self, slot_id: SlotId, now: TimeUs) -> CallHealth {
        match self.lock().get(&slot_id) {
            None => CallHealth::Idle,
            Some(armed) => match armed.overrun(now) {
                Some(overrun_us) => CallHealth::Overdue { overrun_us },
                None => CallHealth::Running,
            },
        }
    }

    /// Slots whose in-flight call is past its deadline, sorted by slot id.
    pub fn check_all(&self, now: TimeUs) -> Vec<(SlotId, u64)> {
        let mut overdue: Vec<_> = self
            .lock()
            .iter()
            .filter_map(|(&id, armed)| armed.overrun(now).map(|o| (id, o)))
            .collect();
        overdue.sort_unstable_by_key(|&(id, _)| id);
        overdue
    }

    /// Forget any armed call for `slot_id` (slot unregistered).
    pub fn forget(&self, slot_id: SlotId) {
        self.lock().remove(&slot_id);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SlotId, Armed>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unarmed_slot_is_idle() {
        let wd = Watchdog::new();
        assert_eq!(wd.health(1, 0), CallHealth::Idle);
        assert_eq!(wd.disarm(1, 10), None);
    }

    #[test]
    fn call_within_budget_reports_no_overrun() {
        let wd = Watchdog::new();
        wd.arm(1, 100, 50);
        assert_eq!(wd.health(1, 150), CallHealth::Running);
        assert_eq!(wd.disarm(1, 150), None);
    }

    #[test]
    fn overdue_call_is_visible_before_it_returns() {
        let wd = Watchdog::new();
        wd.arm(1, 0, 10);
        wd.arm(2, 0, 1_000);
        assert_eq!(wd.health(1, 25), CallHealth::Overdue { overrun_us: 15 });
        assert_eq!(wd.check_all(25), vec![(1, 15)]);
        assert_eq!(wd.disarm(1, 30), Some(20));
        assert!(wd.check_all(30).is_empty());
    }

    #[test]
    fn rearm_restarts_deadline() {
        let wd = Watchdog::new();
        wd.arm(4, 0, 10);
        wd.arm(4, 100, 10);
        assert_eq!(wd.health(4, 105), CallHealth::Running);
    }

    #[test]
    fn forget_drops_armed_call() {
        let wd = Watchdog::new();
        wd.arm(9, 0, 1);
        wd.forget(9);
        assert!(wd.check_all(1_000).is_empty());
    }

    #[test]
    fn clock_going_backwards_is_not_an_overrun() {
        let wd = Watchdog::new();
        wd.arm(1, 500, 10);
        assert_eq!(wd.health(1, 100), CallHealth::Running);
    }
}
