//! [`EscalationEngine`] – turns a fault into a validated sequence of
//! transitions.
//!
//! # Algorithm
//!
//! The transition table, restricted to internal-authority edges, is a small
//! fixed directed graph (6 nodes).  At construction the engine precomputes
//! the shortest path between every ordered pair of states:
//!
//! 1. a reverse breadth-first search from each target yields the hop distance
//!    of every state to that target;
//! 2. the path is then walked forward, at each step choosing among the
//!    successors one hop closer to the target the one with the **higher**
//!    state ordinal, i.e. the more contained state.  For a fault in `Run`
//!    escalating to `Safe` this selects `Run -> Fault -> Safe` over the
//!    equally short `Run -> Pause -> Safe`.
//!
//! [`EscalationEngine::escalate`] resolves the policy of an
//! [`ErrorDescriptor`] to a target state, looks up the path and applies every
//! hop through one held [`TransitionGuard`], so no unrelated transition can
//! interleave.  After each committed hop the caller's `on_hop` callback runs
//! (the runtime broadcasts the fault to every slot there).
//!
//! [`TransitionGuard`]: crate::supervisor::TransitionGuard

use std::array;
use std::collections::VecDeque;

use edge_types::{
    AuditRecord, Authority, EdgeError, ErrorDescriptor, FaultPolicy, OperationalState, TimeUs,
};
use tracing::{error, info, warn};

use crate::supervisor::Supervisor;
use crate::transition_table::TransitionTable;

const N: usize = OperationalState::COUNT;

/// The only authority ever used for escalation.
const ESCALATION_AUTHORITY: Authority = Authority::Internal;

type PathTable = [[Option<Vec<OperationalState>>; N]; N];

// ────────────────────────────────────────────────────────────────────────────
// Outcomes
// ────────────────────────────────────────────────────────────────────────────

/// What an escalation run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationOutcome {
    /// Policy was `Ignore`; an audit-only record was written.
    Ignored,
    /// The current state already satisfied the policy; an audit-only record
    /// was written.
    AlreadyContained,
    /// The path was applied hop by hop.
    Escalated { hops: usize },
}

/// Result of a successful [`EscalationEngine::escalate`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationReport {
    pub origin: OperationalState,
    pub policy: FaultPolicy,
    pub outcome: EscalationOutcome,
    /// Audit records written by this run, in order.
    pub records: Vec<AuditRecord>,
}

impl EscalationReport {
    /// State reached at the end of the run.
    pub fn final_state(&self) -> OperationalState {
        self.records.last().map_or(self.origin, |r| r.new)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Engine
// ────────────────────────────────────────────────────────────────────────────

/// Precomputed escalation planner over a fixed transition table.
#[derive(Debug, Clone)]
pub struct EscalationEngine {
    paths: PathTable,
}

impl EscalationEngine {
    /// Precompute all-pairs escalation paths for `table`.
    pub fn new(table: &TransitionTable) -> Self {
        let mut paths: PathTable = array::from_fn(|_| array::from_fn(|_| None));
        for target in OperationalState::ALL {
            let dist = distances_to(table, target);
            for from in OperationalState::ALL {
                paths[from.ordinal()][target.ordinal()] = walk(table, &dist, from, target);
            }
        }
        Self { paths }
    }

    /// Hops from `from` to `to` (excluding `from`), or `None` if unreachable.
    /// An empty slice means `from == to`.
    pub fn path(&self, from: OperationalState, to: OperationalState) -> Option<&[OperationalState]> {
        self.paths[from.ordinal()][to.ordinal()].as_deref()
    }

    /// Escalate `error` from the supervisor's current state.
    ///
    /// `on_hop(state, error)` runs once after every committed hop, inside the
    /// critical section.  [`Supervisor::current`] already reports the new
    /// hop there; [`Supervisor::lock`] would deadlock.
    ///
    /// # Errors
    ///
    /// [`EdgeError::Error`] when the target is unreachable or a hop is
    /// rejected.  Hops committed before the failure are kept and the
    /// `escalation_incomplete` flag is raised; the caller must re-evaluate.
    pub fn escalate<F>(
        &self,
        supervisor: &Supervisor,
        error: &ErrorDescriptor,
        now: TimeUs,
        mut on_hop: F,
    ) -> Result<EscalationReport, EdgeError>
    where
        F: FnMut(OperationalState, &ErrorDescriptor),
    {
        let mut guard = supervisor.lock();
        let origin = guard.current();
        let policy = error.effective_policy();

        let Some(target) = policy.target_state() else {
            let record = guard.audit_only(ESCALATION_AUTHORITY, now, Some(error))?;
            info!(%origin, %error, "fault ignored by policy");
            return Ok(EscalationReport {
                origin,
                policy,
                outcome: EscalationOutcome::Ignored,
                records: vec![record],
            });
        };

        if origin == target || origin.containment_rank() > target.containment_rank() {
            let record = guard.audit_only(ESCALATION_AUTHORITY, now, Some(error))?;
            info!(%origin, %target, %error, "state already satisfies fault policy");
            return Ok(EscalationReport {
                origin,
                policy,
                outcome: EscalationOutcome::AlreadyContained,
                records: vec![record],
            });
        }

        let Some(path) = self.path(origin, target) else {
            guard.set_escalation_incomplete(true);
            if let Err(e) = guard.audit_only(ESCALATION_AUTHORITY, now, Some(error)) {
                warn!(error = %e, "could not audit unreachable escalation");
            }
            error!(%origin, %target, %error, "escalation target unreachable; hard stop required");
            return Err(EdgeError::Error(format!(
                "escalation target {target} unreachable from {origin}"
            )));
        };

        let mut records = Vec::with_capacity(path.len());
        for &hop in path {
            match guard.transition_with(hop, ESCALATION_AUTHORITY, now, Some(error)) {
                Ok(record) => {
                    records.push(record);
                    on_hop(hop, error);
                }
                Err(e) => {
                    guard.set_escalation_incomplete(true);
                    error!(
                        at = %guard.current(),
                        %hop,
                        committed = records.len(),
                        error = %e,
                        "escalation aborted"
                    );
                    return Err(EdgeError::Error(format!(
                        "escalation toward {target} aborted at {} after {} hop(s): {e}",
                        guard.current(),
                        records.len()
                    )));
                }
            }
        }
        guard.set_escalation_incomplete(false);

        info!(%origin, %target, hops = records.len(), %error, "fault escalated");
        Ok(EscalationReport {
            origin,
            policy,
            outcome: EscalationOutcome::Escalated {
                hops: records.len(),
            },
            records,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Path search
// ────────────────────────────────────────────────────────────────────────────

/// Hop distance of every state to `target` over escalation edges.
fn distances_to(table: &TransitionTable, target: OperationalState) -> [Option<usize>; N] {
    let mut dist = [None; N];
    dist[target.ordinal()] = Some(0);
    let mut queue = VecDeque::from([target]);
    while let Some(node) = queue.pop_front() {
        let next = dist[node.ordinal()].map_or(0, |d| d + 1);
        for edge in table.edges() {
            if edge.to == node
                && edge.required_authority == ESCALATION_AUTHORITY
                && dist[edge.from.ordinal()].is_none()
            {
                dist[edge.from.ordinal()] = Some(next);
                queue.push_back(edge.from);
            }
        }
    }
    dist
}

fn walk(
    table: &TransitionTable,
    dist: &[Option<usize>; N],
    from: OperationalState,
    target: OperationalState,
) -> Option<Vec<OperationalState>> {
    let mut remaining = dist[from.ordinal()]?;
    let mut path = Vec::with_capacity(remaining);
    let mut current = from;
    while current != target {
        let next = table
            .successors(current, ESCALATION_AUTHORITY)
            .filter(|s| dist[s.ordinal()] == Some(remaining - 1))
            .max_by_key(|s| s.ordinal())?;
        path.push(next);
        current = next;
        remaining -= 1;
    }
    Some(path)
}
