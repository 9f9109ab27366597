//! [`TransitionTable`] – the normative, authority-annotated edge set.
//!
//! The table is data, not code: it is fixed at construction and is the single
//! source of truth for transition legality.  Granting another authority a
//! transition is a table change, never a new predicate.
//!
//! [`TransitionTable::is_allowed`] is a linear scan over a fixed slice with no
//! allocation, so it completes in bounded time.

use edge_types::{Authority, OperationalState};

use OperationalState::{Fault, Init, Pause, Run, Safe, Stop};

/// One permitted transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransitionEdge {
    pub from: OperationalState,
    pub to: OperationalState,
    pub required_authority: Authority,
}

const fn internal(from: OperationalState, to: OperationalState) -> TransitionEdge {
    TransitionEdge {
        from,
        to,
        required_authority: Authority::Internal,
    }
}

/// The normative transition table of the slot contract.
pub const NORMATIVE_EDGES: [TransitionEdge; 12] = [
    internal(Init, Run),
    internal(Init, Safe),
    internal(Init, Stop),
    internal(Run, Pause),
    internal(Run, Fault),
    internal(Pause, Run),
    internal(Pause, Safe),
    internal(Fault, Pause),
    internal(Fault, Safe),
    internal(Fault, Stop),
    internal(Safe, Stop),
    internal(Safe, Init),
];

/// Why a requested transition is not in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// An edge `(from, to)` exists, but for a different authority.
    AuthorityMismatch,
    /// No edge `(from, to)` exists for any authority.
    NoSuchEdge,
}

/// Immutable set of permitted transitions.
#[derive(Debug, Clone)]
pub struct TransitionTable {
    edges: Box<[TransitionEdge]>,
}

impl TransitionTable {
    /// Build a table from an explicit edge list.
    ///
    /// Self-transitions and exact duplicates are discarded.
    pub fn new(edges: impl IntoIterator<Item = TransitionEdge>) -> Self {
        let mut kept: Vec<TransitionEdge> = Vec::new();
        for edge in edges {
            if edge.from != edge.to && !kept.contains(&edge) {
                kept.push(edge);
            }
        }
        Self {
            edges: kept.into_boxed_slice(),
        }
    }

    /// The table defined by the slot contract.
    pub fn normative() -> Self {
        Self::new(NORMATIVE_EDGES)
    }

    /// `true` iff the edge `(from, to, authority)` is in the table.
    pub fn is_allowed(
        &self,
        from: OperationalState,
        to: OperationalState,
        authority: Authority,
    ) -> bool {
        self.edges
            .iter()
            .any(|e| e.from == from && e.to == to && e.required_authority == authority)
    }

    /// Explain why `(from, to, authority)` is not allowed, or `None` if it is.
    pub fn check(
        &self,
        from: OperationalState,
        to: OperationalState,
        authority: Authority,
    ) -> Option<Rejection> {
        if self.is_allowed(from, to, authority) {
            None
        } else if self.edges.iter().any(|e| e.from == from && e.to == to) {
            Some(Rejection::AuthorityMismatch)
        } else {
            Some(Rejection::NoSuchEdge)
        }
    }

    /// Successors of `from` reachable with `authority`, in table order.
    pub fn successors(
        &self,
        from: OperationalState,
        authority: Authority,
    ) -> impl Iterator<Item = OperationalState> + '_ {
        self.edges
            .iter()
            .filter(move |e| e.from == from && e.required_authority == authority)
            .map(|e| e.to)
    }

    pub fn edges(&self) -> &[TransitionEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::normative()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUTHORITIES: [Authority; 4] = [
        Authority::Internal,
        Authority::Slot,
        Authority::Gateway,
        Authority::User,
    ];

    #[test]
    fn normative_table_has_every_contract_edge() {
        let table = TransitionTable::normative();
        assert_eq!(table.len(), 12);
        for edge in NORMATIVE_EDGES {
            assert!(table.is_allowed(edge.from, edge.to, Authority::Internal));
        }
    }

    #[test]
    fn no_self_transitions() {
        let table = TransitionTable::normative();
        for state in OperationalState::ALL {
            for authority in AUTHORITIES {
                assert!(!table.is_allowed(state, state, authority));
                assert_eq!(
                    table.check(state, state, authority),
                    Some(Rejection::NoSuchEdge)
                );
            }
        }
    }

    #[test]
    fn only_internal_authority_is_granted() {
        let table = TransitionTable::normative();
        for edge in table.edges() {
            for authority in [Authority::Slot, Authority::Gateway, Authority::User] {
                assert!(!table.is_allowed(edge.from, edge.to, authority));
                assert_eq!(
                    table.check(edge.from, edge.to, authority),
                    Some(Rejection::AuthorityMismatch)
                );
            }
        }
    }

    #[test]
    fn every_pair_outside_table_is_rejected() {
        let table = TransitionTable::normative();
        for from in OperationalState::ALL {
            for to in OperationalState::ALL {
                let listed = NORMATIVE_EDGES.iter().any(|e| e.from == from && e.to == to);
                for authority in AUTHORITIES {
                    let expected = listed && authority == Authority::Internal;
                    assert_eq!(table.is_allowed(from, to, authority), expected);
                }
            }
        }
    }

    #[test]
    fn missing_edges_are_invalid() {
        let table = TransitionTable::normative();
        assert_eq!(
            table.check(Run, Safe, Authority::Internal),
            Some(Rejection::NoSuchEdge)
        );
        assert_eq!(
            table.check(Pause, Stop, Authority::Internal),
            Some(Rejection::NoSuchEdge)
        );
        assert_eq!(table.check(Stop, Init, Authority::Internal), Some(Rejection::NoSuchEdge));
    }

    #[test]
    fn custom_table_is_data_driven() {
        let table = TransitionTable::new([
            TransitionEdge {
                from: Run,
                to: Pause,
                required_authority: Authority::Gateway,
            },
            internal(Run, Run),
            internal(Run, Fault),
            internal(Run, Fault),
        ]);
        assert_eq!(table.len(), 2);
        assert!(table.is_allowed(Run, Pause, Authority::Gateway));
        assert!(!table.is_allowed(Run, Pause, Authority::Internal));
    }

    #[test]
    fn successors_follow_table_order() {
        let table = TransitionTable::normative();
        let next: Vec<_> = table.successors(Fault, Authority::Internal).collect();
        assert_eq!(next, vec![Pause, Safe, Stop]);
        assert_eq!(table.successors(Stop, Authority::Internal).count(), 0);
    }
}
