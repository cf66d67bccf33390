//! Transition tables for lifecycle enums.
//!
//! Subscription status and seat billing both move through a fixed graph.
//! Implementors list the outgoing edges of each state once; checking and
//! performing a transition are derived from that table.

use super::ValidationError;

pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug + 'static {
    /// Field name reported when a transition is rejected.
    const FIELD: &'static str;

    /// Outgoing edges of the current state.
    fn valid_transitions(&self) -> &'static [Self];

    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                Self::FIELD,
                format!("cannot move from {:?} to {:?}", self, target),
            ))
        }
    }

    /// A state with no outgoing edges.
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }

    /// True when some walk of one or more edges leads to `target`.
    fn can_reach(&self, target: &Self) -> bool {
        let mut seen: Vec<Self> = Vec::new();
        let mut frontier: Vec<Self> = self.valid_transitions().to_vec();
        while let Some(state) = frontier.pop() {
            if state == *target {
                return true;
            }
            if !seen.contains(&state) {
                seen.push(state);
                frontier.extend_from_slice(state.valid_transitions());
            }
        }
        false
    }
}
