//! State machine trait for lifecycle enums.
//!
//! Lifecycle enums list the moves they allow once, and every mutation that
//! changes state goes through [`StateMachine::transition_to`] so illegal moves
//! are rejected in one place.

use super::ValidationError;

/// Trait for enums that describe a lifecycle.
///
/// ```ignore
/// impl StateMachine for SubscriptionState {
///     fn can_transition_to(&self, target: &Self) -> bool {
///         self.valid_transitions().contains(target)
///     }
///
///     fn valid_transitions(&self) -> Vec<Self> {
///         match self {
///             Unpaid => vec![Unpaid, Trial, ActiveAutomatic, Canceled],
///             // ...
///         }
///     }
/// }
///
/// let next = current.transition_to(SubscriptionState::Canceled)?;
/// ```
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Returns true if moving from self to target is allowed.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Returns every state reachable in one move.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Performs the move, or explains why it is not allowed.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// A state with no outgoing moves.
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Door {
        Open,
        Closed,
        Locked,
        Bricked,
    }

    impl StateMachine for Door {
        fn can_transition_to(&self, target: &Self) -> bool {
            self.valid_transitions().contains(target)
        }

        fn valid_transitions(&self) -> Vec<Self> {
            use Door::*;
            match self {
                Open => vec![Closed],
                Closed => vec![Open, Locked, Bricked],
                Locked => vec![Closed],
                Bricked => vec![],
            }
        }
    }

    #[test]
    fn allowed_move_returns_target() {
        assert_eq!(Door::Closed.transition_to(Door::Locked), Ok(Door::Locked));
    }

    #[test]
    fn disallowed_move_is_rejected_with_both_states_named() {
        let err = Door::Open.transition_to(Door::Locked).unwrap_err();
        assert!(err.to_string().contains("Open"));
        assert!(err.to_string().contains("Locked"));
    }

    #[test]
    fn state_without_moves_is_terminal() {
        assert!(Door::Bricked.is_terminal());
        assert!(!Door::Locked.is_terminal());
    }
}
