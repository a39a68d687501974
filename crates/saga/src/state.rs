//! Placement state machine.

/// The state of a single order placement.
///
/// State transitions:
/// ```text
/// Validating ──► Reserved ──► Committing ──┬──► Committed
///     │                                    └──► Compensating ──┬──► Compensated
///     └──► Rejected                                            └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlacementState {
    /// Checking the requested quantity against the stock level.
    #[default]
    Validating,

    /// Rejected before anything was written (terminal state).
    Rejected,

    /// The order record exists but no stock has been deducted.
    Reserved,

    /// The stock deduction is in flight.
    Committing,

    /// Order recorded and stock deducted (terminal state).
    Committed,

    /// The deduction failed and the order record is being removed.
    Compensating,

    /// The order record was removed after a failed deduction (terminal state).
    Compensated,

    /// The order record could not be removed (terminal state).
    Failed,
}

impl PlacementState {
    /// Returns true if `next` is a legal successor of this state.
    pub fn can_advance_to(&self, next: PlacementState) -> bool {
        use PlacementState::*;
        matches!(
            (self, next),
            (Validating, Rejected)
                | (Validating, Reserved)
                | (Reserved, Committing)
                | (Committing, Committed)
                | (Committing, Compensating)
                | (Compensating, Compensated)
                | (Compensating, Failed)
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlacementState::Validating => "Validating",
            PlacementState::Rejected => "Rejected",
            PlacementState::Reserved => "Reserved",
            PlacementState::Committing => "Committing",
            PlacementState::Committed => "Committed",
            PlacementState::Compensating => "Compensating",
            PlacementState::Compensated => "Compensated",
            PlacementState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for PlacementState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
