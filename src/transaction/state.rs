//! Physical transaction states.


/// The state of a single physical transaction.
///
/// A chain with no physical transaction is simply in no state at all; a
/// physical transaction starts `Active` and ends in exactly one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicalState {
    /// Opened on the resource and not yet finished.
    Active,
    /// Physically committed.
    Committed,
    /// Physically rolled back.
    RolledBack,
}

impl PhysicalState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed)
    }

    pub fn is_rolled_back(&self) -> bool {
        matches!(self, Self::RolledBack)
    }

    /// Returns true if the transaction is finished (committed or rolled back).
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

impl std::fmt::Display for PhysicalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Committed => write!(f, "Committed"),
            Self::RolledBack => write!(f, "RolledBack"),
        }
    }
}
