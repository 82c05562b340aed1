//! Propagation modes and the decision table that maps them onto actions.

use super::error::{Result, TransactionError};

/// How a `begin` relates to a transaction that may already be active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Propagation {
    /// Join the active transaction, or start one if there is none.
    #[default]
    Required,
    /// Always start an independent physical transaction, suspending any
    /// active one until it completes.
    RequiresNew,
    /// Join the active transaction; fail if there is none.
    Mandatory,
    /// Fail if a transaction is active.
    Never,
    Supports,
    NotSupported,
    Nested,
}

impl std::fmt::Display for Propagation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Required => "REQUIRED",
            Self::RequiresNew => "REQUIRES_NEW",
            Self::Mandatory => "MANDATORY",
            Self::Never => "NEVER",
            Self::Supports => "SUPPORTS",
            Self::NotSupported => "NOT_SUPPORTED",
            Self::Nested => "NESTED",
        };
        write!(f, "{}", name)
    }
}

/// What `begin` must do to the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationAction {
    /// Open a new physical transaction; nothing is active.
    StartNew,
    /// Participate in the active physical transaction.
    Join,
    /// Park the active physical transaction and open an independent one.
    SuspendAndStartNew,
}

impl PropagationAction {
    pub fn opens_physical_transaction(&self) -> bool {
        !matches!(self, Self::Join)
    }
}

/// Decides the action for `propagation` given whether a physical transaction
/// is currently active.
pub fn decide(propagation: Propagation, transaction_active: bool) -> Result<PropagationAction> {
    use Propagation::*;
    use PropagationAction::*;

    match (propagation, transaction_active) {
        (Required, false) | (RequiresNew, false) => Ok(StartNew),
        (Required, true) | (Mandatory, true) => Ok(Join),
        (RequiresNew, true) => Ok(SuspendAndStartNew),
        (Mandatory, false) => Err(TransactionError::IllegalTransactionState(
            "no existing transaction found for transaction marked with propagation MANDATORY"
                .to_string(),
        )),
        (Never, true) => Err(TransactionError::IllegalTransactionState(
            "existing transaction found for transaction marked with propagation NEVER"
                .to_string(),
        )),
        (Never, false) | (Supports, _) | (NotSupported, _) | (Nested, _) => {
            Err(TransactionError::UnsupportedPropagation(propagation))
        }
    }
}

/// Parameters of a single `begin`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionDefinition {
    pub propagation: Propagation,
    /// Hint passed to the resource when this definition opens a physical
    /// transaction. Ignored when joining.
    pub read_only: bool,
    /// Label used in log output.
    pub name: Option<String>,
}

impl TransactionDefinition {
    pub fn new(propagation: Propagation) -> Self {
        Self {
            propagation,
            ..Self::default()
        }
    }

    pub fn required() -> Self {
        Self::new(Propagation::Required)
    }

    pub fn requires_new() -> Self {
        Self::new(Propagation::RequiresNew)
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Name for log messages; falls back to the propagation mode.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => format!("{} [{}]", name, self.propagation),
            None => format!("[{}]", self.propagation),
        }
    }
}
