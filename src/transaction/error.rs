use super::propagation::Propagation;
use crate::resource::ResourceError;
use thiserror::Error;

/// Errors reported by the coordinator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// Commit was requested but a participant had marked the transaction
    /// rollback-only, so it was rolled back instead.
    #[error("transaction rolled back because it has been marked as rollback-only")]
    UnexpectedRollback,

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("illegal transaction state: {0}")]
    IllegalTransactionState(String),

    #[error("propagation {0} is not supported")]
    UnsupportedPropagation(Propagation),
}

impl TransactionError {
    pub fn is_unexpected_rollback(&self) -> bool {
        matches!(self, Self::UnexpectedRollback)
    }
}

pub type Result<T> = std::result::Result<T, TransactionError>;
