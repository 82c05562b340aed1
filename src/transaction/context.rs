//! Per-call-chain transaction state.

use super::id::TransactionId;

/// The physical transaction currently bound to a context.
#[derive(Debug)]
pub(crate) struct ActiveTransaction<C> {
    pub(crate) id: TransactionId,
    pub(crate) connection: C,
    pub(crate) read_only: bool,
}

/// An outer physical transaction parked while an independent one runs.
///
/// Carries the outer rollback-only mark so the inner transaction can neither
/// observe nor clear it.
#[derive(Debug)]
pub struct SuspendedTransaction<C> {
    transaction: ActiveTransaction<C>,
    rollback_only: bool,
}

impl<C> SuspendedTransaction<C> {
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction.id
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }
}

/// Transaction state of one logical call chain.
///
/// Each chain owns exactly one context and passes it by `&mut` into every
/// coordinator call. `depth` counts the logical transactions begun and not yet
/// completed; it is zero exactly when no physical transaction is active.
#[derive(Debug)]
pub struct TransactionContext<C> {
    active: Option<ActiveTransaction<C>>,
    depth: usize,
    rollback_only: bool,
}

impl<C> TransactionContext<C> {
    pub fn new() -> Self {
        Self {
            active: None,
            depth: 0,
            rollback_only: false,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// True once a participant has doomed the active physical transaction.
    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    pub fn is_actual_transaction_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_current_transaction_read_only(&self) -> bool {
        self.active.as_ref().map(|t| t.read_only).unwrap_or(false)
    }

    pub fn current_transaction_id(&self) -> Option<TransactionId> {
        self.active.as_ref().map(|t| t.id)
    }

    /// The resource of the active physical transaction.
    pub fn connection(&self) -> Option<&C> {
        self.active.as_ref().map(|t| &t.connection)
    }

    pub fn connection_mut(&mut self) -> Option<&mut C> {
        self.active.as_mut().map(|t| &mut t.connection)
    }

    pub(crate) fn enter(&mut self) {
        self.depth += 1;
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub(crate) fn mark_rollback_only(&mut self) {
        self.rollback_only = true;
    }

    /// Binds a freshly opened physical transaction.
    pub(crate) fn activate(&mut self, transaction: ActiveTransaction<C>) {
        self.active = Some(transaction);
        self.rollback_only = false;
    }

    /// Unbinds the active physical transaction because it is ending.
    pub(crate) fn take_active(&mut self) -> Option<ActiveTransaction<C>> {
        self.rollback_only = false;
        self.active.take()
    }

    pub(crate) fn suspend(&mut self) -> Option<SuspendedTransaction<C>> {
        let rollback_only = std::mem::take(&mut self.rollback_only);
        self.active.take().map(|transaction| SuspendedTransaction {
            transaction,
            rollback_only,
        })
    }

    pub(crate) fn resume(&mut self, suspended: Option<SuspendedTransaction<C>>) {
        if let Some(suspended) = suspended {
            self.active = Some(suspended.transaction);
            self.rollback_only = suspended.rollback_only;
        }
    }
}

impl<C> Default for TransactionContext<C> {
    fn default() -> Self {
        Self::new()
    }
}
