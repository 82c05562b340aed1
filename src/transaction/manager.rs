//! Transaction coordinator: begin, commit and rollback across nested scopes.

use super::context::{ActiveTransaction, SuspendedTransaction, TransactionContext};
use super::error::{Result, TransactionError};
use super::id::{TransactionId, TransactionIdGenerator};
use super::propagation::{decide, PropagationAction, TransactionDefinition};
use crate::resource::{DataSource, ResourceError};

/// The result of one `begin`, to be handed back to exactly one `commit` or
/// `rollback` on the same context.
#[derive(Debug)]
#[must_use = "a transaction handle must be completed with commit or rollback"]
pub struct TransactionHandle<C> {
    transaction_id: TransactionId,
    definition: TransactionDefinition,
    /// Context depth right after this handle's `begin`.
    depth: usize,
    new_transaction: bool,
    rollback_only: bool,
    suspended: Option<SuspendedTransaction<C>>,
}

impl<C> TransactionHandle<C> {
    /// The physical transaction this logical transaction runs in.
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    pub fn definition(&self) -> &TransactionDefinition {
        &self.definition
    }

    /// Nesting level of this logical transaction, starting at 1.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// True if this `begin` opened the physical transaction.
    pub fn is_new_transaction(&self) -> bool {
        self.new_transaction
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    /// Requests that `commit` on this handle behave as `rollback`.
    pub fn set_rollback_only(&mut self) {
        self.rollback_only = true;
    }

    /// The outer transaction this one suspended, if any.
    pub fn suspended(&self) -> Option<&SuspendedTransaction<C>> {
        self.suspended.as_ref()
    }
}

/// Decides when logical transaction boundaries touch the physical resource.
pub struct TransactionCoordinator<D: DataSource> {
    data_source: D,
    id_generator: TransactionIdGenerator,
}

impl<D: DataSource> TransactionCoordinator<D> {
    pub fn new(data_source: D) -> Self {
        Self {
            data_source,
            id_generator: TransactionIdGenerator::new(),
        }
    }

    pub fn data_source(&self) -> &D {
        &self.data_source
    }

    /// Number of physical transactions this coordinator has opened.
    pub fn transactions_started(&self) -> u64 {
        self.id_generator.issued()
    }

    /// Begins a logical transaction.
    ///
    /// Opens a physical transaction when the propagation requires one. If the
    /// resource fails to open, the context is left exactly as it was.
    pub fn begin(
        &self,
        ctx: &mut TransactionContext<D::Connection>,
        definition: TransactionDefinition,
    ) -> Result<TransactionHandle<D::Connection>> {
        let action = decide(definition.propagation, ctx.is_actual_transaction_active())?;
        let depth = ctx.depth() + 1;

        let handle = match action {
            PropagationAction::Join => {
                let transaction_id = ctx.current_transaction_id().ok_or_else(|| {
                    TransactionError::IllegalTransactionState(
                        "no active transaction to participate in".to_string(),
                    )
                })?;
                log::debug!(
                    "Participating in existing transaction {} for {}",
                    transaction_id,
                    definition.display_name()
                );
                TransactionHandle {
                    transaction_id,
                    definition,
                    depth,
                    new_transaction: false,
                    rollback_only: false,
                    suspended: None,
                }
            }
            PropagationAction::StartNew | PropagationAction::SuspendAndStartNew => {
                let connection = self
                    .data_source
                    .open(definition.read_only)
                    .map_err(|e| self.resource_failure("open", e))?;
                let transaction_id = self.id_generator.next();

                let suspended = if action == PropagationAction::SuspendAndStartNew {
                    let suspended = ctx.suspend();
                    if let Some(outer) = &suspended {
                        log::debug!(
                            "Suspending current transaction {}, creating new transaction {} for {}",
                            outer.transaction_id(),
                            transaction_id,
                            definition.display_name()
                        );
                    }
                    suspended
                } else {
                    log::debug!(
                        "Creating new transaction {} for {}",
                        transaction_id,
                        definition.display_name()
                    );
                    None
                };

                ctx.activate(ActiveTransaction {
                    id: transaction_id,
                    connection,
                    read_only: definition.read_only,
                });

                TransactionHandle {
                    transaction_id,
                    definition,
                    depth,
                    new_transaction: true,
                    rollback_only: false,
                    suspended,
                }
            }
        };

        ctx.enter();
        Ok(handle)
    }

    /// Completes a logical transaction successfully.
    ///
    /// Only the logical transaction that opened the physical one commits it.
    /// If any participant marked the physical transaction rollback-only, it is
    /// rolled back instead and [`TransactionError::UnexpectedRollback`] is
    /// returned.
    pub fn commit(
        &self,
        ctx: &mut TransactionContext<D::Connection>,
        handle: TransactionHandle<D::Connection>,
    ) -> Result<()> {
        Self::check_owner(ctx, &handle, "commit")?;

        if handle.rollback_only {
            log::debug!(
                "Transactional code of {} has requested rollback",
                handle.definition.display_name()
            );
            return self.rollback(ctx, handle);
        }

        ctx.leave();
        if !handle.new_transaction {
            return Ok(());
        }

        let doomed = ctx.is_rollback_only();
        let transaction = Self::end_physical(ctx)?;

        let result = if doomed {
            log::debug!(
                "Global transaction {} is marked as rollback-only but transactional code requested commit",
                transaction.id
            );
            self.data_source
                .rollback(transaction.connection)
                .map_err(|e| self.resource_failure("rollback", e))
                .and(Err(TransactionError::UnexpectedRollback))
        } else {
            log::debug!("Initiating transaction commit of {}", transaction.id);
            self.data_source
                .commit(transaction.connection)
                .map_err(|e| self.resource_failure("commit", e))
        };

        self.resume(ctx, handle.suspended);
        result
    }

    /// Completes a logical transaction with failure.
    ///
    /// The logical transaction that opened the physical one rolls it back; a
    /// participant only marks the physical transaction rollback-only.
    pub fn rollback(
        &self,
        ctx: &mut TransactionContext<D::Connection>,
        handle: TransactionHandle<D::Connection>,
    ) -> Result<()> {
        Self::check_owner(ctx, &handle, "rollback")?;

        ctx.leave();
        if !handle.new_transaction {
            log::debug!(
                "Participating transaction {} failed - marking existing transaction as rollback-only",
                handle.transaction_id
            );
            ctx.mark_rollback_only();
            return Ok(());
        }

        let transaction = Self::end_physical(ctx)?;
        log::debug!("Initiating transaction rollback of {}", transaction.id);
        let result = self
            .data_source
            .rollback(transaction.connection)
            .map_err(|e| self.resource_failure("rollback", e));

        self.resume(ctx, handle.suspended);
        result
    }

    /// A handle may only be completed while it is the innermost logical
    /// transaction of the context it was begun on.
    fn check_owner(
        ctx: &TransactionContext<D::Connection>,
        handle: &TransactionHandle<D::Connection>,
        operation: &str,
    ) -> Result<()> {
        match ctx.current_transaction_id() {
            Some(active) if active != handle.transaction_id => {
                Err(TransactionError::IllegalTransactionState(format!(
                    "cannot {} {}: transaction {} is active; complete inner transactions first",
                    operation, handle.transaction_id, active
                )))
            }
            Some(_) if ctx.depth() != handle.depth => {
                Err(TransactionError::IllegalTransactionState(format!(
                    "cannot {} {} at depth {}: context is at depth {}; complete inner transactions first",
                    operation,
                    handle.transaction_id,
                    handle.depth,
                    ctx.depth()
                )))
            }
            Some(_) => Ok(()),
            None => Err(TransactionError::IllegalTransactionState(format!(
                "cannot {} {}: no transaction is active",
                operation, handle.transaction_id
            ))),
        }
    }

    fn end_physical(
        ctx: &mut TransactionContext<D::Connection>,
    ) -> Result<ActiveTransaction<D::Connection>> {
        ctx.take_active().ok_or_else(|| {
            TransactionError::IllegalTransactionState("no physical transaction to end".to_string())
        })
    }

    fn resume(
        &self,
        ctx: &mut TransactionContext<D::Connection>,
        suspended: Option<SuspendedTransaction<D::Connection>>,
    ) {
        if let Some(outer) = &suspended {
            log::debug!(
                "Resuming suspended transaction {} after completion of inner transaction",
                outer.transaction_id()
            );
        }
        ctx.resume(suspended);
    }

    fn resource_failure(&self, operation: &str, error: ResourceError) -> TransactionError {
        log::error!("Physical {} failed: {}", operation, error);
        TransactionError::Resource(error)
    }
}
