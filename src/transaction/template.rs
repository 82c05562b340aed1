//! Closure-scoped transaction demarcation.

use super::context::TransactionContext;
use super::manager::TransactionCoordinator;
use super::propagation::TransactionDefinition;
use crate::resource::DataSource;
use anyhow::Result;

/// Runs a closure inside a logical transaction.
///
/// The closure's `Ok` commits and its `Err` rolls back. Every transactional
/// operation goes through an explicit `execute` call, so nested calls get
/// their own logical transaction no matter who calls them.
pub struct TransactionTemplate<'a, D: DataSource> {
    coordinator: &'a TransactionCoordinator<D>,
    definition: TransactionDefinition,
}

impl<'a, D: DataSource> TransactionTemplate<'a, D> {
    pub fn new(coordinator: &'a TransactionCoordinator<D>, definition: TransactionDefinition) -> Self {
        Self {
            coordinator,
            definition,
        }
    }

    pub fn definition(&self) -> &TransactionDefinition {
        &self.definition
    }

    /// Begins a transaction, runs `action` and completes the transaction
    /// according to its outcome.
    ///
    /// Application errors are returned unchanged after rollback. A commit that
    /// turned into a rollback surfaces as
    /// [`TransactionError::UnexpectedRollback`](super::TransactionError::UnexpectedRollback).
    pub fn execute<T, F>(&self, ctx: &mut TransactionContext<D::Connection>, action: F) -> Result<T>
    where
        F: FnOnce(&mut TransactionContext<D::Connection>) -> Result<T>,
    {
        let handle = self.coordinator.begin(ctx, self.definition.clone())?;

        match action(ctx) {
            Ok(value) => {
                self.coordinator.commit(ctx, handle)?;
                Ok(value)
            }
            Err(err) => match self.coordinator.rollback(ctx, handle) {
                Ok(()) => Err(err),
                Err(rollback_err) => {
                    log::error!(
                        "Application error overridden by rollback failure in {}: {:#}",
                        self.definition.display_name(),
                        err
                    );
                    Err(rollback_err.into())
                }
            },
        }
    }
}
