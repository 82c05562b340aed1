//! Transaction coordination module.
//!
//! This module lets independently written operations share one physical
//! transaction while each manages its own logical one:
//! - Propagation decisions (join, start new, suspend and start new)
//! - Logical versus physical commit and rollback
//! - Rollback-only marking by failed participants
//! - Closure-scoped demarcation through [`TransactionTemplate`]

pub mod context;
pub mod error;
pub mod id;
pub mod manager;
pub mod propagation;
pub mod state;
pub mod template;

// Re-export commonly used types
pub use context::{SuspendedTransaction, TransactionContext};
pub use error::TransactionError;
pub use id::{TransactionId, TransactionIdGenerator};
pub use manager::{TransactionCoordinator, TransactionHandle};
pub use propagation::{decide, Propagation, PropagationAction, TransactionDefinition};
pub use state::PhysicalState;
pub use template::TransactionTemplate;
