//! Physical resources the coordinator drives.
//!
//! A [`DataSource`] hands out connections and performs the physical
//! begin/commit/rollback on them. The coordinator treats the connection as an
//! opaque value: it stores it, moves it in and out of suspension and finally
//! gives it back to the data source to commit or roll back.

pub mod memory;

pub use memory::{ConnectionId, MemoryConnection, MemoryDataSource, PhysicalEvent};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("failed to open connection: {0}")]
    Open(String),

    #[error("physical commit failed: {0}")]
    Commit(String),

    #[error("physical rollback failed: {0}")]
    Rollback(String),

    #[error("write rejected: {0}")]
    Write(String),
}

pub type Result<T> = std::result::Result<T, ResourceError>;

/// A source of physical transactions.
///
/// `commit` and `rollback` consume the connection: once either returns, the
/// physical transaction has ended whether or not the call succeeded.
pub trait DataSource {
    type Connection;

    /// Opens a connection with a physical transaction already begun on it.
    fn open(&self, read_only: bool) -> Result<Self::Connection>;

    fn commit(&self, connection: Self::Connection) -> Result<()>;

    fn rollback(&self, connection: Self::Connection) -> Result<()>;
}
