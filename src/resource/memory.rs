//! In-memory data source.
//!
//! Connections stage row writes locally and publish them to the shared tables
//! only on physical commit. Every physical action is journaled so callers can
//! observe exactly which begin/commit/rollback calls reached the resource.

use super::{DataSource, ResourceError, Result};
use crate::transaction::PhysicalState;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn{}", self.0)
    }
}

/// A physical action observed by the data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicalEvent {
    Begin { connection: ConnectionId, read_only: bool },
    Commit(ConnectionId),
    Rollback(ConnectionId),
    /// A commit or rollback that failed at the resource. Staged writes were
    /// thrown away and the connection is gone.
    Discard(ConnectionId),
}

impl std::fmt::Display for PhysicalEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Begin {
                connection,
                read_only: true,
            } => write!(f, "begin {} (read-only)", connection),
            Self::Begin { connection, .. } => write!(f, "begin {}", connection),
            Self::Commit(connection) => write!(f, "commit {}", connection),
            Self::Rollback(connection) => write!(f, "rollback {}", connection),
            Self::Discard(connection) => write!(f, "discard {}", connection),
        }
    }
}

/// A connection with an open physical transaction.
#[derive(Debug)]
pub struct MemoryConnection {
    id: ConnectionId,
    read_only: bool,
    writes: Vec<(String, String)>,
}

impl MemoryConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Stages a row for `table`. Visible to others only after commit.
    pub fn insert(&mut self, table: &str, row: impl Into<String>) -> Result<()> {
        if self.read_only {
            return Err(ResourceError::Write(format!(
                "connection {} is read-only",
                self.id
            )));
        }
        self.writes.push((table.to_string(), row.into()));
        Ok(())
    }

    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }
}

#[derive(Clone, Default)]
pub struct MemoryDataSource {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    tables: DashMap<String, Vec<String>>,
    states: DashMap<ConnectionId, PhysicalState>,
    journal: Mutex<Vec<PhysicalEvent>>,
    next_connection: AtomicU64,
    fail_next_open: AtomicBool,
    fail_next_commit: AtomicBool,
    fail_next_rollback: AtomicBool,
}

impl MemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a committed row equal to `row` exists in `table`.
    pub fn contains(&self, table: &str, row: &str) -> bool {
        self.inner
            .tables
            .get(table)
            .map(|rows| rows.iter().any(|r| r == row))
            .unwrap_or(false)
    }

    /// Committed rows of `table`, in commit order.
    pub fn rows(&self, table: &str) -> Vec<String> {
        self.inner
            .tables
            .get(table)
            .map(|rows| rows.value().clone())
            .unwrap_or_default()
    }

    pub fn events(&self) -> Vec<PhysicalEvent> {
        self.inner.journal.lock().clone()
    }

    pub fn state(&self, connection: ConnectionId) -> Option<PhysicalState> {
        self.inner.states.get(&connection).map(|s| *s.value())
    }

    pub fn begin_count(&self) -> usize {
        self.count(|e| matches!(e, PhysicalEvent::Begin { .. }))
    }

    pub fn commit_count(&self) -> usize {
        self.count(|e| matches!(e, PhysicalEvent::Commit(_)))
    }

    pub fn rollback_count(&self) -> usize {
        self.count(|e| matches!(e, PhysicalEvent::Rollback(_)))
    }

    /// Number of connections whose physical transaction has not ended.
    pub fn active_count(&self) -> usize {
        self.inner
            .states
            .iter()
            .filter(|entry| entry.value().is_active())
            .count()
    }

    /// Makes the next `open` fail.
    pub fn fail_next_open(&self) {
        self.inner.fail_next_open.store(true, Ordering::SeqCst);
    }

    /// Makes the next physical commit fail and discard its writes.
    pub fn fail_next_commit(&self) {
        self.inner.fail_next_commit.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_rollback(&self) {
        self.inner.fail_next_rollback.store(true, Ordering::SeqCst);
    }

    fn count(&self, predicate: impl Fn(&PhysicalEvent) -> bool) -> usize {
        self.inner.journal.lock().iter().filter(|e| predicate(e)).count()
    }

    fn record(&self, event: PhysicalEvent) {
        self.inner.journal.lock().push(event);
    }

    fn finish(
        &self,
        connection: ConnectionId,
        state: PhysicalState,
        error: fn(String) -> ResourceError,
    ) -> Result<()> {
        match self.inner.states.get_mut(&connection) {
            Some(mut current) if current.is_active() => {
                *current = state;
                Ok(())
            }
            Some(current) => Err(error(format!(
                "connection {} already {}",
                connection,
                *current
            ))),
            None => Err(error(format!(
                "unknown connection {}",
                connection
            ))),
        }
    }
}

impl DataSource for MemoryDataSource {
    type Connection = MemoryConnection;

    fn open(&self, read_only: bool) -> Result<MemoryConnection> {
        if self.inner.fail_next_open.swap(false, Ordering::SeqCst) {
            return Err(ResourceError::Open("connection refused".to_string()));
        }

        let id = ConnectionId(self.inner.next_connection.fetch_add(1, Ordering::SeqCst) + 1);
        self.inner.states.insert(id, PhysicalState::Active);
        self.record(PhysicalEvent::Begin {
            connection: id,
            read_only,
        });

        Ok(MemoryConnection {
            id,
            read_only,
            writes: Vec::new(),
        })
    }

    fn commit(&self, connection: MemoryConnection) -> Result<()> {
        if self.inner.fail_next_commit.swap(false, Ordering::SeqCst) {
            self.finish(connection.id, PhysicalState::RolledBack, ResourceError::Commit)?;
            self.record(PhysicalEvent::Discard(connection.id));
            return Err(ResourceError::Commit(format!(
                "connection {} lost during commit",
                connection.id
            )));
        }

        self.finish(connection.id, PhysicalState::Committed, ResourceError::Commit)?;
        for (table, row) in connection.writes {
            self.inner.tables.entry(table).or_default().push(row);
        }
        self.record(PhysicalEvent::Commit(connection.id));
        Ok(())
    }

    fn rollback(&self, connection: MemoryConnection) -> Result<()> {
        if self.inner.fail_next_rollback.swap(false, Ordering::SeqCst) {
            self.finish(connection.id, PhysicalState::RolledBack, ResourceError::Rollback)?;
            self.record(PhysicalEvent::Discard(connection.id));
            return Err(ResourceError::Rollback(format!(
                "connection {} lost during rollback",
                connection.id
            )));
        }

        self.finish(connection.id, PhysicalState::RolledBack, ResourceError::Rollback)?;
        self.record(PhysicalEvent::Rollback(connection.id));
        Ok(())
    }
}
