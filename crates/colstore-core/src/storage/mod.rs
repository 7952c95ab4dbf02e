//! The storage-engine contract consumed by index maintenance, and an
//! in-memory engine implementing it.

pub mod cell;
pub mod memory;
pub mod write_order;

pub use cell::{Cell, CellKind, Mutation};
pub use memory::InMemoryTableStore;
pub use write_order::{WriteBarrier, WriteOrder, WriteOrderToken, WriteTracker};

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, StorageError};
use crate::schema::ResolvedTableSchema;
use crate::types::Timestamp;

/// Callbacks fired while a mutation is applied, one per cell whose visible
/// state changes.
///
/// A secondary index manager is the usual hook. Writes that must not be
/// indexed, such as the index writes themselves, pass [`PassThrough`].
pub trait UpdateHook: Send + Sync {
    /// A live cell was written where nothing was visible.
    fn on_insert(&self, key: &[u8], cell: &Cell, token: &WriteOrderToken) -> Result<(), Error>;

    /// A live cell replaced `old`.
    fn on_update(
        &self,
        key: &[u8],
        old: &Cell,
        new: &Cell,
        token: &WriteOrderToken,
    ) -> Result<(), Error>;

    /// A tombstone replaced the live cell `old`.
    fn on_delete(&self, key: &[u8], old: &Cell, token: &WriteOrderToken) -> Result<(), Error>;
}

/// An [`UpdateHook`] that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl UpdateHook for PassThrough {
    fn on_insert(&self, _: &[u8], _: &Cell, _: &WriteOrderToken) -> Result<(), Error> {
        Ok(())
    }

    fn on_update(&self, _: &[u8], _: &Cell, _: &Cell, _: &WriteOrderToken) -> Result<(), Error> {
        Ok(())
    }

    fn on_delete(&self, _: &[u8], _: &Cell, _: &WriteOrderToken) -> Result<(), Error> {
        Ok(())
    }
}

/// The per-table storage contract.
pub trait TableStore: Send + Sync {
    /// `keyspace.table`
    fn id(&self) -> &str;

    fn schema(&self) -> Arc<ResolvedTableSchema>;

    /// Swap in a new schema. Stored data is kept as is.
    fn reload(&self, schema: Arc<ResolvedTableSchema>);

    /// Write `mutation` into partition `partition_key`, firing `hook` for
    /// every cell that changes the visible state.
    fn apply(
        &self,
        partition_key: &[u8],
        mutation: Mutation,
        hook: &dyn UpdateHook,
        token: &WriteOrderToken,
    ) -> Result<(), Error>;

    /// Start flushing the in-memory state. The handle completes once the
    /// data is durable.
    fn force_flush(&self) -> Result<FlushHandle, StorageError>;

    /// Drop all data written at or before `timestamp`.
    fn discard_sstables(&self, timestamp: Timestamp) -> Result<(), StorageError>;

    /// Retire the table. Idempotent; later writes are rejected.
    fn invalidate(&self);

    /// The lock base and index flushes are issued under.
    fn write_tracker(&self) -> Arc<WriteTracker>;

    /// Mean number of cells per partition.
    fn mean_columns(&self) -> u64;

    /// The reconciled cells of one partition, tombstones included, in
    /// comparator order.
    fn read(&self, partition_key: &[u8]) -> Vec<Cell>;

    /// Every reconciled cell of the table, by partition.
    fn scan(&self) -> Vec<(Vec<u8>, Cell)>;
}

#[derive(Debug)]
struct FlushSignal {
    table: String,
    outcome: Mutex<Option<Result<(), String>>>,
    done: Condvar,
}

/// Completion handle of a flush.
#[derive(Debug, Clone)]
pub struct FlushHandle {
    signal: Arc<FlushSignal>,
}

impl FlushHandle {
    /// A handle and the completer that resolves it.
    pub fn pending(table: &str) -> (Self, FlushCompleter) {
        let signal = Arc::new(FlushSignal {
            table: table.to_string(),
            outcome: Mutex::new(None),
            done: Condvar::new(),
        });
        (
            Self {
                signal: Arc::clone(&signal),
            },
            FlushCompleter {
                signal: Some(signal),
            },
        )
    }

    /// A handle that is already complete.
    pub fn completed(table: &str) -> Self {
        let (handle, completer) = Self::pending(table);
        completer.complete(Ok(()));
        handle
    }

    pub fn is_done(&self) -> bool {
        self.signal.outcome.lock().is_some()
    }

    /// Block until the flush finishes.
    pub fn wait(&self) -> Result<(), StorageError> {
        let mut outcome = self.signal.outcome.lock();
        while outcome.is_none() {
            self.signal.done.wait(&mut outcome);
        }
        match outcome.as_ref() {
            Some(Ok(())) => Ok(()),
            Some(Err(reason)) => Err(StorageError::FlushAborted(format!(
                "{}: {reason}",
                self.signal.table
            ))),
            None => Err(StorageError::FlushAborted(self.signal.table.clone())),
        }
    }
}

/// Resolves a [`FlushHandle`]. Dropping it unresolved aborts the flush.
#[derive(Debug)]
pub struct FlushCompleter {
    signal: Option<Arc<FlushSignal>>,
}

impl FlushCompleter {
    pub fn complete(mut self, result: Result<(), StorageError>) {
        if let Some(signal) = self.signal.take() {
            Self::resolve(&signal, result.map_err(|e| e.to_string()));
        }
    }

    fn resolve(signal: &FlushSignal, result: Result<(), String>) {
        *signal.outcome.lock() = Some(result);
        signal.done.notify_all();
    }
}

impl Drop for FlushCompleter {
    fn drop(&mut self) {
        if let Some(signal) = self.signal.take() {
            Self::resolve(&signal, Err("flusher went away".to_string()));
        }
    }
}
