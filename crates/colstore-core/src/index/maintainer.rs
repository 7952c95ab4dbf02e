//! Keeps one secondary index consistent with its base table.
//!
//! Every maintenance write goes to the index table through the storage
//! contract with a [`PassThrough`] hook, so index writes never index
//! themselves, and reuses the write-order token of the base write that
//! caused it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::MaintainerOptions;
use crate::error::{Error, IndexError, StorageError};
use crate::schema::ResolvedTableSchema;
use crate::storage::{Cell, CellKind, Mutation, PassThrough, TableStore, WriteOrderToken};
use crate::types::Timestamp;

use super::IndexEntry;
use super::descriptor::IndexDescriptor;
use super::strategy::{ColumnIndexStrategy, IndexEntryStrategy};

/// Lifecycle of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IndexState {
    /// Created; existing base data not yet backfilled.
    Building = 0,
    Active = 1,
    /// Retired. Terminal.
    Invalidated = 2,
}

impl IndexState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => IndexState::Building,
            1 => IndexState::Active,
            _ => IndexState::Invalidated,
        }
    }
}

/// Maintains one index table.
pub struct SecondaryIndexMaintainer {
    descriptor: RwLock<Arc<IndexDescriptor>>,
    strategy: RwLock<Arc<dyn IndexEntryStrategy>>,
    base: Arc<dyn TableStore>,
    index: Arc<dyn TableStore>,
    options: MaintainerOptions,
    state: AtomicU8,
}

impl SecondaryIndexMaintainer {
    /// A maintainer using [`ColumnIndexStrategy`].
    pub fn new(
        descriptor: IndexDescriptor,
        base: Arc<dyn TableStore>,
        index: Arc<dyn TableStore>,
        options: MaintainerOptions,
    ) -> Self {
        let strategy = Arc::new(ColumnIndexStrategy::new(&descriptor));
        Self::with_strategy(descriptor, strategy, base, index, options)
    }

    pub fn with_strategy(
        descriptor: IndexDescriptor,
        strategy: Arc<dyn IndexEntryStrategy>,
        base: Arc<dyn TableStore>,
        index: Arc<dyn TableStore>,
        options: MaintainerOptions,
    ) -> Self {
        Self {
            descriptor: RwLock::new(Arc::new(descriptor)),
            strategy: RwLock::new(strategy),
            base,
            index,
            options,
            state: AtomicU8::new(IndexState::Building as u8),
        }
    }

    pub fn state(&self) -> IndexState {
        IndexState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_invalidated(&self) -> bool {
        self.state() == IndexState::Invalidated
    }

    pub fn descriptor(&self) -> Arc<IndexDescriptor> {
        Arc::clone(&self.descriptor.read())
    }

    pub fn index_table(&self) -> &Arc<dyn TableStore> {
        &self.index
    }

    /// Whether `cell` of the base table carries the indexed column.
    pub fn indexes(&self, cell: &Cell) -> bool {
        self.strategy.read().indexes(cell)
    }

    /// Estimated number of base rows matching one indexed value.
    pub fn estimate_result_rows(&self) -> u64 {
        self.index.mean_columns()
    }

    fn entry(&self, row_key: &[u8], cell: &Cell) -> Result<IndexEntry, Error> {
        let strategy = Arc::clone(&self.strategy.read());
        strategy.entry(row_key, cell)
    }

    /// Whether `error` only reports that this index was retired while the
    /// operation was in flight.
    fn retired(&self, error: &StorageError) -> bool {
        matches!(error, StorageError::Invalidated(_)) && self.is_invalidated()
    }

    fn write(&self, entry: IndexEntry, cell: Cell, token: &WriteOrderToken) -> Result<(), Error> {
        let result = self
            .index
            .apply(&entry.partition_key, Mutation::single(cell), &PassThrough, token);
        match result {
            Err(Error::Storage(e)) if self.retired(&e) => {
                debug!(index = %self.index.id(), "index invalidated during write, skipped");
                Ok(())
            }
            other => other,
        }
    }

    /// Record `cell` of base partition `row_key` in the index.
    ///
    /// Cells that are not live are ignored. Expiring cells produce index
    /// entries expiring at the same time.
    pub fn insert(&self, row_key: &[u8], cell: &Cell, token: &WriteOrderToken) -> Result<(), Error> {
        if self.is_invalidated() || !cell.is_live(self.options.now()) {
            return Ok(());
        }
        let entry = self.entry(row_key, cell)?;
        let kind = match cell.kind {
            expiring @ CellKind::Expiring { .. } => expiring,
            _ => CellKind::Live,
        };
        let index_cell = Cell {
            name: entry.cell_name.clone(),
            value: Vec::new(),
            timestamp: cell.timestamp,
            kind,
        };
        debug!(index = %self.index.id(), timestamp = cell.timestamp, "insert index entry");
        self.write(entry, index_cell, token)
    }

    /// Remove the entry for `cell` of base partition `row_key`.
    ///
    /// The tombstone carries the base cell's timestamp, so it shadows the
    /// entry written for that cell and nothing newer.
    pub fn delete(&self, row_key: &[u8], cell: &Cell, token: &WriteOrderToken) -> Result<(), Error> {
        let now = self.options.now();
        if self.is_invalidated() || !cell.is_live(now) {
            return Ok(());
        }
        let entry = self.entry(row_key, cell)?;
        let tombstone = Cell::tombstone(entry.cell_name.clone(), cell.timestamp, now);
        debug!(index = %self.index.id(), timestamp = cell.timestamp, "delete index entry");
        self.write(entry, tombstone, token)
    }

    /// Replace the entry for `old` with the entry for `new`.
    ///
    /// The new entry is written first, so readers never see neither. The old
    /// entry is kept when the cleanup policy finds nothing to remove.
    pub fn update(
        &self,
        row_key: &[u8],
        old: &Cell,
        new: &Cell,
        token: &WriteOrderToken,
    ) -> Result<(), Error> {
        if self.is_invalidated() {
            return Ok(());
        }
        self.insert(row_key, new, token)?;
        let now = self.options.now();
        if !old.is_live(now) {
            return Ok(());
        }
        if new.is_live(now) {
            let old_entry = self.entry(row_key, old)?;
            let new_entry = self.entry(row_key, new)?;
            if !(self.options.cleanup)(&old_entry, &new_entry) {
                return Ok(());
            }
        }
        self.delete(row_key, old, token)
    }

    /// Flush the index table and wait for it.
    ///
    /// The flush is issued under the base table's write tracker so it is
    /// ordered against base flushes; the wait happens after the lock is
    /// released.
    pub fn force_blocking_flush(&self) -> Result<(), Error> {
        if self.is_invalidated() {
            return Ok(());
        }
        let tracker = self.base.write_tracker();
        let flushed = tracker
            .issue(|| self.index.force_flush())
            .and_then(|handle| handle.wait());
        match flushed {
            Ok(()) => {
                info!(index = %self.index.id(), "flushed index");
                Ok(())
            }
            Err(e) if self.retired(&e) => {
                debug!(index = %self.index.id(), "index invalidated during flush, skipped");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Drop index data written at or before `timestamp`.
    pub fn truncate_blocking(&self, timestamp: Timestamp) -> Result<(), Error> {
        if self.is_invalidated() {
            return Ok(());
        }
        match self.index.discard_sstables(timestamp) {
            Err(e) if !self.retired(&e) => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Retire the index and its table. Idempotent.
    pub fn invalidate(&self) {
        let previous = self
            .state
            .swap(IndexState::Invalidated as u8, Ordering::AcqRel);
        if IndexState::from_u8(previous) == IndexState::Invalidated {
            return;
        }
        self.index.invalidate();
        info!(index = %self.index.id(), "invalidated index");
    }

    /// Re-derive the index schema from a new version of the base table.
    ///
    /// Returns whether the index schema changed. Existing index data is kept.
    pub fn reload(&self, base: Arc<ResolvedTableSchema>) -> Result<bool, Error> {
        if self.is_invalidated() {
            return Err(IndexError::Invalidated(self.index.id().to_string()).into());
        }
        let current = self.descriptor();
        let rebased = current.rebased(base)?;
        let strategy = self.strategy.read().rebind(&rebased)?;
        let changed = rebased.index_schema().schema_version()
            != current.index_schema().schema_version();
        if changed {
            self.index.reload(Arc::new(rebased.index_schema().clone()));
        }
        *self.strategy.write() = strategy;
        *self.descriptor.write() = Arc::new(rebased);
        info!(index = %self.index.id(), changed, "reloaded index");
        Ok(changed)
    }

    /// Backfill the index from the base table's current data and mark it
    /// active. Returns the number of entries written.
    pub fn build(&self, token: &WriteOrderToken) -> Result<usize, Error> {
        if self.is_invalidated() {
            return Err(IndexError::Invalidated(self.index.id().to_string()).into());
        }
        let now = self.options.now();
        let mut written = 0;
        for (row_key, cell) in self.base.scan() {
            if !cell.is_live(now) || !self.indexes(&cell) {
                continue;
            }
            self.insert(&row_key, &cell, token)?;
            written += 1;
        }
        let activated = self.state.compare_exchange(
            IndexState::Building as u8,
            IndexState::Active as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if let Err(current) = activated {
            debug!(
                index = %self.index.id(),
                state = ?IndexState::from_u8(current),
                "index left building state during backfill"
            );
        }
        info!(index = %self.index.id(), entries = written, "built index");
        Ok(written)
    }
}
