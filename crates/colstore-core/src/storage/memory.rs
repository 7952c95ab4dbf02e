//! An in-memory table engine: a memtable, a background flusher and a list
//! of immutable flushed segments.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::mpsc::{Sender, channel};
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::Clock;
use crate::error::{Error, StorageError};
use crate::schema::ResolvedTableSchema;
use crate::types::Timestamp;

use super::cell::{Cell, Mutation};
use super::write_order::{WriteBarrier, WriteOrder, WriteOrderToken, WriteTracker};
use super::{FlushCompleter, FlushHandle, TableStore, UpdateHook};

type Partition = BTreeMap<Vec<u8>, Cell>;
type Partitions = BTreeMap<Vec<u8>, Partition>;

#[derive(Debug, Default)]
struct TableData {
    memtable: Partitions,
    /// Memtables handed to the flusher but not yet written out.
    flushing: Vec<(u64, Arc<Partitions>)>,
    /// Flushed, immutable segments, oldest first.
    segments: Vec<Partitions>,
    next_generation: u64,
}

impl TableData {
    /// Sources from oldest to newest.
    fn sources(&self) -> impl Iterator<Item = &Partitions> {
        self.segments
            .iter()
            .chain(self.flushing.iter().map(|(_, p)| p.as_ref()))
            .chain(std::iter::once(&self.memtable))
    }

    fn lookup(&self, key: &[u8], name: &[u8]) -> Option<Cell> {
        let mut current: Option<&Cell> = None;
        for source in self.sources() {
            if let Some(cell) = source.get(key).and_then(|p| p.get(name))
                && current.is_none_or(|c| cell.supersedes(c))
            {
                current = Some(cell);
            }
        }
        current.cloned()
    }

    fn merged(&self) -> Partitions {
        let mut merged = Partitions::new();
        for source in self.sources() {
            for (key, partition) in source {
                let target = merged.entry(key.clone()).or_default();
                for (name, cell) in partition {
                    match target.get(name) {
                        Some(existing) if !cell.supersedes(existing) => {}
                        _ => {
                            target.insert(name.clone(), cell.clone());
                        }
                    }
                }
            }
        }
        merged
    }
}

fn discard_up_to(partitions: &mut Partitions, timestamp: Timestamp) -> usize {
    let mut dropped = 0;
    partitions.retain(|_, partition| {
        let before = partition.len();
        partition.retain(|_, cell| cell.timestamp > timestamp);
        dropped += before - partition.len();
        !partition.is_empty()
    });
    dropped
}

struct FlushTask {
    generation: u64,
    barrier: WriteBarrier,
    completer: FlushCompleter,
}

struct StoreInner {
    id: String,
    schema: RwLock<Arc<ResolvedTableSchema>>,
    data: Mutex<TableData>,
    write_order: WriteOrder,
    tracker: Arc<WriteTracker>,
    clock: Clock,
    invalidated: AtomicBool,
}

impl StoreInner {
    fn finish_flush(&self, task: FlushTask) {
        task.barrier.await_completion();
        let mut data = self.data.lock();
        let position = data
            .flushing
            .iter()
            .position(|(generation, _)| *generation == task.generation);
        let Some(position) = position else {
            // Invalidated while the flush was pending.
            drop(data);
            task.completer
                .complete(Err(StorageError::Invalidated(self.id.clone())));
            return;
        };
        let (generation, partitions) = data.flushing.remove(position);
        let partitions = Arc::try_unwrap(partitions).unwrap_or_else(|shared| (*shared).clone());
        let cells: usize = partitions.values().map(BTreeMap::len).sum();
        data.segments.push(partitions);
        drop(data);
        debug!(table = %self.id, generation, cells, "flushed memtable");
        task.completer.complete(Ok(()));
    }
}

/// An in-memory [`TableStore`].
///
/// Cells are reconciled last-write-wins. Flushes run on a background thread
/// and wait for every write started before them to finish.
pub struct InMemoryTableStore {
    inner: Arc<StoreInner>,
    flusher: Option<Sender<FlushTask>>,
    worker: Option<JoinHandle<()>>,
}

impl InMemoryTableStore {
    pub fn new(schema: Arc<ResolvedTableSchema>, write_order: WriteOrder, clock: Clock) -> Self {
        let inner = Arc::new(StoreInner {
            id: schema.id(),
            schema: RwLock::new(schema),
            data: Mutex::new(TableData::default()),
            write_order,
            tracker: Arc::new(WriteTracker::new()),
            clock,
            invalidated: AtomicBool::new(false),
        });

        let (sender, receiver) = channel::<FlushTask>();
        let worker_inner = Arc::clone(&inner);
        let worker = thread::Builder::new()
            .name(format!("flush-{}", inner.id))
            .spawn(move || {
                while let Ok(task) = receiver.recv() {
                    worker_inner.finish_flush(task);
                }
            });
        let (flusher, worker) = match worker {
            Ok(handle) => (Some(sender), Some(handle)),
            Err(e) => {
                warn!(table = %inner.id, error = %e, "could not start flusher, flushes will fail");
                (None, None)
            }
        };

        Self {
            inner,
            flusher,
            worker,
        }
    }

    pub fn write_order(&self) -> &WriteOrder {
        &self.inner.write_order
    }

    /// Live cells of a partition at the store's current time.
    pub fn live_cells(&self, partition_key: &[u8]) -> Vec<Cell> {
        let now = (self.inner.clock)();
        self.read(partition_key)
            .into_iter()
            .filter(|c| c.is_live(now))
            .collect()
    }

    pub fn get(&self, partition_key: &[u8], name: &[u8]) -> Option<Cell> {
        self.inner.data.lock().lookup(partition_key, name)
    }

    /// Number of flushed segments.
    pub fn segment_count(&self) -> usize {
        self.inner.data.lock().segments.len()
    }

    /// Number of cells in the active memtable.
    pub fn memtable_cells(&self) -> usize {
        self.inner
            .data
            .lock()
            .memtable
            .values()
            .map(BTreeMap::len)
            .sum()
    }

    pub fn is_invalidated(&self) -> bool {
        self.inner.invalidated.load(AtomicOrdering::Acquire)
    }

    fn check_valid(&self) -> Result<(), StorageError> {
        if self.is_invalidated() {
            return Err(StorageError::Invalidated(self.inner.id.clone()));
        }
        Ok(())
    }

    fn sorted(&self, mut cells: Vec<Cell>) -> Vec<Cell> {
        let schema = self.schema();
        let comparator = schema.comparator();
        cells.sort_by(|a, b| comparator.compare(&a.name, &b.name));
        cells
    }
}

impl Drop for InMemoryTableStore {
    fn drop(&mut self) {
        // Closing the channel stops the worker once pending flushes are done.
        self.flusher.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl TableStore for InMemoryTableStore {
    fn id(&self) -> &str {
        &self.inner.id
    }

    fn schema(&self) -> Arc<ResolvedTableSchema> {
        Arc::clone(&self.inner.schema.read())
    }

    fn reload(&self, schema: Arc<ResolvedTableSchema>) {
        *self.inner.schema.write() = schema;
    }

    fn apply(
        &self,
        partition_key: &[u8],
        mutation: Mutation,
        hook: &dyn UpdateHook,
        token: &WriteOrderToken,
    ) -> Result<(), Error> {
        self.check_valid()?;
        let schema = self.schema();
        schema.key_encoding().decode(partition_key)?;
        for cell in mutation.cells() {
            schema.comparator().decode(&cell.name)?;
        }

        let now = (self.inner.clock)();
        let mut data = self.inner.data.lock();
        // Nothing reaches the memtable until every hook has succeeded.
        let mut winners: BTreeMap<Vec<u8>, Cell> = BTreeMap::new();
        for cell in mutation.into_cells() {
            let existing = match winners.get(&cell.name) {
                Some(pending) => Some(pending.clone()),
                None => data.lookup(partition_key, &cell.name),
            };
            match &existing {
                Some(old) if !cell.supersedes(old) => continue,
                Some(old) if cell.is_live(now) => hook.on_update(partition_key, old, &cell, token)?,
                Some(old) if old.is_live(now) => hook.on_delete(partition_key, old, token)?,
                Some(_) => {}
                None if cell.is_live(now) => hook.on_insert(partition_key, &cell, token)?,
                None => {}
            }
            winners.insert(cell.name.clone(), cell);
        }
        if !winners.is_empty() {
            data.memtable
                .entry(partition_key.to_vec())
                .or_default()
                .extend(winners);
        }
        Ok(())
    }

    fn force_flush(&self) -> Result<FlushHandle, StorageError> {
        self.inner.tracker.issue(|| -> Result<FlushHandle, StorageError> {
            self.check_valid()?;
            let mut data = self.inner.data.lock();
            let memtable = std::mem::take(&mut data.memtable);
            let barrier = self.inner.write_order.barrier();
            if memtable.is_empty() {
                return Ok(FlushHandle::completed(&self.inner.id));
            }
            let generation = data.next_generation;
            data.next_generation += 1;
            data.flushing.push((generation, Arc::new(memtable)));
            drop(data);

            let (handle, completer) = FlushHandle::pending(&self.inner.id);
            let task = FlushTask {
                generation,
                barrier,
                completer,
            };
            match &self.flusher {
                // A failed send drops the completer, which aborts the handle.
                Some(flusher) => {
                    let _ = flusher.send(task);
                }
                None => drop(task),
            }
            Ok(handle)
        })
    }

    fn discard_sstables(&self, timestamp: Timestamp) -> Result<(), StorageError> {
        self.check_valid()?;
        let mut data = self.inner.data.lock();
        let mut dropped = 0;
        for segment in &mut data.segments {
            dropped += discard_up_to(segment, timestamp);
        }
        data.segments.retain(|s| !s.is_empty());
        for (_, partitions) in &mut data.flushing {
            let mut copy = (**partitions).clone();
            dropped += discard_up_to(&mut copy, timestamp);
            *partitions = Arc::new(copy);
        }
        dropped += discard_up_to(&mut data.memtable, timestamp);
        drop(data);
        info!(table = %self.inner.id, timestamp, dropped, "discarded data");
        Ok(())
    }

    fn invalidate(&self) {
        if self.inner.invalidated.swap(true, AtomicOrdering::AcqRel) {
            return;
        }
        let mut data = self.inner.data.lock();
        *data = TableData::default();
        info!(table = %self.inner.id, "invalidated table");
    }

    fn write_tracker(&self) -> Arc<WriteTracker> {
        Arc::clone(&self.inner.tracker)
    }

    fn mean_columns(&self) -> u64 {
        let merged = self.inner.data.lock().merged();
        if merged.is_empty() {
            return 0;
        }
        let cells: usize = merged.values().map(BTreeMap::len).sum();
        (cells / merged.len()) as u64
    }

    fn read(&self, partition_key: &[u8]) -> Vec<Cell> {
        let cells = {
            let data = self.inner.data.lock();
            let mut names: Vec<&Vec<u8>> = data
                .sources()
                .filter_map(|s| s.get(partition_key))
                .flat_map(|p| p.keys())
                .collect();
            names.sort();
            names.dedup();
            names
                .into_iter()
                .filter_map(|name| data.lookup(partition_key, name))
                .collect()
        };
        self.sorted(cells)
    }

    fn scan(&self) -> Vec<(Vec<u8>, Cell)> {
        let merged = self.inner.data.lock().merged();
        let mut out = Vec::new();
        for (key, partition) in merged {
            for cell in self.sorted(partition.into_values().collect()) {
                out.push((key.clone(), cell));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::fixed_clock;
    use crate::schema::{CellName, TableDefinitionBuilder};
    use crate::storage::PassThrough;
    use crate::types::{DataType, NativeType};

    fn schema() -> Arc<ResolvedTableSchema> {
        let schema = TableDefinitionBuilder::new("ks", "t")
            .column("k", DataType::TEXT)
            .column("c", DataType::Native(NativeType::Int))
            .column("v", DataType::TEXT)
            .partition_key(&["k"])
            .clustering_column("c")
            .finalize()
            .unwrap();
        Arc::new(schema)
    }

    fn store() -> InMemoryTableStore {
        InMemoryTableStore::new(schema(), WriteOrder::new(), fixed_clock(1_000))
    }

    fn name(c: i32) -> Vec<u8> {
        schema()
            .comparator()
            .encode(&CellName::regular([c.to_be_bytes().to_vec()], "v"))
            .unwrap()
    }

    fn write(store: &InMemoryTableStore, key: &[u8], cell: Cell) {
        let token = store.write_order().start();
        store
            .apply(key, Mutation::single(cell), &PassThrough, &token)
            .unwrap();
    }

    #[test]
    fn test_last_write_wins() {
        let store = store();
        write(&store, b"k1", Cell::live(name(1), "new", 2));
        write(&store, b"k1", Cell::live(name(1), "old", 1));
        assert_eq!(store.get(b"k1", &name(1)).unwrap().value, b"new".to_vec());
    }

    #[test]
    fn test_read_orders_by_comparator() {
        let store = store();
        write(&store, b"k1", Cell::live(name(10), "a", 1));
        write(&store, b"k1", Cell::live(name(-5), "b", 1));
        let cells = store.read(b"k1");
        assert_eq!(cells[0].value, b"b".to_vec());
        assert_eq!(cells[1].value, b"a".to_vec());
    }

    #[test]
    fn test_flush_moves_memtable_to_segment() {
        let store = store();
        write(&store, b"k1", Cell::live(name(1), "a", 1));
        let handle = store.force_flush().unwrap();
        handle.wait().unwrap();
        assert_eq!(store.segment_count(), 1);
        assert_eq!(store.memtable_cells(), 0);
        assert_eq!(store.live_cells(b"k1").len(), 1);
    }

    #[test]
    fn test_flush_waits_for_in_flight_writes() {
        let store = store();
        write(&store, b"k1", Cell::live(name(1), "a", 1));
        let token = store.write_order().start();
        let handle = store.force_flush().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(!handle.is_done());
        drop(token);
        handle.wait().unwrap();
        assert_eq!(store.segment_count(), 1);
    }

    #[test]
    fn test_empty_flush_completes_immediately() {
        let store = store();
        assert!(store.force_flush().unwrap().is_done());
        assert_eq!(store.segment_count(), 0);
    }

    #[test]
    fn test_discard_drops_old_data_everywhere() {
        let store = store();
        write(&store, b"k1", Cell::live(name(1), "a", 5));
        store.force_flush().unwrap().wait().unwrap();
        write(&store, b"k1", Cell::live(name(2), "b", 6));
        write(&store, b"k1", Cell::live(name(3), "c", 20));
        store.discard_sstables(10).unwrap();
        let cells = store.read(b"k1");
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].value, b"c".to_vec());
        assert_eq!(store.segment_count(), 0);
    }

    #[test]
    fn test_invalidate_rejects_writes() {
        let store = store();
        write(&store, b"k1", Cell::live(name(1), "a", 1));
        store.invalidate();
        store.invalidate();
        let token = store.write_order().start();
        let err = store
            .apply(b"k1", Mutation::single(Cell::live(name(1), "a", 2)), &PassThrough, &token)
            .unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::Invalidated(_))));
        assert!(store.read(b"k1").is_empty());
        assert!(store.force_flush().is_err());
    }

    /// Accepts the first insert and fails every later one.
    struct FailSecondInsert {
        seen: std::sync::atomic::AtomicUsize,
    }

    impl UpdateHook for FailSecondInsert {
        fn on_insert(&self, _: &[u8], _: &Cell, _: &WriteOrderToken) -> Result<(), Error> {
            if self.seen.fetch_add(1, AtomicOrdering::AcqRel) == 0 {
                return Ok(());
            }
            Err(StorageError::Io(std::io::Error::other("index apply failed")).into())
        }

        fn on_update(&self, _: &[u8], _: &Cell, _: &Cell, _: &WriteOrderToken) -> Result<(), Error> {
            Ok(())
        }

        fn on_delete(&self, _: &[u8], _: &Cell, _: &WriteOrderToken) -> Result<(), Error> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_hook_leaves_partition_untouched() {
        let store = store();
        let hook = FailSecondInsert {
            seen: std::sync::atomic::AtomicUsize::new(0),
        };
        let token = store.write_order().start();
        let mutation = Mutation::new()
            .add(Cell::live(name(1), "a", 1))
            .add(Cell::live(name(2), "b", 1));
        let err = store.apply(b"k1", mutation, &hook, &token).unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::Io(_))));
        assert!(store.read(b"k1").is_empty());
        assert_eq!(store.memtable_cells(), 0);
    }

    #[test]
    fn test_repeated_name_in_mutation_reconciles() {
        let store = store();
        let token = store.write_order().start();
        let mutation = Mutation::new()
            .add(Cell::live(name(1), "new", 2))
            .add(Cell::live(name(1), "old", 1));
        store.apply(b"k1", mutation, &PassThrough, &token).unwrap();
        assert_eq!(store.get(b"k1", &name(1)).unwrap().value, b"new".to_vec());
        assert_eq!(store.memtable_cells(), 1);
    }

    #[test]
    fn test_mean_columns() {
        let store = store();
        assert_eq!(store.mean_columns(), 0);
        write(&store, b"k1", Cell::live(name(1), "a", 1));
        write(&store, b"k1", Cell::live(name(2), "a", 1));
        write(&store, b"k1", Cell::live(name(3), "a", 1));
        write(&store, b"k2", Cell::live(name(1), "a", 1));
        assert_eq!(store.mean_columns(), 2);
    }

    #[test]
    fn test_malformed_cell_name_rejected() {
        let store = store();
        let token = store.write_order().start();
        let err = store
            .apply(b"k1", Mutation::single(Cell::live(vec![0x00], "a", 1)), &PassThrough, &token)
            .unwrap_err();
        assert!(matches!(err, Error::Encoding(_)));
    }
}
