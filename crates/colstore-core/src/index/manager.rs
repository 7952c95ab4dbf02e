//! The secondary indexes of one base table.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::config::MaintainerOptions;
use crate::error::{Error, IndexError};
use crate::schema::ResolvedTableSchema;
use crate::storage::{Cell, TableStore, UpdateHook, WriteOrderToken};
use crate::types::Timestamp;

use super::descriptor::IndexDescriptor;
use super::maintainer::SecondaryIndexMaintainer;

/// Owns the maintainers of a base table's indexes, keyed by indexed column.
///
/// Passed as the update hook of base-table writes, it routes every changed
/// cell to the indexes covering it.
pub struct SecondaryIndexManager {
    base: Arc<dyn TableStore>,
    options: MaintainerOptions,
    indexes: RwLock<BTreeMap<String, Arc<SecondaryIndexMaintainer>>>,
}

impl SecondaryIndexManager {
    pub fn new(base: Arc<dyn TableStore>, options: MaintainerOptions) -> Self {
        Self {
            base,
            options,
            indexes: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn base(&self) -> &Arc<dyn TableStore> {
        &self.base
    }

    /// Register an index stored in `index`. The maintainer starts in the
    /// building state; call [`SecondaryIndexMaintainer::build`] to backfill.
    pub fn add_index(
        &self,
        descriptor: IndexDescriptor,
        index: Arc<dyn TableStore>,
    ) -> Result<Arc<SecondaryIndexMaintainer>, Error> {
        let mut indexes = self.indexes.write();
        if indexes.contains_key(descriptor.column()) {
            return Err(IndexError::AlreadyExists(descriptor.id()).into());
        }
        let column = descriptor.column().to_string();
        let id = descriptor.id();
        let maintainer = Arc::new(SecondaryIndexMaintainer::new(
            descriptor,
            Arc::clone(&self.base),
            index,
            self.options.clone(),
        ));
        indexes.insert(column.clone(), Arc::clone(&maintainer));
        info!(table = %self.base.id(), column = %column, index = %id, "added index");
        Ok(maintainer)
    }

    /// Unregister the index on `column` and retire its table.
    pub fn drop_index(&self, column: &str) -> Result<(), Error> {
        let removed = self.indexes.write().remove(column);
        let Some(maintainer) = removed else {
            return Err(IndexError::NotFound(column.to_string()).into());
        };
        maintainer.invalidate();
        Ok(())
    }

    pub fn get(&self, column: &str) -> Option<Arc<SecondaryIndexMaintainer>> {
        self.indexes.read().get(column).cloned()
    }

    /// Descriptors of every index, by column.
    pub fn list(&self) -> Vec<Arc<IndexDescriptor>> {
        self.indexes.read().values().map(|m| m.descriptor()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.read().is_empty()
    }

    fn maintainers(&self) -> Vec<Arc<SecondaryIndexMaintainer>> {
        self.indexes.read().values().cloned().collect()
    }

    /// Flush every index table, waiting for each.
    pub fn flush_all(&self) -> Result<(), Error> {
        for maintainer in self.maintainers() {
            maintainer.force_blocking_flush()?;
        }
        Ok(())
    }

    pub fn truncate_all(&self, timestamp: Timestamp) -> Result<(), Error> {
        for maintainer in self.maintainers() {
            maintainer.truncate_blocking(timestamp)?;
        }
        Ok(())
    }

    /// Retire every index, as when the base table is dropped.
    pub fn invalidate_all(&self) {
        let drained = std::mem::take(&mut *self.indexes.write());
        for maintainer in drained.into_values() {
            maintainer.invalidate();
        }
    }

    /// Propagate a new base schema to every index. Returns the columns
    /// whose index schema changed.
    pub fn reload_all(&self, base: Arc<ResolvedTableSchema>) -> Result<Vec<String>, Error> {
        let mut changed = Vec::new();
        for maintainer in self.maintainers() {
            if maintainer.reload(Arc::clone(&base))? {
                changed.push(maintainer.descriptor().column().to_string());
            }
        }
        Ok(changed)
    }

    /// Estimated rows matching one value of the index on `column`.
    pub fn estimate(&self, column: &str) -> Option<u64> {
        self.get(column).map(|m| m.estimate_result_rows())
    }
}

impl UpdateHook for SecondaryIndexManager {
    fn on_insert(&self, key: &[u8], cell: &Cell, token: &WriteOrderToken) -> Result<(), Error> {
        for maintainer in self.maintainers() {
            if maintainer.indexes(cell) {
                maintainer.insert(key, cell, token)?;
            }
        }
        Ok(())
    }

    fn on_update(
        &self,
        key: &[u8],
        old: &Cell,
        new: &Cell,
        token: &WriteOrderToken,
    ) -> Result<(), Error> {
        for maintainer in self.maintainers() {
            if maintainer.indexes(new) {
                maintainer.update(key, old, new, token)?;
            }
        }
        Ok(())
    }

    fn on_delete(&self, key: &[u8], old: &Cell, token: &WriteOrderToken) -> Result<(), Error> {
        for maintainer in self.maintainers() {
            if maintainer.indexes(old) {
                maintainer.delete(key, old, token)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::fixed_clock;
    use crate::schema::{CellName, TableDefinitionBuilder};
    use crate::storage::{InMemoryTableStore, Mutation, WriteOrder};
    use crate::types::{DataType, NativeType};

    const NOW: i64 = 1_000;

    fn schema() -> Arc<ResolvedTableSchema> {
        let schema = TableDefinitionBuilder::new("ks", "users")
            .column("id", DataType::TEXT)
            .column("c", DataType::Native(NativeType::Int))
            .column("email", DataType::TEXT)
            .column("city", DataType::TEXT)
            .partition_key(&["id"])
            .clustering_column("c")
            .finalize()
            .unwrap();
        Arc::new(schema)
    }

    fn setup() -> (WriteOrder, Arc<InMemoryTableStore>, SecondaryIndexManager) {
        let order = WriteOrder::new();
        let base = Arc::new(InMemoryTableStore::new(schema(), order.clone(), fixed_clock(NOW)));
        let manager = SecondaryIndexManager::new(
            base.clone(),
            MaintainerOptions::default().with_clock(fixed_clock(NOW)),
        );
        (order, base, manager)
    }

    fn add(manager: &SecondaryIndexManager, order: &WriteOrder, column: &str) -> Arc<InMemoryTableStore> {
        let descriptor = IndexDescriptor::new(schema(), column, None).unwrap();
        let index = Arc::new(InMemoryTableStore::new(
            Arc::new(descriptor.index_schema().clone()),
            order.clone(),
            fixed_clock(NOW),
        ));
        manager.add_index(descriptor, index.clone()).unwrap();
        index
    }

    fn cell(column: &str, value: &str, ts: i64) -> Cell {
        let name = schema()
            .comparator()
            .encode(&CellName::regular([1i32.to_be_bytes().to_vec()], column))
            .unwrap();
        Cell::live(name, value, ts)
    }

    #[test]
    fn test_routes_cells_to_covering_indexes() {
        let (order, base, manager) = setup();
        let by_email = add(&manager, &order, "email");
        let by_city = add(&manager, &order, "city");

        let token = order.start();
        base.apply(b"u1", Mutation::single(cell("email", "a@x", 1)), &manager, &token)
            .unwrap();
        assert_eq!(by_email.live_cells(b"a@x").len(), 1);
        assert_eq!(by_city.memtable_cells(), 0);

        base.apply(b"u1", Mutation::single(cell("city", "oslo", 1)), &manager, &token)
            .unwrap();
        assert_eq!(by_city.live_cells(b"oslo").len(), 1);
    }

    #[test]
    fn test_update_and_delete_through_base_writes() {
        let (order, base, manager) = setup();
        let by_email = add(&manager, &order, "email");
        let token = order.start();
        base.apply(b"u1", Mutation::single(cell("email", "a@x", 1)), &manager, &token)
            .unwrap();
        base.apply(b"u1", Mutation::single(cell("email", "b@x", 2)), &manager, &token)
            .unwrap();
        assert!(by_email.live_cells(b"a@x").is_empty());
        assert_eq!(by_email.live_cells(b"b@x").len(), 1);

        let tombstone = Cell::tombstone(cell("email", "", 3).name, 3, NOW);
        base.apply(b"u1", Mutation::single(tombstone), &manager, &token)
            .unwrap();
        assert!(by_email.live_cells(b"b@x").is_empty());
    }

    #[test]
    fn test_duplicate_and_missing_index() {
        let (order, _base, manager) = setup();
        add(&manager, &order, "email");
        let descriptor = IndexDescriptor::new(schema(), "email", Some("again")).unwrap();
        let index = Arc::new(InMemoryTableStore::new(
            Arc::new(descriptor.index_schema().clone()),
            order.clone(),
            fixed_clock(NOW),
        ));
        assert!(matches!(
            manager.add_index(descriptor, index),
            Err(Error::Index(IndexError::AlreadyExists(_)))
        ));
        assert!(matches!(
            manager.drop_index("city"),
            Err(Error::Index(IndexError::NotFound(_)))
        ));
    }

    #[test]
    fn test_drop_index_invalidates_table() {
        let (order, _base, manager) = setup();
        let by_email = add(&manager, &order, "email");
        manager.drop_index("email").unwrap();
        assert!(by_email.is_invalidated());
        assert!(manager.get("email").is_none());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_fan_out() {
        let (order, base, manager) = setup();
        let by_email = add(&manager, &order, "email");
        let by_city = add(&manager, &order, "city");
        {
            let token = order.start();
            base.apply(
                b"u1",
                Mutation::new()
                    .add(cell("email", "a@x", 1))
                    .add(cell("city", "oslo", 1)),
                &manager,
                &token,
            )
            .unwrap();
        }
        manager.flush_all().unwrap();
        assert_eq!(by_email.segment_count(), 1);
        assert_eq!(by_city.segment_count(), 1);
        assert_eq!(manager.estimate("email"), Some(1));
        assert_eq!(manager.list().len(), 2);

        manager.truncate_all(1).unwrap();
        assert!(by_email.read(b"a@x").is_empty());

        assert!(manager.reload_all(base.schema()).unwrap().is_empty());

        manager.invalidate_all();
        assert!(by_email.is_invalidated());
        assert!(by_city.is_invalidated());
        assert!(manager.is_empty());
    }
}
