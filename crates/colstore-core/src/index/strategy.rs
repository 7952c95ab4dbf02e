//! Mapping a base cell to its index entry.

use std::sync::Arc;

use crate::encoding::encode_composite;
use crate::error::{Error, IndexError};
use crate::schema::{CellName, CellNameType, KeyEncoding};
use crate::storage::Cell;

use super::IndexEntry;
use super::builder::IndexTarget;
use super::descriptor::IndexDescriptor;

/// Decides which base cells an index covers and where they are recorded.
pub trait IndexEntryStrategy: Send + Sync {
    /// Whether `cell` carries a value of the indexed column.
    fn indexes(&self, cell: &Cell) -> bool;

    /// The index entry for `cell`, written in base partition `row_key`.
    fn entry(&self, row_key: &[u8], cell: &Cell) -> Result<IndexEntry, Error>;

    /// A strategy for a new version of the index, after a schema change.
    fn rebind(&self, descriptor: &IndexDescriptor) -> Result<Arc<dyn IndexEntryStrategy>, Error>;
}

/// The strategy for an index on a single column, for every column role.
#[derive(Debug, Clone)]
pub struct ColumnIndexStrategy {
    column: String,
    target: IndexTarget,
    key_encoding: KeyEncoding,
    comparator: CellNameType,
    retained: usize,
}

impl ColumnIndexStrategy {
    pub fn new(descriptor: &IndexDescriptor) -> Self {
        let base = descriptor.base();
        let target = descriptor.target();
        Self {
            column: descriptor.column().to_string(),
            target,
            key_encoding: base.key_encoding().clone(),
            comparator: base.comparator().clone(),
            retained: target.retained_clustering(base.comparator()),
        }
    }

    fn missing(&self) -> Error {
        IndexError::MissingComponent(self.column.clone()).into()
    }

    fn indexed_value(&self, row_key: &[u8], name: &CellName, cell: &Cell) -> Result<Vec<u8>, Error> {
        match self.target {
            IndexTarget::PartitionKey { component: None } => Ok(row_key.to_vec()),
            IndexTarget::PartitionKey {
                component: Some(i),
            } => {
                let mut components = self.key_encoding.decode(row_key)?;
                if i >= components.len() {
                    return Err(self.missing());
                }
                Ok(components.swap_remove(i))
            }
            IndexTarget::ClusteringKey { position } => name
                .clustering
                .get(position)
                .cloned()
                .ok_or_else(|| self.missing()),
            IndexTarget::Regular | IndexTarget::Static | IndexTarget::CompactValue => {
                Ok(cell.value.clone())
            }
        }
    }

    fn entry_name(&self, row_key: &[u8], name: &CellName) -> Result<Vec<u8>, Error> {
        if !self.comparator.is_compound() {
            return Ok(row_key.to_vec());
        }
        if name.clustering.len() < self.retained {
            return Err(self.missing());
        }
        let mut components: Vec<&[u8]> = Vec::with_capacity(self.retained + 1);
        components.push(row_key);
        components.extend(name.clustering[..self.retained].iter().map(Vec::as_slice));
        Ok(encode_composite(&components, false)?)
    }
}

impl IndexEntryStrategy for ColumnIndexStrategy {
    fn indexes(&self, cell: &Cell) -> bool {
        let Ok(name) = self.comparator.decode(&cell.name) else {
            return false;
        };
        match self.target {
            IndexTarget::Regular | IndexTarget::Static => {
                name.column.as_deref() == Some(self.column.as_str())
                    && name.is_static == (self.target == IndexTarget::Static)
                    && name.collection_element.is_none()
            }
            IndexTarget::CompactValue => self.comparator.is_dense(),
            IndexTarget::PartitionKey { .. } | IndexTarget::ClusteringKey { .. } => !name.is_static,
        }
    }

    fn entry(&self, row_key: &[u8], cell: &Cell) -> Result<IndexEntry, Error> {
        let name = self.comparator.decode(&cell.name)?;
        Ok(IndexEntry {
            partition_key: self.indexed_value(row_key, &name, cell)?,
            cell_name: self.entry_name(row_key, &name)?,
        })
    }

    fn rebind(&self, descriptor: &IndexDescriptor) -> Result<Arc<dyn IndexEntryStrategy>, Error> {
        Ok(Arc::new(Self::new(descriptor)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::decode_composite;
    use crate::schema::{ResolvedTableSchema, TableDefinitionBuilder};
    use crate::types::{DataType, NativeType};

    fn int(v: i32) -> Vec<u8> {
        v.to_be_bytes().to_vec()
    }

    fn base() -> Arc<ResolvedTableSchema> {
        let schema = TableDefinitionBuilder::new("ks", "t")
            .column("k", DataType::TEXT)
            .column("a", DataType::Native(NativeType::Int))
            .column("b", DataType::Native(NativeType::Int))
            .column("v", DataType::TEXT)
            .column("w", DataType::TEXT)
            .static_column("s", DataType::TEXT)
            .partition_key(&["k"])
            .clustering_column("a")
            .clustering_column("b")
            .finalize()
            .unwrap();
        Arc::new(schema)
    }

    fn strategy(column: &str) -> ColumnIndexStrategy {
        ColumnIndexStrategy::new(&IndexDescriptor::new(base(), column, None).unwrap())
    }

    fn cell(name: CellName, value: &str) -> Cell {
        Cell::live(base().comparator().encode(&name).unwrap(), value, 1)
    }

    #[test]
    fn test_regular_entry() {
        let strategy = strategy("v");
        let c = cell(CellName::regular([int(1), int(2)], "v"), "x");
        assert!(strategy.indexes(&c));
        assert!(!strategy.indexes(&cell(CellName::regular([int(1), int(2)], "w"), "x")));
        assert!(!strategy.indexes(&cell(CellName::static_cell("s"), "x")));

        let entry = strategy.entry(b"pk", &c).unwrap();
        assert_eq!(entry.partition_key, b"x".to_vec());
        let name = decode_composite(&entry.cell_name).unwrap();
        assert_eq!(name.components, vec![b"pk".to_vec(), int(1), int(2)]);
    }

    #[test]
    fn test_clustering_entry_keeps_prefix() {
        let strategy = strategy("a");
        let c = cell(CellName::regular([int(7), int(2)], "v"), "x");
        assert!(strategy.indexes(&c));
        assert!(!strategy.indexes(&cell(CellName::static_cell("s"), "x")));

        let entry = strategy.entry(b"pk", &c).unwrap();
        assert_eq!(entry.partition_key, int(7));
        let name = decode_composite(&entry.cell_name).unwrap();
        assert_eq!(name.components, vec![b"pk".to_vec(), int(7)]);
    }

    #[test]
    fn test_static_entry() {
        let strategy = strategy("s");
        let c = cell(CellName::static_cell("s"), "x");
        assert!(strategy.indexes(&c));
        assert!(!strategy.indexes(&cell(CellName::regular([int(1), int(2)], "v"), "x")));

        let entry = strategy.entry(b"pk", &c).unwrap();
        let name = decode_composite(&entry.cell_name).unwrap();
        assert_eq!(name.components, vec![b"pk".to_vec()]);
    }

    #[test]
    fn test_partition_key_entry() {
        let strategy = strategy("k");
        let entry = strategy
            .entry(b"pk", &cell(CellName::regular([int(1), int(2)], "v"), "x"))
            .unwrap();
        assert_eq!(entry.partition_key, b"pk".to_vec());
    }

    #[test]
    fn test_composite_partition_key_component() {
        let schema = TableDefinitionBuilder::new("ks", "t")
            .column("k1", DataType::TEXT)
            .column("k2", DataType::TEXT)
            .column("v", DataType::TEXT)
            .partition_key(&["k1", "k2"])
            .finalize()
            .unwrap();
        let schema = Arc::new(schema);
        let strategy =
            ColumnIndexStrategy::new(&IndexDescriptor::new(Arc::clone(&schema), "k2", None).unwrap());
        let key = schema.key_encoding().encode(&["a", "b"]).unwrap();
        let name = schema
            .comparator()
            .encode(&CellName::regular(Vec::<Vec<u8>>::new(), "v"))
            .unwrap();
        let entry = strategy.entry(&key, &Cell::live(name, "x", 1)).unwrap();
        assert_eq!(entry.partition_key, b"b".to_vec());
    }

    #[test]
    fn test_keys_layout_for_non_compound_base() {
        let schema = TableDefinitionBuilder::new("ks", "legacy")
            .column("k", DataType::TEXT)
            .column("v", DataType::TEXT)
            .partition_key(&["k"])
            .compact_storage()
            .finalize()
            .unwrap();
        let strategy =
            ColumnIndexStrategy::new(&IndexDescriptor::new(Arc::new(schema), "v", None).unwrap());
        let entry = strategy.entry(b"row", &Cell::live("v", "x", 1)).unwrap();
        assert_eq!(entry.cell_name, b"row".to_vec());
        assert!(strategy.indexes(&Cell::live("v", "x", 1)));
        assert!(!strategy.indexes(&Cell::live("other", "x", 1)));
    }

    #[test]
    fn test_compact_value_entry_on_dense_base() {
        let schema = TableDefinitionBuilder::new("ks", "dense")
            .column("k", DataType::TEXT)
            .column("c", DataType::Native(NativeType::Int))
            .column("v", DataType::TEXT)
            .partition_key(&["k"])
            .clustering_column("c")
            .compact_storage()
            .finalize()
            .unwrap();
        let strategy =
            ColumnIndexStrategy::new(&IndexDescriptor::new(Arc::new(schema), "v", None).unwrap());
        let c = Cell::live(int(3), "x", 1);
        assert!(strategy.indexes(&c));
        let entry = strategy.entry(b"row", &c).unwrap();
        assert_eq!(entry.partition_key, b"x".to_vec());
        // Single clustering column: simple dense comparator, keys layout.
        assert_eq!(entry.cell_name, b"row".to_vec());
    }

    #[test]
    fn test_malformed_name_is_not_indexed() {
        assert!(!strategy("v").indexes(&Cell::live(vec![0xff], "x", 1)));
        assert!(strategy("v").entry(b"pk", &Cell::live(vec![0xff], "x", 1)).is_err());
    }
}
