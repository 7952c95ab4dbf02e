//! Derivation of the hidden table that stores a secondary index.

use serde::{Deserialize, Serialize};

use crate::config::TableProperties;
use crate::error::{Error, IndexError};
use crate::schema::{
    CellNameType, ColumnDefinition, ColumnKind, CompactValue, KeyEncoding, ResolvedTableSchema,
    validate_name,
};
use crate::types::DataType;

/// Name of the index-table clustering column holding the base row key.
pub const BASE_KEY_COLUMN: &str = "partition_key";

/// Role of the indexed column in its base table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexTarget {
    /// `component` is set when the partition key is composite.
    PartitionKey { component: Option<usize> },
    ClusteringKey { position: usize },
    Regular,
    Static,
    CompactValue,
}

impl IndexTarget {
    /// Locate `column` in `base`.
    pub fn resolve(base: &ResolvedTableSchema, column: &str) -> Result<Self, IndexError> {
        let not_indexable = |reason: &str| IndexError::NotIndexable {
            table: base.id(),
            column: column.to_string(),
            reason: reason.to_string(),
        };
        let Some(definition) = base.column(column) else {
            return Err(not_indexable("no such column"));
        };
        if definition.data_type.is_multi_cell() {
            return Err(not_indexable("non-frozen collections have no single value to index"));
        }
        if definition.data_type.is_counter() {
            return Err(not_indexable("counter columns cannot be indexed"));
        }

        Ok(match definition.kind {
            ColumnKind::PartitionKey => IndexTarget::PartitionKey {
                component: definition.component_index,
            },
            ColumnKind::ClusteringKey => IndexTarget::ClusteringKey {
                position: base
                    .clustering_columns()
                    .position(|c| c.name == column)
                    .ok_or_else(|| IndexError::NotFound(format!("{}.{column}", base.id())))?,
            },
            ColumnKind::Regular => IndexTarget::Regular,
            ColumnKind::Static => IndexTarget::Static,
            ColumnKind::CompactValue => IndexTarget::CompactValue,
        })
    }

    /// How many leading clustering components of the base cell name an
    /// index entry retains.
    pub fn retained_clustering(self, base: &CellNameType) -> usize {
        if !base.is_compound() {
            return 0;
        }
        match self {
            IndexTarget::ClusteringKey { position } => position + 1,
            IndexTarget::Static => 0,
            IndexTarget::PartitionKey { .. } | IndexTarget::Regular | IndexTarget::CompactValue => {
                base.clustering_prefix_size()
            }
        }
    }
}

pub struct IndexSchemaBuilder;

impl IndexSchemaBuilder {
    /// Build the schema of the table backing an index on `column`.
    ///
    /// The table is named `<base>.<index_name>`, or `<base>.<column>` when
    /// the index is unnamed, and lives in the base table's keyspace. It is
    /// partitioned by the indexed value; its cells are named by the base row
    /// key, followed by the retained clustering prefix when the base
    /// comparator is compound.
    pub fn build(
        base: &ResolvedTableSchema,
        column: &str,
        index_name: Option<&str>,
    ) -> Result<(ResolvedTableSchema, IndexTarget), Error> {
        if let Some(name) = index_name {
            validate_name(name)?;
        }
        let target = IndexTarget::resolve(base, column)?;
        let indexed_type = base
            .column(column)
            .map(|c| c.data_type.base().clone())
            .ok_or_else(|| IndexError::NotFound(column.to_string()))?;

        let base_key_type = Self::base_key_type(base);
        let base_comparator = base.comparator();
        let retained = target.retained_clustering(base_comparator);

        let mut columns = vec![ColumnDefinition::new(
            column,
            indexed_type.clone(),
            ColumnKind::PartitionKey,
            None,
        )];

        let comparator = if base_comparator.is_compound() {
            let retained_types = &base_comparator.clustering_types()[..retained];
            columns.push(ColumnDefinition::new(
                BASE_KEY_COLUMN,
                base_key_type.clone(),
                ColumnKind::ClusteringKey,
                Some(0),
            ));
            for (i, clustering) in base.clustering_columns().take(retained).enumerate() {
                columns.push(ColumnDefinition::new(
                    &clustering.name,
                    retained_types[i].clone(),
                    ColumnKind::ClusteringKey,
                    Some(i + 1),
                ));
            }
            let mut types = Vec::with_capacity(retained + 1);
            types.push(base_key_type);
            types.extend(retained_types.iter().cloned());
            CellNameType::CompoundDense { types }
        } else {
            columns.push(ColumnDefinition::new(
                BASE_KEY_COLUMN,
                base_key_type.clone(),
                ColumnKind::ClusteringKey,
                None,
            ));
            CellNameType::SimpleDense {
                wrapped: base_key_type,
            }
        };

        let name = format!("{}.{}", base.name(), index_name.unwrap_or(column));
        let schema = ResolvedTableSchema::from_parts(
            base.keyspace().to_string(),
            name,
            KeyEncoding::Single(indexed_type),
            comparator,
            DataType::BYTES,
            true,
            columns,
            Some(CompactValue::Empty),
            TableProperties::default(),
        );
        Ok((schema, target))
    }

    /// Type of the base row key as stored in index entries. Composite keys
    /// are kept as opaque bytes.
    pub fn base_key_type(base: &ResolvedTableSchema) -> DataType {
        match base.key_encoding() {
            KeyEncoding::Single(ty) => ty.base().clone(),
            KeyEncoding::Composite(_) => DataType::BYTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TableDefinitionBuilder;
    use crate::types::{NativeType, SortDirection};

    fn int() -> DataType {
        DataType::Native(NativeType::Int)
    }

    fn base() -> ResolvedTableSchema {
        TableDefinitionBuilder::new("ks", "events")
            .column("k", DataType::TEXT)
            .column("a", int())
            .column("b", DataType::TEXT)
            .column("v", DataType::TEXT)
            .static_column("s", int())
            .column("tags", DataType::set(DataType::TEXT))
            .partition_key(&["k"])
            .clustering_column("a")
            .clustering_column("b")
            .clustering_order("a", SortDirection::Desc)
            .clustering_order("b", SortDirection::Asc)
            .finalize()
            .unwrap()
    }

    #[test]
    fn test_regular_index_keeps_full_clustering() {
        let (schema, target) = IndexSchemaBuilder::build(&base(), "v", None).unwrap();
        assert_eq!(target, IndexTarget::Regular);
        assert_eq!(schema.name(), "events.v");
        assert_eq!(schema.keyspace(), "ks");
        assert_eq!(schema.key_encoding(), &KeyEncoding::Single(DataType::TEXT));
        assert_eq!(
            schema.comparator(),
            &CellNameType::CompoundDense {
                types: vec![DataType::TEXT, int().reversed(), DataType::TEXT]
            }
        );
        assert!(schema.is_dense());
        assert_eq!(schema.compact_value(), Some(&CompactValue::Empty));
        assert_eq!(schema.default_validator(), &DataType::BYTES);
    }

    #[test]
    fn test_clustering_index_keeps_prefix() {
        let (schema, target) = IndexSchemaBuilder::build(&base(), "a", Some("by_a")).unwrap();
        assert_eq!(target, IndexTarget::ClusteringKey { position: 0 });
        assert_eq!(schema.name(), "events.by_a");
        // Indexed by the base type, not the reversed one.
        assert_eq!(schema.key_encoding(), &KeyEncoding::Single(int()));
        assert_eq!(
            schema.comparator(),
            &CellNameType::CompoundDense {
                types: vec![DataType::TEXT, int().reversed()]
            }
        );
    }

    #[test]
    fn test_clustering_target_uses_declared_position() {
        let target = IndexTarget::resolve(&base(), "b").unwrap();
        assert_eq!(target, IndexTarget::ClusteringKey { position: 1 });
        assert_eq!(target.retained_clustering(base().comparator()), 2);
    }

    #[test]
    fn test_static_index_keeps_only_row_key() {
        let (schema, target) = IndexSchemaBuilder::build(&base(), "s", None).unwrap();
        assert_eq!(target, IndexTarget::Static);
        assert_eq!(
            schema.comparator(),
            &CellNameType::CompoundDense {
                types: vec![DataType::TEXT]
            }
        );
    }

    #[test]
    fn test_partition_key_index() {
        let (schema, target) = IndexSchemaBuilder::build(&base(), "k", None).unwrap();
        assert_eq!(target, IndexTarget::PartitionKey { component: None });
        assert_eq!(schema.comparator().clustering_prefix_size(), 3);
    }

    #[test]
    fn test_non_compound_base_uses_keys_layout() {
        let base = TableDefinitionBuilder::new("ks", "legacy")
            .column("k", int())
            .column("v", DataType::TEXT)
            .partition_key(&["k"])
            .compact_storage()
            .finalize()
            .unwrap();
        let (schema, _) = IndexSchemaBuilder::build(&base, "v", None).unwrap();
        assert_eq!(schema.comparator(), &CellNameType::SimpleDense { wrapped: int() });
    }

    #[test]
    fn test_composite_key_stored_as_bytes() {
        let base = TableDefinitionBuilder::new("ks", "t")
            .column("k1", DataType::TEXT)
            .column("k2", int())
            .column("v", DataType::TEXT)
            .partition_key(&["k1", "k2"])
            .finalize()
            .unwrap();
        let (schema, target) = IndexSchemaBuilder::build(&base, "k2", None).unwrap();
        assert_eq!(target, IndexTarget::PartitionKey { component: Some(1) });
        assert_eq!(IndexSchemaBuilder::base_key_type(&base), DataType::BYTES);
        assert_eq!(schema.comparator().clustering_types()[0], DataType::BYTES);
    }

    #[test]
    fn test_rejects_multi_cell_and_unknown_columns() {
        let err = IndexSchemaBuilder::build(&base(), "tags", None).unwrap_err();
        assert!(matches!(err, Error::Index(IndexError::NotIndexable { .. })));
        let err = IndexSchemaBuilder::build(&base(), "missing", None).unwrap_err();
        assert!(matches!(err, Error::Index(IndexError::NotIndexable { .. })));
    }

    #[test]
    fn test_rejects_invalid_index_name() {
        let err = IndexSchemaBuilder::build(&base(), "v", Some("bad-name")).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_frozen_collection_is_indexable() {
        let base = TableDefinitionBuilder::new("ks", "t")
            .column("k", DataType::TEXT)
            .column("f", DataType::list(DataType::TEXT).frozen())
            .partition_key(&["k"])
            .finalize()
            .unwrap();
        assert!(IndexSchemaBuilder::build(&base, "f", None).is_ok());
    }
}
