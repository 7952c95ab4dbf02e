//! The immutable, fully resolved physical schema of a table.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::Xxh64;

use crate::config::TableProperties;
use crate::error::SchemaError;
use crate::types::DataType;

use super::comparator::CellNameType;
use super::compiler::check_counter_mix;
use super::default_value::CompactValue;
use super::definition::LogicalColumn;
use super::key_encoding::KeyEncoding;
use super::roles::{ColumnDefinition, ColumnKind};
use super::validate_column_name;

/// A compiled table schema.
///
/// Never mutated once built: the `with_*` methods return a new schema and
/// leave the receiver untouched. Serializes field-for-field, including every
/// derived field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedTableSchema {
    keyspace: String,
    name: String,
    key_encoding: KeyEncoding,
    comparator: CellNameType,
    default_validator: DataType,
    is_dense: bool,
    is_compact: bool,
    /// Partition key, then clustering, then the remaining columns in
    /// declaration order.
    columns: Vec<ColumnDefinition>,
    compact_value: Option<CompactValue>,
    properties: TableProperties,
}

impl ResolvedTableSchema {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        keyspace: String,
        name: String,
        key_encoding: KeyEncoding,
        comparator: CellNameType,
        default_validator: DataType,
        is_compact: bool,
        columns: Vec<ColumnDefinition>,
        compact_value: Option<CompactValue>,
        properties: TableProperties,
    ) -> Self {
        let is_dense = comparator.is_dense();
        Self {
            keyspace,
            name,
            key_encoding,
            comparator,
            default_validator,
            is_dense,
            is_compact,
            columns,
            compact_value,
            properties,
        }
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `keyspace.table`
    pub fn id(&self) -> String {
        format!("{}.{}", self.keyspace, self.name)
    }

    pub fn key_encoding(&self) -> &KeyEncoding {
        &self.key_encoding
    }

    pub fn comparator(&self) -> &CellNameType {
        &self.comparator
    }

    pub fn default_validator(&self) -> &DataType {
        &self.default_validator
    }

    pub fn is_dense(&self) -> bool {
        self.is_dense
    }

    pub fn is_compact(&self) -> bool {
        self.is_compact
    }

    pub fn compact_value(&self) -> Option<&CompactValue> {
        self.compact_value.as_ref()
    }

    pub fn properties(&self) -> &TableProperties {
        &self.properties
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn role(&self, name: &str) -> Option<ColumnKind> {
        self.column(name).map(|c| c.kind)
    }

    pub fn partition_key_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns_of(ColumnKind::PartitionKey)
    }

    pub fn clustering_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns_of(ColumnKind::ClusteringKey)
    }

    /// Regular and static columns, in declaration order.
    pub fn value_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns
            .iter()
            .filter(|c| matches!(c.kind, ColumnKind::Regular | ColumnKind::Static))
    }

    pub fn compact_value_column(&self) -> Option<&ColumnDefinition> {
        self.columns_of(ColumnKind::CompactValue).next()
    }

    pub fn has_static_columns(&self) -> bool {
        self.columns.iter().any(ColumnDefinition::is_static)
    }

    pub fn is_counter(&self) -> bool {
        self.default_validator.is_counter()
            || self
                .columns
                .iter()
                .any(|c| !c.is_primary_key() && c.data_type.is_counter())
    }

    fn columns_of(&self, kind: ColumnKind) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(move |c| c.kind == kind)
    }

    /// Digest of every field, used to tell whether a reload changed anything.
    pub fn schema_version(&self) -> u64 {
        let mut hasher = DigestHasher(Xxh64::new(0));
        self.hash(&mut hasher);
        hasher.finish()
    }

    // -----------------------------------------------------------------------
    // Evolution
    // -----------------------------------------------------------------------

    /// Return a copy with a new regular or static column.
    pub fn with_column_added(&self, column: LogicalColumn) -> Result<Self, SchemaError> {
        validate_column_name(&column.name)?;
        if self.column(&column.name).is_some() {
            return Err(SchemaError::DuplicateColumn(column.name));
        }
        if self.is_dense {
            return Err(self.refuse("cannot add new column to a COMPACT STORAGE table"));
        }
        if column.is_static {
            if self.is_compact {
                return Err(SchemaError::StaticWithCompactStorage);
            }
            if self.comparator.clustering_prefix_size() == 0 {
                return Err(SchemaError::StaticWithoutClustering);
            }
        }

        let mut next = self.clone();
        if column.is_multi_cell() {
            if self.is_compact {
                return Err(SchemaError::CollectionWithCompactStorage);
            }
            next.comparator = self
                .comparator
                .with_collection(&column.name, column.data_type.clone())
                .ok_or_else(|| {
                    self.refuse("collection columns need a compound sparse layout")
                })?;
        }

        let counter = column.data_type.is_counter();
        if counter && self.properties.default_time_to_live > 0 {
            return Err(SchemaError::CounterWithDefaultTtl);
        }
        let existing: Vec<LogicalColumn> = self
            .value_columns()
            .map(|c| LogicalColumn::new(c.name.as_str(), c.data_type.clone()))
            .chain(std::iter::once(column.clone()))
            .collect();
        check_counter_mix(existing.iter())?;

        let kind = if column.is_static {
            ColumnKind::Static
        } else {
            ColumnKind::Regular
        };
        let slot = self
            .comparator
            .is_compound()
            .then(|| self.comparator.clustering_prefix_size());
        next.columns
            .push(ColumnDefinition::new(&column.name, column.data_type, kind, slot));
        if !self.is_compact && counter {
            next.default_validator = DataType::COUNTER;
        }
        Ok(next)
    }

    /// Return a copy without the given regular or static column.
    ///
    /// A dropped collection stays registered with the comparator so that
    /// cells already written under it can still be decoded.
    pub fn with_column_dropped(&self, name: &str) -> Result<Self, SchemaError> {
        let column = self
            .column(name)
            .ok_or_else(|| SchemaError::ColumnNotFound(name.to_string()))?;
        if column.is_primary_key() {
            return Err(self.refuse(&format!("cannot drop PRIMARY KEY part {name}")));
        }
        if self.is_compact {
            return Err(self.refuse("cannot drop columns from a COMPACT STORAGE table"));
        }
        let mut next = self.clone();
        next.columns.retain(|c| c.name != name);
        Ok(next)
    }

    /// Return a copy where `name` has a new, compatible type.
    pub fn with_column_type(&self, name: &str, data_type: DataType) -> Result<Self, SchemaError> {
        let column = self
            .column(name)
            .ok_or_else(|| SchemaError::ColumnNotFound(name.to_string()))?;
        let previous = column.data_type.base().clone();
        if previous.is_multi_cell() || data_type.is_multi_cell() {
            return Err(self.refuse(&format!("cannot change the type of collection column {name}")));
        }
        if previous.is_counter() != data_type.is_counter() {
            return Err(self.refuse(&format!(
                "cannot change column {name} between counter and non-counter types"
            )));
        }
        let compatible = match column.kind {
            ColumnKind::ClusteringKey => data_type.is_order_compatible_with(&previous),
            _ => data_type.is_value_compatible_with(&previous),
        };
        if !compatible {
            return Err(self.refuse(&format!(
                "type {data_type} is not compatible with the previous type {previous} of column {name}"
            )));
        }

        let mut next = self.clone();
        let kind = column.kind;
        match kind {
            ColumnKind::PartitionKey => {
                let types = self
                    .partition_key_columns()
                    .map(|c| {
                        if c.name == name {
                            data_type.clone()
                        } else {
                            c.data_type.clone()
                        }
                    })
                    .collect();
                next.key_encoding = KeyEncoding::resolve(types);
                next.set_column_type(name, data_type);
            }
            ColumnKind::ClusteringKey => {
                let stored = if column.data_type.is_reversed() {
                    data_type.reversed()
                } else {
                    data_type
                };
                if let Some(position) = self.clustering_columns().position(|c| c.name == name) {
                    next.comparator = self.comparator.with_clustering_type(position, stored.clone());
                }
                next.set_column_type(name, stored);
            }
            ColumnKind::CompactValue => {
                next.default_validator = data_type.clone();
                next.set_column_type(name, data_type);
            }
            ColumnKind::Regular | ColumnKind::Static => {
                // A static compact table with a single column uses that
                // column's type as its default.
                let sole_value = self.is_compact && self.value_columns().count() == 1;
                if sole_value {
                    next.default_validator = data_type.clone();
                }
                next.set_column_type(name, data_type);
            }
        }
        Ok(next)
    }

    /// Return a copy with new table properties.
    pub fn with_properties(&self, properties: TableProperties) -> Result<Self, SchemaError> {
        properties.validate()?;
        if self.is_counter() && properties.default_time_to_live > 0 {
            return Err(SchemaError::CounterWithDefaultTtl);
        }
        let mut next = self.clone();
        next.properties = properties;
        Ok(next)
    }

    fn set_column_type(&mut self, name: &str, data_type: DataType) {
        if let Some(column) = self.columns.iter_mut().find(|c| c.name == name) {
            column.data_type = data_type;
        }
    }

    fn refuse(&self, reason: &str) -> SchemaError {
        SchemaError::InvalidAlteration {
            table: self.id(),
            reason: reason.to_string(),
        }
    }
}

/// Adapts an xxh64 state to [`Hasher`].
struct DigestHasher(Xxh64);

impl Hasher for DigestHasher {
    fn write(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn finish(&self) -> u64 {
        self.0.digest()
    }
}
