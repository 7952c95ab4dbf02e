//! Column roles and the classifier that assigns them.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::types::{DataType, SortDirection};

use super::definition::{LogicalColumn, LogicalTableDefinition};

/// The role a column plays in the physical layout of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    PartitionKey,
    ClusteringKey,
    Static,
    Regular,
    CompactValue,
}

impl ColumnKind {
    pub fn is_primary_key(self) -> bool {
        matches!(self, ColumnKind::PartitionKey | ColumnKind::ClusteringKey)
    }
}

/// A column of a resolved schema.
///
/// `component_index` is the column's position inside a composite it is
/// decoded from: the partition key or clustering prefix for key columns, the
/// column-name slot for regular and static columns of compound comparators.
/// It is `None` when the column is not stored inside a composite.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    pub kind: ColumnKind,
    pub component_index: Option<usize>,
}

impl ColumnDefinition {
    pub fn new(
        name: &str,
        data_type: DataType,
        kind: ColumnKind,
        component_index: Option<usize>,
    ) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            kind,
            component_index,
        }
    }

    pub fn is_static(&self) -> bool {
        self.kind == ColumnKind::Static
    }

    pub fn is_primary_key(&self) -> bool {
        self.kind.is_primary_key()
    }
}

/// Columns split by the role the primary key gives them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedColumns {
    pub partition_key: Vec<LogicalColumn>,
    /// Clustering columns in key order. Descending columns carry a
    /// `Reversed` type.
    pub clustering: Vec<LogicalColumn>,
    /// Non-key columns in declaration order.
    pub remaining: Vec<LogicalColumn>,
}

impl ClassifiedColumns {
    pub fn clustering_types(&self) -> Vec<DataType> {
        self.clustering.iter().map(|c| c.data_type.clone()).collect()
    }

    pub fn partition_key_types(&self) -> Vec<DataType> {
        self.partition_key.iter().map(|c| c.data_type.clone()).collect()
    }

    pub fn has_counters(&self) -> bool {
        self.remaining.iter().any(|c| c.data_type.is_counter())
    }

    pub fn multi_cell_columns(&self) -> impl Iterator<Item = &LogicalColumn> {
        self.remaining.iter().filter(|c| c.is_multi_cell())
    }

    pub fn has_static_columns(&self) -> bool {
        self.remaining.iter().any(|c| c.is_static)
    }
}

/// Splits a definition's columns into partition-key, clustering and
/// remaining columns, validating the primary key along the way.
pub struct ColumnRoleClassifier;

impl ColumnRoleClassifier {
    pub fn classify(def: &LogicalTableDefinition) -> Result<ClassifiedColumns, SchemaError> {
        let partition_names = match def.partition_key_groups.as_slice() {
            [] => return Err(SchemaError::MissingPrimaryKey),
            [group] => group,
            _ => return Err(SchemaError::MultiplePrimaryKeys),
        };
        if partition_names.is_empty() {
            return Err(SchemaError::EmptyPartitionKey);
        }

        let mut seen = HashSet::new();
        let partition_key = partition_names
            .iter()
            .map(|name| key_component(def, name, &mut seen))
            .collect::<Result<Vec<_>, _>>()?;
        let mut clustering = def
            .clustering_columns
            .iter()
            .map(|name| key_component(def, name, &mut seen))
            .collect::<Result<Vec<_>, _>>()?;

        let directions = Self::clustering_directions(def)?;
        for (column, direction) in clustering.iter_mut().zip(directions) {
            if direction == SortDirection::Desc {
                column.data_type = column.data_type.clone().reversed();
            }
        }

        let mut taken = seen;
        let remaining = def
            .columns
            .iter()
            .filter(|c| taken.insert(c.name.as_str()))
            .cloned()
            .collect();

        Ok(ClassifiedColumns {
            partition_key,
            clustering,
            remaining,
        })
    }

    /// Resolve the direction of each clustering column from the
    /// `CLUSTERING ORDER` directive.
    ///
    /// An empty directive means all ascending. Otherwise it must list every
    /// clustering column exactly once, in primary-key order.
    pub fn clustering_directions(
        def: &LogicalTableDefinition,
    ) -> Result<Vec<SortDirection>, SchemaError> {
        let clustering = &def.clustering_columns;
        if def.clustering_order.is_empty() {
            return Ok(vec![SortDirection::Asc; clustering.len()]);
        }

        let mut named = HashSet::new();
        for (i, entry) in def.clustering_order.iter().enumerate() {
            if !clustering.contains(&entry.column) {
                return Err(SchemaError::OrderOnNonClusteringColumn(
                    entry.column.clone(),
                ));
            }
            if !named.insert(entry.column.as_str()) {
                return Err(SchemaError::RepeatedClusteringOrder(entry.column.clone()));
            }
            if clustering[i] != entry.column {
                return Err(SchemaError::ClusteringOrderMismatch {
                    expected: clustering[i].clone(),
                    found: entry.column.clone(),
                });
            }
        }
        if let Some(missing) = clustering.get(def.clustering_order.len()) {
            return Err(SchemaError::MissingClusteringOrder(missing.clone()));
        }

        Ok(def.clustering_order.iter().map(|o| o.direction).collect())
    }
}

fn key_component<'a>(
    def: &'a LogicalTableDefinition,
    name: &'a str,
    seen: &mut HashSet<&'a str>,
) -> Result<LogicalColumn, SchemaError> {
    let column = def
        .column(name)
        .ok_or_else(|| SchemaError::UnknownKeyColumn(name.to_string()))?;
    if !seen.insert(name) {
        return Err(SchemaError::RepeatedKeyColumn(name.to_string()));
    }
    if column.is_multi_cell() {
        return Err(SchemaError::CollectionKeyColumn(name.to_string()));
    }
    if column.data_type.is_counter() {
        return Err(SchemaError::CounterKeyColumn(name.to_string()));
    }
    if column.is_static {
        return Err(SchemaError::StaticKeyColumn(name.to_string()));
    }
    Ok(column.clone())
}
