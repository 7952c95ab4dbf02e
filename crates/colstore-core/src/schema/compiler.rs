//! Compilation of logical table definitions into resolved schemas.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::error::{Error, SchemaError};

use super::comparator::ClusteringEncodingResolver;
use super::default_value::{CompactValue, DefaultValueResolver};
use super::definition::{LogicalColumn, LogicalTableDefinition};
use super::key_encoding::KeyEncoding;
use super::resolved::ResolvedTableSchema;
use super::roles::{ClassifiedColumns, ColumnDefinition, ColumnKind, ColumnRoleClassifier};
use super::{validate_column_name, validate_name};

/// Turns a [`LogicalTableDefinition`] into a [`ResolvedTableSchema`].
///
/// Compilation is a pure function of the definition: it holds no state and
/// may run on any number of threads at once.
pub struct SchemaCompiler;

impl SchemaCompiler {
    pub fn compile(def: &LogicalTableDefinition) -> Result<ResolvedTableSchema, Error> {
        Ok(Self::resolve(def)?)
    }

    fn resolve(def: &LogicalTableDefinition) -> Result<ResolvedTableSchema, SchemaError> {
        validate_name(&def.name)?;
        check_columns(&def.columns)?;
        def.properties.validate()?;

        let classified = ColumnRoleClassifier::classify(def)?;

        if classified.has_counters() && def.properties.default_time_to_live > 0 {
            return Err(SchemaError::CounterWithDefaultTtl);
        }
        check_counter_mix(classified.remaining.iter())?;

        if classified.has_static_columns() {
            if def.compact_storage {
                return Err(SchemaError::StaticWithCompactStorage);
            }
            if classified.clustering.is_empty() {
                return Err(SchemaError::StaticWithoutClustering);
            }
        }

        let collections: BTreeMap<String, _> = classified
            .multi_cell_columns()
            .map(|c| (c.name.clone(), c.data_type.clone()))
            .collect();
        let comparator = ClusteringEncodingResolver::resolve(
            classified.clustering_types(),
            def.compact_storage,
            collections,
        )?;
        let default_value = DefaultValueResolver::resolve(
            def.compact_storage,
            classified.clustering.len(),
            &classified.remaining,
        )?;
        let key_encoding = KeyEncoding::resolve(classified.partition_key_types());

        let columns = assign_roles(
            &classified,
            key_encoding.is_composite(),
            comparator.is_compound(),
            default_value.compact_value.as_ref(),
        );

        let schema = ResolvedTableSchema::from_parts(
            def.keyspace.clone(),
            def.name.clone(),
            key_encoding,
            comparator,
            default_value.validator,
            def.compact_storage,
            columns,
            default_value.compact_value,
            def.properties.clone(),
        );
        debug!(
            keyspace = %schema.keyspace(),
            table = %schema.name(),
            comparator = %schema.comparator(),
            key = %schema.key_encoding(),
            dense = schema.is_dense(),
            "resolved table schema"
        );
        Ok(schema)
    }
}

fn check_columns(columns: &[LogicalColumn]) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();
    for column in columns {
        validate_column_name(&column.name)?;
        if !seen.insert(column.name.as_str()) {
            return Err(SchemaError::DuplicateColumn(column.name.clone()));
        }
    }
    Ok(())
}

/// Counter columns may not share a table with non-counter value columns.
pub(crate) fn check_counter_mix<'a>(
    columns: impl Iterator<Item = &'a LogicalColumn>,
) -> Result<(), SchemaError> {
    let (mut counters, mut others) = (false, false);
    for column in columns {
        if column.data_type.is_counter() {
            counters = true;
        } else {
            others = true;
        }
    }
    if counters && others {
        return Err(SchemaError::MixedCounterColumns);
    }
    Ok(())
}

fn assign_roles(
    classified: &ClassifiedColumns,
    composite_key: bool,
    compound: bool,
    compact_value: Option<&CompactValue>,
) -> Vec<ColumnDefinition> {
    let mut columns = Vec::with_capacity(
        classified.partition_key.len() + classified.clustering.len() + classified.remaining.len(),
    );
    for (i, column) in classified.partition_key.iter().enumerate() {
        columns.push(ColumnDefinition::new(
            &column.name,
            column.data_type.clone(),
            ColumnKind::PartitionKey,
            composite_key.then_some(i),
        ));
    }
    for (i, column) in classified.clustering.iter().enumerate() {
        columns.push(ColumnDefinition::new(
            &column.name,
            column.data_type.clone(),
            ColumnKind::ClusteringKey,
            compound.then_some(i),
        ));
    }

    let value_alias = compact_value.and_then(CompactValue::column);
    let name_slot = compound.then_some(classified.clustering.len());
    for column in &classified.remaining {
        let definition = if value_alias == Some(column.name.as_str()) {
            ColumnDefinition::new(
                &column.name,
                column.data_type.clone(),
                ColumnKind::CompactValue,
                None,
            )
        } else {
            let kind = if column.is_static {
                ColumnKind::Static
            } else {
                ColumnKind::Regular
            };
            ColumnDefinition::new(&column.name, column.data_type.clone(), kind, name_slot)
        };
        columns.push(definition);
    }
    columns
}
