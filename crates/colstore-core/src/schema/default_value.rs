//! The type of values that have no column of their own, and the compact
//! value alias of dense tables.

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::types::DataType;

use super::definition::LogicalColumn;

/// Name of the value column of a dense table.
///
/// `Empty` is an explicit marker for tables that declare no value column.
/// It differs from having no alias at all, which identifies legacy tables
/// whose layout is being reinterpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum CompactValue {
    Empty,
    Column(String),
}

impl CompactValue {
    pub fn column(&self) -> Option<&str> {
        match self {
            CompactValue::Column(name) => Some(name),
            CompactValue::Empty => None,
        }
    }
}

/// Outcome of default-value resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultValue {
    pub validator: DataType,
    pub compact_value: Option<CompactValue>,
}

pub struct DefaultValueResolver;

impl DefaultValueResolver {
    /// `remaining` are the non-key columns in declaration order.
    pub fn resolve(
        compact: bool,
        clustering_count: usize,
        remaining: &[LogicalColumn],
    ) -> Result<DefaultValue, SchemaError> {
        let has_counters = remaining.iter().any(|c| c.data_type.is_counter());
        let counter_or_bytes = if has_counters {
            DataType::COUNTER
        } else {
            DataType::BYTES
        };

        if !compact {
            return Ok(DefaultValue {
                validator: counter_or_bytes,
                compact_value: None,
            });
        }

        match (clustering_count, remaining) {
            // Static compact table: the value column is named by the cell.
            (0, []) => Ok(DefaultValue {
                validator: DataType::BYTES,
                compact_value: Some(CompactValue::Empty),
            }),
            (0, [only]) => Ok(DefaultValue {
                validator: only.data_type.clone(),
                compact_value: None,
            }),
            (0, _) => Ok(DefaultValue {
                validator: counter_or_bytes,
                compact_value: None,
            }),
            (1, []) => Ok(DefaultValue {
                validator: DataType::TEXT,
                compact_value: Some(CompactValue::Empty),
            }),
            (_, []) => Ok(DefaultValue {
                validator: DataType::BYTES,
                compact_value: Some(CompactValue::Empty),
            }),
            (_, [only]) => Ok(DefaultValue {
                validator: only.data_type.clone(),
                compact_value: Some(CompactValue::Column(only.name.clone())),
            }),
            (_, many) => Err(SchemaError::TooManyCompactColumns(
                many.iter().map(|c| c.name.clone()).collect(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NativeType;

    fn col(name: &str, ty: DataType) -> LogicalColumn {
        LogicalColumn::new(name, ty)
    }

    #[test]
    fn test_sparse_defaults() {
        let v = DefaultValueResolver::resolve(false, 1, &[col("a", DataType::TEXT)]).unwrap();
        assert_eq!(v.validator, DataType::BYTES);
        assert_eq!(v.compact_value, None);

        let v = DefaultValueResolver::resolve(false, 0, &[col("c", DataType::COUNTER)]).unwrap();
        assert_eq!(v.validator, DataType::COUNTER);
    }

    #[test]
    fn test_dense_value_column() {
        let int = DataType::Native(NativeType::Int);
        let v = DefaultValueResolver::resolve(true, 2, &[col("v", int.clone())]).unwrap();
        assert_eq!(v.validator, int);
        assert_eq!(v.compact_value, Some(CompactValue::Column("v".into())));
    }

    #[test]
    fn test_dense_without_value_column() {
        let v = DefaultValueResolver::resolve(true, 1, &[]).unwrap();
        assert_eq!(v.validator, DataType::TEXT);
        assert_eq!(v.compact_value, Some(CompactValue::Empty));

        let v = DefaultValueResolver::resolve(true, 3, &[]).unwrap();
        assert_eq!(v.validator, DataType::BYTES);
        assert_eq!(v.compact_value, Some(CompactValue::Empty));
    }

    #[test]
    fn test_dense_with_too_many_columns() {
        let err = DefaultValueResolver::resolve(
            true,
            1,
            &[col("a", DataType::TEXT), col("b", DataType::TEXT)],
        )
        .unwrap_err();
        assert_eq!(
            err,
            SchemaError::TooManyCompactColumns(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn test_static_compact_table() {
        let v = DefaultValueResolver::resolve(true, 0, &[]).unwrap();
        assert_eq!(v.validator, DataType::BYTES);
        assert_eq!(v.compact_value, Some(CompactValue::Empty));

        let v = DefaultValueResolver::resolve(true, 0, &[col("x", DataType::TEXT)]).unwrap();
        assert_eq!(v.validator, DataType::TEXT);
        assert_eq!(v.compact_value, None);

        let v = DefaultValueResolver::resolve(
            true,
            0,
            &[col("x", DataType::TEXT), col("y", DataType::TEXT)],
        )
        .unwrap();
        assert_eq!(v.validator, DataType::BYTES);
    }
}
