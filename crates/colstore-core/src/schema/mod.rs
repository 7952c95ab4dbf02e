//! Table definitions and their compilation into resolved physical schemas.

pub mod comparator;
pub mod compiler;
pub mod default_value;
pub mod definition;
pub mod key_encoding;
pub mod resolved;
pub mod roles;
pub mod store;

pub use comparator::{CellName, CellNameType, ClusteringEncodingResolver, CollectionCarrier};
pub use compiler::SchemaCompiler;
pub use default_value::{CompactValue, DefaultValueResolver};
pub use definition::{ClusteringOrder, LogicalColumn, LogicalTableDefinition, TableDefinitionBuilder};
pub use key_encoding::KeyEncoding;
pub use resolved::ResolvedTableSchema;
pub use roles::{ColumnDefinition, ColumnKind, ColumnRoleClassifier};
pub use store::{KeyspaceMetadata, SchemaStore};

use crate::error::SchemaError;
use crate::types::NAME_LENGTH;

/// Validate a keyspace, table or index name: word characters only, at most
/// [`NAME_LENGTH`] long.
pub fn validate_name(name: &str) -> Result<(), SchemaError> {
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(SchemaError::InvalidName(name.to_string()));
    }
    if name.chars().count() > NAME_LENGTH {
        return Err(SchemaError::NameTooLong {
            name: name.to_string(),
            max: NAME_LENGTH,
        });
    }
    Ok(())
}

/// Validate a column name. Column names share the character rule of table
/// names but are not length-bounded beyond what a cell name can hold.
pub fn validate_column_name(name: &str) -> Result<(), SchemaError> {
    if name.is_empty()
        || name.len() > crate::encoding::composite::MAX_COMPONENT_SIZE
        || !name.chars().all(|c| c.is_alphanumeric() || c == '_')
    {
        return Err(SchemaError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("users_2024").is_ok());
        assert_eq!(
            validate_name("bad-name"),
            Err(SchemaError::InvalidName("bad-name".into()))
        );
        assert_eq!(validate_name(""), Err(SchemaError::InvalidName("".into())));
        let long = "a".repeat(NAME_LENGTH + 1);
        assert!(matches!(
            validate_name(&long),
            Err(SchemaError::NameTooLong { max: NAME_LENGTH, .. })
        ));
        assert!(validate_name(&"a".repeat(NAME_LENGTH)).is_ok());
    }

    #[test]
    fn test_column_names_are_not_length_bounded() {
        assert!(validate_column_name(&"c".repeat(NAME_LENGTH * 2)).is_ok());
        assert!(validate_column_name("with space").is_err());
    }
}
