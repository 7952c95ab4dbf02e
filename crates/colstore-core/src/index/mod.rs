//! Secondary indexes: schema derivation for the hidden index table, entry
//! layout per indexed column role, and the maintainer that keeps an index
//! consistent with its base table under inserts, updates and deletes.

pub mod builder;
pub mod descriptor;
pub mod maintainer;
pub mod manager;
pub mod strategy;

pub use builder::{BASE_KEY_COLUMN, IndexSchemaBuilder, IndexTarget};
pub use descriptor::{IndexDescriptor, Operator};
pub use maintainer::{IndexState, SecondaryIndexMaintainer};
pub use manager::SecondaryIndexManager;
pub use strategy::{ColumnIndexStrategy, IndexEntryStrategy};

/// Where a base cell is recorded in the index table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexEntry {
    /// The indexed value.
    pub partition_key: Vec<u8>,
    /// Identifies the base row (or row prefix) holding the value.
    pub cell_name: Vec<u8>,
}
