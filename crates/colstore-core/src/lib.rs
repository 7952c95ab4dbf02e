//! # colstore
//!
//! Schema resolution and secondary-index maintenance for a wide-column
//! store.
//!
//! A [`LogicalTableDefinition`](schema::LogicalTableDefinition) is compiled
//! into an immutable [`ResolvedTableSchema`](schema::ResolvedTableSchema)
//! that fixes the partition-key encoding, the comparator of cell names, the
//! default value type and the role of every column. Secondary indexes are
//! derived from a resolved schema and kept consistent with their base table
//! by a [`SecondaryIndexMaintainer`](index::SecondaryIndexMaintainer) on the
//! write path.
//!
//! ## Quick Start
//!
//! ```
//! use colstore_core::schema::{CellNameType, ColumnKind, TableDefinitionBuilder};
//! use colstore_core::types::{DataType, NativeType};
//!
//! let schema = TableDefinitionBuilder::new("ks", "events")
//!     .column("id", DataType::Native(NativeType::Uuid))
//!     .column("at", DataType::Native(NativeType::Timestamp))
//!     .column("payload", DataType::TEXT)
//!     .partition_key(&["id"])
//!     .clustering_column("at")
//!     .finalize()
//!     .unwrap();
//!
//! assert!(matches!(schema.comparator(), CellNameType::CompoundSparse { .. }));
//! assert_eq!(schema.role("payload"), Some(ColumnKind::Regular));
//! ```

pub mod config;
pub mod encoding;
pub mod error;
pub mod index;
pub mod schema;
pub mod storage;
pub mod types;

pub use error::{Error, Result};
