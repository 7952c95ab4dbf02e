//! Error types for all colstore operations.

use thiserror::Error;

/// Top-level error type for colstore operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

/// The category a [`SchemaError`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    Name,
    KeyStructure,
    StaticColumn,
    ClusteringOrder,
    DensityConflict,
    Property,
    Catalog,
}

/// Failures raised while compiling or evolving a table definition.
///
/// Every variant is terminal for the request that triggered it: no schema is
/// produced and nothing is retained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error(
        "\"{0}\" is not a valid name (must be alphanumeric or underscore characters only)"
    )]
    InvalidName(String),

    #[error("names must not be more than {max} characters long (got \"{name}\")")]
    NameTooLong { name: String, max: usize },

    #[error("multiple definition of identifier {0}")]
    DuplicateColumn(String),

    #[error("no PRIMARY KEY specified (exactly one required)")]
    MissingPrimaryKey,

    #[error("multiple PRIMARY KEYs specified (exactly one required)")]
    MultiplePrimaryKeys,

    #[error("PRIMARY KEY must declare at least one partition key column")]
    EmptyPartitionKey,

    #[error("unknown definition {0} referenced in PRIMARY KEY")]
    UnknownKeyColumn(String),

    #[error("column {0} appears more than once in the PRIMARY KEY")]
    RepeatedKeyColumn(String),

    #[error("invalid collection type for PRIMARY KEY component {0}")]
    CollectionKeyColumn(String),

    #[error("counter type is not supported for PRIMARY KEY part {0}")]
    CounterKeyColumn(String),

    #[error("static column {0} cannot be part of the PRIMARY KEY")]
    StaticKeyColumn(String),

    #[error("static columns are not supported in COMPACT STORAGE tables")]
    StaticWithCompactStorage,

    #[error(
        "static columns are only useful (and thus allowed) if the table has at least one clustering column"
    )]
    StaticWithoutClustering,

    #[error("only clustering columns can be defined in CLUSTERING ORDER directive (got {0})")]
    OrderOnNonClusteringColumn(String),

    #[error("the order of columns in the CLUSTERING ORDER directive must be the one of the clustering key ({expected} must appear before {found})")]
    ClusteringOrderMismatch { expected: String, found: String },

    #[error("missing CLUSTERING ORDER for column {0}")]
    MissingClusteringOrder(String),

    #[error("column {0} appears more than once in the CLUSTERING ORDER directive")]
    RepeatedClusteringOrder(String),

    #[error(
        "COMPACT STORAGE with composite PRIMARY KEY allows no more than one column not part of the PRIMARY KEY (got: {})",
        .0.join(", ")
    )]
    TooManyCompactColumns(Vec<String>),

    #[error("collection types are not supported with COMPACT STORAGE")]
    CollectionWithCompactStorage,

    #[error("cannot mix counter and non-counter columns in the same table")]
    MixedCounterColumns,

    #[error("cannot set default_time_to_live on a table with counters")]
    CounterWithDefaultTtl,

    #[error("invalid table property {name}: {reason}")]
    InvalidProperty { name: String, reason: String },

    #[error("keyspace not found: {0}")]
    KeyspaceNotFound(String),

    #[error("keyspace already exists: {0}")]
    KeyspaceAlreadyExists(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("table already exists: {0}")]
    TableAlreadyExists(String),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("cannot alter table {table}: {reason}")]
    InvalidAlteration { table: String, reason: String },
}

impl SchemaError {
    /// Map this error onto the compile-time error taxonomy.
    pub fn kind(&self) -> SchemaErrorKind {
        match self {
            SchemaError::InvalidName(_)
            | SchemaError::NameTooLong { .. }
            | SchemaError::DuplicateColumn(_) => SchemaErrorKind::Name,
            SchemaError::MissingPrimaryKey
            | SchemaError::MultiplePrimaryKeys
            | SchemaError::EmptyPartitionKey
            | SchemaError::UnknownKeyColumn(_)
            | SchemaError::RepeatedKeyColumn(_)
            | SchemaError::CollectionKeyColumn(_)
            | SchemaError::CounterKeyColumn(_)
            | SchemaError::StaticKeyColumn(_) => SchemaErrorKind::KeyStructure,
            SchemaError::StaticWithCompactStorage | SchemaError::StaticWithoutClustering => {
                SchemaErrorKind::StaticColumn
            }
            SchemaError::OrderOnNonClusteringColumn(_)
            | SchemaError::ClusteringOrderMismatch { .. }
            | SchemaError::MissingClusteringOrder(_)
            | SchemaError::RepeatedClusteringOrder(_) => SchemaErrorKind::ClusteringOrder,
            SchemaError::TooManyCompactColumns(_)
            | SchemaError::CollectionWithCompactStorage
            | SchemaError::MixedCounterColumns
            | SchemaError::CounterWithDefaultTtl => SchemaErrorKind::DensityConflict,
            SchemaError::InvalidProperty { .. } => SchemaErrorKind::Property,
            SchemaError::KeyspaceNotFound(_)
            | SchemaError::KeyspaceAlreadyExists(_)
            | SchemaError::TableNotFound(_)
            | SchemaError::TableAlreadyExists(_)
            | SchemaError::ColumnNotFound(_)
            | SchemaError::InvalidAlteration { .. } => SchemaErrorKind::Catalog,
        }
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("column {column} of table {table} cannot be indexed: {reason}")]
    NotIndexable {
        table: String,
        column: String,
        reason: String,
    },

    #[error("index {0} has been invalidated")]
    Invalidated(String),

    #[error("index already exists: {0}")]
    AlreadyExists(String),

    #[error("index not found: {0}")]
    NotFound(String),

    #[error("cell name does not carry a value for indexed column {0}")]
    MissingComponent(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("table {0} has been invalidated")]
    Invalidated(String),

    #[error("flush of table {0} did not complete")]
    FlushAborted(String),

    #[error("corrupted catalog: {0}")]
    CorruptedCatalog(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("expected {expected} bytes for {type_name}, got {actual}")]
    InvalidLength {
        type_name: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("component exceeds maximum size of {max} bytes (got {actual})")]
    ComponentTooLarge { max: usize, actual: usize },

    #[error("malformed composite")]
    MalformedComposite,

    #[error("expected {expected} components, got {actual}")]
    ComponentCount { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
