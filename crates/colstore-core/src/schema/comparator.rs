//! Cell-name comparators: how the non-partition part of a key is encoded
//! and ordered.
//!
//! There are four layouts. "Simple" layouts store a single value as the cell
//! name, "compound" layouts a composite. "Dense" layouts store only clustering
//! values (the table has at most one value column), "sparse" layouts append
//! the column name so a row can hold any number of columns.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::encoding::compare_values;
use crate::encoding::composite::{compare_composites, decode_composite, encode_composite};
use crate::error::{EncodingError, SchemaError};
use crate::types::DataType;

/// Multi-cell collection columns of a compound-sparse table, by name.
///
/// Each entry fixes the type of the extra cell-name component that
/// addresses one element of that collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionCarrier(BTreeMap<String, DataType>);

impl CollectionCarrier {
    pub fn new(columns: BTreeMap<String, DataType>) -> Self {
        Self(columns)
    }

    pub fn get(&self, column: &str) -> Option<&DataType> {
        self.0.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DataType)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn with(&self, column: &str, data_type: DataType) -> Self {
        let mut columns = self.0.clone();
        columns.insert(column.to_string(), data_type);
        Self(columns)
    }
}

/// The comparator of a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CellNameType {
    /// Cell name is the column name, compared as `wrapped`.
    SimpleSparse { wrapped: DataType },
    /// Cell name is the single clustering value.
    SimpleDense { wrapped: DataType },
    /// Composite of the clustering values, the column name and, for
    /// collection cells, the element key.
    CompoundSparse {
        types: Vec<DataType>,
        collections: Option<CollectionCarrier>,
    },
    /// Composite of the clustering values.
    CompoundDense { types: Vec<DataType> },
}

/// The logical parts of a cell name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CellName {
    pub clustering: Vec<Vec<u8>>,
    pub column: Option<String>,
    pub collection_element: Option<Vec<u8>>,
    pub is_static: bool,
}

impl CellName {
    /// A cell of a dense table: clustering values only.
    pub fn dense<C: Into<Vec<u8>>>(clustering: impl IntoIterator<Item = C>) -> Self {
        Self {
            clustering: clustering.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// A regular cell of a sparse table.
    pub fn regular<C: Into<Vec<u8>>>(
        clustering: impl IntoIterator<Item = C>,
        column: &str,
    ) -> Self {
        Self {
            clustering: clustering.into_iter().map(Into::into).collect(),
            column: Some(column.to_string()),
            ..Default::default()
        }
    }

    /// A static cell.
    pub fn static_cell(column: &str) -> Self {
        Self {
            column: Some(column.to_string()),
            is_static: true,
            ..Default::default()
        }
    }

    /// Address one element of a multi-cell collection.
    pub fn with_element(mut self, element: impl Into<Vec<u8>>) -> Self {
        self.collection_element = Some(element.into());
        self
    }
}

/// Selects a table's comparator.
pub struct ClusteringEncodingResolver;

impl ClusteringEncodingResolver {
    /// `clustering` holds the clustering types in key order (descending ones
    /// already reversed); `collections` the multi-cell non-key columns.
    pub fn resolve(
        clustering: Vec<DataType>,
        compact: bool,
        collections: BTreeMap<String, DataType>,
    ) -> Result<CellNameType, SchemaError> {
        if compact && !collections.is_empty() {
            return Err(SchemaError::CollectionWithCompactStorage);
        }
        let carrier = (!collections.is_empty()).then(|| CollectionCarrier::new(collections));

        let comparator = match (clustering.len(), compact) {
            (0, true) => CellNameType::SimpleSparse {
                wrapped: DataType::TEXT,
            },
            (1, true) => CellNameType::SimpleDense {
                wrapped: clustering.into_iter().next().unwrap_or(DataType::BYTES),
            },
            (_, true) => CellNameType::CompoundDense { types: clustering },
            (_, false) => CellNameType::CompoundSparse {
                types: clustering,
                collections: carrier,
            },
        };
        Ok(comparator)
    }
}

impl CellNameType {
    pub fn is_dense(&self) -> bool {
        matches!(
            self,
            CellNameType::SimpleDense { .. } | CellNameType::CompoundDense { .. }
        )
    }

    pub fn is_compound(&self) -> bool {
        matches!(
            self,
            CellNameType::CompoundSparse { .. } | CellNameType::CompoundDense { .. }
        )
    }

    /// Number of clustering components in a full cell name.
    pub fn clustering_prefix_size(&self) -> usize {
        self.clustering_types().len()
    }

    pub fn clustering_types(&self) -> &[DataType] {
        match self {
            CellNameType::SimpleSparse { .. } => &[],
            CellNameType::SimpleDense { wrapped } => std::slice::from_ref(wrapped),
            CellNameType::CompoundSparse { types, .. } | CellNameType::CompoundDense { types } => {
                types
            }
        }
    }

    pub fn has_collections(&self) -> bool {
        self.collections().is_some()
    }

    pub fn collections(&self) -> Option<&CollectionCarrier> {
        match self {
            CellNameType::CompoundSparse {
                collections: Some(carrier),
                ..
            } => Some(carrier),
            _ => None,
        }
    }

    /// The declared type of a multi-cell collection column.
    pub fn collection_type(&self, column: &str) -> Option<&DataType> {
        self.collections().and_then(|c| c.get(column))
    }

    /// Register a multi-cell collection column. Only compound-sparse
    /// comparators can address collection elements.
    pub fn with_collection(&self, column: &str, data_type: DataType) -> Option<Self> {
        match self {
            CellNameType::CompoundSparse { types, collections } => {
                let carrier = collections
                    .as_ref()
                    .map(|c| c.with(column, data_type.clone()))
                    .unwrap_or_else(|| {
                        CollectionCarrier::new(BTreeMap::from([(column.to_string(), data_type)]))
                    });
                Some(CellNameType::CompoundSparse {
                    types: types.clone(),
                    collections: Some(carrier),
                })
            }
            _ => None,
        }
    }

    /// Replace the type of one clustering component.
    pub fn with_clustering_type(&self, position: usize, data_type: DataType) -> Self {
        let mut next = self.clone();
        match &mut next {
            CellNameType::SimpleSparse { .. } => {}
            CellNameType::SimpleDense { wrapped } => {
                if position == 0 {
                    *wrapped = data_type;
                }
            }
            CellNameType::CompoundSparse { types, .. } | CellNameType::CompoundDense { types } => {
                if let Some(slot) = types.get_mut(position) {
                    *slot = data_type;
                }
            }
        }
        next
    }

    /// Serialize a cell name.
    pub fn encode(&self, name: &CellName) -> Result<Vec<u8>, EncodingError> {
        for (ty, value) in self.clustering_types().iter().zip(&name.clustering) {
            ty.validate(value)?;
        }
        match self {
            CellNameType::SimpleSparse { .. } => {
                let column = self.require_sparse_column(name)?;
                if !name.clustering.is_empty() || name.is_static {
                    return Err(EncodingError::InvalidValue(
                        "simple sparse cell names carry only a column name".to_string(),
                    ));
                }
                Ok(column.as_bytes().to_vec())
            }
            CellNameType::SimpleDense { .. } => {
                self.require_dense(name)?;
                match name.clustering.as_slice() {
                    [value] => Ok(value.clone()),
                    other => Err(EncodingError::ComponentCount {
                        expected: 1,
                        actual: other.len(),
                    }),
                }
            }
            CellNameType::CompoundDense { types } => {
                self.require_dense(name)?;
                if name.clustering.len() > types.len() {
                    return Err(EncodingError::ComponentCount {
                        expected: types.len(),
                        actual: name.clustering.len(),
                    });
                }
                encode_composite(&name.clustering, false)
            }
            CellNameType::CompoundSparse { types, .. } => {
                let column = self.require_sparse_column(name)?;
                let mut components: Vec<&[u8]> = Vec::with_capacity(types.len() + 2);
                if name.is_static {
                    if !name.clustering.is_empty() {
                        return Err(EncodingError::InvalidValue(
                            "static cell names carry no clustering values".to_string(),
                        ));
                    }
                    components.resize(types.len(), &[]);
                } else {
                    if name.clustering.len() != types.len() {
                        return Err(EncodingError::ComponentCount {
                            expected: types.len(),
                            actual: name.clustering.len(),
                        });
                    }
                    components.extend(name.clustering.iter().map(Vec::as_slice));
                }
                components.push(column.as_bytes());
                if let Some(element) = &name.collection_element {
                    let element_type = self
                        .collection_type(column)
                        .and_then(DataType::collection_name_type)
                        .ok_or_else(|| {
                            EncodingError::InvalidValue(format!(
                                "column {column} is not a multi-cell collection"
                            ))
                        })?;
                    element_type.validate(element)?;
                    components.push(element);
                }
                encode_composite(&components, name.is_static)
            }
        }
    }

    /// Split a serialized cell name back into its parts.
    pub fn decode(&self, bytes: &[u8]) -> Result<CellName, EncodingError> {
        match self {
            CellNameType::SimpleSparse { .. } => Ok(CellName {
                column: Some(utf8(bytes)?),
                ..Default::default()
            }),
            CellNameType::SimpleDense { .. } => Ok(CellName::dense([bytes.to_vec()])),
            CellNameType::CompoundDense { types } => {
                let decoded = decode_composite(bytes)?;
                if decoded.is_static || decoded.components.len() > types.len() {
                    return Err(EncodingError::ComponentCount {
                        expected: types.len(),
                        actual: decoded.components.len(),
                    });
                }
                Ok(CellName::dense(decoded.components))
            }
            CellNameType::CompoundSparse { types, .. } => {
                let decoded = decode_composite(bytes)?;
                let mut components = decoded.components;
                let size = types.len();
                if components.len() != size + 1 && components.len() != size + 2 {
                    return Err(EncodingError::ComponentCount {
                        expected: size + 1,
                        actual: components.len(),
                    });
                }
                let collection_element = (components.len() == size + 2)
                    .then(|| components.pop())
                    .flatten();
                let column = components.pop().map(|c| utf8(&c)).transpose()?;
                let clustering = if decoded.is_static {
                    Vec::new()
                } else {
                    components
                };
                Ok(CellName {
                    clustering,
                    column,
                    collection_element,
                    is_static: decoded.is_static,
                })
            }
        }
    }

    /// Order two serialized cell names.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self {
            CellNameType::SimpleSparse { wrapped } | CellNameType::SimpleDense { wrapped } => {
                compare_values(wrapped, a, b)
            }
            CellNameType::CompoundDense { types } => compare_composites(types, a, b),
            CellNameType::CompoundSparse { types, .. } => {
                let (Ok(x), Ok(y)) = (self.decode(a), self.decode(b)) else {
                    return a.cmp(b);
                };
                match (x.is_static, y.is_static) {
                    (true, false) => return Ordering::Less,
                    (false, true) => return Ordering::Greater,
                    _ => {}
                }
                for (ty, (cx, cy)) in types.iter().zip(x.clustering.iter().zip(&y.clustering)) {
                    let ord = compare_values(ty, cx, cy);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                x.column.cmp(&y.column).then_with(|| {
                    let element_type = x
                        .column
                        .as_deref()
                        .and_then(|c| self.collection_type(c))
                        .and_then(DataType::collection_name_type)
                        .unwrap_or(DataType::BYTES);
                    match (&x.collection_element, &y.collection_element) {
                        (Some(ex), Some(ey)) => compare_values(&element_type, ex, ey),
                        (ex, ey) => ex.is_some().cmp(&ey.is_some()),
                    }
                })
            }
        }
    }

    fn require_sparse_column<'a>(&self, name: &'a CellName) -> Result<&'a str, EncodingError> {
        name.column.as_deref().ok_or_else(|| {
            EncodingError::InvalidValue("sparse cell names need a column name".to_string())
        })
    }

    fn require_dense(&self, name: &CellName) -> Result<(), EncodingError> {
        if name.column.is_some() || name.is_static || name.collection_element.is_some() {
            return Err(EncodingError::InvalidValue(
                "dense cell names carry only clustering values".to_string(),
            ));
        }
        Ok(())
    }
}

fn join(types: &[DataType]) -> String {
    types
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn utf8(bytes: &[u8]) -> Result<String, EncodingError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| EncodingError::InvalidValue("column name is not utf-8".to_string()))
}

impl fmt::Display for CellNameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellNameType::SimpleSparse { wrapped } => write!(f, "simple_sparse({wrapped})"),
            CellNameType::SimpleDense { wrapped } => write!(f, "simple_dense({wrapped})"),
            CellNameType::CompoundDense { types } => write!(f, "compound_dense({})", join(types)),
            CellNameType::CompoundSparse { types, collections } => {
                write!(f, "compound_sparse({})", join(types))?;
                if let Some(carrier) = collections {
                    let entries: Vec<String> =
                        carrier.iter().map(|(n, t)| format!("{n}: {t}")).collect();
                    write!(f, " with collections {{{}}}", entries.join(", "))?;
                }
                Ok(())
            }
        }
    }
}
