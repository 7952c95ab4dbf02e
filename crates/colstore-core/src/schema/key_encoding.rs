//! Partition-key encoding.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::encoding::compare_values;
use crate::encoding::composite::{compare_composites, decode_composite, encode_composite};
use crate::error::EncodingError;
use crate::types::DataType;

/// How partition keys are serialized: a single raw value, or an ordered
/// composite of several.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "types", rename_all = "snake_case")]
pub enum KeyEncoding {
    Single(DataType),
    Composite(Vec<DataType>),
}

impl KeyEncoding {
    /// Derive the encoding from the partition-key column types, in
    /// declaration order.
    pub fn resolve(types: Vec<DataType>) -> Self {
        match <[DataType; 1]>::try_from(types) {
            Ok([single]) => KeyEncoding::Single(single),
            Err(types) => KeyEncoding::Composite(types),
        }
    }

    pub fn component_types(&self) -> &[DataType] {
        match self {
            KeyEncoding::Single(ty) => std::slice::from_ref(ty),
            KeyEncoding::Composite(types) => types,
        }
    }

    pub fn component_count(&self) -> usize {
        self.component_types().len()
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, KeyEncoding::Composite(_))
    }

    /// Serialize one value per component.
    pub fn encode<C: AsRef<[u8]>>(&self, components: &[C]) -> Result<Vec<u8>, EncodingError> {
        if components.len() != self.component_count() {
            return Err(EncodingError::ComponentCount {
                expected: self.component_count(),
                actual: components.len(),
            });
        }
        for (ty, value) in self.component_types().iter().zip(components) {
            ty.validate(value.as_ref())?;
        }
        match self {
            KeyEncoding::Single(_) => Ok(components[0].as_ref().to_vec()),
            KeyEncoding::Composite(_) => encode_composite(components, false),
        }
    }

    /// Split a serialized key back into its component values.
    pub fn decode(&self, key: &[u8]) -> Result<Vec<Vec<u8>>, EncodingError> {
        match self {
            KeyEncoding::Single(_) => Ok(vec![key.to_vec()]),
            KeyEncoding::Composite(types) => {
                let decoded = decode_composite(key)?;
                if decoded.is_static || decoded.components.len() != types.len() {
                    return Err(EncodingError::ComponentCount {
                        expected: types.len(),
                        actual: decoded.components.len(),
                    });
                }
                Ok(decoded.components)
            }
        }
    }

    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self {
            KeyEncoding::Single(ty) => compare_values(ty, a, b),
            KeyEncoding::Composite(types) => compare_composites(types, a, b),
        }
    }
}

impl std::fmt::Display for KeyEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyEncoding::Single(ty) => write!(f, "{ty}"),
            KeyEncoding::Composite(types) => {
                let names: Vec<String> = types.iter().map(|t| t.to_string()).collect();
                write!(f, "composite({})", names.join(", "))
            }
        }
    }
}
