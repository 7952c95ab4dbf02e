//! Core types: declared column data types, sort directions, and limits.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EncodingError;

/// Maximum length of keyspace, table and index names.
pub const NAME_LENGTH: usize = 48;

/// Maximum `default_time_to_live` (20 years, in seconds).
pub const MAX_TTL: u32 = 20 * 365 * 24 * 60 * 60;

/// A logical write timestamp (microseconds, caller-defined epoch).
pub type Timestamp = i64;

/// Wall-clock seconds since the Unix epoch, used for local deletion times.
pub type LocalTime = i64;

/// The scalar types a column can be declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeType {
    Ascii,
    BigInt,
    Blob,
    Boolean,
    Counter,
    Decimal,
    Double,
    Float,
    Inet,
    Int,
    Text,
    Timestamp,
    TimeUuid,
    Uuid,
    VarInt,
}

impl NativeType {
    pub fn name(self) -> &'static str {
        match self {
            NativeType::Ascii => "ascii",
            NativeType::BigInt => "bigint",
            NativeType::Blob => "blob",
            NativeType::Boolean => "boolean",
            NativeType::Counter => "counter",
            NativeType::Decimal => "decimal",
            NativeType::Double => "double",
            NativeType::Float => "float",
            NativeType::Inet => "inet",
            NativeType::Int => "int",
            NativeType::Text => "text",
            NativeType::Timestamp => "timestamp",
            NativeType::TimeUuid => "timeuuid",
            NativeType::Uuid => "uuid",
            NativeType::VarInt => "varint",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        let ty = match name {
            "ascii" => NativeType::Ascii,
            "bigint" => NativeType::BigInt,
            "blob" => NativeType::Blob,
            "boolean" => NativeType::Boolean,
            "counter" => NativeType::Counter,
            "decimal" => NativeType::Decimal,
            "double" => NativeType::Double,
            "float" => NativeType::Float,
            "inet" => NativeType::Inet,
            "int" => NativeType::Int,
            "text" | "varchar" => NativeType::Text,
            "timestamp" => NativeType::Timestamp,
            "timeuuid" => NativeType::TimeUuid,
            "uuid" => NativeType::Uuid,
            "varint" => NativeType::VarInt,
            _ => return None,
        };
        Some(ty)
    }
}

/// A declared column type.
///
/// Collections are either multi-cell (each element stored as its own cell) or
/// frozen (the whole collection is one opaque value). Only multi-cell
/// collections count as "multi-valued" for key and density validation.
///
/// `Reversed` marks a clustering component declared with descending order; it
/// inverts comparison and never appears on non-key columns.
///
/// Serialized as its textual form (`"int"`, `"frozen<list<text>>"`,
/// `"map<text, int>"`, `"reversed<timestamp>"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum DataType {
    Native(NativeType),
    List {
        element: Box<DataType>,
        frozen: bool,
    },
    Set {
        element: Box<DataType>,
        frozen: bool,
    },
    Map {
        key: Box<DataType>,
        value: Box<DataType>,
        frozen: bool,
    },
    Reversed(Box<DataType>),
}

impl DataType {
    /// The generic text type (UTF-8).
    pub const TEXT: DataType = DataType::Native(NativeType::Text);
    /// The generic byte type, used where no explicit value type exists.
    pub const BYTES: DataType = DataType::Native(NativeType::Blob);
    /// The counter type.
    pub const COUNTER: DataType = DataType::Native(NativeType::Counter);

    pub fn list(element: DataType) -> Self {
        DataType::List {
            element: Box::new(element),
            frozen: false,
        }
    }

    pub fn set(element: DataType) -> Self {
        DataType::Set {
            element: Box::new(element),
            frozen: false,
        }
    }

    pub fn map(key: DataType, value: DataType) -> Self {
        DataType::Map {
            key: Box::new(key),
            value: Box::new(value),
            frozen: false,
        }
    }

    /// Freeze a collection type. Non-collections are returned unchanged.
    pub fn frozen(self) -> Self {
        match self {
            DataType::List { element, .. } => DataType::List {
                element,
                frozen: true,
            },
            DataType::Set { element, .. } => DataType::Set {
                element,
                frozen: true,
            },
            DataType::Map { key, value, .. } => DataType::Map {
                key,
                value,
                frozen: true,
            },
            other => other,
        }
    }

    /// Wrap in `Reversed` unless already reversed.
    pub fn reversed(self) -> Self {
        match self {
            DataType::Reversed(_) => self,
            other => DataType::Reversed(Box::new(other)),
        }
    }

    /// Strip a `Reversed` wrapper, if any.
    pub fn base(&self) -> &DataType {
        match self {
            DataType::Reversed(inner) => inner.base(),
            other => other,
        }
    }

    pub fn is_reversed(&self) -> bool {
        matches!(self, DataType::Reversed(_))
    }

    pub fn is_counter(&self) -> bool {
        matches!(self.base(), DataType::Native(NativeType::Counter))
    }

    pub fn is_collection(&self) -> bool {
        matches!(
            self.base(),
            DataType::List { .. } | DataType::Set { .. } | DataType::Map { .. }
        )
    }

    /// True for non-frozen collections, whose elements are stored as separate cells.
    pub fn is_multi_cell(&self) -> bool {
        match self.base() {
            DataType::List { frozen, .. }
            | DataType::Set { frozen, .. }
            | DataType::Map { frozen, .. } => !frozen,
            _ => false,
        }
    }

    /// Type of the per-element cell-name component of a multi-cell collection.
    ///
    /// Lists are keyed by a time-based element id, sets by the element itself,
    /// maps by the entry key.
    pub fn collection_name_type(&self) -> Option<DataType> {
        match self.base() {
            DataType::List { frozen: false, .. } => Some(DataType::Native(NativeType::TimeUuid)),
            DataType::Set {
                element,
                frozen: false,
            } => Some((**element).clone()),
            DataType::Map {
                key, frozen: false, ..
            } => Some((**key).clone()),
            _ => None,
        }
    }

    /// Whether values written under `previous` remain valid and identically
    /// ordered under `self`.
    pub fn is_value_compatible_with(&self, previous: &DataType) -> bool {
        if self == previous {
            return true;
        }
        use NativeType::*;
        match (self, previous) {
            (DataType::Native(Blob), other) => !other.is_multi_cell(),
            (DataType::Native(Text), DataType::Native(Ascii)) => true,
            (DataType::Native(VarInt), DataType::Native(Int | BigInt)) => true,
            (DataType::Native(Uuid), DataType::Native(TimeUuid)) => true,
            _ => false,
        }
    }

    /// Whether values written under `previous` stay valid and keep their
    /// relative order under `self`. Required for clustering components.
    pub fn is_order_compatible_with(&self, previous: &DataType) -> bool {
        if self == previous {
            return true;
        }
        use NativeType::*;
        match (self.base(), previous.base()) {
            (DataType::Native(Text), DataType::Native(Ascii)) => true,
            (DataType::Native(Blob), DataType::Native(Text | Ascii)) => true,
            (DataType::Native(VarInt), DataType::Native(Int | BigInt)) => true,
            (a, b) => a == b,
        }
    }

    /// Check that `bytes` is a well-formed serialized value of this type.
    ///
    /// Empty values are accepted for every fixed-width scalar.
    pub fn validate(&self, bytes: &[u8]) -> Result<(), EncodingError> {
        let fixed = |width: usize| {
            if bytes.is_empty() || bytes.len() == width {
                Ok(())
            } else {
                Err(EncodingError::InvalidLength {
                    type_name: self.to_string(),
                    expected: width,
                    actual: bytes.len(),
                })
            }
        };
        match self.base() {
            DataType::Native(native) => match native {
                NativeType::Int | NativeType::Float => fixed(4),
                NativeType::BigInt
                | NativeType::Counter
                | NativeType::Timestamp
                | NativeType::Double => fixed(8),
                NativeType::Uuid => fixed(16),
                NativeType::TimeUuid => {
                    fixed(16)?;
                    if !bytes.is_empty() && bytes[6] >> 4 != 1 {
                        return Err(EncodingError::InvalidValue(
                            "timeuuid must be a version 1 uuid".to_string(),
                        ));
                    }
                    Ok(())
                }
                NativeType::Boolean => fixed(1),
                NativeType::Inet => match bytes.len() {
                    0 | 4 | 16 => Ok(()),
                    n => Err(EncodingError::InvalidValue(format!(
                        "inet address must be 4 or 16 bytes, got {n}"
                    ))),
                },
                NativeType::Ascii => {
                    if bytes.is_ascii() {
                        Ok(())
                    } else {
                        Err(EncodingError::InvalidValue(
                            "non-ascii byte in ascii value".to_string(),
                        ))
                    }
                }
                NativeType::Text => std::str::from_utf8(bytes)
                    .map(|_| ())
                    .map_err(|_| EncodingError::InvalidValue("invalid utf-8".to_string())),
                NativeType::Decimal => {
                    if bytes.is_empty() || bytes.len() > 4 {
                        Ok(())
                    } else {
                        Err(EncodingError::InvalidValue(
                            "decimal needs a 4-byte scale and an unscaled value".to_string(),
                        ))
                    }
                }
                NativeType::Blob | NativeType::VarInt => Ok(()),
            },
            // Collection payloads are opaque at this layer.
            _ => Ok(()),
        }
    }
}

impl From<NativeType> for DataType {
    fn from(native: NativeType) -> Self {
        DataType::Native(native)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frozen_wrap = |f: &mut fmt::Formatter<'_>, frozen: bool, inner: String| {
            if frozen {
                write!(f, "frozen<{inner}>")
            } else {
                f.write_str(&inner)
            }
        };
        match self {
            DataType::Native(native) => f.write_str(native.name()),
            DataType::List { element, frozen } => frozen_wrap(f, *frozen, format!("list<{element}>")),
            DataType::Set { element, frozen } => frozen_wrap(f, *frozen, format!("set<{element}>")),
            DataType::Map { key, value, frozen } => {
                frozen_wrap(f, *frozen, format!("map<{key}, {value}>"))
            }
            DataType::Reversed(inner) => write!(f, "reversed<{inner}>"),
        }
    }
}

impl From<DataType> for String {
    fn from(ty: DataType) -> Self {
        ty.to_string()
    }
}

impl TryFrom<String> for DataType {
    type Error = EncodingError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl FromStr for DataType {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        parse_type(&compact.to_ascii_lowercase())
            .ok_or_else(|| EncodingError::UnknownType(s.to_string()))
    }
}

fn parse_type(s: &str) -> Option<DataType> {
    if let Some(native) = NativeType::from_name(s) {
        return Some(DataType::Native(native));
    }
    let open = s.find('<')?;
    if !s.ends_with('>') {
        return None;
    }
    let (head, args) = (&s[..open], &s[open + 1..s.len() - 1]);
    match head {
        "frozen" => {
            let inner = parse_type(args)?;
            inner.is_collection().then(|| inner.frozen())
        }
        "reversed" => parse_type(args).map(DataType::reversed),
        "list" => parse_type(args).map(DataType::list),
        "set" => parse_type(args).map(DataType::set),
        "map" => {
            let split = top_level_comma(args)?;
            let key = parse_type(&args[..split])?;
            let value = parse_type(&args[split + 1..])?;
            Some(DataType::map(key, value))
        }
        _ => None,
    }
}

fn top_level_comma(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

/// Sort direction of a clustering column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_native_types() {
        assert_eq!("int".parse::<DataType>().unwrap(), DataType::Native(NativeType::Int));
        assert_eq!("varchar".parse::<DataType>().unwrap(), DataType::TEXT);
        assert_eq!("TimeUUID".parse::<DataType>().unwrap(), NativeType::TimeUuid.into());
        assert!("integer".parse::<DataType>().is_err());
    }

    #[test]
    fn test_parse_nested_collections() {
        let ty: DataType = "map<text, frozen<list<int>>>".parse().unwrap();
        assert!(ty.is_multi_cell());
        match &ty {
            DataType::Map { value, .. } => {
                assert!(value.is_collection());
                assert!(!value.is_multi_cell());
            }
            other => panic!("expected map, got {other:?}"),
        }
        assert_eq!(ty.to_string(), "map<text, frozen<list<int>>>");
    }

    #[test]
    fn test_frozen_requires_collection() {
        assert!("frozen<int>".parse::<DataType>().is_err());
        assert!("frozen<set<int>>".parse::<DataType>().is_ok());
    }

    #[test]
    fn test_reversed_is_transparent_for_predicates() {
        let ty = DataType::COUNTER.reversed();
        assert!(ty.is_reversed());
        assert!(ty.is_counter());
        assert_eq!(ty.clone().reversed(), ty);
        assert_eq!(ty.base(), &DataType::COUNTER);
    }

    #[test]
    fn test_serde_uses_text_form() {
        let ty = DataType::set(DataType::TEXT);
        let json = serde_json::to_string(&ty).unwrap();
        assert_eq!(json, "\"set<text>\"");
        let back: DataType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ty);
    }

    #[test]
    fn test_validate_fixed_width() {
        let int = DataType::Native(NativeType::Int);
        assert!(int.validate(&7i32.to_be_bytes()).is_ok());
        assert!(int.validate(&[]).is_ok());
        assert!(int.validate(&[1, 2]).is_err());
        assert!(DataType::TEXT.validate(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_value_compatibility() {
        let int = DataType::Native(NativeType::Int);
        let varint = DataType::Native(NativeType::VarInt);
        assert!(varint.is_value_compatible_with(&int));
        assert!(!int.is_value_compatible_with(&varint));
        assert!(DataType::BYTES.is_value_compatible_with(&DataType::TEXT));
        assert!(!DataType::BYTES.is_value_compatible_with(&DataType::list(int.clone())));

        assert!(varint.is_order_compatible_with(&int));
        assert!(!DataType::BYTES.is_order_compatible_with(&int));
        assert!(DataType::BYTES.is_order_compatible_with(&DataType::TEXT));
    }

    #[test]
    fn test_collection_name_type() {
        let list = DataType::list(DataType::TEXT);
        assert_eq!(
            list.collection_name_type(),
            Some(DataType::Native(NativeType::TimeUuid))
        );
        let map = DataType::map(DataType::Native(NativeType::Int), DataType::TEXT);
        assert_eq!(map.collection_name_type(), Some(DataType::Native(NativeType::Int)));
        assert_eq!(map.frozen().collection_name_type(), None);
    }
}
