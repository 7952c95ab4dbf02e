use std::cmp::Ordering;

use crate::error::EncodingError;
use crate::types::DataType;

use super::compare_values;

/// Header marking a static cell name. Lengths never reach `0xFFFF`, so the
/// marker cannot be confused with a component length.
pub const STATIC_MARKER: [u8; 2] = [0xff, 0xff];

/// Largest encodable component.
pub const MAX_COMPONENT_SIZE: usize = 0xfffe;

/// End-of-component byte written after every component.
const EOC: u8 = 0x00;

/// A decoded composite: its components and whether it carried the static marker.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Composite {
    pub components: Vec<Vec<u8>>,
    pub is_static: bool,
}

/// Encode components into a composite.
///
/// Format: `[0xFFFF if static]` then, per component,
/// `[u16 big-endian length][bytes][end-of-component]`.
pub fn encode_composite<C: AsRef<[u8]>>(
    components: &[C],
    is_static: bool,
) -> Result<Vec<u8>, EncodingError> {
    let size: usize = components.iter().map(|c| c.as_ref().len() + 3).sum();
    let mut out = Vec::with_capacity(size + 2);
    if is_static {
        out.extend_from_slice(&STATIC_MARKER);
    }
    for component in components {
        let bytes = component.as_ref();
        if bytes.len() > MAX_COMPONENT_SIZE {
            return Err(EncodingError::ComponentTooLarge {
                max: MAX_COMPONENT_SIZE,
                actual: bytes.len(),
            });
        }
        out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
        out.extend_from_slice(bytes);
        out.push(EOC);
    }
    Ok(out)
}

/// Decode a composite produced by [`encode_composite`].
pub fn decode_composite(data: &[u8]) -> Result<Composite, EncodingError> {
    let mut offset = 0;
    let is_static = data.starts_with(&STATIC_MARKER);
    if is_static {
        offset = 2;
    }

    let mut components = Vec::new();
    while offset < data.len() {
        if offset + 2 > data.len() {
            return Err(EncodingError::MalformedComposite);
        }
        let len = u16::from_be_bytes([data[offset], data[offset + 1]]) as usize;
        offset += 2;
        if offset + len + 1 > data.len() {
            return Err(EncodingError::MalformedComposite);
        }
        components.push(data[offset..offset + len].to_vec());
        offset += len + 1;
    }

    Ok(Composite {
        components,
        is_static,
    })
}

/// Compare two encoded composites component-by-component.
///
/// Static composites sort before all others. Components beyond `types` are
/// compared as raw bytes. A strict prefix sorts before its extensions.
pub fn compare_composites(types: &[DataType], a: &[u8], b: &[u8]) -> Ordering {
    let (ca, cb) = match (decode_composite(a), decode_composite(b)) {
        (Ok(ca), Ok(cb)) => (ca, cb),
        _ => return a.cmp(b),
    };
    match (ca.is_static, cb.is_static) {
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }
    for (i, (x, y)) in ca.components.iter().zip(&cb.components).enumerate() {
        let ord = match types.get(i) {
            Some(ty) => compare_values(ty, x, y),
            None => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    ca.components.len().cmp(&cb.components.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NativeType;

    #[test]
    fn test_composite_roundtrip_with_static_marker() {
        let encoded = encode_composite(&[b"a".as_slice(), b"".as_slice()], true).unwrap();
        assert!(encoded.starts_with(&STATIC_MARKER));
        let decoded = decode_composite(&encoded).unwrap();
        assert!(decoded.is_static);
        assert_eq!(decoded.components, vec![b"a".to_vec(), Vec::new()]);
    }

    #[test]
    fn test_composite_ordering_uses_component_types() {
        let types = vec![DataType::Native(NativeType::Int), DataType::TEXT];
        let a = encode_composite(&[(-1i32).to_be_bytes().to_vec(), b"z".to_vec()], false).unwrap();
        let b = encode_composite(&[2i32.to_be_bytes().to_vec(), b"a".to_vec()], false).unwrap();
        // Raw bytes would put -1 (0xffffffff) after 2.
        assert!(a > b);
        assert_eq!(compare_composites(&types, &a, &b), Ordering::Less);
    }

    #[test]
    fn test_prefix_sorts_first_and_static_before_all() {
        let types = vec![DataType::TEXT, DataType::TEXT];
        let prefix = encode_composite(&[b"k"], false).unwrap();
        let full = encode_composite(&[b"k", b"v"], false).unwrap();
        let stat = encode_composite(&[b"zzz"], true).unwrap();
        assert_eq!(compare_composites(&types, &prefix, &full), Ordering::Less);
        assert_eq!(compare_composites(&types, &stat, &prefix), Ordering::Less);
    }

    #[test]
    fn test_truncated_composite_is_rejected() {
        let mut encoded = encode_composite(&[b"abc"], false).unwrap();
        encoded.truncate(encoded.len() - 2);
        assert_eq!(
            decode_composite(&encoded),
            Err(EncodingError::MalformedComposite)
        );
    }

    #[test]
    fn test_oversized_component() {
        let big = vec![0u8; MAX_COMPONENT_SIZE + 1];
        assert!(matches!(
            encode_composite(&[big], false),
            Err(EncodingError::ComponentTooLarge { .. })
        ));
    }
}
