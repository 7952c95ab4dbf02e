//! Value comparison and formatting for serialized column values, plus the
//! composite cell-name codec.

pub mod composite;

pub use composite::{Composite, compare_composites, decode_composite, encode_composite};

use std::cmp::Ordering;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::types::{DataType, NativeType};

/// Compare two serialized values of type `ty`.
///
/// Empty values sort before every non-empty value. `Reversed` inverts the
/// ordering of its inner type.
pub fn compare_values(ty: &DataType, a: &[u8], b: &[u8]) -> Ordering {
    if let DataType::Reversed(inner) = ty {
        return compare_values(inner, b, a);
    }
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }
    match ty {
        DataType::Native(native) => compare_native(*native, a, b),
        // Frozen collections and collection payloads compare by their bytes.
        _ => a.cmp(b),
    }
}

fn compare_native(native: NativeType, a: &[u8], b: &[u8]) -> Ordering {
    match native {
        NativeType::Int => match (as_i32(a), as_i32(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => a.cmp(b),
        },
        NativeType::BigInt | NativeType::Counter | NativeType::Timestamp => {
            match (as_i64(a), as_i64(b)) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => a.cmp(b),
            }
        }
        NativeType::Double => match (<[u8; 8]>::try_from(a), <[u8; 8]>::try_from(b)) {
            (Ok(x), Ok(y)) => f64::from_be_bytes(x).total_cmp(&f64::from_be_bytes(y)),
            _ => a.cmp(b),
        },
        NativeType::Float => match (<[u8; 4]>::try_from(a), <[u8; 4]>::try_from(b)) {
            (Ok(x), Ok(y)) => f32::from_be_bytes(x).total_cmp(&f32::from_be_bytes(y)),
            _ => a.cmp(b),
        },
        NativeType::VarInt => compare_varint(a, b),
        NativeType::Decimal => compare_decimal(a, b),
        NativeType::TimeUuid => timeuuid_timestamp(a)
            .zip(timeuuid_timestamp(b))
            .map(|(x, y)| x.cmp(&y))
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.cmp(b)),
        NativeType::Ascii
        | NativeType::Text
        | NativeType::Blob
        | NativeType::Boolean
        | NativeType::Inet
        | NativeType::Uuid => a.cmp(b),
    }
}

fn as_i32(bytes: &[u8]) -> Option<i32> {
    bytes.try_into().ok().map(i32::from_be_bytes)
}

fn as_i64(bytes: &[u8]) -> Option<i64> {
    bytes.try_into().ok().map(i64::from_be_bytes)
}

/// Compare two big-endian two's complement integers of arbitrary width.
fn compare_varint(a: &[u8], b: &[u8]) -> Ordering {
    let a_neg = a[0] & 0x80 != 0;
    let b_neg = b[0] & 0x80 != 0;
    if a_neg != b_neg {
        return if a_neg {
            Ordering::Less
        } else {
            Ordering::Greater
        };
    }
    let a = strip_sign_extension(a, a_neg);
    let b = strip_sign_extension(b, b_neg);
    // Same sign: a longer magnitude is larger for positives, smaller for negatives.
    let by_len = a.len().cmp(&b.len());
    let by_len = if a_neg { by_len.reverse() } else { by_len };
    by_len.then_with(|| a.cmp(b))
}

fn strip_sign_extension(bytes: &[u8], negative: bool) -> &[u8] {
    let pad = if negative { 0xff } else { 0x00 };
    let mut start = 0;
    while start + 1 < bytes.len()
        && bytes[start] == pad
        && (bytes[start + 1] & 0x80 != 0) == negative
    {
        start += 1;
    }
    &bytes[start..]
}

fn varint_to_i128(bytes: &[u8]) -> Option<i128> {
    if bytes.is_empty() || bytes.len() > 16 {
        return None;
    }
    let fill = if bytes[0] & 0x80 != 0 { 0xff } else { 0x00 };
    let mut buf = [fill; 16];
    buf[16 - bytes.len()..].copy_from_slice(bytes);
    Some(i128::from_be_bytes(buf))
}

/// Decimals are a 4-byte scale followed by a varint unscaled value.
fn decode_decimal(bytes: &[u8]) -> Option<(i32, i128)> {
    if bytes.len() < 5 {
        return None;
    }
    let scale = i32::from_be_bytes(bytes[..4].try_into().ok()?);
    Some((scale, varint_to_i128(&bytes[4..])?))
}

fn compare_decimal(a: &[u8], b: &[u8]) -> Ordering {
    let (Some((sa, ua)), Some((sb, ub))) = (decode_decimal(a), decode_decimal(b)) else {
        return a.cmp(b);
    };
    // Bring both to the larger scale; fall back to bytes on overflow.
    let target = sa.max(sb);
    let rescale = |unscaled: i128, scale: i32| {
        let shift = u32::try_from(target - scale).ok()?;
        10i128.checked_pow(shift)?.checked_mul(unscaled)
    };
    match (rescale(ua, sa), rescale(ub, sb)) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

/// Extract the 60-bit timestamp of a version 1 uuid.
fn timeuuid_timestamp(bytes: &[u8]) -> Option<u64> {
    if bytes.len() != 16 {
        return None;
    }
    let time_low = u64::from(u32::from_be_bytes(bytes[0..4].try_into().ok()?));
    let time_mid = u64::from(u16::from_be_bytes(bytes[4..6].try_into().ok()?));
    let time_hi = u64::from(u16::from_be_bytes(bytes[6..8].try_into().ok()?) & 0x0fff);
    Some((time_hi << 48) | (time_mid << 32) | time_low)
}

/// Render a serialized value for diagnostics.
pub fn display_value(ty: &DataType, bytes: &[u8]) -> String {
    match ty.base() {
        DataType::Native(native) => display_native(*native, bytes),
        _ => hex(bytes),
    }
}

fn display_native(native: NativeType, bytes: &[u8]) -> String {
    if bytes.is_empty() && native != NativeType::Text && native != NativeType::Ascii {
        return String::new();
    }
    let rendered = match native {
        NativeType::Ascii | NativeType::Text => {
            std::str::from_utf8(bytes).ok().map(str::to_string)
        }
        NativeType::Int => as_i32(bytes).map(|v| v.to_string()),
        NativeType::BigInt | NativeType::Counter | NativeType::Timestamp => {
            as_i64(bytes).map(|v| v.to_string())
        }
        NativeType::Double => <[u8; 8]>::try_from(bytes)
            .ok()
            .map(|b| f64::from_be_bytes(b).to_string()),
        NativeType::Float => <[u8; 4]>::try_from(bytes)
            .ok()
            .map(|b| f32::from_be_bytes(b).to_string()),
        NativeType::Boolean => Some((bytes[0] != 0).to_string()),
        NativeType::Uuid | NativeType::TimeUuid => {
            uuid::Uuid::from_slice(bytes).ok().map(|u| u.to_string())
        }
        NativeType::Inet => match bytes.len() {
            4 => <[u8; 4]>::try_from(bytes)
                .ok()
                .map(|b| IpAddr::V4(Ipv4Addr::from(b)).to_string()),
            16 => <[u8; 16]>::try_from(bytes)
                .ok()
                .map(|b| IpAddr::V6(Ipv6Addr::from(b)).to_string()),
            _ => None,
        },
        NativeType::VarInt => varint_to_i128(bytes).map(|v| v.to_string()),
        NativeType::Decimal => decode_decimal(bytes).map(|(scale, unscaled)| {
            if scale == 0 {
                unscaled.to_string()
            } else {
                format!("{unscaled}E{}", -i64::from(scale))
            }
        }),
        NativeType::Blob => None,
    };
    rendered.unwrap_or_else(|| hex(bytes))
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
