//! TCAP envelope scanning shared by the CAP, INAP and MAP decoders
//!
//! These are byte-pattern heuristics over the BER encoding, not a full
//! ASN.1 parser. Every scan is bounds-checked and simply reports nothing
//! when the pattern is absent.

use crate::bcd::decode_bcd;
use sigmon_core::Direction;

/// Shortest payload either TCAP decoder will look at
pub const MIN_TCAP_LEN: usize = 10;

const TAG_INVOKE: u8 = 0xa1;
const TAG_RETURN_ERROR: u8 = 0xa3;
const TAG_INTEGER: u8 = 0x02;

/// TCAP message kind from the first byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcapKind {
    Begin,
    Continue,
    End,
    Abort,
    Unknown,
}

impl TcapKind {
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            0x62 => TcapKind::Begin,
            0x65 => TcapKind::Continue,
            0x64 => TcapKind::End,
            0x67 => TcapKind::Abort,
            _ => TcapKind::Unknown,
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            TcapKind::Begin => "Begin",
            TcapKind::Continue => "Continue",
            TcapKind::End => "End",
            TcapKind::Abort => "Abort",
            TcapKind::Unknown => "Unknown",
        }
    }

    /// Begin/Continue open or carry a dialogue; End/Abort close it
    pub fn direction(&self) -> Direction {
        match self {
            TcapKind::Begin | TcapKind::Continue => Direction::Request,
            TcapKind::End | TcapKind::Abort => Direction::Response,
            TcapKind::Unknown => Direction::Unknown,
        }
    }
}

/// At least two bytes and a known TCAP message tag
pub fn is_tcap(payload: &[u8]) -> bool {
    payload.len() >= 2 && TcapKind::from_tag(payload[0]) != TcapKind::Unknown
}

/// Location of the first invoke component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invoke {
    /// Offset of the 0xa1 tag
    pub offset: usize,
    pub opcode: u8,
}

/// First 0xa1 whose third byte is an INTEGER tag; the opcode sits two bytes on
pub fn find_invoke(data: &[u8]) -> Option<Invoke> {
    let end = data.len().saturating_sub(5);
    (0..end)
        .find(|&i| data[i] == TAG_INVOKE && data[i + 2] == TAG_INTEGER)
        .map(|offset| Invoke {
            offset,
            opcode: data[offset + 4],
        })
}

/// First `0x80` primitive of at most four bytes, read big-endian
pub fn find_service_key(data: &[u8]) -> Option<u32> {
    let end = data.len().saturating_sub(3);
    (0..end).find_map(|i| {
        if data[i] != 0x80 || data[i + 1] > 4 {
            return None;
        }
        let value = data.get(i + 2..i + 2 + usize::from(data[i + 1]))?;
        Some(value.iter().fold(0u32, |key, b| (key << 8) | u32::from(*b)))
    })
}

/// First `0x80`/`0x04` primitive of 7-8 bytes that decodes to 15 digits
pub fn find_imsi(data: &[u8]) -> Option<String> {
    scan_digits(data, &[0x80, 0x04], 7..=8, 15..=15)
}

/// First `0x81` primitive of 6-10 bytes that decodes to 10-15 digits
pub fn find_msisdn(data: &[u8]) -> Option<String> {
    scan_digits(data, &[0x81], 6..=10, 10..=15)
}

/// First primitive with `tag` of 6-15 bytes, as digits (INAP party numbers)
pub fn find_party_number(data: &[u8], tag: u8) -> Option<String> {
    scan_digits(data, &[tag], 6..=15, 1..=30)
}

fn scan_digits(
    data: &[u8],
    tags: &[u8],
    lengths: std::ops::RangeInclusive<u8>,
    digits: std::ops::RangeInclusive<usize>,
) -> Option<String> {
    let end = data.len().saturating_sub(10);
    (0..end).find_map(|i| {
        if !tags.contains(&data[i]) || !lengths.contains(&data[i + 1]) {
            return None;
        }
        let value = data.get(i + 2..i + 2 + usize::from(data[i + 1]))?;
        let decoded = decode_bcd(value);
        digits.contains(&decoded.len()).then_some(decoded)
    })
}

/// Error code of the first ReturnError component
///
/// Layout: `a3 len 02 L <invoke-id...> 02 01 <code>`.
pub fn find_return_error(data: &[u8]) -> Option<u8> {
    (0..data.len()).find_map(|j| {
        if data[j] != TAG_RETURN_ERROR || *data.get(j + 2)? != TAG_INTEGER {
            return None;
        }
        let k = j + 4 + usize::from(*data.get(j + 3)?);
        match data.get(k..k + 3)? {
            [TAG_INTEGER, 0x01, code] => Some(*code),
            _ => None,
        }
    })
}
