//! Line codec for synchronized values.
//!
//! # Wire format
//!
//! One compact JSON object per line:
//!
//! ```text
//! {"N":"BT_Sink_En","C":1,"T":"Bool_t","D":["01"],"B":1,"S":1,"I":4}
//!   │             │     │          │         │     │     └ change count (optional)
//!   │             │     │          │         │     └ sum of raw payload bytes
//!   │             │     │          │         └ C × element size
//!   │             │     │          └ one upper-case hex group per element
//!   │             │     └ element type tag
//!   │             └ element count
//!   └ item name
//! ```
//!
//! Each element is hex-encoded on its own, in memory order. Decoding is
//! strict: every mandatory tag present, lengths consistent, checksum equal.
//! A failing line is dropped by the caller; there is no retry.

use serde::{Deserialize, Serialize};

use crate::element::ElementType;
use crate::error::{DecodeError, EncodeError};

/// A decoded (or to-be-encoded) message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub name: String,
    pub element_type: ElementType,
    pub count: usize,
    /// Raw payload bytes, `count * element_type.size()` long.
    pub payload: Vec<u8>,
    pub change_count: Option<u32>,
}

#[derive(Serialize)]
struct WireOut<'a> {
    #[serde(rename = "N")]
    name: &'a str,
    #[serde(rename = "C")]
    count: usize,
    #[serde(rename = "T")]
    type_tag: &'static str,
    #[serde(rename = "D")]
    data: Vec<String>,
    #[serde(rename = "B")]
    total_bytes: usize,
    #[serde(rename = "S")]
    checksum: u64,
    #[serde(rename = "I", skip_serializing_if = "Option::is_none")]
    change_count: Option<u32>,
}

#[derive(Deserialize)]
struct WireIn {
    #[serde(rename = "N")]
    name: Option<String>,
    #[serde(rename = "C")]
    count: Option<usize>,
    #[serde(rename = "T")]
    type_tag: Option<String>,
    #[serde(rename = "D")]
    data: Option<Vec<String>>,
    #[serde(rename = "B")]
    total_bytes: Option<usize>,
    #[serde(rename = "S")]
    checksum: Option<u64>,
    #[serde(rename = "I")]
    change_count: Option<u32>,
}

/// Unsigned sum of raw payload bytes.
pub fn checksum(payload: &[u8]) -> u64 {
    payload.iter().map(|b| u64::from(*b)).sum()
}

impl Message {
    pub fn new(name: impl Into<String>, element_type: ElementType, count: usize, payload: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            element_type,
            count,
            payload,
            change_count: None,
        }
    }

    pub fn with_change_count(mut self, change_count: u32) -> Self {
        self.change_count = Some(change_count);
        self
    }

    /// Serialize to one line, without the trailing newline.
    pub fn encode(&self) -> Result<String, EncodeError> {
        let size = self.element_type.size();
        if self.count == 0 {
            return Err(EncodeError::EmptyPayload);
        }
        if self.payload.len() != self.count * size {
            return Err(EncodeError::PayloadSize {
                count: self.count,
                size,
                actual: self.payload.len(),
            });
        }

        let wire = WireOut {
            name: &self.name,
            count: self.count,
            type_tag: self.element_type.tag(),
            data: self.payload.chunks_exact(size).map(hex_encode).collect(),
            total_bytes: self.payload.len(),
            checksum: checksum(&self.payload),
            change_count: self.change_count,
        };
        serde_json::to_string(&wire).map_err(|e| EncodeError::Serialize(e.to_string()))
    }

    /// Parse and verify one line.
    pub fn decode(line: &str) -> Result<Message, DecodeError> {
        let wire: WireIn =
            serde_json::from_str(line.trim()).map_err(|e| DecodeError::Malformed(e.to_string()))?;

        let name = wire.name.ok_or(DecodeError::MissingTag("N"))?;
        let count = wire.count.ok_or(DecodeError::MissingTag("C"))?;
        let type_tag = wire.type_tag.ok_or(DecodeError::MissingTag("T"))?;
        let data = wire.data.ok_or(DecodeError::MissingTag("D"))?;
        let declared = wire.total_bytes.ok_or(DecodeError::MissingTag("B"))?;
        let declared_sum = wire.checksum.ok_or(DecodeError::MissingTag("S"))?;

        let element_type =
            ElementType::from_tag(&type_tag).ok_or_else(|| DecodeError::UnknownType(type_tag.clone()))?;
        let size = element_type.size();

        let mut payload = Vec::with_capacity(data.len() * size);
        for (index, group) in data.iter().enumerate() {
            if group.len() != size * 2 {
                return Err(DecodeError::InvalidHex { index });
            }
            hex_decode_into(group, &mut payload).ok_or(DecodeError::InvalidHex { index })?;
        }

        if count == 0 || data.len() != count || count * size != declared || declared != payload.len() {
            return Err(DecodeError::LengthMismatch {
                count,
                declared,
                actual: payload.len(),
            });
        }

        let computed = checksum(&payload);
        if computed != declared_sum {
            return Err(DecodeError::ChecksumMismatch {
                declared: declared_sum,
                computed,
            });
        }

        Ok(Message {
            name,
            element_type,
            count,
            payload,
            change_count: wire.change_count,
        })
    }
}

/// Encode a raw payload as one line.
pub fn encode(name: &str, element_type: ElementType, count: usize, payload: &[u8]) -> Result<String, EncodeError> {
    Message::new(name, element_type, count, payload.to_vec()).encode()
}

/// Decode one line.
pub fn decode(line: &str) -> Result<Message, DecodeError> {
    Message::decode(line)
}

fn hex_encode(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(DIGITS[(b >> 4) as usize] as char);
        out.push(DIGITS[(b & 0x0F) as usize] as char);
    }
    out
}

fn hex_decode_into(text: &str, out: &mut Vec<u8>) -> Option<()> {
    let bytes = text.as_bytes();
    if bytes.len() % 2 != 0 {
        return None;
    }
    for pair in bytes.chunks_exact(2) {
        out.push((nibble(pair[0])? << 4) | nibble(pair[1])?);
    }
    Some(())
}

fn nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_helpers() {
        assert_eq!(hex_encode(&[0x00, 0xAB, 0x0F]), "00AB0F");
        let mut out = Vec::new();
        assert!(hex_decode_into("abCD", &mut out).is_some());
        assert_eq!(out, vec![0xAB, 0xCD]);
        assert!(hex_decode_into("+1", &mut Vec::new()).is_none());
        assert!(hex_decode_into("ABC", &mut Vec::new()).is_none());
    }

    #[test]
    fn test_checksum_is_byte_sum() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[0xFF, 0xFF, 0x02]), 512);
    }

    #[test]
    fn test_encode_rejects_bad_payload() {
        assert_eq!(
            encode("x", ElementType::Int16, 2, &[1, 2, 3]),
            Err(EncodeError::PayloadSize { count: 2, size: 2, actual: 3 })
        );
        assert_eq!(encode("x", ElementType::Bool, 0, &[]), Err(EncodeError::EmptyPayload));
    }
}
