//! Per-document ranking features and their blob encoding.
//!
//! A blob holds only the element list; the document id and the capped
//! counts live in the posting record that references the blob.
//!
//! ```text
//! varint element_count
//! per element:
//!   varint element_id
//!   varint zigzag(weight)
//!   varint element_len
//!   varint position_count
//!   varint position deltas
//! ```

use crate::index::types::DocId;
use crate::utils::{decode_varint, delta_decode, delta_encode, encode_varint, zigzag_decode, zigzag_encode};

/// Occurrences of a word inside one element (array item, sub-field) of a field
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WordDocElementFeatures {
    pub element_id: u32,
    pub weight: i32,
    pub element_len: u32,
    /// Ascending word positions inside the element
    pub positions: Vec<u32>,
}

impl WordDocElementFeatures {
    pub fn new(element_id: u32) -> Self {
        Self {
            element_id,
            weight: 1,
            ..Default::default()
        }
    }
}

/// Everything the inserter stores for one (word, document) pair
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocIdAndFeatures {
    pub doc_id: DocId,
    pub elements: Vec<WordDocElementFeatures>,
    /// Occurrences of the word in the field
    pub num_occs: u32,
    /// Number of words in the field
    pub field_length: u32,
}

impl DocIdAndFeatures {
    pub fn new(doc_id: DocId) -> Self {
        Self {
            doc_id,
            ..Default::default()
        }
    }

    /// Features of a single-element field with the given word positions
    pub fn with_positions(doc_id: DocId, positions: Vec<u32>, field_length: u32) -> Self {
        let num_occs = positions.len() as u32;
        Self {
            doc_id,
            elements: vec![WordDocElementFeatures {
                element_id: 0,
                weight: 1,
                element_len: field_length,
                positions,
            }],
            num_occs,
            field_length,
        }
    }
}

/// Append the blob encoding of `features` to `buf`
pub fn encode_features(features: &DocIdAndFeatures, buf: &mut Vec<u8>) {
    encode_varint(features.elements.len() as u32, buf);
    for element in &features.elements {
        encode_varint(element.element_id, buf);
        encode_varint(zigzag_encode(element.weight), buf);
        encode_varint(element.element_len, buf);
        encode_varint(element.positions.len() as u32, buf);
        delta_encode(&element.positions, buf);
    }
}

/// Decode a feature blob. Returns None for truncated or malformed input.
pub fn decode_features(buf: &[u8]) -> Option<Vec<WordDocElementFeatures>> {
    let mut pos = 0;
    let count = read_varint(buf, &mut pos)? as usize;
    // an element takes at least four bytes
    let mut elements = Vec::with_capacity(count.min(buf.len() / 4));
    for _ in 0..count {
        let element_id = read_varint(buf, &mut pos)?;
        let weight = zigzag_decode(read_varint(buf, &mut pos)?);
        let element_len = read_varint(buf, &mut pos)?;
        let num_positions = read_varint(buf, &mut pos)? as usize;
        let (positions, consumed) = delta_decode(&buf[pos..], num_positions)?;
        pos += consumed;
        elements.push(WordDocElementFeatures {
            element_id,
            weight,
            element_len,
            positions,
        });
    }
    Some(elements)
}

#[inline]
fn read_varint(buf: &[u8], pos: &mut usize) -> Option<u32> {
    let (value, consumed) = decode_varint(&buf[*pos..])?;
    *pos += consumed;
    Some(value)
}
