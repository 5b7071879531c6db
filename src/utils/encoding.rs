/// Encode a u32 as a variable-length integer
pub fn encode_varint(mut value: u32, buf: &mut Vec<u8>) {
    loop {
        if value < 0x80 {
            buf.push(value as u8);
            break;
        }
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
}

/// Decode a variable-length integer from a slice
/// Returns (value, bytes_consumed)
pub fn decode_varint(buf: &[u8]) -> Option<(u32, usize)> {
    let mut result: u32 = 0;
    let mut shift = 0;

    for (i, &byte) in buf.iter().enumerate() {
        if shift >= 32 {
            return None; // Overflow
        }

        result |= ((byte & 0x7F) as u32) << shift;

        if byte & 0x80 == 0 {
            return Some((result, i + 1));
        }

        shift += 7;
    }

    None // Incomplete
}

/// Map a signed value to unsigned so small magnitudes stay short as varints
#[inline]
pub fn zigzag_encode(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

#[inline]
pub fn zigzag_decode(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

/// Delta-encode an ascending list of u32s. Panics if the list descends.
pub fn delta_encode(values: &[u32], buf: &mut Vec<u8>) {
    let mut prev = 0u32;
    for &value in values {
        let delta = match value.checked_sub(prev) {
            Some(delta) => delta,
            None => panic!("delta_encode input not ascending: {} after {}", value, prev),
        };
        encode_varint(delta, buf);
        prev = value;
    }
}

/// Delta-decode exactly `count` values
/// Returns (values, bytes_consumed), or None on truncated or overflowing input
pub fn delta_decode(buf: &[u8], count: usize) -> Option<(Vec<u32>, usize)> {
    // every value takes at least one byte
    if count > buf.len() {
        return None;
    }
    let mut result = Vec::with_capacity(count);
    let mut prev = 0u32;
    let mut pos = 0;

    for _ in 0..count {
        let (delta, consumed) = decode_varint(&buf[pos..])?;
        prev = prev.checked_add(delta)?;
        result.push(prev);
        pos += consumed;
    }

    Some((result, pos))
}
