//! LEB128 unsigned varint encode/decode for dictionary entry framing.

/// Upper bound on the encoded length of a `u64` in this scheme: ceil(64/7).
pub const MAX_ENCODED_LEN: usize = 10;

/// Encode `value` into `out`, returning the number of bytes written.
///
/// Panics if `out` is shorter than the encoding requires (at most
/// [`MAX_ENCODED_LEN`] bytes, so callers should size scratch buffers to that).
pub fn encode(mut value: u64, out: &mut [u8]) -> usize {
    let mut i = 0;
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out[i] = byte;
        i += 1;
        if value == 0 {
            break;
        }
    }
    i
}

/// Errors produced while decoding a varint from a byte slice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// The slice ended before a terminating (high-bit-clear) byte was found.
    Truncated,
    /// More than [`MAX_ENCODED_LEN`] continuation bytes were seen without terminating.
    Overlong,
}

impl core::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DecodeError::Truncated => write!(f, "varint truncated before terminating byte"),
            DecodeError::Overlong => write!(f, "varint exceeded maximum encoded length"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

/// Decode a `u64` from the front of `bytes`, returning the value and the
/// number of bytes consumed.
pub fn decode(bytes: &[u8]) -> Result<(u64, usize), DecodeError> {
    let mut value: u64 = 0;
    for (i, &byte) in bytes.iter().enumerate() {
        if i >= MAX_ENCODED_LEN {
            return Err(DecodeError::Overlong);
        }
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(DecodeError::Truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_small_and_large() {
        for value in [0u64, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
            let mut buf = [0u8; MAX_ENCODED_LEN];
            let n = encode(value, &mut buf);
            let (decoded, used) = decode(&buf[..n]).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(used, n);
        }
    }

    #[test]
    fn truncated_is_reported() {
        let buf = [0x80u8];
        assert_eq!(decode(&buf), Err(DecodeError::Truncated));
    }

    #[test]
    fn decode_ignores_trailing_bytes() {
        let mut buf = [0u8; MAX_ENCODED_LEN + 4];
        let n = encode(300, &mut buf);
        buf[n] = 0xff;
        let (value, used) = decode(&buf).unwrap();
        assert_eq!(value, 300);
        assert_eq!(used, n);
    }
}
