use crate::binary::error::{fail, ParseResult};
use crate::error::ErrCode;

type Input<'a> = &'a [u8];

/// Decode an unsigned LEB128 integer of at most `bits` bits.
fn decode_unsigned(input: Input, bits: u32) -> ParseResult<'_, u64> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    let mut remaining = input;

    loop {
        let Some((&byte, rest)) = remaining.split_first() else {
            return fail(ErrCode::EndOfFile, remaining);
        };

        let value = (byte & 0x7F) as u64;
        if shift + 7 > bits && value >> (bits - shift) != 0 {
            // unused bits of the final byte must be zero
            return fail(ErrCode::IntegerTooLarge, input);
        }
        result |= value << shift;
        remaining = rest;

        if byte & 0x80 == 0 {
            return Ok((remaining, result));
        }

        shift += 7;
        if shift >= bits {
            return fail(ErrCode::IntegerTooLarge, input);
        }
    }
}

/// Decode a signed LEB128 integer of at most `bits` bits.
fn decode_signed(input: Input, bits: u32) -> ParseResult<'_, i64> {
    let mut result: i64 = 0;
    let mut shift: u32 = 0;
    let mut remaining = input;

    loop {
        let Some((&byte, rest)) = remaining.split_first() else {
            return fail(ErrCode::EndOfFile, remaining);
        };
        remaining = rest;

        let value = (byte & 0x7F) as i64;
        let last = byte & 0x80 == 0;

        if shift + 7 > bits {
            // the remaining bits of the final byte must all equal the sign bit
            let used = bits - shift;
            let sign_and_unused = value >> (used - 1);
            if !last || (sign_and_unused != 0 && sign_and_unused != (0x7F >> (used - 1))) {
                return fail(ErrCode::IntegerTooLarge, input);
            }
        }

        result |= value << shift;
        shift += 7;

        if last {
            if shift < 64 && byte & 0x40 != 0 {
                result |= -1i64 << shift;
            }
            return Ok((remaining, result));
        }

        if shift >= bits {
            return fail(ErrCode::IntegerTooLarge, input);
        }
    }
}

pub fn decode_u32(input: Input) -> ParseResult<'_, u32> {
    let (remaining, value) = decode_unsigned(input, 32)?;
    Ok((remaining, value as u32))
}

pub fn decode_i32(input: Input) -> ParseResult<'_, i32> {
    let (remaining, value) = decode_signed(input, 32)?;
    Ok((remaining, value as i32))
}

pub fn decode_i64(input: Input) -> ParseResult<'_, i64> {
    decode_signed(input, 64)
}

#[cfg(test)]
pub(crate) fn encode_u32(value: u32) -> Vec<u8> {
    let mut result = Vec::new();
    let mut v = value;

    loop {
        let mut byte = (v & 0x7F) as u8;
        v >>= 7;

        if v == 0 {
            result.push(byte);
            break;
        } else {
            byte |= 0x80;
            result.push(byte);
        }
    }

    result
}

#[cfg(test)]
pub(crate) fn encode_i64(value: i64) -> Vec<u8> {
    let mut result = Vec::new();
    let mut v = value;

    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;

        if (v == 0 && (byte & 0x40) == 0) || (v == -1 && (byte & 0x40) != 0) {
            result.push(byte);
            break;
        } else {
            result.push(byte | 0x80);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_u32_zero() {
        let input = [0x00];
        let (remaining, value) = decode_u32(&input).unwrap();
        assert_eq!(value, 0);
        assert_eq!(remaining.len(), 0);
    }

    #[test]
    fn test_decode_u32_two_bytes() {
        let input = [0x80, 0x01, 0xFF];
        let (remaining, value) = decode_u32(&input).unwrap();
        assert_eq!(value, 128);
        assert_eq!(remaining, &[0xFFu8]);
    }

    #[test]
    fn test_decode_u32_max() {
        let input = [0xFF, 0xFF, 0xFF, 0xFF, 0x0F];
        let (remaining, value) = decode_u32(&input).unwrap();
        assert_eq!(value, u32::MAX);
        assert_eq!(remaining.len(), 0);
    }

    #[test]
    fn test_decode_u32_unused_bits_set() {
        let input = [0xFF, 0xFF, 0xFF, 0xFF, 0x1F];
        let err = decode_u32(&input).unwrap_err();
        assert!(matches!(err, nom::Err::Error(e) if e.code == ErrCode::IntegerTooLarge));
    }

    #[test]
    fn test_decode_u32_incomplete() {
        let input = [0x80];
        let err = decode_u32(&input).unwrap_err();
        assert!(matches!(err, nom::Err::Error(e) if e.code == ErrCode::EndOfFile && e.remaining == 0));
    }

    #[test]
    fn test_decode_u32_too_long() {
        let input = [0x80, 0x80, 0x80, 0x80, 0x80, 0x00];
        let err = decode_u32(&input).unwrap_err();
        assert!(matches!(err, nom::Err::Error(e) if e.code == ErrCode::IntegerTooLarge));
    }

    #[test]
    fn test_decode_i32_negative() {
        let input = [0x7E];
        let (_, value) = decode_i32(&input).unwrap();
        assert_eq!(value, -2);
    }

    #[test]
    fn test_decode_i32_extremes() {
        let (_, min) = decode_i32(&[0x80, 0x80, 0x80, 0x80, 0x78]).unwrap();
        assert_eq!(min, i32::MIN);
        let (_, max) = decode_i32(&[0xFF, 0xFF, 0xFF, 0xFF, 0x07]).unwrap();
        assert_eq!(max, i32::MAX);
    }

    #[test]
    fn test_decode_i32_overflowing_final_byte() {
        let input = [0xFF, 0xFF, 0xFF, 0xFF, 0x4F];
        assert!(decode_i32(&input).is_err());
    }

    #[test]
    fn test_decode_i64_extremes() {
        let bytes = encode_i64(i64::MIN);
        let (rest, min) = decode_i64(&bytes).unwrap();
        assert_eq!(min, i64::MIN);
        assert!(rest.is_empty());
        let bytes = encode_i64(i64::MAX);
        let (rest, max) = decode_i64(&bytes).unwrap();
        assert_eq!(max, i64::MAX);
        assert!(rest.is_empty());
        let (_, neg) = decode_i64(&[0x40]).unwrap();
        assert_eq!(neg, -64);
    }

    #[test]
    fn test_encode_u32() {
        assert_eq!(encode_u32(0), [0x00]);
        assert_eq!(encode_u32(128), [0x80, 0x01]);
        assert_eq!(encode_u32(u32::MAX), [0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
    }
}
