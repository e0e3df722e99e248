use nom::bytes::complete::take;

use crate::binary::error::{fail, ParseResult};
use crate::binary::leb128::decode_u32;
use crate::error::ErrCode;

type Input<'a> = &'a [u8];

pub const MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6D];
pub const VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

/// Take exactly `count` bytes
pub fn take_bytes(input: Input, count: usize) -> ParseResult<'_, Input<'_>> {
    take(count)(input)
}

pub fn parse_byte(input: Input) -> ParseResult<'_, u8> {
    let (remaining, bytes) = take_bytes(input, 1)?;
    Ok((remaining, bytes[0]))
}

pub fn parse_u32(input: Input) -> ParseResult<'_, u32> {
    decode_u32(input)
}

/// Parse a name: length:u32 followed by that many UTF-8 bytes
pub fn parse_name(input: Input) -> ParseResult<'_, String> {
    let (remaining, length) = parse_u32(input)?;
    let (rest, bytes) = take_bytes(remaining, length as usize)?;

    match std::str::from_utf8(bytes) {
        Ok(s) => Ok((rest, s.to_string())),
        Err(_) => fail(ErrCode::MalformedUtf8, remaining),
    }
}

/// Parse a vector: length:u32 followed by that many elements
pub fn parse_vec<'a, T, F>(input: Input<'a>, mut parser: F) -> ParseResult<'a, Vec<T>>
where
    F: FnMut(Input<'a>) -> ParseResult<'a, T>,
{
    let (mut remaining, length) = parse_u32(input)?;
    // every element takes at least one byte
    let mut elements = Vec::with_capacity((length as usize).min(remaining.len()));

    for _ in 0..length {
        let (rest, element) = parser(remaining)?;
        elements.push(element);
        remaining = rest;
    }

    Ok((remaining, elements))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_byte() {
        let input = [0x42, 0xFF];
        let (remaining, byte) = parse_byte(&input).unwrap();
        assert_eq!(byte, 0x42);
        assert_eq!(remaining, &[0xFFu8]);
    }

    #[test]
    fn test_parse_byte_empty_is_eof() {
        let err = parse_byte(&[]).unwrap_err();
        assert!(matches!(err, nom::Err::Error(e) if e.code == ErrCode::EndOfFile));
    }

    #[test]
    fn test_parse_name() {
        let input = [0x03, 0x41, 0x42, 0x43, 0xFF];
        let (remaining, name) = parse_name(&input).unwrap();
        assert_eq!(name, "ABC");
        assert_eq!(remaining, &[0xFFu8]);
    }

    #[test]
    fn test_parse_name_invalid_utf8() {
        let input = [0x02, 0xC3, 0x28];
        let err = parse_name(&input).unwrap_err();
        assert!(matches!(err, nom::Err::Error(e) if e.code == ErrCode::MalformedUtf8 && e.remaining == 2));
    }

    #[test]
    fn test_parse_name_truncated() {
        let input = [0x05, 0x41];
        let err = parse_name(&input).unwrap_err();
        assert!(matches!(err, nom::Err::Error(e) if e.code == ErrCode::EndOfFile));
    }

    #[test]
    fn test_parse_vec_huge_length_does_not_preallocate() {
        // length 0xFFFFFFFF with a single element present
        let input = [0xFF, 0xFF, 0xFF, 0xFF, 0x0F, 0x01];
        assert!(parse_vec(&input, parse_byte).is_err());
    }
}
