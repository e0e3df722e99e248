use crate::binary::error::ParseResult;
use crate::binary::leb128::decode_u32;
use crate::error::{ErrCode, Error, Result};

/// Sequential reader over a borrowed byte stream.
///
/// Reads never advance on failure. Every error carries the absolute offset
/// at which it was detected.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        match self.remaining().first() {
            Some(&byte) => {
                self.pos += 1;
                Ok(byte)
            }
            None => Err(Error::new(ErrCode::EndOfFile).at_offset(self.pos)),
        }
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let rest = self.remaining();
        if rest.len() < count {
            return Err(Error::new(ErrCode::EndOfFile).at_offset(self.pos));
        }
        self.pos += count;
        Ok(&rest[..count])
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.parse(decode_u32)
    }

    /// Run a nom parser over the remaining bytes and advance past what it
    /// consumed.
    pub fn parse<O, P>(&mut self, parser: P) -> Result<O>
    where
        P: FnOnce(&'a [u8]) -> ParseResult<'a, O>,
    {
        let end = self.bytes.len();
        match parser(self.remaining()) {
            Ok((rest, value)) => {
                self.pos = end - rest.len();
                Ok(value)
            }
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(e.into_error(end)),
            Err(nom::Err::Incomplete(_)) => Err(Error::new(ErrCode::EndOfFile).at_offset(end)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::primitives::parse_name;

    #[test]
    fn test_read_byte_advances() {
        let mut cursor = ByteCursor::new(&[0x01, 0x02]);
        assert_eq!(cursor.read_byte().unwrap(), 0x01);
        assert_eq!(cursor.offset(), 1);
        assert_eq!(cursor.read_byte().unwrap(), 0x02);
        assert!(cursor.is_eof());
    }

    #[test]
    fn test_read_byte_at_end_is_eof() {
        let mut cursor = ByteCursor::new(&[0x01]);
        cursor.read_byte().unwrap();
        let err = cursor.read_byte().unwrap_err();
        assert_eq!(err.code(), ErrCode::EndOfFile);
        assert_eq!(err.offset(), Some(1));
        assert_eq!(cursor.offset(), 1);
    }

    #[test]
    fn test_short_read_does_not_advance() {
        let mut cursor = ByteCursor::new(&[0x00, 0x61, 0x73]);
        let err = cursor.read_bytes(4).unwrap_err();
        assert_eq!(err.code(), ErrCode::EndOfFile);
        assert_eq!(cursor.offset(), 0);
        assert_eq!(cursor.read_bytes(3).unwrap(), &[0x00, 0x61, 0x73]);
    }

    #[test]
    fn test_read_u32() {
        let mut cursor = ByteCursor::new(&[0xE5, 0x8E, 0x26, 0x07]);
        assert_eq!(cursor.read_u32().unwrap(), 624485);
        assert_eq!(cursor.offset(), 3);
    }

    #[test]
    fn test_parse_error_offset_is_absolute() {
        let mut cursor = ByteCursor::new(&[0xAA, 0x02, 0xC3, 0x28]);
        cursor.read_byte().unwrap();
        let err = cursor.parse(parse_name).unwrap_err();
        assert_eq!(err.code(), ErrCode::MalformedUtf8);
        assert_eq!(err.offset(), Some(2));
        assert_eq!(cursor.offset(), 1);
    }
}
