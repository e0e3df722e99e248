use nom::error::{ErrorKind, ParseError};
use nom::IResult;

use crate::error::{ErrCode, Error, NodeAttr};

pub type ParseResult<'a, O> = IResult<&'a [u8], O, BinaryError>;

/// Error produced inside the nom section parsers.
///
/// Only the length of the unconsumed input is kept, the cursor that ran the
/// parser turns it back into an absolute offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryError {
    pub code: ErrCode,
    pub remaining: usize,
    pub node: Option<NodeAttr>,
}

impl BinaryError {
    pub fn new(code: ErrCode, input: &[u8]) -> Self {
        Self {
            code,
            remaining: input.len(),
            node: None,
        }
    }

    pub fn in_node(mut self, node: NodeAttr) -> Self {
        if self.node.is_none() {
            self.node = Some(node);
        }
        self
    }

    /// Convert into a crate error given the absolute offset of the end of the
    /// input the failing parser was run on.
    pub fn into_error(self, end: usize) -> Error {
        let err = Error::new(self.code).at_offset(end.saturating_sub(self.remaining));
        match self.node {
            Some(node) => err.with_ast(node),
            None => err,
        }
    }
}

impl<'a> ParseError<&'a [u8]> for BinaryError {
    fn from_error_kind(input: &'a [u8], kind: ErrorKind) -> Self {
        let code = match kind {
            ErrorKind::Eof => ErrCode::EndOfFile,
            ErrorKind::TooLarge => ErrCode::IntegerTooLarge,
            _ => ErrCode::InvalidGrammar,
        };
        BinaryError::new(code, input)
    }

    fn append(_input: &'a [u8], _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

/// Fail a parser with the given code at `input`.
pub fn fail<O>(code: ErrCode, input: &[u8]) -> ParseResult<'_, O> {
    Err(nom::Err::Error(BinaryError::new(code, input)))
}

/// Tag the error of `parser` with the AST node it was decoding.
pub fn in_node<'a, O, P>(node: NodeAttr, mut parser: P) -> impl FnMut(&'a [u8]) -> ParseResult<'a, O>
where
    P: FnMut(&'a [u8]) -> ParseResult<'a, O>,
{
    move |input: &'a [u8]| {
        parser(input).map_err(|err| err.map(|e| e.in_node(node)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub offset: usize,
    pub length: usize,
}

impl SourceLocation {
    pub fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }

    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.offset && offset < self.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located<T> {
    pub value: T,
    pub location: SourceLocation,
}

impl<T> Located<T> {
    pub fn new(value: T, location: SourceLocation) -> Self {
        Self { value, location }
    }

    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}
