use std::fmt;

use crate::binary::sections::SectionKind;

/// Root cause of a load or link failure.
///
/// The code is fixed when the error is created; every frame it passes through
/// only appends context to the trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ErrCode {
    #[error("unexpected end of input")]
    EndOfFile,
    #[error("invalid grammar")]
    InvalidGrammar,
    #[error("integer representation too long")]
    IntegerTooLarge,
    #[error("malformed UTF-8 encoding")]
    MalformedUtf8,
    #[error("section size mismatch")]
    SectionSizeMismatch,
    #[error("unexpected section")]
    UnexpectedSection,
    #[error("invalid global index")]
    InvalidGlobalIdx,
    #[error("invalid memory index")]
    InvalidMemoryIdx,
}

/// Kind of AST node an error passed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeAttr {
    Module,
    Section(SectionKind),
    DescImport,
    DescExport,
    TypeFunction,
    TypeLimit,
    TypeTable,
    TypeMemory,
    TypeGlobal,
    Expression,
    SegGlobal,
    SegElement,
    SegCode,
    SegData,
    Name,
}

impl fmt::Display for NodeAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeAttr::Module => write!(f, "module"),
            NodeAttr::Section(kind) => write!(f, "{} section", kind),
            NodeAttr::DescImport => write!(f, "import description"),
            NodeAttr::DescExport => write!(f, "export description"),
            NodeAttr::TypeFunction => write!(f, "function type"),
            NodeAttr::TypeLimit => write!(f, "limit"),
            NodeAttr::TypeTable => write!(f, "table type"),
            NodeAttr::TypeMemory => write!(f, "memory type"),
            NodeAttr::TypeGlobal => write!(f, "global type"),
            NodeAttr::Expression => write!(f, "expression"),
            NodeAttr::SegGlobal => write!(f, "global segment"),
            NodeAttr::SegElement => write!(f, "element segment"),
            NodeAttr::SegCode => write!(f, "code segment"),
            NodeAttr::SegData => write!(f, "data segment"),
            NodeAttr::Name => write!(f, "name"),
        }
    }
}

/// One frame of error context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrInfo {
    /// Absolute byte offset into the loaded stream.
    Loading { offset: usize },
    Ast(NodeAttr),
    /// Symbol name that the provider could not resolve.
    Symbol { name: String },
}

impl fmt::Display for ErrInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrInfo::Loading { offset } => write!(f, "at offset 0x{:08x}", offset),
            ErrInfo::Ast(node) => write!(f, "in {}", node),
            ErrInfo::Symbol { name } => write!(f, "symbol `{}`", name),
        }
    }
}

/// A load or link failure with its context trail, innermost frame first.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}{}", Trail(.trail))]
pub struct Error {
    code: ErrCode,
    trail: Vec<ErrInfo>,
}

struct Trail<'a>(&'a [ErrInfo]);

impl fmt::Display for Trail<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for info in self.0 {
            write!(f, ", {}", info)?;
        }
        Ok(())
    }
}

impl Error {
    pub fn new(code: ErrCode) -> Self {
        Self {
            code,
            trail: Vec::new(),
        }
    }

    pub fn code(&self) -> ErrCode {
        self.code
    }

    pub fn trail(&self) -> &[ErrInfo] {
        &self.trail
    }

    /// Innermost loading offset recorded for this error, if any.
    pub fn offset(&self) -> Option<usize> {
        self.trail.iter().find_map(|info| match info {
            ErrInfo::Loading { offset } => Some(*offset),
            _ => None,
        })
    }

    /// AST nodes the error passed through, innermost first.
    pub fn nodes(&self) -> impl Iterator<Item = NodeAttr> + '_ {
        self.trail.iter().filter_map(|info| match info {
            ErrInfo::Ast(node) => Some(*node),
            _ => None,
        })
    }

    pub fn with_info(mut self, info: ErrInfo) -> Self {
        self.trail.push(info);
        self
    }

    pub fn at_offset(self, offset: usize) -> Self {
        self.with_info(ErrInfo::Loading { offset })
    }

    pub fn with_ast(self, node: NodeAttr) -> Self {
        self.with_info(ErrInfo::Ast(node))
    }
}

impl From<ErrCode> for Error {
    fn from(code: ErrCode) -> Self {
        Error::new(code)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
