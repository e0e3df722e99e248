pub mod cursor;
pub mod error;
pub mod leb128;
pub mod primitives;
pub mod sections;

pub use cursor::ByteCursor;
pub use error::{BinaryError, Located, ParseResult, SourceLocation};
pub use sections::{Section, SectionKind};
