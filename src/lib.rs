//! Loading and symbol linking for WebAssembly binary modules.
//!
//! [`Loader::load`] decodes a binary module into a [`Module`];
//! [`Loader::link`] binds a loaded module to the symbols of its ahead-of-time
//! compiled artifact.

pub mod binary;
pub mod config;
pub mod error;
pub mod linker;
pub mod loader;
pub mod module;
pub mod types;

pub use binary::{ByteCursor, SectionKind};
pub use config::{LoaderConfig, RecurrencePolicy};
pub use error::{ErrCode, ErrInfo, Error, NodeAttr, Result};
pub use linker::{export_name, Symbol, SymbolId, SymbolProvider, SymbolShape, SymbolTable};
pub use loader::Loader;
pub use module::Module;
