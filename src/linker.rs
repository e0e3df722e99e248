use std::collections::HashMap;
use std::fmt::Write;

use crate::binary::sections::SectionKind;
use crate::error::{ErrCode, ErrInfo, Error, NodeAttr, Result};
use crate::module::{Import, ImportDesc, Module};

pub const GLOBALS_SYMBOL: &str = "globals";
pub const TYPES_SYMBOL: &str = "types";
pub const CODES_SYMBOL: &str = "codes";
pub const TABLE_SYMBOL: &str = "table";
pub const MEMORY_SYMBOL: &str = "mem";

/// Identity of a symbol inside a compiled artifact, assigned by its provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

impl SymbolId {
    pub const fn new(raw: u32) -> Self {
        SymbolId(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// A resolved handle into a compiled artifact.
///
/// Handles never carry addresses; the execution layer turns them into
/// pointers against the loaded artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    /// The symbol itself.
    Direct(SymbolId),
    /// Address of element `index` of an array symbol.
    Element { base: SymbolId, index: usize },
    /// Value stored in element `index` of an array of pointers.
    Deref { base: SymbolId, index: usize },
}

impl Symbol {
    pub fn base(&self) -> SymbolId {
        match *self {
            Symbol::Direct(id) => id,
            Symbol::Element { base, .. } | Symbol::Deref { base, .. } => base,
        }
    }

    pub fn index(&self) -> Option<usize> {
        match *self {
            Symbol::Direct(_) => None,
            Symbol::Element { index, .. } | Symbol::Deref { index, .. } => Some(index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolShape {
    Scalar,
    /// Index-addressable array of entries.
    Array,
}

/// Name lookup into a compiled artifact.
pub trait SymbolProvider {
    /// Find `name`, returning `None` if it is absent or not of `shape`.
    fn lookup(&self, name: &str, shape: SymbolShape) -> Option<SymbolId>;
}

impl<T: SymbolProvider + ?Sized> SymbolProvider for &T {
    fn lookup(&self, name: &str, shape: SymbolShape) -> Option<SymbolId> {
        (**self).lookup(name, shape)
    }
}

/// In-memory symbol table of a compiled artifact.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, (SymbolId, SymbolShape)>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define `name`; redefining keeps the existing id and replaces the shape.
    pub fn define(&mut self, name: impl Into<String>, shape: SymbolShape) -> SymbolId {
        let next = SymbolId(self.symbols.len() as u32);
        let entry = self.symbols.entry(name.into()).or_insert((next, shape));
        entry.1 = shape;
        entry.0
    }

    pub fn get(&self, name: &str) -> Option<SymbolId> {
        self.symbols.get(name).map(|(id, _)| *id)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl SymbolProvider for SymbolTable {
    fn lookup(&self, name: &str, shape: SymbolShape) -> Option<SymbolId> {
        match self.symbols.get(name) {
            Some(&(id, found)) if found == shape => Some(id),
            _ => None,
        }
    }
}

/// Canonical artifact symbol name for an import or export name.
///
/// ASCII alphanumerics and `_` are kept; every other byte becomes `$`
/// followed by its two hex digits.
pub fn export_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' {
            out.push(byte as char);
        } else {
            // writing to a String cannot fail
            let _ = write!(out, "${:02x}", byte);
        }
    }
    out
}

/// Resolve the symbol an import binds to; `None` for kinds bound elsewhere.
fn resolve_import<P: SymbolProvider + ?Sized>(import: &Import, provider: &P) -> Result<Option<Symbol>> {
    let code = match import.desc {
        // resolved at instantiation
        ImportDesc::Func(_) | ImportDesc::Table(_) => return Ok(None),
        ImportDesc::Global(_) => ErrCode::InvalidGlobalIdx,
        ImportDesc::Memory(_) => ErrCode::InvalidMemoryIdx,
    };

    let name = export_name(&format!("{}.{}", import.module_name, import.external_name));
    match provider.lookup(&name, SymbolShape::Scalar) {
        Some(id) => Ok(Some(Symbol::Direct(id))),
        None => Err(Error::new(code)
            .with_info(ErrInfo::Symbol { name })
            .with_ast(NodeAttr::DescImport)
            .with_ast(NodeAttr::Section(SectionKind::Import))
            .with_ast(NodeAttr::Module)),
    }
}

impl Module {
    /// Attach compiled-artifact symbols to the module's declarations.
    ///
    /// Global and memory imports must resolve; if one does not, no import
    /// binding changes. The aggregate `globals`, `types` and `codes` symbols
    /// are optional and a missing one leaves its category as it was. The
    /// `table` and `mem` bindings are always overwritten, so linking against
    /// an artifact without them clears them.
    pub fn load_compiled<P: SymbolProvider + ?Sized>(&mut self, provider: &P) -> Result<()> {
        // every required import resolves before any binding is written
        if let Some(imports) = &mut self.imports {
            let resolved = imports
                .content
                .iter()
                .map(|import| resolve_import(import, provider))
                .collect::<Result<Vec<_>>>()?;
            for (import, symbol) in imports.content.iter_mut().zip(resolved) {
                if symbol.is_some() {
                    import.symbol = symbol;
                }
            }
        }

        if let Some(globals) = &mut self.globals {
            if let Some(base) = provider.lookup(GLOBALS_SYMBOL, SymbolShape::Array) {
                log::debug!("binding {} globals", globals.content.len());
                for (index, global) in globals.content.iter_mut().enumerate() {
                    global.symbol = Some(Symbol::Element { base, index });
                }
            }
        }

        if let Some(types) = &mut self.types {
            if let Some(base) = provider.lookup(TYPES_SYMBOL, SymbolShape::Array) {
                log::debug!("binding {} function types", types.content.len());
                for (index, ty) in types.content.iter_mut().enumerate() {
                    ty.symbol = Some(Symbol::Deref { base, index });
                }
            }
        }

        if let Some(code) = &mut self.code {
            if let Some(base) = provider.lookup(CODES_SYMBOL, SymbolShape::Array) {
                log::debug!("binding {} function bodies", code.content.len());
                for (index, body) in code.content.iter_mut().enumerate() {
                    body.symbol = Some(Symbol::Deref { base, index });
                }
            }
        }

        // only the first table and memory are backed by the artifact
        if let Some(table) = self.tables.as_mut().and_then(|sec| sec.content.first_mut()) {
            table.symbol = provider.lookup(TABLE_SYMBOL, SymbolShape::Scalar).map(Symbol::Direct);
        }

        if let Some(memory) = self.memories.as_mut().and_then(|sec| sec.content.first_mut()) {
            memory.symbol = provider.lookup(MEMORY_SYMBOL, SymbolShape::Scalar).map(Symbol::Direct);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::*;
    use crate::types::*;

    fn import(module: &str, name: &str, desc: ImportDesc) -> Import {
        Import {
            module_name: module.into(),
            external_name: name.into(),
            desc,
            symbol: None,
        }
    }

    fn global_import() -> ImportDesc {
        ImportDesc::Global(GlobalType {
            value_type: ValType::I32,
            mutability: Mutability::Const,
        })
    }

    fn memory_import() -> ImportDesc {
        ImportDesc::Memory(MemType {
            limits: Limits { min: 1, max: None },
        })
    }

    fn with_imports(imports: Vec<Import>) -> Module {
        let mut module = Module::new();
        module.imports = Some(ImportSection { content: imports });
        module
    }

    fn global(value: i32) -> Global {
        Global {
            global_type: GlobalType {
                value_type: ValType::I32,
                mutability: Mutability::Var,
            },
            init_expr: Expr {
                instrs: vec![Instr::I32Const(value)],
            },
            symbol: None,
        }
    }

    #[test]
    fn test_export_name() {
        assert_eq!(export_name("env.g"), "env$2eg");
        assert_eq!(export_name("wasi_snapshot_preview1.fd_write"), "wasi_snapshot_preview1$2efd_write");
        assert_eq!(export_name("a-b c"), "a$2db$20c");
        assert_eq!(export_name("é"), "$c3$a9");
        assert_eq!(export_name(""), "");
    }

    #[test]
    fn test_missing_global_import() {
        let mut module = with_imports(vec![import("env", "g", global_import())]);
        let err = module.load_compiled(&SymbolTable::new()).unwrap_err();
        assert_eq!(err.code(), ErrCode::InvalidGlobalIdx);
        assert_eq!(
            err.trail(),
            &[
                ErrInfo::Symbol { name: "env$2eg".into() },
                ErrInfo::Ast(NodeAttr::DescImport),
                ErrInfo::Ast(NodeAttr::Section(SectionKind::Import)),
                ErrInfo::Ast(NodeAttr::Module),
            ]
        );
    }

    #[test]
    fn test_global_import_resolves() {
        let mut table = SymbolTable::new();
        let id = table.define(export_name("env.g"), SymbolShape::Scalar);
        let mut module = with_imports(vec![import("env", "g", global_import())]);
        module.load_compiled(&table).unwrap();
        let bound = module.imports.unwrap().content[0].symbol;
        assert_eq!(bound, Some(Symbol::Direct(id)));
    }

    #[test]
    fn test_missing_memory_import() {
        let mut module = with_imports(vec![import("env", "memory", memory_import())]);
        let err = module.load_compiled(&SymbolTable::new()).unwrap_err();
        assert_eq!(err.code(), ErrCode::InvalidMemoryIdx);
    }

    #[test]
    fn test_import_symbol_of_wrong_shape_is_missing() {
        let mut table = SymbolTable::new();
        table.define(export_name("env.g"), SymbolShape::Array);
        let mut module = with_imports(vec![import("env", "g", global_import())]);
        let err = module.load_compiled(&table).unwrap_err();
        assert_eq!(err.code(), ErrCode::InvalidGlobalIdx);
    }

    #[test]
    fn test_function_and_table_imports_need_no_symbol() {
        let table_type = TableType {
            limits: Limits { min: 0, max: None },
            elem_type: RefType::FuncRef,
        };
        let mut module = with_imports(vec![
            import("env", "f", ImportDesc::Func(0)),
            import("env", "t", ImportDesc::Table(table_type)),
        ]);
        module.load_compiled(&SymbolTable::new()).unwrap();
        let imports = module.imports.unwrap();
        assert!(imports.content.iter().all(|i| i.symbol.is_none()));
    }

    #[test]
    fn test_aggregate_symbols_bind_by_index() {
        let mut table = SymbolTable::new();
        let globals_id = table.define(GLOBALS_SYMBOL, SymbolShape::Array);
        let types_id = table.define(TYPES_SYMBOL, SymbolShape::Array);
        let codes_id = table.define(CODES_SYMBOL, SymbolShape::Array);
        let table_id = table.define(TABLE_SYMBOL, SymbolShape::Scalar);
        let mem_id = table.define(MEMORY_SYMBOL, SymbolShape::Scalar);

        let mut module = Module::new();
        module.globals = Some(GlobalSection {
            content: vec![global(1), global(2)],
        });
        module.types = Some(TypeSection {
            content: vec![TypeDef::default()],
        });
        module.code = Some(CodeSection {
            content: vec![
                Code { locals: vec![], body: vec![0x0B], symbol: None },
                Code { locals: vec![], body: vec![0x01, 0x0B], symbol: None },
            ],
        });
        let limits = Limits { min: 1, max: None };
        module.tables = Some(TableSection {
            content: vec![
                Table {
                    table_type: TableType { limits, elem_type: RefType::FuncRef },
                    symbol: None,
                },
                Table {
                    table_type: TableType { limits, elem_type: RefType::ExternRef },
                    symbol: None,
                },
            ],
        });
        module.memories = Some(MemorySection {
            content: vec![Memory { mem_type: MemType { limits }, symbol: None }],
        });

        module.load_compiled(&table).unwrap();

        let globals = &module.globals.as_ref().unwrap().content;
        assert_eq!(globals[0].symbol, Some(Symbol::Element { base: globals_id, index: 0 }));
        assert_eq!(globals[1].symbol, Some(Symbol::Element { base: globals_id, index: 1 }));
        let types = &module.types.as_ref().unwrap().content;
        assert_eq!(types[0].symbol, Some(Symbol::Deref { base: types_id, index: 0 }));
        let codes = &module.code.as_ref().unwrap().content;
        assert_eq!(codes[1].symbol, Some(Symbol::Deref { base: codes_id, index: 1 }));
        assert_eq!(codes[1].symbol.unwrap().index(), Some(1));
        let tables = &module.tables.as_ref().unwrap().content;
        assert_eq!(tables[0].symbol, Some(Symbol::Direct(table_id)));
        assert_eq!(tables[1].symbol, None);
        let memories = &module.memories.as_ref().unwrap().content;
        assert_eq!(memories[0].symbol, Some(Symbol::Direct(mem_id)));
    }

    #[test]
    fn test_missing_aggregate_symbols_are_skipped() {
        let mut module = Module::new();
        module.globals = Some(GlobalSection {
            content: vec![global(0)],
        });
        module.code = Some(CodeSection {
            content: vec![Code { locals: vec![], body: vec![0x0B], symbol: None }],
        });
        // a scalar "globals" is not the array the artifact would export
        let mut table = SymbolTable::new();
        table.define(GLOBALS_SYMBOL, SymbolShape::Scalar);

        module.load_compiled(&table).unwrap();
        assert_eq!(module.globals.unwrap().content[0].symbol, None);
        assert_eq!(module.code.unwrap().content[0].symbol, None);
    }

    #[test]
    fn test_empty_table_section_is_skipped() {
        let mut table = SymbolTable::new();
        table.define(TABLE_SYMBOL, SymbolShape::Scalar);
        let mut module = Module::new();
        module.tables = Some(TableSection::default());
        module.load_compiled(&table).unwrap();
        assert!(module.tables.unwrap().content.is_empty());
    }

    #[test]
    fn test_linking_twice_is_idempotent() {
        let mut table = SymbolTable::new();
        table.define(export_name("env.g"), SymbolShape::Scalar);
        table.define(GLOBALS_SYMBOL, SymbolShape::Array);
        let mut module = with_imports(vec![import("env", "g", global_import())]);
        module.globals = Some(GlobalSection {
            content: vec![global(7)],
        });

        module.load_compiled(&table).unwrap();
        let first = module.clone();
        module.load_compiled(&table).unwrap();
        assert_eq!(module, first);
    }

    #[test]
    fn test_relink_clears_table_and_memory() {
        let limits = Limits { min: 1, max: None };
        let mut module = Module::new();
        module.tables = Some(TableSection {
            content: vec![Table {
                table_type: TableType { limits, elem_type: RefType::FuncRef },
                symbol: None,
            }],
        });
        module.memories = Some(MemorySection {
            content: vec![Memory { mem_type: MemType { limits }, symbol: None }],
        });

        let mut first = SymbolTable::new();
        let table_id = first.define(TABLE_SYMBOL, SymbolShape::Scalar);
        let mem_id = first.define(MEMORY_SYMBOL, SymbolShape::Scalar);
        module.load_compiled(&first).unwrap();
        assert_eq!(module.tables.as_ref().unwrap().content[0].symbol, Some(Symbol::Direct(table_id)));
        assert_eq!(module.memories.as_ref().unwrap().content[0].symbol, Some(Symbol::Direct(mem_id)));

        module.load_compiled(&SymbolTable::new()).unwrap();
        assert_eq!(module.tables.as_ref().unwrap().content[0].symbol, None);
        assert_eq!(module.memories.as_ref().unwrap().content[0].symbol, None);
    }

    #[test]
    fn test_failed_import_leaves_earlier_imports_unbound() {
        let mut table = SymbolTable::new();
        table.define(export_name("env.g"), SymbolShape::Scalar);
        let mut module = with_imports(vec![
            import("env", "g", global_import()),
            import("env", "memory", memory_import()),
        ]);

        let err = module.load_compiled(&table).unwrap_err();
        assert_eq!(err.code(), ErrCode::InvalidMemoryIdx);
        let imports = module.imports.unwrap();
        assert!(imports.content.iter().all(|i| i.symbol.is_none()));
    }

    #[test]
    fn test_symbol_table_redefine_keeps_id() {
        let mut table = SymbolTable::new();
        let a = table.define("a", SymbolShape::Scalar);
        let b = table.define("b", SymbolShape::Array);
        assert_ne!(a, b);
        assert_eq!(table.define("a", SymbolShape::Array), a);
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup("a", SymbolShape::Array), Some(a));
        assert_eq!(table.lookup("a", SymbolShape::Scalar), None);
        assert_eq!(table.get("b"), Some(b));
    }
}
