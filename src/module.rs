use crate::binary::error::Located;
use crate::binary::primitives::{MAGIC, VERSION};
use crate::binary::sections::SectionKind;
use crate::linker::Symbol;
use crate::types::*;

// ============================================================================
// Expression (constant instruction sequences)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Expr {
    pub instrs: Vec<Instr>,
}

// ============================================================================
// Module Sections
// ============================================================================

// Section 0: Custom Section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomEntry {
    pub name: String,
    pub data: Vec<u8>,
}

/// Every custom section of the module, in encounter order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CustomSection {
    pub content: Vec<CustomEntry>,
}

// Section 1: Type Section
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeDef {
    pub func_type: FuncType,
    /// Compiled function wrapper, bound by linking.
    pub symbol: Option<Symbol>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeSection {
    pub content: Vec<TypeDef>,
}

// Section 2: Import Section
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportDesc {
    Func(TypeIdx),
    Table(TableType),
    Memory(MemType),
    Global(GlobalType),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub module_name: String,
    pub external_name: String,
    pub desc: ImportDesc,
    pub symbol: Option<Symbol>,
}

impl Import {
    pub fn external_kind(&self) -> ExternKind {
        match self.desc {
            ImportDesc::Func(_) => ExternKind::Func,
            ImportDesc::Table(_) => ExternKind::Table,
            ImportDesc::Memory(_) => ExternKind::Memory,
            ImportDesc::Global(_) => ExternKind::Global,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImportSection {
    pub content: Vec<Import>,
}

// Section 3: Function Section
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FunctionSection {
    pub content: Vec<TypeIdx>,
}

// Section 4: Table Section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub table_type: TableType,
    pub symbol: Option<Symbol>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableSection {
    pub content: Vec<Table>,
}

// Section 5: Memory Section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
    pub mem_type: MemType,
    pub symbol: Option<Symbol>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemorySection {
    pub content: Vec<Memory>,
}

// Section 6: Global Section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    pub global_type: GlobalType,
    pub init_expr: Expr,
    pub symbol: Option<Symbol>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GlobalSection {
    pub content: Vec<Global>,
}

// Section 7: Export Section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub name: String,
    pub desc: ExportDesc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportDesc {
    Func(FuncIdx),
    Table(TableIdx),
    Memory(MemIdx),
    Global(GlobalIdx),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExportSection {
    pub content: Vec<Export>,
}

// Section 8: Start Section
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StartSection {
    pub content: FuncIdx,
}

// Section 9: Element Section
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElemMode {
    Passive,
    Active { table: TableIdx, offset: Expr },
    Declarative,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub elem_type: RefType,
    pub init: Vec<Expr>,
    pub mode: ElemMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ElementSection {
    pub content: Vec<Element>,
}

// Section 10: Code Section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalDecl {
    pub count: u32,
    pub value_type: ValType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    pub locals: Vec<LocalDecl>,
    /// Raw instruction bytes, including the trailing `end`.
    pub body: Vec<u8>,
    /// Compiled entry point, bound by linking.
    pub symbol: Option<Symbol>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodeSection {
    pub content: Vec<Code>,
}

// Section 11: Data Section
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataMode {
    Passive,
    Active { memory: MemIdx, offset: Expr },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    pub init: Vec<u8>,
    pub mode: DataMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataSection {
    pub content: Vec<Data>,
}

// Section 12: Data Count Section
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataCountSection {
    pub content: u32,
}

// ============================================================================
// Module
// ============================================================================

/// A decoded module. Each section slot is filled at most once per load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub magic: [u8; 4],
    pub version: [u8; 4],
    pub custom: Option<CustomSection>,
    pub types: Option<TypeSection>,
    pub imports: Option<ImportSection>,
    pub functions: Option<FunctionSection>,
    pub tables: Option<TableSection>,
    pub memories: Option<MemorySection>,
    pub globals: Option<GlobalSection>,
    pub exports: Option<ExportSection>,
    pub start: Option<StartSection>,
    pub elements: Option<ElementSection>,
    pub code: Option<CodeSection>,
    pub data: Option<DataSection>,
    pub data_count: Option<DataCountSection>,
    pub(crate) section_headers: Vec<Located<SectionKind>>,
}

impl Module {
    /// Create an empty module
    pub fn new() -> Self {
        Module {
            magic: MAGIC,
            version: VERSION,
            custom: None,
            types: None,
            imports: None,
            functions: None,
            tables: None,
            memories: None,
            globals: None,
            exports: None,
            start: None,
            elements: None,
            code: None,
            data: None,
            data_count: None,
            section_headers: vec![],
        }
    }

    /// Location of every section in the order it was read. The location
    /// spans the tag byte through the end of the payload.
    pub fn section_headers(&self) -> &[Located<SectionKind>] {
        &self.section_headers
    }

    pub fn has_section(&self, kind: SectionKind) -> bool {
        match kind {
            SectionKind::Custom => self.custom.is_some(),
            SectionKind::Type => self.types.is_some(),
            SectionKind::Import => self.imports.is_some(),
            SectionKind::Function => self.functions.is_some(),
            SectionKind::Table => self.tables.is_some(),
            SectionKind::Memory => self.memories.is_some(),
            SectionKind::Global => self.globals.is_some(),
            SectionKind::Export => self.exports.is_some(),
            SectionKind::Start => self.start.is_some(),
            SectionKind::Element => self.elements.is_some(),
            SectionKind::Code => self.code.is_some(),
            SectionKind::Data => self.data.is_some(),
            SectionKind::DataCount => self.data_count.is_some(),
        }
    }

    /// Imports of the given kind, in declaration order.
    pub fn imports_of(&self, kind: ExternKind) -> impl Iterator<Item = &Import> + '_ {
        self.imports
            .iter()
            .flat_map(|sec| sec.content.iter())
            .filter(move |import| import.external_kind() == kind)
    }
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}
