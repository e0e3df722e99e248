use std::fmt;

use crate::binary::cursor::ByteCursor;
use crate::binary::error::{fail, in_node, ParseResult};
use crate::binary::leb128::{decode_i32, decode_i64};
use crate::binary::primitives::{parse_byte, parse_name, parse_u32, parse_vec, take_bytes};
use crate::error::{ErrCode, Error, NodeAttr, Result};
use crate::module::*;
use crate::types::*;

type Input<'a> = &'a [u8];

// ============================================================================
// Section Kinds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SectionKind {
    Custom = 0x00,
    Type = 0x01,
    Import = 0x02,
    Function = 0x03,
    Table = 0x04,
    Memory = 0x05,
    Global = 0x06,
    Export = 0x07,
    Start = 0x08,
    Element = 0x09,
    Code = 0x0A,
    Data = 0x0B,
    DataCount = 0x0C,
}

impl SectionKind {
    pub const ALL: [SectionKind; 13] = [
        SectionKind::Custom,
        SectionKind::Type,
        SectionKind::Import,
        SectionKind::Function,
        SectionKind::Table,
        SectionKind::Memory,
        SectionKind::Global,
        SectionKind::Export,
        SectionKind::Start,
        SectionKind::Element,
        SectionKind::Code,
        SectionKind::Data,
        SectionKind::DataCount,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// Position in the canonical section order. DataCount sits between
    /// Element and Code; Custom has no fixed position.
    pub fn order(self) -> Option<u8> {
        match self {
            SectionKind::Custom => None,
            SectionKind::DataCount => Some(0x0A),
            SectionKind::Code => Some(0x0B),
            SectionKind::Data => Some(0x0C),
            kind => Some(kind.id()),
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SectionKind::Custom => "custom",
            SectionKind::Type => "type",
            SectionKind::Import => "import",
            SectionKind::Function => "function",
            SectionKind::Table => "table",
            SectionKind::Memory => "memory",
            SectionKind::Global => "global",
            SectionKind::Export => "export",
            SectionKind::Start => "start",
            SectionKind::Element => "element",
            SectionKind::Code => "code",
            SectionKind::Data => "data",
            SectionKind::DataCount => "data count",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Section Decoding
// ============================================================================

/// A section slot of the module that can be filled from the binary format.
///
/// Decoding appends to whatever the slot already holds, so re-invoking it on
/// a populated section accumulates content.
pub trait Section: Default {
    const KIND: SectionKind;
    type Content;

    fn parse_content(input: Input) -> ParseResult<'_, Self::Content>;

    fn append(&mut self, content: Self::Content);

    /// Decode one size-prefixed payload from the cursor.
    fn load_binary(&mut self, cursor: &mut ByteCursor<'_>) -> Result<()> {
        let node = NodeAttr::Section(Self::KIND);
        let size = cursor.read_u32().map_err(|e| e.with_ast(node))?;
        let start = cursor.offset();
        let payload = cursor
            .read_bytes(size as usize)
            .map_err(|e| e.with_ast(node))?;
        let end = start + payload.len();

        let content = match Self::parse_content(payload) {
            Ok(([], content)) => content,
            Ok((rest, _)) => {
                return Err(Error::new(ErrCode::SectionSizeMismatch)
                    .at_offset(end - rest.len())
                    .with_ast(node));
            }
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                return Err(e.into_error(end).with_ast(node));
            }
            Err(nom::Err::Incomplete(_)) => {
                return Err(Error::new(ErrCode::EndOfFile).at_offset(end).with_ast(node));
            }
        };
        log::trace!("decoded {} section, {} bytes at {:#x}", Self::KIND, size, start);
        self.append(content);
        Ok(())
    }
}

/// Re-base errors from a parser run on a slice carved out of `outer`, where
/// `outer_rest` is what followed the slice.
fn nested<'a, O>(outer_rest: Input<'a>, result: ParseResult<'a, O>) -> ParseResult<'a, O> {
    let extra = outer_rest.len();
    result.map_err(|err| {
        err.map(|mut e| {
            e.remaining += extra;
            e
        })
    })
}

// ============================================================================
// Value Types
// ============================================================================

pub fn parse_valtype(input: Input) -> ParseResult<'_, ValType> {
    let (remaining, byte) = parse_byte(input)?;

    let valtype = match byte {
        0x7F => ValType::I32,
        0x7E => ValType::I64,
        0x7D => ValType::F32,
        0x7C => ValType::F64,
        0x7B => ValType::V128,
        0x70 => ValType::FuncRef,
        0x6F => ValType::ExternRef,
        _ => return fail(ErrCode::InvalidGrammar, input),
    };

    Ok((remaining, valtype))
}

pub fn parse_reftype(input: Input) -> ParseResult<'_, RefType> {
    let (remaining, byte) = parse_byte(input)?;

    let reftype = match byte {
        0x70 => RefType::FuncRef,
        0x6F => RefType::ExternRef,
        _ => return fail(ErrCode::InvalidGrammar, input),
    };

    Ok((remaining, reftype))
}

/// Parse limits: flags:u8 min:u32 [max:u32]
pub fn parse_limits(input: Input) -> ParseResult<'_, Limits> {
    let (remaining, flags) = parse_byte(input)?;
    let (remaining, min) = parse_u32(remaining)?;

    match flags {
        0x00 => Ok((remaining, Limits { min, max: None })),
        0x01 => {
            let (remaining, max) = parse_u32(remaining)?;
            Ok((remaining, Limits { min, max: Some(max) }))
        }
        _ => fail(ErrCode::InvalidGrammar, input),
    }
}

/// Parse table type: reftype limits
pub fn parse_tabletype(input: Input) -> ParseResult<'_, TableType> {
    let (remaining, elem_type) = parse_reftype(input)?;
    let (remaining, limits) = in_node(NodeAttr::TypeLimit, parse_limits)(remaining)?;
    Ok((remaining, TableType { limits, elem_type }))
}

/// Parse memory type: limits
pub fn parse_memtype(input: Input) -> ParseResult<'_, MemType> {
    let (remaining, limits) = in_node(NodeAttr::TypeLimit, parse_limits)(input)?;
    Ok((remaining, MemType { limits }))
}

/// Parse global type: valtype mut:u8
pub fn parse_globaltype(input: Input) -> ParseResult<'_, GlobalType> {
    let (remaining, value_type) = parse_valtype(input)?;
    let (rest, flag) = parse_byte(remaining)?;

    let mutability = match flag {
        0x00 => Mutability::Const,
        0x01 => Mutability::Var,
        _ => return fail(ErrCode::InvalidGrammar, remaining),
    };

    Ok((rest, GlobalType { value_type, mutability }))
}

// ============================================================================
// Constant Expressions
// ============================================================================

/// Parse a constant expression terminated by `end` (0x0B)
pub fn parse_expr(input: Input) -> ParseResult<'_, Expr> {
    let mut remaining = input;
    let mut instrs = Vec::new();

    loop {
        let (rest, opcode) = parse_byte(remaining)?;

        let (rest, instr) = match opcode {
            0x0B => {
                remaining = rest;
                break;
            }
            0x41 => {
                let (rest, value) = decode_i32(rest)?;
                (rest, Instr::I32Const(value))
            }
            0x42 => {
                let (rest, value) = decode_i64(rest)?;
                (rest, Instr::I64Const(value))
            }
            0x43 => {
                let (rest, bytes) = take_bytes(rest, 4)?;
                let bits = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                (rest, Instr::F32Const(bits))
            }
            0x44 => {
                let (rest, bytes) = take_bytes(rest, 8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                (rest, Instr::F64Const(u64::from_le_bytes(raw)))
            }
            0x23 => {
                let (rest, idx) = parse_u32(rest)?;
                (rest, Instr::GlobalGet(idx))
            }
            0xD0 => {
                let (rest, ty) = parse_reftype(rest)?;
                (rest, Instr::RefNull(ty))
            }
            0xD2 => {
                let (rest, idx) = parse_u32(rest)?;
                (rest, Instr::RefFunc(idx))
            }
            _ => return fail(ErrCode::InvalidGrammar, remaining),
        };

        instrs.push(instr);
        remaining = rest;
    }

    Ok((remaining, Expr { instrs }))
}

// ============================================================================
// Section 0: Custom Section
// ============================================================================

/// Parse a custom section payload: name followed by opaque bytes
pub fn parse_custom(input: Input) -> ParseResult<'_, CustomEntry> {
    let (rest, name) = in_node(NodeAttr::Name, parse_name)(input)?;
    let (rest, data) = take_bytes(rest, rest.len())?;
    Ok((
        rest,
        CustomEntry {
            name,
            data: data.to_vec(),
        },
    ))
}

impl Section for CustomSection {
    const KIND: SectionKind = SectionKind::Custom;
    type Content = CustomEntry;

    fn parse_content(input: Input) -> ParseResult<'_, CustomEntry> {
        parse_custom(input)
    }

    fn append(&mut self, content: CustomEntry) {
        self.content.push(content);
    }
}

// ============================================================================
// Section 1: Type Section
// ============================================================================

/// Parse a function type: 0x60 params:vec(valtype) results:vec(valtype)
pub fn parse_functype(input: Input) -> ParseResult<'_, FuncType> {
    let (remaining, byte) = parse_byte(input)?;

    if byte != 0x60 {
        return fail(ErrCode::InvalidGrammar, input);
    }

    let (remaining, params) = parse_vec(remaining, parse_valtype)?;
    let (remaining, results) = parse_vec(remaining, parse_valtype)?;

    Ok((remaining, FuncType { params, results }))
}

impl Section for TypeSection {
    const KIND: SectionKind = SectionKind::Type;
    type Content = Vec<TypeDef>;

    fn parse_content(input: Input) -> ParseResult<'_, Vec<TypeDef>> {
        parse_vec(input, |input| {
            let (rest, func_type) = in_node(NodeAttr::TypeFunction, parse_functype)(input)?;
            Ok((rest, TypeDef { func_type, symbol: None }))
        })
    }

    fn append(&mut self, content: Vec<TypeDef>) {
        self.content.extend(content);
    }
}

// ============================================================================
// Section 2: Import Section
// ============================================================================

/// Parse an import: module:name name:name desc
pub fn parse_import(input: Input) -> ParseResult<'_, Import> {
    let (remaining, module_name) = in_node(NodeAttr::Name, parse_name)(input)?;
    let (remaining, external_name) = in_node(NodeAttr::Name, parse_name)(remaining)?;
    let (rest, tag) = parse_byte(remaining)?;

    let (rest, desc) = match tag {
        0x00 => {
            let (rest, idx) = parse_u32(rest)?;
            (rest, ImportDesc::Func(idx))
        }
        0x01 => {
            let (rest, ty) = in_node(NodeAttr::TypeTable, parse_tabletype)(rest)?;
            (rest, ImportDesc::Table(ty))
        }
        0x02 => {
            let (rest, ty) = in_node(NodeAttr::TypeMemory, parse_memtype)(rest)?;
            (rest, ImportDesc::Memory(ty))
        }
        0x03 => {
            let (rest, ty) = in_node(NodeAttr::TypeGlobal, parse_globaltype)(rest)?;
            (rest, ImportDesc::Global(ty))
        }
        _ => return fail(ErrCode::InvalidGrammar, remaining),
    };

    Ok((
        rest,
        Import {
            module_name,
            external_name,
            desc,
            symbol: None,
        },
    ))
}

impl Section for ImportSection {
    const KIND: SectionKind = SectionKind::Import;
    type Content = Vec<Import>;

    fn parse_content(input: Input) -> ParseResult<'_, Vec<Import>> {
        parse_vec(input, in_node(NodeAttr::DescImport, parse_import))
    }

    fn append(&mut self, content: Vec<Import>) {
        self.content.extend(content);
    }
}

// ============================================================================
// Section 3: Function Section
// ============================================================================

impl Section for FunctionSection {
    const KIND: SectionKind = SectionKind::Function;
    type Content = Vec<TypeIdx>;

    fn parse_content(input: Input) -> ParseResult<'_, Vec<TypeIdx>> {
        parse_vec(input, parse_u32)
    }

    fn append(&mut self, content: Vec<TypeIdx>) {
        self.content.extend(content);
    }
}

// ============================================================================
// Section 4: Table Section
// ============================================================================

impl Section for TableSection {
    const KIND: SectionKind = SectionKind::Table;
    type Content = Vec<Table>;

    fn parse_content(input: Input) -> ParseResult<'_, Vec<Table>> {
        parse_vec(input, |input| {
            let (rest, table_type) = in_node(NodeAttr::TypeTable, parse_tabletype)(input)?;
            Ok((rest, Table { table_type, symbol: None }))
        })
    }

    fn append(&mut self, content: Vec<Table>) {
        self.content.extend(content);
    }
}

// ============================================================================
// Section 5: Memory Section
// ============================================================================

impl Section for MemorySection {
    const KIND: SectionKind = SectionKind::Memory;
    type Content = Vec<Memory>;

    fn parse_content(input: Input) -> ParseResult<'_, Vec<Memory>> {
        parse_vec(input, |input| {
            let (rest, mem_type) = in_node(NodeAttr::TypeMemory, parse_memtype)(input)?;
            Ok((rest, Memory { mem_type, symbol: None }))
        })
    }

    fn append(&mut self, content: Vec<Memory>) {
        self.content.extend(content);
    }
}

// ============================================================================
// Section 6: Global Section
// ============================================================================

/// Parse a global: globaltype expr
pub fn parse_global(input: Input) -> ParseResult<'_, Global> {
    let (remaining, global_type) = in_node(NodeAttr::TypeGlobal, parse_globaltype)(input)?;
    let (rest, init_expr) = in_node(NodeAttr::Expression, parse_expr)(remaining)?;
    Ok((
        rest,
        Global {
            global_type,
            init_expr,
            symbol: None,
        },
    ))
}

impl Section for GlobalSection {
    const KIND: SectionKind = SectionKind::Global;
    type Content = Vec<Global>;

    fn parse_content(input: Input) -> ParseResult<'_, Vec<Global>> {
        parse_vec(input, in_node(NodeAttr::SegGlobal, parse_global))
    }

    fn append(&mut self, content: Vec<Global>) {
        self.content.extend(content);
    }
}

// ============================================================================
// Section 7: Export Section
// ============================================================================

/// Parse an export: name:name kind:u8 idx:u32
pub fn parse_export(input: Input) -> ParseResult<'_, Export> {
    let (remaining, name) = in_node(NodeAttr::Name, parse_name)(input)?;
    let (rest, kind) = parse_byte(remaining)?;
    let (rest, idx) = parse_u32(rest)?;

    let desc = match kind {
        0x00 => ExportDesc::Func(idx),
        0x01 => ExportDesc::Table(idx),
        0x02 => ExportDesc::Memory(idx),
        0x03 => ExportDesc::Global(idx),
        _ => return fail(ErrCode::InvalidGrammar, remaining),
    };

    Ok((rest, Export { name, desc }))
}

impl Section for ExportSection {
    const KIND: SectionKind = SectionKind::Export;
    type Content = Vec<Export>;

    fn parse_content(input: Input) -> ParseResult<'_, Vec<Export>> {
        parse_vec(input, in_node(NodeAttr::DescExport, parse_export))
    }

    fn append(&mut self, content: Vec<Export>) {
        self.content.extend(content);
    }
}

// ============================================================================
// Section 8: Start Section
// ============================================================================

impl Section for StartSection {
    const KIND: SectionKind = SectionKind::Start;
    type Content = FuncIdx;

    fn parse_content(input: Input) -> ParseResult<'_, FuncIdx> {
        parse_u32(input)
    }

    fn append(&mut self, content: FuncIdx) {
        self.content = content;
    }
}

// ============================================================================
// Section 9: Element Section
// ============================================================================

fn parse_elemkind(input: Input) -> ParseResult<'_, RefType> {
    let (rest, kind) = parse_byte(input)?;
    if kind != 0x00 {
        return fail(ErrCode::InvalidGrammar, input);
    }
    Ok((rest, RefType::FuncRef))
}

fn parse_funcidx_inits(input: Input) -> ParseResult<'_, Vec<Expr>> {
    parse_vec(input, |input| {
        let (rest, idx) = parse_u32(input)?;
        Ok((rest, Expr { instrs: vec![Instr::RefFunc(idx)] }))
    })
}

fn parse_expr_inits(input: Input) -> ParseResult<'_, Vec<Expr>> {
    parse_vec(input, in_node(NodeAttr::Expression, parse_expr))
}

fn parse_offset(input: Input) -> ParseResult<'_, Expr> {
    in_node(NodeAttr::Expression, parse_expr)(input)
}

/// Parse an element segment in any of its eight encodings
pub fn parse_element(input: Input) -> ParseResult<'_, Element> {
    let (rest, flags) = parse_u32(input)?;

    let (rest, elem_type, init, mode) = match flags {
        0 => {
            let (rest, offset) = parse_offset(rest)?;
            let (rest, init) = parse_funcidx_inits(rest)?;
            (rest, RefType::FuncRef, init, ElemMode::Active { table: 0, offset })
        }
        1 => {
            let (rest, elem_type) = parse_elemkind(rest)?;
            let (rest, init) = parse_funcidx_inits(rest)?;
            (rest, elem_type, init, ElemMode::Passive)
        }
        2 => {
            let (rest, table) = parse_u32(rest)?;
            let (rest, offset) = parse_offset(rest)?;
            let (rest, elem_type) = parse_elemkind(rest)?;
            let (rest, init) = parse_funcidx_inits(rest)?;
            (rest, elem_type, init, ElemMode::Active { table, offset })
        }
        3 => {
            let (rest, elem_type) = parse_elemkind(rest)?;
            let (rest, init) = parse_funcidx_inits(rest)?;
            (rest, elem_type, init, ElemMode::Declarative)
        }
        4 => {
            let (rest, offset) = parse_offset(rest)?;
            let (rest, init) = parse_expr_inits(rest)?;
            (rest, RefType::FuncRef, init, ElemMode::Active { table: 0, offset })
        }
        5 => {
            let (rest, elem_type) = parse_reftype(rest)?;
            let (rest, init) = parse_expr_inits(rest)?;
            (rest, elem_type, init, ElemMode::Passive)
        }
        6 => {
            let (rest, table) = parse_u32(rest)?;
            let (rest, offset) = parse_offset(rest)?;
            let (rest, elem_type) = parse_reftype(rest)?;
            let (rest, init) = parse_expr_inits(rest)?;
            (rest, elem_type, init, ElemMode::Active { table, offset })
        }
        7 => {
            let (rest, elem_type) = parse_reftype(rest)?;
            let (rest, init) = parse_expr_inits(rest)?;
            (rest, elem_type, init, ElemMode::Declarative)
        }
        _ => return fail(ErrCode::InvalidGrammar, input),
    };

    Ok((rest, Element { elem_type, init, mode }))
}

impl Section for ElementSection {
    const KIND: SectionKind = SectionKind::Element;
    type Content = Vec<Element>;

    fn parse_content(input: Input) -> ParseResult<'_, Vec<Element>> {
        parse_vec(input, in_node(NodeAttr::SegElement, parse_element))
    }

    fn append(&mut self, content: Vec<Element>) {
        self.content.extend(content);
    }
}

// ============================================================================
// Section 10: Code Section
// ============================================================================

/// Parse a locals declaration: count:u32 valtype
pub fn parse_locals(input: Input) -> ParseResult<'_, LocalDecl> {
    let (remaining, count) = parse_u32(input)?;
    let (remaining, value_type) = parse_valtype(remaining)?;
    Ok((remaining, LocalDecl { count, value_type }))
}

fn parse_code_body(input: Input) -> ParseResult<'_, Code> {
    let (body, locals) = parse_vec(input, parse_locals)?;

    let total: u64 = locals.iter().map(|decl| decl.count as u64).sum();
    if total > u32::MAX as u64 {
        return fail(ErrCode::InvalidGrammar, input);
    }

    match body.last() {
        Some(0x0B) => {}
        _ => return fail(ErrCode::InvalidGrammar, body),
    }

    Ok((
        &body[body.len()..],
        Code {
            locals,
            body: body.to_vec(),
            symbol: None,
        },
    ))
}

/// Parse a code entry: size:u32 locals body
pub fn parse_code(input: Input) -> ParseResult<'_, Code> {
    let (remaining, size) = parse_u32(input)?;
    let (rest, code_bytes) = take_bytes(remaining, size as usize)?;
    let (_, code) = nested(rest, parse_code_body(code_bytes))?;
    Ok((rest, code))
}

impl Section for CodeSection {
    const KIND: SectionKind = SectionKind::Code;
    type Content = Vec<Code>;

    fn parse_content(input: Input) -> ParseResult<'_, Vec<Code>> {
        parse_vec(input, in_node(NodeAttr::SegCode, parse_code))
    }

    fn append(&mut self, content: Vec<Code>) {
        self.content.extend(content);
    }
}

// ============================================================================
// Section 11: Data Section
// ============================================================================

fn parse_data_bytes(input: Input) -> ParseResult<'_, Vec<u8>> {
    let (remaining, length) = parse_u32(input)?;
    let (rest, bytes) = take_bytes(remaining, length as usize)?;
    Ok((rest, bytes.to_vec()))
}

/// Parse a data segment in any of its three encodings
pub fn parse_data(input: Input) -> ParseResult<'_, Data> {
    let (rest, flags) = parse_u32(input)?;

    let (rest, mode) = match flags {
        0 => {
            let (rest, offset) = parse_offset(rest)?;
            (rest, DataMode::Active { memory: 0, offset })
        }
        1 => (rest, DataMode::Passive),
        2 => {
            let (rest, memory) = parse_u32(rest)?;
            let (rest, offset) = parse_offset(rest)?;
            (rest, DataMode::Active { memory, offset })
        }
        _ => return fail(ErrCode::InvalidGrammar, input),
    };
    let (rest, init) = parse_data_bytes(rest)?;

    Ok((rest, Data { init, mode }))
}

impl Section for DataSection {
    const KIND: SectionKind = SectionKind::Data;
    type Content = Vec<Data>;

    fn parse_content(input: Input) -> ParseResult<'_, Vec<Data>> {
        parse_vec(input, in_node(NodeAttr::SegData, parse_data))
    }

    fn append(&mut self, content: Vec<Data>) {
        self.content.extend(content);
    }
}

// ============================================================================
// Section 12: Data Count Section
// ============================================================================

impl Section for DataCountSection {
    const KIND: SectionKind = SectionKind::DataCount;
    type Content = u32;

    fn parse_content(input: Input) -> ParseResult<'_, u32> {
        parse_u32(input)
    }

    fn append(&mut self, content: u32) {
        self.content = content;
    }
}

// ============================================================================
// Tests
// ============================================================================
