use crate::binary::cursor::ByteCursor;
use crate::binary::error::{Located, SourceLocation};
use crate::binary::primitives::{MAGIC, VERSION};
use crate::binary::sections::{Section, SectionKind};
use crate::config::{LoaderConfig, RecurrencePolicy};
use crate::error::{ErrCode, Error, NodeAttr, Result};
use crate::linker::SymbolProvider;
use crate::module::Module;

/// Turns binary modules into [`Module`]s and links them against compiled
/// artifacts.
///
/// `load_binary` and [`Module::load_compiled`] only return errors; `load` and
/// `link` are the reporting boundary and log each failure once.
#[derive(Debug, Clone, Default)]
pub struct Loader {
    config: LoaderConfig,
}

impl Loader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Load a module from a complete byte buffer.
    pub fn load(&self, bytes: &[u8]) -> Result<Module> {
        let mut cursor = ByteCursor::new(bytes);
        self.load_binary(&mut cursor).inspect_err(|err| {
            log::error!("failed to load module: {}", err);
        })
    }

    /// Bind `module` to the symbols of a compiled artifact.
    pub fn link<P>(&self, module: &mut Module, provider: &P) -> Result<()>
    where
        P: SymbolProvider + ?Sized,
    {
        module.load_compiled(provider).inspect_err(|err| {
            log::error!("failed to link module: {}", err);
        })
    }

    /// Decode the whole stream behind `cursor` into a module.
    ///
    /// Stops at the first error; no partially decoded module is returned.
    pub fn load_binary(&self, cursor: &mut ByteCursor<'_>) -> Result<Module> {
        if let Some(limit) = self.config.max_module_size {
            if cursor.len() > limit {
                return Err(Error::new(ErrCode::InvalidGrammar)
                    .at_offset(0)
                    .with_ast(NodeAttr::Module));
            }
        }

        let mut module = Module::new();
        module.magic = read_marker(cursor, MAGIC)?;
        module.version = read_marker(cursor, VERSION)?;

        let mut last_order = None;
        loop {
            let start = cursor.offset();
            let id = match cursor.read_byte() {
                Ok(id) => id,
                Err(err) if err.code() == ErrCode::EndOfFile => break,
                Err(err) => return Err(err.with_ast(NodeAttr::Module)),
            };

            let Some(kind) = SectionKind::from_id(id) else {
                return Err(Error::new(ErrCode::InvalidGrammar)
                    .at_offset(cursor.offset() - 1)
                    .with_ast(NodeAttr::Module));
            };

            self.check_placement(&module, kind, &mut last_order)
                .map_err(|err| {
                    err.at_offset(start)
                        .with_ast(NodeAttr::Section(kind))
                        .with_ast(NodeAttr::Module)
                })?;

            log::debug!("loading {} section at {:#x}", kind, start);
            load_section(&mut module, kind, cursor).map_err(|err| err.with_ast(NodeAttr::Module))?;
            module.section_headers.push(Located::new(
                kind,
                SourceLocation::new(start, cursor.offset() - start),
            ));
        }

        check_data_count(&module)?;
        Ok(module)
    }

    fn check_placement(
        &self,
        module: &Module,
        kind: SectionKind,
        last_order: &mut Option<u8>,
    ) -> Result<()> {
        let Some(order) = kind.order() else {
            return Ok(());
        };

        if self.config.recurrence == RecurrencePolicy::Reject && module.has_section(kind) {
            return Err(Error::new(ErrCode::UnexpectedSection));
        }

        if self.config.enforce_section_order {
            if let Some(last) = *last_order {
                if order < last {
                    return Err(Error::new(ErrCode::UnexpectedSection));
                }
            }
        }
        *last_order = Some(order);
        Ok(())
    }
}

fn read_marker(cursor: &mut ByteCursor<'_>, expected: [u8; 4]) -> Result<[u8; 4]> {
    let bytes = cursor
        .read_bytes(4)
        .map_err(|err| err.with_ast(NodeAttr::Module))?;
    if bytes != &expected[..] {
        return Err(Error::new(ErrCode::InvalidGrammar)
            .at_offset(cursor.offset() - 4)
            .with_ast(NodeAttr::Module));
    }
    Ok(expected)
}

fn fill<S: Section>(slot: &mut Option<S>, cursor: &mut ByteCursor<'_>) -> Result<()> {
    slot.get_or_insert_with(S::default).load_binary(cursor)
}

fn load_section(module: &mut Module, kind: SectionKind, cursor: &mut ByteCursor<'_>) -> Result<()> {
    match kind {
        SectionKind::Custom => fill(&mut module.custom, cursor),
        SectionKind::Type => fill(&mut module.types, cursor),
        SectionKind::Import => fill(&mut module.imports, cursor),
        SectionKind::Function => fill(&mut module.functions, cursor),
        SectionKind::Table => fill(&mut module.tables, cursor),
        SectionKind::Memory => fill(&mut module.memories, cursor),
        SectionKind::Global => fill(&mut module.globals, cursor),
        SectionKind::Export => fill(&mut module.exports, cursor),
        SectionKind::Start => fill(&mut module.start, cursor),
        SectionKind::Element => fill(&mut module.elements, cursor),
        SectionKind::Code => fill(&mut module.code, cursor),
        SectionKind::Data => fill(&mut module.data, cursor),
        SectionKind::DataCount => fill(&mut module.data_count, cursor),
    }
}

/// The declared data count must match the decoded segments; an absent data
/// section counts as zero segments.
fn check_data_count(module: &Module) -> Result<()> {
    let Some(count) = &module.data_count else {
        return Ok(());
    };
    let segments = module.data.as_ref().map_or(0, |sec| sec.content.len());
    if segments as u64 != count.content as u64 {
        return Err(Error::new(ErrCode::InvalidGrammar).with_ast(NodeAttr::Module));
    }
    Ok(())
}
