//! The two-pass core.
//!
//! All mutable assembly state lives in one [`Assembly`] context threaded
//! through every parse function: the symbol tables, the section counters,
//! the current place (section or kernel flat space), and the pass-2 output
//! streams. Pass 1 walks every file to lay out addresses; pass 2 walks them
//! again to emit bytes.

use bstr::BStr;
use dasm_object::WordStream;

use crate::configuration::{Configuration, Mode};
use crate::debuginfo::{DebugInfo, DebugRecord, LabelRecord};
use crate::diagnostics::{Error, SourceContext};
use crate::image::Program;
use crate::scanner::{is_identifier_byte, Cursor};
use crate::section::{Section, SectionTable};
use crate::symbols::SymbolState;

/// Which traversal is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pass {
    Layout,
    Emit,
}

/// Where bytes currently go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Place {
    /// User mode before any section directive; nothing may be emitted.
    NoSection,
    /// Inside a user-mode section.
    In(Section),
    /// Kernel mode: one flat address space driven by `.origin`.
    Kernel,
}

/// Pass-2 output streams.
#[derive(Debug)]
pub(crate) enum Streams {
    /// Pass 1 emits nothing.
    Inactive,
    /// One stream per user section that occupies file bytes.
    User { text: WordStream, rodata: WordStream, data: WordStream },
    /// One stream per `.origin` chunk.
    Kernel(Vec<WordStream>),
}

/// The bundled state of one `assemble()` invocation.
#[derive(Debug)]
pub(crate) struct Assembly<'a> {
    pub(crate) mode: Mode,
    pub(crate) pass: Pass,
    pub(crate) file_index: usize,
    pub(crate) symbols: SymbolState<'a>,
    pub(crate) sections: SectionTable,
    pub(crate) place: Place,
    pub(crate) kernel_pc: u64,
    pub(crate) streams: Streams,
    pub(crate) debug_records: Vec<DebugRecord>,
    pub(crate) entry_point: u32,
}

/// Run both passes over the preprocessed sources and produce the program
/// descriptor.
pub(crate) fn run<'a>(
    configuration: &'a Configuration,
    preprocessed: &'a [String],
) -> Result<Program, Error> {
    let mut assembly = Assembly::new(configuration.mode, preprocessed.len());
    assembly.seed_defines(configuration)?;

    for (index, text) in preprocessed.iter().enumerate() {
        assembly.file_index = index;
        let mut cursor = Cursor::new(&configuration.sources[index].path, text);
        assembly.layout_file(&mut cursor)?;
    }

    assembly.finalize_layout()?;
    assembly.begin_emit();

    for (index, text) in preprocessed.iter().enumerate() {
        assembly.file_index = index;
        let mut cursor = Cursor::new(&configuration.sources[index].path, text);
        assembly.emit_file(&mut cursor)?;
    }

    Ok(assembly.into_program(configuration.debug))
}

impl<'a> Assembly<'a> {
    pub(crate) fn new(mode: Mode, file_count: usize) -> Self {
        Self {
            mode,
            pass: Pass::Layout,
            file_index: 0,
            symbols: SymbolState::new(file_count),
            sections: SectionTable::default(),
            place: match mode {
                Mode::User => Place::NoSection,
                Mode::Kernel => Place::Kernel,
            },
            kernel_pc: 0,
            streams: Streams::Inactive,
            debug_records: Vec::new(),
            entry_point: 0,
        }
    }

    /// Insert the command-line `.define`s into every file scope, ahead of
    /// any source text.
    fn seed_defines(&mut self, configuration: &'a Configuration) -> Result<(), Error> {
        for (name, value) in &configuration.defines {
            let context = || SourceContext {
                path: "<command line>".to_string(),
                line: 1,
                text: format!("-D {name}={value}"),
            };

            let valid = !name.is_empty()
                && (name.as_bytes()[0].is_ascii_alphabetic() || name.as_bytes()[0] == b'_')
                && name.bytes().all(is_identifier_byte);
            if !valid {
                return Err(Error::Syntax(context(), "Invalid constant name".to_string()));
            }

            let mut cursor = Cursor::new("<command line>", value);
            let parsed = cursor
                .literal()?
                .ok_or_else(|| Error::Syntax(context(), "Expected integer literal".to_string()))?;
            if !cursor.is_at_end() {
                return Err(Error::Syntax(context(), "Expected integer literal".to_string()));
            }

            let name = BStr::new(name.as_bytes());
            for scope in &mut self.symbols.scopes {
                if scope.defines.contains(name) {
                    return Err(Error::Symbol(
                        context(),
                        "constant has multiple definitions".to_string(),
                    ));
                }
                scope.defines.insert(name, parsed as u64, true, false);
            }
        }

        Ok(())
    }

    /// The address of the next byte to emit.
    pub(crate) fn pc(&self) -> u64 {
        match self.place {
            Place::Kernel => self.kernel_pc,
            Place::In(section) => {
                let index = section.index();
                match self.pass {
                    Pass::Layout => self.sections.offsets[index],
                    Pass::Emit => self.sections.bases[index] + self.sections.offsets[index],
                }
            }
            Place::NoSection => 0,
        }
    }

    /// Advance the current counter by `bytes`.
    pub(crate) fn advance(&mut self, bytes: u64) {
        match self.place {
            Place::Kernel => self.kernel_pc += bytes,
            Place::In(section) => self.sections.offsets[section.index()] += bytes,
            Place::NoSection => {}
        }
    }

    /// Finish pass 1: freeze sizes and bases, rewrite packed label values
    /// to absolute addresses, and resolve the entry point.
    fn finalize_layout(&mut self) -> Result<(), Error> {
        if self.mode == Mode::User {
            self.sections.finalize();

            for scope in &mut self.symbols.scopes {
                for entry in scope.labels.entries_mut() {
                    if entry.is_defined {
                        entry.value = self.sections.relocate(entry.value);
                    }
                }
                for entry in scope.defines.entries_mut() {
                    if entry.relocatable {
                        entry.value = self.sections.relocate(entry.value);
                    }
                }
            }
            for entry in self.symbols.globals.entries_mut() {
                if entry.is_defined {
                    entry.value = self.sections.relocate(entry.value);
                }
            }
        }

        let start = BStr::new("_start");
        if self.symbols.globals.has_definition(start) {
            self.entry_point =
                self.symbols.globals.get(start).map(|entry| entry.value as u32).unwrap_or(0);
        } else if self.mode == Mode::User {
            return Err(Error::MissingStart);
        }

        Ok(())
    }

    /// Reset the cursors of the world for pass 2 and open the output
    /// streams.
    fn begin_emit(&mut self) {
        self.pass = Pass::Emit;
        self.file_index = 0;
        self.sections.offsets = [0; 4];
        self.kernel_pc = 0;

        match self.mode {
            Mode::User => {
                self.place = Place::NoSection;
                self.streams = Streams::User {
                    text: WordStream::new(self.sections.bases[Section::Text.index()] as u32),
                    rodata: WordStream::new(self.sections.bases[Section::Rodata.index()] as u32),
                    data: WordStream::new(self.sections.bases[Section::Data.index()] as u32),
                };
            }
            Mode::Kernel => {
                self.place = Place::Kernel;
                self.streams = Streams::Kernel(vec![WordStream::new(0)]);
            }
        }
    }

    /// The stream bytes currently land in.
    pub(crate) fn current_stream(&mut self) -> &mut WordStream {
        match (&mut self.streams, self.place) {
            (Streams::Kernel(list), _) => {
                list.last_mut().expect("the kernel stream list is never empty")
            }
            (Streams::User { text, .. }, Place::In(Section::Text)) => text,
            (Streams::User { rodata, .. }, Place::In(Section::Rodata)) => rodata,
            (Streams::User { data, .. }, Place::In(Section::Data)) => data,
            _ => unreachable!("emission is checked against the current place first"),
        }
    }

    /// Collect the deduplicated, deterministically ordered label list for
    /// the debug trailer.
    fn collect_labels(&self) -> Vec<LabelRecord> {
        let mut labels: Vec<LabelRecord> = Vec::new();

        let all = self
            .symbols
            .scopes
            .iter()
            .flat_map(|scope| scope.labels.iter())
            .chain(self.symbols.globals.iter());

        for (name, entry) in all {
            if entry.is_defined {
                labels.push(LabelRecord {
                    name: name.to_string(),
                    addr: entry.value as u32,
                    is_data: entry.is_data,
                });
            }
        }

        labels.sort_by(|a, b| (a.addr, &a.name, a.is_data).cmp(&(b.addr, &b.name, b.is_data)));
        labels.dedup();

        labels
    }

    /// Consume the context into the program descriptor.
    fn into_program(self, want_debug: bool) -> Program {
        let debug = want_debug.then(|| DebugInfo {
            labels: self.collect_labels(),
            records: self.debug_records.clone(),
        });

        let sections = match self.streams {
            Streams::User { text, rodata, data } => vec![text, rodata, data],
            Streams::Kernel(list) => list,
            Streams::Inactive => Vec::new(),
        };

        let bss_size = match self.mode {
            Mode::User => self.sections.sizes[Section::Bss.index()] as u32,
            Mode::Kernel => 0,
        };

        Program { mode: self.mode, entry_point: self.entry_point, sections, bss_size, debug }
    }
}
