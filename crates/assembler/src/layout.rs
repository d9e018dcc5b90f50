//! Pass 1: layout.
//!
//! One left-to-right walk per file, in host order. Records label addresses,
//! `.define` constants and per-section byte offsets; checks for duplicates
//! and malformed directives. No bytes are emitted, but every operand is
//! parsed so syntax errors surface here first.

use crate::configuration::Mode;
use crate::diagnostics::Error;
use crate::passes::{Assembly, Place};
use crate::scanner::{Cursor, Name};
use crate::section::{align_up, Section, SectionTable};
use crate::symbols::Resolved;

impl<'a> Assembly<'a> {
    pub(crate) fn layout_file(&mut self, cursor: &mut Cursor<'a>) -> Result<(), Error> {
        loop {
            if cursor.is_at_end() {
                return Ok(());
            }

            if let Some(name) = cursor.label() {
                self.layout_label(cursor, name)?;
                continue;
            }

            cursor.skip();

            if cursor.consume_keyword(".kernel") {
                if self.mode != Mode::Kernel {
                    return Err(Error::Section(
                        cursor.context(),
                        ".kernel marks a kernel image; pass --kernel".to_string(),
                    ));
                }
            } else if cursor.consume_keyword(".global") {
                self.layout_global(cursor)?;
            } else if cursor.consume_keyword(".define") {
                self.layout_define(cursor)?;
            } else if cursor.consume_keyword(".origin") {
                let origin = self.origin_operand(cursor)?;
                self.kernel_pc = origin;
            } else if cursor.consume_keyword(".text") {
                self.switch_section(cursor, Section::Text)?;
            } else if cursor.consume_keyword(".rodata") {
                self.switch_section(cursor, Section::Rodata)?;
            } else if cursor.consume_keyword(".data") {
                self.switch_section(cursor, Section::Data)?;
            } else if cursor.consume_keyword(".bss") {
                self.switch_section(cursor, Section::Bss)?;
            } else if cursor.consume_keyword(".fill") {
                self.layout_fill(cursor, 4)?;
            } else if cursor.consume_keyword(".fild") {
                self.layout_fill(cursor, 2)?;
            } else if cursor.consume_keyword(".filb") {
                self.layout_fill(cursor, 1)?;
            } else if cursor.consume_keyword(".space") {
                let bytes = self.space_operand(cursor)?;
                self.advance(bytes);
            } else if cursor.consume_keyword(".align") {
                let pad = self.alignment_padding(cursor)?;
                self.advance(pad);
            } else if cursor.consume_keyword(".line") {
                // Recorded in pass 2; the operands are still validated.
                self.line_operands(cursor)?;
            } else if cursor.consume_keyword(".local") {
                self.local_operands(cursor)?;
            } else {
                match self.instruction(cursor)? {
                    Some(_) => {
                        self.check_instruction_site(cursor)?;
                        self.advance(4);
                    }
                    None => {
                        return Err(cursor.syntax_error("Unrecognized instruction"));
                    }
                }
            }
        }
    }

    /// Define a label at the current address (kernel) or packed
    /// `(section, offset)` (user).
    fn layout_label(&mut self, cursor: &Cursor<'a>, name: Name<'a>) -> Result<(), Error> {
        let (value, is_data) = match self.place {
            Place::Kernel => (self.kernel_pc, false),
            Place::In(section) => (
                SectionTable::pack(section, self.sections.offsets[section.index()]),
                section != Section::Text,
            ),
            Place::NoSection => {
                return Err(Error::Section(
                    cursor.context(),
                    "No section selected\nSelect one with .text, .rodata, .data, or .bss"
                        .to_string(),
                ));
            }
        };

        let scope = &mut self.symbols.scopes[self.file_index];
        if scope.labels.contains(name) {
            if scope.labels.has_definition(name) {
                return Err(Error::Symbol(cursor.context(), "Duplicate label".to_string()));
            }
            scope.labels.make_defined(name, value, is_data);
        } else {
            scope.labels.insert(name, value, true, is_data);
        }

        if self.symbols.globals.contains(name) {
            if self.symbols.globals.has_definition(name) {
                return Err(Error::Symbol(cursor.context(), "Duplicate global label".to_string()));
            }
            self.symbols.globals.make_defined(name, value, is_data);
        }

        Ok(())
    }

    /// `.global name`: declare in this file and in the shared table; promote
    /// to defined when this file already carries the definition.
    fn layout_global(&mut self, cursor: &mut Cursor<'a>) -> Result<(), Error> {
        let Some(name) = cursor.identifier() else {
            return Err(cursor.syntax_error(".global directive requires a label"));
        };

        let scope = &mut self.symbols.scopes[self.file_index];
        if scope.globals.contains(name) {
            return Err(Error::Symbol(
                cursor.context(),
                "Duplicate .global declaration".to_string(),
            ));
        }
        scope.globals.insert(name, 0, false, false);

        if !self.symbols.globals.contains(name) {
            self.symbols.globals.insert(name, 0, false, false);
        }

        let scope = &mut self.symbols.scopes[self.file_index];
        if scope.labels.has_definition(name) {
            let entry = *scope.labels.get(name).expect("definition was just checked");
            if self.symbols.globals.has_definition(name) {
                return Err(Error::Symbol(cursor.context(), "Duplicate global label".to_string()));
            }
            self.symbols.globals.make_defined(name, entry.value, entry.is_data);
        } else if !scope.labels.contains(name) {
            scope.labels.insert(name, 0, false, false);
        }

        Ok(())
    }

    /// `.define name value`: record a constant. The value may be a literal,
    /// another constant, or a label that already has a definition.
    fn layout_define(&mut self, cursor: &mut Cursor<'a>) -> Result<(), Error> {
        let Some(name) = cursor.identifier() else {
            return Err(cursor.syntax_error("Expected label"));
        };

        enum Value {
            Plain(i64),
            FromLabel(u64),
        }

        let value = if let Some(source) = cursor.identifier() {
            match self.symbols.resolve(self.file_index, source) {
                Some(Resolved::Define(value)) => Value::Plain(value),
                Some(Resolved::Label(value)) => Value::FromLabel(value),
                None => {
                    return Err(Error::Symbol(
                        cursor.context(),
                        format!("Label \"{source}\" has not been defined"),
                    ));
                }
            }
        } else if let Some(value) = cursor.literal()? {
            Value::Plain(value)
        } else {
            return Err(cursor.syntax_error("Expected integer literal"));
        };

        let scope = &mut self.symbols.scopes[self.file_index];
        if scope.defines.contains(name) {
            return Err(Error::Symbol(
                cursor.context(),
                "constant has multiple definitions".to_string(),
            ));
        }

        match (value, self.mode) {
            (Value::Plain(value), _) => scope.defines.insert(name, value as u64, true, false),
            // User-mode label values are still packed (section, offset)
            // pairs here; mark the constant for relocation.
            (Value::FromLabel(value), Mode::User) => {
                scope.defines.insert_relocatable(name, value, false);
            }
            (Value::FromLabel(value), Mode::Kernel) => {
                scope.defines.insert(name, value, true, false);
            }
        }

        Ok(())
    }

    /// `.origin addr` (kernel only): validated here and replayed in pass 2.
    pub(crate) fn origin_operand(&mut self, cursor: &mut Cursor<'a>) -> Result<u64, Error> {
        if self.mode != Mode::Kernel {
            return Err(Error::Section(
                cursor.context(),
                ".origin is only available in kernel mode".to_string(),
            ));
        }

        let Some(origin) = cursor.literal()? else {
            return Err(cursor.syntax_error("Invalid immediate"));
        };

        if origin < 0 || (origin as u64) < self.kernel_pc {
            return Err(Error::Section(
                cursor.context(),
                ".origin cannot be used to go backwards".to_string(),
            ));
        }
        if origin >= (1i64 << 32) {
            return Err(Error::Section(
                cursor.context(),
                ".origin address must be a 32 bit integer".to_string(),
            ));
        }

        Ok(origin as u64)
    }

    /// `.text`/`.rodata`/`.data`/`.bss` (user only).
    pub(crate) fn switch_section(
        &mut self,
        cursor: &Cursor<'a>,
        section: Section,
    ) -> Result<(), Error> {
        if self.mode != Mode::User {
            return Err(Error::Section(
                cursor.context(),
                format!("{} is only available in user mode", section.name()),
            ));
        }

        self.place = Place::In(section);

        Ok(())
    }

    /// Pass-1 handling of `.fill`/`.fild`/`.filb`: check the site, check the
    /// value is parseable, reserve the bytes. Values resolve in pass 2.
    fn layout_fill(&mut self, cursor: &mut Cursor<'a>, width: u64) -> Result<(), Error> {
        self.check_data_site(cursor)?;

        if cursor.literal()?.is_none() && cursor.identifier().is_none() {
            return Err(cursor.syntax_error("Invalid immediate"));
        }

        self.advance(width);

        Ok(())
    }

    /// A size operand (`.space`, `.align`): a literal or an
    /// already-recorded constant, identical in both passes.
    pub(crate) fn size_operand(&mut self, cursor: &mut Cursor<'a>) -> Result<i64, Error> {
        if let Some(value) = cursor.literal()? {
            return Ok(value);
        }

        if let Some(name) = cursor.identifier() {
            return match self.symbols.resolve(self.file_index, name) {
                Some(Resolved::Define(value)) => Ok(value),
                _ => Err(Error::Symbol(
                    cursor.context(),
                    format!("Constant \"{name}\" has not been defined"),
                )),
            };
        }

        Err(cursor.syntax_error("Invalid immediate"))
    }

    /// `.space n`: legal everywhere, including `.bss`.
    pub(crate) fn space_operand(&mut self, cursor: &mut Cursor<'a>) -> Result<u64, Error> {
        if self.place == Place::NoSection {
            return Err(self.no_section_error(cursor));
        }

        let bytes = self.size_operand(cursor)?;
        if !(0..(1i64 << 32)).contains(&bytes) {
            return Err(Error::Encoding(
                cursor.context(),
                ".space immediate must be a positive 32 bit integer".to_string(),
            ));
        }

        Ok(bytes as u64)
    }

    /// `.align k`: `k` must be a power of two; returns the padding size.
    pub(crate) fn alignment_padding(&mut self, cursor: &mut Cursor<'a>) -> Result<u64, Error> {
        if self.place == Place::NoSection {
            return Err(self.no_section_error(cursor));
        }

        let alignment = self.size_operand(cursor)?;
        if alignment <= 0 || (alignment & (alignment - 1)) != 0 {
            return Err(cursor.syntax_error(".align requires a power of two"));
        }

        let counter = match self.place {
            Place::Kernel => self.kernel_pc,
            Place::In(section) => self.sections.offsets[section.index()],
            Place::NoSection => unreachable!("checked above"),
        };

        Ok(align_up(counter, alignment as u64) - counter)
    }

    /// `.line <path> <line>` operands.
    pub(crate) fn line_operands(&mut self, cursor: &mut Cursor<'a>) -> Result<(String, i64), Error> {
        let Some(path) = cursor.path_token() else {
            return Err(cursor.syntax_error(".line directive requires a path and a line number"));
        };
        let path = path.to_string();

        let Some(line) = cursor.literal()? else {
            return Err(cursor.syntax_error(".line directive requires a line number"));
        };

        Ok((path, line))
    }

    /// `.local <name> <bp_offset> <size>` operands.
    pub(crate) fn local_operands(
        &mut self,
        cursor: &mut Cursor<'a>,
    ) -> Result<(String, i64, i64), Error> {
        let Some(name) = cursor.identifier() else {
            return Err(cursor.syntax_error(".local directive requires a name"));
        };
        let name = name.to_string();

        let Some(offset) = cursor.literal()? else {
            return Err(cursor.syntax_error(".local directive requires a base-pointer offset"));
        };
        let Some(size) = cursor.literal()? else {
            return Err(cursor.syntax_error(".local directive requires a size"));
        };

        Ok((name, offset, size))
    }

    pub(crate) fn no_section_error(&self, cursor: &Cursor<'a>) -> Error {
        Error::Section(
            cursor.context(),
            "No section selected\nSelect one with .text, .rodata, .data, or .bss".to_string(),
        )
    }

    /// Byte-emitting data directives are barred from `.bss` and need a
    /// section in user mode.
    pub(crate) fn check_data_site(&self, cursor: &Cursor<'a>) -> Result<(), Error> {
        match self.place {
            Place::NoSection => Err(self.no_section_error(cursor)),
            Place::In(Section::Bss) => Err(Error::Section(
                cursor.context(),
                "Data directives are forbidden in .bss".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Instructions need an emittable site and 4-byte alignment.
    pub(crate) fn check_instruction_site(&self, cursor: &Cursor<'a>) -> Result<(), Error> {
        match self.place {
            Place::NoSection => return Err(self.no_section_error(cursor)),
            Place::In(Section::Bss) => {
                return Err(Error::Section(
                    cursor.context(),
                    "Instructions are forbidden in .bss".to_string(),
                ));
            }
            _ => {}
        }

        let pc = self.pc();
        if pc % 4 != 0 {
            return Err(Error::Alignment(cursor.context(), pc));
        }

        Ok(())
    }
}
