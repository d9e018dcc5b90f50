//! Pass 2: emit.
//!
//! The second walk over the preprocessed files. Labels are already
//! resolved; directives now append bytes into the per-section word streams,
//! `.origin` opens fresh kernel chunks, and instructions are encoded at
//! their final program counter.

use log::warn;

use dasm_object::WordStream;

use crate::diagnostics::Error;
use crate::passes::{Assembly, Place, Streams};
use crate::scanner::Cursor;
use crate::section::Section;
use crate::symbols::Resolved;
use crate::debuginfo::DebugRecord;

impl<'a> Assembly<'a> {
    pub(crate) fn emit_file(&mut self, cursor: &mut Cursor<'a>) -> Result<(), Error> {
        loop {
            if cursor.is_at_end() {
                return Ok(());
            }

            if self.pc() > (1u64 << 32) {
                return Err(Error::Encoding(
                    cursor.context(),
                    "Program does not fit in 32-bit address space".to_string(),
                ));
            }

            // Labels were dealt with in pass 1.
            if cursor.label().is_some() {
                continue;
            }

            cursor.skip();

            if cursor.consume_keyword(".kernel") {
                // Handled in pass 1.
            } else if cursor.consume_keyword(".global") {
                let _ = cursor.identifier();
            } else if cursor.consume_keyword(".define") {
                cursor.skip_line();
            } else if cursor.consume_keyword(".origin") {
                let origin = self.origin_operand(cursor)?;
                self.kernel_pc = origin;
                if let Streams::Kernel(list) = &mut self.streams {
                    list.push(WordStream::new(origin as u32));
                }
            } else if cursor.consume_keyword(".text") {
                self.switch_section(cursor, Section::Text)?;
            } else if cursor.consume_keyword(".rodata") {
                self.switch_section(cursor, Section::Rodata)?;
            } else if cursor.consume_keyword(".data") {
                self.switch_section(cursor, Section::Data)?;
            } else if cursor.consume_keyword(".bss") {
                self.switch_section(cursor, Section::Bss)?;
            } else if cursor.consume_keyword(".fill") {
                self.emit_fill(cursor, 4)?;
            } else if cursor.consume_keyword(".fild") {
                self.emit_fill(cursor, 2)?;
            } else if cursor.consume_keyword(".filb") {
                self.emit_fill(cursor, 1)?;
            } else if cursor.consume_keyword(".space") {
                let bytes = self.space_operand(cursor)?;
                self.emit_zeros(bytes);
            } else if cursor.consume_keyword(".align") {
                let pad = self.alignment_padding(cursor)?;
                self.emit_zeros(pad);
            } else if cursor.consume_keyword(".line") {
                let (path, line) = self.line_operands(cursor)?;
                let addr = self.pc() as u32;
                self.debug_records.push(DebugRecord::Line { path, line, addr });
            } else if cursor.consume_keyword(".local") {
                let (name, offset, size) = self.local_operands(cursor)?;
                let addr = self.pc() as u32;
                self.debug_records.push(DebugRecord::Local { name, offset, size, addr });
            } else {
                match self.instruction(cursor)? {
                    Some(word) => {
                        self.check_instruction_site(cursor)?;
                        if let Place::In(section @ (Section::Rodata | Section::Data)) = self.place
                        {
                            let context = cursor.context();
                            warn!(
                                "{}: line {}: instruction emitted into {}",
                                context.path,
                                context.line,
                                section.name(),
                            );
                        }
                        self.current_stream().append_word(word);
                        self.advance(4);
                    }
                    None => {
                        return Err(cursor.syntax_error("Unrecognized instruction"));
                    }
                }
            }
        }
    }

    /// `.fill`/`.fild`/`.filb`: resolve the value and append it
    /// little-endian. Labels are permitted only for the word form.
    fn emit_fill(&mut self, cursor: &mut Cursor<'a>, width: u64) -> Result<(), Error> {
        self.check_data_site(cursor)?;

        let value = self.data_value(cursor, width == 4)?;

        let (limit, directive) = match width {
            4 => (1i64 << 32, ".fill"),
            2 => (1i64 << 16, ".fild"),
            _ => (1i64 << 8, ".filb"),
        };
        if !(0..limit).contains(&value) {
            return Err(Error::Encoding(
                cursor.context(),
                format!("{directive} immediate must be a positive {} bit integer", width * 8),
            ));
        }

        if width == 4 {
            if let Place::In(Section::Text) = self.place {
                let context = cursor.context();
                warn!(
                    "{}: line {}: .fill emits raw data into .text",
                    context.path, context.line,
                );
            }
        }

        let pc = self.packing_pc();
        let stream = self.current_stream();
        match width {
            4 => {
                stream.append_half(value as u16, pc);
                stream.append_half((value >> 16) as u16, pc + 2);
            }
            2 => stream.append_half(value as u16, pc),
            _ => stream.append_byte(value as u8, pc),
        }

        self.advance(width);

        Ok(())
    }

    /// The value of a data directive: a literal, a constant, or (for
    /// `.fill`) a label resolved to its absolute address.
    fn data_value(&mut self, cursor: &mut Cursor<'a>, allow_label: bool) -> Result<i64, Error> {
        if let Some(value) = cursor.literal()? {
            return Ok(value);
        }

        if let Some(name) = cursor.identifier() {
            return match self.symbols.resolve(self.file_index, name) {
                Some(Resolved::Define(value)) => Ok(value),
                Some(Resolved::Label(value)) if allow_label => Ok(value as i64),
                Some(Resolved::Label(_)) => {
                    Err(cursor.syntax_error("Labels are only permitted with .fill"))
                }
                None => Err(Error::Symbol(
                    cursor.context(),
                    format!("Label \"{name}\" has not been defined"),
                )),
            };
        }

        Err(cursor.syntax_error("Invalid immediate"))
    }

    /// Append `count` zero bytes, or just account for them in `.bss`.
    fn emit_zeros(&mut self, count: u64) {
        if self.place != Place::In(Section::Bss) {
            let pc = self.packing_pc();
            let stream = self.current_stream();
            for index in 0..count {
                stream.append_byte(0, pc + index as u32);
            }
        }

        self.advance(count);
    }

    /// The counter used for sub-word packing: the section offset in user
    /// mode (bases are page aligned, so the low bits match), the flat pc in
    /// kernel mode.
    fn packing_pc(&self) -> u32 {
        match self.place {
            Place::Kernel => self.kernel_pc as u32,
            Place::In(section) => self.sections.offsets[section.index()] as u32,
            Place::NoSection => 0,
        }
    }
}
