//! The image writer.
//!
//! A [`Program`] is what assembly produces: the entry point, one word
//! stream per emitted section (or per `.origin` chunk in kernel mode), and
//! the bss size. Kernel images are raw hex with `@origin` markers; user
//! images are an ELF32 executable rendered as hex words. Either way an
//! optional debug trailer is appended as text.

use std::io;

use dasm_object::elf32::{
    Address, FileHeader, FileType, Machine, Program as ProgramHeader, ProgramFlag, ProgramFlags,
    ProgramType,
};
use dasm_object::{write_bytes_as_hex_words, LittleEndian, WordStream, Write as _};

use crate::configuration::Mode;
use crate::debuginfo::DebugInfo;
use crate::section::PAGE_SIZE;

/// The output of one assembly run.
#[derive(Debug)]
pub struct Program {
    /// Mode the program was assembled in; decides the image format.
    pub mode: Mode,
    /// Absolute address of `_start` (0 when a kernel image defines none).
    pub entry_point: u32,
    /// Emitted word streams: text/rodata/data in user mode, one stream per
    /// `.origin` chunk in kernel mode.
    pub sections: Vec<WordStream>,
    /// Bytes of zero-initialized memory following the data section.
    pub bss_size: u32,
    /// Debug trailer content, when requested.
    pub debug: Option<DebugInfo>,
}

impl Program {
    /// Write the complete image, debug trailer included.
    pub fn write_image<B>(&self, buffer: &mut B) -> io::Result<()>
    where
        B: io::Write,
    {
        match self.mode {
            Mode::Kernel => self.write_kernel_image(buffer)?,
            Mode::User => self.write_user_image(buffer)?,
        }

        if let Some(debug) = &self.debug {
            debug.write_trailer(buffer)?;
        }

        Ok(())
    }

    /// Raw hex: every stream prints its origin marker followed by its words.
    fn write_kernel_image<B>(&self, buffer: &mut B) -> io::Result<()>
    where
        B: io::Write,
    {
        for stream in &self.sections {
            stream.write_origin_marker(buffer)?;
            stream.write_hex(buffer)?;
        }

        Ok(())
    }

    /// ELF32 executable: file header, three PT_LOAD headers, then the
    /// text/rodata/data payloads, all rendered as hex words.
    fn write_user_image<B>(&self, buffer: &mut B) -> io::Result<()>
    where
        B: io::Write,
    {
        debug_assert_eq!(self.sections.len(), 3);

        let mut headers = Vec::with_capacity(
            FileHeader::SIZE as usize + 3 * ProgramHeader::SIZE as usize,
        );

        FileHeader {
            r#type: FileType::ExecutableFile,
            machine: Machine::Dioptase,
            entry_point: Address(self.entry_point),
            program_header_count: 3,
        }
        .write::<LittleEndian, _>(&mut headers)?;

        let flags: [ProgramFlags; 3] = [
            ProgramFlag::Read | ProgramFlag::Execute,
            ProgramFlag::Read.into(),
            ProgramFlag::Read | ProgramFlag::Write,
        ];

        let mut offset = FileHeader::SIZE as u32 + 3 * ProgramHeader::SIZE as u32;
        for (index, stream) in self.sections.iter().enumerate() {
            let size_in_file = stream.size_in_bytes();
            let size_in_memory = if index == 2 {
                // The data segment also spans the bss.
                size_in_file + self.bss_size
            } else {
                size_in_file
            };

            ProgramHeader {
                r#type: ProgramType::Load,
                flags: flags[index],
                offset: Address(offset),
                virtual_address: Address(stream.origin()),
                size_in_file,
                size_in_memory,
                alignment: PAGE_SIZE as u32,
            }
            .write::<LittleEndian, _>(&mut headers)?;

            offset += size_in_file;
        }

        write_bytes_as_hex_words(&headers, buffer)?;

        for stream in &self.sections {
            stream.write_hex(buffer)?;
        }

        Ok(())
    }
}
