//! The Elf32 file header.

use std::io;

use super::Address;
use crate::{Number, Write};

/// Executable file header.
///
/// The identification block is fixed: 32-bit class, little-endian data,
/// version 1, System V ABI. Only the fields that vary between images are
/// carried by the type.
#[derive(Debug)]
pub struct FileHeader {
    /// Object file type.
    pub r#type: FileType,
    /// Machine architecture.
    pub machine: Machine,
    /// Entry point virtual address.
    pub entry_point: Address,
    /// Number of program headers following the file header.
    pub program_header_count: u16,
}

impl FileHeader {
    /// Magic number of an Elf file.
    pub const MAGIC: &'static [u8; 4] = &[0x7f, b'E', b'L', b'F'];

    /// Elf class: 32-bit objects.
    pub const CLASS_ELF32: u8 = 0x01;

    /// Elf data encoding: two's complement, little-endian.
    pub const DATA_LITTLE_ENDIAN: u8 = 0x01;

    /// Elf version.
    pub const VERSION: u8 = 0x01;

    /// OS ABI: System V.
    pub const OS_ABI_SYSTEM_V: u8 = 0x00;

    /// Size of `Self` in the Elf format.
    pub const SIZE: u16 = 52;
}

impl Write for FileHeader {
    fn write<N, B>(&self, buffer: &mut B) -> io::Result<()>
    where
        N: Number,
        B: io::Write,
    {
        // `e_ident`, 16 bytes.
        buffer.write_all(Self::MAGIC)?;
        buffer.write_all(&[
            Self::CLASS_ELF32,
            Self::DATA_LITTLE_ENDIAN,
            Self::VERSION,
            Self::OS_ABI_SYSTEM_V,
        ])?;
        // ABI version and padding.
        buffer.write_all(&[0; 8])?;

        // `e_type`.
        buffer.write_all(&N::write_u16(self.r#type as u16))?;
        // `e_machine`.
        buffer.write_all(&N::write_u16(self.machine as u16))?;
        // `e_version`.
        buffer.write_all(&N::write_u32(Self::VERSION.into()))?;
        // `e_entry`.
        self.entry_point.write::<N, B>(buffer)?;
        // `e_phoff`: the program header table sits right after the file
        // header.
        buffer.write_all(&N::write_u32(Self::SIZE.into()))?;
        // `e_shoff`: no section headers.
        buffer.write_all(&N::write_u32(0))?;
        // `e_flags`.
        buffer.write_all(&N::write_u32(0))?;
        // `e_ehsize`.
        buffer.write_all(&N::write_u16(Self::SIZE))?;
        // `e_phentsize`.
        buffer.write_all(&N::write_u16(super::Program::SIZE))?;
        // `e_phnum`.
        buffer.write_all(&N::write_u16(self.program_header_count))?;
        // `e_shentsize`, `e_shnum`, `e_shstrndx`: no section headers.
        buffer.write_all(&N::write_u16(0))?;
        buffer.write_all(&N::write_u16(0))?;
        buffer.write_all(&N::write_u16(0))?;

        Ok(())
    }
}

/// Type of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FileType {
    /// Unknown.
    None = 0x00,
    /// Relocatable file.
    RelocatableFile = 0x01,
    /// Executable file.
    ExecutableFile = 0x02,
    /// Shared object.
    SharedObject = 0x03,
    /// Core file.
    CoreFile = 0x04,
}

/// Architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Machine {
    /// No specific instruction set.
    None = 0x0000,
    /// The Dioptase 32-bit RISC machine.
    Dioptase = 0xD105,
}
