//! The Elf32 program header table.

use std::io;

use enumflags2::{bitflags, BitFlags};

use super::Address;
use crate::{Number, Write};

/// One program header (one loadable segment).
#[derive(Debug)]
pub struct Program {
    /// Identifies the type of the segment.
    pub r#type: ProgramType,
    /// Segment-dependent flags.
    pub flags: ProgramFlags,
    /// Offset of the segment in the file image.
    pub offset: Address,
    /// Virtual address of the segment in memory.
    pub virtual_address: Address,
    /// Size in bytes of the segment in the file image. May be 0.
    pub size_in_file: u32,
    /// Size in bytes of the segment in memory. May be 0.
    pub size_in_memory: u32,
    /// Alignment of the segment; a power of two.
    pub alignment: u32,
}

impl Program {
    /// Size of `Self` in the Elf format.
    pub const SIZE: u16 = 32;
}

impl Write for Program {
    fn write<N, B>(&self, buffer: &mut B) -> io::Result<()>
    where
        N: Number,
        B: io::Write,
    {
        // `p_type`.
        buffer.write_all(&N::write_u32(self.r#type as u32))?;
        // `p_offset`.
        self.offset.write::<N, B>(buffer)?;
        // `p_vaddr`.
        self.virtual_address.write::<N, B>(buffer)?;
        // `p_paddr`: physical addressing is not used.
        buffer.write_all(&N::write_u32(0))?;
        // `p_filesz`.
        buffer.write_all(&N::write_u32(self.size_in_file))?;
        // `p_memsz`.
        buffer.write_all(&N::write_u32(self.size_in_memory))?;
        // `p_flags`.
        buffer.write_all(&N::write_u32(self.flags.bits()))?;
        // `p_align`.
        buffer.write_all(&N::write_u32(self.alignment))?;

        Ok(())
    }
}

/// Type of program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ProgramType {
    /// Program header table entry unused.
    Null = 0x00,
    /// Loadable segment.
    Load = 0x01,
    /// Dynamic linking information.
    Dynamic = 0x02,
    /// Interpreter information.
    Interpreter = 0x03,
    /// Auxiliary information.
    Note = 0x04,
}

/// Program flag.
#[bitflags]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ProgramFlag {
    /// The segment is executable.
    Execute = 0x1,
    /// The segment is writable.
    Write = 0x2,
    /// The segment is readable.
    Read = 0x4,
}

/// Program flags.
pub type ProgramFlags = BitFlags<ProgramFlag>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LittleEndian;

    #[test]
    fn test_program_header_bytes() {
        let program = Program {
            r#type: ProgramType::Load,
            flags: ProgramFlag::Read | ProgramFlag::Execute,
            offset: Address(148),
            virtual_address: Address(0x80000000),
            size_in_file: 0x20,
            size_in_memory: 0x20,
            alignment: 0x1000,
        };

        let mut bytes = Vec::new();
        program.write::<LittleEndian, _>(&mut bytes).unwrap();

        assert_eq!(bytes.len() as u16, Program::SIZE);
        // `p_type` = PT_LOAD.
        assert_eq!(&bytes[0..4], &[1, 0, 0, 0]);
        // `p_offset`.
        assert_eq!(&bytes[4..8], &[148, 0, 0, 0]);
        // `p_vaddr`.
        assert_eq!(&bytes[8..12], &[0, 0, 0, 0x80]);
        // `p_flags` = RX.
        assert_eq!(&bytes[24..28], &[5, 0, 0, 0]);
        // `p_align`.
        assert_eq!(&bytes[28..32], &[0, 0x10, 0, 0]);
    }
}
