//! Debug metadata appended to an image as a text trailer.
//!
//! The trailer is deliberately simple: `#label`/`#data` lines for every
//! defined symbol, then `#line` and `#local` records harvested from the
//! `.line`/`.local` directives emitted by a compiler front-end.

use std::io;

/// One defined label: its name, final address, and whether it lives in a
/// data section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRecord {
    /// Symbol name.
    pub name: String,
    /// Absolute address.
    pub addr: u32,
    /// Defined in `.rodata`, `.data`, or `.bss` rather than `.text`.
    pub is_data: bool,
}

/// One `.line` or `.local` record, in pass-2 encounter order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugRecord {
    /// `.line <path> <line>`: the next byte emitted belongs to this source
    /// line.
    Line {
        /// Front-end source path.
        path: String,
        /// 1-based front-end line number.
        line: i64,
        /// Address of the next emitted byte.
        addr: u32,
    },
    /// `.local <name> <bp_offset> <size>`: a local variable becomes visible.
    Local {
        /// Variable name.
        name: String,
        /// Offset from the base pointer; usually negative.
        offset: i64,
        /// Size in bytes.
        size: i64,
        /// Address of the next emitted byte.
        addr: u32,
    },
}

/// Everything the debug trailer carries.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DebugInfo {
    /// Defined labels, deduplicated and sorted by address then name.
    pub labels: Vec<LabelRecord>,
    /// `.line`/`.local` records in encounter order.
    pub records: Vec<DebugRecord>,
}

impl DebugInfo {
    /// Append the trailer lines to an image.
    pub fn write_trailer<B>(&self, buffer: &mut B) -> io::Result<()>
    where
        B: io::Write,
    {
        for label in &self.labels {
            writeln!(
                buffer,
                "#{} {} {:08X}",
                if label.is_data { "data" } else { "label" },
                label.name,
                label.addr,
            )?;
        }

        for record in &self.records {
            match record {
                DebugRecord::Line { path, line, addr } => {
                    writeln!(buffer, "#line {path} {line} {addr:08X}")?;
                }
                DebugRecord::Local { name, offset, size, addr } => {
                    writeln!(buffer, "#local {name} {offset} {size} {addr:08X}")?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailer_format() {
        let info = DebugInfo {
            labels: vec![
                LabelRecord { name: "_start".to_string(), addr: 0x8000_0000, is_data: false },
                LabelRecord { name: "table".to_string(), addr: 0x8000_1000, is_data: true },
            ],
            records: vec![
                DebugRecord::Line { path: "main.c".to_string(), line: 7, addr: 0x8000_0004 },
                DebugRecord::Local {
                    name: "count".to_string(),
                    offset: -8,
                    size: 4,
                    addr: 0x8000_0008,
                },
            ],
        };

        let mut out = Vec::new();
        info.write_trailer(&mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "#label _start 80000000\n\
             #data table 80001000\n\
             #line main.c 7 80000004\n\
             #local count -8 4 80000008\n",
        );
    }
}
