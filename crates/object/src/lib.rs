//! `dasm-object` holds the binary building blocks of the assembler: word
//! streams (the growable, origin-tagged arrays of 32-bit words every section
//! is emitted into), endian-aware number writers, and the `elf32` executable
//! format.
//!
//! Everything in this crate is write-only: the assembler produces images, it
//! never parses one back.

#![deny(unused)]
#![deny(warnings)]
#![deny(clippy::all)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_rust_codeblocks)]

#[cfg(feature = "elf32")]
pub mod elf32;
mod endianness;
mod word_stream;
mod write;

pub use endianness::*;
pub use word_stream::*;
pub use write::*;
