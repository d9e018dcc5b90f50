//! `dasm_file` is a thin crate to read source files into memory.
//!
//! The assembler is strictly sequential, so readers are synchronous: a
//! [`FileReader`] opens a path and hands the whole content back as one byte
//! buffer. Two implementations exist, selected by Cargo features: plain file
//! system reads (`fs`) and memory mapping (`mmap`). The `auto` feature picks
//! the best one for the target platform at build time.

#![deny(unused)]
#![deny(warnings)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_rust_codeblocks)]

use std::{io::Result, ops::Deref, path::Path};

#[cfg(all(not(feature = "auto"), not(feature = "fs"), not(feature = "mmap")))]
compile_error!("No feature has been selected, please select at least `auto`");

#[cfg(feature = "mmap")]
pub mod mmap;

#[cfg(feature = "fs")]
pub mod fs;

/// Define what a file reader should look like.
pub trait FileReader: Sized {
    /// The reader outputs bytes that implement `Deref<[u8]>`.
    type Bytes: Deref<Target = [u8]>;

    /// Open a file.
    fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>;

    /// Read the entire file content.
    fn read_as_bytes(self) -> Result<Self::Bytes>;
}

/// File picker.
///
/// This type opens a file path based on the file reader selected by a Cargo
/// feature (e.g. `fs` or `mmap`).
pub struct Picker;

impl Picker {
    /// Open a file by using [`fs::File`].
    #[cfg(feature = "fs")]
    pub fn open<P>(path: P) -> Result<fs::File>
    where
        P: AsRef<Path>,
    {
        fs::File::open(path)
    }

    /// Open a file by using [`mmap::Mmap`].
    #[cfg(feature = "mmap")]
    pub fn open<P>(path: P) -> Result<mmap::Mmap>
    where
        P: AsRef<Path>,
    {
        mmap::Mmap::open(path)
    }
}
