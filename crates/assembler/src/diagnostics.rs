//! Assembler diagnostics.
//!
//! Every fatal condition is a variant of [`Error`]; the first error aborts
//! the current pass, so each offending source line is quoted exactly once.

use std::fmt;

use miette::Diagnostic;
use thiserror::Error;

/// Where a diagnostic points: the display path of the source file, the
/// 1-based line number, and the trimmed text of that line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceContext {
    /// Display path of the offending file.
    pub path: String,
    /// 1-based line number.
    pub line: u32,
    /// The offending line, trimmed.
    pub text: String,
}

impl fmt::Display for SourceContext {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "Error in {}\nline {}: \"{}\"", self.path, self.line, self.text)
    }
}

/// An assembly failure.
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    /// Malformed literal, missing `]`, unknown mnemonic, bad directive.
    #[error("{0}\n{1}")]
    #[diagnostic(code(E003), help("Run `dasm --explain E003` for more detail."))]
    Syntax(SourceContext, String),

    /// Undefined or duplicated label, duplicated constant.
    #[error("{0}\n{1}")]
    #[diagnostic(code(E004), help("Run `dasm --explain E004` for more detail."))]
    Symbol(SourceContext, String),

    /// Directive or instruction in the wrong section or mode.
    #[error("{0}\n{1}")]
    #[diagnostic(code(E005), help("Run `dasm --explain E005` for more detail."))]
    Section(SourceContext, String),

    /// Operand that cannot be packed into the instruction word, or a
    /// privileged instruction outside kernel mode.
    #[error("{0}\n{1}")]
    #[diagnostic(code(E006), help("Run `dasm --explain E006` for more detail."))]
    Encoding(SourceContext, String),

    /// Instruction at an address that is not 4-byte aligned.
    #[error("{0}\nInstruction address {1:#010X} is not 4-byte aligned")]
    #[diagnostic(code(E007), help("Insert `.align 4` before the instruction."))]
    Alignment(SourceContext, u64),

    /// A user-mode program without a `_start` entry point.
    #[error("Label \"_start\" has not been defined")]
    #[diagnostic(code(E008), help("Define a global `_start` label in exactly one source file."))]
    MissingStart,
}

/// Tri-state parse result: `Ok(Some(_))` when found, `Ok(None)` when the
/// construct is not present here (the cursor is untouched), `Err(_)` when
/// the construct is present but malformed.
pub(crate) type Scan<T> = Result<Option<T>, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_format() {
        let error = Error::Syntax(
            SourceContext {
                path: "boot.s".to_string(),
                line: 3,
                text: "addx r1, r2, r3".to_string(),
            },
            "Unrecognized instruction".to_string(),
        );

        assert_eq!(
            error.to_string(),
            "Error in boot.s\nline 3: \"addx r1, r2, r3\"\nUnrecognized instruction",
        );
    }
}
