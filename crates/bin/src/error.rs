use std::{io, path::PathBuf};

#[cfg(feature = "fancy-errors")]
use miette::{set_hook, MietteHandlerOpts};
use miette::{Diagnostic, InstallError, Result};
use thiserror::Error;
use dasm_errors::Error as DasmError;

#[derive(Error, Diagnostic, Debug)]
pub(crate) enum Error {
    #[error("The argument `{0}` contains invalid Unicode data.")]
    InvalidArgumentEncoding(String),

    #[error("The program name is missing from the command-line.")]
    ProgramNameIsMissing,

    #[error("I was not able to read the command-line properly:\n{0}")]
    #[diagnostic(code(E001), help("See the command-line usage with `dasm --help`."))]
    CommandLine(String),

    #[error("Must pass at least one source file.")]
    #[diagnostic(code(E001), help("See the command-line usage with `dasm --help`."))]
    NoInputFile,

    #[error("I was not able to read `{path}`: {source}")]
    #[diagnostic(code(E002), help("Check the path and its permissions."))]
    ReadInput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I was not able to write `{path}`: {source}")]
    #[diagnostic(code(E002), help("Check the path and its permissions."))]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No runtime start-up directory was found.")]
    #[diagnostic(
        code(E002),
        help(
            "`--crt` reads start-up sources from `$DIOPTASE_CRT_DIR`, or from \
             `$DIOPTASE_ROOT/Dioptase-OS/crt` as a fallback; set one of them."
        )
    )]
    NoCrtDirectory,
}

impl Error {
    pub(crate) fn install_and_configure() -> Result<(), InstallError> {
        #[cfg(feature = "fancy-errors")]
        set_hook(Box::new(|_| {
            Box::new(
                MietteHandlerOpts::new()
                    .with_cause_chain()
                    .footer(
                        "For more information about an error, try \
                        `dasm --explain <error>` where `<error>` \
                        has the `E[0-9]{{3}} pattern."
                            .to_string(),
                    )
                    .width(85)
                    .terminal_links(false)
                    .build(),
            )
        }))?;

        Ok(())
    }

    pub(crate) fn explain(error_code: &str) -> Result<&'static str, DasmError> {
        DasmError::explain(error_code)
    }
}
