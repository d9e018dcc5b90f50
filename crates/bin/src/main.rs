//! `dasm-bin` is the executable of `dasm`.
//!
//! This crate holds everything that makes the assembler a command-line
//! tool: flag parsing, environment lookups, file loading, and output
//! writing. The assembly itself lives in `dasm-assembler`.

mod error;

use std::{
    env,
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    process,
};

use argh::FromArgs;
use dasm_assembler::{Configuration, Mode, Source};
use dasm_errors::Result;
use dasm_file::{FileReader, Picker};
use error::Error;

fn default_output_file() -> PathBuf {
    PathBuf::from("./a.hex")
}

/// The `dasm` command assembles Dioptase assembly sources into a raw
/// kernel hex image or an ELF32 executable.
#[derive(Debug, FromArgs)]
struct Dasm {
    /// explain a particular error based on its code (of kind `E...`).
    #[argh(option)]
    explain: Option<String>,

    /// input files.
    #[argh(positional)]
    input_files: Vec<PathBuf>,

    /// specify the name and location of the output file. If not specified,
    /// `./a.hex` is used.
    #[argh(option, short = 'o', default = "default_output_file()")]
    output_file: PathBuf,

    /// print the preprocessed sources instead of assembling.
    #[argh(switch)]
    pre: bool,

    /// assemble in kernel mode: raw hex output, `.origin` layout, and
    /// privileged instructions allowed.
    #[argh(switch)]
    kernel: bool,

    /// append the debug trailer (label, line, and local records) to the
    /// image.
    #[argh(switch, short = 'g')]
    debug: bool,

    /// prepend the runtime start-up sources found in `$DIOPTASE_CRT_DIR`
    /// or `$DIOPTASE_ROOT/Dioptase-OS/crt`.
    #[argh(switch)]
    crt: bool,

    /// define a constant ahead of any source, as `NAME=value`. May be
    /// repeated.
    #[argh(option, short = 'D', long = "define")]
    defines: Vec<String>,

    /// show debug-level logs instead of warnings only.
    #[argh(switch, short = 'v')]
    verbose: bool,
}

impl Dasm {
    /// Creates a new `Self` type based on [`std::env::args_os`].
    fn new() -> Result<Self, Error> {
        // Collect all arguments.
        let arguments =
            env::args_os().map(OsString::into_string).collect::<Result<Vec<_>, _>>().map_err(
                |argument| Error::InvalidArgumentEncoding(argument.to_string_lossy().to_string()),
            )?;

        // Check whether `argv` is present.
        if arguments.is_empty() {
            return Err(Error::ProgramNameIsMissing);
        }

        // Extract the base command from a path.
        let command = Path::new(&arguments[0])
            .file_name()
            .and_then(|file_name| file_name.to_str())
            .unwrap_or(&arguments[0]);

        // Extract all arguments.
        let arguments =
            arguments.iter().skip(1).map(|argument| argument.as_str()).collect::<Vec<_>>();

        // Parse and build `Self`.
        match Dasm::from_args(&[command], &arguments) {
            Ok(dasm) => Ok(dasm),
            Err(early_exit) => match early_exit.status {
                // The command was parsed successfully and the early exit is due to a flag like
                // `--help` causing early exit with output.
                Ok(()) => {
                    println!("{}", early_exit.output);

                    process::exit(0);
                }

                // The arguments were not successfully parsed.
                Err(()) => Err(Error::CommandLine(early_exit.output.trim().to_string())),
            },
        }
    }

    /// The source paths to assemble, `--crt` start-up files first.
    fn source_paths(&self) -> Result<Vec<PathBuf>, Error> {
        let mut paths = Vec::new();

        if self.crt {
            paths.extend(crt_paths()?);
        }

        paths.extend(self.input_files.iter().cloned());

        Ok(paths)
    }

    /// Split every `-D NAME=value` occurrence.
    fn cli_defines(&self) -> Result<Vec<(String, String)>, Error> {
        self.defines
            .iter()
            .map(|define| {
                define
                    .split_once('=')
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .ok_or_else(|| {
                        Error::CommandLine(format!(
                            "invalid definition `{define}` (expected `-D NAME=value`)"
                        ))
                    })
            })
            .collect()
    }
}

/// The start-up sources prepended by `--crt`: every `.s`/`.asm` file of the
/// runtime directory, in file-name order.
fn crt_paths() -> Result<Vec<PathBuf>, Error> {
    let directory = env::var_os("DIOPTASE_CRT_DIR").map(PathBuf::from).or_else(|| {
        env::var_os("DIOPTASE_ROOT")
            .map(|root| PathBuf::from(root).join("Dioptase-OS").join("crt"))
    });

    let Some(directory) = directory else {
        return Err(Error::NoCrtDirectory);
    };

    let entries = fs::read_dir(&directory)
        .map_err(|source| Error::ReadInput { path: directory.clone(), source })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|source| Error::ReadInput { path: directory.clone(), source })?;
        let path = entry.path();

        let is_assembly = path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| extension == "s" || extension == "asm");
        if is_assembly {
            paths.push(path);
        }
    }

    paths.sort();

    Ok(paths)
}

/// Read one source file through the configured file reader.
fn read_source(path: &Path) -> Result<Source, Error> {
    let file =
        Picker::open(path).map_err(|source| Error::ReadInput { path: path.into(), source })?;
    let bytes =
        file.read_as_bytes().map_err(|source| Error::ReadInput { path: path.into(), source })?;

    Ok(Source::new(path.display().to_string(), String::from_utf8_lossy(&bytes).into_owned()))
}

fn main() -> Result<()> {
    // Install the error report.
    Error::install_and_configure()?;

    // Build the command-line arguments.
    let dasm = Dasm::new()?;

    // Handle the `--explain` option.
    if let Some(error_code) = dasm.explain.as_deref() {
        println!("{}", Error::explain(error_code)?);

        return Ok(());
    }

    // Route assembler warnings to stderr.
    let _ = stderrlog::new().verbosity(if dasm.verbose { 3 } else { 1 }).init();

    let paths = dasm.source_paths()?;
    if paths.is_empty() {
        return Err(Error::NoInputFile.into());
    }

    let sources = paths.iter().map(|path| read_source(path)).collect::<Result<Vec<_>, _>>()?;

    let mode = if dasm.kernel { Mode::Kernel } else { Mode::User };
    let configuration = Configuration::new(sources, mode)
        .with_debug(dasm.debug)
        .with_entry_thunk(dasm.kernel && dasm.crt)
        .with_defines(dasm.cli_defines()?);

    let assembler = configuration.assembler();

    // `--pre` stops after the preprocessor.
    if dasm.pre {
        for preprocessed in assembler.preprocess()? {
            println!("{preprocessed}");
        }

        return Ok(());
    }

    let program = assembler.assemble()?;

    let mut output = fs::File::create(&dasm.output_file)
        .map_err(|source| Error::WriteOutput { path: dasm.output_file.clone(), source })?;
    program
        .write_image(&mut output)
        .map_err(|source| Error::WriteOutput { path: dasm.output_file.clone(), source })?;

    Ok(())
}
