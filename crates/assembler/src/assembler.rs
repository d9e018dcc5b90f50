use crate::configuration::Configuration;
use crate::diagnostics::Error;
use crate::image::Program;
use crate::{passes, preprocessor};

/// The assembler: preprocess, lay out, emit.
#[derive(Debug)]
pub struct Assembler {
    configuration: Configuration,
}

impl Assembler {
    pub(crate) fn with_configuration(configuration: Configuration) -> Self {
        Self { configuration }
    }

    /// Run only the preprocessor, returning the expanded text of every
    /// source in order. This is what `--pre` prints.
    pub fn preprocess(&self) -> Result<Vec<String>, Error> {
        preprocessor::preprocess(&self.configuration)
    }

    /// Assemble every source into a program image description.
    pub fn assemble(&self) -> Result<Program, Error> {
        let preprocessed = self.preprocess()?;

        passes::run(&self.configuration, &preprocessed)
    }
}
