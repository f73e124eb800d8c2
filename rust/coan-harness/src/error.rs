//! Errors that abort a suite or a single case.
//!
//! Logical mismatches (wrong exit code, differing output, unreconciled
//! files) are not errors: they are recorded as [`FailureReason`]s and
//! tallied. Everything here is a setup failure or a harness-internal parse
//! failure after which no further judgment is possible.
//!
//! [`FailureReason`]: crate::verify::FailureReason

use std::path::PathBuf;

use thiserror::Error;

use crate::directive::DirectiveError;

/// Setup and harness-internal failures.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A filesystem operation failed.
    #[error("{action} \"{}\": {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The subject could not be launched at all.
    #[error("failed to launch \"{}\": {source}", program.display())]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The subject ran but its stderr carried no `exit code 0x..` token.
    #[error("could not parse system code from \"{}\"", stderr.display())]
    MissingExitCode { stderr: PathBuf },

    /// The corpus root already exists and no wipe was requested.
    #[error("root directory \"{}\" already exists", .0.display())]
    CorpusRootExists(PathBuf),

    /// Corpus breadth or depth was zero.
    #[error("--{0} must be > 0")]
    EmptyCorpusBudget(&'static str),

    /// A test file's header directives could not be interpreted.
    #[error("bad directive in \"{}\": {source}", path.display())]
    Directive {
        path: PathBuf,
        #[source]
        source: DirectiveError,
    },

    /// A reference file the case depends on does not exist.
    #[error("missing reference file \"{}\"", .0.display())]
    MissingReference(PathBuf),

    /// There was nothing to test.
    #[error("no test data found in {0}")]
    NoTestData(String),

    /// A suite report could not be rendered.
    #[error("cannot serialize report: {0}")]
    Report(String),
}

impl HarnessError {
    /// Wrap an I/O error with the action and path it concerned.
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HarnessError::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Extension for attaching path context to `std::io::Result`.
pub trait IoContext<T> {
    fn with_path(self, action: &'static str, path: impl Into<PathBuf>) -> Result<T, HarnessError>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn with_path(self, action: &'static str, path: impl Into<PathBuf>) -> Result<T, HarnessError> {
        self.map_err(|source| HarnessError::io(action, path, source))
    }
}

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;
