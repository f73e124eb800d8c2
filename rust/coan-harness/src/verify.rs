//! Output and exit-code verification.
//!
//! Outputs are compared as whitespace-delimited token sequences, never as
//! bytes: layout differences are not failures. Two substitutions are
//! allowed per token before declaring a mismatch:
//!
//! - the `{CWD}` placeholder in the expected token stands for the test
//!   working directory;
//! - on Windows, `\` and `/` are equivalent.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::command::read_text;
use crate::directive::ExitMatch;
use crate::error::{HarnessError, Result};

/// Placeholder for the test working directory in expected outputs.
pub const CWD_PLACEHOLDER: &str = "{CWD}";

/// Token substitutions applied before two tokens are declared different.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitutions {
    /// Replaces [`CWD_PLACEHOLDER`] in expected tokens.
    pub cwd: String,
    /// Treat `\` and `/` as the same character.
    pub fold_separators: bool,
}

impl Substitutions {
    pub fn new(cwd: &Path, windows: bool) -> Self {
        Substitutions {
            cwd: cwd.display().to_string(),
            fold_separators: windows,
        }
    }

    /// Whether an actual token matches an expected one.
    pub fn tokens_match(&self, actual: &str, expected: &str) -> bool {
        if actual == expected {
            return true;
        }
        let expected = expected.replace(CWD_PLACEHOLDER, &self.cwd);
        if self.fold_separators {
            actual.replace('\\', "/") == expected.replace('\\', "/")
        } else {
            actual == expected
        }
    }
}

/// How two outputs differ, or that they don't.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    Match,
    LineCount { expected: usize, actual: usize },
    TokenCount { expected: usize, actual: usize },
    Token { index: usize, expected: String, actual: String },
}

impl Comparison {
    pub fn is_match(&self) -> bool {
        matches!(self, Comparison::Match)
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::Match => write!(f, "match"),
            Comparison::LineCount { expected, actual } => {
                write!(f, "expected {expected} lines, got {actual}")
            }
            Comparison::TokenCount { expected, actual } => {
                write!(f, "expected {expected} words, got {actual}")
            }
            Comparison::Token {
                index,
                expected,
                actual,
            } => write!(f, "word {index}: expected \"{expected}\", got \"{actual}\""),
        }
    }
}

/// Compare two texts as token sequences.
///
/// With `tally_lines` the line counts must also be equal.
pub fn compare_text(expected: &str, actual: &str, tally_lines: bool, subs: &Substitutions) -> Comparison {
    if tally_lines {
        let (e, a) = (expected.lines().count(), actual.lines().count());
        if e != a {
            return Comparison::LineCount {
                expected: e,
                actual: a,
            };
        }
    }
    let expected: Vec<&str> = expected.split_whitespace().collect();
    let actual: Vec<&str> = actual.split_whitespace().collect();
    if expected.len() != actual.len() {
        return Comparison::TokenCount {
            expected: expected.len(),
            actual: actual.len(),
        };
    }
    expected
        .iter()
        .zip(&actual)
        .enumerate()
        .find(|(_, (e, a))| !subs.tokens_match(a, e))
        .map(|(index, (e, a))| Comparison::Token {
            index,
            expected: e.to_string(),
            actual: a.to_string(),
        })
        .unwrap_or(Comparison::Match)
}

/// Compare an expected-output reference file with an actual output file.
///
/// A missing reference is reported as [`HarnessError::MissingReference`].
pub fn compare_files(
    expected: &Path,
    actual: &Path,
    tally_lines: bool,
    subs: &Substitutions,
) -> Result<Comparison> {
    if !expected.exists() {
        return Err(HarnessError::MissingReference(expected.to_path_buf()));
    }
    let expected_text = read_text(expected)?;
    let actual_text = read_text(actual)?;
    Ok(compare_text(&expected_text, &actual_text, tally_lines, subs))
}

/// Whether `actual` satisfies `expected` under `mode`.
pub fn verify_exit(actual: u32, expected: u32, mode: ExitMatch) -> bool {
    mode.matches(actual, expected)
}

/// One reason a case failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Syscode {
        actual: u32,
        expected: u32,
        mode: ExitMatch,
    },
    Output(Comparison),
    Diagnostics(Comparison),
    MissingReference(PathBuf),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Syscode {
                actual,
                expected,
                mode,
            } => {
                let how = match mode {
                    ExitMatch::Exact => "=",
                    ExitMatch::BitmaskSubset => "match",
                };
                write!(f, "Unexpected system code {actual:#04x} (SYSCODE: {how} {expected:#04x})")
            }
            FailureReason::Output(c) => write!(f, "Unexpected output: {c}"),
            FailureReason::Diagnostics(c) => write!(f, "Unexpected stderr: {c}"),
            FailureReason::MissingReference(p) => {
                write!(f, "Missing reference file \"{}\"", p.display())
            }
        }
    }
}

/// The outcome of one test case. Every failing check contributes its own
/// reason, so simultaneous failures are all visible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict {
    pub failures: Vec<FailureReason>,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn fail(&mut self, reason: FailureReason) {
        self.failures.push(reason);
    }
}
