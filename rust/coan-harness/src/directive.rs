//! Test directives embedded in the header comments of test input files.
//!
//! A test file carries its own test parameters as `/**...*/` comments:
//!
//! ```text
//! /**ARGS: source -DFOO */
//! /**SYSCODE: = 2 | 16 */
//! /**NO-OUTPUT */
//! /**NOT-WINDOWS */
//! /**WORDSIZE=64 */
//! /**ALTFILES: test_cases/a.h test_cases/b.h */
//! /**REDIRECT */
//! ```
//!
//! Extraction is a pattern search, not a parse: each directive is matched at
//! most once and the first match wins. A file without `ARGS` is not a test.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::command::split_args;

static ARGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/\*\*ARGS:\s*(.+?)\s*\*/").unwrap());
static DISCARD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(--discard\s+blank|--discard\s+comment|-kb|-kc)").unwrap());
static SYSCODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\*\*SYSCODE:\s*(.+?)\s*\*/").unwrap());
static NO_OUTPUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\*\*NO-OUTPUT\s*\*/").unwrap());
static NOT_WINDOWS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\*\*NOT-WINDOWS\s*\*/").unwrap());
static WORDSIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\*\*WORDSIZE=(\d+)\s*\*/").unwrap());
static ALTFILES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\*\*ALTFILES:\s*(.+?)\s*\*/").unwrap());
static REDIRECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\*\*REDIRECT\s*\*/").unwrap());

/// How an observed logical exit code is matched against the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitMatch {
    /// `actual == expected`
    Exact,
    /// Every bit set in `actual` is also set in `expected`.
    BitmaskSubset,
}

impl ExitMatch {
    /// Whether `actual` satisfies `expected` under this mode.
    pub fn matches(self, actual: u32, expected: u32) -> bool {
        match self {
            ExitMatch::Exact => actual == expected,
            ExitMatch::BitmaskSubset => (actual & expected) == actual,
        }
    }
}

/// Parameters of one directive-driven test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestDirective {
    /// Subject arguments, in order.
    pub args: Vec<String>,
    pub expected_exit_code: u32,
    pub exit_match: ExitMatch,
    /// The case writes nothing to stdout, so stdout is not verified.
    pub no_output: bool,
    /// Feed the test file to the subject on stdin.
    pub redirect_stdin: bool,
    /// Files to pass to the subject instead of the test file itself.
    pub alt_files: Vec<String>,
    pub wordsize: Option<u32>,
    /// Not runnable on Windows.
    pub not_windows: bool,
    /// Output line counts must match exactly, because the args ask for
    /// blank or comment lines to be discarded.
    pub tally_lines: bool,
}

/// A directive that is present but cannot be interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectiveError {
    /// `SYSCODE` value is not an integer or `|`-combination of integers.
    BadSyscode(String),
    /// `WORDSIZE` value does not fit in a word size.
    BadWordsize(String),
    /// `ALTFILES` and `REDIRECT` were both given.
    AltFilesWithRedirect,
}

impl fmt::Display for DirectiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectiveError::BadSyscode(value) => write!(f, "unparseable SYSCODE \"{value}\""),
            DirectiveError::BadWordsize(value) => write!(f, "unparseable WORDSIZE \"{value}\""),
            DirectiveError::AltFilesWithRedirect => {
                write!(f, "ALTFILES may not be combined with REDIRECT")
            }
        }
    }
}

impl std::error::Error for DirectiveError {}

/// Why an otherwise valid test case is not run on this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotWindows,
    Wordsize { required: u32, host: u32 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotWindows => write!(f, "not Windows-compatible"),
            SkipReason::Wordsize { required, .. } => {
                write!(f, "WORDSIZE={required} is not satisfied")
            }
        }
    }
}

/// The properties of the host that decide whether a case is runnable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Host {
    /// Word size in bits.
    pub wordsize: u32,
    pub windows: bool,
}

impl Host {
    /// The host this harness was compiled for.
    pub fn current() -> Self {
        Host {
            wordsize: usize::BITS,
            windows: cfg!(windows),
        }
    }
}

impl TestDirective {
    /// Extract the directives from the text of a test file.
    ///
    /// Returns `Ok(None)` when the text has no `ARGS` directive.
    pub fn parse(text: &str) -> Result<Option<Self>, DirectiveError> {
        let Some(args) = ARGS.captures(text).map(|c| c[1].to_string()) else {
            return Ok(None);
        };
        let tally_lines = DISCARD.is_match(&args);

        let (expected_exit_code, exit_match) = match SYSCODE.captures(text) {
            Some(c) => parse_syscode(&c[1])?,
            None => (0, ExitMatch::Exact),
        };

        let wordsize = match WORDSIZE.captures(text) {
            Some(c) => Some(
                c[1].parse::<u32>()
                    .map_err(|_| DirectiveError::BadWordsize(c[1].to_string()))?,
            ),
            None => None,
        };

        let alt_files: Vec<String> = ALTFILES
            .captures(text)
            .map(|c| c[1].split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        let redirect_stdin = REDIRECT.is_match(text);
        if redirect_stdin && !alt_files.is_empty() {
            return Err(DirectiveError::AltFilesWithRedirect);
        }

        Ok(Some(TestDirective {
            args: split_args(&args),
            expected_exit_code,
            exit_match,
            no_output: NO_OUTPUT.is_match(text),
            redirect_stdin,
            alt_files,
            wordsize,
            not_windows: NOT_WINDOWS.is_match(text),
            tally_lines,
        }))
    }

    /// Whether this case must be skipped on `host`.
    pub fn skip_reason(&self, host: &Host) -> Option<SkipReason> {
        if host.windows && self.not_windows {
            return Some(SkipReason::NotWindows);
        }
        match self.wordsize {
            Some(required) if required != host.wordsize => Some(SkipReason::Wordsize {
                required,
                host: host.wordsize,
            }),
            _ => None,
        }
    }

    /// Whether the args ask the subject to rewrite its inputs in place.
    pub fn replaces_in_place(&self) -> bool {
        self.args.iter().any(|a| a == "--replace")
    }
}

/// Parse a `SYSCODE` body: `[=] N [| N]...`.
///
/// A leading `=` requests exact matching; otherwise the code is a mask the
/// actual code must fall within.
pub fn parse_syscode(body: &str) -> Result<(u32, ExitMatch), DirectiveError> {
    let bad = || DirectiveError::BadSyscode(body.to_string());
    let (expr, mode) = match body.trim().strip_prefix('=') {
        Some(rest) => (rest, ExitMatch::Exact),
        None => (body, ExitMatch::BitmaskSubset),
    };
    let mut code = 0u32;
    for term in expr.split('|') {
        code |= parse_int(term.trim()).ok_or_else(bad)?;
    }
    Ok((code, mode))
}

fn parse_int(s: &str) -> Option<u32> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINUX64: Host = Host {
        wordsize: 64,
        windows: false,
    };

    #[test]
    fn no_args_means_not_a_test() {
        let text = "/**SYSCODE: = 2 */\nint x;\n";
        assert_eq!(TestDirective::parse(text), Ok(None));
    }

    #[test]
    fn args_only_defaults_to_exact_zero() {
        let d = TestDirective::parse("/**ARGS: source -DFOO */\n").unwrap().unwrap();
        assert_eq!(d.args, vec!["source", "-DFOO"]);
        assert_eq!(d.expected_exit_code, 0);
        assert_eq!(d.exit_match, ExitMatch::Exact);
        assert!(!d.no_output);
        assert!(!d.redirect_stdin);
        assert!(d.alt_files.is_empty());
        assert!(!d.tally_lines);
    }

    #[test]
    fn first_match_wins() {
        let text = "/**ARGS: symbols */\n/**ARGS: source */\n";
        let d = TestDirective::parse(text).unwrap().unwrap();
        assert_eq!(d.args, vec!["symbols"]);
    }

    #[test]
    fn exact_syscode_with_or_expression() {
        let text = "/**ARGS: source */\n/**SYSCODE: = 2 | 16 */\n";
        let d = TestDirective::parse(text).unwrap().unwrap();
        assert_eq!(d.expected_exit_code, 18);
        assert_eq!(d.exit_match, ExitMatch::Exact);
    }

    #[test]
    fn syscode_without_equals_is_a_mask() {
        let text = "/**ARGS: source */\n/**SYSCODE: 0x2|4 */\n";
        let d = TestDirective::parse(text).unwrap().unwrap();
        assert_eq!(d.expected_exit_code, 6);
        assert_eq!(d.exit_match, ExitMatch::BitmaskSubset);
    }

    #[test]
    fn garbage_syscode_is_an_error() {
        let text = "/**ARGS: source */\n/**SYSCODE: = lots */\n";
        assert_eq!(
            TestDirective::parse(text),
            Err(DirectiveError::BadSyscode("= lots".to_string()))
        );
    }

    #[test]
    fn discard_flags_turn_on_line_tally() {
        for args in ["source --discard blank", "source --discard  comment", "source -kb", "source -kc"] {
            let text = format!("/**ARGS: {args} */");
            let d = TestDirective::parse(&text).unwrap().unwrap();
            assert!(d.tally_lines, "{args}");
        }
        let d = TestDirective::parse("/**ARGS: source --discard drop */").unwrap().unwrap();
        assert!(!d.tally_lines);
    }

    #[test]
    fn flags_and_altfiles() {
        let text = "/**ARGS: symbols --once-only */\n\
                    /**NO-OUTPUT */\n\
                    /**NOT-WINDOWS*/\n\
                    /**ALTFILES: ./test_cases/a.h  test_cases/b.h */\n";
        let d = TestDirective::parse(text).unwrap().unwrap();
        assert!(d.no_output);
        assert!(d.not_windows);
        assert_eq!(d.alt_files, vec!["./test_cases/a.h", "test_cases/b.h"]);
        assert!(!d.redirect_stdin);
    }

    #[test]
    fn redirect_is_its_own_directive() {
        let d = TestDirective::parse("/**ARGS: source */\n/**REDIRECT */\n")
            .unwrap()
            .unwrap();
        assert!(d.redirect_stdin);
        assert!(d.alt_files.is_empty());
    }

    #[test]
    fn redirect_and_altfiles_conflict() {
        let text = "/**ARGS: source */\n/**REDIRECT */\n/**ALTFILES: a.h */\n";
        assert_eq!(
            TestDirective::parse(text),
            Err(DirectiveError::AltFilesWithRedirect)
        );
    }

    #[test]
    fn wordsize_and_platform_skips() {
        let d = TestDirective::parse("/**ARGS: source */\n/**WORDSIZE=32 */")
            .unwrap()
            .unwrap();
        assert_eq!(
            d.skip_reason(&LINUX64),
            Some(SkipReason::Wordsize {
                required: 32,
                host: 64
            })
        );
        assert_eq!(
            d.skip_reason(&Host {
                wordsize: 32,
                windows: false
            }),
            None
        );

        let d = TestDirective::parse("/**ARGS: source */\n/**NOT-WINDOWS */")
            .unwrap()
            .unwrap();
        assert_eq!(d.skip_reason(&LINUX64), None);
        assert_eq!(
            d.skip_reason(&Host {
                wordsize: 64,
                windows: true
            }),
            Some(SkipReason::NotWindows)
        );
    }

    #[test]
    fn exit_match_modes() {
        assert!(ExitMatch::Exact.matches(5, 5));
        assert!(!ExitMatch::Exact.matches(5, 7));
        assert!(ExitMatch::BitmaskSubset.matches(0x02, 0x06));
        assert!(ExitMatch::BitmaskSubset.matches(0x00, 0x06));
        assert!(!ExitMatch::BitmaskSubset.matches(0x08, 0x06));
    }
}
