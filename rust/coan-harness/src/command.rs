//! Subject invocations and the process substrate that runs them.

use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use std::time::Instant;

use regex::Regex;

use crate::error::{HarnessError, IoContext, Result};

static EXIT_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"exit code (0x[a-fA-F0-9]+)").unwrap());

/// One synchronous run of a program with optional stream redirections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub stdin: Option<PathBuf>,
    pub stdout: Option<PathBuf>,
    pub stderr: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Invocation {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            stdout: None,
            stderr: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    pub fn stdout(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    pub fn stderr(mut self, path: impl Into<PathBuf>) -> Self {
        self.stderr = Some(path.into());
        self
    }

    /// Shell-like rendering for logs: `prog args... [<stdin]`.
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        if let Some(stdin) = &self.stdin {
            let _ = write!(line, " <{}", stdin.display());
        }
        line
    }
}

/// Runs invocations to completion and reports the OS exit status.
///
/// The status is returned uninterpreted; the subject's logical exit code
/// lives in its stderr and is read by [`SubjectResult::from_stderr`].
pub trait ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<i32>;
}

/// Runs invocations as real child processes.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    /// When set, every run appends its elapsed seconds to this file.
    timing_log: Option<PathBuf>,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timing_log(timing_log: impl Into<PathBuf>) -> Self {
        SystemRunner {
            timing_log: Some(timing_log.into()),
        }
    }

    fn record_time(&self, seconds: f64) -> Result<()> {
        let Some(log) = &self.timing_log else {
            return Ok(());
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log)
            .with_path("cannot open timing log", log)?;
        writeln!(file, "{seconds:.6}").with_path("cannot write timing log", log)
    }
}

fn redirect_in(path: &Option<PathBuf>) -> Result<Stdio> {
    match path {
        Some(p) => Ok(File::open(p).with_path("cannot open file for reading", p)?.into()),
        None => Ok(Stdio::null()),
    }
}

fn redirect_out(path: &Option<PathBuf>) -> Result<Stdio> {
    match path {
        Some(p) => Ok(File::create(p).with_path("cannot open file for writing", p)?.into()),
        None => Ok(Stdio::inherit()),
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<i32> {
        tracing::debug!("*** Running: {}", invocation.command_line());
        let start = Instant::now();
        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(redirect_in(&invocation.stdin)?)
            .stdout(redirect_out(&invocation.stdout)?)
            .stderr(redirect_out(&invocation.stderr)?)
            .status()
            .map_err(|source| HarnessError::Launch {
                program: invocation.program.clone(),
                source,
            })?;
        self.record_time(start.elapsed().as_secs_f64())?;
        Ok(status.code().unwrap_or(-1))
    }
}

/// Read a captured stream or source file as text. Invalid UTF-8 is
/// replaced rather than rejected: C sources and subject diagnostics may
/// carry Latin-1.
pub fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_path("cannot open file for reading", path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// What one subject run reported: the OS-level status and the logical
/// exit code the subject printed in its stderr trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubjectResult {
    pub status: i32,
    pub logical_code: u32,
}

impl SubjectResult {
    /// Pair an OS status with the logical code parsed from a captured
    /// stderr file. A stderr without the code is a harness failure.
    pub fn from_stderr(status: i32, stderr: &Path) -> Result<Self> {
        let text = read_text(stderr)?;
        let logical_code = parse_logical_code(&text).ok_or_else(|| HarnessError::MissingExitCode {
            stderr: stderr.to_path_buf(),
        })?;
        Ok(SubjectResult {
            status,
            logical_code,
        })
    }
}

/// Find the first `exit code 0x..` token in the subject's stderr.
pub fn parse_logical_code(stderr: &str) -> Option<u32> {
    let caps = EXIT_CODE.captures(stderr)?;
    u32::from_str_radix(&caps[1][2..], 16).ok()
}

/// Split an argument string on whitespace, honouring single and double
/// quotes. Quotes group but are not kept: `--backup "~"` is `--backup`, `~`.
pub fn split_args(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    for ch in s.chars() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => cur.push(ch),
            None if ch == '"' || ch == '\'' => {
                quote = Some(ch);
                in_word = true;
            }
            None if ch.is_whitespace() => {
                if in_word {
                    out.push(std::mem::take(&mut cur));
                    in_word = false;
                }
            }
            None => {
                cur.push(ch);
                in_word = true;
            }
        }
    }
    if in_word {
        out.push(cur);
    }
    out
}

/// Rewrite path separators for the host platform.
pub fn host_path(path: &str, windows: bool) -> String {
    if windows {
        path.replace('/', "\\")
    } else {
        path.to_string()
    }
}
