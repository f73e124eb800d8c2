//! Test cases: composing a subject run from directives and judging it.

use std::path::{Path, PathBuf};

use crate::command::{Invocation, ProcessRunner, SubjectResult, host_path, read_text};
use crate::directive::{ExitMatch, Host, SkipReason, TestDirective};
use crate::error::{HarnessError, Result};
use crate::verify::{Comparison, FailureReason, Substitutions, Verdict, compare_files, verify_exit};

/// Fixed capture names used when the subject rewrites its inputs in place.
pub const REPLACE_STDOUT: &str = "coan.stdout.tmp";
pub const REPLACE_STDERR: &str = "coan.stderr.tmp";

/// Where a case gets its subject arguments from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseMode {
    /// Parameters come from the first file's header directives.
    Directive(TestDirective),
    /// One batch run over every file with manually supplied arguments;
    /// only the exit code is verified, exactly.
    Monkey { args: Vec<String>, expected: u32 },
}

/// What the harness knows about where cases run.
#[derive(Debug, Clone)]
pub struct CaseEnv {
    pub executable: PathBuf,
    /// Test working directory: `ALTFILES` resolve against it and `{CWD}`
    /// expands to it. In-place captures are written here too.
    pub testdir: PathBuf,
    pub host: Host,
}

/// One unit of execution.
#[derive(Debug, Clone)]
pub struct TestCase {
    pub files: Vec<PathBuf>,
    pub mode: CaseMode,
    pub env: CaseEnv,
}

/// Result of preparing a case from a test file.
#[derive(Debug, Clone)]
pub enum Prepared {
    Run(TestCase),
    /// The file carries no `ARGS` directive.
    NotATest,
    Skip(SkipReason),
}

/// A fully composed subject run and where its streams are captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composed {
    pub invocation: Invocation,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

/// The observed result and the judgment of one case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseOutcome {
    pub subject: SubjectResult,
    pub verdict: Verdict,
}

/// `<file><suffix>`, e.g. `test0001.c.expect`.
pub fn sibling(file: &Path, suffix: &str) -> PathBuf {
    let mut s = file.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

impl TestCase {
    /// Read a test file's directives and decide whether it is a runnable case.
    pub fn prepare(file: &Path, env: &CaseEnv) -> Result<Prepared> {
        let text = read_text(file)?;
        let directive = TestDirective::parse(&text).map_err(|source| HarnessError::Directive {
            path: file.to_path_buf(),
            source,
        })?;
        let Some(directive) = directive else {
            return Ok(Prepared::NotATest);
        };
        if let Some(reason) = directive.skip_reason(&env.host) {
            return Ok(Prepared::Skip(reason));
        }
        Ok(Prepared::Run(TestCase {
            files: vec![file.to_path_buf()],
            mode: CaseMode::Directive(directive),
            env: env.clone(),
        }))
    }

    /// A batch case over `files` with manual `args`.
    pub fn monkey(files: Vec<PathBuf>, args: Vec<String>, expected: u32, env: &CaseEnv) -> Self {
        TestCase {
            files,
            mode: CaseMode::Monkey { args, expected },
            env: env.clone(),
        }
    }

    fn args(&self) -> Vec<String> {
        match &self.mode {
            CaseMode::Directive(d) => d.args.clone(),
            CaseMode::Monkey { args, .. } => {
                let mut args = args.clone();
                args.push("--keepgoing".to_string());
                args
            }
        }
    }

    fn in_place(&self) -> bool {
        self.args().iter().any(|a| a == "--replace")
    }

    /// The files handed to the subject: the alternates if any, else the
    /// nominal files.
    pub fn input_files(&self) -> Vec<PathBuf> {
        match &self.mode {
            CaseMode::Directive(d) if !d.alt_files.is_empty() => d
                .alt_files
                .iter()
                .map(|f| {
                    let p = Path::new(f);
                    if p.is_absolute() {
                        p.to_path_buf()
                    } else {
                        self.env.testdir.join(f.strip_prefix("./").unwrap_or(f))
                    }
                })
                .collect(),
            _ => self.files.clone(),
        }
    }

    fn first_file(&self) -> Result<&Path> {
        self.files
            .first()
            .map(PathBuf::as_path)
            .ok_or_else(|| HarnessError::NoTestData("an empty test case".to_string()))
    }

    /// Build the subject run for this case. A case without files is an
    /// error.
    pub fn compose(&self) -> Result<Composed> {
        let first = self.first_file()?;
        let (stdout, stderr) = if self.in_place() {
            (self.env.testdir.join(REPLACE_STDOUT), self.env.testdir.join(REPLACE_STDERR))
        } else {
            (sibling(first, ".output"), sibling(first, ".stderr"))
        };
        let files: Vec<String> = self
            .input_files()
            .iter()
            .map(|f| host_path(&f.display().to_string(), self.env.host.windows))
            .collect();

        let mut invocation = Invocation::new(&self.env.executable)
            .args(self.args())
            .arg("--verbose")
            .stdout(&stdout)
            .stderr(&stderr);
        let redirect = matches!(&self.mode, CaseMode::Directive(d) if d.redirect_stdin);
        let stdin = if redirect { files.first().cloned() } else { None };
        invocation = match stdin {
            Some(input) => invocation.stdin(input),
            None => invocation.args(files),
        };
        Ok(Composed {
            invocation,
            stdout,
            stderr,
        })
    }

    fn announce(&self) {
        let names: Vec<String> = self.files.iter().map(|f| f.display().to_string()).collect();
        tracing::debug!("*** Running test file(s) \"{}\"", names.join(" "));
        tracing::debug!("*** ARGS: {}", self.args().join(" "));
        if let CaseMode::Directive(d) = &self.mode {
            if !d.alt_files.is_empty() {
                tracing::debug!("*** ALTFILES: {}", d.alt_files.join(" "));
            }
            match d.exit_match {
                ExitMatch::Exact => tracing::debug!("*** SYSCODE: = {:#04x}", d.expected_exit_code),
                ExitMatch::BitmaskSubset => {
                    tracing::debug!("*** SYSCODE: match {:#04x}", d.expected_exit_code)
                }
            }
            if d.no_output {
                tracing::debug!("*** NO-OUTPUT");
            }
            if d.redirect_stdin {
                tracing::debug!("*** REDIRECT");
            }
        }
    }

    /// Run the subject and verify everything the case expects.
    ///
    /// A stderr without a logical exit code is an error; every other
    /// discrepancy is a [`FailureReason`] in the verdict.
    pub fn run(&self, runner: &dyn ProcessRunner) -> Result<CaseOutcome> {
        let composed = self.compose()?;
        self.announce();
        let status = runner.run(&composed.invocation)?;
        let subject = SubjectResult::from_stderr(status, &composed.stderr)?;

        let mut verdict = Verdict::default();
        let (expected, mode) = match &self.mode {
            CaseMode::Directive(d) => (d.expected_exit_code, d.exit_match),
            CaseMode::Monkey { expected, .. } => (*expected, ExitMatch::Exact),
        };
        if !verify_exit(subject.logical_code, expected, mode) {
            verdict.fail(FailureReason::Syscode {
                actual: subject.logical_code,
                expected,
                mode,
            });
        }

        if let CaseMode::Directive(d) = &self.mode {
            let subs = Substitutions::new(&self.env.testdir, self.env.host.windows);
            let first = self.first_file()?;
            if !d.no_output {
                let reference = sibling(first, ".expect");
                match compare_files(&reference, &composed.stdout, d.tally_lines, &subs) {
                    Ok(Comparison::Match) => {}
                    Ok(c) => verdict.fail(FailureReason::Output(c)),
                    Err(HarnessError::MissingReference(p)) => {
                        verdict.fail(FailureReason::MissingReference(p))
                    }
                    Err(e) => return Err(e),
                }
            }
            let stderr_reference = sibling(first, ".stderr.expect");
            if stderr_reference.exists() {
                let c = compare_files(&stderr_reference, &composed.stderr, d.tally_lines, &subs)?;
                if !c.is_match() {
                    verdict.fail(FailureReason::Diagnostics(c));
                }
            }
        }

        let names: Vec<String> = self.files.iter().map(|f| f.display().to_string()).collect();
        for reason in &verdict.failures {
            tracing::error!("*** FAILED test file(s) \"{}\". {reason}", names.join(" "));
        }
        if verdict.passed() && matches!(self.mode, CaseMode::Directive(_)) {
            tracing::debug!("*** PASSED");
        }
        Ok(CaseOutcome { subject, verdict })
    }
}
