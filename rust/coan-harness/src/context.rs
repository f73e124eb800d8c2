//! The harness context: everything a suite needs to know about where it
//! runs, resolved once at startup and passed explicitly.

use std::env;
use std::path::{Path, PathBuf};

use crate::case::CaseEnv;
use crate::command::SystemRunner;
use crate::directive::Host;
use crate::error::{IoContext, Result};
use crate::metrics::MetricsFiles;

/// Resolved, immutable harness configuration.
#[derive(Debug, Clone)]
pub struct HarnessContext {
    /// Program name used for metrics files and log prefixes.
    pub prog: String,
    /// The coan package directory.
    pub pkgdir: PathBuf,
    /// `<pkgdir>/test_coan`, the test working directory.
    pub testdir: PathBuf,
    /// Directory holding the subject executable.
    pub execdir: PathBuf,
    pub host: Host,
    /// Stop at the first failing case.
    pub fail_fast: bool,
    /// Preserve generated trees and console logs at exit.
    pub keep: bool,
    /// Append per-run elapsed time to the time file.
    pub timing: bool,
}

/// Inputs to [`HarnessContext`], typically straight from the command line.
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    pub prog: String,
    pub pkgdir: Option<PathBuf>,
    pub execdir: Option<PathBuf>,
    pub fail_fast: bool,
    pub keep: bool,
}

impl HarnessContext {
    pub fn resolve(opts: ContextOptions) -> Result<Self> {
        let pkgdir = deduce_pkgdir(opts.pkgdir)?;
        let execdir = deduce_execdir(opts.execdir, &pkgdir)?;
        Ok(HarnessContext {
            prog: opts.prog,
            testdir: pkgdir.join("test_coan"),
            pkgdir,
            execdir,
            host: Host::current(),
            fail_fast: opts.fail_fast,
            keep: opts.keep,
            timing: env::var("TIMING_METRICS").is_ok_and(|v| v == "1"),
        })
    }

    /// The subject executable.
    pub fn executable(&self) -> PathBuf {
        let name = if self.host.windows { "coan.exe" } else { "coan" };
        self.execdir.join(name)
    }

    pub fn metrics(&self) -> MetricsFiles {
        MetricsFiles::for_program(&self.testdir, &self.prog)
    }

    /// A process runner that records timings when timing is enabled.
    pub fn runner(&self) -> SystemRunner {
        if self.timing {
            SystemRunner::with_timing_log(self.metrics().time_file)
        } else {
            SystemRunner::new()
        }
    }

    /// A scratch file in the test directory, e.g. `stderr.temp.txt`.
    pub fn scratch(&self, name: &str) -> PathBuf {
        self.testdir.join(name)
    }

    /// What test cases need to know about this context.
    pub fn case_env(&self) -> CaseEnv {
        CaseEnv {
            executable: self.executable(),
            testdir: self.testdir.clone(),
            host: self.host,
        }
    }
}

/// `--pkgdir`, else `$COAN_PKGDIR`, else `..`; made absolute.
pub fn deduce_pkgdir(arg: Option<PathBuf>) -> Result<PathBuf> {
    let pkgdir = arg
        .or_else(|| env::var_os("COAN_PKGDIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(".."));
    std::path::absolute(&pkgdir).with_path("cannot resolve directory", pkgdir)
}

/// `--execdir` (default `src`) beneath `$COAN_BUILDDIR`, else beneath the
/// package directory; made absolute.
pub fn deduce_execdir(arg: Option<PathBuf>, pkgdir: &Path) -> Result<PathBuf> {
    let execdir = arg.unwrap_or_else(|| PathBuf::from("src"));
    let builddir = env::var_os("COAN_BUILDDIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| pkgdir.to_path_buf());
    let joined = builddir.join(execdir);
    std::path::absolute(&joined).with_path("cannot resolve directory", joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_pkgdir_wins_and_is_absolute() {
        let p = deduce_pkgdir(Some(PathBuf::from("some/pkg"))).unwrap();
        assert!(p.is_absolute());
        assert!(p.ends_with("some/pkg"));
    }

    #[test]
    fn absolute_execdir_ignores_builddir() {
        let dir = tempfile::tempdir().unwrap();
        let e = deduce_execdir(Some(dir.path().join("bin")), Path::new("/pkg")).unwrap();
        assert_eq!(e, dir.path().join("bin"));
    }

    #[test]
    fn context_paths() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = HarnessContext::resolve(ContextOptions {
            prog: "coan_case_tester".to_string(),
            pkgdir: Some(dir.path().to_path_buf()),
            execdir: Some(dir.path().join("bin")),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(ctx.testdir, dir.path().join("test_coan"));
        assert_eq!(ctx.executable().parent(), Some(dir.path().join("bin").as_path()));
        assert_eq!(
            ctx.metrics().size_file,
            dir.path().join("test_coan").join("coan_case_tester.size.txt")
        );
        assert_eq!(ctx.scratch("stderr.temp.txt"), ctx.testdir.join("stderr.temp.txt"));
        assert_eq!(ctx.case_env().executable, ctx.executable());
    }
}
