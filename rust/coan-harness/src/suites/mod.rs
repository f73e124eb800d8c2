//! The test suites built on the engine, one per subcommand.

pub mod bulk;
pub mod cases;
pub mod metrics;
pub mod rewind;
pub mod scrap;
pub mod softlink;
pub mod spin;

use std::fs;
use std::path::PathBuf;

use facet::Facet;

use crate::context::HarnessContext;
use crate::error::{IoContext, Result};
use crate::metrics::{MetricsReport, remove_if_exists};

/// How a suite reports its result on stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Running count of tests, failures and skips.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub tests: usize,
    pub failures: usize,
    pub skipped: usize,
}

impl Tally {
    pub fn record(&mut self, passed: bool) {
        self.tests += 1;
        self.failures += usize::from(!passed);
    }

    /// Whether a fail-fast context should stop now.
    pub fn should_bail(&self, ctx: &HarnessContext) -> bool {
        ctx.fail_fast && self.failures > 0
    }
}

/// Summary of one suite run, printed as JSON with `--format json`.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct SuiteReport {
    pub program: String,
    pub tests: usize,
    pub failures: usize,
    pub skipped: usize,
}

impl SuiteReport {
    pub fn new(ctx: &HarnessContext, tally: Tally) -> Self {
        SuiteReport {
            program: ctx.prog.clone(),
            tests: tally.tests,
            failures: tally.failures,
            skipped: tally.skipped,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(facet_json::to_string(self))
    }
}

/// Reset the metrics files of `ctx`'s program before a suite starts.
pub fn start_metrics(ctx: &HarnessContext) -> Result<()> {
    fs::create_dir_all(&ctx.testdir).with_path("failed to create directory", &ctx.testdir)?;
    ctx.metrics().reset()
}

/// End a suite: on failure the metrics files are deleted, otherwise they
/// are reported. Returns the failure count.
pub fn finish(ctx: &HarnessContext, tally: Tally, format: OutputFormat) -> Result<usize> {
    let metrics = ctx.metrics();
    if tally.failures > 0 {
        metrics.reset()?;
    } else {
        MetricsReport::gather(&[metrics.time_file.clone()], &[metrics.size_file.clone()])?.log();
    }
    if format == OutputFormat::Json {
        println!("{}", SuiteReport::new(ctx, tally).to_json()?);
    }
    Ok(tally.failures)
}

/// Deletes generated trees and scratch logs when a suite ends.
///
/// Trees go unless `keep` was asked for; logs stay when the suite failed
/// so they can be inspected.
#[derive(Debug)]
pub struct ExitCleanup {
    trees: Vec<PathBuf>,
    logs: Vec<PathBuf>,
    keep: bool,
    failed: bool,
}

impl ExitCleanup {
    pub fn new(keep: bool) -> Self {
        ExitCleanup {
            trees: Vec::new(),
            logs: Vec::new(),
            keep,
            failed: false,
        }
    }

    pub fn tree(mut self, path: impl Into<PathBuf>) -> Self {
        self.trees.push(path.into());
        self
    }

    pub fn log(mut self, path: impl Into<PathBuf>) -> Self {
        self.logs.push(path.into());
        self
    }

    pub fn set_failed(&mut self, failed: bool) {
        self.failed = failed;
    }
}

impl Drop for ExitCleanup {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        for tree in &self.trees {
            if tree.is_dir()
                && let Err(e) = fs::remove_dir_all(tree)
            {
                tracing::warn!("failed to delete directory \"{}\": {e}", tree.display());
            }
        }
        if self.failed {
            return;
        }
        for log in &self.logs {
            if let Err(e) = remove_if_exists(log) {
                tracing::warn!("{e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_counts() {
        let mut t = Tally::default();
        t.record(true);
        t.record(false);
        t.record(true);
        assert_eq!(t.tests, 3);
        assert_eq!(t.failures, 1);
    }

    #[test]
    fn cleanup_keeps_logs_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("spin");
        let log = dir.path().join("stderr.temp.txt");
        fs::create_dir_all(tree.join("deep")).unwrap();
        fs::write(&log, "x").unwrap();

        let mut cleanup = ExitCleanup::new(false).tree(&tree).log(&log);
        cleanup.set_failed(true);
        drop(cleanup);
        assert!(!tree.exists());
        assert!(log.exists());

        drop(ExitCleanup::new(false).log(&log));
        assert!(!log.exists());
    }

    #[test]
    fn keep_preserves_everything() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("scrap");
        fs::create_dir_all(&tree).unwrap();
        drop(ExitCleanup::new(true).tree(&tree));
        assert!(tree.exists());
    }

    #[test]
    fn report_serializes() {
        let report = SuiteReport {
            program: "coan_case_tester".to_string(),
            tests: 3,
            failures: 1,
            skipped: 0,
        };
        let json = report.to_json().unwrap();
        assert!(json.contains("\"program\":\"coan_case_tester\""), "{json}");
        assert!(json.contains("\"failures\":1"), "{json}");
    }
}
