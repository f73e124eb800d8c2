//! The rewind suite: transient symbols must be purged after every input
//! file, so batch runs must agree with single-file runs.

use super::{OutputFormat, Tally, finish, start_metrics};
use crate::command::ProcessRunner;
use crate::context::HarnessContext;
use crate::differential::DifferentialRun;
use crate::error::Result;

pub const PROG: &str = "coan_symbol_rewind_tester";

/// File pairs under `test_cases` and the batch exit code each pair expects.
pub const PAIRS: [([&str; 2], u32); 2] = [
    (["test0286.c", "test0287.c"], 19),
    (["test0393.c", "test0394.c"], 5),
];

#[derive(Debug, Clone, Default)]
pub struct RewindOptions {
    pub format: OutputFormat,
}

/// Run the rewind suite; returns the number of failed tests.
pub fn run(ctx: &HarnessContext, runner: &dyn ProcessRunner, opts: &RewindOptions) -> Result<usize> {
    start_metrics(ctx)?;
    let env = ctx.case_env();
    let cases = ctx.testdir.join("test_cases");
    let mut tally = Tally::default();
    for (n, (names, expected)) in PAIRS.into_iter().enumerate() {
        let files = names.iter().map(|name| cases.join(name)).collect::<Vec<_>>();
        tracing::debug!(
            "*** Symbol-rewind test {}: to process {} files ***",
            n + 1,
            files.len()
        );
        ctx.metrics().record_size(files.len())?;
        let outcome = DifferentialRun::new(files, expected).run(&env, runner)?;
        tally.record(outcome.passed());
        if tally.should_bail(ctx) {
            break;
        }
    }
    tracing::info!("{} out of {} tests failed", tally.failures, tally.tests);
    finish(ctx, tally, opts.format)
}
