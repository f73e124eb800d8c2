//! The spin suite: the subject mirrors its inputs into a spin directory and
//! every input must be accounted for afterwards.

use std::fs;
use std::path::PathBuf;

use super::{ExitCleanup, OutputFormat, Tally, finish, start_metrics};
use crate::command::{Invocation, ProcessRunner, read_text};
use crate::context::HarnessContext;
use crate::error::{HarnessError, IoContext, Result};
use crate::metrics::remove_if_exists;
use crate::reconcile::{Mirror, Postmortem, abandoned_files, reconcile};
use crate::walk::{self, SOURCE_EXTENSIONS};

pub const PROG: &str = "coan_spin_tester";

/// Fatal diagnostic expected when the spin directory overlaps an input.
pub const GRIPE: &str = "abend 0x0100e: The spin directory cannot include or be included by \
                         or identical with any input directory";

/// Summary expected after that diagnostic.
pub const EPITAPH: &str = "progress 0x02101: Completed ABNORMALLY, exit code 0x08";

#[derive(Debug, Clone, Default)]
pub struct SpinOptions {
    pub format: OutputFormat,
}

/// One spin run and what to check afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SpinTest {
    args: Vec<String>,
    /// Reconcile the spin directory against the inputs.
    verify: bool,
    /// The `--prefix` passed to the subject, if any.
    prefix: Option<String>,
    /// The run must fail with [`GRIPE`] and [`EPITAPH`].
    negative: bool,
}

fn strings<'a>(items: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    items.into_iter().map(str::to_string).collect()
}

/// The six spin runs over `in_dirs` / `in_files`.
fn plan(
    spindir: &str,
    pkgdir: &str,
    filters: &[&str],
    in_dirs: &[String],
    in_files: &[String],
) -> Vec<SpinTest> {
    let filter = filters.join(",");
    let common = strings(["--keepgoing", "-DWINDOWS", "--verbose"]);
    let with = |extra: Vec<String>, inputs: &[String]| -> Vec<String> {
        let mut args = common.clone();
        args.extend(extra);
        args.extend(inputs.iter().cloned());
        args
    };
    let positive = |args: Vec<String>, prefix: Option<String>| SpinTest {
        args,
        verify: true,
        prefix,
        negative: false,
    };
    let negative = |args: Vec<String>| SpinTest {
        args,
        verify: false,
        prefix: None,
        negative: true,
    };
    let bad_dir = PathBuf::from(spindir).join("src").display().to_string();
    let spin_only = vec![spindir.to_string()];
    let bad_only = vec![bad_dir.clone()];

    vec![
        positive(with(strings(["--filter", filter.as_str(), "--dir", spindir]), in_dirs), None),
        positive(with(strings(["--filter", filter.as_str(), "--dir", spindir]), in_files), None),
        positive(
            with(
                strings(["--prefix", pkgdir, "--filter", filter.as_str(), "--dir", spindir]),
                in_dirs,
            ),
            Some(pkgdir.to_string()),
        ),
        negative(with(strings(["--filter", filter.as_str(), "--dir", spindir]), &spin_only[..])),
        negative(with(strings(["--filter", filter.as_str(), "--dir", spindir]), &bad_only[..])),
        negative(with(strings(["--filter", filter.as_str(), "--dir", bad_dir.as_str()]), &spin_only[..])),
    ]
}

/// Run the spin suite; returns the number of failed tests.
pub fn run(ctx: &HarnessContext, runner: &dyn ProcessRunner, opts: &SpinOptions) -> Result<usize> {
    start_metrics(ctx)?;
    let spindir = ctx.testdir.join("spin");
    let stdout_file = ctx.scratch("stdout.temp.txt");
    let stderr_file = ctx.scratch("stderr.temp.txt");
    let postmortem = Postmortem::in_dir(&ctx.testdir);
    for list in postmortem.paths() {
        remove_if_exists(list)?;
    }
    let mut cleanup = ExitCleanup::new(ctx.keep)
        .tree(&spindir)
        .log(&stdout_file)
        .log(&stderr_file)
        .log(&postmortem.infiles)
        .log(&postmortem.outfiles)
        .log(&postmortem.errorfiles);

    let (extensions, filters): (&[&str], &[&str]) = if ctx.host.windows {
        (&["h"], &["h"])
    } else {
        (&SOURCE_EXTENSIONS, &SOURCE_EXTENSIONS)
    };
    let in_dirs = [ctx.pkgdir.join("src"), ctx.testdir.join("test_cases")];
    let in_files: Vec<String> = in_dirs
        .iter()
        .flat_map(|d| walk::files_with_extensions(d, extensions))
        .map(|p| p.display().to_string())
        .collect();
    if in_files.is_empty() {
        return Err(HarnessError::NoTestData(format!(
            "{} or {}",
            in_dirs[0].display(),
            in_dirs[1].display()
        )));
    }
    let in_dirs: Vec<String> = in_dirs.iter().map(|d| d.display().to_string()).collect();
    let spin = spindir.display().to_string();
    let pkg = ctx.pkgdir.display().to_string();

    let mut tally = Tally::default();
    for (n, test) in plan(&spin, &pkg, filters, &in_dirs, &in_files).into_iter().enumerate() {
        let testno = n + 1;
        if test.verify && spindir.is_dir() {
            fs::remove_dir_all(&spindir).with_path("failed to delete directory", &spindir)?;
        }
        ctx.metrics().record_size(in_files.len())?;
        tracing::debug!("*** Spin Test {testno}: to process {} files ***", in_files.len());
        let invocation = Invocation::new(ctx.executable())
            .arg("spin")
            .args(test.args.clone())
            .stdout(&stdout_file)
            .stderr(&stderr_file);
        runner.run(&invocation)?;
        tracing::debug!("*** Done Test {testno} ***");

        let text = read_text(&stderr_file)?;
        let mut passed = true;
        if test.verify {
            let outputs: Vec<PathBuf> = walk::files_with_extensions(&spindir, extensions).collect();
            let abandoned = abandoned_files(&text);
            let mirror = Mirror {
                output_root: spindir.clone(),
                prefix: test.prefix.clone(),
                windows: ctx.host.windows,
            };
            let result = reconcile(&in_files, &outputs, &abandoned, &mirror);
            tracing::debug!(
                "*** {} reconciled, {} abandoned ***",
                result.reconciled.len(),
                result.abandoned.len()
            );
            if !result.passed() {
                postmortem.write(&in_files, &outputs, &abandoned)?;
                tracing::error!(
                    "*** Failed to name-match output files and abandoned files with input files: \
                     See {}, {}. {} ****",
                    postmortem.infiles.display(),
                    postmortem.outfiles.display(),
                    postmortem.errorfiles.display()
                );
                passed = false;
            }
        }
        let expected_trailer = if test.negative {
            text.contains(GRIPE) && text.contains(EPITAPH)
        } else {
            text.contains(&format!(
                "info 0x02201: {0} out of {0} input files were reached",
                in_files.len()
            ))
        };
        if !expected_trailer {
            tracing::error!("*** Spin test {testno}: Failed! See {} ****", stderr_file.display());
            passed = false;
        }
        tally.record(passed);
        if tally.should_bail(ctx) {
            break;
        }
    }
    cleanup.set_failed(tally.failures > 0);
    tracing::info!("{} out of {} tests failed", tally.failures, tally.tests);
    finish(ctx, tally, opts.format)
}
