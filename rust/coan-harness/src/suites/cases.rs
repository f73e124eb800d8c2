//! The case suite: directive-driven runs over test files, or one batch run
//! over all of them.

use std::fs;
use std::path::{Path, PathBuf};

use facet::Facet;

use super::{OutputFormat, Tally, finish, start_metrics};
use crate::case::{CaseEnv, Prepared, TestCase};
use crate::command::{ProcessRunner, split_args};
use crate::context::HarnessContext;
use crate::differential::remove_backup_debris;
use crate::error::{HarnessError, IoContext, Result};

pub const PROG: &str = "coan_case_tester";

/// Options of the case suite.
#[derive(Debug, Clone, Default)]
pub struct CasesOptions {
    /// Test files; empty means every `test_cases/*.c` in the test directory.
    pub files: Vec<PathBuf>,
    /// Batch arguments. When set, all files go to the subject in one run
    /// and only the exit code is verified.
    pub monkey: Option<String>,
    /// Expected exit code of the batch run.
    pub rc: u32,
    /// List the cases instead of running them.
    pub list: bool,
    pub format: OutputFormat,
}

/// One entry of `--list`.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct CaseListing {
    pub name: String,
    pub args: Vec<String>,
    /// Why the case would be skipped on this host, if it would.
    pub skip: Option<String>,
}

/// `<testdir>/test_cases/*.c`, sorted.
pub fn default_files(ctx: &HarnessContext) -> Result<Vec<PathBuf>> {
    let dir = ctx.testdir.join("test_cases");
    let mut files: Vec<PathBuf> = fs::read_dir(&dir)
        .with_path("cannot read directory", &dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "c"))
        .collect();
    files.sort();
    Ok(files)
}

fn resolve_files(ctx: &HarnessContext, opts: &CasesOptions) -> Result<Vec<PathBuf>> {
    let mut files = if opts.files.is_empty() {
        default_files(ctx)?
    } else {
        opts.files.clone()
    };
    if files.is_empty() {
        return Err(HarnessError::NoTestData(
            ctx.testdir.join("test_cases").display().to_string(),
        ));
    }
    files.sort();
    Ok(files)
}

/// What `--list` reports for each file: its composed arguments, or why it
/// would be skipped. Files without directives are left out.
pub fn listings(env: &CaseEnv, files: &[PathBuf]) -> Result<Vec<CaseListing>> {
    let mut listings = Vec::new();
    for file in files {
        let name = file.display().to_string();
        let listing = match TestCase::prepare(file, env)? {
            Prepared::NotATest => continue,
            Prepared::Skip(reason) => CaseListing {
                name,
                args: Vec::new(),
                skip: Some(reason.to_string()),
            },
            Prepared::Run(case) => CaseListing {
                name,
                args: case.compose()?.invocation.args,
                skip: None,
            },
        };
        listings.push(listing);
    }
    Ok(listings)
}

pub fn render_listings(listings: &[CaseListing], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            Ok(facet_json::to_string(&listings.to_vec()))
        }
        OutputFormat::Text => {
            let mut out = String::new();
            for l in listings {
                match &l.skip {
                    Some(reason) => out.push_str(&format!("{} [skip: {reason}]\n", l.name)),
                    None => out.push_str(&format!("{} {}\n", l.name, l.args.join(" "))),
                }
            }
            out.push_str(&format!("\nTotal: {} tests", listings.len()));
            Ok(out)
        }
    }
}

/// Run one file's case, folding per-file setup failures into the tally.
fn run_one(
    case_file: &Path,
    env: &CaseEnv,
    runner: &dyn ProcessRunner,
    tally: &mut Tally,
) -> Result<()> {
    let outcome = TestCase::prepare(case_file, env).and_then(|prepared| match prepared {
        Prepared::NotATest => {
            tracing::debug!("*** No ARGS in \"{}\": skipped", case_file.display());
            Ok(None)
        }
        Prepared::Skip(reason) => {
            tracing::info!("*** Skipping \"{}\": {reason}", case_file.display());
            Ok(None)
        }
        Prepared::Run(case) => case.run(runner).map(Some),
    });
    match outcome {
        Ok(Some(outcome)) => tally.record(outcome.verdict.passed()),
        Ok(None) => tally.skipped += 1,
        Err(e @ HarnessError::Launch { .. }) => return Err(e),
        Err(e) => {
            tracing::error!("*** FAILED test file \"{}\". {e}", case_file.display());
            tally.record(false);
        }
    }
    Ok(())
}

/// Run the case suite; returns the number of failed tests.
pub fn run(ctx: &HarnessContext, runner: &dyn ProcessRunner, opts: &CasesOptions) -> Result<usize> {
    let env = ctx.case_env();
    let files = resolve_files(ctx, opts)?;
    if opts.list {
        println!("{}", render_listings(&listings(&env, &files)?, opts.format)?);
        return Ok(0);
    }

    start_metrics(ctx)?;
    tracing::debug!("*** Case tester: to process {} files ***", files.len());
    ctx.metrics().record_size(files.len())?;

    let mut tally = Tally::default();
    match &opts.monkey {
        None => {
            for file in &files {
                run_one(file, &env, runner, &mut tally)?;
                if tally.should_bail(ctx) {
                    break;
                }
            }
        }
        Some(monkey) => {
            let files = files
                .iter()
                .map(|f| std::path::absolute(f).with_path("cannot resolve file", f))
                .collect::<Result<Vec<_>>>()?;
            remove_backup_debris(&files)?;
            let case = TestCase::monkey(files, split_args(monkey), opts.rc, &env);
            tally.record(case.run(runner)?.verdict.passed());
        }
    }

    if !tally.should_bail(ctx) {
        tracing::info!("{} out of {} tests failed", tally.failures, tally.tests);
    }
    finish(ctx, tally, opts.format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextOptions;

    fn context(pkgdir: &Path) -> HarnessContext {
        HarnessContext::resolve(ContextOptions {
            prog: PROG.to_string(),
            pkgdir: Some(pkgdir.to_path_buf()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn default_files_are_sorted_c_files() {
        let dir = tempfile::tempdir().unwrap();
        let cases = dir.path().join("test_coan/test_cases");
        fs::create_dir_all(&cases).unwrap();
        for name in ["test0002.c", "test0001.c", "test0001.c.expect", "notes.txt"] {
            fs::write(cases.join(name), "").unwrap();
        }
        let files = default_files(&context(dir.path())).unwrap();
        assert_eq!(files, vec![cases.join("test0001.c"), cases.join("test0002.c")]);
    }

    #[test]
    fn no_files_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("test_coan/test_cases")).unwrap();
        let err = resolve_files(&context(dir.path()), &CasesOptions::default()).unwrap_err();
        assert!(matches!(err, HarnessError::NoTestData(_)));
    }

    #[test]
    fn listing_renders_args_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        let cases = dir.path().join("test_coan/test_cases");
        fs::create_dir_all(&cases).unwrap();
        fs::write(cases.join("test0001.c"), "/**ARGS: source -DFOO */\n").unwrap();
        fs::write(cases.join("test0002.c"), "/**ARGS: source */\n/**WORDSIZE=16 */\n").unwrap();
        fs::write(cases.join("test0003.c"), "int x;\n").unwrap();
        let ctx = context(dir.path());

        let listed = listings(&ctx.case_env(), &default_files(&ctx).unwrap()).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].args[..3], ["source", "-DFOO", "--verbose"]);
        assert_eq!(listed[0].skip, None);
        assert!(listed[1].skip.as_deref().is_some_and(|r| r.contains("WORDSIZE=16")));

        let json = render_listings(&listed, OutputFormat::Json).unwrap();
        assert!(json.starts_with('['), "{json}");
        assert!(json.contains("\"args\":[\"source\",\"-DFOO\",\"--verbose\""), "{json}");
        assert!(json.contains("WORDSIZE=16"), "{json}");

        let text = render_listings(&listed, OutputFormat::Text).unwrap();
        assert!(text.ends_with("Total: 2 tests"), "{text}");
    }
}
