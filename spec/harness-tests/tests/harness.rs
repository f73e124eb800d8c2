//! End-to-end runs of the harness suites against `mock-coan`.
//!
//! Each trial builds a throwaway package directory:
//!
//! ```text
//! <pkgdir>/bin/coan            copy of mock-coan
//! <pkgdir>/src/...             sources for spin and bulk
//! <pkgdir>/test_coan/test_cases/...
//! ```
//!
//! and calls the library suites with a real [`SystemRunner`].

use std::fs;
use std::path::{Path, PathBuf};

use coan_harness::command::{Invocation, ProcessRunner, SystemRunner};
use coan_harness::context::{ContextOptions, HarnessContext};
use coan_harness::differential::{DifferentialRun, Mismatch};
use coan_harness::reconcile::{Mirror, abandoned_files, reconcile};
use coan_harness::suites::{self, OutputFormat};
use coan_harness::walk;
use libtest_mimic::{Arguments, Failed, Trial};
use tempfile::TempDir;

type TrialResult = Result<(), Failed>;

struct Fixture {
    _dir: TempDir,
    pkgdir: PathBuf,
}

impl Fixture {
    fn new() -> Result<Self, Failed> {
        let dir = tempfile::tempdir()?;
        let pkgdir = dir.path().to_path_buf();
        let bin = pkgdir.join("bin");
        fs::create_dir_all(&bin)?;
        fs::copy(env!("CARGO_BIN_EXE_mock-coan"), bin.join("coan"))?;
        fs::create_dir_all(pkgdir.join("src"))?;
        fs::create_dir_all(pkgdir.join("test_coan/test_cases"))?;
        Ok(Fixture { _dir: dir, pkgdir })
    }

    fn write(&self, rel: &str, text: &str) -> Result<PathBuf, Failed> {
        let path = self.pkgdir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, text)?;
        Ok(path)
    }

    fn case(&self, name: &str, text: &str) -> Result<PathBuf, Failed> {
        self.write(&format!("test_coan/test_cases/{name}"), text)
    }

    fn context(&self, prog: &str) -> Result<HarnessContext, Failed> {
        Ok(HarnessContext::resolve(ContextOptions {
            prog: prog.to_string(),
            pkgdir: Some(self.pkgdir.clone()),
            execdir: Some(self.pkgdir.join("bin")),
            ..Default::default()
        })?)
    }

    /// Make transient symbols leak from one input file to the next.
    fn leaky(&self) -> Result<(), Failed> {
        fs::write(self.pkgdir.join("bin/mock-coan.leak"), "")?;
        Ok(())
    }
}

fn check(cond: bool, msg: impl Into<String>) -> TrialResult {
    if cond {
        return Ok(());
    }
    let msg: String = msg.into();
    Err(msg.into())
}

const RESOLVED: &str = "/**ARGS: source -DFOO */\n\
                        /**SYSCODE: = 1 */\n\
                        #ifdef FOO\n\
                        int yes;\n\
                        #else\n\
                        int no;\n\
                        #endif\n";

const RESOLVED_EXPECT: &str = "/**ARGS: source -DFOO */\n/**SYSCODE: = 1 */\nint yes;\n";

fn cases_pass() -> TrialResult {
    let fx = Fixture::new()?;
    fx.case("test0001.c", RESOLVED)?;
    fx.case("test0001.c.expect", RESOLVED_EXPECT)?;
    fx.case("test0002.c", "/**ARGS: source */\n/**WORDSIZE=16 */\nint x;\n")?;
    fx.case("test0003.c", "int not_a_test;\n")?;
    fx.case(
        "test0004.c",
        "/**ARGS: source -UFOO */\n/**SYSCODE: = 1 */\n/**REDIRECT */\n#ifdef FOO\nint x;\n#endif\nint z;\n",
    )?;
    fx.case(
        "test0004.c.expect",
        "/**ARGS: source -UFOO */ /**SYSCODE: = 1 */ /**REDIRECT */ int z;",
    )?;
    fx.case(
        "test0005.c",
        "/**ARGS: symbols */\n/**ALTFILES: ./test_cases/alt.h */\n",
    )?;
    fx.case("alt.h", "#ifdef BAR\nint bar;\n#endif\n")?;
    fx.case("test0005.c.expect", "BAR: unconfigured\n")?;

    let ctx = fx.context(suites::cases::PROG)?;
    let failures = suites::cases::run(&ctx, &ctx.runner(), &suites::cases::CasesOptions::default())?;
    check(failures == 0, format!("{failures} case(s) failed"))?;

    let sizes = fs::read_to_string(&ctx.metrics().size_file)?;
    check(sizes.trim() == "5", format!("size file holds {sizes:?}"))
}

fn case_failure_is_counted() -> TrialResult {
    let fx = Fixture::new()?;
    fx.case("test0001.c", RESOLVED)?;
    fx.case("test0001.c.expect", "int no;\n")?;
    fx.case("test0002.c", "/**ARGS: source */\nint x;\n")?;
    fx.case("test0002.c.expect", "/**ARGS: source */\nint x;\n")?;

    let ctx = fx.context(suites::cases::PROG)?;
    let failures = suites::cases::run(&ctx, &ctx.runner(), &suites::cases::CasesOptions::default())?;
    check(failures == 1, format!("expected 1 failure, got {failures}"))?;
    check(
        !ctx.metrics().size_file.exists(),
        "metrics should be deleted after a failed suite",
    )
}

fn monkey_checks_the_exit_code_only() -> TrialResult {
    let fx = Fixture::new()?;
    fx.case("test0001.c", RESOLVED)?;
    fx.case("test0002.c", "/**ARGS: source */\nint x;\n")?;

    let ctx = fx.context(suites::cases::PROG)?;
    let runner = ctx.runner();
    let opts = |rc| suites::cases::CasesOptions {
        monkey: Some("source -DFOO".to_string()),
        rc,
        ..Default::default()
    };
    let failures = suites::cases::run(&ctx, &runner, &opts(1))?;
    check(failures == 0, format!("rc 1: {failures} failure(s)"))?;
    let failures = suites::cases::run(&ctx, &runner, &opts(0))?;
    check(failures == 1, format!("rc 0: expected 1 failure, got {failures}"))
}

fn spin_suite_passes() -> TrialResult {
    let fx = Fixture::new()?;
    fx.write("src/a.c", "#ifdef WINDOWS\nint w;\n#endif\nint a;\n")?;
    fx.write("src/b.h", "#ifndef B_H\n#define B_H\n#endif\n")?;
    fx.write("src/sub/c.cpp", "int c;\n")?;
    fx.write("src/broken.c", "#if UNKNOWN\nint never_closed;\n")?;
    fx.case("test0001.c", "/**ARGS: source */\nint x;\n")?;

    let ctx = fx.context(suites::spin::PROG)?;
    let failures = suites::spin::run(&ctx, &ctx.runner(), &suites::spin::SpinOptions::default())?;
    check(failures == 0, format!("{failures} spin test(s) failed"))?;
    check(!ctx.testdir.join("spin").exists(), "spin directory should be removed")
}

fn spin_output_reconciles() -> TrialResult {
    let fx = Fixture::new()?;
    let mut inputs = Vec::new();
    for name in ["one", "two", "three", "four"] {
        inputs.push(fx.write(&format!("tree/{name}.c"), "#ifdef X\nint x;\n#endif\n")?);
    }
    inputs.push(fx.write("tree/bad.c", "#ifdef X\nint x;\n")?);
    let spindir = fx.pkgdir.join("out");
    let stderr = fx.pkgdir.join("stderr.txt");

    let invocation = Invocation::new(fx.pkgdir.join("bin/coan"))
        .args(["spin", "--keepgoing", "--dir"])
        .arg(spindir.display().to_string())
        .arg(fx.pkgdir.join("tree").display().to_string())
        .stdout(fx.pkgdir.join("stdout.txt"))
        .stderr(&stderr);
    SystemRunner::new().run(&invocation)?;

    let text = fs::read_to_string(&stderr)?;
    let inputs: Vec<String> = inputs.iter().map(|p| p.display().to_string()).collect();
    let outputs: Vec<PathBuf> = walk::files(&spindir).collect();
    let mirror = Mirror {
        output_root: spindir,
        prefix: None,
        windows: false,
    };
    let result = reconcile(&inputs, &outputs, &abandoned_files(&text), &mirror);
    check(result.reconciled.len() == 4, format!("reconciled {:?}", result.reconciled))?;
    check(result.abandoned.len() == 1, format!("abandoned {:?}", result.abandoned))?;
    check(result.passed(), format!("unaccounted {:?}", result.unaccounted))
}

fn bulk_suite_passes() -> TrialResult {
    let fx = Fixture::new()?;
    fx.write("src/one.cpp", "#ifdef ALPHA\nint a;\n#endif\nint one;\n")?;
    fx.write("src/two.h", "#ifndef BETA\n#define BETA\n#endif\n")?;

    let ctx = fx.context(suites::bulk::PROG)?;
    let opts = suites::bulk::BulkOptions {
        breadth: 3,
        depth: 2,
        seed: 42,
        ..Default::default()
    };
    let failures = suites::bulk::run(&ctx, &ctx.runner(), &opts)?;
    check(failures == 0, format!("{failures} bulk test(s) failed"))?;
    check(!ctx.testdir.join("scrap").exists(), "scrap tree should be removed")
}

const DEFINER: &str = "/**ARGS: source -DFOO */\n#define LEAK\nint first;\n";
const USER: &str = "/**ARGS: source -DFOO */\n#ifdef LEAK\nint leaked;\n#else\nint clean;\n#endif\n";

fn rewind_fixture(fx: &Fixture) -> Result<Vec<PathBuf>, Failed> {
    let first = fx.case("test0286.c", DEFINER)?;
    fx.case("test0286.c.expect", DEFINER)?;
    let second = fx.case("test0287.c", USER)?;
    fx.case("test0287.c.expect", USER)?;
    Ok(vec![first, second])
}

fn batch_agrees_with_single_runs() -> TrialResult {
    let fx = Fixture::new()?;
    let files = rewind_fixture(&fx)?;
    let ctx = fx.context(suites::rewind::PROG)?;
    let outcome = DifferentialRun::new(files.clone(), 0).run(&ctx.case_env(), &ctx.runner())?;
    check(outcome.passed(), format!("{outcome:?}"))?;
    check(fs::read_to_string(&files[1])? == USER, "input should be restored")?;
    check(
        !Path::new(&format!("{}.coan.test.bak", files[1].display())).exists(),
        "backup should be gone",
    )
}

fn leaked_symbols_are_caught() -> TrialResult {
    let fx = Fixture::new()?;
    let files = rewind_fixture(&fx)?;
    fx.leaky()?;
    let ctx = fx.context(suites::rewind::PROG)?;
    // The leaked symbol resolves the second file's conditional, so the batch
    // drops lines and exits with 0x01.
    let outcome = DifferentialRun::new(files.clone(), 1).run(&ctx.case_env(), &ctx.runner())?;
    check(outcome.reference_failures == 0, "single runs cannot leak")?;
    check(outcome.batch.passed(), format!("batch exit code: {:?}", outcome.batch))?;
    check(
        outcome.mismatches.len() == 1,
        format!("expected one mismatch, got {:?}", outcome.mismatches),
    )?;
    check(
        matches!(&outcome.mismatches[0], Mismatch::Differs { file, .. } if *file == files[1]),
        format!("mismatch should name {}: {}", files[1].display(), outcome.mismatches[0]),
    )?;
    check(fs::read_to_string(&files[1])? == USER, "input should be restored")
}

fn cases_listing_as_json() -> TrialResult {
    let fx = Fixture::new()?;
    fx.case("test0001.c", RESOLVED)?;
    fx.case("test0002.c", "/**ARGS: source */\n/**WORDSIZE=16 */\nint x;\n")?;
    fx.case("test0003.c", "int not_a_test;\n")?;
    let ctx = fx.context(suites::cases::PROG)?;
    let files = suites::cases::default_files(&ctx)?;

    let listed = suites::cases::listings(&ctx.case_env(), &files)?;
    let json = suites::cases::render_listings(&listed, OutputFormat::Json)?;
    check(json.starts_with('[') && json.ends_with(']'), format!("not a JSON array: {json}"))?;
    check(json.contains("test0001.c"), format!("first case missing: {json}"))?;
    check(!json.contains("test0003.c"), format!("non-test listed: {json}"))?;
    check(
        json.contains("\"args\":[\"source\",\"-DFOO\",\"--verbose\""),
        format!("composed args missing: {json}"),
    )?;
    check(json.contains("WORDSIZE=16"), format!("skip reason missing: {json}"))?;

    let report = suites::SuiteReport::new(
        &ctx,
        suites::Tally {
            tests: 1,
            failures: 0,
            skipped: 1,
        },
    );
    let json = report.to_json()?;
    check(
        json.contains("\"program\":\"coan_case_tester\"") && json.contains("\"skipped\":1"),
        format!("suite report: {json}"),
    )
}

fn softlink_suite_passes() -> TrialResult {
    let fx = Fixture::new()?;
    fx.write("src/options.h", "#ifndef OPTIONS_H\n#define OPTIONS_H\n#endif\n")?;
    fx.write("src/a.c", "#ifdef A\nint a;\n#endif\n")?;
    fx.write("src/sub/b.cpp", "int b;\n")?;
    fx.write("src/notes.txt", "not a source\n")?;

    let ctx = fx.context(suites::softlink::PROG)?;
    let opts = suites::softlink::SoftlinkOptions::default();
    let failures = suites::softlink::run(&ctx, &ctx.runner(), &opts)?;
    check(failures == 0, format!("{failures} softlink test(s) failed"))?;
    check(!ctx.testdir.join("scrap").exists(), "linked tree should be removed")?;
    check(
        ctx.testdir.join("link2scrap").symlink_metadata().is_err(),
        "root link should be removed",
    )?;
    check(
        ctx.testdir.join("link2a.c").symlink_metadata().is_err(),
        "file link should be removed",
    )
}

fn main() {
    let args = Arguments::from_args();
    let trials = vec![
        Trial::test("cases::pass", cases_pass),
        Trial::test("cases::failure_is_counted", case_failure_is_counted),
        Trial::test("cases::monkey", monkey_checks_the_exit_code_only),
        Trial::test("cases::listing_as_json", cases_listing_as_json),
        Trial::test("spin::suite", spin_suite_passes),
        Trial::test("spin::reconcile", spin_output_reconciles),
        Trial::test("bulk::suite", bulk_suite_passes),
        Trial::test("softlink::suite", softlink_suite_passes).with_ignored_flag(!cfg!(unix)),
        Trial::test("rewind::batch_agrees", batch_agrees_with_single_runs),
        Trial::test("rewind::leak_is_caught", leaked_symbols_are_caught),
    ];
    libtest_mimic::run(&args, trials).exit();
}
