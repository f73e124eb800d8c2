//! The bulk suite: recursive runs over a large generated corpus.

use std::fs;
use std::path::{Path, PathBuf};

use super::{ExitCleanup, OutputFormat, Tally, finish, start_metrics};
use crate::command::{Invocation, ProcessRunner, read_text};
use crate::context::HarnessContext;
use crate::corpus::{CorpusSpec, generate};
use crate::differential::BackupSet;
use crate::error::{HarnessError, IoContext, Result};
use crate::walk::{self, SOURCE_EXTENSIONS};

pub const PROG: &str = "coan_bulk_tester";

/// Number of bulk tests.
pub const BULK_TESTS: usize = 5;

/// Extensions the subject is told to select with `--filter`.
const FILTER: [&str; 2] = ["cpp", "h"];

/// Cap on the accumulated length of the symbol lines turned into `-U`
/// options.
const UNDEFS_CAP: usize = 1 << 16;

const BACKUP: &str = "~";

#[derive(Debug, Clone)]
pub struct BulkOptions {
    pub breadth: usize,
    pub depth: usize,
    pub seed: u64,
    /// Run only the first N tests.
    pub tests: Option<usize>,
    pub format: OutputFormat,
}

impl Default for BulkOptions {
    fn default() -> Self {
        BulkOptions {
            breadth: 5,
            depth: 4,
            seed: 987654321,
            tests: None,
            format: OutputFormat::Text,
        }
    }
}

/// `-U<sym>` options for the symbols listed on `symbols` output lines.
pub fn undefs_from_symbols(stdout: &str) -> Vec<String> {
    let mut undefs = Vec::new();
    let mut length = 0;
    for line in stdout.lines() {
        length += line.len() + 1;
        let sym = line.replace(": unconfigured", "");
        let sym = sym.trim();
        if !sym.is_empty() {
            undefs.push(format!("-U{sym}"));
        }
        if length >= UNDEFS_CAP {
            break;
        }
    }
    undefs
}

/// Strip every `#endif` at the start of a line. Returns `None` when
/// nothing was stripped. Works on bytes so non-UTF-8 sources survive
/// unchanged apart from the stripped directives.
pub fn sabotage(text: &[u8]) -> Option<Vec<u8>> {
    let mut sabotaged = false;
    let mut out = Vec::with_capacity(text.len());
    for line in text.split_inclusive(|&b| b == b'\n') {
        match line.strip_prefix(b"#endif") {
            Some(rest) => {
                sabotaged = true;
                out.extend_from_slice(rest);
            }
            None => out.extend_from_slice(line),
        }
    }
    sabotaged.then_some(out)
}

/// Sabotage every source file beneath `root`; returns how many changed.
pub fn sabotage_tree(root: &Path) -> Result<usize> {
    let mut count = 0;
    for file in walk::files_with_extensions(root, &SOURCE_EXTENSIONS) {
        let text = fs::read(&file).with_path("cannot open file for reading", &file)?;
        if let Some(broken) = sabotage(&text) {
            fs::write(&file, broken).with_path("cannot open file for writing", &file)?;
            count += 1;
        }
    }
    Ok(count)
}

struct Bulk<'a> {
    ctx: &'a HarnessContext,
    runner: &'a dyn ProcessRunner,
    scrapdir: PathBuf,
    stdout_file: PathBuf,
    stderr_file: PathBuf,
    infiles_file: PathBuf,
    undefs_file: PathBuf,
    num_infiles: usize,
    undefs: Vec<String>,
}

impl Bulk<'_> {
    fn subject(&self) -> Invocation {
        Invocation::new(self.ctx.executable())
            .stdout(&self.stdout_file)
            .stderr(&self.stderr_file)
    }

    fn recurse_args(&self) -> [String; 4] {
        [
            "--verbose".to_string(),
            "--recurse".to_string(),
            "--filter".to_string(),
            FILTER.join(","),
        ]
    }

    fn tree(&self) -> String {
        self.scrapdir.display().to_string()
    }

    fn restore_backups(&self) -> Result<()> {
        BackupSet::scan(&self.scrapdir, BACKUP).restore()
    }

    /// Compose and run test `testno`; returns the extra stderr text the
    /// test requires, if any.
    fn run_test(&mut self, testno: usize) -> Result<Option<String>> {
        let mut expect = None;
        let invocation = match testno {
            1 => self
                .subject()
                .args(["symbols", "--once-only"])
                .args(self.recurse_args())
                .args([self.tree(), self.tree()]),
            2 => {
                let listing = read_text(&self.stdout_file)?;
                self.undefs = undefs_from_symbols(&listing);
                self.subject()
                    .arg("source")
                    .args(self.undefs.clone())
                    .args(self.recurse_args())
                    .args(["--backup", BACKUP])
                    .arg(self.tree())
            }
            3 => {
                self.restore_backups()?;
                let mut listing = String::new();
                for file in walk::files(&self.scrapdir) {
                    listing.push_str(&file.display().to_string());
                    listing.push('\n');
                }
                fs::write(&self.infiles_file, listing)
                    .with_path("cannot open file for writing", &self.infiles_file)?;
                self.subject()
                    .arg("source")
                    .args(self.undefs.clone())
                    .args(self.recurse_args())
                    .args(["--backup", BACKUP])
                    .stdin(&self.infiles_file)
            }
            4 => {
                self.restore_backups()?;
                fs::write(&self.undefs_file, self.undefs.join("\n"))
                    .with_path("cannot open file for writing", &self.undefs_file)?;
                self.subject()
                    .args(["source", "--file"])
                    .arg(self.undefs_file.display().to_string())
                    .args(self.recurse_args())
                    .args(["--backup", BACKUP])
                    .arg(self.tree())
            }
            _ => {
                self.restore_backups()?;
                let sabotaged = sabotage_tree(&self.scrapdir)?;
                tracing::debug!("*** Generated {sabotaged} invalid input files. This is intended! ***");
                expect = Some(format!("{sabotaged} were abandoned due to parse errors"));
                self.subject()
                    .args(["symbols", "--once-only", "--keepgoing"])
                    .args(self.recurse_args())
                    .arg(self.tree())
            }
        };
        self.runner.run(&invocation)?;
        tracing::debug!("*** Done ***");
        Ok(expect)
    }

    fn check(&self, testno: usize, expect: Option<&str>) -> Result<bool> {
        let text = read_text(&self.stderr_file)?;
        let reached = format!(
            "info 0x02201: {0} out of {0} input files were reached",
            self.num_infiles
        );
        let passed = text.contains(&reached) && expect.is_none_or(|e| text.contains(e));
        if !passed {
            tracing::error!(
                "*** Bulk test {testno}: Failed! See {} ****",
                self.stderr_file.display()
            );
        }
        Ok(passed)
    }
}

/// Run the bulk suite; returns the number of failed tests.
pub fn run(ctx: &HarnessContext, runner: &dyn ProcessRunner, opts: &BulkOptions) -> Result<usize> {
    start_metrics(ctx)?;
    let scrapdir = ctx.testdir.join("scrap");
    let mut bulk = Bulk {
        ctx,
        runner,
        stdout_file: ctx.scratch("stdout.temp.txt"),
        stderr_file: ctx.scratch("stderr.temp.txt"),
        infiles_file: ctx.scratch("infiles.temp.txt"),
        undefs_file: ctx.scratch("undefs.temp.txt"),
        scrapdir: scrapdir.clone(),
        num_infiles: 0,
        undefs: Vec::new(),
    };
    let mut cleanup = ExitCleanup::new(ctx.keep)
        .tree(&scrapdir)
        .log(&bulk.stdout_file)
        .log(&bulk.stderr_file)
        .log(&bulk.infiles_file)
        .log(&bulk.undefs_file);

    tracing::debug!("*** Generating data for bulk tests. Patience! ***");
    let srcdir = ctx.pkgdir.join("src");
    let seed_files: Vec<PathBuf> = walk::files_with_extensions(&srcdir, &SOURCE_EXTENSIONS).collect();
    if seed_files.is_empty() {
        return Err(HarnessError::NoTestData(srcdir.display().to_string()));
    }
    generate(&CorpusSpec {
        root: scrapdir.clone(),
        breadth: opts.breadth,
        depth: opts.depth,
        seed_files,
        seed: opts.seed,
        wipe: true,
    })?;
    bulk.num_infiles = walk::files_with_extensions(&scrapdir, &FILTER).count();

    let ntests = opts.tests.unwrap_or(BULK_TESTS).min(BULK_TESTS);
    let mut tally = Tally::default();
    for testno in 1..=ntests {
        tracing::debug!("*** Bulk Test {testno}: to process {} files ***", bulk.num_infiles);
        ctx.metrics().record_size(bulk.num_infiles)?;
        let expect = bulk.run_test(testno)?;
        tally.record(bulk.check(testno, expect.as_deref())?);
        if tally.should_bail(ctx) {
            break;
        }
    }
    if ntests < BULK_TESTS {
        tracing::info!("*** Stopping by request after test {ntests} ****");
    }
    bulk.restore_backups()?;
    cleanup.set_failed(tally.failures > 0);
    tracing::info!("{} out of {} tests failed", tally.failures, tally.tests);
    finish(ctx, tally, opts.format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefs_strip_the_unconfigured_suffix() {
        let stdout = "FOO: unconfigured\nBAR: unconfigured\n\n";
        assert_eq!(undefs_from_symbols(stdout), vec!["-UFOO", "-UBAR"]);
    }

    #[test]
    fn undefs_are_capped() {
        let line = format!("{}: unconfigured\n", "S".repeat(1000));
        let stdout = line.repeat(100);
        let undefs = undefs_from_symbols(&stdout);
        assert!(undefs.len() < 100);
        assert!(undefs.len() * line.len() >= UNDEFS_CAP);
    }

    #[test]
    fn sabotage_strips_line_start_endifs_only() {
        let text = "#ifdef A\nint a;\n#endif /* A */\n  #endif\n";
        assert_eq!(
            sabotage(text.as_bytes()).unwrap(),
            b"#ifdef A\nint a;\n /* A */\n  #endif\n"
        );
        assert_eq!(sabotage(b"int x;\n"), None);
    }

    #[test]
    fn sabotage_tree_counts_changed_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("d")).unwrap();
        fs::write(dir.path().join("a.h"), "#if X\n#endif\n").unwrap();
        fs::write(dir.path().join("d/b.cpp"), "int b;\n").unwrap();
        fs::write(dir.path().join("d/c.txt"), "#endif\n").unwrap();
        assert_eq!(sabotage_tree(dir.path()).unwrap(), 1);
        assert_eq!(fs::read_to_string(dir.path().join("a.h")).unwrap(), "#if X\n\n");
        assert_eq!(fs::read_to_string(dir.path().join("d/c.txt")).unwrap(), "#endif\n");
    }

    #[test]
    fn sabotage_keeps_latin1_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("caf.h");
        fs::write(&file, b"/* caf\xe9 */\n#ifdef A\n#endif\n").unwrap();
        assert_eq!(sabotage_tree(dir.path()).unwrap(), 1);
        assert_eq!(fs::read(&file).unwrap(), b"/* caf\xe9 */\n#ifdef A\n\n");
    }
}
