//! Differential runs: the same files processed one at a time and then all
//! at once must come out identical.
//!
//! A subject that leaks transient state (for instance a `#define` seen in
//! one file) into the processing of the next file passes every single-file
//! case but produces different text in a batch run. The reference run
//! writes `<file>.output` per file; the batch run rewrites the files in
//! place with backups, and each rewritten file is compared byte for byte
//! with its reference.

use std::fs;
use std::path::{Path, PathBuf};

use crate::case::{CaseEnv, Prepared, TestCase, sibling};
use crate::command::{ProcessRunner, read_text};
use crate::error::{IoContext, Result};
use crate::metrics::remove_if_exists;
use crate::verify::Verdict;
use crate::walk;

/// Backup suffix passed to the subject for batch runs.
pub const BACKUP_SUFFIX: &str = ".coan.test.bak";

/// Arguments of the batch run, before the backup suffix.
pub const BATCH_ARGS: [&str; 3] = ["source", "-DFOO", "--replace"];

/// Backed up files and the originals they restore, restored on drop if
/// [`BackupSet::restore`] was never called.
#[derive(Debug, Default)]
pub struct BackupSet {
    pairs: Vec<(PathBuf, PathBuf)>,
}

impl BackupSet {
    /// The backups `<file><suffix>` that exist beside `files`.
    pub fn beside(files: &[PathBuf], suffix: &str) -> Self {
        let pairs = files
            .iter()
            .map(|f| (sibling(f, suffix), f.clone()))
            .filter(|(backup, _)| backup.is_file())
            .collect();
        BackupSet { pairs }
    }

    /// Every file beneath `root` whose name ends with `suffix`.
    pub fn scan(root: &Path, suffix: &str) -> Self {
        let pairs = walk::files(root)
            .filter_map(|backup| {
                let name = backup.file_name()?.to_str()?;
                let original = name.strip_suffix(suffix).filter(|n| !n.is_empty())?;
                let original = backup.with_file_name(original);
                Some((backup, original))
            })
            .collect();
        BackupSet { pairs }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Whether `original` has a backup in this set.
    pub fn contains(&self, original: &Path) -> bool {
        self.pairs.iter().any(|(_, o)| o == original)
    }

    /// Move every backup back over its original.
    pub fn restore(mut self) -> Result<()> {
        for (backup, original) in std::mem::take(&mut self.pairs) {
            restore_one(&backup, &original)?;
        }
        Ok(())
    }
}

fn restore_one(backup: &Path, original: &Path) -> Result<()> {
    remove_if_exists(original)?;
    fs::rename(backup, original).with_path("failed to restore backup", backup)
}

impl Drop for BackupSet {
    fn drop(&mut self) {
        for (backup, original) in self.pairs.drain(..) {
            if let Err(e) = restore_one(&backup, &original) {
                tracing::warn!("{e}");
            }
        }
    }
}

/// Delete `<file>.coan.test.bak.*` left behind by an earlier batch run.
pub fn remove_backup_debris(files: &[PathBuf]) -> Result<usize> {
    let mut removed = 0;
    for file in files {
        let (Some(dir), Some(name)) = (file.parent(), file.file_name().and_then(|n| n.to_str()))
        else {
            continue;
        };
        let stem = format!("{name}{BACKUP_SUFFIX}.");
        let Ok(entries) = fs::read_dir(dir) else {
            continue;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&stem))
            {
                remove_if_exists(&path)?;
                removed += 1;
            }
        }
    }
    Ok(removed)
}

/// A file whose batch result disagrees with its reference result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    /// The batch run left the file untouched though output was expected.
    NoOutput(PathBuf),
    /// The rewritten file differs from its reference output.
    Differs { file: PathBuf, reference: PathBuf },
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mismatch::NoOutput(file) => {
                write!(f, "Expected some output from \"{}\" but got none", file.display())
            }
            Mismatch::Differs { file, reference } => write!(
                f,
                "Test output \"{}\" differs from reference output \"{}\"",
                file.display(),
                reference.display()
            ),
        }
    }
}

/// What a differential run found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DifferentialOutcome {
    /// Reference cases that failed; when nonzero the batch run is skipped.
    pub reference_failures: usize,
    pub batch: Verdict,
    pub mismatches: Vec<Mismatch>,
}

impl DifferentialOutcome {
    pub fn passed(&self) -> bool {
        self.reference_failures == 0 && self.batch.passed() && self.mismatches.is_empty()
    }
}

/// One-at-a-time versus all-at-once over the same files.
#[derive(Debug, Clone)]
pub struct DifferentialRun {
    pub files: Vec<PathBuf>,
    /// Expected logical exit code of the batch run.
    pub expected: u32,
}

impl DifferentialRun {
    pub fn new(files: Vec<PathBuf>, expected: u32) -> Self {
        DifferentialRun { files, expected }
    }

    fn batch_args() -> Vec<String> {
        BATCH_ARGS
            .iter()
            .map(|a| a.to_string())
            .chain(["--backup".to_string(), BACKUP_SUFFIX.to_string()])
            .collect()
    }

    /// Run each file on its own to get reference outputs; returns the
    /// number of failing cases.
    fn reference(&self, env: &CaseEnv, runner: &dyn ProcessRunner) -> Result<usize> {
        let mut failures = 0;
        for file in &self.files {
            if let Prepared::Run(case) = TestCase::prepare(file, env)? {
                failures += usize::from(!case.run(runner)?.verdict.passed());
            }
        }
        Ok(failures)
    }

    fn compare(&self, backups: &BackupSet) -> Result<Vec<Mismatch>> {
        let mut mismatches = Vec::new();
        for file in &self.files {
            if !backups.contains(file) {
                let text = read_text(file)?;
                if !text.contains("NO-OUTPUT") {
                    mismatches.push(Mismatch::NoOutput(file.clone()));
                }
                continue;
            }
            let reference = sibling(file, ".output");
            let expected = fs::read(&reference).with_path("cannot open file for reading", &reference)?;
            let actual = fs::read(file).with_path("cannot open file for reading", file)?;
            if expected != actual {
                mismatches.push(Mismatch::Differs {
                    file: file.clone(),
                    reference,
                });
            }
        }
        Ok(mismatches)
    }

    /// Reference run, batch run, comparison. Backups are restored whatever
    /// happens after the batch run.
    pub fn run(&self, env: &CaseEnv, runner: &dyn ProcessRunner) -> Result<DifferentialOutcome> {
        let reference_failures = self.reference(env, runner)?;
        if reference_failures > 0 {
            tracing::error!("*** Reference run failed {reference_failures} case(s) ***");
            return Ok(DifferentialOutcome {
                reference_failures,
                ..Default::default()
            });
        }

        remove_backup_debris(&self.files)?;
        let batch = TestCase::monkey(self.files.clone(), Self::batch_args(), self.expected, env);
        let result = batch.run(runner);
        let backups = BackupSet::beside(&self.files, BACKUP_SUFFIX);
        let batch = result?.verdict;

        let mismatches = if batch.passed() {
            self.compare(&backups)?
        } else {
            Vec::new()
        };
        backups.restore()?;
        for m in &mismatches {
            tracing::error!("{m}");
        }
        Ok(DifferentialOutcome {
            reference_failures,
            batch,
            mismatches,
        })
    }
}
