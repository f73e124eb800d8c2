//! Flat-file test metrics.
//!
//! Each program keeps two files in the test directory:
//! `<prog>.time.txt` with one elapsed-seconds float per subject run, and
//! `<prog>.size.txt` with one input-file count per test. Lines that don't
//! parse are ignored when summing.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::error::{IoContext, Result};

/// The metrics files of one program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsFiles {
    pub time_file: PathBuf,
    pub size_file: PathBuf,
}

impl MetricsFiles {
    pub fn for_program(testdir: &Path, prog: &str) -> Self {
        MetricsFiles {
            time_file: testdir.join(format!("{prog}.time.txt")),
            size_file: testdir.join(format!("{prog}.size.txt")),
        }
    }

    /// Start afresh: delete both files if present.
    pub fn reset(&self) -> Result<()> {
        remove_if_exists(&self.time_file)?;
        remove_if_exists(&self.size_file)
    }

    /// Append the number of input files a test is about to process.
    pub fn record_size(&self, nfiles: usize) -> Result<()> {
        if let Some(dir) = self.size_file.parent() {
            fs::create_dir_all(dir).with_path("failed to create directory", dir)?;
        }
        let mut fh = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.size_file)
            .with_path("cannot open file for writing", &self.size_file)?;
        writeln!(fh, "{nfiles}").with_path("cannot write", &self.size_file)
    }
}

/// Delete a file, tolerating its absence.
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            Err(e).with_path("failed to delete file", path)
        }
        _ => Ok(()),
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path).with_path("cannot open file for reading", path)?;
    Ok(text.lines().map(str::to_string).collect())
}

/// Total seconds recorded across timing files.
pub fn total_runtime(files: &[PathBuf]) -> Result<f64> {
    let mut seconds = 0.0;
    for file in files {
        seconds += read_lines(file)?
            .iter()
            .filter_map(|l| l.trim().parse::<f64>().ok())
            .sum::<f64>();
    }
    Ok(seconds)
}

/// Total input files recorded across size files.
pub fn total_size(files: &[PathBuf]) -> Result<u64> {
    let mut count = 0;
    for file in files {
        count += read_lines(file)?
            .iter()
            .filter_map(|l| l.trim().parse::<u64>().ok())
            .sum::<u64>();
    }
    Ok(count)
}

/// Aggregate throughput over a set of metrics files.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsReport {
    pub runtime_secs: f64,
    pub input_files: u64,
}

impl MetricsReport {
    pub fn gather(time_files: &[PathBuf], size_files: &[PathBuf]) -> Result<Self> {
        Ok(MetricsReport {
            runtime_secs: total_runtime(time_files)?,
            input_files: total_size(size_files)?,
        })
    }

    /// Average seconds per input file, if any files were processed.
    pub fn average(&self) -> Option<f64> {
        (self.input_files > 0).then(|| self.runtime_secs / self.input_files as f64)
    }

    /// Log the report at info severity.
    pub fn log(&self) {
        if self.input_files == 0 {
            return;
        }
        tracing::info!("Coan processed {} input_files.", self.input_files);
        tracing::info!("runtime in coan: {} secs.", self.runtime_secs);
        if let Some(avg) = self.average() {
            tracing::info!("Average processing time per input file: {avg:2.6} secs.");
        }
    }
}

/// Every `*<suffix>` file directly inside `dir`, sorted.
pub fn files_with_suffix(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_path("cannot read directory", dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(suffix))
        })
        .collect();
    files.sort();
    Ok(files)
}
