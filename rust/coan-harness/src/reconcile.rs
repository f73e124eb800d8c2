//! Matching output files back to the input files they came from.
//!
//! After a recursive run the subject has mirrored its inputs under an
//! output root, optionally stripping a path prefix, and has dropped any
//! input it could not parse. Every input must be accounted for: either it
//! was abandoned (the subject said so on stderr) or its mirrored path is
//! among the surviving outputs.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{IoContext, Result};

static ABANDONED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"coan:\s+(\S+):\s+line\s+\d+:\s+error\s+0x\S{5}:").unwrap());

static REACHED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"info 0x[0-9a-fA-F]+: (\d+) out of (\d+) input files were reached").unwrap()
});

/// Paths the subject reported errors against, in report order.
pub fn abandoned_files(stderr: &str) -> Vec<String> {
    ABANDONED
        .captures_iter(stderr)
        .map(|c| c[1].to_string())
        .collect()
}

/// The `(reached, total)` pair from the subject's summary line, if any.
pub fn files_reached(stderr: &str) -> Option<(usize, usize)> {
    let caps = REACHED.captures(stderr)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// How the subject mirrors an input path under its output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mirror {
    pub output_root: PathBuf,
    /// Stripped once from the front of each input path before mirroring.
    pub prefix: Option<String>,
    pub windows: bool,
}

impl Mirror {
    /// The output path an input is expected to have been mirrored to.
    pub fn mirrored(&self, input: &str) -> PathBuf {
        let mut rel = input.replace('"', "");
        if let Some(prefix) = self.prefix.as_deref().filter(|p| !p.is_empty()) {
            if let Some(stripped) = rel.strip_prefix(prefix) {
                rel = stripped.to_string();
            }
        }
        if self.windows {
            rel = strip_drive(&rel).to_string();
            if let Some(stripped) = rel.strip_prefix('\\') {
                rel = stripped.to_string();
            }
        } else if let Some(stripped) = rel.strip_prefix('/') {
            rel = stripped.to_string();
        }
        self.output_root.join(rel)
    }
}

fn strip_drive(path: &str) -> &str {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        &path[2..]
    } else {
        path
    }
}

/// The classification of every input file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub reconciled: Vec<String>,
    pub abandoned: Vec<String>,
    pub unaccounted: Vec<String>,
}

impl Reconciliation {
    pub fn total(&self) -> usize {
        self.reconciled.len() + self.abandoned.len() + self.unaccounted.len()
    }

    /// Every input was either reconciled or abandoned.
    pub fn passed(&self) -> bool {
        self.unaccounted.is_empty()
    }
}

/// Classify each input as abandoned, reconciled or unaccounted for.
pub fn reconcile(
    inputs: &[String],
    outputs: &[PathBuf],
    abandoned: &[String],
    mirror: &Mirror,
) -> Reconciliation {
    let abandoned: HashSet<&str> = abandoned.iter().map(String::as_str).collect();
    let outputs: HashSet<&Path> = outputs.iter().map(PathBuf::as_path).collect();
    inputs.iter().fold(Reconciliation::default(), |mut acc, input| {
        if abandoned.contains(input.as_str()) {
            acc.abandoned.push(input.clone());
        } else if outputs.contains(mirror.mirrored(input).as_path()) {
            acc.reconciled.push(input.clone());
        } else {
            acc.unaccounted.push(input.clone());
        }
        acc
    })
}

/// Where the input, output and abandoned lists go when reconciliation
/// fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Postmortem {
    pub infiles: PathBuf,
    pub outfiles: PathBuf,
    pub errorfiles: PathBuf,
}

impl Postmortem {
    /// The conventional spin-test list files in `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Postmortem {
            infiles: dir.join("spin-test-infiles.txt"),
            outfiles: dir.join("spin-test-outfiles.txt"),
            errorfiles: dir.join("spin-test-errorfiles.txt"),
        }
    }

    pub fn write(&self, inputs: &[String], outputs: &[PathBuf], abandoned: &[String]) -> Result<()> {
        write_lines(&self.errorfiles, abandoned.iter().map(String::as_str))?;
        write_lines(&self.infiles, inputs.iter().map(String::as_str))?;
        let outputs: Vec<String> = outputs.iter().map(|p| p.display().to_string()).collect();
        write_lines(&self.outfiles, outputs.iter().map(String::as_str))
    }

    pub fn paths(&self) -> [&Path; 3] {
        [&self.infiles, &self.outfiles, &self.errorfiles]
    }
}

fn write_lines<'a>(path: &Path, lines: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut text = String::new();
    for line in lines {
        text.push_str(line);
        text.push('\n');
    }
    fs::write(path, text).with_path("cannot open file for writing", path)
}
