//! The metrics report: throughput summed over every program's metrics
//! files in the test directory.

use std::path::Path;

use crate::error::Result;
use crate::metrics::{MetricsReport, files_with_suffix};

pub const PROG: &str = "coan_test_timer";

pub fn run(testdir: &Path) -> Result<MetricsReport> {
    let report = MetricsReport::gather(
        &files_with_suffix(testdir, ".time.txt")?,
        &files_with_suffix(testdir, ".size.txt")?,
    )?;
    report.log();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn sums_across_programs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("coan_case_tester.time.txt"), "1.0\n2.0\n").unwrap();
        fs::write(dir.path().join("coan_case_tester.size.txt"), "4\n").unwrap();
        fs::write(dir.path().join("coan_spin_tester.time.txt"), "1.0\n").unwrap();
        fs::write(dir.path().join("coan_spin_tester.size.txt"), "2\n").unwrap();
        let report = run(dir.path()).unwrap();
        assert_eq!(report.input_files, 6);
        assert_eq!(report.average(), Some(0.5));
    }
}
