//! The softlink suite: a recursive run reached through symbolic links,
//! including links that loop back on their own directory.
//!
//! Every source file is reachable several times over; the subject must
//! count each one once and must not chase the loops.

use std::fs;
use std::path::{Path, PathBuf};

use super::{ExitCleanup, OutputFormat, Tally, finish, start_metrics};
use crate::command::{Invocation, ProcessRunner, read_text};
use crate::context::HarnessContext;
use crate::error::{HarnessError, IoContext, Result};
use crate::metrics::remove_if_exists;
use crate::walk::{self, SOURCE_EXTENSIONS};

pub const PROG: &str = "coan_softlink_tester";

const SUBDIR: &str = "subdir1";

#[derive(Debug, Clone)]
pub struct SoftlinkOptions {
    /// Root of the linked tree, relative to the test directory.
    pub rootname: PathBuf,
    pub format: OutputFormat,
}

impl Default for SoftlinkOptions {
    fn default() -> Self {
        SoftlinkOptions {
            rootname: PathBuf::from("scrap"),
            format: OutputFormat::Text,
        }
    }
}

#[cfg(unix)]
fn softlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link).with_path("failed to create softlink", link)
}

#[cfg(not(unix))]
fn softlink(_target: &Path, link: &Path) -> Result<()> {
    Err(HarnessError::io(
        "failed to create softlink",
        link,
        std::io::ErrorKind::Unsupported.into(),
    ))
}

/// The links made by [`build_tree`] outside the tree itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedTree {
    /// Source files copied flat into the tree root.
    pub files: usize,
    /// Link to the tree root.
    pub root_link: PathBuf,
    /// Link to the first copied file.
    pub file_link: PathBuf,
}

/// Copy the sources beneath `srcdir` flat into `root` and weave links
/// through it:
///
/// - `root/subdir1/link2<name>` for every copied file
/// - `root/link2subdir1` and `root/subdir1/self_including_link`, both to
///   `root/subdir1`
/// - `<linkdir>/link2<root>` to the root and `<linkdir>/link2<first>` to
///   the first copied file
pub fn build_tree(srcdir: &Path, root: &Path, linkdir: &Path) -> Result<LinkedTree> {
    let subdir = root.join(SUBDIR);
    fs::create_dir_all(&subdir).with_path("failed to create directory", &subdir)?;
    for file in walk::files_with_extensions(srcdir, &SOURCE_EXTENSIONS) {
        let Some(name) = file.file_name() else { continue };
        let dest = root.join(name);
        fs::copy(&file, &dest).with_path("failed to copy file", &dest)?;
    }

    let copied: Vec<PathBuf> = walk::files(root).collect();
    let Some(first) = copied.first().cloned() else {
        return Err(HarnessError::NoTestData(srcdir.display().to_string()));
    };
    for file in &copied {
        if let Some(name) = file.file_name() {
            softlink(file, &subdir.join(link_name(name)))?;
        }
    }
    softlink(&subdir, &root.join(link_name(SUBDIR)))?;
    softlink(&subdir, &subdir.join("self_including_link"))?;

    let root_link = linkdir.join(link_name(root.file_name().unwrap_or(root.as_os_str())));
    let file_link = linkdir.join(link_name(first.file_name().unwrap_or(first.as_os_str())));
    for (target, link) in [(root, &root_link), (first.as_path(), &file_link)] {
        // Links left over from an earlier kept run.
        remove_if_exists(link)?;
        softlink(target, link)?;
    }
    Ok(LinkedTree {
        files: copied.len(),
        root_link,
        file_link,
    })
}

fn link_name(name: impl AsRef<std::ffi::OsStr>) -> String {
    format!("link2{}", name.as_ref().to_string_lossy())
}

/// Run the softlink suite; returns the number of failed tests.
pub fn run(ctx: &HarnessContext, runner: &dyn ProcessRunner, opts: &SoftlinkOptions) -> Result<usize> {
    if ctx.host.windows {
        tracing::info!("This test is not applicable on Windows");
        return Ok(0);
    }
    start_metrics(ctx)?;
    let root = ctx.testdir.join(&opts.rootname);
    let stdout_file = ctx.scratch("stdout.temp.txt");
    let stderr_file = ctx.scratch("stderr.temp.txt");
    if root.is_dir() {
        fs::remove_dir_all(&root).with_path("failed to delete directory", &root)?;
    }

    let mut cleanup = ExitCleanup::new(ctx.keep)
        .tree(&root)
        .log(&stdout_file)
        .log(&stderr_file);
    let tree = build_tree(&ctx.pkgdir.join("src"), &root, &ctx.testdir);
    let tree = match tree {
        Ok(tree) => tree,
        Err(e) => {
            cleanup.set_failed(true);
            return Err(e);
        }
    };
    let links = [tree.root_link.clone(), tree.file_link.clone()];

    tracing::debug!("*** Softlink test: to process {} files ***", tree.files);
    ctx.metrics().record_size(tree.files)?;
    let invocation = Invocation::new(ctx.executable())
        .args(["symbols", "--once-only", "--verbose", "--recurse", "--filter"])
        .arg(SOURCE_EXTENSIONS.join(","))
        .arg(tree.root_link.display().to_string())
        .arg(tree.file_link.display().to_string())
        .stdout(&stdout_file)
        .stderr(&stderr_file);
    let ran = runner.run(&invocation);

    if !ctx.keep {
        for link in &links {
            remove_if_exists(link)?;
        }
    }
    ran?;

    let expect = format!(
        "info 0x02201: {0} out of {0} input files were reached",
        tree.files
    );
    let passed = read_text(&stderr_file)?.contains(&expect);
    if !passed {
        tracing::error!("*** Softlink test: Failed! See {} ****", stderr_file.display());
    }
    let mut tally = Tally::default();
    tally.record(passed);
    cleanup.set_failed(!passed);
    tracing::info!("{} out of {} tests failed", tally.failures, tally.tests);
    finish(ctx, tally, opts.format)
}
