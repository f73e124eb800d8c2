//! `coan-harness`: run the coan test suites.
//!
//! # Usage
//!
//! Run every case in `<pkgdir>/test_coan/test_cases`:
//! ```bash
//! coan-harness --pkgdir /path/to/coan cases
//! ```
//!
//! List the cases as JSON:
//! ```bash
//! coan-harness cases --list --format json
//! ```
//!
//! Run the bulk tests over a smaller corpus:
//! ```bash
//! coan-harness bulk --breadth 3 --depth 3
//! ```
//!
//! # Exit Codes
//!
//! The number of failed tests; a setup failure exits nonzero with a report.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use coan_harness::context::{ContextOptions, HarnessContext};
use coan_harness::logging::{self, Severity};
use coan_harness::suites::{self, OutputFormat};

#[derive(Parser, Debug)]
#[command(name = "coan-harness", version)]
#[command(about = "Directive-driven test harness for the coan preprocessor analyser")]
struct Args {
    /// Display diagnostics with severity >= LEVEL (progress, info, warning,
    /// error, fatal)
    #[arg(short, long, global = true, default_value = "progress", value_name = "LEVEL")]
    verbosity: Severity,

    /// The coan package directory. Default: $COAN_PKGDIR, else ".."
    #[arg(short, long, global = true)]
    pkgdir: Option<PathBuf>,

    /// Directory beneath PKGDIR (or $COAN_BUILDDIR) holding coan. Default "src"
    #[arg(short, long, global = true)]
    execdir: Option<PathBuf>,

    /// Stop at the first failure
    #[arg(short, long, global = true)]
    bail: bool,

    /// Do not delete generated trees or console logs at exit
    #[arg(short, long, global = true)]
    keep: bool,

    /// Record metrics as if this were OTHER_PROGRAM
    #[arg(short, long, global = true, value_name = "OTHER_PROGRAM")]
    client: Option<String>,

    /// Output format of the final report
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    suite: Suite,
}

#[derive(Subcommand, Debug)]
enum Suite {
    /// Run directive-driven test cases
    Cases {
        /// Test files. Default: PKGDIR/test_coan/test_cases/*.c
        #[arg(value_name = "TESTFILE")]
        files: Vec<PathBuf>,

        /// Pass all test files to coan in a single run with arguments ARGS;
        /// verify only the exit code
        #[arg(short, long, value_name = "ARGS", allow_hyphen_values = true)]
        monkey: Option<String>,

        /// Expected exit code with --monkey
        #[arg(short, long, default_value_t = 0, value_name = "N")]
        rc: u32,

        /// List the cases instead of running them
        #[arg(long)]
        list: bool,
    },

    /// Create a random tree of randomly named directories
    Scrap {
        /// Root of the tree; must not exist unless --wipe is given
        #[arg(long, default_value = "scrap", value_name = "DIRNAME")]
        rootname: PathBuf,

        /// At most BREADTH subdirectories per directory
        #[arg(long)]
        breadth: usize,

        /// At most DEPTH levels of directories
        #[arg(long)]
        depth: usize,

        /// Seed for the pseudo-random generator
        #[arg(long)]
        seed: Option<u64>,

        /// Remove the tree if it already exists
        #[arg(short, long)]
        wipe: bool,

        /// Files copied into each created directory
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,
    },

    /// Recursive runs over a generated corpus
    Bulk {
        #[arg(long, default_value_t = 5)]
        breadth: usize,

        #[arg(long, default_value_t = 4)]
        depth: usize,

        #[arg(long, default_value_t = 987654321)]
        seed: u64,

        /// Run only the first NTESTS bulk tests
        #[arg(short, long, value_name = "NTESTS")]
        tests: Option<usize>,
    },

    /// Mirror the package sources into a spin directory and reconcile
    Spin,

    /// A recursive run reached through softlinks, some of them looping
    Softlink {
        /// Root of the linked tree, relative to the test directory
        #[arg(long, default_value = "scrap")]
        rootname: PathBuf,
    },

    /// Check that transient symbols are purged after every input file
    Rewind,

    /// Report runtime and throughput summed over all metrics files
    Metrics,
}

impl Suite {
    fn prog(&self) -> &'static str {
        match self {
            Suite::Cases { .. } => suites::cases::PROG,
            Suite::Scrap { .. } => suites::scrap::PROG,
            Suite::Bulk { .. } => suites::bulk::PROG,
            Suite::Spin => suites::spin::PROG,
            Suite::Softlink { .. } => suites::softlink::PROG,
            Suite::Rewind => suites::rewind::PROG,
            Suite::Metrics => suites::metrics::PROG,
        }
    }
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    logging::init(args.verbosity);

    let prog = args
        .client
        .clone()
        .unwrap_or_else(|| args.suite.prog().to_string());
    let _span = tracing::error_span!("harness", prog = %prog).entered();

    let ctx = HarnessContext::resolve(ContextOptions {
        prog,
        pkgdir: args.pkgdir,
        execdir: args.execdir,
        fail_fast: args.bail,
        keep: args.keep,
    })?;
    let runner = ctx.runner();

    let failures = match args.suite {
        Suite::Cases {
            files,
            monkey,
            rc,
            list,
        } => suites::cases::run(
            &ctx,
            &runner,
            &suites::cases::CasesOptions {
                files,
                monkey,
                rc,
                list,
                format: args.format,
            },
        )?,
        Suite::Scrap {
            rootname,
            breadth,
            depth,
            seed,
            wipe,
            files,
        } => {
            suites::scrap::run(&suites::scrap::ScrapOptions {
                rootname,
                breadth,
                depth,
                seed,
                wipe,
                files,
            })?;
            0
        }
        Suite::Bulk {
            breadth,
            depth,
            seed,
            tests,
        } => suites::bulk::run(
            &ctx,
            &runner,
            &suites::bulk::BulkOptions {
                breadth,
                depth,
                seed,
                tests,
                format: args.format,
            },
        )?,
        Suite::Spin => suites::spin::run(
            &ctx,
            &runner,
            &suites::spin::SpinOptions {
                format: args.format,
            },
        )?,
        Suite::Softlink { rootname } => suites::softlink::run(
            &ctx,
            &runner,
            &suites::softlink::SoftlinkOptions {
                rootname,
                format: args.format,
            },
        )?,
        Suite::Rewind => suites::rewind::run(
            &ctx,
            &runner,
            &suites::rewind::RewindOptions {
                format: args.format,
            },
        )?,
        Suite::Metrics => {
            suites::metrics::run(&ctx.testdir)?;
            0
        }
    };

    std::process::exit(i32::try_from(failures).unwrap_or(i32::MAX));
}
