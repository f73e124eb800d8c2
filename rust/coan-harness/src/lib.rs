//! Directive-driven test harness for the `coan` preprocessor analyser.
//!
//! The harness treats `coan` as a black box. Test files carry their own
//! parameters in header comments (`/**ARGS: ... */`, `/**SYSCODE: ... */`
//! and friends); the harness parses them, composes and runs the subject,
//! and judges its exit code and output. On top of that engine sit suites
//! that stress recursive traversal over generated corpora, reconcile
//! mirrored output trees with their inputs, and compare batched runs with
//! single-file runs.
//!
//! The flow through the crate:
//!
//! - [`directive`] parses a test file header into a [`directive::TestDirective`]
//! - [`case`] composes a [`command::Invocation`] from it and runs it
//! - [`verify`] compares the results and yields a [`verify::Verdict`]
//! - [`corpus`], [`reconcile`] and [`differential`] support the suites
//! - [`suites`] holds one module per subcommand of the binary

pub mod case;
pub mod command;
pub mod context;
pub mod corpus;
pub mod differential;
pub mod directive;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod reconcile;
pub mod suites;
pub mod verify;
pub mod walk;

pub use error::{HarnessError, Result};
