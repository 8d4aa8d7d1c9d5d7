//! Functional testing harness.
//!
//! Functional tests run stochastic algorithms once per invocation and store
//! key/value results. Analysis then checks the per-commit means of a result
//! variable against an expected value over the most recent commits.
//!
//! - **[`core`]**: Pure, deterministic logic (result values, naming, statistics,
//!   scheduling). No I/O.
//! - **[`io`]**: Side-effecting operations (config, result stores, git,
//!   processes, rendered plots and reports).
//! - **[`suite`]**: The functional tests and their registry.
//!
//! Orchestration modules ([`run`], [`analyse`], [`report`], [`plot`], [`list`])
//! coordinate the three to implement CLI commands.

pub mod analyse;
pub mod core;
pub mod exit_codes;
pub mod harness;
pub mod io;
pub mod list;
pub mod logging;
pub mod plot;
pub mod report;
pub mod run;
pub mod suite;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
