//! Side-effecting helpers for funk commands: config, stores, git, processes
//! and rendered artifacts.

pub mod config;
pub mod git;
pub mod host;
pub mod paths;
pub mod plot;
pub mod process;
pub mod report;
pub mod result_db;
pub mod result_file;
pub mod store;
