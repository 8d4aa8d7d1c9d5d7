//! Deterministic, pure logic shared by the funk commands.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod naming;
pub mod schedule;
pub mod stats;
pub mod value;
