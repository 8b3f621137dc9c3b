//! Deterministic, pure logic shared by the submit pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod config;
pub mod grid;
pub mod layout;
pub mod scheduler;
pub mod types;
pub mod value;
