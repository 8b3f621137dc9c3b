//! Expand argument grids into job scripts and dispatch them.
//!
//! A script entry's default arguments, overridden from the command line, form
//! a table whose Cartesian product gives one job instance per combination.
//! Each instance is rendered through its mode's template and either spawned
//! locally or submitted to Slurm. The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (config model, grid, names, paths).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (config files, templates, processes).
//!   Behind traits where tests need to substitute them.
//!
//! [`render`], [`dispatch`] and [`submit`] coordinate the two; [`cli`] and
//! [`report`] are the command-line surface.

pub mod cli;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod render;
pub mod report;
pub mod submit;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
