//! Side-effecting helpers: config files, templates, processes.

pub mod config;
pub mod launcher;
pub mod process;
pub mod template;
