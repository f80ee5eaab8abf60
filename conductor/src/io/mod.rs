//! I/O helpers for conductor commands.

pub mod agent;
pub mod config;
pub mod git;
pub mod init;
pub mod process;
pub mod store;
