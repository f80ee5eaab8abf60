//! Pure, deterministic logic: no I/O, no subprocess calls.

pub mod allowlist;
pub mod session;
