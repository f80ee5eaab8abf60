//! Durable session orchestrator for autonomous coding agents.
//!
//! The conductor allocates a persisted work session, dispatches an agent
//! backend under a resolved capability allowlist, and on success publishes
//! the working-tree changes as a pushed branch with an open (or updated)
//! pull request. Sessions survive process restarts: a paused session carries
//! a checkpoint and can be resumed by a later invocation, re-entering the
//! publish protocol without duplicating branches, commits, or PRs.
//!
//! The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (allowlist resolution, session
//!   data model). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (session store, git/gh,
//!   process execution, agent backends). Isolated to enable scripted
//!   runners in tests.
//!
//! Orchestration modules ([`run`], [`publish`]) coordinate core logic with
//! I/O to implement CLI commands.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod publish;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
