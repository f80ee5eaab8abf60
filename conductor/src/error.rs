//! Domain error taxonomy and top-level failure classification.
//!
//! Errors flow through `anyhow` everywhere; the two structs here are the
//! only ones callers downcast. [`ConfigError`] carries a stable tag that is
//! prefixed onto its reported message, and [`Interrupted`] marks the
//! distinguished cancellation path that maps to exit code 130. Anything
//! else is an opaque failure mapping to exit code 1, unless its message
//! matches the interruption pattern.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::exit_codes;

/// Malformed or missing configuration. Non-retryable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub message: String,
}

impl ConfigError {
    /// Stable tag prefixed onto the reported message.
    pub const TAG: &'static str = "CONFIG_ERROR";

    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", Self::TAG, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// The process was interrupted while work was in flight.
///
/// Raised after best-effort checkpoint persistence; the control loop pauses
/// the session before unwinding with this error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interrupted {
    /// Session that was paused on the way out, if one existed yet.
    pub session_id: Option<String>,
}

impl Interrupted {
    pub fn new(session_id: Option<String>) -> Self {
        Self { session_id }
    }
}

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.session_id {
            Some(id) => write!(f, "interrupted (session {id} paused)"),
            None => write!(f, "interrupted"),
        }
    }
}

impl std::error::Error for Interrupted {}

/// True when a failure message indicates the process received an
/// interruption (e.g. a child reported SIGINT).
pub fn is_interruption_message(message: &str) -> bool {
    static PATTERN: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)\b(interrupt(ed)?|sigint)\b").unwrap());
    PATTERN.is_match(message)
}

/// Map a top-level failure to its process exit code.
///
/// [`Interrupted`] (or any error whose rendered message matches the
/// interruption pattern) maps to 130; everything else, tagged or not,
/// maps to 1.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<Interrupted>().is_some() {
        return exit_codes::INTERRUPTED;
    }
    if is_interruption_message(&format!("{err:#}")) {
        return exit_codes::INTERRUPTED;
    }
    exit_codes::FAILURE
}
