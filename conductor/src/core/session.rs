//! Session data model persisted by the session store.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::core::allowlist::Phase;

/// Lifecycle state of a session.
///
/// The store does not validate transitions; legality is the control loop's
/// responsibility. `running -> paused` should carry a checkpoint,
/// `paused -> running` resumes without requiring one, and
/// `running -> completed` is terminal for that session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Running,
    Paused,
    Completed,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Running => "running",
            SessionState::Paused => "paused",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Snapshot of in-progress work sufficient to resume a paused session.
///
/// Replaced wholesale on update, never field-merged. All three fields
/// always travel together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Monotonic iteration counter across the session's lifetime.
    pub iteration: u32,
    /// Text snapshot of progress at checkpoint time.
    pub progress_log: String,
    /// Unix epoch milliseconds when the checkpoint was taken.
    pub timestamp: u64,
}

/// Backend configuration, discriminated by kind.
///
/// Dispatch inspects only the tag plus the optional `phase` and
/// `allowed_tools` fields; backend-specific payload (model names, sandbox
/// flags) passes through opaque to the orchestrator. New backends extend
/// this enum without touching the resolver or the publisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentConfig {
    Claude {
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        allowed_tools: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        phase: Option<Phase>,
    },
    Codex {
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        allowed_tools: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        phase: Option<Phase>,
    },
}

impl AgentConfig {
    /// Backend kind tag, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentConfig::Claude { .. } => "claude",
            AgentConfig::Codex { .. } => "codex",
        }
    }

    pub fn allowed_tools(&self) -> Option<&[String]> {
        match self {
            AgentConfig::Claude { allowed_tools, .. }
            | AgentConfig::Codex { allowed_tools, .. } => allowed_tools.as_deref(),
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        match self {
            AgentConfig::Claude { phase, .. } | AgentConfig::Codex { phase, .. } => *phase,
        }
    }
}

/// Persisted record tracking one unit of agent work across process restarts.
///
/// Exclusively owned by the session store; callers hold only the
/// `session_id`, never a live handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    /// Execution environment the session runs in (`local` when none).
    pub vm_name: String,
    /// Work item this session belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    /// Unix epoch milliseconds when the session was created.
    pub start_time: u64,
    pub config: AgentConfig,
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<Checkpoint>,
}
