//! Capability allowlist resolution for agent dispatch.
//!
//! An invocation may restrict which tools the agent is allowed to use.
//! Precedence is strict: an explicit tool list (even an empty one) wins
//! over the phase default, and with neither the agent runs unrestricted —
//! no filtering argument is passed to the backend at all.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Named work-item stage selecting a default allowlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Read-only exploration; mutating tools are excluded.
    Research,
    /// Full implementation work, including mutating tools.
    Implement,
}

/// Tools permitted during a research phase (read-only).
const RESEARCH_TOOLS: &[&str] = &["Read", "Grep", "Glob", "WebFetch"];

/// Tools added on top of [`RESEARCH_TOOLS`] during implementation.
const IMPLEMENT_EXTRA_TOOLS: &[&str] = &["Edit", "Write", "Bash"];

/// The concrete restriction passed to a backend, or the absence of one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectiveTools {
    /// No filtering argument is passed to the backend.
    Unrestricted,
    /// Exactly these tools are permitted. May be empty.
    Allowed(Vec<String>),
}

impl EffectiveTools {
    pub fn is_unrestricted(&self) -> bool {
        matches!(self, EffectiveTools::Unrestricted)
    }
}

impl fmt::Display for EffectiveTools {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectiveTools::Unrestricted => write!(f, "unrestricted"),
            EffectiveTools::Allowed(tools) => write!(f, "[{}]", tools.join(", ")),
        }
    }
}

/// Resolve the effective tool set for one agent invocation.
///
/// Explicit always wins over phase; an explicit empty list means "no tools",
/// not "unrestricted".
pub fn resolve(explicit: Option<&[String]>, phase: Option<Phase>) -> EffectiveTools {
    if let Some(tools) = explicit {
        return EffectiveTools::Allowed(tools.to_vec());
    }
    match phase {
        Some(phase) => EffectiveTools::Allowed(phase_tools(phase)),
        None => EffectiveTools::Unrestricted,
    }
}

fn phase_tools(phase: Phase) -> Vec<String> {
    let names: Vec<&str> = match phase {
        Phase::Research => RESEARCH_TOOLS.to_vec(),
        Phase::Implement => RESEARCH_TOOLS
            .iter()
            .chain(IMPLEMENT_EXTRA_TOOLS.iter())
            .copied()
            .collect(),
    };
    names.iter().map(|name| (*name).to_string()).collect()
}
