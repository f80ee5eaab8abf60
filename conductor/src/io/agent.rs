//! Agent dispatch over interchangeable backends.
//!
//! Backends are a closed tagged set ([`AgentConfig`]) dispatched once here.
//! Each backend is a black box: it receives a prompt, a working directory,
//! and the resolved tool restriction, and its response is normalized into
//! the uniform [`AgentResult`] shape. A backend-reported failure becomes
//! `success = false`, never a propagated error.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::allowlist::{EffectiveTools, Phase, resolve};
use crate::core::session::AgentConfig;
use crate::error::Interrupted;
use crate::io::process::{CommandOutput, run_command_with_timeout};

/// Sentinel the claude backend is prompted to emit when it believes the
/// task is done.
const CLAUDE_COMPLETION_SENTINEL: &str = "WORK COMPLETE";

/// Sentinel the codex backend is prompted to emit in its final message.
const CODEX_COMPLETION_SENTINEL: &str = "TASK COMPLETE";

/// Exit code a child reports when it was interrupted by SIGINT.
const SIGINT_EXIT_CODE: i32 = 130;

/// Parameters for one backend invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Working directory for the backend process.
    pub workdir: PathBuf,
    /// Prompt text fed to the agent on stdin.
    pub prompt: String,
    /// Simulate the invocation without contacting a backend.
    pub dry_run: bool,
    /// Explicit tool allowlist; wins over any phase default.
    pub allowed_tools: Option<Vec<String>>,
    /// Work-item phase selecting a default allowlist.
    pub phase: Option<Phase>,
    /// Maximum time to wait for the backend.
    pub timeout: Duration,
    /// Truncate backend output beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Normalized backend response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentResult {
    /// The backend process reported success.
    pub success: bool,
    /// Combined diagnostic/agent output.
    pub output: String,
    /// The backend's completion sentinel was observed. Independent of
    /// `success`: a process can succeed without declaring completion.
    pub completion_detected: bool,
}

/// Dispatch one agent invocation for `config`.
///
/// Resolves the capability allowlist before any backend contact and logs
/// the outcome (or its absence). An interruption of the backend surfaces
/// as the distinguished [`Interrupted`] error, not a generic failure.
#[instrument(skip_all, fields(backend = config.kind(), dry_run = request.dry_run))]
pub fn run_agent(config: &AgentConfig, request: &AgentRequest) -> Result<AgentResult> {
    let explicit = request
        .allowed_tools
        .as_deref()
        .or_else(|| config.allowed_tools());
    let phase = request.phase.or_else(|| config.phase());
    let tools = resolve(explicit, phase);
    match &tools {
        EffectiveTools::Unrestricted => info!("no tool restriction applies"),
        EffectiveTools::Allowed(_) => info!(restriction = %tools, "resolved tool allowlist"),
    }

    if request.dry_run {
        debug!("dry-run: simulating backend invocation");
        return Ok(AgentResult {
            success: true,
            output: format!("[dry-run] simulated {} invocation", config.kind()),
            completion_detected: true,
        });
    }

    let cmd = match config {
        AgentConfig::Claude { model, .. } => claude_command(request, model.as_deref(), &tools),
        AgentConfig::Codex { model, .. } => codex_command(request, model.as_deref(), &tools),
    };

    let output = run_command_with_timeout(
        cmd,
        Some(request.prompt.as_bytes()),
        request.timeout,
        request.output_limit_bytes,
    )
    .with_context(|| format!("run {} backend", config.kind()))?;

    if output.status.code() == Some(SIGINT_EXIT_CODE) {
        warn!("backend reported SIGINT");
        return Err(Interrupted::new(None).into());
    }

    Ok(normalize(config.kind(), &output, request.timeout))
}

fn claude_command(request: &AgentRequest, model: Option<&str>, tools: &EffectiveTools) -> Command {
    let mut cmd = Command::new("claude");
    cmd.arg("-p").arg("--output-format").arg("text");
    if let Some(model) = model {
        cmd.arg("--model").arg(model);
    }
    if let EffectiveTools::Allowed(allowed) = tools {
        cmd.arg("--allowedTools").arg(allowed.join(","));
    }
    cmd.current_dir(&request.workdir);
    cmd
}

fn codex_command(request: &AgentRequest, model: Option<&str>, tools: &EffectiveTools) -> Command {
    let mut cmd = Command::new("codex");
    cmd.arg("exec");
    if let Some(model) = model {
        cmd.arg("--model").arg(model);
    }
    // Codex has no per-tool allowlist; the restriction maps onto its
    // sandbox levels instead.
    cmd.arg("--sandbox").arg(sandbox_for(tools));
    cmd.arg("--skip-git-repo-check").arg("-");
    cmd.current_dir(&request.workdir);
    cmd
}

fn sandbox_for(tools: &EffectiveTools) -> &'static str {
    match tools {
        EffectiveTools::Unrestricted => "danger-full-access",
        EffectiveTools::Allowed(allowed) => {
            let mutating = ["Edit", "Write", "Bash"];
            if allowed.iter().any(|t| mutating.contains(&t.as_str())) {
                "workspace-write"
            } else {
                "read-only"
            }
        }
    }
}

fn normalize(kind: &str, output: &CommandOutput, timeout: Duration) -> AgentResult {
    let stdout = output.stdout_lossy();
    if output.timed_out {
        warn!(timeout_secs = timeout.as_secs(), "backend timed out");
        return AgentResult {
            success: false,
            output: format!("{kind} backend timed out after {timeout:?}"),
            completion_detected: false,
        };
    }

    let completion_detected = detect_completion(kind, &stdout);
    if output.status.success() {
        AgentResult {
            success: true,
            output: stdout,
            completion_detected,
        }
    } else {
        warn!(exit_code = ?output.status.code(), "backend reported failure");
        AgentResult {
            success: false,
            output: format!(
                "{kind} backend failed with status {:?}\n{}\n{}",
                output.status.code(),
                stdout.trim_end(),
                output.stderr_lossy().trim_end()
            ),
            completion_detected,
        }
    }
}

/// Backend-specific completion heuristic: scan for the sentinel the agent
/// is prompted to emit when it believes its task is done.
pub fn detect_completion(kind: &str, output: &str) -> bool {
    match kind {
        "claude" => output.contains(CLAUDE_COMPLETION_SENTINEL),
        "codex" => output.contains(CODEX_COMPLETION_SENTINEL),
        _ => false,
    }
}
