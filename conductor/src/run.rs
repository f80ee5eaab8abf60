//! Control loop: session lifecycle around one agent invocation.
//!
//! Per work item: create (or resume) a Session, dispatch the agent under
//! the resolved allowlist, checkpoint progress, and on success hand off to
//! the publisher. The loop owns transition legality; the store records
//! whatever it is told. An interruption pauses the session with a
//! best-effort checkpoint before unwinding.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument, warn};

use crate::core::allowlist::Phase;
use crate::core::session::{AgentConfig, Checkpoint, Session, SessionState};
use crate::error::Interrupted;
use crate::io::agent::{AgentRequest, AgentResult, run_agent};
use crate::io::config::ConductorConfig;
use crate::io::git::{Git, GitOptions, PrResult};
use crate::io::store::{SessionStore, epoch_millis};
use crate::publish::{PublishRequest, publish};

/// Keep at most this much agent output in a checkpoint's progress log.
const PROGRESS_LOG_LIMIT_BYTES: usize = 4_000;

/// Inputs for starting a new session against a work item.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Work item this session belongs to, if any.
    pub item_id: Option<String>,
    pub prompt: String,
    /// Execution environment name (`local` when not isolated).
    pub vm_name: String,
    pub config: AgentConfig,
    /// Explicit allowlist override for this invocation.
    pub allowed_tools: Option<Vec<String>>,
    pub phase: Option<Phase>,
    pub dry_run: bool,
    /// Skip the publish step even on success.
    pub publish: bool,
}

/// Summary of one control-loop pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub session_id: String,
    pub state: SessionState,
    /// The backend reported success.
    pub success: bool,
    /// The backend's completion sentinel was observed.
    pub completion_detected: bool,
    pub pr: Option<PrResult>,
}

/// Start a fresh session for a work item and drive it to a terminal or
/// paused state.
#[instrument(skip_all, fields(item_id = ?request.item_id, dry_run = request.dry_run))]
pub fn run_item(
    store: &SessionStore,
    cfg: &ConductorConfig,
    request: &RunRequest,
) -> Result<RunOutcome> {
    let session = Session {
        session_id: SessionStore::generate_session_id(),
        vm_name: request.vm_name.clone(),
        item_id: request.item_id.clone(),
        start_time: epoch_millis(),
        config: request.config.clone(),
        state: SessionState::Running,
        checkpoint: None,
    };
    store.save(&session)?;
    info!(session_id = %session.session_id, "session created");

    drive(
        store,
        cfg,
        session,
        &request.prompt,
        &DriveOptions {
            allowed_tools: request.allowed_tools.clone(),
            phase: request.phase,
            dry_run: request.dry_run,
            publish: request.publish,
        },
    )
}

/// Resume a previously paused (or orphaned running) session.
///
/// The prompt is rebuilt from the persisted checkpoint unless the caller
/// supplies one. Completed sessions are terminal and cannot be resumed.
#[instrument(skip_all, fields(session_id, dry_run))]
pub fn resume(
    store: &SessionStore,
    cfg: &ConductorConfig,
    session_id: &str,
    prompt_override: Option<String>,
    dry_run: bool,
) -> Result<RunOutcome> {
    let session = store
        .load(session_id)?
        .ok_or_else(|| anyhow!("session {session_id} not found"))?;
    if session.state == SessionState::Completed {
        return Err(anyhow!("session {session_id} is already completed"));
    }
    let prompt = prompt_override.unwrap_or_else(|| resume_prompt(&session));
    let session = store.update_state(session_id, SessionState::Running, None)?;
    info!("session resumed");

    drive(
        store,
        cfg,
        session,
        &prompt,
        &DriveOptions {
            allowed_tools: None,
            phase: None,
            dry_run,
            publish: true,
        },
    )
}

#[derive(Debug, Clone)]
struct DriveOptions {
    allowed_tools: Option<Vec<String>>,
    phase: Option<Phase>,
    dry_run: bool,
    publish: bool,
}

fn drive(
    store: &SessionStore,
    cfg: &ConductorConfig,
    session: Session,
    prompt: &str,
    options: &DriveOptions,
) -> Result<RunOutcome> {
    let session_id = session.session_id.clone();
    let agent_request = AgentRequest {
        workdir: store.root().to_path_buf(),
        prompt: prompt.to_string(),
        dry_run: options.dry_run,
        allowed_tools: options.allowed_tools.clone(),
        phase: options.phase,
        timeout: Duration::from_secs(cfg.agent_timeout_secs),
        output_limit_bytes: cfg.output_limit_bytes,
    };

    let result = match run_agent(&session.config, &agent_request) {
        Ok(result) => result,
        Err(err) => {
            if err.downcast_ref::<Interrupted>().is_some() {
                pause_best_effort(store, &session, "interrupted during agent invocation");
                return Err(Interrupted::new(Some(session_id)).into());
            }
            fail_best_effort(store, &session_id);
            return Err(err);
        }
    };

    let checkpoint = next_checkpoint(&session, &result.output);
    if !result.success {
        // Backend failure is data for the caller, not a process error.
        store.update_state(&session_id, SessionState::Failed, Some(checkpoint))?;
        warn!("backend reported failure, session marked failed");
        return Ok(RunOutcome {
            session_id,
            state: SessionState::Failed,
            success: false,
            completion_detected: result.completion_detected,
            pr: None,
        });
    }

    // Checkpoint progress before any publish side effects, so a resumed
    // run re-enters with the agent's work already recorded.
    store.update_state(&session_id, SessionState::Running, Some(checkpoint))?;

    let pr = if options.publish {
        let git = Git::new(GitOptions::new(store.root(), options.dry_run));
        let publish_request = publish_request_for(&session, cfg, &result);
        match publish(&git, &publish_request) {
            Ok(pr) => Some(pr),
            Err(err) => {
                fail_best_effort(store, &session_id);
                return Err(err).context("publish session changes");
            }
        }
    } else {
        None
    };

    store.update_state(&session_id, SessionState::Completed, None)?;
    info!(completion_detected = result.completion_detected, "session completed");
    Ok(RunOutcome {
        session_id,
        state: SessionState::Completed,
        success: true,
        completion_detected: result.completion_detected,
        pr,
    })
}

fn publish_request_for(
    session: &Session,
    cfg: &ConductorConfig,
    result: &AgentResult,
) -> PublishRequest {
    let slug = session
        .item_id
        .clone()
        .unwrap_or_else(|| session.session_id.clone());
    PublishRequest {
        branch: format!("{}{slug}", cfg.branch_prefix),
        base: cfg.base_branch.clone(),
        title: format!("Conductor: {slug}"),
        body: format!(
            "Automated changes produced by session `{}`.\n\nCompletion detected: {}.",
            session.session_id, result.completion_detected
        ),
        commit_message: format!("conductor: {slug}"),
    }
}

fn next_checkpoint(session: &Session, output: &str) -> Checkpoint {
    let iteration = session
        .checkpoint
        .as_ref()
        .map(|c| c.iteration + 1)
        .unwrap_or(1);
    Checkpoint {
        iteration,
        progress_log: tail(output, PROGRESS_LOG_LIMIT_BYTES),
        timestamp: epoch_millis(),
    }
}

fn resume_prompt(session: &Session) -> String {
    match &session.checkpoint {
        Some(checkpoint) => format!(
            "Resume the previous work session. Progress so far (iteration {}):\n\n{}",
            checkpoint.iteration, checkpoint.progress_log
        ),
        None => "Resume the previous work session from the beginning.".to_string(),
    }
}

fn pause_best_effort(store: &SessionStore, session: &Session, note: &str) {
    let checkpoint = next_checkpoint(session, note);
    if let Err(err) = store.update_state(&session.session_id, SessionState::Paused, Some(checkpoint))
    {
        warn!(err = %err, "failed to pause session on interruption");
    }
}

fn fail_best_effort(store: &SessionStore, session_id: &str) {
    if let Err(err) = store.update_state(session_id, SessionState::Failed, None) {
        warn!(err = %err, "failed to mark session failed");
    }
}

/// Last `max_bytes` of `text`, trimmed to a char boundary.
fn tail(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::allowlist::Phase;
    use crate::io::store::SessionFilter;
    use crate::test_support::scaffold_project;

    fn claude_config() -> AgentConfig {
        AgentConfig::Claude {
            model: None,
            allowed_tools: None,
            phase: Some(Phase::Implement),
        }
    }

    fn dry_request(item_id: Option<&str>, publish: bool) -> RunRequest {
        RunRequest {
            item_id: item_id.map(str::to_string),
            prompt: "implement the widget".to_string(),
            vm_name: "local".to_string(),
            config: claude_config(),
            allowed_tools: None,
            phase: None,
            dry_run: true,
            publish,
        }
    }

    fn open_store() -> (tempfile::TempDir, SessionStore) {
        let temp = tempfile::tempdir().expect("tempdir");
        scaffold_project(temp.path()).expect("scaffold");
        let store = SessionStore::open(temp.path()).expect("open");
        (temp, store)
    }

    #[test]
    fn dry_run_completes_session_with_checkpoint_and_pr() {
        let (_temp, store) = open_store();
        let cfg = ConductorConfig::default();

        let outcome = run_item(&store, &cfg, &dry_request(Some("item-1"), true)).expect("run");
        assert!(outcome.success);
        assert!(outcome.completion_detected);
        assert_eq!(outcome.state, SessionState::Completed);
        assert_eq!(
            outcome.pr,
            Some(PrResult {
                created: true,
                number: 0
            })
        );

        let session = store
            .load(&outcome.session_id)
            .expect("load")
            .expect("present");
        assert_eq!(session.state, SessionState::Completed);
        let checkpoint = session.checkpoint.expect("checkpoint");
        assert_eq!(checkpoint.iteration, 1);
        assert!(checkpoint.progress_log.contains("[dry-run]"));
    }

    #[test]
    fn no_publish_skips_pr() {
        let (_temp, store) = open_store();
        let cfg = ConductorConfig::default();

        let outcome = run_item(&store, &cfg, &dry_request(None, false)).expect("run");
        assert!(outcome.success);
        assert_eq!(outcome.pr, None);
        assert_eq!(outcome.state, SessionState::Completed);
    }

    #[test]
    fn resume_continues_iteration_counter() {
        let (_temp, store) = open_store();
        let cfg = ConductorConfig::default();

        let session = Session {
            session_id: "session-paused".to_string(),
            vm_name: "local".to_string(),
            item_id: Some("item-2".to_string()),
            start_time: 1,
            config: claude_config(),
            state: SessionState::Paused,
            checkpoint: Some(Checkpoint {
                iteration: 4,
                progress_log: "was working on the parser".to_string(),
                timestamp: 2,
            }),
        };
        store.save(&session).expect("save");

        let outcome = resume(&store, &cfg, "session-paused", None, true).expect("resume");
        assert!(outcome.success);
        assert_eq!(outcome.state, SessionState::Completed);

        let loaded = store
            .load("session-paused")
            .expect("load")
            .expect("present");
        assert_eq!(loaded.checkpoint.expect("checkpoint").iteration, 5);
    }

    #[test]
    fn resume_unknown_session_errors() {
        let (_temp, store) = open_store();
        let cfg = ConductorConfig::default();

        let err = resume(&store, &cfg, "session-missing", None, true).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn resume_completed_session_is_rejected() {
        let (_temp, store) = open_store();
        let cfg = ConductorConfig::default();

        let session = Session {
            session_id: "session-done".to_string(),
            vm_name: "local".to_string(),
            item_id: None,
            start_time: 1,
            config: claude_config(),
            state: SessionState::Completed,
            checkpoint: None,
        };
        store.save(&session).expect("save");

        let err = resume(&store, &cfg, "session-done", None, true).unwrap_err();
        assert!(err.to_string().contains("already completed"));
    }

    #[test]
    fn run_creates_listable_session() {
        let (_temp, store) = open_store();
        let cfg = ConductorConfig::default();

        run_item(&store, &cfg, &dry_request(Some("item-3"), false)).expect("run");
        let listed = store
            .list(&SessionFilter {
                state: Some(SessionState::Completed),
                item_id: Some("item-3".to_string()),
            })
            .expect("list");
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn tail_respects_char_boundaries() {
        let text = "ééééé";
        let tail = tail(text, 3);
        assert!(tail.len() <= 3);
        assert!(tail.chars().all(|c| c == 'é'));
    }
}
