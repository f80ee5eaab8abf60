//! Pause/resume behavior across process boundaries.
//!
//! A paused session is written through the library (as a previous process
//! would have left it), then resumed via the spawned binary, and the
//! resulting record is inspected through the library again.

use std::path::Path;
use std::process::{Command, Output};

use conductor::core::allowlist::Phase;
use conductor::core::session::{AgentConfig, Checkpoint, Session, SessionState};
use conductor::exit_codes;
use conductor::io::store::SessionStore;
use conductor::test_support::scaffold_project;

fn conductor(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_conductor"))
        .args(args)
        .current_dir(root)
        .output()
        .expect("spawn conductor")
}

fn paused_session(id: &str) -> Session {
    Session {
        session_id: id.to_string(),
        vm_name: "vm-7".to_string(),
        item_id: Some("item-42".to_string()),
        start_time: 1_000,
        config: AgentConfig::Claude {
            model: None,
            allowed_tools: None,
            phase: Some(Phase::Implement),
        },
        state: SessionState::Paused,
        checkpoint: Some(Checkpoint {
            iteration: 2,
            progress_log: "refactored the parser, tests still failing".to_string(),
            timestamp: 1_500,
        }),
    }
}

#[test]
fn paused_session_resumes_to_completion_in_new_process() {
    let temp = tempfile::tempdir().expect("tempdir");
    scaffold_project(temp.path()).expect("scaffold");
    let store = SessionStore::open(temp.path()).expect("open");

    store.save(&paused_session("session-x")).expect("save");

    let output = conductor(temp.path(), &["resume", "session-x", "--dry-run"]);
    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let resumed = store.load("session-x").expect("load").expect("present");
    assert_eq!(resumed.state, SessionState::Completed);
    // The checkpoint counter keeps climbing across process restarts.
    assert_eq!(resumed.checkpoint.expect("checkpoint").iteration, 3);
}

#[test]
fn completed_session_cannot_be_resumed() {
    let temp = tempfile::tempdir().expect("tempdir");
    scaffold_project(temp.path()).expect("scaffold");
    let store = SessionStore::open(temp.path()).expect("open");

    let mut session = paused_session("session-y");
    session.state = SessionState::Completed;
    store.save(&session).expect("save");

    let output = conductor(temp.path(), &["resume", "session-y", "--dry-run"]);
    assert_eq!(output.status.code(), Some(exit_codes::FAILURE));
    assert!(
        String::from_utf8_lossy(&output.stderr).contains("already completed"),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
}
