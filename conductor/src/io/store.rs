//! Durable session storage under `.conductor/sessions/`.
//!
//! The store is a persistent map plus an index: one JSON record per
//! session id, written atomically (temp file + rename) so a concurrent
//! reader, possibly in another process, never observes a partial record.
//! It enforces no state-transition legality; the control loop owns that.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::core::session::{Checkpoint, Session, SessionState};

/// Recognizable prefix carried by every generated session id.
pub const SESSION_ID_PREFIX: &str = "session-";

/// Optional criteria for [`SessionStore::list`]. Fields AND together;
/// an omitted field matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionFilter {
    pub state: Option<SessionState>,
    pub item_id: Option<String>,
}

/// Keyed store for [`Session`] records.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
    sessions_dir: PathBuf,
}

impl SessionStore {
    /// Open the store by resolving its root from `start`.
    ///
    /// Walks upward until a directory containing both `.git` and
    /// `.conductor` is found. Failure to locate a root is fatal: the
    /// caller is outside any initialized project.
    #[instrument(skip_all)]
    pub fn open(start: &Path) -> Result<Self> {
        let root = resolve_root(start).ok_or_else(|| {
            anyhow!(
                "no conductor root found walking up from {} (need both .git and .conductor; run `conductor init`)",
                start.display()
            )
        })?;
        debug!(root = %root.display(), "resolved store root");
        Ok(Self {
            sessions_dir: root.join(".conductor").join("sessions"),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Generate a session id: prefix + epoch millis + random fragment.
    ///
    /// The random fragment keeps ids distinct even when two sessions are
    /// created within the same millisecond.
    pub fn generate_session_id() -> String {
        let millis = epoch_millis();
        let fragment = Uuid::new_v4().simple().to_string();
        format!("{SESSION_ID_PREFIX}{millis}-{}", &fragment[..8])
    }

    /// Write (or overwrite) the full record for `session.session_id`.
    #[instrument(skip_all, fields(session_id = %session.session_id))]
    pub fn save(&self, session: &Session) -> Result<()> {
        let path = self.record_path(&session.session_id);
        let mut buf = serde_json::to_string_pretty(session).context("serialize session")?;
        buf.push('\n');
        write_atomic(&path, &buf)?;
        debug!(state = ?session.state, "session saved");
        Ok(())
    }

    /// Load a record, or `None` when the id is unknown. Absence is never
    /// an error; a present-but-unparsable record is.
    pub fn load(&self, session_id: &str) -> Result<Option<Session>> {
        let path = self.record_path(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read session {session_id}"))?;
        let session: Session = serde_json::from_str(&contents)
            .with_context(|| format!("parse session {session_id}"))?;
        Ok(Some(session))
    }

    /// List matching sessions, newest-first by `start_time`; ties broken
    /// by `session_id` descending so the order is deterministic.
    #[instrument(skip_all)]
    pub fn list(&self, filter: &SessionFilter) -> Result<Vec<Session>> {
        if !self.sessions_dir.exists() {
            return Ok(Vec::new());
        }
        let mut sessions = Vec::new();
        for entry in fs::read_dir(&self.sessions_dir).context("read sessions dir")? {
            let entry = entry.context("read sessions dir entry")?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read session record {}", path.display()))?;
            let session: Session = serde_json::from_str(&contents)
                .with_context(|| format!("parse session record {}", path.display()))?;
            if matches(&session, filter) {
                sessions.push(session);
            }
        }
        sessions.sort_by(|a, b| {
            b.start_time
                .cmp(&a.start_time)
                .then_with(|| b.session_id.cmp(&a.session_id))
        });
        debug!(count = sessions.len(), "sessions listed");
        Ok(sessions)
    }

    /// Set `state` (and wholesale-replace the checkpoint when given) for an
    /// existing record. Errors when the record does not exist.
    #[instrument(skip_all, fields(session_id, new_state = ?new_state))]
    pub fn update_state(
        &self,
        session_id: &str,
        new_state: SessionState,
        checkpoint: Option<Checkpoint>,
    ) -> Result<Session> {
        let mut session = self
            .load(session_id)?
            .ok_or_else(|| anyhow!("cannot update state: session {session_id} not found"))?;
        session.state = new_state;
        if let Some(checkpoint) = checkpoint {
            session.checkpoint = Some(checkpoint);
        }
        self.save(&session)?;
        Ok(session)
    }

    /// Remove a record. Idempotent: deleting a missing id is not an error.
    #[instrument(skip_all, fields(session_id))]
    pub fn delete(&self, session_id: &str) -> Result<()> {
        let path = self.record_path(session_id);
        if !path.exists() {
            debug!("session already absent");
            return Ok(());
        }
        fs::remove_file(&path).with_context(|| format!("delete session {session_id}"))?;
        debug!("session deleted");
        Ok(())
    }

    fn record_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{session_id}.json"))
    }
}

fn matches(session: &Session, filter: &SessionFilter) -> bool {
    if let Some(state) = filter.state
        && session.state != state
    {
        return false;
    }
    if let Some(item_id) = &filter.item_id
        && session.item_id.as_deref() != Some(item_id.as_str())
    {
        return false;
    }
    true
}

/// Walk upward from `start` looking for a directory that contains both a
/// version-control marker and the conductor marker.
fn resolve_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists() && dir.join(".conductor").exists())
        .map(Path::to_path_buf)
}

/// Current wall-clock time as unix epoch milliseconds.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("session path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp session {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace session {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::allowlist::Phase;
    use crate::core::session::AgentConfig;
    use crate::test_support::scaffold_project;

    fn claude_config() -> AgentConfig {
        AgentConfig::Claude {
            model: None,
            allowed_tools: None,
            phase: Some(Phase::Implement),
        }
    }

    fn session(id: &str, start_time: u64, state: SessionState, item_id: Option<&str>) -> Session {
        Session {
            session_id: id.to_string(),
            vm_name: "local".to_string(),
            item_id: item_id.map(str::to_string),
            start_time,
            config: claude_config(),
            state,
            checkpoint: None,
        }
    }

    #[test]
    fn generated_ids_are_distinct_and_prefixed() {
        let ids: Vec<String> = (0..100).map(|_| SessionStore::generate_session_id()).collect();
        for id in &ids {
            assert!(id.starts_with(SESSION_ID_PREFIX), "{id}");
        }
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn open_fails_without_markers() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = SessionStore::open(temp.path()).unwrap_err();
        assert!(err.to_string().contains("no conductor root"));
    }

    #[test]
    fn open_resolves_root_from_nested_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        scaffold_project(temp.path()).expect("scaffold");
        let nested = temp.path().join("src").join("deep");
        fs::create_dir_all(&nested).expect("nested dirs");

        let store = SessionStore::open(&nested).expect("open");
        assert_eq!(store.root(), temp.path());
    }

    #[test]
    fn save_then_load_round_trips_with_checkpoint() {
        let temp = tempfile::tempdir().expect("tempdir");
        scaffold_project(temp.path()).expect("scaffold");
        let store = SessionStore::open(temp.path()).expect("open");

        let mut saved = session("session-1", 42, SessionState::Running, Some("item-9"));
        saved.checkpoint = Some(Checkpoint {
            iteration: 3,
            progress_log: "halfway".to_string(),
            timestamp: 43,
        });
        store.save(&saved).expect("save");

        let loaded = store.load("session-1").expect("load").expect("present");
        assert_eq!(loaded, saved);
    }

    #[test]
    fn load_missing_returns_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        scaffold_project(temp.path()).expect("scaffold");
        let store = SessionStore::open(temp.path()).expect("open");

        assert_eq!(store.load("session-nope").expect("load"), None);
    }

    #[test]
    fn list_orders_newest_first_with_id_tiebreak() {
        let temp = tempfile::tempdir().expect("tempdir");
        scaffold_project(temp.path()).expect("scaffold");
        let store = SessionStore::open(temp.path()).expect("open");

        store
            .save(&session("session-a", 100, SessionState::Running, None))
            .expect("save");
        store
            .save(&session("session-b", 200, SessionState::Running, None))
            .expect("save");
        store
            .save(&session("session-c", 200, SessionState::Running, None))
            .expect("save");

        let listed = store.list(&SessionFilter::default()).expect("list");
        let ids: Vec<&str> = listed.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, vec!["session-c", "session-b", "session-a"]);
    }

    #[test]
    fn list_filters_by_state_and_item() {
        let temp = tempfile::tempdir().expect("tempdir");
        scaffold_project(temp.path()).expect("scaffold");
        let store = SessionStore::open(temp.path()).expect("open");

        store
            .save(&session("session-run", 1, SessionState::Running, Some("item-1")))
            .expect("save");
        store
            .save(&session("session-pause", 2, SessionState::Paused, Some("item-1")))
            .expect("save");
        store
            .save(&session("session-other", 3, SessionState::Running, Some("item-2")))
            .expect("save");

        let running = store
            .list(&SessionFilter {
                state: Some(SessionState::Running),
                item_id: None,
            })
            .expect("list");
        assert_eq!(running.len(), 2);

        let running_item1 = store
            .list(&SessionFilter {
                state: Some(SessionState::Running),
                item_id: Some("item-1".to_string()),
            })
            .expect("list");
        let ids: Vec<&str> = running_item1.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, vec!["session-run"]);
    }

    #[test]
    fn update_state_replaces_checkpoint_wholesale() {
        let temp = tempfile::tempdir().expect("tempdir");
        scaffold_project(temp.path()).expect("scaffold");
        let store = SessionStore::open(temp.path()).expect("open");

        let mut s = session("session-1", 1, SessionState::Running, None);
        s.checkpoint = Some(Checkpoint {
            iteration: 1,
            progress_log: "old".to_string(),
            timestamp: 10,
        });
        store.save(&s).expect("save");

        store
            .update_state(
                "session-1",
                SessionState::Paused,
                Some(Checkpoint {
                    iteration: 5,
                    progress_log: "new".to_string(),
                    timestamp: 20,
                }),
            )
            .expect("update");

        let loaded = store.load("session-1").expect("load").expect("present");
        assert_eq!(loaded.state, SessionState::Paused);
        let checkpoint = loaded.checkpoint.expect("checkpoint");
        assert_eq!(checkpoint.iteration, 5);
        assert_eq!(checkpoint.progress_log, "new");
    }

    #[test]
    fn update_state_without_checkpoint_preserves_existing() {
        let temp = tempfile::tempdir().expect("tempdir");
        scaffold_project(temp.path()).expect("scaffold");
        let store = SessionStore::open(temp.path()).expect("open");

        let mut s = session("session-1", 1, SessionState::Paused, None);
        s.checkpoint = Some(Checkpoint {
            iteration: 7,
            progress_log: "kept".to_string(),
            timestamp: 10,
        });
        store.save(&s).expect("save");

        store
            .update_state("session-1", SessionState::Running, None)
            .expect("update");

        let loaded = store.load("session-1").expect("load").expect("present");
        assert_eq!(loaded.state, SessionState::Running);
        assert_eq!(loaded.checkpoint.expect("checkpoint").iteration, 7);
    }

    #[test]
    fn update_state_errors_on_missing_record() {
        let temp = tempfile::tempdir().expect("tempdir");
        scaffold_project(temp.path()).expect("scaffold");
        let store = SessionStore::open(temp.path()).expect("open");

        let err = store
            .update_state("session-nope", SessionState::Completed, None)
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn delete_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        scaffold_project(temp.path()).expect("scaffold");
        let store = SessionStore::open(temp.path()).expect("open");

        store
            .save(&session("session-1", 1, SessionState::Completed, None))
            .expect("save");
        store.delete("session-1").expect("delete");
        assert_eq!(store.load("session-1").expect("load"), None);
        store.delete("session-1").expect("delete again");
        store.delete("session-never-existed").expect("delete missing");
    }

    #[test]
    fn save_leaves_no_temp_file_behind() {
        let temp = tempfile::tempdir().expect("tempdir");
        scaffold_project(temp.path()).expect("scaffold");
        let store = SessionStore::open(temp.path()).expect("open");

        store
            .save(&session("session-1", 1, SessionState::Running, None))
            .expect("save");

        let sessions_dir = temp.path().join(".conductor").join("sessions");
        let names: Vec<String> = fs::read_dir(&sessions_dir)
            .expect("read dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["session-1.json".to_string()]);
    }
}
