//! Test-only helpers: project scaffolds, real git fixtures, and scripted
//! tool runners.

use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::rc::Rc;

use anyhow::{Context, Result, anyhow};

use crate::io::git::{CmdResult, ToolRunner};

/// Lay down the two root markers (`.git`, `.conductor`) plus the sessions
/// directory, without running real git. Enough for store tests.
pub fn scaffold_project(root: &Path) -> Result<()> {
    fs::create_dir_all(root.join(".git")).context("create .git marker")?;
    fs::create_dir_all(root.join(".conductor").join("sessions"))
        .context("create .conductor/sessions")?;
    Ok(())
}

/// Temporary directory holding a real, committed git repository.
pub struct TestRepo {
    temp: tempfile::TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("tempdir")?;
        let root = temp.path();
        run_git(root, &["init", "--initial-branch", "main"])?;
        run_git(root, &["config", "user.name", "conductor-tests"])?;
        run_git(root, &["config", "user.email", "conductor-tests@localhost"])?;
        fs::write(root.join("README.md"), "# fixture\n").context("write README")?;
        run_git(root, &["add", "-A"])?;
        run_git(root, &["commit", "-m", "initial commit"])?;
        Ok(Self { temp })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }
}

fn run_git(root: &Path, args: &[&str]) -> Result<()> {
    let output = Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !output.status.success() {
        return Err(anyhow!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(())
}

/// One recorded invocation seen by a [`ScriptedRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedCall {
    pub program: String,
    pub args: Vec<String>,
}

/// Tool runner returning predetermined results in order, recording every
/// call. Running past the script is a test bug and errors loudly.
#[derive(Debug, Clone)]
pub struct ScriptedRunner {
    responses: Rc<RefCell<Vec<CmdResult>>>,
    calls: Rc<RefCell<Vec<ScriptedCall>>>,
}

impl ScriptedRunner {
    pub fn new(responses: Vec<CmdResult>) -> Self {
        Self {
            responses: Rc::new(RefCell::new(responses)),
            calls: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<ScriptedCall> {
        self.calls.borrow().clone()
    }
}

impl ToolRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[&str], _workdir: &Path) -> Result<CmdResult> {
        self.calls.borrow_mut().push(ScriptedCall {
            program: program.to_string(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
        });
        let mut responses = self.responses.borrow_mut();
        if responses.is_empty() {
            return Err(anyhow!(
                "scripted runner exhausted: unexpected call {program} {}",
                args.join(" ")
            ));
        }
        Ok(responses.remove(0))
    }
}
