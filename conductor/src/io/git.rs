//! Git and GitHub adapter for publishing session results.
//!
//! The conductor publishes deterministically, so we keep a small, explicit
//! wrapper around `git`/`gh` subprocess calls. Every higher-level operation
//! is built on two raw escape hatches, [`Git::run_git`] and [`Git::run_gh`],
//! which return `{exit_code, stdout, stderr}`. In dry-run mode the raw
//! hatches never spawn anything and return a deterministic stand-in, so
//! callers can exercise full control flow without touching real state.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

/// Per-call execution options. Constructed per call, never persisted.
#[derive(Debug, Clone)]
pub struct GitOptions {
    pub workdir: PathBuf,
    pub dry_run: bool,
}

impl GitOptions {
    pub fn new(workdir: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            workdir: workdir.into(),
            dry_run,
        }
    }
}

/// Raw result of one `git`/`gh` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CmdResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Deterministic stand-in returned by every dry-run invocation.
    fn dry_run_stub() -> Self {
        Self {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

/// Result of [`Git::create_or_update_pr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrResult {
    pub created: bool,
    pub number: u64,
}

/// Seam for spawning `git`/`gh`. The real implementation shells out;
/// tests substitute scripted runners.
pub trait ToolRunner {
    fn run(&self, program: &str, args: &[&str], workdir: &Path) -> Result<CmdResult>;
}

/// Runner that spawns the named tool as a child process.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str], workdir: &Path) -> Result<CmdResult> {
        let output = std::process::Command::new(program)
            .args(args)
            .current_dir(workdir)
            .output()
            .with_context(|| format!("spawn {program} {}", args.join(" ")))?;
        Ok(CmdResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Wrapper for executing git/gh commands under one [`GitOptions`].
#[derive(Debug, Clone)]
pub struct Git<R: ToolRunner = SystemRunner> {
    options: GitOptions,
    runner: R,
}

impl Git<SystemRunner> {
    pub fn new(options: GitOptions) -> Self {
        Self {
            options,
            runner: SystemRunner,
        }
    }
}

impl<R: ToolRunner> Git<R> {
    pub fn with_runner(options: GitOptions, runner: R) -> Self {
        Self { options, runner }
    }

    pub fn options(&self) -> &GitOptions {
        &self.options
    }

    /// Execute an arbitrary git subcommand. Dry-run returns the stand-in
    /// without spawning.
    pub fn run_git(&self, args: &[&str]) -> Result<CmdResult> {
        if self.options.dry_run {
            debug!(args = %args.join(" "), "dry-run: skipping git");
            return Ok(CmdResult::dry_run_stub());
        }
        self.runner.run("git", args, &self.options.workdir)
    }

    /// Execute an arbitrary gh subcommand. Dry-run returns the stand-in
    /// without spawning.
    pub fn run_gh(&self, args: &[&str]) -> Result<CmdResult> {
        if self.options.dry_run {
            debug!(args = %args.join(" "), "dry-run: skipping gh");
            return Ok(CmdResult::dry_run_stub());
        }
        self.runner.run("gh", args, &self.options.workdir)
    }

    /// True when the working directory is inside a git worktree.
    /// Never errors: a non-repo path (or missing git) is simply `false`.
    pub fn is_git_repo(&self) -> bool {
        match self.run_git(&["rev-parse", "--is-inside-work-tree"]) {
            Ok(result) => result.success(),
            Err(_) => false,
        }
    }

    /// Return the current branch name.
    #[instrument(skip_all)]
    pub fn current_branch(&self) -> Result<String> {
        let out = self.run_git_checked(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.stdout.trim().to_string();
        debug!(branch = %name, "current branch");
        Ok(name)
    }

    /// Check whether a local branch exists. A failed query is a negative
    /// result, not an error.
    pub fn branch_exists(&self, branch: &str) -> Result<bool> {
        let result = self.run_git(&[
            "show-ref",
            "--verify",
            "--quiet",
            &format!("refs/heads/{branch}"),
        ])?;
        Ok(result.success())
    }

    /// True if the worktree has staged, unstaged, or untracked changes.
    pub fn has_uncommitted_changes(&self) -> Result<bool> {
        let result = self.run_git_checked(&["status", "--porcelain"])?;
        Ok(!result.stdout.trim().is_empty())
    }

    /// Create and switch to `branch` if absent; just switch otherwise.
    /// Idempotent: re-running for the same branch changes nothing.
    #[instrument(skip_all, fields(branch))]
    pub fn ensure_branch(&self, branch: &str) -> Result<()> {
        if self.branch_exists(branch)? {
            debug!(branch, "branch exists, switching");
            self.run_git_checked(&["checkout", branch])?;
        } else {
            debug!(branch, "creating and switching to new branch");
            self.run_git_checked(&["checkout", "-b", branch])?;
        }
        Ok(())
    }

    /// Stage and commit all pending changes.
    ///
    /// A clean tree is a no-op returning `Ok(false)`, not an error.
    #[instrument(skip_all)]
    pub fn commit_all(&self, message: &str) -> Result<bool> {
        self.run_git_checked(&["add", "-A"])?;
        let staged = self.run_git_checked(&["diff", "--cached", "--name-only"])?;
        if staged.stdout.trim().is_empty() {
            debug!("nothing to commit");
            return Ok(false);
        }
        self.run_git_checked(&["commit", "-m", message])?;
        debug!("changes committed");
        Ok(true)
    }

    /// Push `branch`, establishing upstream tracking when absent.
    #[instrument(skip_all, fields(branch))]
    pub fn push_branch(&self, branch: &str) -> Result<()> {
        self.run_git_checked(&["push", "--set-upstream", "origin", branch])?;
        Ok(())
    }

    /// Number of the open PR whose head is `branch`, or `None`.
    pub fn get_pr_by_branch(&self, branch: &str) -> Result<Option<u64>> {
        let result = self.run_gh(&[
            "pr",
            "list",
            "--head",
            branch,
            "--state",
            "open",
            "--json",
            "number",
            "--jq",
            ".[0].number",
        ])?;
        if !result.success() {
            warn!(branch, stderr = %result.stderr.trim(), "pr lookup failed, treating as absent");
            return Ok(None);
        }
        let trimmed = result.stdout.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let number = trimmed
            .parse::<u64>()
            .with_context(|| format!("parse pr number from '{trimmed}'"))?;
        Ok(Some(number))
    }

    /// True when the PR has been merged. A failed query is `false`.
    pub fn is_pr_merged(&self, number: u64) -> Result<bool> {
        let result = self.run_gh(&[
            "pr",
            "view",
            &number.to_string(),
            "--json",
            "state",
            "--jq",
            ".state",
        ])?;
        Ok(result.success() && result.stdout.trim() == "MERGED")
    }

    /// Open a PR for `head -> base`, or update the existing open one in
    /// place. Idempotent: repeated calls never create duplicates.
    #[instrument(skip_all, fields(base, head))]
    pub fn create_or_update_pr(
        &self,
        base: &str,
        head: &str,
        title: &str,
        body: &str,
    ) -> Result<PrResult> {
        if self.options.dry_run {
            debug!("dry-run: simulating pr creation");
            return Ok(PrResult {
                created: true,
                number: 0,
            });
        }
        if let Some(number) = self.get_pr_by_branch(head)? {
            debug!(number, "updating existing pr");
            self.run_gh_checked(&[
                "pr",
                "edit",
                &number.to_string(),
                "--title",
                title,
                "--body",
                body,
            ])?;
            return Ok(PrResult {
                created: false,
                number,
            });
        }

        debug!("creating new pr");
        let created = self.run_gh_checked(&[
            "pr", "create", "--base", base, "--head", head, "--title", title, "--body", body,
        ])?;
        // `gh pr create` prints the PR URL; the number is its last segment.
        let number = match parse_pr_number_from_url(created.stdout.trim()) {
            Some(number) => number,
            None => self
                .get_pr_by_branch(head)?
                .ok_or_else(|| anyhow!("pr created but not found for branch {head}"))?,
        };
        Ok(PrResult {
            created: true,
            number,
        })
    }

    fn run_git_checked(&self, args: &[&str]) -> Result<CmdResult> {
        let result = self.run_git(args)?;
        if !result.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                result.stderr.trim()
            ));
        }
        Ok(result)
    }

    fn run_gh_checked(&self, args: &[&str]) -> Result<CmdResult> {
        let result = self.run_gh(args)?;
        if !result.success() {
            return Err(anyhow!(
                "gh {} failed: {}",
                args.join(" "),
                result.stderr.trim()
            ));
        }
        Ok(result)
    }
}

fn parse_pr_number_from_url(url: &str) -> Option<u64> {
    url.rsplit('/').next()?.parse().ok()
}
