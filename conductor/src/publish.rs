//! Fixed-order publishing of a session's working-tree changes.
//!
//! One publish attempt is: ensure branch -> commit -> push -> create-or-
//! update PR. Repeats of the same attempt (e.g. across a resumed session)
//! never duplicate branches, commits, or PRs: `ensure_branch` and
//! `create_or_update_pr` are the load-bearing idempotent primitives, and
//! `commit_all` is a no-op on a clean tree.

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument};

use crate::io::git::{Git, PrResult, ToolRunner};

/// Inputs for one publish attempt.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    /// Work branch holding the session's changes.
    pub branch: String,
    /// Base branch the PR targets.
    pub base: String,
    pub title: String,
    pub body: String,
    pub commit_message: String,
}

/// Run one publish attempt in the fixed order.
#[instrument(skip_all, fields(branch = %request.branch, base = %request.base))]
pub fn publish<R: ToolRunner>(git: &Git<R>, request: &PublishRequest) -> Result<PrResult> {
    if !git.is_git_repo() {
        return Err(anyhow!(
            "not a git repository: {}",
            git.options().workdir.display()
        ));
    }

    git.ensure_branch(&request.branch)?;
    let committed = git.commit_all(&request.commit_message)?;
    debug!(committed, "commit step finished");
    git.push_branch(&request.branch)?;
    let pr = git.create_or_update_pr(
        &request.base,
        &request.branch,
        &request.title,
        &request.body,
    )?;
    info!(created = pr.created, number = pr.number, "pr ready");
    Ok(pr)
}
