//! Initialization helpers for `.conductor/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{ConductorConfig, write_config};

/// All canonical paths within `.conductor/` for a project root.
#[derive(Debug, Clone)]
pub struct ConductorPaths {
    pub root: PathBuf,
    pub conductor_dir: PathBuf,
    pub sessions_dir: PathBuf,
    pub config_path: PathBuf,
    pub gitignore_path: PathBuf,
}

impl ConductorPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let conductor_dir = root.join(".conductor");
        Self {
            root,
            sessions_dir: conductor_dir.join("sessions"),
            config_path: conductor_dir.join("config.toml"),
            gitignore_path: conductor_dir.join(".gitignore"),
            conductor_dir,
        }
    }
}

/// Options for `init_conductor`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing conductor-owned files.
    pub force: bool,
}

/// Create `.conductor/` scaffolding in `root`.
///
/// Fails if `.conductor/` already exists unless `options.force` is set.
pub fn init_conductor(root: &Path, options: &InitOptions) -> Result<ConductorPaths> {
    let paths = ConductorPaths::new(root);
    if paths.conductor_dir.exists() && !options.force {
        return Err(anyhow!(
            "conductor init: .conductor already exists (use --force to overwrite)"
        ));
    }
    if paths.conductor_dir.exists() && !paths.conductor_dir.is_dir() {
        return Err(anyhow!(
            "conductor init: .conductor exists but is not a directory"
        ));
    }

    create_dir(&paths.conductor_dir)?;
    create_dir(&paths.sessions_dir)?;
    write_config(&paths.config_path, &ConductorConfig::default())?;
    fs::write(&paths.gitignore_path, CONDUCTOR_GITIGNORE)
        .with_context(|| format!("write {}", paths.gitignore_path.display()))?;

    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

// Session records are machine state, not project history.
const CONDUCTOR_GITIGNORE: &str = "sessions/\n";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::load_config;

    #[test]
    fn init_creates_expected_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_conductor(temp.path(), &InitOptions { force: false }).expect("init");

        assert!(paths.conductor_dir.is_dir());
        assert!(paths.sessions_dir.is_dir());
        assert!(paths.config_path.is_file());
        assert!(paths.gitignore_path.is_file());

        let cfg = load_config(&paths.config_path).expect("load config");
        assert_eq!(cfg, ConductorConfig::default());
    }

    #[test]
    fn init_without_force_refuses_existing_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_conductor(temp.path(), &InitOptions { force: false }).expect("init");
        let err = init_conductor(temp.path(), &InitOptions { force: false }).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn init_with_force_rewrites_config() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_conductor(temp.path(), &InitOptions { force: false }).expect("init");
        fs::write(&paths.config_path, "agent_timeout_secs = 5\n").expect("write custom");

        init_conductor(temp.path(), &InitOptions { force: true }).expect("re-init");
        let cfg = load_config(&paths.config_path).expect("load config");
        assert_eq!(cfg, ConductorConfig::default());
    }
}
