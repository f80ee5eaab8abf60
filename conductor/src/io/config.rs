//! Conductor configuration stored under `.conductor/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Conductor configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConductorConfig {
    /// Maximum wall-clock time for one backend invocation, in seconds.
    pub agent_timeout_secs: u64,

    /// Truncate backend stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Base branch pull requests target.
    pub base_branch: String,

    /// Prefix for session work branches.
    pub branch_prefix: String,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            agent_timeout_secs: 30 * 60,
            output_limit_bytes: 100_000,
            base_branch: "main".to_string(),
            branch_prefix: "conductor/".to_string(),
        }
    }
}

impl ConductorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.agent_timeout_secs == 0 {
            return Err(ConfigError::new("agent_timeout_secs must be > 0").into());
        }
        if self.output_limit_bytes == 0 {
            return Err(ConfigError::new("output_limit_bytes must be > 0").into());
        }
        if self.base_branch.trim().is_empty() {
            return Err(ConfigError::new("base_branch must not be empty").into());
        }
        if self.branch_prefix.trim().is_empty() {
            return Err(ConfigError::new("branch_prefix must not be empty").into());
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ConductorConfig::default()`.
pub fn load_config(path: &Path) -> Result<ConductorConfig> {
    if !path.exists() {
        let cfg = ConductorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ConductorConfig = toml::from_str(&contents)
        .map_err(|e| ConfigError::new(format!("parse {}: {e}", path.display())))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ConductorConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ConductorConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = ConductorConfig {
            agent_timeout_secs: 60,
            ..ConductorConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn invalid_config_reports_tagged_error() {
        let cfg = ConductorConfig {
            agent_timeout_secs: 0,
            ..ConductorConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().starts_with("[CONFIG_ERROR]"));
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn malformed_toml_reports_tagged_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "agent_timeout_secs = \"not a number\"").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }
}
