//! Conductor CLI: orchestrate agent sessions and publish their results.
//!
//! Every command maps its failure through one top-level executor: exit 0 on
//! success, 130 for interruptions (the distinguished error or an
//! interruption-shaped message), 1 for everything else.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;

use conductor::core::allowlist::Phase;
use conductor::core::session::{AgentConfig, SessionState};
use conductor::error::{ConfigError, exit_code_for};
use conductor::io::config::load_config;
use conductor::io::init::{InitOptions, init_conductor};
use conductor::io::store::{SessionFilter, SessionStore};
use conductor::run::{RunRequest, resume, run_item};
use conductor::{exit_codes, logging};

#[derive(Parser)]
#[command(
    name = "conductor",
    version,
    about = "Session orchestrator for autonomous coding agents"
)]
struct Cli {
    /// Raise log verbosity and report failure detail.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.conductor/` scaffolding in the current directory.
    Init {
        /// Overwrite existing conductor-owned files.
        #[arg(short, long)]
        force: bool,
    },
    /// Start a new agent session against a work item.
    Run {
        /// Work item id the session belongs to.
        #[arg(long)]
        item: Option<String>,
        /// Prompt text for the agent.
        #[arg(long, conflicts_with = "prompt_file")]
        prompt: Option<String>,
        /// Read the prompt from a file instead.
        #[arg(long)]
        prompt_file: Option<PathBuf>,
        /// Agent backend to dispatch.
        #[arg(long, value_enum, default_value_t = BackendKind::Claude)]
        backend: BackendKind,
        /// Backend model override.
        #[arg(long)]
        model: Option<String>,
        /// Work-item phase selecting a default tool allowlist.
        #[arg(long, value_enum)]
        phase: Option<Phase>,
        /// Explicit tool allowlist (comma-separated); wins over --phase.
        #[arg(long, value_delimiter = ',')]
        allowed_tools: Option<Vec<String>>,
        /// Execution environment name.
        #[arg(long, default_value = "local")]
        vm: String,
        /// Simulate everything: no backend contact, no git/gh mutation.
        #[arg(long)]
        dry_run: bool,
        /// Skip branch/commit/push/PR publishing on success.
        #[arg(long)]
        no_publish: bool,
    },
    /// Resume a paused session from its checkpoint.
    Resume {
        session_id: String,
        /// Replace the reconstructed resume prompt.
        #[arg(long)]
        prompt: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Inspect or delete persisted sessions.
    Sessions {
        #[command(subcommand)]
        command: SessionsCommand,
    },
}

#[derive(Subcommand)]
enum SessionsCommand {
    /// List sessions, newest first.
    List {
        #[arg(long, value_enum)]
        state: Option<SessionState>,
        #[arg(long)]
        item: Option<String>,
    },
    /// Delete a session record (idempotent).
    Delete { session_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    Claude,
    Codex,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Claude => write!(f, "claude"),
            BackendKind::Codex => write!(f, "codex"),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(err) = dispatch(cli.command) {
        eprintln!("{err:#}");
        debug!(trace = ?err, "failure detail");
        std::process::exit(exit_code_for(&err));
    }
    std::process::exit(exit_codes::OK);
}

fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Init { force } => cmd_init(force),
        Command::Run {
            item,
            prompt,
            prompt_file,
            backend,
            model,
            phase,
            allowed_tools,
            vm,
            dry_run,
            no_publish,
        } => cmd_run(RunArgs {
            item,
            prompt,
            prompt_file,
            backend,
            model,
            phase,
            allowed_tools,
            vm,
            dry_run,
            no_publish,
        }),
        Command::Resume {
            session_id,
            prompt,
            dry_run,
        } => cmd_resume(&session_id, prompt, dry_run),
        Command::Sessions { command } => match command {
            SessionsCommand::List { state, item } => cmd_sessions_list(state, item),
            SessionsCommand::Delete { session_id } => cmd_sessions_delete(&session_id),
        },
    }
}

struct RunArgs {
    item: Option<String>,
    prompt: Option<String>,
    prompt_file: Option<PathBuf>,
    backend: BackendKind,
    model: Option<String>,
    phase: Option<Phase>,
    allowed_tools: Option<Vec<String>>,
    vm: String,
    dry_run: bool,
    no_publish: bool,
}

fn cmd_init(force: bool) -> Result<()> {
    let cwd = std::env::current_dir().context("resolve current directory")?;
    let paths = init_conductor(&cwd, &InitOptions { force })?;
    println!("initialized {}", paths.conductor_dir.display());
    Ok(())
}

fn cmd_run(args: RunArgs) -> Result<()> {
    let store = open_store()?;
    let cfg = load_config(&store.root().join(".conductor").join("config.toml"))?;

    let prompt = match (args.prompt, args.prompt_file) {
        (Some(prompt), None) => prompt,
        (None, Some(path)) => fs::read_to_string(&path)
            .with_context(|| format!("read prompt file {}", path.display()))?,
        (None, None) => {
            return Err(ConfigError::new("one of --prompt or --prompt-file is required").into());
        }
        (Some(_), Some(_)) => {
            return Err(ConfigError::new("--prompt and --prompt-file are mutually exclusive").into());
        }
    };

    let config = agent_config(args.backend, args.model);
    let outcome = run_item(
        &store,
        &cfg,
        &RunRequest {
            item_id: args.item,
            prompt,
            vm_name: args.vm,
            config,
            allowed_tools: args.allowed_tools,
            phase: args.phase,
            dry_run: args.dry_run,
            publish: !args.no_publish,
        },
    )?;

    println!("session {} {}", outcome.session_id, outcome.state);
    if let Some(pr) = outcome.pr {
        let verb = if pr.created { "created" } else { "updated" };
        println!("pr #{} {verb}", pr.number);
    }
    Ok(())
}

fn cmd_resume(session_id: &str, prompt: Option<String>, dry_run: bool) -> Result<()> {
    let store = open_store()?;
    let cfg = load_config(&store.root().join(".conductor").join("config.toml"))?;

    let outcome = resume(&store, &cfg, session_id, prompt, dry_run)?;
    println!("session {} {}", outcome.session_id, outcome.state);
    if let Some(pr) = outcome.pr {
        let verb = if pr.created { "created" } else { "updated" };
        println!("pr #{} {verb}", pr.number);
    }
    Ok(())
}

fn cmd_sessions_list(state: Option<SessionState>, item: Option<String>) -> Result<()> {
    let store = open_store()?;
    let sessions = store.list(&SessionFilter {
        state,
        item_id: item,
    })?;
    for session in sessions {
        println!(
            "{}\t{}\t{}\t{}",
            session.session_id,
            session.state,
            session.item_id.as_deref().unwrap_or("-"),
            session.config.kind(),
        );
    }
    Ok(())
}

fn cmd_sessions_delete(session_id: &str) -> Result<()> {
    let store = open_store()?;
    store.delete(session_id)?;
    println!("deleted {session_id}");
    Ok(())
}

fn open_store() -> Result<SessionStore> {
    let cwd = std::env::current_dir().context("resolve current directory")?;
    SessionStore::open(&cwd)
}

fn agent_config(backend: BackendKind, model: Option<String>) -> AgentConfig {
    match backend {
        BackendKind::Claude => AgentConfig::Claude {
            model,
            allowed_tools: None,
            phase: None,
        },
        BackendKind::Codex => AgentConfig::Codex {
            model,
            allowed_tools: None,
            phase: None,
        },
    }
}
