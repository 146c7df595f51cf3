mod clone;
mod error;
mod ids;
mod metadata;
mod preferences;
mod remap;
mod rewrite;
mod store;
mod transcript;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{ArgAction, Parser};
use clone::{CloneOutcome, CloneRequest, Cloner};
use ids::RandomIds;
use preferences::Preferences;
use std::env;
use std::io;
use std::path::{self, PathBuf};
use std::process;
use store::ClaudeDir;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Clone a Claude Code session transcript under a new session id.
///
/// If the session's last prompt was the clone command itself, the copy
/// stops just before it.
#[derive(Debug, Parser)]
#[command(name = "claude-clone", version)]
struct Cli {
    /// Session to clone (lowercase UUID).
    session_id: String,

    /// Project the session belongs to. Defaults to the current directory.
    project_path: Option<PathBuf>,

    /// Claude configuration directory.
    #[arg(long, env = "CLAUDE_CONFIG_DIR", value_name = "DIR")]
    claude_dir: Option<PathBuf>,

    /// Copy the whole transcript even if it ends with a clone command.
    #[arg(long)]
    no_truncate: bool,

    /// Do not add the clone to the prompt history.
    #[arg(long)]
    no_history: bool,

    /// Do not copy the session's todo list.
    #[arg(long)]
    no_todos: bool,

    /// More log output on stderr (-v info, -vv debug).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env("CLAUDE_CLONE_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(io::stderr),
        )
        .with(filter)
        .init();
}

fn run(cli: &Cli) -> Result<CloneOutcome> {
    // Reject a bad id before touching the filesystem.
    ids::validate_session_id(&cli.session_id)?;

    let project = match &cli.project_path {
        Some(p) => path::absolute(p).with_context(|| format!("resolving {}", p.display()))?,
        None => env::current_dir().context("reading current directory")?,
    };
    let store = ClaudeDir::resolve(cli.claude_dir.clone())?;
    let prefs = Preferences::load(store.root())?;

    let request = CloneRequest {
        session_id: cli.session_id.clone(),
        project,
        truncate: !cli.no_truncate,
        record_history: prefs.record_history && !cli.no_history,
        copy_todos: prefs.copy_todos && !cli.no_todos,
    };
    let mut ids = RandomIds;
    let outcome = Cloner::new(&store, &prefs, &mut ids).run(&request, Local::now())?;
    Ok(outcome)
}

fn print_summary(outcome: &CloneOutcome) {
    println!(
        "Cloned session {} -> {}",
        outcome.source_session_id, outcome.new_session_id
    );
    println!("  source:  {}", outcome.source.display());
    println!("  target:  {}", outcome.target.display());
    let stats = &outcome.stats;
    match stats.stopped_at {
        Some(line) => println!(
            "  records: {} of {} lines (stopped at clone command on line {})",
            stats.emitted,
            stats.lines_read,
            line + 1
        ),
        None => println!("  records: {} of {} lines", stats.emitted, stats.lines_read),
    }
    if stats.dropped_malformed > 0 {
        println!("  dropped: {} malformed lines", stats.dropped_malformed);
    }
    println!("  ids:     {} remapped", stats.remapped_ids);
    if stats.skipped_fields > 0 {
        println!("           {} non-UUID id fields left as-is", stats.skipped_fields);
    }
    if stats.tagged {
        println!("  tag:     {}", outcome.tag);
    }
    println!(
        "  history: {}",
        if outcome.history_written { "updated" } else { "skipped" }
    );
    println!(
        "  todos:   {}",
        if outcome.todos_copied { "copied" } else { "none" }
    );
    println!();
    println!("Resume with: claude --resume {}", outcome.new_session_id);
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(outcome) => print_summary(&outcome),
        Err(err) => {
            eprintln!("claude-clone: {err:#}");
            process::exit(1);
        }
    }
}
