//! AgentMirror CLI
//!
//! Command-line interface for propagating agent configurations.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use agentmirror::{
    CancellationToken, Config, McpAgent, RunOutcome, SyncOptions, SyncOrchestrator, SyncReport,
    SyncTarget, TargetStatus, gitignore,
};

#[derive(Parser)]
#[command(name = "agentmirror")]
#[command(
    author,
    version,
    about = "Propagate agent instructions and MCP servers to every AI tool"
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply configuration to every selected agent
    Apply {
        /// Project root directory (default: current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Show what would be done without making changes
        #[arg(long)]
        dry_run: bool,

        /// Show detailed output
        #[arg(short, long)]
        verbose: bool,

        /// Filter to specific agents (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        agents: Option<Vec<String>>,

        /// Disable gitignore updates
        #[arg(long)]
        no_gitignore: bool,
    },

    /// Remove the files and links created by apply
    Clean {
        /// Project root directory (default: current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Show what would be done without making changes
        #[arg(long)]
        dry_run: bool,

        /// Show detailed output
        #[arg(short, long)]
        verbose: bool,

        /// Filter to specific agents (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        agents: Option<Vec<String>>,
    },

    /// List the tools whose MCP config files can be managed
    Agents,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let verbose = matches!(
        cli.command,
        Commands::Apply { verbose: true, .. } | Commands::Clean { verbose: true, .. }
    );
    initialize_tracing(verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "✘".red(), e);
            ExitCode::FAILURE
        }
    }
}

fn initialize_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Apply {
            path,
            config,
            dry_run,
            verbose,
            agents,
            no_gitignore,
        } => {
            let config_path = locate_config(path, config, verbose)?;
            let config = Config::load(&config_path)?;
            // Bad server names fail the whole run before any file is touched
            let servers = Arc::new(config.canonical_servers()?);
            let targets = config.sync_targets(&config_path, agents.as_deref());

            if targets.is_empty() {
                println!("{}", "Nothing to sync.".yellow());
                return Ok(ExitCode::SUCCESS);
            }

            if dry_run {
                println!("{}", "Dry run: no files will be changed\n".yellow());
            }

            let options = SyncOptions {
                dry_run,
                compress_agents_md: config.compress_agents_md,
                merge_strategy: config.mcp.merge_strategy,
            };
            let orchestrator = SyncOrchestrator::new(servers, options);
            let report = run_with_interrupt(targets, move |targets, cancel| {
                orchestrator.run(targets, cancel)
            })?;

            print_report(&report, Command::Apply, verbose);

            let mut success = matches!(report.outcome(), RunOutcome::Success);
            if !no_gitignore && config.gitignore.enabled {
                let project_root = Config::project_root(&config_path);
                let entries = config.all_gitignore_entries();
                match gitignore::update_gitignore(
                    &project_root,
                    &config.gitignore.marker,
                    &entries,
                    dry_run,
                ) {
                    Ok(TargetStatus::Unchanged) => {}
                    Ok(status) => println!(
                        "  {} .gitignore {} ({} managed entries)",
                        "✔".green(),
                        status.label(),
                        entries.len()
                    ),
                    Err(e) => {
                        eprintln!("  {} .gitignore {:#}", "✘".red(), e);
                        success = false;
                    }
                }
            }

            Ok(if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::Clean {
            path,
            config,
            dry_run,
            verbose,
            agents,
        } => {
            let config_path = locate_config(path, config, verbose)?;
            let config = Config::load(&config_path)?;
            let targets = config.sync_targets(&config_path, agents.as_deref());

            if dry_run {
                println!("{}", "Dry run: no files will be removed\n".yellow());
            }

            let options = SyncOptions {
                dry_run,
                compress_agents_md: config.compress_agents_md,
                merge_strategy: config.mcp.merge_strategy,
            };
            // Clean never renders servers, an invalid set must not block it
            let servers = Arc::new(config.canonical_servers().unwrap_or_default());
            let orchestrator = SyncOrchestrator::new(servers, options);
            let report = run_with_interrupt(targets, move |targets, cancel| {
                orchestrator.clean(targets, cancel)
            })?;

            print_report(&report, Command::Clean, verbose);

            Ok(match report.outcome() {
                RunOutcome::Success => ExitCode::SUCCESS,
                RunOutcome::PartialFailure(_) => ExitCode::FAILURE,
            })
        }

        Commands::Agents => {
            println!("{}", "Supported MCP tools:".bold());
            for agent in McpAgent::all() {
                let descriptor = agent.descriptor();
                println!(
                    "  {:<10} {:<26} {:<40} {:<5} {}",
                    agent.id().cyan(),
                    agent.name(),
                    descriptor.config_path,
                    descriptor.format.name(),
                    descriptor.wrapper_key.unwrap_or("(root)").dimmed()
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn locate_config(
    path: Option<PathBuf>,
    config: Option<PathBuf>,
    verbose: bool,
) -> Result<PathBuf> {
    let config_path = match (config, path) {
        (Some(p), _) => p,
        (None, Some(start_dir)) => Config::find_config(&start_dir)?,
        (None, None) => {
            let start_dir = env::current_dir().context("Failed to determine current directory")?;
            Config::find_config(&start_dir)?
        }
    };

    if verbose {
        println!(
            "Using config: {}\n",
            config_path.display().to_string().dimmed()
        );
    }
    Ok(config_path)
}

/// Run `work` on a blocking thread while Ctrl-C stops new targets
fn run_with_interrupt<F>(targets: Vec<SyncTarget>, work: F) -> Result<SyncReport>
where
    F: FnOnce(&[SyncTarget], &CancellationToken) -> SyncReport + Send + 'static,
{
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let cancel = CancellationToken::new();

    runtime.block_on(async move {
        let watcher = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, waiting for running targets to finish");
                watcher.cancel();
            }
        });

        tokio::task::spawn_blocking(move || work(&targets, &cancel))
            .await
            .context("Sync worker panicked")
    })
}

/// Which subcommand produced a report
#[derive(Clone, Copy, PartialEq, Eq)]
enum Command {
    Apply,
    Clean,
}

fn print_report(report: &SyncReport, command: Command, verbose: bool) {
    for target in &report.targets {
        match &target.result {
            Ok(TargetStatus::Unchanged) if !verbose => {}
            Ok(status) => {
                let label = match status {
                    TargetStatus::Created => status.label().green(),
                    TargetStatus::Updated => status.label().yellow(),
                    TargetStatus::Unchanged => status.label().dimmed(),
                    TargetStatus::Removed => status.label().red(),
                };
                println!(
                    "  {} {} {} {}",
                    "✔".green(),
                    target.name.bold(),
                    target.destination.display().to_string().dimmed(),
                    label
                );
            }
            Err(e) => {
                eprintln!(
                    "  {} {} [{}] {}",
                    "✘".red(),
                    target.name.bold(),
                    e.kind().label().red(),
                    e
                );
            }
        }
    }

    for name in &report.skipped_duplicates {
        println!(
            "  {} {} {}",
            "⚠".yellow(),
            name.bold(),
            "skipped, destination shared with another target".dimmed()
        );
    }

    let failed = report.failures().len();
    let headline = match (command, failed) {
        (Command::Apply, 0) => "✨ Sync complete!".green().bold(),
        (Command::Clean, 0) => "✨ Clean complete!".green().bold(),
        (Command::Apply, _) => "Sync finished with errors".red().bold(),
        (Command::Clean, _) => "Clean finished with errors".red().bold(),
    };
    println!("\n{}", headline);
    let errors = if failed > 0 {
        failed.to_string().red()
    } else {
        failed.to_string().dimmed()
    };
    if command == Command::Clean {
        println!(
            "  Removed: {}, Unchanged: {}, Errors: {}",
            report.count(TargetStatus::Removed).to_string().red(),
            report.count(TargetStatus::Unchanged).to_string().dimmed(),
            errors
        );
    } else {
        println!(
            "  Created: {}, Updated: {}, Unchanged: {}, Errors: {}",
            report.count(TargetStatus::Created).to_string().green(),
            report.count(TargetStatus::Updated).to_string().yellow(),
            report.count(TargetStatus::Unchanged).to_string().dimmed(),
            errors
        );
    }
}
