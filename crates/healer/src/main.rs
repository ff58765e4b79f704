//! AgentForge stack monitor CLI.
//!
//! `run` starts the daemon (scheduler plus status API), `check` probes stacks
//! once, `history` prints recorded cycles.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use forge_healer::resources::HostResourceSampler;
use forge_healer::server::{run_server, ApiState};
use forge_healer::{
    AlertDispatcher, ComposeController, HealthReport, HealthState, HistoryEntry, HistoryStore,
    MonitorConfig, RemediationStatus, RunState, Scheduler, StackKey,
};

/// Self-healing stack monitor - probes deployed agent stacks, restarts unhealthy ones and alerts
#[derive(Parser)]
#[command(name = "forge-healer")]
#[command(about = "Self-healing stack monitor - probes deployed agent stacks, restarts unhealthy ones and alerts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor daemon until SIGINT/SIGTERM
    Run,
    /// Probe one or all deployed stacks once
    Check {
        /// Stack to check (all deployed stacks when omitted)
        stack: Option<String>,

        /// Apply the remediation policy (honours AGENTFORGE_AUTO_RESTART)
        #[arg(long)]
        heal: bool,

        /// Print the recorded cycle as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show recent monitoring history
    History {
        /// Number of entries to show
        #[arg(long, default_value = "10")]
        limit: usize,

        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = MonitorConfig::from_env().context("invalid monitor configuration")?;

    match cli.command {
        Commands::Run => run_daemon(config).await,
        Commands::Check { stack, heal, json } => {
            config.auto_restart = heal && config.auto_restart;
            let healthy = run_check(config, stack, json).await?;
            if !healthy {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::History { limit, json } => {
            let store = open_history(&config).await?;
            let entries = store.recent(limit);
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                print_history(&entries);
            }
            Ok(())
        }
    }
}

/// `RUST_LOG` controls filtering; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "forge_healer=debug,forge_notify=debug,info"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let layer = if json {
        fmt::layer().with_target(false).json().boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry().with(layer).with(filter).init();
}

async fn open_history(config: &MonitorConfig) -> Result<HistoryStore> {
    match HistoryStore::open(&config.history_path, config.history_capacity).await {
        Ok(store) => Ok(store),
        Err(e) if config.history_strict => {
            Err(e).context("history location unusable and AGENTFORGE_HISTORY_STRICT is set")
        }
        Err(e) => {
            warn!(error = %e, "History location unusable, running with history disabled");
            Ok(HistoryStore::in_memory(config.history_capacity))
        }
    }
}

async fn build_scheduler(config: MonitorConfig) -> Result<Scheduler> {
    let history = open_history(&config).await?;
    let controller = Arc::new(ComposeController::new(
        config.data_root.clone(),
        config.probe_timeout,
        config.restart_timeout,
    ));
    let sampler = Arc::new(HostResourceSampler::new(config.probe_timeout));
    let alerts = AlertDispatcher::from_config(&config);
    Ok(Scheduler::new(config, controller, sampler, history, alerts))
}

async fn run_daemon(config: MonitorConfig) -> Result<()> {
    if !config.data_root.is_dir() {
        warn!(data_root = %config.data_root.display(), "Data root does not exist yet");
    }
    info!(
        data_root = %config.data_root.display(),
        history = %config.history_path.display(),
        "Starting AgentForge monitor"
    );

    let api_addr = config.api_addr;
    let token = config.api_token.clone();
    let scheduler = Arc::new(build_scheduler(config).await?);
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            cancel.cancel();
        });
    }

    let server = tokio::spawn(run_server(
        Arc::new(ApiState::new(scheduler.clone(), token)),
        api_addr,
        cancel.clone(),
    ));
    let driver = {
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    };

    let server_result = server.await.context("status API task panicked")?;
    if let Err(e) = &server_result {
        error!(error = %e, "Status API failed, shutting down");
        cancel.cancel();
    }
    driver.await.context("scheduler task panicked")?;

    info!("Monitor stopped");
    server_result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}

/// Returns whether every checked stack ended up healthy or healed.
async fn run_check(config: MonitorConfig, stack: Option<String>, json: bool) -> Result<bool> {
    let stack = stack
        .as_deref()
        .map(StackKey::parse)
        .transpose()
        .context("invalid stack argument")?;
    let scheduler = build_scheduler(config).await?;
    let entry = scheduler
        .check_once(stack)
        .await
        .context("failed to enumerate deployed stacks")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else if entry.reports.is_empty() {
        println!("{}", "No deployed stacks found".yellow());
    } else {
        for (report, outcome) in entry.reports.iter().zip(&entry.outcomes) {
            print_report(report, outcome.status);
        }
    }

    Ok(entry
        .outcomes
        .iter()
        .all(|o| matches!(o.status, RemediationStatus::Healthy | RemediationStatus::Healed)))
}

fn print_report(report: &HealthReport, status: RemediationStatus) {
    let label = match status {
        RemediationStatus::Healthy => format!("✓ {status}").green(),
        RemediationStatus::Healed => format!("↻ {status}").yellow(),
        _ => format!("✗ {status}").red(),
    };
    let title = if report.display_name == report.stack_key.as_str() {
        report.stack_key.to_string()
    } else {
        format!("{} ({})", report.stack_key, report.display_name)
    };
    println!("{}  {label}", title.bold());

    for c in &report.containers {
        let state = if c.run_state == RunState::Running {
            c.run_state.to_string().green()
        } else {
            c.run_state.to_string().red()
        };
        let health = match c.health_state {
            HealthState::Healthy => " healthy".green(),
            HealthState::Unhealthy => " unhealthy".red(),
            HealthState::Starting => " starting".yellow(),
            HealthState::None => "".normal(),
        };
        println!("  {} {state}{health}  {}", c.name, c.status_text.dimmed());
    }
    for issue in &report.issues {
        println!("  {} {issue}", "!".red());
    }
    for warning in &report.warnings {
        println!("  {} {warning}", "~".yellow());
    }
}

fn print_history(entries: &[HistoryEntry]) {
    if entries.is_empty() {
        println!("{}", "No history recorded".yellow());
        return;
    }
    for entry in entries {
        println!("{}", entry.timestamp.to_rfc3339().bold());
        for outcome in &entry.outcomes {
            let status = if outcome.status.is_healthy() {
                outcome.status.to_string().green()
            } else {
                outcome.status.to_string().red()
            };
            if outcome.issues.is_empty() {
                println!("  {}: {status}", outcome.stack_key);
            } else {
                println!(
                    "  {}: {status} ({})",
                    outcome.stack_key,
                    outcome.issues.join(", ")
                );
            }
        }
    }
}
