//! sentinel-check CLI: health, certification and governance cycles from a fact file.
//!
//! ## Usage
//!
//! ```bash
//! # Score health and derive the mode
//! sentinel-check health --facts demos/facts.json
//!
//! # Evaluate the rollout checklist
//! sentinel-check certify --facts demos/facts.json --format json
//!
//! # One full governance cycle, printing the control view
//! sentinel-check --config configs/sentinel.toml cycle --facts demos/facts.json
//!
//! # Re-read the file every 30s until Ctrl-C
//! sentinel-check watch --facts demos/facts.json --interval-secs 30
//! ```
//!
//! ## Exit Codes
//! - 0: NORMAL (health, cycle, watch) or L5 (certify)
//! - 1: Any other mode or level
//! - 2: Error (missing files, invalid configuration, malformed facts)

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sentinel_gates::{
    CertLevel, CertificationGate, EngineCycle, FactProvider, GovernanceEngine, HealthScorer,
    JsonFileFactProvider, Mode, StaticActorResolver, SystemClock,
};
use sentinel_runner::{GovernanceControlView, SentinelConfig, format_mode, init_tracing};
use serde_json::json;
use tracing::{info, warn};

/// sentinel-check: governance engine CLI.
#[derive(Parser)]
#[command(name = "sentinel-check")]
#[command(version = "0.1.0")]
#[command(about = "Health, kill-switch and certification checks for a trading stack")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format: text (default) or json
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Path to sentinel.toml (defaults to configs/sentinel.toml when present)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Score health signals and print the mode
    Health {
        /// Path to fact document (JSON)
        #[arg(long, short = 'f')]
        facts: PathBuf,

        /// Force SAFE mode regardless of the document
        #[arg(long, default_value = "false")]
        force_safe: bool,
    },

    /// Evaluate the certification checklist
    Certify {
        /// Path to fact document (JSON)
        #[arg(long, short = 'f')]
        facts: PathBuf,
    },

    /// Run one full governance cycle and print the control view
    Cycle {
        /// Path to fact document (JSON)
        #[arg(long, short = 'f')]
        facts: PathBuf,
    },

    /// Re-read the fact document on an interval until Ctrl-C
    Watch {
        /// Path to fact document (JSON)
        #[arg(long, short = 'f')]
        facts: PathBuf,

        /// Seconds between cycles
        #[arg(long, default_value = "30")]
        interval_secs: u64,

        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guards = init_tracing("sentinel-check");

    match run(cli).await {
        Ok(passed) => {
            if passed {
                ExitCode::from(0)
            } else {
                ExitCode::from(1)
            }
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = SentinelConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Health { facts, force_safe } => {
            run_health(&config, &facts, force_safe, cli.format)
        }
        Commands::Certify { facts } => run_certify(&config, &facts, cli.format),
        Commands::Cycle { facts } => run_cycle(&config, &facts, cli.format),
        Commands::Watch {
            facts,
            interval_secs,
            cycles,
        } => run_watch(&config, &facts, interval_secs, cycles, cli.format).await,
    }
}

fn build_engine(config: &SentinelConfig) -> anyhow::Result<GovernanceEngine> {
    GovernanceEngine::new(
        config.settings(),
        Arc::new(SystemClock),
        Arc::new(StaticActorResolver::new("sentinel-check")),
    )
    .map_err(|e| anyhow!("Failed to build engine: {}", e))
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// =============================================================================
// health
// =============================================================================

fn run_health(
    config: &SentinelConfig,
    facts: &Path,
    force_safe: bool,
    format: OutputFormat,
) -> anyhow::Result<bool> {
    let mut update = JsonFileFactProvider::new(facts).fetch()?;
    update.force_safe |= force_safe;

    let scorer = HealthScorer::new(config.health.clone());
    let snapshot = scorer.compute(&update.health_inputs(0), Utc::now())?;
    let guards = scorer.guards(&snapshot);

    match format {
        OutputFormat::Json => print_json(&json!({
            "snapshot": snapshot,
            "guards": guards,
        }))?,
        OutputFormat::Text => {
            let (label, _) = format_mode(snapshot.mode);
            println!(
                "{} dhi={:.1}% errors_1h={} signals={} guards={}",
                label,
                snapshot.score_pct(),
                snapshot.errors_last_hour,
                update.signals.len(),
                if guards.all_clear() { "clear" } else { "TRIPPED" }
            );
        }
    }

    Ok(snapshot.mode == Mode::Normal)
}

// =============================================================================
// certify
// =============================================================================

fn run_certify(
    config: &SentinelConfig,
    facts: &Path,
    format: OutputFormat,
) -> anyhow::Result<bool> {
    let update = JsonFileFactProvider::new(facts).fetch()?;
    let gate = CertificationGate::new(config.certification.checklist())?;
    let summary = gate.evaluate(&update.facts);

    match format {
        OutputFormat::Json => print_json(&json!({
            "summary": summary,
            "status_label": summary.level.status_label(),
            "band": summary.band(),
            "next_milestones": summary.next_milestones(),
        }))?,
        OutputFormat::Text => {
            println!(
                "Certification: {}% {} ({})",
                summary.overall_progress_pct,
                summary.level,
                summary.level.status_label()
            );
            for phase in [
                &summary.phases.phase1,
                &summary.phases.phase2,
                &summary.phases.phase3,
            ] {
                println!(
                    "  {} {}: {}% ({}/{} items)",
                    phase.phase,
                    phase.phase.title(),
                    phase.progress_pct,
                    phase.satisfied_count(),
                    phase.item_results.len()
                );
                for item in &phase.item_results {
                    println!("    [{}] {}", if item.satisfied { "x" } else { " " }, item.id);
                }
            }
            println!("Status: {}", summary.band().description());
            for milestone in summary.next_milestones() {
                println!("  next: {}", milestone);
            }
        }
    }

    Ok(summary.level == CertLevel::L5)
}

// =============================================================================
// cycle
// =============================================================================

fn run_cycle(config: &SentinelConfig, facts: &Path, format: OutputFormat) -> anyhow::Result<bool> {
    let engine = build_engine(config)?;
    let cycle = engine.refresh(&JsonFileFactProvider::new(facts))?;
    let view = GovernanceControlView::from_engine(&engine);

    match format {
        OutputFormat::Json => print_json(&view)?,
        OutputFormat::Text => print!("{}", view.render_text()),
    }

    Ok(cycle.snapshot.mode == Mode::Normal)
}

// =============================================================================
// watch
// =============================================================================

async fn run_watch(
    config: &SentinelConfig,
    facts: &Path,
    interval_secs: u64,
    max_cycles: Option<u64>,
    format: OutputFormat,
) -> anyhow::Result<bool> {
    let engine = build_engine(config)?;
    let provider = JsonFileFactProvider::new(facts);

    engine.subscribe(|cycle: &EngineCycle| {
        for switch in &cycle.changed_switches {
            warn!(
                module = %switch.module,
                mode = %cycle.snapshot.mode,
                "Latch engaged during watch"
            );
        }
    });

    info!(
        facts = %facts.display(),
        interval_secs,
        "Watching fact document"
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut completed = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match engine.refresh(&provider) {
                    Ok(cycle) => print_cycle(&cycle, format)?,
                    Err(e) => {
                        warn!(error = %e, "Cycle failed");
                        eprintln!("cycle failed: {} (last snapshot retained)", e);
                    }
                }
                completed += 1;
                if max_cycles.is_some_and(|n| completed >= n) {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                info!(completed, "Interrupted");
                break;
            }
        }
    }

    let view = GovernanceControlView::from_engine(&engine);
    if format == OutputFormat::Text {
        print!("{}", view.render_text());
    }
    Ok(!view.stale && view.mode() == Some(Mode::Normal))
}

fn print_cycle(cycle: &EngineCycle, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(cycle)?),
        OutputFormat::Text => {
            let (label, _) = format_mode(cycle.snapshot.mode);
            println!(
                "#{} {} dhi={:.1}% cert={}% {}{}",
                cycle.cycle,
                label,
                cycle.snapshot.score_pct(),
                cycle.summary.overall_progress_pct,
                cycle.summary.level,
                if cycle.changed_switches.is_empty() { "" } else { " LATCHED" }
            );
        }
    }
    Ok(())
}
