//! Exitlab CLI — backtest and live commands.
//!
//! Commands:
//! - `backtest` — evaluate every strategy signal against full history on a
//!   parallel worker pool
//! - `live` — poll the feed continuously, checkpointing between polls;
//!   Ctrl-C requests a cooperative shutdown with a final checkpoint

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use exitlab_core::rules::RuleRegistry;
use exitlab_engine::backtest::{run_backtest, BacktestConfig};
use exitlab_engine::config::RunConfig;
use exitlab_engine::live::LiveEngine;
use exitlab_engine::Blotter;

#[derive(Parser)]
#[command(name = "exitlab", about = "Rule-based trade-exit engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the batch engine over full history from a TOML config.
    Backtest {
        /// Path to the TOML run configuration.
        #[arg(long)]
        config: PathBuf,

        /// Print each closed trade as a JSON line to stdout.
        #[arg(long, default_value_t = false)]
        print: bool,
    },
    /// Run the live engine: poll, evaluate, checkpoint, repeat.
    Live {
        /// Path to the TOML run configuration.
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Backtest { config, print } => backtest(&config, print),
        Commands::Live { config } => live(&config),
    }
}

fn backtest(config_path: &PathBuf, print: bool) -> Result<()> {
    let config = RunConfig::load(config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    let registry = RuleRegistry::builtin();
    let mut strategy = config.build_strategy();
    let mut feed = config.build_feed(strategy.window())?;
    let blotter = config.backtest.blotter_path.as_ref().map(|p| Blotter::new(p.clone()));

    let records = run_backtest(
        strategy.as_mut(),
        feed.as_mut(),
        &registry,
        &BacktestConfig {
            workers: config.backtest.workers,
        },
        blotter.as_ref(),
    )
    .context("batch run failed")?;

    if print {
        for record in &records {
            println!("{}", serde_json::to_string(record)?);
        }
    }
    println!("{} trades closed", records.len());
    Ok(())
}

fn live(config_path: &PathBuf) -> Result<()> {
    let config = RunConfig::load(config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    let registry = RuleRegistry::builtin();
    let strategy = config.build_strategy();
    let feed = config.build_feed(strategy.window())?;
    let notifiers = config.build_notifiers()?;
    let blotter = Blotter::new(config.live.blotter_path.clone());

    let mut engine = LiveEngine::new(
        config.engine.name.clone(),
        strategy,
        feed,
        registry,
        blotter,
        notifiers,
        config.live_config(),
    );

    let flag = engine.shutdown_flag();
    ctrlc::set_handler(move || {
        tracing::info!("shutdown requested");
        flag.request();
    })
    .context("installing signal handler")?;

    engine.run().context("live run failed")?;
    Ok(())
}
