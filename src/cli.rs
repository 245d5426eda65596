use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::domain::{AnalysisRequest, HistoryRecord};
use crate::rl::environment::{generate_sample_data, MarketConfig, SimulatedMarket};
use crate::rl::integration::{spawn_autosave, GemEngine, RealTrade};

#[derive(Parser)]
#[command(name = "gemscout")]
#[command(version)]
#[command(about = "Reinforcement-learning opportunity scoring for crypto gems", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory holding default.toml and <GEMSCOUT_ENV>.toml
    #[arg(short, long, default_value = "config")]
    pub config: PathBuf,

    /// Checkpoint directory (overrides persistence.dir)
    #[arg(long, env = "GEMSCOUT_MODEL_DIR")]
    pub model_dir: Option<PathBuf>,

    /// Never write checkpoints
    #[arg(long)]
    pub no_save: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Let the agent trade a synthetic market to gather experience
    Simulate {
        /// Days of market to generate
        #[arg(long, default_value = "365")]
        days: usize,
        /// Seed for the synthetic market
        #[arg(long)]
        seed: Option<u64>,
        /// Comma-separated symbols (defaults to the built-in set)
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,
    },
    /// Score one or more coins from a JSON request (stdin when no file)
    Analyze {
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Record a position closed in the real world
    Record {
        symbol: String,
        #[arg(long)]
        entry: f64,
        #[arg(long)]
        exit: f64,
        /// Days held
        #[arg(long, conflicts_with = "entry_date")]
        days: Option<i64>,
        /// RFC 3339 entry time; holding days are counted up to now
        #[arg(long)]
        entry_date: Option<DateTime<Utc>>,
        /// Conviction at entry
        #[arg(long)]
        confidence: Option<f64>,
    },
    /// Replay historical records and report strategy statistics
    Backtest {
        /// JSON array of history records (synthetic data when absent)
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// CSV history with a header row; unknown columns become features
        #[arg(long, conflicts_with = "input")]
        csv: Option<PathBuf>,
        /// Days of synthetic data when no input is given
        #[arg(long, default_value = "365")]
        sample_days: usize,
        #[arg(long)]
        seed: Option<u64>,
        /// Records of the same symbol to hold for (defaults to rl.training.backtest_lookback)
        #[arg(long)]
        lookback: Option<usize>,
    },
    /// Recent performance, live metrics and learning progress
    Metrics,
    /// Policy mode, exploration and account state
    Status,
    /// Restore the starting exploration rate
    ResetExploration,
}

impl Commands {
    /// Whether the command changes engine state worth saving
    pub fn mutates(&self) -> bool {
        !matches!(self, Commands::Metrics | Commands::Status)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

/// Layered config with CLI overrides applied
pub fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    if let Some(dir) = &cli.model_dir {
        config.persistence.dir = dir.clone();
    }
    Ok(config)
}

pub async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    let engine = Arc::new(GemEngine::open(&config).context("building engine")?);
    let save = cli.command.mutates() && !cli.no_save;

    match cli.command {
        Commands::Simulate { days, seed, symbols } => {
            let autosave = (save && config.persistence.autosave_secs > 0).then(|| {
                spawn_autosave(
                    Arc::clone(&engine),
                    Duration::from_secs(config.persistence.autosave_secs),
                )
            });
            let result = run_simulation(Arc::clone(&engine), days, seed, symbols).await;
            if let Some(handle) = autosave {
                handle.abort();
            }
            result?;
            print_json(&engine.performance_metrics())?;
        }
        Commands::Analyze { input } => {
            let text = read_input(input.as_deref())?;
            let requests: OneOrMany<AnalysisRequest> =
                serde_json::from_str(&text).context("parsing analysis request")?;
            let recommendations: Vec<_> = requests
                .into_vec()
                .iter()
                .map(|request| engine.analyze(request))
                .collect();
            print_json(&recommendations)?;
        }
        Commands::Record {
            symbol,
            entry,
            exit,
            days,
            entry_date,
            confidence,
        } => {
            let holding_days = match (days, entry_date) {
                (Some(days), _) => days,
                (None, Some(date)) => (Utc::now() - date).num_days().max(0),
                (None, None) => anyhow::bail!("either --days or --entry-date is required"),
            };
            let mut trade = RealTrade::new(symbol, entry, exit, holding_days);
            if let Some(confidence) = confidence {
                trade = trade.with_confidence(confidence);
            }
            let outcome = engine.record_real_outcome(&trade)?;
            print_json(&outcome)?;
        }
        Commands::Backtest {
            input,
            csv,
            sample_days,
            seed,
            lookback,
        } => {
            let lookback = lookback.unwrap_or(config.rl.training.backtest_lookback);
            let replay = Arc::clone(&engine);
            let summary = match csv {
                Some(path) => tokio::task::spawn_blocking(move || replay.train_from_csv(&path, lookback))
                    .await
                    .context("backtest task")??,
                None => {
                    let records: Vec<HistoryRecord> = match input {
                        Some(path) => {
                            let text = read_input(Some(path.as_path()))?;
                            serde_json::from_str::<OneOrMany<HistoryRecord>>(&text)
                                .with_context(|| format!("parsing history from {}", path.display()))?
                                .into_vec()
                        }
                        None => generate_sample_data(sample_days, seed),
                    };
                    tokio::task::spawn_blocking(move || replay.train_from_history(records, lookback))
                        .await
                        .context("backtest task")??
                }
            };
            print_json(&summary)?;
        }
        Commands::Metrics => print_json(&engine.performance_metrics())?,
        Commands::Status => print_json(&engine.status())?,
        Commands::ResetExploration => {
            let epsilon = engine.reset_exploration();
            print_json(&serde_json::json!({ "epsilon": epsilon }))?;
        }
    }

    if save {
        engine.save().context("saving engine checkpoint")?;
    }
    Ok(())
}

/// Drive the engine through a synthetic market until done or Ctrl-C
async fn run_simulation(
    engine: Arc<GemEngine>,
    days: usize,
    seed: Option<u64>,
    symbols: Vec<String>,
) -> anyhow::Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    let worker_stop = Arc::clone(&stop);

    let mut market_config = MarketConfig {
        seed,
        ..Default::default()
    };
    if !symbols.is_empty() {
        market_config.symbols = symbols;
    }

    let mut worker = tokio::task::spawn_blocking(move || {
        let mut market = SimulatedMarket::new(market_config);
        let mut steps = 0usize;
        for day in 0..days {
            if worker_stop.load(Ordering::Relaxed) {
                info!(day, "simulation interrupted");
                break;
            }
            for record in market.step() {
                engine.simulate_step(&record.coin(), &record.snapshot());
                steps += 1;
            }
        }
        steps
    });

    let steps = tokio::select! {
        joined = &mut worker => joined.context("simulation task")?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Ctrl-C received, finishing current day");
            stop.store(true, Ordering::Relaxed);
            worker.await.context("simulation task")?
        }
    };
    info!(steps, "simulation finished");
    Ok(())
}

fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("reading stdin")?;
            Ok(text)
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
