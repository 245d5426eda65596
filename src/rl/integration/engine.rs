//! Gem Engine
//!
//! Process-wide service object that owns the simulated account, the policy
//! agent, the learning loop and the performance record. Every mutation runs
//! under one session mutex; [`GemEngine::evaluate`] reads the published policy
//! snapshot and a copy of the account without ever waiting on a learning step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::domain::{
    read_history_csv, AnalysisRequest, ClassifierResult, CoinData, FeatureSnapshot, HistoryRecord,
    MarketContext,
};
use crate::error::{GemError, Result};
use crate::rl::config::{PolicyBackend, RLConfig};
use crate::rl::core::{
    DiscreteAction, EnvironmentState, GemStateEncoder, OutcomeSource, StateEncoder, TradeOutcome,
    TradingAction, NUM_ACTIONS, STATE_DIM,
};
use crate::rl::environment::{Rejection, StepInfo, TradingEnvironment};
use crate::rl::memory::Transition;
use crate::rl::networks::QNetwork;
use crate::rl::policy::{
    greedy_decision, HeuristicPolicy, ParameterStore, PolicyAgent, PolicyDecision, PolicyMode,
};
use crate::rl::training::{Checkpointer, EngineSnapshot, LearnReport, LearningLoop};

use super::outcome::{LiveMetrics, OutcomeRecorder, RealTrade, TradeStats};
use super::recommender::{Recommendation, RecommendationSynthesizer, SynthesisInput};

/// One action taken in the simulated account
#[derive(Debug, Clone)]
pub struct SimulationStep {
    pub decision: PolicyDecision,
    pub reward: f64,
    pub done: bool,
    pub info: StepInfo,
    /// `None` when the step was skipped (invalid price)
    pub learning: Option<LearnReport>,
}

/// A historical BUY closed after the holding period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestTrade {
    pub symbol: String,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub holding_days: i64,
    pub profit_loss_percent: f64,
    pub confidence: f64,
    pub gem_score: f64,
    pub reward: f64,
}

/// Metrics captured while replaying history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningProgress {
    /// Index of the record just processed
    pub record_index: usize,
    pub metrics: PerformanceMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub records_processed: usize,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub win_rate: f64,
    pub total_return: f64,
    pub average_return: f64,
    pub return_std: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub trades: Vec<BacktestTrade>,
    pub learning_progress: Vec<LearningProgress>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Every outcome ever recorded
    pub total_trades: usize,
    /// Statistics over the most recent window
    pub recent: TradeStats,
    /// Present once a real close was recorded
    pub live: Option<LiveMetrics>,
    pub learning_episodes: u64,
    pub epsilon: f64,
    pub experience_size: usize,
    pub policy_mode: PolicyMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub policy_mode: PolicyMode,
    pub backend: PolicyBackend,
    pub learning_enabled: bool,
    pub policy_version: u64,
    pub epsilon: f64,
    pub experience_size: usize,
    pub experience_capacity: usize,
    pub learning_updates: u64,
    pub learning_episodes: u64,
    pub balance: f64,
    pub portfolio_value: f64,
    pub open_positions: usize,
    pub step_count: u64,
    pub performance_records: usize,
}

/// What a load managed to restore
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub snapshot_restored: bool,
    pub network_restored: bool,
}

struct Session {
    env: TradingEnvironment,
    agent: PolicyAgent,
    learning: LearningLoop,
    recorder: OutcomeRecorder,
    /// State in which the last BUY per symbol was recommended
    open_entries: HashMap<String, Vec<f64>>,
    learning_episode_count: u64,
}

pub struct GemEngine {
    config: RLConfig,
    session: Mutex<Session>,
    /// Copy of the simulated account refreshed after every step
    account: RwLock<EnvironmentState>,
    store: Arc<ParameterStore>,
    heuristic: HeuristicPolicy,
    encoder: GemStateEncoder,
    synthesizer: RecommendationSynthesizer,
    checkpointer: Checkpointer,
}

impl GemEngine {
    /// Build a fresh engine; nothing is loaded from disk
    pub fn new(config: &AppConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|errors| GemError::InvalidConfig(errors.join("; ")))?;

        let rl = config.rl.clone();
        let learning = LearningLoop::new(rl.training.clone(), &rl.agent, None);
        let initial = match learning.network() {
            Some(network) => network.clone(),
            None => placeholder_network(&rl),
        };
        let store = Arc::new(ParameterStore::new(initial, false));
        let agent = PolicyAgent::new(&rl.agent, Arc::clone(&store));
        let env = TradingEnvironment::new(rl.environment.clone(), rl.reward.clone());
        let account = env.state().clone();

        info!(
            backend = ?rl.agent.backend,
            mode = %agent.mode(),
            learning = learning.is_enabled(),
            "gem engine ready"
        );

        Ok(Self {
            heuristic: HeuristicPolicy::from_config(&rl.agent),
            synthesizer: RecommendationSynthesizer::new(rl.recommendation.clone()),
            checkpointer: Checkpointer::new(&config.persistence.dir, config.persistence.name.clone()),
            session: Mutex::new(Session {
                env,
                agent,
                learning,
                recorder: OutcomeRecorder::new(rl.reward.clone()),
                open_entries: HashMap::new(),
                learning_episode_count: 0,
            }),
            account: RwLock::new(account),
            store,
            encoder: GemStateEncoder::new(),
            config: rl,
        })
    }

    /// Build and restore whatever the configured checkpoint directory holds
    pub fn open(config: &AppConfig) -> Result<Self> {
        let engine = Self::new(config)?;
        engine.load();
        Ok(engine)
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        // Each mutation leaves the session consistent before it can panic.
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish_account(&self, state: &EnvironmentState) {
        let mut guard = self.account.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = state.clone();
    }

    /// Score one coin and, when learning is on, act on the recommendation in
    /// the simulated account
    pub fn analyze(&self, request: &AnalysisRequest) -> Recommendation {
        let coin = request.coin.clone().sanitized();
        let features = request.snapshot();
        let mut session = self.lock();
        self.analyze_locked(
            &mut session,
            &coin,
            &features,
            request.classifier,
            request.market_context.as_ref(),
        )
    }

    fn analyze_locked(
        &self,
        session: &mut Session,
        coin: &CoinData,
        features: &FeatureSnapshot,
        classifier: Option<ClassifierResult>,
        market_context: Option<&MarketContext>,
    ) -> Recommendation {
        let state = self.encoder.encode(session.env.state(), features);
        let decision = session.agent.act(&state, features);
        let policy_mode = session.agent.mode();

        if self.config.training.learning_enabled {
            self.execute(session, state, &decision, coin, features);
        } else if decision.action == DiscreteAction::Buy {
            session.open_entries.insert(coin.symbol.clone(), state);
        }

        self.synthesizer.synthesize(&SynthesisInput {
            coin,
            features,
            decision: &decision,
            classifier,
            market_context,
            policy_mode,
            learning_episode: session.learning_episode_count,
            experience_size: session.learning.buffer().len(),
        })
    }

    /// Lock-free greedy decision against the latest published weights
    pub fn evaluate(&self, features: &FeatureSnapshot) -> PolicyDecision {
        let state = {
            let account = self.account.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            self.encoder.encode(&account, features)
        };
        greedy_decision(
            self.config.agent.backend,
            &self.store,
            &self.heuristic,
            &state,
            features,
        )
    }

    /// Let the agent act on one observation in the simulated account
    pub fn simulate_step(&self, coin: &CoinData, features: &FeatureSnapshot) -> SimulationStep {
        let coin = coin.clone().sanitized();
        let mut session = self.lock();
        let state = self.encoder.encode(session.env.state(), features);
        let decision = session.agent.act(&state, features);
        self.execute(&mut session, state, &decision, &coin, features)
    }

    fn execute(
        &self,
        session: &mut Session,
        state: Vec<f64>,
        decision: &PolicyDecision,
        coin: &CoinData,
        features: &FeatureSnapshot,
    ) -> SimulationStep {
        let action = TradingAction::new(decision.action, decision.confidence, coin.price, features.clone());
        let result = session.env.step(&action);

        if result.info.rejection == Some(Rejection::InvalidPrice) {
            return SimulationStep {
                decision: decision.clone(),
                reward: 0.0,
                done: false,
                info: result.info,
                learning: None,
            };
        }

        if decision.action == DiscreteAction::Buy && result.info.rejection.is_none() {
            session.open_entries.insert(coin.symbol.clone(), state.clone());
        }

        let next_state = self.encoder.encode(&result.state, features);
        let transition = Transition::new(state, decision.action, result.reward, next_state, result.done);
        let report = session.learning.remember(transition, &mut session.agent);

        if result.done {
            session.env.reset();
            session.learning_episode_count += 1;
            info!(
                episode = session.learning_episode_count,
                reason = ?result.info.termination,
                epsilon = session.agent.epsilon(),
                "simulated episode complete"
            );
        }
        self.publish_account(session.env.state());

        SimulationStep {
            decision: decision.clone(),
            reward: result.reward,
            done: result.done,
            info: result.info,
            learning: Some(report),
        }
    }

    /// Record a real close, deriving the holding period from the entry date
    pub fn record_trade_outcome(
        &self,
        symbol: &str,
        entry_price: f64,
        current_price: f64,
        entry_date: DateTime<Utc>,
    ) -> Result<TradeOutcome> {
        let holding_days = (Utc::now() - entry_date).num_days().max(0);
        self.record_real_outcome(&RealTrade::new(symbol, entry_price, current_price, holding_days))
    }

    /// Record a position closed in the real world
    ///
    /// Never touches the simulated account. When the engine still holds the
    /// state in which it recommended buying this symbol, the close also becomes
    /// a terminal experience.
    pub fn record_real_outcome(&self, trade: &RealTrade) -> Result<TradeOutcome> {
        let mut session = self.lock();
        let session = &mut *session;
        let outcome = session.recorder.record_real(trade)?;

        if self.config.training.learn_from_real_outcomes {
            if let Some(entry_state) = session.open_entries.remove(&trade.symbol) {
                let transition = Transition::terminal(entry_state, DiscreteAction::Buy, outcome.reward);
                let report = session.learning.remember(transition, &mut session.agent);
                debug!(symbol = %trade.symbol, ?report, "real outcome stored as experience");
            }
        }
        Ok(outcome)
    }

    /// Replay history rows read from a CSV file with a header line
    pub fn train_from_csv<P: AsRef<Path>>(&self, path: P, lookback: usize) -> Result<BacktestSummary> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let records = read_history_csv(std::io::BufReader::new(file))?;
        info!(path = %path.display(), rows = records.len(), "training from csv");

        let summary = self.train_from_history(records, lookback)?;
        info!(
            trades = summary.total_trades,
            win_rate = summary.win_rate,
            "csv training complete"
        );
        Ok(summary)
    }

    /// Replay historical records through the engine
    ///
    /// Records are sorted by timestamp. A BUY above the configured confidence
    /// is closed at the `lookback`-th later record of the same symbol; BUYs
    /// without such a record are not traded. Each close is scored, appended to
    /// the performance record and stored as a terminal experience.
    pub fn train_from_history(
        &self,
        mut records: Vec<HistoryRecord>,
        lookback: usize,
    ) -> Result<BacktestSummary> {
        if lookback == 0 {
            return Err(GemError::Validation("lookback must be at least 1".to_string()));
        }
        records.sort_by_key(|r| r.timestamp);

        let training = &self.config.training;
        let processed = records.len().saturating_sub(lookback);
        let mut trades = Vec::new();
        let mut learning_progress = Vec::new();

        info!(records = records.len(), processed, lookback, "replaying history");

        for (i, record) in records.iter().take(processed).enumerate() {
            let coin = record.coin();
            let features = record.snapshot();

            let mut session = self.lock();
            let session = &mut *session;
            let entry_state = self.encoder.encode(session.env.state(), &features);
            let recommendation = self.analyze_locked(session, &coin, &features, record.classifier, None);

            if recommendation.action == DiscreteAction::Buy
                && recommendation.confidence > training.backtest_min_confidence
                && coin.has_valid_price()
            {
                let exit = records[i + 1..]
                    .iter()
                    .filter(|r| r.symbol == record.symbol)
                    .nth(lookback - 1);
                match exit {
                    Some(exit) if exit.price.is_finite() && exit.price > 0.0 => {
                        let outcome = TradeOutcome::close(
                            session.recorder.reward_fn(),
                            record.symbol.clone(),
                            coin.price,
                            exit.price,
                            (exit.timestamp - record.timestamp).num_days(),
                            recommendation.confidence,
                            OutcomeSource::Simulated,
                            exit.timestamp,
                        );
                        session.learning.remember(
                            Transition::terminal(entry_state, DiscreteAction::Buy, outcome.reward),
                            &mut session.agent,
                        );
                        trades.push(BacktestTrade {
                            symbol: outcome.symbol.clone(),
                            entry_price: outcome.entry_price,
                            exit_price: outcome.exit_price,
                            entry_time: record.timestamp,
                            exit_time: exit.timestamp,
                            holding_days: outcome.holding_days,
                            profit_loss_percent: outcome.profit_loss_percent,
                            confidence: recommendation.confidence,
                            gem_score: recommendation.gem_score,
                            reward: outcome.reward,
                        });
                        session.recorder.record_simulated(outcome);
                    }
                    Some(exit) => {
                        debug!(symbol = %record.symbol, price = exit.price, "exit price invalid, trade skipped");
                    }
                    None => {
                        debug!(symbol = %record.symbol, "no exit record within history, trade skipped");
                    }
                }
            }

            if training.progress_interval > 0 && i % training.progress_interval == 0 {
                learning_progress.push(LearningProgress {
                    record_index: i,
                    metrics: self.metrics_locked(session),
                });
            }
        }

        let returns: Vec<f64> = trades.iter().map(|t| t.profit_loss_percent).collect();
        let stats = TradeStats::from_returns(&returns);

        info!(
            trades = stats.total_trades,
            win_rate = stats.win_rate,
            total_return = stats.total_return,
            sharpe = stats.sharpe_ratio,
            "history replay finished"
        );

        Ok(BacktestSummary {
            records_processed: processed,
            total_trades: stats.total_trades,
            winning_trades: stats.winning_trades,
            win_rate: stats.win_rate,
            total_return: stats.total_return,
            average_return: stats.average_return,
            return_std: stats.return_std,
            sharpe_ratio: stats.sharpe_ratio,
            max_drawdown: stats.max_drawdown,
            trades,
            learning_progress,
        })
    }

    pub fn performance_metrics(&self) -> PerformanceMetrics {
        let session = self.lock();
        self.metrics_locked(&session)
    }

    fn metrics_locked(&self, session: &Session) -> PerformanceMetrics {
        PerformanceMetrics {
            total_trades: session.recorder.record().len(),
            recent: session.recorder.recent_stats(self.config.training.metrics_window),
            live: session.recorder.live_metrics(),
            learning_episodes: session.learning_episode_count,
            epsilon: session.agent.epsilon(),
            experience_size: session.learning.buffer().len(),
            policy_mode: session.agent.mode(),
        }
    }

    pub fn status(&self) -> EngineStatus {
        let session = self.lock();
        let account = session.env.state();
        EngineStatus {
            policy_mode: session.agent.mode(),
            backend: session.agent.backend(),
            learning_enabled: session.learning.is_enabled(),
            policy_version: self.store.version(),
            epsilon: session.agent.epsilon(),
            experience_size: session.learning.buffer().len(),
            experience_capacity: session.learning.buffer().capacity(),
            learning_updates: session.learning.stats().updates,
            learning_episodes: session.learning_episode_count,
            balance: account.balance,
            portfolio_value: account.portfolio_value(),
            open_positions: account.positions.len(),
            step_count: account.step_count,
            performance_records: session.recorder.record().len(),
        }
    }

    pub fn policy_mode(&self) -> PolicyMode {
        self.lock().agent.mode()
    }

    /// Restore the starting exploration rate
    pub fn reset_exploration(&self) -> f64 {
        let mut session = self.lock();
        session.agent.reset_exploration();
        info!(epsilon = session.agent.epsilon(), "exploration reset");
        session.agent.epsilon()
    }

    /// Save to the configured checkpoint directory
    pub fn save(&self) -> Result<()> {
        self.save_with(&self.checkpointer)
    }

    pub fn save_to<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        self.save_with(&self.checkpointer.relocated(dir))
    }

    fn save_with(&self, checkpointer: &Checkpointer) -> Result<()> {
        let session = self.lock();
        let snapshot = EngineSnapshot {
            performance_history: session.recorder.record().as_slice().to_vec(),
            learning_episode_count: session.learning_episode_count,
            epsilon: session.agent.epsilon(),
            environment_balance: session.env.state().balance,
            saved_at: Utc::now(),
        };
        checkpointer.save_snapshot(&snapshot)?;

        // Untrained weights are never written, so a reload cannot mistake them for a policy
        if let Some(network) = session.learning.network().filter(|_| self.store.is_trained()) {
            checkpointer.save_network(network)?;
        }
        Ok(())
    }

    /// Restore from the configured checkpoint directory
    pub fn load(&self) -> LoadReport {
        self.load_with(&self.checkpointer)
    }

    pub fn load_from<P: AsRef<Path>>(&self, dir: P) -> LoadReport {
        self.load_with(&self.checkpointer.relocated(dir))
    }

    /// Snapshot and weights load independently; failures leave that part fresh
    fn load_with(&self, checkpointer: &Checkpointer) -> LoadReport {
        let mut session = self.lock();
        let session = &mut *session;
        let mut report = LoadReport::default();

        match checkpointer.load_snapshot() {
            Ok(Some(snapshot)) => {
                session.recorder.restore(snapshot.performance_history);
                session.learning_episode_count = snapshot.learning_episode_count;
                session.agent.restore_epsilon(snapshot.epsilon);
                session.env.restore_balance(snapshot.environment_balance);
                report.snapshot_restored = true;
                info!(
                    trades = session.recorder.record().len(),
                    episodes = session.learning_episode_count,
                    epsilon = session.agent.epsilon(),
                    "engine snapshot restored"
                );
            }
            Ok(None) => info!(dir = %checkpointer.dir().display(), "no engine snapshot, starting fresh"),
            Err(e) => warn!(error = %e, "engine snapshot unreadable, starting fresh"),
        }

        match checkpointer.load_network() {
            Ok(Some(network)) => match network.expect_shape(STATE_DIM, NUM_ACTIONS) {
                Ok(()) if session.agent.backend() == PolicyBackend::Learned => {
                    report.network_restored = session.learning.install_network(network, &session.agent);
                }
                Ok(()) => debug!("heuristic backend, saved weights ignored"),
                Err(e) => warn!(error = %e, "saved weights rejected, heuristic fallback"),
            },
            Ok(None) => info!("no saved weights, heuristic fallback until trained"),
            Err(e) => warn!(error = %e, "saved weights unreadable, heuristic fallback"),
        }

        self.publish_account(session.env.state());
        report
    }

    pub fn config(&self) -> &RLConfig {
        &self.config
    }

    pub fn checkpointer(&self) -> &Checkpointer {
        &self.checkpointer
    }
}

fn placeholder_network(config: &RLConfig) -> QNetwork {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    let mut rng = match config.agent.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    QNetwork::new(STATE_DIM, &config.agent.hidden_layers, NUM_ACTIONS, &mut rng)
}

/// Save the engine on a fixed interval until the task is aborted
pub fn spawn_autosave(engine: Arc<GemEngine>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately
        tick.tick().await;

        loop {
            tick.tick().await;
            let engine = Arc::clone(&engine);
            match tokio::task::spawn_blocking(move || engine.save()).await {
                Ok(Ok(())) => debug!("autosave complete"),
                Ok(Err(e)) => warn!(error = %e, "autosave failed"),
                Err(e) => warn!(error = %e, "autosave task panicked"),
            }
        }
    })
}
