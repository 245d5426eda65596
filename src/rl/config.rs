//! RL Configuration
//!
//! Configuration structs for reinforcement learning components.
//!
//! Every reward-shaping and sizing constant lives here under a name so it can
//! be overridden from `config/*.toml` or `GEMSCOUT__RL__...` environment
//! variables. Defaults reproduce the historical scoring behavior exactly.

use serde::{Deserialize, Serialize};

/// Main RL configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RLConfig {
    /// Simulated trading environment
    pub environment: EnvConfig,
    /// Reward shaping constants
    pub reward: RewardConfig,
    /// Policy agent / exploration
    pub agent: AgentConfig,
    /// Experience replay and learning loop
    pub training: TrainingConfig,
    /// Recommendation synthesis
    pub recommendation: RecommendationConfig,
}

impl RLConfig {
    /// Collect every invalid value instead of failing on the first one.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let env = &self.environment;
        if !(env.initial_balance.is_finite() && env.initial_balance > 0.0) {
            errors.push("environment.initial_balance must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&env.max_risk_fraction) {
            errors.push("environment.max_risk_fraction must be within [0, 1]".to_string());
        }
        if env.max_steps == 0 {
            errors.push("environment.max_steps must be > 0".to_string());
        }
        if env.ruin_fraction >= env.target_multiple {
            errors.push("environment.ruin_fraction must be below target_multiple".to_string());
        }

        if self.reward.pnl_scale <= 0.0 {
            errors.push("reward.pnl_scale must be > 0".to_string());
        }
        if self.reward.reward_clip <= 0.0 {
            errors.push("reward.reward_clip must be > 0".to_string());
        }

        let agent = &self.agent;
        if !(0.0..=1.0).contains(&agent.epsilon_min) || agent.epsilon_min > agent.epsilon_start {
            errors.push("agent.epsilon_min must be within [0, epsilon_start]".to_string());
        }
        if !(0.0..=1.0).contains(&agent.epsilon_start) {
            errors.push("agent.epsilon_start must be within [0, 1]".to_string());
        }
        if !(agent.epsilon_decay > 0.0 && agent.epsilon_decay <= 1.0) {
            errors.push("agent.epsilon_decay must be within (0, 1]".to_string());
        }
        if agent.hidden_layers.is_empty() {
            errors.push("agent.hidden_layers must not be empty".to_string());
        }

        let training = &self.training;
        if training.buffer_capacity == 0 {
            errors.push("training.buffer_capacity must be > 0".to_string());
        }
        if training.batch_size == 0 {
            errors.push("training.batch_size must be > 0".to_string());
        }
        if training.learn_stride == 0 || training.target_sync_interval == 0 {
            errors.push("training.learn_stride and target_sync_interval must be > 0".to_string());
        }
        if !(0.0..1.0).contains(&training.gamma) {
            errors.push("training.gamma must be within [0, 1)".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Trading environment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Starting cash balance
    pub initial_balance: f64,
    /// Fraction of balance risked per unit of confidence
    pub confidence_risk_scale: f64,
    /// Hard cap on the fraction of balance per BUY
    pub max_risk_fraction: f64,
    /// BUYs smaller than this fraction of balance are rejected
    pub min_position_fraction: f64,
    /// Episode time limit
    pub max_steps: u64,
    /// Episode ends when balance drops below this fraction of the start
    pub ruin_fraction: f64,
    /// Episode ends when portfolio value exceeds this multiple of the start
    pub target_multiple: f64,
    /// Simulated closes kept in the environment's trade history
    pub max_trade_history: usize,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            confidence_risk_scale: 0.1,
            max_risk_fraction: 0.05,
            min_position_fraction: 0.01,
            max_steps: 1000,
            ruin_fraction: 0.2,
            target_multiple: 2.0,
            max_trade_history: 1000,
        }
    }
}

/// Reward function configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Divisor applied to profit/loss percent before `tanh`
    pub pnl_scale: f64,
    /// Days over which the holding-time decay is measured
    pub holding_horizon_days: f64,
    /// Time factor lost over one full horizon
    pub holding_decay: f64,
    /// Lower bound of the time factor
    pub time_factor_floor: f64,
    /// Profitable close above this confidence earns the bonus
    pub high_confidence_threshold: f64,
    pub high_confidence_bonus: f64,
    /// Losing close below this confidence earns the (smaller) bonus
    pub low_confidence_threshold: f64,
    pub low_confidence_bonus: f64,
    /// Close rewards are clipped to `[-reward_clip, reward_clip]`
    pub reward_clip: f64,
    /// Scale of the immediate BUY reward
    pub buy_reward_scale: f64,
    /// BUY rejected for being below the minimum size
    pub undersized_buy_penalty: f64,
    /// SELL with no open position
    pub missing_position_penalty: f64,
    /// HOLD on a setup below this gem score is rewarded
    pub hold_weak_threshold: f64,
    pub hold_weak_reward: f64,
    /// HOLD on a setup above this gem score is penalized
    pub hold_strong_threshold: f64,
    pub hold_strong_penalty: f64,
    /// HOLD anywhere in between
    pub hold_idle_penalty: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            pnl_scale: 50.0,
            holding_horizon_days: 365.0,
            holding_decay: 0.5,
            time_factor_floor: 0.5,
            high_confidence_threshold: 0.7,
            high_confidence_bonus: 0.2,
            low_confidence_threshold: 0.3,
            low_confidence_bonus: 0.1,
            reward_clip: 2.0,
            buy_reward_scale: 0.1,
            undersized_buy_penalty: -0.1,
            missing_position_penalty: -0.5,
            hold_weak_threshold: 50.0,
            hold_weak_reward: 0.05,
            hold_strong_threshold: 80.0,
            hold_strong_penalty: -0.1,
            hold_idle_penalty: -0.02,
        }
    }
}

/// Which policy implementation the agent is built with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyBackend {
    /// Trainable Q-network, heuristic until trained
    Learned,
    /// Heuristic only; learning loop disabled
    Heuristic,
}

/// Policy agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub backend: PolicyBackend,
    /// Hidden layer widths of the Q-network
    pub hidden_layers: Vec<usize>,
    /// Initial exploration rate
    pub epsilon_start: f64,
    /// Multiplicative decay applied after each learning step
    pub epsilon_decay: f64,
    /// Exploration floor
    pub epsilon_min: f64,
    /// Confidence reported for exploratory actions
    pub exploration_confidence: f64,
    /// Heuristic BUY threshold on the mean buy score
    pub heuristic_buy_threshold: f64,
    /// Heuristic SELL threshold on the mean buy score
    pub heuristic_sell_threshold: f64,
    /// Seed for exploration and weight init (random when absent)
    pub seed: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            backend: PolicyBackend::Learned,
            hidden_layers: vec![128, 64, 32],
            epsilon_start: 1.0,
            epsilon_decay: 0.995,
            epsilon_min: 0.01,
            exploration_confidence: 0.5,
            heuristic_buy_threshold: 0.7,
            heuristic_sell_threshold: 0.3,
            seed: None,
        }
    }
}

/// Training loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Simulate each recommended action to generate experience
    pub learning_enabled: bool,
    /// Turn real trade closes into terminal transitions
    pub learn_from_real_outcomes: bool,
    /// Replay buffer capacity
    pub buffer_capacity: usize,
    /// Buffer size that must be exceeded before learning starts
    pub warmup: usize,
    /// Learn every `learn_stride` stored experiences
    pub learn_stride: u64,
    /// Sync the target network every `target_sync_interval` stored experiences
    pub target_sync_interval: u64,
    /// Minibatch size
    pub batch_size: usize,
    /// Discount factor
    pub gamma: f64,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Global gradient norm clip
    pub max_grad_norm: f64,
    /// Holding period used when replaying history
    pub backtest_lookback: usize,
    /// Minimum confidence for a historical BUY to be traded
    pub backtest_min_confidence: f64,
    /// Record a learning-progress snapshot every N historical records
    pub progress_interval: usize,
    /// Window of recent trades used for performance metrics
    pub metrics_window: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_enabled: true,
            learn_from_real_outcomes: true,
            buffer_capacity: 10_000,
            warmup: 100,
            learn_stride: 10,
            target_sync_interval: 100,
            batch_size: 32,
            gamma: 0.95,
            learning_rate: 0.001,
            max_grad_norm: 1.0,
            backtest_lookback: 30,
            backtest_min_confidence: 0.6,
            progress_interval: 50,
            metrics_window: 50,
        }
    }
}

/// Recommendation synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    /// Risk score every assessment starts from
    pub base_risk: f64,
    pub very_low_market_cap: f64,
    pub very_low_market_cap_penalty: f64,
    pub low_market_cap: f64,
    pub low_market_cap_penalty: f64,
    /// Rank tiers used when only the market-cap rank is known
    pub very_low_rank_tier: u32,
    pub low_rank_tier: u32,
    pub min_volume_24h: f64,
    pub low_liquidity_penalty: f64,
    pub low_confidence: f64,
    pub low_confidence_penalty: f64,
    pub low_gem_score: f64,
    pub low_gem_score_penalty: f64,
    /// Base position size (percent of portfolio)
    pub base_position_percent: f64,
    pub min_position_percent: f64,
    pub max_position_percent: f64,
    /// Fraction of position size removed at risk score 1.0
    pub risk_size_reduction: f64,
    /// Volume surge ratio above which entry is immediate
    pub volume_surge_ratio: f64,
    pub volume_surge_boost: f64,
    /// 24h change (percent) above which momentum is strong
    pub momentum_change: f64,
    pub momentum_boost: f64,
    /// 24h change (percent) below which a dip buy is flagged
    pub dip_change: f64,
    pub dip_boost: f64,
    pub sentiment_adjustment: f64,
    /// Gem score assumed when the classifier is unavailable
    pub fallback_gem_score: f64,
    /// Probability assumed when the classifier is unavailable
    pub fallback_probability: f64,
    /// Signal level above which a feature is named in the rationale
    pub rationale_signal: f64,
    /// Gem score above which the rationale calls it high
    pub rationale_high_gem_score: f64,
    /// Gem score below which the rationale calls it low
    pub rationale_low_gem_score: f64,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            base_risk: 0.5,
            very_low_market_cap: 10_000_000.0,
            very_low_market_cap_penalty: 0.2,
            low_market_cap: 100_000_000.0,
            low_market_cap_penalty: 0.1,
            very_low_rank_tier: 500,
            low_rank_tier: 100,
            min_volume_24h: 100_000.0,
            low_liquidity_penalty: 0.15,
            low_confidence: 0.5,
            low_confidence_penalty: 0.1,
            low_gem_score: 50.0,
            low_gem_score_penalty: 0.1,
            base_position_percent: 5.0,
            min_position_percent: 0.5,
            max_position_percent: 10.0,
            risk_size_reduction: 0.5,
            volume_surge_ratio: 3.0,
            volume_surge_boost: 0.2,
            momentum_change: 10.0,
            momentum_boost: 0.15,
            dip_change: -5.0,
            dip_boost: 0.1,
            sentiment_adjustment: 0.1,
            fallback_gem_score: 50.0,
            fallback_probability: 0.5,
            rationale_signal: 0.7,
            rationale_high_gem_score: 80.0,
            rationale_low_gem_score: 40.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(RLConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_collects_all_errors() {
        let mut config = RLConfig::default();
        config.environment.initial_balance = -1.0;
        config.training.batch_size = 0;
        config.agent.epsilon_decay = 1.5;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: RLConfig = serde_json::from_str(r#"{"reward": {"pnl_scale": 25.0}}"#).unwrap();
        assert_eq!(config.reward.pnl_scale, 25.0);
        assert_eq!(config.reward.reward_clip, 2.0);
        assert_eq!(config.training.buffer_capacity, 10_000);
        assert_eq!(config.agent.backend, PolicyBackend::Learned);
    }
}
