//! Outcome Recorder
//!
//! Turns closed trades, simulated or reported from the real world, into
//! [`TradeOutcome`]s scored with the same close reward, and derives
//! performance statistics from the resulting log.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{GemError, Result};
use crate::rl::config::RewardConfig;
use crate::rl::core::{CloseRewardFunction, OutcomeSource, TradeOutcome, NEUTRAL_CONFIDENCE};

/// Trades considered by the live (real-outcome) summary
pub const LIVE_WINDOW: usize = 20;

/// A position closed outside the simulator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealTrade {
    pub symbol: String,
    pub entry_price: f64,
    pub exit_price: f64,
    pub holding_days: i64,
    /// Conviction at entry, if known
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl RealTrade {
    pub fn new(symbol: impl Into<String>, entry_price: f64, exit_price: f64, holding_days: i64) -> Self {
        Self {
            symbol: symbol.into(),
            entry_price,
            exit_price,
            holding_days,
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    fn validate(&self) -> Result<()> {
        for price in [self.entry_price, self.exit_price] {
            if !price.is_finite() || price <= 0.0 {
                return Err(GemError::InvalidPrice {
                    symbol: self.symbol.clone(),
                    price,
                });
            }
        }
        Ok(())
    }
}

/// Append-only log of closed trades
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PerformanceRecord {
    outcomes: Vec<TradeOutcome>,
}

impl PerformanceRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_outcomes(outcomes: Vec<TradeOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn push(&mut self, outcome: TradeOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn as_slice(&self) -> &[TradeOutcome] {
        &self.outcomes
    }

    /// The last `n` outcomes
    pub fn recent(&self, n: usize) -> &[TradeOutcome] {
        let start = self.outcomes.len().saturating_sub(n);
        &self.outcomes[start..]
    }

    /// The last `n` outcomes from one source, oldest first
    pub fn recent_from(&self, source: OutcomeSource, n: usize) -> Vec<&TradeOutcome> {
        let mut picked: Vec<&TradeOutcome> = self
            .outcomes
            .iter()
            .rev()
            .filter(|o| o.source == source)
            .take(n)
            .collect();
        picked.reverse();
        picked
    }
}

/// Summary statistics over a list of closed trades
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub win_rate: f64,
    /// Sum of per-trade returns, percent
    pub total_return: f64,
    pub average_return: f64,
    /// Population standard deviation of returns
    pub return_std: f64,
    /// Mean over std; 0 when std is 0
    pub sharpe_ratio: f64,
    /// Largest peak-to-trough fall of cumulative returns, percentage points
    pub max_drawdown: f64,
    pub average_holding_days: f64,
}

impl TradeStats {
    pub fn from_outcomes<'a, I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = &'a TradeOutcome>,
    {
        let mut returns = Vec::new();
        let mut days = 0.0;
        for o in outcomes {
            returns.push(o.profit_loss_percent);
            days += o.holding_days as f64;
        }

        let mut stats = Self::from_returns(&returns);
        if !returns.is_empty() {
            stats.average_holding_days = days / returns.len() as f64;
        }
        stats
    }

    pub fn from_returns(returns: &[f64]) -> Self {
        if returns.is_empty() {
            return Self::default();
        }

        let n = returns.len() as f64;
        let winning_trades = returns.iter().filter(|r| **r > 0.0).count();
        let total_return: f64 = returns.iter().sum();
        let average_return = total_return / n;
        let variance = returns
            .iter()
            .map(|r| (r - average_return).powi(2))
            .sum::<f64>()
            / n;
        let return_std = variance.sqrt();
        let sharpe_ratio = if return_std > 0.0 {
            average_return / return_std
        } else {
            0.0
        };

        Self {
            total_trades: returns.len(),
            winning_trades,
            win_rate: winning_trades as f64 / n,
            total_return,
            average_return,
            return_std,
            sharpe_ratio,
            max_drawdown: max_drawdown(returns),
            average_holding_days: 0.0,
        }
    }
}

/// Peak-to-trough decline of the cumulative return curve
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut cumulative = 0.0;
    let mut peak = f64::NEG_INFINITY;
    let mut worst: f64 = 0.0;
    for r in returns {
        cumulative += r;
        peak = peak.max(cumulative);
        worst = worst.max(peak - cumulative);
    }
    worst
}

/// Summary of the most recent real (non-simulated) closes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveMetrics {
    pub live_trades_count: usize,
    pub live_win_rate: f64,
    pub live_average_return: f64,
    pub live_total_return: f64,
}

/// Records closes and answers performance questions
#[derive(Debug, Clone, Default)]
pub struct OutcomeRecorder {
    reward_fn: CloseRewardFunction,
    record: PerformanceRecord,
}

impl OutcomeRecorder {
    pub fn new(reward: RewardConfig) -> Self {
        Self {
            reward_fn: CloseRewardFunction::with_config(reward),
            record: PerformanceRecord::new(),
        }
    }

    /// Score a real close and append it; never touches simulated state
    ///
    /// Missing confidence is treated as neutral, so no confidence bonus applies.
    pub fn record_real(&mut self, trade: &RealTrade) -> Result<TradeOutcome> {
        trade.validate()?;
        let confidence = trade
            .confidence
            .filter(|c| c.is_finite())
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(NEUTRAL_CONFIDENCE);

        let outcome = TradeOutcome::close(
            &self.reward_fn,
            trade.symbol.clone(),
            trade.entry_price,
            trade.exit_price,
            trade.holding_days,
            confidence,
            OutcomeSource::Real,
            Utc::now(),
        );

        info!(
            symbol = %outcome.symbol,
            pl_pct = outcome.profit_loss_percent,
            days = outcome.holding_days,
            reward = outcome.reward,
            "recorded real outcome"
        );

        self.record.push(outcome.clone());
        Ok(outcome)
    }

    /// Append a close produced by the simulator
    pub fn record_simulated(&mut self, outcome: TradeOutcome) {
        self.record.push(outcome);
    }

    /// Statistics over the last `window` trades of any source
    pub fn recent_stats(&self, window: usize) -> TradeStats {
        TradeStats::from_outcomes(self.record.recent(window))
    }

    /// Real-outcome summary, `None` until one was recorded
    pub fn live_metrics(&self) -> Option<LiveMetrics> {
        let recent = self.record.recent_from(OutcomeSource::Real, LIVE_WINDOW);
        if recent.is_empty() {
            return None;
        }
        let stats = TradeStats::from_outcomes(recent);
        Some(LiveMetrics {
            live_trades_count: self
                .record
                .as_slice()
                .iter()
                .filter(|o| o.source == OutcomeSource::Real)
                .count(),
            live_win_rate: stats.win_rate,
            live_average_return: stats.average_return,
            live_total_return: stats.total_return,
        })
    }

    pub fn record(&self) -> &PerformanceRecord {
        &self.record
    }

    /// Replace the history with a restored one
    pub fn restore(&mut self, history: Vec<TradeOutcome>) {
        self.record = PerformanceRecord::from_outcomes(history);
    }

    pub fn reward_fn(&self) -> &CloseRewardFunction {
        &self.reward_fn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_outcome_uses_shared_reward() {
        let mut recorder = OutcomeRecorder::new(RewardConfig::default());
        let outcome = recorder
            .record_real(&RealTrade::new("BTC", 50_000.0, 55_000.0, 10).with_confidence(0.8))
            .unwrap();

        assert!((outcome.profit_loss_percent - 10.0).abs() < 1e-9);
        assert!((outcome.reward - 0.3946).abs() < 1e-3);
        assert_eq!(outcome.source, OutcomeSource::Real);
        assert_eq!(recorder.record().len(), 1);
    }

    #[test]
    fn missing_confidence_gets_no_bonus() {
        let mut recorder = OutcomeRecorder::new(RewardConfig::default());
        let outcome = recorder
            .record_real(&RealTrade::new("BTC", 100.0, 110.0, 0))
            .unwrap();
        assert!((outcome.reward - 0.2f64.tanh()).abs() < 1e-12);
    }

    #[test]
    fn invalid_prices_are_rejected() {
        let mut recorder = OutcomeRecorder::new(RewardConfig::default());
        for (entry, exit) in [(0.0, 10.0), (10.0, -1.0), (f64::NAN, 10.0)] {
            let err = recorder.record_real(&RealTrade::new("X", entry, exit, 1)).unwrap_err();
            assert!(matches!(err, GemError::InvalidPrice { .. }));
        }
        assert!(recorder.record().is_empty());
    }

    #[test]
    fn stats_match_hand_computation() {
        let stats = TradeStats::from_returns(&[10.0, -5.0, 20.0, -15.0]);
        assert_eq!(stats.total_trades, 4);
        assert_eq!(stats.winning_trades, 2);
        assert_eq!(stats.win_rate, 0.5);
        assert!((stats.average_return - 2.5).abs() < 1e-12);
        let std = ((7.5f64.powi(2) + 7.5f64.powi(2) + 17.5f64.powi(2) + 17.5f64.powi(2)) / 4.0).sqrt();
        assert!((stats.return_std - std).abs() < 1e-12);
        assert!((stats.sharpe_ratio - 2.5 / std).abs() < 1e-12);
        // cumulative: 10, 5, 25, 10
        assert!((stats.max_drawdown - 15.0).abs() < 1e-12);
    }

    #[test]
    fn constant_returns_have_zero_sharpe() {
        let stats = TradeStats::from_returns(&[3.0, 3.0, 3.0]);
        assert_eq!(stats.return_std, 0.0);
        assert_eq!(stats.sharpe_ratio, 0.0);
        assert_eq!(stats.max_drawdown, 0.0);
    }

    #[test]
    fn drawdown_from_first_element() {
        assert_eq!(max_drawdown(&[-10.0, -5.0]), 5.0);
        assert_eq!(max_drawdown(&[]), 0.0);
    }

    #[test]
    fn live_metrics_only_count_real_trades() {
        let mut recorder = OutcomeRecorder::new(RewardConfig::default());
        assert!(recorder.live_metrics().is_none());

        let sim = TradeOutcome::close(
            recorder.reward_fn(),
            "SIM",
            1.0,
            0.5,
            1,
            0.5,
            OutcomeSource::Simulated,
            Utc::now(),
        );
        recorder.record_simulated(sim);
        recorder.record_real(&RealTrade::new("ETH", 100.0, 120.0, 3)).unwrap();

        let live = recorder.live_metrics().unwrap();
        assert_eq!(live.live_trades_count, 1);
        assert_eq!(live.live_win_rate, 1.0);
        assert!((live.live_average_return - 20.0).abs() < 1e-9);
        assert_eq!(recorder.recent_stats(50).total_trades, 2);
    }
}
