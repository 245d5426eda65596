//! Trading Environment for RL Training
//!
//! Provides a gym-like interface with step/reset over one simulated account.
//! Positions are marked at cost basis; only closes realize profit or loss.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::rl::config::{EnvConfig, RewardConfig};
use crate::rl::core::{
    CloseRewardFunction, DiscreteAction, EnvironmentState, OutcomeSource, Position, TradeOutcome,
    TradingAction,
};

/// Why an action left the account untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// Zero, negative or non-finite price
    InvalidPrice,
    /// BUY sized below the minimum position fraction
    UndersizedBuy,
    /// SELL for a symbol with no open position
    NoPosition,
}

/// Why an episode ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    TimeLimit,
    Ruin,
    TargetReached,
}

/// Result of taking a step in the environment
#[derive(Debug, Clone)]
pub struct StepResult {
    /// State after the action
    pub state: EnvironmentState,
    pub reward: f64,
    /// Whether episode is done
    pub done: bool,
    /// Whether episode was truncated (time limit)
    pub truncated: bool,
    /// Additional info
    pub info: StepInfo,
}

/// Additional step information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepInfo {
    pub balance: f64,
    pub open_positions: usize,
    pub total_return_percent: f64,
    pub portfolio_value: f64,
    /// Set when the step closed a position
    pub trade: Option<TradeOutcome>,
    pub rejection: Option<Rejection>,
    pub termination: Option<Termination>,
}

/// Trading environment for RL training
pub struct TradingEnvironment {
    config: EnvConfig,
    reward_fn: CloseRewardFunction,
    state: EnvironmentState,
    trade_history: VecDeque<TradeOutcome>,
    episodes_completed: u64,
}

impl TradingEnvironment {
    /// Create a new trading environment
    pub fn new(config: EnvConfig, reward: RewardConfig) -> Self {
        let state = EnvironmentState::new(config.initial_balance);
        Self {
            config,
            reward_fn: CloseRewardFunction::with_config(reward),
            state,
            trade_history: VecDeque::new(),
            episodes_completed: 0,
        }
    }

    /// Reset the account for a new episode
    pub fn reset(&mut self) -> EnvironmentState {
        self.state = EnvironmentState::new(self.config.initial_balance);
        self.trade_history.clear();
        self.state.clone()
    }

    /// Take a step in the environment
    pub fn step(&mut self, action: &TradingAction) -> StepResult {
        if !action.has_valid_price() {
            debug!(symbol = %action.symbol, price = action.price, "invalid price, action ignored");
            return self.finish(0.0, None, Some(Rejection::InvalidPrice));
        }

        self.state.step_count += 1;

        let (reward, trade, rejection) = match action.kind {
            DiscreteAction::Buy => {
                let (reward, rejection) = self.execute_buy(action);
                (reward, None, rejection)
            }
            DiscreteAction::Sell => self.execute_sell(action),
            DiscreteAction::Hold => (self.reward_fn.hold_reward(action.gem_score), None, None),
        };

        let result = self.finish(reward, trade, rejection);
        if result.done {
            self.episodes_completed += 1;
            info!(
                steps = result.state.step_count,
                balance = result.info.balance,
                return_pct = result.info.total_return_percent,
                reason = ?result.info.termination,
                "episode finished"
            );
        }
        result
    }

    fn execute_buy(&mut self, action: &TradingAction) -> (f64, Option<Rejection>) {
        let c = &self.config;
        let risk_fraction = (action.confidence * c.confidence_risk_scale).min(c.max_risk_fraction);
        let position_value = self.state.balance * risk_fraction;

        if position_value < self.state.balance * c.min_position_fraction || position_value <= 0.0 {
            debug!(symbol = %action.symbol, position_value, "buy below minimum size");
            return (
                self.reward_fn.config().undersized_buy_penalty,
                Some(Rejection::UndersizedBuy),
            );
        }

        let quantity = position_value / action.price;
        match self.state.positions.get_mut(&action.symbol) {
            Some(existing) => existing.merge(quantity, action.price),
            None => {
                self.state.positions.insert(
                    action.symbol.clone(),
                    Position::new(action.symbol.clone(), quantity, action.price, action.timestamp),
                );
            }
        }
        self.state.balance -= position_value;

        debug!(
            symbol = %action.symbol,
            quantity,
            price = action.price,
            balance = self.state.balance,
            "opened position"
        );

        (self.reward_fn.buy_reward(action.confidence, action.gem_score), None)
    }

    fn execute_sell(&mut self, action: &TradingAction) -> (f64, Option<TradeOutcome>, Option<Rejection>) {
        let Some(position) = self.state.positions.remove(&action.symbol) else {
            return (
                self.reward_fn.config().missing_position_penalty,
                None,
                Some(Rejection::NoPosition),
            );
        };

        let sell_value = position.quantity * action.price;
        self.state.balance += sell_value;

        let outcome = TradeOutcome::close(
            &self.reward_fn,
            position.symbol.clone(),
            position.entry_price,
            action.price,
            position.holding_days(action.timestamp),
            action.confidence,
            OutcomeSource::Simulated,
            action.timestamp,
        );

        debug!(
            symbol = %outcome.symbol,
            pl_pct = outcome.profit_loss_percent,
            days = outcome.holding_days,
            reward = outcome.reward,
            "closed position"
        );

        self.trade_history.push_back(outcome.clone());
        while self.trade_history.len() > self.config.max_trade_history {
            self.trade_history.pop_front();
        }

        (outcome.reward, Some(outcome.clone()), None)
    }

    fn finish(
        &self,
        reward: f64,
        trade: Option<TradeOutcome>,
        rejection: Option<Rejection>,
    ) -> StepResult {
        let termination = self.check_done();
        let info = StepInfo {
            balance: self.state.balance,
            open_positions: self.state.positions.len(),
            total_return_percent: self.state.total_return_percent(),
            portfolio_value: self.state.portfolio_value(),
            trade,
            rejection,
            termination,
        };

        StepResult {
            state: self.state.clone(),
            reward,
            done: termination.is_some(),
            truncated: termination == Some(Termination::TimeLimit),
            info,
        }
    }

    /// Check if episode is done
    fn check_done(&self) -> Option<Termination> {
        let c = &self.config;
        let initial = self.state.initial_balance;

        if self.state.step_count >= c.max_steps {
            Some(Termination::TimeLimit)
        } else if self.state.balance < initial * c.ruin_fraction {
            Some(Termination::Ruin)
        } else if self.state.portfolio_value() > initial * c.target_multiple {
            Some(Termination::TargetReached)
        } else {
            None
        }
    }

    pub fn state(&self) -> &EnvironmentState {
        &self.state
    }

    /// Overwrite the cash balance (used when restoring a saved session)
    pub fn restore_balance(&mut self, balance: f64) {
        if balance.is_finite() && balance >= 0.0 {
            self.state.balance = balance;
        }
    }

    /// Simulated closes of the current episode, oldest first
    pub fn trade_history(&self) -> impl Iterator<Item = &TradeOutcome> {
        self.trade_history.iter()
    }

    pub fn episodes_completed(&self) -> u64 {
        self.episodes_completed
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }
}
