//! Core RL Types
//!
//! Action space, reward model and state representation shared by the
//! environment, the agent and the outcome recorder.

pub mod action;
pub mod outcome;
pub mod reward;
pub mod state;

pub use action::{DiscreteAction, TradingAction, NUM_ACTIONS};
pub use outcome::{OutcomeSource, TradeOutcome};
pub use reward::{
    profit_loss_percent, CloseRewardFunction, CloseTransition, RewardFunction, RewardSignal,
    NEUTRAL_CONFIDENCE,
};
pub use state::{EnvironmentState, GemStateEncoder, Position, StateEncoder, ENV_FEATURES, STATE_DIM};
