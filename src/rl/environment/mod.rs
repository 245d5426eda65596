//! Simulated Trading Environment for RL Training
//!
//! A gym-like account simulator plus a synthetic market that feeds it
//! without risking real capital.

mod market;
mod trading;

pub use market::{generate_sample_data, MarketConfig, SimulatedMarket};
pub use trading::{Rejection, StepInfo, StepResult, Termination, TradingEnvironment};
