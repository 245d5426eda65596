//! Reinforcement Learning Module
//!
//! Opportunity scoring driven by a value-based agent that learns from a
//! simulated account and from real trade closes.
//!
//! # Features
//!
//! - **State Representation**: account fields plus gem signals, 10 floats
//! - **Action Space**: Discrete Hold/Buy/Sell
//! - **Algorithms**: DQN with a periodically synced target network
//! - **Graceful degradation**: heuristic policy whenever no trained weights exist
//! - **Online Learning**: real closes feed the same reward and replay memory
//!
//! # Usage
//!
//! Training runs on the Burn framework and is enabled by the default `rl`
//! feature. Building without it leaves the engine on the heuristic policy:
//! ```toml
//! gemscout = { default-features = false }
//! ```

pub mod algorithms;
pub mod config;
pub mod core;
pub mod environment;
pub mod integration;
pub mod memory;
pub mod networks;
pub mod policy;
pub mod training;

// Config exports
pub use config::{
    AgentConfig, EnvConfig, PolicyBackend, RLConfig, RecommendationConfig, RewardConfig,
    TrainingConfig,
};

// Core exports
pub use core::{
    CloseRewardFunction, DiscreteAction, EnvironmentState, GemStateEncoder, OutcomeSource,
    RewardFunction, RewardSignal, StateEncoder, TradeOutcome, TradingAction, NUM_ACTIONS,
    STATE_DIM,
};

// Memory exports
pub use memory::{ReplayBuffer, Transition};

// Policy exports
pub use policy::{DecisionSource, PolicyAgent, PolicyDecision, PolicyMode};

// Integration exports
pub use integration::{
    spawn_autosave, BacktestSummary, GemEngine, PerformanceMetrics, RealTrade, Recommendation,
};

// Environment exports
pub use environment::{
    generate_sample_data, MarketConfig, SimulatedMarket, StepResult, TradingEnvironment,
};
