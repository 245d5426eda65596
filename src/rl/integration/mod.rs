//! Engine Integration
//!
//! The service surface: the engine facade, real outcome recording and
//! recommendation synthesis.

pub mod engine;
pub mod outcome;
pub mod recommender;

pub use engine::{
    spawn_autosave, BacktestSummary, BacktestTrade, EngineStatus, GemEngine, LearningProgress,
    LoadReport, PerformanceMetrics, SimulationStep,
};
pub use outcome::{LiveMetrics, OutcomeRecorder, PerformanceRecord, RealTrade, TradeStats};
pub use recommender::{
    AiAssessment, Recommendation, RecommendationSynthesizer, RiskAssessment, RiskLevel,
    SynthesisInput, TimingSignals,
};
