pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod rl;

pub use config::AppConfig;
pub use domain::{AnalysisRequest, ClassifierResult, CoinData, FeatureSnapshot, HistoryRecord};
pub use error::{GemError, Result};
pub use rl::{GemEngine, PolicyMode, RLConfig, Recommendation};
