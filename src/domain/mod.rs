//! Domain inputs validated at the system boundary.

pub mod features;
pub mod market;

pub use features::{FeatureSnapshot, FEATURE_NAMES, GEM_SCORE_MAX};
pub use market::{
    read_history_csv, AnalysisRequest, ClassifierResult, CoinData, HistoryRecord, MarketContext,
    MarketSentiment,
};
