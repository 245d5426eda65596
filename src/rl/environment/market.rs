//! Simulated Market for Price and Feature Generation
//!
//! Generates synthetic daily observations for training and smoke-testing the
//! engine without a market-data feed.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::domain::{ClassifierResult, HistoryRecord};

/// Market simulation configuration
#[derive(Debug, Clone)]
pub struct MarketConfig {
    pub symbols: Vec<String>,
    /// Daily return volatility (std dev)
    pub volatility: f64,
    /// Drift per unit of hidden quality per day
    pub quality_drift: f64,
    /// Probability that a day carries a volume spike
    pub surge_probability: f64,
    pub start: DateTime<Utc>,
    pub seed: Option<u64>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            symbols: ["ALPHA", "BETA", "GAMMA", "DELTA"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            volatility: 0.05,
            quality_drift: 0.01,
            surge_probability: 0.1,
            start: Utc::now() - Duration::days(365),
            seed: None,
        }
    }
}

#[derive(Debug, Clone)]
struct CoinProcess {
    symbol: String,
    price: f64,
    /// Latent quality in [-1, 1]; drives drift and the observable signals
    quality: f64,
    market_cap: f64,
    rank: u32,
}

/// Random-walk market over a handful of coins
pub struct SimulatedMarket {
    config: MarketConfig,
    coins: Vec<CoinProcess>,
    day: i64,
    rng: StdRng,
}

impl SimulatedMarket {
    /// Create a new simulated market
    pub fn new(config: MarketConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let coins = config
            .symbols
            .iter()
            .enumerate()
            .map(|(i, symbol)| CoinProcess {
                symbol: symbol.clone(),
                price: rng.gen_range(0.05..50.0),
                quality: rng.gen_range(-1.0..1.0),
                market_cap: rng.gen_range(5e6..5e8),
                rank: 50 + (i as u32) * 150,
            })
            .collect();

        Self {
            config,
            coins,
            day: 0,
            rng,
        }
    }

    /// Advance one day and return one observation per coin
    pub fn step(&mut self) -> Vec<HistoryRecord> {
        let timestamp = self.config.start + Duration::days(self.day);
        self.day += 1;

        let mut records = Vec::with_capacity(self.coins.len());
        for i in 0..self.coins.len() {
            let shock: f64 = self.rng.sample(StandardNormal);
            let surge = self.rng.gen_bool(self.config.surge_probability.clamp(0.0, 1.0));
            let noise: f64 = self.rng.gen_range(-0.15..0.15);
            let regime_shift = self.rng.gen_bool(0.01);

            let coin = &mut self.coins[i];
            if regime_shift {
                coin.quality = -coin.quality;
            }

            let daily_return =
                self.config.quality_drift * coin.quality + self.config.volatility * shock;
            let previous = coin.price;
            coin.price = (coin.price * (1.0 + daily_return)).max(1e-6);
            coin.market_cap = (coin.market_cap * (1.0 + daily_return)).max(1e5);

            let change_pct = (coin.price - previous) / previous * 100.0;
            let q = (coin.quality + 1.0) / 2.0;
            let gem_score = ((q + noise) * 100.0).clamp(0.0, 100.0);
            let surge_ratio = if surge { 3.0 + q * 4.0 } else { 0.5 + q };
            let volume = coin.market_cap * 0.05 * surge_ratio;

            let features: HashMap<String, Value> = [
                ("gem_score", json!(gem_score)),
                ("fear_opportunity_score", json!((q + noise).clamp(0.0, 1.0))),
                ("volume_surge_anomaly", json!(if surge { 0.9 } else { 0.2 })),
                ("whale_accumulation_score", json!((q - noise).clamp(0.0, 1.0))),
                ("ecosystem_beta_score", json!(0.5)),
                ("asymmetric_payoff_score", json!(q)),
                ("volume_price_ratio", json!(volume / coin.market_cap)),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

            records.push(HistoryRecord {
                symbol: coin.symbol.clone(),
                price: coin.price,
                timestamp,
                market_cap: Some(coin.market_cap),
                market_cap_rank: Some(coin.rank),
                volume_24h: Some(volume),
                price_change_24h: Some(change_pct),
                volume_surge_ratio: Some(surge_ratio),
                classifier: Some(ClassifierResult {
                    probability: q,
                    score: gem_score,
                }),
                features,
            });
        }
        records
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }
}

/// Generate `days` of daily history for the default coin set
pub fn generate_sample_data(days: usize, seed: Option<u64>) -> Vec<HistoryRecord> {
    let mut market = SimulatedMarket::new(MarketConfig {
        seed,
        ..Default::default()
    });
    (0..days).flat_map(|_| market.step()).collect()
}
