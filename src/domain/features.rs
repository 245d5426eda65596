//! Feature Snapshot
//!
//! Schema-validated record of the signals describing one asset at one instant.
//! Raw feature bags are validated exactly once, here; everything downstream
//! trusts the named fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Field names accepted from a raw feature map.
pub const FEATURE_NAMES: [&str; 9] = [
    "gem_score",
    "fear_opportunity_score",
    "volume_surge_anomaly",
    "whale_accumulation_score",
    "ecosystem_beta_score",
    "asymmetric_payoff_score",
    "volume_price_ratio",
    "retail_exhaustion_score",
    "network_effect_score",
];

/// Upper bound of the gem score scale.
pub const GEM_SCORE_MAX: f64 = 100.0;

/// Immutable, validated feature record for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    /// External "hidden opportunity" estimate, 0-100
    pub gem_score: f64,
    /// Contrarian psychology: fear while fundamentals hold, 0-1
    pub fear_opportunity_score: f64,
    /// Volume far above what the rank implies, 0-1
    pub volume_surge_anomaly: f64,
    pub whale_accumulation_score: f64,
    pub ecosystem_beta_score: f64,
    pub asymmetric_payoff_score: f64,
    /// 24h volume over market cap, >= 0
    pub volume_price_ratio: f64,
    pub retail_exhaustion_score: f64,
    pub network_effect_score: f64,
}

impl FeatureSnapshot {
    /// Snapshot with every signal at its default of 0.0
    pub fn empty(symbol: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            gem_score: 0.0,
            fear_opportunity_score: 0.0,
            volume_surge_anomaly: 0.0,
            whale_accumulation_score: 0.0,
            ecosystem_beta_score: 0.0,
            asymmetric_payoff_score: 0.0,
            volume_price_ratio: 0.0,
            retail_exhaustion_score: 0.0,
            network_effect_score: 0.0,
        }
    }

    /// Validate a loosely-typed feature map.
    ///
    /// Numbers and numeric strings are accepted. Missing, non-numeric, NaN and
    /// infinite values become 0.0 with a warning; out-of-range values are
    /// clamped with a warning. Unknown keys are ignored.
    pub fn from_raw(
        symbol: impl Into<String>,
        timestamp: DateTime<Utc>,
        raw: &HashMap<String, Value>,
    ) -> Self {
        let symbol = symbol.into();
        let mut snapshot = Self::empty(symbol.clone(), timestamp);

        for (key, value) in raw {
            let Some(slot) = snapshot.field_mut(key) else {
                debug!(symbol = %symbol, feature = %key, "ignoring unknown feature");
                continue;
            };
            *slot = coerce(&symbol, key, value);
        }

        snapshot.clamp_ranges();
        snapshot
    }

    /// Build from already-numeric values, applying the same validation.
    pub fn from_values<I, K>(symbol: impl Into<String>, timestamp: DateTime<Utc>, values: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let raw: HashMap<String, Value> = values
            .into_iter()
            .map(|(k, v)| {
                let value = serde_json::Number::from_f64(v)
                    .map(Value::Number)
                    .unwrap_or(Value::Null);
                (k.into(), value)
            })
            .collect();
        Self::from_raw(symbol, timestamp, &raw)
    }

    /// Look up a signal by name
    pub fn get(&self, name: &str) -> Option<f64> {
        Some(match name {
            "gem_score" => self.gem_score,
            "fear_opportunity_score" => self.fear_opportunity_score,
            "volume_surge_anomaly" => self.volume_surge_anomaly,
            "whale_accumulation_score" => self.whale_accumulation_score,
            "ecosystem_beta_score" => self.ecosystem_beta_score,
            "asymmetric_payoff_score" => self.asymmetric_payoff_score,
            "volume_price_ratio" => self.volume_price_ratio,
            "retail_exhaustion_score" => self.retail_exhaustion_score,
            "network_effect_score" => self.network_effect_score,
            _ => return None,
        })
    }

    /// Gem score normalized to [0, 1]
    pub fn gem_fraction(&self) -> f64 {
        self.gem_score / GEM_SCORE_MAX
    }

    fn field_mut(&mut self, name: &str) -> Option<&mut f64> {
        Some(match name {
            "gem_score" => &mut self.gem_score,
            "fear_opportunity_score" => &mut self.fear_opportunity_score,
            "volume_surge_anomaly" => &mut self.volume_surge_anomaly,
            "whale_accumulation_score" => &mut self.whale_accumulation_score,
            "ecosystem_beta_score" => &mut self.ecosystem_beta_score,
            "asymmetric_payoff_score" => &mut self.asymmetric_payoff_score,
            "volume_price_ratio" => &mut self.volume_price_ratio,
            "retail_exhaustion_score" => &mut self.retail_exhaustion_score,
            "network_effect_score" => &mut self.network_effect_score,
            _ => return None,
        })
    }

    fn clamp_ranges(&mut self) {
        let symbol = self.symbol.clone();
        clamp_field(&symbol, "gem_score", &mut self.gem_score, 0.0, GEM_SCORE_MAX);
        for name in FEATURE_NAMES.iter().skip(1) {
            let (lo, hi) = if *name == "volume_price_ratio" {
                (0.0, f64::MAX)
            } else {
                (0.0, 1.0)
            };
            if let Some(slot) = self.field_mut(name) {
                clamp_field(&symbol, name, slot, lo, hi);
            }
        }
    }
}

fn coerce(symbol: &str, key: &str, value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };

    match parsed {
        Some(v) if v.is_finite() => v,
        _ => {
            warn!(symbol, feature = key, raw = %value, "invalid feature value, using 0.0");
            0.0
        }
    }
}

fn clamp_field(symbol: &str, name: &str, slot: &mut f64, lo: f64, hi: f64) {
    if *slot < lo || *slot > hi {
        let clamped = slot.clamp(lo, hi);
        warn!(symbol, feature = name, value = *slot, clamped, "feature out of range");
        *slot = clamped;
    }
}

/// Replace a non-finite optional number with `None`, logging once.
pub fn finite_or_none(symbol: &str, field: &str, value: Option<f64>) -> Option<f64> {
    match value {
        Some(v) if !v.is_finite() => {
            warn!(symbol, field, "non-finite input treated as missing");
            None
        }
        other => other,
    }
}
