//! Market inputs consumed by the engine: coin quotes, market context, the
//! external gem classifier's output and historical records.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::io::Read;
use tracing::{debug, warn};

use super::features::{finite_or_none, FeatureSnapshot};
use crate::error::{GemError, Result};

/// Point-in-time market data for one coin
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoinData {
    pub symbol: String,
    pub price: f64,
    pub market_cap: Option<f64>,
    pub market_cap_rank: Option<u32>,
    pub volume_24h: Option<f64>,
    /// Percent change over 24h
    pub price_change_24h: Option<f64>,
    /// Current volume over the expected volume for the rank
    pub volume_surge_ratio: Option<f64>,
}

impl CoinData {
    pub fn new(symbol: impl Into<String>, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            ..Default::default()
        }
    }

    /// Drop non-finite optional fields so later stages see "missing"
    pub fn sanitized(mut self) -> Self {
        let symbol = self.symbol.clone();
        self.market_cap = finite_or_none(&symbol, "market_cap", self.market_cap);
        self.volume_24h = finite_or_none(&symbol, "volume_24h", self.volume_24h);
        self.price_change_24h = finite_or_none(&symbol, "price_change_24h", self.price_change_24h);
        self.volume_surge_ratio =
            finite_or_none(&symbol, "volume_surge_ratio", self.volume_surge_ratio);
        if !self.price.is_finite() {
            warn!(symbol = %symbol, "non-finite price treated as 0");
            self.price = 0.0;
        }
        self
    }

    /// Whether the price can be traded against
    pub fn has_valid_price(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }
}

/// Broad market mood
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketSentiment {
    Bullish,
    #[default]
    Neutral,
    Bearish,
}

/// Market-wide context for a recommendation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketContext {
    pub total_market_cap: Option<f64>,
    pub market_sentiment: MarketSentiment,
    pub btc_dominance_percent: Option<f64>,
}

/// Output of the external supervised gem classifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierResult {
    /// Probability the asset is a hidden gem
    pub probability: f64,
    /// Same estimate on the 0-100 gem score scale
    pub score: f64,
}

impl ClassifierResult {
    /// `None` when the classifier produced something unusable
    pub fn validated(self) -> Option<Self> {
        let ok = self.probability.is_finite()
            && (0.0..=1.0).contains(&self.probability)
            && self.score.is_finite()
            && (0.0..=100.0).contains(&self.score);
        if ok {
            Some(self)
        } else {
            warn!(
                probability = self.probability,
                score = self.score,
                "classifier output out of range, treating as unavailable"
            );
            None
        }
    }
}

/// Everything the engine needs to score one coin
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisRequest {
    pub coin: CoinData,
    #[serde(default)]
    pub features: HashMap<String, Value>,
    #[serde(default)]
    pub market_context: Option<MarketContext>,
    #[serde(default)]
    pub classifier: Option<ClassifierResult>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl AnalysisRequest {
    /// Validate the raw feature bag into a snapshot
    pub fn snapshot(&self) -> FeatureSnapshot {
        let timestamp = self.timestamp.unwrap_or_else(Utc::now);
        FeatureSnapshot::from_raw(self.coin.symbol.clone(), timestamp, &self.features)
    }
}

/// One historical observation used to replay the strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub market_cap_rank: Option<u32>,
    #[serde(default)]
    pub volume_24h: Option<f64>,
    #[serde(default)]
    pub price_change_24h: Option<f64>,
    #[serde(default)]
    pub volume_surge_ratio: Option<f64>,
    #[serde(default)]
    pub classifier: Option<ClassifierResult>,
    /// Remaining columns are treated as raw features
    #[serde(flatten)]
    pub features: HashMap<String, Value>,
}

impl HistoryRecord {
    pub fn coin(&self) -> CoinData {
        CoinData {
            symbol: self.symbol.clone(),
            price: self.price,
            market_cap: self.market_cap,
            market_cap_rank: self.market_cap_rank,
            volume_24h: self.volume_24h,
            price_change_24h: self.price_change_24h,
            volume_surge_ratio: self.volume_surge_ratio,
        }
        .sanitized()
    }

    pub fn snapshot(&self) -> FeatureSnapshot {
        FeatureSnapshot::from_raw(self.symbol.clone(), self.timestamp, &self.features)
    }
}

/// Parse history rows from CSV with a header line.
///
/// `close` stands in for a missing `price` and `volume` for `volume_24h`.
/// A missing symbol becomes `UNKNOWN` and a missing timestamp the time of
/// reading. Every other column is kept as a raw feature.
pub fn read_history_csv<R: Read>(reader: R) -> Result<Vec<HistoryRecord>> {
    let mut table = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = table.headers()?.clone();
    let read_at = Utc::now();

    let mut records = Vec::new();
    for (idx, row) in table.records().enumerate() {
        let row = row?;
        let mut fields = Map::new();
        for (name, raw) in headers.iter().zip(row.iter()) {
            if !raw.is_empty() {
                fields.insert(name.to_string(), cell_value(raw));
            }
        }

        for (alias, field) in [("close", "price"), ("volume", "volume_24h")] {
            if !fields.contains_key(field) {
                if let Some(value) = fields.get(alias).cloned() {
                    fields.insert(field.to_string(), value);
                }
            }
        }
        fields
            .entry("symbol")
            .or_insert_with(|| Value::String("UNKNOWN".to_string()));
        fields
            .entry("price")
            .or_insert_with(|| Value::Number(Number::from(0)));

        let timestamp = match fields.get("timestamp") {
            Some(Value::String(text)) => parse_timestamp(text),
            Some(Value::Number(n)) => n.as_i64().and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
            _ => Some(read_at),
        };
        let timestamp = timestamp.ok_or_else(|| {
            GemError::Validation(format!("csv row {}: unreadable timestamp", idx + 1))
        })?;
        fields.insert("timestamp".to_string(), Value::String(timestamp.to_rfc3339()));

        let record: HistoryRecord = serde_json::from_value(Value::Object(fields))
            .map_err(|e| GemError::Validation(format!("csv row {}: {e}", idx + 1)))?;
        records.push(record);
    }

    debug!(rows = records.len(), "history csv parsed");
    Ok(records)
}

fn cell_value(raw: &str) -> Value {
    if let Ok(int) = raw.parse::<i64>() {
        return Value::Number(Number::from(int));
    }
    match raw.parse::<f64>().ok().and_then(Number::from_f64) {
        Some(number) => Value::Number(number),
        None => Value::String(raw.to_string()),
    }
}

/// RFC 3339, `YYYY-MM-DD HH:MM:SS` or a bare date, all read as UTC
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifier_out_of_range_is_unavailable() {
        let bad = ClassifierResult {
            probability: 1.4,
            score: 140.0,
        };
        assert!(bad.validated().is_none());

        let nan = ClassifierResult {
            probability: f64::NAN,
            score: 50.0,
        };
        assert!(nan.validated().is_none());

        let good = ClassifierResult {
            probability: 0.82,
            score: 82.0,
        };
        assert_eq!(good.validated(), Some(good));
    }

    #[test]
    fn history_record_collects_extra_columns_as_features() {
        let record: HistoryRecord = serde_json::from_value(json!({
            "symbol": "BTC",
            "price": 50000.0,
            "timestamp": "2024-01-01T00:00:00Z",
            "volume_24h": 1.5e9,
            "gem_score": 77.0,
            "fear_opportunity_score": 0.4
        }))
        .unwrap();

        let snap = record.snapshot();
        assert_eq!(snap.gem_score, 77.0);
        assert_eq!(snap.fear_opportunity_score, 0.4);
        assert_eq!(record.coin().volume_24h, Some(1.5e9));
    }

    #[test]
    fn history_csv_maps_aliases_and_keeps_extra_columns() {
        let data = "symbol,close,volume,market_cap_rank,timestamp,gem_score,whale_accumulation_score,note\n\
                    SOL,101.5,2500000,5,2024-02-01,88,0.8,breakout\n\
                    ,0.25,,,2024-02-02 12:30:00,,,\n";
        let records = read_history_csv(data.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);

        let sol = &records[0];
        assert_eq!(sol.symbol, "SOL");
        assert_eq!(sol.price, 101.5);
        assert_eq!(sol.volume_24h, Some(2_500_000.0));
        assert_eq!(sol.market_cap_rank, Some(5));
        assert_eq!(sol.timestamp, Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        let snap = sol.snapshot();
        assert_eq!(snap.gem_score, 88.0);
        assert_eq!(snap.whale_accumulation_score, 0.8);
        assert_eq!(sol.features.get("note"), Some(&json!("breakout")));

        let bare = &records[1];
        assert_eq!(bare.symbol, "UNKNOWN");
        assert_eq!(bare.price, 0.25);
        assert!(bare.volume_24h.is_none());
        assert_eq!(bare.timestamp, Utc.with_ymd_and_hms(2024, 2, 2, 12, 30, 0).unwrap());
    }

    #[test]
    fn history_csv_rejects_bad_timestamp() {
        let data = "symbol,price,timestamp\nBTC,1.0,yesterday\n";
        assert!(matches!(
            read_history_csv(data.as_bytes()),
            Err(GemError::Validation(_))
        ));
    }

    #[test]
    fn sentiment_parses_lowercase() {
        let ctx: MarketContext =
            serde_json::from_value(json!({"market_sentiment": "bearish"})).unwrap();
        assert_eq!(ctx.market_sentiment, MarketSentiment::Bearish);
        assert!(ctx.total_market_cap.is_none());
    }

    #[test]
    fn sanitized_drops_non_finite_inputs() {
        let coin = CoinData {
            volume_24h: Some(f64::NAN),
            price: f64::INFINITY,
            ..CoinData::new("XRP", 1.0)
        }
        .sanitized();
        assert!(coin.volume_24h.is_none());
        assert!(!coin.has_valid_price());
    }
}
