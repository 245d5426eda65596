//! Recommendation Synthesizer
//!
//! Merges the policy decision, the external classifier and derived risk and
//! timing signals into one externally consumed [`Recommendation`]. Every
//! missing input degrades to a documented default; synthesis cannot fail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{ClassifierResult, CoinData, FeatureSnapshot, MarketContext, MarketSentiment};
use crate::rl::config::RecommendationConfig;
use crate::rl::core::DiscreteAction;
use crate::rl::policy::{DecisionSource, PolicyDecision, PolicyMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    #[serde(rename = "Very High")]
    VeryHigh,
}

impl RiskLevel {
    /// Very High > 0.85, High > 0.7, Medium > 0.4, else Low
    pub fn from_score(score: f64) -> Self {
        if score > 0.85 {
            Self::VeryHigh
        } else if score > 0.7 {
            Self::High
        } else if score > 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::VeryHigh => "Very High",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    /// In [0, 1]
    pub score: f64,
    pub factors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingSignals {
    /// In [0, 1]
    pub score: f64,
    pub volume_surge: bool,
    pub strong_momentum: bool,
    pub immediate_entry: bool,
    pub dip_buy: bool,
}

/// External classifier view, or the explicit unavailable fallback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiAssessment {
    pub ai_enabled: bool,
    pub probability: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub symbol: String,
    pub action: DiscreteAction,
    pub confidence: f64,
    pub reasoning: String,
    pub risk: RiskAssessment,
    /// Percent of portfolio
    pub position_size_percent: f64,
    pub timing: TimingSignals,
    pub gem_score: f64,
    pub ai: AiAssessment,
    pub policy_mode: PolicyMode,
    pub decision_source: DecisionSource,
    pub learning_episode: u64,
    pub experience_size: usize,
    pub generated_at: DateTime<Utc>,
}

/// Everything the synthesizer looks at for one coin
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    pub coin: &'a CoinData,
    pub features: &'a FeatureSnapshot,
    pub decision: &'a PolicyDecision,
    pub classifier: Option<ClassifierResult>,
    pub market_context: Option<&'a MarketContext>,
    pub policy_mode: PolicyMode,
    pub learning_episode: u64,
    pub experience_size: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RecommendationSynthesizer {
    config: RecommendationConfig,
}

impl RecommendationSynthesizer {
    pub fn new(config: RecommendationConfig) -> Self {
        Self { config }
    }

    pub fn synthesize(&self, input: &SynthesisInput<'_>) -> Recommendation {
        let ai = self.ai_assessment(input.classifier);
        let confidence = sanitize_unit(input.decision.confidence);
        let risk = self.assess_risk(input.coin, confidence, ai.score);
        let position_size_percent = self.position_size(confidence, ai.score, risk.score);
        let timing = self.analyze_timing(input.coin, input.market_context);
        let reasoning = self.reasoning(input, &ai, &timing, confidence);

        debug!(
            symbol = %input.coin.symbol,
            action = %input.decision.action,
            confidence,
            risk = risk.score,
            size = position_size_percent,
            "recommendation synthesized"
        );

        Recommendation {
            symbol: input.coin.symbol.clone(),
            action: input.decision.action,
            confidence,
            reasoning,
            risk,
            position_size_percent,
            timing,
            gem_score: ai.score,
            ai,
            policy_mode: input.policy_mode,
            decision_source: input.decision.source,
            learning_episode: input.learning_episode,
            experience_size: input.experience_size,
            generated_at: Utc::now(),
        }
    }

    /// Classifier output when usable, otherwise the unavailable fallback
    pub fn ai_assessment(&self, classifier: Option<ClassifierResult>) -> AiAssessment {
        match classifier.and_then(ClassifierResult::validated) {
            Some(c) => AiAssessment {
                ai_enabled: true,
                probability: c.probability,
                score: c.score,
            },
            None => AiAssessment {
                ai_enabled: false,
                probability: self.config.fallback_probability,
                score: self.config.fallback_gem_score,
            },
        }
    }

    pub fn assess_risk(&self, coin: &CoinData, confidence: f64, gem_score: f64) -> RiskAssessment {
        let c = &self.config;
        let mut score = c.base_risk;
        let mut factors = Vec::new();

        // Size tier: market cap when known, else rank, else treated as smallest
        let market_cap = coin.market_cap.filter(|m| m.is_finite() && *m > 0.0);
        match (market_cap, coin.market_cap_rank) {
            (Some(cap), _) if cap < c.very_low_market_cap => {
                factors.push("Very low market cap".to_string());
                score += c.very_low_market_cap_penalty;
            }
            (Some(cap), _) if cap < c.low_market_cap => {
                factors.push("Low market cap".to_string());
                score += c.low_market_cap_penalty;
            }
            (Some(_), _) => {}
            (None, Some(rank)) if rank > c.very_low_rank_tier => {
                factors.push(format!("Market cap rank beyond {}", c.very_low_rank_tier));
                score += c.very_low_market_cap_penalty;
            }
            (None, Some(rank)) if rank > c.low_rank_tier => {
                factors.push(format!("Market cap rank beyond {}", c.low_rank_tier));
                score += c.low_market_cap_penalty;
            }
            (None, Some(_)) => {}
            (None, None) => {
                factors.push("Unknown market cap".to_string());
                score += c.very_low_market_cap_penalty;
            }
        }

        let volume = coin.volume_24h.filter(|v| v.is_finite()).unwrap_or(0.0);
        if volume < c.min_volume_24h {
            factors.push("Low liquidity".to_string());
            score += c.low_liquidity_penalty;
        }

        if confidence < c.low_confidence {
            factors.push("Low policy confidence".to_string());
            score += c.low_confidence_penalty;
        }

        if gem_score < c.low_gem_score {
            factors.push("Low gem score".to_string());
            score += c.low_gem_score_penalty;
        }

        let score = score.min(1.0);
        RiskAssessment {
            level: RiskLevel::from_score(score),
            score,
            factors,
        }
    }

    /// `clip(base * confidence * gem/100 * (1 - risk * reduction), min, max)`
    pub fn position_size(&self, confidence: f64, gem_score: f64, risk_score: f64) -> f64 {
        let c = &self.config;
        let size = c.base_position_percent
            * confidence
            * (gem_score / 100.0)
            * (1.0 - risk_score * c.risk_size_reduction);
        if size.is_finite() {
            size.clamp(c.min_position_percent, c.max_position_percent)
        } else {
            c.min_position_percent
        }
    }

    pub fn analyze_timing(&self, coin: &CoinData, context: Option<&MarketContext>) -> TimingSignals {
        let c = &self.config;
        let mut signals = TimingSignals {
            score: 0.5,
            volume_surge: false,
            strong_momentum: false,
            immediate_entry: false,
            dip_buy: false,
        };

        let surge_ratio = coin.volume_surge_ratio.filter(|v| v.is_finite()).unwrap_or(1.0);
        if surge_ratio > c.volume_surge_ratio {
            signals.volume_surge = true;
            signals.strong_momentum = true;
            signals.immediate_entry = true;
            signals.score += c.volume_surge_boost;
        }

        let change = coin.price_change_24h.filter(|v| v.is_finite()).unwrap_or(0.0);
        if change > c.momentum_change {
            signals.strong_momentum = true;
            signals.score += c.momentum_boost;
        } else if change < c.dip_change {
            signals.dip_buy = true;
            signals.score += c.dip_boost;
        }

        if let Some(ctx) = context {
            match ctx.market_sentiment {
                MarketSentiment::Bullish => signals.score += c.sentiment_adjustment,
                MarketSentiment::Bearish => signals.score -= c.sentiment_adjustment,
                MarketSentiment::Neutral => {}
            }
        }

        signals.score = signals.score.clamp(0.0, 1.0);
        signals
    }

    fn reasoning(
        &self,
        input: &SynthesisInput<'_>,
        ai: &AiAssessment,
        timing: &TimingSignals,
        confidence: f64,
    ) -> String {
        let source = match input.decision.source {
            DecisionSource::Learned => "RL agent",
            DecisionSource::Exploration => "RL agent (exploring)",
            DecisionSource::Heuristic => "Heuristic policy",
        };
        let mut parts = vec![format!(
            "{source} recommends {} (confidence: {confidence:.2})",
            input.decision.action
        )];

        let c = &self.config;
        if ai.score > c.rationale_high_gem_score {
            parts.push(format!("high gem score ({:.1})", ai.score));
        } else if ai.score < c.rationale_low_gem_score {
            parts.push(format!("low gem score ({:.1})", ai.score));
        }

        let f = input.features;
        if f.fear_opportunity_score > c.rationale_signal {
            parts.push("fear-driven opportunity".to_string());
        }
        if timing.volume_surge || f.volume_surge_anomaly > c.rationale_signal {
            parts.push("volume surge".to_string());
        }
        if f.whale_accumulation_score > c.rationale_signal {
            parts.push("whale accumulation".to_string());
        }
        if timing.dip_buy {
            parts.push("dip-buy setup".to_string());
        }
        if !ai.ai_enabled {
            parts.push("classifier unavailable".to_string());
        }
        if input.policy_mode.is_heuristic() {
            parts.push(format!("policy mode: {}", input.policy_mode));
        }

        parts.join("; ")
    }

    pub fn config(&self) -> &RecommendationConfig {
        &self.config
    }
}

fn sanitize_unit(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(action: DiscreteAction, confidence: f64) -> PolicyDecision {
        PolicyDecision::new(action, confidence, DecisionSource::Learned)
    }

    fn coin() -> CoinData {
        CoinData {
            market_cap: Some(5e8),
            volume_24h: Some(5e6),
            ..CoinData::new("ETH", 3000.0)
        }
    }

    fn synth(coin: &CoinData, d: &PolicyDecision, classifier: Option<ClassifierResult>) -> Recommendation {
        let features = FeatureSnapshot::empty(coin.symbol.clone(), Utc::now());
        RecommendationSynthesizer::default().synthesize(&SynthesisInput {
            coin,
            features: &features,
            decision: d,
            classifier,
            market_context: None,
            policy_mode: PolicyMode::Learned,
            learning_episode: 0,
            experience_size: 0,
        })
    }

    #[test]
    fn null_classifier_degrades() {
        let r = synth(&coin(), &decision(DiscreteAction::Buy, 0.8), None);
        assert!(!r.ai.ai_enabled);
        assert_eq!(r.ai.probability, 0.5);
        assert_eq!(r.gem_score, 50.0);
        assert!(r.reasoning.contains("classifier unavailable"));
    }

    #[test]
    fn invalid_classifier_degrades() {
        let bad = ClassifierResult {
            probability: f64::NAN,
            score: 80.0,
        };
        let r = synth(&coin(), &decision(DiscreteAction::Buy, 0.8), Some(bad));
        assert!(!r.ai.ai_enabled);
    }

    #[test]
    fn risk_for_large_liquid_confident_coin() {
        let s = RecommendationSynthesizer::default();
        let risk = s.assess_risk(&coin(), 0.9, 80.0);
        assert_eq!(risk.score, 0.5);
        assert_eq!(risk.level, RiskLevel::Medium);
        assert!(risk.factors.is_empty());
    }

    #[test]
    fn risk_accumulates_and_caps() {
        let s = RecommendationSynthesizer::default();
        let tiny = CoinData {
            market_cap: Some(1e6),
            volume_24h: Some(10.0),
            ..CoinData::new("TINY", 0.01)
        };
        let risk = s.assess_risk(&tiny, 0.2, 10.0);
        assert_eq!(risk.score, 1.0);
        assert_eq!(risk.level, RiskLevel::VeryHigh);
        assert_eq!(risk.factors.len(), 4);
    }

    #[test]
    fn rank_used_when_cap_unknown() {
        let s = RecommendationSynthesizer::default();
        let ranked = CoinData {
            market_cap_rank: Some(250),
            volume_24h: Some(1e7),
            ..CoinData::new("MID", 1.0)
        };
        assert!((s.assess_risk(&ranked, 0.9, 80.0).score - 0.6).abs() < 1e-12);

        let unknown = CoinData {
            volume_24h: Some(1e7),
            ..CoinData::new("UNK", 1.0)
        };
        assert!((s.assess_risk(&unknown, 0.9, 80.0).score - 0.7).abs() < 1e-12);
    }

    #[test]
    fn position_size_is_clipped() {
        let s = RecommendationSynthesizer::default();
        assert_eq!(s.position_size(0.1, 10.0, 1.0), 0.5);
        let mid = s.position_size(1.0, 100.0, 0.5);
        assert!((mid - 3.75).abs() < 1e-12);
        assert!(s.position_size(1.0, 100.0, 0.0) <= 10.0);
        assert_eq!(s.position_size(f64::NAN, 50.0, 0.5), 0.5);
    }

    #[test]
    fn timing_signals() {
        let s = RecommendationSynthesizer::default();
        let surging = CoinData {
            volume_surge_ratio: Some(4.0),
            price_change_24h: Some(12.0),
            ..coin()
        };
        let bullish = MarketContext {
            market_sentiment: MarketSentiment::Bullish,
            ..Default::default()
        };
        let t = s.analyze_timing(&surging, Some(&bullish));
        assert!(t.volume_surge && t.strong_momentum && t.immediate_entry);
        assert!(!t.dip_buy);
        assert!((t.score - 0.95).abs() < 1e-12);

        let dipping = CoinData {
            price_change_24h: Some(-8.0),
            ..coin()
        };
        let bearish = MarketContext {
            market_sentiment: MarketSentiment::Bearish,
            ..Default::default()
        };
        let t = s.analyze_timing(&dipping, Some(&bearish));
        assert!(t.dip_buy);
        assert!((t.score - 0.5).abs() < 1e-12);

        let t = s.analyze_timing(&coin(), None);
        assert_eq!(t.score, 0.5);
    }

    #[test]
    fn reasoning_names_source_and_action() {
        let r = synth(
            &coin(),
            &decision(DiscreteAction::Hold, 0.61),
            Some(ClassifierResult {
                probability: 0.9,
                score: 90.0,
            }),
        );
        assert!(r.reasoning.starts_with("RL agent recommends Hold (confidence: 0.61)"));
        assert!(r.reasoning.contains("high gem score"));
        assert!(r.ai.ai_enabled);
        assert_eq!(r.gem_score, 90.0);
    }

    #[test]
    fn reasoning_thresholds() {
        let s = RecommendationSynthesizer::default();
        let c = coin();
        let d = decision(DiscreteAction::Buy, 0.8);
        let reason = |gem: f64, signal: f64| {
            let features = FeatureSnapshot::from_values(
                "ETH",
                Utc::now(),
                [
                    ("fear_opportunity_score", signal),
                    ("volume_surge_anomaly", signal),
                    ("whale_accumulation_score", signal),
                ],
            );
            s.synthesize(&SynthesisInput {
                coin: &c,
                features: &features,
                decision: &d,
                classifier: Some(ClassifierResult {
                    probability: 0.7,
                    score: gem,
                }),
                market_context: None,
                policy_mode: PolicyMode::Learned,
                learning_episode: 0,
                experience_size: 0,
            })
            .reasoning
        };

        let quiet = reason(80.0, 0.7);
        assert!(!quiet.contains("gem score"));
        assert!(!quiet.contains("fear-driven"));
        assert!(!quiet.contains("volume surge"));
        assert!(!quiet.contains("whale"));

        let loud = reason(80.5, 0.75);
        assert!(loud.contains("high gem score (80.5)"));
        assert!(loud.contains("fear-driven opportunity"));
        assert!(loud.contains("volume surge"));
        assert!(loud.contains("whale accumulation"));

        assert!(reason(39.0, 0.0).contains("low gem score (39.0)"));
        assert!(!reason(45.0, 0.0).contains("gem score"));
    }

    #[test]
    fn risk_levels() {
        assert_eq!(RiskLevel::from_score(0.3), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.5), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.75), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.9), RiskLevel::VeryHigh);
    }
}
