use chrono::{Duration, TimeZone, Utc};
use gemscout::domain::{AnalysisRequest, CoinData, FeatureSnapshot};
use gemscout::rl::config::{AgentConfig, EnvConfig, PolicyBackend, RewardConfig};
use gemscout::rl::core::{CloseRewardFunction, CloseTransition, DiscreteAction, RewardFunction, TradingAction};
use gemscout::rl::environment::{Rejection, Termination, TradingEnvironment};
use gemscout::rl::memory::{ReplayBuffer, Transition};
use gemscout::{AppConfig, GemEngine};

fn env() -> TradingEnvironment {
    TradingEnvironment::new(EnvConfig::default(), RewardConfig::default())
}

fn features(symbol: &str, gem_score: f64) -> FeatureSnapshot {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    FeatureSnapshot::from_values(symbol, t0, [("gem_score", gem_score)])
}

/// BUY BTC @ 50000 (conf 0.8), SELL @ 55000 ten days later.
#[test]
fn btc_round_trip_scenario() {
    let mut env = env();
    let snap = features("BTC", 75.0);

    let buy = env.step(&TradingAction::new(DiscreteAction::Buy, 0.8, 50_000.0, snap.clone()));
    assert!(buy.info.rejection.is_none());
    assert!((buy.state.balance - 9_500.0).abs() < 1e-9);
    let position = buy.state.position("BTC").expect("position opened");
    assert!((position.quantity - 0.01).abs() < 1e-12);

    let sell_time = snap.timestamp + Duration::days(10);
    let sell = env.step(
        &TradingAction::new(DiscreteAction::Sell, 0.8, 55_000.0, snap).at(sell_time),
    );
    let trade = sell.info.trade.expect("position closed");

    assert!((trade.profit_loss_percent - 10.0).abs() < 1e-9);
    assert_eq!(trade.holding_days, 10);
    assert!((trade.reward - 0.3946).abs() < 1e-3, "reward {}", trade.reward);
    assert!((sell.state.balance - 10_050.0).abs() < 1e-9);
    assert!(sell.state.positions.is_empty());
}

#[test]
fn profit_loss_matches_prices() {
    for (p1, p2) in [(100.0, 150.0), (2.5, 1.0), (0.0031, 0.0047), (40_000.0, 40_000.0)] {
        let mut env = env();
        let snap = features("X", 60.0);
        env.step(&TradingAction::new(DiscreteAction::Buy, 0.5, p1, snap.clone()));
        let result = env.step(&TradingAction::new(DiscreteAction::Sell, 0.5, p2, snap));
        let trade = result.info.trade.expect("closed");
        let expected = (p2 - p1) / p1 * 100.0;
        assert!((trade.profit_loss_percent - expected).abs() < 1e-9);
    }
}

#[test]
fn close_reward_is_bounded() {
    let reward_fn = CloseRewardFunction::new();
    for pl in [-100.0, -50.0, -1.0, 0.0, 3.0, 75.0, 500.0, 1e6] {
        for days in [0, 1, 30, 365, 5_000] {
            for confidence in [0.0, 0.2, 0.5, 0.9, 1.0] {
                let signal = reward_fn.compute(&CloseTransition {
                    profit_loss_percent: pl,
                    holding_days: days,
                    confidence,
                });
                assert!(
                    (-2.0..=2.0).contains(&signal.total),
                    "pl={pl} days={days} conf={confidence} -> {}",
                    signal.total
                );
            }
        }
    }
}

#[test]
fn sell_without_position_is_penalized_and_harmless() {
    let mut env = env();
    env.step(&TradingAction::new(DiscreteAction::Buy, 0.9, 10.0, features("ETH", 80.0)));
    let before = env.state().clone();

    let result = env.step(&TradingAction::new(DiscreteAction::Sell, 0.9, 10.0, features("DOGE", 80.0)));
    assert_eq!(result.reward, -0.5);
    assert_eq!(result.info.rejection, Some(Rejection::NoPosition));
    assert_eq!(result.state.balance.to_bits(), before.balance.to_bits());
    assert_eq!(result.state.positions, before.positions);
}

#[test]
fn undersized_buy_creates_no_position() {
    let mut env = env();
    // 0.05 * 0.1 = 0.005 of balance, below the 0.01 minimum
    let result = env.step(&TradingAction::new(DiscreteAction::Buy, 0.05, 10.0, features("ADA", 80.0)));
    assert_eq!(result.reward, -0.1);
    assert_eq!(result.info.rejection, Some(Rejection::UndersizedBuy));
    assert!(result.state.positions.is_empty());
    assert_eq!(result.state.balance, 10_000.0);
}

#[test]
fn episode_always_ends_by_step_limit() {
    let mut env = env();
    let snap = features("BTC", 65.0);
    let mut last = None;
    for step in 1..=1000u64 {
        let result = env.step(&TradingAction::new(DiscreteAction::Hold, 0.5, 100.0, snap.clone()));
        if step < 1000 {
            assert!(!result.done, "ended early at {step}");
        }
        last = Some(result);
    }
    let last = last.expect("ran");
    assert!(last.done && last.truncated);
    assert_eq!(last.info.termination, Some(Termination::TimeLimit));
}

#[test]
fn episode_ends_when_portfolio_doubles() {
    let mut env = env();
    let snap = features("MOON", 90.0);

    // 5% of 10_000 buys 500 units at 1.0
    let buy = env.step(&TradingAction::new(DiscreteAction::Buy, 1.0, 1.0, snap.clone()));
    assert!(!buy.done);

    let sell = env.step(&TradingAction::new(DiscreteAction::Sell, 1.0, 100.0, snap));
    assert!(sell.done);
    assert!(!sell.truncated);
    assert_eq!(sell.info.termination, Some(Termination::TargetReached));
    assert!((sell.state.balance - 59_500.0).abs() < 1e-6);
    assert!(sell.state.portfolio_value() > 2.0 * 10_000.0);
}

#[test]
fn replay_buffer_evicts_oldest_first() {
    let capacity = 5;
    let mut buffer = ReplayBuffer::new(capacity);
    for i in 0..=capacity {
        buffer.push(Transition::terminal(vec![i as f64], DiscreteAction::Hold, i as f64));
    }
    assert_eq!(buffer.len(), capacity);
    let rewards: Vec<f64> = buffer.iter().map(|t| t.reward).collect();
    assert_eq!(rewards, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
}

#[test]
#[cfg(feature = "rl")]
fn epsilon_tracks_learning_steps() {
    let mut config = AppConfig::default();
    config.persistence.dir = std::env::temp_dir().join(format!("gemscout-eps-{}", uuid::Uuid::new_v4()));
    config.rl.agent = AgentConfig {
        hidden_layers: vec![16, 8],
        seed: Some(5),
        ..Default::default()
    };
    let engine = GemEngine::new(&config).unwrap();

    for i in 0..300 {
        let price = 10.0 + (i % 7) as f64;
        engine.simulate_step(&CoinData::new("SOL", price), &features("SOL", (i % 100) as f64));
    }

    let status = engine.status();
    assert!(status.learning_updates > 0);
    let expected = 0.995f64.powi(status.learning_updates as i32).max(0.01);
    assert!((status.epsilon - expected).abs() < 1e-9);
}

#[test]
fn null_classifier_never_fails() {
    let mut config = AppConfig::default();
    config.rl.agent.backend = PolicyBackend::Heuristic;
    config.rl.training.learning_enabled = false;
    let engine = GemEngine::new(&config).unwrap();

    let request: AnalysisRequest = serde_json::from_value(serde_json::json!({
        "coin": { "symbol": "PEPE", "price": 0.000001 },
        "features": { "gem_score": "bad", "fear_opportunity_score": null },
        "classifier": null
    }))
    .unwrap();

    let recommendation = engine.analyze(&request);
    assert!(!recommendation.ai.ai_enabled);
    assert_eq!(recommendation.ai.probability, 0.5);
    assert_eq!(recommendation.gem_score, 50.0);
    assert!(recommendation.position_size_percent >= 0.5 && recommendation.position_size_percent <= 10.0);
    assert!(recommendation.reasoning.contains("recommends"));
}
