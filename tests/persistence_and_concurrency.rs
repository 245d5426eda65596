use chrono::{Duration, TimeZone, Utc};
use gemscout::domain::{CoinData, FeatureSnapshot, HistoryRecord};
use gemscout::rl::config::{AgentConfig, PolicyBackend};
use gemscout::rl::integration::RealTrade;
use gemscout::{AppConfig, GemEngine, PolicyMode};
use std::path::PathBuf;
use std::sync::Arc;

fn scratch() -> PathBuf {
    std::env::temp_dir().join(format!("gemscout-it-{}", uuid::Uuid::new_v4()))
}

fn learned_config(dir: &PathBuf) -> AppConfig {
    let mut config = AppConfig::default();
    config.persistence.dir = dir.clone();
    config.rl.agent = AgentConfig {
        backend: PolicyBackend::Learned,
        hidden_layers: vec![16, 8],
        seed: Some(21),
        ..Default::default()
    };
    config
}

fn snapshot(symbol: &str, gem: f64, fear: f64, surge: f64) -> FeatureSnapshot {
    FeatureSnapshot::from_values(
        symbol,
        Utc::now(),
        [
            ("gem_score", gem),
            ("fear_opportunity_score", fear),
            ("volume_surge_anomaly", surge),
        ],
    )
}

fn train(engine: &GemEngine, steps: usize) {
    for i in 0..steps {
        let price = 5.0 + (i % 11) as f64;
        let x = (i % 10) as f64 / 10.0;
        engine.simulate_step(&CoinData::new("SOL", price), &snapshot("SOL", x * 100.0, x, 1.0 - x));
    }
}

#[test]
#[cfg(feature = "rl")]
fn save_and_load_round_trip() {
    let dir = scratch();
    let config = learned_config(&dir);

    let engine = GemEngine::new(&config).unwrap();
    train(&engine, 150);
    engine
        .record_real_outcome(&RealTrade::new("ETH", 2_000.0, 2_400.0, 14).with_confidence(0.8))
        .unwrap();
    let before = engine.status();
    assert_eq!(before.policy_mode, PolicyMode::Learned);
    engine.save().unwrap();

    let restored = GemEngine::new(&config).unwrap();
    assert_eq!(restored.status().policy_mode, PolicyMode::HeuristicFallback);
    let report = restored.load();
    assert!(report.snapshot_restored);
    assert!(report.network_restored);

    let after = restored.status();
    assert_eq!(after.policy_mode, PolicyMode::Learned);
    assert!((after.epsilon - before.epsilon).abs() < 1e-12);
    assert!((after.balance - before.balance).abs() < 1e-6);
    assert_eq!(after.learning_episodes, before.learning_episodes);
    assert_eq!(after.performance_records, before.performance_records);

    let live = restored.performance_metrics().live.expect("real trade restored");
    assert_eq!(live.live_trades_count, 1);
    assert!((live.live_average_return - 20.0).abs() < 1e-9);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn missing_network_loads_into_heuristic_fallback() {
    let dir = scratch();
    let config = learned_config(&dir);

    let engine = GemEngine::new(&config).unwrap();
    engine.record_trade_outcome("ADA", 0.5, 0.4, Utc::now() - Duration::days(3)).unwrap();
    engine.save().unwrap();

    let restored = GemEngine::open(&config).unwrap();
    assert_eq!(restored.status().policy_mode, PolicyMode::HeuristicFallback);
    assert_eq!(restored.status().performance_records, 1);

    // The fallback still answers
    let decision = restored.evaluate(&snapshot("ADA", 95.0, 0.9, 0.9));
    assert_eq!(decision.action, gemscout::rl::DiscreteAction::Buy);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn corrupt_snapshot_starts_fresh() {
    let dir = scratch();
    let config = learned_config(&dir);
    let engine = GemEngine::new(&config).unwrap();
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(engine.checkpointer().snapshot_path(), "{ truncated").unwrap();
    std::fs::write(engine.checkpointer().network_path(), "[]").unwrap();

    let report = engine.load();
    assert!(!report.snapshot_restored);
    assert!(!report.network_restored);
    let status = engine.status();
    assert_eq!(status.performance_records, 0);
    assert_eq!(status.epsilon, 1.0);
    assert_eq!(status.balance, 10_000.0);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
#[cfg(feature = "rl")]
fn evaluate_runs_alongside_learning() {
    let dir = scratch();
    let engine = Arc::new(GemEngine::new(&learned_config(&dir)).unwrap());

    std::thread::scope(|scope| {
        let learner = Arc::clone(&engine);
        scope.spawn(move || train(&learner, 400));

        for _ in 0..4 {
            let reader = Arc::clone(&engine);
            scope.spawn(move || {
                for i in 0..500 {
                    let x = (i % 10) as f64 / 10.0;
                    let decision = reader.evaluate(&snapshot("BTC", x * 100.0, x, x));
                    assert!((0.0..=1.0).contains(&decision.confidence));
                }
            });
        }
    });

    let status = engine.status();
    assert!(status.learning_updates > 0);
    assert!(status.policy_version >= status.learning_updates);
}

fn record(symbol: &str, day: i64, price: f64, gem: f64, signal: f64) -> HistoryRecord {
    let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    serde_json::from_value(serde_json::json!({
        "symbol": symbol,
        "price": price,
        "timestamp": (t0 + Duration::days(day)).to_rfc3339(),
        "market_cap": 5.0e8,
        "volume_24h": 2.0e7,
        "gem_score": gem,
        "fear_opportunity_score": signal,
        "volume_surge_anomaly": signal
    }))
    .unwrap()
}

#[test]
fn history_replay_closes_at_same_symbol_lookback() {
    let mut config = AppConfig::default();
    config.persistence.dir = scratch();
    config.rl.agent.backend = PolicyBackend::Heuristic;
    let engine = GemEngine::new(&config).unwrap();

    let mut records = Vec::new();
    for day in 0..6 {
        records.push(record("GEM", day, 1.0 + day as f64, 90.0, 0.9));
        records.push(record("DUD", day, 10.0, 5.0, 0.05));
    }
    // Unsorted input is ordered by timestamp first
    records.reverse();

    let summary = engine.train_from_history(records, 2).unwrap();
    assert_eq!(summary.records_processed, 10);
    assert_eq!(summary.total_trades, 4);
    assert_eq!(summary.trades.len(), 4);
    assert_eq!(summary.winning_trades, 4);
    assert_eq!(summary.win_rate, 1.0);
    assert_eq!(summary.max_drawdown, 0.0);
    assert!(summary.return_std > 0.0);

    for trade in &summary.trades {
        assert_eq!(trade.symbol, "GEM");
        assert!(trade.confidence > 0.6);
        assert_eq!(trade.holding_days, 2);
        assert!((trade.exit_price - trade.entry_price - 2.0).abs() < 1e-9);
    }
    assert!((summary.trades[0].profit_loss_percent - 200.0).abs() < 1e-9);
    assert_eq!(summary.learning_progress.len(), 1);
    assert_eq!(summary.learning_progress[0].record_index, 0);

    let metrics = engine.performance_metrics();
    assert_eq!(metrics.total_trades, 4);
    assert!(metrics.live.is_none());
}
