//! End-to-end tests for the aggregation engine
//!
//! Exercise the full path: ingest over the engine facade, background
//! refresh, snapshot queries, and bulk reset.

use carbon_gateway::domain::{Granularity, SensorPayload};
use carbon_gateway::infra::{Config, Metrics};
use carbon_gateway::services::{run_refresher, CarbonEngine};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;

fn payload(time: i64, shred: f64, heat: f64, mould: f64) -> SensorPayload {
    SensorPayload {
        time,
        current_a: 0.3,
        temp_c: 32.0,
        pressure: 50.0,
        co2_shred: shred,
        co2_heating: heat,
        co2_mould: mould,
        co2_total: None,
    }
}

fn engine_in(dir: &TempDir) -> Arc<CarbonEngine> {
    let path = dir.path().join("sensor_data.csv");
    let content = format!("[log]\nfile = \"{}\"\n", path.display());
    let config_path = dir.path().join("test.toml");
    std::fs::write(&config_path, content).unwrap();
    let config = Config::from_file(&config_path).unwrap();
    Arc::new(CarbonEngine::new(&config, Arc::new(Metrics::new())))
}

#[test]
fn test_minute_scenario_two_buckets() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir);

    engine.ingest(&payload(1_700_000_000, 0.001, 0.002, 0.0005)).unwrap();
    engine.ingest(&payload(1_700_000_030, 0.002, 0.001, 0.0)).unwrap();
    engine.ingest(&payload(1_700_000_090, 0.0, 0.0, 0.001)).unwrap();

    engine.refresh().unwrap();

    let snapshot = engine.query(Granularity::Minute);
    assert_eq!(snapshot.buckets.len(), 2);

    // First minute: 0.0045 kg = 4500 mg; second minute: 0.001 kg = 1000 mg
    assert!(snapshot.buckets[0].bucket < snapshot.buckets[1].bucket);
    assert!((snapshot.buckets[0].total_kg() * 1e6 - 4500.0).abs() < 1e-6);
    assert!((snapshot.buckets[1].total_kg() * 1e6 - 1000.0).abs() < 1e-6);
}

#[test]
fn test_hourly_scenario_single_bucket() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir);

    engine.ingest(&payload(1_700_000_000, 0.001, 0.002, 0.0005)).unwrap();
    engine.ingest(&payload(1_700_000_090, 0.0, 0.0, 0.001)).unwrap();
    engine.refresh().unwrap();

    let snapshot = engine.query(Granularity::Hour);
    assert_eq!(snapshot.buckets.len(), 1);
    assert!((snapshot.buckets[0].total_kg() - 0.0045).abs() < 1e-12);
}

#[test]
fn test_reset_scenario() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir);

    engine.ingest(&payload(1_700_000_000, 0.001, 0.0, 0.0)).unwrap();
    engine.refresh().unwrap();
    assert!(!engine.query(Granularity::Minute).buckets.is_empty());

    engine.reset().unwrap();

    assert!(engine.log().replay().unwrap().is_empty());
    assert!(engine.query(Granularity::Minute).buckets.is_empty());
    assert!(engine.query(Granularity::Hour).buckets.is_empty());
}

#[test]
fn test_incremental_batches_equal_full_recompute() {
    let dir_a = TempDir::new().unwrap();
    let incremental = engine_in(&dir_a);
    let dir_b = TempDir::new().unwrap();
    let full = engine_in(&dir_b);

    let batches: Vec<Vec<SensorPayload>> = vec![
        vec![payload(1_700_000_000, 0.001, 0.002, 0.0005)],
        vec![payload(1_700_000_030, 0.002, 0.001, 0.0), payload(1_700_000_090, 0.0, 0.0, 0.001)],
        vec![payload(1_700_003_700, 0.004, 0.0, 0.0)],
    ];

    // Incremental: refresh after every batch
    for batch in &batches {
        for p in batch {
            incremental.ingest(p).unwrap();
        }
        incremental.refresh().unwrap();
    }

    // Full: ingest everything, one refresh
    for p in batches.iter().flatten() {
        full.ingest(p).unwrap();
    }
    full.refresh().unwrap();

    for granularity in [Granularity::Minute, Granularity::Hour] {
        let a = incremental.query(granularity);
        let b = full.query(granularity);
        assert_eq!(a.buckets, b.buckets, "{} snapshots diverge", granularity.as_str());
    }
}

#[test]
fn test_concurrent_ingest_is_complete() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir);

    let mut handles = Vec::new();
    for writer in 0..4 {
        let engine = engine.clone();
        handles.push(std::thread::spawn(move || {
            for i in 0..50 {
                let ts = 1_700_000_000 + writer * 1000 + i;
                engine.ingest(&payload(ts, 0.001, 0.0, 0.0)).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // Every append is a complete row: all 200 entries replay cleanly
    assert_eq!(engine.log().replay().unwrap().len(), 200);
}

#[test]
fn test_reset_racing_refresh_never_resurrects_data() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir);

    for i in 0..500 {
        engine.ingest(&payload(1_700_000_000 + i * 60, 0.001, 0.0, 0.0)).unwrap();
    }
    engine.refresh().unwrap();

    // Hammer refresh from a second thread while the reset lands
    let refresher = {
        let engine = engine.clone();
        std::thread::spawn(move || {
            for _ in 0..50 {
                engine.refresh().unwrap();
            }
        })
    };
    std::thread::sleep(Duration::from_millis(1));
    engine.reset().unwrap();
    refresher.join().unwrap();

    // The cleared log must win: no refresh may republish pre-reset data
    assert!(engine.log().replay().unwrap().is_empty());
    assert!(engine.query(Granularity::Minute).buckets.is_empty());
    assert!(engine.query(Granularity::Hour).buckets.is_empty());
}

#[tokio::test]
async fn test_background_refresh_reflects_readings_within_a_period() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir);

    engine.ingest(&payload(1_700_000_000, 0.001, 0.002, 0.0005)).unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(run_refresher(engine.clone(), 1, shutdown_rx));

    let mut refreshed = false;
    for _ in 0..100 {
        if !engine.query(Granularity::Minute).buckets.is_empty() {
            refreshed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(refreshed, "reading not reflected within the refresh period");

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}
