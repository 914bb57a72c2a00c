//! Save sync integration tests
//!
//! End-to-end tests of the save store over the local sled backend: restart
//! persistence, compression, debouncing and backup transfer.

use savestore::codec::COMPRESSION_TAG;
use savestore::{
    CompressionConfig, FlushOutcome, KvConfig, LocalBackend, SaveConfig, SaveStore,
    SchedulerState, SyncEvent,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn game_config() -> SaveConfig {
    SaveConfig::new()
        .default_value("coins", 0)
        .default_value("level", 1)
        .default_value("skins", json!(["basic"]))
        .reserved_keys(["platform"])
}

fn open_local(dir: &TempDir) -> LocalBackend {
    // No background flush interval: every batch is flushed to disk
    LocalBackend::open(KvConfig::new(dir.path().join("saves.db")).flush_every_ms(None)).unwrap()
}

/// Progress written in one session is there after a restart
#[tokio::test]
async fn test_progress_survives_restart() {
    init_logging();
    let dir = TempDir::new().unwrap();

    // Phase 1: play and save
    {
        let store = SaveStore::open(game_config(), Arc::new(open_local(&dir))).await;
        assert!(store.data_loaded());
        assert_eq!(store.get("coins").await, Some(json!(0)));
        assert_eq!(store.get("skins").await, Some(json!(["basic"])));

        store.set("coins", 150).unwrap();
        store.set("skins", json!(["basic", "gold"])).unwrap();
        store.set("bestTime", 42.5).unwrap();

        let outcome = store.save_now().await.unwrap();
        assert_eq!(outcome, FlushOutcome::Written { entries: 4 });
    }

    // Phase 2: restart and verify
    {
        let store = SaveStore::open(game_config(), Arc::new(open_local(&dir))).await;

        assert_eq!(store.get("coins").await, Some(json!(150)));
        assert_eq!(store.get("level").await, Some(json!(1)));
        assert_eq!(store.get("skins").await, Some(json!(["basic", "gold"])));
        assert_eq!(store.get("bestTime").await, Some(json!(42.5)));
        assert_eq!(store.keys(), vec!["coins", "level", "skins", "bestTime"]);

        // Committed starts empty after a restart, so the first flush rewrites everything
        assert_eq!(store.save_now().await.unwrap(), FlushOutcome::Written { entries: 4 });
        assert_eq!(store.save_now().await.unwrap(), FlushOutcome::Unchanged);
    }
}

/// Compressed payloads are stored tagged and read back transparently
#[tokio::test]
async fn test_compressed_saves_survive_restart() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let config = game_config().compression(CompressionConfig::enabled(10));
    let level_map = "#".repeat(500);

    {
        let backend = open_local(&dir);
        let store = SaveStore::open(config.clone(), Arc::new(backend.clone())).await;
        store.set("map", level_map.clone()).unwrap();
        store.save_now().await.unwrap();

        let stored = backend.kv().get("DataPromap").unwrap().unwrap();
        assert!(stored.starts_with(COMPRESSION_TAG));
        assert!(stored.len() < level_map.len());
        // Memory holds the plain value
        assert!(!store.is_compressed("map").await);
    }

    {
        let store = SaveStore::open(config, Arc::new(open_local(&dir))).await;
        assert_eq!(store.get("map").await, Some(json!(level_map)));
    }
}

/// A burst of save requests collapses into one write after the quiet period
#[tokio::test(start_paused = true)]
async fn test_debounced_burst_writes_once() {
    init_logging();
    let backend = LocalBackend::in_memory().unwrap();
    let store = SaveStore::open(game_config(), Arc::new(backend.clone())).await;
    let mut events = store.subscribe();

    // First request flushes at once and arms the timer
    store.save().await;
    assert!(matches!(events.try_recv().unwrap(), SyncEvent::Flushed { .. }));
    assert!(matches!(store.scheduler_state(), SchedulerState::Armed { .. }));

    for coins in 1..=10 {
        store.set("coins", coins).unwrap();
        store.save().await;
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    assert!(events.try_recv().is_err());
    assert_eq!(backend.kv().get("DataProcoins").unwrap(), Some("0".to_string()));

    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(matches!(events.try_recv().unwrap(), SyncEvent::Flushed { .. }));
    assert!(events.try_recv().is_err());
    assert_eq!(backend.kv().get("DataProcoins").unwrap(), Some("10".to_string()));
    assert_eq!(store.scheduler_state(), SchedulerState::Idle);
}

/// Saves exported on one device import cleanly on another
#[tokio::test]
async fn test_export_import_between_devices() {
    init_logging();
    let source = SaveStore::open(game_config(), Arc::new(LocalBackend::in_memory().unwrap())).await;
    source.set("coins", 999).unwrap();
    source.set("skins", json!(["basic", "neon"])).unwrap();

    let backup = serde_json::to_string_pretty(&source.export_all().await).unwrap();

    let target_backend = LocalBackend::in_memory().unwrap();
    let target = SaveStore::open(game_config(), Arc::new(target_backend.clone())).await;
    let report = target.import_str(&backup).await.unwrap();

    assert_eq!(report.imported, 3);
    assert_eq!(report.skipped, 0);
    assert!(report.flushed);
    assert_eq!(target.get("coins").await, Some(json!(999)));
    assert_eq!(
        target_backend.kv().get("DataProskins").unwrap(),
        Some("[\"basic\",\"neon\"]".to_string())
    );

    let stats = target.stats().await;
    assert_eq!(stats.total_saves, 3);
    assert!(stats.last_save.is_some());
}

/// Clearing saves resets values and keeps the keys tracked
#[tokio::test]
async fn test_clear_all_then_restart() {
    init_logging();
    let dir = TempDir::new().unwrap();

    {
        let store = SaveStore::open(game_config(), Arc::new(open_local(&dir))).await;
        store.set("coins", 500).unwrap();
        store.save_now().await.unwrap();
        assert_eq!(store.clear_all().await.unwrap(), 3);
    }

    {
        let store = SaveStore::open(game_config(), Arc::new(open_local(&dir))).await;
        assert_eq!(store.get("coins").await, Some(json!(0)));
    }
}
