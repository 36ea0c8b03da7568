//! Shared fixtures for the integration tests

#![allow(dead_code)]

use crab_master::persist::{Catalog, CatalogItem, ItemKind, Settings, files, save};
use crab_master::{Config, Control, RemoteListener, Scheduler, TickOutcome};
use rust_decimal::Decimal;
use std::path::Path;
use tokio::task::JoinHandle;

/// Config rooted in `dir` with short socket waits
pub fn test_config(dir: &Path, network: bool) -> Config {
    let mut config = Config::with_overrides(dir, 0);
    config.network_enabled = network;
    config.poll_wait_ms = 10;
    config.connection_retry_limit = 200;
    config.license_terminals = 4;
    config.display = ":0".into();
    config.restart_command = None;
    config.eod_hook = None;
    config.purge = false;
    config
}

pub fn write_catalog(dir: &Path) {
    let catalog = Catalog {
        items: vec![
            CatalogItem {
                code: "PZ1".into(),
                call_center_code: Some("100".into()),
                name: "Pizza Margherita".into(),
                family: "Pizza".into(),
                price: Decimal::new(1000, 2),
                kind: ItemKind::Item,
            },
            CatalogItem {
                code: "OL".into(),
                call_center_code: None,
                name: "Olives".into(),
                family: "Toppings".into(),
                price: Decimal::new(100, 2),
                kind: ItemKind::Modifier,
            },
        ],
    };
    save(&dir.join(files::CATALOG), &catalog).unwrap();
}

pub fn write_settings(dir: &Path, settings: &Settings) {
    save(&dir.join(files::SETTINGS), settings).unwrap();
}

pub async fn start_with(config: Config) -> Scheduler {
    let listener = RemoteListener::bind(&config).await.unwrap();
    let ctl = Control::start(config).unwrap();
    Scheduler::new(ctl, listener)
}

pub async fn start(dir: &Path, network: bool) -> Scheduler {
    start_with(test_config(dir, network)).await
}

/// Tick until the client task finishes
pub async fn tick_until_done<T>(sched: &mut Scheduler, client: JoinHandle<T>) -> T {
    for _ in 0..500 {
        if client.is_finished() {
            break;
        }
        assert_eq!(sched.tick().await, TickOutcome::Continue);
        tokio::task::yield_now().await;
    }
    assert!(client.is_finished(), "client did not finish");
    client.await.unwrap()
}
