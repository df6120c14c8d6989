//! Quipu demo — scripted session against an in-process backend.
//!
//! Builds the full stack (`MemoryStore` → rate limiter → retries →
//! multiplexor → table model), edits a few entries, then prints what a
//! second client sees after a sync.
//!
//! Usage: `quipu-demo [config.json]`, where the optional file holds
//! `{"store": {...}, "table": {...}}`. Set `RUST_LOG=debug` for traces.

use log::info;
use serde::Deserialize;
use std::sync::Arc;

use quipu_store::{layered, MemoryStore, StoreConfig};
use quipu_table::{AuthController, AuthState, EntryModel, TableConfig, TableModel};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DemoConfig {
    store: StoreConfig,
    table: TableConfig,
}

fn load_config() -> Result<DemoConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)?;
            let config = serde_json::from_str(&raw)?;
            info!("loaded config from {path}");
            Ok(config)
        }
        None => Ok(DemoConfig::default()),
    }
}

fn print_entries(title: &str, entries: &[EntryModel]) {
    println!("{title}");
    for entry in entries {
        let state = if entry.is_loaded() { "" } else { " (not loaded)" };
        println!(
            "  {:<40} {:<16} {}{state}",
            entry.key(),
            entry.left(),
            entry.right()
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let config = load_config()?;
    info!("Starting Quipu demo...");

    let backend = Arc::new(MemoryStore::new());
    let auth = AuthController::new(AuthState::Loading);

    let model = TableModel::new(
        layered(Arc::clone(&backend), &config.store),
        auth.watch(),
        config.table.clone(),
    );
    model
        .subscribe(|entries, _, history| {
            info!(
                "{} visible entries (undo: {}, redo: {})",
                entries.len(),
                history.can_undo,
                history.can_redo
            );
        })
        .await;

    auth.set(AuthState::SignedIn);
    // The first sync finds an empty table and creates an entry.
    model.sync().await?;
    let sync_loop = model.start();
    let first = model.add_new_item().await?;
    let words = [("apple", "fruit"), ("quipu", "knotted cord"), ("rust", "oxide")];
    for (left, right) in words {
        let key = model.add_new_item().await?;
        if let Some(entry) = model.entry(&key).await {
            model.on_update(entry.with_left(left), false).await?;
            if let Some(entry) = model.entry(&key).await {
                model.on_update(entry.with_right(right), false).await?;
            }
        }
    }
    if let Some(entry) = model.entry(&first).await {
        model.on_update(entry.delete(), false).await?;
    }
    model.undo().await?;
    model.redo().await?;
    print_entries("local view:", &model.entries().await);

    model.store().flush_all().await?;
    model.dispose().await;
    sync_loop.await?;

    let reader = TableModel::new(
        layered(Arc::clone(&backend), &config.store),
        auth.watch(),
        config.table,
    );
    reader.sync().await?;
    print_entries("second client:", &reader.entries().await);
    println!(
        "{} logical entries stored in {} remote records",
        reader.entries().await.len(),
        backend.record_count()
    );
    Ok(())
}
