//! Table model over the full storage stack and an in-memory backend.

use quipu_store::{layered, LayeredStore, MemoryStore, StoreConfig};
use quipu_table::{AuthController, AuthState, EntryModel, TableConfig, TableModel};
use std::sync::{Arc, Mutex};
use tokio::time::Duration;

type Model = TableModel<LayeredStore<Arc<MemoryStore>>>;

fn client(backend: &Arc<MemoryStore>, auth: &AuthController) -> Model {
    let store = layered(Arc::clone(backend), &StoreConfig::for_testing());
    TableModel::new(store, auth.watch(), TableConfig::for_testing())
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(1500)).await;
}

fn keys(entries: &[EntryModel]) -> Vec<String> {
    entries.iter().map(|e| e.key().to_string()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_add_delete_reuse_scenario() {
    let backend = Arc::new(MemoryStore::new());
    let auth = AuthController::new(AuthState::SignedIn);
    let model = client(&backend, &auth);

    model.sync().await.unwrap();
    model.add_new_item().await.unwrap();
    model.add_new_item().await.unwrap();
    let entries = model.entries().await;
    assert_eq!(entries.len(), 3);

    // Deleting below the top leaves no reusable vacancy.
    let middle = entries[1].key().to_string();
    model.on_update(entries[1].delete(), false).await.unwrap();
    assert_eq!(model.entries().await.len(), 2);
    let fresh = model.add_new_item().await.unwrap();
    assert_ne!(fresh, middle);
    assert_eq!(model.entries().await.len(), 3);

    // Deleting the top entry makes the next add reuse its key.
    let top = model.entries().await.remove(0);
    assert_eq!(top.key(), fresh);
    model.on_update(top.delete(), false).await.unwrap();
    assert_eq!(model.add_new_item().await.unwrap(), fresh);

    let visible = model.entries().await;
    assert_eq!(visible.len(), 3);
    assert_eq!(visible[0].key(), fresh);
    assert_eq!(visible[0].left(), "");
    assert!(!keys(&visible).contains(&middle));

    settle().await;
    // Four keys created in total, all packed into one record.
    assert_eq!(backend.record_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_deleted_state_survives_a_fresh_client() {
    let backend = Arc::new(MemoryStore::new());
    let auth = AuthController::new(AuthState::SignedIn);
    let first = client(&backend, &auth);
    first.sync().await.unwrap();
    let kept = first.entries().await.remove(0);
    first
        .on_update(kept.with_left("keep me"), false)
        .await
        .unwrap();
    first.add_new_item().await.unwrap();
    let doomed = first.entries().await.remove(0);
    first.on_update(doomed.delete(), false).await.unwrap();
    first.store().flush_all().await.unwrap();

    let second = client(&backend, &auth);
    second.sync().await.unwrap();
    let visible = second.entries().await;
    assert_eq!(keys(&visible), vec![kept.key().to_string()]);
    assert_eq!(visible[0].left(), "keep me");
    assert!(second.entry(doomed.key()).await.unwrap().is_deleted());

    // The deleted top entry is the vacancy for the next add.
    assert_eq!(second.add_new_item().await.unwrap(), doomed.key());
}

#[tokio::test(start_paused = true)]
async fn test_entries_beyond_window_load_on_show() {
    let backend = Arc::new(MemoryStore::new());
    let auth = AuthController::new(AuthState::SignedIn);
    let writer = client(&backend, &auth);
    writer.sync().await.unwrap();
    for _ in 0..4 {
        writer.add_new_item().await.unwrap();
    }
    for (i, entry) in writer.entries().await.into_iter().rev().enumerate() {
        writer
            .on_update(entry.with_left(format!("row {i}")), false)
            .await
            .unwrap();
    }
    writer.store().flush_all().await.unwrap();

    let reader = client(&backend, &auth);
    reader.sync().await.unwrap();
    let visible = reader.entries().await;
    assert_eq!(visible.len(), 5);
    let loaded: Vec<_> = visible.iter().map(|e| e.is_loaded()).collect();
    assert_eq!(loaded, vec![true, true, true, false, false]);
    assert_eq!(visible[0].left(), "row 4");
    assert!(visible[4].is_hidden());

    let oldest = visible[4].key().to_string();
    reader.show(&oldest).await.unwrap();
    let shown = reader.entry(&oldest).await.unwrap();
    assert!(shown.is_loaded());
    assert_eq!(shown.left(), "row 0");
}

#[tokio::test(start_paused = true)]
async fn test_foreign_edit_is_refetched() {
    let backend = Arc::new(MemoryStore::new());
    let auth = AuthController::new(AuthState::SignedIn);
    let mine = client(&backend, &auth);
    mine.sync().await.unwrap();
    mine.store().flush_all().await.unwrap();
    // The next listing confirms the write, so the chunk is clean again.
    mine.sync().await.unwrap();
    let record = backend.record_ids().remove(0);
    let chunk = mine.store().chunk(&record).await.unwrap();
    assert!(!chunk.is_dirty().await);

    let theirs = client(&backend, &auth);
    theirs.sync().await.unwrap();
    let entry = theirs.entries().await.remove(0);
    theirs
        .on_update(entry.with_right("from elsewhere"), false)
        .await
        .unwrap();
    theirs.store().flush_all().await.unwrap();

    mine.sync().await.unwrap();
    let refreshed = mine.entry(entry.key()).await.unwrap();
    assert_eq!(refreshed.right(), "from elsewhere");
    assert!(!mine.history_status().await.can_undo);
}

#[tokio::test(start_paused = true)]
async fn test_corrupt_record_is_deleted_and_replaced() {
    let backend = Arc::new(MemoryStore::new());
    backend.raw_put("bogus", "{not json");
    backend.raw_describe("bogus", "1700,1701");
    let auth = AuthController::new(AuthState::SignedIn);
    let model = client(&backend, &auth);

    let surfaced = Arc::new(Mutex::new(false));
    let sink = Arc::clone(&surfaced);
    model
        .subscribe(move |entries, _, _| {
            if entries
                .iter()
                .any(|e| e.is_loaded() && e.key().ends_with("-bogus"))
            {
                *sink.lock().unwrap() = true;
            }
        })
        .await;

    model.sync().await.unwrap();
    assert!(!backend.record_ids().contains(&"bogus".to_string()));
    let entries = model.entries().await;
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].key().ends_with("-bogus"));
    assert_eq!(entries[0].left(), "");

    settle().await;
    model.sync().await.unwrap();
    assert_eq!(model.entries().await.len(), 1);
    assert_eq!(backend.record_count(), 1);
    assert!(!*surfaced.lock().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_reused_vacancy_gets_a_fresh_timestamp() {
    let backend = Arc::new(MemoryStore::new());
    let auth = AuthController::new(AuthState::SignedIn);
    let model = client(&backend, &auth);
    model.sync().await.unwrap();
    let entry = model.entries().await.remove(0);
    model
        .on_update(entry.with_left("gone soon"), false)
        .await
        .unwrap();
    let entry = model.entries().await.remove(0);
    model.on_update(entry.delete(), false).await.unwrap();

    assert_eq!(model.add_new_item().await.unwrap(), entry.key());
    let reused = model.entry(entry.key()).await.unwrap();
    assert!(reused.is_loaded());
    assert!(reused.focused());
    assert_eq!(reused.left(), "");
    assert!(reused.description().parse::<u128>().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_absorbed() {
    let backend = Arc::new(MemoryStore::new());
    let auth = AuthController::new(AuthState::SignedIn);
    let model = client(&backend, &auth);
    backend.fail_next(2);

    model.sync().await.unwrap();
    assert_eq!(model.entries().await.len(), 1);
    assert!(backend.calls("get_all_keys") >= 3);
}

#[tokio::test(start_paused = true)]
async fn test_undo_restores_deleted_entry() {
    let backend = Arc::new(MemoryStore::new());
    let auth = AuthController::new(AuthState::SignedIn);
    let model = client(&backend, &auth);
    model.sync().await.unwrap();
    let entry = model.entries().await.remove(0);
    model
        .on_update(entry.with_left("precious"), false)
        .await
        .unwrap();
    let entry = model.entries().await.remove(0);
    model.on_update(entry.delete(), false).await.unwrap();
    assert!(model.entries().await.is_empty());

    model.undo().await.unwrap();
    let restored = model.entries().await;
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].left(), "precious");
    assert!(restored[0].focused());
    assert!(!restored[0].initially_collapsed());

    model.store().flush_all().await.unwrap();
    let other = client(&backend, &auth);
    other.sync().await.unwrap();
    assert_eq!(other.entries().await[0].left(), "precious");
}
