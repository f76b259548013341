use super::*;
use shared::{
    domain::PlayerId,
    event::{GameEvent, GameEventKind},
};

fn snapshot_with_goals(count: usize) -> GameSnapshot {
    let mut snapshot = GameSnapshot {
        team_name: "Lions".into(),
        home_score: count as u32,
        ..GameSnapshot::default()
    };
    for i in 0..count {
        snapshot.game_events.push(GameEvent::with_id(
            format!("e{i}").as_str(),
            GameEventKind::Goal {
                scorer_id: PlayerId::new("p1"),
                assister_id: None,
            },
            60.0 * (i as f64 + 1.0),
        ));
    }
    snapshot
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = std::env::temp_dir().join(format!("coach_storage_test_{suffix}"));
    let db_path = temp_root.join("nested").join("storage.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );

    std::fs::remove_dir_all(temp_root).expect("cleanup");
}

#[tokio::test]
async fn create_allocates_increasing_generated_ids() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let first = storage
        .create(&GameSnapshot::default())
        .await
        .expect("first");
    let second = storage
        .create(&GameSnapshot::default())
        .await
        .expect("second");

    assert!(first.id.as_str().starts_with("game-"));
    assert!(second.id.sequence() > first.id.sequence());

    let table = storage.load_all().await.expect("load all");
    assert_eq!(table.len(), 2);
    assert_eq!(storage.latest_id(&table), Some(second.id));
}

#[tokio::test]
async fn create_never_reuses_a_deleted_id() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let created = storage
        .create(&GameSnapshot::default())
        .await
        .expect("create");
    storage.delete(&created.id).await.expect("delete");

    let again = storage
        .create(&GameSnapshot::default())
        .await
        .expect("create again");
    assert_ne!(again.id, created.id);
}

#[tokio::test]
async fn save_overwrites_and_round_trips_snapshot() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let created = storage
        .create(&GameSnapshot::default())
        .await
        .expect("create");

    let updated = snapshot_with_goals(2);
    assert!(storage.save(&created.id, &updated).await.expect("save"));

    let loaded = storage
        .load_game(&created.id)
        .await
        .expect("load")
        .expect("present");
    assert_eq!(loaded, updated);
}

#[tokio::test]
async fn save_refuses_the_draft_sentinel() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let written = storage
        .save(&GameId::default_game(), &GameSnapshot::default())
        .await
        .expect("save");
    assert!(!written);
    assert!(storage.list_game_ids().await.expect("ids").is_empty());
}

#[tokio::test]
async fn save_does_not_create_unknown_games() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let written = storage
        .save(&GameId::new("game-5"), &GameSnapshot::default())
        .await
        .expect("save");
    assert!(!written);
    assert!(storage.list_game_ids().await.expect("ids").is_empty());
    assert!(storage.load_all().await.expect("table").is_empty());
}

#[tokio::test]
async fn delete_reports_missing_games() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let missing = storage
        .delete(&GameId::new("game-404"))
        .await
        .expect("delete");
    assert_eq!(missing, None);
}

#[tokio::test]
async fn remove_event_writes_back_remaining_events() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let created = storage
        .create(&snapshot_with_goals(3))
        .await
        .expect("create");

    let updated = storage
        .remove_event(&created.id, 1)
        .await
        .expect("remove")
        .expect("updated snapshot");
    let ids: Vec<_> = updated
        .game_events
        .iter()
        .map(|e| e.id.as_str().to_string())
        .collect();
    assert_eq!(ids, vec!["e0", "e2"]);

    let loaded = storage
        .load_game(&created.id)
        .await
        .expect("load")
        .expect("present");
    assert_eq!(loaded.game_events.len(), 2);
}

#[tokio::test]
async fn remove_event_out_of_range_changes_nothing() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let created = storage
        .create(&snapshot_with_goals(1))
        .await
        .expect("create");

    assert_eq!(
        storage.remove_event(&created.id, 5).await.expect("remove"),
        None
    );
    assert_eq!(
        storage
            .remove_event(&GameId::new("game-1"), 0)
            .await
            .expect("remove"),
        None
    );
    let loaded = storage
        .load_game(&created.id)
        .await
        .expect("load")
        .expect("present");
    assert_eq!(loaded.game_events.len(), 1);
}

#[tokio::test]
async fn load_all_skips_corrupt_rows() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .create(&GameSnapshot::default())
        .await
        .expect("create");
    sqlx::query("INSERT INTO saved_games (id, seq, snapshot_json) VALUES ('broken', NULL, '{not json')")
        .execute(storage.pool())
        .await
        .expect("insert corrupt row");

    let table = storage.load_all().await.expect("load all");
    assert_eq!(table.len(), 1);
    assert!(!table.contains_key(&GameId::new("broken")));
}

#[tokio::test]
async fn persists_current_game_id_and_timer_state() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    assert_eq!(storage.load_current_game_id().await.expect("load"), None);

    let id = GameId::generated(42);
    storage.save_current_game_id(&id).await.expect("save id");
    assert_eq!(
        storage.load_current_game_id().await.expect("load"),
        Some(id.clone())
    );

    let state = TimerState {
        game_id: id,
        time_elapsed_in_seconds: 312.5,
        saved_at: Utc::now(),
    };
    storage.save_timer_state(&state).await.expect("save timer");
    let loaded = storage
        .load_timer_state()
        .await
        .expect("load timer")
        .expect("timer present");
    assert_eq!(loaded.game_id, state.game_id);
    assert_eq!(loaded.time_elapsed_in_seconds, 312.5);

    storage.clear_timer_state().await.expect("clear");
    assert_eq!(storage.load_timer_state().await.expect("load"), None);
}
