use std::sync::Arc;

use persistence::{AutosaveConfig, PersistenceCoordinator, PersistenceDeps, SessionAction};
use shared::{
    domain::{EventId, GameId, Player, PlayerId, Point},
    event::{GameEvent, GameEventKind},
    store::{GameStore, SettingsStore},
};
use storage::Storage;

fn temp_database_url(label: &str) -> String {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = std::env::temp_dir()
        .join(format!("coach_roundtrip_{label}_{suffix}"))
        .join("games.db");
    format!("sqlite://{}", path.to_string_lossy().replace('\\', "/"))
}

fn coordinator(storage: &Storage) -> Arc<PersistenceCoordinator> {
    let store = Arc::new(storage.clone());
    let deps = PersistenceDeps::new(store.clone(), store);
    PersistenceCoordinator::new(deps, AutosaveConfig::default())
}

#[tokio::test]
async fn saved_game_survives_reopening_the_database() {
    let url = temp_database_url("reopen");
    let game_id = {
        let storage = Storage::new(&url).await.expect("db");
        let coordinator = coordinator(&storage);
        coordinator.initialize().await.expect("initialize");

        coordinator
            .dispatch(SessionAction::SetTeamName("Lions".into()))
            .await;
        coordinator
            .dispatch(SessionAction::SetAvailablePlayers(vec![Player::new(
                "p1", "Ana",
            )]))
            .await;
        coordinator
            .dispatch(SessionAction::MovePlayer {
                player_id: PlayerId::new("p1"),
                position: Point::new(0.25, 0.75),
            })
            .await;
        coordinator
            .dispatch(SessionAction::AddGameEvent(GameEvent::with_id(
                "e1",
                GameEventKind::Goal {
                    scorer_id: PlayerId::new("p1"),
                    assister_id: None,
                },
                61.5,
            )))
            .await;

        let id = coordinator.quick_save(true).await.expect("save");
        coordinator.shutdown();
        assert_eq!(
            storage.load_game(&id).await.expect("load"),
            Some(coordinator.snapshot().await)
        );
        id
    };

    let storage = Storage::new(&url).await.expect("reopen");
    let coordinator = coordinator(&storage);
    coordinator.initialize().await.expect("initialize");

    assert_eq!(coordinator.current_game_id().await, game_id);
    let session = coordinator.session().await;
    assert_eq!(session.session.team_name, "Lions");
    assert_eq!(session.session.home_score, 1);
    assert_eq!(session.field.players_on_field.len(), 1);
    assert_eq!(
        session.field.players_on_field[0].position,
        Some(Point::new(0.25, 0.75))
    );
}

#[tokio::test]
async fn event_deletion_is_durable_before_it_is_visible() {
    let storage = Storage::new(&temp_database_url("events")).await.expect("db");
    let coordinator = coordinator(&storage);
    coordinator.initialize().await.expect("initialize");
    coordinator.set_autosave_enabled(false).await;

    coordinator
        .dispatch(SessionAction::AddGameEvent(GameEvent::with_id(
            "e1",
            GameEventKind::OpponentGoal,
            30.0,
        )))
        .await;
    let id = coordinator.quick_save(true).await.expect("save");

    assert!(coordinator.delete_game_event(&EventId::new("e1")).await);

    let stored = storage.load_game(&id).await.expect("load").expect("stored");
    assert!(stored.game_events.is_empty());
    assert_eq!(coordinator.session().await.session.away_score, 0);
    // Score is corrected in memory only; the next save carries it to disk.
    assert_eq!(stored.away_score, 1);
}

#[tokio::test]
async fn deleting_the_last_game_leaves_a_draft_that_autosave_skips() {
    let storage = Storage::new(&temp_database_url("delete")).await.expect("db");
    let coordinator = coordinator(&storage);
    coordinator.initialize().await.expect("initialize");

    let id = coordinator.quick_save(true).await.expect("save");
    coordinator.delete_game(&id).await.expect("delete");

    assert!(coordinator.current_game_id().await.is_default());
    assert!(storage.load_all().await.expect("table").is_empty());
    assert_eq!(
        storage.load_current_game_id().await.expect("settings"),
        Some(GameId::default_game())
    );

    coordinator.dispatch(SessionAction::SetHomeScore(3)).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(storage.list_game_ids().await.expect("ids").is_empty());
}
