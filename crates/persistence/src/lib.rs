use std::{
    collections::HashMap,
    sync::{Arc, PoisonError},
};

use chrono::Utc;
use shared::{
    domain::{EventId, GameId},
    error::ApiError,
    snapshot::{GameSnapshot, SavedGamesTable, TimerState},
    store::{CacheInvalidator, GameStore, Notifier, SettingsStore, Severity, SAVED_GAMES_CACHE_KEY},
};
use tokio::{
    sync::{broadcast, Mutex, RwLock},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

pub mod error;
pub mod history;
pub mod notify;
pub mod session;
pub mod tiers;

pub use error::PersistenceError;
pub use history::GameHistory;
pub use notify::{LogNotifier, NoopCache};
pub use session::{FieldState, GameSession, SessionAction, SessionState};
pub use tiers::{AutosaveConfig, AutosaveTier, TierFingerprints};

/// Saved-games table owned outside the coordinator.
pub type SharedSavedGames = Arc<RwLock<SavedGamesTable>>;
/// Id of the game being edited, owned outside the coordinator.
pub type SharedCurrentGameId = Arc<RwLock<GameId>>;

pub struct PersistenceDeps {
    pub game_store: Arc<dyn GameStore>,
    pub settings_store: Arc<dyn SettingsStore>,
    pub cache: Arc<dyn CacheInvalidator>,
    pub notifier: Arc<dyn Notifier>,
    pub saved_games: SharedSavedGames,
    pub current_game_id: SharedCurrentGameId,
}

impl PersistenceDeps {
    pub fn new(game_store: Arc<dyn GameStore>, settings_store: Arc<dyn SettingsStore>) -> Self {
        Self {
            game_store,
            settings_store,
            cache: Arc::new(NoopCache),
            notifier: Arc::new(LogNotifier),
            saved_games: Arc::new(RwLock::new(SavedGamesTable::new())),
            current_game_id: Arc::new(RwLock::new(GameId::default_game())),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheInvalidator>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    Dispatched(SessionAction),
    Saved { game_id: GameId, created: bool },
    Loaded(GameId),
    Deleted(GameId),
    SessionReset,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinatorStatus {
    pub is_loading: bool,
    pub last_error: Option<ApiError>,
}

struct CoordinatorState {
    game: GameSession,
    history: GameHistory,
    fingerprints: TierFingerprints,
    initial_load_complete: bool,
    autosave_enabled: bool,
    status: CoordinatorStatus,
}

impl CoordinatorState {
    fn replace_game(&mut self, game: GameSession) {
        self.history.reset(game.snapshot());
        self.fingerprints = TierFingerprints::capture(&game);
        self.game = game;
    }
}

struct PendingAutosave {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct PendingAutosaves {
    next_generation: u64,
    by_tier: HashMap<AutosaveTier, PendingAutosave>,
}

/// Decides when the working game is written to the game store and which
/// stored game it belongs to.
pub struct PersistenceCoordinator {
    game_store: Arc<dyn GameStore>,
    settings_store: Arc<dyn SettingsStore>,
    cache: Arc<dyn CacheInvalidator>,
    notifier: Arc<dyn Notifier>,
    saved_games: SharedSavedGames,
    current_game_id: SharedCurrentGameId,
    config: AutosaveConfig,
    state: Mutex<CoordinatorState>,
    /// Serialises store writes so a delete never races a save of the same game.
    write_gate: Mutex<()>,
    pending: std::sync::Mutex<PendingAutosaves>,
    events: broadcast::Sender<CoordinatorEvent>,
}

impl PersistenceCoordinator {
    pub fn new(deps: PersistenceDeps, config: AutosaveConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let game = GameSession::initial();
        Arc::new(Self {
            game_store: deps.game_store,
            settings_store: deps.settings_store,
            cache: deps.cache,
            notifier: deps.notifier,
            saved_games: deps.saved_games,
            current_game_id: deps.current_game_id,
            config,
            state: Mutex::new(CoordinatorState {
                history: GameHistory::new(game.snapshot()),
                fingerprints: TierFingerprints::capture(&game),
                game,
                initial_load_complete: false,
                autosave_enabled: true,
                status: CoordinatorStatus::default(),
            }),
            write_gate: Mutex::new(()),
            pending: std::sync::Mutex::new(PendingAutosaves::default()),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events.subscribe()
    }

    pub fn saved_games(&self) -> SharedSavedGames {
        Arc::clone(&self.saved_games)
    }

    pub async fn current_game_id(&self) -> GameId {
        self.current_game_id.read().await.clone()
    }

    pub async fn session(&self) -> GameSession {
        self.state.lock().await.game.clone()
    }

    pub async fn snapshot(&self) -> GameSnapshot {
        self.state.lock().await.game.snapshot()
    }

    pub async fn status(&self) -> CoordinatorStatus {
        self.state.lock().await.status.clone()
    }

    pub async fn can_undo(&self) -> bool {
        self.state.lock().await.history.can_undo()
    }

    pub async fn can_redo(&self) -> bool {
        self.state.lock().await.history.can_redo()
    }

    /// Loads the saved-games table and restores the last active game.
    ///
    /// Autosave stays off until this has run, whether or not it succeeds.
    pub async fn initialize(&self) -> Result<(), PersistenceError> {
        self.set_loading(true).await;

        let table = match self.game_store.load_all().await {
            Ok(table) => table,
            Err(source) => {
                let err = self
                    .record_failure(PersistenceError::storage("loading saved games", source))
                    .await;
                self.finish_initial_load().await;
                return Err(err);
            }
        };

        let remembered = match self.settings_store.load_current_game_id().await {
            Ok(id) => id,
            Err(err) => {
                warn!("failed to read current game id: {err:#}");
                None
            }
        };
        let restored = remembered
            .filter(|id| !id.is_default())
            .and_then(|id| table.get(&id).cloned().map(|snapshot| (id, snapshot)));
        let count = table.len();
        *self.saved_games.write().await = table;

        if let Some((id, snapshot)) = restored {
            let mut game = GameSession::from_snapshot(snapshot);
            match self.settings_store.load_timer_state().await {
                Ok(Some(timer)) if timer.game_id == id => {
                    game.session.time_elapsed_in_seconds = timer.time_elapsed_in_seconds;
                }
                Ok(_) => {}
                Err(err) => warn!(game_id = %id, "failed to read timer state: {err:#}"),
            }
            self.switch_game(id.clone(), game).await;
            let _ = self.events.send(CoordinatorEvent::Loaded(id));
        }

        self.finish_initial_load().await;
        info!(saved_games = count, "initial load complete");
        Ok(())
    }

    /// Writes the working game. The draft sentinel is first given a new id.
    pub async fn quick_save(&self, silent: bool) -> Result<GameId, PersistenceError> {
        let _writes = self.write_gate.lock().await;
        let target = self.current_game_id().await;
        self.write_working_game(target, silent).await
    }

    /// Caller holds `write_gate`.
    async fn write_working_game(
        &self,
        target: GameId,
        silent: bool,
    ) -> Result<GameId, PersistenceError> {
        let snapshot = self.state.lock().await.game.snapshot();
        let created = target.is_default();
        let outcome = if created {
            self.game_store
                .create(&snapshot)
                .await
                .map(|created| created.id)
                .map_err(|source| PersistenceError::storage("creating game", source))
        } else {
            self.overwrite_game(&target, &snapshot).await
        };

        let game_id = {
            let mut current = self.current_game_id.write().await;
            if *current != target {
                drop(current);
                return self.settle_stale_save(&target, outcome, snapshot).await;
            }
            let game_id = match outcome {
                Ok(id) => id,
                Err(err) => {
                    drop(current);
                    return Err(self.record_failure(err).await);
                }
            };
            *current = game_id.clone();
            let mut state = self.state.lock().await;
            let latest = state.game.snapshot();
            state.history.reset(snapshot.clone());
            // Edits made while the write was in flight stay undoable.
            state.history.push(latest);
            state.status.last_error = None;
            game_id
        };

        if created {
            if let Err(err) = self.settings_store.save_current_game_id(&game_id).await {
                warn!(game_id = %game_id, "failed to remember current game: {err:#}");
            }
        }
        self.saved_games
            .write()
            .await
            .insert(game_id.clone(), snapshot);
        self.cache.invalidate(SAVED_GAMES_CACHE_KEY);

        if !silent {
            self.notifier.show("Game saved", Severity::Success);
        }
        info!(game_id = %game_id, created, silent, "game saved");
        let _ = self.events.send(CoordinatorEvent::Saved {
            game_id: game_id.clone(),
            created,
        });
        Ok(game_id)
    }

    /// A write that finished after another game became active. The stored
    /// row is listed again, but the active session and its history are left
    /// alone.
    async fn settle_stale_save(
        &self,
        target: &GameId,
        outcome: Result<GameId, PersistenceError>,
        snapshot: GameSnapshot,
    ) -> Result<GameId, PersistenceError> {
        let game_id = match outcome {
            Ok(id) => id,
            Err(err) => {
                warn!(game_id = %target, "save of an inactive game failed: {err}");
                return Err(err);
            }
        };
        {
            let mut table = self.saved_games.write().await;
            if target.is_default() || table.contains_key(&game_id) {
                table.insert(game_id.clone(), snapshot);
            }
        }
        self.cache.invalidate(SAVED_GAMES_CACHE_KEY);
        info!(game_id = %game_id, "save finished after the active game changed");
        Ok(game_id)
    }

    async fn overwrite_game(
        &self,
        id: &GameId,
        snapshot: &GameSnapshot,
    ) -> Result<GameId, PersistenceError> {
        let written = self
            .game_store
            .save(id, snapshot)
            .await
            .map_err(|source| PersistenceError::storage("saving game", source))?;
        if !written {
            return Err(PersistenceError::Rejected {
                operation: "save",
                game_id: id.clone(),
            });
        }
        Ok(id.clone())
    }

    pub async fn load_game(&self, id: &GameId) -> Result<(), PersistenceError> {
        let snapshot = self.saved_games.read().await.get(id).cloned();
        let Some(snapshot) = snapshot else {
            return Err(self
                .record_failure(PersistenceError::NotFound(id.clone()))
                .await);
        };

        self.set_loading(true).await;
        if let Err(err) = self.settings_store.clear_timer_state().await {
            warn!(game_id = %id, "failed to clear stale timer state: {err:#}");
        }
        self.activate_game(id.clone(), snapshot).await;
        self.set_loading(false).await;
        Ok(())
    }

    /// Replaces the working game and the current id as one step, so a save
    /// finishing concurrently sees either the old pair or the new one.
    async fn switch_game(&self, id: GameId, game: GameSession) {
        let mut current = self.current_game_id.write().await;
        let mut state = self.state.lock().await;
        state.replace_game(game);
        state.status.last_error = None;
        *current = id;
    }

    async fn activate_game(&self, id: GameId, snapshot: GameSnapshot) {
        self.cancel_pending_autosaves();
        self.switch_game(id.clone(), GameSession::from_snapshot(snapshot))
            .await;
        if let Err(err) = self.settings_store.save_current_game_id(&id).await {
            warn!(game_id = %id, "failed to remember current game: {err:#}");
        }
        info!(game_id = %id, "game loaded");
        let _ = self.events.send(CoordinatorEvent::Loaded(id));
    }

    async fn reset_to_draft(&self) {
        self.cancel_pending_autosaves();
        let draft = GameId::default_game();
        self.switch_game(draft.clone(), GameSession::initial()).await;
        if let Err(err) = self.settings_store.save_current_game_id(&draft).await {
            warn!("failed to remember draft as current game: {err:#}");
        }
        info!("session reset to unsaved draft");
        let _ = self.events.send(CoordinatorEvent::SessionReset);
    }

    /// Deletes a stored game. Deleting the active game moves to the latest
    /// remaining one, or back to a fresh draft.
    pub async fn delete_game(&self, id: &GameId) -> Result<GameId, PersistenceError> {
        if id.is_default() {
            return Err(self.record_failure(PersistenceError::ProtectedDraft).await);
        }

        let _writes = self.write_gate.lock().await;
        if self.current_game_id().await == *id {
            self.cancel_pending_autosaves();
        }
        let deleted = match self.game_store.delete(id).await {
            Ok(Some(deleted)) => deleted,
            Ok(None) => {
                return Err(self
                    .record_failure(PersistenceError::NotFound(id.clone()))
                    .await)
            }
            Err(source) => {
                return Err(self
                    .record_failure(PersistenceError::storage("deleting game", source))
                    .await)
            }
        };

        let fallback = {
            let mut table = self.saved_games.write().await;
            table.remove(id);
            self.game_store
                .latest_id(&table)
                .and_then(|next| table.get(&next).cloned().map(|snapshot| (next, snapshot)))
        };
        self.cache.invalidate(SAVED_GAMES_CACHE_KEY);
        info!(game_id = %deleted, "game deleted");
        let _ = self.events.send(CoordinatorEvent::Deleted(deleted.clone()));

        if self.current_game_id().await == *id {
            match fallback {
                Some((next, snapshot)) => self.activate_game(next, snapshot).await,
                None => self.reset_to_draft().await,
            }
        }
        Ok(deleted)
    }

    /// Removes one event, durably first, then from memory together with its
    /// score effect.
    ///
    /// The unsaved draft has no stored copy, so for it only the in-memory
    /// removal runs and the call still succeeds.
    pub async fn delete_game_event(self: &Arc<Self>, event_id: &EventId) -> bool {
        let _writes = self.write_gate.lock().await;
        let located = {
            let state = self.state.lock().await;
            state
                .game
                .find_event(event_id)
                .map(|(index, event)| (index, event.clone()))
        };
        let Some((index, event)) = located else {
            self.record_failure(PersistenceError::EventNotFound(event_id.clone()))
                .await;
            return false;
        };

        let game_id = self.current_game_id().await;
        if !game_id.is_default() {
            match self.game_store.remove_event(&game_id, index).await {
                Ok(Some(updated)) => {
                    self.saved_games
                        .write()
                        .await
                        .insert(game_id.clone(), updated);
                    self.cache.invalidate(SAVED_GAMES_CACHE_KEY);
                }
                Ok(None) => {
                    self.record_failure(PersistenceError::Rejected {
                        operation: "event removal",
                        game_id,
                    })
                    .await;
                    return false;
                }
                Err(source) => {
                    self.record_failure(PersistenceError::storage("removing event", source))
                        .await;
                    return false;
                }
            }
        }

        self.dispatch(SessionAction::DeleteGameEventWithScore(event))
            .await;
        true
    }

    /// Applies an action to the working game and schedules the autosave tiers
    /// whose fields it changed.
    pub async fn dispatch(self: &Arc<Self>, action: SessionAction) {
        let records_history = action.records_history();
        let touches_timer = action.is_timer_action();
        let (changed, elapsed) = {
            let mut state = self.state.lock().await;
            state.game.apply(action.clone());
            if records_history {
                let snapshot = state.game.snapshot();
                state.history.push(snapshot);
            }
            let next = TierFingerprints::capture(&state.game);
            let changed = state.fingerprints.changed_tiers(&next);
            state.fingerprints = next;
            (changed, state.game.session.time_elapsed_in_seconds)
        };
        let _ = self.events.send(CoordinatorEvent::Dispatched(action));

        if touches_timer {
            self.record_timer_state(elapsed).await;
        }
        if !changed.is_empty() && self.autosave_allowed().await {
            self.schedule_autosave(&changed);
        }
    }

    pub async fn undo(self: &Arc<Self>) -> bool {
        self.step_history(|history| history.undo().cloned()).await
    }

    pub async fn redo(self: &Arc<Self>) -> bool {
        self.step_history(|history| history.redo().cloned()).await
    }

    async fn step_history(
        self: &Arc<Self>,
        step: impl FnOnce(&mut GameHistory) -> Option<GameSnapshot>,
    ) -> bool {
        let changed = {
            let mut state = self.state.lock().await;
            let Some(snapshot) = step(&mut state.history) else {
                return false;
            };
            state.game.restore_persisted(snapshot);
            let next = TierFingerprints::capture(&state.game);
            let changed = state.fingerprints.changed_tiers(&next);
            state.fingerprints = next;
            changed
        };
        if !changed.is_empty() && self.autosave_allowed().await {
            self.schedule_autosave(&changed);
        }
        true
    }

    pub async fn set_autosave_enabled(&self, enabled: bool) {
        self.state.lock().await.autosave_enabled = enabled;
        if !enabled {
            self.cancel_pending_autosaves();
        }
    }

    /// Drops every pending autosave. A write already in progress completes.
    pub fn shutdown(&self) {
        self.cancel_pending_autosaves();
    }

    async fn autosave_allowed(&self) -> bool {
        self.autosave_target().await.is_some()
    }

    /// The saved game autosave would write to right now.
    async fn autosave_target(&self) -> Option<GameId> {
        {
            let state = self.state.lock().await;
            if !state.initial_load_complete || !state.autosave_enabled {
                return None;
            }
        }
        let current = self.current_game_id().await;
        (!current.is_default()).then_some(current)
    }

    fn pending_autosaves(&self) -> std::sync::MutexGuard<'_, PendingAutosaves> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule_autosave(self: &Arc<Self>, tiers: &[AutosaveTier]) {
        let mut pending = self.pending_autosaves();
        for &tier in tiers {
            if let Some(previous) = pending.by_tier.remove(&tier) {
                previous.handle.abort();
            }
            pending.next_generation += 1;
            let generation = pending.next_generation;
            let delay = self.config.delay(tier);
            let coordinator = Arc::downgrade(self);
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Some(coordinator) = coordinator.upgrade() {
                    coordinator.run_autosave(tier, generation).await;
                }
            });
            pending
                .by_tier
                .insert(tier, PendingAutosave { generation, handle });
        }
    }

    async fn run_autosave(&self, tier: AutosaveTier, generation: u64) {
        {
            let mut pending = self.pending_autosaves();
            match pending.by_tier.get(&tier) {
                Some(entry) if entry.generation == generation => {
                    // Once detached from the map a newer change can no longer abort this write.
                    pending.by_tier.remove(&tier);
                }
                _ => return,
            }
        }
        let Some(target) = self.autosave_target().await else {
            debug!(?tier, "autosave skipped");
            return;
        };
        let _writes = self.write_gate.lock().await;
        // Delete or load may have run while this waited for the gate.
        if self.autosave_target().await.as_ref() != Some(&target) {
            debug!(?tier, game_id = %target, "autosave dropped, active game changed");
            return;
        }
        debug!(?tier, game_id = %target, "autosave firing");
        if let Err(err) = self.write_working_game(target, true).await {
            warn!(?tier, "autosave failed: {err}");
        }
    }

    fn cancel_pending_autosaves(&self) {
        let mut pending = self.pending_autosaves();
        for (_, entry) in pending.by_tier.drain() {
            entry.handle.abort();
        }
    }

    async fn record_timer_state(&self, elapsed: f64) {
        let game_id = self.current_game_id().await;
        if game_id.is_default() {
            return;
        }
        let state = TimerState {
            game_id,
            time_elapsed_in_seconds: elapsed,
            saved_at: Utc::now(),
        };
        if let Err(err) = self.settings_store.save_timer_state(&state).await {
            warn!(game_id = %state.game_id, "failed to record timer state: {err:#}");
        }
    }

    async fn set_loading(&self, loading: bool) {
        self.state.lock().await.status.is_loading = loading;
    }

    async fn finish_initial_load(&self) {
        let mut state = self.state.lock().await;
        state.initial_load_complete = true;
        state.status.is_loading = false;
    }

    async fn record_failure(&self, err: PersistenceError) -> PersistenceError {
        error!(code = ?err.code(), "{err}");
        {
            let mut state = self.state.lock().await;
            state.status.is_loading = false;
            state.status.last_error = Some(ApiError::from(&err));
        }
        self.notifier.show(&err.to_string(), Severity::Error);
        err
    }
}

impl Drop for PersistenceCoordinator {
    fn drop(&mut self) {
        self.cancel_pending_autosaves();
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
