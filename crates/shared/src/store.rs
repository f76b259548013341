use anyhow::Result;
use async_trait::async_trait;

use crate::{
    domain::GameId,
    snapshot::{latest_game_id, CreatedGame, GameSnapshot, SavedGamesTable, TimerState},
};

/// Cache key covering every saved-games listing.
pub const SAVED_GAMES_CACHE_KEY: &str = "saved_games";

#[async_trait]
pub trait GameStore: Send + Sync {
    async fn load_all(&self) -> Result<SavedGamesTable>;
    /// Overwrites an existing entry. `false` means nothing was written.
    async fn save(&self, id: &GameId, snapshot: &GameSnapshot) -> Result<bool>;
    async fn delete(&self, id: &GameId) -> Result<Option<GameId>>;
    async fn create(&self, snapshot: &GameSnapshot) -> Result<CreatedGame>;
    async fn remove_event(&self, id: &GameId, index: usize) -> Result<Option<GameSnapshot>>;

    fn latest_id(&self, table: &SavedGamesTable) -> Option<GameId> {
        latest_game_id(table)
    }
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn save_current_game_id(&self, id: &GameId) -> Result<()>;
    async fn load_current_game_id(&self) -> Result<Option<GameId>>;
    async fn save_timer_state(&self, state: &TimerState) -> Result<()>;
    async fn load_timer_state(&self) -> Result<Option<TimerState>>;
    async fn clear_timer_state(&self) -> Result<()>;
}

pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self, key: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Info,
    Error,
}

pub trait Notifier: Send + Sync {
    fn show(&self, message: &str, severity: Severity);
}
