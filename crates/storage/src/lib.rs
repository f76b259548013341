use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite, Transaction,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, warn};

use shared::{
    domain::GameId,
    snapshot::{CreatedGame, GameSnapshot, SavedGamesTable, TimerState},
    store::{GameStore, SettingsStore},
};

const CURRENT_GAME_ID_KEY: &str = "current_game_id";
const LAST_GAME_SEQUENCE_KEY: &str = "last_game_sequence";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn list_game_ids(&self) -> Result<Vec<GameId>> {
        let rows = sqlx::query("SELECT id FROM saved_games ORDER BY seq IS NULL, seq, id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| GameId(r.get::<String, _>(0)))
            .collect())
    }

    pub async fn load_game(&self, id: &GameId) -> Result<Option<GameSnapshot>> {
        let row = sqlx::query("SELECT snapshot_json FROM saved_games WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode_snapshot(id, &r.get::<String, _>(0)))
            .transpose()
    }

    async fn next_game_sequence(tx: &mut Transaction<'_, Sqlite>) -> Result<i64> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT value FROM app_settings WHERE key = ?")
                .bind(LAST_GAME_SEQUENCE_KEY)
                .fetch_optional(&mut **tx)
                .await?;
        let last_recorded = stored.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0);
        let last_in_table: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(seq), 0) FROM saved_games")
            .fetch_one(&mut **tx)
            .await?;

        let next = Utc::now()
            .timestamp_millis()
            .max(last_recorded.max(last_in_table) + 1);

        sqlx::query(
            "INSERT INTO app_settings (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(LAST_GAME_SEQUENCE_KEY)
        .bind(next.to_string())
        .execute(&mut **tx)
        .await?;
        Ok(next)
    }

    async fn load_setting(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM app_settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn save_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO app_settings (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn decode_snapshot(id: &GameId, raw: &str) -> Result<GameSnapshot> {
    serde_json::from_str(raw).with_context(|| format!("corrupt snapshot for game '{id}'"))
}

fn encode_snapshot(snapshot: &GameSnapshot) -> Result<String> {
    serde_json::to_string(snapshot).context("failed to encode game snapshot")
}

#[async_trait]
impl GameStore for Storage {
    async fn load_all(&self) -> Result<SavedGamesTable> {
        let rows = sqlx::query("SELECT id, snapshot_json FROM saved_games")
            .fetch_all(&self.pool)
            .await
            .context("failed to load saved games")?;

        let mut table = SavedGamesTable::new();
        for row in rows {
            let id = GameId(row.get::<String, _>(0));
            match decode_snapshot(&id, &row.get::<String, _>(1)) {
                Ok(snapshot) => {
                    table.insert(id, snapshot);
                }
                Err(err) => warn!(game_id = %id, "skipping unreadable saved game: {err:#}"),
            }
        }
        Ok(table)
    }

    async fn save(&self, id: &GameId, snapshot: &GameSnapshot) -> Result<bool> {
        if id.is_default() {
            return Ok(false);
        }
        let json = encode_snapshot(snapshot)?;
        let result = sqlx::query(
            "UPDATE saved_games SET snapshot_json = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(json)
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to save game '{id}'"))?;
        debug!(game_id = %id, "saved game snapshot");
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &GameId) -> Result<Option<GameId>> {
        let result = sqlx::query("DELETE FROM saved_games WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete game '{id}'"))?;
        Ok((result.rows_affected() > 0).then(|| id.clone()))
    }

    async fn create(&self, snapshot: &GameSnapshot) -> Result<CreatedGame> {
        let json = encode_snapshot(snapshot)?;
        let mut tx = self.pool.begin().await?;
        let sequence = Self::next_game_sequence(&mut tx).await?;
        let id = GameId::generated(sequence);

        sqlx::query("INSERT INTO saved_games (id, seq, snapshot_json) VALUES (?, ?, ?)")
            .bind(id.as_str())
            .bind(sequence)
            .bind(json)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to create game '{id}'"))?;
        tx.commit().await?;

        debug!(game_id = %id, "created game");
        Ok(CreatedGame {
            id,
            data: snapshot.clone(),
        })
    }

    async fn remove_event(&self, id: &GameId, index: usize) -> Result<Option<GameSnapshot>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT snapshot_json FROM saved_games WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut snapshot = decode_snapshot(id, &row.get::<String, _>(0))?;
        if index >= snapshot.game_events.len() {
            return Ok(None);
        }
        snapshot.game_events.remove(index);

        sqlx::query(
            "UPDATE saved_games SET snapshot_json = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(encode_snapshot(&snapshot)?)
        .bind(id.as_str())
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to remove event {index} from game '{id}'"))?;
        tx.commit().await?;
        Ok(Some(snapshot))
    }
}

#[async_trait]
impl SettingsStore for Storage {
    async fn save_current_game_id(&self, id: &GameId) -> Result<()> {
        self.save_setting(CURRENT_GAME_ID_KEY, id.as_str()).await
    }

    async fn load_current_game_id(&self) -> Result<Option<GameId>> {
        Ok(self.load_setting(CURRENT_GAME_ID_KEY).await?.map(GameId))
    }

    async fn save_timer_state(&self, state: &TimerState) -> Result<()> {
        sqlx::query(
            "INSERT INTO timer_state (id, game_id, time_elapsed_in_seconds, saved_at) VALUES (1, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET game_id = excluded.game_id,
                time_elapsed_in_seconds = excluded.time_elapsed_in_seconds,
                saved_at = excluded.saved_at",
        )
        .bind(state.game_id.as_str())
        .bind(state.time_elapsed_in_seconds)
        .bind(state.saved_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_timer_state(&self) -> Result<Option<TimerState>> {
        let row = sqlx::query(
            "SELECT game_id, time_elapsed_in_seconds, saved_at FROM timer_state WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| TimerState {
            game_id: GameId(r.get::<String, _>(0)),
            time_elapsed_in_seconds: r.get::<f64, _>(1),
            saved_at: r.get::<DateTime<Utc>, _>(2),
        }))
    }

    async fn clear_timer_state(&self) -> Result<()> {
        sqlx::query("DELETE FROM timer_state")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
