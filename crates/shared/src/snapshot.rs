use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{
        Drawing, GameId, GameStatus, HomeOrAway, Opponent, Player, PlayerAssessment, PlayerId,
        Point, TacticalDisc,
    },
    event::GameEvent,
};

pub const DEFAULT_NUMBER_OF_PERIODS: u8 = 2;
pub const DEFAULT_PERIOD_DURATION_MINUTES: u32 = 10;
pub const DEFAULT_SUB_INTERVAL_MINUTES: u32 = 5;

/// Persisted form of one game. Timer run state is not part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSnapshot {
    pub team_name: String,
    pub opponent_name: String,
    pub game_date: String,
    pub game_location: String,
    pub game_time: String,
    pub home_or_away: HomeOrAway,
    pub home_score: u32,
    pub away_score: u32,
    pub game_notes: String,
    pub number_of_periods: u8,
    pub period_duration_minutes: u32,
    pub current_period: u8,
    pub game_status: GameStatus,
    pub time_elapsed_in_seconds: f64,
    pub sub_interval_minutes: u32,
    pub show_player_names: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tournament_id: Option<String>,
    pub selected_player_ids: Vec<PlayerId>,
    pub available_players: Vec<Player>,
    pub assessments: BTreeMap<PlayerId, PlayerAssessment>,
    pub game_events: Vec<GameEvent>,

    pub players_on_field: Vec<Player>,
    pub opponents: Vec<Opponent>,
    pub drawings: Vec<Drawing>,
    pub tactical_discs: Vec<TacticalDisc>,
    pub tactical_drawings: Vec<Drawing>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tactical_ball_position: Option<Point>,
}

impl Default for GameSnapshot {
    fn default() -> Self {
        Self {
            team_name: "My Team".into(),
            opponent_name: "Opponent".into(),
            game_date: String::new(),
            game_location: String::new(),
            game_time: String::new(),
            home_or_away: HomeOrAway::Home,
            home_score: 0,
            away_score: 0,
            game_notes: String::new(),
            number_of_periods: DEFAULT_NUMBER_OF_PERIODS,
            period_duration_minutes: DEFAULT_PERIOD_DURATION_MINUTES,
            current_period: 1,
            game_status: GameStatus::NotStarted,
            time_elapsed_in_seconds: 0.0,
            sub_interval_minutes: DEFAULT_SUB_INTERVAL_MINUTES,
            show_player_names: true,
            season_id: None,
            tournament_id: None,
            selected_player_ids: Vec::new(),
            available_players: Vec::new(),
            assessments: BTreeMap::new(),
            game_events: Vec::new(),
            players_on_field: Vec::new(),
            opponents: Vec::new(),
            drawings: Vec::new(),
            tactical_discs: Vec::new(),
            tactical_drawings: Vec::new(),
            tactical_ball_position: None,
        }
    }
}

pub type SavedGamesTable = BTreeMap<GameId, GameSnapshot>;

/// Most recently created game in `table`, never the draft sentinel.
///
/// Generated `game-<n>` ids order by `n`; any other id sorts before them.
pub fn latest_game_id(table: &SavedGamesTable) -> Option<GameId> {
    table
        .keys()
        .filter(|id| !id.is_default())
        .max_by(|a, b| match (a.sequence(), b.sequence()) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Greater,
            (None, Some(_)) => std::cmp::Ordering::Less,
            (None, None) => a.cmp(b),
        })
        .cloned()
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedGame {
    pub id: GameId,
    pub data: GameSnapshot,
}

/// Timer residue left behind so a reload can resume elapsed time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerState {
    pub game_id: GameId,
    pub time_elapsed_in_seconds: f64,
    pub saved_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_game_id_prefers_highest_generated_sequence() {
        let mut table = SavedGamesTable::new();
        table.insert(GameId::new("imported"), GameSnapshot::default());
        table.insert(GameId::generated(9), GameSnapshot::default());
        table.insert(GameId::generated(120), GameSnapshot::default());
        table.insert(GameId::default_game(), GameSnapshot::default());

        assert_eq!(latest_game_id(&table), Some(GameId::generated(120)));
    }

    #[test]
    fn latest_game_id_is_none_for_draft_only_table() {
        let mut table = SavedGamesTable::new();
        assert_eq!(latest_game_id(&table), None);
        table.insert(GameId::default_game(), GameSnapshot::default());
        assert_eq!(latest_game_id(&table), None);
    }

    #[test]
    fn snapshot_tolerates_missing_fields() {
        let snapshot: GameSnapshot =
            serde_json::from_str(r#"{"team_name":"Lions","home_score":3}"#).expect("parse");
        assert_eq!(snapshot.team_name, "Lions");
        assert_eq!(snapshot.home_score, 3);
        assert_eq!(snapshot.number_of_periods, DEFAULT_NUMBER_OF_PERIODS);
        assert!(snapshot.game_events.is_empty());
    }
}
