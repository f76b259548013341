use std::{collections::BTreeMap, time::Duration};

use shared::{
    domain::{
        Drawing, GameStatus, HomeOrAway, Opponent, Player, PlayerAssessment, PlayerId, Point,
        TacticalDisc,
    },
    event::GameEvent,
};

use crate::session::GameSession;

pub const DEFAULT_IMMEDIATE_DELAY: Duration = Duration::from_millis(0);
pub const DEFAULT_SHORT_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_LONG_DELAY: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AutosaveTier {
    /// Events and scores.
    Immediate,
    /// User-visible metadata.
    Short,
    /// Positions and drawings.
    Long,
}

impl AutosaveTier {
    pub const ALL: [AutosaveTier; 3] = [Self::Immediate, Self::Short, Self::Long];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveConfig {
    pub immediate: Duration,
    pub short: Duration,
    pub long: Duration,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            immediate: DEFAULT_IMMEDIATE_DELAY,
            short: DEFAULT_SHORT_DELAY,
            long: DEFAULT_LONG_DELAY,
        }
    }
}

impl AutosaveConfig {
    pub fn delay(&self, tier: AutosaveTier) -> Duration {
        match tier {
            AutosaveTier::Immediate => self.immediate,
            AutosaveTier::Short => self.short,
            AutosaveTier::Long => self.long,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ImmediateFields {
    game_events: Vec<GameEvent>,
    home_score: u32,
    away_score: u32,
}

#[derive(Debug, Clone, PartialEq)]
struct ShortFields {
    team_name: String,
    opponent_name: String,
    game_notes: String,
    game_date: String,
    game_location: String,
    game_time: String,
    home_or_away: HomeOrAway,
    number_of_periods: u8,
    period_duration_minutes: u32,
    current_period: u8,
    sub_interval_minutes: u32,
    game_status: GameStatus,
    show_player_names: bool,
    season_id: Option<String>,
    tournament_id: Option<String>,
    selected_player_ids: Vec<PlayerId>,
    available_players: Vec<Player>,
    assessments: BTreeMap<PlayerId, PlayerAssessment>,
}

#[derive(Debug, Clone, PartialEq)]
struct LongFields {
    players_on_field: Vec<Player>,
    opponents: Vec<Opponent>,
    drawings: Vec<Drawing>,
    tactical_discs: Vec<TacticalDisc>,
    tactical_drawings: Vec<Drawing>,
    tactical_ball_position: Option<Point>,
}

/// Per-tier copy of the fields each tier watches.
///
/// Elapsed time and timer run state belong to no tier.
#[derive(Debug, Clone, PartialEq)]
pub struct TierFingerprints {
    immediate: ImmediateFields,
    short: ShortFields,
    long: LongFields,
}

impl TierFingerprints {
    pub fn capture(game: &GameSession) -> Self {
        let s = &game.session;
        let f = &game.field;
        Self {
            immediate: ImmediateFields {
                game_events: s.game_events.clone(),
                home_score: s.home_score,
                away_score: s.away_score,
            },
            short: ShortFields {
                team_name: s.team_name.clone(),
                opponent_name: s.opponent_name.clone(),
                game_notes: s.game_notes.clone(),
                game_date: s.game_date.clone(),
                game_location: s.game_location.clone(),
                game_time: s.game_time.clone(),
                home_or_away: s.home_or_away,
                number_of_periods: s.number_of_periods,
                period_duration_minutes: s.period_duration_minutes,
                current_period: s.current_period,
                sub_interval_minutes: s.sub_interval_minutes,
                game_status: s.game_status,
                show_player_names: s.show_player_names,
                season_id: s.season_id.clone(),
                tournament_id: s.tournament_id.clone(),
                selected_player_ids: s.selected_player_ids.clone(),
                available_players: s.available_players.clone(),
                assessments: s.assessments.clone(),
            },
            long: LongFields {
                players_on_field: f.players_on_field.clone(),
                opponents: f.opponents.clone(),
                drawings: f.drawings.clone(),
                tactical_discs: f.tactical_discs.clone(),
                tactical_drawings: f.tactical_drawings.clone(),
                tactical_ball_position: f.tactical_ball_position,
            },
        }
    }

    pub fn changed_tiers(&self, next: &Self) -> Vec<AutosaveTier> {
        let mut changed = Vec::new();
        if self.immediate != next.immediate {
            changed.push(AutosaveTier::Immediate);
        }
        if self.short != next.short {
            changed.push(AutosaveTier::Short);
        }
        if self.long != next.long {
            changed.push(AutosaveTier::Long);
        }
        changed
    }
}
