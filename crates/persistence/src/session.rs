use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use shared::{
    domain::{
        Drawing, EventId, GameStatus, HomeOrAway, Opponent, Player, PlayerAssessment, PlayerId,
        Point, TacticalDisc,
    },
    event::{GameEvent, GameEventKind, ScoreSide},
    snapshot::GameSnapshot,
};

/// Session half of the working game, including timer run state.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
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
    pub season_id: Option<String>,
    pub tournament_id: Option<String>,
    pub selected_player_ids: Vec<PlayerId>,
    pub available_players: Vec<Player>,
    pub assessments: BTreeMap<PlayerId, PlayerAssessment>,
    pub game_events: Vec<GameEvent>,
    pub is_timer_running: bool,
    pub timer_started_at: Option<DateTime<Utc>>,
}

/// Field-layout half of the working game.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldState {
    pub players_on_field: Vec<Player>,
    pub opponents: Vec<Opponent>,
    pub drawings: Vec<Drawing>,
    pub tactical_discs: Vec<TacticalDisc>,
    pub tactical_drawings: Vec<Drawing>,
    pub tactical_ball_position: Option<Point>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    SetTeamName(String),
    SetOpponentName(String),
    SetGameNotes(String),
    SetGameLocation(String),
    SetGameDate(String),
    SetGameTime(String),
    SetHomeOrAway(HomeOrAway),
    SetNumberOfPeriods(u8),
    SetPeriodDuration(u32),
    SetSubInterval(u32),
    SetGameStatus(GameStatus),
    SetSeasonId(Option<String>),
    SetTournamentId(Option<String>),
    SetSelectedPlayers(Vec<PlayerId>),
    SetAvailablePlayers(Vec<Player>),
    SetPlayerAssessment {
        player_id: PlayerId,
        assessment: PlayerAssessment,
    },
    SetShowPlayerNames(bool),

    SetHomeScore(u32),
    SetAwayScore(u32),
    /// Appends the event; goals also bump the matching score.
    AddGameEvent(GameEvent),
    UpdateGameEvent(GameEvent),
    /// Removes the event and reverses its score effect in one step.
    DeleteGameEventWithScore(GameEvent),

    SetPlayersOnField(Vec<Player>),
    MovePlayer {
        player_id: PlayerId,
        position: Point,
    },
    RemovePlayerFromField(PlayerId),
    AddOpponent(Opponent),
    MoveOpponent {
        id: String,
        position: Point,
    },
    RemoveOpponent(String),
    AddDrawing(Drawing),
    ClearDrawings,
    AddTacticalDisc(TacticalDisc),
    MoveTacticalDisc {
        id: String,
        position: Point,
    },
    RemoveTacticalDisc(String),
    AddTacticalDrawing(Drawing),
    ClearTacticalDrawings,
    SetTacticalBall(Option<Point>),

    StartTimer {
        at: DateTime<Utc>,
    },
    PauseTimer {
        at: DateTime<Utc>,
    },
    SetTimeElapsed(f64),
    EndPeriod,

    LoadPersistedState(Box<GameSnapshot>),
    ResetToInitial,
}

impl SessionAction {
    /// Whether the action produces an undoable history entry.
    pub fn records_history(&self) -> bool {
        !matches!(
            self,
            Self::StartTimer { .. }
                | Self::PauseTimer { .. }
                | Self::SetTimeElapsed(_)
                | Self::LoadPersistedState(_)
                | Self::ResetToInitial
        )
    }

    pub fn is_timer_action(&self) -> bool {
        matches!(
            self,
            Self::StartTimer { .. } | Self::PauseTimer { .. } | Self::EndPeriod
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameSession {
    pub session: SessionState,
    pub field: FieldState,
}

impl Default for GameSession {
    fn default() -> Self {
        Self::initial()
    }
}

impl GameSession {
    pub fn initial() -> Self {
        Self::from_snapshot(GameSnapshot::default())
    }

    /// Builds a session from persisted data with the timer stopped.
    pub fn from_snapshot(snapshot: GameSnapshot) -> Self {
        let GameSnapshot {
            team_name,
            opponent_name,
            game_date,
            game_location,
            game_time,
            home_or_away,
            home_score,
            away_score,
            game_notes,
            number_of_periods,
            period_duration_minutes,
            current_period,
            game_status,
            time_elapsed_in_seconds,
            sub_interval_minutes,
            show_player_names,
            season_id,
            tournament_id,
            selected_player_ids,
            available_players,
            assessments,
            game_events,
            players_on_field,
            opponents,
            drawings,
            tactical_discs,
            tactical_drawings,
            tactical_ball_position,
        } = snapshot;

        Self {
            session: SessionState {
                team_name,
                opponent_name,
                game_date,
                game_location,
                game_time,
                home_or_away,
                home_score,
                away_score,
                game_notes,
                number_of_periods,
                period_duration_minutes,
                current_period,
                game_status,
                time_elapsed_in_seconds,
                sub_interval_minutes,
                show_player_names,
                season_id,
                tournament_id,
                selected_player_ids,
                available_players,
                assessments,
                game_events,
                is_timer_running: false,
                timer_started_at: None,
            },
            field: FieldState {
                players_on_field,
                opponents,
                drawings,
                tactical_discs,
                tactical_drawings,
                tactical_ball_position,
            },
        }
    }

    pub fn snapshot(&self) -> GameSnapshot {
        let s = &self.session;
        let f = &self.field;
        GameSnapshot {
            team_name: s.team_name.clone(),
            opponent_name: s.opponent_name.clone(),
            game_date: s.game_date.clone(),
            game_location: s.game_location.clone(),
            game_time: s.game_time.clone(),
            home_or_away: s.home_or_away,
            home_score: s.home_score,
            away_score: s.away_score,
            game_notes: s.game_notes.clone(),
            number_of_periods: s.number_of_periods,
            period_duration_minutes: s.period_duration_minutes,
            current_period: s.current_period,
            game_status: s.game_status,
            time_elapsed_in_seconds: s.time_elapsed_in_seconds,
            sub_interval_minutes: s.sub_interval_minutes,
            show_player_names: s.show_player_names,
            season_id: s.season_id.clone(),
            tournament_id: s.tournament_id.clone(),
            selected_player_ids: s.selected_player_ids.clone(),
            available_players: s.available_players.clone(),
            assessments: s.assessments.clone(),
            game_events: s.game_events.clone(),
            players_on_field: f.players_on_field.clone(),
            opponents: f.opponents.clone(),
            drawings: f.drawings.clone(),
            tactical_discs: f.tactical_discs.clone(),
            tactical_drawings: f.tactical_drawings.clone(),
            tactical_ball_position: f.tactical_ball_position,
        }
    }

    /// Replaces persisted content but keeps the running clock, as undo/redo needs.
    pub fn restore_persisted(&mut self, snapshot: GameSnapshot) {
        let is_timer_running = self.session.is_timer_running;
        let timer_started_at = self.session.timer_started_at;
        let time_elapsed = self.session.time_elapsed_in_seconds;

        *self = Self::from_snapshot(snapshot);
        self.session.is_timer_running = is_timer_running;
        self.session.timer_started_at = timer_started_at;
        self.session.time_elapsed_in_seconds = time_elapsed;
    }

    pub fn find_event(&self, id: &EventId) -> Option<(usize, &GameEvent)> {
        self.session
            .game_events
            .iter()
            .enumerate()
            .find(|(_, event)| &event.id == id)
    }

    /// Elapsed game time including the currently running stretch.
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> f64 {
        let running = match (self.session.is_timer_running, self.session.timer_started_at) {
            (true, Some(started)) => seconds_between(started, now),
            _ => 0.0,
        };
        self.session.time_elapsed_in_seconds + running
    }

    fn score_mut(&mut self, side: ScoreSide) -> &mut u32 {
        let s = &mut self.session;
        match (side, s.home_or_away) {
            (ScoreSide::Own, HomeOrAway::Home) | (ScoreSide::Opponent, HomeOrAway::Away) => {
                &mut s.home_score
            }
            (ScoreSide::Own, HomeOrAway::Away) | (ScoreSide::Opponent, HomeOrAway::Home) => {
                &mut s.away_score
            }
        }
    }

    pub fn apply(&mut self, action: SessionAction) {
        match action {
            SessionAction::SetTeamName(v) => self.session.team_name = v,
            SessionAction::SetOpponentName(v) => self.session.opponent_name = v,
            SessionAction::SetGameNotes(v) => self.session.game_notes = v,
            SessionAction::SetGameLocation(v) => self.session.game_location = v,
            SessionAction::SetGameDate(v) => self.session.game_date = v,
            SessionAction::SetGameTime(v) => self.session.game_time = v,
            SessionAction::SetHomeOrAway(v) => self.session.home_or_away = v,
            SessionAction::SetNumberOfPeriods(v) => {
                self.session.number_of_periods = v.max(1);
                self.session.current_period =
                    self.session.current_period.min(self.session.number_of_periods);
            }
            SessionAction::SetPeriodDuration(v) => self.session.period_duration_minutes = v.max(1),
            SessionAction::SetSubInterval(v) => self.session.sub_interval_minutes = v.max(1),
            SessionAction::SetGameStatus(v) => self.session.game_status = v,
            SessionAction::SetSeasonId(v) => self.session.season_id = v,
            SessionAction::SetTournamentId(v) => self.session.tournament_id = v,
            SessionAction::SetSelectedPlayers(v) => self.session.selected_player_ids = v,
            SessionAction::SetAvailablePlayers(v) => self.session.available_players = v,
            SessionAction::SetPlayerAssessment {
                player_id,
                assessment,
            } => {
                self.session.assessments.insert(player_id, assessment);
            }
            SessionAction::SetShowPlayerNames(v) => self.session.show_player_names = v,

            SessionAction::SetHomeScore(v) => self.session.home_score = v,
            SessionAction::SetAwayScore(v) => self.session.away_score = v,
            SessionAction::AddGameEvent(event) => {
                if let Some(side) = event.score_side() {
                    let score = self.score_mut(side);
                    *score = score.saturating_add(1);
                }
                self.session.game_events.push(event);
            }
            SessionAction::UpdateGameEvent(event) => {
                if let Some(existing) = self
                    .session
                    .game_events
                    .iter_mut()
                    .find(|e| e.id == event.id)
                {
                    *existing = event;
                }
            }
            SessionAction::DeleteGameEventWithScore(event) => {
                let before = self.session.game_events.len();
                self.session.game_events.retain(|e| e.id != event.id);
                if self.session.game_events.len() < before {
                    if let Some(side) = event.score_side() {
                        let score = self.score_mut(side);
                        *score = score.saturating_sub(1);
                    }
                }
            }

            SessionAction::SetPlayersOnField(players) => self.field.players_on_field = players,
            SessionAction::MovePlayer {
                player_id,
                position,
            } => {
                let on_field = self
                    .field
                    .players_on_field
                    .iter()
                    .position(|p| p.id == player_id);
                match on_field {
                    Some(index) => self.field.players_on_field[index].position = Some(position),
                    None => {
                        // Dragging from the roster bar places the player.
                        let roster_player = self
                            .session
                            .available_players
                            .iter()
                            .find(|p| p.id == player_id)
                            .cloned();
                        if let Some(mut placed) = roster_player {
                            placed.position = Some(position);
                            self.field.players_on_field.push(placed);
                        }
                    }
                }
            }
            SessionAction::RemovePlayerFromField(player_id) => {
                self.field.players_on_field.retain(|p| p.id != player_id);
            }
            SessionAction::AddOpponent(opponent) => self.field.opponents.push(opponent),
            SessionAction::MoveOpponent { id, position } => {
                if let Some(opponent) = self.field.opponents.iter_mut().find(|o| o.id == id) {
                    opponent.position = position;
                }
            }
            SessionAction::RemoveOpponent(id) => self.field.opponents.retain(|o| o.id != id),
            SessionAction::AddDrawing(drawing) => {
                if !drawing.is_empty() {
                    self.field.drawings.push(drawing);
                }
            }
            SessionAction::ClearDrawings => self.field.drawings.clear(),
            SessionAction::AddTacticalDisc(disc) => self.field.tactical_discs.push(disc),
            SessionAction::MoveTacticalDisc { id, position } => {
                if let Some(disc) = self.field.tactical_discs.iter_mut().find(|d| d.id == id) {
                    disc.position = position;
                }
            }
            SessionAction::RemoveTacticalDisc(id) => {
                self.field.tactical_discs.retain(|d| d.id != id);
            }
            SessionAction::AddTacticalDrawing(drawing) => {
                if !drawing.is_empty() {
                    self.field.tactical_drawings.push(drawing);
                }
            }
            SessionAction::ClearTacticalDrawings => self.field.tactical_drawings.clear(),
            SessionAction::SetTacticalBall(position) => self.field.tactical_ball_position = position,

            SessionAction::StartTimer { at } => self.start_timer(at),
            SessionAction::PauseTimer { at } => self.pause_timer(at),
            SessionAction::SetTimeElapsed(seconds) => {
                self.session.time_elapsed_in_seconds = seconds.max(0.0);
                if self.session.is_timer_running {
                    self.session.timer_started_at = Some(Utc::now());
                }
            }
            SessionAction::EndPeriod => self.end_period(),

            SessionAction::LoadPersistedState(snapshot) => *self = Self::from_snapshot(*snapshot),
            SessionAction::ResetToInitial => *self = Self::initial(),
        }
    }

    fn start_timer(&mut self, at: DateTime<Utc>) {
        let s = &mut self.session;
        if s.is_timer_running || s.game_status == GameStatus::GameEnd {
            return;
        }
        match s.game_status {
            GameStatus::PeriodEnd => {
                s.current_period = (s.current_period + 1).min(s.number_of_periods);
                s.game_status = GameStatus::InProgress;
            }
            GameStatus::NotStarted => s.game_status = GameStatus::InProgress,
            GameStatus::InProgress | GameStatus::GameEnd => {}
        }
        s.is_timer_running = true;
        s.timer_started_at = Some(at);
    }

    fn pause_timer(&mut self, at: DateTime<Utc>) {
        if !self.session.is_timer_running {
            return;
        }
        self.session.time_elapsed_in_seconds = self.elapsed_at(at);
        self.session.is_timer_running = false;
        self.session.timer_started_at = None;
    }

    fn end_period(&mut self) {
        let s = &mut self.session;
        s.is_timer_running = false;
        s.timer_started_at = None;
        s.time_elapsed_in_seconds =
            f64::from(s.current_period) * f64::from(s.period_duration_minutes) * 60.0;

        let time = s.time_elapsed_in_seconds;
        if s.current_period >= s.number_of_periods {
            s.game_status = GameStatus::GameEnd;
            s.game_events
                .push(GameEvent::new(GameEventKind::GameEnd, time));
        } else {
            s.game_status = GameStatus::PeriodEnd;
            s.game_events.push(GameEvent::new(
                GameEventKind::PeriodEnd {
                    period: s.current_period,
                },
                time,
            ));
        }
    }
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let millis = (to - from).num_milliseconds().max(0);
    millis as f64 / 1000.0
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
