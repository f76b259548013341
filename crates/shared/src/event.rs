use serde::{Deserialize, Serialize};

use crate::domain::{EventId, PlayerId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GameEventKind {
    Goal {
        scorer_id: PlayerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        assister_id: Option<PlayerId>,
    },
    OpponentGoal,
    Substitution {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_in: Option<PlayerId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_out: Option<PlayerId>,
    },
    PeriodEnd {
        period: u8,
    },
    GameEnd,
    FairPlayCard {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_id: Option<PlayerId>,
    },
}

/// Which score an event moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreSide {
    Own,
    Opponent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    pub id: EventId,
    /// Seconds since kick-off, two decimals.
    pub time: f64,
    #[serde(flatten)]
    pub kind: GameEventKind,
}

impl GameEvent {
    pub fn new(kind: GameEventKind, time: f64) -> Self {
        Self::with_id(EventId::generate(), kind, time)
    }

    pub fn with_id(id: impl Into<EventId>, kind: GameEventKind, time: f64) -> Self {
        Self {
            id: id.into(),
            time: round_event_time(time),
            kind,
        }
    }

    pub fn score_side(&self) -> Option<ScoreSide> {
        match self.kind {
            GameEventKind::Goal { .. } => Some(ScoreSide::Own),
            GameEventKind::OpponentGoal => Some(ScoreSide::Opponent),
            _ => None,
        }
    }
}

/// Rounds to two decimals, ties away from zero (`0.125 -> 0.13`).
pub fn round_event_time(seconds: f64) -> f64 {
    if !seconds.is_finite() {
        return 0.0;
    }
    (seconds * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_event_time_to_two_decimals() {
        assert_eq!(round_event_time(12.3456), 12.35);
        assert_eq!(round_event_time(0.125), 0.13);
        assert_eq!(round_event_time(60.0), 60.0);
        assert_eq!(round_event_time(f64::NAN), 0.0);
    }

    #[test]
    fn serializes_kind_as_camel_case_type_tag() {
        let event = GameEvent::with_id(
            "e1",
            GameEventKind::Goal {
                scorer_id: PlayerId::new("p1"),
                assister_id: None,
            },
            60.0,
        );
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "goal");
        assert_eq!(json["scorer_id"], "p1");
        assert_eq!(json["id"], "e1");

        let opponent: GameEvent = serde_json::from_value(serde_json::json!({
            "id": "e2",
            "time": 12.5,
            "type": "opponentGoal",
        }))
        .expect("deserialize");
        assert_eq!(opponent.kind, GameEventKind::OpponentGoal);
        assert_eq!(opponent.score_side(), Some(ScoreSide::Opponent));
    }
}
