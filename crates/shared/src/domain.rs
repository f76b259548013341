use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(GameId);
id_newtype!(PlayerId);
id_newtype!(EventId);

/// Reserved id of the unsaved working draft.
pub const DEFAULT_GAME_ID: &str = "default";
pub const GAME_ID_PREFIX: &str = "game-";

impl GameId {
    pub fn default_game() -> Self {
        Self(DEFAULT_GAME_ID.to_string())
    }

    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_GAME_ID
    }

    pub fn generated(sequence: i64) -> Self {
        Self(format!("{GAME_ID_PREFIX}{sequence}"))
    }

    /// Numeric suffix of a generated `game-<n>` id.
    pub fn sequence(&self) -> Option<i64> {
        self.0.strip_prefix(GAME_ID_PREFIX)?.parse().ok()
    }
}

impl EventId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HomeOrAway {
    #[default]
    Home,
    Away,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    #[default]
    NotStarted,
    InProgress,
    PeriodEnd,
    GameEnd,
}

/// Position relative to the field, both axes in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub rel_x: f64,
    pub rel_y: f64,
}

impl Point {
    pub fn new(rel_x: f64, rel_y: f64) -> Self {
        Self {
            rel_x: rel_x.clamp(0.0, 1.0),
            rel_y: rel_y.clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jersey_number: Option<String>,
    #[serde(default)]
    pub is_goalie: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Point>,
}

impl Player {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: PlayerId::new(id),
            name: name.into(),
            nickname: None,
            jersey_number: None,
            is_goalie: false,
            position: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opponent {
    pub id: String,
    pub position: Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscKind {
    Home,
    Opponent,
    Goalie,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TacticalDisc {
    pub id: String,
    pub kind: DiscKind,
    pub position: Point,
}

/// Freehand polyline.
pub type Drawing = Vec<Point>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerAssessment {
    pub overall_rating: u8,
    #[serde(default)]
    pub notes: String,
}
