//! Collections that live in the snapshot but not on the timeline.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// An owned LEGO set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegoSet {
    pub id: u64,
    pub name: String,
    pub number: String,
    pub pieces: u32,
    pub quantity: u32,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Owned LEGO sets, biggest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegoCollection {
    pub sets: Vec<LegoSet>,
    pub total_pieces: u64,
}
impl LegoCollection {
    /// Sorts by piece count (stable, so equal counts keep source order) and
    /// totals pieces across owned quantities.
    pub fn new(mut sets: Vec<LegoSet>) -> Self {
        sets.sort_by(|a, b| b.pieces.cmp(&a.pieces));
        let total_pieces = sets.iter().map(|s| u64::from(s.pieces) * u64::from(s.quantity)).sum();
        Self { sets, total_pieces }
    }
}

/// An owned game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub app_id: u64,
    pub name: String,
    pub playtime_minutes: u64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_played: Option<OffsetDateTime>,
    pub store_url: String,
    pub header_image: String,
}
impl Game {
    pub fn played(&self) -> bool {
        self.playtime_minutes > 0
    }

    /// Playtime in hours, to one decimal place.
    pub fn playtime_hours(&self) -> f64 {
        (self.playtime_minutes as f64 / 6.0).round() / 10.0
    }
}

/// Owned games, most recently played first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameLibrary {
    pub games: Vec<Game>,
}
impl GameLibrary {
    pub fn new(mut games: Vec<Game>) -> Self {
        // `None` sorts before `Some`, so never-played games end up last.
        games.sort_by(|a, b| b.last_played.cmp(&a.last_played));
        Self { games }
    }
}
