//! Chart data structures
//!
//! Lane/time notes lowered from an osu! beatmap, plus the handful of
//! metadata keys the relay forwards to the client.

use serde::{Deserialize, Serialize};

/// Default number of lanes a chart is folded into.
pub const LANES: u8 = 4;

/// Width of the osu! playfield coordinate space (`x` in `[0, 512)`).
pub const PLAYFIELD_WIDTH: f64 = 512.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Time when the note should be hit (seconds)
    pub time: f64,
    /// Lane index in `[0, lanes)`
    pub lane: u8,
}

impl Note {
    pub fn new(time: f64, lane: u8) -> Self {
        Self { time, lane }
    }

    /// Fold a playfield `x` coordinate into one of `lanes` lanes.
    pub fn lane_from_x(x: i32, lanes: u8) -> u8 {
        let last = lanes.saturating_sub(1);
        let lane = (f64::from(x) / PLAYFIELD_WIDTH * f64::from(lanes)).floor();
        if lane <= 0.0 {
            0
        } else if lane >= f64::from(last) {
            last
        } else {
            lane as u8
        }
    }
}

/// Notes in file order. Not sorted by time.
pub type Chart = Vec<Note>;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    /// Difficulty name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Audio file named by the chart itself
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_filename: Option<String>,
}
