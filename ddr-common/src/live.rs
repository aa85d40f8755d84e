//! Live protocol types shared between the relay and the game client.
//!
//! Every frame is a JSON object tagged by `type`.

use crate::core::{ChartMeta, JudgeOutcome, Joints, Note, SessionSummary};
use serde::{Deserialize, Serialize};

/// Commands sent from the game client to the relay over WebSocket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsCommand {
    GetBeatmap {
        #[serde(default)]
        path: Option<String>,
    },
    StartGame,
    StopGame,
    KeyPress {
        lane: i64,
        /// Song time in seconds; the relay uses its own clock when omitted
        #[serde(default)]
        time: Option<f64>,
    },
    GetLatestPose,
}

/// Events sent from the relay to the game client over WebSocket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    Beatmap {
        notes: Vec<Note>,
        #[serde(skip_serializing_if = "Option::is_none")]
        audio: Option<String>,
        meta: ChartMeta,
    },
    GameStarted {
        timestamp: f64,
    },
    GameEnded {
        summary: SessionSummary,
    },
    Judgement {
        lane: i64,
        #[serde(flatten)]
        outcome: JudgeOutcome,
    },
    PoseUpdate {
        joints: Joints,
        timestamp: f64,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl LiveEvent {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Frame is not valid JSON or not a known command
    BadRequest,
    ContainerNotFound,
    ContainerUnreadable,
    ChartMissing,
    ChartMalformed,
    AudioMissing,
    SessionNotFound,
    InvalidLane,
    Internal,
}
