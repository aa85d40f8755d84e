//! Pose snapshot produced by the vision pipeline
//!
//! Only the four lower-body joints the game reads are tracked. Coordinates
//! are camera pixels; depth is the 0-255 normalized depth sampled at the joint.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub x: f64,
    pub y: f64,
    pub depth: i32,
}

impl Joint {
    pub fn new(x: f64, y: f64, depth: i32) -> Self {
        Self { x, y, depth }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseSnapshot {
    pub left_ankle: Joint,
    pub right_ankle: Joint,
    pub left_knee: Joint,
    pub right_knee: Joint,
    /// Producer clock (seconds). Stamped with the receipt time when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl PoseSnapshot {
    /// Fill in `timestamp` if the producer left it out.
    pub fn stamped(mut self, received_at: f64) -> Self {
        self.timestamp.get_or_insert(received_at);
        self
    }
}

/// `joints` payload of a `pose_update`: the snapshot, or `{}` before the
/// first producer update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Joints {
    Pose(PoseSnapshot),
    Empty {},
}

impl From<Option<PoseSnapshot>> for Joints {
    fn from(pose: Option<PoseSnapshot>) -> Self {
        match pose {
            Some(pose) => Self::Pose(pose),
            None => Self::Empty {},
        }
    }
}
