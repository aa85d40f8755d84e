mod chart;
pub use chart::{Chart, ChartMeta, Note, LANES, PLAYFIELD_WIDTH};

mod judge;
pub use judge::{
    JudgeConfig, JudgeError, JudgeOutcome, Judgement, JudgementEngine, Phase, SessionState,
    SessionSummary, TierCounts, WindowEdge, HIT_WINDOW,
};

mod pose;
pub use pose::{Joint, Joints, PoseSnapshot};
