//! Note judgement
//!
//! Matches key presses against the note timeline of one play session. Each
//! press picks the nearest unresolved note in its lane; a note is resolved at
//! most once per session.

use super::{Chart, LANES};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Default hit window (seconds)
pub const HIT_WINDOW: f64 = 0.15;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Judgement {
    Perfect,
    Great,
    Good,
    Miss,
}

impl Judgement {
    pub fn points(self) -> u64 {
        match self {
            Self::Perfect => 300,
            Self::Great => 100,
            Self::Good => 50,
            Self::Miss => 0,
        }
    }
}

/// Whether a press exactly `hit_window` away from a note still counts.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowEdge {
    Inclusive,
    #[default]
    Exclusive,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub lanes: u8,
    /// Maximum `|press - note|` for a hit (seconds)
    pub hit_window: f64,
    pub window_edge: WindowEdge,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            lanes: LANES,
            hit_window: HIT_WINDOW,
            window_edge: WindowEdge::default(),
        }
    }
}

/// Whole microseconds, so `1.15 - 1.0` compares equal to a 0.15 window.
fn micros(secs: f64) -> i64 {
    (secs * 1_000_000.0).round() as i64
}

impl JudgeConfig {
    fn in_window(&self, distance: i64) -> bool {
        let window = micros(self.hit_window);
        match self.window_edge {
            WindowEdge::Inclusive => distance <= window,
            WindowEdge::Exclusive => distance < window,
        }
    }

    fn tier(&self, distance: i64) -> Judgement {
        let window = micros(self.hit_window);
        if distance * 3 <= window {
            Judgement::Perfect
        } else if distance * 3 <= window * 2 {
            Judgement::Great
        } else {
            Judgement::Good
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum JudgeError {
    #[error("no running judgement session")]
    SessionNotFound,
    #[error("lane {lane} is outside [0, {lanes})")]
    InvalidLane { lane: i64, lanes: u8 },
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Running,
    Ended,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub perfect: u32,
    pub great: u32,
    pub good: u32,
    pub miss: u32,
}

impl TierCounts {
    fn record(&mut self, judgement: Judgement) {
        match judgement {
            Judgement::Perfect => self.perfect += 1,
            Judgement::Great => self.great += 1,
            Judgement::Good => self.good += 1,
            Judgement::Miss => self.miss += 1,
        }
    }
}

/// Mutable per-session state. Reset only by [`JudgementEngine::start`].
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    pub start_time: f64,
    pub score: u64,
    pub combo: u32,
    pub max_combo: u32,
    pub counts: TierCounts,
    resolved: BTreeSet<usize>,
}

impl SessionState {
    pub fn is_resolved(&self, index: usize) -> bool {
        self.resolved.contains(&index)
    }

    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JudgeOutcome {
    pub judgement: Judgement,
    /// Index of the resolved note, absent on a miss
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<usize>,
    /// `press - note` of the nearest candidate, absent when the lane was empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
    pub score: u64,
    pub combo: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub score: u64,
    pub max_combo: u32,
    #[serde(flatten)]
    pub counts: TierCounts,
    pub resolved: usize,
    pub total: usize,
}

pub struct JudgementEngine {
    notes: Chart,
    config: JudgeConfig,
    phase: Phase,
    state: SessionState,
}

impl JudgementEngine {
    pub fn new(notes: Chart, config: JudgeConfig) -> Self {
        Self {
            notes,
            config,
            phase: Phase::Idle,
            state: SessionState::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Enter `Running`. Starting again restarts the session from scratch.
    pub fn start(&mut self, start_time: f64) {
        self.state = SessionState {
            start_time,
            ..Default::default()
        };
        self.phase = Phase::Running;
    }

    pub fn stop(&mut self) -> Result<SessionSummary, JudgeError> {
        if self.phase != Phase::Running {
            return Err(JudgeError::SessionNotFound);
        }
        self.phase = Phase::Ended;
        Ok(SessionSummary {
            score: self.state.score,
            max_combo: self.state.max_combo,
            counts: self.state.counts.clone(),
            resolved: self.state.resolved.len(),
            total: self.notes.len(),
        })
    }

    /// Judge a press in `lane` at song time `at` (seconds).
    pub fn judge(&mut self, lane: i64, at: f64) -> Result<JudgeOutcome, JudgeError> {
        let lanes = self.config.lanes;
        let lane = u8::try_from(lane)
            .ok()
            .filter(|&l| l < lanes)
            .ok_or(JudgeError::InvalidLane { lane, lanes })?;
        if self.phase != Phase::Running {
            return Err(JudgeError::SessionNotFound);
        }

        let nearest = self.nearest(lane, at);
        let hit = nearest.filter(|&(_, delta)| self.config.in_window(micros(delta).abs()));

        let state = &mut self.state;
        let judgement = match hit {
            Some((index, delta)) => {
                state.resolved.insert(index);
                let judgement = self.config.tier(micros(delta).abs());
                state.score += judgement.points();
                state.combo += 1;
                state.max_combo = state.max_combo.max(state.combo);
                judgement
            }
            None => {
                state.combo = 0;
                Judgement::Miss
            }
        };
        state.counts.record(judgement);
        log::trace!("lane {lane} at {at:.3}s: {judgement:?} (nearest {nearest:?})");

        Ok(JudgeOutcome {
            judgement,
            note: hit.map(|(index, _)| index),
            delta: nearest.map(|(_, delta)| delta),
            score: state.score,
            combo: state.combo,
        })
    }

    /// Unresolved note in `lane` closest to `at`; the lowest index wins ties.
    fn nearest(&self, lane: u8, at: f64) -> Option<(usize, f64)> {
        self.notes
            .iter()
            .enumerate()
            .filter(|(i, note)| note.lane == lane && !self.state.is_resolved(*i))
            .map(|(i, note)| (i, at - note.time))
            .fold(None, |best, (i, delta)| match best {
                Some((_, best_delta)) if f64::abs(best_delta) <= delta.abs() => best,
                _ => Some((i, delta)),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Note;

    fn running(notes: Vec<Note>, config: JudgeConfig) -> JudgementEngine {
        let mut engine = JudgementEngine::new(notes, config);
        engine.start(0.0);
        engine
    }

    #[test]
    fn test_perfect_hit() {
        let mut engine = running(vec![Note::new(1.0, 2)], JudgeConfig::default());
        let outcome = engine.judge(2, 1.03).unwrap();
        assert_eq!(outcome.judgement, Judgement::Perfect);
        assert_eq!(outcome.note, Some(0));
        assert_eq!(outcome.score, 300);
        assert_eq!(outcome.combo, 1);
        assert!(engine.state().is_resolved(0));
    }

    #[test]
    fn test_tiers() {
        let notes = vec![Note::new(1.0, 0), Note::new(2.0, 0), Note::new(3.0, 0)];
        let mut engine = running(notes, JudgeConfig::default());
        assert_eq!(engine.judge(0, 0.96).unwrap().judgement, Judgement::Perfect);
        assert_eq!(engine.judge(0, 2.08).unwrap().judgement, Judgement::Great);
        let outcome = engine.judge(0, 2.88).unwrap();
        assert_eq!(outcome.judgement, Judgement::Good);
        assert_eq!(outcome.score, 450);
        assert_eq!(outcome.combo, 3);
    }

    #[test]
    fn test_empty_lane_is_miss() {
        let mut engine = running(vec![Note::new(1.0, 1)], JudgeConfig::default());
        engine.judge(1, 1.0).unwrap();
        let before = engine.state().score;

        let outcome = engine.judge(1, 1.0).unwrap();
        assert_eq!(outcome.judgement, Judgement::Miss);
        assert_eq!(outcome.note, None);
        assert_eq!(outcome.delta, None);
        assert_eq!(outcome.score, before);
        assert_eq!(outcome.combo, 0);
        assert_eq!(engine.state().resolved_count(), 1);

        let outcome = engine.judge(3, 1.0).unwrap();
        assert_eq!(outcome.judgement, Judgement::Miss);
    }

    #[test]
    fn test_out_of_window_is_miss() {
        let mut engine = running(vec![Note::new(1.0, 0), Note::new(2.0, 0)], JudgeConfig::default());
        assert_eq!(engine.judge(0, 1.0).unwrap().combo, 1);

        let outcome = engine.judge(0, 1.5).unwrap();
        assert_eq!(outcome.judgement, Judgement::Miss);
        assert_eq!(outcome.combo, 0);
        assert_eq!(outcome.score, 300);
        assert!(!engine.state().is_resolved(1));
        assert_eq!(engine.state().max_combo, 1);
    }

    #[test]
    fn test_window_edge_exclusive() {
        let mut engine = running(vec![Note::new(0.0, 0)], JudgeConfig::default());
        let outcome = engine.judge(0, HIT_WINDOW).unwrap();
        assert_eq!(outcome.judgement, Judgement::Miss);
        assert!(!engine.state().is_resolved(0));
    }

    #[test]
    fn test_window_edge_inclusive() {
        let config = JudgeConfig {
            window_edge: WindowEdge::Inclusive,
            ..Default::default()
        };
        let mut engine = running(vec![Note::new(0.0, 0)], config);
        let outcome = engine.judge(0, HIT_WINDOW).unwrap();
        assert_eq!(outcome.judgement, Judgement::Good);
        assert!(engine.state().is_resolved(0));
    }

    #[test]
    fn test_window_edge_at_song_time() {
        // 1.15 - 1.0 is just under 0.15 in f64
        let mut engine = running(vec![Note::new(1.0, 0)], JudgeConfig::default());
        assert_eq!(engine.judge(0, 1.15).unwrap().judgement, Judgement::Miss);
        assert_eq!(engine.judge(0, 0.85).unwrap().judgement, Judgement::Miss);

        let config = JudgeConfig {
            window_edge: WindowEdge::Inclusive,
            ..Default::default()
        };
        let mut engine = running(vec![Note::new(1.0, 0), Note::new(3.0, 0)], config);
        assert_eq!(engine.judge(0, 1.15).unwrap().judgement, Judgement::Good);
        // exactly w/3 late is still perfect
        assert_eq!(engine.judge(0, 3.05).unwrap().judgement, Judgement::Perfect);
    }

    #[test]
    fn test_no_double_scoring() {
        let mut engine = running(vec![Note::new(1.0, 0)], JudgeConfig::default());
        assert_eq!(engine.judge(0, 1.0).unwrap().judgement, Judgement::Perfect);
        for _ in 0..3 {
            assert_eq!(engine.judge(0, 1.0).unwrap().judgement, Judgement::Miss);
        }
        assert_eq!(engine.state().score, 300);
    }

    #[test]
    fn test_tie_prefers_lowest_index() {
        // equidistant from the press, listed out of time order
        let notes = vec![Note::new(1.5, 0), Note::new(0.5, 0), Note::new(1.0, 1)];
        let config = JudgeConfig {
            hit_window: 1.0,
            ..Default::default()
        };
        let mut engine = running(notes, config);
        assert_eq!(engine.judge(0, 1.0).unwrap().note, Some(0));
        assert_eq!(engine.judge(0, 1.0).unwrap().note, Some(1));
    }

    #[test]
    fn test_nearest_ignores_file_order() {
        let notes = vec![Note::new(3.0, 0), Note::new(1.0, 0), Note::new(2.0, 0)];
        let mut engine = running(notes, JudgeConfig::default());
        assert_eq!(engine.judge(0, 2.01).unwrap().note, Some(2));
        assert_eq!(engine.judge(0, 0.99).unwrap().note, Some(1));
    }

    #[test]
    fn test_invalid_lane() {
        let mut engine = running(vec![], JudgeConfig::default());
        assert_eq!(
            engine.judge(4, 0.0),
            Err(JudgeError::InvalidLane { lane: 4, lanes: 4 })
        );
        assert_eq!(
            engine.judge(-1, 0.0),
            Err(JudgeError::InvalidLane { lane: -1, lanes: 4 })
        );
    }

    #[test]
    fn test_lifecycle() {
        let mut engine = JudgementEngine::new(vec![Note::new(1.0, 0)], JudgeConfig::default());
        assert_eq!(engine.phase(), Phase::Idle);
        assert_eq!(engine.judge(0, 1.0), Err(JudgeError::SessionNotFound));

        engine.start(100.0);
        assert_eq!(engine.phase(), Phase::Running);
        assert_eq!(engine.state().start_time, 100.0);
        engine.judge(0, 1.0).unwrap();
        engine.judge(0, 5.0).unwrap();

        let summary = engine.stop().unwrap();
        assert_eq!(engine.phase(), Phase::Ended);
        assert_eq!(summary.score, 300);
        assert_eq!(summary.max_combo, 1);
        assert_eq!(summary.counts.perfect, 1);
        assert_eq!(summary.counts.miss, 1);
        assert_eq!(summary.resolved, 1);
        assert_eq!(summary.total, 1);
        assert_eq!(engine.judge(0, 1.0), Err(JudgeError::SessionNotFound));
        assert_eq!(engine.stop(), Err(JudgeError::SessionNotFound));

        // restart clears resolved notes
        engine.start(200.0);
        assert_eq!(engine.state().resolved_count(), 0);
        assert_eq!(engine.judge(0, 1.0).unwrap().judgement, Judgement::Perfect);
    }
}
