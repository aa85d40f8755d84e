//! Per-connection play session.
//!
//! Owned by the connection's reader task, so commands from one client are
//! handled strictly in order and never race each other.

use crate::{beatmap, utils::now_secs, AppState};
use ddr_common::{
    core::{Chart, JudgeError, JudgementEngine},
    live::{ErrorKind, LiveEvent, WsCommand},
};

pub struct Session {
    state: AppState,
    /// Notes of the last beatmap this client loaded
    chart: Option<Chart>,
    engine: Option<JudgementEngine>,
}

fn judge_error(e: JudgeError) -> LiveEvent {
    let kind = match e {
        JudgeError::SessionNotFound => ErrorKind::SessionNotFound,
        JudgeError::InvalidLane { .. } => ErrorKind::InvalidLane,
    };
    LiveEvent::error(kind, e.to_string())
}

impl Session {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            chart: None,
            engine: None,
        }
    }

    /// Decode a text frame and handle it. Undecodable frames get an error reply.
    pub async fn handle_text(&mut self, text: &str) -> LiveEvent {
        match serde_json::from_str::<WsCommand>(text) {
            Ok(cmd) => self.handle(cmd).await,
            Err(e) => {
                log::debug!("Rejected frame {text:?}: {e}");
                LiveEvent::error(ErrorKind::BadRequest, format!("invalid command: {e}"))
            }
        }
    }

    pub async fn handle(&mut self, cmd: WsCommand) -> LiveEvent {
        match cmd {
            WsCommand::GetBeatmap { path } => self.get_beatmap(path).await,
            WsCommand::StartGame => self.start_game(),
            WsCommand::StopGame => match self.engine.as_mut().map(JudgementEngine::stop) {
                Some(Ok(summary)) => {
                    log::info!("Game ended: score {}", summary.score);
                    LiveEvent::GameEnded { summary }
                }
                Some(Err(e)) => judge_error(e),
                None => judge_error(JudgeError::SessionNotFound),
            },
            WsCommand::KeyPress { lane, time } => {
                let Some(engine) = self.engine.as_mut() else {
                    return judge_error(JudgeError::SessionNotFound);
                };
                let at = time.unwrap_or_else(|| now_secs() - engine.state().start_time);
                match engine.judge(lane, at) {
                    Ok(outcome) => LiveEvent::Judgement { lane, outcome },
                    Err(e) => judge_error(e),
                }
            }
            WsCommand::GetLatestPose => LiveEvent::PoseUpdate {
                joints: self.state.hub.latest().await.into(),
                timestamp: now_secs(),
            },
        }
    }

    async fn get_beatmap(&mut self, path: Option<String>) -> LiveEvent {
        let result = match self.state.beatmap_path(path) {
            Ok(path) => beatmap::load_beatmap(path, self.state.config.judge.lanes).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(beatmap) => {
                self.chart = Some(beatmap.notes.clone());
                LiveEvent::Beatmap {
                    notes: beatmap.notes,
                    audio: beatmap.audio,
                    meta: beatmap.meta,
                }
            }
            Err(e) => {
                log::warn!("Beatmap request failed: {e}");
                LiveEvent::error(e.kind(), e.to_string())
            }
        }
    }

    /// Start (or restart) judging against the last loaded beatmap.
    fn start_game(&mut self) -> LiveEvent {
        let chart = self.chart.clone().unwrap_or_else(|| {
            log::warn!("Game started before any beatmap was loaded");
            Chart::new()
        });
        let timestamp = now_secs();
        let mut engine = JudgementEngine::new(chart, self.state.config.judge);
        engine.start(timestamp);
        self.engine = Some(engine);
        LiveEvent::GameStarted { timestamp }
    }
}
