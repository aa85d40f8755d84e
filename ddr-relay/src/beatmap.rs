mod container;
#[cfg(test)]
pub(crate) mod test_beatmap;

use crate::{json_err, parse::osu, AppState};
use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use ddr_common::{
    core::{Chart, ChartMeta},
    live::ErrorKind,
};
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_util::io::ReaderStream;

#[derive(Debug, Error)]
pub enum BeatmapError {
    #[error("no beatmap path given and no default beatmap configured")]
    NoContainerGiven,
    #[error("cannot open container {}: {source}", .path.display())]
    ContainerNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("container {} is not a readable archive: {source}", .path.display())]
    ContainerUnreadable {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("no .osu chart in {}", .path.display())]
    ChartMissing { path: PathBuf },
    #[error("malformed chart: {0}")]
    ChartMalformed(String),
    #[error("no audio in {}", .path.display())]
    AudioMissing { path: PathBuf },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BeatmapError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoContainerGiven | Self::ContainerNotFound { .. } => ErrorKind::ContainerNotFound,
            Self::ContainerUnreadable { .. } => ErrorKind::ContainerUnreadable,
            Self::ChartMissing { .. } => ErrorKind::ChartMissing,
            Self::ChartMalformed(_) => ErrorKind::ChartMalformed,
            Self::AudioMissing { .. } => ErrorKind::AudioMissing,
            Self::Io(_) => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::ContainerNotFound | ErrorKind::AudioMissing => StatusCode::NOT_FOUND,
            ErrorKind::ChartMissing | ErrorKind::ChartMalformed => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A parsed beatmap ready to hand to a client.
#[derive(Debug, Clone)]
pub struct LoadedBeatmap {
    pub notes: Chart,
    pub audio: Option<String>,
    pub meta: ChartMeta,
}

async fn blocking<T, F>(f: F) -> Result<T, BeatmapError>
where
    F: FnOnce() -> Result<T, BeatmapError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BeatmapError::Io(std::io::Error::other(e)))?
}

/// Decode the container at `path` and parse its chart into `lanes` lanes.
pub async fn load_beatmap(path: PathBuf, lanes: u8) -> Result<LoadedBeatmap, BeatmapError> {
    blocking(move || {
        let decoded = container::decode(&path)?;
        let chart = osu::parse_osu(&decoded.chart_text, lanes)?;
        log::info!("Beatmap {:?} loaded ({} notes)", path, chart.notes.len());
        Ok(LoadedBeatmap {
            notes: chart.notes,
            audio: decoded.audio_name,
            meta: chart.meta,
        })
    })
    .await
}

pub async fn extract_audio(
    path: PathBuf,
    scratch_dir: PathBuf,
) -> Result<container::ExtractedAudio, BeatmapError> {
    blocking(move || container::extract_audio(&path, &scratch_dir)).await
}

#[derive(Debug, Deserialize)]
pub struct BeatmapQuery {
    pub path: Option<String>,
}

pub async fn get_beatmap(
    State(state): State<AppState>,
    Query(query): Query<BeatmapQuery>,
) -> Response {
    let result = match state.beatmap_path(query.path) {
        Ok(path) => load_beatmap(path, state.config.judge.lanes).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(beatmap) => Json(json!({
            "success": true,
            "count": beatmap.notes.len(),
            "notes": beatmap.notes,
            "audio": beatmap.audio,
            "meta": beatmap.meta,
        }))
        .into_response(),
        Err(e) => {
            log::error!("Error loading beatmap: {e}");
            (
                e.status(),
                Json(json!({"success": false, "error": e.to_string()})),
            )
                .into_response()
        }
    }
}

pub async fn get_audio(
    State(state): State<AppState>,
    Query(query): Query<BeatmapQuery>,
) -> Response {
    let audio = match state.beatmap_path(query.path) {
        Ok(path) => extract_audio(path, state.args.scratch_dir.clone()).await,
        Err(e) => Err(e),
    };
    let audio = match audio {
        Ok(audio) => audio,
        Err(e) => {
            log::error!("Error extracting audio: {e}");
            return (e.status(), json_err!("{e}")).into_response();
        }
    };
    let file = match tokio::fs::File::open(&audio.path).await {
        Ok(file) => file,
        Err(e) => {
            log::error!("Error opening {:?}: {e}", audio.path);
            return (StatusCode::INTERNAL_SERVER_ERROR, json_err!("{e}")).into_response();
        }
    };
    let mime = mime_guess::from_path(Path::new(&audio.name)).first_or_octet_stream();
    (
        [(header::CONTENT_TYPE, mime.to_string())],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response()
}

pub async fn list_beatmaps(State(state): State<AppState>) -> Response {
    let dir = state.args.beatmap_dir.clone();
    match tokio::task::spawn_blocking(move || container::list_containers(&dir)).await {
        Ok(Ok(beatmaps)) => Json(json!({ "beatmaps": beatmaps })).into_response(),
        Ok(Err(e)) => {
            log::error!("Error listing beatmaps: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, json_err!("{e}")).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, json_err!("{e}")).into_response(),
    }
}
