//! DDR Relay - Game Server
//!
//! This server provides:
//! 1. Pose relay: the vision pipeline POSTs joint positions, every connected
//!    game client receives them over WebSocket
//! 2. Beatmap loading from `.osz` containers (unzip -> parse -> lane notes)
//! 3. Per-connection judgement of key presses against the loaded chart

use axum::{http::Method, routing::get, routing::post, Router};
use clap::Parser;
use std::{
    env,
    net::{IpAddr, SocketAddr},
    ops::Deref,
    path::PathBuf,
    sync::Arc,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};

mod beatmap;
mod config;
mod live;
mod parse;
mod utils;

use beatmap::BeatmapError;
use config::RelayConfig;
use live::PoseRelayHub;

// ── CLI Arguments ──────────────────────────────────────────────────────────────

fn default_scratch_dir() -> PathBuf {
    env::temp_dir().join("ddr-relay")
}

#[derive(Parser, Debug, Clone)]
#[command(name = "ddr-relay", about = "DDR pose relay and beatmap server")]
pub struct Args {
    /// Debug logging
    #[arg(long)]
    pub debug: bool,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, default_value_t = 8000)]
    pub port: u16,

    /// Directory scanned for `.osz` beatmaps
    #[arg(long, default_value = ".")]
    pub beatmap_dir: PathBuf,

    /// Beatmap used when a request names none
    #[arg(long)]
    pub default_beatmap: Option<PathBuf>,

    /// Directory for extracted audio
    #[arg(long, default_value_os_t = default_scratch_dir())]
    pub scratch_dir: PathBuf,

    /// Static frontend served for unmatched paths
    #[arg(long)]
    pub web_dir: Option<PathBuf>,

    /// YAML file with judgement and relay tuning
    #[arg(long)]
    pub config: Option<PathBuf>,
}

// ── Application State ──────────────────────────────────────────────────────────

pub struct AppStateInner {
    /// CLI arguments
    pub args: Args,

    /// Judgement and relay tuning
    pub config: RelayConfig,

    /// Subscribers and last pose
    pub hub: PoseRelayHub,
}

pub struct AppState(Arc<AppStateInner>);

impl AppState {
    pub fn new(args: Args, config: RelayConfig) -> Self {
        Self(Arc::new(AppStateInner {
            args,
            config,
            hub: PoseRelayHub::new(),
        }))
    }

    /// Container named by a request, or the configured default.
    pub fn beatmap_path(&self, path: Option<String>) -> Result<PathBuf, BeatmapError> {
        path.map(PathBuf::from)
            .or_else(|| self.args.default_beatmap.clone())
            .ok_or(BeatmapError::NoContainerGiven)
    }
}

impl Deref for AppState {
    type Target = AppStateInner;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

// ── Macros ─────────────────────────────────────────────────────────────────────

#[macro_export]
macro_rules! json_err {
    ($($arg: tt)*) => {
        {
            use serde_json::json;
            use axum::{Json, response::IntoResponse};
            let msg = format!($($arg)*);
            Json(json!({"error": msg})).into_response()
        }
    };
}

// ── Router ─────────────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let routes = Router::new()
        .route("/api/cv/pose", post(live::receive_pose))
        .route("/api/beatmap", get(beatmap::get_beatmap))
        .route("/api/audio", get(beatmap::get_audio))
        .route("/api/beatmaps", get(beatmap::list_beatmaps))
        .route("/ws", get(live::live_ws));
    let routes = match &state.args.web_dir {
        Some(dir) => routes.fallback_service(ServeDir::new(dir)),
        None => routes,
    };

    routes.with_state(state).layer(cors)
}

// ── Main ───────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let config = RelayConfig::load(args.config.as_deref())?;
    log::info!("DDR Relay starting...");
    log::info!("Beatmap Dir: {:?}", args.beatmap_dir);
    log::info!("Default Beatmap: {:?}", args.default_beatmap);
    log::info!("Scratch Dir: {:?}", args.scratch_dir);
    log::info!(
        "Judgement: {} lanes, {}s window ({:?} edge)",
        config.judge.lanes,
        config.judge.hit_window,
        config.judge.window_edge
    );

    let addr = SocketAddr::new(args.host, args.port);
    let state = AppState::new(args, config);
    let app = router(state);

    log::info!("WebSocket: ws://{addr}/ws");
    log::info!("Pose API: POST http://{addr}/api/cv/pose");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
