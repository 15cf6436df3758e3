#![forbid(unsafe_code)]

//! Axum service that turns a YouTube video id into plain transcript text.
//!
//! Every request runs yt-dlp (listing first, then one download per attempted
//! track) inside a scratch directory that is gone once the response is built.
//! Nothing is cached and nothing is shared between requests besides the
//! immutable configuration held in [`AppState`].

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result, anyhow};
use axum::{
    Json, Router,
    extract::{Path as AxumPath, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use transcript_api::config::{Settings, SettingsOverrides, resolve_settings};
use transcript_api::error::TranscriptError;
use transcript_api::logging::init_tracing;
use transcript_api::resolver::{Languages, TranscriptPayload, resolve};
use transcript_api::security::{ensure_not_root, validate_video_id};
use transcript_api::source::{CaptionSource, CaptionTrack, YtDlpSource};

const SERVICE_NAME: &str = "transcript-api";
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone)]
struct BackendArgs {
    listen_host: IpAddr,
    port: u16,
    settings: Settings,
}

impl BackendArgs {
    fn parse() -> Result<Self> {
        Self::from_iter(std::env::args().skip(1))
    }

    fn from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut overrides = SettingsOverrides::default();
        let mut args = iter.into_iter();
        while let Some(arg) = args.next() {
            if let Some((flag, value)) = arg.split_once('=')
                && flag.starts_with("--")
            {
                apply_flag(&mut overrides, flag, value.to_string())?;
                continue;
            }

            match arg.as_str() {
                "--host" | "--port" | "--yt-dlp" | "--timeout" | "--env-file" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("{arg} requires a value"))?;
                    apply_flag(&mut overrides, &arg, value)?;
                }
                _ => return Err(anyhow!("unknown argument: {arg}")),
            }
        }

        let settings = resolve_settings(overrides)?;
        let listen_host = parse_host_arg(&settings.host)?;
        Ok(Self {
            listen_host,
            port: settings.port,
            settings,
        })
    }
}

fn apply_flag(overrides: &mut SettingsOverrides, flag: &str, value: String) -> Result<()> {
    match flag {
        "--host" => overrides.host = Some(value),
        "--port" => {
            overrides.port = Some(
                value
                    .parse::<u16>()
                    .context("expected a numeric port between 0 and 65535")?,
            )
        }
        "--yt-dlp" => overrides.yt_dlp_bin = Some(PathBuf::from(value)),
        "--timeout" => {
            overrides.timeout_secs = Some(
                value
                    .parse::<u64>()
                    .context("expected the timeout in whole seconds")?,
            )
        }
        "--env-file" => overrides.env_path = Some(PathBuf::from(value)),
        _ => return Err(anyhow!("unknown argument: {flag}")),
    }
    Ok(())
}

fn parse_host_arg(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/TRANSCRIPT_HOST")
}

/// Shared state injected into every handler.
#[derive(Clone)]
struct AppState {
    source: Arc<YtDlpSource>,
    languages: Arc<Languages>,
    started_at: DateTime<Utc>,
}

impl AppState {
    fn new(settings: &Settings) -> Self {
        let source = YtDlpSource::new(&settings.yt_dlp_bin, settings.timeout)
            .with_cookies(settings.cookies.clone())
            .with_scratch_root(&settings.scratch_root)
            .with_fallback_language(&settings.fallback_language);
        Self {
            source: Arc::new(source),
            languages: Arc::new(Languages::new(
                &settings.preferred_language,
                &settings.fallback_language,
            )),
            started_at: Utc::now(),
        }
    }

    /// Configured languages, with per-request overrides from the query string.
    fn languages_for(&self, query: &LanguageQuery) -> Languages {
        Languages {
            preferred: pick_language(query.lang.as_deref(), &self.languages.preferred),
            fallback: pick_language(query.fallback.as_deref(), &self.languages.fallback),
        }
    }
}

fn pick_language(requested: Option<&str>, default: &str) -> String {
    requested
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(default)
        .to_string()
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
    kind: &'static str,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
            kind: "not_found",
        }
    }
}

impl From<TranscriptError> for ApiError {
    fn from(err: TranscriptError) -> Self {
        Self {
            status: err.status(),
            message: err.to_string(),
            kind: err.kind(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        let body = serde_json::json!({
            "error": self.message,
            "kind": self.kind,
        });
        (self.status, headers, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Default, Deserialize)]
struct LanguageQuery {
    lang: Option<String>,
    fallback: Option<String>,
}

#[derive(Serialize)]
struct ServiceInfo {
    message: &'static str,
    service: &'static str,
    version: &'static str,
    started_at: String,
}

#[derive(Serialize)]
#[serde(untagged)]
enum DebugPayload {
    Tracks {
        video_id: String,
        track_count: usize,
        manual: Vec<CaptionTrack>,
        generated: Vec<CaptionTrack>,
    },
    Failure {
        video_id: String,
        error: String,
        kind: &'static str,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("transcript_api=info,backend=info,tower_http=info");

    let BackendArgs {
        listen_host,
        port,
        settings,
    } = BackendArgs::parse()?;

    ensure_not_root("backend")?;

    let state = AppState::new(&settings);
    info!(
        yt_dlp = %settings.yt_dlp_bin.display(),
        timeout_secs = settings.timeout.as_secs(),
        preferred = %settings.preferred_language,
        fallback = %settings.fallback_language,
        "configuration loaded"
    );

    let app = router(state);

    let addr = SocketAddr::new(listen_host, port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!("transcript API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/transcript/{video_id}", get(get_transcript))
        .route("/debug/{video_id}", get(debug_tracks))
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!("failed to install Ctrl+C handler: {}", err);
    }
}

async fn fallback() -> ApiError {
    ApiError::not_found("endpoint not found")
}

async fn root(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "Transcript API is running.",
        service: SERVICE_NAME,
        version: VERSION,
        started_at: state.started_at.to_rfc3339(),
    })
}

async fn get_transcript(
    State(state): State<AppState>,
    AxumPath(video_id): AxumPath<String>,
    Query(query): Query<LanguageQuery>,
) -> ApiResult<Json<TranscriptPayload>> {
    validate_video_id(&video_id)?;
    let languages = state.languages_for(&query);

    match resolve(state.source.as_ref(), &video_id, &languages).await {
        Ok(result) => Ok(Json(TranscriptPayload::new(video_id, result))),
        Err(err) => {
            warn!(%video_id, kind = err.kind(), error = %err, "transcript request failed");
            Err(err.into())
        }
    }
}

/// Lists the tracks yt-dlp reports. Failures are described in the body
/// instead of turning into an error status.
async fn debug_tracks(
    State(state): State<AppState>,
    AxumPath(video_id): AxumPath<String>,
) -> Json<DebugPayload> {
    if let Err(err) = validate_video_id(&video_id) {
        return Json(failure_payload(video_id, err));
    }

    match state.source.list_tracks(&video_id).await {
        Ok(listing) => {
            let (generated, manual): (Vec<_>, Vec<_>) = listing
                .tracks
                .into_iter()
                .partition(|track| track.is_generated);
            Json(DebugPayload::Tracks {
                video_id,
                track_count: manual.len() + generated.len(),
                manual,
                generated,
            })
        }
        Err(err) => Json(failure_payload(video_id, err.into())),
    }
}

fn failure_payload(video_id: String, err: TranscriptError) -> DebugPayload {
    DebugPayload::Failure {
        video_id,
        error: err.to_string(),
        kind: err.kind(),
    }
}
