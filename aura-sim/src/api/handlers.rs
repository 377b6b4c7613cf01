//! HTTP request handlers

use aura_client::ClientStatus;
use aura_common::playback::PlaybackError;
use aura_common::{Error, ErrorKind, PeerId, PlaybackState};
use aura_host::HostSnapshot;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::server::AppContext;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    position_ms: u32,
}

#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    track_id: String,
}

#[derive(Debug, Deserialize)]
pub struct BondRequest {
    bonded: bool,
}

#[derive(Debug, Serialize)]
pub struct ClientEntry {
    index: usize,
    address: PeerId,
    #[serde(flatten)]
    status: ClientStatus,
}

#[derive(Debug, Serialize)]
pub struct ClientListResponse {
    clients: Vec<ClientEntry>,
}

type ApiError = (StatusCode, Json<StatusResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn ok() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
        kind: None,
    })
}

fn api_error(e: Error) -> ApiError {
    let code = match &e {
        Error::Playback(PlaybackError::TrackNotFound(_)) => StatusCode::NOT_FOUND,
        Error::Playback(PlaybackError::NothingLoaded) | Error::InvalidState(_) => {
            StatusCode::CONFLICT
        }
        Error::ActorStopped(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Transport(_) | Error::ProtocolMismatch(_) | Error::Unauthenticated(_) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if code.is_server_error() {
        error!("Request failed: {}", e);
    } else {
        warn!("Request rejected: {}", e);
    }
    (
        code,
        Json(StatusResponse {
            status: format!("error: {}", e),
            kind: Some(e.kind()),
        }),
    )
}

fn unknown_client(index: usize) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(StatusResponse {
            status: format!("error: no client at index {}", index),
            kind: None,
        }),
    )
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "aura-sim".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Host Endpoints
// ============================================================================

/// GET /host/status - Authoritative state and connected peers
pub async fn host_status(State(ctx): State<AppContext>) -> ApiResult<HostSnapshot> {
    ctx.host.snapshot().await.map(Json).map_err(api_error)
}

/// POST /host/play
pub async fn host_play(State(ctx): State<AppContext>) -> ApiResult<PlaybackState> {
    let state = ctx.host.play().await.map_err(api_error)?;
    info!(%state, "Play command succeeded");
    Ok(Json(state))
}

/// POST /host/pause
pub async fn host_pause(State(ctx): State<AppContext>) -> ApiResult<PlaybackState> {
    let state = ctx.host.pause().await.map_err(api_error)?;
    info!(%state, "Pause command succeeded");
    Ok(Json(state))
}

/// POST /host/seek - Body: `{"position_ms": 60000}`
pub async fn host_seek(
    State(ctx): State<AppContext>,
    Json(req): Json<SeekRequest>,
) -> ApiResult<PlaybackState> {
    let state = ctx.host.seek(req.position_ms).await.map_err(api_error)?;
    info!(%state, "Seek command succeeded");
    Ok(Json(state))
}

/// POST /host/track - Body: `{"track_id": "Midnight City.mp3"}`
pub async fn host_track(
    State(ctx): State<AppContext>,
    Json(req): Json<TrackRequest>,
) -> ApiResult<PlaybackState> {
    let state = ctx.host.change_track(req.track_id).await.map_err(api_error)?;
    info!(%state, "Track change succeeded");
    Ok(Json(state))
}

// ============================================================================
// Client Endpoints
// ============================================================================

/// GET /clients - Connection state and local playback of every client
pub async fn list_clients(State(ctx): State<AppContext>) -> ApiResult<ClientListResponse> {
    let mut clients = Vec::with_capacity(ctx.clients.len());
    for (index, client) in ctx.clients.iter().enumerate() {
        let status = client.handle.status().await.map_err(api_error)?;
        clients.push(ClientEntry {
            index,
            address: client.address.clone(),
            status,
        });
    }
    Ok(Json(ClientListResponse { clients }))
}

/// POST /clients/:index/connect - Resolves once subscribed or failed
pub async fn client_connect(
    State(ctx): State<AppContext>,
    Path(index): Path<usize>,
) -> ApiResult<StatusResponse> {
    let handle = ctx.client_handle(index).ok_or_else(|| unknown_client(index))?;
    handle
        .connect(ctx.host_address.clone())
        .await
        .map_err(api_error)?;
    info!(client = index, "Client connected");
    Ok(ok())
}

/// POST /clients/:index/disconnect
pub async fn client_disconnect(
    State(ctx): State<AppContext>,
    Path(index): Path<usize>,
) -> ApiResult<StatusResponse> {
    let handle = ctx.client_handle(index).ok_or_else(|| unknown_client(index))?;
    handle.disconnect().await.map_err(api_error)?;
    info!(client = index, "Client disconnected");
    Ok(ok())
}

// ============================================================================
// Radio Endpoints
// ============================================================================

/// POST /radio/:index/drop - Sever a client's link as if out of range
pub async fn radio_drop(
    State(ctx): State<AppContext>,
    Path(index): Path<usize>,
) -> ApiResult<StatusResponse> {
    let client = ctx.client(index).ok_or_else(|| unknown_client(index))?;
    if ctx.radio.drop_link(&client.address) {
        Ok(ok())
    } else {
        Err(api_error(Error::InvalidState(format!(
            "client {} has no link",
            index
        ))))
    }
}

/// POST /radio/:index/bond - Body: `{"bonded": false}`
pub async fn radio_bond(
    State(ctx): State<AppContext>,
    Path(index): Path<usize>,
    Json(req): Json<BondRequest>,
) -> ApiResult<StatusResponse> {
    let client = ctx.client(index).ok_or_else(|| unknown_client(index))?;
    ctx.radio.set_bonded(&client.address, req.bonded);
    Ok(ok())
}
