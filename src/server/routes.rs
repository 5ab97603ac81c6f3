//! Route handlers for the playground server.
//!
//! Every player route acts on behalf of one hosted session, identified by the
//! `:id` path segment.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::bus::LocalBus;
use crate::error::{BusError, CoordinatorError, SlotError};
use crate::reservation::{ClaimOutcome, OwnerId, ReservationEngine, SlotId};
use crate::server::playground::AppState;
use crate::server::websocket::ws_handler;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub room: String,
    pub players: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub player_id: OwnerId,
    pub is_host: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationsResponse {
    pub player_id: OwnerId,
    pub connected: bool,
    pub my_slot: Option<SlotId>,
    pub reservations: BTreeMap<SlotId, OwnerId>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    pub slot_id: SlotId,
    pub claimed: bool,
    pub owner: Option<OwnerId>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseResponse {
    pub slot_id: SlotId,
    pub released: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub released: Vec<SlotId>,
}

/// Failures mapped onto HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unknown player {0}")]
    UnknownPlayer(String),
    #[error(transparent)]
    InvalidSlot(#[from] SlotError),
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
    #[error(transparent)]
    Join(#[from] BusError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::UnknownPlayer(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidSlot(_) => StatusCode::BAD_REQUEST,
            ApiError::Coordinator(CoordinatorError::NotConnected) => StatusCode::CONFLICT,
            ApiError::Coordinator(CoordinatorError::NotHost) => StatusCode::FORBIDDEN,
            ApiError::Coordinator(CoordinatorError::Bus(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Join(BusError::RoomFull { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Join(_) => StatusCode::BAD_GATEWAY,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

pub(crate) fn player_engine(
    state: &AppState,
    id: &str,
) -> Result<Arc<ReservationEngine<LocalBus>>, ApiError> {
    state
        .engine(&OwnerId::new(id))
        .ok_or_else(|| ApiError::UnknownPlayer(id.to_string()))
}

/// Basic health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Server is running!".to_string(),
        room: state.config().room_code.clone(),
        players: state.player_ids().len(),
    })
}

pub async fn list_players(State(state): State<AppState>) -> Json<Vec<OwnerId>> {
    Json(state.player_ids())
}

pub async fn join_player(State(state): State<AppState>) -> Result<Json<JoinResponse>, ApiError> {
    let engine = state.join_player()?;
    Ok(Json(JoinResponse {
        player_id: engine.self_id().clone(),
        is_host: engine.is_host(),
    }))
}

pub async fn leave_player(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    if state.remove_player(&OwnerId::new(&*id)) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::UnknownPlayer(id))
    }
}

pub async fn reservations(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ReservationsResponse>, ApiError> {
    let engine = player_engine(&state, &id)?;
    Ok(Json(ReservationsResponse {
        player_id: engine.self_id().clone(),
        connected: engine.is_connected(),
        my_slot: engine.my_slot(),
        reservations: engine.reservations(),
    }))
}

pub async fn claim(
    Path((id, slot)): Path<(String, u8)>,
    State(state): State<AppState>,
) -> Result<Json<ClaimResponse>, ApiError> {
    let engine = player_engine(&state, &id)?;
    let slot_id = SlotId::new(slot)?;
    let response = match engine.claim(slot_id).await? {
        ClaimOutcome::Claimed => ClaimResponse {
            slot_id,
            claimed: true,
            owner: Some(engine.self_id().clone()),
        },
        ClaimOutcome::Conflict { owner } => ClaimResponse {
            slot_id,
            claimed: false,
            owner,
        },
    };
    Ok(Json(response))
}

pub async fn release(
    Path((id, slot)): Path<(String, u8)>,
    State(state): State<AppState>,
) -> Result<Json<ReleaseResponse>, ApiError> {
    let engine = player_engine(&state, &id)?;
    let slot_id = SlotId::new(slot)?;
    let released = engine.release(slot_id)?;
    Ok(Json(ReleaseResponse { slot_id, released }))
}

pub async fn confirm(
    Path((id, slot)): Path<(String, u8)>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let engine = player_engine(&state, &id)?;
    engine.confirm(SlotId::new(slot)?)?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn cancel(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<CancelResponse>, ApiError> {
    let engine = player_engine(&state, &id)?;
    let released = engine.cancel()?;
    Ok(Json(CancelResponse { released }))
}

pub async fn kick(
    Path((id, target)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let engine = player_engine(&state, &id)?;
    engine.kick(&OwnerId::new(&*target))?;
    info!(host = %id, target = %target, "kick requested");
    Ok(StatusCode::ACCEPTED)
}

/// Creates and configures the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/players", post(join_player).get(list_players))
        .route("/players/:id", delete(leave_player))
        .route("/players/:id/reservations", get(reservations))
        .route("/players/:id/claim/:slot", post(claim))
        .route("/players/:id/release/:slot", post(release))
        .route("/players/:id/confirm/:slot", post(confirm))
        .route("/players/:id/cancel", post(cancel))
        .route("/players/:id/kick/:target", post(kick))
        .route("/players/:id/ws", get(ws_handler))
        .with_state(state)
}
