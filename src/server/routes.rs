//! HTTP routes for the record store.
//!
//! # Endpoints
//!
//! - `GET /health`: Health check endpoint (no auth required)
//! - `GET /zones`: List zones in the caller's group
//! - `POST /zones`: Create a zone (idempotent)
//! - `DELETE /zones/{zone}`: Delete a zone and its records
//! - `POST /changes`: Database change feed
//! - `POST /zones/{zone}/changes`: Zone record change feed
//! - `POST /zones/{zone}/modify`: Atomic batch of saves and deletes

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use tablesync_core::protocol::{
    ChangesRequest, CreateZoneRequest, ErrorBody, ErrorCode, ModifyRequest, ZonesResponse,
};
use tablesync_core::{DatabaseChanges, ModifyOutcome, RemoteError, ZoneChanges, ZoneId};
use tower_http::trace::TraceLayer;

use super::auth::{auth_middleware, ApiKeyStore, AuthUser};
use super::storage::{JournalStore, ServerStorageError};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub api_keys: Arc<ApiKeyStore>,
    pub store: Arc<JournalStore>,
}

/// Error returned by a handler.
#[derive(Debug)]
pub enum ApiError {
    Remote(RemoteError),
    Storage(ServerStorageError),
}

impl From<RemoteError> for ApiError {
    fn from(e: RemoteError) -> Self {
        ApiError::Remote(e)
    }
}

impl From<ServerStorageError> for ApiError {
    fn from(e: ServerStorageError) -> Self {
        ApiError::Storage(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Remote(e) => {
                let status = match e {
                    RemoteError::ChangeTokenExpired => StatusCode::GONE,
                    RemoteError::ZoneNotFound(_) => StatusCode::NOT_FOUND,
                    RemoteError::Rejected(_) => StatusCode::BAD_REQUEST,
                    RemoteError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                    RemoteError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, ErrorBody::from(e))
            }
            ApiError::Storage(ServerStorageError::InvalidGroupId(id)) => (
                StatusCode::BAD_REQUEST,
                ErrorBody::new(ErrorCode::Rejected, format!("invalid group id: {}", id)),
            ),
            ApiError::Storage(e) => {
                tracing::error!(error = %e, "storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new(ErrorCode::Internal, "storage failure"),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn list_zones(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ZonesResponse>, ApiError> {
    let zones = state.store.read(&user.group_id, |j| j.zones())?;
    Ok(Json(ZonesResponse { zones }))
}

async fn create_zone(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateZoneRequest>,
) -> Result<StatusCode, ApiError> {
    if request.zone.as_str().is_empty() {
        return Err(RemoteError::Rejected("zone name must not be empty".to_string()).into());
    }
    state
        .store
        .write(&user.group_id, |j| j.create_zone(&request.zone))?;
    tracing::info!(group = %user.group_id, zone = %request.zone, "zone created");
    Ok(StatusCode::CREATED)
}

async fn delete_zone(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(zone): Path<String>,
) -> Result<StatusCode, ApiError> {
    let zone = ZoneId::new(zone);
    state.store.write(&user.group_id, |j| j.delete_zone(&zone))??;
    tracing::info!(group = %user.group_id, %zone, "zone deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn database_changes(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<ChangesRequest>,
) -> Result<Json<DatabaseChanges>, ApiError> {
    let changes = state
        .store
        .read(&user.group_id, |j| j.database_changes(request.token.as_ref()))??;
    Ok(Json(changes))
}

async fn zone_changes(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(zone): Path<String>,
    Json(request): Json<ChangesRequest>,
) -> Result<Json<ZoneChanges>, ApiError> {
    let zone = ZoneId::new(zone);
    let changes = state
        .store
        .read(&user.group_id, |j| j.zone_changes(&zone, request.token.as_ref()))??;
    Ok(Json(changes))
}

async fn modify_records(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(zone): Path<String>,
    Json(request): Json<ModifyRequest>,
) -> Result<Json<ModifyOutcome>, ApiError> {
    let zone = ZoneId::new(zone);
    let outcome = state.store.write(&user.group_id, |j| {
        j.modify(&zone, request.saves, request.deletes, Utc::now())
    })??;
    tracing::info!(
        group = %user.group_id,
        user = %user.user_id,
        %zone,
        saved = outcome.saved.len(),
        deleted = outcome.deleted.len(),
        "records modified"
    );
    Ok(Json(outcome))
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    // Public routes (no auth)
    let public_routes = Router::new().route("/health", get(health));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/zones", get(list_zones).post(create_zone))
        .route("/zones/{zone}", delete(delete_zone))
        .route("/changes", post(database_changes))
        .route("/zones/{zone}/changes", post(zone_changes))
        .route("/zones/{zone}/modify", post(modify_records))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
