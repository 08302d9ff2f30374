use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};

use plantops_core::{ListParams, ListResult, ServiceError};

use crate::model::{IssueTokenRequest, RevokeTokenRequest, ScanEvent, Token};
use crate::permissions;

use super::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/qr/v1/tokens", post(issue_token))
        .route("/qr/v1/tokens/{id}", get(get_token))
        .route("/qr/v1/tokens/{id}/revoke", post(revoke_token))
        .route("/qr/v1/tokens/{id}/scans", get(list_scans))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// POST /qr/v1/tokens
// ---------------------------------------------------------------------------

async fn issue_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<IssueTokenRequest>,
) -> Result<Json<Token>, ServiceError> {
    state.auth.check(&headers, permissions::TOKEN_CREATE)?;
    let token = state.service.issue_token(&req)?;
    Ok(Json(token))
}

// ---------------------------------------------------------------------------
// GET /qr/v1/tokens/{id}
// ---------------------------------------------------------------------------

async fn get_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Token>, ServiceError> {
    state.auth.check(&headers, permissions::TOKEN_READ)?;
    let token = state.service.get_token(&id)?;
    Ok(Json(token))
}

// ---------------------------------------------------------------------------
// POST /qr/v1/tokens/{id}/revoke
// ---------------------------------------------------------------------------

async fn revoke_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RevokeTokenRequest>,
) -> Result<Json<Token>, ServiceError> {
    state.auth.check(&headers, permissions::TOKEN_REVOKE)?;
    let token = state.service.revoke_token(&id, &req.reason)?;
    Ok(Json(token))
}

// ---------------------------------------------------------------------------
// GET /qr/v1/tokens/{id}/scans
// ---------------------------------------------------------------------------

async fn list_scans(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResult<ScanEvent>>, ServiceError> {
    state.auth.check(&headers, permissions::SCAN_LIST)?;
    let result = state.service.scans_for_token(&id, &params)?;
    Ok(Json(result))
}
