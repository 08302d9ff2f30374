mod calibration;
mod scan;
mod tokens;

use std::sync::Arc;

use axum::Router;

use plantops_core::Authenticator;

use crate::service::QrService;

/// Shared state for every QR route.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<QrService>,
    pub auth: Arc<dyn Authenticator>,
}

/// Build the complete QR module router.
///
/// Routes:
/// - `GET /q/{token}`: resolve a scan (`?mode=public|operational`)
/// - `POST /qr/v1/calibration/scans`: calibration notify
/// - `GET /qr/v1/calibration/stream`: calibration SSE stream
/// - `POST /qr/v1/tokens`: issue token
/// - `GET /qr/v1/tokens/{id}`: get token
/// - `POST /qr/v1/tokens/{id}/revoke`: revoke token
/// - `GET /qr/v1/tokens/{id}/scans`: audit entries for a token
pub fn router(service: Arc<QrService>, auth: Arc<dyn Authenticator>) -> Router {
    let state = AppState { service, auth };
    Router::new()
        .merge(scan::router(state.clone()))
        .merge(calibration::router(state.clone()))
        .merge(tokens::router(state))
}
