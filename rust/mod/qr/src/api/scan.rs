use std::net::SocketAddr;

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{ConnectInfo, Path, Query, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::error::{error_code, QrError};
use crate::model::{GeoHints, ScanMode};
use crate::permissions;
use crate::render;
use crate::service::{ScanOutcome, ScanRequest};

use super::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/q/{token}", get(resolve))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct ScanQuery {
    #[serde(default)]
    mode: Option<String>,
}

// ---------------------------------------------------------------------------
// GET /q/{token}
// ---------------------------------------------------------------------------

async fn resolve(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<ScanQuery>, QueryRejection>,
    request: Request,
) -> Response {
    // An undecodable token gets the same page as an unknown one.
    let token = match path {
        Ok(Path(token)) => token,
        Err(e) => {
            warn!(code = error_code::MALFORMED_INPUT, error = %e, "undecodable scan path");
            return no_store(not_found());
        }
    };
    let mode = match query {
        Ok(Query(query)) => query.mode,
        Err(e) => {
            warn!(error = %e, "undecodable scan query, using public");
            None
        }
    };

    let headers = request.headers();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let req = ScanRequest {
        mode: requested_mode(&state, headers, mode.as_deref()),
        ip_address: client_ip(headers, peer),
        geo: geo_hints(headers),
        user_agent: header_str(headers, header::USER_AGENT.as_str()),
        token,
    };

    let resp = match state.service.scan(&req) {
        Ok(ScanOutcome::Redirect { url, .. }) => Redirect::to(&url).into_response(),
        Ok(ScanOutcome::Verification { html, .. })
        | Ok(ScanOutcome::InternalStatus { html, .. })
        | Ok(ScanOutcome::Calibration { html }) => Html(html).into_response(),
        Err(QrError::NotFound) => not_found(),
        Err(e) => {
            error!(code = e.error_code(), error = %e, mode = %req.mode, "scan failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(render::unavailable_page()),
            )
                .into_response()
        }
    };
    no_store(resp)
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Html(render::not_found_page())).into_response()
}

/// Every scan response must reach the server again on the next scan.
fn no_store(resp: Response) -> Response {
    ([(header::CACHE_CONTROL, "no-store")], resp).into_response()
}

/// Operational mode needs the operational permission; anything else is
/// served as public without telling the scanner why.
fn requested_mode(state: &AppState, headers: &HeaderMap, raw: Option<&str>) -> ScanMode {
    match raw.map(ScanMode::from_str) {
        Some(Some(ScanMode::Operational)) => {
            match state.auth.check(headers, permissions::SCAN_OPERATIONAL) {
                Ok(()) => ScanMode::Operational,
                Err(e) => {
                    debug!(error = %e, "operational scan downgraded to public");
                    ScanMode::Public
                }
            }
        }
        Some(None) => {
            warn!(mode = ?raw, "unknown scan mode, using public");
            ScanMode::Public
        }
        _ => ScanMode::Public,
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// First hop of `x-forwarded-for`, then `x-real-ip`, then the socket peer.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
        .filter(|v| !v.is_empty())
        .or_else(|| header_str(headers, "x-real-ip"))
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

fn geo_hints(headers: &HeaderMap) -> GeoHints {
    GeoHints {
        country: header_str(headers, "cf-ipcountry")
            .or_else(|| header_str(headers, "x-vercel-ip-country")),
        region: header_str(headers, "x-vercel-ip-country-region"),
        city: header_str(headers, "x-vercel-ip-city"),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::api::tests::{body_string, locked_app, open_app, service, service_with_db};
    use crate::model::{EntityType, IssueTokenRequest, ResolutionType};
    use plantops_core::ListParams;
    use plantops_sql::SQLStore;

    fn issue(svc: &crate::service::QrService) -> crate::model::Token {
        svc.issue_token(&IssueTokenRequest {
            entity_type: EntityType::Product,
            entity_id: "p1".into(),
            redirect_url: Some("https://override.example/p1".into()),
            version_id: None,
            expires_at: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn operational_scan_redirects() {
        let svc = service();
        let token = issue(&svc);
        let app = open_app(svc.clone());

        let resp = app
            .oneshot(
                Request::builder()
                    .uri(format!("/q/{}?mode=operational", token.value))
                    .header("x-forwarded-for", "198.51.100.7, 10.0.0.1")
                    .header("cf-ipcountry", "DE")
                    .header("user-agent", "scanner/1.0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()["location"], "https://override.example/p1");
        assert_eq!(resp.headers()["cache-control"], "no-store");

        let log = svc.scans_for_token(&token.id, &ListParams::default()).unwrap();
        let event = &log.items[0];
        assert_eq!(event.resolution_type, ResolutionType::Token);
        assert_eq!(event.ip_address.as_deref(), Some("198.51.100.7"));
        assert_eq!(event.geo.country.as_deref(), Some("DE"));
        assert_eq!(event.user_agent.as_deref(), Some("scanner/1.0"));
        assert_eq!(event.mode, ScanMode::Operational);
    }

    #[tokio::test]
    async fn operational_without_permission_is_public() {
        let svc = service();
        let token = issue(&svc);
        let app = locked_app(svc.clone());

        let resp = app
            .oneshot(
                Request::builder()
                    .uri(format!("/q/{}?mode=operational", token.value))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_string(resp).await.contains("VERIFIED"));
        let log = svc.scans_for_token(&token.id, &ListParams::default()).unwrap();
        assert_eq!(log.items[0].mode, ScanMode::Public);
        assert_eq!(log.items[0].resolution_type, ResolutionType::Verification);
    }

    #[tokio::test]
    async fn malformed_and_unknown_get_identical_responses() {
        let svc = service();
        let mut bodies = Vec::new();
        for path in [
            "/q/qr_doesnotexist",
            "/q/garbage",
            "/q/qr_%20bad",
            "/q/qr_%FF",
            "/q/%C3%28",
        ] {
            let resp = open_app(svc.clone())
                .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{path}");
            assert_eq!(resp.headers()["cache-control"], "no-store");
            bodies.push(body_string(resp).await);
        }
        assert!(bodies.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn unreadable_query_falls_back_to_public() {
        let svc = service();
        let token = issue(&svc);
        let resp = open_app(svc.clone())
            .oneshot(
                Request::builder()
                    .uri(format!("/q/{}?mode=public&mode=operational", token.value))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["cache-control"], "no-store");
        assert!(body_string(resp).await.contains("VERIFIED"));
        let log = svc.scans_for_token(&token.id, &ListParams::default()).unwrap();
        assert_eq!(log.items[0].mode, ScanMode::Public);
    }

    #[tokio::test]
    async fn failed_audit_serves_no_redirect() {
        let (db, svc) = service_with_db();
        let token = issue(&svc);
        db.exec("DROP TABLE scan_events", &[]).unwrap();

        let resp = open_app(svc.clone())
            .oneshot(
                Request::builder()
                    .uri(format!("/q/{}?mode=operational", token.value))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(resp.headers().get("location").is_none());
        assert_eq!(resp.headers()["cache-control"], "no-store");
        let body = body_string(resp).await;
        assert!(!body.contains("override.example"));
        assert_eq!(svc.get_token(&token.id).unwrap().scan_count, 0);
    }

    #[tokio::test]
    async fn calibration_token_renders_preview() {
        let svc = service();
        let resp = open_app(svc.clone())
            .oneshot(
                Request::builder()
                    .uri("/q/qr_calibration")
                    .header("user-agent", "tuning-phone")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_string(resp).await.contains("Calibration preview"));
        assert_eq!(svc.calibration().snapshot()[0].user_agent, "tuning-phone");
    }

    #[test]
    fn ip_fallbacks() {
        let peer: SocketAddr = "192.0.2.1:5555".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("192.0.2.1"));
        assert_eq!(client_ip(&headers, None), None);

        headers.insert("x-real-ip", "192.0.2.50".parse().unwrap());
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("192.0.2.50"));

        headers.insert("x-forwarded-for", " 192.0.2.99 , 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("192.0.2.99"));
    }

    #[test]
    fn geo_from_edge_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-vercel-ip-country", "US".parse().unwrap());
        headers.insert("x-vercel-ip-country-region", "CA".parse().unwrap());
        headers.insert("x-vercel-ip-city", "Oakland".parse().unwrap());
        let geo = geo_hints(&headers);
        assert_eq!(geo.country.as_deref(), Some("US"));
        assert_eq!(geo.region.as_deref(), Some("CA"));
        assert_eq!(geo.city.as_deref(), Some("Oakland"));
    }
}
