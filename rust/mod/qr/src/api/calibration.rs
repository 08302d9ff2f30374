use std::convert::Infallible;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};

use plantops_core::ServiceError;

use crate::calibration::{observe, StreamFrame};
use crate::model::CalibrationNotify;
use crate::permissions;

use super::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/qr/v1/calibration/scans", post(notify))
        .route("/qr/v1/calibration/stream", get(stream))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// POST /qr/v1/calibration/scans
// ---------------------------------------------------------------------------

async fn notify(
    State(state): State<AppState>,
    payload: Result<Json<CalibrationNotify>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let Json(body) = payload.map_err(|e| {
        warn!(error = %e, "malformed calibration payload");
        ServiceError::Validation(e.body_text())
    })?;
    let seq = state
        .service
        .notify_calibration(&body.token, &body.user_agent)
        .inspect_err(|e| warn!(error = %e, "calibration notify rejected"))?;
    Ok(Json(serde_json::json!({ "accepted": true, "seq": seq })))
}

// ---------------------------------------------------------------------------
// GET /qr/v1/calibration/stream
// ---------------------------------------------------------------------------

async fn stream(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServiceError> {
    state
        .auth
        .check(&headers, permissions::CALIBRATION_STREAM)?;

    let poll = Duration::from_millis(state.service.config().calibration_poll_ms);
    let rx = observe(state.service.calibration().clone(), poll);
    info!("calibration observer attached");

    Ok(Sse::new(ReceiverStream::new(rx).map(|frame| Ok(to_event(frame)))))
}

fn to_event(frame: StreamFrame) -> Event {
    match frame {
        StreamFrame::Connected => Event::default().event("connected").data("connected"),
        StreamFrame::Events(events) => match Event::default().event("scans").json_data(&events) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "failed to encode calibration events");
                Event::default().comment("encode-error")
            }
        },
        StreamFrame::KeepAlive => Event::default().comment("keep-alive"),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::api::tests::{locked_app, open_app, service};

    fn notify_req(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/qr/v1/calibration/scans")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn notify_accepts_only_calibration_token() {
        let svc = service();

        let resp = open_app(svc.clone())
            .oneshot(notify_req(r#"{"token":"qr_calibration","userAgent":"phone"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = open_app(svc.clone())
            .oneshot(notify_req(r#"{"token":"qr_abc123","userAgent":"phone"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = open_app(svc.clone())
            .oneshot(notify_req("not json"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        assert_eq!(svc.calibration().len(), 1);
    }

    #[tokio::test]
    async fn stream_requires_permission() {
        let resp = locked_app(service())
            .oneshot(
                Request::builder()
                    .uri("/qr/v1/calibration/stream")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn stream_sends_connected_then_backlog() {
        let svc = service();
        svc.notify_calibration("qr_calibration", "phone").unwrap();

        let resp = open_app(svc)
            .oneshot(
                Request::builder()
                    .uri("/qr/v1/calibration/stream")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "text/event-stream");

        let mut body = resp.into_body().into_data_stream();
        let mut text = String::new();
        while !text.contains("keep-alive") {
            let chunk = body.next().await.unwrap().unwrap();
            text.push_str(&String::from_utf8_lossy(&chunk));
        }
        let connected = text.find("event: connected").unwrap();
        let scans = text.find("event: scans").unwrap();
        assert!(connected < scans);
        assert!(text.contains(r#""userAgent":"phone""#));
    }
}
