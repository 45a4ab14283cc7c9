use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use frame_enhance_api::{router, AppState};
use frame_enhance_common::config::FilterConfig;
use frame_enhance_pipeline::shared::{ActiveConfig, SharedConfig};
use frame_enhance_pipeline::sink::{multipart, StreamHub};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> (Router, Arc<SharedConfig>, Arc<StreamHub>) {
    let shared = Arc::new(SharedConfig::new(ActiveConfig {
        filters: FilterConfig::default(),
        selector: "0".parse().unwrap(),
    }));
    let hub = StreamHub::new(4, 8);
    let router = router(AppState {
        shared: Arc::clone(&shared),
        hub: Arc::clone(&hub),
    });
    (router, shared, hub)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_config(body: &str) -> Request<Body> {
    Request::post("/config")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn get_config_returns_current_settings() {
    let (app, _, _) = app();
    let response = app
        .oneshot(Request::get("/config").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({"clahe": false, "unsharp_amount": 0.0, "denoise": false, "source": "0"})
    );
}

#[tokio::test]
async fn post_config_merges_and_echoes() {
    let (app, shared, _) = app();
    let response = app
        .oneshot(post_config(r#"{"clahe": true, "unsharp_amount": 1.5}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({
            "status": "updated",
            "config": {"clahe": true, "unsharp_amount": 1.5, "denoise": false, "source": "0"}
        })
    );

    let snapshot = shared.snapshot();
    assert!(snapshot.config.filters.clahe);
    assert_eq!(snapshot.source_generation, 0);
}

#[tokio::test]
async fn source_change_bumps_generation() {
    let (app, shared, _) = app();
    let response = app
        .oneshot(post_config(r#"{"source": "clips/sample.mp4"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let snapshot = shared.snapshot();
    assert_eq!(snapshot.config.selector.to_string(), "clips/sample.mp4");
    assert_eq!(snapshot.source_generation, 1);
}

#[tokio::test]
async fn malformed_body_is_rejected_without_change() {
    let (app, shared, _) = app();
    let before = shared.snapshot();

    for body in [
        r#"{"clahe": "yes"}"#,
        r#"{"clahe": true"#,
        r#"{"clahe": true, "unsharp_amount": -2.0}"#,
        r#"{"clahe": true, "source": ""}"#,
    ] {
        let response = app.clone().oneshot(post_config(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
        let body = json_body(response).await;
        assert_eq!(body["status"], "error");
        assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
    }
    assert_eq!(shared.snapshot(), before);
}

#[tokio::test]
async fn video_feed_streams_multipart_parts() {
    let (app, _, hub) = app();
    let response = app
        .oneshot(Request::get("/video_feed").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "multipart/x-mixed-replace; boundary=frame"
    );
    assert_eq!(hub.viewer_count(), 1);

    let part = multipart::encode_part(b"not-really-a-jpeg");
    hub.publish(part.clone());
    let mut body = response.into_body();
    let frame = body.frame().await.unwrap().unwrap();
    assert_eq!(frame.into_data().unwrap(), part);

    drop(body);
    assert_eq!(hub.viewer_count(), 0);
}

#[tokio::test]
async fn video_feed_ends_when_hub_closes() {
    let (app, _, hub) = app();
    let response = app
        .oneshot(Request::get("/video_feed").body(Body::empty()).unwrap())
        .await
        .unwrap();
    hub.close();
    let collected = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(collected, Bytes::new());
}

#[tokio::test]
async fn health_reports_viewers() {
    let (app, _, hub) = app();
    let _viewer = hub.subscribe();
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(json_body(response).await, json!({"status": "ok", "viewers": 1}));
}

#[tokio::test]
async fn index_embeds_stream() {
    let (app, _, _) = app();
    let response = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = response.into_body().collect().await.unwrap().to_bytes();
    let html = String::from_utf8(html.to_vec()).unwrap();
    assert!(html.contains(r#"src="/video_feed""#));
    assert!(html.contains("fetch('/config'"));
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let (app, _, _) = app();
    let response = app
        .oneshot(
            Request::get("/config")
                .header(header::ORIGIN, "http://localhost:3000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}
