// =============
// tests/unit/router_tests.rs
// =============
//! Plain HTTP routes of the router: exposition, dashboard, auth and prefix.
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use promstream_backend::config::{BasicAuth, Settings};
use promstream_backend::snapshot::MetricsSource;
use promstream_backend::ws_router::create_router;
use promstream_common::{DashboardCell, DashboardLayout};
use tower::ServiceExt;

use crate::test_utils::{sample_registry, test_state, FailingSource};

fn router(settings: Settings, source: Arc<dyn MetricsSource>) -> Router {
    create_router(test_state(settings, source))
}

async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_string(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_metrics_route_serves_text_exposition() {
    let app = router(Settings::default(), Arc::new(sample_registry()));

    let response = get(app, "/metrics").await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("# TYPE requests_total counter"));
    assert!(body.contains("requests_total{code=\"200\"} 3"));
    assert!(body.contains("latency_seconds_bucket{le=\"+Inf\"} 1"));
}

#[tokio::test]
async fn test_metrics_route_reports_gather_failure() {
    let app = router(Settings::default(), Arc::new(FailingSource));

    let response = get(app, "/metrics").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_dashboard_serves_configured_layout() {
    let layout: DashboardLayout = vec![
        vec![DashboardCell::PlainName("requests_total".to_string())],
        vec![
            DashboardCell::Named {
                name: "latency_seconds".to_string(),
                short: Some("LAT".to_string()),
            },
            DashboardCell::Named {
                name: "latency_seconds_count".to_string(),
                short: None,
            },
        ],
    ];
    let settings = Settings {
        dashboard: Some(layout.clone()),
        ..Settings::default()
    };
    let app = router(settings, Arc::new(sample_registry()));

    let response = get(app, "/dashboard").await;
    assert_eq!(response.status(), StatusCode::OK);
    let served: DashboardLayout = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(served, layout);
}

#[tokio::test]
async fn test_dashboard_defaults_to_one_row_per_metric() {
    let app = router(Settings::default(), Arc::new(sample_registry()));

    let response = get(app, "/dashboard").await;
    assert_eq!(response.status(), StatusCode::OK);
    let served: DashboardLayout = serde_json::from_str(&body_string(response).await).unwrap();

    let names: Vec<&str> = served.iter().map(|row| row[0].name()).collect();
    assert_eq!(
        names,
        vec![
            "latency_seconds",
            "latency_seconds_count",
            "latency_seconds_bucket",
            "requests_total",
        ]
    );
}

#[tokio::test]
async fn test_dashboard_empty_when_source_fails() {
    let app = router(Settings::default(), Arc::new(FailingSource));

    let response = get(app, "/dashboard").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "[]");
}

#[tokio::test]
async fn test_basic_auth_guards_every_route() {
    let settings = Settings {
        basic_auth: Some(BasicAuth {
            username: "admin".to_string(),
            password: "hunter2".to_string(),
        }),
        ..Settings::default()
    };
    let app = router(settings, Arc::new(sample_registry()));

    for uri in ["/metrics", "/dashboard", "/ws"] {
        let response = get(app.clone(), uri).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    let credentials = STANDARD.encode("admin:hunter2");
    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .header(header::AUTHORIZATION, format!("Basic {credentials}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_routes_mount_under_prefix() {
    let settings = Settings {
        prefix_uri: "/live".to_string(),
        ..Settings::default()
    };
    let app = router(settings, Arc::new(sample_registry()));

    assert_eq!(get(app.clone(), "/live/metrics").await.status(), StatusCode::OK);
    assert_eq!(get(app.clone(), "/live/dashboard").await.status(), StatusCode::OK);
    assert_eq!(get(app, "/metrics").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_ws_route_requires_upgrade() {
    let app = router(Settings::default(), Arc::new(sample_registry()));

    let response = get(app, "/ws").await;
    assert!(response.status().is_client_error());
}
