// ============================
// promstream-backend/src/ws_router.rs
// ============================
//! HTTP router: WebSocket subscriptions, Prometheus exposition and the
//! dashboard layout.
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use prometheus::{Encoder, TextEncoder};
use promstream_common::DashboardLayout;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::connection::{CloseNotice, Transport};
use crate::dashboard;
use crate::error::AppError;
use crate::middleware::basic_auth;
use crate::snapshot::MetricsSource;
use crate::AppState;

/// Sending half of an upgraded WebSocket
pub struct WsTransport {
    sink: SplitSink<WebSocket, Message>,
}

impl WsTransport {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, payload: Bytes) -> Result<(), AppError> {
        let text = std::str::from_utf8(&payload)
            .map_err(|e| AppError::TransportWrite(e.to_string()))?;
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| AppError::TransportWrite(e.to_string()))
    }

    async fn close(&mut self, notice: Option<CloseNotice>) -> Result<(), AppError> {
        if let Some(notice) = notice {
            let frame = CloseFrame {
                code: notice.code,
                reason: notice.reason.into(),
            };
            self.sink
                .send(Message::Close(Some(frame)))
                .await
                .map_err(|e| AppError::TransportWrite(e.to_string()))?;
        }
        self.sink
            .close()
            .await
            .map_err(|e| AppError::TransportWrite(e.to_string()))
    }
}

/// Create the router, mounted under the configured prefix
pub fn create_router(state: Arc<AppState>) -> Router {
    let mut routes = Router::new()
        .route("/ws", get(ws_handler))
        .route("/metrics", get(metrics_handler))
        .route("/dashboard", get(dashboard_handler));

    if let Some(credentials) = state.settings.basic_auth.clone() {
        routes = routes.layer(axum::middleware::from_fn_with_state(
            Arc::new(credentials),
            basic_auth,
        ));
    }

    let prefix = state.settings.prefix_uri.clone();
    let routes = routes.with_state(state);
    let router = if prefix.is_empty() {
        routes
    } else {
        Router::new().nest(&prefix, routes)
    };

    router.layer(TraceLayer::new_for_http())
}

/// Handler for WebSocket subscriptions
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sink, mut stream) = socket.split();

    let subscription = match state.hub.serve_connection(WsTransport::new(sink)).await {
        Ok(subscription) => subscription,
        Err(AppError::CapacityExceeded) => return,
        Err(e) => {
            warn!(error = %e, "failed to serve websocket");
            return;
        },
    };
    let id = subscription.id;

    // Subscribers don't send anything we act on; read only to notice the
    // peer going away. Once the writer is done the socket is dropped
    // without waiting for the peer's close reply.
    loop {
        tokio::select! {
            () = subscription.writer_done.cancelled() => {
                debug!(connection = %id, "writer finished, dropping socket");
                break;
            },
            message = stream.next() => match message {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {},
                Some(Err(e)) => {
                    debug!(connection = %id, error = %e, "websocket read error");
                    break;
                },
            },
        }
    }

    if let Err(e) = state.hub.unregister(id).await {
        debug!(connection = %id, error = %e, "unregister on disconnect");
    }
}

/// Prometheus text exposition of the metrics source
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let families = state.snapshotter.source().gather()?;
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;

    Ok((
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response())
}

/// The configured dashboard layout, or one derived from the current snapshot
pub async fn dashboard_handler(State(state): State<Arc<AppState>>) -> Json<DashboardLayout> {
    if let Some(layout) = &state.settings.dashboard {
        return Json(layout.clone());
    }

    match state.snapshotter.gather() {
        Ok(samples) => Json(dashboard::default_layout(&samples)),
        Err(e) => {
            warn!(error = %e, "cannot derive default dashboard");
            Json(Vec::new())
        },
    }
}
