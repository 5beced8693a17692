//! HTTP and WebSocket boundary.
//!
//! Display clients connect to `/ws` and receive one `radar-data` message per
//! live sample. The JSON endpoints expose the history log and the display
//! state; `/radar.svg` renders the current radar frame.

use std::future::Future;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::config::DisplayConfig;
use crate::display::{render, HistoryRow, LinkState, Mode, Statistics, SvgSurface};
use crate::error::{Error, Result};
use crate::hub::{BroadcastHub, RadarEvent};
use crate::mode::ModeHandle;
use crate::store::SampleStore;

/// Shared state behind every route.
#[derive(Debug, Clone)]
pub struct AppState {
    mode: ModeHandle,
    hub: Arc<BroadcastHub>,
    store: SampleStore,
    display: DisplayConfig,
}

impl AppState {
    /// Bundle the pieces the routes need.
    #[must_use]
    pub fn new(mode: ModeHandle, hub: Arc<BroadcastHub>, store: SampleStore, display: DisplayConfig) -> Self {
        Self {
            mode,
            hub,
            store,
            display,
        }
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/history", get(history_handler))
        .route("/api/display", get(display_handler))
        .route("/radar.svg", get(radar_handler))
        .route("/api/link/connect", post(connect_handler))
        .route("/api/link/disconnect", post(disconnect_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("listening on http://{addr}");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Error body returned by the JSON endpoints.
#[derive(Debug)]
struct ApiError {
    error: Error,
    mode: Option<Mode>,
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self { error, mode: None }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.error.is_link_error() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = serde_json::json!({
            "error": self.error.to_string(),
            "mode": self.mode,
        });
        (status, Json(body)).into_response()
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| client_session(socket, state.hub))
}

/// Push live samples to one client until either side goes away.
async fn client_session(socket: WebSocket, hub: Arc<BroadcastHub>) {
    let mut subscription = hub.connect();
    let id = subscription.id();
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            sample = subscription.recv() => {
                let Some(sample) = sample else { break };
                let text = match RadarEvent::new(&sample).to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(client = %id, "cannot encode sample: {e}");
                        continue;
                    }
                };
                if sender.send(Message::Text(text)).await.is_err() {
                    debug!(client = %id, "send failed");
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    hub.disconnect(id);
}

async fn history_handler(State(state): State<AppState>) -> std::result::Result<Response, ApiError> {
    let store = state.store.clone();
    let samples = tokio::task::spawn_blocking(move || store.load_all())
        .await
        .map_err(|e| Error::internal(format!("history task failed: {e}")))??;
    Ok(Json(samples).into_response())
}

/// Everything the dashboard shows, in one document.
#[derive(Debug, Serialize)]
struct DisplayView {
    mode: Mode,
    link_state: LinkState,
    clients: usize,
    statistics: Statistics,
    since_last: String,
    history: Vec<HistoryRow>,
}

async fn display_handler(State(state): State<AppState>) -> Json<DisplayView> {
    let snapshot = state.mode.display().snapshot();
    let statistics = snapshot.statistics(Utc::now());
    Json(DisplayView {
        mode: snapshot.mode(),
        link_state: snapshot.link_state(),
        clients: state.hub.client_count(),
        since_last: statistics.since_last_label(),
        statistics,
        history: snapshot.history_rows(),
    })
}

async fn radar_handler(State(state): State<AppState>) -> Response {
    let snapshot = state.mode.display().snapshot();
    let mut surface = SvgSurface::new(state.display.width, state.display.height);
    render(&snapshot, &mut surface, Utc::now());
    ([(header::CONTENT_TYPE, "image/svg+xml")], surface.finish()).into_response()
}

async fn connect_handler(State(state): State<AppState>) -> std::result::Result<Response, ApiError> {
    match state.mode.connect().await {
        Ok(mode) => Ok(Json(serde_json::json!({ "mode": mode })).into_response()),
        Err(error) => Err(ApiError {
            error,
            mode: Some(state.mode.mode()),
        }),
    }
}

async fn disconnect_handler(State(state): State<AppState>) -> std::result::Result<Response, ApiError> {
    let mode = state.mode.disconnect().await?;
    Ok(Json(serde_json::json!({ "mode": mode })).into_response())
}
