use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Request, State};
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::Method;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use contracts::{
    ApiError, ChatDraft, ChatMessage, Difficulty, ErrorCode, EventDraft, GameEvent, NewSession,
    Player, SessionView, SyncConfig, SCHEMA_VERSION_V1,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use session_core::{build_timeline, reconcile, Board, TimelineEntry};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::client::{announce_player, mint_player_id};
use crate::clock::Clock;
use crate::log::{EventLog, LocalEventLog};
use crate::puzzles::PuzzleStore;
use crate::{PuzzleStoreError, TransportError};

include!("error.rs");
include!("state.rs");
include!("routes/sessions.rs");
include!("routes/stream.rs");
include!("util.rs");

pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), ServerError> {
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "session server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/sessions", post(create_session).get(list_sessions))
        .route("/api/v1/sessions/{session_id}", get(get_session))
        .route("/api/v1/sessions/{session_id}/players", post(join_player))
        .route("/api/v1/sessions/{session_id}/events", post(append_event))
        .route("/api/v1/sessions/{session_id}/chat", post(append_chat))
        .route("/api/v1/sessions/{session_id}/board", get(get_board))
        .route("/api/v1/sessions/{session_id}/timeline", get(get_timeline))
        .route("/api/v1/sessions/{session_id}/stream", get(stream_session))
        .layer(middleware::from_fn(cors_middleware))
        .with_state(state)
}

async fn cors_middleware(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = Response::new(axum::body::Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut());
    response
}
