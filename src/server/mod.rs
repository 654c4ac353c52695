//! HTTP API server for session submission and querying.
//!
//! Provides REST endpoints for submitting sources, inspecting session
//! progress, and asking questions against completed sessions.

use crate::error::HarkError;
use crate::orchestrator::Orchestrator;
use crate::retrieval::QueryEngine;
use crate::store::{Session, SessionStore};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Shared application state.
pub struct AppState {
    pub store: Arc<SessionStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub query_engine: Arc<QueryEngine>,
}

/// Build the API router.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/sessions", post(create_session).get(list_sessions))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/query", post(query_session))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve the API until the process is stopped.
pub async fn run_server(host: &str, port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct CreateSessionRequest {
    subject_id: i64,
    source_url: String,
    uploaded_by: i64,
}

#[derive(Serialize)]
struct SessionResponse {
    #[serde(flatten)]
    session: Session,
}

#[derive(Serialize)]
struct SessionListResponse {
    sessions: Vec<Session>,
    total: usize,
}

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Map an error to its HTTP status.
fn status_for(err: &HarkError) -> StatusCode {
    match err {
        HarkError::NotFound(_) => StatusCode::NOT_FOUND,
        HarkError::Conflict(_) => StatusCode::CONFLICT,
        HarkError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        HarkError::TranscriptTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: HarkError) -> Response {
    (
        status_for(&err),
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Response {
    if url::Url::parse(&req.source_url).is_err() {
        return error_response(HarkError::InvalidInput(format!(
            "Invalid source URL: {}",
            req.source_url
        )));
    }

    match state
        .store
        .create_session(req.subject_id, &req.source_url, req.uploaded_by)
    {
        Ok(session) => {
            let session_id = session.session_id;
            let orchestrator = state.orchestrator.clone();
            // Fire and forget: the session row carries progress from here.
            tokio::spawn(async move {
                orchestrator.process_session(session_id).await;
            });
            (StatusCode::CREATED, Json(SessionResponse { session })).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn get_session(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    match state.store.get_session(id) {
        Ok(Some(session)) => Json(SessionResponse { session }).into_response(),
        Ok(None) => error_response(HarkError::NotFound(format!("Session not found: {}", id))),
        Err(e) => error_response(e),
    }
}

async fn list_sessions(State(state): State<Arc<AppState>>) -> Response {
    match state.store.list_sessions() {
        Ok(sessions) => Json(SessionListResponse {
            total: sessions.len(),
            sessions,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn query_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<QueryRequest>,
) -> Response {
    if req.question.trim().is_empty() {
        return error_response(HarkError::InvalidInput(
            "Question must not be empty".to_string(),
        ));
    }

    match state.query_engine.answer(id, &req.question).await {
        Ok(answer) => Json(answer).into_response(),
        Err(e) => error_response(e),
    }
}
