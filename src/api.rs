//! REST API server for the copilot
//!
//! Exposes conversation sessions over HTTP. Sessions live in memory until the
//! client discards them (`DELETE /api/sessions/:id`) or they sit idle past
//! the configured timeout. Each one sits behind its own mutex so two
//! requests never run turns against the same history at once.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

use crate::agent::ReasoningAgent;
use crate::config::CopilotConfig;
use crate::error::CopilotError;
use crate::models::ConversationTurn;
use crate::session::{user_message, ConversationSession, SUGGESTED_QUESTIONS};

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatRequest {
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatReply {
    pub session_id: String,
    pub answer: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

/// One live session plus the time it was last handed to a request.
struct SessionSlot {
    session: Mutex<ConversationSession>,
    /// Milliseconds since the owning state's epoch
    last_used_ms: AtomicU64,
}

#[derive(Clone)]
pub struct ApiState {
    agent: Arc<ReasoningAgent>,
    sessions: Arc<RwLock<HashMap<Uuid, Arc<SessionSlot>>>>,
    turn_timeout: Option<Duration>,
    idle_timeout: Duration,
    epoch: Instant,
}

impl ApiState {
    pub fn new(agent: Arc<ReasoningAgent>, turn_timeout: Option<Duration>, idle_timeout: Duration) -> Self {
        Self {
            agent,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            turn_timeout,
            idle_timeout,
            epoch: Instant::now(),
        }
    }

    pub fn from_config(agent: Arc<ReasoningAgent>, config: &CopilotConfig) -> Self {
        Self::new(agent, config.turn_timeout, config.session_idle_timeout)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn touch(&self, slot: &SessionSlot) {
        slot.last_used_ms.store(self.now_ms(), Ordering::Relaxed);
    }

    /// Existing session for `id`, or a fresh one registered under it.
    /// Opening a session sweeps out idle ones first.
    async fn session(&self, id: Uuid) -> Arc<SessionSlot> {
        if let Some(slot) = self.sessions.read().await.get(&id) {
            self.touch(slot);
            return slot.clone();
        }

        let mut sessions = self.sessions.write().await;
        if let Some(slot) = sessions.get(&id) {
            self.touch(slot);
            return slot.clone();
        }

        self.evict_idle(&mut sessions);

        info!(session_id = %id, "Opening session");
        let slot = Arc::new(SessionSlot {
            session: Mutex::new(
                ConversationSession::with_id(id, self.agent.clone())
                    .with_turn_timeout(self.turn_timeout),
            ),
            last_used_ms: AtomicU64::new(self.now_ms()),
        });
        sessions.insert(id, slot.clone());
        slot
    }

    /// Drop sessions idle past the timeout. Sessions mid-turn are kept.
    fn evict_idle(&self, sessions: &mut HashMap<Uuid, Arc<SessionSlot>>) {
        let now = self.now_ms();
        let idle_ms = self.idle_timeout.as_millis() as u64;
        let before = sessions.len();

        sessions.retain(|_, slot| {
            let idle = now.saturating_sub(slot.last_used_ms.load(Ordering::Relaxed)) >= idle_ms;
            !idle || slot.session.try_lock().is_err()
        });

        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "Evicted idle sessions");
        }
    }

    async fn remove(&self, id: &Uuid) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }
}

fn parse_session_id(value: Option<&str>) -> Result<Uuid, String> {
    match value {
        Some(v) if !v.trim().is_empty() => {
            Uuid::parse_str(v.trim()).map_err(|_| format!("Invalid session_id '{}'", v))
        }
        _ => Ok(Uuid::new_v4()),
    }
}

fn status_for(error: &CopilotError) -> StatusCode {
    match error {
        CopilotError::Invocation(_) => StatusCode::BAD_REQUEST,
        CopilotError::CredentialMissing(_) => StatusCode::SERVICE_UNAVAILABLE,
        CopilotError::AgentTermination(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::BAD_GATEWAY,
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn suggestions() -> Json<ApiResponse> {
    Json(ApiResponse::success(SUGGESTED_QUESTIONS))
}

/// =============================
/// Chat Endpoint
/// =============================

async fn chat_handler(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    if req.message.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Message must not be empty".into())),
        );
    }

    let session_id = match parse_session_id(req.session_id.as_deref()) {
        Ok(id) => id,
        Err(message) => return (StatusCode::BAD_REQUEST, Json(ApiResponse::error(message))),
    };

    info!(session_id = %session_id, "Received chat message");

    let slot = state.session(session_id).await;
    let mut session = slot.session.lock().await;
    let result = session.ask(&req.message).await;
    drop(session);
    state.touch(&slot);

    match result {
        Ok(answer) => (
            StatusCode::OK,
            Json(ApiResponse::success(ChatReply {
                session_id: session_id.to_string(),
                answer,
            })),
        ),
        Err(e) => (status_for(&e), Json(ApiResponse::error(user_message(&e)))),
    }
}

/// =============================
/// History Endpoint
/// =============================

async fn history_handler(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    let Ok(id) = Uuid::parse_str(&session_id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(format!("Invalid session_id '{}'", session_id))),
        );
    };

    let Some(slot) = state.sessions.read().await.get(&id).cloned() else {
        return (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("Unknown session {}", id))),
        );
    };

    let session = slot.session.lock().await;
    let turns: Vec<ConversationTurn> = session.history().visible().cloned().collect();
    (StatusCode::OK, Json(ApiResponse::success(turns)))
}

/// =============================
/// Discard Endpoint
/// =============================

async fn discard_handler(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    let Ok(id) = Uuid::parse_str(&session_id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(format!("Invalid session_id '{}'", session_id))),
        );
    };

    if state.remove(&id).await {
        info!(session_id = %id, "Session discarded");
        (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({ "session_id": id.to_string() }))),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("Unknown session {}", id))),
        )
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/suggestions", get(suggestions))
        .route("/api/chat", post(chat_handler))
        .route("/api/sessions/:session_id", axum::routing::delete(discard_handler))
        .route("/api/sessions/:session_id/history", get(history_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    agent: Arc<ReasoningAgent>,
    config: &CopilotConfig,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(ApiState::from_config(agent, config));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", config.port);
    info!("Local: http://127.0.0.1:{}", config.port);

    axum::serve(listener, router).await?;

    Ok(())
}
