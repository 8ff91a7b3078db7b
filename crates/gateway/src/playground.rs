//! Playground API: chat with catalog agents over HTTP.
//!
//! Endpoints (nested under `/v1/playground`):
//!
//! - `GET    /status`                   — Playground availability
//! - `GET    /agents`                   — Catalog with tool connection state
//! - `POST   /agents/{agent_id}/runs`   — Send a message to an agent
//! - `GET    /sessions`                 — Active sessions
//! - `DELETE /sessions/{session_id}`    — Shut a session down

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use easel_agent::{Agent, AgentFactory, AgentKind, ConnectionState};

/// One live conversation.
struct SessionEntry {
    agent: Arc<Mutex<Agent>>,
    kind: AgentKind,
    user_id: Option<String>,
    created_at: DateTime<Utc>,
    /// Insertion order, oldest first
    seq: u64,
}

/// Shared state for the playground.
pub struct PlaygroundState {
    factory: AgentFactory,
    sessions: RwLock<HashMap<String, SessionEntry>>,
    max_sessions: usize,
    next_seq: AtomicU64,
}

pub type SharedPlaygroundState = Arc<PlaygroundState>;

impl PlaygroundState {
    pub fn new(factory: AgentFactory, max_sessions: usize) -> Self {
        Self {
            factory,
            sessions: RwLock::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
            next_seq: AtomicU64::new(0),
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Shut down every session. Used when the server stops.
    pub async fn shutdown_all(&self) {
        let drained: Vec<_> = self.sessions.write().await.drain().collect();
        for (session_id, entry) in drained {
            entry.agent.lock().await.shutdown().await;
            info!(session_id = %session_id, "Session shut down");
        }
    }

    /// Find the agent for `session_id` or create one.
    ///
    /// Returns the agent, whether it was just created and any sessions
    /// evicted to stay under the cap.
    async fn get_or_create(
        &self,
        kind: AgentKind,
        session_id: Option<String>,
        user_id: Option<String>,
    ) -> Result<(Arc<Mutex<Agent>>, bool, Vec<Arc<Mutex<Agent>>>), ApiError> {
        let mut sessions = self.sessions.write().await;

        if let Some(id) = session_id.as_deref() {
            if let Some(entry) = sessions.get(id) {
                if entry.kind != kind {
                    return Err(api_error(
                        StatusCode::CONFLICT,
                        format!("session '{id}' belongs to agent '{}'", entry.kind.id()),
                    ));
                }
                return Ok((Arc::clone(&entry.agent), false, Vec::new()));
            }
        }

        let agent = self.factory.create(kind, user_id.clone(), session_id);
        let id = agent.session_id().to_string();
        let agent = Arc::new(Mutex::new(agent));

        let mut evicted = Vec::new();
        while sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.seq)
                .map(|(id, _)| id.clone());
            let Some(oldest) = oldest else { break };
            if let Some(entry) = sessions.remove(&oldest) {
                info!(session_id = %oldest, "Evicting oldest session");
                evicted.push(entry.agent);
            }
        }

        sessions.insert(
            id,
            SessionEntry {
                agent: Arc::clone(&agent),
                kind,
                user_id,
                created_at: Utc::now(),
                seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            },
        );

        Ok((agent, true, evicted))
    }
}

/// Build the playground router.
pub fn playground_router(state: SharedPlaygroundState) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/agents", get(list_agents_handler))
        .route("/agents/{agent_id}/runs", post(run_handler))
        .route("/sessions", get(list_sessions_handler))
        .route("/sessions/{session_id}", delete(delete_session_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Serialize)]
struct StatusResponse {
    playground: &'static str,
}

#[derive(Serialize)]
struct AgentInfo {
    agent_id: &'static str,
    name: &'static str,
    description: &'static str,
    uses_tools: bool,
    /// Connection state of the most recent session, if any.
    tool_state: Option<ConnectionState>,
}

#[derive(Serialize)]
struct AgentListResponse {
    agents: Vec<AgentInfo>,
}

#[derive(Deserialize)]
struct RunRequest {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Serialize)]
struct RunResponse {
    session_id: String,
    agent_id: &'static str,
    content: String,
    tool_attached: bool,
}

#[derive(Serialize)]
struct SessionInfo {
    session_id: String,
    agent_id: &'static str,
    user_id: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct SessionListResponse {
    sessions: Vec<SessionInfo>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn status_handler() -> Json<StatusResponse> {
    Json(StatusResponse {
        playground: "available",
    })
}

async fn list_agents_handler(
    State(state): State<SharedPlaygroundState>,
) -> Json<AgentListResponse> {
    let sessions = state.sessions.read().await;

    let agents = AgentKind::ALL
        .into_iter()
        .map(|kind| {
            // A busy agent is mid-run; report nothing rather than wait.
            let tool_state = sessions
                .values()
                .filter(|entry| entry.kind == kind)
                .max_by_key(|entry| entry.seq)
                .and_then(|entry| entry.agent.try_lock().ok())
                .and_then(|agent| agent.tool_state());

            AgentInfo {
                agent_id: kind.id(),
                name: kind.name(),
                description: kind.description(),
                uses_tools: kind.uses_tools(),
                tool_state,
            }
        })
        .collect();

    Json(AgentListResponse { agents })
}

async fn run_handler(
    State(state): State<SharedPlaygroundState>,
    Path(agent_id): Path<String>,
    Json(req): Json<RunRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let kind = AgentKind::lookup(&agent_id).ok_or_else(|| {
        api_error(
            StatusCode::NOT_FOUND,
            format!("unknown agent '{agent_id}'"),
        )
    })?;

    if req.message.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "message must not be empty"));
    }

    let (agent, created, evicted) = state
        .get_or_create(kind, req.session_id, req.user_id)
        .await?;

    for old in evicted {
        tokio::spawn(async move {
            old.lock().await.shutdown().await;
        });
    }

    let mut agent = agent.lock().await;
    if created {
        agent.start().await;
    }

    match agent.run(&req.message).await {
        Ok(content) => Ok(Json(RunResponse {
            session_id: agent.session_id().to_string(),
            agent_id: agent.id(),
            content,
            tool_attached: agent.tool_attached(),
        })),
        Err(e) => {
            warn!(agent = agent.id(), session_id = %agent.session_id(), error = %e, "Agent run failed");
            Err(api_error(StatusCode::BAD_GATEWAY, e.to_string()))
        }
    }
}

async fn list_sessions_handler(
    State(state): State<SharedPlaygroundState>,
) -> Json<SessionListResponse> {
    let sessions = state.sessions.read().await;
    let mut entries: Vec<_> = sessions.iter().collect();
    entries.sort_by_key(|(_, entry)| entry.seq);

    let list = entries
        .into_iter()
        .map(|(id, entry)| SessionInfo {
            session_id: id.clone(),
            agent_id: entry.kind.id(),
            user_id: entry.user_id.clone(),
            created_at: entry.created_at,
        })
        .collect();

    Json(SessionListResponse { sessions: list })
}

async fn delete_session_handler(
    State(state): State<SharedPlaygroundState>,
    Path(session_id): Path<String>,
) -> StatusCode {
    let removed = state.sessions.write().await.remove(&session_id);
    match removed {
        Some(entry) => {
            entry.agent.lock().await.shutdown().await;
            info!(session_id = %session_id, "Session deleted");
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}
