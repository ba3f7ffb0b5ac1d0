use std::{collections::HashMap, sync::{Arc, Mutex}, sync::atomic::{AtomicU64, Ordering}};

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::{get, post}, Json, Router};
use dungeon_core::{create_environment_with_config, list_agents, list_environments, Agent, EngineError, Environment, Observation, Snapshot, ToolCall};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::{runtime::Handle, sync::RwLock, task::{spawn_blocking, JoinError}};
use tracing::{error, info, warn};

type ApiError = (StatusCode, String);

/// Each environment has its own lock so a long step does not stall the others.
type SharedEnv = Arc<tokio::sync::Mutex<Box<dyn Environment>>>;

#[derive(Clone)]
pub struct AppState {
    store: Arc<RwLock<HashMap<String, SharedEnv>>>,
    id_ctr: Arc<AtomicU64>,
    /// Answers `/act`; one instance so its solution cache survives across turns.
    agent: Arc<Mutex<Box<dyn Agent>>>,
}

impl AppState {
    fn new(agent: Box<dyn Agent>) -> Self {
        Self {
            store: Arc::new(RwLock::new(HashMap::new())),
            id_ctr: Arc::new(AtomicU64::new(1)),
            agent: Arc::new(Mutex::new(agent)),
        }
    }
    fn next_id(&self) -> String { format!("env-{}", self.id_ctr.fetch_add(1, Ordering::Relaxed)) }

    async fn env(&self, env_id: &str) -> Result<SharedEnv, ApiError> {
        self.store.read().await.get(env_id).cloned().ok_or_else(|| not_found(env_id))
    }
}

#[derive(Deserialize)]
pub struct InitRequest {
    pub env_type: String,
    #[serde(default)]
    pub config: Option<JsonValue>,
}

#[derive(Serialize)]
pub struct InitResponse {
    pub env_id: String,
    pub observation: Observation,
}

#[derive(Deserialize)]
pub struct StepRequest {
    pub env_id: String,
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Deserialize)]
pub struct IdRequest { pub env_id: String }

async fn list_envs() -> impl IntoResponse { Json(list_environments()) }

async fn list_registered_agents() -> impl IntoResponse { Json(list_agents()) }

fn not_found(env_id: &str) -> ApiError { (StatusCode::NOT_FOUND, format!("env {env_id} not found")) }

#[axum::debug_handler]
async fn initialize(State(state): State<AppState>, Json(req): Json<InitRequest>) -> Result<Json<InitResponse>, ApiError> {
    let mut env = create_environment_with_config(&req.env_type, req.config).map_err(map_engine_err)?;
    let obs = env.initialize().await.map_err(map_engine_err)?;
    let id = state.next_id();
    info!(env_id = %id, env_type = %req.env_type, "environment initialized");
    state.store.write().await.insert(id.clone(), Arc::new(tokio::sync::Mutex::new(env)));
    Ok(Json(InitResponse { env_id: id, observation: obs }))
}

#[axum::debug_handler]
async fn step(State(state): State<AppState>, Json(req): Json<StepRequest>) -> Result<Json<Observation>, ApiError> {
    let env = state.env(&req.env_id).await?;
    // A step may solve a map; keep it off the async workers.
    let handle = Handle::current();
    let obs = spawn_blocking(move || {
        handle.block_on(async move {
            let mut guard = env.lock().await;
            let obs = guard.step(req.tool_calls).await;
            obs
        })
    })
    .await
    .map_err(map_join_err)?
    .map_err(map_engine_err)?;
    Ok(Json(obs))
}

#[axum::debug_handler]
async fn checkpoint(State(state): State<AppState>, Json(req): Json<IdRequest>) -> Result<Json<Snapshot>, ApiError> {
    let env = state.env(&req.env_id).await?;
    let snap = env.lock().await.checkpoint().await.map_err(map_engine_err)?;
    Ok(Json(snap))
}

#[axum::debug_handler]
async fn terminate(State(state): State<AppState>, Json(req): Json<IdRequest>) -> Result<Json<Observation>, ApiError> {
    let env = state.store.write().await.remove(&req.env_id).ok_or_else(|| not_found(&req.env_id))?;
    let obs = env.lock().await.terminate().await.map_err(map_engine_err)?;
    info!(env_id = %req.env_id, "environment terminated");
    Ok(Json(obs))
}

/// One turn of the game-server protocol: the request body goes to the agent as-is.
#[axum::debug_handler]
async fn act(State(state): State<AppState>, Json(req): Json<JsonValue>) -> Result<Json<JsonValue>, ApiError> {
    let agent = Arc::clone(&state.agent);
    let response = spawn_blocking(move || {
        // A panicked turn leaves the agent usable; its state is rebuilt from each request.
        let mut agent = agent.lock().unwrap_or_else(|e| e.into_inner());
        agent.act(req)
    })
    .await
    .map_err(map_join_err)?
    .map_err(map_engine_err)?;
    Ok(Json(response))
}

fn map_join_err(err: JoinError) -> ApiError {
    error!(error = %err, "request handler panicked");
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
}

fn map_engine_err(err: EngineError) -> ApiError {
    warn!(error = %err, "request failed");
    match err {
        EngineError::Validation(s) => (StatusCode::BAD_REQUEST, s),
        EngineError::NotFound(s) => (StatusCode::NOT_FOUND, s),
        EngineError::Internal(s) => (StatusCode::INTERNAL_SERVER_ERROR, s),
    }
}

pub fn make_app(agent: Box<dyn Agent>) -> Router {
    let state = AppState::new(agent);
    Router::new()
        .route("/envs", get(list_envs))
        .route("/agents", get(list_registered_agents))
        .route("/initialize", post(initialize))
        .route("/step", post(step))
        .route("/checkpoint", post(checkpoint))
        .route("/terminate", post(terminate))
        .route("/act", post(act))
        .with_state(state)
}
