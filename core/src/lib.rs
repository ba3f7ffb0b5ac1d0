//! Core contracts shared by the dungeon crates.
//! Environments (the simulated hosting game) and agents (per-turn deciders) are
//! both addressed through JSON so the HTTP service can stay engine-agnostic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::sync::{Arc, Mutex};

/// Canonical tool call: tool name and JSON-serializable arguments.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: Json,
}

/// Observation contract. Enforces presence of terminated/truncated; additional fields live in `data`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub terminated: bool,
    pub truncated: bool,
    /// Per-environment fields (map text, agent position, gold, reward_last, ...).
    #[serde(default)]
    pub data: Json,
}

/// Snapshot contract for checkpoint/restore.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub version: u32,
    pub engine: String,
    pub data: Json,
}

/// Engine errors mapped to HTTP responses by services.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Core async environment trait.
#[async_trait]
pub trait Environment: Send + Sync {
    async fn initialize(&mut self) -> Result<Observation, EngineError>;
    async fn step(&mut self, tool_calls: Vec<ToolCall>) -> Result<Observation, EngineError>;
    async fn checkpoint(&self) -> Result<Snapshot, EngineError>;
    async fn terminate(&mut self) -> Result<Observation, EngineError>;
}

// --------------------------
// Agents: trait + registry
// --------------------------

/// A per-turn decision maker: one request in, one response out.
///
/// Agents are synchronous; any heavy work (e.g. solving an MDP) runs inline
/// and callers decide whether to move it off an async executor.
pub trait Agent: Send {
    fn name(&self) -> &'static str;
    fn act(&mut self, request: Json) -> Result<Json, EngineError>;
}

/// Config-aware factory for constructing agents.
pub type AgentFactory = Arc<dyn Fn(Option<Json>) -> Result<Box<dyn Agent>, EngineError> + Send + Sync + 'static>;

static AGENT_REGISTRY: OnceLock<Mutex<HashMap<String, AgentFactory>>> = OnceLock::new();

/// Register an agent factory under a unique name. Overwrites any existing entry.
pub fn register_agent(name: &str, factory: AgentFactory) {
    let mut reg = AGENT_REGISTRY
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .expect("agent registry poisoned");
    reg.insert(name.to_string(), factory);
}

/// Instantiate a registered agent by name with optional JSON config.
pub fn create_agent_with_config(name: &str, config: Option<Json>) -> Result<Box<dyn Agent>, EngineError> {
    let reg = AGENT_REGISTRY
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .map_err(|_| EngineError::Internal("agent registry poisoned".into()))?;
    let f = reg
        .get(name)
        .ok_or_else(|| EngineError::NotFound(format!("unsupported agent: {name}")))?;
    f(config)
}

/// List registered agent names.
pub fn list_agents() -> Vec<String> {
    AGENT_REGISTRY
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .map(|reg| reg.keys().cloned().collect())
        .unwrap_or_default()
}

// ---------------------------------
// Environment factory + registry
// ---------------------------------

/// Config-aware factory for constructing environment instances.
pub type EnvConfigFactory = Arc<dyn Fn(Option<Json>) -> Result<Box<dyn Environment>, EngineError> + Send + Sync + 'static>;

static ENV_REGISTRY: OnceLock<Mutex<HashMap<String, EnvConfigFactory>>> = OnceLock::new();

/// Register a config-aware environment factory under a unique name.
pub fn register_environment_with_config(name: &str, factory: EnvConfigFactory) {
    let mut reg = ENV_REGISTRY
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .expect("env registry poisoned");
    reg.insert(name.to_string(), factory);
}

/// Instantiate a registered environment by name with optional JSON config.
pub fn create_environment_with_config(name: &str, config: Option<Json>) -> Result<Box<dyn Environment>, EngineError> {
    let reg = ENV_REGISTRY
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .map_err(|_| EngineError::Internal("env registry poisoned".into()))?;
    let f = reg
        .get(name)
        .ok_or_else(|| EngineError::NotFound(format!("unsupported environment: {name}")))?;
    f(config)
}

/// List registered environment names.
pub fn list_environments() -> Vec<String> {
    ENV_REGISTRY
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .map(|reg| reg.keys().cloned().collect())
        .unwrap_or_default()
}

// -----------------------
// Reproducibility traits
// -----------------------

/// Engines that support snapshotting.
pub trait ReproducibleEngine: Send + Sync {
    fn serialize_engine(&self) -> Result<Json, EngineError>;
    fn engine_name(&self) -> String;
}

/// Helper to build Snapshots from a ReproducibleEngine.
pub fn make_snapshot(engine: &dyn ReproducibleEngine, version: u32) -> Result<Snapshot, EngineError> {
    let data = engine.serialize_engine()?;
    let engine_name = engine.engine_name();
    Ok(Snapshot { version, engine: engine_name, data })
}

/// Decode an optional JSON config into `T`, falling back to `T::default()`.
pub fn config_from_json<T>(cfg: Option<Json>) -> Result<T, EngineError>
where
    T: serde::de::DeserializeOwned + Default,
{
    match cfg {
        Some(v) => serde_json::from_value(v).map_err(|e| EngineError::Validation(format!("bad config: {e}"))),
        None => Ok(T::default()),
    }
}

// -----------------------
// Tests
// -----------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoAgent;
    impl Agent for EchoAgent {
        fn name(&self) -> &'static str { "echo" }
        fn act(&mut self, request: Json) -> Result<Json, EngineError> { Ok(request) }
    }

    struct NopEnv;
    #[async_trait]
    impl Environment for NopEnv {
        async fn initialize(&mut self) -> Result<Observation, EngineError> { Ok(Observation { terminated: false, truncated: false, data: Json::Null }) }
        async fn step(&mut self, _tool_calls: Vec<ToolCall>) -> Result<Observation, EngineError> { Ok(Observation { terminated: false, truncated: false, data: Json::Null }) }
        async fn checkpoint(&self) -> Result<Snapshot, EngineError> { Ok(Snapshot { version: 1, engine: "nop".into(), data: Json::Null }) }
        async fn terminate(&mut self) -> Result<Observation, EngineError> { Ok(Observation { terminated: true, truncated: false, data: Json::Null }) }
    }

    struct Counter(u32);
    impl ReproducibleEngine for Counter {
        fn serialize_engine(&self) -> Result<Json, EngineError> { Ok(json!({"count": self.0})) }
        fn engine_name(&self) -> String { "counter".into() }
    }

    #[derive(Debug, Default, serde::Deserialize, PartialEq)]
    struct Knobs { #[serde(default)] depth: u32 }

    #[test]
    fn agent_registry_registers_and_acts() {
        register_agent("echo", Arc::new(|_cfg| -> Result<Box<dyn Agent>, EngineError> { Ok(Box::new(EchoAgent)) }));
        assert!(list_agents().contains(&"echo".to_string()));
        let mut agent = create_agent_with_config("echo", None).unwrap();
        assert_eq!(agent.act(json!({"ping": 1})).unwrap(), json!({"ping": 1}));
    }

    #[test]
    fn unknown_agent_is_not_found() {
        let err = create_agent_with_config("no-such-agent", None).err().unwrap();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn env_registry_registers_and_lists() {
        register_environment_with_config("nop", Arc::new(|_cfg| -> Result<Box<dyn Environment>, EngineError> { Ok(Box::new(NopEnv)) }));
        assert!(list_environments().contains(&"nop".to_string()));
        // We don't invoke async methods here to avoid requiring a runtime.
        assert!(create_environment_with_config("nop", None).is_ok());
    }

    #[test]
    fn snapshot_carries_engine_name() {
        let snap = make_snapshot(&Counter(3), 2).unwrap();
        assert_eq!(snap.engine, "counter");
        assert_eq!(snap.version, 2);
        assert_eq!(snap.data["count"], 3);
    }

    #[test]
    fn config_from_json_defaults_and_rejects() {
        let k: Knobs = config_from_json(None).unwrap();
        assert_eq!(k, Knobs::default());
        let k: Knobs = config_from_json(Some(json!({"depth": 4}))).unwrap();
        assert_eq!(k.depth, 4);
        assert!(config_from_json::<Knobs>(Some(json!({"depth": "deep"}))).is_err());
    }
}
