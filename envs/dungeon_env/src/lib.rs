use async_trait::async_trait;
use dungeon_core::{
    config_from_json, make_snapshot, register_agent, register_environment_with_config, Agent, EngineError, Environment,
    Observation, ReproducibleEngine, Snapshot, ToolCall,
};
use dungeon_rs::{
    Action, AgilityDice, CellKind, Controller, ControllerConfig, DungeonError, Grid, HistoryEvent, ItemSet, Movement,
    Outcome, Position, SkillCheck, SkillPoints, TransitionModel, TurnRequest,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_MAP: &str = "XXXXXXX\nXS..G.X\nX.X.X.X\nXGB.P.X\nXXXXXXX";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub map: String,
    /// Seeds drift sampling and hazard rolls.
    pub seed: u64,
    pub movement: Movement,
    pub skill_points: SkillPoints,
    pub free_skill_points: i64,
    pub max_turns: u32,
    pub hazard: AgilityDice,
    /// Controller behind the `suggest` tool; it always plans with `movement`.
    pub agent: ControllerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            map: DEFAULT_MAP.to_string(),
            seed: 42,
            movement: Movement::Deterministic,
            skill_points: SkillPoints::new(),
            free_skill_points: 4,
            max_turns: 200,
            hazard: AgilityDice::default(),
            agent: ControllerConfig::default(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ending {
    Exited,
    FellInPit,
}

fn dungeon_err(e: DungeonError) -> EngineError { EngineError::Validation(e.to_string()) }

/// Simulated game server: owns the true position, gold and history, and
/// answers the same turn protocol the controller speaks.
pub struct DungeonEnvironment {
    config: Config,
    grid: Grid,
    rng: ChaCha8Rng,
    controller: Controller,
    position: Position,
    carried: ItemSet,
    skill_points: SkillPoints,
    free_skill_points: i64,
    history: Vec<HistoryEvent>,
    turns: u32,
    ending: Option<Ending>,
    terminated: bool,
    truncated: bool,
    reward_last: f64,
    total_reward: f64,
}

impl DungeonEnvironment {
    pub fn new(config: Config) -> Result<Self, EngineError> {
        let grid = Grid::parse(&config.map).map_err(dungeon_err)?;
        let mut agent = config.agent.clone();
        agent.solver.movement = config.movement;
        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            controller: Controller::new(agent),
            position: grid.start(),
            carried: ItemSet::EMPTY,
            skill_points: config.skill_points.clone(),
            free_skill_points: config.free_skill_points,
            history: Vec::new(),
            turns: 0,
            ending: None,
            terminated: false,
            truncated: false,
            reward_last: 0.0,
            total_reward: 0.0,
            grid,
            config,
        })
    }

    /// The request a game server would send for the current turn.
    pub fn turn_request(&self) -> TurnRequest {
        TurnRequest {
            map: self.config.map.clone(),
            free_skill_points: self.free_skill_points,
            skill_points: self.skill_points.clone(),
            history: self.history.clone(),
        }
    }

    fn gold_collected(&self) -> Vec<Position> {
        self.grid
            .items()
            .iter()
            .enumerate()
            .filter(|(ord, _)| self.carried.contains(*ord))
            .map(|(_, &pos)| pos)
            .collect()
    }

    fn snapshot_obs(&self, extra: Json) -> Observation {
        Observation {
            terminated: self.terminated,
            truncated: self.truncated,
            data: json!({
                "map_text": self.grid.render_with_agent(self.position),
                "position": [self.position.0, self.position.1],
                "gold_collected": self.gold_collected(),
                "gold_total": self.grid.items().len(),
                "skill_points": self.skill_points,
                "free_skill_points": self.free_skill_points,
                "turns": self.turns,
                "max_turns": self.config.max_turns,
                "ending": self.ending,
                "terminated": self.terminated,
                "truncated": self.truncated,
                "reward_last": self.reward_last,
                "total_reward": self.total_reward,
                "extra": extra,
            }),
        }
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        if self.terminated || self.truncated {
            return Err(EngineError::Validation("episode is over".into()));
        }
        Ok(())
    }

    fn apply_action(&mut self, action: Action) -> Result<Json, EngineError> {
        self.ensure_running()?;
        let from = self.position;
        let mut extra = serde_json::Map::new();
        let next = if action == Action::Exit {
            if from != self.grid.start() {
                return Err(EngineError::Validation("EXIT is only allowed on the start cell".into()));
            }
            from
        } else {
            let dest = TransitionModel::new(&self.grid, self.config.movement)
                .sample(from, action, &mut self.rng)
                .unwrap_or(from);
            if dest != from && self.grid.cell_kind(dest) == CellKind::Hazard {
                let crossed = self.config.hazard.attempt(&self.skill_points, &mut self.rng);
                extra.insert("hazard".into(), json!(if crossed { "crossed" } else { "failed" }));
                if crossed { dest } else { from }
            } else {
                dest
            }
        };

        let reward = self.config.agent.solver.rewards.transition_reward(&self.grid, from, action, next, self.carried);
        let mut outcome = Outcome { position: Some(next), collected_gold_at: None };
        if let Some(ord) = self.grid.item_ordinal(next) {
            if !self.carried.contains(ord) {
                self.carried = self.carried.with(ord);
                outcome.collected_gold_at = Some(next);
                info!(gold = ?next, carried = self.carried.len(), "gold collected");
            }
        }
        self.position = next;
        self.turns += 1;
        self.reward_last = reward;
        self.total_reward += reward;

        if action == Action::Exit {
            self.terminated = true;
            self.ending = Some(Ending::Exited);
        } else if self.grid.cell_kind(next) == CellKind::Pit {
            self.terminated = true;
            self.ending = Some(Ending::FellInPit);
        } else if self.turns >= self.config.max_turns {
            self.truncated = true;
        }
        debug!(%action, ?from, ?next, reward, "turn applied");
        self.history.push(HistoryEvent { action: Some(json!(action)), outcome });
        Ok(Json::Object(extra))
    }

    fn allocate(&mut self, skills: SkillPoints) -> Result<(), EngineError> {
        self.ensure_running()?;
        if let Some((name, _)) = skills.iter().find(|&(_, &v)| v < 0) {
            return Err(EngineError::Validation(format!("negative allocation for {name}")));
        }
        let total: i64 = skills.values().sum();
        if total > self.free_skill_points {
            return Err(EngineError::Validation(format!(
                "allocating {total} points but only {} are free",
                self.free_skill_points
            )));
        }
        for (name, points) in &skills {
            *self.skill_points.entry(name.clone()).or_insert(0) += points;
        }
        self.free_skill_points -= total;
        self.history.push(HistoryEvent { action: Some(json!(skills)), outcome: Outcome::default() });
        Ok(())
    }

    fn suggest(&mut self) -> Result<Json, EngineError> {
        let response = self.controller.act(&self.turn_request()).map_err(dungeon_err)?;
        serde_json::to_value(response).map_err(|e| EngineError::Internal(e.to_string()))
    }
}

#[async_trait]
impl Environment for DungeonEnvironment {
    async fn initialize(&mut self) -> Result<Observation, EngineError> { Ok(self.snapshot_obs(json!({"event":"initialize"}))) }

    async fn step(&mut self, tool_calls: Vec<ToolCall>) -> Result<Observation, EngineError> {
        if tool_calls.is_empty() {
            return Err(EngineError::Validation("no tool_calls provided".into()));
        }
        let call = &tool_calls[0];
        match call.tool.as_str() {
            "interact" => {
                let name = call.args.get("action").and_then(|v| v.as_str()).ok_or_else(|| EngineError::Validation("missing action".into()))?;
                let action: Action = name.parse().map_err(dungeon_err)?;
                let extra = self.apply_action(action)?;
                Ok(self.snapshot_obs(extra))
            }
            "allocate" => {
                let skills = call.args.get("skills").cloned().ok_or_else(|| EngineError::Validation("missing skills".into()))?;
                let skills: SkillPoints = serde_json::from_value(skills).map_err(|e| EngineError::Validation(format!("bad skills: {e}")))?;
                self.allocate(skills)?;
                Ok(self.snapshot_obs(json!({})))
            }
            "suggest" => {
                let suggestion = self.suggest()?;
                Ok(self.snapshot_obs(json!({ "suggestion": suggestion })))
            }
            _ => Err(EngineError::Validation(format!("unknown tool: {}", call.tool))),
        }
    }

    async fn checkpoint(&self) -> Result<Snapshot, EngineError> { make_snapshot(self, 1) }

    async fn terminate(&mut self) -> Result<Observation, EngineError> {
        self.truncated = true;
        Ok(self.snapshot_obs(json!({"event":"terminate"})))
    }
}

impl ReproducibleEngine for DungeonEnvironment {
    fn serialize_engine(&self) -> Result<Json, EngineError> {
        let history = serde_json::to_value(&self.history).map_err(|e| EngineError::Internal(e.to_string()))?;
        Ok(json!({
            "map": self.config.map,
            "position": [self.position.0, self.position.1],
            "carried": self.carried.bits(),
            "skill_points": self.skill_points,
            "free_skill_points": self.free_skill_points,
            "history": history,
            "turns": self.turns,
            "ending": self.ending,
            "reward_last": self.reward_last,
            "total_reward": self.total_reward,
            "terminated": self.terminated,
            "truncated": self.truncated,
        }))
    }

    fn engine_name(&self) -> String { "dungeon".into() }
}

/// `dungeon_core::Agent` adapter over the JSON turn protocol.
pub struct GoldDungeonAgent {
    controller: Controller,
}

impl GoldDungeonAgent {
    pub fn new(config: ControllerConfig) -> Self { Self { controller: Controller::new(config) } }
}

impl Agent for GoldDungeonAgent {
    fn name(&self) -> &'static str { "GoldDungeon" }

    fn act(&mut self, request: Json) -> Result<Json, EngineError> {
        let request: TurnRequest =
            serde_json::from_value(request).map_err(|e| EngineError::Validation(format!("bad turn request: {e}")))?;
        let response = self.controller.act(&request).map_err(dungeon_err)?;
        serde_json::to_value(response).map_err(|e| EngineError::Internal(e.to_string()))
    }
}

// Registration helper so callers can create via core registry
pub fn register_default_env() {
    register_environment_with_config(
        "Dungeon",
        Arc::new(|cfg| -> Result<Box<dyn Environment>, EngineError> {
            Ok(Box::new(DungeonEnvironment::new(config_from_json(cfg)?)?))
        }),
    );
    register_agent(
        "GoldDungeon",
        Arc::new(|cfg| -> Result<Box<dyn Agent>, EngineError> { Ok(Box::new(GoldDungeonAgent::new(config_from_json(cfg)?))) }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(tool: &str, args: Json) -> Vec<ToolCall> { vec![ToolCall { tool: tool.into(), args }] }

    fn env(map: &str) -> DungeonEnvironment {
        DungeonEnvironment::new(Config { map: map.into(), free_skill_points: 0, ..Default::default() }).unwrap()
    }

    #[tokio::test]
    async fn initialize_renders_agent_at_start() {
        let mut env = DungeonEnvironment::new(Config::default()).unwrap();
        let obs = env.initialize().await.unwrap();
        assert_eq!(obs.data["position"], json!([1, 1]));
        assert_eq!(obs.data["gold_total"], 2);
        assert!(obs.data["map_text"].as_str().unwrap().starts_with("XXXXXXX\nXA..G.X"));
    }

    #[tokio::test]
    async fn suggest_then_interact_clears_corridor() {
        let mut env = DungeonEnvironment::new(Config { map: "S.G".into(), free_skill_points: 2, ..Default::default() }).unwrap();
        env.initialize().await.unwrap();
        let mut last = None;
        for _ in 0..20 {
            let obs = env.step(call("suggest", json!({}))).await.unwrap();
            let suggestion = obs.data["extra"]["suggestion"].clone();
            let obs = match suggestion.as_str() {
                Some(action) => env.step(call("interact", json!({ "action": action }))).await.unwrap(),
                None => env.step(call("allocate", json!({ "skills": suggestion }))).await.unwrap(),
            };
            if obs.terminated {
                last = Some(obs);
                break;
            }
        }
        let obs = last.expect("episode should end");
        assert_eq!(obs.data["ending"], "exited");
        assert_eq!(obs.data["gold_collected"], json!([[2, 0]]));
        assert_eq!(obs.data["skill_points"]["agility"], 2);
        assert!(obs.data["total_reward"].as_f64().unwrap() > 100.0);
    }

    #[tokio::test]
    async fn exit_away_from_start_is_rejected() {
        let mut env = env("S.G");
        env.step(call("interact", json!({"action":"EAST"}))).await.unwrap();
        let err = env.step(call("interact", json!({"action":"EXIT"}))).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        let err = env.step(call("interact", json!({"action":"JUMP"}))).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn pit_ends_the_episode() {
        let mut env = env("SP");
        let obs = env.step(call("interact", json!({"action":"EAST"}))).await.unwrap();
        assert!(obs.terminated);
        assert_eq!(obs.data["ending"], "fell_in_pit");
        // Falling in costs as much as a collision on top of the step.
        assert!((obs.data["reward_last"].as_f64().unwrap() + 0.6).abs() < 1e-9);
        assert!(env.step(call("interact", json!({"action":"WEST"}))).await.is_err());
    }

    #[tokio::test]
    async fn failed_bridge_keeps_agent_in_place() {
        let mut env = env("SBG");
        let obs = env.step(call("interact", json!({"action":"EAST"}))).await.unwrap();
        assert_eq!(obs.data["position"], json!([0, 0]));
        assert_eq!(obs.data["extra"]["hazard"], "failed");
        assert_eq!(env.history.last().unwrap().outcome.position, Some((0, 0)));
    }

    #[tokio::test]
    async fn allocation_cannot_overspend() {
        let mut env = DungeonEnvironment::new(Config { map: "S".into(), free_skill_points: 2, ..Default::default() }).unwrap();
        assert!(env.step(call("allocate", json!({"skills": {"agility": 3}}))).await.is_err());
        assert!(env.step(call("allocate", json!({"skills": {"agility": -1}}))).await.is_err());
        let obs = env.step(call("allocate", json!({"skills": {"agility": 2, "fighting": 0}}))).await.unwrap();
        assert_eq!(obs.data["free_skill_points"], 0);
        assert_eq!(obs.data["skill_points"], json!({"agility": 2, "fighting": 0}));
    }

    #[tokio::test]
    async fn turn_cap_truncates() {
        let mut env = DungeonEnvironment::new(Config { map: "S..".into(), free_skill_points: 0, max_turns: 2, ..Default::default() }).unwrap();
        let obs = env.step(call("interact", json!({"action":"WEST"}))).await.unwrap();
        assert!(!obs.truncated);
        let obs = env.step(call("interact", json!({"action":"WEST"}))).await.unwrap();
        assert!(obs.truncated && !obs.terminated);
    }

    #[tokio::test]
    async fn checkpoint_records_history() {
        let mut env = env("S.G");
        env.step(call("interact", json!({"action":"EAST"}))).await.unwrap();
        env.step(call("interact", json!({"action":"EAST"}))).await.unwrap();
        let snap = env.checkpoint().await.unwrap();
        assert_eq!(snap.engine, "dungeon");
        assert_eq!(snap.data["carried"], 1);
        assert_eq!(snap.data["history"][1]["outcome"]["collected-gold-at"], json!([2, 0]));
    }

    #[tokio::test]
    async fn registry_builds_env_and_agent() {
        register_default_env();
        let mut env = dungeon_core::create_environment_with_config("Dungeon", Some(json!({"map": "S"}))).unwrap();
        let obs = env.initialize().await.unwrap();
        assert_eq!(obs.data["map_text"], "A");
        let err = dungeon_core::create_environment_with_config("Dungeon", Some(json!({"map": "..."}))).err().unwrap();
        assert!(matches!(err, EngineError::Validation(_)));

        let mut agent = dungeon_core::create_agent_with_config("GoldDungeon", None).unwrap();
        assert_eq!(agent.name(), "GoldDungeon");
        assert_eq!(agent.act(json!({"map": "S.G"})).unwrap(), json!("EAST"));
        assert_eq!(agent.act(json!({"map": "S.G", "free-skill-points": 1})).unwrap(), json!({"agility": 1, "fighting": 0}));
        assert!(matches!(agent.act(json!({"map": 7})), Err(EngineError::Validation(_))));
    }
}
