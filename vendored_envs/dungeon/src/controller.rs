//! Per-turn agent: wire types and the controller that answers the game server.

use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::error::DungeonError;
use crate::grid::{CellKind, Grid, Position};
use crate::hazard::{AgilityDice, SkillCheck, SkillPoints};
use crate::solver::{solve, Solution, SolverConfig};
use crate::state::{ItemSet, State};

/// What the game server sends every turn.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TurnRequest {
    pub map: String,
    pub free_skill_points: i64,
    pub skill_points: SkillPoints,
    pub history: Vec<HistoryEvent>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryEvent {
    /// The response the agent gave, echoed back by the server. Never read
    /// during replay, so any JSON is accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Json>,
    pub outcome: Outcome,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Outcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collected_gold_at: Option<Position>,
}

/// Either a bare action name or a skill allocation object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnResponse {
    Act(Action),
    Allocate(SkillPoints),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub solver: SolverConfig,
    /// Receives every free skill point.
    pub skill: String,
    /// Reported with zero points in the allocation.
    pub other_skills: Vec<String>,
    /// EXIT as soon as the agent is back on the start cell with any gold.
    pub exit_when_carrying: bool,
    pub hazard: AgilityDice,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            solver: SolverConfig::default(),
            skill: "agility".to_string(),
            other_skills: vec!["fighting".to_string()],
            exit_when_carrying: true,
            hazard: AgilityDice::default(),
        }
    }
}

/// Rebuild the agent's state from the history: the latest reported position
/// on the grid wins and every reported gold cell joins the item set.
pub fn replay(grid: &Grid, history: &[HistoryEvent]) -> State {
    let mut state = State::new(grid.start(), ItemSet::EMPTY);
    for event in history {
        match event.outcome.position {
            Some(pos) if grid.in_bounds(pos) => state.pos = pos,
            Some(pos) => warn!(?pos, "history reports a position off the grid, ignoring"),
            None => {}
        }
        if let Some(gold) = event.outcome.collected_gold_at {
            match grid.item_ordinal(gold) {
                Some(ord) => state.items = state.items.with(ord),
                None => warn!(?gold, "history reports gold on a cell without gold, ignoring"),
            }
        }
    }
    state
}

pub struct Controller {
    config: ControllerConfig,
    skill_check: Box<dyn SkillCheck>,
    rng: ChaCha8Rng,
    /// Last solved map text and its solution.
    cache: Option<(String, Arc<Solution>)>,
}

impl Controller {
    pub fn new(config: ControllerConfig) -> Self {
        let skill_check = Box::new(config.hazard.clone());
        Self::with_skill_check(config, skill_check)
    }

    pub fn with_skill_check(config: ControllerConfig, skill_check: Box<dyn SkillCheck>) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.solver.seed);
        Self { config, skill_check, rng, cache: None }
    }

    pub fn config(&self) -> &ControllerConfig { &self.config }

    pub fn allocation(&self, free_points: i64) -> SkillPoints {
        let mut out: SkillPoints = self.config.other_skills.iter().map(|s| (s.clone(), 0)).collect();
        out.insert(self.config.skill.clone(), free_points);
        out
    }

    /// Solve `map`, reusing the previous solution when the text is identical.
    pub fn solution_for(&mut self, map: &str, grid: &Grid) -> Arc<Solution> {
        if let Some((cached, solution)) = &self.cache {
            if cached == map {
                debug!("reusing cached solution");
                return Arc::clone(solution);
            }
        }
        let solution = Arc::new(solve(grid, &self.config.solver));
        self.cache = Some((map.to_string(), Arc::clone(&solution)));
        solution
    }

    pub fn act(&mut self, request: &TurnRequest) -> Result<TurnResponse, DungeonError> {
        if request.free_skill_points > 0 {
            let allocation = self.allocation(request.free_skill_points);
            info!(?allocation, "allocating skill points");
            return Ok(TurnResponse::Allocate(allocation));
        }

        let grid = Grid::parse(&request.map)?;
        let state = replay(&grid, &request.history);
        info!(position = ?state.pos, gold = state.items.len(), "turn");

        if self.config.exit_when_carrying && state.pos == grid.start() && !state.items.is_empty() {
            info!(gold = state.items.len(), "back at the start with gold, exiting");
            return Ok(TurnResponse::Act(Action::Exit));
        }
        if grid.cell_kind(state.pos) == CellKind::Pit {
            warn!(position = ?state.pos, "agent fell into a pit");
        }

        let solution = self.solution_for(&request.map, &grid);
        let planned = solution.action_for(state).unwrap_or_else(|| {
            warn!(?state, "state not in policy, using fallback action");
            self.config.solver.fallback_action
        });
        let action = self.cross_or_reroute(&grid, state.pos, planned, &request.skill_points);
        info!(%action, "decided");
        Ok(TurnResponse::Act(action))
    }

    fn cross_or_reroute(&mut self, grid: &Grid, pos: Position, planned: Action, skills: &SkillPoints) -> Action {
        let neighbors = grid.neighbors(pos);
        // True when `action` leads onto a hazard and the skill check fails.
        let mut blocked = |action: Action| match neighbors.get(&action) {
            Some(&t) if grid.cell_kind(t) == CellKind::Hazard => !self.skill_check.attempt(skills, &mut self.rng),
            _ => false,
        };
        if !blocked(planned) { return planned; }
        info!(%planned, "cannot cross the hazard, looking for another route");
        for alt in Action::ALL {
            if alt == planned || (alt == Action::Exit && pos != grid.start()) { continue; }
            if !blocked(alt) { return alt; }
        }
        self.config.solver.fallback_action
    }
}
