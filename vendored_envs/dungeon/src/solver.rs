//! Policy iteration over the full (position × collected gold) state space.
//!
//! The transition and reward models are compiled once into a [`Model`]: for every
//! state ordinal and action, the list of `(successor ordinal, probability, reward)`.
//! [`PolicyIteration`] then alternates in-place evaluation sweeps and greedy
//! improvement until no state changes its action.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::grid::{CellKind, Grid};
use crate::reward::RewardConfig;
use crate::state::{State, StateSpace};
use crate::transition::{Movement, TransitionModel};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Discount factor, in (0, 1).
    pub gamma: f64,
    /// Evaluation stops once a full sweep changes no value by this much.
    pub epsilon: f64,
    pub max_evaluation_sweeps: usize,
    pub max_policy_iterations: usize,
    /// Actions scoring within this of the best count as tied; ties go to declaration order.
    pub tie_tolerance: f64,
    pub movement: Movement,
    pub rewards: RewardConfig,
    /// Never pick a move whose intended cell is a pit while any other valid action exists.
    /// With the filter off, pits still lose every tie.
    pub avoid_pits: bool,
    /// Used when a state has no valid action or is missing from the policy.
    pub fallback_action: Action,
    /// Seeds the initial random policy.
    pub seed: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            epsilon: 1e-6,
            max_evaluation_sweeps: 1000,
            max_policy_iterations: 200,
            tie_tolerance: 1e-6,
            movement: Movement::Deterministic,
            rewards: RewardConfig::default(),
            avoid_pits: true,
            fallback_action: Action::North,
            seed: 0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct Outcome {
    next: usize,
    prob: f64,
    reward: f64,
}

#[derive(Clone, Debug, Default)]
struct Choice {
    /// Empty when the action is invalid in this state.
    outcomes: Vec<Outcome>,
    /// Directional action whose intended cell is a pit.
    into_pit: bool,
}

/// Compiled transition/reward table. Immutable once built.
#[derive(Clone, Debug)]
pub struct Model {
    space: StateSpace,
    choices: Vec<Choice>,
}

impl Model {
    pub fn build(grid: &Grid, config: &SolverConfig) -> Model {
        let space = StateSpace::new(grid);
        let transitions = TransitionModel::new(grid, config.movement);
        let mut choices = Vec::with_capacity(space.len() * Action::ALL.len());
        for state in space.iter() {
            for action in Action::ALL {
                let outcomes = transitions
                    .transitions(state, action)
                    .into_iter()
                    .filter_map(|(next, prob)| {
                        let reward = config.rewards.transition_reward(grid, state.pos, action, next.pos, state.items);
                        space.index_of(next).map(|next| Outcome { next, prob, reward })
                    })
                    .collect();
                let into_pit = transitions
                    .primary_target(state.pos, action)
                    .is_some_and(|t| grid.cell_kind(t) == CellKind::Pit);
                choices.push(Choice { outcomes, into_pit });
            }
        }
        Model { space, choices }
    }

    pub fn space(&self) -> &StateSpace { &self.space }

    pub fn num_states(&self) -> usize { self.space.len() }

    #[inline]
    fn choice(&self, state: usize, action: Action) -> &Choice { &self.choices[state * Action::ALL.len() + action.index()] }

    pub fn is_valid(&self, state: usize, action: Action) -> bool { !self.choice(state, action).outcomes.is_empty() }

    pub fn valid_actions(&self, state: usize) -> impl Iterator<Item = Action> + '_ {
        Action::ALL.into_iter().filter(move |&a| self.is_valid(state, a))
    }
}

/// Result of one evaluation phase.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Evaluation {
    pub sweeps: usize,
    pub delta: f64,
    pub converged: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SolveStats {
    pub states: usize,
    pub policy_iterations: usize,
    pub evaluation_sweeps: usize,
    /// Evaluation phases that stopped on the sweep cap rather than on epsilon.
    pub unconverged_evaluations: usize,
    /// Whether the last improvement pass left the policy unchanged.
    pub stable: bool,
}

pub struct PolicyIteration<'m> {
    model: &'m Model,
    config: &'m SolverConfig,
}

impl<'m> PolicyIteration<'m> {
    pub fn new(model: &'m Model, config: &'m SolverConfig) -> Self { Self { model, config } }

    /// Bellman expectation of taking `action` in `state` under `values`; `None` if invalid.
    pub fn q_value(&self, state: usize, action: Action, values: &[f64]) -> Option<f64> {
        let outcomes = &self.model.choice(state, action).outcomes;
        if outcomes.is_empty() { return None; }
        Some(outcomes.iter().map(|o| o.prob * (o.reward + self.config.gamma * values[o.next])).sum())
    }

    /// Uniform random valid action per state.
    pub fn seed_policy<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Action> {
        (0..self.model.num_states())
            .map(|s| {
                let valid: Vec<Action> = self.model.valid_actions(s).collect();
                if valid.is_empty() { self.config.fallback_action } else { valid[rng.gen_range(0..valid.len())] }
            })
            .collect()
    }

    /// In-place sweeps in ordinal order until the largest change drops below epsilon
    /// or the sweep cap is hit.
    pub fn evaluate(&self, policy: &[Action], values: &mut [f64]) -> Evaluation {
        let mut delta = f64::INFINITY;
        for sweep in 1..=self.config.max_evaluation_sweeps {
            delta = 0.0;
            for s in 0..values.len() {
                let v = self.q_value(s, policy[s], values).unwrap_or(0.0);
                delta = delta.max((v - values[s]).abs());
                values[s] = v;
            }
            if delta < self.config.epsilon {
                return Evaluation { sweeps: sweep, delta, converged: true };
            }
        }
        Evaluation { sweeps: self.config.max_evaluation_sweeps, delta, converged: false }
    }

    /// Greedy action for one state under `values`.
    pub fn greedy_action(&self, state: usize, values: &[f64]) -> Action {
        let scored: Vec<(Action, f64, bool)> = Action::ALL
            .into_iter()
            .filter_map(|a| Some((a, self.q_value(state, a, values)?, self.model.choice(state, a).into_pit)))
            .collect();
        if scored.is_empty() { return self.config.fallback_action; }
        // With every valid action heading into a pit, take the least bad one.
        let filtering = self.config.avoid_pits && !scored.iter().all(|&(_, _, pit)| pit);
        let allowed = |&&(_, _, pit): &&(Action, f64, bool)| !(filtering && pit);
        let best = scored.iter().filter(allowed).map(|&(_, q, _)| q).fold(f64::NEG_INFINITY, f64::max);
        // Among tied actions a pit comes last, then declaration order.
        scored
            .iter()
            .filter(allowed)
            .filter(|&&(_, q, _)| q >= best - self.config.tie_tolerance)
            .min_by_key(|&&(_, _, pit)| pit)
            .map(|&(a, _, _)| a)
            .unwrap_or(self.config.fallback_action)
    }

    /// Replace every action with the greedy one; returns how many changed.
    pub fn improve(&self, policy: &mut [Action], values: &[f64]) -> usize {
        let mut changed = 0;
        for (s, slot) in policy.iter_mut().enumerate() {
            let best = self.greedy_action(s, values);
            if best != *slot {
                *slot = best;
                changed += 1;
            }
        }
        changed
    }

    pub fn run(&self) -> (Vec<Action>, Vec<f64>, SolveStats) {
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut policy = self.seed_policy(&mut rng);
        let mut values = vec![0.0; self.model.num_states()];
        let mut stats = SolveStats { states: values.len(), ..Default::default() };

        while stats.policy_iterations < self.config.max_policy_iterations {
            stats.policy_iterations += 1;
            let eval = self.evaluate(&policy, &mut values);
            stats.evaluation_sweeps += eval.sweeps;
            if !eval.converged {
                stats.unconverged_evaluations += 1;
                debug!(round = stats.policy_iterations, delta = eval.delta, "evaluation hit sweep cap");
            }
            let changed = self.improve(&mut policy, &values);
            debug!(round = stats.policy_iterations, sweeps = eval.sweeps, changed, "policy iteration round");
            if changed == 0 {
                stats.stable = true;
                break;
            }
        }
        if !stats.stable {
            warn!(rounds = stats.policy_iterations, "policy iteration stopped at the iteration cap before stabilising");
        }
        (policy, values, stats)
    }
}

/// A solved map: the compiled model plus the final policy and value function.
#[derive(Clone, Debug)]
pub struct Solution {
    model: Model,
    config: SolverConfig,
    policy: Vec<Action>,
    values: Vec<f64>,
    stats: SolveStats,
}

impl Solution {
    pub fn policy(&self) -> &[Action] { &self.policy }
    pub fn values(&self) -> &[f64] { &self.values }
    pub fn stats(&self) -> &SolveStats { &self.stats }
    pub fn space(&self) -> &StateSpace { self.model.space() }

    pub fn action_for(&self, state: State) -> Option<Action> {
        self.model.space().index_of(state).map(|i| self.policy[i])
    }

    pub fn value_of(&self, state: State) -> Option<f64> {
        self.model.space().index_of(state).map(|i| self.values[i])
    }

    /// `(state, action)` pairs in ordinal order.
    pub fn iter(&self) -> impl Iterator<Item = (State, Action)> + '_ {
        self.model.space().iter().zip(self.policy.iter().copied())
    }

    /// One more improvement pass against the final values; a stable solution
    /// comes back unchanged.
    pub fn improve_once(&self) -> Vec<Action> {
        let mut policy = self.policy.clone();
        PolicyIteration::new(&self.model, &self.config).improve(&mut policy, &self.values);
        policy
    }
}

/// Build the model for `grid` and run policy iteration to a fixed point (or the caps).
pub fn solve(grid: &Grid, config: &SolverConfig) -> Solution {
    let model = Model::build(grid, config);
    let (policy, values, stats) = PolicyIteration::new(&model, config).run();
    info!(
        states = stats.states,
        rounds = stats.policy_iterations,
        sweeps = stats.evaluation_sweeps,
        stable = stats.stable,
        "solved map"
    );
    Solution { model, config: config.clone(), policy, values, stats }
}
