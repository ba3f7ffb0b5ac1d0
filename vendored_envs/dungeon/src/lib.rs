//! Pure gold-dungeon logic crate.
//! - Grid parsing and cell kinds
//! - State space over (position, collected gold)
//! - Transition/reward models and policy iteration
//! - Per-turn controller speaking the game server's JSON protocol

mod action;
mod controller;
mod error;
mod grid;
mod hazard;
mod reward;
mod solver;
mod state;
mod transition;

pub use action::Action;
pub use controller::{replay, Controller, ControllerConfig, HistoryEvent, Outcome, TurnRequest, TurnResponse};
pub use error::{DungeonError, MalformedMap};
pub use grid::{CellKind, Grid, Position, MAX_ITEMS};
pub use hazard::{AgilityDice, SkillCheck, SkillPoints};
pub use reward::RewardConfig;
pub use solver::{solve, Evaluation, Model, PolicyIteration, SolveStats, Solution, SolverConfig};
pub use state::{ItemSet, State, StateSpace};
pub use transition::{Movement, TransitionModel, DRIFT_INTENDED, DRIFT_LATERAL};
