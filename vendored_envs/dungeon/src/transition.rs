//! Movement dynamics: action -> distribution over successor cells.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::grid::{CellKind, Grid, Position};
use crate::state::State;

/// Probability of landing on the intended cell under drift.
pub const DRIFT_INTENDED: f64 = 0.8;
/// Probability of sliding to each perpendicular cell under drift.
pub const DRIFT_LATERAL: f64 = 0.1;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Movement {
    /// The intended cell if walkable, otherwise stay.
    #[default]
    Deterministic,
    /// 0.8 intended, 0.1 to each side; blocked mass stays put.
    Drift,
}

#[derive(Copy, Clone, Debug)]
pub struct TransitionModel<'g> {
    grid: &'g Grid,
    movement: Movement,
}

impl<'g> TransitionModel<'g> {
    pub fn new(grid: &'g Grid, movement: Movement) -> Self { Self { grid, movement } }

    pub fn movement(&self) -> Movement { self.movement }

    /// Where a single unperturbed move in `action`'s direction ends.
    fn resolve(&self, pos: Position, action: Action) -> Position {
        match self.grid.target(pos, action) {
            Some(t) if self.grid.is_walkable(t) => t,
            _ => pos,
        }
    }

    /// Successor cells with probabilities. Empty when the action is invalid here
    /// (EXIT away from the start cell). Pits are absorbing.
    pub fn destinations(&self, pos: Position, action: Action) -> Vec<(Position, f64)> {
        if action == Action::Exit {
            return if pos == self.grid.start() { vec![(pos, 1.0)] } else { Vec::new() };
        }
        if self.grid.cell_kind(pos) == CellKind::Pit {
            return vec![(pos, 1.0)];
        }
        match (self.movement, action.perpendicular()) {
            (Movement::Drift, Some(sides)) => {
                let mut out: Vec<(Position, f64)> = Vec::with_capacity(3);
                let candidates = [(action, DRIFT_INTENDED), (sides[0], DRIFT_LATERAL), (sides[1], DRIFT_LATERAL)];
                for (dir, p) in candidates {
                    let dest = self.resolve(pos, dir);
                    match out.iter_mut().find(|(d, _)| *d == dest) {
                        Some(entry) => entry.1 += p,
                        None => out.push((dest, p)),
                    }
                }
                out
            }
            _ => vec![(self.resolve(pos, action), 1.0)],
        }
    }

    /// State-level distribution; the successor item set picks up gold on arrival.
    pub fn transitions(&self, state: State, action: Action) -> Vec<(State, f64)> {
        self.destinations(state.pos, action)
            .into_iter()
            .map(|(pos, p)| (State::new(pos, state.items.after_entering(self.grid, pos)), p))
            .collect()
    }

    /// Most likely successor cell for a directional action: its in-bounds target.
    pub fn primary_target(&self, pos: Position, action: Action) -> Option<Position> {
        self.grid.target(pos, action)
    }

    /// Draw one successor cell. `None` when the action is invalid at `pos`.
    pub fn sample<R: Rng + ?Sized>(&self, pos: Position, action: Action, rng: &mut R) -> Option<Position> {
        let dist = self.destinations(pos, action);
        let roll: f64 = rng.gen();
        let mut acc = 0.0;
        for &(dest, p) in &dist {
            acc += p;
            if roll < acc { return Some(dest); }
        }
        dist.last().map(|&(dest, _)| dest)
    }
}
