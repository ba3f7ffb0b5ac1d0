use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::grid::{CellKind, Grid, Position};
use crate::state::ItemSet;

/// Additive reward terms. Each term is independent of the others.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Paid on every transition.
    pub step_penalty: f64,
    /// Added when the agent ends where it started (bumped into something).
    pub collision_penalty: f64,
    /// Arriving on gold not yet carried.
    pub item_bonus: f64,
    /// EXIT at the start cell, per carried gold.
    pub exit_per_item: f64,
    /// EXIT at the start cell carrying every gold on the map.
    pub full_clear_bonus: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self { step_penalty: -0.1, collision_penalty: -0.5, item_bonus: 10.0, exit_per_item: 10.0, full_clear_bonus: 100.0 }
    }
}

impl RewardConfig {
    /// Reward for `position --action--> next_position` while carrying `collected`.
    /// `items` lists every gold cell in ordinal order.
    pub fn reward(
        &self,
        position: Position,
        action: Action,
        next_position: Position,
        collected: ItemSet,
        items: &[Position],
        start: Position,
    ) -> f64 {
        let mut r = self.step_penalty;
        if next_position == position {
            r += self.collision_penalty;
        }
        if let Some(ord) = items.iter().position(|&p| p == next_position) {
            if !collected.contains(ord) { r += self.item_bonus; }
        }
        if action == Action::Exit && next_position == start {
            let carried = collected.len();
            r += self.exit_per_item * carried as f64;
            if carried == items.len() { r += self.full_clear_bonus; }
        }
        r
    }

    /// [`reward`](Self::reward) on a concrete grid. Falling into a pit counts as
    /// a collision, so it is never cheaper than staying stuck in place.
    pub fn transition_reward(
        &self,
        grid: &Grid,
        position: Position,
        action: Action,
        next_position: Position,
        collected: ItemSet,
    ) -> f64 {
        let mut r = self.reward(position, action, next_position, collected, grid.items(), grid.start());
        if next_position != position && grid.cell_kind(next_position) == CellKind::Pit {
            r += self.collision_penalty;
        }
        r
    }
}
