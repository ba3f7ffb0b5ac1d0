//! Bridge crossing: an opaque skill check between the agent and a hazard cell.

use std::collections::BTreeMap;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Skill name -> points, as sent by the game server.
pub type SkillPoints = BTreeMap<String, i64>;

/// Decides whether the agent gets across a hazard this turn.
pub trait SkillCheck: Send + Sync {
    fn attempt(&self, skills: &SkillPoints, rng: &mut dyn RngCore) -> bool;
}

/// Roll one d6 per point of `skill`, keep the best `dice_kept`, succeed on `target` or more.
/// A failed roll is retried up to `max_rolls` times in total.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgilityDice {
    pub skill: String,
    pub dice_kept: usize,
    pub target: u32,
    pub max_rolls: usize,
    /// Points beyond this many dice are not rolled.
    pub max_dice: usize,
}

impl Default for AgilityDice {
    fn default() -> Self {
        Self { skill: "agility".to_string(), dice_kept: 3, target: 12, max_rolls: 10, max_dice: 64 }
    }
}

impl AgilityDice {
    /// Dice rolled for `points` of skill.
    pub fn dice_for(&self, points: i64) -> usize {
        usize::try_from(points).unwrap_or(0).min(self.max_dice)
    }

    /// One roll of `dice` d6; returns the sorted (descending) dice and the kept score.
    pub fn roll(&self, dice: usize, rng: &mut dyn RngCore) -> (Vec<u32>, u32) {
        let mut rolls: Vec<u32> = (0..dice).map(|_| rng.gen_range(1..=6)).collect();
        rolls.sort_unstable_by(|a, b| b.cmp(a));
        let score = rolls.iter().take(self.dice_kept).sum();
        (rolls, score)
    }
}

impl SkillCheck for AgilityDice {
    fn attempt(&self, skills: &SkillPoints, rng: &mut dyn RngCore) -> bool {
        let dice = self.dice_for(skills.get(&self.skill).copied().unwrap_or(0));
        if dice == 0 {
            debug!(skill = %self.skill, "no points, cannot attempt the crossing");
            return false;
        }
        for attempt in 1..=self.max_rolls {
            let (rolls, score) = self.roll(dice, rng);
            debug!(attempt, ?rolls, score, target = self.target, "hazard roll");
            if score >= self.target { return true; }
        }
        false
    }
}
