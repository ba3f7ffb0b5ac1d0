use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DungeonError;

/// Agent actions. Declaration order doubles as the tie-break priority.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum Action {
    North = 0,
    South = 1,
    East = 2,
    West = 3,
    Exit = 4,
}

impl Action {
    pub const ALL: [Action; 5] = [Action::North, Action::South, Action::East, Action::West, Action::Exit];
    pub const MOVES: [Action; 4] = [Action::North, Action::South, Action::East, Action::West];

    pub fn index(self) -> usize { self as usize }

    pub fn is_move(self) -> bool { !matches!(self, Action::Exit) }

    /// Column/row delta; `None` for EXIT.
    pub fn delta(self) -> Option<(i64, i64)> {
        match self {
            Action::North => Some((0, -1)),
            Action::South => Some((0, 1)),
            Action::East => Some((1, 0)),
            Action::West => Some((-1, 0)),
            Action::Exit => None,
        }
    }

    /// The two drift candidates for a directional action.
    pub fn perpendicular(self) -> Option<[Action; 2]> {
        match self {
            Action::North | Action::South => Some([Action::East, Action::West]),
            Action::East | Action::West => Some([Action::North, Action::South]),
            Action::Exit => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::North => "NORTH",
            Action::South => "SOUTH",
            Action::East => "EAST",
            Action::West => "WEST",
            Action::Exit => "EXIT",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Action {
    type Err = DungeonError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "NORTH" => Action::North,
            "SOUTH" => Action::South,
            "EAST" => Action::East,
            "WEST" => Action::West,
            "EXIT" => Action::Exit,
            other => return Err(DungeonError::UnknownAction(other.to_string())),
        })
    }
}

impl TryFrom<u8> for Action {
    type Error = DungeonError;
    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Action::ALL.get(v as usize).copied().ok_or_else(|| DungeonError::UnknownAction(v.to_string()))
    }
}
