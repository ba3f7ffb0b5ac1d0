use serde::{Deserialize, Serialize};

use crate::grid::{Grid, Position};

/// Collected gold as a bitmask over item ordinals.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemSet(u32);

impl ItemSet {
    pub const EMPTY: ItemSet = ItemSet(0);

    pub fn from_bits(bits: u32) -> Self { ItemSet(bits) }
    pub fn bits(self) -> u32 { self.0 }
    pub fn contains(self, ordinal: usize) -> bool { self.0 & (1 << ordinal) != 0 }
    pub fn with(self, ordinal: usize) -> Self { ItemSet(self.0 | (1 << ordinal)) }
    pub fn len(self) -> usize { self.0.count_ones() as usize }
    pub fn is_empty(self) -> bool { self.0 == 0 }
    pub fn is_subset_of(self, other: ItemSet) -> bool { self.0 & !other.0 == 0 }

    /// Every ordinal below `count` set.
    pub fn full(count: usize) -> Self {
        if count >= 32 { ItemSet(u32::MAX) } else { ItemSet((1u32 << count) - 1) }
    }

    /// Item set after arriving at `pos`: an uncollected gold cell joins the set.
    pub fn after_entering(self, grid: &Grid, pos: Position) -> Self {
        match grid.item_ordinal(pos) {
            Some(ord) => self.with(ord),
            None => self,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct State {
    pub pos: Position,
    pub items: ItemSet,
}

impl State {
    pub fn new(pos: Position, items: ItemSet) -> Self { Self { pos, items } }
}

/// Materialized enumeration of walkable positions × item subsets.
///
/// Ordinal layout is `walkable_ordinal * 2^items + mask`, i.e. row-major
/// position first, then mask. Sweeps iterate `0..len()` in this order.
#[derive(Clone, Debug)]
pub struct StateSpace {
    width: usize,
    height: usize,
    positions: Vec<Position>,
    /// `[row * width + col]` -> walkable ordinal.
    lookup: Vec<Option<usize>>,
    item_count: usize,
}

impl StateSpace {
    pub fn new(grid: &Grid) -> Self {
        let width = grid.width();
        let mut lookup = vec![None; width * grid.height()];
        for (ord, &(col, row)) in grid.walkable().iter().enumerate() {
            lookup[row * width + col] = Some(ord);
        }
        Self {
            width,
            height: grid.height(),
            positions: grid.walkable().to_vec(),
            lookup,
            item_count: grid.items().len(),
        }
    }

    #[inline]
    fn masks_per_position(&self) -> usize { 1usize << self.item_count }

    pub fn len(&self) -> usize { self.positions.len() * self.masks_per_position() }

    pub fn is_empty(&self) -> bool { self.positions.is_empty() }

    pub fn item_count(&self) -> usize { self.item_count }

    pub fn index_of(&self, state: State) -> Option<usize> {
        let (col, row) = state.pos;
        if col >= self.width || row >= self.height || state.items.bits() as usize >= self.masks_per_position() {
            return None;
        }
        let ord = (*self.lookup.get(row * self.width + col)?)?;
        Some(ord * self.masks_per_position() + state.items.bits() as usize)
    }

    pub fn state(&self, index: usize) -> State {
        let per = self.masks_per_position();
        State { pos: self.positions[index / per], items: ItemSet::from_bits((index % per) as u32) }
    }

    /// Restartable iteration in ordinal order.
    pub fn iter(&self) -> impl Iterator<Item = State> + '_ { (0..self.len()).map(move |i| self.state(i)) }
}
