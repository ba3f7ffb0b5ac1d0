use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::error::{DungeonError, MalformedMap};

/// `(column, row)`, origin at the top-left corner.
pub type Position = (usize, usize);

/// Upper bound on gold cells; item sets are `u32` bitmasks and the state
/// space doubles with every item.
pub const MAX_ITEMS: usize = 24;

/// Cell kinds with the glyphs used by the game server:
/// `X` wall, `S` start/exit, `G` gold, `B` bridge, `P` pit, anything else floor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellKind {
    Wall,
    Floor,
    Start,
    Item,
    Hazard,
    Pit,
}

impl CellKind {
    pub fn from_glyph(c: char) -> CellKind {
        match c {
            'X' => CellKind::Wall,
            'S' => CellKind::Start,
            'G' => CellKind::Item,
            'B' => CellKind::Hazard,
            'P' => CellKind::Pit,
            _ => CellKind::Floor,
        }
    }
}

/// Immutable grid parsed from map text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<CellKind>,
    /// Original characters, kept only for rendering.
    glyphs: Vec<char>,
    start: Position,
    items: Vec<Position>,
    walkable: Vec<Position>,
}

impl Grid {
    /// Parse map text. Whitespace-only lines are skipped; every other line is a row.
    pub fn parse(text: &str) -> Result<Grid, DungeonError> {
        let rows: Vec<Vec<char>> = text
            .split('\n')
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.chars().collect())
            .collect();
        let height = rows.len();
        if height == 0 { return Err(MalformedMap::Empty.into()); }
        let width = rows[0].len();

        let mut cells = Vec::with_capacity(width * height);
        let mut glyphs = Vec::with_capacity(width * height);
        let mut start = None;
        let mut items = Vec::new();
        let mut walkable = Vec::new();
        for (row, line) in rows.iter().enumerate() {
            if line.len() != width {
                return Err(MalformedMap::RaggedRows { row, expected: width, got: line.len() }.into());
            }
            for (col, &c) in line.iter().enumerate() {
                let kind = CellKind::from_glyph(c);
                match kind {
                    CellKind::Start => {
                        if start.is_some() { return Err(MalformedMap::MultipleStarts { col, row }.into()); }
                        start = Some((col, row));
                    }
                    CellKind::Item => items.push((col, row)),
                    _ => {}
                }
                if kind != CellKind::Wall { walkable.push((col, row)); }
                cells.push(kind);
                glyphs.push(c);
            }
        }
        let start = start.ok_or(MalformedMap::NoStart)?;
        if items.len() > MAX_ITEMS {
            return Err(DungeonError::TooManyItems { count: items.len(), max: MAX_ITEMS });
        }
        Ok(Grid { width, height, cells, glyphs, start, items, walkable })
    }

    pub fn width(&self) -> usize { self.width }
    pub fn height(&self) -> usize { self.height }
    pub fn start(&self) -> Position { self.start }
    /// Gold cells in row-major order; the index is the item ordinal.
    pub fn items(&self) -> &[Position] { &self.items }
    /// Every non-wall cell in row-major order.
    pub fn walkable(&self) -> &[Position] { &self.walkable }

    #[inline]
    fn idx(&self, (col, row): Position) -> usize { row * self.width + col }

    #[inline]
    pub fn in_bounds(&self, (col, row): Position) -> bool { col < self.width && row < self.height }

    /// Out-of-bounds positions read as walls.
    pub fn cell_kind(&self, pos: Position) -> CellKind {
        if self.in_bounds(pos) { self.cells[self.idx(pos)] } else { CellKind::Wall }
    }

    pub fn is_walkable(&self, pos: Position) -> bool { self.cell_kind(pos) != CellKind::Wall }

    pub fn item_ordinal(&self, pos: Position) -> Option<usize> { self.items.iter().position(|&p| p == pos) }

    /// In-bounds cell one step away in the action's direction. `None` for EXIT or off-grid.
    pub fn target(&self, (col, row): Position, action: Action) -> Option<Position> {
        let (dc, dr) = action.delta()?;
        let c = col as i64 + dc;
        let r = row as i64 + dr;
        if c < 0 || r < 0 { return None; }
        let pos = (c as usize, r as usize);
        self.in_bounds(pos).then_some(pos)
    }

    /// Directional actions whose target lies inside the grid.
    pub fn neighbors(&self, pos: Position) -> BTreeMap<Action, Position> {
        Action::MOVES
            .iter()
            .filter_map(|&a| self.target(pos, a).map(|p| (a, p)))
            .collect()
    }

    /// Render the map with `A` at the agent's position. The grid itself is untouched.
    pub fn render_with_agent(&self, agent: Position) -> String {
        let mut out = String::with_capacity((self.width + 1) * self.height);
        for row in 0..self.height {
            for col in 0..self.width {
                if (col, row) == agent { out.push('A'); } else { out.push(self.glyphs[self.idx((col, row))]); }
            }
            if row + 1 < self.height { out.push('\n'); }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kinds_and_locations() {
        let g = Grid::parse("XXXXX\nXS.GX\nXBPGX\nXXXXX\n").unwrap();
        assert_eq!((g.width(), g.height()), (5, 4));
        assert_eq!(g.start(), (1, 1));
        assert_eq!(g.items(), &[(3, 1), (3, 2)]);
        assert_eq!(g.cell_kind((1, 2)), CellKind::Hazard);
        assert_eq!(g.cell_kind((2, 2)), CellKind::Pit);
        assert_eq!(g.cell_kind((2, 1)), CellKind::Floor);
        assert_eq!(g.walkable().len(), 6);
    }

    #[test]
    fn out_of_bounds_is_not_walkable() {
        let g = Grid::parse("S.").unwrap();
        assert!(g.is_walkable((1, 0)));
        assert!(!g.is_walkable((2, 0)));
        assert!(!g.is_walkable((0, 1)));
        assert_eq!(g.cell_kind((9, 9)), CellKind::Wall);
    }

    #[test]
    fn neighbors_only_in_bounds() {
        let g = Grid::parse("S.\n..").unwrap();
        let n = g.neighbors((0, 0));
        assert_eq!(n.into_iter().collect::<Vec<_>>(), vec![(Action::South, (0, 1)), (Action::East, (1, 0))]);
        assert_eq!(g.target((0, 0), Action::Exit), None);
    }

    #[test]
    fn rejects_malformed_maps() {
        assert_eq!(Grid::parse("...\n...").unwrap_err(), DungeonError::MalformedMap(MalformedMap::NoStart));
        assert!(matches!(Grid::parse("S..\n..").unwrap_err(), DungeonError::MalformedMap(MalformedMap::RaggedRows { row: 1, .. })));
        assert!(matches!(Grid::parse("S.S").unwrap_err(), DungeonError::MalformedMap(MalformedMap::MultipleStarts { .. })));
        assert_eq!(Grid::parse("\n  \n").unwrap_err(), DungeonError::MalformedMap(MalformedMap::Empty));
    }

    #[test]
    fn too_many_items_is_rejected() {
        let map = format!("S{}", "G".repeat(MAX_ITEMS + 1));
        assert!(matches!(Grid::parse(&map).unwrap_err(), DungeonError::TooManyItems { .. }));
    }

    #[test]
    fn render_overlays_agent_without_mutation() {
        let g = Grid::parse("S.G\r\n").unwrap();
        assert_eq!(g.render_with_agent((1, 0)), "SAG");
        assert_eq!(g.render_with_agent((5, 5)), "S.G");
        assert_eq!(g.cell_kind((1, 0)), CellKind::Floor);
    }
}
