use thiserror::Error;

/// Why a map could not be turned into a grid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedMap {
    #[error("map has no rows")]
    Empty,
    #[error("map has no start cell 'S'")]
    NoStart,
    #[error("map has more than one start cell (second at column {col}, row {row})")]
    MultipleStarts { col: usize, row: usize },
    #[error("row {row} has width {got}, expected {expected}")]
    RaggedRows { row: usize, expected: usize, got: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DungeonError {
    #[error("malformed map: {0}")]
    MalformedMap(#[from] MalformedMap),
    #[error("map has {count} gold cells; at most {max} are supported")]
    TooManyItems { count: usize, max: usize },
    #[error("unknown action '{0}'")]
    UnknownAction(String),
}
