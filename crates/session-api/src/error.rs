use contracts::Difficulty;
use thiserror::Error;

/// The log could not be reached or refused the operation. Surfaced once,
/// never retried here.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("session `{0}` is not known to the log")]
    UnknownSession(String),
    #[error("event log state is poisoned")]
    Poisoned,
    #[error("event log is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum PuzzleStoreError {
    #[error("no puzzle available for difficulty `{0}`")]
    NoPuzzleAvailable(Difficulty),
    #[error("puzzle store state is poisoned")]
    Poisoned,
}

/// Local input that cannot become an event.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MoveError {
    #[error("cell ({r}, {c}) is outside the grid")]
    OffGrid { r: u8, c: u8 },
    #[error("cell ({r}, {c}) is a given")]
    GivenCell { r: u8, c: u8 },
    #[error("value {0} is not a sudoku digit")]
    ValueOutOfRange(u8),
    #[error("the puzzle is already complete")]
    Frozen,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session `{0}` was not found or is no longer active")]
    SessionNotFound(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Puzzle(#[from] PuzzleStoreError),
    #[error(transparent)]
    Move(#[from] MoveError),
}
