//! v1 cross-boundary contracts for the sync core, session API, persistence, and HTTP surface.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod events;

pub use events::{EventDraft, EventKind, EventRecord, EventType, GameEvent, ShapeError};

pub const SCHEMA_VERSION_V1: &str = "1.0";
pub const GRID_SIZE: usize = 9;

/// Row-major 9×9 digits; 0 marks a blank cell.
pub type Grid = [[u8; GRID_SIZE]; GRID_SIZE];
/// `notes[r][c][value - 1]` is the pencil mark for `value` at `(r, c)`.
pub type NoteGrid = [[[bool; GRID_SIZE]; GRID_SIZE]; GRID_SIZE];

pub fn empty_grid() -> Grid {
    [[0; GRID_SIZE]; GRID_SIZE]
}

pub fn empty_notes() -> NoteGrid {
    [[[false; GRID_SIZE]; GRID_SIZE]; GRID_SIZE]
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Expert,
}

impl Difficulty {
    pub const ALL: [Difficulty; 4] = [
        Difficulty::Easy,
        Difficulty::Medium,
        Difficulty::Hard,
        Difficulty::Expert,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
            Self::Expert => "expert",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown difficulty `{0}` (expected easy, medium, hard, or expert)")]
pub struct ParseDifficultyError(pub String);

impl FromStr for Difficulty {
    type Err = ParseDifficultyError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|difficulty| difficulty.as_str().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(|| ParseDifficultyError(raw.to_string()))
    }
}

/// A catalog entry handed out by the puzzle store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PuzzleEntry {
    pub grid: Grid,
    pub solution: Grid,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub player_id: String,
    pub player_name: String,
    pub message: String,
    pub timestamp: u64,
}

/// Chat text before the log assigns an id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatDraft {
    pub player_id: String,
    pub player_name: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub name: String,
    pub joined_at: u64,
    pub is_active: bool,
}

/// Point-in-time view of a session's shared state.
///
/// `current_grid` and `notes` are materialized by the log from its stored
/// events; clients still rebuild them locally from `baseline` plus the backlog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub difficulty: Difficulty,
    pub hash: String,
    pub is_active: bool,
    pub baseline: Grid,
    pub current_grid: Grid,
    pub notes: NoteGrid,
    pub solution: Grid,
    pub created_at: u64,
    pub initial_elapsed_seconds: u64,
    pub last_activity: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
}

/// What a host supplies to open a new session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub difficulty: Difficulty,
    pub baseline: Grid,
    pub solution: Grid,
    pub hash: String,
    #[serde(default)]
    pub initial_elapsed_seconds: u64,
}

impl NewSession {
    pub fn from_puzzle(
        difficulty: Difficulty,
        puzzle: PuzzleEntry,
        initial_elapsed_seconds: u64,
    ) -> Self {
        Self {
            difficulty,
            baseline: puzzle.grid,
            solution: puzzle.solution,
            hash: puzzle.hash,
            initial_elapsed_seconds,
        }
    }
}

/// Snapshot plus the backlogs a joining client needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: String,
    pub session: SessionSnapshot,
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(default)]
    pub events: Vec<GameEvent>,
    #[serde(default)]
    pub chat: Vec<ChatMessage>,
}

impl SessionView {
    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|player| player.id == player_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncConfig {
    pub schema_version: String,
    /// Most recent timeline entries kept for display.
    pub timeline_cap: usize,
    pub tick_interval_ms: u64,
    /// Apply in-order live events incrementally instead of rebuilding.
    pub fast_path: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            timeline_cap: 100,
            tick_interval_ms: 1_000,
            fast_path: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    SessionNotFound,
    InvalidEventShape,
    InvalidRequest,
    ContractVersionUnsupported,
    InternalError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub schema_version: String,
    pub error_code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            error_code,
            message: message.into(),
            details,
        }
    }
}
