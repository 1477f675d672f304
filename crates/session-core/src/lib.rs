//! Deterministic sync core for shared sudoku sessions.
//!
//! Everything here is pure: the same baseline and event set always produce the
//! same board, whatever order or multiplicity the events arrived in.

pub mod board;
pub mod ingest;
pub mod reconcile;
pub mod timeline;
pub mod timer;

pub use board::{is_editable, is_solved, parse_grid, puzzle_hash, render_grid, Board, GridParseError};
pub use ingest::{ClientState, Completion, IngestOutcome};
pub use reconcile::{
    apply_event, apply_kind, completion_duration_seconds, completion_event, ordered_unique,
    reconcile,
};
pub use timeline::{build_timeline, narrate, ChatLog, TimelineBody, TimelineEntry};
pub use timer::{TimerClock, TimerState};
