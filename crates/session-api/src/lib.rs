//! Session join protocol, shared event log transport, SQLite persistence, and the HTTP/WebSocket surface.

mod client;
mod clock;
mod error;
mod log;
mod persistence;
mod puzzles;
mod server;
mod store;
mod ticker;

use std::path::Path;
use std::sync::Arc;

pub use client::{
    announce_player, mint_player_id, JoinRequest, LiveUpdate, SessionClient, SessionContext,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{MoveError, PuzzleStoreError, SessionError, TransportError};
pub use log::{EventLog, LocalEventLog, Subscription};
pub use persistence::SqliteStore;
pub use puzzles::{CompletionReport, MemoryPuzzleStore, PuzzleStore};
pub use server::{router, serve, AppState, ServerError};
pub use store::{MemoryStore, SessionRecord, SessionStore};
pub use ticker::Ticker;

pub const DEFAULT_SQLITE_PATH: &str = "sudoku_sync.sqlite";

/// Opens a log over the SQLite file at `path`, or an in-memory store when
/// `path` is `None`.
pub fn open_log(
    path: Option<&Path>,
    clock: Arc<dyn Clock>,
) -> Result<LocalEventLog, TransportError> {
    match path {
        Some(path) => {
            let store = SqliteStore::open(path)?;
            tracing::info!(path = %path.display(), "sqlite session store attached");
            Ok(LocalEventLog::new(store, clock))
        }
        None => Ok(LocalEventLog::in_memory(clock)),
    }
}
