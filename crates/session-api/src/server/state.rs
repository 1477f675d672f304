/// Shared handler state. The log does its own locking, so handlers never
/// hold a server-level lock.
#[derive(Clone)]
pub struct AppState {
    log: Arc<LocalEventLog>,
    puzzles: Arc<dyn PuzzleStore>,
    config: SyncConfig,
}

impl AppState {
    pub fn new(log: Arc<LocalEventLog>, puzzles: Arc<dyn PuzzleStore>) -> Self {
        Self {
            log,
            puzzles,
            config: SyncConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }
}

fn require_session(state: &AppState, session_id: &str) -> Result<SessionView, HttpApiError> {
    state
        .log
        .snapshot(session_id)
        .map_err(HttpApiError::from_transport)?
        .ok_or_else(|| HttpApiError::session_not_found(session_id))
}
