//! Live event intake for one client's view of a session.
//!
//! [`ClientState`] owns the buffered event set and the board derived from it.
//! After every full rebuild `board == reconcile(baseline, buffer)`. Between
//! rebuilds the fast path only appends events whose key sorts after everything
//! buffered, which keeps the same equality except for stale self-replays. Those
//! are buffered untouched and folded in by the next rebuild.

use std::collections::BTreeMap;

use contracts::{EventKind, GameEvent, Grid};
use tracing::{debug, warn};

use crate::board::Board;
use crate::reconcile::{
    apply_event, apply_kind, completion_duration_seconds, completion_event, reconcile,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub completed_at: u64,
    /// Seconds to the last write before completion; what gets reported.
    pub duration_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Appended incrementally on top of the current board.
    Applied,
    /// Triggered a full rebuild from the baseline.
    Reconciled,
    /// Buffered without any board effect (presence events).
    Recorded,
    /// The board froze as a result of this event.
    Completed(Completion),
    DuplicateIgnored,
    StaleReplayIgnored,
    Rejected(String),
}

impl IngestOutcome {
    pub fn changed_board(&self) -> bool {
        matches!(
            self,
            Self::Applied | Self::Reconciled | Self::Completed(_)
        )
    }
}

#[derive(Debug, Clone)]
pub struct ClientState {
    player_id: String,
    baseline: Grid,
    created_at: u64,
    joined_at: u64,
    fast_path: bool,
    buffer: BTreeMap<String, GameEvent>,
    newest_key: Option<(u64, String)>,
    board: Board,
}

impl ClientState {
    /// Builds the initial view from the join snapshot's backlog.
    pub fn new(
        player_id: impl Into<String>,
        baseline: Grid,
        created_at: u64,
        joined_at: u64,
        backlog: impl IntoIterator<Item = GameEvent>,
    ) -> Self {
        let mut state = Self {
            player_id: player_id.into(),
            baseline,
            created_at,
            joined_at,
            fast_path: true,
            buffer: BTreeMap::new(),
            newest_key: None,
            board: Board::from_baseline(&baseline),
        };

        for event in backlog {
            state.remember(event);
        }
        state.rebuild();
        state
    }

    pub fn with_fast_path(mut self, enabled: bool) -> Self {
        self.fast_path = enabled;
        self
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn baseline(&self) -> &Grid {
        &self.baseline
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn joined_at(&self) -> u64 {
        self.joined_at
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.buffer.contains_key(event_id)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Buffered events in replay order.
    pub fn events(&self) -> Vec<&GameEvent> {
        let mut events = self.buffer.values().collect::<Vec<_>>();
        events.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        events
    }

    pub fn completion(&self) -> Option<Completion> {
        if !self.board.halted {
            return None;
        }

        let completed_at = completion_event(self.buffer.values())?.timestamp;
        Some(Completion {
            completed_at,
            duration_seconds: completion_duration_seconds(self.buffer.values(), self.created_at),
        })
    }

    /// Parses a raw wire payload first; malformed payloads are dropped.
    pub fn ingest_value(&mut self, value: serde_json::Value) -> IngestOutcome {
        match GameEvent::from_json(value) {
            Ok(event) => self.ingest(event),
            Err(err) => {
                warn!(error = %err, "dropping event with invalid shape");
                IngestOutcome::Rejected(err.to_string())
            }
        }
    }

    pub fn ingest(&mut self, event: GameEvent) -> IngestOutcome {
        if self.buffer.contains_key(&event.id) {
            debug!(event_id = %event.id, "duplicate event ignored");
            return IngestOutcome::DuplicateIgnored;
        }

        let stale = event.player_id == self.player_id && event.timestamp <= self.joined_at;
        let in_order = self.sorts_after_buffer(&event);
        let touches_board = event.kind.touches_board();
        let is_completion = matches!(event.kind, EventKind::PuzzleComplete);
        let was_halted = self.board.halted;

        if stale {
            self.remember(event);
            debug!(joined_at = self.joined_at, "own pre-join event buffered without applying");
            return IngestOutcome::StaleReplayIgnored;
        }

        if !touches_board {
            self.remember(event);
            return IngestOutcome::Recorded;
        }

        let outcome = if self.fast_path && in_order && !is_completion {
            self.board = apply_event(self.board.clone(), &event, &self.baseline);
            self.remember(event);
            IngestOutcome::Applied
        } else {
            debug!(
                event_id = %event.id,
                in_order,
                is_completion,
                "rebuilding board from baseline"
            );
            self.remember(event);
            self.rebuild();
            IngestOutcome::Reconciled
        };

        self.completion_transition(was_halted).unwrap_or(outcome)
    }

    /// Optimistically applies a local action before it has been appended.
    pub fn apply_local(&mut self, kind: &EventKind) {
        self.board = apply_kind(self.board.clone(), kind, &self.baseline);
    }

    /// Records the log's copy of a local action already applied by
    /// [`apply_local`](Self::apply_local). Completion events are never applied
    /// optimistically; they always rebuild here.
    pub fn commit_local(&mut self, event: GameEvent) -> IngestOutcome {
        if self.buffer.contains_key(&event.id) {
            return IngestOutcome::DuplicateIgnored;
        }

        let was_halted = self.board.halted;
        let in_order = self.sorts_after_buffer(&event);
        let touches_board = event.kind.touches_board();
        let is_completion = matches!(event.kind, EventKind::PuzzleComplete);
        self.remember(event);

        let outcome = if !touches_board {
            IngestOutcome::Recorded
        } else if in_order && !is_completion {
            IngestOutcome::Applied
        } else {
            self.rebuild();
            IngestOutcome::Reconciled
        };

        self.completion_transition(was_halted).unwrap_or(outcome)
    }

    /// Discards optimistic changes that never made it into the log.
    pub fn rollback_local(&mut self) {
        self.rebuild();
    }

    pub fn rebuild(&mut self) {
        self.board = reconcile(&self.baseline, self.buffer.values());
    }

    fn sorts_after_buffer(&self, event: &GameEvent) -> bool {
        match &self.newest_key {
            Some((timestamp, id)) => event.sort_key() > (*timestamp, id.as_str()),
            None => true,
        }
    }

    fn remember(&mut self, event: GameEvent) {
        if self.sorts_after_buffer(&event) {
            self.newest_key = Some((event.timestamp, event.id.clone()));
        }
        self.buffer.insert(event.id.clone(), event);
    }

    fn completion_transition(&self, was_halted: bool) -> Option<IngestOutcome> {
        if was_halted || !self.board.halted {
            return None;
        }
        self.completion().map(IngestOutcome::Completed)
    }
}
