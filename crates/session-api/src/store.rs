use std::collections::BTreeMap;

use contracts::{
    ChatMessage, Difficulty, GameEvent, Grid, NewSession, Player, SessionSnapshot,
};
use serde::{Deserialize, Serialize};
use session_core::Board;

use crate::TransportError;

/// Session metadata as persisted; grid state is always derived from events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub difficulty: Difficulty,
    pub hash: String,
    pub is_active: bool,
    pub baseline: Grid,
    pub solution: Grid,
    pub created_at: u64,
    pub initial_elapsed_seconds: u64,
    pub last_activity: u64,
    #[serde(default)]
    pub completed_at: Option<u64>,
}

impl SessionRecord {
    pub fn open(session: NewSession, now_ms: u64) -> Self {
        Self {
            difficulty: session.difficulty,
            hash: session.hash,
            is_active: true,
            baseline: session.baseline,
            solution: session.solution,
            created_at: now_ms,
            initial_elapsed_seconds: session.initial_elapsed_seconds,
            last_activity: now_ms,
            completed_at: None,
        }
    }

    pub fn snapshot(&self, board: &Board) -> SessionSnapshot {
        SessionSnapshot {
            difficulty: self.difficulty,
            hash: self.hash.clone(),
            is_active: self.is_active,
            baseline: self.baseline,
            current_grid: board.grid,
            notes: board.notes,
            solution: self.solution,
            created_at: self.created_at,
            initial_elapsed_seconds: self.initial_elapsed_seconds,
            last_activity: self.last_activity,
            completed_at: self.completed_at,
        }
    }
}

/// Durable backing for [`LocalEventLog`](crate::LocalEventLog).
pub trait SessionStore: Send {
    fn save_session(&mut self, session_id: &str, record: &SessionRecord)
        -> Result<(), TransportError>;
    fn load_session(&self, session_id: &str) -> Result<Option<SessionRecord>, TransportError>;
    fn list_sessions(&self) -> Result<Vec<String>, TransportError>;

    fn save_player(&mut self, session_id: &str, player: &Player) -> Result<(), TransportError>;
    fn load_players(&self, session_id: &str) -> Result<Vec<Player>, TransportError>;

    /// Returns false when an event with the same id is already stored.
    fn insert_event(&mut self, session_id: &str, event: &GameEvent)
        -> Result<bool, TransportError>;
    /// Stored events in `(timestamp, id)` order.
    fn load_events(&self, session_id: &str) -> Result<Vec<GameEvent>, TransportError>;

    fn insert_chat(&mut self, session_id: &str, message: &ChatMessage)
        -> Result<bool, TransportError>;
    fn load_chat(&self, session_id: &str) -> Result<Vec<ChatMessage>, TransportError>;
}

#[derive(Debug, Default)]
struct SessionEntry {
    record: Option<SessionRecord>,
    players: BTreeMap<String, Player>,
    events: BTreeMap<String, GameEvent>,
    chat: BTreeMap<String, ChatMessage>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: BTreeMap<String, SessionEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn save_session(
        &mut self,
        session_id: &str,
        record: &SessionRecord,
    ) -> Result<(), TransportError> {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .record = Some(record.clone());
        Ok(())
    }

    fn load_session(&self, session_id: &str) -> Result<Option<SessionRecord>, TransportError> {
        Ok(self
            .sessions
            .get(session_id)
            .and_then(|entry| entry.record.clone()))
    }

    fn list_sessions(&self) -> Result<Vec<String>, TransportError> {
        Ok(self
            .sessions
            .iter()
            .filter(|(_, entry)| entry.record.is_some())
            .map(|(session_id, _)| session_id.clone())
            .collect())
    }

    fn save_player(&mut self, session_id: &str, player: &Player) -> Result<(), TransportError> {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .players
            .insert(player.id.clone(), player.clone());
        Ok(())
    }

    fn load_players(&self, session_id: &str) -> Result<Vec<Player>, TransportError> {
        Ok(self
            .sessions
            .get(session_id)
            .map(|entry| entry.players.values().cloned().collect())
            .unwrap_or_default())
    }

    fn insert_event(&mut self, session_id: &str, event: &GameEvent) -> Result<bool, TransportError> {
        let events = &mut self.sessions.entry(session_id.to_string()).or_default().events;
        if events.contains_key(&event.id) {
            return Ok(false);
        }
        events.insert(event.id.clone(), event.clone());
        Ok(true)
    }

    fn load_events(&self, session_id: &str) -> Result<Vec<GameEvent>, TransportError> {
        let mut events = self
            .sessions
            .get(session_id)
            .map(|entry| entry.events.values().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        events.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Ok(events)
    }

    fn insert_chat(
        &mut self,
        session_id: &str,
        message: &ChatMessage,
    ) -> Result<bool, TransportError> {
        let chat = &mut self.sessions.entry(session_id.to_string()).or_default().chat;
        if chat.contains_key(&message.id) {
            return Ok(false);
        }
        chat.insert(message.id.clone(), message.clone());
        Ok(true)
    }

    fn load_chat(&self, session_id: &str) -> Result<Vec<ChatMessage>, TransportError> {
        let mut chat = self
            .sessions
            .get(session_id)
            .map(|entry| entry.chat.values().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        chat.sort_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)));
        Ok(chat)
    }
}
