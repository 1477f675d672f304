//! The append-only session log and its in-process implementation.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use contracts::{
    ChatDraft, ChatMessage, EventDraft, EventKind, GameEvent, NewSession, Player, SessionView,
};
use session_core::reconcile;
use tokio::sync::mpsc;
use tracing::{debug, info};
use ulid::{Generator, Ulid};

use crate::clock::Clock;
use crate::store::{MemoryStore, SessionRecord, SessionStore};
use crate::TransportError;

/// Live feed from the log. Delivery is at-least-once: history is replayed
/// first, then new entries as they are appended. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    pub fn from_receiver(rx: mpsc::UnboundedReceiver<T>) -> Self {
        Self { rx }
    }

    /// Waits for the next entry; `None` once the log side is gone.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_next(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn cancel(mut self) {
        self.rx.close();
    }
}

/// Transport contract between clients and the shared log.
pub trait EventLog: Send + Sync {
    fn create_session(&self, session: NewSession) -> Result<SessionView, TransportError>;
    /// One-shot read; `None` when the session does not exist.
    fn snapshot(&self, session_id: &str) -> Result<Option<SessionView>, TransportError>;
    /// Inserts or replaces a player record.
    fn register_player(&self, session_id: &str, player: Player) -> Result<(), TransportError>;
    fn set_player_active(
        &self,
        session_id: &str,
        player_id: &str,
        active: bool,
    ) -> Result<(), TransportError>;
    fn rename_player(
        &self,
        session_id: &str,
        player_id: &str,
        name: &str,
    ) -> Result<(), TransportError>;
    /// Assigns a fresh sortable id and the log's timestamp.
    fn append_event(&self, session_id: &str, draft: EventDraft) -> Result<GameEvent, TransportError>;
    fn append_chat(&self, session_id: &str, draft: ChatDraft) -> Result<ChatMessage, TransportError>;
    fn subscribe_events(&self, session_id: &str) -> Result<Subscription<GameEvent>, TransportError>;
    fn subscribe_chat(&self, session_id: &str) -> Result<Subscription<ChatMessage>, TransportError>;
}

#[derive(Default)]
struct Fanout {
    events: Vec<mpsc::UnboundedSender<GameEvent>>,
    chat: Vec<mpsc::UnboundedSender<ChatMessage>>,
}

struct LogInner {
    store: Box<dyn SessionStore>,
    fanout: BTreeMap<String, Fanout>,
    ids: Generator,
}

impl LogInner {
    /// Strictly increasing across every append on this log, so two entries
    /// stamped in the same millisecond keep their append order.
    fn next_id(&mut self) -> String {
        self.ids
            .generate()
            .unwrap_or_else(|_| Ulid::new())
            .to_string()
    }
}

/// Event log hosted in this process, backed by any [`SessionStore`].
pub struct LocalEventLog {
    inner: Mutex<LogInner>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for LocalEventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEventLog").finish_non_exhaustive()
    }
}

impl LocalEventLog {
    pub fn new(store: impl SessionStore + 'static, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(LogInner {
                store: Box::new(store),
                fanout: BTreeMap::new(),
                ids: Generator::new(),
            }),
            clock,
        }
    }

    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(MemoryStore::new(), clock)
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn list_sessions(&self) -> Result<Vec<String>, TransportError> {
        self.lock()?.store.list_sessions()
    }

    fn lock(&self) -> Result<MutexGuard<'_, LogInner>, TransportError> {
        self.inner.lock().map_err(|_| TransportError::Poisoned)
    }

    fn require_session(
        inner: &LogInner,
        session_id: &str,
    ) -> Result<SessionRecord, TransportError> {
        inner
            .store
            .load_session(session_id)?
            .ok_or_else(|| TransportError::UnknownSession(session_id.to_string()))
    }

    fn touch(
        inner: &mut LogInner,
        session_id: &str,
        mut record: SessionRecord,
        now_ms: u64,
    ) -> Result<(), TransportError> {
        record.last_activity = record.last_activity.max(now_ms);
        inner.store.save_session(session_id, &record)
    }

    fn view(inner: &LogInner, session_id: &str) -> Result<Option<SessionView>, TransportError> {
        let Some(record) = inner.store.load_session(session_id)? else {
            return Ok(None);
        };
        let events = inner.store.load_events(session_id)?;
        let board = reconcile(&record.baseline, &events);

        Ok(Some(SessionView {
            session_id: session_id.to_string(),
            session: record.snapshot(&board),
            players: inner.store.load_players(session_id)?,
            events,
            chat: inner.store.load_chat(session_id)?,
        }))
    }
}

impl EventLog for LocalEventLog {
    fn create_session(&self, session: NewSession) -> Result<SessionView, TransportError> {
        let now_ms = self.clock.now_ms();
        let difficulty = session.difficulty;

        let mut inner = self.lock()?;
        let session_id = inner.next_id();
        inner
            .store
            .save_session(&session_id, &SessionRecord::open(session, now_ms))?;
        info!(%session_id, %difficulty, "session created");

        Self::view(&inner, &session_id)?.ok_or(TransportError::UnknownSession(session_id))
    }

    fn snapshot(&self, session_id: &str) -> Result<Option<SessionView>, TransportError> {
        let inner = self.lock()?;
        Self::view(&inner, session_id)
    }

    fn register_player(&self, session_id: &str, player: Player) -> Result<(), TransportError> {
        let now_ms = self.clock.now_ms();
        let mut inner = self.lock()?;
        let record = Self::require_session(&inner, session_id)?;
        inner.store.save_player(session_id, &player)?;
        Self::touch(&mut inner, session_id, record, now_ms)
    }

    fn set_player_active(
        &self,
        session_id: &str,
        player_id: &str,
        active: bool,
    ) -> Result<(), TransportError> {
        let now_ms = self.clock.now_ms();
        let mut inner = self.lock()?;
        let record = Self::require_session(&inner, session_id)?;
        let players = inner.store.load_players(session_id)?;
        let Some(mut player) = players.into_iter().find(|player| player.id == player_id) else {
            debug!(session_id, player_id, "presence update for unknown player ignored");
            return Ok(());
        };

        player.is_active = active;
        inner.store.save_player(session_id, &player)?;
        Self::touch(&mut inner, session_id, record, now_ms)
    }

    fn rename_player(
        &self,
        session_id: &str,
        player_id: &str,
        name: &str,
    ) -> Result<(), TransportError> {
        let mut inner = self.lock()?;
        Self::require_session(&inner, session_id)?;
        let players = inner.store.load_players(session_id)?;
        if let Some(mut player) = players.into_iter().find(|player| player.id == player_id) {
            player.name = name.to_string();
            inner.store.save_player(session_id, &player)?;
        }
        Ok(())
    }

    fn append_event(&self, session_id: &str, draft: EventDraft) -> Result<GameEvent, TransportError> {
        let now_ms = self.clock.now_ms();

        let mut inner = self.lock()?;
        let mut record = Self::require_session(&inner, session_id)?;
        let event = draft.into_event(inner.next_id(), now_ms);
        inner.store.insert_event(session_id, &event)?;

        // Earliest completion wins, matching the one reconciliation halts on.
        if matches!(event.kind, EventKind::PuzzleComplete)
            && record.completed_at.map_or(true, |at| event.timestamp < at)
        {
            record.completed_at = Some(event.timestamp);
            info!(session_id, completed_at = event.timestamp, "session completed");
        }
        Self::touch(&mut inner, session_id, record, now_ms)?;

        if let Some(fanout) = inner.fanout.get_mut(session_id) {
            fanout.events.retain(|tx| tx.send(event.clone()).is_ok());
        }
        debug!(session_id, event_id = %event.id, event_type = ?event.event_type(), "event appended");

        Ok(event)
    }

    fn append_chat(&self, session_id: &str, draft: ChatDraft) -> Result<ChatMessage, TransportError> {
        let now_ms = self.clock.now_ms();

        let mut inner = self.lock()?;
        let record = Self::require_session(&inner, session_id)?;
        let message = ChatMessage {
            id: inner.next_id(),
            player_id: draft.player_id,
            player_name: draft.player_name,
            message: draft.message,
            timestamp: now_ms,
        };
        inner.store.insert_chat(session_id, &message)?;
        Self::touch(&mut inner, session_id, record, now_ms)?;

        if let Some(fanout) = inner.fanout.get_mut(session_id) {
            fanout.chat.retain(|tx| tx.send(message.clone()).is_ok());
        }

        Ok(message)
    }

    fn subscribe_events(&self, session_id: &str) -> Result<Subscription<GameEvent>, TransportError> {
        let mut inner = self.lock()?;
        Self::require_session(&inner, session_id)?;

        let (tx, rx) = mpsc::unbounded_channel();
        for event in inner.store.load_events(session_id)? {
            tx.send(event).map_err(|_| TransportError::Closed)?;
        }
        inner
            .fanout
            .entry(session_id.to_string())
            .or_default()
            .events
            .push(tx);

        Ok(Subscription::from_receiver(rx))
    }

    fn subscribe_chat(&self, session_id: &str) -> Result<Subscription<ChatMessage>, TransportError> {
        let mut inner = self.lock()?;
        Self::require_session(&inner, session_id)?;

        let (tx, rx) = mpsc::unbounded_channel();
        for message in inner.store.load_chat(session_id)? {
            tx.send(message).map_err(|_| TransportError::Closed)?;
        }
        inner
            .fanout
            .entry(session_id.to_string())
            .or_default()
            .chat
            .push(tx);

        Ok(Subscription::from_receiver(rx))
    }
}
