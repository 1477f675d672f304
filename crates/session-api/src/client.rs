//! One player's open view of a shared session.
//!
//! A [`SessionClient`] exclusively owns its [`ClientState`], timer and
//! subscriptions. Local writes are applied optimistically and then appended;
//! live entries are pulled in cooperatively through [`SessionClient::drain_live`]
//! or [`SessionClient::next_live`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use contracts::{
    ChatDraft, ChatMessage, Difficulty, EventDraft, EventKind, GameEvent, NewSession, Player,
    SessionSnapshot, SessionView, SyncConfig, GRID_SIZE,
};
use session_core::{
    build_timeline, is_editable, Board, ChatLog, ClientState, Completion, IngestOutcome,
    TimelineEntry, TimerClock,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::log::{EventLog, Subscription};
use crate::puzzles::PuzzleStore;
use crate::ticker::Ticker;
use crate::{MoveError, SessionError, TransportError};

/// Collaborators shared by every client in a process.
#[derive(Clone)]
pub struct SessionContext {
    pub log: Arc<dyn EventLog>,
    pub puzzles: Arc<dyn PuzzleStore>,
    pub clock: Arc<dyn Clock>,
    pub config: SyncConfig,
}

impl SessionContext {
    pub fn new(log: Arc<dyn EventLog>, puzzles: Arc<dyn PuzzleStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            log,
            puzzles,
            clock,
            config: SyncConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub session_id: String,
    pub display_name: String,
    /// Reuse a previous identity; a fresh one is minted when absent.
    pub player_id: Option<String>,
}

impl JoinRequest {
    pub fn new(session_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            display_name: display_name.into(),
            player_id: None,
        }
    }

    pub fn with_player_id(mut self, player_id: impl Into<String>) -> Self {
        self.player_id = Some(player_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveUpdate {
    Event(IngestOutcome),
    Chat(ChatMessage),
}

enum Received {
    Event(GameEvent),
    Chat(ChatMessage),
}

pub struct SessionClient {
    ctx: SessionContext,
    session_id: String,
    player_id: String,
    player_name: String,
    snapshot: SessionSnapshot,
    state: ClientState,
    timer: TimerClock,
    chat: ChatLog,
    roster: BTreeMap<String, Player>,
    event_feed: Subscription<GameEvent>,
    chat_feed: Subscription<ChatMessage>,
    ticker: Option<Ticker>,
    completion_reported: bool,
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("session_id", &self.session_id)
            .field("player_id", &self.player_id)
            .field("events", &self.state.len())
            .finish_non_exhaustive()
    }
}

impl SessionClient {
    /// Host action: pick a puzzle, open a session on the log and join it.
    pub fn host(
        ctx: SessionContext,
        difficulty: Difficulty,
        host_name: &str,
        initial_elapsed_seconds: u64,
    ) -> Result<Self, SessionError> {
        let puzzle = ctx.puzzles.fetch_random(difficulty)?;
        let view = ctx.log.create_session(NewSession::from_puzzle(
            difficulty,
            puzzle,
            initial_elapsed_seconds,
        ))?;

        Self::join(ctx, JoinRequest::new(view.session_id, host_name))
    }

    pub fn join(ctx: SessionContext, request: JoinRequest) -> Result<Self, SessionError> {
        let JoinRequest {
            session_id,
            display_name,
            player_id,
        } = request;
        let player_id = player_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(mint_player_id);

        let view = ctx
            .log
            .snapshot(&session_id)?
            .filter(|view| view.session.is_active)
            .ok_or_else(|| SessionError::SessionNotFound(session_id.clone()))?;

        let player = Player {
            id: player_id.clone(),
            name: display_name.clone(),
            joined_at: ctx.clock.now_ms(),
            is_active: true,
        };
        let join_event = announce_player(ctx.log.as_ref(), &view, player.clone())?;
        let rejoin = join_event.is_none();

        let mut roster = view
            .players
            .into_iter()
            .map(|player| (player.id.clone(), player))
            .collect::<BTreeMap<_, _>>();
        if !rejoin {
            roster.insert(player.id.clone(), player);
        }
        let player_name = roster
            .get(&player_id)
            .map(|player| player.name.clone())
            .unwrap_or(display_name);
        let mut backlog = view.events;
        backlog.extend(join_event);

        let joined_at = ctx.clock.now_ms();
        let snapshot = view.session;
        let state = ClientState::new(
            &player_id,
            snapshot.baseline,
            snapshot.created_at,
            joined_at,
            backlog,
        )
        .with_fast_path(ctx.config.fast_path);

        let event_feed = ctx.log.subscribe_events(&session_id)?;
        let chat_feed = ctx.log.subscribe_chat(&session_id)?;

        let mut chat = ChatLog::default();
        for message in view.chat {
            chat.push(message);
        }

        let mut timer = TimerClock::new(snapshot.created_at, snapshot.initial_elapsed_seconds);
        let completed_at = state
            .completion()
            .map(|completion| completion.completed_at)
            .or(snapshot.completed_at);
        let completion_reported = match completed_at {
            Some(at) => {
                timer.freeze(at);
                true
            }
            None => {
                timer.start();
                false
            }
        };

        info!(
            %session_id,
            %player_id,
            rejoin,
            backlog = state.len(),
            "joined session"
        );

        Ok(Self {
            ctx,
            session_id,
            player_id,
            player_name,
            snapshot,
            state,
            timer,
            chat,
            roster,
            event_feed,
            chat_feed,
            ticker: None,
            completion_reported,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn player_name(&self) -> &str {
        &self.player_name
    }

    pub fn joined_at(&self) -> u64 {
        self.state.joined_at()
    }

    pub fn snapshot(&self) -> &SessionSnapshot {
        &self.snapshot
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    pub fn board(&self) -> &Board {
        self.state.board()
    }

    pub fn is_solved(&self) -> bool {
        self.state.board().is_solved(&self.snapshot.solution)
    }

    pub fn timer(&self) -> &TimerClock {
        &self.timer
    }

    pub fn elapsed_seconds(&self, now_ms: u64) -> u64 {
        self.timer.elapsed_seconds(now_ms)
    }

    pub fn completion_reported(&self) -> bool {
        self.completion_reported
    }

    /// Chat and narrated events, newest `timeline_cap` entries.
    pub fn timeline(&self) -> Vec<TimelineEntry> {
        build_timeline(
            self.chat.iter(),
            self.state.events(),
            self.ctx.config.timeline_cap,
        )
    }

    /// Roster folded from the join snapshot and every buffered presence event.
    pub fn players(&self) -> Vec<Player> {
        let mut roster = self.roster.clone();
        for event in self.state.events() {
            match &event.kind {
                EventKind::PlayerJoin => {
                    let player = roster.entry(event.player_id.clone()).or_insert_with(|| Player {
                        id: event.player_id.clone(),
                        name: event.player_name.clone(),
                        joined_at: event.timestamp,
                        is_active: true,
                    });
                    player.is_active = true;
                }
                EventKind::PlayerLeave => {
                    if let Some(player) = roster.get_mut(&event.player_id) {
                        player.is_active = false;
                    }
                }
                EventKind::PlayerNameChange { new_name, .. } => {
                    if let Some(player) = roster.get_mut(&event.player_id) {
                        player.name = new_name.clone();
                    }
                }
                _ => {}
            }
        }
        roster.into_values().collect()
    }

    /// Starts the once-per-interval elapsed display. Requires a tokio runtime.
    pub fn start_ticker(&mut self) -> watch::Receiver<u64> {
        if let Some(ticker) = &self.ticker {
            return ticker.subscribe();
        }

        let mut ticker = Ticker::spawn(
            self.timer.clone(),
            Arc::clone(&self.ctx.clock),
            Duration::from_millis(self.ctx.config.tick_interval_ms),
        );
        if let session_core::TimerState::Frozen { completed_at } = self.timer.state() {
            ticker.freeze(completed_at);
        }
        let rx = ticker.subscribe();
        self.ticker = Some(ticker);
        rx
    }

    /// Writes a digit, or erases with `value == 0`. Declares completion when
    /// this write solves the grid.
    pub fn set_cell(&mut self, r: u8, c: u8, value: u8) -> Result<GameEvent, SessionError> {
        if value > 9 {
            return Err(MoveError::ValueOutOfRange(value).into());
        }
        self.check_editable(r, c)?;

        let event = self.write(EventKind::set_cell(r, c, value))?;

        if !self.state.board().halted && self.is_solved() {
            self.declare_completion()?;
        }
        Ok(event)
    }

    pub fn toggle_note(&mut self, r: u8, c: u8, value: u8) -> Result<GameEvent, SessionError> {
        if !(1..=9).contains(&value) {
            return Err(MoveError::ValueOutOfRange(value).into());
        }
        self.check_editable(r, c)?;

        let was_set = self
            .state
            .board()
            .note(usize::from(r), usize::from(c), value);
        self.write(EventKind::toggle_note(r, c, value, was_set))
    }

    pub fn quick_pencil(&mut self) -> Result<GameEvent, SessionError> {
        if self.state.board().halted {
            return Err(MoveError::Frozen.into());
        }
        self.write(EventKind::QuickPencil)
    }

    /// Returns `None` when the name is blank or unchanged.
    pub fn rename(&mut self, new_name: &str) -> Result<Option<GameEvent>, SessionError> {
        let new_name = new_name.trim();
        if new_name.is_empty() || new_name == self.player_name {
            return Ok(None);
        }

        let event = self.write(EventKind::PlayerNameChange {
            old_name: self.player_name.clone(),
            new_name: new_name.to_string(),
        })?;
        self.ctx
            .log
            .rename_player(&self.session_id, &self.player_id, new_name)?;
        self.player_name = new_name.to_string();
        Ok(Some(event))
    }

    /// Returns `None` for blank messages.
    pub fn send_chat(&mut self, text: &str) -> Result<Option<ChatMessage>, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let message = self.ctx.log.append_chat(
            &self.session_id,
            ChatDraft {
                player_id: self.player_id.clone(),
                player_name: self.player_name.clone(),
                message: text.to_string(),
            },
        )?;
        self.chat.push(message.clone());
        Ok(Some(message))
    }

    /// Everything already delivered by both subscriptions, without waiting.
    pub fn drain_live(&mut self) -> Vec<LiveUpdate> {
        let mut updates = Vec::new();
        while let Some(event) = self.event_feed.try_next() {
            updates.push(self.absorb(Received::Event(event)));
        }
        while let Some(message) = self.chat_feed.try_next() {
            updates.push(self.absorb(Received::Chat(message)));
        }
        updates
    }

    /// Waits for the next live entry; `None` once both feeds have closed.
    pub async fn next_live(&mut self) -> Option<LiveUpdate> {
        let received = tokio::select! {
            Some(event) = self.event_feed.next() => Received::Event(event),
            Some(message) = self.chat_feed.next() => Received::Chat(message),
            else => return None,
        };
        Some(self.absorb(received))
    }

    /// Closes the view. Presence updates are best effort.
    pub fn leave(self) {
        let Self {
            ctx,
            session_id,
            player_id,
            player_name,
            event_feed,
            chat_feed,
            ticker,
            ..
        } = self;
        event_feed.cancel();
        chat_feed.cancel();
        drop(ticker);

        if let Err(err) = ctx.log.append_event(
            &session_id,
            EventDraft::new(&player_id, &player_name, EventKind::PlayerLeave),
        ) {
            warn!(%session_id, %player_id, error = %err, "failed to append leave event");
        }
        if let Err(err) = ctx.log.set_player_active(&session_id, &player_id, false) {
            warn!(%session_id, %player_id, error = %err, "failed to mark player inactive");
        }
        info!(%session_id, %player_id, "left session");
    }

    fn absorb(&mut self, received: Received) -> LiveUpdate {
        match received {
            Received::Event(event) => {
                let outcome = self.state.ingest(event);
                self.after_ingest(&outcome);
                LiveUpdate::Event(outcome)
            }
            Received::Chat(message) => {
                self.chat.push(message.clone());
                LiveUpdate::Chat(message)
            }
        }
    }

    fn check_editable(&self, r: u8, c: u8) -> Result<(), MoveError> {
        let (row, col) = (usize::from(r), usize::from(c));
        if row >= GRID_SIZE || col >= GRID_SIZE {
            return Err(MoveError::OffGrid { r, c });
        }
        if !is_editable(&self.snapshot.baseline, row, col) {
            return Err(MoveError::GivenCell { r, c });
        }
        if self.state.board().halted {
            return Err(MoveError::Frozen);
        }
        Ok(())
    }

    /// Optimistic apply, then append. A failed append rolls the board back to
    /// what the buffered events alone produce.
    fn write(&mut self, kind: EventKind) -> Result<GameEvent, SessionError> {
        self.state.apply_local(&kind);

        let draft = EventDraft::new(&self.player_id, &self.player_name, kind);
        match self.ctx.log.append_event(&self.session_id, draft) {
            Ok(event) => {
                let outcome = self.state.commit_local(event.clone());
                self.after_ingest(&outcome);
                Ok(event)
            }
            Err(err) => {
                self.state.rollback_local();
                warn!(
                    session_id = %self.session_id,
                    error = %err,
                    "append failed; optimistic change rolled back"
                );
                Err(err.into())
            }
        }
    }

    /// Completion goes through the log like any other event and is never
    /// applied ahead of it.
    fn declare_completion(&mut self) -> Result<(), SessionError> {
        let draft = EventDraft::new(&self.player_id, &self.player_name, EventKind::PuzzleComplete);
        let event = self.ctx.log.append_event(&self.session_id, draft)?;
        debug!(session_id = %self.session_id, event_id = %event.id, "solved grid declared complete");

        let outcome = self.state.commit_local(event);
        self.after_ingest(&outcome);
        Ok(())
    }

    fn after_ingest(&mut self, outcome: &IngestOutcome) {
        if let IngestOutcome::Completed(completion) = outcome {
            self.on_completion(*completion);
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        self.timer.freeze(completion.completed_at);
        if let Some(ticker) = self.ticker.as_mut() {
            ticker.freeze(completion.completed_at);
        }

        if self.completion_reported {
            return;
        }
        self.completion_reported = true;

        let Some(duration_seconds) = completion.duration_seconds else {
            debug!(session_id = %self.session_id, "completion without a prior write; not reported");
            return;
        };
        match self.ctx.puzzles.report_completion(
            &self.snapshot.hash,
            duration_seconds,
            self.snapshot.difficulty,
        ) {
            Ok(()) => info!(
                session_id = %self.session_id,
                duration_seconds,
                "puzzle completion reported"
            ),
            Err(err) => warn!(
                session_id = %self.session_id,
                error = %err,
                "failed to report puzzle completion"
            ),
        }
    }
}

/// Registers `player` as active and appends its PlayerJoin, unless the
/// session already lists it as active. Returns the appended event.
pub fn announce_player(
    log: &dyn EventLog,
    view: &SessionView,
    player: Player,
) -> Result<Option<GameEvent>, TransportError> {
    if view.player(&player.id).is_some_and(|known| known.is_active) {
        debug!(session_id = %view.session_id, player_id = %player.id, "already active; join not re-announced");
        return Ok(None);
    }

    let draft = EventDraft::new(&player.id, &player.name, EventKind::PlayerJoin);
    log.register_player(
        &view.session_id,
        Player {
            is_active: true,
            ..player
        },
    )?;
    log.append_event(&view.session_id, draft).map(Some)
}

pub fn mint_player_id() -> String {
    format!("player_{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use tracing_test::traced_test;

    use super::*;
    use crate::clock::ManualClock;
    use crate::log::LocalEventLog;
    use crate::puzzles::MemoryPuzzleStore;

    /// Delegates to an in-memory log but can be told to refuse appends.
    struct FlakyLog {
        inner: LocalEventLog,
        refuse_appends: AtomicBool,
    }

    impl EventLog for FlakyLog {
        fn create_session(&self, session: NewSession) -> Result<SessionView, TransportError> {
            self.inner.create_session(session)
        }

        fn snapshot(&self, session_id: &str) -> Result<Option<SessionView>, TransportError> {
            self.inner.snapshot(session_id)
        }

        fn register_player(&self, session_id: &str, player: Player) -> Result<(), TransportError> {
            self.inner.register_player(session_id, player)
        }

        fn set_player_active(
            &self,
            session_id: &str,
            player_id: &str,
            active: bool,
        ) -> Result<(), TransportError> {
            self.inner.set_player_active(session_id, player_id, active)
        }

        fn rename_player(
            &self,
            session_id: &str,
            player_id: &str,
            name: &str,
        ) -> Result<(), TransportError> {
            self.inner.rename_player(session_id, player_id, name)
        }

        fn append_event(
            &self,
            session_id: &str,
            draft: EventDraft,
        ) -> Result<GameEvent, TransportError> {
            if self.refuse_appends.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            self.inner.append_event(session_id, draft)
        }

        fn append_chat(
            &self,
            session_id: &str,
            draft: ChatDraft,
        ) -> Result<ChatMessage, TransportError> {
            self.inner.append_chat(session_id, draft)
        }

        fn subscribe_events(
            &self,
            session_id: &str,
        ) -> Result<Subscription<GameEvent>, TransportError> {
            self.inner.subscribe_events(session_id)
        }

        fn subscribe_chat(
            &self,
            session_id: &str,
        ) -> Result<Subscription<ChatMessage>, TransportError> {
            self.inner.subscribe_chat(session_id)
        }
    }

    fn context() -> (SessionContext, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let log = Arc::new(LocalEventLog::in_memory(clock.clone()));
        let ctx = SessionContext::new(log, Arc::new(MemoryPuzzleStore::classic()), clock.clone());
        (ctx, clock)
    }

    #[test]
    fn minted_player_ids_are_distinct() {
        let a = mint_player_id();
        let b = mint_player_id();
        assert!(a.starts_with("player_"));
        assert_ne!(a, b);
    }

    #[test]
    fn local_input_is_validated_before_any_append() {
        let (ctx, _) = context();
        let mut client =
            SessionClient::host(ctx, Difficulty::Easy, "Ada", 0).expect("host session");
        let before = client.state().len();

        assert!(matches!(
            client.set_cell(9, 0, 1),
            Err(SessionError::Move(MoveError::OffGrid { r: 9, c: 0 }))
        ));
        assert!(matches!(
            client.set_cell(0, 0, 1),
            Err(SessionError::Move(MoveError::GivenCell { r: 0, c: 0 }))
        ));
        assert!(matches!(
            client.set_cell(0, 2, 10),
            Err(SessionError::Move(MoveError::ValueOutOfRange(10)))
        ));
        assert!(matches!(
            client.toggle_note(0, 2, 0),
            Err(SessionError::Move(MoveError::ValueOutOfRange(0)))
        ));
        assert_eq!(client.state().len(), before);
    }

    #[test]
    fn toggle_note_records_previous_state() {
        let (ctx, clock) = context();
        let mut client =
            SessionClient::host(ctx, Difficulty::Easy, "Ada", 0).expect("host session");

        clock.advance(10);
        let on = client.toggle_note(0, 2, 4).expect("toggle on");
        clock.advance(10);
        let off = client.toggle_note(0, 2, 4).expect("toggle off");

        assert_eq!(on.kind, EventKind::toggle_note(0, 2, 4, false));
        assert_eq!(off.kind, EventKind::toggle_note(0, 2, 4, true));
        assert!(!client.board().note(0, 2, 4));
    }

    #[test]
    fn blank_chat_and_rename_are_ignored() {
        let (ctx, _) = context();
        let mut client =
            SessionClient::host(ctx, Difficulty::Easy, "Ada", 0).expect("host session");

        assert_eq!(client.send_chat("   ").expect("chat"), None);
        assert_eq!(client.rename("  ").expect("rename"), None);
        assert_eq!(client.rename("Ada").expect("rename"), None);
    }

    #[test]
    fn rename_updates_roster_and_narration() {
        let (ctx, clock) = context();
        let mut client =
            SessionClient::host(ctx, Difficulty::Easy, "Ada", 0).expect("host session");

        clock.advance(5);
        client.rename("Grace").expect("rename").expect("event appended");

        assert_eq!(client.player_name(), "Grace");
        let me = client
            .players()
            .into_iter()
            .find(|player| player.id == client.player_id())
            .expect("self in roster");
        assert_eq!(me.name, "Grace");
        let last = client.timeline().pop().expect("timeline entry");
        assert_eq!(last.text(), "Ada changed their name to Grace");
    }

    #[test]
    #[traced_test]
    fn failed_append_rolls_back_optimistic_write() {
        let clock = Arc::new(ManualClock::new(1_000));
        let log = Arc::new(FlakyLog {
            inner: LocalEventLog::in_memory(clock.clone()),
            refuse_appends: AtomicBool::new(false),
        });
        let ctx = SessionContext::new(log.clone(), Arc::new(MemoryPuzzleStore::classic()), clock);
        let mut client =
            SessionClient::host(ctx, Difficulty::Easy, "Ada", 0).expect("host session");
        client.quick_pencil().expect("quick pencil");

        log.refuse_appends.store(true, Ordering::SeqCst);
        let err = client.set_cell(0, 2, 4).expect_err("append refused");
        assert!(matches!(err, SessionError::Transport(TransportError::Closed)));
        let err = client.toggle_note(0, 3, 6).expect_err("append refused");
        assert!(matches!(err, SessionError::Transport(TransportError::Closed)));

        assert_eq!(client.board().grid[0][2], 0);
        assert!(client.board().note(0, 3, 6));
        let rebuilt = session_core::reconcile(&client.snapshot().baseline, client.state().events());
        assert_eq!(client.board(), &rebuilt);
        assert!(logs_contain("optimistic change rolled back"));
    }
}
