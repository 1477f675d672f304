use std::path::Path;

use contracts::{ChatMessage, GameEvent, Player};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use crate::store::{SessionRecord, SessionStore};
use crate::TransportError;

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let conn = Connection::open(path)?;
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, TransportError> {
        let conn = Connection::open_in_memory()?;
        let mut store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn configure(&mut self) -> Result<(), TransportError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    fn migrate(&mut self) -> Result<(), TransportError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                difficulty TEXT NOT NULL,
                puzzle_hash TEXT NOT NULL,
                is_active INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                last_activity INTEGER NOT NULL,
                payload_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS players (
                session_id TEXT NOT NULL,
                player_id TEXT NOT NULL,
                is_active INTEGER NOT NULL,
                payload_json TEXT NOT NULL,
                PRIMARY KEY (session_id, player_id)
            );

            CREATE TABLE IF NOT EXISTS events (
                session_id TEXT NOT NULL,
                event_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                event_type TEXT NOT NULL,
                player_id TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                PRIMARY KEY (session_id, event_id)
            );

            CREATE TABLE IF NOT EXISTS chat_messages (
                session_id TEXT NOT NULL,
                message_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                payload_json TEXT NOT NULL,
                PRIMARY KEY (session_id, message_id)
            );

            CREATE INDEX IF NOT EXISTS idx_events_session_order ON events(session_id, timestamp, event_id);
            CREATE INDEX IF NOT EXISTS idx_chat_session_order ON chat_messages(session_id, timestamp, message_id);
            ",
        )?;

        self.conn.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, name, applied_at)
             VALUES(1, 'initial_v1', 'epoch-ms-0')",
            [],
        )?;

        Ok(())
    }
}

impl SessionStore for SqliteStore {
    fn save_session(
        &mut self,
        session_id: &str,
        record: &SessionRecord,
    ) -> Result<(), TransportError> {
        let payload_json = serde_json::to_string(record)?;
        self.conn.execute(
            "INSERT INTO sessions (
                session_id,
                difficulty,
                puzzle_hash,
                is_active,
                created_at,
                last_activity,
                payload_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(session_id) DO UPDATE SET
                is_active = excluded.is_active,
                last_activity = excluded.last_activity,
                payload_json = excluded.payload_json",
            params![
                session_id,
                record.difficulty.as_str(),
                record.hash.as_str(),
                i64::from(record.is_active),
                to_sql_ms(record.created_at),
                to_sql_ms(record.last_activity),
                payload_json,
            ],
        )?;
        Ok(())
    }

    fn load_session(&self, session_id: &str) -> Result<Option<SessionRecord>, TransportError> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload_json FROM sessions WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            Some(raw) => Ok(Some(serde_json::from_str::<SessionRecord>(&raw)?)),
            None => Ok(None),
        }
    }

    fn list_sessions(&self) -> Result<Vec<String>, TransportError> {
        let mut stmt = self
            .conn
            .prepare("SELECT session_id FROM sessions ORDER BY created_at ASC, session_id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut session_ids = Vec::new();
        for row in rows {
            session_ids.push(row?);
        }
        Ok(session_ids)
    }

    fn save_player(&mut self, session_id: &str, player: &Player) -> Result<(), TransportError> {
        let payload_json = serde_json::to_string(player)?;
        self.conn.execute(
            "INSERT INTO players (session_id, player_id, is_active, payload_json)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(session_id, player_id) DO UPDATE SET
                is_active = excluded.is_active,
                payload_json = excluded.payload_json",
            params![
                session_id,
                player.id.as_str(),
                i64::from(player.is_active),
                payload_json,
            ],
        )?;
        Ok(())
    }

    fn load_players(&self, session_id: &str) -> Result<Vec<Player>, TransportError> {
        load_payloads(
            &self.conn,
            "SELECT payload_json FROM players WHERE session_id = ?1 ORDER BY player_id ASC",
            session_id,
        )
    }

    fn insert_event(&mut self, session_id: &str, event: &GameEvent) -> Result<bool, TransportError> {
        let payload_json = serde_json::to_string(event)?;
        let event_type = serde_json::to_string(&event.event_type())?
            .trim_matches('"')
            .to_string();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO events (
                session_id,
                event_id,
                timestamp,
                event_type,
                player_id,
                payload_json
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session_id,
                event.id.as_str(),
                to_sql_ms(event.timestamp),
                event_type,
                event.player_id.as_str(),
                payload_json,
            ],
        )?;
        Ok(inserted > 0)
    }

    fn load_events(&self, session_id: &str) -> Result<Vec<GameEvent>, TransportError> {
        let rows = load_rows(
            &self.conn,
            "SELECT payload_json
             FROM events
             WHERE session_id = ?1
             ORDER BY timestamp ASC, event_id ASC",
            session_id,
        )?;

        Ok(rows
            .into_iter()
            .filter_map(|payload| match serde_json::from_str::<GameEvent>(&payload) {
                Ok(event) => Some(event),
                Err(err) => {
                    warn!(session_id, error = %err, "skipping stored event with invalid shape");
                    None
                }
            })
            .collect())
    }

    fn insert_chat(
        &mut self,
        session_id: &str,
        message: &ChatMessage,
    ) -> Result<bool, TransportError> {
        let payload_json = serde_json::to_string(message)?;
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO chat_messages (session_id, message_id, timestamp, payload_json)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session_id,
                message.id.as_str(),
                to_sql_ms(message.timestamp),
                payload_json,
            ],
        )?;
        Ok(inserted > 0)
    }

    fn load_chat(&self, session_id: &str) -> Result<Vec<ChatMessage>, TransportError> {
        load_payloads(
            &self.conn,
            "SELECT payload_json
             FROM chat_messages
             WHERE session_id = ?1
             ORDER BY timestamp ASC, message_id ASC",
            session_id,
        )
    }
}

fn load_rows(conn: &Connection, sql: &str, session_id: &str) -> Result<Vec<String>, TransportError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![session_id], |row| row.get::<_, String>(0))?;
    let payloads = rows.collect::<Result<Vec<_>, _>>()?;
    Ok(payloads)
}

fn load_payloads<T: serde::de::DeserializeOwned>(
    conn: &Connection,
    sql: &str,
    session_id: &str,
) -> Result<Vec<T>, TransportError> {
    load_rows(conn, sql, session_id)?
        .iter()
        .map(|payload| serde_json::from_str::<T>(payload).map_err(TransportError::from))
        .collect()
}

fn to_sql_ms(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use contracts::{empty_grid, Difficulty, EventKind, NewSession};
    use tracing_test::traced_test;

    use super::*;

    fn temp_db_path(name: &str) -> std::path::PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();

        std::env::temp_dir().join(format!("sudoku_sync_{name}_{nanos}.sqlite"))
    }

    fn cleanup(path: &std::path::Path) {
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(path.with_extension("sqlite-wal"));
        let _ = std::fs::remove_file(path.with_extension("sqlite-shm"));
    }

    fn record() -> SessionRecord {
        SessionRecord::open(
            NewSession {
                difficulty: Difficulty::Hard,
                baseline: empty_grid(),
                solution: empty_grid(),
                hash: "0".repeat(81),
                initial_elapsed_seconds: 12,
            },
            1_000,
        )
    }

    #[test]
    fn session_record_survives_reopen() {
        let path = temp_db_path("reopen");
        {
            let mut store = SqliteStore::open(&path).expect("open store");
            store.save_session("s1", &record()).expect("save session");
            store
                .save_player(
                    "s1",
                    &Player {
                        id: "p1".to_string(),
                        name: "Ada".to_string(),
                        joined_at: 1_001,
                        is_active: true,
                    },
                )
                .expect("save player");
        }

        let store = SqliteStore::open(&path).expect("reopen store");
        let loaded = store
            .load_session("s1")
            .expect("load session")
            .expect("session present");
        assert_eq!(loaded, record());
        assert_eq!(store.load_players("s1").expect("players").len(), 1);
        assert_eq!(store.list_sessions().expect("list"), vec!["s1".to_string()]);

        drop(store);
        cleanup(&path);
    }

    #[test]
    fn events_are_idempotent_and_ordered() {
        let mut store = SqliteStore::open_in_memory().expect("open store");
        let make = |id: &str, timestamp: u64| GameEvent {
            id: id.to_string(),
            player_id: "p1".to_string(),
            player_name: "Ada".to_string(),
            timestamp,
            kind: EventKind::set_cell(0, 0, 1),
        };

        assert!(store.insert_event("s1", &make("b", 20)).expect("insert"));
        assert!(store.insert_event("s1", &make("a", 20)).expect("insert"));
        assert!(store.insert_event("s1", &make("z", 10)).expect("insert"));
        assert!(!store.insert_event("s1", &make("a", 20)).expect("insert"));

        let ids = store
            .load_events("s1")
            .expect("load")
            .into_iter()
            .map(|event| event.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["z", "a", "b"]);
        assert!(store.load_events("other").expect("load").is_empty());
    }

    #[test]
    #[traced_test]
    fn undecodable_stored_event_is_skipped() {
        let mut store = SqliteStore::open_in_memory().expect("open store");
        let good = GameEvent {
            id: "a".to_string(),
            player_id: "p1".to_string(),
            player_name: "Ada".to_string(),
            timestamp: 10,
            kind: EventKind::set_cell(0, 0, 1),
        };
        assert!(store.insert_event("s1", &good).expect("insert"));
        store
            .conn
            .execute(
                "INSERT INTO events (session_id, event_id, timestamp, event_type, player_id, payload_json)
                 VALUES ('s1', 'b', 20, 'cellUpdate', 'p1', '{\"type\":\"cellUpdate\",\"id\":\"b\"}')",
                [],
            )
            .expect("insert malformed row");

        assert_eq!(store.load_events("s1").expect("load"), vec![good]);
        assert!(logs_contain("skipping stored event with invalid shape"));
    }

    #[test]
    fn chat_round_trips() {
        let mut store = SqliteStore::open_in_memory().expect("open store");
        let message = ChatMessage {
            id: "c1".to_string(),
            player_id: "p1".to_string(),
            player_name: "Ada".to_string(),
            message: "hello".to_string(),
            timestamp: 3,
        };
        assert!(store.insert_chat("s1", &message).expect("insert"));
        assert!(!store.insert_chat("s1", &message).expect("insert"));
        assert_eq!(store.load_chat("s1").expect("load"), vec![message]);
    }
}
