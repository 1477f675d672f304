use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::GRID_SIZE;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    CellUpdate,
    PlayerJoin,
    PlayerLeave,
    PlayerNameChange,
    QuickPencil,
    PuzzleComplete,
}

/// Flat wire form of a game event as it travels through the log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub player_id: String,
    pub player_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShapeError {
    #[error("event is missing its id")]
    MissingId,
    #[error("event is missing its timestamp")]
    MissingTimestamp,
    #[error("event is missing its player id")]
    MissingPlayerId,
    #[error("{event_type:?} event is missing field `{field}`")]
    MissingField {
        event_type: EventType,
        field: &'static str,
    },
    #[error("cell ({r}, {c}) is outside the 9x9 grid")]
    CellOutOfRange { r: u8, c: u8 },
    #[error("value {0} is outside 0..=9")]
    ValueOutOfRange(u8),
    #[error("note toggles need a value in 1..=9")]
    NoteValueZero,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// `note = false` writes `value` (0 erases); `note = true` toggles the mark.
    /// `delete` is informational and never changes how the event applies.
    CellUpdate {
        r: u8,
        c: u8,
        value: u8,
        note: bool,
        delete: bool,
    },
    PlayerJoin,
    PlayerLeave,
    PlayerNameChange {
        old_name: String,
        new_name: String,
    },
    QuickPencil,
    PuzzleComplete,
}

impl EventKind {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::CellUpdate { .. } => EventType::CellUpdate,
            Self::PlayerJoin => EventType::PlayerJoin,
            Self::PlayerLeave => EventType::PlayerLeave,
            Self::PlayerNameChange { .. } => EventType::PlayerNameChange,
            Self::QuickPencil => EventType::QuickPencil,
            Self::PuzzleComplete => EventType::PuzzleComplete,
        }
    }

    pub fn set_cell(r: u8, c: u8, value: u8) -> Self {
        Self::CellUpdate {
            r,
            c,
            value,
            note: false,
            delete: value == 0,
        }
    }

    pub fn toggle_note(r: u8, c: u8, value: u8, was_set: bool) -> Self {
        Self::CellUpdate {
            r,
            c,
            value,
            note: true,
            delete: was_set,
        }
    }

    /// True for kinds that can change the grid or notes.
    pub fn touches_board(&self) -> bool {
        matches!(
            self,
            Self::CellUpdate { .. } | Self::QuickPencil | Self::PuzzleComplete
        )
    }

    fn from_record(record: &EventRecord) -> Result<Self, ShapeError> {
        let event_type = record.event_type;
        let require = |value: Option<u8>, field: &'static str| {
            value.ok_or(ShapeError::MissingField { event_type, field })
        };

        let kind = match event_type {
            EventType::CellUpdate => {
                let r = require(record.r, "r")?;
                let c = require(record.c, "c")?;
                let value = require(record.value, "value")?;
                let note = record.note.unwrap_or(false);

                if usize::from(r) >= GRID_SIZE || usize::from(c) >= GRID_SIZE {
                    return Err(ShapeError::CellOutOfRange { r, c });
                }
                if usize::from(value) > GRID_SIZE {
                    return Err(ShapeError::ValueOutOfRange(value));
                }
                if note && value == 0 {
                    return Err(ShapeError::NoteValueZero);
                }

                Self::CellUpdate {
                    r,
                    c,
                    value,
                    note,
                    delete: record.delete.unwrap_or(false),
                }
            }
            EventType::PlayerJoin => Self::PlayerJoin,
            EventType::PlayerLeave => Self::PlayerLeave,
            EventType::PlayerNameChange => Self::PlayerNameChange {
                old_name: record.old_name.clone().unwrap_or_default(),
                new_name: record.new_name.clone().ok_or(ShapeError::MissingField {
                    event_type,
                    field: "newName",
                })?,
            },
            EventType::QuickPencil => Self::QuickPencil,
            EventType::PuzzleComplete => Self::PuzzleComplete,
        };

        Ok(kind)
    }
}

/// An event as the log stores it: immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "EventRecord", into = "EventRecord")]
pub struct GameEvent {
    pub id: String,
    pub player_id: String,
    pub player_name: String,
    pub timestamp: u64,
    pub kind: EventKind,
}

impl GameEvent {
    pub fn event_type(&self) -> EventType {
        self.kind.event_type()
    }

    /// Total order used for every replay: timestamp first, then id.
    pub fn sort_key(&self) -> (u64, &str) {
        (self.timestamp, self.id.as_str())
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

impl TryFrom<EventRecord> for GameEvent {
    type Error = ShapeError;

    fn try_from(record: EventRecord) -> Result<Self, Self::Error> {
        let kind = EventKind::from_record(&record)?;
        let id = record
            .id
            .filter(|id| !id.is_empty())
            .ok_or(ShapeError::MissingId)?;
        let timestamp = record.timestamp.ok_or(ShapeError::MissingTimestamp)?;
        if record.player_id.is_empty() {
            return Err(ShapeError::MissingPlayerId);
        }

        Ok(Self {
            id,
            player_id: record.player_id,
            player_name: record.player_name,
            timestamp,
            kind,
        })
    }
}

impl From<GameEvent> for EventRecord {
    fn from(event: GameEvent) -> Self {
        let mut record = EventRecord::bare(
            event.kind.event_type(),
            event.player_id,
            event.player_name,
        );
        record.id = Some(event.id);
        record.timestamp = Some(event.timestamp);
        record.fill_kind(event.kind);
        record
    }
}

/// An event before the log assigns its id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "EventRecord", into = "EventRecord")]
pub struct EventDraft {
    pub player_id: String,
    pub player_name: String,
    pub kind: EventKind,
}

impl EventDraft {
    pub fn new(player_id: impl Into<String>, player_name: impl Into<String>, kind: EventKind) -> Self {
        Self {
            player_id: player_id.into(),
            player_name: player_name.into(),
            kind,
        }
    }

    pub fn into_event(self, id: String, timestamp: u64) -> GameEvent {
        GameEvent {
            id,
            player_id: self.player_id,
            player_name: self.player_name,
            timestamp,
            kind: self.kind,
        }
    }
}

impl TryFrom<EventRecord> for EventDraft {
    type Error = ShapeError;

    fn try_from(record: EventRecord) -> Result<Self, Self::Error> {
        let kind = EventKind::from_record(&record)?;
        if record.player_id.is_empty() {
            return Err(ShapeError::MissingPlayerId);
        }

        Ok(Self {
            player_id: record.player_id,
            player_name: record.player_name,
            kind,
        })
    }
}

impl From<EventDraft> for EventRecord {
    fn from(draft: EventDraft) -> Self {
        let mut record = EventRecord::bare(
            draft.kind.event_type(),
            draft.player_id,
            draft.player_name,
        );
        record.fill_kind(draft.kind);
        record
    }
}

impl EventRecord {
    fn bare(event_type: EventType, player_id: String, player_name: String) -> Self {
        Self {
            id: None,
            event_type,
            player_id,
            player_name,
            timestamp: None,
            r: None,
            c: None,
            value: None,
            note: None,
            delete: None,
            old_name: None,
            new_name: None,
        }
    }

    fn fill_kind(&mut self, kind: EventKind) {
        match kind {
            EventKind::CellUpdate {
                r,
                c,
                value,
                note,
                delete,
            } => {
                self.r = Some(r);
                self.c = Some(c);
                self.value = Some(value);
                self.note = Some(note);
                self.delete = Some(delete);
            }
            EventKind::PlayerNameChange { old_name, new_name } => {
                self.old_name = Some(old_name);
                self.new_name = Some(new_name);
            }
            EventKind::PlayerJoin
            | EventKind::PlayerLeave
            | EventKind::QuickPencil
            | EventKind::PuzzleComplete => {}
        }
    }
}
