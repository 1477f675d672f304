//! Display feed merging chat with narrated game events.

use std::collections::BTreeMap;

use contracts::{ChatMessage, EventKind, EventType, GameEvent};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TimelineBody {
    Chat { message: String },
    Narration { event_type: EventType, text: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub id: String,
    pub timestamp: u64,
    pub player_id: String,
    pub player_name: String,
    pub body: TimelineBody,
}

impl TimelineEntry {
    pub fn text(&self) -> &str {
        match &self.body {
            TimelineBody::Chat { message } => message,
            TimelineBody::Narration { text, .. } => text,
        }
    }
}

/// One-line description of an event, or `None` for kinds the feed skips.
pub fn narrate(event: &GameEvent) -> Option<String> {
    let who = &event.player_name;
    let text = match &event.kind {
        EventKind::PlayerJoin => format!("{who} joined the game"),
        EventKind::PlayerLeave => format!("{who} left the game"),
        EventKind::PlayerNameChange { old_name, new_name } => {
            format!("{old_name} changed their name to {new_name}")
        }
        EventKind::CellUpdate {
            r,
            c,
            value,
            note: true,
            ..
        } => format!("{who} toggled a note at ({r}, {c}) to {value}"),
        EventKind::CellUpdate {
            r, c, delete: true, ..
        }
        | EventKind::CellUpdate {
            r, c, value: 0, ..
        } => format!("{who} deleted the cell at ({r}, {c})"),
        EventKind::CellUpdate { r, c, value, .. } => {
            format!("{who} updated the cell at ({r}, {c}) to {value}")
        }
        EventKind::QuickPencil => format!("{who} filled in every note"),
        EventKind::PuzzleComplete => return None,
    };
    Some(text)
}

/// Merges both sources, ordered by `(timestamp, id)`, keeping the newest `cap`.
pub fn build_timeline<'a, C, E>(chat: C, events: E, cap: usize) -> Vec<TimelineEntry>
where
    C: IntoIterator<Item = &'a ChatMessage>,
    E: IntoIterator<Item = &'a GameEvent>,
{
    let mut entries: BTreeMap<(u64, String), TimelineEntry> = BTreeMap::new();

    for message in chat {
        entries
            .entry((message.timestamp, message.id.clone()))
            .or_insert_with(|| TimelineEntry {
                id: message.id.clone(),
                timestamp: message.timestamp,
                player_id: message.player_id.clone(),
                player_name: message.player_name.clone(),
                body: TimelineBody::Chat {
                    message: message.message.clone(),
                },
            });
    }

    for event in events {
        let Some(text) = narrate(event) else {
            continue;
        };
        entries
            .entry((event.timestamp, event.id.clone()))
            .or_insert_with(|| TimelineEntry {
                id: event.id.clone(),
                timestamp: event.timestamp,
                player_id: event.player_id.clone(),
                player_name: event.player_name.clone(),
                body: TimelineBody::Narration {
                    event_type: event.event_type(),
                    text,
                },
            });
    }

    let skip = entries.len().saturating_sub(cap);
    entries.into_values().skip(skip).collect()
}

/// Chat messages received so far, deduplicated by id.
#[derive(Debug, Clone, Default)]
pub struct ChatLog {
    messages: BTreeMap<String, ChatMessage>,
}

impl ChatLog {
    /// Returns false when the message id was already present.
    pub fn push(&mut self, message: ChatMessage) -> bool {
        if self.messages.contains_key(&message.id) {
            return false;
        }
        self.messages.insert(message.id.clone(), message);
        true
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.values()
    }
}
