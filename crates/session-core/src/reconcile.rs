//! Deterministic rebuild of board state from a baseline and an unordered event set.
//!
//! Events are deduplicated by id and applied in `(timestamp, id)` order. Writes
//! overwrite, note events toggle, and the first `PuzzleComplete` in that order
//! freezes everything after it. Toggles are not idempotent, so callers must not
//! bypass the id dedup here.

use std::collections::BTreeMap;

use contracts::{EventKind, GameEvent, Grid, GRID_SIZE};
use tracing::warn;

use crate::board::{is_editable, Board};

/// Applies one event to `board`. A halted board is returned unchanged.
pub fn apply_event(board: Board, event: &GameEvent, baseline: &Grid) -> Board {
    apply_kind(board, &event.kind, baseline)
}

pub fn apply_kind(mut board: Board, kind: &EventKind, baseline: &Grid) -> Board {
    if board.halted {
        return board;
    }

    match *kind {
        EventKind::CellUpdate {
            r, c, value, note, ..
        } => {
            let (r, c) = (usize::from(r), usize::from(c));
            if !is_editable(baseline, r, c) {
                warn!(r, c, "ignoring write to a given cell");
                return board;
            }

            if note {
                if let Some(slot) = usize::from(value)
                    .checked_sub(1)
                    .and_then(|index| board.notes[r][c].get_mut(index))
                {
                    *slot = !*slot;
                }
            } else if usize::from(value) <= GRID_SIZE {
                board.grid[r][c] = value;
            }
        }
        EventKind::QuickPencil => {
            for r in 0..GRID_SIZE {
                for c in 0..GRID_SIZE {
                    if is_editable(baseline, r, c) {
                        board.notes[r][c] = [true; GRID_SIZE];
                    }
                }
            }
        }
        EventKind::PuzzleComplete => {
            board.halted = true;
        }
        EventKind::PlayerJoin | EventKind::PlayerLeave | EventKind::PlayerNameChange { .. } => {}
    }

    board
}

/// Deduplicates by id (first occurrence wins) and sorts by `(timestamp, id)`.
pub fn ordered_unique<'a, I>(events: I) -> Vec<&'a GameEvent>
where
    I: IntoIterator<Item = &'a GameEvent>,
{
    let mut by_id: BTreeMap<&str, &GameEvent> = BTreeMap::new();
    for event in events {
        by_id.entry(event.id.as_str()).or_insert(event);
    }

    let mut ordered = by_id.into_values().collect::<Vec<_>>();
    ordered.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    ordered
}

pub fn reconcile<'a, I>(baseline: &Grid, events: I) -> Board
where
    I: IntoIterator<Item = &'a GameEvent>,
{
    ordered_unique(events)
        .into_iter()
        .fold(Board::from_baseline(baseline), |board, event| {
            apply_event(board, event, baseline)
        })
}

/// The completion event that froze the board, if any.
pub fn completion_event<'a, I>(events: I) -> Option<&'a GameEvent>
where
    I: IntoIterator<Item = &'a GameEvent>,
{
    ordered_unique(events)
        .into_iter()
        .find(|event| matches!(event.kind, EventKind::PuzzleComplete))
}

/// Whole seconds from session creation to the last cell write that precedes
/// completion. `None` when the session is not complete or nothing was written.
pub fn completion_duration_seconds<'a, I>(events: I, created_at: u64) -> Option<u64>
where
    I: IntoIterator<Item = &'a GameEvent>,
{
    let ordered = ordered_unique(events);
    let completion_index = ordered
        .iter()
        .position(|event| matches!(event.kind, EventKind::PuzzleComplete))?;

    let last_write = ordered[..completion_index]
        .iter()
        .rev()
        .find(|event| matches!(event.kind, EventKind::CellUpdate { .. }))?;

    Some(last_write.timestamp.saturating_sub(created_at) / 1_000)
}

#[cfg(test)]
mod tests {
    use contracts::empty_grid;

    use super::*;

    fn event(id: &str, timestamp: u64, kind: EventKind) -> GameEvent {
        GameEvent {
            id: id.to_string(),
            player_id: "p1".to_string(),
            player_name: "Ada".to_string(),
            timestamp,
            kind,
        }
    }

    #[test]
    fn later_key_wins_a_contested_cell() {
        let baseline = empty_grid();
        let events = vec![
            event("a", 100, EventKind::set_cell(7, 4, 5)),
            event("b", 50, EventKind::set_cell(7, 4, 3)),
        ];

        let board = reconcile(&baseline, &events);
        assert_eq!(board.grid[7][4], 5);
    }

    #[test]
    fn equal_timestamps_break_ties_by_id() {
        let baseline = empty_grid();
        let events = vec![
            event("b", 10, EventKind::set_cell(0, 0, 2)),
            event("a", 10, EventKind::set_cell(0, 0, 9)),
        ];

        assert_eq!(reconcile(&baseline, &events).grid[0][0], 2);
    }

    #[test]
    fn duplicate_toggle_applies_once() {
        let baseline = empty_grid();
        let toggle = event("t1", 10, EventKind::toggle_note(1, 1, 3, false));
        let once = reconcile(&baseline, [&toggle]);
        let twice = reconcile(&baseline, [&toggle, &toggle]);

        assert!(once.notes[1][1][2]);
        assert_eq!(once, twice);

        let undeduped = apply_event(once.clone(), &toggle, &baseline);
        assert_ne!(undeduped, once);
    }

    #[test]
    fn quick_pencil_then_toggle_off_clears_single_mark() {
        let baseline = empty_grid();
        let events = vec![
            event("q", 10, EventKind::QuickPencil),
            event("t", 20, EventKind::toggle_note(0, 0, 3, true)),
        ];

        let board = reconcile(&baseline, &events);
        assert!(!board.notes[0][0][2]);
        for value in [1_u8, 2, 4, 5, 6, 7, 8, 9] {
            assert!(board.note(0, 0, value), "note {value} should stay set");
        }
        assert!(board.notes[8][8].iter().all(|&set| set));
    }

    #[test]
    fn quick_pencil_skips_given_cells() {
        let mut baseline = empty_grid();
        baseline[4][4] = 7;
        let board = reconcile(&baseline, [&event("q", 1, EventKind::QuickPencil)]);

        assert!(board.notes[4][4].iter().all(|&set| !set));
        assert!(board.notes[4][5].iter().all(|&set| set));
    }

    #[test]
    fn given_cells_never_change() {
        let mut baseline = empty_grid();
        baseline[2][3] = 6;
        let events = vec![
            event("a", 1, EventKind::set_cell(2, 3, 1)),
            event("b", 2, EventKind::toggle_note(2, 3, 1, false)),
        ];

        let board = reconcile(&baseline, &events);
        assert_eq!(board.grid[2][3], 6);
        assert!(!board.notes[2][3][0]);
    }

    #[test]
    fn completion_freezes_later_events() {
        let baseline = empty_grid();
        let events = vec![
            event("a", 10, EventKind::set_cell(0, 1, 4)),
            event("done", 20, EventKind::PuzzleComplete),
            event("late", 30, EventKind::set_cell(0, 1, 8)),
            event("late-note", 40, EventKind::QuickPencil),
        ];

        let board = reconcile(&baseline, &events);
        assert!(board.halted);
        assert_eq!(board.grid[0][1], 4);
        assert!(board.notes[0][0].iter().all(|&set| !set));
    }

    #[test]
    fn erase_writes_zero() {
        let baseline = empty_grid();
        let events = vec![
            event("a", 10, EventKind::set_cell(3, 3, 4)),
            event("b", 11, EventKind::set_cell(3, 3, 0)),
        ];
        assert_eq!(reconcile(&baseline, &events).grid[3][3], 0);
    }

    #[test]
    fn presence_events_do_not_touch_the_board() {
        let baseline = empty_grid();
        let events = vec![
            event("j", 1, EventKind::PlayerJoin),
            event(
                "n",
                2,
                EventKind::PlayerNameChange {
                    old_name: "Ada".to_string(),
                    new_name: "Grace".to_string(),
                },
            ),
            event("l", 3, EventKind::PlayerLeave),
        ];
        assert_eq!(reconcile(&baseline, &events), Board::from_baseline(&baseline));
    }

    #[test]
    fn completion_duration_uses_last_write_before_completion() {
        let created_at = 1_000;
        let events = vec![
            event("a", 4_000, EventKind::set_cell(0, 0, 1)),
            event("b", 62_999, EventKind::set_cell(0, 1, 2)),
            event("done", 63_500, EventKind::PuzzleComplete),
            event("late", 90_000, EventKind::set_cell(0, 2, 3)),
        ];

        assert_eq!(completion_duration_seconds(&events, created_at), Some(61));
        assert_eq!(
            completion_event(&events).map(|event| event.id.as_str()),
            Some("done")
        );
    }

    #[test]
    fn completion_duration_requires_a_completion() {
        let events = vec![event("a", 4_000, EventKind::set_cell(0, 0, 1))];
        assert_eq!(completion_duration_seconds(&events, 0), None);
        assert_eq!(
            completion_duration_seconds(&[event("done", 5, EventKind::PuzzleComplete)], 0),
            None
        );
    }
}
