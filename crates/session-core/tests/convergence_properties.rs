use contracts::{EventKind, GameEvent, Grid};
use proptest::prelude::*;
use session_core::{parse_grid, reconcile, ClientState, IngestOutcome};

const PUZZLE: &str = "530070000/600195000/098000060/800060003/400803001/700020006/060000280/000419005/000080079";

fn baseline() -> Grid {
    parse_grid(PUZZLE).expect("fixture puzzle should parse")
}

fn kind_strategy() -> impl Strategy<Value = EventKind> {
    prop_oneof![
        6 => (0_u8..9, 0_u8..9, 0_u8..=9).prop_map(|(r, c, v)| EventKind::set_cell(r, c, v)),
        6 => (0_u8..9, 0_u8..9, 1_u8..=9, any::<bool>())
            .prop_map(|(r, c, v, was_set)| EventKind::toggle_note(r, c, v, was_set)),
        1 => Just(EventKind::QuickPencil),
        1 => Just(EventKind::PlayerJoin),
        1 => Just(EventKind::PlayerLeave),
        1 => Just(EventKind::PuzzleComplete),
    ]
}

/// Events with unique ids and deliberately colliding timestamps.
fn event_set(max_len: usize) -> impl Strategy<Value = Vec<GameEvent>> {
    prop::collection::vec((0_u64..40, 0_usize..3, kind_strategy()), 0..max_len).prop_map(|raw| {
        raw.into_iter()
            .enumerate()
            .map(|(index, (timestamp, player, kind))| GameEvent {
                id: format!("01EVT{index:04}"),
                player_id: format!("player_{player}"),
                player_name: format!("Player {player}"),
                timestamp: 1_000 + timestamp,
                kind,
            })
            .collect()
    })
}

fn events_and_permutation(max_len: usize) -> impl Strategy<Value = (Vec<GameEvent>, Vec<GameEvent>)> {
    event_set(max_len).prop_flat_map(|events| {
        let shuffled = Just(events.clone()).prop_shuffle();
        (Just(events), shuffled)
    })
}

fn ingest_all(events: &[GameEvent], fast_path: bool) -> ClientState {
    let mut state = ClientState::new("observer", baseline(), 0, 0, Vec::new()).with_fast_path(fast_path);
    for event in events {
        state.ingest(event.clone());
    }
    state
}

proptest! {
    #[test]
    fn property_order_independence((events, shuffled) in events_and_permutation(48)) {
        let base = baseline();
        prop_assert_eq!(reconcile(&base, &events), reconcile(&base, &shuffled));
    }

    #[test]
    fn property_duplicate_idempotence(events in event_set(48)) {
        let base = baseline();
        let doubled = events.iter().chain(events.iter());
        prop_assert_eq!(reconcile(&base, &events), reconcile(&base, doubled));
    }

    #[test]
    fn property_given_cells_survive_any_event_set(events in event_set(64)) {
        let base = baseline();
        let board = reconcile(&base, &events);
        for r in 0..9 {
            for c in 0..9 {
                if base[r][c] != 0 {
                    prop_assert_eq!(board.grid[r][c], base[r][c]);
                    prop_assert!(board.notes[r][c].iter().all(|&set| !set));
                }
            }
        }
    }

    #[test]
    fn property_freeze_on_completion(
        before in event_set(24),
        after in event_set(24),
        completion_ts in 1_000_u64..1_040,
    ) {
        let base = baseline();
        let strip_completions = |events: Vec<GameEvent>, prefix: &str| {
            events
                .into_iter()
                .filter(|event| !matches!(event.kind, EventKind::PuzzleComplete))
                .map(|mut event| {
                    event.id = format!("{prefix}{}", event.id);
                    event
                })
                .collect::<Vec<_>>()
        };
        let before = strip_completions(before, "a")
            .into_iter()
            .filter(|event| event.timestamp <= completion_ts)
            .collect::<Vec<_>>();
        let after = strip_completions(after, "c")
            .into_iter()
            .map(|mut event| {
                event.timestamp += 100;
                event
            })
            .collect::<Vec<_>>();
        let completion = GameEvent {
            id: "b-complete".to_string(),
            player_id: "player_0".to_string(),
            player_name: "Player 0".to_string(),
            timestamp: completion_ts,
            kind: EventKind::PuzzleComplete,
        };

        let frozen = reconcile(&base, before.iter().chain(std::iter::once(&completion)));
        let with_tail = reconcile(
            &base,
            before.iter().chain(std::iter::once(&completion)).chain(after.iter()),
        );

        prop_assert!(frozen.halted);
        prop_assert_eq!(frozen, with_tail);
    }

    #[test]
    fn property_last_write_wins(
        first_ts in 0_u64..20,
        second_ts in 0_u64..20,
        first_value in 1_u8..=9,
        second_value in 1_u8..=9,
    ) {
        let base = baseline();
        let write = |id: &str, timestamp: u64, value: u8| GameEvent {
            id: id.to_string(),
            player_id: "player_1".to_string(),
            player_name: "Player 1".to_string(),
            timestamp,
            kind: EventKind::set_cell(7, 4, value),
        };
        let a = write("a", first_ts, first_value);
        let b = write("b", second_ts, second_value);
        let expected = if a.sort_key() > b.sort_key() { first_value } else { second_value };

        prop_assert_eq!(reconcile(&base, [&a, &b]).grid[7][4], expected);
        prop_assert_eq!(reconcile(&base, [&b, &a]).grid[7][4], expected);
    }

    #[test]
    fn property_fast_path_matches_full_reconciliation((events, shuffled) in events_and_permutation(48)) {
        let base = baseline();
        let expected = reconcile(&base, &events);

        let fast = ingest_all(&shuffled, true);
        let full = ingest_all(&shuffled, false);

        prop_assert_eq!(fast.board(), &expected);
        prop_assert_eq!(full.board(), &expected);
    }

    #[test]
    fn property_clients_converge_under_redelivery(
        (events, shuffled) in events_and_permutation(40),
        redeliver in prop::collection::vec(any::<prop::sample::Index>(), 0..20),
    ) {
        let mut noisy = shuffled.clone();
        for index in redeliver {
            if !events.is_empty() {
                noisy.push(index.get(&events).clone());
            }
        }

        let in_order = ingest_all(&events, true);
        let noisy_client = ingest_all(&noisy, true);

        prop_assert_eq!(in_order.board().state_hash(), noisy_client.board().state_hash());
        prop_assert_eq!(in_order.len(), noisy_client.len());
    }

    #[test]
    fn property_completion_is_reported_at_most_once((events, shuffled) in events_and_permutation(48)) {
        let mut state = ClientState::new("observer", baseline(), 0, 0, Vec::new());
        let mut completions = 0;
        for event in shuffled.iter().chain(events.iter()) {
            if matches!(state.ingest(event.clone()), IngestOutcome::Completed(_)) {
                completions += 1;
            }
        }

        let has_completion = events.iter().any(|event| matches!(event.kind, EventKind::PuzzleComplete));
        prop_assert_eq!(completions, usize::from(has_completion));
    }
}
