use std::collections::BTreeMap;
use std::sync::Mutex;

use contracts::{Difficulty, Grid, PuzzleEntry};
use rand::Rng;
use serde::Serialize;
use session_core::{parse_grid, puzzle_hash};
use tracing::info;

use crate::PuzzleStoreError;

const CLASSIC_PUZZLE: &str =
    "530070000/600195000/098000060/800060003/400803001/700020006/060000280/000419005/000080079";
const CLASSIC_SOLUTION: &str =
    "534678912/672195348/198342567/859761423/426853791/713924856/961537284/287419635/345286179";

/// Source of puzzles and sink for completion stats.
pub trait PuzzleStore: Send + Sync {
    fn fetch_random(&self, difficulty: Difficulty) -> Result<PuzzleEntry, PuzzleStoreError>;
    fn report_completion(
        &self,
        hash: &str,
        elapsed_seconds: u64,
        difficulty: Difficulty,
    ) -> Result<(), PuzzleStoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionReport {
    pub hash: String,
    pub elapsed_seconds: u64,
    pub difficulty: Difficulty,
}

#[derive(Debug, Default)]
struct PuzzleShelf {
    puzzles: BTreeMap<Difficulty, Vec<PuzzleEntry>>,
    reports: Vec<CompletionReport>,
}

#[derive(Debug, Default)]
pub struct MemoryPuzzleStore {
    shelf: Mutex<PuzzleShelf>,
}

impl MemoryPuzzleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// One puzzle per difficulty, all derived from the same solved grid by
    /// transposition and digit relabelling.
    pub fn classic() -> Self {
        let store = Self::new();
        let (Ok(grid), Ok(solution)) = (parse_grid(CLASSIC_PUZZLE), parse_grid(CLASSIC_SOLUTION))
        else {
            return store;
        };

        let variants = [
            (Difficulty::Easy, grid, solution),
            (Difficulty::Medium, transpose(&grid), transpose(&solution)),
            (Difficulty::Hard, relabel(&grid), relabel(&solution)),
            (
                Difficulty::Expert,
                relabel(&transpose(&grid)),
                relabel(&transpose(&solution)),
            ),
        ];
        for (difficulty, grid, solution) in variants {
            store.insert(difficulty, grid, solution);
        }
        store
    }

    pub fn insert(&self, difficulty: Difficulty, grid: Grid, solution: Grid) {
        if let Ok(mut shelf) = self.shelf.lock() {
            shelf
                .puzzles
                .entry(difficulty)
                .or_default()
                .push(PuzzleEntry {
                    hash: puzzle_hash(&grid),
                    grid,
                    solution,
                });
        }
    }

    pub fn reports(&self) -> Vec<CompletionReport> {
        self.shelf
            .lock()
            .map(|shelf| shelf.reports.clone())
            .unwrap_or_default()
    }
}

impl PuzzleStore for MemoryPuzzleStore {
    fn fetch_random(&self, difficulty: Difficulty) -> Result<PuzzleEntry, PuzzleStoreError> {
        let shelf = self.shelf.lock().map_err(|_| PuzzleStoreError::Poisoned)?;
        let candidates = shelf
            .puzzles
            .get(&difficulty)
            .filter(|entries| !entries.is_empty())
            .ok_or(PuzzleStoreError::NoPuzzleAvailable(difficulty))?;

        let index = rand::rng().random_range(0..candidates.len());
        Ok(candidates[index].clone())
    }

    fn report_completion(
        &self,
        hash: &str,
        elapsed_seconds: u64,
        difficulty: Difficulty,
    ) -> Result<(), PuzzleStoreError> {
        let mut shelf = self.shelf.lock().map_err(|_| PuzzleStoreError::Poisoned)?;
        shelf.reports.push(CompletionReport {
            hash: hash.to_string(),
            elapsed_seconds,
            difficulty,
        });
        info!(hash, elapsed_seconds, %difficulty, "completion reported");
        Ok(())
    }
}

fn transpose(grid: &Grid) -> Grid {
    let mut out = *grid;
    for (r, row) in out.iter_mut().enumerate() {
        for (c, cell) in row.iter_mut().enumerate() {
            *cell = grid[c][r];
        }
    }
    out
}

/// Swaps digits d and 10 - d; zeros stay empty.
fn relabel(grid: &Grid) -> Grid {
    grid.map(|row| row.map(|value| if value == 0 { 0 } else { 10 - value }))
}
