//! Grid primitives shared by reconciliation and the session layer.

use contracts::{empty_notes, Grid, NoteGrid, GRID_SIZE};
use serde::Serialize;
use thiserror::Error;

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Reconciled view of a session: digits, pencil marks, and whether a
/// completion event has frozen further application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub grid: Grid,
    pub notes: NoteGrid,
    pub halted: bool,
}

impl Board {
    pub fn from_baseline(baseline: &Grid) -> Self {
        Self {
            grid: *baseline,
            notes: empty_notes(),
            halted: false,
        }
    }

    pub fn is_solved(&self, solution: &Grid) -> bool {
        is_solved(&self.grid, solution)
    }

    pub fn note(&self, r: usize, c: usize, value: u8) -> bool {
        value >= 1 && self.notes[r][c][usize::from(value) - 1]
    }

    /// Stable fingerprint for comparing boards across clients.
    pub fn state_hash(&self) -> u64 {
        let mut h = FNV_OFFSET_BASIS;
        for row in &self.grid {
            for &digit in row {
                h = fnv1a_fold(h, u64::from(digit));
            }
        }
        for row in &self.notes {
            for cell in row {
                let bits = cell
                    .iter()
                    .enumerate()
                    .fold(0_u64, |acc, (i, &set)| acc | (u64::from(set) << i));
                h = fnv1a_fold(h, bits);
            }
        }
        fnv1a_fold(h, u64::from(self.halted))
    }
}

fn fnv1a_fold(hash: u64, value: u64) -> u64 {
    let mut h = hash;
    for b in value.to_le_bytes() {
        h ^= u64::from(b);
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// Only blank baseline cells accept writes.
pub fn is_editable(baseline: &Grid, r: usize, c: usize) -> bool {
    r < GRID_SIZE && c < GRID_SIZE && baseline[r][c] == 0
}

pub fn is_solved(grid: &Grid, solution: &Grid) -> bool {
    grid == solution && grid.iter().flatten().all(|&digit| digit != 0)
}

/// The 81 baseline digits concatenated row by row.
pub fn puzzle_hash(grid: &Grid) -> String {
    grid.iter()
        .flatten()
        .map(|digit| char::from(b'0' + digit))
        .collect()
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GridParseError {
    #[error("expected 81 cells, found {0}")]
    WrongLength(usize),
    #[error("unexpected character `{0}` in grid")]
    InvalidCharacter(char),
}

/// Parses 81 digits, `0` or `.` for blanks. Whitespace, `/` and `|` are ignored.
pub fn parse_grid(raw: &str) -> Result<Grid, GridParseError> {
    let mut cells = Vec::with_capacity(GRID_SIZE * GRID_SIZE);
    for ch in raw.chars() {
        match ch {
            '0'..='9' => cells.push(ch as u8 - b'0'),
            '.' => cells.push(0),
            '/' | '|' => {}
            ch if ch.is_whitespace() => {}
            other => return Err(GridParseError::InvalidCharacter(other)),
        }
    }

    if cells.len() != GRID_SIZE * GRID_SIZE {
        return Err(GridParseError::WrongLength(cells.len()));
    }

    let mut grid = [[0; GRID_SIZE]; GRID_SIZE];
    for (index, digit) in cells.into_iter().enumerate() {
        grid[index / GRID_SIZE][index % GRID_SIZE] = digit;
    }
    Ok(grid)
}

pub fn render_grid(grid: &Grid) -> String {
    let mut out = String::with_capacity(GRID_SIZE * (GRID_SIZE * 2 + 4));
    for (r, row) in grid.iter().enumerate() {
        if r > 0 && r % 3 == 0 {
            out.push_str("------+-------+------\n");
        }
        for (c, &digit) in row.iter().enumerate() {
            if c > 0 && c % 3 == 0 {
                out.push_str("| ");
            }
            out.push(if digit == 0 { '.' } else { char::from(b'0' + digit) });
            out.push(' ');
        }
        out.pop();
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUZZLE: &str = "530070000/600195000/098000060/800060003/400803001/700020006/060000280/000419005/000080079";

    #[test]
    fn parse_grid_round_trips_through_puzzle_hash() {
        let grid = parse_grid(PUZZLE).expect("fixture should parse");
        assert_eq!(grid[0][0], 5);
        assert_eq!(grid[8][8], 9);
        assert_eq!(puzzle_hash(&grid), PUZZLE.replace('/', ""));
    }

    #[test]
    fn parse_grid_rejects_short_input() {
        assert_eq!(parse_grid("123"), Err(GridParseError::WrongLength(3)));
        assert_eq!(
            parse_grid(&"x".repeat(81)),
            Err(GridParseError::InvalidCharacter('x'))
        );
    }

    #[test]
    fn given_cells_are_not_editable() {
        let grid = parse_grid(PUZZLE).expect("fixture should parse");
        assert!(!is_editable(&grid, 0, 0));
        assert!(is_editable(&grid, 0, 2));
        assert!(!is_editable(&grid, 9, 0));
    }

    #[test]
    fn empty_grid_is_never_solved() {
        let empty = [[0; GRID_SIZE]; GRID_SIZE];
        assert!(!is_solved(&empty, &empty));
    }

    #[test]
    fn state_hash_tracks_notes_and_halt() {
        let grid = parse_grid(PUZZLE).expect("fixture should parse");
        let board = Board::from_baseline(&grid);
        let mut noted = board.clone();
        noted.notes[0][2][3] = true;
        let mut halted = board.clone();
        halted.halted = true;

        assert_ne!(board.state_hash(), noted.state_hash());
        assert_ne!(board.state_hash(), halted.state_hash());
        assert_eq!(board.state_hash(), Board::from_baseline(&grid).state_hash());
    }

    #[test]
    fn render_grid_draws_box_separators() {
        let grid = parse_grid(PUZZLE).expect("fixture should parse");
        let rendered = render_grid(&grid);
        assert!(rendered.starts_with("5 3 . | . 7 . | . . .\n"));
        assert_eq!(rendered.lines().count(), 11);
    }
}
