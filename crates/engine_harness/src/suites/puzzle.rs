//! Puzzle suite: tactical puzzles from a lichess puzzle database export.
//!
//! Each record is `PuzzleId,FEN,Moves,Rating,...`. The first move of `Moves`
//! is the opponent's forced move; the engine must find the second, or any
//! other move that mates on the spot.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use chess_reference::{fen, is_checkmate, move_to_uci, parse_fen, parse_uci_move, Board, Move};

use crate::adapter::Engine;
use crate::error::HarnessError;
use crate::orchestrator::{TestCase, TestFailure};
use crate::report::{PuzzleItem, TestDetail};

#[derive(Debug, Clone)]
pub struct Puzzle {
    pub id: String,
    pub rating: u32,
    /// Position after the forced move, engine to move
    pub board: Board,
    pub expected: Move,
}

impl Puzzle {
    /// Parse one CSV record.
    pub fn parse(line: &str) -> Result<Self, String> {
        let fields: Vec<&str> = line.trim().split(',').collect();
        if fields.len() < 4 {
            return Err(format!("expected at least 4 fields, found {}", fields.len()));
        }
        let (id, fen_text, moves, rating) = (fields[0], fields[1], fields[2], fields[3]);

        let mut board = parse_fen(fen_text).map_err(|e| e.to_string())?;
        let mut moves = moves.split_whitespace();
        let (Some(forced), Some(expected)) = (moves.next(), moves.next()) else {
            return Err("puzzle needs a forced move and a reply".to_string());
        };
        let forced = parse_uci_move(&board, forced).map_err(|e| e.to_string())?;
        if !board.is_legal(forced) {
            return Err(format!("forced move {} is illegal", move_to_uci(&board, forced)));
        }
        board.play_unchecked(forced);
        let expected = parse_uci_move(&board, expected).map_err(|e| e.to_string())?;

        Ok(Self {
            id: id.to_string(),
            rating: rating
                .trim()
                .parse()
                .map_err(|_| format!("invalid rating {rating:?}"))?,
            board,
            expected,
        })
    }

    /// Whether `mv` solves the puzzle: the expected move, or any legal move
    /// that checkmates.
    pub fn is_solved_by(&self, mv: Move) -> bool {
        if !self.board.is_legal(mv) {
            return false;
        }
        if mv == self.expected {
            return true;
        }
        let mut after = self.board.clone();
        after.play_unchecked(mv);
        is_checkmate(&after)
    }
}

/// Read the first `count` puzzles of a database, skipping the header line.
pub fn load_puzzles(path: &Path, count: usize) -> Result<Vec<Puzzle>, HarnessError> {
    let contents = std::fs::read_to_string(path).map_err(|source| HarnessError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    contents
        .lines()
        .enumerate()
        .skip(1)
        .filter(|(_, line)| !line.trim().is_empty())
        .take(count)
        .map(|(idx, line)| {
            Puzzle::parse(line).map_err(|reason| HarnessError::Fixture {
                path: path.to_path_buf(),
                line: idx + 1,
                reason,
            })
        })
        .collect()
}

pub struct PuzzleSuite {
    database: PathBuf,
    count: usize,
    think_time: Option<Duration>,
    restart_each: bool,
    /// Fraction of puzzles that must be solved for the suite to pass
    min_success_rate: f64,
    puzzles: Vec<Puzzle>,
}

impl PuzzleSuite {
    pub fn new(database: impl Into<PathBuf>, count: usize) -> Self {
        Self {
            database: database.into(),
            count,
            think_time: None,
            restart_each: false,
            min_success_rate: 0.0,
            puzzles: Vec::new(),
        }
    }

    pub fn think_time(mut self, think_time: Duration) -> Self {
        self.think_time = Some(think_time);
        self
    }

    /// Restart the engine before every puzzle so no search state carries over.
    pub fn restart_each(mut self, enabled: bool) -> Self {
        self.restart_each = enabled;
        self
    }

    pub fn min_success_rate(mut self, rate: f64) -> Self {
        self.min_success_rate = rate;
        self
    }

    pub fn puzzles(&self) -> &[Puzzle] {
        &self.puzzles
    }

    fn solve(&self, engine: &mut dyn Engine, puzzle: &Puzzle) -> Result<PuzzleItem, TestFailure> {
        let mut item = PuzzleItem {
            id: puzzle.id.clone(),
            rating: puzzle.rating,
            fen: fen(&puzzle.board),
            expected: move_to_uci(&puzzle.board, puzzle.expected),
            suggested: None,
            success: false,
            error: None,
        };

        match engine.best_move(&puzzle.board, self.think_time) {
            Ok(mv) => {
                item.suggested = Some(move_to_uci(&puzzle.board, mv));
                item.success = puzzle.is_solved_by(mv);
                if !puzzle.board.is_legal(mv) {
                    item.error = Some("illegal move".to_string());
                }
            }
            Err(e) if !e.is_fatal() => item.error = Some(e.to_string()),
            Err(e) => return Err(TestFailure::Fatal(e)),
        }
        Ok(item)
    }
}

impl TestCase for PuzzleSuite {
    fn name(&self) -> &str {
        "puzzle"
    }

    fn configure(&mut self) -> Result<(), HarnessError> {
        self.puzzles = load_puzzles(&self.database, self.count)?;
        if self.puzzles.is_empty() {
            return Err(HarnessError::Config(format!(
                "no puzzles in {}",
                self.database.display()
            )));
        }
        Ok(())
    }

    fn run(&mut self, engine: &mut dyn Engine) -> Result<TestDetail, TestFailure> {
        let mut items = Vec::with_capacity(self.puzzles.len());
        for (i, puzzle) in self.puzzles.iter().enumerate() {
            if self.restart_each && i > 0 {
                engine.restart()?;
            }
            let item = self.solve(engine, puzzle)?;
            info!(
                "puzzle {}/{} {}, rating {}, expected {}, suggested {}",
                i + 1,
                self.puzzles.len(),
                if item.success { "success" } else { "fail" },
                item.rating,
                item.expected,
                item.suggested.as_deref().unwrap_or("-"),
            );
            items.push(item);
        }

        let solved = items.iter().filter(|p| p.success).count();
        let mean_rating = if items.is_empty() {
            None
        } else {
            Some(items.iter().map(|p| p.rating as f64).sum::<f64>() / items.len() as f64)
        };
        let rate = solved as f64 / items.len().max(1) as f64;
        let detail = TestDetail::Puzzles {
            items,
            solved,
            mean_rating,
        };

        if rate < self.min_success_rate {
            return Err(TestFailure::Failed {
                message: format!(
                    "solved {:.0}% of puzzles, {:.0}% required",
                    rate * 100.0,
                    self.min_success_rate * 100.0
                ),
                detail: Some(detail),
            });
        }
        Ok(detail)
    }
}
