//! Concrete test cases for the orchestrator.

pub mod perft;
pub mod puzzle;

pub use perft::{builtin_fixtures, load_epd, PerftFixture, PerftSource, PerftSuite};
pub use puzzle::{load_puzzles, Puzzle, PuzzleSuite};
