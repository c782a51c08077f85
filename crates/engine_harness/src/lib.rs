//! Verification harness for chess engines
//!
//! This crate drives an engine process over a line protocol and checks it
//! against the `chess_reference` oracle:
//! - perft totals, with bisection down to the first wrong move list
//! - tactical puzzles
//! - full games against a reference opponent
//!
//! # Usage
//!
//! ```bash
//! # Run the perft and puzzle suites
//! cargo run -p engine_harness --bin harness -- test --engine ./clce --puzzles db/lichess_db_puzzle.csv
//!
//! # Localise a perft mismatch
//! cargo run -p engine_harness --bin harness -- perft-search --engine ./clce --depth 4 "<fen>"
//!
//! # Play the engine against Stockfish
//! cargo run -p engine_harness --bin harness -- match --engine ./clce --opponent uci:stockfish --openings openings.txt
//! ```

pub mod adapter;
pub mod bisect;
pub mod config;
pub mod error;
pub mod match_runner;
pub mod opponent;
pub mod orchestrator;
pub mod process;
pub mod protocol;
pub mod report;
pub mod suites;

pub use adapter::{Engine, EngineHandle, EngineOptions};
pub use bisect::{BisectReport, Bisector, Discontinuity, Divergence};
pub use config::HarnessConfig;
pub use error::{EngineError, HarnessError};
pub use match_runner::{GameEnd, GameRecord, GameResult, MatchConfig, MatchReport, MatchResult, MatchRunner};
pub use opponent::{EngineOpponent, Opponent, RandomOpponent, UciOpponent, UciOptions};
pub use orchestrator::{Orchestrator, TestCase, TestFailure};
pub use protocol::{PerftReport, Request};
pub use report::{RunReport, TestDetail, TestResult, TestStatus};
