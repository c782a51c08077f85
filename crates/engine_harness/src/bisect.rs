//! Perft divergence bisection.
//!
//! Given a position where an engine's perft disagrees with the reference,
//! walk down the tree one engine round trip per ply until the first node
//! whose reported move set is wrong.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use chess_reference::{fen, legal_moves, move_to_uci, perft, Board, Move, MoveFilter};

use crate::adapter::Engine;
use crate::error::EngineError;

/// A defect localised by the bisector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Divergence {
    /// The engine's move list at `fen` is wrong.
    MoveSet {
        fen: String,
        depth: u8,
        /// Legal moves the engine did not report
        false_negatives: Vec<String>,
        /// Reported moves that are not legal
        false_positives: Vec<String>,
    },
    /// A subtree count is wrong but no deeper node could be blamed: either
    /// the subtree is a single leaf or the engine answered consistently when
    /// asked about the child position directly.
    Count {
        fen: String,
        depth: u8,
        mv: String,
        expected: u64,
        reported: u64,
    },
}

impl Divergence {
    pub fn fen(&self) -> &str {
        match self {
            Divergence::MoveSet { fen, .. } | Divergence::Count { fen, .. } => fen,
        }
    }
}

/// One step of the descent: the count below `mv` in `fen` was wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discontinuity {
    pub fen: String,
    pub depth: u8,
    pub mv: String,
    pub expected: u64,
    pub reported: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BisectReport {
    pub root_fen: String,
    pub depth: u8,
    pub quiet: bool,
    /// Perft requests sent to the engine
    pub round_trips: usize,
    pub discontinuities: Vec<Discontinuity>,
    pub divergences: Vec<Divergence>,
}

impl BisectReport {
    /// No disagreement with the reference was found.
    pub fn is_clean(&self) -> bool {
        self.divergences.is_empty()
    }
}

pub struct Bisector<'a> {
    engine: &'a mut dyn Engine,
    filter: MoveFilter,
}

impl<'a> Bisector<'a> {
    pub fn new(engine: &'a mut dyn Engine, filter: MoveFilter) -> Self {
        Self { engine, filter }
    }

    pub fn bisect(&mut self, board: &Board, depth: u8) -> Result<BisectReport, EngineError> {
        let mut report = BisectReport {
            root_fen: fen(board),
            depth,
            quiet: self.filter.is_quiet(),
            round_trips: 0,
            discontinuities: Vec::new(),
            divergences: Vec::new(),
        };
        self.search(board, depth, &mut report)?;
        Ok(report)
    }

    fn search(
        &mut self,
        board: &Board,
        depth: u8,
        report: &mut BisectReport,
    ) -> Result<(), EngineError> {
        if depth == 0 {
            return Ok(());
        }

        let reported = self.engine.perft_counts(board, depth, &self.filter)?;
        report.round_trips += 1;
        let reference = legal_moves(board, &self.filter);

        let false_negatives = missing_from(&reference, reported.moves(), board);
        let false_positives = missing_from(
            &reported.moves().collect::<Vec<_>>(),
            reference.iter().copied(),
            board,
        );
        if !false_negatives.is_empty() || !false_positives.is_empty() {
            let divergence = Divergence::MoveSet {
                fen: fen(board),
                depth,
                false_negatives,
                false_positives,
            };
            warn!("perft fail: {divergence:?}");
            report.divergences.push(divergence);
            return Ok(());
        }

        for mv in reference {
            let mut child = board.clone();
            child.play_unchecked(mv);
            let expected = perft(&child, depth - 1, &self.filter);
            let got = reported.count(mv).unwrap_or(0);
            if expected == got {
                continue;
            }

            let step = Discontinuity {
                fen: fen(board),
                depth,
                mv: move_to_uci(board, mv),
                expected,
                reported: got,
            };
            info!("discontinuity {} in {}", step.mv, step.fen);
            report.discontinuities.push(step.clone());

            let found = report.divergences.len();
            self.search(&child, depth - 1, report)?;
            if report.divergences.len() == found {
                report.divergences.push(Divergence::Count {
                    fen: step.fen,
                    depth: step.depth,
                    mv: step.mv,
                    expected: step.expected,
                    reported: step.reported,
                });
            }
        }
        Ok(())
    }
}

/// Moves of `wanted` absent from `present`, in UCI notation.
fn missing_from(wanted: &[Move], present: impl Iterator<Item = Move>, board: &Board) -> Vec<String> {
    let present: Vec<Move> = present.collect();
    wanted
        .iter()
        .filter(|mv| !present.contains(mv))
        .map(|&mv| move_to_uci(board, mv))
        .collect()
}

#[cfg(test)]
#[path = "bisect_tests.rs"]
mod bisect_tests;
