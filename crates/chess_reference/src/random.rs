//! Random move chooser
//!
//! Selects moves uniformly at random from all legal moves. Useful as:
//! - a baseline opponent (any real engine should easily beat this)
//! - a source of varied positions when testing the harness itself

use cozy_chess::{Board, Move};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::filter::{legal_moves, MoveFilter};

#[derive(Debug, Clone)]
pub struct RandomMover {
    rng: StdRng,
}

impl RandomMover {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic chooser, for reproducible games.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// A random legal move, or `None` when the side to move has none.
    pub fn choose(&mut self, board: &Board) -> Option<Move> {
        legal_moves(board, &MoveFilter::All)
            .choose(&mut self.rng)
            .copied()
    }
}

impl Default for RandomMover {
    fn default() -> Self {
        Self::new()
    }
}
