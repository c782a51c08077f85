//! Reference rules oracle for engine verification.
//!
//! Everything the harness needs to know about chess comes from here:
//! - canonical FEN and UCI move notation
//! - legal move enumeration, optionally restricted by a [`MoveFilter`]
//! - reference perft counts
//! - game state with terminal outcome detection
//!
//! Move generation itself is delegated to `cozy-chess`; this crate only
//! adapts it to the conventions of the engine wire protocol.

pub mod error;
pub mod filter;
pub mod game;
pub mod notation;
pub mod perft;
pub mod random;

pub use cozy_chess::{Board, Color, Move, Piece, Square};

pub use error::RulesError;
pub use filter::{legal_moves, MoveFilter, QuietRule};
pub use game::{is_checkmate, Game, Outcome, Termination};
pub use notation::{color_name, fen, move_to_uci, parse_fen, parse_uci_move, STARTPOS_FEN};
pub use perft::{divide, perft};
pub use random::RandomMover;
