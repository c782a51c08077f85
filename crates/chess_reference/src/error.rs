use thiserror::Error;

/// Errors raised while translating between text notation and board state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RulesError {
    #[error("invalid FEN {fen:?}: {reason}")]
    InvalidFen { fen: String, reason: String },

    #[error("invalid move text {0:?}")]
    InvalidMove(String),

    #[error("illegal move {mv} in {fen}")]
    IllegalMove { mv: String, fen: String },
}
