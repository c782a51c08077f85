//! Move filters for restricted perft runs.
//!
//! Engines can be asked to enumerate only "quiet" moves so that the move
//! subset used by quiescence search is verified separately from full
//! legality. Which moves count as quiet is a rule, not a constant: the
//! default mirrors the engine under test (no captures, no promotions,
//! except that king moves are always generated).

use cozy_chess::{Board, Move, Piece};

/// Which moves are excluded from a quiet enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietRule {
    pub exclude_captures: bool,
    pub exclude_promotions: bool,
    /// King moves are admitted even when they capture
    pub king_exempt: bool,
}

impl Default for QuietRule {
    fn default() -> Self {
        Self {
            exclude_captures: true,
            exclude_promotions: true,
            king_exempt: true,
        }
    }
}

/// Restriction applied to legal move enumeration at every ply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveFilter {
    #[default]
    All,
    Quiet(QuietRule),
}

impl MoveFilter {
    pub fn quiet() -> Self {
        MoveFilter::Quiet(QuietRule::default())
    }

    pub fn is_quiet(&self) -> bool {
        matches!(self, MoveFilter::Quiet(_))
    }

    /// Flag character used on the wire: `_` for all moves, `q` for quiet.
    pub fn wire_flag(&self) -> char {
        match self {
            MoveFilter::All => '_',
            MoveFilter::Quiet(_) => 'q',
        }
    }

    /// Whether `mv`, played by `piece`, survives the filter.
    pub fn admits(&self, board: &Board, piece: Piece, mv: Move) -> bool {
        let rule = match self {
            MoveFilter::All => return true,
            MoveFilter::Quiet(rule) => rule,
        };
        if rule.king_exempt && piece == Piece::King {
            return true;
        }
        if rule.exclude_promotions && mv.promotion.is_some() {
            return false;
        }
        if rule.exclude_captures && is_capture(board, piece, mv) {
            return false;
        }
        true
    }
}

fn is_capture(board: &Board, piece: Piece, mv: Move) -> bool {
    let mover = board.side_to_move();
    match board.color_on(mv.to) {
        Some(color) => color != mover,
        // a diagonal pawn step onto an empty square is en passant
        None => piece == Piece::Pawn && mv.from.file() != mv.to.file(),
    }
}

/// Legal moves of `board` admitted by `filter`, in generator order.
pub fn legal_moves(board: &Board, filter: &MoveFilter) -> Vec<Move> {
    let mut moves = Vec::with_capacity(64);
    board.generate_moves(|piece_moves| {
        let piece = piece_moves.piece;
        for mv in piece_moves {
            if filter.admits(board, piece, mv) {
                moves.push(mv);
            }
        }
        false
    });
    moves
}
