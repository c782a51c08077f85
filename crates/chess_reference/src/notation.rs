//! Canonical position and move notation.
//!
//! Positions travel as standard FEN. Moves travel as four or five character
//! UCI strings with castling written as the king's two-square step (`e1g1`).
//! `cozy-chess` encodes castling as the king capturing its own rook, so the
//! conversion happens here and nowhere else.

use cozy_chess::{Board, Color, File, Move, Piece, Square};

use crate::error::RulesError;

pub const STARTPOS_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Parse a standard (non-shredder) FEN string.
pub fn parse_fen(text: &str) -> Result<Board, RulesError> {
    Board::from_fen(text.trim(), false).map_err(|e| RulesError::InvalidFen {
        fen: text.to_string(),
        reason: format!("{e:?}"),
    })
}

/// Render a position as standard FEN.
pub fn fen(board: &Board) -> String {
    board.to_string()
}

pub fn color_name(color: Color) -> &'static str {
    match color {
        Color::White => "white",
        Color::Black => "black",
    }
}

/// Render a move in standard UCI notation.
pub fn move_to_uci(board: &Board, mv: Move) -> String {
    let mut to = mv.to;
    if is_castle(board, mv) {
        let file = if (mv.to.file() as i8) > (mv.from.file() as i8) {
            File::G
        } else {
            File::C
        };
        to = Square::new(file, mv.from.rank());
    }

    let mut s = format!("{}{}", mv.from, to);
    if let Some(p) = mv.promotion {
        s.push(promotion_char(p));
    }
    s
}

/// Parse UCI move text against `board`.
///
/// Parsing is syntactic: the move is not checked for legality, so an
/// engine's illegal claims stay representable. A king stepping two files
/// is translated to the rook square when the mover still holds that
/// castling right.
pub fn parse_uci_move(board: &Board, text: &str) -> Result<Move, RulesError> {
    let text = text.trim();
    let invalid = || RulesError::InvalidMove(text.to_string());
    if !text.is_ascii() || !(4..=5).contains(&text.len()) {
        return Err(invalid());
    }

    let from: Square = text[0..2].parse().map_err(|_| invalid())?;
    let mut to: Square = text[2..4].parse().map_err(|_| invalid())?;
    let promotion = match text[4..].chars().next() {
        Some(c) => Some(promotion_piece(c).ok_or_else(invalid)?),
        None => None,
    };

    if promotion.is_none()
        && board.piece_on(from) == Some(Piece::King)
        && from.rank() == to.rank()
        && ((to.file() as i8) - (from.file() as i8)).abs() == 2
    {
        if let Some(color) = board.color_on(from) {
            let rights = board.castle_rights(color);
            let rook_file = if (to.file() as i8) > (from.file() as i8) {
                rights.short
            } else {
                rights.long
            };
            if let Some(file) = rook_file {
                to = Square::new(file, from.rank());
            }
        }
    }

    Ok(Move {
        from,
        to,
        promotion,
    })
}

fn is_castle(board: &Board, mv: Move) -> bool {
    board.piece_on(mv.from) == Some(Piece::King)
        && board.color_on(mv.from).is_some()
        && board.color_on(mv.to) == board.color_on(mv.from)
}

fn promotion_char(p: Piece) -> char {
    match p {
        Piece::Queen => 'q',
        Piece::Rook => 'r',
        Piece::Bishop => 'b',
        Piece::Knight => 'n',
        _ => 'q',
    }
}

fn promotion_piece(c: char) -> Option<Piece> {
    match c {
        'q' | 'Q' => Some(Piece::Queen),
        'r' | 'R' => Some(Piece::Rook),
        'b' | 'B' => Some(Piece::Bishop),
        'n' | 'N' => Some(Piece::Knight),
        _ => None,
    }
}
