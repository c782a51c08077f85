//! Game state with terminal outcome detection

use cozy_chess::{BitBoard, Board, Color, Move, Piece, Square};

use crate::error::RulesError;
use crate::notation::{fen, move_to_uci, parse_uci_move};

/// Half-moves without pawn move or capture that end the game outright
pub const SEVENTY_FIVE_MOVE_LIMIT: u32 = 150;

/// Occurrences of one position that end the game outright
pub const FIVEFOLD_LIMIT: usize = 5;

/// Why a game ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    SeventyFiveMoves,
    FivefoldRepetition,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Checkmate => "checkmate",
            Termination::Stalemate => "stalemate",
            Termination::InsufficientMaterial => "insufficient material",
            Termination::SeventyFiveMoves => "seventy-five move rule",
            Termination::FivefoldRepetition => "fivefold repetition",
        }
    }
}

/// Terminal result of a game. `winner` is `None` for draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub winner: Option<Color>,
    pub termination: Termination,
}

/// A game in progress: the starting position plus every move played since.
#[derive(Debug, Clone)]
pub struct Game {
    start: Board,
    board: Board,
    moves: Vec<Move>,
    /// Position hash history for repetition detection, start position included
    history: Vec<u64>,
    /// Half-moves since the last pawn move or capture
    halfmoves: u32,
}

impl Game {
    pub fn new(start: Board) -> Self {
        let halfmoves = start.halfmove_clock() as u32;
        Self {
            history: vec![start.hash()],
            board: start.clone(),
            start,
            moves: Vec::new(),
            halfmoves,
        }
    }

    /// Start from `start` and play the first `plies` moves of `moves`.
    pub fn from_uci_moves(start: Board, moves: &[&str], plies: usize) -> Result<Self, RulesError> {
        let mut game = Game::new(start);
        for text in moves.iter().take(plies) {
            let mv = parse_uci_move(game.board(), text)?;
            game.play(mv)?;
        }
        Ok(game)
    }

    pub fn start(&self) -> &Board {
        &self.start
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    pub fn side_to_move(&self) -> Color {
        self.board.side_to_move()
    }

    /// Played moves in UCI notation.
    pub fn uci_moves(&self) -> Vec<String> {
        let mut board = self.start.clone();
        self.moves
            .iter()
            .map(|&mv| {
                let text = move_to_uci(&board, mv);
                board.play_unchecked(mv);
                text
            })
            .collect()
    }

    /// Apply a move, rejecting it if it is illegal in the current position.
    pub fn play(&mut self, mv: Move) -> Result<(), RulesError> {
        if !self.board.is_legal(mv) {
            return Err(RulesError::IllegalMove {
                mv: move_to_uci(&self.board, mv),
                fen: fen(&self.board),
            });
        }

        let resets_clock = self.board.piece_on(mv.from) == Some(Piece::Pawn)
            || self.board.color_on(mv.to) == Some(!self.board.side_to_move());
        self.board.play_unchecked(mv);
        self.moves.push(mv);
        self.history.push(self.board.hash());
        self.halfmoves = if resets_clock { 0 } else { self.halfmoves + 1 };
        Ok(())
    }

    /// The terminal outcome of the current position, if the game is over.
    pub fn outcome(&self) -> Option<Outcome> {
        if !has_legal_move(&self.board) {
            return Some(if self.board.checkers().is_empty() {
                Outcome {
                    winner: None,
                    termination: Termination::Stalemate,
                }
            } else {
                Outcome {
                    winner: Some(!self.board.side_to_move()),
                    termination: Termination::Checkmate,
                }
            });
        }

        let draw = |termination| Some(Outcome {
            winner: None,
            termination,
        });
        if is_insufficient_material(&self.board) {
            return draw(Termination::InsufficientMaterial);
        }
        if self.halfmoves >= SEVENTY_FIVE_MOVE_LIMIT {
            return draw(Termination::SeventyFiveMoves);
        }
        let current = self.board.hash();
        if self.history.iter().filter(|&&h| h == current).count() >= FIVEFOLD_LIMIT {
            return draw(Termination::FivefoldRepetition);
        }
        None
    }
}

/// Whether the side to move in `board` is checkmated.
pub fn is_checkmate(board: &Board) -> bool {
    !board.checkers().is_empty() && !has_legal_move(board)
}

fn has_legal_move(board: &Board) -> bool {
    let mut found = false;
    board.generate_moves(|moves| {
        found = moves.len() > 0;
        found
    });
    found
}

/// Neither side can ever deliver mate: bare kings, a single minor piece,
/// or only bishops that all stand on one square colour.
fn is_insufficient_material(board: &Board) -> bool {
    let heavy = board.pieces(Piece::Pawn) | board.pieces(Piece::Rook) | board.pieces(Piece::Queen);
    if !heavy.is_empty() {
        return false;
    }

    let knights = board.pieces(Piece::Knight);
    let bishops = board.pieces(Piece::Bishop);
    if (knights | bishops).len() <= 1 {
        return true;
    }
    if !knights.is_empty() {
        return false;
    }
    let light = light_squares(bishops);
    light == 0 || light == bishops.len() as usize
}

fn light_squares(bb: BitBoard) -> usize {
    bb.into_iter().filter(|&sq| is_light(sq)).count()
}

fn is_light(sq: Square) -> bool {
    (sq.file() as usize + sq.rank() as usize) % 2 == 1
}
