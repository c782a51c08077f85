//! The engine line protocol.
//!
//! ```text
//! <- READY
//! -> go:<fen>:<ms>:_
//! <- e2e4
//! -> perft:<fen>:<depth>:<flag>
//! <- a2a3:380 b2b3:420 ...
//! ```
//!
//! Requests and replies carry no identifiers, so exactly one reply line is
//! consumed per request.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use chess_reference::{fen, move_to_uci, parse_uci_move, Board, Move, MoveFilter};

/// Line an engine prints once it accepts requests.
pub const READY: &str = "READY";

/// A single protocol request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Go { fen: String, think_time: Duration },
    Perft { fen: String, depth: u8, flag: char },
}

impl Request {
    pub fn go(board: &Board, think_time: Duration) -> Self {
        Request::Go {
            fen: fen(board),
            think_time,
        }
    }

    pub fn perft(board: &Board, depth: u8, filter: &MoveFilter) -> Self {
        Request::Perft {
            fen: fen(board),
            depth,
            flag: filter.wire_flag(),
        }
    }

    /// Parse a request line as an engine sees it.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.trim().split(':');
        let verb = fields.next()?;
        let fen = fields.next()?.to_string();
        let arg = fields.next()?;
        let flag = fields.next();
        if fields.next().is_some() {
            return None;
        }

        match verb {
            "go" => Some(Request::Go {
                fen,
                think_time: Duration::from_millis(arg.parse().ok()?),
            }),
            "perft" => {
                let flag = flag?;
                let mut chars = flag.chars();
                let flag = chars.next()?;
                if chars.next().is_some() {
                    return None;
                }
                Some(Request::Perft {
                    fen,
                    depth: arg.parse().ok()?,
                    flag,
                })
            }
            _ => None,
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Go { fen, think_time } => write!(f, "go:{}:{}:_", fen, think_time.as_millis()),
            Request::Perft { fen, depth, flag } => write!(f, "perft:{fen}:{depth}:{flag}"),
        }
    }
}

/// Per-move leaf counts reported by an engine, in reply order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerftReport {
    counts: Vec<(Move, u64)>,
}

impl PerftReport {
    pub fn new(counts: Vec<(Move, u64)>) -> Self {
        Self { counts }
    }

    /// Parse a reply line against the position it describes. An empty line
    /// is a position without moves.
    pub fn parse(board: &Board, line: &str) -> Result<Self, String> {
        let mut counts = Vec::new();
        let mut seen = HashSet::new();
        for pair in line.split_whitespace() {
            let (mv, count) = pair
                .split_once(':')
                .ok_or_else(|| format!("expected <move>:<count>, found {pair:?}"))?;
            let mv = parse_uci_move(board, mv).map_err(|e| e.to_string())?;
            let count = count
                .parse::<u64>()
                .map_err(|_| format!("invalid count in {pair:?}"))?;
            if !seen.insert(mv) {
                return Err(format!("move {} reported twice", move_to_uci(board, mv)));
            }
            counts.push((mv, count));
        }
        Ok(Self { counts })
    }

    /// Render the reply line for `board`.
    pub fn to_line(&self, board: &Board) -> String {
        self.counts
            .iter()
            .map(|&(mv, n)| format!("{}:{}", move_to_uci(board, mv), n))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|(_, n)| n).sum()
    }

    pub fn count(&self, mv: Move) -> Option<u64> {
        self.counts.iter().find(|(m, _)| *m == mv).map(|(_, n)| *n)
    }

    pub fn moves(&self) -> impl Iterator<Item = Move> + '_ {
        self.counts.iter().map(|(mv, _)| *mv)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Move, u64)> {
        self.counts.iter()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Parse a `go` reply: a single move in UCI notation.
pub fn parse_move_reply(board: &Board, line: &str) -> Result<Move, String> {
    let mut tokens = line.split_whitespace();
    let text = tokens.next().ok_or_else(|| "empty reply".to_string())?;
    if tokens.next().is_some() {
        return Err("expected a single move".to_string());
    }
    parse_uci_move(board, text).map_err(|e| e.to_string())
}
