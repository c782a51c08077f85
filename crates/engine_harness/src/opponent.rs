//! Opponents for the match runner.
//!
//! An opponent is told the game so far and asked for a move. Three kinds
//! exist: an external UCI engine, a uniformly random mover, and a second
//! line-protocol engine session (for old-build versus new-build matches).

use std::time::{Duration, Instant};

use tracing::debug;

use chess_reference::{fen, parse_uci_move, Board, Game, Move, RandomMover};

use crate::adapter::{Engine, EngineHandle};
use crate::error::EngineError;
use crate::process::{ChildProcess, WaitLine};

pub trait Opponent {
    fn name(&self) -> &str;

    /// Forget everything about previous games.
    fn new_game(&mut self) -> Result<(), EngineError>;

    fn set_position(&mut self, game: &Game) -> Result<(), EngineError>;

    /// Best move in the position last given to `set_position`.
    fn best_move(&mut self) -> Result<Move, EngineError>;

    /// Limit playing strength to roughly `elo`, where supported.
    fn set_strength(&mut self, elo: u32) -> Result<(), EngineError>;
}

/// How to start an external UCI engine.
#[derive(Debug, Clone)]
pub struct UciOptions {
    pub program: String,
    pub args: Vec<String>,
    pub think_time: Duration,
    /// Bound on each line of the `uci`/`isready` exchanges
    pub handshake_timeout: Duration,
    pub reply_grace: Duration,
}

impl UciOptions {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            think_time: Duration::from_millis(500),
            handshake_timeout: Duration::from_secs(5),
            reply_grace: Duration::from_secs(2),
        }
    }
}

/// An external engine speaking UCI, e.g. Stockfish.
pub struct UciOpponent {
    options: UciOptions,
    process: ChildProcess,
    board: Board,
    position: String,
}

impl UciOpponent {
    pub fn start(options: UciOptions) -> Result<Self, EngineError> {
        let process =
            ChildProcess::spawn(&options.program, &options.args).map_err(|source| {
                EngineError::Spawn {
                    program: options.program.clone(),
                    source,
                }
            })?;
        let mut opponent = Self {
            options,
            process,
            board: Board::default(),
            position: "position startpos".to_string(),
        };
        opponent.send("uci")?;
        opponent.expect("uciok")?;
        opponent.sync()?;
        Ok(opponent)
    }

    fn send(&mut self, line: &str) -> Result<(), EngineError> {
        debug!(opponent = %self.options.program, ">{line}");
        if self.process.send_line(line).is_err() {
            return Err(self.failure(None));
        }
        Ok(())
    }

    /// Read lines until one starts with `prefix`, giving each line
    /// `handshake_timeout`.
    fn expect(&mut self, prefix: &str) -> Result<String, EngineError> {
        let timeout = self.options.handshake_timeout;
        self.read_until(prefix, Instant::now() + timeout * 4, timeout)
    }

    fn read_until(
        &mut self,
        prefix: &str,
        deadline: Instant,
        per_line: Duration,
    ) -> Result<String, EngineError> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let wait = remaining.min(per_line);
            match self.process.wait_line(wait) {
                WaitLine::Line(line) if line.starts_with(prefix) => return Ok(line),
                WaitLine::Line(line) => debug!(opponent = %self.options.program, "<{line}"),
                WaitLine::TimedOut => return Err(self.failure(Some(wait))),
                WaitLine::Closed => return Err(self.failure(None)),
            }
        }
    }

    fn sync(&mut self) -> Result<(), EngineError> {
        self.send("isready")?;
        self.expect("readyok").map(|_| ())
    }

    fn failure(&mut self, timed_out: Option<Duration>) -> EngineError {
        let diagnostics = self.process.drain_stderr();
        self.process.shutdown();
        let program = self.options.program.clone();
        match timed_out {
            Some(waited) => EngineError::Timeout {
                program,
                waited,
                diagnostics,
            },
            None => EngineError::Exited {
                program,
                diagnostics,
            },
        }
    }
}

impl Opponent for UciOpponent {
    fn name(&self) -> &str {
        &self.options.program
    }

    fn new_game(&mut self) -> Result<(), EngineError> {
        self.send("ucinewgame")?;
        self.sync()
    }

    fn set_position(&mut self, game: &Game) -> Result<(), EngineError> {
        let mut position = format!("position fen {}", fen(game.start()));
        let moves = game.uci_moves();
        if !moves.is_empty() {
            position.push_str(" moves ");
            position.push_str(&moves.join(" "));
        }
        self.position = position;
        self.board = game.board().clone();
        Ok(())
    }

    fn best_move(&mut self) -> Result<Move, EngineError> {
        let position = self.position.clone();
        self.send(&position)?;
        let think = self.options.think_time;
        self.send(&format!("go movetime {}", think.as_millis()))?;

        let limit = think + self.options.reply_grace;
        let line = self.read_until("bestmove", Instant::now() + limit, limit)?;
        let text = line.split_whitespace().nth(1).unwrap_or_default();
        parse_uci_move(&self.board, text).map_err(|e| EngineError::Format {
            request: position,
            reply: line.clone(),
            reason: e.to_string(),
        })
    }

    fn set_strength(&mut self, elo: u32) -> Result<(), EngineError> {
        self.send("setoption name UCI_LimitStrength value true")?;
        self.send(&format!("setoption name UCI_Elo value {elo}"))?;
        self.sync()
    }
}

impl Drop for UciOpponent {
    fn drop(&mut self) {
        // best effort; the process is killed regardless
        let _ = self.process.send_line("quit");
        self.process.shutdown();
    }
}

/// Plays uniformly random legal moves.
pub struct RandomOpponent {
    mover: RandomMover,
    board: Board,
}

impl RandomOpponent {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            mover: seed.map_or_else(RandomMover::new, RandomMover::seeded),
            board: Board::default(),
        }
    }
}

impl Opponent for RandomOpponent {
    fn name(&self) -> &str {
        "random"
    }

    fn new_game(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn set_position(&mut self, game: &Game) -> Result<(), EngineError> {
        self.board = game.board().clone();
        Ok(())
    }

    fn best_move(&mut self) -> Result<Move, EngineError> {
        self.mover
            .choose(&self.board)
            .ok_or_else(|| EngineError::NoMove {
                fen: fen(&self.board),
            })
    }

    fn set_strength(&mut self, _elo: u32) -> Result<(), EngineError> {
        Ok(())
    }
}

/// A second line-protocol engine used as the opponent.
pub struct EngineOpponent {
    engine: EngineHandle,
    board: Board,
}

impl EngineOpponent {
    pub fn new(engine: EngineHandle) -> Self {
        Self {
            engine,
            board: Board::default(),
        }
    }
}

impl Opponent for EngineOpponent {
    fn name(&self) -> &str {
        self.engine.name()
    }

    fn new_game(&mut self) -> Result<(), EngineError> {
        self.engine.restart()
    }

    fn set_position(&mut self, game: &Game) -> Result<(), EngineError> {
        self.board = game.board().clone();
        Ok(())
    }

    fn best_move(&mut self) -> Result<Move, EngineError> {
        self.engine.best_move(&self.board, None)
    }

    fn set_strength(&mut self, elo: u32) -> Result<(), EngineError> {
        debug!("{} has no strength setting, ignoring elo {elo}", self.engine.name());
        Ok(())
    }
}
