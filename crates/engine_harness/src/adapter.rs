//! Engine adapter: a timeout-bounded request/response session over a child
//! process.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use chess_reference::{Board, Move, MoveFilter};

use crate::error::EngineError;
use crate::process::{ChildProcess, WaitLine};
use crate::protocol::{parse_move_reply, PerftReport, Request, READY};

/// Anything that can answer `go` and `perft` requests.
///
/// [`EngineHandle`] drives a real process; tests substitute in-process stubs.
pub trait Engine {
    fn name(&self) -> &str;

    /// Ask for a move, thinking for `think_time` (or the engine default).
    fn best_move(&mut self, board: &Board, think_time: Option<Duration>)
        -> Result<Move, EngineError>;

    /// Per-move leaf counts `depth` plies deep, restricted by `filter`.
    fn perft_counts(
        &mut self,
        board: &Board,
        depth: u8,
        filter: &MoveFilter,
    ) -> Result<PerftReport, EngineError>;

    /// Replace the session with a fresh one, discarding all engine state.
    fn restart(&mut self) -> Result<(), EngineError>;

    fn close(&mut self);

    /// Diagnostic output buffered since the last drain.
    fn drain_diagnostics(&mut self) -> Vec<String> {
        Vec::new()
    }
}

/// A handshake may take at most this many per-line bounds in total.
const HANDSHAKE_LINE_BUDGET: u32 = 4;

/// How to start an engine and how long to wait for it.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub program: String,
    pub args: Vec<String>,
    /// Echo every request and reply line
    pub verbose: bool,
    /// Default thinking time for `go`
    pub think_time: Duration,
    /// Bound on each line read while waiting for `READY`; the whole
    /// handshake is bounded by a small multiple of it
    pub handshake_timeout: Duration,
    /// Allowance on top of the thinking time for a `go` reply
    pub reply_grace: Duration,
    pub perft_timeout: Duration,
}

impl EngineOptions {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            verbose: false,
            think_time: Duration::from_secs(4),
            handshake_timeout: Duration::from_secs(2),
            reply_grace: Duration::from_secs(2),
            perft_timeout: Duration::from_secs(60),
        }
    }
}

/// A live, restartable engine session.
///
/// A timeout or unexpected exit kills the child; every request after that
/// fails with [`EngineError::NotRunning`] until [`Engine::restart`].
pub struct EngineHandle {
    options: EngineOptions,
    process: Option<ChildProcess>,
}

impl EngineHandle {
    /// Spawn the engine and wait for its handshake.
    pub fn start(options: EngineOptions) -> Result<Self, EngineError> {
        let mut handle = Self {
            options,
            process: None,
        };
        handle.spawn()?;
        Ok(handle)
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn is_running(&self) -> bool {
        self.process.is_some()
    }

    fn spawn(&mut self) -> Result<(), EngineError> {
        let process = ChildProcess::spawn(&self.options.program, &self.options.args).map_err(
            |source| EngineError::Spawn {
                program: self.options.program.clone(),
                source,
            },
        )?;
        self.process = Some(process);
        self.handshake()
    }

    fn handshake(&mut self) -> Result<(), EngineError> {
        let per_line = self.options.handshake_timeout;
        let budget = per_line * HANDSHAKE_LINE_BUDGET;
        let deadline = Instant::now() + budget;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(self.abort(Some(budget)));
            }
            let line = self.wait_line(remaining.min(per_line))?;
            if line == READY {
                debug!(engine = %self.options.program, "engine ready");
                return Ok(());
            }
            debug!(engine = %self.options.program, "pre-handshake output: {line}");
        }
    }

    /// One request, one reply line.
    fn request(&mut self, request: &Request, timeout: Duration) -> Result<String, EngineError> {
        let line = request.to_string();
        self.echo(&line);
        let process = self.process.as_mut().ok_or(EngineError::NotRunning)?;
        if let Err(e) = process.send_line(&line) {
            debug!(engine = %self.options.program, "write failed: {e}");
            return Err(self.abort(None));
        }
        self.wait_line(timeout)
    }

    fn wait_line(&mut self, timeout: Duration) -> Result<String, EngineError> {
        let process = self.process.as_mut().ok_or(EngineError::NotRunning)?;
        match process.wait_line(timeout) {
            WaitLine::Line(line) => {
                self.echo(&line);
                Ok(line)
            }
            WaitLine::TimedOut => Err(self.abort(Some(timeout))),
            WaitLine::Closed => Err(self.abort(None)),
        }
    }

    /// Tear the session down after a hang or crash, forwarding whatever the
    /// engine wrote to its error stream.
    fn abort(&mut self, timed_out: Option<Duration>) -> EngineError {
        let diagnostics = self.drain_diagnostics();
        if let Some(mut process) = self.process.take() {
            process.shutdown();
        }
        let program = self.options.program.clone();
        match timed_out {
            Some(waited) => {
                warn!(engine = %program, "timed out after {waited:?}");
                EngineError::Timeout {
                    program,
                    waited,
                    diagnostics,
                }
            }
            None => {
                warn!(engine = %program, "exited unexpectedly");
                EngineError::Exited {
                    program,
                    diagnostics,
                }
            }
        }
    }

    fn echo(&self, line: &str) {
        if self.options.verbose {
            info!(">{line}");
        } else {
            debug!(">{line}");
        }
    }

    fn format_error(request: &Request, reply: String, reason: String) -> EngineError {
        EngineError::Format {
            request: request.to_string(),
            reply,
            reason,
        }
    }
}

impl Engine for EngineHandle {
    fn name(&self) -> &str {
        &self.options.program
    }

    fn best_move(
        &mut self,
        board: &Board,
        think_time: Option<Duration>,
    ) -> Result<Move, EngineError> {
        let think_time = think_time.unwrap_or(self.options.think_time);
        let request = Request::go(board, think_time);
        let reply = self.request(&request, think_time + self.options.reply_grace)?;
        parse_move_reply(board, &reply).map_err(|reason| Self::format_error(&request, reply, reason))
    }

    fn perft_counts(
        &mut self,
        board: &Board,
        depth: u8,
        filter: &MoveFilter,
    ) -> Result<PerftReport, EngineError> {
        let request = Request::perft(board, depth, filter);
        let reply = self.request(&request, self.options.perft_timeout)?;
        PerftReport::parse(board, &reply).map_err(|reason| Self::format_error(&request, reply, reason))
    }

    fn restart(&mut self) -> Result<(), EngineError> {
        self.close();
        self.spawn()
    }

    fn close(&mut self) {
        if self.process.is_none() {
            return;
        }
        self.drain_diagnostics();
        if let Some(mut process) = self.process.take() {
            process.shutdown();
        }
    }

    /// Forwards each drained line to the log as it is collected.
    fn drain_diagnostics(&mut self) -> Vec<String> {
        let Some(process) = self.process.as_mut() else {
            return Vec::new();
        };
        let lines = process.drain_stderr();
        for line in &lines {
            warn!(engine = %self.options.program, "{line}");
        }
        lines
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.close();
    }
}
