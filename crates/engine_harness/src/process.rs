//! Child process plumbing for line-oriented engines.
//!
//! Each output stream of the child is read by its own thread and forwarded
//! line by line over a channel, so the caller never blocks on a pipe: it polls
//! the channel in short slices until a deadline passes.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

/// Granularity of the output poll.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Silence on the error stream that ends a diagnostic drain.
pub const DRAIN_QUIET_PERIOD: Duration = Duration::from_millis(100);

/// Upper bound on lines collected by one drain, so a child that never stops
/// writing cannot hold the drain open.
pub const MAX_DIAGNOSTIC_LINES: usize = 1000;

/// Result of waiting for one output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitLine {
    Line(String),
    TimedOut,
    /// The output stream reached end of file
    Closed,
}

/// A spawned child with piped stdin, stdout and stderr.
pub struct ChildProcess {
    program: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Receiver<String>,
    stderr: Receiver<String>,
}

impl ChildProcess {
    pub fn spawn(program: &str, args: &[String]) -> io::Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .map(forward_lines)
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .map(forward_lines)
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stderr not captured"))?;

        debug!(program, pid = child.id(), "spawned engine process");
        Ok(Self {
            program: program.to_string(),
            child,
            stdin,
            stdout,
            stderr,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Write one line and flush it straight away.
    pub fn send_line(&mut self, line: &str) -> io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stdin already closed"))?;
        writeln!(stdin, "{line}")?;
        stdin.flush()
    }

    /// Wait up to `timeout` for the next stdout line, polling every
    /// [`POLL_INTERVAL`].
    pub fn wait_line(&mut self, timeout: Duration) -> WaitLine {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return WaitLine::TimedOut;
            }
            match self.stdout.recv_timeout(POLL_INTERVAL.min(deadline - now)) {
                Ok(line) => return WaitLine::Line(line),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return WaitLine::Closed,
            }
        }
    }

    /// Collect buffered stderr lines until the stream stays quiet for
    /// [`DRAIN_QUIET_PERIOD`] or closes.
    pub fn drain_stderr(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while lines.len() < MAX_DIAGNOSTIC_LINES {
            match self.stderr.recv_timeout(DRAIN_QUIET_PERIOD) {
                Ok(line) => lines.push(line),
                Err(_) => break,
            }
        }
        lines
    }

    /// Close stdin, kill the child and reap it. Safe on a process that has
    /// already exited.
    pub fn shutdown(&mut self) {
        drop(self.stdin.take());
        if let Err(e) = self.child.kill() {
            debug!(program = %self.program, "kill failed: {e}");
        }
        match self.child.wait() {
            Ok(status) => debug!(program = %self.program, %status, "engine process reaped"),
            Err(e) => debug!(program = %self.program, "wait failed: {e}"),
        }
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            self.shutdown();
        }
    }
}

/// Forward trimmed lines of `stream` over a channel from a reader thread.
/// Bytes that are not UTF-8 are replaced rather than ending the stream, so
/// the child never writes into a closed pipe. The channel disconnects when
/// the stream closes.
fn forward_lines<R: Read + Send + 'static>(stream: R) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf).trim().to_string();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("output reader stopped: {e}");
                    break;
                }
            }
        }
    });
    rx
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ChildProcess {
        ChildProcess::spawn("sh", &["-c".to_string(), script.to_string()]).unwrap()
    }

    #[test]
    fn test_reads_lines_in_order() {
        let mut proc = sh("echo first; echo '  second  '");
        assert_eq!(proc.wait_line(Duration::from_secs(2)), WaitLine::Line("first".into()));
        assert_eq!(proc.wait_line(Duration::from_secs(2)), WaitLine::Line("second".into()));
        assert_eq!(proc.wait_line(Duration::from_secs(2)), WaitLine::Closed);
    }

    #[test]
    fn test_wait_line_times_out() {
        let mut proc = sh("sleep 5");
        let start = Instant::now();
        assert_eq!(proc.wait_line(Duration::from_millis(200)), WaitLine::TimedOut);
        assert!(start.elapsed() < Duration::from_millis(200) + POLL_INTERVAL * 10);
        proc.shutdown();
    }

    #[test]
    fn test_echoes_requests() {
        let mut proc = sh("read line; echo \"got $line\"");
        proc.send_line("ping").unwrap();
        assert_eq!(
            proc.wait_line(Duration::from_secs(2)),
            WaitLine::Line("got ping".into())
        );
    }

    #[test]
    fn test_drain_stderr() {
        let mut proc = sh("echo oops >&2; echo again >&2; sleep 5");
        thread::sleep(Duration::from_millis(300));
        let lines = proc.drain_stderr();
        assert_eq!(lines, vec!["oops", "again"]);
        proc.shutdown();
    }

    #[test]
    fn test_invalid_utf8_keeps_streams_open() {
        let mut proc = sh("printf 'bad\\377\\n' >&2; printf 'e2e4\\377\\n'; sleep 0.3; echo more >&2; echo next");
        let first = proc.wait_line(Duration::from_secs(2));
        assert_eq!(first, WaitLine::Line("e2e4\u{FFFD}".into()));
        assert_eq!(proc.wait_line(Duration::from_secs(2)), WaitLine::Line("next".into()));
        assert_eq!(proc.drain_stderr(), vec!["bad\u{FFFD}", "more"]);
    }

    #[test]
    fn test_shutdown_after_exit() {
        let mut proc = sh("exit 0");
        assert_eq!(proc.wait_line(Duration::from_secs(2)), WaitLine::Closed);
        proc.shutdown();
        proc.shutdown();
    }
}
