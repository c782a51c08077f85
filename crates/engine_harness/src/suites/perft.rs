//! Perft suite: total leaf counts against known values.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use chess_reference::{fen, parse_fen, perft, Board, MoveFilter};

use crate::adapter::Engine;
use crate::bisect::Bisector;
use crate::error::HarnessError;
use crate::orchestrator::{TestCase, TestFailure};
use crate::report::{PerftItem, TestDetail};

/// Expected total for one position and depth.
#[derive(Debug, Clone)]
pub struct PerftFixture {
    pub board: Board,
    pub depth: u8,
    pub expected: u64,
    pub filter: MoveFilter,
}

impl PerftFixture {
    pub fn new(fen_text: &str, depth: u8, expected: u64) -> Result<Self, HarnessError> {
        Ok(Self {
            board: parse_fen(fen_text)?,
            depth,
            expected,
            filter: MoveFilter::All,
        })
    }

    /// Fixture whose expected total comes from the reference generator.
    pub fn from_reference(board: Board, depth: u8, filter: MoveFilter) -> Self {
        let expected = perft(&board, depth, &filter);
        Self {
            board,
            depth,
            expected,
            filter,
        }
    }
}

const BUILTIN: &[(&str, u8, u64)] = &[
    ("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1", 4, 197_281),
    ("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1", 4, 4_085_603),
    ("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1", 5, 674_624),
    ("r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1", 5, 15_833_292),
    ("r2q1rk1/pP1p2pp/Q4n2/bbp1p3/Np6/1B3NBn/pPPP1PPP/R3K2R b KQ - 0 1", 5, 15_833_292),
    ("rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8", 4, 2_103_487),
    ("r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - - 0 10", 4, 3_894_594),
];

/// The standard perft positions with their well-known totals.
pub fn builtin_fixtures() -> Result<Vec<PerftFixture>, HarnessError> {
    BUILTIN
        .iter()
        .map(|&(fen_text, depth, expected)| PerftFixture::new(fen_text, depth, expected))
        .collect()
}

/// Parse one EPD record: `<fen> ;D1 20 ;D2 400 ...`.
///
/// Returns the FEN and its depth/total pairs sorted by depth, or `None` for
/// blank and comment lines.
pub fn parse_epd_line(line: &str) -> Result<Option<(String, Vec<(u8, u64)>)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut parts = line.split(';');
    let fen_text = parts.next().unwrap_or_default().trim().to_string();
    let mut depths = Vec::new();
    for part in parts {
        let mut items = part.split_whitespace();
        let (Some(key), Some(val)) = (items.next(), items.next()) else {
            continue;
        };
        let Some(depth) = key.strip_prefix('D') else {
            continue;
        };
        let depth: u8 = depth
            .parse()
            .map_err(|_| format!("invalid depth token {key:?}"))?;
        let expected: u64 = val
            .parse()
            .map_err(|_| format!("invalid node count {val:?}"))?;
        depths.push((depth, expected));
    }
    if depths.is_empty() {
        return Err("record has no depth entries".to_string());
    }
    depths.sort_by_key(|(d, _)| *d);
    Ok(Some((fen_text, depths)))
}

/// Load fixtures from an EPD file, keeping for each position the deepest
/// entry whose total does not exceed `node_limit`.
pub fn load_epd(path: &Path, node_limit: u64) -> Result<Vec<PerftFixture>, HarnessError> {
    let contents = std::fs::read_to_string(path).map_err(|source| HarnessError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut fixtures = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        let fixture_error = |reason: String| HarnessError::Fixture {
            path: path.to_path_buf(),
            line: idx + 1,
            reason,
        };
        let Some((fen_text, depths)) = parse_epd_line(line).map_err(fixture_error)? else {
            continue;
        };
        let board = parse_fen(&fen_text).map_err(|e| fixture_error(e.to_string()))?;
        match depths.iter().rev().find(|(_, n)| *n <= node_limit) {
            Some(&(depth, expected)) => fixtures.push(PerftFixture {
                board,
                depth,
                expected,
                filter: MoveFilter::All,
            }),
            None => warn!("skipping {fen_text}: every depth exceeds {node_limit} nodes"),
        }
    }
    Ok(fixtures)
}

/// Where the suite's fixtures come from.
#[derive(Debug, Clone)]
pub enum PerftSource {
    Builtin,
    Epd { path: PathBuf, node_limit: u64 },
    Fixed(Vec<PerftFixture>),
}

pub struct PerftSuite {
    source: PerftSource,
    /// Depth of the extra quiet-move checks, if any
    quiet_depth: Option<u8>,
    quiet_filter: MoveFilter,
    bisect_on_failure: bool,
    fixtures: Vec<PerftFixture>,
}

impl PerftSuite {
    pub fn new(source: PerftSource) -> Self {
        Self {
            source,
            quiet_depth: None,
            quiet_filter: MoveFilter::quiet(),
            bisect_on_failure: true,
            fixtures: Vec::new(),
        }
    }

    /// Also check every position with quiet-only enumeration at `depth`,
    /// expected totals taken from the reference generator.
    pub fn with_quiet_checks(mut self, depth: u8, filter: MoveFilter) -> Self {
        self.quiet_depth = Some(depth);
        self.quiet_filter = filter;
        self
    }

    pub fn bisect_on_failure(mut self, enabled: bool) -> Self {
        self.bisect_on_failure = enabled;
        self
    }

    pub fn fixtures(&self) -> &[PerftFixture] {
        &self.fixtures
    }
}

impl TestCase for PerftSuite {
    fn name(&self) -> &str {
        "perft"
    }

    fn configure(&mut self) -> Result<(), HarnessError> {
        let mut fixtures = match &self.source {
            PerftSource::Builtin => builtin_fixtures()?,
            PerftSource::Epd { path, node_limit } => load_epd(path, *node_limit)?,
            PerftSource::Fixed(fixtures) => fixtures.clone(),
        };
        if let Some(depth) = self.quiet_depth {
            let quiet: Vec<_> = fixtures
                .iter()
                .map(|f| PerftFixture::from_reference(f.board.clone(), depth, self.quiet_filter))
                .collect();
            fixtures.extend(quiet);
        }
        if fixtures.is_empty() {
            return Err(HarnessError::Config("perft suite has no fixtures".to_string()));
        }
        self.fixtures = fixtures;
        Ok(())
    }

    fn run(&mut self, engine: &mut dyn Engine) -> Result<TestDetail, TestFailure> {
        let mut items = Vec::new();
        let total = self.fixtures.len();

        for (i, fixture) in self.fixtures.iter().enumerate() {
            info!("perft {}/{}", i + 1, total);
            let mut item = PerftItem {
                fen: fen(&fixture.board),
                depth: fixture.depth,
                quiet: fixture.filter.is_quiet(),
                expected: fixture.expected,
                reported: None,
                passed: false,
                bisect: None,
            };

            let report = match engine.perft_counts(&fixture.board, fixture.depth, &fixture.filter) {
                Ok(report) => report,
                Err(e) => {
                    items.push(item);
                    return Err(TestFailure::from_engine(e, TestDetail::Perft { items }));
                }
            };
            item.reported = Some(report.total());
            item.passed = report.total() == fixture.expected;
            if item.passed {
                items.push(item);
                continue;
            }

            let message = format!(
                "perft {}/{} depth {}: expected {}, engine reported {}",
                i + 1,
                total,
                fixture.depth,
                fixture.expected,
                report.total()
            );
            if self.bisect_on_failure {
                let bisected = Bisector::new(engine, fixture.filter).bisect(&fixture.board, fixture.depth);
                match bisected {
                    Ok(bisect) => item.bisect = Some(bisect),
                    Err(e) => {
                        items.push(item);
                        return Err(TestFailure::from_engine(e, TestDetail::Perft { items }));
                    }
                }
            }
            items.push(item);
            return Err(TestFailure::Failed {
                message,
                detail: Some(TestDetail::Perft { items }),
            });
        }

        Ok(TestDetail::Perft { items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chess_reference::{divide, parse_uci_move, Move};

    use crate::error::EngineError;
    use crate::protocol::PerftReport;

    /// Reference-backed engine that can be told to drop a root move.
    struct ReferenceEngine {
        drop_move: Option<&'static str>,
        requests: usize,
    }

    impl Engine for ReferenceEngine {
        fn name(&self) -> &str {
            "reference"
        }

        fn best_move(&mut self, _: &Board, _: Option<Duration>) -> Result<Move, EngineError> {
            Err(EngineError::NotRunning)
        }

        fn perft_counts(
            &mut self,
            board: &Board,
            depth: u8,
            filter: &MoveFilter,
        ) -> Result<PerftReport, EngineError> {
            self.requests += 1;
            let mut counts = divide(board, depth, filter);
            if let Some(text) = self.drop_move {
                if let Ok(mv) = parse_uci_move(board, text) {
                    counts.retain(|(m, _)| *m != mv);
                }
            }
            Ok(PerftReport::new(counts))
        }

        fn restart(&mut self) -> Result<(), EngineError> {
            Ok(())
        }

        fn close(&mut self) {}
    }

    #[test]
    fn test_builtin_fixtures_parse() {
        let fixtures = builtin_fixtures().unwrap();
        assert_eq!(fixtures.len(), 7);
        assert_eq!(fixtures[0].expected, 197_281);
        assert_eq!(fixtures[2].depth, 5);
        assert_eq!(fixtures[2].expected, 674_624);
    }

    #[test]
    fn test_parse_epd_line() {
        let (fen_text, depths) = parse_epd_line("8/8/8/8/8/8/8/K6k w - - 0 1 ;D2 9 ;D1 3")
            .unwrap()
            .unwrap();
        assert_eq!(fen_text, "8/8/8/8/8/8/8/K6k w - - 0 1");
        assert_eq!(depths, vec![(1, 3), (2, 9)]);

        assert_eq!(parse_epd_line("   ").unwrap(), None);
        assert_eq!(parse_epd_line("# comment").unwrap(), None);
        assert!(parse_epd_line("8/8/8/8/8/8/8/K6k w - - 0 1 ;Dx 3").is_err());
        assert!(parse_epd_line("8/8/8/8/8/8/8/K6k w - - 0 1").is_err());
    }

    #[test]
    fn test_load_epd_respects_node_limit() {
        let path = std::env::temp_dir().join(format!("harness-{}.epd", std::process::id()));
        std::fs::write(
            &path,
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1 ;D1 20 ;D2 400 ;D3 8902\n\
             \n\
             8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1 ;D3 2812 ;D4 43238\n",
        )
        .unwrap();
        let fixtures = load_epd(&path, 5_000).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(fixtures.len(), 2);
        assert_eq!((fixtures[0].depth, fixtures[0].expected), (2, 400));
        assert_eq!((fixtures[1].depth, fixtures[1].expected), (3, 2812));
    }

    #[test]
    fn test_load_epd_reports_line() {
        let path = std::env::temp_dir().join(format!("harness-bad-{}.epd", std::process::id()));
        std::fs::write(&path, "\nnot a fen ;D1 20\n").unwrap();
        let err = load_epd(&path, 1_000).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, HarnessError::Fixture { line: 2, .. }));
    }

    fn small_suite() -> PerftSuite {
        PerftSuite::new(PerftSource::Fixed(vec![
            PerftFixture::new(chess_reference::STARTPOS_FEN, 3, 8902).unwrap(),
            PerftFixture::new("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1", 3, 2812).unwrap(),
        ]))
    }

    #[test]
    fn test_passes_against_correct_engine() {
        let mut suite = small_suite().with_quiet_checks(2, MoveFilter::quiet());
        suite.configure().unwrap();
        assert_eq!(suite.fixtures().len(), 4);

        let mut engine = ReferenceEngine {
            drop_move: None,
            requests: 0,
        };
        match suite.run(&mut engine).unwrap() {
            TestDetail::Perft { items } => {
                assert_eq!(items.len(), 4);
                assert!(items.iter().all(|i| i.passed));
                assert!(items[2].quiet);
            }
            other => panic!("unexpected detail {other:?}"),
        }
        assert_eq!(engine.requests, 4);
    }

    #[test]
    fn test_mismatch_is_bisected_and_stops_the_suite() {
        let mut suite = small_suite();
        suite.configure().unwrap();
        let mut engine = ReferenceEngine {
            drop_move: Some("g1f3"),
            requests: 0,
        };
        match suite.run(&mut engine) {
            Err(TestFailure::Failed {
                detail: Some(TestDetail::Perft { items }),
                ..
            }) => {
                assert_eq!(items.len(), 1);
                let bisect = items[0].bisect.as_ref().unwrap();
                assert_eq!(bisect.divergences.len(), 1);
                assert_eq!(bisect.divergences[0].fen(), chess_reference::STARTPOS_FEN);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_mismatch_without_bisection() {
        let mut suite = small_suite().bisect_on_failure(false);
        suite.configure().unwrap();
        let mut engine = ReferenceEngine {
            drop_move: Some("g1f3"),
            requests: 0,
        };
        assert!(matches!(suite.run(&mut engine), Err(TestFailure::Failed { .. })));
        assert_eq!(engine.requests, 1);
    }
}
