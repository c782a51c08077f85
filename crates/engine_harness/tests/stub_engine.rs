//! End-to-end tests against the `stub_engine` binary.

use std::time::{Duration, Instant};

use chess_reference::{fen, move_to_uci, parse_fen, perft, Board, Game, MoveFilter, STARTPOS_FEN};
use engine_harness::suites::{PerftFixture, PerftSource, PerftSuite, PuzzleSuite};
use engine_harness::{
    Bisector, Divergence, Engine, EngineError, EngineHandle, EngineOpponent, EngineOptions,
    HarnessError, MatchConfig, MatchRunner, Opponent, Orchestrator, RandomOpponent, TestCase,
    TestDetail, UciOpponent, UciOptions,
};

fn stub(args: &[&str]) -> EngineOptions {
    let mut options = EngineOptions::new(env!("CARGO_BIN_EXE_stub_engine"));
    options.args = args.iter().map(|a| a.to_string()).collect();
    options.think_time = Duration::from_millis(50);
    options.reply_grace = Duration::from_millis(500);
    options.handshake_timeout = Duration::from_secs(2);
    options.perft_timeout = Duration::from_secs(10);
    options
}

#[test]
fn handshake_and_best_move() {
    let mut engine = EngineHandle::start(stub(&[])).unwrap();
    assert!(engine.is_running());

    // Scholar's mate is on the board; the stub always takes a mate in one
    let board = parse_fen("r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5Q2/PPPP1PPP/RNB1K1NR w KQkq - 2 3").unwrap();
    let mv = engine.best_move(&board, None).unwrap();
    assert_eq!(move_to_uci(&board, mv), "f3f7");
    engine.close();
    assert!(!engine.is_running());
}

#[test]
fn perft_counts_match_reference() {
    let mut engine = EngineHandle::start(stub(&[])).unwrap();
    let board = Board::default();

    let report = engine.perft_counts(&board, 2, &MoveFilter::All).unwrap();
    assert_eq!(report.len(), 20);
    assert_eq!(report.total(), 400);

    let kiwipete =
        parse_fen("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1").unwrap();
    let quiet = MoveFilter::quiet();
    let report = engine.perft_counts(&kiwipete, 2, &quiet).unwrap();
    assert_eq!(report.total(), perft(&kiwipete, 2, &quiet));
}

#[test]
fn pre_handshake_chatter_is_skipped() {
    let mut engine = EngineHandle::start(stub(&["--chatter", "5"])).unwrap();
    let mv = engine.best_move(&Board::default(), None).unwrap();
    assert!(Board::default().is_legal(mv));
}

#[test]
fn silent_engine_fails_handshake() {
    let started = Instant::now();
    let err = EngineHandle::start(stub(&["--mute"])).err().unwrap();
    assert!(matches!(err, EngineError::Timeout { .. }), "{err}");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn endless_chatter_fails_handshake() {
    let mut options = stub(&["--babble"]);
    options.handshake_timeout = Duration::from_millis(200);

    let started = Instant::now();
    let err = EngineHandle::start(options).err().unwrap();
    assert!(matches!(err, EngineError::Timeout { .. }), "{err}");
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[test]
fn undecodable_reply_is_a_format_error() {
    let mut engine = EngineHandle::start(stub(&["--garble-first"])).unwrap();
    let board = Board::default();

    let err = engine.best_move(&board, None).unwrap_err();
    assert!(matches!(err, EngineError::Format { .. }), "{err}");
    assert!(!err.is_fatal());

    // the session stays in step with its requests
    assert!(engine.is_running());
    let mv = engine.best_move(&board, None).unwrap();
    assert!(board.is_legal(mv));
}

#[test]
fn hung_engine_times_out_with_diagnostics() {
    let mut engine = EngineHandle::start(stub(&["--hang"])).unwrap();

    let started = Instant::now();
    let err = engine.best_move(&Board::default(), None).unwrap_err();
    let elapsed = started.elapsed();

    assert!(err.is_fatal());
    assert!(matches!(err, EngineError::Timeout { .. }), "{err}");
    assert!(elapsed >= Duration::from_millis(550));
    assert!(elapsed < Duration::from_secs(3));
    assert!(err
        .diagnostics()
        .iter()
        .any(|line| line.starts_with("stuck on go:")));

    assert!(!engine.is_running());
    assert!(matches!(
        engine.best_move(&Board::default(), None),
        Err(EngineError::NotRunning)
    ));
}

#[test]
fn crashed_engine_reports_exit() {
    let mut engine = EngineHandle::start(stub(&["--exit-on-request"])).unwrap();
    let err = engine.perft_counts(&Board::default(), 1, &MoveFilter::All).unwrap_err();
    assert!(matches!(err, EngineError::Exited { .. }), "{err}");
    assert!(err.is_fatal());
}

#[test]
fn missing_binary_fails_to_spawn() {
    let err = EngineHandle::start(EngineOptions::new("./definitely-not-an-engine")).err().unwrap();
    assert!(matches!(err, EngineError::Spawn { .. }), "{err}");
}

#[test]
fn restart_gives_a_fresh_session() {
    let mut engine = EngineHandle::start(stub(&[])).unwrap();
    engine.restart().unwrap();
    engine.restart().unwrap();
    let report = engine.perft_counts(&Board::default(), 1, &MoveFilter::All).unwrap();
    assert_eq!(report.total(), 20);
}

#[test]
fn bisector_finds_dropped_root_move() {
    let mut engine = EngineHandle::start(stub(&["--drop-move", "g1f3"])).unwrap();
    let report = Bisector::new(&mut engine, MoveFilter::All)
        .bisect(&Board::default(), 3)
        .unwrap();

    assert_eq!(report.round_trips, 1);
    assert_eq!(report.divergences.len(), 1);
    match &report.divergences[0] {
        Divergence::MoveSet {
            fen: at,
            false_negatives,
            false_positives,
            ..
        } => {
            assert_eq!(at, STARTPOS_FEN);
            assert_eq!(false_negatives, &vec!["g1f3".to_string()]);
            assert!(false_positives.is_empty());
        }
        other => panic!("unexpected divergence {other:?}"),
    }
}

#[test]
fn bisector_is_clean_for_correct_engine() {
    let mut engine = EngineHandle::start(stub(&[])).unwrap();
    let board = parse_fen("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1").unwrap();
    let report = Bisector::new(&mut engine, MoveFilter::All).bisect(&board, 3).unwrap();
    assert!(report.is_clean());
    assert_eq!(report.round_trips, 1);
}

fn small_suite() -> PerftSuite {
    let fixtures = vec![
        PerftFixture::new(STARTPOS_FEN, 3, 8_902).unwrap(),
        PerftFixture::new("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1", 3, 2_812).unwrap(),
    ];
    PerftSuite::new(PerftSource::Fixed(fixtures)).with_quiet_checks(2, MoveFilter::quiet())
}

#[test]
fn orchestrated_run_passes_for_correct_engine() {
    let mut engine = EngineHandle::start(stub(&[])).unwrap();
    let tests: Vec<Box<dyn TestCase>> = vec![Box::new(small_suite())];
    let report = Orchestrator::new(tests).unwrap().run(&mut engine).unwrap();
    assert!(report.all_passed(), "{}", report.generate_report());
    assert!(report.generate_report().contains("All tests succeeded."));
}

#[test]
fn orchestrated_run_localises_defect() {
    let mut engine = EngineHandle::start(stub(&["--drop-move", "e2e4"])).unwrap();
    let tests: Vec<Box<dyn TestCase>> = vec![Box::new(small_suite())];
    let report = Orchestrator::new(tests).unwrap().run(&mut engine).unwrap();

    assert_eq!(report.failed, 1);
    let text = report.generate_report();
    assert!(text.contains("1 tests failed."), "{text}");
    assert!(text.contains("e2e4"), "{text}");
}

#[test]
fn orchestrated_run_aborts_on_hang() {
    let mut options = stub(&["--hang"]);
    options.perft_timeout = Duration::from_millis(300);
    let mut engine = EngineHandle::start(options).unwrap();
    let tests: Vec<Box<dyn TestCase>> = vec![Box::new(small_suite())];
    match Orchestrator::new(tests).unwrap().run(&mut engine) {
        Err(HarnessError::Aborted { report, source }) => {
            assert!(matches!(source, EngineError::Timeout { .. }));
            assert_eq!(report.failed, 1);
        }
        other => panic!("expected an aborted run, got {other:?}"),
    }
}

#[test]
fn puzzle_suite_scores_stub_moves() {
    let path = std::env::temp_dir().join(format!("harness-puzzles-{}.csv", std::process::id()));
    std::fs::write(
        &path,
        "PuzzleId,FEN,Moves,Rating,RatingDeviation,Popularity,NbPlays,Themes,GameUrl,OpeningTags\n\
         00001,7k/2p3pp/8/8/8/8/8/RR4K1 b - - 0 1,c7c6 b1b8,1200,75,90,100,mateIn1,,\n\
         00002,6k1/p4ppp/8/8/8/8/5PPP/3R2K1 b - - 0 1,a7a6 d1d8,1000,75,90,100,mateIn1,,\n",
    )
    .unwrap();

    let mut engine = EngineHandle::start(stub(&[])).unwrap();
    let tests: Vec<Box<dyn TestCase>> = vec![Box::new(PuzzleSuite::new(&path, 10).min_success_rate(1.0))];
    let report = Orchestrator::new(tests).unwrap().run(&mut engine).unwrap();
    std::fs::remove_file(&path).ok();

    assert!(report.all_passed(), "{}", report.generate_report());
    match &report.results[0].detail {
        Some(TestDetail::Puzzles {
            solved,
            mean_rating,
            ..
        }) => {
            assert_eq!(*solved, 2);
            assert_eq!(*mean_rating, Some(1100.0));
        }
        other => panic!("unexpected detail {other:?}"),
    }
}

#[test]
fn uci_opponent_plays_from_position() {
    let mut options = UciOptions::new(env!("CARGO_BIN_EXE_stub_engine"));
    options.args = vec!["--uci".to_string()];
    options.think_time = Duration::from_millis(20);
    let mut opponent = UciOpponent::start(options).unwrap();

    opponent.set_strength(1200).unwrap();
    opponent.new_game().unwrap();
    let game = Game::from_uci_moves(Board::default(), &["e2e4", "e7e5", "g1f3"], 3).unwrap();
    opponent.set_position(&game).unwrap();
    let mv = opponent.best_move().unwrap();
    assert!(game.board().is_legal(mv), "{} in {}", move_to_uci(game.board(), mv), fen(game.board()));
}

#[test]
fn match_against_second_engine_session() {
    let mut engine = EngineHandle::start(stub(&[])).unwrap();
    let mut opponent = EngineOpponent::new(EngineHandle::start(stub(&[])).unwrap());
    let openings = vec![Game::new(Board::default())];
    let config = MatchConfig {
        max_plies: 40,
        verbose: false,
        ..Default::default()
    };

    let report = MatchRunner::new(config)
        .run_match(&mut engine, &mut opponent, &openings)
        .unwrap();
    assert_eq!(report.games.len(), 2);
    assert_eq!(report.result.total_games() + report.result.aborted, 2);
}

#[test]
fn match_against_random_opponent() {
    let mut engine = EngineHandle::start(stub(&[])).unwrap();
    let mut opponent = RandomOpponent::new(Some(7));
    let openings = vec![Game::from_uci_moves(Board::default(), &["d2d4", "d7d5"], 2).unwrap()];
    let config = MatchConfig {
        max_plies: 60,
        verbose: false,
        ..Default::default()
    };

    let report = MatchRunner::new(config)
        .run_match(&mut engine, &mut opponent, &openings)
        .unwrap();
    assert_eq!(report.games.len(), 2);
    for game in &report.games {
        assert_eq!(game.start_fen, fen(openings[0].board()));
        assert!(game.moves.len() <= 60);
    }
}
