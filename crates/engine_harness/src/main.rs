//! Harness CLI
//!
//! Run the test suites, bisect a perft mismatch, or play a match.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, Level};

use chess_reference::{parse_fen, Board, Game, MoveFilter, STARTPOS_FEN};
use engine_harness::config::{HarnessConfig, OpponentKind};
use engine_harness::match_runner::load_openings;
use engine_harness::{
    Bisector, Engine, EngineHandle, EngineOpponent, HarnessError, MatchRunner, Opponent,
    Orchestrator, RandomOpponent, TestCase, UciOpponent,
};

#[derive(Parser, Debug)]
#[command(name = "harness", about = "Verify a chess engine against a reference move generator")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log protocol traffic and other debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the perft and puzzle suites
    Test(TestArgs),
    /// Localise a perft mismatch in one position
    PerftSearch(PerftSearchArgs),
    /// Play the engine against an opponent
    Match(MatchArgs),
}

#[derive(Args, Debug)]
struct EngineArgs {
    /// Engine binary
    #[arg(long)]
    engine: Option<String>,

    /// Echo every request and reply
    #[arg(long)]
    echo: bool,
}

#[derive(Args, Debug)]
struct TestArgs {
    #[command(flatten)]
    engine: EngineArgs,

    /// EPD perft fixtures instead of the built-in positions
    #[arg(long)]
    epd: Option<PathBuf>,

    /// Also check quiet-move perft at this depth
    #[arg(long)]
    quiet_depth: Option<u8>,

    /// Skip bisection when a perft total is wrong
    #[arg(long)]
    no_bisect: bool,

    /// Lichess puzzle CSV
    #[arg(long)]
    puzzles: Option<PathBuf>,

    /// Number of puzzles to run
    #[arg(long)]
    count: Option<usize>,

    /// Write the JSON report here
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PerftSearchArgs {
    #[command(flatten)]
    engine: EngineArgs,

    #[arg(long, default_value_t = 4)]
    depth: u8,

    /// Enumerate quiet moves only
    #[arg(long)]
    quiet: bool,

    /// Position to search from
    #[arg(default_value = STARTPOS_FEN)]
    fen: String,
}

#[derive(Args, Debug)]
struct MatchArgs {
    #[command(flatten)]
    engine: EngineArgs,

    /// `random`, `uci:<program>` or `engine:<program>`
    #[arg(long)]
    opponent: Option<String>,

    /// Opening list, one per line
    #[arg(long)]
    openings: Option<PathBuf>,

    /// Plies of each opening line to play before the engines take over
    #[arg(long)]
    plies: Option<usize>,

    /// Opponent strength limit
    #[arg(long)]
    elo: Option<u32>,

    /// Write the JSON report here
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => HarnessConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => HarnessConfig::default(),
    };

    match cli.command {
        Command::Test(args) => {
            apply_engine_args(&mut config, &args.engine);
            run_tests(config, args)
        }
        Command::PerftSearch(args) => {
            apply_engine_args(&mut config, &args.engine);
            perft_search(config, args)
        }
        Command::Match(args) => {
            apply_engine_args(&mut config, &args.engine);
            run_match(config, args)
        }
    }
}

fn apply_engine_args(config: &mut HarnessConfig, args: &EngineArgs) {
    if let Some(engine) = &args.engine {
        config.engine.program = engine.clone();
    }
    config.engine.verbose |= args.echo;
}

fn run_tests(mut config: HarnessConfig, args: TestArgs) -> Result<ExitCode> {
    if let Some(epd) = args.epd {
        config.perft.epd = Some(epd);
    }
    if args.quiet_depth.is_some() {
        config.perft.quiet_depth = args.quiet_depth;
    }
    config.perft.bisect &= !args.no_bisect;
    if let Some(puzzles) = args.puzzles {
        config.puzzles.database = Some(puzzles);
    }
    if let Some(count) = args.count {
        config.puzzles.count = count;
    }
    let report_path = args.report.or(config.report.clone());

    let mut tests: Vec<Box<dyn TestCase>> = Vec::new();
    if config.perft.enabled {
        tests.push(Box::new(config.perft.suite()));
    }
    if let Some(suite) = config.puzzles.suite() {
        tests.push(Box::new(suite));
    }
    if tests.is_empty() {
        bail!("no test suites enabled");
    }

    let mut orchestrator = Orchestrator::new(tests)?;
    let mut engine = EngineHandle::start(config.engine.options())?;
    let outcome = orchestrator.run(&mut engine);
    engine.close();

    let report = match outcome {
        Ok(report) => report,
        Err(HarnessError::Aborted { report, source }) => {
            report.print_report();
            save_report(report_path.as_deref(), |path| report.save(path))?;
            return Err(source).context("engine failed, run aborted");
        }
        Err(e) => return Err(e.into()),
    };

    report.print_report();
    save_report(report_path.as_deref(), |path| report.save(path))?;
    Ok(if report.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn perft_search(config: HarnessConfig, args: PerftSearchArgs) -> Result<ExitCode> {
    let board = parse_fen(&args.fen)?;
    let filter = if args.quiet {
        config.perft.quiet.filter()
    } else {
        MoveFilter::All
    };

    let mut engine = EngineHandle::start(config.engine.options())?;
    let report = Bisector::new(&mut engine, filter).bisect(&board, args.depth)?;
    engine.close();

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.is_clean() {
        info!("no divergence found in {} round trips", report.round_trips);
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn run_match(mut config: HarnessConfig, args: MatchArgs) -> Result<ExitCode> {
    if let Some(choice) = &args.opponent {
        let (kind, program) = match choice.split_once(':') {
            Some(("uci", program)) => (OpponentKind::Uci, Some(program.to_string())),
            Some(("engine", program)) => (OpponentKind::Engine, Some(program.to_string())),
            None if choice == "random" => (OpponentKind::Random, None),
            _ => bail!("unknown opponent {choice:?}"),
        };
        config.opponent.kind = kind;
        config.opponent.program = program;
    }
    if let Some(openings) = args.openings {
        config.match_.openings = Some(openings);
    }
    if let Some(plies) = args.plies {
        config.match_.opening_plies = plies;
    }
    if args.elo.is_some() {
        config.opponent.elo = args.elo;
    }
    let report_path = args.report.or(config.report.clone());

    let openings = match &config.match_.openings {
        Some(path) => load_openings(path, config.match_.opening_plies)?,
        None => vec![Game::new(Board::default())],
    };

    let mut opponent: Box<dyn Opponent> = match config.opponent.kind {
        OpponentKind::Random => Box::new(RandomOpponent::new(config.opponent.seed)),
        OpponentKind::Uci => {
            let options = config
                .opponent
                .uci_options()
                .context("opponent program missing")?;
            Box::new(UciOpponent::start(options)?)
        }
        OpponentKind::Engine => {
            let options = config
                .opponent
                .engine_options(&config.engine)
                .context("opponent program missing")?;
            Box::new(EngineOpponent::new(EngineHandle::start(options)?))
        }
    };

    let mut engine = EngineHandle::start(config.engine.options())?;
    let runner = MatchRunner::new(config.match_.config(config.opponent.elo));
    let report = runner.run_match(&mut engine, opponent.as_mut(), &openings)?;
    engine.close();

    report.print_report();
    save_report(report_path.as_deref(), |path| report.save(path))?;
    Ok(ExitCode::SUCCESS)
}

fn save_report(
    path: Option<&Path>,
    save: impl FnOnce(&Path) -> Result<(), HarnessError>,
) -> Result<()> {
    if let Some(path) = path {
        save(path)?;
        info!("report written to {}", path.display());
    }
    Ok(())
}
