//! A scriptable engine for exercising the harness without a real engine.
//!
//! Answers the line protocol from the reference move generator. Flags make
//! it misbehave in the ways real engines do: hang, stay silent, crash, or
//! miscount.

use std::io::{self, BufRead, Write};
use std::process::exit;
use std::thread;
use std::time::Duration;

use clap::Parser;

use chess_reference::{
    divide, is_checkmate, legal_moves, move_to_uci, parse_fen, Board, Game, Move, MoveFilter,
};
use engine_harness::{PerftReport, Request};

#[derive(Parser, Debug)]
#[command(name = "stub_engine", about = "Reference-backed engine for harness tests")]
struct Args {
    /// Never answer a request; log it to stderr instead
    #[arg(long)]
    hang: bool,

    /// Never print the ready line
    #[arg(long)]
    mute: bool,

    /// Lines to print before the ready line
    #[arg(long, default_value_t = 0)]
    chatter: usize,

    /// Print output forever without ever becoming ready
    #[arg(long)]
    babble: bool,

    /// Corrupt the first reply with bytes that are not UTF-8
    #[arg(long)]
    garble_first: bool,

    /// Crash on the first request
    #[arg(long)]
    exit_on_request: bool,

    /// Leave this move out of every perft reply
    #[arg(long)]
    drop_move: Option<String>,

    /// Speak UCI instead of the line protocol
    #[arg(long)]
    uci: bool,
}

fn main() {
    let args = Args::parse();
    if args.uci {
        uci_loop();
        return;
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for n in 0..args.chatter {
        writeln!(stdout, "info stub warming up {n}").ok();
    }
    if args.babble {
        for n in 0u64.. {
            writeln!(stdout, "info still loading {n}").ok();
            stdout.flush().ok();
            thread::sleep(Duration::from_millis(50));
        }
    }
    if !args.mute {
        writeln!(stdout, "READY").ok();
        stdout.flush().ok();
    }

    let mut garble = args.garble_first;
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        if garble {
            garble = false;
            stdout.write_all(b"e2\xffe4\n").ok();
            stdout.flush().ok();
            continue;
        }
        if args.hang {
            eprintln!("stuck on {line}");
            continue;
        }
        if args.exit_on_request {
            eprintln!("segmentation fault while handling {line}");
            exit(3);
        }

        let reply = match Request::parse(&line).and_then(|request| answer(&request, &args)) {
            Some(reply) => reply,
            None => {
                eprintln!("Invalid command. Exiting...");
                exit(1);
            }
        };
        writeln!(stdout, "{reply}").ok();
        stdout.flush().ok();
    }
}

fn answer(request: &Request, args: &Args) -> Option<String> {
    match request {
        Request::Go { fen, .. } => {
            let board = parse_fen(fen).ok()?;
            Some(pick_move(&board).map_or_else(|| "0000".to_string(), |mv| move_to_uci(&board, mv)))
        }
        Request::Perft { fen, depth, flag } => {
            let board = parse_fen(fen).ok()?;
            let filter = match flag {
                '_' => MoveFilter::All,
                'q' => MoveFilter::quiet(),
                _ => return None,
            };
            let mut counts = divide(&board, *depth, &filter);
            if let Some(dropped) = &args.drop_move {
                counts.retain(|&(mv, _)| move_to_uci(&board, mv) != *dropped);
            }
            Some(PerftReport::new(counts).to_line(&board))
        }
    }
}

/// A mating move when there is one, else the first legal move.
fn pick_move(board: &Board) -> Option<Move> {
    let moves = legal_moves(board, &MoveFilter::All);
    let mate = moves.iter().copied().find(|&mv| {
        let mut next = board.clone();
        next.play_unchecked(mv);
        is_checkmate(&next)
    });
    mate.or_else(|| moves.first().copied())
}

fn uci_loop() {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut game = Game::new(Board::default());

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        match parts[0] {
            "uci" => {
                writeln!(stdout, "id name stub_engine").ok();
                writeln!(stdout, "option name UCI_Elo type spin default 1500 min 100 max 3000").ok();
                writeln!(stdout, "uciok").ok();
            }
            "isready" => {
                writeln!(stdout, "readyok").ok();
            }
            "ucinewgame" => {
                game = Game::new(Board::default());
            }
            "position" => match set_position(&parts[1..]) {
                Some(next) => game = next,
                None => eprintln!("bad position: {line}"),
            },
            "go" => match pick_move(game.board()) {
                Some(mv) => {
                    writeln!(stdout, "info depth 1 score cp 0").ok();
                    writeln!(stdout, "bestmove {}", move_to_uci(game.board(), mv)).ok();
                }
                None => {
                    writeln!(stdout, "bestmove 0000").ok();
                }
            },
            "quit" => break,
            _ => {}
        }
        stdout.flush().ok();
    }
}

/// `startpos [moves ...]` or `fen <fen> [moves ...]`
fn set_position(args: &[&str]) -> Option<Game> {
    let split = args.iter().position(|&a| a == "moves").unwrap_or(args.len());
    let (setup, moves) = args.split_at(split);
    let start = match setup.split_first()? {
        (&"startpos", _) => Board::default(),
        (&"fen", fields) => parse_fen(&fields.join(" ")).ok()?,
        _ => return None,
    };
    let moves = moves.get(1..).unwrap_or_default();
    Game::from_uci_moves(start, moves, moves.len()).ok()
}
