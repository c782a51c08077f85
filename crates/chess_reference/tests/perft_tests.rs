use std::time::Instant;

use rayon::prelude::*;

use chess_reference::{divide, parse_fen, perft, MoveFilter};

const FULL_PERFT_ENV: &str = "FULL_PERFT";
const NODE_LIMIT: u64 = 1_000_000;

fn parse_epd_line(line: &str) -> Option<(String, Vec<(u8, u64)>)> {
    let mut parts = line.split(';');
    let fen = parts.next()?.trim();
    if fen.is_empty() {
        return None;
    }

    let mut depths = Vec::new();
    for part in parts {
        let mut items = part.split_whitespace();
        let key = items.next().unwrap_or("");
        let val = items.next().unwrap_or("");
        if !key.starts_with('D') {
            continue;
        }
        let depth: u8 = key[1..]
            .parse()
            .unwrap_or_else(|_| panic!("Invalid depth token in EPD: {}", key));
        let expected: u64 = val
            .parse()
            .unwrap_or_else(|_| panic!("Invalid node count in EPD: {}", val));
        depths.push((depth, expected));
    }
    if depths.is_empty() {
        return None;
    }
    depths.sort_by_key(|(d, _)| *d);
    Some((fen.to_string(), depths))
}

fn cases() -> Vec<(usize, String, Vec<(u8, u64)>)> {
    include_str!("standard.epd")
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| parse_epd_line(line.trim()).map(|(fen, d)| (idx, fen, d)))
        .collect()
}

#[test]
fn perft_from_standard_epd() {
    let full = std::env::var(FULL_PERFT_ENV).is_ok();

    cases().par_iter().for_each(|(idx, fen, depths)| {
        let board = parse_fen(fen).unwrap();
        let case_start = Instant::now();
        let mut ran_depths = Vec::new();

        for (depth, expected) in depths {
            if !full && *expected > NODE_LIMIT {
                continue;
            }
            let got = perft(&board, *depth, &MoveFilter::All);
            assert!(
                got == *expected,
                "Perft mismatch for FEN '{}' at depth {}: expected {}, got {}",
                fen,
                depth,
                expected,
                got
            );
            ran_depths.push(*depth);
        }

        println!(
            "Case {:03} done: depths {:?}, elapsed {:.3?}",
            idx + 1,
            ran_depths,
            case_start.elapsed()
        );
    });
}

#[test]
fn quiet_divide_matches_quiet_perft() {
    for (_, fen, _) in cases() {
        let board = parse_fen(&fen).unwrap();
        let filter = MoveFilter::quiet();
        let split = divide(&board, 2, &filter);
        let total: u64 = split.iter().map(|(_, n)| n).sum();
        assert_eq!(total, perft(&board, 2, &filter), "{fen}");
        assert!(total <= perft(&board, 2, &MoveFilter::All), "{fen}");
    }
}
