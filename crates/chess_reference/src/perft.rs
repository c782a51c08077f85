use cozy_chess::{Board, Move};

use crate::filter::MoveFilter;

/// Reference perft node count.
/// Counts the leaf positions reachable from `board` in exactly `depth`
/// plies, applying `filter` at every ply.
pub fn perft(board: &Board, depth: u8, filter: &MoveFilter) -> u64 {
    if depth == 0 {
        return 1;
    }

    let mut nodes = 0u64;
    board.generate_moves(|piece_moves| {
        let piece = piece_moves.piece;
        // Bulk count the last ply when nothing is filtered out
        if depth == 1 && *filter == MoveFilter::All {
            nodes += piece_moves.len() as u64;
            return false;
        }
        for mv in piece_moves {
            if !filter.admits(board, piece, mv) {
                continue;
            }
            if depth == 1 {
                nodes += 1;
            } else {
                let mut child = board.clone();
                child.play_unchecked(mv);
                nodes += perft(&child, depth - 1, filter);
            }
        }
        false
    });
    nodes
}

/// Split perft: the subtree count below every admitted root move, in
/// generator order.
pub fn divide(board: &Board, depth: u8, filter: &MoveFilter) -> Vec<(Move, u64)> {
    if depth == 0 {
        return Vec::new();
    }

    crate::filter::legal_moves(board, filter)
        .into_iter()
        .map(|mv| {
            let mut child = board.clone();
            child.play_unchecked(mv);
            (mv, perft(&child, depth - 1, filter))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notation::parse_fen;

    #[test]
    fn test_startpos_counts() {
        let board = Board::default();
        assert_eq!(perft(&board, 0, &MoveFilter::All), 1);
        assert_eq!(perft(&board, 1, &MoveFilter::All), 20);
        assert_eq!(perft(&board, 2, &MoveFilter::All), 400);
        assert_eq!(perft(&board, 3, &MoveFilter::All), 8902);
    }

    #[test]
    fn test_divide_sums_to_perft() {
        let board =
            parse_fen("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1")
                .unwrap();
        for filter in [MoveFilter::All, MoveFilter::quiet()] {
            let split = divide(&board, 2, &filter);
            let total: u64 = split.iter().map(|(_, n)| n).sum();
            assert_eq!(total, perft(&board, 2, &filter));
        }
        assert_eq!(perft(&board, 2, &MoveFilter::All), 2039);
    }

    #[test]
    fn test_quiet_perft_is_a_subset() {
        let board = parse_fen("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1").unwrap();
        let all = perft(&board, 3, &MoveFilter::All);
        let quiet = perft(&board, 3, &MoveFilter::quiet());
        assert_eq!(all, 2812);
        assert!(quiet < all);
    }

    #[test]
    fn test_no_moves_gives_empty_divide() {
        // fool's mate, white to move and mated
        let board =
            parse_fen("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3").unwrap();
        assert!(divide(&board, 3, &MoveFilter::All).is_empty());
        assert_eq!(perft(&board, 3, &MoveFilter::All), 0);
    }
}
