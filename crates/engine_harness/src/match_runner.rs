//! Match runner for playing games between the engine and an opponent

use std::path::Path;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use chess_reference::{
    color_name, fen, move_to_uci, parse_fen, Board, Color, Game, Outcome, Termination,
};

use crate::adapter::Engine;
use crate::error::{EngineError, HarnessError};
use crate::opponent::Opponent;

/// Configuration for a match
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Thinking time per engine move (None = engine default)
    pub think_time: Option<Duration>,
    /// Plies per game before it is aborted
    pub max_plies: u32,
    /// Opponent strength limit, sent once before the first game
    pub opponent_elo: Option<u32>,
    /// Shuffle the openings with this seed
    pub shuffle_seed: Option<u64>,
    /// Log every finished game
    pub verbose: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            think_time: None,
            max_plies: 400,
            opponent_elo: None,
            shuffle_seed: None,
            verbose: true,
        }
    }
}

/// Result of a single game from the engine's perspective
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameResult {
    Win,
    Loss,
    Draw,
    Aborted,
}

/// How a game ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameEnd {
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    SeventyFiveMoves,
    FivefoldRepetition,
    /// The side to move sent an illegal or unreadable move and forfeits
    Forfeit,
    /// The ply limit was reached
    PlyLimit,
}

impl From<Termination> for GameEnd {
    fn from(termination: Termination) -> Self {
        match termination {
            Termination::Checkmate => GameEnd::Checkmate,
            Termination::Stalemate => GameEnd::Stalemate,
            Termination::InsufficientMaterial => GameEnd::InsufficientMaterial,
            Termination::SeventyFiveMoves => GameEnd::SeventyFiveMoves,
            Termination::FivefoldRepetition => GameEnd::FivefoldRepetition,
        }
    }
}

/// One finished game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameRecord {
    /// Index into the opening list
    pub opening: usize,
    pub engine_color: String,
    pub start_fen: String,
    /// Moves played after the opening, in UCI notation
    pub moves: Vec<String>,
    pub winner: Option<String>,
    pub end: GameEnd,
    pub result: GameResult,
}

/// Result of a match (multiple games)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchResult {
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub aborted: u32,
}

impl MatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, result: GameResult) {
        match result {
            GameResult::Win => self.wins += 1,
            GameResult::Loss => self.losses += 1,
            GameResult::Draw => self.draws += 1,
            GameResult::Aborted => self.aborted += 1,
        }
    }

    /// Games that reached a result
    pub fn total_games(&self) -> u32 {
        self.wins + self.losses + self.draws
    }

    /// Score from the engine's perspective (1 for win, 0.5 for draw, 0 for loss)
    pub fn score(&self) -> f64 {
        let total = self.total_games() as f64;
        if total == 0.0 {
            return 0.5;
        }
        (self.wins as f64 + 0.5 * self.draws as f64) / total
    }
}

/// Complete match results
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchReport {
    pub engine: String,
    pub opponent: String,
    pub result: MatchResult,
    pub games: Vec<GameRecord>,
}

impl MatchReport {
    /// Save results to JSON file
    pub fn save(&self, path: &Path) -> Result<(), HarnessError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| HarnessError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Generate a text report
    pub fn generate_report(&self) -> String {
        let mut report = String::new();
        report.push_str(&format!("=== Match: {} vs {} ===\n\n", self.engine, self.opponent));
        report.push_str(&format!(
            "{:<8} {:<6} {:<8} {:<22} {:>6}\n",
            "Opening", "Color", "Result", "End", "Plies"
        ));
        report.push_str(&"-".repeat(54));
        report.push('\n');

        for game in &self.games {
            report.push_str(&format!(
                "{:<8} {:<6} {:<8} {:<22} {:>6}\n",
                game.opening + 1,
                game.engine_color,
                format!("{:?}", game.result).to_lowercase(),
                format!("{:?}", game.end),
                game.moves.len()
            ));
        }

        report.push('\n');
        report.push_str(&format!(
            "wins {}\ndraws {}\nlosses {}\n",
            self.result.wins, self.result.draws, self.result.losses
        ));
        if self.result.aborted > 0 {
            report.push_str(&format!("aborted {}\n", self.result.aborted));
        }
        report.push_str(&format!("Score: {:.1}%\n", self.result.score() * 100.0));
        report
    }

    /// Print report to stdout
    pub fn print_report(&self) {
        println!("{}", self.generate_report());
    }
}

/// Parse an openings list. Each non-empty line is either a space separated
/// UCI move sequence from the start position, of which the first `plies`
/// moves are played, or `fen <FEN>`.
pub fn parse_openings(text: &str, plies: usize) -> Result<Vec<Game>, (usize, String)> {
    let mut openings = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let game = match line.strip_prefix("fen ") {
            Some(fen_text) => parse_fen(fen_text).map(Game::new),
            None => {
                let moves: Vec<&str> = line.split_whitespace().collect();
                Game::from_uci_moves(Board::default(), &moves, plies)
            }
        };
        openings.push(game.map_err(|e| (idx + 1, e.to_string()))?);
    }
    Ok(openings)
}

pub fn load_openings(path: &Path, plies: usize) -> Result<Vec<Game>, HarnessError> {
    let text = std::fs::read_to_string(path).map_err(|source| HarnessError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_openings(&text, plies).map_err(|(line, reason)| HarnessError::Fixture {
        path: path.to_path_buf(),
        line,
        reason,
    })
}

/// Runs matches between an engine and an opponent
pub struct MatchRunner {
    config: MatchConfig,
}

impl MatchRunner {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    /// Play every opening twice, the engine taking white and then black.
    ///
    /// Both sides are reset before each game. A fatal engine error ends the
    /// match.
    pub fn run_match(
        &self,
        engine: &mut dyn Engine,
        opponent: &mut dyn Opponent,
        openings: &[Game],
    ) -> Result<MatchReport, EngineError> {
        let mut order: Vec<usize> = (0..openings.len()).collect();
        if let Some(seed) = self.config.shuffle_seed {
            order.shuffle(&mut StdRng::seed_from_u64(seed));
        }
        if let Some(elo) = self.config.opponent_elo {
            opponent.set_strength(elo)?;
        }

        let mut report = MatchReport {
            engine: engine.name().to_string(),
            opponent: opponent.name().to_string(),
            result: MatchResult::new(),
            games: Vec::new(),
        };
        let total = openings.len() * 2;

        for (n, &index) in order.iter().enumerate() {
            info!("opening {}/{}", n + 1, openings.len());
            for engine_color in [Color::White, Color::Black] {
                engine.restart()?;
                opponent.new_game()?;
                let record = self.play_game(engine, opponent, &openings[index], index, engine_color)?;
                report.result.add(record.result);

                if self.config.verbose {
                    info!(
                        "Game {}/{}: {:?} as {} ({:?}) - Score: {}-{}-{}",
                        report.games.len() + 1,
                        total,
                        record.result,
                        record.engine_color,
                        record.end,
                        report.result.wins,
                        report.result.losses,
                        report.result.draws
                    );
                }
                report.games.push(record);
            }
        }

        Ok(report)
    }

    /// Play one game from `opening` to its end.
    fn play_game(
        &self,
        engine: &mut dyn Engine,
        opponent: &mut dyn Opponent,
        opening: &Game,
        index: usize,
        engine_color: Color,
    ) -> Result<GameRecord, EngineError> {
        let mut game = opening.clone();
        let mut played: Vec<String> = Vec::new();

        let (winner, end) = loop {
            if let Some(Outcome {
                winner,
                termination,
            }) = game.outcome()
            {
                break (winner, GameEnd::from(termination));
            }
            if played.len() as u32 >= self.config.max_plies {
                break (None, GameEnd::PlyLimit);
            }

            let mover = game.side_to_move();
            let mv = if mover == engine_color {
                engine.best_move(game.board(), self.config.think_time)
            } else {
                opponent
                    .set_position(&game)
                    .and_then(|_| opponent.best_move())
            };
            let mv = match mv {
                Ok(mv) => mv,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("{} forfeits: {e}", color_name(mover));
                    break (Some(!mover), GameEnd::Forfeit);
                }
            };

            let text = move_to_uci(game.board(), mv);
            if let Err(e) = game.play(mv) {
                warn!("{} forfeits: {e}", color_name(mover));
                played.push(text);
                break (Some(!mover), GameEnd::Forfeit);
            }
            played.push(text);
        };

        let result = match (end, winner) {
            (GameEnd::PlyLimit, _) => GameResult::Aborted,
            (_, None) => GameResult::Draw,
            (_, Some(color)) if color == engine_color => GameResult::Win,
            (_, Some(_)) => GameResult::Loss,
        };
        Ok(GameRecord {
            opening: index,
            engine_color: color_name(engine_color).to_string(),
            start_fen: fen(opening.board()),
            moves: played,
            winner: winner.map(|c| color_name(c).to_string()),
            end,
            result,
        })
    }
}
