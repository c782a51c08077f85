//! Harness configuration, read from a TOML file.
//!
//! ```toml
//! report = "results.json"
//!
//! [engine]
//! program = "./clce"
//! think_time_ms = 1000
//!
//! [perft]
//! epd = "tests/standard.epd"
//! node_limit = 5000000
//! quiet_depth = 3
//!
//! [puzzles]
//! database = "db/lichess_db_puzzle.csv"
//! count = 10
//!
//! [match]
//! openings = "openings.txt"
//! opening_plies = 20
//!
//! [opponent]
//! kind = "uci"
//! program = "stockfish"
//! elo = 1500
//! ```
//!
//! Every field has a default, so an empty file is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use chess_reference::{MoveFilter, QuietRule};

use crate::adapter::EngineOptions;
use crate::error::HarnessError;
use crate::match_runner::MatchConfig;
use crate::opponent::UciOptions;
use crate::suites::{PerftSource, PerftSuite, PuzzleSuite};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    pub engine: EngineSection,
    pub perft: PerftSection,
    pub puzzles: PuzzleSection,
    #[serde(rename = "match")]
    pub match_: MatchSection,
    pub opponent: OpponentSection,
    /// Where to write the JSON report
    pub report: Option<PathBuf>,
}

impl HarnessConfig {
    pub fn load(path: &Path) -> Result<Self, HarnessError> {
        let text = std::fs::read_to_string(path).map_err(|source| HarnessError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, HarnessError> {
        let config: Self = toml::from_str(text).map_err(|e| HarnessError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), HarnessError> {
        if self.engine.program.trim().is_empty() {
            return Err(HarnessError::Config("engine.program is empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.puzzles.min_success_rate) {
            return Err(HarnessError::Config(
                "puzzles.min_success_rate must be between 0 and 1".to_string(),
            ));
        }
        if self.opponent.kind != OpponentKind::Random && self.opponent.program.is_none() {
            return Err(HarnessError::Config(format!(
                "opponent.program is required for kind {:?}",
                self.opponent.kind
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSection {
    pub program: String,
    pub args: Vec<String>,
    pub verbose: bool,
    pub think_time_ms: u64,
    pub handshake_timeout_ms: u64,
    pub reply_grace_ms: u64,
    pub perft_timeout_ms: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            program: "./clce".to_string(),
            args: Vec::new(),
            verbose: false,
            think_time_ms: 4_000,
            handshake_timeout_ms: 2_000,
            reply_grace_ms: 2_000,
            perft_timeout_ms: 60_000,
        }
    }
}

impl EngineSection {
    pub fn options(&self) -> EngineOptions {
        EngineOptions {
            program: self.program.clone(),
            args: self.args.clone(),
            verbose: self.verbose,
            think_time: Duration::from_millis(self.think_time_ms),
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            reply_grace: Duration::from_millis(self.reply_grace_ms),
            perft_timeout: Duration::from_millis(self.perft_timeout_ms),
        }
    }
}

/// Which moves a quiet perft leaves out.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuietSection {
    pub exclude_captures: bool,
    pub exclude_promotions: bool,
    pub king_exempt: bool,
}

impl Default for QuietSection {
    fn default() -> Self {
        let rule = QuietRule::default();
        Self {
            exclude_captures: rule.exclude_captures,
            exclude_promotions: rule.exclude_promotions,
            king_exempt: rule.king_exempt,
        }
    }
}

impl QuietSection {
    pub fn filter(&self) -> MoveFilter {
        MoveFilter::Quiet(QuietRule {
            exclude_captures: self.exclude_captures,
            exclude_promotions: self.exclude_promotions,
            king_exempt: self.king_exempt,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PerftSection {
    pub enabled: bool,
    /// EPD fixture file; the built-in positions are used when absent
    pub epd: Option<PathBuf>,
    pub node_limit: u64,
    pub quiet_depth: Option<u8>,
    pub quiet: QuietSection,
    pub bisect: bool,
}

impl Default for PerftSection {
    fn default() -> Self {
        Self {
            enabled: true,
            epd: None,
            node_limit: 10_000_000,
            quiet_depth: None,
            quiet: QuietSection::default(),
            bisect: true,
        }
    }
}

impl PerftSection {
    pub fn suite(&self) -> PerftSuite {
        let source = match &self.epd {
            Some(path) => PerftSource::Epd {
                path: path.clone(),
                node_limit: self.node_limit,
            },
            None => PerftSource::Builtin,
        };
        let suite = PerftSuite::new(source).bisect_on_failure(self.bisect);
        match self.quiet_depth {
            Some(depth) => suite.with_quiet_checks(depth, self.quiet.filter()),
            None => suite,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PuzzleSection {
    /// Puzzle CSV; the puzzle suite is skipped when absent
    pub database: Option<PathBuf>,
    pub count: usize,
    pub think_time_ms: Option<u64>,
    pub restart_each: bool,
    pub min_success_rate: f64,
}

impl Default for PuzzleSection {
    fn default() -> Self {
        Self {
            database: None,
            count: 10,
            think_time_ms: None,
            restart_each: false,
            min_success_rate: 0.0,
        }
    }
}

impl PuzzleSection {
    pub fn suite(&self) -> Option<PuzzleSuite> {
        let database = self.database.as_ref()?;
        let mut suite = PuzzleSuite::new(database.clone(), self.count)
            .restart_each(self.restart_each)
            .min_success_rate(self.min_success_rate);
        if let Some(ms) = self.think_time_ms {
            suite = suite.think_time(Duration::from_millis(ms));
        }
        Some(suite)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatchSection {
    /// One opening per line; the start position alone when absent
    pub openings: Option<PathBuf>,
    pub opening_plies: usize,
    pub max_plies: u32,
    pub think_time_ms: Option<u64>,
    pub shuffle_seed: Option<u64>,
}

impl Default for MatchSection {
    fn default() -> Self {
        Self {
            openings: None,
            opening_plies: 20,
            max_plies: 400,
            think_time_ms: None,
            shuffle_seed: None,
        }
    }
}

impl MatchSection {
    pub fn config(&self, opponent_elo: Option<u32>) -> MatchConfig {
        MatchConfig {
            think_time: self.think_time_ms.map(Duration::from_millis),
            max_plies: self.max_plies,
            opponent_elo,
            shuffle_seed: self.shuffle_seed,
            verbose: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpponentKind {
    /// An external UCI engine
    Uci,
    #[default]
    Random,
    /// Another build speaking the harness line protocol
    Engine,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OpponentSection {
    pub kind: OpponentKind,
    pub program: Option<String>,
    pub args: Vec<String>,
    pub think_time_ms: Option<u64>,
    pub elo: Option<u32>,
    /// Seed for the random opponent
    pub seed: Option<u64>,
}

impl OpponentSection {
    pub fn uci_options(&self) -> Option<UciOptions> {
        let mut options = UciOptions::new(self.program.clone()?);
        options.args = self.args.clone();
        if let Some(ms) = self.think_time_ms {
            options.think_time = Duration::from_millis(ms);
        }
        Some(options)
    }

    /// Options for a line-protocol opponent, inheriting timeouts from `engine`.
    pub fn engine_options(&self, engine: &EngineSection) -> Option<EngineOptions> {
        let mut options = engine.options();
        options.program = self.program.clone()?;
        options.args = self.args.clone();
        if let Some(ms) = self.think_time_ms {
            options.think_time = Duration::from_millis(ms);
        }
        Some(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = HarnessConfig::parse("").unwrap();
        assert_eq!(config.engine.program, "./clce");
        assert!(config.perft.enabled);
        assert!(config.puzzles.suite().is_none());
        assert_eq!(config.match_.opening_plies, 20);
        assert_eq!(config.opponent.kind, OpponentKind::Random);

        let options = config.engine.options();
        assert_eq!(options.handshake_timeout, Duration::from_secs(2));
        assert_eq!(options.perft_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_full_config() {
        let config = HarnessConfig::parse(
            r#"
            report = "out.json"

            [engine]
            program = "./build/clce"
            args = ["--hash", "16"]
            think_time_ms = 250

            [perft]
            epd = "positions.epd"
            quiet_depth = 2
            [perft.quiet]
            king_exempt = false

            [puzzles]
            database = "puzzles.csv"
            count = 50
            restart_each = true

            [match]
            max_plies = 200
            think_time_ms = 100

            [opponent]
            kind = "uci"
            program = "stockfish"
            elo = 1400
            "#,
        )
        .unwrap();

        assert_eq!(config.report, Some(PathBuf::from("out.json")));
        assert_eq!(config.engine.options().think_time, Duration::from_millis(250));
        assert_eq!(config.engine.args, vec!["--hash", "16"]);
        assert_eq!(
            config.perft.quiet.filter(),
            MoveFilter::Quiet(QuietRule {
                king_exempt: false,
                ..QuietRule::default()
            })
        );
        assert!(config.puzzles.suite().is_some());
        let match_config = config.match_.config(config.opponent.elo);
        assert_eq!(match_config.max_plies, 200);
        assert_eq!(match_config.opponent_elo, Some(1400));
        assert_eq!(config.opponent.uci_options().unwrap().program, "stockfish");
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(HarnessConfig::parse("[engine]\nprogram = \"\"").is_err());
        assert!(HarnessConfig::parse("[puzzles]\nmin_success_rate = 2.0").is_err());
        assert!(HarnessConfig::parse("[opponent]\nkind = \"uci\"").is_err());
        assert!(HarnessConfig::parse("[engine]\nprogramme = \"x\"").is_err());
    }
}
