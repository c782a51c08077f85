//! Test run results storage and reporting

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::bisect::{BisectReport, Divergence};
use crate::error::HarnessError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
}

/// Outcome of one perft fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerftItem {
    pub fen: String,
    pub depth: u8,
    pub quiet: bool,
    pub expected: u64,
    /// Sum of the engine's per-move counts, if it answered
    pub reported: Option<u64>,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub bisect: Option<BisectReport>,
}

/// Outcome of one puzzle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PuzzleItem {
    pub id: String,
    pub rating: u32,
    /// Position after the forced first move
    pub fen: String,
    pub expected: String,
    pub suggested: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

/// Per-item detail of a test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TestDetail {
    Perft {
        items: Vec<PerftItem>,
    },
    Puzzles {
        items: Vec<PuzzleItem>,
        solved: usize,
        mean_rating: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub status: TestStatus,
    pub message: Option<String>,
    pub detail: Option<TestDetail>,
}

impl TestResult {
    pub fn passed(&self) -> bool {
        self.status == TestStatus::Passed
    }
}

/// Results of one orchestrated run against one engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub engine: String,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<TestResult>,
}

impl RunReport {
    pub fn new(engine: &str) -> Self {
        Self {
            engine: engine.to_string(),
            passed: 0,
            failed: 0,
            results: Vec::new(),
        }
    }

    pub fn record(&mut self, result: TestResult) {
        if result.passed() {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(result);
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    pub fn result(&self, name: &str) -> Option<&TestResult> {
        self.results.iter().find(|r| r.name == name)
    }

    /// Save results to a JSON file
    pub fn save(&self, path: &Path) -> Result<(), HarnessError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| HarnessError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load results from a JSON file
    pub fn load(path: &Path) -> Result<Self, HarnessError> {
        let contents = std::fs::read_to_string(path).map_err(|source| HarnessError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Generate a text report
    pub fn generate_report(&self) -> String {
        let mut report = String::new();
        report.push_str(&format!("=== Tests: {} ===\n\n", self.engine));

        for result in &self.results {
            let status = match result.status {
                TestStatus::Passed => "PASS",
                TestStatus::Failed => "FAIL",
            };
            report.push_str(&format!("{:<12} {}\n", result.name, status));
            if let Some(message) = &result.message {
                report.push_str(&format!("    {message}\n"));
            }
            match &result.detail {
                Some(TestDetail::Perft { items }) => {
                    for item in items.iter().filter(|i| !i.passed) {
                        push_perft_failure(&mut report, item);
                    }
                }
                Some(TestDetail::Puzzles {
                    items,
                    solved,
                    mean_rating,
                }) => {
                    report.push_str(&format!("    Succeeded {}/{} puzzles", solved, items.len()));
                    if let Some(rating) = mean_rating {
                        report.push_str(&format!(", mean rating {rating:.0}"));
                    }
                    report.push('\n');
                }
                None => {}
            }
        }

        report.push('\n');
        if self.all_passed() {
            report.push_str("All tests succeeded.\n");
        } else {
            report.push_str(&format!("{} tests failed.\n", self.failed));
        }
        report
    }

    /// Print report to stdout
    pub fn print_report(&self) {
        println!("{}", self.generate_report());
    }
}

fn push_perft_failure(report: &mut String, item: &PerftItem) {
    let reported = item
        .reported
        .map_or_else(|| "no answer".to_string(), |n| n.to_string());
    report.push_str(&format!(
        "    {} depth {}{}: expected {}, got {}\n",
        item.fen,
        item.depth,
        if item.quiet { " (quiet)" } else { "" },
        item.expected,
        reported
    ));

    let Some(bisect) = &item.bisect else {
        return;
    };
    for divergence in &bisect.divergences {
        match divergence {
            Divergence::MoveSet {
                fen,
                depth,
                false_negatives,
                false_positives,
            } => {
                report.push_str(&format!("      position: {fen} (depth {depth})\n"));
                report.push_str(&format!("      false negative: {}\n", false_negatives.join(" ")));
                report.push_str(&format!("      false positive: {}\n", false_positives.join(" ")));
            }
            Divergence::Count {
                fen,
                depth,
                mv,
                expected,
                reported,
            } => {
                report.push_str(&format!(
                    "      count below {mv} in {fen} (depth {depth}): expected {expected}, got {reported}\n"
                ));
            }
        }
    }
}
