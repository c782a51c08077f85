//! Runs an ordered list of test cases against one engine.

use std::collections::HashSet;

use tracing::{error, info};

use crate::adapter::Engine;
use crate::error::{EngineError, HarnessError};
use crate::report::{RunReport, TestDetail, TestResult, TestStatus};

/// Why a test case did not pass.
#[derive(Debug)]
pub enum TestFailure {
    /// An assertion failed. Recorded against the test; the run continues.
    Failed {
        message: String,
        detail: Option<TestDetail>,
    },
    /// The engine session died. Ends the run.
    Fatal(EngineError),
}

impl TestFailure {
    pub fn failed(message: impl Into<String>) -> Self {
        TestFailure::Failed {
            message: message.into(),
            detail: None,
        }
    }

    /// Classify an engine error, attaching `detail` when the run can go on.
    pub fn from_engine(err: EngineError, detail: TestDetail) -> Self {
        if err.is_fatal() {
            TestFailure::Fatal(err)
        } else {
            TestFailure::Failed {
                message: err.to_string(),
                detail: Some(detail),
            }
        }
    }
}

impl From<EngineError> for TestFailure {
    fn from(err: EngineError) -> Self {
        if err.is_fatal() {
            TestFailure::Fatal(err)
        } else {
            TestFailure::failed(err.to_string())
        }
    }
}

/// A named unit of verification.
pub trait TestCase {
    fn name(&self) -> &str;

    /// Load fixtures. Called once, right before `run`.
    fn configure(&mut self) -> Result<(), HarnessError> {
        Ok(())
    }

    fn run(&mut self, engine: &mut dyn Engine) -> Result<TestDetail, TestFailure>;
}

pub struct Orchestrator {
    tests: Vec<Box<dyn TestCase>>,
}

impl Orchestrator {
    pub fn new(tests: Vec<Box<dyn TestCase>>) -> Result<Self, HarnessError> {
        let mut names = HashSet::new();
        for test in &tests {
            if !names.insert(test.name().to_string()) {
                return Err(HarnessError::DuplicateTest(test.name().to_string()));
            }
        }
        Ok(Self { tests })
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Run every test in order, restarting the engine between tests.
    ///
    /// Failed assertions are recorded and the next test runs. A fatal engine
    /// error stops the run and is returned with the results gathered so far.
    pub fn run(&mut self, engine: &mut dyn Engine) -> Result<RunReport, HarnessError> {
        let mut report = RunReport::new(engine.name());
        info!("TESTING '{}'...", engine.name());

        for (i, test) in self.tests.iter_mut().enumerate() {
            let name = test.name().to_string();
            if i > 0 {
                if let Err(source) = engine.restart() {
                    return Err(abort(report, &name, source));
                }
            }

            info!("PREPARING {name}...");
            if let Err(e) = test.configure() {
                error!("TEST {name} FAILED: {e}");
                report.record(TestResult {
                    name,
                    status: TestStatus::Failed,
                    message: Some(e.to_string()),
                    detail: None,
                });
                continue;
            }

            info!("RUNNING {name}...");
            match test.run(engine) {
                Ok(detail) => {
                    info!("TEST {name} SUCCESS");
                    report.record(TestResult {
                        name,
                        status: TestStatus::Passed,
                        message: None,
                        detail: Some(detail),
                    });
                }
                Err(TestFailure::Failed { message, detail }) => {
                    error!("TEST {name} FAILED: {message}");
                    report.record(TestResult {
                        name,
                        status: TestStatus::Failed,
                        message: Some(message),
                        detail,
                    });
                }
                Err(TestFailure::Fatal(source)) => return Err(abort(report, &name, source)),
            }
        }

        info!("TESTING DONE");
        if report.all_passed() {
            info!("All tests succeeded.");
        } else {
            info!("{} tests failed.", report.failed);
        }
        Ok(report)
    }
}

fn abort(mut report: RunReport, name: &str, source: EngineError) -> HarnessError {
    error!("TEST {name} FAILED: {source}");
    report.record(TestResult {
        name: name.to_string(),
        status: TestStatus::Failed,
        message: Some(source.to_string()),
        detail: None,
    });
    HarnessError::Aborted {
        report: Box::new(report),
        source,
    }
}
