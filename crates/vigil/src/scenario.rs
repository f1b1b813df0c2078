//! Scenario harness.
//!
//! Every scenario gets its own session: opened before the body runs, closed
//! after it on every path, whether the body passed, returned an error, or
//! panicked.

use crate::clock::{SharedClock, SystemClock};
use crate::config::HarnessConfig;
use crate::driver::Launcher;
use crate::result::{FailureKind, VigilResult};
use crate::session::{panic_message, Session};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

type ScenarioBody = Arc<dyn Fn(&mut Session, &HarnessConfig) -> VigilResult<()> + Send + Sync>;

/// A named acceptance test
#[derive(Clone)]
pub struct Scenario {
    name: String,
    tags: Vec<String>,
    body: ScenarioBody,
}

impl std::fmt::Debug for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

impl Scenario {
    /// Create a scenario
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut Session, &HarnessConfig) -> VigilResult<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            tags: Vec::new(),
            body: Arc::new(body),
        }
    }

    /// Add a tag
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Scenario name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tags
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Name or any tag contains `filter`
    #[must_use]
    pub fn matches(&self, filter: &str) -> bool {
        self.name.contains(filter) || self.tags.iter().any(|t| t.contains(filter))
    }
}

/// Ordered collection of scenarios
#[derive(Debug, Clone)]
pub struct Suite {
    /// Suite name
    pub name: String,
    /// Scenarios in run order
    pub scenarios: Vec<Scenario>,
}

impl Suite {
    /// Create an empty suite
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scenarios: Vec::new(),
        }
    }

    /// Add a scenario
    pub fn add(&mut self, scenario: Scenario) {
        self.scenarios.push(scenario);
    }

    /// Builder form of [`Suite::add`]
    #[must_use]
    pub fn with_scenario(mut self, scenario: Scenario) -> Self {
        self.add(scenario);
        self
    }

    /// Scenarios whose name or tags contain `filter`
    #[must_use]
    pub fn filter(&self, filter: &str) -> Self {
        Self {
            name: self.name.clone(),
            scenarios: self
                .scenarios
                .iter()
                .filter(|s| s.matches(filter))
                .cloned()
                .collect(),
        }
    }

    /// Number of scenarios
    #[must_use]
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    /// Whether the suite is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

/// How a scenario ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScenarioOutcome {
    /// Body and teardown succeeded
    Passed,
    /// Setup, body, or teardown failed
    Failed {
        /// Classification
        kind: FailureKind,
        /// Rendered error
        message: String,
    },
}

/// Result of one scenario
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    /// Scenario name
    pub name: String,
    /// Outcome
    pub outcome: ScenarioOutcome,
    /// Time from session open to close
    pub duration_ms: u64,
    /// Session the scenario ran in, if one was opened
    pub session_id: Option<String>,
}

impl ScenarioReport {
    /// Whether the scenario passed
    #[must_use]
    pub fn passed(&self) -> bool {
        self.outcome == ScenarioOutcome::Passed
    }

    /// Failure kind, if failed
    #[must_use]
    pub const fn failure_kind(&self) -> Option<FailureKind> {
        match &self.outcome {
            ScenarioOutcome::Passed => None,
            ScenarioOutcome::Failed { kind, .. } => Some(*kind),
        }
    }
}

/// Results of a suite run
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    /// Suite name
    pub suite: String,
    /// Reports in run order
    pub reports: Vec<ScenarioReport>,
    /// Scenarios not run because of fail-fast
    pub skipped: usize,
    /// Total duration
    pub duration_ms: u64,
}

impl SuiteReport {
    /// Every scenario ran and passed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.skipped == 0 && self.reports.iter().all(ScenarioReport::passed)
    }

    /// Count passed scenarios
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.reports.iter().filter(|r| r.passed()).count()
    }

    /// Count failed scenarios
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.reports.len() - self.passed_count()
    }

    /// Failed scenario reports
    #[must_use]
    pub fn failures(&self) -> Vec<&ScenarioReport> {
        self.reports.iter().filter(|r| !r.passed()).collect()
    }

    /// Render as pretty JSON
    pub fn to_json(&self) -> VigilResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs scenarios, one fresh session each
pub struct ScenarioRunner<'a> {
    launcher: &'a dyn Launcher,
    config: HarnessConfig,
    clock: SharedClock,
    fail_fast: bool,
}

impl std::fmt::Debug for ScenarioRunner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioRunner")
            .field("config", &self.config)
            .field("fail_fast", &self.fail_fast)
            .finish_non_exhaustive()
    }
}

impl<'a> ScenarioRunner<'a> {
    /// Create a runner
    #[must_use]
    pub fn new(launcher: &'a dyn Launcher, config: HarnessConfig) -> Self {
        Self {
            launcher,
            config,
            clock: SystemClock::shared(),
            fail_fast: false,
        }
    }

    /// Stop the suite at the first failure
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Poll and time scenarios on `clock`
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Configuration handed to scenario bodies
    #[must_use]
    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run one scenario in its own session
    pub fn run(&self, scenario: &Scenario) -> ScenarioReport {
        let start = self.clock.now();
        let mut session =
            match Session::open_with_clock(self.launcher, &self.config, Arc::clone(&self.clock)) {
                Ok(session) => session,
                Err(e) => {
                    tracing::warn!(scenario = %scenario.name, error = %e, "session setup failed");
                    return ScenarioReport {
                        name: scenario.name.clone(),
                        outcome: ScenarioOutcome::Failed {
                            kind: e.kind(),
                            message: e.to_string(),
                        },
                        duration_ms: 0,
                        session_id: None,
                    };
                }
            };
        let session_id = session.id().to_string();
        tracing::info!(scenario = %scenario.name, session = %session_id, "scenario started");

        let body = panic::catch_unwind(AssertUnwindSafe(|| {
            (scenario.body)(&mut session, &self.config)
        }));
        let teardown = session.close();

        let outcome = match (body, teardown) {
            (Ok(Ok(())), Ok(())) => ScenarioOutcome::Passed,
            (Ok(Ok(())), Err(e)) => ScenarioOutcome::Failed {
                kind: FailureKind::Teardown,
                message: e.to_string(),
            },
            (Ok(Err(e)), _) => ScenarioOutcome::Failed {
                kind: e.kind(),
                message: e.to_string(),
            },
            (Err(payload), _) => ScenarioOutcome::Failed {
                kind: FailureKind::Panicked,
                message: panic_message(payload.as_ref()),
            },
        };

        let duration_ms = self.clock.now().saturating_sub(start).as_millis() as u64;
        match &outcome {
            ScenarioOutcome::Passed => {
                tracing::info!(scenario = %scenario.name, session = %session_id, duration_ms, "scenario passed");
            }
            ScenarioOutcome::Failed { kind, message } => {
                tracing::warn!(scenario = %scenario.name, session = %session_id, %kind, %message, "scenario failed");
            }
        }

        ScenarioReport {
            name: scenario.name.clone(),
            outcome,
            duration_ms,
            session_id: Some(session_id),
        }
    }

    /// Run every scenario in order
    pub fn run_suite(&self, suite: &Suite) -> SuiteReport {
        let start = self.clock.now();
        let mut reports = Vec::with_capacity(suite.len());
        for scenario in &suite.scenarios {
            let report = self.run(scenario);
            let failed = !report.passed();
            reports.push(report);
            if failed && self.fail_fast {
                break;
            }
        }
        SuiteReport {
            suite: suite.name.clone(),
            skipped: suite.len() - reports.len(),
            reports,
            duration_ms: self.clock.now().saturating_sub(start).as_millis() as u64,
        }
    }
}
