//! Reusable multi-step interactions.
//!
//! A [`Flow`] is a named, ordered list of steps. Each step performs an action,
//! waits for a condition, or both; a step's wait gates the next step's action.
//! Flows hold no per-run state, so one definition can be run by any number of
//! sessions with different [`FlowParams`].
//!
//! ```
//! use std::time::Duration;
//! use vigil::{Condition, Flow, Locator, Text};
//!
//! let login = Flow::new("login")
//!     .navigate("/login")
//!     .type_text(Locator::css("input[type='email']"), Text::param("email"))
//!     .type_text(Locator::css("input[type='password']"), Text::param("password"))
//!     .click(Locator::css("button[type='submit']"))
//!     .then_within(Condition::url_contains("/dashboard"), Duration::from_secs(20));
//!
//! assert_eq!(login.len(), 4);
//! assert_eq!(login.required_params(), vec!["email", "password"]);
//! ```

use crate::condition::Condition;
use crate::locator::Locator;
use crate::poll::{PollOptions, PollStatus, StateSnapshot};
use crate::result::{FailureKind, VigilError, VigilResult};
use crate::session::Session;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Text to type: fixed, or looked up in the run's parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Text {
    /// Literal text
    Literal(String),
    /// Named parameter
    Param(String),
}

impl Text {
    /// Literal text
    #[must_use]
    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }

    /// Parameter reference
    #[must_use]
    pub fn param(name: impl Into<String>) -> Self {
        Self::Param(name.into())
    }

    fn resolve<'a>(&'a self, flow: &str, params: &'a FlowParams) -> VigilResult<&'a str> {
        match self {
            Self::Literal(text) => Ok(text.as_str()),
            Self::Param(name) => params.get(name).ok_or_else(|| VigilError::MissingParam {
                flow: flow.to_string(),
                name: name.clone(),
            }),
        }
    }
}

impl From<&str> for Text {
    fn from(text: &str) -> Self {
        Self::literal(text)
    }
}

impl From<String> for Text {
    fn from(text: String) -> Self {
        Self::Literal(text)
    }
}

/// Named values substituted into [`Text::Param`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowParams {
    values: BTreeMap<String, String>,
}

impl FlowParams {
    /// Empty parameter set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Add or replace a value
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Look up a value
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

/// What a step does before its wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Load a path or URL
    Navigate(String),
    /// Click the first match
    Click(Locator),
    /// Type into the first match
    Type {
        /// Target element
        locator: Locator,
        /// Text to enter
        text: Text,
    },
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Navigate(path) => write!(f, "navigate to {path}"),
            Self::Click(locator) => write!(f, "click {locator}"),
            Self::Type {
                locator,
                text: Text::Param(name),
            } => write!(f, "type <{name}> into {locator}"),
            Self::Type { locator, .. } => write!(f, "type into {locator}"),
        }
    }
}

/// One step of a flow
#[derive(Debug, Clone)]
pub struct Step {
    label: String,
    action: Option<Action>,
    wait: Option<Condition>,
    timeout: Option<Duration>,
}

impl Step {
    /// Human-readable label
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Action, if any
    #[must_use]
    pub const fn action(&self) -> Option<&Action> {
        self.action.as_ref()
    }

    /// Wait condition, if any
    #[must_use]
    pub const fn wait(&self) -> Option<&Condition> {
        self.wait.as_ref()
    }

    /// Timeout override for the wait
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Where and why a flow stopped waiting
#[derive(Debug, Clone, Serialize)]
pub struct StepFailure {
    /// Zero-based step index
    pub step: usize,
    /// Step label
    pub label: String,
    /// Description of the unsatisfied condition
    pub condition: String,
    /// `ConditionFailed` or `ConditionTimedOut`
    pub kind: FailureKind,
    /// Reason reported by a failed condition
    pub reason: Option<String>,
    /// Time spent waiting
    pub elapsed_ms: u64,
    /// Evaluations made
    pub attempts: u32,
    /// Page state at the end of the wait
    pub last_observed: Option<StateSnapshot>,
}

impl StepFailure {
    /// Equivalent error value
    #[must_use]
    pub fn to_error(&self) -> VigilError {
        let last_observed = StateSnapshot::render(self.last_observed.as_ref());
        match self.kind {
            FailureKind::ConditionFailed => VigilError::ConditionFailed {
                condition: self.condition.clone(),
                reason: self.reason.clone().unwrap_or_default(),
                last_observed,
            },
            _ => VigilError::ConditionTimedOut {
                condition: self.condition.clone(),
                elapsed_ms: self.elapsed_ms,
                attempts: self.attempts,
                last_observed,
            },
        }
    }
}

/// Result of running a flow
#[derive(Debug, Clone, Serialize)]
pub struct FlowResult {
    /// Flow name
    pub flow: String,
    /// URL after the last executed step
    pub final_url: Option<String>,
    /// Steps that completed
    pub steps_run: usize,
    /// Steps in the flow
    pub steps_total: usize,
    /// Every wait that ran was satisfied
    pub all_waits_satisfied: bool,
    /// First unsatisfied wait
    pub failure: Option<StepFailure>,
}

impl FlowResult {
    /// Turn a wait failure into a `FlowStep` error
    pub fn into_result(self) -> VigilResult<Self> {
        if let Some(failure) = &self.failure {
            return Err(VigilError::FlowStep {
                flow: self.flow.clone(),
                step: failure.step,
                label: failure.label.clone(),
                source: Box::new(failure.to_error()),
            });
        }
        Ok(self)
    }
}

/// Named sequence of steps
#[derive(Debug, Clone)]
pub struct Flow {
    name: String,
    steps: Vec<Step>,
}

impl Flow {
    /// Empty flow
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Flow name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Steps in order
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Number of steps
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the flow has no steps
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn push_action(mut self, action: Action) -> Self {
        self.steps.push(Step {
            label: action.to_string(),
            action: Some(action),
            wait: None,
            timeout: None,
        });
        self
    }

    /// Navigate to a path or URL
    #[must_use]
    pub fn navigate(self, path: impl Into<String>) -> Self {
        self.push_action(Action::Navigate(path.into()))
    }

    /// Click the first match
    #[must_use]
    pub fn click(self, locator: Locator) -> Self {
        self.push_action(Action::Click(locator))
    }

    /// Type into the first match
    #[must_use]
    pub fn type_text(self, locator: Locator, text: impl Into<Text>) -> Self {
        self.push_action(Action::Type {
            locator,
            text: text.into(),
        })
    }

    /// Wait for `condition` after the previous action
    #[must_use]
    pub fn then(self, condition: Condition) -> Self {
        self.attach_wait(condition, None)
    }

    /// Like [`Flow::then`] with its own timeout
    #[must_use]
    pub fn then_within(self, condition: Condition, timeout: Duration) -> Self {
        self.attach_wait(condition, Some(timeout))
    }

    /// Standalone wait step
    #[must_use]
    pub fn wait(mut self, condition: Condition) -> Self {
        self.steps.push(Step {
            label: format!("wait for {condition}"),
            action: None,
            wait: Some(condition),
            timeout: None,
        });
        self
    }

    /// Rename the most recent step
    #[must_use]
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        if let Some(step) = self.steps.last_mut() {
            step.label = label.into();
        }
        self
    }

    fn attach_wait(mut self, condition: Condition, timeout: Option<Duration>) -> Self {
        if matches!(self.steps.last(), Some(step) if step.wait.is_none()) {
            if let Some(step) = self.steps.last_mut() {
                step.wait = Some(condition);
            }
        } else {
            self = self.wait(condition);
        }
        if let Some(step) = self.steps.last_mut() {
            step.timeout = timeout;
        }
        self
    }

    /// Parameter names referenced by the flow, in first-use order
    #[must_use]
    pub fn required_params(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for step in &self.steps {
            if let Some(Action::Type {
                text: Text::Param(name),
                ..
            }) = &step.action
            {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Execute against `session`.
    ///
    /// Parameters are checked before any step runs. Steps run strictly in
    /// order; the first unsatisfied wait stops the flow and is reported in
    /// [`FlowResult::failure`].
    ///
    /// # Errors
    ///
    /// `MissingParam` before anything runs, `SessionClosed` unwrapped, and
    /// any other action error wrapped in `FlowStep`.
    pub fn run(&self, session: &mut Session, params: &FlowParams) -> VigilResult<FlowResult> {
        if let Some(name) = self.required_params().into_iter().find(|n| params.get(n).is_none()) {
            return Err(VigilError::MissingParam {
                flow: self.name.clone(),
                name: name.to_string(),
            });
        }

        tracing::debug!(flow = %self.name, session = %session.id(), steps = self.steps.len(), "flow started");
        let mut result = FlowResult {
            flow: self.name.clone(),
            final_url: None,
            steps_run: 0,
            steps_total: self.steps.len(),
            all_waits_satisfied: true,
            failure: None,
        };

        for (index, step) in self.steps.iter().enumerate() {
            if let Some(action) = &step.action {
                self.perform(session, action, params)
                    .map_err(|e| self.step_error(index, step, e))?;
            }

            if let Some(condition) = &step.wait {
                let options = PollOptions::new(
                    step.timeout.unwrap_or_else(|| session.default_timeout()),
                    session.poll_interval(),
                );
                let outcome = session
                    .poll(condition, options)
                    .map_err(|e| self.step_error(index, step, e))?;
                let (kind, reason) = match outcome.status() {
                    PollStatus::Satisfied(_) => {
                        result.steps_run += 1;
                        continue;
                    }
                    PollStatus::Failed(reason) => (FailureKind::ConditionFailed, Some(reason.clone())),
                    PollStatus::TimedOut => (FailureKind::ConditionTimedOut, None),
                };
                tracing::info!(flow = %self.name, step = index, label = %step.label, %kind, "flow wait unsatisfied");
                result.all_waits_satisfied = false;
                result.failure = Some(StepFailure {
                    step: index,
                    label: step.label.clone(),
                    condition: outcome.description().to_string(),
                    kind,
                    reason,
                    elapsed_ms: outcome.elapsed().as_millis() as u64,
                    attempts: outcome.attempts(),
                    last_observed: outcome.last_observed().cloned(),
                });
                break;
            }
            result.steps_run += 1;
        }

        result.final_url = session.current_url().ok();
        Ok(result)
    }

    fn perform(&self, session: &mut Session, action: &Action, params: &FlowParams) -> VigilResult<()> {
        match action {
            Action::Navigate(path) => session.goto(path),
            Action::Click(locator) => session.click(locator),
            Action::Type { locator, text } => {
                let text = text.resolve(&self.name, params)?;
                session.type_into(locator, text)
            }
        }
    }

    fn step_error(&self, index: usize, step: &Step, error: VigilError) -> VigilError {
        match error {
            VigilError::SessionClosed { .. } => error,
            source => VigilError::FlowStep {
                flow: self.name.clone(),
                step: index,
                label: step.label.clone(),
                source: Box::new(source),
            },
        }
    }
}

/// Run `flow` against `session`; see [`Flow::run`]
pub fn run(flow: &Flow, session: &mut Session, params: &FlowParams) -> VigilResult<FlowResult> {
    flow.run(session, params)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::clock::{Clock, FakeClock};
    use crate::config::HarnessConfig;
    use crate::mock::{ClickEffect, MockElement, MockLauncher, MockPage, MockSite};
    use std::sync::Arc;

    fn portal() -> MockSite {
        MockSite::new("http://localhost:3000")
            .with_page(
                "/login",
                MockPage::new("Login")
                    .with_element(MockElement::new("email", "input").with_attribute("type", "email"))
                    .with_element(
                        MockElement::new("password", "input").with_attribute("type", "password"),
                    )
                    .with_element(
                        MockElement::new("error", "div")
                            .with_class("bg-red-100")
                            .with_text("Invalid email or password")
                            .revealed_by_click(),
                    )
                    .with_element(
                        MockElement::new("submit", "button")
                            .with_attribute("type", "submit")
                            .on_click(|form| {
                                if form.value("password") == Some("secret") {
                                    ClickEffect::Navigate {
                                        path: "/dashboard".into(),
                                        after: Duration::from_millis(600),
                                    }
                                } else {
                                    ClickEffect::Reveal {
                                        key: "error".into(),
                                        after: Duration::from_millis(200),
                                    }
                                }
                            }),
                    ),
            )
            .with_page("/dashboard", MockPage::new("Dashboard"))
    }

    fn login_flow() -> Flow {
        Flow::new("login")
            .navigate("/login")
            .type_text(Locator::css("input[type='email']"), Text::param("email"))
            .type_text(Locator::css("input[type='password']"), Text::param("password"))
            .click(Locator::css("button[type='submit']"))
            .then(
                Condition::url_contains("/dashboard")
                    .fail_when(Locator::css(".bg-red-100"), "login rejected"),
            )
            .labeled("submit")
    }

    fn session_on(clock: &Arc<FakeClock>) -> (MockLauncher, Session) {
        let launcher = MockLauncher::new(portal()).with_clock(clock.clone());
        let session =
            Session::open_with_clock(&launcher, &HarnessConfig::default(), clock.clone()).unwrap();
        (launcher, session)
    }

    fn params(password: &str) -> FlowParams {
        FlowParams::new()
            .with("email", "nobin@gmail.com")
            .with("password", password)
    }

    mod builder_tests {
        use super::*;

        #[test]
        fn test_then_attaches_to_last_action() {
            let flow = login_flow();
            assert_eq!(flow.len(), 4);
            let last = &flow.steps()[3];
            assert_eq!(last.label(), "submit");
            assert!(matches!(last.action(), Some(Action::Click(_))));
            assert!(last.wait().is_some());
        }

        #[test]
        fn test_then_after_wait_adds_step() {
            let flow = Flow::new("f")
                .wait(Condition::url_contains("/a"))
                .then_within(Condition::url_contains("/b"), Duration::from_secs(1));
            assert_eq!(flow.len(), 2);
            assert!(flow.steps()[1].action().is_none());
            assert_eq!(flow.steps()[1].timeout(), Some(Duration::from_secs(1)));
        }

        #[test]
        fn test_then_on_empty_flow_adds_wait_step() {
            let flow = Flow::new("f").then(Condition::title_contains("Home"));
            assert_eq!(flow.len(), 1);
            assert_eq!(flow.steps()[0].label(), "wait for title contains \"Home\"");
        }

        #[test]
        fn test_required_params_deduplicated() {
            let flow = Flow::new("f")
                .type_text(Locator::tag("input"), Text::param("a"))
                .type_text(Locator::tag("input"), "literal")
                .type_text(Locator::tag("input"), Text::param("a"));
            assert_eq!(flow.required_params(), vec!["a"]);
        }

        #[test]
        fn test_action_labels() {
            let flow = login_flow();
            assert_eq!(flow.steps()[0].label(), "navigate to /login");
            assert_eq!(
                flow.steps()[1].label(),
                "type <email> into css `input[type='email']`"
            );
        }
    }

    mod run_tests {
        use super::*;

        #[test]
        fn test_successful_login() {
            let clock = FakeClock::shared();
            let (launcher, mut session) = session_on(&clock);
            let result = login_flow().run(&mut session, &params("secret")).unwrap();
            assert!(result.all_waits_satisfied);
            assert!(result.failure.is_none());
            assert_eq!(result.steps_run, 4);
            assert_eq!(result.final_url.as_deref(), Some("http://localhost:3000/dashboard"));
            assert_eq!(clock.now(), Duration::from_millis(600));
            assert_eq!(
                launcher.typed(),
                vec![
                    ("email".to_string(), "nobin@gmail.com".to_string()),
                    ("password".to_string(), "secret".to_string()),
                ]
            );
        }

        #[test]
        fn test_rejected_login_fails_fast() {
            let clock = FakeClock::shared();
            let (_launcher, mut session) = session_on(&clock);
            let result = login_flow().run(&mut session, &params("wrong")).unwrap();
            let failure = result.failure.as_ref().unwrap();
            assert_eq!(failure.step, 3);
            assert_eq!(failure.label, "submit");
            assert_eq!(failure.kind, FailureKind::ConditionFailed);
            assert_eq!(
                failure.reason.as_deref(),
                Some("login rejected: Invalid email or password")
            );
            assert_eq!(result.steps_run, 3);
            // stopped at the banner, far short of the 20s default timeout
            assert_eq!(clock.now(), Duration::from_millis(200));
            assert_eq!(result.final_url.as_deref(), Some("http://localhost:3000/login"));

            let err = result.into_result().unwrap_err();
            assert!(matches!(err, VigilError::FlowStep { step: 3, .. }));
            assert_eq!(err.kind(), FailureKind::ConditionFailed);
        }

        #[test]
        fn test_timeout_reports_wait() {
            let clock = FakeClock::shared();
            let (_launcher, mut session) = session_on(&clock);
            let flow = Flow::new("stuck")
                .navigate("/login")
                .then_within(Condition::url_contains("/admin"), Duration::from_millis(1000));
            let result = flow.run(&mut session, &FlowParams::new()).unwrap();
            let failure = result.failure.unwrap();
            assert_eq!(failure.kind, FailureKind::ConditionTimedOut);
            assert_eq!(failure.elapsed_ms, 1000);
            assert_eq!(failure.attempts, 6);
            assert!(failure.last_observed.unwrap().url.unwrap().ends_with("/login"));
        }

        #[test]
        fn test_missing_param_before_any_step() {
            let clock = FakeClock::shared();
            let (launcher, mut session) = session_on(&clock);
            let err = login_flow()
                .run(&mut session, &FlowParams::new().with("email", "x"))
                .unwrap_err();
            assert!(matches!(err, VigilError::MissingParam { ref name, .. } if name == "password"));
            assert!(launcher.typed().is_empty());
            assert_eq!(session.current_url().unwrap(), "about:blank");
        }

        #[test]
        fn test_action_error_names_step() {
            let clock = FakeClock::shared();
            let (_launcher, mut session) = session_on(&clock);
            let flow = Flow::new("broken")
                .navigate("/login")
                .click(Locator::text("Sign up"));
            let err = run(&flow, &mut session, &FlowParams::new()).unwrap_err();
            match err {
                VigilError::FlowStep { step, label, source, .. } => {
                    assert_eq!(step, 1);
                    assert_eq!(label, "click text \"Sign up\"");
                    assert!(matches!(*source, VigilError::LocatorNotFound { .. }));
                }
                other => panic!("expected flow step error, got {other:?}"),
            }
        }

        #[test]
        fn test_closed_session_propagates_unwrapped() {
            let clock = FakeClock::shared();
            let (_launcher, mut session) = session_on(&clock);
            session.close().unwrap();
            let err = login_flow().run(&mut session, &params("secret")).unwrap_err();
            assert!(matches!(err, VigilError::SessionClosed { .. }));
        }

        #[test]
        fn test_flow_is_reusable() {
            let clock = FakeClock::shared();
            let flow = login_flow();
            for password in ["wrong", "secret"] {
                let (_launcher, mut session) = session_on(&clock);
                flow.run(&mut session, &params(password)).unwrap();
            }
            assert_eq!(flow.len(), 4);
        }
    }
}
