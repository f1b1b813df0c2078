//! Bounded-retry evaluation of conditions.
//!
//! The poller evaluates a [`Condition`] at a fixed cadence until it is
//! satisfied, reports an unrecoverable failure, or the timeout elapses.
//!
//! - Satisfied at attempt `k` costs exactly `k` evaluations
//! - `Failed` stops immediately; it never waits out the timeout
//! - The last sleep is clamped to the remaining budget, so a poll returns
//!   within `timeout + interval`

use crate::clock::{SharedClock, SystemClock};
use crate::condition::{Condition, ConditionResult, Observation};
use crate::driver::PageState;
use crate::result::{VigilError, VigilResult};
use serde::Serialize;
use std::time::Duration;

/// Default timeout for wait operations (20 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 20_000;

/// Default polling interval (200ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;

/// Floor applied to the interval so a zero cadence cannot spin
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Timeout and cadence for one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Total budget
    pub timeout: Duration,
    /// Sleep between attempts
    pub interval: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::from_millis(DEFAULT_TIMEOUT_MS, DEFAULT_POLL_INTERVAL_MS)
    }
}

impl PollOptions {
    /// Create poll options
    #[must_use]
    pub const fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    /// Create poll options from milliseconds
    #[must_use]
    pub const fn from_millis(timeout_ms: u64, interval_ms: u64) -> Self {
        Self::new(
            Duration::from_millis(timeout_ms),
            Duration::from_millis(interval_ms),
        )
    }

    /// Single evaluation, no retries
    #[must_use]
    pub const fn once() -> Self {
        Self::new(Duration::ZERO, Duration::from_millis(DEFAULT_POLL_INTERVAL_MS))
    }

    /// Set timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set interval
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Best-effort picture of the page for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    /// Current URL, if it could be read
    pub url: Option<String>,
    /// Document title, if it could be read
    pub title: Option<String>,
}

impl StateSnapshot {
    /// Capture URL and title, ignoring read errors
    #[must_use]
    pub fn capture(state: &dyn PageState) -> Self {
        Self {
            url: state.current_url().ok(),
            title: state.title().ok(),
        }
    }

    /// Render an optional snapshot for error messages
    #[must_use]
    pub fn render(snapshot: Option<&Self>) -> String {
        snapshot.map_or_else(|| "<unavailable>".to_string(), ToString::to_string)
    }
}

impl std::fmt::Display for StateSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.url, &self.title) {
            (None, None) => f.write_str("<unavailable>"),
            (url, title) => write!(
                f,
                "url={} title={:?}",
                url.as_deref().unwrap_or("?"),
                title.as_deref().unwrap_or("?")
            ),
        }
    }
}

/// Terminal state of one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// Condition held
    Satisfied(Observation),
    /// Condition reported an unrecoverable state
    Failed(String),
    /// Budget exhausted while pending
    TimedOut,
}

/// Result of one poller invocation
#[derive(Debug, Clone)]
pub struct PollOutcome {
    description: String,
    status: PollStatus,
    elapsed: Duration,
    attempts: u32,
    last_observed: Option<StateSnapshot>,
}

impl PollOutcome {
    /// Description of the polled condition
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Terminal status
    #[must_use]
    pub const fn status(&self) -> &PollStatus {
        &self.status
    }

    /// Whether the condition held
    #[must_use]
    pub const fn satisfied(&self) -> bool {
        matches!(self.status, PollStatus::Satisfied(_))
    }

    /// Whether the condition failed outright
    #[must_use]
    pub const fn failed(&self) -> bool {
        matches!(self.status, PollStatus::Failed(_))
    }

    /// Whether the budget ran out
    #[must_use]
    pub const fn timed_out(&self) -> bool {
        matches!(self.status, PollStatus::TimedOut)
    }

    /// Time spent polling
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Number of evaluations
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Page snapshot taken when the poll ended unsatisfied
    #[must_use]
    pub const fn last_observed(&self) -> Option<&StateSnapshot> {
        self.last_observed.as_ref()
    }

    /// Convert into the observation or the matching error
    ///
    /// # Errors
    ///
    /// `ConditionFailed` or `ConditionTimedOut`.
    pub fn into_result(self) -> VigilResult<Observation> {
        let last_observed = StateSnapshot::render(self.last_observed.as_ref());
        match self.status {
            PollStatus::Satisfied(obs) => Ok(obs),
            PollStatus::Failed(reason) => Err(VigilError::ConditionFailed {
                condition: self.description,
                reason,
                last_observed,
            }),
            PollStatus::TimedOut => Err(VigilError::ConditionTimedOut {
                condition: self.description,
                elapsed_ms: self.elapsed.as_millis() as u64,
                attempts: self.attempts,
                last_observed,
            }),
        }
    }
}

/// The bounded-retry loop
#[derive(Debug, Clone)]
pub struct Poller {
    clock: SharedClock,
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(SystemClock::shared())
    }
}

impl Poller {
    /// Create a poller on a clock
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }

    /// The clock this poller sleeps on
    #[must_use]
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Poll `condition` until satisfied, failed or timed out.
    ///
    /// # Errors
    ///
    /// State errors raised while evaluating (e.g. `SessionClosed`) are
    /// returned immediately. Unsatisfied conditions are reported in the
    /// outcome, not as errors.
    pub fn poll(
        &self,
        condition: &Condition,
        state: &dyn PageState,
        options: PollOptions,
    ) -> VigilResult<PollOutcome> {
        let interval = options.interval.max(MIN_INTERVAL);
        let start = self.clock.now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let result = condition.evaluate(state)?;
            let elapsed = self.clock.now().saturating_sub(start);

            let status = match result {
                ConditionResult::Satisfied(obs) => PollStatus::Satisfied(obs),
                ConditionResult::Failed(reason) => PollStatus::Failed(reason),
                ConditionResult::Pending if elapsed >= options.timeout => PollStatus::TimedOut,
                ConditionResult::Pending => {
                    tracing::trace!(
                        condition = condition.description(),
                        attempts,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "condition pending"
                    );
                    self.clock.sleep(interval.min(options.timeout - elapsed));
                    continue;
                }
            };

            let last_observed = match status {
                PollStatus::Satisfied(_) => None,
                PollStatus::Failed(_) | PollStatus::TimedOut => Some(StateSnapshot::capture(state)),
            };
            tracing::debug!(
                condition = condition.description(),
                attempts,
                elapsed_ms = elapsed.as_millis() as u64,
                status = ?status,
                "poll finished"
            );
            return Ok(PollOutcome {
                description: condition.description().to_string(),
                status,
                elapsed,
                attempts,
                last_observed,
            });
        }
    }

    /// Evaluate exactly once
    pub fn check(&self, condition: &Condition, state: &dyn PageState) -> VigilResult<PollOutcome> {
        self.poll(condition, state, PollOptions::once())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::clock::{Clock, FakeClock};
    use crate::driver::ElementHandle;
    use crate::locator::Strategy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// URL switches from `/login` to `/dashboard` once the clock passes `switch_at`
    #[derive(Debug)]
    struct RedirectingPage {
        clock: Arc<FakeClock>,
        switch_at: Duration,
    }

    impl PageState for RedirectingPage {
        fn current_url(&self) -> VigilResult<String> {
            Ok(if self.clock.now() >= self.switch_at {
                "http://localhost:3000/dashboard".into()
            } else {
                "http://localhost:3000/login".into()
            })
        }

        fn title(&self) -> VigilResult<String> {
            Ok("Akshaya Services".into())
        }

        fn find_elements(&self, _: &Strategy) -> VigilResult<Vec<ElementHandle>> {
            Ok(Vec::new())
        }
    }

    struct Blank;

    impl PageState for Blank {
        fn current_url(&self) -> VigilResult<String> {
            Ok("about:blank".into())
        }

        fn title(&self) -> VigilResult<String> {
            Ok(String::new())
        }

        fn find_elements(&self, _: &Strategy) -> VigilResult<Vec<ElementHandle>> {
            Ok(Vec::new())
        }
    }

    fn fake_poller() -> (Poller, Arc<FakeClock>) {
        let clock = FakeClock::shared();
        (Poller::new(clock.clone()), clock)
    }

    /// Pending for the first `k - 1` evaluations, then satisfied
    fn satisfied_on(k: usize, calls: &Arc<AtomicUsize>) -> Condition {
        let calls = Arc::clone(calls);
        Condition::new(format!("satisfied on attempt {k}"), move |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(if n >= k {
                ConditionResult::Satisfied(Observation::Confirmed)
            } else {
                ConditionResult::Pending
            })
        })
    }

    mod options_tests {
        use super::*;

        #[test]
        fn test_default_options() {
            let opts = PollOptions::default();
            assert_eq!(opts.timeout, Duration::from_millis(DEFAULT_TIMEOUT_MS));
            assert_eq!(opts.interval, Duration::from_millis(DEFAULT_POLL_INTERVAL_MS));
        }

        #[test]
        fn test_once_has_zero_budget() {
            assert_eq!(PollOptions::once().timeout, Duration::ZERO);
        }

        #[test]
        fn test_chained() {
            let opts = PollOptions::default()
                .with_timeout(Duration::from_secs(2))
                .with_interval(Duration::from_millis(50));
            assert_eq!(opts, PollOptions::from_millis(2000, 50));
        }
    }

    mod snapshot_tests {
        use super::*;

        #[test]
        fn test_capture_and_display() {
            let snap = StateSnapshot::capture(&Blank);
            assert_eq!(snap.url.as_deref(), Some("about:blank"));
            assert_eq!(snap.to_string(), "url=about:blank title=\"\"");
        }

        #[test]
        fn test_render_missing() {
            assert_eq!(StateSnapshot::render(None), "<unavailable>");
            assert_eq!(StateSnapshot::default().to_string(), "<unavailable>");
        }
    }

    mod poll_tests {
        use super::*;

        #[test]
        fn test_dashboard_redirect_after_600ms() {
            let (poller, clock) = fake_poller();
            let page = RedirectingPage {
                clock: clock.clone(),
                switch_at: Duration::from_millis(600),
            };
            let outcome = poller
                .poll(
                    &Condition::url_contains("/dashboard"),
                    &page,
                    PollOptions::from_millis(20_000, 200),
                )
                .unwrap();
            assert!(outcome.satisfied());
            assert!((3..=4).contains(&outcome.attempts()));
            assert_eq!(outcome.elapsed(), Duration::from_millis(600));
            assert!(outcome.last_observed().is_none());
        }

        #[test]
        fn test_satisfied_at_attempt_k_uses_k_evaluations() {
            for k in 1..=7 {
                let (poller, clock) = fake_poller();
                let calls = Arc::new(AtomicUsize::new(0));
                let outcome = poller
                    .poll(
                        &satisfied_on(k, &calls),
                        &Blank,
                        PollOptions::from_millis(60_000, 100),
                    )
                    .unwrap();
                assert!(outcome.satisfied());
                assert_eq!(outcome.attempts() as usize, k);
                assert_eq!(calls.load(Ordering::SeqCst), k);
                assert_eq!(clock.sleep_count() as usize, k - 1);
            }
        }

        #[test]
        fn test_immediate_success_does_not_sleep() {
            let (poller, clock) = fake_poller();
            let outcome = poller
                .poll(&Condition::url_contains("blank"), &Blank, PollOptions::default())
                .unwrap();
            assert!(outcome.satisfied());
            assert_eq!(outcome.attempts(), 1);
            assert_eq!(clock.sleep_count(), 0);
        }

        #[test]
        fn test_failed_stops_immediately() {
            let (poller, clock) = fake_poller();
            let cond = Condition::new("error toast", |_| {
                Ok(ConditionResult::Failed("toast shown".into()))
            });
            let outcome = poller.poll(&cond, &Blank, PollOptions::default()).unwrap();
            assert!(outcome.failed());
            assert_eq!(outcome.attempts(), 1);
            assert_eq!(clock.now(), Duration::ZERO);
            assert_eq!(
                outcome.last_observed().unwrap().url.as_deref(),
                Some("about:blank")
            );
        }

        #[test]
        fn test_timeout_clamps_last_sleep() {
            let (poller, clock) = fake_poller();
            let outcome = poller
                .poll(
                    &Condition::url_contains("/never"),
                    &Blank,
                    PollOptions::from_millis(1000, 300),
                )
                .unwrap();
            assert!(outcome.timed_out());
            // evaluations at 0, 300, 600, 900, 1000
            assert_eq!(outcome.attempts(), 5);
            assert_eq!(outcome.elapsed(), Duration::from_millis(1000));
            assert_eq!(clock.now(), Duration::from_millis(1000));
            assert!(outcome.last_observed().is_some());
        }

        #[test]
        fn test_zero_interval_still_terminates() {
            let (poller, _clock) = fake_poller();
            let outcome = poller
                .poll(
                    &Condition::url_contains("/never"),
                    &Blank,
                    PollOptions::new(Duration::from_millis(5), Duration::ZERO),
                )
                .unwrap();
            assert!(outcome.timed_out());
            assert_eq!(outcome.attempts(), 6);
        }

        #[test]
        fn test_check_evaluates_once() {
            let (poller, clock) = fake_poller();
            let calls = Arc::new(AtomicUsize::new(0));
            let outcome = poller.check(&satisfied_on(2, &calls), &Blank).unwrap();
            assert!(outcome.timed_out());
            assert_eq!(outcome.attempts(), 1);
            assert_eq!(calls.load(Ordering::SeqCst), 1);
            assert_eq!(clock.sleep_count(), 0);
        }

        #[test]
        fn test_state_error_propagates() {
            let (poller, _clock) = fake_poller();
            let cond = Condition::new("closed", |_| {
                Err(VigilError::SessionClosed {
                    session: "s".into(),
                })
            });
            let err = poller.poll(&cond, &Blank, PollOptions::default()).unwrap_err();
            assert!(matches!(err, VigilError::SessionClosed { .. }));
        }

        #[test]
        fn test_real_clock_returns_within_timeout_plus_interval() {
            let poller = Poller::default();
            let timeout = Duration::from_millis(120);
            let interval = Duration::from_millis(50);
            let start = std::time::Instant::now();
            let outcome = poller
                .poll(
                    &Condition::url_contains("/never"),
                    &Blank,
                    PollOptions::new(timeout, interval),
                )
                .unwrap();
            let wall = start.elapsed();
            assert!(outcome.timed_out());
            assert!(wall >= timeout);
            assert!(wall < timeout + interval + Duration::from_millis(50));
        }
    }

    mod into_result_tests {
        use super::*;

        #[test]
        fn test_satisfied_into_observation() {
            let (poller, _clock) = fake_poller();
            let obs = poller
                .check(&Condition::url_contains("blank"), &Blank)
                .unwrap()
                .into_result()
                .unwrap();
            assert_eq!(obs, Observation::Url("about:blank".into()));
        }

        #[test]
        fn test_timed_out_into_error() {
            let (poller, _clock) = fake_poller();
            let err = poller
                .poll(
                    &Condition::url_contains("/dashboard"),
                    &Blank,
                    PollOptions::from_millis(400, 200),
                )
                .unwrap()
                .into_result()
                .unwrap_err();
            match err {
                VigilError::ConditionTimedOut {
                    condition,
                    elapsed_ms,
                    attempts,
                    last_observed,
                } => {
                    assert_eq!(condition, "URL contains \"/dashboard\"");
                    assert_eq!(elapsed_ms, 400);
                    assert_eq!(attempts, 3);
                    assert!(last_observed.contains("about:blank"));
                }
                other => panic!("expected timeout, got {other:?}"),
            }
        }

        #[test]
        fn test_failed_into_error() {
            let (poller, _clock) = fake_poller();
            let cond = Condition::new("no banner", |_| Ok(ConditionResult::Failed("banner".into())));
            let err = poller
                .check(&cond, &Blank)
                .unwrap()
                .into_result()
                .unwrap_err();
            assert!(matches!(err, VigilError::ConditionFailed { ref reason, .. } if reason == "banner"));
        }
    }
}
