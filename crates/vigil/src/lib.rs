//! Vigil: condition polling and session lifecycle for browser acceptance tests
//!
//! Acceptance suites fail for two boring reasons: they check the page before
//! it is ready, or they leak browsers when a test dies halfway. Vigil answers
//! both with a small set of composable pieces.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────┐   ┌───────────┐   ┌────────┐   ┌─────────┐   ┌──────┐
//! │ Locator │──►│ Condition │──►│ Poller │──►│ Session │──►│ Flow │
//! └─────────┘   └───────────┘   └────────┘   └────┬────┘   └──────┘
//!                                                 │ owns
//!                                          ┌──────▼──────┐
//!                                          │ dyn Driver  │ mock / chromium
//!                                          └─────────────┘
//! ```
//!
//! - [`Locator`]: where to look, with ordered fallbacks
//! - [`Condition`]: what must be true, as `Pending`, `Satisfied` or `Failed`
//! - [`Poller`]: bounded retry at a fixed cadence on an injectable [`Clock`]
//! - [`Session`]: one browser per scenario, always closed
//! - [`Flow`]: reusable step sequences such as "log in as admin"
//! - [`ScenarioRunner`]: setup, run, teardown and reporting per scenario

#![warn(missing_docs)]

pub mod clock;
pub mod condition;
pub mod config;
pub mod driver;
pub mod flow;
pub mod locator;
pub mod mock;
pub mod poll;
pub mod scenario;
pub mod session;

mod result;

/// Chromium driver (requires the `browser` feature)
#[cfg(feature = "browser")]
pub mod browser;

#[cfg(feature = "browser")]
pub use browser::{ChromiumDriver, ChromiumLauncher};
pub use clock::{Clock, FakeClock, SharedClock, SystemClock};
pub use condition::{Condition, ConditionResult, Observation};
pub use config::{Credentials, HarnessConfig, DEFAULT_BASE_URL, DEFAULT_EXPECT_GRACE_MS};
pub use driver::{Driver, ElementHandle, Launcher, PageState, Viewport};
pub use flow::{run, Action, Flow, FlowParams, FlowResult, Step, StepFailure, Text};
pub use locator::{Locator, Strategy};
pub use poll::{
    PollOptions, PollOutcome, PollStatus, Poller, StateSnapshot, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_TIMEOUT_MS,
};
pub use result::{FailureKind, VigilError, VigilResult};
pub use scenario::{Scenario, ScenarioOutcome, ScenarioReport, ScenarioRunner, Suite, SuiteReport};
pub use session::{with_session, Session};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::{
        with_session, Condition, Flow, FlowParams, HarnessConfig, Locator, PageState, PollOptions,
        Scenario, Session, Suite, Text, VigilError, VigilResult,
    };
}
