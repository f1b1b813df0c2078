//! Browser session lifecycle.
//!
//! A [`Session`] owns exactly one driver from launch to close. It is created
//! with its viewport already configured, used by a single scenario, and closed
//! on every exit path: explicitly through [`Session::close`], by
//! [`with_session`], or finally by `Drop`.
//!
//! # Example
//!
//! ```
//! use vigil::mock::{MockElement, MockLauncher, MockPage, MockSite};
//! use vigil::{with_session, Condition, HarnessConfig, Locator};
//!
//! let site = MockSite::new("http://localhost:3000").with_page(
//!     "/",
//!     MockPage::new("Home").with_element(MockElement::new("hero", "h1").with_text("Welcome")),
//! );
//! let launcher = MockLauncher::new(site);
//!
//! with_session(&launcher, &HarnessConfig::default(), |session| {
//!     session.goto("/")?;
//!     session.expect(&Condition::element_visible(Locator::text("Welcome")))?;
//!     Ok(())
//! })
//! .unwrap();
//! assert_eq!(launcher.close_count(), 1);
//! ```

use crate::clock::{SharedClock, SystemClock};
use crate::condition::{Condition, Observation};
use crate::config::{join_url, HarnessConfig};
use crate::driver::{Driver, ElementHandle, Launcher, PageState, Viewport};
use crate::locator::{Locator, Strategy};
use crate::poll::{PollOptions, PollOutcome, Poller};
use crate::result::{VigilError, VigilResult};
use chrono::{DateTime, Utc};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use uuid::Uuid;

/// One browser, one scenario
pub struct Session {
    id: Uuid,
    driver: Option<Box<dyn Driver>>,
    viewport: Viewport,
    base_url: String,
    default_timeout: Duration,
    poll_interval: Duration,
    expect_grace: Duration,
    created_at: DateTime<Utc>,
    poller: Poller,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("open", &self.driver.is_some())
            .field("viewport", &self.viewport)
            .field("base_url", &self.base_url)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

fn closed(id: Uuid) -> VigilError {
    VigilError::SessionClosed {
        session: id.to_string(),
    }
}

impl Session {
    /// Launch a browser and configure its viewport
    ///
    /// # Errors
    ///
    /// `DriverUnavailable` when the browser cannot be launched or sized. A
    /// driver that launched but could not be sized is closed before returning.
    pub fn open(launcher: &dyn Launcher, config: &HarnessConfig) -> VigilResult<Self> {
        Self::open_with_clock(launcher, config, SystemClock::shared())
    }

    /// Like [`Session::open`], polling on `clock`
    pub fn open_with_clock(
        launcher: &dyn Launcher,
        config: &HarnessConfig,
        clock: SharedClock,
    ) -> VigilResult<Self> {
        let id = Uuid::new_v4();
        let mut driver = launcher.launch(config.viewport).map_err(|e| match e {
            VigilError::DriverUnavailable { .. } => e,
            other => VigilError::unavailable(other.to_string()),
        })?;

        if let Err(e) = driver.set_viewport(config.viewport) {
            if let Err(close_err) = driver.close() {
                tracing::warn!(session = %id, error = %close_err, "close after failed setup");
            }
            return Err(VigilError::unavailable(format!(
                "could not set viewport {}: {e}",
                config.viewport
            )));
        }

        tracing::info!(session = %id, viewport = %config.viewport, base_url = %config.base_url, "session opened");
        Ok(Self {
            id,
            driver: Some(driver),
            viewport: config.viewport,
            base_url: config.base_url.clone(),
            default_timeout: config.default_timeout(),
            poll_interval: config.poll_interval(),
            expect_grace: config.expect_grace(),
            created_at: Utc::now(),
            poller: Poller::new(clock),
        })
    }

    /// Unique session identifier
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// When the session was opened
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Configured viewport
    #[must_use]
    pub const fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Application origin
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Timeout used by [`Session::wait_for`]
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Polling cadence
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Whether the driver has been released
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.driver.is_none()
    }

    fn driver(&self) -> VigilResult<&dyn Driver> {
        match &self.driver {
            Some(driver) => Ok(driver.as_ref()),
            None => Err(closed(self.id)),
        }
    }

    fn driver_mut(&mut self) -> VigilResult<&mut (dyn Driver + 'static)> {
        match self.driver.as_mut() {
            Some(driver) => Ok(driver.as_mut()),
            None => Err(closed(self.id)),
        }
    }

    /// Navigate to a path relative to the base URL, or to an absolute URL
    pub fn goto(&mut self, path: &str) -> VigilResult<()> {
        let url = join_url(&self.base_url, path);
        tracing::debug!(session = %self.id, %url, "navigate");
        self.driver_mut()?.navigate(&url)
    }

    /// URL of the current page
    pub fn current_url(&self) -> VigilResult<String> {
        self.driver()?.current_url()
    }

    /// Title of the current page
    pub fn title(&self) -> VigilResult<String> {
        self.driver()?.title()
    }

    /// First element matching `locator`, right now
    ///
    /// # Errors
    ///
    /// `LocatorNotFound` when every alternative resolves to nothing.
    pub fn find(&self, locator: &Locator) -> VigilResult<ElementHandle> {
        locator
            .resolve_first(self)?
            .ok_or_else(|| VigilError::LocatorNotFound {
                locator: locator.to_string(),
            })
    }

    /// All elements matching `locator`, possibly none
    pub fn find_all(&self, locator: &Locator) -> VigilResult<Vec<ElementHandle>> {
        locator.resolve(self)
    }

    /// Click the first element matching `locator`
    pub fn click(&mut self, locator: &Locator) -> VigilResult<()> {
        let element = self.find(locator)?;
        tracing::debug!(session = %self.id, %locator, "click");
        self.driver_mut()?.click(&element)
    }

    /// Type into the first element matching `locator`
    pub fn type_into(&mut self, locator: &Locator, text: &str) -> VigilResult<()> {
        let element = self.find(locator)?;
        tracing::debug!(session = %self.id, %locator, chars = text.chars().count(), "type");
        self.driver_mut()?.type_text(&element, text)
    }

    /// Resize the browser viewport mid-session
    ///
    /// # Errors
    ///
    /// `SessionClosed` after [`Session::close`]; driver errors pass through
    /// and leave the recorded viewport unchanged.
    pub fn set_viewport(&mut self, viewport: Viewport) -> VigilResult<()> {
        self.driver_mut()?.set_viewport(viewport)?;
        tracing::debug!(session = %self.id, %viewport, "viewport resized");
        self.viewport = viewport;
        Ok(())
    }

    /// Poll with explicit options
    ///
    /// # Errors
    ///
    /// `SessionClosed` if the session is closed; unsatisfied conditions are
    /// reported in the outcome.
    pub fn poll(&self, condition: &Condition, options: PollOptions) -> VigilResult<PollOutcome> {
        self.driver()?;
        self.poller.poll(condition, self, options)
    }

    /// Evaluate once, without waiting
    pub fn check(&self, condition: &Condition) -> VigilResult<PollOutcome> {
        self.driver()?;
        self.poller.check(condition, self)
    }

    /// Wait with the default timeout
    pub fn wait_for(&self, condition: &Condition) -> VigilResult<Observation> {
        self.wait_for_within(condition, self.default_timeout)
    }

    /// Wait with an explicit timeout
    ///
    /// # Errors
    ///
    /// `ConditionFailed` or `ConditionTimedOut` when the condition does not
    /// hold, `SessionClosed` when the session is closed.
    pub fn wait_for_within(
        &self,
        condition: &Condition,
        timeout: Duration,
    ) -> VigilResult<Observation> {
        self.poll(condition, PollOptions::new(timeout, self.poll_interval))?
            .into_result()
    }

    /// Assert a condition, allowing the short grace window
    pub fn expect(&self, condition: &Condition) -> VigilResult<Observation> {
        self.wait_for_within(condition, self.expect_grace)
    }

    /// Release the driver. Later calls are no-ops.
    pub fn close(&mut self) -> VigilResult<()> {
        let Some(mut driver) = self.driver.take() else {
            return Ok(());
        };
        let result = driver.close();
        match &result {
            Ok(()) => tracing::info!(session = %self.id, "session closed"),
            Err(e) => tracing::warn!(session = %self.id, error = %e, "session close failed"),
        }
        result
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.driver.is_some() {
            tracing::debug!(session = %self.id, "closing session on drop");
            // Errors are already logged by close
            let _ = self.close();
        }
    }
}

impl PageState for Session {
    fn current_url(&self) -> VigilResult<String> {
        Self::current_url(self)
    }

    fn title(&self) -> VigilResult<String> {
        Self::title(self)
    }

    fn find_elements(&self, strategy: &Strategy) -> VigilResult<Vec<ElementHandle>> {
        self.driver()?.find_elements(strategy)
    }
}

/// Run `body` with a fresh session and close it on every exit path.
///
/// A panic in `body` is caught and reported as `ScenarioPanicked` after the
/// session is closed.
///
/// # Errors
///
/// The body's error if it failed, otherwise the close error if closing failed.
pub fn with_session<T, F>(
    launcher: &dyn Launcher,
    config: &HarnessConfig,
    body: F,
) -> VigilResult<T>
where
    F: FnOnce(&mut Session) -> VigilResult<T>,
{
    let mut session = Session::open(launcher, config)?;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&mut session)));
    let closed = session.close();
    match outcome {
        Ok(Ok(value)) => closed.map(|()| value),
        Ok(Err(err)) => Err(err),
        Err(payload) => Err(VigilError::ScenarioPanicked {
            message: panic_message(payload.as_ref()),
        }),
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::clock::{Clock, FakeClock};
    use crate::mock::{ClickEffect, MockElement, MockLauncher, MockPage, MockSite};
    use std::sync::Arc;

    fn site() -> MockSite {
        MockSite::new("http://localhost:3000")
            .with_page(
                "/",
                MockPage::new("Akshaya Services")
                    .with_element(MockElement::new("hero", "h1").with_text("Akshaya Services"))
                    .with_element(
                        MockElement::new("banner", "img")
                            .with_attribute("alt", "banner")
                            .visible_from_width(768),
                    )
                    .with_element(
                        MockElement::new("cta", "a")
                            .with_text("Get Started")
                            .navigates_to("/register", Duration::from_millis(400)),
                    ),
            )
            .with_page(
                "/register",
                MockPage::new("Register").with_element(
                    MockElement::new("form-title", "h2")
                        .with_text("Create Account")
                        .appears_after(Duration::from_millis(200)),
                ),
            )
            .with_page(
                "/login",
                MockPage::new("Login").with_element(
                    MockElement::new("submit", "button")
                        .with_text("Login")
                        .on_click(|_| ClickEffect::Nothing),
                ),
            )
    }

    fn open(launcher: &MockLauncher, clock: &Arc<FakeClock>) -> Session {
        Session::open_with_clock(launcher, &HarnessConfig::default(), clock.clone()).unwrap()
    }

    fn fake() -> (MockLauncher, Arc<FakeClock>) {
        let clock = FakeClock::shared();
        (MockLauncher::new(site()).with_clock(clock.clone()), clock)
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn test_open_assigns_id_and_viewport() {
            let (launcher, clock) = fake();
            let a = open(&launcher, &clock);
            let b = open(&launcher, &clock);
            assert_ne!(a.id(), b.id());
            assert_eq!(a.viewport(), Viewport::new(1280, 900));
            assert!(!a.is_closed());
            assert_eq!(launcher.launch_count(), 2);
        }

        #[test]
        fn test_close_is_idempotent() {
            let (launcher, clock) = fake();
            let mut session = open(&launcher, &clock);
            session.close().unwrap();
            session.close().unwrap();
            drop(session);
            assert_eq!(launcher.close_count(), 1);
        }

        #[test]
        fn test_drop_closes() {
            let (launcher, clock) = fake();
            {
                let _session = open(&launcher, &clock);
            }
            assert_eq!(launcher.close_count(), 1);
        }

        #[test]
        fn test_operations_after_close_fail() {
            let (launcher, clock) = fake();
            let mut session = open(&launcher, &clock);
            session.close().unwrap();
            assert!(matches!(session.goto("/"), Err(VigilError::SessionClosed { .. })));
            assert!(matches!(
                session.find_all(&Locator::tag("h1")),
                Err(VigilError::SessionClosed { .. })
            ));
            assert!(matches!(
                session.wait_for(&Condition::url_contains("/")),
                Err(VigilError::SessionClosed { .. })
            ));
            assert!(matches!(
                session.set_viewport(Viewport::new(375, 667)),
                Err(VigilError::SessionClosed { .. })
            ));
            assert_eq!(session.viewport(), Viewport::new(1280, 900));
        }

        #[test]
        fn test_launch_failure_is_driver_unavailable() {
            let launcher = MockLauncher::new(site()).failing("chromium not installed");
            let err = Session::open(&launcher, &HarnessConfig::default()).unwrap_err();
            assert!(matches!(err, VigilError::DriverUnavailable { .. }));
            assert_eq!(launcher.close_count(), 0);
        }

        #[test]
        fn test_viewport_failure_closes_driver() {
            let launcher = MockLauncher::new(site()).failing_viewport();
            let err = Session::open(&launcher, &HarnessConfig::default()).unwrap_err();
            assert!(matches!(err, VigilError::DriverUnavailable { .. }));
            assert_eq!(launcher.launch_count(), 1);
            assert_eq!(launcher.close_count(), 1);
        }
    }

    mod action_tests {
        use super::*;

        #[test]
        fn test_goto_joins_base_url() {
            let (launcher, clock) = fake();
            let mut session = open(&launcher, &clock);
            session.goto("/login").unwrap();
            assert_eq!(session.current_url().unwrap(), "http://localhost:3000/login");
            assert_eq!(session.title().unwrap(), "Login");
        }

        #[test]
        fn test_find_missing_is_locator_not_found() {
            let (launcher, clock) = fake();
            let mut session = open(&launcher, &clock);
            session.goto("/").unwrap();
            let err = session.find(&Locator::text("Logout")).unwrap_err();
            assert!(matches!(err, VigilError::LocatorNotFound { .. }));
            assert!(session.find_all(&Locator::text("Logout")).unwrap().is_empty());
        }

        #[test]
        fn test_find_uses_alternatives() {
            let (launcher, clock) = fake();
            let mut session = open(&launcher, &clock);
            session.goto("/").unwrap();
            let el = session
                .find(&Locator::text("Register").or(Locator::text("Get Started")))
                .unwrap();
            assert_eq!(el.id, "cta");
        }

        #[test]
        fn test_set_viewport_reaches_driver() {
            let (launcher, clock) = fake();
            let mut session = open(&launcher, &clock);
            session.goto("/").unwrap();
            let banner = Locator::attribute("alt", "banner");
            assert!(session.find(&banner).unwrap().visible);

            session.set_viewport(Viewport::new(375, 667)).unwrap();
            assert_eq!(session.viewport(), Viewport::new(375, 667));
            assert!(!session.find(&banner).unwrap().visible);
            assert!(session.check(&Condition::element_absent(banner)).unwrap().satisfied());
        }
    }

    mod wait_tests {
        use super::*;

        #[test]
        fn test_click_then_wait_for_delayed_page() {
            let (launcher, clock) = fake();
            let mut session = open(&launcher, &clock);
            session.goto("/").unwrap();
            session.click(&Locator::text("Get Started")).unwrap();
            session.wait_for(&Condition::url_contains("/register")).unwrap();
            assert_eq!(clock.now(), Duration::from_millis(400));
            let obs = session
                .wait_for(&Condition::element_visible(Locator::text("Create Account")))
                .unwrap();
            assert_eq!(obs.element().unwrap().id, "form-title");
        }

        #[test]
        fn test_check_does_not_wait() {
            let (launcher, clock) = fake();
            let mut session = open(&launcher, &clock);
            session.goto("/register").unwrap();
            let outcome = session
                .check(&Condition::element_present(Locator::tag("h2")))
                .unwrap();
            assert!(outcome.timed_out());
            assert_eq!(clock.now(), Duration::ZERO);
        }

        #[test]
        fn test_expect_uses_grace_window() {
            let (launcher, clock) = fake();
            let mut session = open(&launcher, &clock);
            session.goto("/").unwrap();
            let err = session.expect(&Condition::url_contains("/admin")).unwrap_err();
            match err {
                VigilError::ConditionTimedOut { elapsed_ms, .. } => assert_eq!(elapsed_ms, 2000),
                other => panic!("expected timeout, got {other:?}"),
            }
            assert_eq!(clock.now(), Duration::from_millis(2000));
        }

        #[test]
        fn test_wait_for_within_overrides_timeout() {
            let (launcher, clock) = fake();
            let mut session = open(&launcher, &clock);
            session.goto("/").unwrap();
            let err = session
                .wait_for_within(&Condition::title_contains("Dashboard"), Duration::from_millis(500))
                .unwrap_err();
            assert!(matches!(err, VigilError::ConditionTimedOut { .. }));
            assert_eq!(clock.now(), Duration::from_millis(500));
        }
    }

    mod with_session_tests {
        use super::*;

        #[test]
        fn test_closes_after_success() {
            let (launcher, _clock) = fake();
            let title = with_session(&launcher, &HarnessConfig::default(), |session| {
                session.goto("/")?;
                session.title()
            })
            .unwrap();
            assert_eq!(title, "Akshaya Services");
            assert_eq!(launcher.close_count(), 1);
        }

        #[test]
        fn test_closes_after_error() {
            let (launcher, _clock) = fake();
            let err = with_session(&launcher, &HarnessConfig::default(), |session| {
                session.goto("/")?;
                session.find(&Locator::text("Nope")).map(|_| ())
            })
            .unwrap_err();
            assert!(matches!(err, VigilError::LocatorNotFound { .. }));
            assert_eq!(launcher.close_count(), 1);
        }

        #[test]
        fn test_closes_after_panic() {
            let (launcher, _clock) = fake();
            let err = with_session(&launcher, &HarnessConfig::default(), |_| -> VigilResult<()> {
                panic!("assertion exploded")
            })
            .unwrap_err();
            match err {
                VigilError::ScenarioPanicked { message } => assert_eq!(message, "assertion exploded"),
                other => panic!("expected panic error, got {other:?}"),
            }
            assert_eq!(launcher.close_count(), 1);
        }

        #[test]
        fn test_body_closing_early_still_closes_once() {
            let (launcher, _clock) = fake();
            with_session(&launcher, &HarnessConfig::default(), Session::close).unwrap();
            assert_eq!(launcher.close_count(), 1);
        }
    }
}
