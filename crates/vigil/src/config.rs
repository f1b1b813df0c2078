//! Harness configuration.
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! `VIGIL_*` environment variables. The CLI applies its own flags last.
//!
//! ```yaml
//! baseUrl: http://localhost:3000
//! defaultTimeoutMs: 20000
//! pollIntervalMs: 200
//! viewport: { width: 1280, height: 900 }
//! credentials:
//!   user: { email: someone@example.com, password: secret, role: user }
//! ```

use crate::driver::Viewport;
use crate::poll::{PollOptions, DEFAULT_POLL_INTERVAL_MS, DEFAULT_TIMEOUT_MS};
use crate::result::{VigilError, VigilResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default application origin
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Default grace window for one-shot expectations (2 seconds)
pub const DEFAULT_EXPECT_GRACE_MS: u64 = 2_000;

/// Environment variable overriding `baseUrl`
pub const ENV_BASE_URL: &str = "VIGIL_BASE_URL";
/// Environment variable overriding `defaultTimeoutMs`
pub const ENV_DEFAULT_TIMEOUT_MS: &str = "VIGIL_DEFAULT_TIMEOUT_MS";
/// Environment variable overriding `pollIntervalMs`
pub const ENV_POLL_INTERVAL_MS: &str = "VIGIL_POLL_INTERVAL_MS";
/// Environment variable overriding `headless`
pub const ENV_HEADLESS: &str = "VIGIL_HEADLESS";

/// Environment variable overriding `noSandbox`
pub const ENV_NO_SANDBOX: &str = "VIGIL_NO_SANDBOX";

/// Login data for one role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Account email
    pub email: String,
    /// Account password
    pub password: String,
    /// Role selected on the login form
    pub role: String,
}

impl Credentials {
    /// Create credentials
    #[must_use]
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            role: role.into(),
        }
    }
}

/// Everything a session needs to know about the environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HarnessConfig {
    /// Origin of the application under test
    pub base_url: String,
    /// Timeout for waits that do not name their own
    pub default_timeout_ms: u64,
    /// Fixed polling cadence
    pub poll_interval_ms: u64,
    /// Budget for `Session::expect`
    pub expect_grace_ms: u64,
    /// Browser viewport
    pub viewport: Viewport,
    /// Run the browser without a window
    pub headless: bool,
    /// Launch Chromium without its sandbox, as most containers require
    pub no_sandbox: bool,
    /// Test accounts by role name
    pub credentials: BTreeMap<String, Credentials>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            expect_grace_ms: DEFAULT_EXPECT_GRACE_MS,
            viewport: Viewport::default(),
            headless: true,
            no_sandbox: false,
            credentials: BTreeMap::new(),
        }
    }
}

impl HarnessConfig {
    /// Create default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a YAML document; missing keys take their defaults
    pub fn from_yaml_str(yaml: &str) -> VigilResult<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Load a YAML file
    pub fn load(path: impl AsRef<Path>) -> VigilResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded harness config");
        Ok(config)
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> VigilResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Apply `VIGIL_*` overrides from the process environment
    pub fn with_env(self) -> VigilResult<Self> {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `VIGIL_*` overrides from an arbitrary lookup
    pub fn with_env_from<F>(mut self, lookup: F) -> VigilResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup(ENV_BASE_URL) {
            self.base_url = base_url;
        }
        if let Some(raw) = lookup(ENV_DEFAULT_TIMEOUT_MS) {
            self.default_timeout_ms = parse_millis(ENV_DEFAULT_TIMEOUT_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            self.poll_interval_ms = parse_millis(ENV_POLL_INTERVAL_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_HEADLESS) {
            self.headless = parse_bool(ENV_HEADLESS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_NO_SANDBOX) {
            self.no_sandbox = parse_bool(ENV_NO_SANDBOX, &raw)?;
        }
        Ok(self)
    }

    /// Set base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set default timeout
    #[must_use]
    pub const fn with_default_timeout_ms(mut self, ms: u64) -> Self {
        self.default_timeout_ms = ms;
        self
    }

    /// Set poll interval
    #[must_use]
    pub const fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set expect grace window
    #[must_use]
    pub const fn with_expect_grace_ms(mut self, ms: u64) -> Self {
        self.expect_grace_ms = ms;
        self
    }

    /// Set viewport
    #[must_use]
    pub const fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set sandbox opt-out
    #[must_use]
    pub const fn with_no_sandbox(mut self, no_sandbox: bool) -> Self {
        self.no_sandbox = no_sandbox;
        self
    }

    /// Add or replace credentials for a role
    #[must_use]
    pub fn with_credentials(mut self, role: impl Into<String>, credentials: Credentials) -> Self {
        self.credentials.insert(role.into(), credentials);
        self
    }

    /// Default wait timeout
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Polling cadence
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Grace window for expectations
    #[must_use]
    pub const fn expect_grace(&self) -> Duration {
        Duration::from_millis(self.expect_grace_ms)
    }

    /// Poll options with the default timeout
    #[must_use]
    pub const fn poll_options(&self) -> PollOptions {
        PollOptions::new(self.default_timeout(), self.poll_interval())
    }

    /// Credentials registered for `role`
    pub fn credentials(&self, role: &str) -> VigilResult<&Credentials> {
        self.credentials
            .get(role)
            .ok_or_else(|| VigilError::config(format!("no credentials configured for role '{role}'")))
    }

    /// Reject configurations no session could run with
    pub fn validate(&self) -> VigilResult<()> {
        let base = Url::parse(&self.base_url)
            .map_err(|e| VigilError::config(format!("invalid baseUrl '{}': {e}", self.base_url)))?;
        if base.cannot_be_a_base() {
            return Err(VigilError::config(format!(
                "baseUrl '{}' cannot be used as an origin",
                self.base_url
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(VigilError::config("pollIntervalMs must be positive"));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(VigilError::config(format!(
                "viewport {} has a zero dimension",
                self.viewport
            )));
        }
        Ok(())
    }

    /// Absolute URL for `path`, relative to the base URL
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

/// Join `path` onto `base`; absolute URLs pass through unchanged
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    if Url::parse(path).is_ok() {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        format!("{base}/")
    } else {
        format!("{base}/{path}")
    }
}

fn parse_millis(key: &str, raw: &str) -> VigilResult<u64> {
    raw.trim()
        .parse()
        .map_err(|e| VigilError::config(format!("{key}={raw:?} is not a millisecond count: {e}")))
}

fn parse_bool(key: &str, raw: &str) -> VigilResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(VigilError::config(format!("{key}={raw:?} is not a boolean"))),
    }
}
