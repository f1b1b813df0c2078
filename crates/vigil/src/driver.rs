//! Driver capability surface.
//!
//! Everything Vigil knows about a browser goes through these traits:
//!
//! ```text
//! ┌──────────────┐  launch(viewport)  ┌──────────────────────────────┐
//! │  Launcher    │───────────────────►│  Driver (one browser)        │
//! └──────────────┘                    │  navigate / click / type     │
//!                                     │  find_elements / url / title │
//!                                     │  close                       │
//!                                     └──────────────┬───────────────┘
//!                                                    │ owned by
//!                                     ┌──────────────▼───────────────┐
//!                                     │  Session (implements         │
//!                                     │  PageState for conditions)   │
//!                                     └──────────────────────────────┘
//! ```
//!
//! # Implementations
//!
//! - `MockLauncher` - scripted site for unit tests
//! - `ChromiumLauncher` - chromiumoxide, behind the `browser` feature

use crate::locator::Strategy;
use crate::result::VigilResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Browser viewport size in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewport {
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

impl Viewport {
    /// Create a viewport
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1280, 900)
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Element handle for DOM interactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementHandle {
    /// Driver-assigned identifier, stable for the current page
    pub id: String,
    /// Element tag name (lowercase)
    pub tag_name: String,
    /// Element text content
    #[serde(default)]
    pub text_content: Option<String>,
    /// Element attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Rendered and not hidden
    #[serde(default = "default_true")]
    pub visible: bool,
    /// Not disabled
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Checkbox or radio is checked
    #[serde(default)]
    pub checked: bool,
}

const fn default_true() -> bool {
    true
}

impl ElementHandle {
    /// Create a new visible, enabled element handle
    #[must_use]
    pub fn new(id: impl Into<String>, tag_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag_name: tag_name.into().to_ascii_lowercase(),
            text_content: None,
            attributes: BTreeMap::new(),
            visible: true,
            enabled: true,
            checked: false,
        }
    }

    /// Set the text content
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_content = Some(text.into());
        self
    }

    /// Add an attribute
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Mark the element hidden
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Mark the element disabled
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Mark the element checked
    #[must_use]
    pub const fn checked(mut self) -> Self {
        self.checked = true;
        self
    }

    /// Look up an attribute value
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Text content, empty when absent
    #[must_use]
    pub fn text(&self) -> &str {
        self.text_content.as_deref().unwrap_or("")
    }

    /// Check if element is visible
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        self.visible
    }

    /// Visible and enabled
    #[must_use]
    pub const fn is_clickable(&self) -> bool {
        self.visible && self.enabled
    }

    /// Checkbox or radio state
    #[must_use]
    pub const fn is_checked(&self) -> bool {
        self.checked
    }
}

/// Read-only view of the current page.
///
/// Locators and conditions only ever see this trait, so they can be exercised
/// against any fake state source.
pub trait PageState {
    /// URL of the current page
    fn current_url(&self) -> VigilResult<String>;

    /// Document title
    fn title(&self) -> VigilResult<String>;

    /// Elements matching a single strategy, in document order
    fn find_elements(&self, strategy: &Strategy) -> VigilResult<Vec<ElementHandle>>;
}

/// One launched browser instance.
///
/// Owned exclusively by a `Session`; `close` releases the browser process.
pub trait Driver: Send {
    /// Resize the viewport
    fn set_viewport(&mut self, viewport: Viewport) -> VigilResult<()>;

    /// Navigate to an absolute URL
    fn navigate(&mut self, url: &str) -> VigilResult<()>;

    /// Query elements for one strategy
    fn find_elements(&self, strategy: &Strategy) -> VigilResult<Vec<ElementHandle>>;

    /// Click an element
    fn click(&mut self, element: &ElementHandle) -> VigilResult<()>;

    /// Type text into an element
    fn type_text(&mut self, element: &ElementHandle, text: &str) -> VigilResult<()>;

    /// Current URL
    fn current_url(&self) -> VigilResult<String>;

    /// Document title
    fn title(&self) -> VigilResult<String>;

    /// Release the browser
    fn close(&mut self) -> VigilResult<()>;
}

/// Starts browsers
pub trait Launcher {
    /// Launch a browser sized to `viewport`
    fn launch(&self, viewport: Viewport) -> VigilResult<Box<dyn Driver>>;
}
