//! Scripted in-memory driver.
//!
//! A [`MockSite`] describes pages by path. Elements can appear some time after
//! the page loads, be revealed by a click, or navigate when clicked, all
//! measured on the shared [`Clock`](crate::clock::Clock), so waits can be
//! exercised deterministically with a `FakeClock`.
//!
//! ```
//! use vigil::mock::{MockElement, MockLauncher, MockPage, MockSite};
//!
//! let site = MockSite::new("http://localhost:3000").with_page(
//!     "/",
//!     MockPage::new("Home").with_element(MockElement::new("hero", "h1").with_text("Welcome")),
//! );
//! let launcher = MockLauncher::new(site);
//! assert_eq!(launcher.close_count(), 0);
//! ```

use crate::clock::{SharedClock, SystemClock};
use crate::driver::{Driver, ElementHandle, Launcher, Viewport};
use crate::locator::Strategy;
use crate::result::{VigilError, VigilResult};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// What a click does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickEffect {
    /// Nothing observable
    Nothing,
    /// Load another path after a delay
    Navigate {
        /// Target path
        path: String,
        /// Delay before the new page is current
        after: Duration,
    },
    /// Make an element that waits for a reveal present
    Reveal {
        /// Key of the element to reveal
        key: String,
        /// Delay before it appears
        after: Duration,
    },
    /// Change an attribute of an element on the current page
    SetAttribute {
        /// Key of the element to change
        key: String,
        /// Attribute name
        name: String,
        /// New value
        value: String,
    },
}

/// Values typed and clicked on the current page, handed to click handlers
#[derive(Debug, Clone, Default)]
pub struct FormState {
    typed: BTreeMap<String, String>,
    clicked: Vec<String>,
}

impl FormState {
    /// Text typed into the element with `key`
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&str> {
        self.typed.get(key).map(String::as_str)
    }

    /// Whether the element with `key` was clicked
    #[must_use]
    pub fn was_clicked(&self, key: &str) -> bool {
        self.clicked.iter().any(|k| k == key)
    }

    /// Clicks on the element with `key`, including the one being handled
    #[must_use]
    pub fn click_count(&self, key: &str) -> usize {
        self.clicked.iter().filter(|k| *k == key).count()
    }
}

type ClickHandler = Arc<dyn Fn(&FormState) -> ClickEffect + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presence {
    Always,
    After(Duration),
    OnReveal,
}

/// One scripted element
#[derive(Clone)]
pub struct MockElement {
    handle: ElementHandle,
    presence: Presence,
    parent: Option<String>,
    min_width: Option<u32>,
    on_click: Option<ClickHandler>,
}

impl std::fmt::Debug for MockElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockElement")
            .field("handle", &self.handle)
            .field("presence", &self.presence)
            .field("parent", &self.parent)
            .field("min_width", &self.min_width)
            .field("on_click", &self.on_click.is_some())
            .finish()
    }
}

impl MockElement {
    /// Element identified by `key` on its page
    #[must_use]
    pub fn new(key: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            handle: ElementHandle::new(key, tag),
            presence: Presence::Always,
            parent: None,
            min_width: None,
            on_click: None,
        }
    }

    /// Set text content
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.handle = self.handle.with_text(text);
        self
    }

    /// Set an attribute
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.handle = self.handle.with_attribute(name, value);
        self
    }

    /// Set the `id` attribute
    #[must_use]
    pub fn with_id(self, id: impl Into<String>) -> Self {
        self.with_attribute("id", id)
    }

    /// Set the `class` attribute
    #[must_use]
    pub fn with_class(self, class: impl Into<String>) -> Self {
        self.with_attribute("class", class)
    }

    /// Present but not visible
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.handle = self.handle.hidden();
        self
    }

    /// Visible but disabled
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.handle = self.handle.disabled();
        self
    }

    /// Checkbox or radio that starts checked
    #[must_use]
    pub fn checked(mut self) -> Self {
        self.handle = self.handle.checked();
        self
    }

    /// Nest inside the element with `parent` key; the parent's text
    /// includes this element's text
    #[must_use]
    pub fn inside(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Hidden while the viewport is narrower than `width`
    #[must_use]
    pub const fn visible_from_width(mut self, width: u32) -> Self {
        self.min_width = Some(width);
        self
    }

    /// Only present once `delay` has passed since the page loaded
    #[must_use]
    pub const fn appears_after(mut self, delay: Duration) -> Self {
        self.presence = Presence::After(delay);
        self
    }

    /// Only present after a [`ClickEffect::Reveal`] names it
    #[must_use]
    pub const fn revealed_by_click(mut self) -> Self {
        self.presence = Presence::OnReveal;
        self
    }

    /// Navigate to `path` when clicked
    #[must_use]
    pub fn navigates_to(self, path: impl Into<String>, after: Duration) -> Self {
        let effect = ClickEffect::Navigate {
            path: path.into(),
            after,
        };
        self.on_click(move |_| effect.clone())
    }

    /// Decide the click effect from the form state
    #[must_use]
    pub fn on_click<F>(mut self, handler: F) -> Self
    where
        F: Fn(&FormState) -> ClickEffect + Send + Sync + 'static,
    {
        self.on_click = Some(Arc::new(handler));
        self
    }

    fn key(&self) -> &str {
        &self.handle.id
    }
}

/// One scripted page
#[derive(Debug, Clone)]
pub struct MockPage {
    title: String,
    elements: Vec<MockElement>,
}

impl MockPage {
    /// Page with a document title
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            elements: Vec::new(),
        }
    }

    /// Append an element in document order
    #[must_use]
    pub fn with_element(mut self, element: MockElement) -> Self {
        self.elements.push(element);
        self
    }

    fn element(&self, key: &str) -> Option<&MockElement> {
        self.elements.iter().find(|el| el.key() == key)
    }
}

/// Pages by path under one origin
#[derive(Debug, Clone)]
pub struct MockSite {
    origin: String,
    pages: BTreeMap<String, MockPage>,
    not_found: MockPage,
}

impl MockSite {
    /// Site served at `origin`
    #[must_use]
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into().trim_end_matches('/').to_string(),
            pages: BTreeMap::new(),
            not_found: MockPage::new("Not Found"),
        }
    }

    /// Register a page
    #[must_use]
    pub fn with_page(mut self, path: impl Into<String>, page: MockPage) -> Self {
        self.pages.insert(path.into(), page);
        self
    }

    /// Origin the site is served at
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn page(&self, path: &str) -> &MockPage {
        self.pages.get(path).unwrap_or(&self.not_found)
    }

    fn path_of(&self, url: &str) -> String {
        let rest = url.strip_prefix(&self.origin).unwrap_or(url);
        let rest = rest.split(['?', '#']).next().unwrap_or("");
        if rest.is_empty() {
            "/".to_string()
        } else {
            rest.to_string()
        }
    }
}

/// Launches [`MockDriver`]s over a shared site
#[derive(Debug, Clone)]
pub struct MockLauncher {
    site: Arc<MockSite>,
    clock: SharedClock,
    launches: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    typed: Arc<Mutex<Vec<(String, String)>>>,
    launch_error: Option<String>,
    viewport_error: bool,
}

impl MockLauncher {
    /// Launcher on the system clock
    #[must_use]
    pub fn new(site: MockSite) -> Self {
        Self {
            site: Arc::new(site),
            clock: SystemClock::shared(),
            launches: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            typed: Arc::new(Mutex::new(Vec::new())),
            launch_error: None,
            viewport_error: false,
        }
    }

    /// Measure element delays on `clock`
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Make every launch fail
    #[must_use]
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.launch_error = Some(message.into());
        self
    }

    /// Launch succeeds but resizing the viewport fails
    #[must_use]
    pub const fn failing_viewport(mut self) -> Self {
        self.viewport_error = true;
        self
    }

    /// Drivers launched so far
    #[must_use]
    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Times any driver was closed
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Every `(element key, text)` typed by any driver, in order
    #[must_use]
    pub fn typed(&self) -> Vec<(String, String)> {
        lock(&self.typed).clone()
    }
}

impl Launcher for MockLauncher {
    fn launch(&self, viewport: Viewport) -> VigilResult<Box<dyn Driver>> {
        if let Some(message) = &self.launch_error {
            return Err(VigilError::unavailable(message.clone()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(%viewport, "mock browser launched");
        Ok(Box::new(MockDriver {
            site: Arc::clone(&self.site),
            clock: Arc::clone(&self.clock),
            closes: Arc::clone(&self.closes),
            typed_log: Arc::clone(&self.typed),
            viewport_error: self.viewport_error,
            state: Mutex::new(DriverState {
                viewport,
                ..DriverState::default()
            }),
        }))
    }
}

#[derive(Debug, Default)]
struct DriverState {
    viewport: Viewport,
    path: Option<String>,
    loaded_at: Duration,
    pending: Option<(String, Duration)>,
    revealed: BTreeMap<String, Duration>,
    attributes: BTreeMap<String, BTreeMap<String, String>>,
    checked: BTreeMap<String, bool>,
    form: FormState,
    closed: bool,
}

impl DriverState {
    fn load(&mut self, path: String, at: Duration) {
        self.path = Some(path);
        self.loaded_at = at;
        self.pending = None;
        self.revealed.clear();
        self.attributes.clear();
        self.checked.clear();
        self.form = FormState::default();
    }

    /// Apply a navigation whose delay has passed
    fn settle(&mut self, now: Duration) {
        if let Some((path, at)) = self.pending.take() {
            if now >= at {
                self.load(path, at);
            } else {
                self.pending = Some((path, at));
            }
        }
    }

    fn is_present(&self, element: &MockElement, now: Duration) -> bool {
        match element.presence {
            Presence::Always => true,
            Presence::After(delay) => now >= self.loaded_at + delay,
            Presence::OnReveal => self
                .revealed
                .get(element.key())
                .is_some_and(|at| now >= *at),
        }
    }

    /// Handle as the page currently shows it
    fn render(&self, element: &MockElement, present: &[&MockElement]) -> ElementHandle {
        let mut handle = element.handle.clone();
        let text = full_text(element, present, 0);
        if !text.is_empty() {
            handle.text_content = Some(text);
        }
        if let Some(overrides) = self.attributes.get(element.key()) {
            for (name, value) in overrides {
                handle.attributes.insert(name.clone(), value.clone());
            }
        }
        if let Some(checked) = self.checked.get(element.key()) {
            handle.checked = *checked;
        }
        if element.min_width.is_some_and(|w| self.viewport.width < w) {
            handle.visible = false;
        }
        handle
    }
}

/// Own text followed by the text of present descendants
fn full_text(element: &MockElement, present: &[&MockElement], depth: usize) -> String {
    let mut parts = Vec::new();
    let own = element.handle.text();
    if !own.is_empty() {
        parts.push(own.to_string());
    }
    // depth bound guards against parent cycles
    if depth < present.len() {
        for child in present
            .iter()
            .filter(|c| c.parent.as_deref() == Some(element.key()))
        {
            let text = full_text(child, present, depth + 1);
            if !text.is_empty() {
                parts.push(text);
            }
        }
    }
    parts.join(" ")
}

/// Driver over a [`MockSite`]
pub struct MockDriver {
    site: Arc<MockSite>,
    clock: SharedClock,
    closes: Arc<AtomicUsize>,
    typed_log: Arc<Mutex<Vec<(String, String)>>>,
    viewport_error: bool,
    state: Mutex<DriverState>,
}

impl std::fmt::Debug for MockDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDriver")
            .field("origin", &self.site.origin)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl MockDriver {
    /// Lock state after applying due navigations
    fn settled(&self, action: &str) -> VigilResult<MutexGuard<'_, DriverState>> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(VigilError::driver(action, "browser has been closed"));
        }
        state.settle(self.clock.now());
        Ok(state)
    }

    fn current_page<'a>(&'a self, state: &DriverState) -> &'a MockPage {
        state
            .path
            .as_deref()
            .map_or(&self.site.not_found, |path| self.site.page(path))
    }

    fn present_element<'a>(
        &'a self,
        state: &DriverState,
        key: &str,
        action: &str,
    ) -> VigilResult<&'a MockElement> {
        self.current_page(state)
            .element(key)
            .filter(|el| state.is_present(el, self.clock.now()))
            .ok_or_else(|| VigilError::driver(action, format!("element '{key}' is detached")))
    }

    /// Present elements in document order with their rendered handles
    fn rendered<'a>(&'a self, state: &DriverState) -> Vec<(&'a MockElement, ElementHandle)> {
        let now = self.clock.now();
        let present: Vec<&MockElement> = self
            .current_page(state)
            .elements
            .iter()
            .filter(|el| state.is_present(el, now))
            .collect();
        present
            .iter()
            .map(|el| (*el, state.render(el, &present)))
            .collect()
    }

    /// Keys of the other radios sharing `target`'s group
    fn radio_group(&self, state: &DriverState, target: &MockElement) -> Vec<String> {
        let Some(group) = target.handle.attribute("name") else {
            return Vec::new();
        };
        self.current_page(state)
            .elements
            .iter()
            .filter(|el| el.key() != target.key())
            .filter(|el| el.handle.attribute("type") == Some("radio"))
            .filter(|el| el.handle.attribute("name") == Some(group))
            .map(|el| el.key().to_string())
            .collect()
    }
}

impl Driver for MockDriver {
    fn set_viewport(&mut self, viewport: Viewport) -> VigilResult<()> {
        if self.viewport_error {
            return Err(VigilError::driver("set viewport", "emulation not supported"));
        }
        self.settled("set viewport")?.viewport = viewport;
        Ok(())
    }

    fn navigate(&mut self, url: &str) -> VigilResult<()> {
        let path = self.site.path_of(url);
        let now = self.clock.now();
        self.settled("navigate")?.load(path, now);
        Ok(())
    }

    fn find_elements(&self, strategy: &Strategy) -> VigilResult<Vec<ElementHandle>> {
        let state = self.settled("find elements")?;
        let rendered = self.rendered(&state);
        // text lookups keep only the deepest elements holding the text
        let deepest_only = matches!(strategy, Strategy::TextContains(_));
        let has_matching_child = |parent: &MockElement| {
            rendered.iter().any(|(child, handle)| {
                child.parent.as_deref() == Some(parent.key()) && matches(strategy, handle)
            })
        };
        Ok(rendered
            .iter()
            .filter(|(el, handle)| {
                matches(strategy, handle) && !(deepest_only && has_matching_child(el))
            })
            .map(|(_, handle)| handle.clone())
            .collect())
    }

    fn click(&mut self, element: &ElementHandle) -> VigilResult<()> {
        let mut state = self.settled("click")?;
        let (target, handle) = self
            .rendered(&state)
            .into_iter()
            .find(|(el, _)| el.key() == element.id)
            .ok_or_else(|| {
                VigilError::driver("click", format!("element '{}' is detached", element.id))
            })?;
        if !handle.is_clickable() {
            return Err(VigilError::driver(
                "click",
                format!("element '{}' is not clickable", element.id),
            ));
        }
        match handle.attribute("type") {
            Some("radio") => {
                for other in self.radio_group(&state, target) {
                    state.checked.insert(other, false);
                }
                state.checked.insert(element.id.clone(), true);
            }
            Some("checkbox") => {
                state.checked.insert(element.id.clone(), !handle.is_checked());
            }
            _ => {}
        }
        let handler = target.on_click.clone();
        state.form.clicked.push(element.id.clone());
        let now = self.clock.now();
        match handler.map_or(ClickEffect::Nothing, |h| h(&state.form)) {
            ClickEffect::Nothing => {}
            ClickEffect::Navigate { path, after } => state.pending = Some((path, now + after)),
            ClickEffect::Reveal { key, after } => {
                state.revealed.insert(key, now + after);
            }
            ClickEffect::SetAttribute { key, name, value } => {
                state.attributes.entry(key).or_default().insert(name, value);
            }
        }
        Ok(())
    }

    fn type_text(&mut self, element: &ElementHandle, text: &str) -> VigilResult<()> {
        let mut state = self.settled("type")?;
        self.present_element(&state, &element.id, "type")?;
        state
            .form
            .typed
            .entry(element.id.clone())
            .or_default()
            .push_str(text);
        lock(&self.typed_log).push((element.id.clone(), text.to_string()));
        Ok(())
    }

    fn current_url(&self) -> VigilResult<String> {
        let state = self.settled("read url")?;
        Ok(state.path.as_deref().map_or_else(
            || "about:blank".to_string(),
            |path| format!("{}{path}", self.site.origin),
        ))
    }

    fn title(&self) -> VigilResult<String> {
        let state = self.settled("read title")?;
        Ok(state
            .path
            .as_ref()
            .map(|_| self.current_page(&state).title.clone())
            .unwrap_or_default())
    }

    fn close(&mut self) -> VigilResult<()> {
        let mut state = lock(&self.state);
        state.closed = true;
        self.closes.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(origin = %self.site.origin, "mock browser closed");
        Ok(())
    }
}

/// Strategy matching including a small CSS subset
fn matches(strategy: &Strategy, element: &ElementHandle) -> bool {
    match strategy {
        Strategy::Css(selector) => css_matches(selector, element),
        other => other.matches_element(element),
    }
}

/// Match selector lists of compound selectors: `tag`, `#id`, `.class`,
/// `[attr]`, `[attr='value']`. Backslash escapes in class and id names are
/// dropped. Combinators are not supported.
fn css_matches(selector: &str, element: &ElementHandle) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .any(|compound| compound_matches(compound, element))
}

fn compound_matches(compound: &str, element: &ElementHandle) -> bool {
    if compound.contains(char::is_whitespace) || compound.contains('>') {
        return false;
    }
    let mut rest = compound;
    let tag_end = rest.find(['#', '.', '[']).unwrap_or(rest.len());
    let tag = &rest[..tag_end];
    if !tag.is_empty() && tag != "*" && !element.tag_name.eq_ignore_ascii_case(tag) {
        return false;
    }
    rest = &rest[tag_end..];

    while let Some(first) = rest.chars().next() {
        match first {
            '#' | '.' => {
                let body = &rest[1..];
                let end = body.find(['#', '.', '[']).unwrap_or(body.len());
                let name = body[..end].replace('\\', "");
                let ok = if first == '#' {
                    element.attribute("id") == Some(name.as_str())
                } else {
                    element
                        .attribute("class")
                        .is_some_and(|classes| classes.split_whitespace().any(|c| c == name))
                };
                if !ok {
                    return false;
                }
                rest = &body[end..];
            }
            '[' => {
                let Some(close) = rest.find(']') else {
                    return false;
                };
                if !attribute_matches(&rest[1..close], element) {
                    return false;
                }
                rest = &rest[close + 1..];
            }
            _ => return false,
        }
    }
    true
}

fn attribute_matches(clause: &str, element: &ElementHandle) -> bool {
    match clause.split_once('=') {
        None => element.attribute(clause.trim()).is_some(),
        Some((name, value)) => {
            let value = value.trim().trim_matches(|c| c == '\'' || c == '"');
            element.attribute(name.trim()) == Some(value)
        }
    }
}
