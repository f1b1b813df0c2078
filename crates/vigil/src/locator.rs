//! Locator abstraction for element selection.
//!
//! # Design Philosophy
//!
//! - **Immutable values**: a locator is a description, never a live element
//! - **Fallback alternatives**: `Locator::text("Get Started").or(Locator::text("Register"))`
//!   tolerates UI variants across builds
//! - **Priority order**: the primary strategy is tried first, then each
//!   alternative in declaration order; the first non-empty match set wins

use serde::{Deserialize, Serialize};

use crate::driver::{ElementHandle, PageState};
use crate::result::VigilResult;

/// How to find elements on the current page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Attribute equals value (e.g. `name="email"`)
    AttributeEquals {
        /// Attribute name
        name: String,
        /// Expected value
        value: String,
    },
    /// Elements with this tag name
    TagName(String),
    /// Elements whose text content contains this substring
    TextContains(String),
    /// CSS selector
    Css(String),
}

impl Strategy {
    /// Check a single element against this strategy.
    ///
    /// CSS selectors cannot be evaluated without a DOM, so they never match
    /// here; drivers resolve them natively.
    #[must_use]
    pub fn matches_element(&self, element: &ElementHandle) -> bool {
        match self {
            Self::AttributeEquals { name, value } => element.attribute(name) == Some(value),
            Self::TagName(tag) => element.tag_name.eq_ignore_ascii_case(tag),
            Self::TextContains(text) => element.text().contains(text.as_str()),
            Self::Css(_) => false,
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AttributeEquals { name, value } => write!(f, "[{name}={value:?}]"),
            Self::TagName(tag) => write!(f, "tag `{tag}`"),
            Self::TextContains(text) => write!(f, "text {text:?}"),
            Self::Css(css) => write!(f, "css `{css}`"),
        }
    }
}

/// A rule, with optional fallbacks, for finding elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    strategy: Strategy,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    alternatives: Vec<Locator>,
}

impl Locator {
    /// Create a locator from a strategy
    #[must_use]
    pub const fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            alternatives: Vec::new(),
        }
    }

    /// CSS selector locator
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::new(Strategy::Css(selector.into()))
    }

    /// Tag name locator
    #[must_use]
    pub fn tag(tag: impl Into<String>) -> Self {
        Self::new(Strategy::TagName(tag.into()))
    }

    /// Text-contains locator
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Strategy::TextContains(text.into()))
    }

    /// Attribute-equals locator
    #[must_use]
    pub fn attribute(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(Strategy::AttributeEquals {
            name: name.into(),
            value: value.into(),
        })
    }

    /// `name` attribute locator (form fields)
    #[must_use]
    pub fn name(value: impl Into<String>) -> Self {
        Self::attribute("name", value)
    }

    /// `data-testid` attribute locator
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::attribute("data-testid", id)
    }

    /// Add a fallback tried after everything already declared
    #[must_use]
    pub fn or(mut self, alternative: Self) -> Self {
        self.alternatives.push(alternative);
        self
    }

    /// The primary strategy
    #[must_use]
    pub const fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Declared alternatives
    #[must_use]
    pub fn alternatives(&self) -> &[Self] {
        &self.alternatives
    }

    /// Every strategy in priority order (primary, then alternatives depth-first)
    #[must_use]
    pub fn strategies(&self) -> Vec<&Strategy> {
        let mut out = vec![&self.strategy];
        for alt in &self.alternatives {
            out.extend(alt.strategies());
        }
        out
    }

    /// Resolve to the first non-empty match set.
    ///
    /// # Errors
    ///
    /// Propagates state errors, e.g. `SessionClosed` for a torn-down session.
    pub fn resolve(&self, state: &dyn PageState) -> VigilResult<Vec<ElementHandle>> {
        for strategy in self.strategies() {
            let found = state.find_elements(strategy)?;
            if !found.is_empty() {
                tracing::trace!(locator = %self, matched = %strategy, count = found.len(), "locator resolved");
                return Ok(found);
            }
        }
        Ok(Vec::new())
    }

    /// Resolve to the first matching element, if any
    pub fn resolve_first(&self, state: &dyn PageState) -> VigilResult<Option<ElementHandle>> {
        Ok(self.resolve(state)?.into_iter().next())
    }
}

impl From<Strategy> for Locator {
    fn from(strategy: Strategy) -> Self {
        Self::new(strategy)
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered: Vec<String> = self.strategies().iter().map(ToString::to_string).collect();
        f.write_str(&rendered.join(" | "))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::result::VigilError;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Page that answers lookups from a fixed table and records query order
    #[derive(Default)]
    struct TablePage {
        table: HashMap<Strategy, Vec<ElementHandle>>,
        queried: RefCell<Vec<Strategy>>,
        closed: bool,
    }

    impl TablePage {
        fn with(mut self, strategy: Strategy, ids: &[&str]) -> Self {
            let elements = ids.iter().map(|id| ElementHandle::new(*id, "div")).collect();
            self.table.insert(strategy, elements);
            self
        }
    }

    impl PageState for TablePage {
        fn current_url(&self) -> VigilResult<String> {
            Ok("http://test/".into())
        }

        fn title(&self) -> VigilResult<String> {
            Ok(String::new())
        }

        fn find_elements(&self, strategy: &Strategy) -> VigilResult<Vec<ElementHandle>> {
            if self.closed {
                return Err(VigilError::SessionClosed {
                    session: "test".into(),
                });
            }
            self.queried.borrow_mut().push(strategy.clone());
            Ok(self.table.get(strategy).cloned().unwrap_or_default())
        }
    }

    fn ids(found: &[ElementHandle]) -> Vec<&str> {
        found.iter().map(|e| e.id.as_str()).collect()
    }

    mod builder_tests {
        use super::*;

        #[test]
        fn test_css_locator() {
            let loc = Locator::css("button[type='submit']");
            assert_eq!(
                loc.strategy(),
                &Strategy::Css("button[type='submit']".into())
            );
            assert!(loc.alternatives().is_empty());
        }

        #[test]
        fn test_name_is_attribute_equals() {
            let loc = Locator::name("firstName");
            assert_eq!(
                loc.strategy(),
                &Strategy::AttributeEquals {
                    name: "name".into(),
                    value: "firstName".into()
                }
            );
        }

        #[test]
        fn test_or_appends_in_declaration_order() {
            let loc = Locator::text("Get Started")
                .or(Locator::text("Register"))
                .or(Locator::css("a.cta"));
            let strategies = loc.strategies();
            assert_eq!(strategies.len(), 3);
            assert_eq!(strategies[0], &Strategy::TextContains("Get Started".into()));
            assert_eq!(strategies[1], &Strategy::TextContains("Register".into()));
            assert_eq!(strategies[2], &Strategy::Css("a.cta".into()));
        }

        #[test]
        fn test_nested_alternatives_flatten_depth_first() {
            let inner = Locator::tag("b").or(Locator::tag("c"));
            let loc = Locator::tag("a").or(inner).or(Locator::tag("d"));
            let tags: Vec<String> = loc.strategies().iter().map(|s| s.to_string()).collect();
            assert_eq!(tags, vec!["tag `a`", "tag `b`", "tag `c`", "tag `d`"]);
        }

        #[test]
        fn test_display_joins_alternatives() {
            let loc = Locator::text("Completed").or(Locator::text("Upcoming"));
            assert_eq!(loc.to_string(), "text \"Completed\" | text \"Upcoming\"");
        }

        #[test]
        fn test_locator_serde_roundtrip_keeps_alternatives() {
            let loc = Locator::name("email").or(Locator::css("input[type='email']"));
            let json = serde_json::to_string(&loc).unwrap();
            let back: Locator = serde_json::from_str(&json).unwrap();
            assert_eq!(loc, back);
        }
    }

    mod strategy_tests {
        use super::*;

        #[test]
        fn test_matches_attribute() {
            let el = ElementHandle::new("1", "input").with_attribute("value", "user");
            assert!(Strategy::AttributeEquals {
                name: "value".into(),
                value: "user".into()
            }
            .matches_element(&el));
            assert!(!Strategy::AttributeEquals {
                name: "value".into(),
                value: "admin".into()
            }
            .matches_element(&el));
        }

        #[test]
        fn test_matches_tag_case_insensitive() {
            let el = ElementHandle::new("1", "nav");
            assert!(Strategy::TagName("NAV".into()).matches_element(&el));
        }

        #[test]
        fn test_matches_text_substring() {
            let el = ElementHandle::new("1", "h2").with_text("Why Choose Us");
            assert!(Strategy::TextContains("Why Choose".into()).matches_element(&el));
            assert!(!Strategy::TextContains("Features".into()).matches_element(&el));
        }
    }

    mod resolve_tests {
        use super::*;

        #[test]
        fn test_resolve_primary_match() {
            let page = TablePage::default().with(Strategy::TagName("h1".into()), &["h"]);
            let found = Locator::tag("h1").resolve(&page).unwrap();
            assert_eq!(ids(&found), vec!["h"]);
        }

        #[test]
        fn test_resolve_falls_back_to_alternative() {
            let page = TablePage::default().with(Strategy::TextContains("Register".into()), &["r"]);
            let loc = Locator::text("Get Started").or(Locator::text("Register"));
            let found = loc.resolve(&page).unwrap();
            assert_eq!(ids(&found), vec!["r"]);
        }

        #[test]
        fn test_resolve_first_match_wins_and_stops() {
            let page = TablePage::default()
                .with(Strategy::TextContains("Get Started".into()), &["g"])
                .with(Strategy::TextContains("Register".into()), &["r"]);
            let loc = Locator::text("Get Started").or(Locator::text("Register"));
            let found = loc.resolve(&page).unwrap();
            assert_eq!(ids(&found), vec!["g"]);
            assert_eq!(page.queried.borrow().len(), 1);
        }

        #[test]
        fn test_resolve_nothing_is_empty_not_error() {
            let page = TablePage::default();
            let found = Locator::tag("h1").or(Locator::tag("h2")).resolve(&page).unwrap();
            assert!(found.is_empty());
            assert_eq!(page.queried.borrow().len(), 2);
        }

        #[test]
        fn test_resolve_first() {
            let page = TablePage::default().with(Strategy::TagName("li".into()), &["a", "b"]);
            let first = Locator::tag("li").resolve_first(&page).unwrap().unwrap();
            assert_eq!(first.id, "a");
        }

        #[test]
        fn test_resolve_against_closed_state_errors() {
            let page = TablePage {
                closed: true,
                ..TablePage::default()
            };
            let err = Locator::tag("h1").resolve(&page).unwrap_err();
            assert!(matches!(err, VigilError::SessionClosed { .. }));
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;
        use super::Strategy;

        proptest! {
            /// Any matching alternative makes the result non-empty and equal to the
            /// first matching alternative's set.
            #[test]
            fn prop_or_semantics(matches in proptest::collection::vec(0usize..3, 1..6)) {
                let mut page = TablePage::default();
                let mut locator: Option<Locator> = None;
                for (i, count) in matches.iter().enumerate() {
                    let strategy = Strategy::TagName(format!("t{i}"));
                    let element_ids: Vec<String> = (0..*count).map(|j| format!("{i}-{j}")).collect();
                    let refs: Vec<&str> = element_ids.iter().map(String::as_str).collect();
                    page = page.with(strategy.clone(), &refs);
                    let alt = Locator::new(strategy);
                    locator = Some(match locator {
                        None => alt,
                        Some(l) => l.or(alt),
                    });
                }
                let locator = locator.unwrap();
                let found = locator.resolve(&page).unwrap();

                match matches.iter().position(|c| *c > 0) {
                    Some(first) => {
                        let expected = page.table[&Strategy::TagName(format!("t{first}"))].clone();
                        prop_assert_eq!(found, expected);
                    }
                    None => prop_assert!(found.is_empty()),
                }
            }
        }
    }
}
