//! Retryable predicates over page state.
//!
//! A [`Condition`] is a named, side-effect-free check. Evaluating it once
//! yields a [`ConditionResult`]; the poller decides whether to try again.
//!
//! ```text
//!            ┌──────────── Pending (retry) ───────────┐
//!            ▼                                        │
//!      ┌──────────┐  Satisfied   ┌───────────────┐    │
//!      │ evaluate │─────────────►│ success       │    │
//!      └──────────┘              └───────────────┘    │
//!         │    │     Failed      ┌───────────────┐    │
//!         │    └────────────────►│ hard failure  │    │
//!         │                      └───────────────┘    │
//!         └───────────────────────────────────────────┘
//! ```

use crate::driver::{ElementHandle, PageState};
use crate::locator::Locator;
use crate::result::VigilResult;
use serde::Serialize;
use std::sync::Arc;

/// What a satisfied condition saw
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum Observation {
    /// A matching element
    Element(ElementHandle),
    /// The current URL
    Url(String),
    /// The document title
    Title(String),
    /// Nothing matched, as required
    Absent,
    /// Custom predicate held
    Confirmed,
    /// Observations of every sub-condition of an `all_of`
    All(Vec<Observation>),
}

impl Observation {
    /// The observed element, if this observation carries one
    #[must_use]
    pub const fn element(&self) -> Option<&ElementHandle> {
        match self {
            Self::Element(el) => Some(el),
            _ => None,
        }
    }

    /// Consume into the observed element
    #[must_use]
    pub fn into_element(self) -> Option<ElementHandle> {
        match self {
            Self::Element(el) => Some(el),
            _ => None,
        }
    }
}

/// Result of evaluating a condition once
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionResult {
    /// Not yet; try again
    Pending,
    /// Holds, with what was observed
    Satisfied(Observation),
    /// Can never hold; stop waiting
    Failed(String),
}

impl ConditionResult {
    /// Check if satisfied
    #[must_use]
    pub const fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied(_))
    }

    /// Check if pending
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Check if failed
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

type Evaluator = dyn Fn(&dyn PageState) -> VigilResult<ConditionResult> + Send + Sync;

/// A named, composable predicate over page state
#[derive(Clone)]
pub struct Condition {
    description: String,
    evaluator: Arc<Evaluator>,
}

impl std::fmt::Debug for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Condition")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.description)
    }
}

impl Condition {
    /// Create a condition from an evaluation function
    pub fn new<F>(description: impl Into<String>, evaluator: F) -> Self
    where
        F: Fn(&dyn PageState) -> VigilResult<ConditionResult> + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            evaluator: Arc::new(evaluator),
        }
    }

    /// Condition built from a plain boolean predicate
    pub fn predicate<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&dyn PageState) -> VigilResult<bool> + Send + Sync + 'static,
    {
        Self::new(description, move |state| {
            Ok(if predicate(state)? {
                ConditionResult::Satisfied(Observation::Confirmed)
            } else {
                ConditionResult::Pending
            })
        })
    }

    /// Description used in failure messages
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Evaluate once against the current state
    ///
    /// # Errors
    ///
    /// Propagates state errors such as `SessionClosed`.
    pub fn evaluate(&self, state: &dyn PageState) -> VigilResult<ConditionResult> {
        (self.evaluator)(state)
    }

    /// At least one element matches `locator`
    pub fn element_present(locator: Locator) -> Self {
        Self::new(format!("element {locator} present"), move |state| {
            Ok(match locator.resolve_first(state)? {
                Some(el) => ConditionResult::Satisfied(Observation::Element(el)),
                None => ConditionResult::Pending,
            })
        })
    }

    /// A visible element matches `locator`
    pub fn element_visible(locator: Locator) -> Self {
        Self::new(format!("element {locator} visible"), move |state| {
            Ok(first_where(&locator, state, ElementHandle::is_visible)?.map_or(
                ConditionResult::Pending,
                |el| ConditionResult::Satisfied(Observation::Element(el)),
            ))
        })
    }

    /// A visible, enabled element matches `locator`
    pub fn element_clickable(locator: Locator) -> Self {
        Self::new(format!("element {locator} clickable"), move |state| {
            Ok(first_where(&locator, state, ElementHandle::is_clickable)?.map_or(
                ConditionResult::Pending,
                |el| ConditionResult::Satisfied(Observation::Element(el)),
            ))
        })
    }

    /// No visible element matches `locator`
    pub fn element_absent(locator: Locator) -> Self {
        Self::new(format!("element {locator} absent"), move |state| {
            Ok(match first_where(&locator, state, ElementHandle::is_visible)? {
                Some(_) => ConditionResult::Pending,
                None => ConditionResult::Satisfied(Observation::Absent),
            })
        })
    }

    /// Visible text somewhere on the page
    pub fn text_present(text: impl Into<String>) -> Self {
        let text = text.into();
        let mut condition = Self::element_visible(Locator::text(text.clone()));
        condition.description = format!("text {text:?} visible");
        condition
    }

    /// Current URL contains `fragment`
    pub fn url_contains(fragment: impl Into<String>) -> Self {
        let fragment = fragment.into();
        Self::new(format!("URL contains {fragment:?}"), move |state| {
            let url = state.current_url()?;
            Ok(if url.contains(fragment.as_str()) {
                ConditionResult::Satisfied(Observation::Url(url))
            } else {
                ConditionResult::Pending
            })
        })
    }

    /// Document title contains `fragment`
    pub fn title_contains(fragment: impl Into<String>) -> Self {
        let fragment = fragment.into();
        Self::new(format!("title contains {fragment:?}"), move |state| {
            let title = state.title()?;
            Ok(if title.contains(fragment.as_str()) {
                ConditionResult::Satisfied(Observation::Title(title))
            } else {
                ConditionResult::Pending
            })
        })
    }

    /// First element matching `locator` has attribute `name` equal to `value`
    pub fn attribute_equals(
        locator: Locator,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let value = value.into();
        Self::new(
            format!("element {locator} has {name}={value:?}"),
            move |state| {
                Ok(match locator.resolve_first(state)? {
                    Some(el) if el.attribute(&name) == Some(value.as_str()) => {
                        ConditionResult::Satisfied(Observation::Element(el))
                    }
                    _ => ConditionResult::Pending,
                })
            },
        )
    }

    /// First element matching `locator` carries attribute `name`, whatever its value
    pub fn has_attribute(locator: Locator, name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            format!("element {locator} has attribute {name}"),
            move |state| {
                Ok(match locator.resolve_first(state)? {
                    Some(el) if el.attribute(&name).is_some() => {
                        ConditionResult::Satisfied(Observation::Element(el))
                    }
                    _ => ConditionResult::Pending,
                })
            },
        )
    }

    /// First element matching `locator` is a checked checkbox or radio
    pub fn element_checked(locator: Locator) -> Self {
        Self::checked_state(locator, true)
    }

    /// First element matching `locator` is present and not checked
    pub fn element_unchecked(locator: Locator) -> Self {
        Self::checked_state(locator, false)
    }

    fn checked_state(locator: Locator, checked: bool) -> Self {
        let word = if checked { "checked" } else { "unchecked" };
        Self::new(format!("element {locator} {word}"), move |state| {
            Ok(match locator.resolve_first(state)? {
                Some(el) if el.is_checked() == checked => {
                    ConditionResult::Satisfied(Observation::Element(el))
                }
                _ => ConditionResult::Pending,
            })
        })
    }

    /// Satisfied when every sub-condition is satisfied.
    ///
    /// Stops at the first `Pending` or `Failed` sub-condition.
    pub fn all_of(conditions: Vec<Self>) -> Self {
        let description = format!("all of [{}]", join_descriptions(&conditions));
        Self::new(description, move |state| {
            let mut observed = Vec::with_capacity(conditions.len());
            for condition in &conditions {
                match condition.evaluate(state)? {
                    ConditionResult::Satisfied(obs) => observed.push(obs),
                    other => return Ok(other),
                }
            }
            Ok(ConditionResult::Satisfied(Observation::All(observed)))
        })
    }

    /// Satisfied when any sub-condition is satisfied.
    ///
    /// Stops at the first `Satisfied`. Fails only once every sub-condition
    /// has failed; a mix of failed and pending stays `Pending`.
    pub fn any_of(conditions: Vec<Self>) -> Self {
        let description = format!("any of [{}]", join_descriptions(&conditions));
        Self::new(description, move |state| {
            let mut reasons = Vec::new();
            let mut pending = false;
            for condition in &conditions {
                match condition.evaluate(state)? {
                    ConditionResult::Satisfied(obs) => return Ok(ConditionResult::Satisfied(obs)),
                    ConditionResult::Pending => pending = true,
                    ConditionResult::Failed(reason) => {
                        reasons.push(format!("{}: {reason}", condition.description));
                    }
                }
            }
            Ok(if pending {
                ConditionResult::Pending
            } else if reasons.is_empty() {
                ConditionResult::Failed("no alternatives".to_string())
            } else {
                ConditionResult::Failed(reasons.join("; "))
            })
        })
    }

    /// Fail immediately when a visible element matches `locator`.
    ///
    /// Checked before this condition on every evaluation, so an error banner
    /// ends the wait instead of running out the timeout.
    pub fn fail_when(self, locator: Locator, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let description = self.description.clone();
        Self::new(description, move |state| {
            if let Some(el) = first_where(&locator, state, ElementHandle::is_visible)? {
                let text = el.text().trim();
                let detail = if text.is_empty() {
                    reason.clone()
                } else {
                    format!("{reason}: {text}")
                };
                return Ok(ConditionResult::Failed(detail));
            }
            self.evaluate(state)
        })
    }
}

fn first_where(
    locator: &Locator,
    state: &dyn PageState,
    keep: fn(&ElementHandle) -> bool,
) -> VigilResult<Option<ElementHandle>> {
    Ok(locator.resolve(state)?.into_iter().find(|el| keep(el)))
}

fn join_descriptions(conditions: &[Condition]) -> String {
    conditions
        .iter()
        .map(|c| c.description.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
