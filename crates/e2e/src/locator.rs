//! Element locators

use serde::{Deserialize, Serialize};
use std::fmt;

/// How to find an element on the page.
///
/// In scenario files a locator is written as either
/// `{ selector: 'input[type="email"]' }` or
/// `{ text: { tag: button, contains: "Sign in" } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locator {
    /// Structural CSS selector
    Selector(String),

    /// First element of `tag` whose rendered text contains `contains`
    Text {
        #[serde(default = "default_text_tag")]
        tag: String,
        contains: String,
    },
}

fn default_text_tag() -> String {
    "button".to_string()
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Selector(selector.into())
    }

    pub fn text(tag: impl Into<String>, contains: impl Into<String>) -> Self {
        Locator::Text {
            tag: tag.into(),
            contains: contains.into(),
        }
    }

    /// CSS selector that yields the candidate set, in document order.
    pub fn candidate_selector(&self) -> &str {
        match self {
            Locator::Selector(selector) => selector,
            Locator::Text { tag, .. } => tag,
        }
    }

    /// Whether the candidate's text content satisfies this locator.
    /// Selector locators accept every candidate.
    pub fn accepts_text(&self, text: Option<&str>) -> bool {
        match self {
            Locator::Selector(_) => true,
            Locator::Text { contains, .. } => {
                text.map(|t| t.contains(contains.as_str())).unwrap_or(false)
            }
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Locator::Text { .. })
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Selector(selector) => write!(f, "{}", selector),
            Locator::Text { tag, contains } => write!(f, "{} containing \"{}\"", tag, contains),
        }
    }
}
