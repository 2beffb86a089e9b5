//! Selector strategies for element lookup.
//!
//! Selectors are opaque: the string is handed to the driver backend as-is
//! and never parsed here.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Selector type for locating elements
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Selector {
    /// CSS selector (e.g., "button.primary")
    Css(String),
    /// Exact visible text of a link
    LinkText(String),
    /// Element tag name
    TagName(String),
    /// XPath expression
    XPath(String),
}

impl Selector {
    /// Create a CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Create a link text selector
    #[must_use]
    pub fn link_text(text: impl Into<String>) -> Self {
        Self::LinkText(text.into())
    }

    /// Create a tag name selector
    #[must_use]
    pub fn tag_name(tag: impl Into<String>) -> Self {
        Self::TagName(tag.into())
    }

    /// Create an XPath selector
    #[must_use]
    pub fn xpath(expr: impl Into<String>) -> Self {
        Self::XPath(expr.into())
    }

    /// Raw selector value
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Css(s) | Self::LinkText(s) | Self::TagName(s) | Self::XPath(s) => s,
        }
    }

    /// Strategy name, as used in W3C WebDriver `using` fields
    #[must_use]
    pub const fn strategy(&self) -> &'static str {
        match self {
            Self::Css(_) => "css selector",
            Self::LinkText(_) => "link text",
            Self::TagName(_) => "tag name",
            Self::XPath(_) => "xpath",
        }
    }

    /// Convert to a JavaScript expression resolving the first match under `root`
    #[must_use]
    pub fn to_query(&self, root: &str) -> String {
        let v = js_string(self.value());
        match self {
            Self::Css(_) => format!("{root}.querySelector({v})"),
            Self::TagName(_) => format!("({root}.getElementsByTagName({v})[0] || null)"),
            Self::LinkText(_) => format!(
                "(Array.from({root}.querySelectorAll('a')).find(a => a.innerText.trim() === {v}) || null)"
            ),
            Self::XPath(_) => format!(
                "document.evaluate({v}, {root}, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue"
            ),
        }
    }

    /// Convert to a JavaScript expression resolving every match under `root`
    #[must_use]
    pub fn to_query_all(&self, root: &str) -> String {
        let v = js_string(self.value());
        match self {
            Self::Css(_) => format!("Array.from({root}.querySelectorAll({v}))"),
            Self::TagName(_) => format!("Array.from({root}.getElementsByTagName({v}))"),
            Self::LinkText(_) => format!(
                "Array.from({root}.querySelectorAll('a')).filter(a => a.innerText.trim() === {v})"
            ),
            Self::XPath(_) => format!(
                "(() => {{ const r = document.evaluate({v}, {root}, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null); \
                 const out = []; for (let i = 0; i < r.snapshotLength; i++) out.push(r.snapshotItem(i)); return out; }})()"
            ),
        }
    }
}

/// Quote `s` as a JavaScript string literal
#[must_use]
pub fn js_string(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy(), self.value())
    }
}

impl From<&str> for Selector {
    fn from(css: &str) -> Self {
        Self::css(css)
    }
}

impl From<String> for Selector {
    fn from(css: String) -> Self {
        Self::Css(css)
    }
}
