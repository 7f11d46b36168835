use serde::Deserialize;
use std::fmt;

/// Something to locate on the page - a CSS selector or visible text.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct Target {
    /// CSS selector.
    pub selector: Option<String>,
    /// Visible text of a clickable or form element (case-insensitive).
    pub text: Option<String>,
}

impl Target {
    pub fn selector(selector: impl Into<String>) -> Self {
        Self {
            selector: Some(selector.into()),
            text: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            selector: None,
            text: Some(text.into()),
        }
    }

    /// True when neither a selector nor a text is set.
    pub fn is_empty(&self) -> bool {
        self.selector.is_none() && self.text.is_none()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.selector, &self.text) {
            (Some(s), _) => write!(f, "selector '{}'", s),
            (_, Some(t)) => write!(f, "text '{}'", t),
            _ => write!(f, "unknown"),
        }
    }
}

/// A resolved element, addressed by a CSS selector that was unique when found.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    selector: String,
}

impl ElementHandle {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
        }
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.selector)
    }
}
