//! Page-state seam consumed from the browser driver
//!
//! The concrete browser automation lives outside this crate. Healing only
//! needs two operations from it: a snapshot of the currently visible
//! interactive elements and a visibility probe for a candidate locator.

use async_trait::async_trait;
use mend_core::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One visible interactive element as reported by the driver
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageElement {
    /// Element tag name (lowercase)
    pub tag: String,
    /// Trimmed visible text, if any
    pub text: Option<String>,
    /// `id` attribute
    pub id: Option<String>,
    /// Class tokens
    pub classes: Vec<String>,
    /// ARIA role
    pub role: Option<String>,
    /// Stable test identifier attribute (`data-testid`)
    pub test_id: Option<String>,
    /// `aria-label` attribute
    pub aria_label: Option<String>,
    /// `name` attribute
    pub name_attr: Option<String>,
    /// `type` attribute
    pub type_attr: Option<String>,
}

impl PageElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_classes(mut self, classes: Vec<String>) -> Self {
        self.classes = classes;
        self
    }

    pub fn with_test_id(mut self, test_id: impl Into<String>) -> Self {
        self.test_id = Some(test_id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name_attr = Some(name.into());
        self
    }

    pub fn with_type(mut self, type_attr: impl Into<String>) -> Self {
        self.type_attr = Some(type_attr.into());
        self
    }

    pub fn with_aria_label(mut self, label: impl Into<String>) -> Self {
        self.aria_label = Some(label.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Compact single-line description for semantic prompts
    pub fn describe(&self) -> String {
        let mut parts = vec![format!("<{}>", self.tag)];

        if let Some(ref text) = self.text {
            parts.push(format!("text={:?}", text));
        }
        if let Some(ref id) = self.id {
            parts.push(format!("id={}", id));
        }
        if !self.classes.is_empty() {
            parts.push(format!("class={}", self.classes.join(" ")));
        }
        if let Some(ref role) = self.role {
            parts.push(format!("role={}", role));
        }
        if let Some(ref test_id) = self.test_id {
            parts.push(format!("data-testid={}", test_id));
        }
        if let Some(ref label) = self.aria_label {
            parts.push(format!("aria-label={:?}", label));
        }

        parts.join(" ")
    }
}

/// Operations the healing cascade consumes from the browser driver.
#[async_trait]
pub trait PageProbe: Send + Sync {
    /// Currently visible interactive elements
    async fn snapshot(&self) -> Result<Vec<PageElement>>;

    /// Whether `locator` resolves to a visible element within `timeout`.
    ///
    /// Probe failures count as "not visible"; the cascade treats them as
    /// an ordinary miss for that candidate.
    async fn is_visible(&self, locator: &str, timeout: Duration) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_is_compact() {
        let el = PageElement::new("button")
            .with_text("Submit Order")
            .with_id("submit")
            .with_classes(vec!["btn".to_string(), "btn-primary".to_string()]);

        let desc = el.describe();
        assert!(desc.starts_with("<button>"));
        assert!(desc.contains("text=\"Submit Order\""));
        assert!(desc.contains("id=submit"));
        assert!(desc.contains("class=btn btn-primary"));
    }

    #[test]
    fn test_describe_skips_missing_attributes() {
        let el = PageElement::new("input");
        assert_eq!(el.describe(), "<input>");
    }
}
