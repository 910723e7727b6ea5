//! Paywall marker embedded at the end of assistant replies
//!
//! `"<reply>\n\n[[PAYWALL::<title>::<price>]]"`. The console looks for it to
//! render a "pay" affordance next to the message.

use serde::{Deserialize, Serialize};
use std::fmt;

const MARKER_OPEN: &str = "[[PAYWALL::";
const MARKER_CLOSE: &str = "]]";
const FIELD_SEPARATOR: &str = "::";
const DEFAULT_TITLE: &str = "Paywall";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaywallMarker {
    pub title: String,
    pub price: String,
}

impl PaywallMarker {
    /// Title falls back to "Paywall" when missing or blank; price may be empty.
    pub fn new(title: Option<&str>, price: Option<&str>) -> Self {
        let title = title.map(str::trim).filter(|t| !t.is_empty()).unwrap_or(DEFAULT_TITLE);
        Self {
            title: title.to_string(),
            price: price.map(str::trim).unwrap_or_default().to_string(),
        }
    }

    /// Append the marker to a reply. The marker is always the last thing in
    /// the stored content.
    pub fn append_to(&self, reply: &str) -> String {
        format!("{reply}\n\n{self}")
    }

    /// Split stored content into the visible text and its trailing marker.
    ///
    /// Returns `None` when the content does not end with a marker.
    pub fn split(content: &str) -> Option<(&str, Self)> {
        let body = content.trim_end().strip_suffix(MARKER_CLOSE)?;
        let (text, meta) = body.rsplit_once(MARKER_OPEN)?;
        let mut fields = meta.split(FIELD_SEPARATOR);
        let marker = Self::new(fields.next(), fields.next());
        Some((text.trim(), marker))
    }
}

impl fmt::Display for PaywallMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{MARKER_OPEN}{}{FIELD_SEPARATOR}{}{MARKER_CLOSE}",
            self.title, self.price
        )
    }
}
