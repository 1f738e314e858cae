//! Script-filter feedback for the host launcher
//!
//! Interactive commands print a single JSON document on stdout. The host
//! renders `items` as the result list and, when `rerun` is set, invokes
//! the executable again after that many seconds so placeholder rows
//! resolve once background jobs have landed.

use serde::Serialize;

/// Delay in seconds before the host re-invokes while jobs are running
pub const RERUN_INTERVAL: f32 = 0.2;

/// One feedback document, printed once per interactive invocation
#[derive(Debug, Default, Serialize)]
pub struct Feedback {
    #[serde(skip_serializing_if = "Option::is_none")]
    rerun: Option<f32>,
    items: Vec<Item>,
}

impl Feedback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the host to re-invoke after [`RERUN_INTERVAL`]
    pub fn rerun(&mut self) {
        self.rerun = Some(RERUN_INTERVAL);
    }

    pub fn push(&mut self, item: Item) {
        self.items.push(item);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Prints the document on stdout for the host to consume
    pub fn emit(&self) -> serde_json::Result<()> {
        println!("{}", serde_json::to_string(self)?);
        Ok(())
    }
}

/// One row in the host's result list
#[derive(Debug, Default, Serialize)]
pub struct Item {
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    arg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    autocomplete: Option<String>,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<Icon>,
}

#[derive(Debug, Serialize)]
struct Icon {
    path: String,
}

impl Item {
    /// Creates an actionable row
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            valid: true,
            ..Self::default()
        }
    }

    /// Creates a display-only row that cannot be actioned
    pub fn hint(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            valid: false,
            ..Self::default()
        }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.arg = Some(arg.into());
        self
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    pub fn with_autocomplete(mut self, autocomplete: impl Into<String>) -> Self {
        self.autocomplete = Some(autocomplete.into());
        self
    }

    pub fn with_icon(mut self, path: impl Into<String>) -> Self {
        self.icon = Some(Icon { path: path.into() });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_item_serializes_all_set_fields() {
        let mut feedback = Feedback::new();
        feedback.push(
            Item::new("The Dispossessed")
                .with_subtitle("Ursula K. Le Guin, 1974 (4.25 stars)")
                .with_arg("https://example.test/book/18423")
                .with_uid("book-18423")
                .with_icon("icons/00/18/18423.png"),
        );

        let value: Value = serde_json::to_value(&feedback).unwrap();
        assert_eq!(
            value,
            json!({
                "items": [{
                    "title": "The Dispossessed",
                    "subtitle": "Ursula K. Le Guin, 1974 (4.25 stars)",
                    "arg": "https://example.test/book/18423",
                    "uid": "book-18423",
                    "valid": true,
                    "icon": {"path": "icons/00/18/18423.png"}
                }]
            })
        );
    }

    #[test]
    fn test_unset_fields_are_omitted() {
        let mut feedback = Feedback::new();
        feedback.push(Item::hint("Loading your shelves"));

        let value: Value = serde_json::to_value(&feedback).unwrap();
        assert_eq!(
            value,
            json!({
                "items": [{"title": "Loading your shelves", "valid": false}]
            })
        );
    }

    #[test]
    fn test_rerun_is_included_when_set() {
        let mut feedback = Feedback::new();
        feedback.rerun();
        feedback.push(Item::hint("Loading"));

        let value: Value = serde_json::to_value(&feedback).unwrap();
        assert!((value["rerun"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_is_empty() {
        let mut feedback = Feedback::new();
        assert!(feedback.is_empty());
        feedback.push(Item::hint("row"));
        assert!(!feedback.is_empty());
    }
}
