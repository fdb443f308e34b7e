use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator};

/// The closed set of labels a message can be classified into
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Category {
    /// Time-sensitive, requires immediate action
    Urgent,
    Academic,
    Administrative,
    Social,
    Promotional,
    Other,
}

impl Category {
    pub const CATCH_ALL: Category = Category::Other;

    pub fn all() -> Vec<Category> {
        Category::iter().collect()
    }

    /// Exact, case-sensitive lookup of a label
    pub fn parse(label: &str) -> Option<Category> {
        Category::from_str(label).ok()
    }
}

/// Returns the labels from `requested` that are not in the category set
pub fn invalid_categories(requested: &[String]) -> Vec<String> {
    requested
        .iter()
        .filter(|label| Category::parse(label).is_none())
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: Category,
    pub confidence: f32,
    pub reasoning: String,
}

impl ClassificationResult {
    pub fn new(category: Category, confidence: f32, reasoning: impl Into<String>) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            category,
            confidence,
            reasoning: reasoning.into(),
        }
    }

    /// Builds a result from an untrusted label. Labels outside the set are
    /// coerced to the catch-all with zero confidence.
    pub fn from_label(label: &str, confidence: f32, reasoning: impl Into<String>) -> Self {
        match Category::parse(label) {
            Some(category) => Self::new(category, confidence, reasoning),
            None => Self::new(
                Category::CATCH_ALL,
                0.0,
                format!("Invalid category returned: {}", label),
            ),
        }
    }

    /// The result recorded when classification could not be completed
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        Self::new(
            Category::CATCH_ALL,
            0.0,
            format!("Classification failed - {}", reason),
        )
    }
}
