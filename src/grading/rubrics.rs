use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Scoring criteria for the three graded dimensions. Kept as raw JSON so
/// a library may use plain strings, lists, or level-keyed objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    #[serde(default, alias = "内容")]
    pub content: serde_json::Value,
    #[serde(default, alias = "语言")]
    pub language: serde_json::Value,
    #[serde(default, alias = "组织")]
    pub organization: serde_json::Value,
}

/// Everything the scoring prompt needs for one question category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricEntry {
    #[serde(default, alias = "评分标准")]
    pub criteria: Criteria,
    /// Hints the model uses to pick a grade band. Not consulted by the
    /// deterministic fallback.
    #[serde(default, alias = "评分等级逻辑")]
    pub grade_band_logic: serde_json::Value,
    #[serde(default, alias = "常见强项关键词")]
    pub strength_keywords: Vec<String>,
    #[serde(default, alias = "常见弱项关键词")]
    pub weakness_keywords: Vec<String>,
    #[serde(default, alias = "评语模板")]
    pub comment_templates: serde_json::Value,
}

/// Ordered set of question categories and their rubrics. Immutable once
/// loaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RubricLibrary {
    #[serde(default, alias = "题目类型")]
    pub categories: Vec<String>,
    #[serde(default, alias = "组件库")]
    pub rubrics: HashMap<String, RubricEntry>,
}

impl RubricLibrary {
    /// Load the library from a JSON file on disk.
    /// Falls back to an empty library if the file is missing or malformed.
    pub fn load_from_file(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::from_json_str(&contents) {
                Ok(library) => {
                    if library.categories.is_empty() || library.rubrics.is_empty() {
                        warn!(
                            "Rubric library at {} is incomplete: {} categories, {} rubrics",
                            path.display(),
                            library.categories.len(),
                            library.rubrics.len()
                        );
                    } else {
                        info!(
                            "Loaded rubric library with {} categories from {}",
                            library.categories.len(),
                            path.display()
                        );
                    }
                    library
                }
                Err(e) => {
                    warn!(
                        "Failed to parse rubric library at {}: {}. Using empty library.",
                        path.display(),
                        e
                    );
                    RubricLibrary::default()
                }
            },
            Err(e) => {
                warn!(
                    "Failed to read rubric library at {}: {}. Using empty library.",
                    path.display(),
                    e
                );
                RubricLibrary::default()
            }
        }
    }

    pub fn from_json_str(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(contents)
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Category names in configured order.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn first_category(&self) -> Option<&str> {
        self.categories.first().map(String::as_str)
    }

    pub fn contains(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }

    /// Look up the rubric for a category.
    pub fn get(&self, category: &str) -> Option<&RubricEntry> {
        self.rubrics.get(category)
    }
}

#[cfg(test)]
pub(crate) const SAMPLE: &str = include_str!("../../rubrics/sample.json");

#[cfg(test)]
pub(crate) fn sample_library() -> RubricLibrary {
    RubricLibrary::from_json_str(SAMPLE).unwrap()
}
