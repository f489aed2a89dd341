use std::collections::HashSet;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Selectable trigger categories shown on the trigger-log stage. The engine
/// treats entries as opaque strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct TriggerCatalog {
    categories: Vec<String>,
}

impl Default for TriggerCatalog {
    fn default() -> Self {
        Self {
            categories: [
                "work",
                "relationships",
                "health",
                "finances",
                "family",
                "social",
                "sleep",
                "news",
                "other",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl TriggerCatalog {
    pub fn from_json(json: &str) -> Result<Self> {
        let mut catalog: TriggerCatalog =
            serde_json::from_str(json).context("failed to parse trigger catalog")?;
        let mut seen = HashSet::new();
        catalog
            .categories
            .retain(|c| !c.trim().is_empty() && seen.insert(c.clone()));
        Ok(catalog)
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn contains(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_has_work() {
        assert!(TriggerCatalog::default().contains("work"));
    }

    #[test]
    fn from_json_drops_blank_entries() {
        let catalog = TriggerCatalog::from_json(r#"["work", " ", "exams"]"#).unwrap();
        assert_eq!(catalog.categories(), ["work".to_string(), "exams".to_string()]);
    }

    #[test]
    fn from_json_keeps_first_occurrence_of_repeats() {
        let catalog = TriggerCatalog::from_json(r#"["work", "exams", "work", "exams"]"#).unwrap();
        assert_eq!(catalog.categories(), ["work".to_string(), "exams".to_string()]);
    }
}
