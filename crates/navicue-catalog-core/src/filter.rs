use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{ContentItem, Facet};

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FacetConstraint {
    Any,
    Exact(String),
}

/// Sparse description of what the caller wants to see.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct FilterSpec {
    #[serde(default)]
    pub facets: BTreeMap<String, FacetConstraint>,
    #[serde(default)]
    pub free_text: Option<String>,
}

impl FilterSpec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_facet(mut self, facet: impl Into<String>, value: impl Into<String>) -> Self {
        self.facets.insert(facet.into(), FacetConstraint::Exact(value.into()));
        self
    }

    #[must_use]
    pub fn with_known_facet(self, facet: Facet, value: impl Into<String>) -> Self {
        self.with_facet(facet.as_str(), value)
    }

    #[must_use]
    pub fn with_any(mut self, facet: impl Into<String>) -> Self {
        self.facets.insert(facet.into(), FacetConstraint::Any);
        self
    }

    #[must_use]
    pub fn with_free_text(mut self, text: impl Into<String>) -> Self {
        self.free_text = Some(text.into());
        self
    }
}

/// A compiled [`FilterSpec`].
///
/// Only the constraints that actually narrow the result survive compilation:
/// `any` facets and empty free text are dropped.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Predicate {
    facets: Vec<(String, String)>,
    needle: Option<String>,
}

impl Predicate {
    #[must_use]
    pub fn always() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_always(&self) -> bool {
        self.facets.is_empty() && self.needle.is_none()
    }

    #[must_use]
    pub fn matches(&self, item: &ContentItem) -> bool {
        let facets_match = self
            .facets
            .iter()
            .all(|(facet, value)| item.tag(facet) == Some(value.as_str()));
        if !facets_match {
            return false;
        }

        match &self.needle {
            None => true,
            Some(needle) => {
                item.text_line.to_lowercase().contains(needle.as_str())
                    || item.free_tags.iter().any(|tag| tag.to_lowercase().contains(needle.as_str()))
            }
        }
    }
}

#[must_use]
pub fn compile(spec: &FilterSpec) -> Predicate {
    let facets = spec
        .facets
        .iter()
        .filter_map(|(facet, constraint)| match constraint {
            FacetConstraint::Any => None,
            FacetConstraint::Exact(value) => Some((facet.clone(), value.clone())),
        })
        .collect();

    Predicate { facets, needle: spec.free_text.as_deref().and_then(normalize_free_text) }
}

fn normalize_free_text(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    Some(raw.to_lowercase())
}
