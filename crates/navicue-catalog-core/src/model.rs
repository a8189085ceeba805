use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::CatalogError;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Draft,
    #[default]
    Active,
    Archived,
}

impl ContentStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "active" => Some(Self::Active),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// Facet keys the scorer and the library browser know by name.
///
/// `category_tags` is an open map, so any other facet name can still be
/// filtered on; these are just the ones with meaning attached.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Facet {
    Schema,
    Family,
    PillarId,
    ResponseType,
    HeatLevel,
    KbeTarget,
}

impl Facet {
    pub const ALL: [Self; 6] = [
        Self::Schema,
        Self::Family,
        Self::PillarId,
        Self::ResponseType,
        Self::HeatLevel,
        Self::KbeTarget,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::Family => "family",
            Self::PillarId => "pillar_id",
            Self::ResponseType => "response_type",
            Self::HeatLevel => "heat_level",
            Self::KbeTarget => "kbe_target",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|facet| facet.as_str() == value)
    }
}

impl Display for Facet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Knowing → believing → embodying, then back to knowing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum KbeStage {
    Knowing,
    Believing,
    Embodying,
}

impl KbeStage {
    pub const CYCLE: [Self; 3] = [Self::Knowing, Self::Believing, Self::Embodying];

    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Knowing => Self::Believing,
            Self::Believing => Self::Embodying,
            Self::Embodying => Self::Knowing,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Knowing => "knowing",
            Self::Believing => "believing",
            Self::Embodying => "embodying",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "knowing" => Some(Self::Knowing),
            "believing" => Some(Self::Believing),
            "embodying" => Some(Self::Embodying),
            _ => None,
        }
    }
}

impl Display for KbeStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ContentItem {
    pub id: String,
    pub text_line: String,
    #[serde(default)]
    pub category_tags: BTreeMap<String, String>,
    #[serde(default)]
    pub free_tags: BTreeSet<String>,
    #[serde(default)]
    pub status: ContentStatus,
}

impl ContentItem {
    #[must_use]
    pub fn new(id: impl Into<String>, text_line: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text_line: text_line.into(),
            category_tags: BTreeMap::new(),
            free_tags: BTreeSet::new(),
            status: ContentStatus::Active,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: ContentStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_tag(mut self, facet: impl Into<String>, value: impl Into<String>) -> Self {
        self.category_tags.insert(facet.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_facet(self, facet: Facet, value: impl Into<String>) -> Self {
        self.with_tag(facet.as_str(), value)
    }

    #[must_use]
    pub fn with_free_tag(mut self, tag: impl Into<String>) -> Self {
        self.free_tags.insert(tag.into());
        self
    }

    #[must_use]
    pub fn tag(&self, facet: &str) -> Option<&str> {
        self.category_tags.get(facet).map(String::as_str)
    }

    #[must_use]
    pub fn facet(&self, facet: Facet) -> Option<&str> {
        self.tag(facet.as_str())
    }

    #[must_use]
    pub fn kbe_stage(&self) -> Option<KbeStage> {
        self.facet(Facet::KbeTarget).and_then(KbeStage::parse)
    }

    /// Check the invariants a catalog entry must hold before it is loaded.
    ///
    /// # Errors
    /// Returns [`CatalogError::InvalidArgument`] when the id is blank.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.id.trim().is_empty() {
            return Err(CatalogError::InvalidArgument(
                "content id MUST be non-empty".to_string(),
            ));
        }
        Ok(())
    }
}
