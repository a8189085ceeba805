//! In-memory NaviCue catalog: load once, filter and page through it, and pick
//! the next piece of content for a user.
//!
//! Every operation here is synchronous and pure over an immutable
//! [`CatalogSnapshot`]. Loading content from disk or the network belongs to the
//! adapter crates.

mod catalog;
mod filter;
mod model;
mod query;
mod recommend;

pub use catalog::{CatalogSnapshot, CatalogStats, CatalogStore, SnapshotId};
pub use filter::{compile, FacetConstraint, FilterSpec, Predicate};
pub use model::{ContentItem, ContentStatus, Facet, KbeStage};
pub use query::{facet_values, query, FacetCount, QueryOptions, QueryPage, StatusFilter};
pub use recommend::{
    rank, recommend, recommend_with_policy, Recommendation, RegulationBand, RuleScores,
    ScoredCandidate, ScoringPolicy, UserContext, NO_ELIGIBLE_CONTENT_REASON,
};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum CatalogError {
    #[error("duplicate content id: {0}")]
    DuplicateId(String),
    #[error("content not found: {0}")]
    NotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
