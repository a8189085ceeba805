use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use navicue_catalog_bundle::BundleManifest;
use navicue_catalog_core::{
    compile, facet_values, query, rank, recommend_with_policy, CatalogError, CatalogStats,
    CatalogStore, ContentItem, FacetCount, FilterSpec, QueryOptions, Recommendation,
    ScoredCandidate, ScoringPolicy, SnapshotId, StatusFilter, UserContext,
};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const API_CONTRACT_VERSION: &str = "api.v1";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryRequest {
    #[serde(default)]
    pub filter: FilterSpec,
    #[serde(default)]
    pub status: StatusFilter,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryResponse {
    pub snapshot_id: SnapshotId,
    pub total: usize,
    pub offset: i64,
    pub items: Vec<ContentItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FacetRequest {
    pub facet: String,
    #[serde(default)]
    pub status: StatusFilter,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FacetResponse {
    pub snapshot_id: SnapshotId,
    pub facet: String,
    pub values: Vec<FacetCount>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecommendRequest {
    #[serde(default)]
    pub regulation_score: Option<f64>,
    #[serde(default)]
    pub recent_facet_history: Vec<String>,
    /// Also return the best `top` scored candidates.
    #[serde(default)]
    pub top: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendResponse {
    pub snapshot_id: SnapshotId,
    pub recommendation: Recommendation,
    pub candidates: Vec<ScoredCandidate>,
}

/// Thread-safe facade over one in-memory catalog.
///
/// Clones share the same store, so a load through any clone is visible to all.
#[derive(Debug, Clone, Default)]
pub struct CatalogApi {
    store: Arc<CatalogStore>,
    policy: Arc<ScoringPolicy>,
}

impl CatalogApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_policy(policy: ScoringPolicy) -> Self {
        Self { store: Arc::new(CatalogStore::new()), policy: Arc::new(policy) }
    }

    /// Replace the catalog with `items`.
    ///
    /// # Errors
    /// Returns an error wrapping [`CatalogError`] when an id is blank or repeated;
    /// the previous catalog stays in place.
    pub fn load_items(&self, items: Vec<ContentItem>) -> Result<CatalogStats> {
        Ok(self.store.load(items)?)
    }

    /// Replace the catalog with the items stored at `path`.
    ///
    /// # Errors
    /// Returns an error when the file or bundle cannot be read or verified, or
    /// the items fail catalog validation.
    pub fn load_bundle(&self, path: &Path) -> Result<CatalogStats> {
        let items = navicue_catalog_bundle::read_items(path)
            .with_context(|| format!("failed to read catalog from {}", path.display()))?;
        let stats = self.load_items(items)?;
        info!(path = %path.display(), total = stats.total, "catalog loaded from disk");
        Ok(stats)
    }

    /// Write the current catalog as a bundle directory.
    ///
    /// # Errors
    /// Returns an error when bundle files cannot be written.
    pub fn export_bundle(&self, out_dir: &Path) -> Result<BundleManifest> {
        let snapshot = self.store.snapshot();
        navicue_catalog_bundle::write_bundle(out_dir, snapshot.all())
    }

    #[must_use]
    pub fn stats(&self) -> CatalogStats {
        self.store.stats()
    }

    /// Fetch one item by id.
    ///
    /// # Errors
    /// Returns an error wrapping [`CatalogError::NotFound`] for an unknown id.
    pub fn get_item(&self, id: &str) -> Result<ContentItem> {
        Ok(self.store.by_id(id)?)
    }

    /// Filter and page through the catalog.
    ///
    /// # Errors
    /// Returns an error wrapping [`CatalogError::InvalidArgument`] for a negative
    /// offset or a non-positive limit.
    pub fn query(&self, request: QueryRequest) -> Result<QueryResponse> {
        let snapshot = self.store.snapshot();
        let predicate = compile(&request.filter);
        let options = QueryOptions { offset: request.offset, limit: request.limit, status: request.status };
        let page = query(&snapshot, &predicate, &options)?;
        Ok(QueryResponse {
            snapshot_id: snapshot.snapshot_id(),
            total: page.total,
            offset: request.offset,
            items: page.items,
        })
    }

    /// Distinct values of one facet with their counts.
    ///
    /// # Errors
    /// Returns an error wrapping [`CatalogError::InvalidArgument`] for a blank
    /// facet name.
    pub fn facets(&self, request: FacetRequest) -> Result<FacetResponse> {
        let facet = request.facet.trim();
        if facet.is_empty() {
            return Err(CatalogError::InvalidArgument("facet MUST be non-empty".to_string()).into());
        }
        let snapshot = self.store.snapshot();
        Ok(FacetResponse {
            snapshot_id: snapshot.snapshot_id(),
            facet: facet.to_string(),
            values: facet_values(&snapshot, facet, request.status),
        })
    }

    /// Recommend the next item and, when `top` is set, the ranked shortlist.
    ///
    /// # Errors
    /// Returns an error wrapping [`CatalogError::InvalidArgument`] for a
    /// malformed context or `top = 0`.
    pub fn recommend(&self, request: RecommendRequest) -> Result<RecommendResponse> {
        let context = UserContext {
            regulation_score: request.regulation_score,
            recent_facet_history: request.recent_facet_history,
        };
        let snapshot = self.store.snapshot();
        let recommendation = recommend_with_policy(&snapshot, &context, &self.policy)?;
        let candidates = match request.top {
            Some(top) => rank(&snapshot, &context, &self.policy, top)?,
            None => Vec::new(),
        };
        Ok(RecommendResponse { snapshot_id: snapshot.snapshot_id(), recommendation, candidates })
    }
}
