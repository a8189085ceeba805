use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, warn};
use ulid::Ulid;

use crate::model::{ContentItem, ContentStatus};
use crate::CatalogError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SnapshotId(pub Ulid);

impl SnapshotId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SnapshotId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogStats {
    pub snapshot_id: SnapshotId,
    #[serde(with = "time::serde::rfc3339")]
    pub loaded_at: OffsetDateTime,
    pub total: usize,
    pub active: usize,
    pub draft: usize,
    pub archived: usize,
}

/// One immutable generation of the catalog.
///
/// Items keep their load order; `positions` indexes them by id.
#[derive(Debug)]
pub struct CatalogSnapshot {
    snapshot_id: SnapshotId,
    loaded_at: OffsetDateTime,
    items: Vec<ContentItem>,
    positions: HashMap<String, usize>,
}

impl CatalogSnapshot {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            snapshot_id: SnapshotId::new(),
            loaded_at: OffsetDateTime::now_utc(),
            items: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Validate `items` and index them in load order.
    ///
    /// # Errors
    /// Returns [`CatalogError::InvalidArgument`] for an item with a blank id, or
    /// [`CatalogError::DuplicateId`] naming the first id seen twice.
    pub fn build(items: Vec<ContentItem>) -> Result<Self, CatalogError> {
        let mut positions = HashMap::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            item.validate()?;
            if positions.insert(item.id.clone(), index).is_some() {
                return Err(CatalogError::DuplicateId(item.id.clone()));
            }
        }

        Ok(Self {
            snapshot_id: SnapshotId::new(),
            loaded_at: OffsetDateTime::now_utc(),
            items,
            positions,
        })
    }

    #[must_use]
    pub fn snapshot_id(&self) -> SnapshotId {
        self.snapshot_id
    }

    #[must_use]
    pub fn loaded_at(&self) -> OffsetDateTime {
        self.loaded_at
    }

    #[must_use]
    pub fn all(&self) -> &[ContentItem] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Look up one item by id.
    ///
    /// # Errors
    /// Returns [`CatalogError::NotFound`] when no item carries `id`.
    pub fn by_id(&self, id: &str) -> Result<&ContentItem, CatalogError> {
        self.positions
            .get(id)
            .and_then(|index| self.items.get(*index))
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    #[must_use]
    pub fn stats(&self) -> CatalogStats {
        let mut stats = CatalogStats {
            snapshot_id: self.snapshot_id,
            loaded_at: self.loaded_at,
            total: self.items.len(),
            active: 0,
            draft: 0,
            archived: 0,
        };
        for item in &self.items {
            match item.status {
                ContentStatus::Active => stats.active += 1,
                ContentStatus::Draft => stats.draft += 1,
                ContentStatus::Archived => stats.archived += 1,
            }
        }
        stats
    }
}

/// Holds the current [`CatalogSnapshot`] and swaps it wholesale on `load`.
///
/// Readers clone the `Arc` under a short read lock and then work lock-free on a
/// snapshot that can never change underneath them.
#[derive(Debug)]
pub struct CatalogStore {
    current: RwLock<Arc<CatalogSnapshot>>,
}

impl Default for CatalogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogStore {
    #[must_use]
    pub fn new() -> Self {
        Self { current: RwLock::new(Arc::new(CatalogSnapshot::empty())) }
    }

    /// Build a store already holding `items`.
    ///
    /// # Errors
    /// Same failures as [`CatalogStore::load`].
    pub fn with_items(items: Vec<ContentItem>) -> Result<Self, CatalogError> {
        let store = Self::new();
        store.load(items)?;
        Ok(store)
    }

    /// Replace the catalog contents.
    ///
    /// The new snapshot is validated before the swap, so a rejected load leaves
    /// the previous snapshot in place.
    ///
    /// # Errors
    /// Returns [`CatalogError::DuplicateId`] naming the first repeated id, or
    /// [`CatalogError::InvalidArgument`] for an item with a blank id.
    pub fn load(&self, items: Vec<ContentItem>) -> Result<CatalogStats, CatalogError> {
        let snapshot = match CatalogSnapshot::build(items) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(error = %err, "rejected catalog load; keeping previous snapshot");
                return Err(err);
            }
        };
        let stats = snapshot.stats();

        {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            *current = Arc::new(snapshot);
        }

        info!(
            snapshot_id = %stats.snapshot_id,
            total = stats.total,
            active = stats.active,
            "catalog loaded"
        );
        Ok(stats)
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&current)
    }

    /// Every item in load order, cloned out of the current snapshot.
    #[must_use]
    pub fn all(&self) -> Vec<ContentItem> {
        self.snapshot().all().to_vec()
    }

    /// Look up one item by id in the current snapshot.
    ///
    /// # Errors
    /// Returns [`CatalogError::NotFound`] when no item carries `id`.
    pub fn by_id(&self, id: &str) -> Result<ContentItem, CatalogError> {
        self.snapshot().by_id(id).cloned()
    }

    #[must_use]
    pub fn stats(&self) -> CatalogStats {
        self.snapshot().stats()
    }
}
