use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::CatalogSnapshot;
use crate::filter::Predicate;
use crate::model::{ContentItem, ContentStatus};
use crate::CatalogError;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    Draft,
    #[default]
    Active,
    Archived,
    Any,
}

impl StatusFilter {
    #[must_use]
    pub fn admits(self, status: ContentStatus) -> bool {
        match self {
            Self::Any => true,
            Self::Draft => status == ContentStatus::Draft,
            Self::Active => status == ContentStatus::Active,
            Self::Archived => status == ContentStatus::Archived,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Archived => "archived",
            Self::Any => "any",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "active" => Some(Self::Active),
            "archived" => Some(Self::Archived),
            "any" => Some(Self::Any),
            _ => None,
        }
    }
}

impl From<ContentStatus> for StatusFilter {
    fn from(status: ContentStatus) -> Self {
        match status {
            ContentStatus::Draft => Self::Draft,
            ContentStatus::Active => Self::Active,
            ContentStatus::Archived => Self::Archived,
        }
    }
}

/// Paging and eligibility options for [`query`].
///
/// `offset` and `limit` are signed because they arrive straight from UI state;
/// negative or zero values are rejected rather than silently clamped.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct QueryOptions {
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub status: StatusFilter,
}

impl QueryOptions {
    #[must_use]
    pub fn page(offset: i64, limit: i64) -> Self {
        Self { offset, limit: Some(limit), status: StatusFilter::Active }
    }

    #[must_use]
    pub fn with_status(mut self, status: StatusFilter) -> Self {
        self.status = status;
        self
    }

    fn bounds(&self) -> Result<(usize, Option<usize>), CatalogError> {
        let offset = usize::try_from(self.offset).map_err(|_| {
            CatalogError::InvalidArgument(format!("offset MUST be >= 0 (got {})", self.offset))
        })?;

        let limit = match self.limit {
            None => None,
            Some(limit) if limit <= 0 => {
                return Err(CatalogError::InvalidArgument(format!(
                    "limit MUST be > 0 (got {limit})"
                )));
            }
            Some(limit) => Some(usize::try_from(limit).unwrap_or(usize::MAX)),
        };

        Ok((offset, limit))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct QueryPage {
    pub items: Vec<ContentItem>,
    pub total: usize,
}

/// Run `predicate` over the eligible items of `snapshot` and return one page.
///
/// Items come back in catalog load order; `total` counts every match so
/// callers can compute page counts.
///
/// # Errors
/// Returns [`CatalogError::InvalidArgument`] when `offset < 0` or `limit <= 0`.
pub fn query(
    snapshot: &CatalogSnapshot,
    predicate: &Predicate,
    options: &QueryOptions,
) -> Result<QueryPage, CatalogError> {
    let (offset, limit) = options.bounds()?;

    let mut items = Vec::new();
    let mut total = 0_usize;
    let matches = snapshot
        .all()
        .iter()
        .filter(|item| options.status.admits(item.status))
        .filter(|item| predicate.matches(item));

    for item in matches {
        let room_left = match limit {
            None => true,
            Some(limit) => items.len() < limit,
        };
        if total >= offset && room_left {
            items.push(item.clone());
        }
        total += 1;
    }

    debug!(
        snapshot_id = %snapshot.snapshot_id(),
        status = options.status.as_str(),
        offset,
        returned = items.len(),
        total,
        "catalog query"
    );
    Ok(QueryPage { items, total })
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct FacetCount {
    pub value: String,
    pub count: usize,
}

/// Distinct values of `facet` among eligible items, sorted by value.
#[must_use]
pub fn facet_values(snapshot: &CatalogSnapshot, facet: &str, status: StatusFilter) -> Vec<FacetCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for item in snapshot.all().iter().filter(|item| status.admits(item.status)) {
        if let Some(value) = item.tag(facet) {
            *counts.entry(value).or_insert(0) += 1;
        }
    }

    counts
        .into_iter()
        .map(|(value, count)| FacetCount { value: value.to_string(), count })
        .collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::filter::{compile, FilterSpec};
    use crate::model::Facet;

    fn snapshot(items: Vec<ContentItem>) -> CatalogSnapshot {
        match CatalogSnapshot::build(items) {
            Ok(snapshot) => snapshot,
            Err(err) => panic!("fixture snapshot should build: {err}"),
        }
    }

    fn fixture() -> CatalogSnapshot {
        snapshot(vec![
            ContentItem::new("a", "Breathe with me.")
                .with_facet(Facet::Schema, "shame")
                .with_facet(Facet::Family, "mirror"),
            ContentItem::new("b", "Notice the body.").with_facet(Facet::Schema, "abandonment"),
            ContentItem::new("c", "Draft cue about breathing.")
                .with_facet(Facet::Schema, "shame")
                .with_status(ContentStatus::Draft),
            ContentItem::new("d", "Hold the paradox.")
                .with_facet(Facet::Schema, "shame")
                .with_free_tag("BREATHE-work"),
            ContentItem::new("e", "Retired cue.")
                .with_facet(Facet::Schema, "shame")
                .with_status(ContentStatus::Archived),
        ])
    }

    fn ids(page: &QueryPage) -> Vec<&str> {
        page.items.iter().map(|item| item.id.as_str()).collect()
    }

    fn run(spec: &FilterSpec, options: &QueryOptions) -> QueryPage {
        match query(&fixture(), &compile(spec), options) {
            Ok(page) => page,
            Err(err) => panic!("query should succeed: {err}"),
        }
    }

    // Test IDs: TQRY-001
    #[test]
    fn empty_spec_returns_every_active_item_once_in_load_order() {
        let page = run(&FilterSpec::new(), &QueryOptions::default());
        assert_eq!(ids(&page), vec!["a", "b", "d"]);
        assert_eq!(page.total, 3);
    }

    // Test IDs: TQRY-002
    #[test]
    fn status_any_widens_eligibility() {
        let page =
            run(&FilterSpec::new(), &QueryOptions::default().with_status(StatusFilter::Any));
        assert_eq!(ids(&page), vec!["a", "b", "c", "d", "e"]);

        let drafts =
            run(&FilterSpec::new(), &QueryOptions::default().with_status(StatusFilter::Draft));
        assert_eq!(ids(&drafts), vec!["c"]);
    }

    // Test IDs: TQRY-003
    #[test]
    fn facet_filter_selects_exact_matches_only() {
        let page = run(&FilterSpec::new().with_facet("schema", "shame"), &QueryOptions::default());
        assert_eq!(ids(&page), vec!["a", "d"]);
    }

    #[test]
    fn free_text_case_variants_return_the_same_items() {
        let upper = run(&FilterSpec::new().with_free_text("BREATHE"), &QueryOptions::default());
        let lower = run(&FilterSpec::new().with_free_text("breathe"), &QueryOptions::default());
        assert_eq!(upper, lower);
        assert_eq!(ids(&upper), vec!["a", "d"]);
    }

    #[test]
    fn absent_text_yields_an_empty_page() {
        let page =
            run(&FilterSpec::new().with_free_text("xyz-not-present"), &QueryOptions::default());
        assert!(page.items.is_empty());
        assert_eq!(page.total, 0);
    }

    // Test IDs: TQRY-004
    #[test]
    fn total_ignores_offset_and_limit() {
        let page = run(&FilterSpec::new(), &QueryOptions::page(1, 1));
        assert_eq!(ids(&page), vec!["b"]);
        assert_eq!(page.total, 3);

        let past_end = run(&FilterSpec::new(), &QueryOptions::page(10, 5));
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.total, 3);
    }

    // Test IDs: TQRY-005
    #[test]
    fn invalid_paging_arguments_are_rejected() {
        let snapshot = fixture();
        let predicate = Predicate::always();
        for options in [QueryOptions::page(0, 0), QueryOptions::page(0, -3), QueryOptions::page(-1, 5)]
        {
            let result = query(&snapshot, &predicate, &options);
            assert!(
                matches!(result, Err(CatalogError::InvalidArgument(_))),
                "options {options:?} should be rejected"
            );
        }
    }

    #[test]
    fn facet_values_count_distinct_values_among_eligible_items() {
        let values = facet_values(&fixture(), "schema", StatusFilter::Active);
        assert_eq!(
            values,
            vec![
                FacetCount { value: "abandonment".to_string(), count: 1 },
                FacetCount { value: "shame".to_string(), count: 2 },
            ]
        );

        let all = facet_values(&fixture(), "schema", StatusFilter::Any);
        assert_eq!(all.iter().map(|entry| entry.count).sum::<usize>(), 5);
        assert!(facet_values(&fixture(), "heat_level", StatusFilter::Any).is_empty());
    }

    fn arbitrary_catalog() -> impl Strategy<Value = Vec<ContentItem>> {
        let status = prop_oneof![
            Just(ContentStatus::Active),
            Just(ContentStatus::Draft),
            Just(ContentStatus::Archived),
        ];
        let schema = prop_oneof![Just("shame"), Just("control"), Just("abandonment")];
        proptest::collection::vec((status, schema, "[a-zA-Z ]{0,16}"), 0..40).prop_map(|rows| {
            rows.into_iter()
                .enumerate()
                .map(|(index, (status, schema, text))| {
                    ContentItem::new(format!("item-{index}"), text)
                        .with_facet(Facet::Schema, schema)
                        .with_status(status)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn property_pages_concatenate_to_the_full_result(items in arbitrary_catalog(), split in 0_usize..64) {
            let snapshot = snapshot(items);
            let predicate = compile(&FilterSpec::new().with_facet("schema", "shame"));
            let full = match query(&snapshot, &predicate, &QueryOptions::default()) {
                Ok(page) => page,
                Err(err) => panic!("unbounded query should succeed: {err}"),
            };
            let total = i64::try_from(full.total).unwrap_or(i64::MAX);
            let k = i64::try_from(split).unwrap_or(0).min(total);

            let mut stitched = Vec::new();
            if k > 0 {
                match query(&snapshot, &predicate, &QueryOptions::page(0, k)) {
                    Ok(page) => stitched.extend(page.items),
                    Err(err) => panic!("head page should succeed: {err}"),
                }
            }
            if total - k > 0 {
                match query(&snapshot, &predicate, &QueryOptions::page(k, total - k)) {
                    Ok(page) => stitched.extend(page.items),
                    Err(err) => panic!("tail page should succeed: {err}"),
                }
            }
            prop_assert_eq!(stitched, full.items);
        }

        #[test]
        fn property_facet_filter_is_exact_and_complete(items in arbitrary_catalog()) {
            let snapshot = snapshot(items);
            let predicate = compile(&FilterSpec::new().with_facet("schema", "shame"));
            let page = match query(&snapshot, &predicate, &QueryOptions::default()) {
                Ok(page) => page,
                Err(err) => panic!("query should succeed: {err}"),
            };
            let expected = snapshot
                .all()
                .iter()
                .filter(|item| item.status == ContentStatus::Active && item.tag("schema") == Some("shame"))
                .cloned()
                .collect::<Vec<_>>();
            prop_assert_eq!(page.total, expected.len());
            prop_assert_eq!(page.items, expected);
        }

        #[test]
        fn property_repeated_queries_are_identical(items in arbitrary_catalog(), text in "[a-z]{0,3}") {
            let snapshot = snapshot(items);
            let spec = FilterSpec::new().with_free_text(text);
            let first = query(&snapshot, &compile(&spec), &QueryOptions::default());
            let second = query(&snapshot, &compile(&spec), &QueryOptions::default());
            prop_assert_eq!(first, second);
        }
    }
}
