//! # Collection
//! A [`PaginatedSource`] backed by one remote, page-linked list.
//!
//! A `Collection` value is one page. Harvesting crosses into later pages on
//! its own and hands back a fresh continuation (this page again at a later
//! offset, a later page, or nothing); the receiver is never modified.
//!
//! Entries of a page are resolved concurrently, while the next page (if the
//! request spills over) is fetched in parallel with them. Output order always
//! follows page order.

use anyhow::anyhow;
use futures::future::join_all;
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::failure::Failure;
use crate::item::ItemRef;
use crate::resolve::{FieldError, Page, Reference, ResolveError, Resolver};
use crate::source::{Harvest, PaginatedSource};
use crate::telemetry::ensure_metrics_described;

#[derive(Clone)]
pub struct Collection {
    id: Option<Reference>,
    kind: String,
    entries: Result<Arc<[Reference]>, FieldError>,
    next: Result<Reference, FieldError>,
    size: Option<u64>,
    resolver: Arc<dyn Resolver>,
    /// Consecutive empty pages seen right before this one.
    empty_run: usize,
    max_empty_pages: usize,
}

impl Collection {
    pub fn from_page(page: Page, resolver: Arc<dyn Resolver>, settings: &Settings) -> Self {
        Self::from_parts(page, resolver, 0, settings.max_empty_pages())
    }

    /// Fetch the first page behind `reference`.
    pub async fn open(
        reference: &Reference,
        source: Option<&Reference>,
        resolver: Arc<dyn Resolver>,
        settings: &Settings,
    ) -> Result<Self, ResolveError> {
        Self::open_with(reference, source, resolver, settings.max_empty_pages()).await
    }

    async fn open_with(
        reference: &Reference,
        source: Option<&Reference>,
        resolver: Arc<dyn Resolver>,
        max_empty_pages: usize,
    ) -> Result<Self, ResolveError> {
        ensure_metrics_described();
        counter!("page_fetches_total").increment(1);
        let page = resolver.resolve_page(reference, source).await?;
        Ok(Self::from_parts(page, resolver, 0, max_empty_pages))
    }

    fn from_parts(
        page: Page,
        resolver: Arc<dyn Resolver>,
        empty_run: usize,
        max_empty_pages: usize,
    ) -> Self {
        Self {
            id: page.id,
            kind: page.kind,
            entries: page.items.map(Arc::from),
            next: page.next,
            size: page.size,
            resolver,
            empty_run,
            max_empty_pages,
        }
    }

    pub fn id(&self) -> Option<&Reference> {
        self.id.as_ref()
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The server's estimate of the total item count, if it gave one.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    fn describe(&self) -> String {
        match &self.id {
            Some(id) => id.to_string(),
            None => format!("anonymous {}", self.kind),
        }
    }

    fn fail(&self, error: anyhow::Error) -> Harvest {
        warn!(
            target: "collection",
            collection = %self.describe(),
            error = %format!("{error:#}"),
            "pagination failed"
        );
        counter!("harvest_failures_total").increment(1);
        Harvest::exhausted(vec![Failure::item(error)])
    }

    async fn resolve_entry(&self, reference: &Reference) -> ItemRef {
        match self.resolver.resolve_item(reference, self.id.as_ref()).await {
            Ok(item) => item,
            Err(e) => {
                warn!(
                    target: "collection",
                    entry = %reference,
                    error = %e,
                    "entry failed to resolve"
                );
                counter!("harvest_failures_total").increment(1);
                Failure::item(e)
            }
        }
    }

    /// This page again, resuming at `at`.
    fn resume_at(&self, at: usize) -> Harvest {
        Harvest {
            items: Vec::new(),
            continuation: Some(Arc::new(self.clone())),
            next_starting_point: at,
        }
    }

    /// Everything past this page's share of the request.
    async fn continue_after(
        &self,
        remaining: usize,
        consumed: usize,
        length: usize,
        empty_run: usize,
    ) -> Harvest {
        if consumed < length {
            return self.resume_at(consumed);
        }

        let next_ref = match &self.next {
            Err(e) if e.is_absent() => return Harvest::exhausted(Vec::new()),
            // Page boundary reached exactly; whatever lies past it, including
            // a broken `next`, waits for the next call.
            _ if remaining == 0 => return self.resume_at(consumed),
            Ok(r) => r,
            Err(e) => {
                return self.fail(anyhow::Error::new(e.clone()).context(format!(
                    "reading the next page of {}",
                    self.describe()
                )))
            }
        };

        debug!(
            target: "collection",
            from = %self.describe(),
            to = %next_ref,
            remaining,
            "crossing page boundary"
        );
        counter!("page_fetches_total").increment(1);
        match self.resolver.resolve_page(next_ref, self.id.as_ref()).await {
            Ok(page) => {
                let next = Self::from_parts(
                    page,
                    self.resolver.clone(),
                    empty_run,
                    self.max_empty_pages,
                );
                next.harvest(remaining, 0).await
            }
            Err(e) => self.fail(
                anyhow::Error::new(e)
                    .context(format!("fetching the page after {}", self.describe())),
            ),
        }
    }
}

#[async_trait::async_trait]
impl PaginatedSource for Collection {
    async fn harvest(&self, quantity: usize, starting_point: usize) -> Harvest {
        ensure_metrics_described();

        if quantity == 0 {
            return self.resume_at(starting_point);
        }

        let entries: &[Reference] = match &self.entries {
            Ok(v) => &v[..],
            Err(e) if e.is_absent() => &[],
            Err(e) => {
                return self.fail(
                    anyhow::Error::new(e.clone())
                        .context(format!("reading items of {}", self.describe())),
                )
            }
        };

        let length = entries.len();
        let empty_run = if length == 0 { self.empty_run + 1 } else { 0 };
        if empty_run > self.max_empty_pages {
            counter!("pagination_aborts_total").increment(1);
            return self.fail(anyhow!(
                "gave up on {} after {} consecutive empty pages",
                self.describe(),
                empty_run
            ));
        }

        let start = starting_point.min(length);
        let from_this_page = (length - start).min(quantity);
        let here = &entries[start..start + from_this_page];

        let (mut items, later) = tokio::join!(
            join_all(here.iter().map(|r| self.resolve_entry(r))),
            self.continue_after(
                quantity - from_this_page,
                start + from_this_page,
                length,
                empty_run,
            ),
        );
        counter!("harvest_items_total").increment(items.len() as u64);

        items.extend(later.items);
        Harvest {
            items,
            continuation: later.continuation,
            next_starting_point: later.next_starting_point,
        }
    }
}

/// A collection known only by reference, fetched on first harvest.
///
/// Used for an item's children, which usually live behind a link.
#[derive(Clone)]
pub struct Deferred {
    reference: Reference,
    source: Option<Reference>,
    resolver: Arc<dyn Resolver>,
    max_empty_pages: usize,
}

impl Deferred {
    pub fn new(
        reference: Reference,
        source: Option<Reference>,
        resolver: Arc<dyn Resolver>,
        settings: &Settings,
    ) -> Self {
        Self {
            reference,
            source,
            resolver,
            max_empty_pages: settings.max_empty_pages(),
        }
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }
}

#[async_trait::async_trait]
impl PaginatedSource for Deferred {
    async fn harvest(&self, quantity: usize, starting_point: usize) -> Harvest {
        if quantity == 0 {
            return Harvest {
                items: Vec::new(),
                continuation: Some(Arc::new(self.clone())),
                next_starting_point: starting_point,
            };
        }
        match Collection::open_with(
            &self.reference,
            self.source.as_ref(),
            self.resolver.clone(),
            self.max_empty_pages,
        )
        .await
        {
            Ok(collection) => collection.harvest(quantity, starting_point).await,
            Err(e) => {
                warn!(
                    target: "collection",
                    reference = %self.reference,
                    error = %e,
                    "collection failed to open"
                );
                counter!("harvest_failures_total").increment(1);
                Harvest::exhausted(vec![Failure::item(
                    anyhow::Error::new(e).context(format!("opening {}", self.reference)),
                )])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{self, MemoryResolver};
    use crate::source::{drain, SourceRef};
    use serde_json::json;

    fn names(items: &[ItemRef]) -> Vec<String> {
        items.iter().map(|i| i.name()).collect()
    }

    /// Two pages: a, b, c then d, e.
    fn two_pages() -> MemoryResolver {
        let r = MemoryResolver::new();
        for (id, ts) in [("a", 5), ("b", 4), ("c", 3), ("d", 2), ("e", 1)] {
            r.insert(fixture::note(id, &fixture::minutes(ts), id));
        }
        r.insert(fixture::page("p1", &["a", "b", "c"], Some("p2")));
        r.insert(fixture::page("p2", &["d", "e"], None));
        r
    }

    async fn open(r: &MemoryResolver, id: &str) -> Collection {
        Collection::open(&Reference::link(id), None, r.shared(), &Settings::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn never_returns_more_than_asked() {
        let r = two_pages();
        let c = open(&r, "p1").await;
        for q in 0..7 {
            let h = c.harvest(q, 0).await;
            assert!(h.items.len() <= q, "q={q} got {}", h.items.len());
        }
    }

    #[tokio::test]
    async fn crosses_page_boundaries_in_order() {
        let r = two_pages();
        let c = open(&r, "p1").await;
        let h = c.harvest(4, 0).await;
        assert_eq!(names(&h.items), vec!["a", "b", "c", "d"]);
        let next = h.continuation.expect("one item left");
        let h2 = next.harvest(10, h.next_starting_point).await;
        assert_eq!(names(&h2.items), vec!["e"]);
        assert!(h2.is_exhausted());
    }

    #[tokio::test]
    async fn chained_harvests_match_one_big_harvest() {
        let r = two_pages();
        let c = open(&r, "p1").await;
        let whole = names(&c.harvest(5, 0).await.items);
        for q1 in 0..=5 {
            let h1 = c.harvest(q1, 0).await;
            let mut got = names(&h1.items);
            if let Some(next) = h1.continuation {
                got.extend(names(&next.harvest(5 - q1, h1.next_starting_point).await.items));
            }
            assert_eq!(got, whole, "split at {q1}");
        }
    }

    #[tokio::test]
    async fn exact_page_fill_defers_next_fetch() {
        let r = two_pages();
        let c = open(&r, "p1").await;
        let before = r.fetch_count();
        let h = c.harvest(3, 0).await;
        assert_eq!(names(&h.items), vec!["a", "b", "c"]);
        // only the three entries were fetched; p2 waits for the next call
        assert_eq!(r.fetch_count() - before, 3);
        assert!(!h.is_exhausted());
        assert_eq!(h.next_starting_point, 3);
    }

    #[tokio::test]
    async fn exact_fill_before_broken_next_stays_within_quantity() {
        let r = MemoryResolver::new();
        r.insert(fixture::note("a", &fixture::minutes(1), "a"));
        r.insert(json!({
            "id": "p", "type": "OrderedCollectionPage", "orderedItems": ["a"], "next": 42
        }));
        let c = open(&r, "p").await;

        let h = c.harvest(1, 0).await;
        assert_eq!(names(&h.items), vec!["a"]);
        assert!(!h.is_exhausted());

        // the broken link surfaces on the following call instead
        let rest = h.continuation.unwrap().harvest(5, h.next_starting_point).await;
        assert_eq!(rest.items.len(), 1);
        assert!(rest.items[0].is_failure());
        assert!(rest.is_exhausted());

        let whole = names(&c.harvest(2, 0).await.items);
        assert_eq!(whole.len(), 2);
        for q1 in 0..=2 {
            let h1 = c.harvest(q1, 0).await;
            assert!(h1.items.len() <= q1, "q={q1} got {}", h1.items.len());
            let mut got = names(&h1.items);
            if let Some(next) = h1.continuation {
                got.extend(names(&next.harvest(2 - q1, h1.next_starting_point).await.items));
            }
            assert_eq!(got, whole, "split at {q1}");
        }
    }

    #[tokio::test]
    async fn harvest_does_not_mutate_receiver() {
        let r = two_pages();
        let c = open(&r, "p1").await;
        let first = names(&c.harvest(2, 1).await.items);
        let again = names(&c.harvest(2, 1).await.items);
        assert_eq!(first, vec!["b", "c"]);
        assert_eq!(first, again);
    }

    #[tokio::test]
    async fn bad_entries_become_failures_in_place() {
        let r = MemoryResolver::new();
        r.insert(fixture::note("a", &fixture::minutes(2), "a"));
        r.insert(fixture::note("c", &fixture::minutes(1), "c"));
        r.insert(fixture::page("p", &["a", "missing", "c"], None));
        let c = open(&r, "p").await;
        let h = c.harvest(3, 0).await;
        assert_eq!(h.items.len(), 3);
        assert!(!h.items[0].is_failure());
        assert!(h.items[1].is_failure());
        assert!(!h.items[2].is_failure());
        assert!(h.is_exhausted());
    }

    #[tokio::test]
    async fn four_empty_pages_abort_before_content() {
        let r = MemoryResolver::new();
        r.insert(fixture::note("real", &fixture::minutes(1), "real"));
        r.insert(fixture::page("e1", &[], Some("e2")));
        r.insert(fixture::page("e2", &[], Some("e3")));
        r.insert(fixture::page("e3", &[], Some("e4")));
        r.insert(fixture::page("e4", &[], Some("full")));
        r.insert(fixture::page("full", &["real"], None));
        let c = open(&r, "e1").await;
        let h = c.harvest(5, 0).await;
        assert_eq!(h.items.len(), 1);
        assert!(h.items[0].is_failure());
        assert!(h.items[0].name().contains("4 consecutive empty pages"));
        assert!(h.is_exhausted());
    }

    #[tokio::test]
    async fn three_empty_pages_are_tolerated() {
        let r = MemoryResolver::new();
        r.insert(fixture::note("real", &fixture::minutes(1), "real"));
        r.insert(fixture::page("e1", &[], Some("e2")));
        r.insert(fixture::page("e2", &[], Some("e3")));
        r.insert(fixture::page("e3", &[], Some("full")));
        r.insert(fixture::page("full", &["real"], None));
        let c = open(&r, "e1").await;
        let h = c.harvest(5, 0).await;
        assert_eq!(names(&h.items), vec!["real"]);
    }

    #[tokio::test]
    async fn threshold_is_configurable() {
        let r = MemoryResolver::new();
        r.insert(fixture::page("e1", &[], Some("e2")));
        r.insert(fixture::page("e2", &[], None));
        let strict = Settings::from_toml_str("[network]\nmax_empty_pages = 1\n").unwrap();
        let c = Collection::open(&Reference::link("e1"), None, r.shared(), &strict)
            .await
            .unwrap();
        let h = c.harvest(1, 0).await;
        assert!(h.items[0].is_failure());
    }

    #[tokio::test]
    async fn malformed_items_yield_single_failure() {
        let r = MemoryResolver::new();
        r.insert(json!({"id": "bad", "type": "OrderedCollectionPage", "orderedItems": 42}));
        let c = open(&r, "bad").await;
        let h = c.harvest(3, 0).await;
        assert_eq!(h.items.len(), 1);
        assert!(h.items[0].is_failure());
        assert!(h.is_exhausted());
    }

    #[tokio::test]
    async fn missing_next_page_surfaces_trailing_failure() {
        let r = MemoryResolver::new();
        r.insert(fixture::note("a", &fixture::minutes(1), "a"));
        r.insert(fixture::page("p", &["a"], Some("gone")));
        let c = open(&r, "p").await;
        let h = c.harvest(2, 0).await;
        assert_eq!(h.items.len(), 2);
        assert!(!h.items[0].is_failure());
        assert!(h.items[1].is_failure());
        assert!(h.is_exhausted());
    }

    #[tokio::test]
    async fn root_collection_follows_first() {
        let r = two_pages();
        r.insert(json!({
            "id": "root", "type": "OrderedCollection", "totalItems": 5, "first": "p1"
        }));
        let c = open(&r, "root").await;
        assert_eq!(c.size(), Some(5));
        assert_eq!(c.kind(), "OrderedCollection");
        let all = drain(Arc::new(c) as SourceRef, 2).await;
        assert_eq!(names(&all), vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn deferred_opens_lazily_and_reports_errors() {
        let r = two_pages();
        let d = Deferred::new(Reference::link("p1"), None, r.shared(), &Settings::default());
        assert_eq!(r.fetch_count(), 0);
        let h = d.harvest(2, 0).await;
        assert_eq!(names(&h.items), vec!["a", "b"]);

        let broken = Deferred::new(Reference::link("nope"), None, r.shared(), &Settings::default());
        let h = broken.harvest(2, 0).await;
        assert_eq!(h.items.len(), 1);
        assert!(h.items[0].is_failure());
        assert!(h.is_exhausted());
    }
}
