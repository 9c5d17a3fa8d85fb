//! Per-run reconciliation of fetched listings with the store.
//!
//! Decides, per listing id, whether to fetch it, re-score what is stored,
//! or let it go stale. Every per-listing failure is logged and counted;
//! nothing short of a bad configuration aborts a run.

use crate::error::FetchError;
use crate::models::{ListingRecord, SearchHit};
use crate::scoring::{ScoreBreakdown, Scorer};
use crate::scrapers::SourceAdapter;
use crate::store::{ListingStore, Storage};
use tracing::{debug, info, warn};

/// What a run does with the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Search every area and fetch listings not stored yet
    Discover,
    /// Re-score stored listings from their stored fields
    Rate,
    /// Re-fetch every stored listing, then score it
    RateWithRefresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Search pages per area; the first page is always fetched
    pub max_pages: u32,
    /// Re-fetch listings that are already stored
    pub force: bool,
    /// Use search-result summaries instead of detail fetches
    pub fast: bool,
    /// Mark every stored listing as not new on load
    pub mark_old: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            max_pages: 10,
            force: false,
            fast: false,
            mark_old: false,
        }
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Listings fetched and stored
    pub fetched: usize,
    /// Known listings left as they were
    pub skipped: usize,
    /// Listings whose fetch or parse failed
    pub failed: usize,
    /// Listings scored
    pub rated: usize,
    /// Listings that could not be scored
    pub unscored: usize,
    /// Scored listings excluded for early availability
    pub excluded: usize,
}

pub struct Reconciler<'a> {
    scorer: &'a Scorer,
    options: ReconcileOptions,
}

impl<'a> Reconciler<'a> {
    pub fn new(scorer: &'a Scorer, options: ReconcileOptions) -> Self {
        Self { scorer, options }
    }

    /// Load the store, marking everything old when configured to.
    pub async fn load_store(&self, storage: &dyn Storage) -> ListingStore {
        let mut store = ListingStore::load_or_empty(storage).await;
        if self.options.mark_old && !store.is_empty() {
            info!(count = store.len(), "marking stored listings as old");
            store.mark_all_old();
            store.persist(storage).await;
        }
        store
    }

    pub async fn run(
        &self,
        mode: RunMode,
        store: &mut ListingStore,
        adapter: &dyn SourceAdapter,
        storage: &dyn Storage,
        areas: &[String],
    ) -> RunSummary {
        let summary = match mode {
            RunMode::Discover => self.discover(store, adapter, storage, areas).await,
            RunMode::Rate => self.rate(store, storage).await,
            RunMode::RateWithRefresh => self.refresh(store, adapter, storage).await,
        };

        info!(
            source = %adapter.source(),
            mode = ?mode,
            fetched = summary.fetched,
            skipped = summary.skipped,
            failed = summary.failed,
            rated = summary.rated,
            unscored = summary.unscored,
            excluded = summary.excluded,
            "run finished"
        );

        summary
    }

    /// Search every area and store listings not seen before.
    /// The store is persisted after each area.
    pub async fn discover(
        &self,
        store: &mut ListingStore,
        adapter: &dyn SourceAdapter,
        storage: &dyn Storage,
        areas: &[String],
    ) -> RunSummary {
        let mut summary = RunSummary::default();
        for area in areas {
            self.discover_area(store, adapter, area, &mut summary).await;
            store.persist(storage).await;
        }
        summary
    }

    async fn discover_area(
        &self,
        store: &mut ListingStore,
        adapter: &dyn SourceAdapter,
        area: &str,
        summary: &mut RunSummary,
    ) {
        info!(source = %adapter.source(), area, "searching for rooms");

        let mut page = 1;
        let mut seen = 0;
        loop {
            let results = match adapter.search(area, page).await {
                Ok(results) => results,
                Err(err) if page == 1 => {
                    warn!(source = %adapter.source(), area, op = "search", error = %err, "skipping area");
                    return;
                }
                Err(err) => {
                    warn!(source = %adapter.source(), area, page, op = "search", error = %err, "stopping pagination");
                    return;
                }
            };

            let count = results.hits.len();
            seen += count;
            debug!(
                area,
                page,
                count,
                total = ?results.total_results,
                "parsing search page"
            );

            for hit in results.hits {
                self.discover_hit(store, adapter, area, hit, summary).await;
            }

            let reached_total = results.total_results.is_some_and(|total| seen >= total);
            if count == 0 || !results.has_more || reached_total || page >= self.options.max_pages {
                return;
            }
            page += 1;
        }
    }

    async fn discover_hit(
        &self,
        store: &mut ListingStore,
        adapter: &dyn SourceAdapter,
        area: &str,
        hit: SearchHit,
        summary: &mut RunSummary,
    ) {
        if store.contains(&hit.id) && !self.options.force {
            debug!(listing_id = %hit.id, "already stored, skipping");
            summary.skipped += 1;
            return;
        }

        let fetched = match hit.summary {
            Some(record) if self.options.fast => Ok(record),
            _ => adapter.fetch_detail(&hit.id, area).await,
        };

        match fetched {
            Ok(record) => self.store_fresh(store, record, summary),
            Err(err) => {
                log_fetch_failure(&hit.id, &err);
                summary.failed += 1;
            }
        }
    }

    /// Re-score every stored listing from its stored fields.
    pub async fn rate(&self, store: &mut ListingStore, storage: &dyn Storage) -> RunSummary {
        let mut summary = RunSummary::default();

        for id in store.ids() {
            let Some(record) = store.get_mut(&id) else {
                continue;
            };
            record.is_new = true;
            match self.scorer.rate(record) {
                Ok(breakdown) => {
                    summary.rated += 1;
                    if breakdown.excluded {
                        summary.excluded += 1;
                    }
                }
                Err(err) => {
                    warn!(listing_id = %id, op = "rate", error = %err, "not rescored");
                    summary.unscored += 1;
                }
            }
        }

        store.persist(storage).await;
        summary
    }

    /// Re-fetch and score every stored listing. Listings that fail to
    /// fetch keep their data but stop being new.
    pub async fn refresh(
        &self,
        store: &mut ListingStore,
        adapter: &dyn SourceAdapter,
        storage: &dyn Storage,
    ) -> RunSummary {
        let mut summary = RunSummary::default();

        for id in store.ids() {
            let area = match store.get(&id) {
                Some(record) => record.search_area.clone(),
                None => continue,
            };

            match adapter.fetch_detail(&id, &area).await {
                Ok(record) => self.store_fresh(store, record, &mut summary),
                Err(err) => {
                    log_fetch_failure(&id, &err);
                    if let Some(record) = store.get_mut(&id) {
                        record.is_new = false;
                    }
                    summary.failed += 1;
                }
            }
        }

        store.persist(storage).await;
        summary
    }

    /// Fetch a single listing, store it and return its score breakdown.
    ///
    /// # Errors
    /// Returns the fetch error; the store is left unchanged in that case.
    pub async fn refresh_one(
        &self,
        store: &mut ListingStore,
        adapter: &dyn SourceAdapter,
        storage: &dyn Storage,
        id: &str,
    ) -> Result<Option<ScoreBreakdown>, FetchError> {
        let area = store
            .get(id)
            .map(|record| record.search_area.clone())
            .unwrap_or_default();

        let mut record = adapter.fetch_detail(id, &area).await?;
        record.is_new = true;
        let breakdown = match self.scorer.rate(&mut record) {
            Ok(breakdown) => Some(breakdown),
            Err(err) => {
                warn!(listing_id = %id, op = "rate", error = %err, "not scored");
                None
            }
        };
        store.upsert(record);
        store.persist(storage).await;

        Ok(breakdown)
    }

    /// Score a freshly fetched record and replace whatever was stored.
    fn store_fresh(&self, store: &mut ListingStore, mut record: ListingRecord, summary: &mut RunSummary) {
        record.is_new = true;
        match self.scorer.rate(&mut record) {
            Ok(breakdown) => {
                summary.rated += 1;
                if breakdown.excluded {
                    summary.excluded += 1;
                }
            }
            Err(err) => {
                warn!(listing_id = %record.id, op = "rate", error = %err, "stored without score");
                summary.unscored += 1;
            }
        }
        debug!(listing_id = %record.id, score = ?record.score, "stored listing");
        store.upsert(record);
        summary.fetched += 1;
    }
}

fn log_fetch_failure(id: &str, err: &FetchError) {
    match err {
        FetchError::Rejected { .. } => debug!(listing_id = %id, "{}", err),
        _ => warn!(listing_id = %id, op = "fetch_detail", error = %err, "fetch failed"),
    }
}
