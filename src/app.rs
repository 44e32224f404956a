//! Scan orchestration: fetch, detect and rank flips across candidate items.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use futures_util::stream::{self, StreamExt};
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    domain::{
        detect, ensure_tradable, flip_candidates, summarize_by_location, Item, ItemSource,
        Location, LocationSummary, Opportunity, Quality, QuoteSet, ScanFilters, ScanResult,
        ScanStats,
    },
    infra::{
        albion::{FetchError, HttpTransport, QuoteFetcher},
        cache::QuoteCache,
    },
    util::config::Settings,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScanError {
    #[error("scan generation {generation} superseded by generation {current}")]
    Superseded { generation: u64, current: u64 },
}

enum ItemOutcome {
    Found(Opportunity),
    Unprofitable,
    NoData,
    Failed,
    Stale,
}

/// Composes the fetcher, the pure detectors and the catalog into scans.
///
/// Every scan takes a new generation number. Starting another scan or calling
/// [`Scanner::cancel`] makes older generations stale: their in-flight fetches
/// still finish (and may warm the cache) but their results are dropped.
pub struct Scanner {
    fetcher: QuoteFetcher,
    catalog: Arc<dyn ItemSource>,
    tax_rate: f64,
    item_scan_cap: usize,
    concurrency_limit: usize,
    locations: Vec<Location>,
    qualities: Vec<Quality>,
    generation: AtomicU64,
}

impl Scanner {
    pub fn new(fetcher: QuoteFetcher, catalog: Arc<dyn ItemSource>, settings: &Settings) -> Self {
        Self {
            fetcher,
            catalog,
            tax_rate: settings.tax_rate,
            item_scan_cap: settings.item_scan_cap.max(1),
            concurrency_limit: settings.concurrency_limit.max(1),
            locations: settings.locations.clone(),
            qualities: Quality::all(),
            generation: AtomicU64::new(0),
        }
    }

    /// Wire up the HTTP transport and a fresh cache from settings.
    pub fn from_settings(
        settings: &Settings,
        catalog: Arc<dyn ItemSource>,
    ) -> Result<Self, FetchError> {
        let cache = Arc::new(QuoteCache::new(settings.ttl()));
        let transport = Arc::new(HttpTransport::new(settings.request_timeout())?);
        let fetcher = QuoteFetcher::new(transport, cache, &settings.base_url)?
            .with_timeout(settings.request_timeout());
        Ok(Self::new(fetcher, catalog, settings))
    }

    pub fn fetcher(&self) -> &QuoteFetcher {
        &self.fetcher
    }

    pub fn catalog(&self) -> &dyn ItemSource {
        self.catalog.as_ref()
    }

    pub async fn fetch_quotes<I, S>(
        &self,
        item_ids: I,
        locations: &[Location],
        qualities: &[Quality],
    ) -> Result<QuoteSet, FetchError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.fetcher.fetch_quotes(item_ids, locations, qualities).await
    }

    pub async fn clear_cache(&self) {
        self.fetcher.cache().clear().await;
    }

    /// Advisory gold price; `0.0` when unavailable.
    pub async fn gold_price(&self) -> f64 {
        self.fetcher.gold_price().await
    }

    /// Mark any running scan stale. Returns the new generation.
    pub fn cancel(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Best flip for one item. Fetch failures reach the caller.
    pub async fn analyze_item(
        &self,
        item_id: &str,
        locations: &[Location],
    ) -> Result<Option<Opportunity>, FetchError> {
        let quotes = self
            .fetcher
            .fetch_quotes([item_id], self.hubs(locations), &self.qualities)
            .await?;
        Ok(detect(&quotes.for_item(item_id), self.tax_rate))
    }

    /// Per-hub best prices for one item.
    pub async fn price_overview(
        &self,
        item_id: &str,
        locations: &[Location],
    ) -> Result<Vec<LocationSummary>, FetchError> {
        let quotes = self
            .fetcher
            .fetch_quotes([item_id], self.hubs(locations), &self.qualities)
            .await?;
        Ok(summarize_by_location(&quotes.for_item(item_id)))
    }

    /// Scan the catalog's flip candidates.
    pub async fn scan_catalog(&self, filters: &ScanFilters) -> Result<ScanResult, ScanError> {
        let candidates = flip_candidates(self.catalog.as_ref());
        self.scan(&candidates, filters).await
    }

    /// Scan at most `item_scan_cap` candidates and rank what they yield.
    ///
    /// Per-item failures are logged and counted, never returned. The only
    /// error is being superseded by a newer scan.
    pub async fn scan(
        &self,
        candidates: &[Item],
        filters: &ScanFilters,
    ) -> Result<ScanResult, ScanError> {
        let generation = self.cancel();
        let scan_id = Uuid::new_v4();
        let span = info_span!("scan", %scan_id, generation);

        async move {
            let selected = &candidates[..candidates.len().min(self.item_scan_cap)];
            let mut stats = ScanStats {
                requested: candidates.len(),
                scanned: selected.len(),
                truncated: candidates.len() - selected.len(),
                ..ScanStats::default()
            };
            if stats.truncated > 0 {
                debug!(cap = self.item_scan_cap, dropped = stats.truncated, "candidate list capped");
            }

            let outcomes: Vec<ItemOutcome> = stream::iter(selected)
                .map(|item| self.scan_item(item, filters, generation))
                .buffer_unordered(self.concurrency_limit)
                .collect()
                .await;

            self.ensure_current(generation)?;

            let mut opportunities = Vec::new();
            for outcome in outcomes {
                match outcome {
                    ItemOutcome::Found(opportunity) => {
                        stats.found += 1;
                        opportunities.push(opportunity);
                    }
                    ItemOutcome::Unprofitable => stats.unprofitable += 1,
                    ItemOutcome::NoData => stats.no_data += 1,
                    ItemOutcome::Failed => stats.failed += 1,
                    ItemOutcome::Stale => {}
                }
            }

            let result = ScanResult::new(scan_id, generation, filters.clone(), opportunities, stats);
            info!(
                scanned = result.stats.scanned,
                found = result.stats.found,
                failed = result.stats.failed,
                no_data = result.stats.no_data,
                visible = result.filtered_count(),
                "scan finished"
            );
            Ok::<_, ScanError>(result)
        }
        .instrument(span)
        .await
    }

    async fn scan_item(&self, item: &Item, filters: &ScanFilters, generation: u64) -> ItemOutcome {
        if self.ensure_current(generation).is_err() {
            return ItemOutcome::Stale;
        }

        let fetched = self
            .fetcher
            .fetch_quotes([item.id.as_str()], self.hubs(&filters.locations), &self.qualities)
            .await;

        if self.ensure_current(generation).is_err() {
            debug!(item = %item.id, "dropping result of superseded scan");
            return ItemOutcome::Stale;
        }

        let quotes = match fetched {
            Ok(quotes) => quotes.for_item(&item.id),
            Err(error) => {
                warn!(item = %item.id, %error, "skipping item after fetch failure");
                return ItemOutcome::Failed;
            }
        };

        if let Err(error) = ensure_tradable(&item.id, &quotes) {
            debug!(%error, "skipping item");
            return ItemOutcome::NoData;
        }

        match detect(&quotes, self.tax_rate) {
            Some(opportunity) if filters.accepts(&opportunity) => ItemOutcome::Found(opportunity),
            _ => ItemOutcome::Unprofitable,
        }
    }

    fn ensure_current(&self, generation: u64) -> Result<(), ScanError> {
        let current = self.current_generation();
        if current == generation {
            Ok(())
        } else {
            Err(ScanError::Superseded {
                generation,
                current,
            })
        }
    }

    fn hubs<'a>(&'a self, requested: &'a [Location]) -> &'a [Location] {
        if requested.is_empty() {
            &self.locations
        } else {
            requested
        }
    }
}
