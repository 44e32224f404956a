//! Market quote caching and cross-city flip scanning for Albion Online.
//!
//! [`Scanner`] is the entry point: it batches price lookups through a shared
//! [`QuoteCache`], finds the best buy/sell hub pair per item and ranks the
//! results. Risk and liquidity tiers are heuristics from a single price
//! snapshot, not guarantees.

pub mod app;
pub mod domain;
pub mod infra;
pub mod util;

pub use app::{ScanError, Scanner};
pub use domain::{
    Item, ItemSource, LiquidityTier, Location, Opportunity, Quality, Quote, QuoteSet, RiskTier,
    ScanFilters, ScanResult, ScanStats, StaticCatalog,
};
pub use infra::{FetchError, QuoteCache, QuoteFetcher};
pub use util::config::Settings;
