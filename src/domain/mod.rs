//! Domain model and pure flip analysis.

pub mod catalog;
pub mod entities;
pub mod evaluation;
pub mod flip;

pub use catalog::{flip_candidates, ItemSource, StaticCatalog};
pub use entities::{Item, Location, Quality, Quote, QuoteSet, UnknownLocation};
pub use evaluation::{
    detect, ensure_tradable, liquidity_tier, risk_tier, summarize_by_location, LocationSummary,
    NoDataError, DEFAULT_TAX_RATE,
};
pub use flip::{
    rank_opportunities, LiquidityTier, Opportunity, RiskTier, ScanFilters, ScanResult, ScanStats,
};
