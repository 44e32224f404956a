//! Network and cache collaborators of the scanner.

pub mod albion;
pub mod cache;

pub use albion::{FetchError, HttpTransport, PriceTransport, QuoteFetcher, TransportResponse};
pub use cache::{CacheKey, Clock, QuoteCache, SystemClock, QUOTE_CACHE_TTL};
