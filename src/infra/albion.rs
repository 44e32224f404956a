//! Thin asynchronous client for the Albion Online Data price API.
//!
//! - Batches every requested item into one comma-joined request.
//! - Serves repeated queries from the shared [`QuoteCache`].
//! - Never caches a failed or malformed response.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use thiserror::Error;
use time::{macros::format_description, OffsetDateTime, PrimitiveDateTime};
use tracing::{debug, warn};

use crate::domain::{Location, Quality, Quote, QuoteSet};
use crate::infra::cache::{CacheKey, QuoteCache};
use crate::util::version::USER_AGENT;

pub const DEFAULT_BASE_URL: &str = "https://www.albion-online-data.com/api/v2/stats/";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("upstream responded with status {status}")]
    Status { status: u16 },
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("http request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed quote payload: {0}")]
    InvalidQuote(String),
}

impl From<serde_json::Error> for FetchError {
    fn from(error: serde_json::Error) -> Self {
        FetchError::InvalidQuote(error.to_string())
    }
}

/// Raw upstream reply, before any status or shape checks.
#[derive(Clone, Debug)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network boundary of the fetcher.
#[async_trait]
pub trait PriceTransport: Send + Sync {
    async fn get(&self, url: Url) -> Result<TransportResponse, FetchError>;
}

/// reqwest-backed transport.
#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { http, timeout })
    }
}

#[async_trait]
impl PriceTransport for HttpTransport {
    async fn get(&self, url: Url) -> Result<TransportResponse, FetchError> {
        let response = self.http.get(url).send().await.map_err(|error| {
            if error.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Http(error)
            }
        })?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(TransportResponse { status, body })
    }
}

/// Cache-checked, batched quote lookups.
#[derive(Clone)]
pub struct QuoteFetcher {
    transport: Arc<dyn PriceTransport>,
    cache: Arc<QuoteCache>,
    base_url: Url,
    timeout: Duration,
}

impl QuoteFetcher {
    pub fn new(
        transport: Arc<dyn PriceTransport>,
        cache: Arc<QuoteCache>,
        base_url: &str,
    ) -> Result<Self, FetchError> {
        Ok(Self {
            transport,
            cache,
            base_url: directory_url(base_url)?,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cache(&self) -> &Arc<QuoteCache> {
        &self.cache
    }

    /// Quotes for every item/hub/quality combination in one upstream request.
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
        let key = CacheKey::new(item_ids, locations, qualities);
        if key.items().next().map_or(true, str::is_empty) {
            return Err(FetchError::InvalidQuote("no item ids requested".into()));
        }

        if let Some(cached) = self.cache.get(&key).await {
            debug!(key = %key, quotes = cached.len(), "serving cached quotes");
            return Ok(cached);
        }

        let url = self.prices_url(&key)?;
        debug!(%url, "requesting quotes");
        let response = self.send(url).await?;
        if !response.is_success() {
            return Err(FetchError::Status {
                status: response.status,
            });
        }

        let quotes = parse_quotes(&response.body)?;
        debug!(key = %key, quotes = quotes.len(), "caching fresh quotes");
        self.cache.put(key, quotes.clone()).await;
        Ok(quotes)
    }

    /// Latest gold price in silver.
    ///
    /// Advisory only: any failure is logged and reported as `0.0` instead of
    /// being propagated.
    pub async fn gold_price(&self) -> f64 {
        match self.fetch_gold_price().await {
            Ok(price) => price,
            Err(error) => {
                warn!(%error, "gold price unavailable, defaulting to 0");
                0.0
            }
        }
    }

    async fn fetch_gold_price(&self) -> Result<f64, FetchError> {
        let mut url = self.base_url.join("Gold")?;
        url.set_query(Some("count=1"));
        let response = self.send(url).await?;
        if !response.is_success() {
            return Err(FetchError::Status {
                status: response.status,
            });
        }
        let points: Vec<GoldPriceDto> = serde_json::from_str(&response.body)?;
        Ok(points.first().map(|point| point.price).unwrap_or(0.0))
    }

    async fn send(&self, url: Url) -> Result<TransportResponse, FetchError> {
        tokio::time::timeout(self.timeout, self.transport.get(url))
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))?
    }

    fn prices_url(&self, key: &CacheKey) -> Result<Url, FetchError> {
        let items: Vec<&str> = key.items().collect();
        let locations: Vec<&str> = key.locations().map(|loc| loc.name()).collect();
        let qualities: Vec<String> = key.qualities().map(|q| q.to_string()).collect();

        let mut url = self
            .base_url
            .join(&format!("prices/{}.json", items.join(",")))?;
        // Keep the commas literal; the API splits on them.
        url.set_query(Some(&format!(
            "locations={}&qualities={}",
            locations.join(","),
            qualities.join(",")
        )));
        Ok(url)
    }
}

/// Parse `raw` and make sure its path ends in `/` so relative joins append
/// to it instead of replacing the last segment.
fn directory_url(raw: &str) -> Result<Url, FetchError> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .push("");
    }
    Ok(url)
}

#[derive(Debug, Deserialize)]
struct PriceDto {
    item_id: String,
    city: String,
    quality: i64,
    #[serde(default)]
    sell_price_min: Option<f64>,
    #[serde(default)]
    sell_price_min_date: Option<String>,
    #[serde(default)]
    sell_price_max: Option<f64>,
    #[serde(default)]
    buy_price_min: Option<f64>,
    #[serde(default)]
    buy_price_max: Option<f64>,
    #[serde(default, alias = "item_count")]
    listing_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct GoldPriceDto {
    price: f64,
}

/// Decode a price payload. Cities outside the known hubs are dropped; an
/// out-of-range quality or blank item id fails the whole payload.
fn parse_quotes(body: &str) -> Result<QuoteSet, FetchError> {
    let entries: Vec<PriceDto> = serde_json::from_str(body)?;
    let mut quotes = Vec::with_capacity(entries.len());

    for dto in entries {
        let Ok(location) = dto.city.parse::<Location>() else {
            debug!(city = %dto.city, item = %dto.item_id, "skipping quote outside known hubs");
            continue;
        };
        let quality = u8::try_from(dto.quality)
            .ok()
            .and_then(Quality::new)
            .ok_or_else(|| {
                FetchError::InvalidQuote(format!(
                    "quality {} for {} outside 1..=5",
                    dto.quality, dto.item_id
                ))
            })?;
        if dto.item_id.trim().is_empty() {
            return Err(FetchError::InvalidQuote("quote without item_id".into()));
        }

        quotes.push(Quote {
            item_id: dto.item_id,
            location,
            quality,
            sell_price_min: listed_price(dto.sell_price_min),
            sell_price_max: listed_price(dto.sell_price_max),
            buy_price_min: listed_price(dto.buy_price_min),
            buy_price_max: listed_price(dto.buy_price_max),
            listing_count: dto.listing_count.unwrap_or(0),
            observed_at: parse_observed_at(dto.sell_price_min_date.as_deref()),
        });
    }

    Ok(QuoteSet::new(quotes))
}

/// The API reports "no listing" as `0`.
fn listed_price(raw: Option<f64>) -> Option<f64> {
    raw.filter(|price| price.is_finite() && *price > 0.0)
}

/// Upstream timestamps are UTC without an offset; year 1 marks "never seen".
fn parse_observed_at(raw: Option<&str>) -> Option<OffsetDateTime> {
    let format = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    let raw = raw?;
    let trimmed = raw.split('.').next().unwrap_or(raw);
    PrimitiveDateTime::parse(trimmed, format)
        .ok()
        .filter(|dt| dt.year() > 1)
        .map(PrimitiveDateTime::assume_utc)
}
