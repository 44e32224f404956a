//! Pure analysis over one item's quote set: pair detection, risk and
//! liquidity heuristics, and the per-hub price overview.

use thiserror::Error;
use time::OffsetDateTime;

use super::entities::{Location, Quote, QuoteSet};
use super::flip::{LiquidityTier, Opportunity, RiskTier};

/// Default share of the sale price withheld as market tax.
pub const DEFAULT_TAX_RATE: f64 = 0.03;

const LOW_RISK_SPREAD: f64 = 0.10;
const MEDIUM_RISK_SPREAD: f64 = 0.25;
const HIGH_LIQUIDITY_LISTINGS: u64 = 1000;
const MEDIUM_LIQUIDITY_LISTINGS: u64 = 100;

const HUBS: usize = Location::ALL.len();

/// An item has no ask/bid pair across two different hubs.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("no usable listings for {item_id}")]
pub struct NoDataError {
    pub item_id: String,
}

/// Best buy/sell pair for one item's quotes, or `None` when no pair nets a profit.
///
/// The buy side takes the cheapest `sell_price_min` at a hub, the sell side the
/// highest `buy_price_max`. Pairs are walked in [`Location::ALL`] order and only a
/// strictly greater net profit replaces the current best, so equal pairs resolve
/// to the first one in that order.
///
/// `quotes` must hold a single item; narrow batched results with
/// [`QuoteSet::for_item`] first.
pub fn detect(quotes: &QuoteSet, tax_rate: f64) -> Option<Opportunity> {
    let first = quotes.iter().next()?;
    debug_assert!(
        quotes.iter().all(|quote| quote.item_id == first.item_id),
        "detect called with quotes for more than one item"
    );
    let asks = best_asks(quotes);
    let bids = best_bids(quotes);

    let mut best: Option<(Location, Location, f64, f64, f64)> = None;
    for buy_location in Location::ALL {
        let Some(buy_price) = asks[buy_location.index()] else {
            continue;
        };
        for sell_location in Location::ALL {
            if sell_location == buy_location {
                continue;
            }
            let Some(sell_price) = bids[sell_location.index()] else {
                continue;
            };

            let net_profit = (sell_price - buy_price) - sell_price * tax_rate;
            if best.map_or(true, |(.., current)| net_profit > current) {
                best = Some((buy_location, sell_location, buy_price, sell_price, net_profit));
            }
        }
    }

    let (buy_location, sell_location, buy_price, sell_price, net_profit) = best?;
    if net_profit <= 0.0 {
        return None;
    }

    let gross_profit = sell_price - buy_price;
    Some(Opportunity {
        item_id: first.item_id.clone(),
        buy_location,
        sell_location,
        buy_price,
        sell_price,
        gross_profit,
        tax: sell_price * tax_rate,
        net_profit,
        margin: gross_profit / buy_price,
        net_margin: net_profit / buy_price,
        risk_tier: risk_tier(quotes),
        liquidity_tier: liquidity_tier(quotes),
    })
}

/// Fails with [`NoDataError`] unless some hub has an ask and a different hub has a bid.
pub fn ensure_tradable(item_id: &str, quotes: &QuoteSet) -> Result<(), NoDataError> {
    let asks = best_asks(quotes);
    let bids = best_bids(quotes);

    let tradable = Location::ALL.iter().any(|buy| {
        asks[buy.index()].is_some()
            && Location::ALL
                .iter()
                .any(|sell| sell != buy && bids[sell.index()].is_some())
    });

    if tradable {
        Ok(())
    } else {
        Err(NoDataError {
            item_id: item_id.to_string(),
        })
    }
}

/// Risk heuristic from the mean intra-hub ask spread `(max - min) / min`.
///
/// Quotes without a usable ask range are left out of the mean. With nothing
/// left to average the item is treated as high risk.
pub fn risk_tier(quotes: &QuoteSet) -> RiskTier {
    let (sum, count) = quotes
        .iter()
        .filter_map(spread_ratio)
        .fold((0.0, 0_usize), |(sum, count), ratio| (sum + ratio, count + 1));

    if count == 0 {
        return RiskTier::High;
    }

    let average = sum / count as f64;
    if average < LOW_RISK_SPREAD {
        RiskTier::Low
    } else if average < MEDIUM_RISK_SPREAD {
        RiskTier::Medium
    } else {
        RiskTier::High
    }
}

/// Liquidity heuristic from the total listing count across all quotes.
pub fn liquidity_tier(quotes: &QuoteSet) -> LiquidityTier {
    let listings = quotes
        .iter()
        .map(|quote| quote.listing_count)
        .fold(0, u64::saturating_add);
    if listings > HIGH_LIQUIDITY_LISTINGS {
        LiquidityTier::High
    } else if listings > MEDIUM_LIQUIDITY_LISTINGS {
        LiquidityTier::Medium
    } else {
        LiquidityTier::Low
    }
}

fn spread_ratio(quote: &Quote) -> Option<f64> {
    let min = quote.sell_price_min.filter(|price| *price > 0.0)?;
    let max = quote.sell_price_max?;
    Some((max - min) / min)
}

fn best_asks(quotes: &QuoteSet) -> [Option<f64>; HUBS] {
    let mut asks = [None; HUBS];
    for quote in quotes {
        let slot = &mut asks[quote.location.index()];
        *slot = min_price(*slot, quote.sell_price_min);
    }
    asks
}

fn best_bids(quotes: &QuoteSet) -> [Option<f64>; HUBS] {
    let mut bids = [None; HUBS];
    for quote in quotes {
        let slot = &mut bids[quote.location.index()];
        *slot = max_price(*slot, quote.buy_price_max);
    }
    bids
}

fn min_price(current: Option<f64>, candidate: Option<f64>) -> Option<f64> {
    match (current, candidate.filter(|price| *price > 0.0)) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn max_price(current: Option<f64>, candidate: Option<f64>) -> Option<f64> {
    match (current, candidate.filter(|price| *price > 0.0)) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Best prices seen at one hub across every quality.
#[derive(Clone, Debug, PartialEq)]
pub struct LocationSummary {
    pub location: Location,
    pub sell_price_min: Option<f64>,
    pub sell_price_max: Option<f64>,
    pub buy_price_min: Option<f64>,
    pub buy_price_max: Option<f64>,
    pub listings: u64,
    pub last_seen: Option<OffsetDateTime>,
}

/// One row per hub that has quotes, in [`Location::ALL`] order.
pub fn summarize_by_location(quotes: &QuoteSet) -> Vec<LocationSummary> {
    Location::ALL
        .into_iter()
        .filter_map(|location| {
            let mut at_hub = quotes.iter().filter(|quote| quote.location == location).peekable();
            at_hub.peek()?;

            let mut summary = LocationSummary {
                location,
                sell_price_min: None,
                sell_price_max: None,
                buy_price_min: None,
                buy_price_max: None,
                listings: 0,
                last_seen: None,
            };
            for quote in at_hub {
                summary.sell_price_min = min_price(summary.sell_price_min, quote.sell_price_min);
                summary.sell_price_max = max_price(summary.sell_price_max, quote.sell_price_max);
                summary.buy_price_min = min_price(summary.buy_price_min, quote.buy_price_min);
                summary.buy_price_max = max_price(summary.buy_price_max, quote.buy_price_max);
                summary.listings = summary.listings.saturating_add(quote.listing_count);
                summary.last_seen = summary.last_seen.max(quote.observed_at);
            }
            Some(summary)
        })
        .collect()
}
