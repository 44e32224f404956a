use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Royal city market hubs, in the order every pairwise comparison walks them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Location {
    Lymhurst,
    Bridgewatch,
    Martlock,
    Thetford,
    #[serde(rename = "Fort Sterling")]
    FortSterling,
    Caerleon,
}

impl Location {
    /// Stable enumeration order. Detection is O(L²) over this list, so it must stay small.
    pub const ALL: [Location; 6] = [
        Location::Lymhurst,
        Location::Bridgewatch,
        Location::Martlock,
        Location::Thetford,
        Location::FortSterling,
        Location::Caerleon,
    ];

    /// Name as used by the upstream API (`city` field and `locations` query).
    pub fn name(&self) -> &'static str {
        match self {
            Location::Lymhurst => "Lymhurst",
            Location::Bridgewatch => "Bridgewatch",
            Location::Martlock => "Martlock",
            Location::Thetford => "Thetford",
            Location::FortSterling => "Fort Sterling",
            Location::Caerleon => "Caerleon",
        }
    }

    /// Position in [`Location::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown market location: {0}")]
pub struct UnknownLocation(pub String);

impl FromStr for Location {
    type Err = UnknownLocation;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect();
        Location::ALL
            .into_iter()
            .find(|loc| loc.name().replace(' ', "").eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| UnknownLocation(raw.to_string()))
    }
}

/// Item quality grade, 1 (normal) through 5 (masterpiece).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Quality(u8);

impl Quality {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub fn all() -> Vec<Quality> {
        (Self::MIN..=Self::MAX).map(Quality).collect()
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Quality {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Quality::new(value).ok_or_else(|| format!("quality {value} outside 1..=5"))
    }
}

impl From<Quality> for u8 {
    fn from(value: Quality) -> Self {
        value.0
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One price observation for an item at a hub and quality.
///
/// Prices are `None` when the upstream has no listing (it reports those as `0`).
#[derive(Clone, Debug, PartialEq)]
pub struct Quote {
    pub item_id: String,
    pub location: Location,
    pub quality: Quality,
    /// Cheapest ask: what a buyer pays right now.
    pub sell_price_min: Option<f64>,
    pub sell_price_max: Option<f64>,
    pub buy_price_min: Option<f64>,
    /// Best bid: what a seller can fill against right now.
    pub buy_price_max: Option<f64>,
    pub listing_count: u64,
    pub observed_at: Option<OffsetDateTime>,
}

/// Immutable snapshot of quotes returned by one query.
///
/// Clones share the same allocation, so handing a cached set out is cheap and
/// can never mutate what the cache holds.
#[derive(Clone, Debug)]
pub struct QuoteSet {
    quotes: Arc<[Quote]>,
}

impl QuoteSet {
    pub fn new(quotes: Vec<Quote>) -> Self {
        Self {
            quotes: quotes.into(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Quote> {
        self.quotes.iter()
    }

    pub fn as_slice(&self) -> &[Quote] {
        &self.quotes
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Quotes for a single item, as a new snapshot.
    pub fn for_item(&self, item_id: &str) -> QuoteSet {
        QuoteSet::new(
            self.quotes
                .iter()
                .filter(|quote| quote.item_id == item_id)
                .cloned()
                .collect(),
        )
    }

    /// True when both handles point at the same stored snapshot.
    pub fn same_snapshot(&self, other: &QuoteSet) -> bool {
        Arc::ptr_eq(&self.quotes, &other.quotes)
    }
}

impl Default for QuoteSet {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl PartialEq for QuoteSet {
    fn eq(&self, other: &Self) -> bool {
        self.quotes == other.quotes
    }
}

impl<'a> IntoIterator for &'a QuoteSet {
    type Item = &'a Quote;
    type IntoIter = std::slice::Iter<'a, Quote>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Catalog entry for a tradable item. Read-only to the scanner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub tier: u8,
    pub category: String,
}
