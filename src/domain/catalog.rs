//! Read-only item catalog and flip candidate selection.

use serde::Deserialize;

use super::entities::Item;

const FLIP_TIERS: std::ops::RangeInclusive<u8> = 4..=8;
const FLIP_CATEGORIES: [&str; 4] = ["weapon", "armor", "resource", "consumable"];
const FLIP_CANDIDATE_LIMIT: usize = 200;

/// Source of catalog items. Implementations never change under a running scan.
pub trait ItemSource: Send + Sync {
    fn items(&self) -> &[Item];

    fn item_by_id(&self, id: &str) -> Option<&Item> {
        self.items().iter().find(|item| item.id == id)
    }
}

/// Catalog held in memory, usually loaded once from `items.json`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StaticCatalog {
    items: Vec<Item>,
}

impl StaticCatalog {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

impl ItemSource for StaticCatalog {
    fn items(&self) -> &[Item] {
        &self.items
    }
}

/// Items commonly worth flipping: mid/high tiers of the busiest categories,
/// in catalog order.
pub fn flip_candidates(source: &dyn ItemSource) -> Vec<Item> {
    source
        .items()
        .iter()
        .filter(|item| FLIP_TIERS.contains(&item.tier))
        .filter(|item| FLIP_CATEGORIES.contains(&item.category.as_str()))
        .take(FLIP_CANDIDATE_LIMIT)
        .cloned()
        .collect()
}
