//! Flip opportunities and the ranked result of a market scan.

use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entities::Location;

/// Coarse risk estimate derived from intra-city price spread. Heuristic only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RiskTier {
    Low = 1,
    Medium = 2,
    High = 3,
}

impl RiskTier {
    pub fn level(&self) -> u8 {
        *self as u8
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
        }
    }
}

impl TryFrom<u8> for RiskTier {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(RiskTier::Low),
            2 => Ok(RiskTier::Medium),
            3 => Ok(RiskTier::High),
            other => Err(format!("risk tier {other} outside 1..=3")),
        }
    }
}

impl From<RiskTier> for u8 {
    fn from(value: RiskTier) -> Self {
        value.level()
    }
}

/// Coarse volume estimate derived from listing counts. Heuristic only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiquidityTier {
    Low,
    Medium,
    High,
}

impl fmt::Display for LiquidityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LiquidityTier::Low => "low",
            LiquidityTier::Medium => "medium",
            LiquidityTier::High => "high",
        })
    }
}

/// Buy at one hub, sell at another. Only ever built with `net_profit > 0`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Opportunity {
    pub item_id: String,
    pub buy_location: Location,
    pub sell_location: Location,
    pub buy_price: f64,
    pub sell_price: f64,
    pub gross_profit: f64,
    pub tax: f64,
    pub net_profit: f64,
    /// `gross_profit / buy_price`, as a fraction.
    pub margin: f64,
    /// `net_profit / buy_price`, as a fraction.
    pub net_margin: f64,
    pub risk_tier: RiskTier,
    pub liquidity_tier: LiquidityTier,
}

impl Opportunity {
    pub fn margin_percent(&self) -> f64 {
        self.margin * 100.0
    }

    pub fn net_margin_percent(&self) -> f64 {
        self.net_margin * 100.0
    }
}

/// Caller-supplied thresholds for a scan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanFilters {
    /// Minimum gross profit per unit, applied while accumulating.
    pub min_profit: f64,
    /// Minimum gross margin in percent, applied while accumulating.
    pub min_margin_pct: f64,
    /// View filter: hide opportunities riskier than this.
    pub max_risk: RiskTier,
    /// View filter: hide opportunities thinner than this.
    pub min_liquidity: LiquidityTier,
    pub locations: Vec<Location>,
}

impl Default for ScanFilters {
    fn default() -> Self {
        Self {
            min_profit: 0.0,
            min_margin_pct: 0.0,
            max_risk: RiskTier::High,
            min_liquidity: LiquidityTier::Low,
            locations: Location::ALL.to_vec(),
        }
    }
}

impl ScanFilters {
    /// Accumulation-time thresholds.
    pub fn accepts(&self, opportunity: &Opportunity) -> bool {
        opportunity.gross_profit >= self.min_profit
            && opportunity.margin_percent() >= self.min_margin_pct
    }

    /// View-time thresholds; changing these never requires a rescan.
    pub fn shows(&self, opportunity: &Opportunity) -> bool {
        opportunity.risk_tier <= self.max_risk && opportunity.liquidity_tier >= self.min_liquidity
    }
}

/// Per-scan diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    /// Candidates handed to the scan.
    pub requested: usize,
    /// Candidates actually scanned after the cap.
    pub scanned: usize,
    /// Candidates dropped by the per-scan cap.
    pub truncated: usize,
    pub failed: usize,
    pub no_data: usize,
    /// Tradable items with no pair passing the profit/threshold checks.
    pub unprofitable: usize,
    pub found: usize,
}

/// Ranked outcome of one scan. Built fresh per scan and handed out by value.
#[derive(Clone, Debug, Serialize)]
pub struct ScanResult {
    pub scan_id: Uuid,
    pub generation: u64,
    pub stats: ScanStats,
    filters: ScanFilters,
    opportunities: Vec<Opportunity>,
}

impl ScanResult {
    pub fn new(
        scan_id: Uuid,
        generation: u64,
        filters: ScanFilters,
        mut opportunities: Vec<Opportunity>,
        stats: ScanStats,
    ) -> Self {
        rank_opportunities(&mut opportunities);
        Self {
            scan_id,
            generation,
            stats,
            filters,
            opportunities,
        }
    }

    /// Every accumulated opportunity, ranked, ignoring view filters.
    pub fn all(&self) -> &[Opportunity] {
        &self.opportunities
    }

    /// Ranked opportunities passing the current risk and liquidity view filters.
    pub fn visible(&self) -> impl Iterator<Item = &Opportunity> + '_ {
        self.opportunities
            .iter()
            .filter(move |opportunity| self.filters.shows(opportunity))
    }

    pub fn filtered_count(&self) -> usize {
        self.visible().count()
    }

    pub fn total_count(&self) -> usize {
        self.opportunities.len()
    }

    pub fn filters(&self) -> &ScanFilters {
        &self.filters
    }

    pub fn set_max_risk(&mut self, max_risk: RiskTier) {
        self.filters.max_risk = max_risk;
    }

    pub fn set_min_liquidity(&mut self, min_liquidity: LiquidityTier) {
        self.filters.min_liquidity = min_liquidity;
    }
}

/// Sort descending by net profit; equal profits fall back to item id so the
/// order does not depend on which fetch finished first.
pub fn rank_opportunities(opportunities: &mut [Opportunity]) {
    opportunities.sort_by(|a, b| {
        b.net_profit
            .partial_cmp(&a.net_profit)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
}
