use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;

use market_flip_scanner::{
    domain::LocationSummary,
    util::version::{version_label, APP_NAME},
    RiskTier, ScanFilters, Scanner, Settings, StaticCatalog,
};

#[derive(Debug, Parser)]
#[command(version, about = "Find cross-city market flips from live price data.")]
struct Cli {
    /// Settings file (TOML). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Item catalog (`{"items": [...]}`).
    #[arg(long, default_value = "data/items.json")]
    items: PathBuf,
    /// Show the per-city price overview for one item instead of scanning.
    #[arg(long)]
    item: Option<String>,
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=3))]
    max_risk: u8,
    /// Minimum gross profit per unit, in silver.
    #[arg(long, default_value_t = 0.0)]
    min_profit: f64,
    /// Minimum gross margin, in percent.
    #[arg(long, default_value_t = 0.0)]
    min_margin: f64,
    /// Rows to print.
    #[arg(long, default_value_t = 20)]
    limit: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };
    settings.logging.init();
    tracing::info!("{APP_NAME} {}", version_label());

    let raw = fs::read_to_string(&cli.items)
        .with_context(|| format!("reading item catalog {}", cli.items.display()))?;
    let catalog = StaticCatalog::from_json(&raw).context("parsing item catalog")?;
    let scanner = Scanner::from_settings(&settings, Arc::new(catalog))?;

    match cli.item.as_deref() {
        Some(item_id) => show_item(&scanner, item_id, &settings).await,
        None => show_scan(&scanner, &cli, &settings).await,
    }
}

async fn show_item(scanner: &Scanner, item_id: &str, settings: &Settings) -> Result<()> {
    let name = scanner
        .catalog()
        .item_by_id(item_id)
        .map(|item| item.name.clone())
        .unwrap_or_else(|| item_id.to_string());

    let overview = scanner
        .price_overview(item_id, &settings.locations)
        .await
        .with_context(|| format!("fetching prices for {item_id}"))?;

    println!("{name} - market prices");
    println!(
        "{:<14} {:>12} {:>12} {:>12} {:>12} {:>9}",
        "Location", "Sell min", "Sell max", "Buy min", "Buy max", "Listings"
    );
    for row in &overview {
        print_summary(row);
    }

    match scanner.analyze_item(item_id, &settings.locations).await? {
        Some(flip) => println!(
            "Best flip: buy in {} at {:.0}, sell in {} at {:.0} -> net {:.0} ({:.1}%)",
            flip.buy_location,
            flip.buy_price,
            flip.sell_location,
            flip.sell_price,
            flip.net_profit,
            flip.net_margin_percent()
        ),
        None => println!("No profitable flip between the selected cities."),
    }
    Ok(())
}

fn print_summary(row: &LocationSummary) {
    let cell = |price: Option<f64>| {
        price
            .map(|p| format!("{p:.0}"))
            .unwrap_or_else(|| "N/A".to_string())
    };
    println!(
        "{:<14} {:>12} {:>12} {:>12} {:>12} {:>9}",
        row.location.name(),
        cell(row.sell_price_min),
        cell(row.sell_price_max),
        cell(row.buy_price_min),
        cell(row.buy_price_max),
        row.listings
    );
}

async fn show_scan(scanner: &Scanner, cli: &Cli, settings: &Settings) -> Result<()> {
    let filters = ScanFilters {
        min_profit: cli.min_profit,
        min_margin_pct: cli.min_margin,
        max_risk: RiskTier::try_from(cli.max_risk).map_err(anyhow::Error::msg)?,
        locations: settings.locations.clone(),
        ..ScanFilters::default()
    };

    let result = scanner.scan_catalog(&filters).await?;
    println!(
        "Showing {} of {} opportunities ({} items scanned, {} failed)",
        result.filtered_count(),
        result.total_count(),
        result.stats.scanned,
        result.stats.failed
    );

    for flip in result.visible().take(cli.limit) {
        println!(
            "{:<24} {:>13} -> {:<13} net {:>10.0}  margin {:>6.1}%  risk {}/3  liquidity {}",
            flip.item_id,
            flip.buy_location.name(),
            flip.sell_location.name(),
            flip.net_profit,
            flip.net_margin_percent(),
            flip.risk_tier.level(),
            flip.liquidity_tier
        );
    }

    let gold = scanner.gold_price().await;
    if gold > 0.0 {
        println!("Gold: {gold:.0} silver");
    }
    Ok(())
}
