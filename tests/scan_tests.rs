use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use reqwest::Url;

use market_flip_scanner::{
    infra::{
        albion::{PriceTransport, TransportResponse, DEFAULT_BASE_URL},
        cache::Clock,
    },
    FetchError, Item, Location, QuoteCache, QuoteFetcher, RiskTier, ScanError, ScanFilters,
    Scanner, Settings, StaticCatalog,
};

/// Upstream stand-in keyed by the comma-joined item ids in the request path.
#[derive(Default)]
struct MarketStub {
    responses: HashMap<String, (u16, String)>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    delay: Option<Duration>,
}

impl MarketStub {
    fn with(mut self, item_id: &str, status: u16, body: String) -> Self {
        self.responses.insert(item_id.to_string(), (status, body));
        self
    }

    fn flip(self, item_id: &str, ask: f64, bid: f64) -> Self {
        self.with(item_id, 200, flip_body(item_id, ask, bid))
    }

    fn failing(self, item_id: &str) -> Self {
        self.with(item_id, 500, String::new())
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceTransport for MarketStub {
    async fn get(&self, url: Url) -> Result<TransportResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let file = url
            .path_segments()
            .and_then(|segments| segments.last())
            .unwrap_or_default()
            .to_string();
        let ids = file.trim_end_matches(".json");
        let (status, body) = self
            .responses
            .get(ids)
            .cloned()
            .unwrap_or((404, String::new()));
        Ok(TransportResponse { status, body })
    }
}

struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Instant::now()),
        })
    }

    fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }
}

/// Ask in Lymhurst, bid in Martlock, plenty of listings, tight spread.
fn flip_body(item_id: &str, ask: f64, bid: f64) -> String {
    format!(
        r#"[
            {{"item_id":"{item_id}","city":"Lymhurst","quality":1,"sell_price_min":{ask},"sell_price_max":{ask},"buy_price_min":0,"buy_price_max":0,"item_count":120}},
            {{"item_id":"{item_id}","city":"Martlock","quality":1,"sell_price_min":0,"sell_price_max":0,"buy_price_min":0,"buy_price_max":{bid},"item_count":80}}
        ]"#
    )
}

fn item(id: &str) -> Item {
    Item {
        id: id.to_string(),
        name: id.to_string(),
        tier: 4,
        category: "resource".to_string(),
    }
}

fn items(ids: &[&str]) -> Vec<Item> {
    ids.iter().map(|id| item(id)).collect()
}

fn untaxed() -> Settings {
    Settings {
        tax_rate: 0.0,
        ..Settings::default()
    }
}

fn scanner(stub: Arc<MarketStub>, settings: &Settings) -> Scanner {
    scanner_with_clock(stub, settings, Arc::new(market_flip_scanner::infra::SystemClock))
}

fn scanner_with_clock(stub: Arc<MarketStub>, settings: &Settings, clock: Arc<dyn Clock>) -> Scanner {
    let cache = Arc::new(QuoteCache::with_clock(settings.ttl(), clock));
    let fetcher = QuoteFetcher::new(stub, cache, DEFAULT_BASE_URL).expect("valid base url");
    Scanner::new(fetcher, Arc::new(StaticCatalog::default()), settings)
}

#[tokio::test(start_paused = true)]
async fn fetches_never_exceed_the_concurrency_limit() {
    let ids: Vec<String> = (0..20).map(|n| format!("T4_ITEM_{n}")).collect();
    let stub = ids
        .iter()
        .fold(MarketStub::default(), |stub, id| stub.flip(id, 100.0, 150.0))
        .delayed(Duration::from_millis(250));
    let stub = Arc::new(stub);
    let settings = untaxed();
    let scanner = scanner(stub.clone(), &settings);

    let candidates: Vec<Item> = ids.iter().map(|id| item(id)).collect();
    let result = scanner
        .scan(&candidates, &ScanFilters::default())
        .await
        .expect("scan");

    assert_eq!(result.stats.found, 20);
    assert_eq!(stub.calls(), 20);
    assert_eq!(stub.peak_in_flight(), settings.concurrency_limit);
}

#[tokio::test]
async fn failed_items_are_skipped_not_fatal() {
    let ids: Vec<String> = (0..10).map(|n| format!("T4_ITEM_{n}")).collect();
    let mut stub = MarketStub::default();
    for (n, id) in ids.iter().enumerate() {
        stub = if n % 3 == 1 {
            stub.failing(id)
        } else {
            stub.flip(id, 100.0, 150.0 + n as f64)
        };
    }
    let scanner = scanner(Arc::new(stub), &Settings::default());
    let candidates: Vec<Item> = ids.iter().map(|id| item(id)).collect();

    let result = scanner
        .scan(&candidates, &ScanFilters::default())
        .await
        .expect("scan completes");

    assert_eq!(result.stats.failed, 3);
    assert_eq!(result.total_count(), 7);
    assert_eq!(result.stats.found, 7);
    assert_eq!(result.stats.scanned, 10);
}

#[tokio::test]
async fn every_item_failing_is_an_empty_success() {
    let stub = MarketStub::default().failing("T4_A").failing("T4_B");
    let scanner = scanner(Arc::new(stub), &Settings::default());

    let result = scanner
        .scan(&items(&["T4_A", "T4_B"]), &ScanFilters::default())
        .await
        .expect("scan completes");

    assert_eq!(result.total_count(), 0);
    assert_eq!(result.stats.failed, 2);
}

#[tokio::test]
async fn results_rank_by_net_profit() {
    let stub = MarketStub::default()
        .flip("T4_A", 100.0, 110.0)
        .flip("T4_B", 100.0, 150.0)
        .flip("T4_C", 100.0, 105.0);
    let scanner = scanner(Arc::new(stub), &untaxed());

    let result = scanner
        .scan(&items(&["T4_A", "T4_B", "T4_C"]), &ScanFilters::default())
        .await
        .expect("scan completes");

    let profits: Vec<f64> = result.all().iter().map(|flip| flip.net_profit).collect();
    assert_eq!(profits, vec![50.0, 10.0, 5.0]);
    let best = &result.all()[0];
    assert_eq!(best.item_id, "T4_B");
    assert_eq!(best.buy_location, Location::Lymhurst);
    assert_eq!(best.sell_location, Location::Martlock);
}

#[tokio::test]
async fn warm_cache_scan_issues_no_requests() {
    let stub = Arc::new(
        MarketStub::default()
            .flip("T4_A", 100.0, 130.0)
            .flip("T4_B", 200.0, 260.0),
    );
    let scanner = scanner(stub.clone(), &Settings::default());
    let candidates = items(&["T4_A", "T4_B"]);

    let first = scanner
        .scan(&candidates, &ScanFilters::default())
        .await
        .expect("first scan");
    assert_eq!(stub.calls(), 2);

    let second = scanner
        .scan(&candidates, &ScanFilters::default())
        .await
        .expect("second scan");
    assert_eq!(stub.calls(), 2);
    assert_eq!(first.all(), second.all());
    assert!(second.generation > first.generation);
}

#[tokio::test]
async fn expired_quotes_are_fetched_again() {
    let stub = Arc::new(MarketStub::default().flip("T4_A", 100.0, 130.0));
    let clock = ManualClock::new();
    let scanner = scanner_with_clock(stub.clone(), &Settings::default(), clock.clone());
    let candidates = items(&["T4_A"]);

    scanner.scan(&candidates, &ScanFilters::default()).await.expect("scan");
    clock.advance(Duration::from_secs(4 * 60));
    scanner.scan(&candidates, &ScanFilters::default()).await.expect("scan");
    assert_eq!(stub.calls(), 1);

    clock.advance(Duration::from_secs(60));
    scanner.scan(&candidates, &ScanFilters::default()).await.expect("scan");
    assert_eq!(stub.calls(), 2);
}

#[tokio::test]
async fn clear_cache_forces_refetch() {
    let stub = Arc::new(MarketStub::default().flip("T4_A", 100.0, 130.0));
    let scanner = scanner(stub.clone(), &Settings::default());
    let candidates = items(&["T4_A"]);

    scanner.scan(&candidates, &ScanFilters::default()).await.expect("scan");
    scanner.clear_cache().await;
    scanner.scan(&candidates, &ScanFilters::default()).await.expect("scan");
    assert_eq!(stub.calls(), 2);
}

#[tokio::test]
async fn scan_volume_is_capped() {
    let ids: Vec<String> = (0..60).map(|n| format!("T5_ITEM_{n:02}")).collect();
    let stub = ids
        .iter()
        .fold(MarketStub::default(), |stub, id| stub.flip(id, 100.0, 140.0));
    let stub = Arc::new(stub);
    let scanner = scanner(stub.clone(), &Settings::default());
    let candidates: Vec<Item> = ids.iter().map(|id| item(id)).collect();

    let result = scanner
        .scan(&candidates, &ScanFilters::default())
        .await
        .expect("scan completes");

    assert_eq!(stub.calls(), 50);
    assert_eq!(result.stats.requested, 60);
    assert_eq!(result.stats.scanned, 50);
    assert_eq!(result.stats.truncated, 10);
    assert_eq!(result.total_count(), 50);
}

#[tokio::test]
async fn items_without_both_sides_count_as_no_data() {
    let asks_only = r#"[{"item_id":"T4_A","city":"Thetford","quality":1,"sell_price_min":90,"sell_price_max":95,"buy_price_max":0}]"#;
    let stub = MarketStub::default()
        .with("T4_A", 200, asks_only.to_string())
        .with("T4_B", 200, "[]".to_string())
        .flip("T4_C", 200.0, 150.0);
    let scanner = scanner(Arc::new(stub), &Settings::default());

    let result = scanner
        .scan(&items(&["T4_A", "T4_B", "T4_C"]), &ScanFilters::default())
        .await
        .expect("scan completes");

    assert_eq!(result.stats.no_data, 2);
    assert_eq!(result.stats.unprofitable, 1);
    assert_eq!(result.total_count(), 0);
}

#[tokio::test]
async fn profit_and_margin_floors_drop_small_flips() {
    let stub = MarketStub::default()
        .flip("T4_A", 1000.0, 1030.0)
        .flip("T4_B", 1000.0, 1500.0);
    let scanner = scanner(Arc::new(stub), &untaxed());
    let filters = ScanFilters {
        min_profit: 100.0,
        min_margin_pct: 5.0,
        ..ScanFilters::default()
    };

    let result = scanner
        .scan(&items(&["T4_A", "T4_B"]), &filters)
        .await
        .expect("scan completes");

    assert_eq!(result.total_count(), 1);
    assert_eq!(result.all()[0].item_id, "T4_B");
    assert_eq!(result.stats.unprofitable, 1);
}

#[tokio::test]
async fn risk_ceiling_filters_view_only() {
    let volatile = r#"[
        {"item_id":"T4_WILD","city":"Lymhurst","quality":1,"sell_price_min":100,"sell_price_max":200,"buy_price_max":0,"item_count":5},
        {"item_id":"T4_WILD","city":"Caerleon","quality":1,"sell_price_min":0,"sell_price_max":0,"buy_price_max":400,"item_count":5}
    ]"#;
    let stub = MarketStub::default()
        .with("T4_WILD", 200, volatile.to_string())
        .flip("T4_CALM", 100.0, 130.0);
    let scanner = scanner(Arc::new(stub), &Settings::default());
    let filters = ScanFilters {
        max_risk: RiskTier::Low,
        ..ScanFilters::default()
    };

    let mut result = scanner
        .scan(&items(&["T4_WILD", "T4_CALM"]), &filters)
        .await
        .expect("scan completes");

    assert_eq!(result.total_count(), 2);
    assert_eq!(result.filtered_count(), 1);
    assert_eq!(result.visible().next().map(|f| f.item_id.as_str()), Some("T4_CALM"));

    result.set_max_risk(RiskTier::High);
    assert_eq!(result.filtered_count(), 2);
    assert_eq!(result.visible().next().map(|f| f.item_id.as_str()), Some("T4_WILD"));
}

#[tokio::test(start_paused = true)]
async fn superseded_scan_drops_its_results() {
    let stub = Arc::new(
        MarketStub::default()
            .flip("T4_A", 100.0, 130.0)
            .flip("T4_B", 100.0, 140.0)
            .delayed(Duration::from_secs(1)),
    );
    let scanner = scanner(stub.clone(), &Settings::default());
    let candidates = items(&["T4_A", "T4_B"]);
    let filters = ScanFilters::default();

    let (stale, _) = tokio::join!(scanner.scan(&candidates, &filters), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        scanner.cancel();
    });

    assert_eq!(
        stale.expect_err("superseded"),
        ScanError::Superseded {
            generation: 1,
            current: 2
        }
    );

    let fresh = scanner.scan(&candidates, &filters).await.expect("fresh scan");
    assert_eq!(fresh.total_count(), 2);
    assert_eq!(fresh.generation, 3);
}

#[tokio::test]
async fn direct_lookup_propagates_fetch_errors() {
    let stub = MarketStub::default()
        .failing("T4_BROKEN")
        .flip("T4_A", 100.0, 150.0);
    let scanner = scanner(Arc::new(stub), &Settings::default());

    let error = scanner
        .analyze_item("T4_BROKEN", &[])
        .await
        .expect_err("fetch failure reaches caller");
    assert!(matches!(error, FetchError::Status { status: 500 }));

    let flip = scanner
        .analyze_item("T4_A", &[])
        .await
        .expect("lookup")
        .expect("profitable");
    assert!((flip.net_profit - 45.5).abs() < 1e-9);
}

#[tokio::test]
async fn price_overview_lists_hubs_in_order() {
    let stub = MarketStub::default().flip("T4_A", 100.0, 150.0);
    let scanner = scanner(Arc::new(stub), &Settings::default());

    let overview = scanner.price_overview("T4_A", &[]).await.expect("overview");
    let hubs: Vec<Location> = overview.iter().map(|row| row.location).collect();
    assert_eq!(hubs, vec![Location::Lymhurst, Location::Martlock]);
    assert_eq!(overview[0].sell_price_min, Some(100.0));
    assert_eq!(overview[1].buy_price_max, Some(150.0));
    assert_eq!(overview[0].listings, 120);
}

#[tokio::test]
async fn catalog_scan_only_touches_flip_candidates() {
    let stub = Arc::new(
        MarketStub::default()
            .flip("T4_PLANKS", 100.0, 130.0)
            .flip("T3_PLANKS", 50.0, 90.0),
    );
    let cache = Arc::new(QuoteCache::default());
    let fetcher = QuoteFetcher::new(stub.clone(), cache, DEFAULT_BASE_URL).expect("valid base url");
    let mut low_tier = item("T3_PLANKS");
    low_tier.tier = 3;
    let catalog = StaticCatalog::new(vec![low_tier, item("T4_PLANKS")]);
    let scanner = Scanner::new(fetcher, Arc::new(catalog), &Settings::default());

    let result = scanner
        .scan_catalog(&ScanFilters::default())
        .await
        .expect("scan completes");

    assert_eq!(stub.calls(), 1);
    assert_eq!(result.total_count(), 1);
    assert_eq!(result.all()[0].item_id, "T4_PLANKS");
}
