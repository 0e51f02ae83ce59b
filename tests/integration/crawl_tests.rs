//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the catalog and run whole
//! crawls through real HTTP, with files written to temporary directories.

use async_trait::async_trait;
use nargh::config::{Config, IndexConfig};
use nargh::crawler::{run_crawl, Coordinator, CrawlOptions};
use nargh::output::{JsonFileSink, ResultSink, SinkResult};
use nargh::transport::{IdentityProvider, TransportError};
use nargh::{NarghError, ProductRecord};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const MARKER: &str = "分类数据";

/// Identity provider that only counts rotations
#[derive(Default)]
struct CountingIdentity(AtomicU32);

#[async_trait]
impl IdentityProvider for CountingIdentity {
    async fn new_identity(&self) -> Result<(), TransportError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Identity provider whose first rotation is refused
#[derive(Default)]
struct RefusingFirstIdentity(AtomicU32);

#[async_trait]
impl IdentityProvider for RefusingFirstIdentity {
    async fn new_identity(&self) -> Result<(), TransportError> {
        if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(TransportError::ProviderRejected("551 circuit unavailable".to_string()));
        }
        Ok(())
    }
}

/// Answers with a fixed page and raises the stop flag as it does
struct RaiseStopOnResponse {
    stop: Arc<AtomicBool>,
    body: Value,
}

impl Respond for RaiseStopOnResponse {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.stop.store(true, Ordering::SeqCst);
        ResponseTemplate::new(200)
            .set_body_json(self.body.clone())
            .set_delay(std::time::Duration::from_millis(20))
    }
}

/// Sink remembering every delivery
#[derive(Default)]
struct RecordingSink(Mutex<Vec<(u64, Vec<String>)>>);

#[async_trait]
impl ResultSink for RecordingSink {
    async fn accept(&self, id: u64, records: &[ProductRecord]) -> SinkResult<()> {
        let numbers = records.iter().map(|r| r.number.clone()).collect();
        self.0.lock().unwrap().push((id, numbers));
        Ok(())
    }
}

/// Creates a test configuration pointing at the mock server
fn create_test_config(base_url: &str, workers: u32, out: &Path) -> Config {
    let mut config = Config::default();
    config.target.base_url = base_url.to_string();
    config.tor.enabled = false;
    config.crawler.workers = workers;
    config.crawler.retry_delay_ms = 1;
    config.crawler.request_timeout_secs = 5;
    config.output.json_dir = out.join("json").to_string_lossy().into_owned();
    config.output.datasheet_path = out.join("pdf/datasheets.txt").to_string_lossy().into_owned();
    config
}

fn products_page(categories: &Value) -> String {
    format!(
        "<html><head><meta name=\"csrf-token\" content=\"tok\"></head><body><script>\n// {}\nvar categoryData = '{}';\n</script></body></html>",
        MARKER, categories
    )
}

fn search_body(page: u32, last_page: u32, numbers: &[String]) -> Value {
    let data: Vec<Value> = numbers
        .iter()
        .map(|n| json!({"number": n, "datasheet": {"pdf": format!("https://ds.example/{}.pdf", n)}}))
        .collect();
    let total = data.len();
    json!({
        "success": true, "message": "", "code": 200,
        "result": {"data": data, "current_page": page, "last_page": last_page,
                   "total_page": last_page, "total": total}
    })
}

fn soft_block() -> Value {
    json!({"success": false, "message": "请求过于频繁", "code": 429, "result": null})
}

async fn mount_products_page(server: &MockServer, categories: &Value) {
    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(200).set_body_string(products_page(categories)))
        .mount(server)
        .await;
}

/// Mounts the answer for one page of one subcategory
fn search_page(category: u64, page: u32) -> wiremock::MockBuilder {
    Mock::given(method("POST"))
        .and(path("/api/products/search"))
        .and(body_string_contains(format!(
            "current_page={}&category={}&",
            page, category
        )))
}

fn read_numbers(file: &Path) -> Vec<String> {
    let records: Vec<ProductRecord> =
        serde_json::from_str(&std::fs::read_to_string(file).unwrap()).unwrap();
    records.into_iter().map(|r| r.number).collect()
}

#[tokio::test]
async fn test_soft_block_mid_crawl_rotates_once_and_keeps_order() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    mount_products_page(&server, &json!([])).await;

    let pages: Vec<Vec<String>> = (1..=4).map(|p| vec![format!("p{}", p)]).collect();
    for (i, numbers) in pages.iter().enumerate() {
        let page = i as u32 + 1;
        search_page(42, page)
            .respond_with(ResponseTemplate::new(200).set_body_json(search_body(page, 4, numbers)))
            .mount(&server)
            .await;
    }
    // The first request for page 2 is refused
    search_page(42, 2)
        .respond_with(ResponseTemplate::new(200).set_body_json(soft_block()))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;

    let identity = Arc::new(CountingIdentity::default());
    let config = create_test_config(&server.uri(), 1, out.path());
    let sink = Arc::new(JsonFileSink::new(&config.output.json_dir));
    let coordinator = Coordinator::with_provider(config, identity.clone()).unwrap();

    let report = coordinator
        .crawl(
            &CrawlOptions { category: Some(42) },
            sink.clone(),
            Arc::new(AtomicBool::new(false)),
        )
        .await
        .unwrap();

    assert_eq!(read_numbers(&sink.path_for(42)), vec!["p1", "p2", "p3", "p4"]);
    assert_eq!(identity.0.load(Ordering::SeqCst), 1);
    assert_eq!(report.statistics.rotations, 1);
    assert_eq!(report.statistics.pages, 4);
    assert_eq!(report.statistics.completed, 1);
}

#[tokio::test]
async fn test_schema_drift_stops_before_any_output() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>new layout</body></html>"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(1, 1, &[])))
        .expect(0)
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri(), 2, out.path());
    let sink = Arc::new(JsonFileSink::new(&config.output.json_dir));
    let coordinator =
        Coordinator::with_provider(config, Arc::new(CountingIdentity::default())).unwrap();

    let err = coordinator
        .crawl(&CrawlOptions::default(), sink, Arc::new(AtomicBool::new(false)))
        .await
        .unwrap_err();

    assert!(matches!(err, NarghError::SchemaDrift { .. }));
    assert!(!out.path().join("json").exists());
    assert!(!out.path().join("pdf").exists());
}

#[tokio::test]
async fn test_retry_ceiling_abandons_one_subcategory_only() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    mount_products_page(
        &server,
        &json!([{"ID": 100, "Name": "Passives", "Subs": [
            {"ID": 1, "Name": "Resistors"},
            {"ID": 2, "Name": "Capacitors"},
            {"ID": 3, "Name": "Inductors"}
        ]}]),
    )
    .await;

    for id in [1u64, 3] {
        search_page(id, 1)
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(search_body(1, 1, &[format!("C{}", id)])),
            )
            .mount(&server)
            .await;
    }
    search_page(2, 1)
        .respond_with(ResponseTemplate::new(200).set_body_json(soft_block()))
        .mount(&server)
        .await;

    let mut config = create_test_config(&server.uri(), 2, out.path());
    config.crawler.page_retry_ceiling = 3;
    let sink = Arc::new(JsonFileSink::new(&config.output.json_dir));
    let identity = Arc::new(CountingIdentity::default());
    let coordinator = Coordinator::with_provider(config, identity.clone()).unwrap();

    let report = coordinator
        .crawl(&CrawlOptions::default(), sink.clone(), Arc::new(AtomicBool::new(false)))
        .await
        .unwrap();

    assert_eq!(read_numbers(&sink.path_for(1)), vec!["C1"]);
    assert_eq!(read_numbers(&sink.path_for(3)), vec!["C3"]);
    assert!(!sink.path_for(2).exists());
    assert_eq!(report.statistics.completed, 2);
    assert_eq!(report.statistics.aborted, 1);
    assert_eq!(identity.0.load(Ordering::SeqCst), 2);

    let datasheets = std::fs::read_to_string(&report.datasheet_path).unwrap();
    assert_eq!(
        datasheets,
        "https://ds.example/C1.pdf\nhttps://ds.example/C3.pdf\n"
    );
}

#[tokio::test]
async fn test_pool_processes_every_subcategory_exactly_once() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    let subs: Vec<Value> = (1..=10).map(|id| json!({"ID": id, "Name": format!("s{}", id)})).collect();
    mount_products_page(&server, &json!([{"ID": 500, "Name": "All", "Subs": subs}])).await;

    for id in 1..=10u64 {
        search_page(id, 1)
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(search_body(1, 2, &[format!("C{}a", id)]))
                    .set_delay(std::time::Duration::from_millis(10)),
            )
            .expect(1)
            .mount(&server)
            .await;
        search_page(id, 2)
            .respond_with(
                ResponseTemplate::new(200).set_body_json(search_body(2, 2, &[format!("C{}b", id)])),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let config = create_test_config(&server.uri(), 4, out.path());
    let sink = Arc::new(RecordingSink::default());
    let coordinator =
        Coordinator::with_provider(config, Arc::new(CountingIdentity::default())).unwrap();

    let report = coordinator
        .crawl(&CrawlOptions::default(), sink.clone(), Arc::new(AtomicBool::new(false)))
        .await
        .unwrap();

    let deliveries = sink.0.lock().unwrap().clone();
    let mut per_id: HashMap<u64, Vec<String>> = HashMap::new();
    for (id, numbers) in deliveries {
        assert!(per_id.insert(id, numbers).is_none(), "subcategory {} delivered twice", id);
    }

    assert_eq!(per_id.len(), 10);
    for id in 1..=10u64 {
        assert_eq!(per_id[&id], vec![format!("C{}a", id), format!("C{}b", id)]);
    }

    let total: usize = per_id.values().map(Vec::len).sum();
    assert_eq!(total as u64, report.statistics.records);
    assert_eq!(report.statistics.datasheets, 20);
    assert_eq!(report.statistics.worker_failures, 0);
}

#[tokio::test]
async fn test_all_workers_failing_is_reported() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri(), 3, out.path());
    let sink = Arc::new(RecordingSink::default());
    let coordinator =
        Coordinator::with_provider(config, Arc::new(CountingIdentity::default())).unwrap();

    let err = coordinator
        .crawl(
            &CrawlOptions { category: Some(7) },
            sink.clone(),
            Arc::new(AtomicBool::new(false)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, NarghError::WorkersExhausted { unprocessed: 1 }));
    assert_eq!(err.kind(), "transport-fatal");
    assert!(sink.0.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_raised_stop_flag_leaves_queue_untouched() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    mount_products_page(&server, &json!([{"ID": 1}, {"ID": 2}])).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(1, 1, &[])))
        .expect(0)
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri(), 2, out.path());
    let coordinator =
        Coordinator::with_provider(config, Arc::new(CountingIdentity::default())).unwrap();

    let report = coordinator
        .crawl(
            &CrawlOptions::default(),
            Arc::new(RecordingSink::default()),
            Arc::new(AtomicBool::new(true)),
        )
        .await
        .unwrap();

    assert!(report.stopped);
    assert_eq!(report.statistics.completed, 0);
    assert_eq!(report.statistics.unprocessed(), 2);
    assert_eq!(std::fs::read_to_string(&report.datasheet_path).unwrap(), "");
}

#[tokio::test]
async fn test_stop_during_a_job_finishes_that_job_only() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    mount_products_page(
        &server,
        &json!([{"ID": 10, "Name": "Parts", "Subs": [{"ID": 1}, {"ID": 2}, {"ID": 3}]}]),
    )
    .await;

    let stop = Arc::new(AtomicBool::new(false));
    search_page(1, 1)
        .respond_with(RaiseStopOnResponse {
            stop: Arc::clone(&stop),
            body: search_body(1, 2, &["C1a".to_string()]),
        })
        .expect(1)
        .mount(&server)
        .await;
    search_page(1, 2)
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(2, 2, &["C1b".to_string()])))
        .expect(1)
        .mount(&server)
        .await;
    for id in [2u64, 3] {
        search_page(id, 1)
            .respond_with(ResponseTemplate::new(200).set_body_json(search_body(1, 1, &[])))
            .expect(0)
            .mount(&server)
            .await;
    }

    let config = create_test_config(&server.uri(), 1, out.path());
    let sink = Arc::new(RecordingSink::default());
    let coordinator =
        Coordinator::with_provider(config, Arc::new(CountingIdentity::default())).unwrap();

    let report = coordinator
        .crawl(&CrawlOptions::default(), sink.clone(), stop)
        .await
        .unwrap();

    assert_eq!(
        sink.0.lock().unwrap().clone(),
        vec![(1, vec!["C1a".to_string(), "C1b".to_string()])]
    );
    assert!(report.stopped);
    assert_eq!(report.statistics.completed, 1);
    assert_eq!(report.statistics.pages, 2);
    assert_eq!(report.statistics.unprocessed(), 2);
    assert_eq!(
        std::fs::read_to_string(&report.datasheet_path).unwrap(),
        "https://ds.example/C1a.pdf\nhttps://ds.example/C1b.pdf\n"
    );
}

#[tokio::test]
async fn test_surviving_worker_drains_queue_after_failed_renewal() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    let subs: Vec<Value> = (1..=5).map(|id| json!({"ID": id})).collect();
    mount_products_page(&server, &json!([{"ID": 900, "Name": "All", "Subs": subs}])).await;

    // Subcategory 1 is refused once; the renewal that follows is refused too
    search_page(1, 1)
        .respond_with(ResponseTemplate::new(200).set_body_json(soft_block()))
        .expect(1)
        .mount(&server)
        .await;
    for id in 2..=5u64 {
        search_page(id, 1)
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(search_body(1, 1, &[format!("C{}", id)]))
                    .set_delay(std::time::Duration::from_millis(10)),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let config = create_test_config(&server.uri(), 2, out.path());
    let sink = Arc::new(RecordingSink::default());
    let identity = Arc::new(RefusingFirstIdentity::default());
    let coordinator = Coordinator::with_provider(config, identity.clone()).unwrap();

    let report = coordinator
        .crawl(&CrawlOptions::default(), sink.clone(), Arc::new(AtomicBool::new(false)))
        .await
        .unwrap();

    let mut delivered: Vec<u64> = sink.0.lock().unwrap().iter().map(|(id, _)| *id).collect();
    delivered.sort_unstable();
    assert_eq!(delivered, vec![2, 3, 4, 5]);
    assert_eq!(report.statistics.worker_failures, 1);
    assert_eq!(report.statistics.completed, 4);
    assert_eq!(report.statistics.aborted, 1);
    assert_eq!(report.statistics.unprocessed(), 0);
    assert!(!report.stopped);
    assert_eq!(identity.0.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_schema_drift_leaves_index_untouched() {
    let server = MockServer::start().await;
    let index = MockServer::start().await;
    let out = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>new layout</body></html>"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .expect(0)
        .mount(&index)
        .await;

    let mut config = create_test_config(&server.uri(), 1, out.path());
    config.index = Some(IndexConfig::with_host(index.uri()));

    let err = run_crawl(config, CrawlOptions::default(), Arc::new(AtomicBool::new(false)))
        .await
        .unwrap_err();

    assert!(matches!(err, NarghError::SchemaDrift { .. }));
    assert!(!out.path().join("json").exists());
}

#[tokio::test]
async fn test_run_crawl_creates_index_then_ingests() {
    let server = MockServer::start().await;
    let index = MockServer::start().await;
    let out = TempDir::new().unwrap();
    mount_products_page(&server, &json!([])).await;

    search_page(5, 1)
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(1, 1, &["C5".to_string()])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/indexes"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&index)
        .await;
    Mock::given(method("POST"))
        .and(path("/indexes/lcsc/documents"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&index)
        .await;

    let mut config = create_test_config(&server.uri(), 1, out.path());
    config.index = Some(IndexConfig::with_host(index.uri()));
    let json_dir = config.output.json_dir.clone();

    let report = run_crawl(
        config,
        CrawlOptions { category: Some(5) },
        Arc::new(AtomicBool::new(false)),
    )
    .await
    .unwrap();

    assert_eq!(report.statistics.completed, 1);
    assert_eq!(read_numbers(&Path::new(&json_dir).join("5.json")), vec!["C5"]);
}
