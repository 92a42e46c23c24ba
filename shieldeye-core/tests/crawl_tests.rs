// End-to-end crawl tests against a local mock site

use shieldeye_core::analysis::{SeverityWeights, analyze_results};
use shieldeye_core::config::{ScanRequest, ScannerConfig, Standard};
use shieldeye_core::graph::EdgeKind;
use shieldeye_core::metrics::{MetricsCollector, MetricsSink};
use shieldeye_core::model::{ScanResult, ScanStatus, Severity};
use shieldeye_core::scan::Scanner;
use shieldeye_scanner::DomainRateLimiter;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_config() -> ScannerConfig {
    ScannerConfig {
        max_retries: 1,
        retry_base_delay: Duration::from_millis(10),
        cert_timeout: Duration::from_secs(1),
        security_txt_timeout: Duration::from_secs(2),
        ..ScannerConfig::default()
    }
}

fn html_with_links(links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|l| format!(r#"<a href="{}">{}</a>"#, l, l))
        .collect();
    format!("<html><body>{}</body></html>", anchors)
}

async fn mount_page(server: &MockServer, route: &str, links: &[&str]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(html_with_links(links), "text/html"),
        )
        .mount(server)
        .await;
}

async fn run(request: ScanRequest) -> ScanResult {
    Scanner::with_config(&request, fast_config())
        .unwrap()
        .run()
        .await
        .unwrap()
}

fn url(server: &MockServer, route: &str) -> String {
    format!("{}{}", server.uri(), route)
}

// ============================================================================
// Traversal Bounds
// ============================================================================

#[tokio::test]
async fn test_depth_bound_excludes_deeper_pages() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/b", "/c"]).await;
    mount_page(&server, "/b", &["/d"]).await;
    mount_page(&server, "/c", &[]).await;
    Mock::given(method("GET"))
        .and(path("/d"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = run(ScanRequest::new(server.uri()).with_max_depth(1)).await;

    assert!(result.pages.contains_key(&server.uri()));
    assert!(result.pages.contains_key(&url(&server, "/b")));
    assert!(result.pages.contains_key(&url(&server, "/c")));
    assert!(!result.pages.contains_key(&url(&server, "/d")));
    assert_eq!(result.status, ScanStatus::Completed);
}

#[tokio::test]
async fn test_deeper_limit_reaches_grandchild() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/b", "/c"]).await;
    mount_page(&server, "/b", &["/d"]).await;
    mount_page(&server, "/c", &[]).await;
    mount_page(&server, "/d", &[]).await;

    let result = run(ScanRequest::new(server.uri()).with_max_depth(2)).await;

    assert!(result.pages.contains_key(&url(&server, "/d")));
    assert_eq!(result.metrics.pages_scanned, 4);
    assert!(result.graph.has_edge(&url(&server, "/b"), &url(&server, "/d")));
}

#[tokio::test]
async fn test_page_cap_is_exact_and_deterministic() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/c", "/a", "/b"]).await;
    mount_page(&server, "/a", &[]).await;
    mount_page(&server, "/b", &[]).await;
    mount_page(&server, "/c", &[]).await;

    let result = run(ScanRequest::new(server.uri()).with_max_pages(2)).await;

    let keys: Vec<&String> = result.pages.keys().collect();
    assert_eq!(keys, vec![&server.uri(), &url(&server, "/a")]);
    assert!(!result.graph.contains(&url(&server, "/b")));
}

// ============================================================================
// Domain Containment and Redirects
// ============================================================================

#[tokio::test]
async fn test_external_link_is_graphed_but_not_crawled() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["https://external.example/", "/inside"]).await;
    mount_page(&server, "/inside", &[]).await;

    let result = run(ScanRequest::new(server.uri())).await;

    assert!(result.graph.contains("https://external.example"));
    assert_eq!(
        result.graph.edge_kind(&server.uri(), "https://external.example"),
        Some(EdgeKind::External)
    );
    assert!(!result.pages.contains_key("https://external.example"));
    assert_eq!(result.pages.len(), 2);
}

#[tokio::test]
async fn test_redirect_to_visited_page_merges() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/a", "/b"]).await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", url(&server, "/b")))
        .mount(&server)
        .await;
    mount_page(&server, "/b", &[]).await;

    let result = run(ScanRequest::new(server.uri())).await;

    let b = url(&server, "/b");
    assert_eq!(result.pages.keys().filter(|k| **k == b).count(), 1);
    assert!(!result.pages.contains_key(&url(&server, "/a")));
    assert!(result.graph.has_edge(&url(&server, "/a"), &b));
    assert_eq!(
        result.graph.edge_kind(&url(&server, "/a"), &b),
        Some(EdgeKind::Redirect)
    );
}

#[tokio::test]
async fn test_redirect_to_new_page_moves_result() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/old"]).await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/new"))
        .mount(&server)
        .await;
    mount_page(&server, "/new", &[]).await;

    let result = run(ScanRequest::new(server.uri())).await;

    let new = url(&server, "/new");
    assert!(!result.pages.contains_key(&url(&server, "/old")));
    let page = &result.pages[&new];
    assert_eq!(page.meta.as_ref().unwrap().status_code, Some(200));
    assert!(!page.findings("https").is_empty());
    assert!(result.graph.has_edge(&url(&server, "/old"), &new));
}

#[tokio::test]
async fn test_redirect_to_external_host_is_not_crawled() {
    let server = MockServer::start().await;
    // Same listener under a different host name, so the redirect target is off-domain
    let foreign = format!("http://localhost:{}/x", server.address().port());
    mount_page(&server, "/", &["/out"]).await;
    Mock::given(method("GET"))
        .and(path("/out"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", foreign.as_str()))
        .mount(&server)
        .await;
    mount_page(&server, "/x", &["/never"]).await;

    let result = run(ScanRequest::new(server.uri())).await;

    let out = url(&server, "/out");
    assert_eq!(result.graph.edge_kind(&out, &foreign), Some(EdgeKind::External));
    assert!(result.graph.contains(&foreign));
    assert!(!result.pages.contains_key(&foreign));
    assert!(!result.graph.contains(&url(&server, "/never")));
    assert_eq!(result.pages[&out].meta.as_ref().unwrap().status_code, Some(200));
    assert_eq!(result.pages.len(), 2);
    assert_eq!(result.status, ScanStatus::Completed);
}

// ============================================================================
// Failure Isolation
// ============================================================================

#[tokio::test]
async fn test_rate_limit_timeout_is_a_per_page_failure() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/a", "/b"]).await;
    mount_page(&server, "/a", &[]).await;
    mount_page(&server, "/b", &[]).await;

    // One token, refilled every ten seconds: only the start page gets through
    let starved = DomainRateLimiter::with_capacity(0.1, 1.0);
    let config = ScannerConfig {
        acquire_timeout: Duration::from_millis(300),
        ..fast_config()
    };
    let result = Scanner::with_config(&ScanRequest::new(server.uri()), config)
        .unwrap()
        .with_rate_limiter(starved)
        .run()
        .await
        .unwrap();

    assert_eq!(result.status, ScanStatus::Completed);
    assert!(!result.pages[&server.uri()].meta.as_ref().unwrap().error);
    for route in ["/a", "/b"] {
        let page = &result.pages[&url(&server, route)];
        let critical: Vec<&str> = page
            .findings("https")
            .iter()
            .filter(|f| f.severity == Severity::Critical)
            .map(|f| f.message.as_str())
            .collect();
        assert_eq!(critical.len(), 1, "{} should fail exactly once", route);
        assert!(critical[0].contains("Rate limiter did not admit"));
        let meta = page.meta.as_ref().unwrap();
        assert!(meta.error);
        assert_eq!(meta.status_code, None);
    }
    assert_eq!(result.metrics.total_errors, 2);
}

#[tokio::test]
async fn test_connection_failure_is_recorded_and_scan_continues() {
    let server = MockServer::start().await;
    let closed_port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let broken = format!("http://127.0.0.1:{}/broken", closed_port);

    mount_page(&server, "/", &[broken.as_str(), "/ok"]).await;
    mount_page(&server, "/ok", &["/sibling"]).await;
    mount_page(&server, "/sibling", &[]).await;

    let result = run(ScanRequest::new(server.uri())).await;

    let page = &result.pages[&broken];
    let critical = page
        .findings("https")
        .iter()
        .filter(|f| f.severity == Severity::Critical)
        .count();
    assert_eq!(critical, 1);
    assert!(page.meta.as_ref().unwrap().error);
    assert!(result.pages.contains_key(&url(&server, "/sibling")));
    assert_eq!(result.metrics.total_errors, 1);
}

#[tokio::test]
async fn test_persistent_server_error_is_a_fetch_failure() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/flaky"]).await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let result = run(ScanRequest::new(server.uri())).await;

    let page = &result.pages[&url(&server, "/flaky")];
    let messages: Vec<&str> = page
        .findings("https")
        .iter()
        .filter(|f| f.severity == Severity::Critical)
        .map(|f| f.message.as_str())
        .collect();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("Could not connect to the page:"));
    assert_eq!(page.meta.as_ref().unwrap().status_code, None);
}

// ============================================================================
// Check Pipeline Integration
// ============================================================================

#[tokio::test]
async fn test_domain_findings_present_exactly_once() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/a", "/b"]).await;
    mount_page(&server, "/a", &[]).await;
    mount_page(&server, "/b", &[]).await;
    Mock::given(method("GET"))
        .and(path("/.well-known/security.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Contact: mailto:sec@site"))
        .expect(1)
        .mount(&server)
        .await;

    let request = ScanRequest::new(server.uri()).with_standards([Standard::Gdpr, Standard::Iso27001]);
    let result = run(request).await;

    let domain = result.domain_findings.as_ref().unwrap();
    let mut categories: Vec<&str> = domain.keys().map(String::as_str).collect();
    categories.sort();
    assert_eq!(categories, vec!["cookies", "headers", "iso", "privacy", "tech"]);
    assert_eq!(domain["headers"].len(), 5);
    assert_eq!(domain["iso"][0].severity, Severity::Pass);
    assert_eq!(domain["privacy"][0].severity, Severity::Medium);
    assert_eq!(result.pages.len(), 3);
}

#[tokio::test]
async fn test_per_page_categories_and_meta() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &[]).await;

    let result = run(ScanRequest::new(server.uri())).await;

    let page = &result.pages[&server.uri()];
    assert_eq!(page.findings("forms")[0].message, "No forms found on the page.");
    assert_eq!(
        page.findings("headers")[0].message,
        "Page does not automatically redirect to HTTPS."
    );
    // Certificate check against a host with no TLS listener
    assert_eq!(page.findings("https")[0].severity, Severity::High);

    let meta = page.meta.as_ref().unwrap();
    assert_eq!(meta.status_code, Some(200));
    assert!(meta.content_type.as_deref().unwrap().starts_with("text/html"));
    assert!(!meta.error);
}

// ============================================================================
// Hosting Hooks
// ============================================================================

#[tokio::test]
async fn test_cancelled_scan_returns_partial_result() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/a"]).await;

    let cancel = Arc::new(AtomicBool::new(true));
    let metrics = Arc::new(MetricsCollector::new());
    let scanner = Scanner::with_config(&ScanRequest::new(server.uri()), fast_config())
        .unwrap()
        .with_scan_id("cancel-me")
        .with_metrics(metrics.clone())
        .with_cancel_flag(cancel);

    let result = scanner.run().await.unwrap();

    assert_eq!(result.status, ScanStatus::Cancelled);
    assert!(result.pages.is_empty());
    assert_eq!(metrics.scan("cancel-me").unwrap().status, ScanStatus::Cancelled);
    assert_eq!(metrics.summary().successful_scans, 0);
}

#[tokio::test]
async fn test_metrics_and_progress_are_reported() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/a"]).await;
    mount_page(&server, "/a", &[]).await;

    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = lines.clone();
    let metrics = Arc::new(MetricsCollector::new());
    let shared_limiter = DomainRateLimiter::new(100.0);

    let scanner = Scanner::with_config(&ScanRequest::new(server.uri()), fast_config())
        .unwrap()
        .with_rate_limiter(shared_limiter.clone())
        .with_metrics(metrics.clone() as Arc<dyn MetricsSink>)
        .with_progress_callback(Arc::new(move |line: String| {
            sink.lock().unwrap().push(line);
        }));
    let scan_id = scanner.scan_id().to_string();

    let result = scanner.run().await.unwrap();

    let lines = lines.lock().unwrap();
    assert_eq!(lines[0], format!("Scanning: {} (Depth: 0)", server.uri()));
    assert_eq!(lines.last().unwrap(), "Scan finished.");

    let record = metrics.scan(&scan_id).unwrap();
    assert_eq!(record.pages_scanned, 2);
    assert_eq!(record.requests_made, 2);
    assert_eq!(record.status, ScanStatus::Completed);
    assert_eq!(result.metrics.total_requests, 2);
    assert_eq!(shared_limiter.bucket_count().await, 1);
}

#[tokio::test]
async fn test_result_serializes_and_analyzes() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/a"]).await;
    mount_page(&server, "/a", &[]).await;

    let result = run(ScanRequest::new(server.uri()).with_standards([Standard::PciDss])).await;

    let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
    assert_eq!(json["schema_version"], "1.0");
    assert_eq!(json["status"], "completed");
    assert_eq!(json["mode"], "Quick/Safe");
    assert_eq!(json["standards"][0], "PCI-DSS");
    assert!(json["domain_findings"]["pci"].is_array());
    assert!(json["pages"][server.uri()]["meta"].is_object());
    assert!(json["graph"]["edges"].is_array());

    let analysis = analyze_results(&result, &SeverityWeights::default());
    assert!(analysis.score <= 100);
    assert!(
        analysis
            .findings
            .windows(2)
            .all(|w| w[0].severity <= w[1].severity)
    );
    // Transport finding is identical on both pages and deduplicated
    let transport = analysis
        .findings
        .iter()
        .filter(|f| f.message == "Page does not automatically redirect to HTTPS.")
        .count();
    assert_eq!(transport, 1);
}
