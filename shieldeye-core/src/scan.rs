//! Breadth-first crawl orchestration.
//!
//! One scan processes one task at a time. The orchestrator is the only
//! writer of the page map, the visited set and the site graph.

use crate::config::{ScanPlan, ScanRequest, ScannerConfig, Standard};
use crate::error::{CoreError, Result};
use crate::graph::{EdgeKind, SiteGraph};
use crate::metrics::{MetricsSink, MetricsUpdate, NoopMetrics};
use crate::model::{
    DomainFindings, Finding, PageMeta, PageResult, SCHEMA_VERSION, ScanMetrics, ScanResult, ScanStatus,
};
use crate::security::{
    PageContext, SecurityTxtStatus, certificate_findings, domain_checks, page_checks, run_checks,
    security_txt_url,
};
use scraper::Html;
use shieldeye_scanner::links::{LinkSet, canonicalize, is_domain_contained, partition_document_links};
use shieldeye_scanner::{CertificateInspector, DomainRateLimiter, FetchedPage, Fetcher, ScanError};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Callback for streaming human-readable progress lines
pub type ProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct CrawlTask {
    url: String,
    depth: usize,
}

#[derive(Debug, Default)]
struct CrawlState {
    queue: VecDeque<CrawlTask>,
    visited: HashSet<String>,
    pages: BTreeMap<String, PageResult>,
    graph: SiteGraph,
    domain_findings: Option<DomainFindings>,
    request_count: usize,
    error_count: usize,
}

fn fresh_page() -> PageResult {
    let mut page = PageResult::new();
    page.push("https", Vec::new());
    page.push("forms", Vec::new());
    page
}

impl CrawlState {
    fn seeded(start_url: &str) -> Self {
        let mut state = Self::default();
        state.visited.insert(start_url.to_string());
        state.graph.add_node(start_url);
        state.queue.push_back(CrawlTask {
            url: start_url.to_string(),
            depth: 0,
        });
        state
    }

    fn page_mut(&mut self, url: &str) -> &mut PageResult {
        self.pages.entry(url.to_string()).or_insert_with(fresh_page)
    }

    /// Move whatever was recorded under `from` to `to` after a redirect
    fn rename_page(&mut self, from: &str, to: &str) {
        let page = self.pages.remove(from).unwrap_or_else(fresh_page);
        self.pages.insert(to.to_string(), page);
    }
}

/// A single scan of one site.
///
/// ```no_run
/// # async fn demo() -> shieldeye_core::error::Result<()> {
/// use shieldeye_core::{ScanRequest, Scanner, Standard};
///
/// let request = ScanRequest::new("https://example.com").with_standards([Standard::Gdpr]);
/// let result = Scanner::new(&request)?.run().await?;
/// println!("{} pages scanned", result.metrics.pages_scanned);
/// # Ok(())
/// # }
/// ```
pub struct Scanner {
    scan_id: String,
    plan: ScanPlan,
    config: ScannerConfig,
    fetcher: Fetcher,
    rate_limiter: Option<DomainRateLimiter>,
    cert_inspector: CertificateInspector,
    metrics: Arc<dyn MetricsSink>,
    progress: Option<ProgressCallback>,
    cancel: Arc<AtomicBool>,
}

impl Scanner {
    pub fn new(request: &ScanRequest) -> Result<Self> {
        Self::with_config(request, ScannerConfig::default())
    }

    /// Validate `request` and build the immutable client for this scan
    pub fn with_config(request: &ScanRequest, config: ScannerConfig) -> Result<Self> {
        let plan = request.validate()?;
        let fetcher = Fetcher::new(config.client_config(&plan))?;
        let rate_limiter = Some(config.rate_limiter());
        let cert_inspector = CertificateInspector::new()
            .with_port(config.cert_port)
            .with_timeout(config.cert_timeout);

        Ok(Self {
            scan_id: Uuid::new_v4().to_string(),
            plan,
            config,
            fetcher,
            rate_limiter,
            cert_inspector,
            metrics: Arc::new(NoopMetrics),
            progress: None,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Use a limiter shared with other scans instead of a private one
    pub fn with_rate_limiter(mut self, limiter: DomainRateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn without_rate_limiting(mut self) -> Self {
        self.rate_limiter = None;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Setting the flag stops the scan before its next task
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_scan_id(mut self, scan_id: impl Into<String>) -> Self {
        self.scan_id = scan_id.into();
        self
    }

    pub fn scan_id(&self) -> &str {
        &self.scan_id
    }

    pub fn plan(&self) -> &ScanPlan {
        &self.plan
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    fn emit(&self, line: impl Into<String>) {
        let line = line.into();
        info!("{}", line);
        if let Some(callback) = &self.progress {
            callback(line);
        }
    }

    /// Crawl until the queue is empty, the page cap is hit or the scan is cancelled
    pub async fn run(self) -> Result<ScanResult> {
        let mut state = CrawlState::seeded(&self.plan.start_url);
        let mut status = ScanStatus::Completed;

        self.metrics.start_scan(&self.scan_id, &self.plan.start_url);
        debug!(
            "Scan {} of {} (max_pages={}, max_depth={})",
            self.scan_id, self.plan.domain, self.plan.max_pages, self.plan.max_depth
        );

        while let Some(task) = state.queue.pop_front() {
            if state.pages.len() >= self.plan.max_pages {
                debug!("Page cap of {} reached", self.plan.max_pages);
                break;
            }
            if self.cancel.load(Ordering::Relaxed) {
                warn!("Scan {} cancelled", self.scan_id);
                status = ScanStatus::Cancelled;
                break;
            }

            if let Err(e) = self.process_task(&mut state, task).await {
                self.metrics.end_scan(&self.scan_id, ScanStatus::Failed);
                return Err(CoreError::Execution {
                    scan_id: self.scan_id.clone(),
                    message: e.to_string(),
                });
            }
        }

        self.emit("Scan finished.");

        let metrics = ScanMetrics {
            total_requests: state.request_count,
            total_errors: state.error_count,
            pages_scanned: state.pages.len(),
        };
        self.metrics.update_scan_metrics(
            &self.scan_id,
            MetricsUpdate {
                pages_scanned: Some(metrics.pages_scanned),
                requests_made: Some(metrics.total_requests),
                errors_count: Some(metrics.total_errors),
                findings_count: Some(count_findings(&state)),
            },
        );
        self.metrics.end_scan(&self.scan_id, status);

        Ok(ScanResult {
            schema_version: SCHEMA_VERSION.to_string(),
            scan_id: self.scan_id,
            start_url: self.plan.start_url,
            standards: self.plan.standards,
            mode: self.plan.mode,
            status,
            pages: state.pages,
            domain_findings: state.domain_findings,
            graph: state.graph,
            metrics,
        })
    }

    /// One dequeued URL. Network failures are recorded and swallowed; an
    /// `Err` here means the scan itself cannot continue.
    async fn process_task(&self, state: &mut CrawlState, task: CrawlTask) -> std::result::Result<(), ScanError> {
        let CrawlTask { url, depth } = task;
        let parsed = Url::parse(&url).map_err(|e| ScanError::InvalidUrl(format!("{}: {}", url, e)))?;
        let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();

        self.emit(format!("Scanning: {} (Depth: {})", url, depth));
        state.graph.add_node(&url);

        if !host.is_empty() {
            let cert = self.cert_inspector.inspect(&host).await;
            state.page_mut(&url).push("https", certificate_findings(&host, &cert));
        }

        state.request_count += 1;
        let started = Instant::now();
        let page = match self.fetch_page(&url, &host).await {
            Ok(page) => page,
            Err(e) => {
                self.record_failure(state, &url, &e, started.elapsed());
                return Ok(());
            }
        };
        self.metrics.record_request(page.response_time);

        let final_url = canonicalize(&page.final_url);
        let final_host = page.final_url.host_str().unwrap_or_default();

        if !is_domain_contained(final_host, &self.plan.domain) {
            self.emit(format!("Skipping external link after redirect: {}", final_url));
            state.page_mut(&url).meta = Some(page_meta(&page));
            state.graph.add_edge(&url, &final_url, EdgeKind::External);
            return Ok(());
        }

        let mut current = url.clone();
        if final_url != url {
            state.graph.add_edge(&url, &final_url, EdgeKind::Redirect);
            if state.visited.contains(&final_url) {
                debug!("{} redirects to already visited {}", url, final_url);
                state.pages.remove(&url);
                return Ok(());
            }
            state.visited.insert(final_url.clone());
            state.rename_page(&url, &final_url);
            current = final_url;
        }

        state.page_mut(&current).meta = Some(page_meta(&page));

        let first_page = state.domain_findings.is_none();
        let security_txt = if first_page && self.plan.has_standard(Standard::Iso27001) {
            Some(self.lookup_security_txt(&page).await)
        } else {
            None
        };

        // The parsed document is not Send, so it lives only in this block.
        let links = {
            let document = Html::parse_document(&page.body);
            let ctx = PageContext {
                page: &page,
                document: &document,
                security_txt: security_txt.as_ref(),
            };

            if first_page {
                state.domain_findings = Some(run_checks(&domain_checks(&self.plan.standards), &ctx));
            }

            let entry = state.page_mut(&current);
            for (category, findings) in run_checks(&page_checks(), &ctx) {
                entry.push(&category, findings);
            }

            (depth < self.plan.max_depth)
                .then(|| partition_document_links(&document, &page.final_url, &self.plan.domain))
        };

        if let Some(links) = links {
            self.enqueue_links(state, &current, depth, links);
        }

        self.metrics.update_scan_metrics(
            &self.scan_id,
            MetricsUpdate {
                pages_scanned: Some(state.pages.len()),
                requests_made: Some(state.request_count),
                ..MetricsUpdate::default()
            },
        );
        Ok(())
    }

    async fn fetch_page(&self, url: &str, host: &str) -> std::result::Result<FetchedPage, ScanError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.acquire_or_err(host, self.config.acquire_timeout).await?;
        }
        self.fetcher.fetch(url).await
    }

    async fn lookup_security_txt(&self, page: &FetchedPage) -> SecurityTxtStatus {
        let Some(target) = security_txt_url(&page.final_url) else {
            return SecurityTxtStatus::Unreachable("could not build security.txt URL".to_string());
        };
        match self
            .fetcher
            .status_of(target.as_str(), self.config.security_txt_timeout)
            .await
        {
            Ok(200) => SecurityTxtStatus::Found,
            Ok(status) => SecurityTxtStatus::Missing(status),
            Err(e) => {
                debug!("security.txt lookup for {} failed: {}", target, e);
                SecurityTxtStatus::Unreachable(e.to_string())
            }
        }
    }

    fn enqueue_links(&self, state: &mut CrawlState, current: &str, depth: usize, links: LinkSet) {
        for external in &links.external {
            state.graph.add_edge(current, external, EdgeKind::External);
        }

        for link in links.internal {
            if state.visited.len() >= self.plan.max_pages {
                break;
            }
            if state.visited.insert(link.clone()) {
                state.graph.add_edge(current, &link, EdgeKind::Navigation);
                state.queue.push_back(CrawlTask {
                    url: link,
                    depth: depth + 1,
                });
            }
        }
    }

    fn record_failure(&self, state: &mut CrawlState, url: &str, error: &ScanError, elapsed: Duration) {
        state.error_count += 1;
        warn!("Error connecting to {}: {}", url, error);
        if let Some(callback) = &self.progress {
            callback(format!("Error connecting to {}: {}", url, error));
        }

        self.metrics.record_error(error.kind());
        self.metrics.update_scan_metrics(
            &self.scan_id,
            MetricsUpdate {
                errors_count: Some(state.error_count),
                ..MetricsUpdate::default()
            },
        );

        let entry = state.page_mut(url);
        entry.push(
            "https",
            [Finding::critical(format!("Could not connect to the page: {}", error))],
        );
        entry.meta = Some(PageMeta {
            status_code: None,
            response_time_ms: elapsed.as_millis() as u64,
            content_type: None,
            error: true,
            error_message: Some(error.to_string()),
        });
    }
}

fn page_meta(page: &FetchedPage) -> PageMeta {
    PageMeta {
        status_code: Some(page.status_code),
        response_time_ms: page.response_time_ms(),
        content_type: page.content_type(),
        error: false,
        error_message: None,
    }
}

fn count_findings(state: &CrawlState) -> usize {
    let page_findings: usize = state.pages.values().map(|p| p.all_findings().count()).sum();
    let domain: usize = state
        .domain_findings
        .as_ref()
        .map(|d| d.values().map(Vec::len).sum())
        .unwrap_or(0);
    page_findings + domain
}

/// Validate `request` and run it with default engine settings
pub async fn run_scan(request: &ScanRequest) -> Result<ScanResult> {
    Scanner::new(request)?.run().await
}
