//! Scan metrics. The orchestrator reports into any [`MetricsSink`]; the
//! default sink discards everything.

use crate::model::ScanStatus;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_MAX_HISTORY: usize = 1000;

/// Partial update of a running scan's counters. `None` fields are left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsUpdate {
    pub pages_scanned: Option<usize>,
    pub requests_made: Option<usize>,
    pub errors_count: Option<usize>,
    pub findings_count: Option<usize>,
}

pub trait MetricsSink: Send + Sync {
    fn start_scan(&self, _scan_id: &str, _url: &str) {}
    fn record_request(&self, _duration: Duration) {}
    fn record_error(&self, _kind: &str) {}
    fn update_scan_metrics(&self, _scan_id: &str, _update: MetricsUpdate) {}
    fn end_scan(&self, _scan_id: &str, _status: ScanStatus) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {}

#[derive(Debug, Clone, Serialize)]
pub struct ScanRecord {
    pub scan_id: String,
    pub url: String,
    #[serde(skip)]
    pub started: Instant,
    pub duration: Option<Duration>,
    pub pages_scanned: usize,
    pub requests_made: usize,
    pub errors_count: usize,
    pub findings_count: usize,
    pub status: ScanStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub uptime_seconds: f64,
    pub total_scans: usize,
    pub successful_scans: usize,
    pub failed_scans: usize,
    pub active_scans: usize,
    pub success_rate: f64,
    pub average_request_time_ms: f64,
    pub total_errors: usize,
    pub error_breakdown: BTreeMap<String, usize>,
}

#[derive(Debug)]
struct CollectorState {
    scans: HashMap<String, ScanRecord>,
    request_times: VecDeque<Duration>,
    error_counts: HashMap<String, usize>,
    total_scans: usize,
    successful_scans: usize,
    failed_scans: usize,
}

/// In-memory collector, safe to share between concurrent scans
#[derive(Debug)]
pub struct MetricsCollector {
    max_history: usize,
    started: Instant,
    state: Mutex<CollectorState>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_history(DEFAULT_MAX_HISTORY)
    }

    /// Keep at most `max_history` request timings
    pub fn with_history(max_history: usize) -> Self {
        Self {
            max_history: max_history.max(1),
            started: Instant::now(),
            state: Mutex::new(CollectorState {
                scans: HashMap::new(),
                request_times: VecDeque::new(),
                error_counts: HashMap::new(),
                total_scans: 0,
                successful_scans: 0,
                failed_scans: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, CollectorState> {
        // A panic while holding the lock leaves plain counters behind; keep using them.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn scan(&self, scan_id: &str) -> Option<ScanRecord> {
        self.state().scans.get(scan_id).cloned()
    }

    pub fn request_history_len(&self) -> usize {
        self.state().request_times.len()
    }

    pub fn summary(&self) -> MetricsSummary {
        let state = self.state();

        let average_request_time_ms = if state.request_times.is_empty() {
            0.0
        } else {
            let total: Duration = state.request_times.iter().sum();
            total.as_secs_f64() * 1000.0 / state.request_times.len() as f64
        };

        let success_rate = if state.total_scans > 0 {
            state.successful_scans as f64 / state.total_scans as f64 * 100.0
        } else {
            0.0
        };

        MetricsSummary {
            uptime_seconds: self.started.elapsed().as_secs_f64(),
            total_scans: state.total_scans,
            successful_scans: state.successful_scans,
            failed_scans: state.failed_scans,
            active_scans: state
                .scans
                .values()
                .filter(|s| s.status == ScanStatus::Running)
                .count(),
            success_rate,
            average_request_time_ms,
            total_errors: state.error_counts.values().sum(),
            error_breakdown: state
                .error_counts
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for MetricsCollector {
    fn start_scan(&self, scan_id: &str, url: &str) {
        let mut state = self.state();
        state.scans.insert(
            scan_id.to_string(),
            ScanRecord {
                scan_id: scan_id.to_string(),
                url: url.to_string(),
                started: Instant::now(),
                duration: None,
                pages_scanned: 0,
                requests_made: 0,
                errors_count: 0,
                findings_count: 0,
                status: ScanStatus::Running,
            },
        );
        state.total_scans += 1;
        debug!("Started tracking metrics for scan: {}", scan_id);
    }

    fn record_request(&self, duration: Duration) {
        let mut state = self.state();
        if state.request_times.len() >= self.max_history {
            state.request_times.pop_front();
        }
        state.request_times.push_back(duration);
    }

    fn record_error(&self, kind: &str) {
        *self.state().error_counts.entry(kind.to_string()).or_insert(0) += 1;
    }

    fn update_scan_metrics(&self, scan_id: &str, update: MetricsUpdate) {
        let mut state = self.state();
        let Some(record) = state.scans.get_mut(scan_id) else {
            return;
        };
        if let Some(v) = update.pages_scanned {
            record.pages_scanned = v;
        }
        if let Some(v) = update.requests_made {
            record.requests_made = v;
        }
        if let Some(v) = update.errors_count {
            record.errors_count = v;
        }
        if let Some(v) = update.findings_count {
            record.findings_count = v;
        }
    }

    fn end_scan(&self, scan_id: &str, status: ScanStatus) {
        let mut state = self.state();
        let Some(record) = state.scans.get_mut(scan_id) else {
            warn!("Scan {} not found in metrics", scan_id);
            return;
        };
        let duration = record.started.elapsed();
        record.duration = Some(duration);
        record.status = status;

        match status {
            ScanStatus::Completed => state.successful_scans += 1,
            ScanStatus::Failed => state.failed_scans += 1,
            _ => {}
        }
        debug!("Ended tracking for scan {}: {} in {:?}", scan_id, status.as_str(), duration);
    }
}
