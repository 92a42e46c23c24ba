use crate::config::{Mode, Standard};
use crate::graph::SiteGraph;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SCHEMA_VERSION: &str = "1.0";

/// Finding severity, ordered from most to least severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Pass,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Pass => "pass",
        }
    }

    pub fn is_issue(&self) -> bool {
        *self != Severity::Pass
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `(severity, message)` observation produced by a check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub message: String,
}

impl Finding {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self::new(Severity::Critical, message)
    }

    pub fn high(message: impl Into<String>) -> Self {
        Self::new(Severity::High, message)
    }

    pub fn medium(message: impl Into<String>) -> Self {
        Self::new(Severity::Medium, message)
    }

    pub fn low(message: impl Into<String>) -> Self {
        Self::new(Severity::Low, message)
    }

    pub fn pass(message: impl Into<String>) -> Self {
        Self::new(Severity::Pass, message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryFindings {
    pub findings: Vec<Finding>,
}

/// Fetch metadata recorded for a page, whether it succeeded or failed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMeta {
    pub status_code: Option<u16>,
    pub response_time_ms: u64,
    pub content_type: Option<String>,
    pub error: bool,
    pub error_message: Option<String>,
}

/// Per-URL findings grouped by category, plus fetch metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    #[serde(flatten)]
    pub categories: BTreeMap<String, CategoryFindings>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub meta: Option<PageMeta>,
}

impl PageResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, category: &str, findings: impl IntoIterator<Item = Finding>) {
        self.categories
            .entry(category.to_string())
            .or_default()
            .findings
            .extend(findings);
    }

    pub fn findings(&self, category: &str) -> &[Finding] {
        self.categories
            .get(category)
            .map(|c| c.findings.as_slice())
            .unwrap_or(&[])
    }

    pub fn all_findings(&self) -> impl Iterator<Item = (&str, &Finding)> {
        self.categories
            .iter()
            .flat_map(|(name, c)| c.findings.iter().map(move |f| (name.as_str(), f)))
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.categories.contains_key(category)
    }
}

/// Domain-wide findings, keyed by category. Populated once per scan.
pub type DomainFindings = BTreeMap<String, Vec<Finding>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Cancelled => "cancelled",
            ScanStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanMetrics {
    pub total_requests: usize,
    pub total_errors: usize,
    pub pages_scanned: usize,
}

/// Everything a finished scan hands back to its caller
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub schema_version: String,
    pub scan_id: String,
    pub start_url: String,
    pub standards: Vec<Standard>,
    pub mode: Mode,
    pub status: ScanStatus,
    pub pages: BTreeMap<String, PageResult>,
    pub domain_findings: Option<DomainFindings>,
    pub graph: SiteGraph,
    pub metrics: ScanMetrics,
}

impl ScanResult {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
