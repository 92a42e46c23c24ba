//! Scan request parsing, validation and engine settings.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use shieldeye_scanner::fetch::{ClientConfig, DEFAULT_USER_AGENT};
use shieldeye_scanner::links::canonicalize;
use shieldeye_scanner::DomainRateLimiter;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;
use url::Url;

pub const MAX_URL_LENGTH: usize = 2048;
pub const MAX_PAGES_CEILING: usize = 1000;
pub const MAX_DEPTH_CEILING: usize = 10;
pub const MAX_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    #[serde(rename = "Quick/Safe")]
    QuickSafe,
    #[serde(rename = "Aggressive/Full")]
    AggressiveFull,
}

impl Mode {
    /// `(max_pages, max_depth)` used when the request does not override them
    pub fn default_limits(&self) -> (usize, usize) {
        match self {
            Mode::QuickSafe => (10, 2),
            Mode::AggressiveFull => (50, 5),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::QuickSafe => "Quick/Safe",
            Mode::AggressiveFull => "Aggressive/Full",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quick/safe" | "quick" | "safe" => Ok(Mode::QuickSafe),
            "aggressive/full" | "aggressive" | "full" => Ok(Mode::AggressiveFull),
            other => Err(CoreError::config(format!(
                "Invalid mode '{}'. Must be 'Quick/Safe' or 'Aggressive/Full'",
                other
            ))),
        }
    }
}

/// Compliance standards that enable extra domain-wide checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Standard {
    #[serde(rename = "GDPR")]
    Gdpr,
    #[serde(rename = "PCI-DSS")]
    PciDss,
    #[serde(rename = "ISO 27001")]
    Iso27001,
}

impl Standard {
    pub const ALL: [Standard; 3] = [Standard::Gdpr, Standard::PciDss, Standard::Iso27001];

    pub fn as_str(&self) -> &'static str {
        match self {
            Standard::Gdpr => "GDPR",
            Standard::PciDss => "PCI-DSS",
            Standard::Iso27001 => "ISO 27001",
        }
    }
}

impl fmt::Display for Standard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Standard {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "gdpr" => Ok(Standard::Gdpr),
            "pcidss" | "pci" => Ok(Standard::PciDss),
            "iso27001" | "iso" => Ok(Standard::Iso27001),
            _ => Err(CoreError::config(format!(
                "Invalid standard '{}'. Must be one of: GDPR, PCI-DSS, ISO 27001",
                s
            ))),
        }
    }
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_verify_tls() -> bool {
    true
}

/// What the caller asks for. Must pass [`ScanRequest::validate`] before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub start_url: String,
    #[serde(default)]
    pub standards: Vec<Standard>,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub max_pages: Option<usize>,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl ScanRequest {
    pub fn new(start_url: impl Into<String>) -> Self {
        Self {
            start_url: start_url.into(),
            standards: Vec::new(),
            mode: Mode::default(),
            max_pages: None,
            max_depth: None,
            timeout: DEFAULT_TIMEOUT_SECS,
            verify_tls: true,
            user_agent: None,
        }
    }

    pub fn with_standards(mut self, standards: impl IntoIterator<Item = Standard>) -> Self {
        self.standards = standards.into_iter().collect();
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CoreError::config(format!("Invalid scan request: {}", e)))
    }

    /// Check every field and resolve mode defaults into a [`ScanPlan`]
    pub fn validate(&self) -> Result<ScanPlan> {
        let start = validate_url(&self.start_url)?;
        let domain = start
            .host_str()
            .map(|h| h.trim_end_matches('.').to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .ok_or_else(|| CoreError::config("URL must have a valid domain"))?;

        let (default_pages, default_depth) = self.mode.default_limits();
        let max_pages = resolve_limit("max_pages", self.max_pages, default_pages, MAX_PAGES_CEILING)?;
        let max_depth = resolve_limit("max_depth", self.max_depth, default_depth, MAX_DEPTH_CEILING)?;

        if self.timeout == 0 {
            return Err(CoreError::config("timeout must be positive"));
        }
        if self.timeout > MAX_TIMEOUT_SECS {
            return Err(CoreError::config(format!(
                "timeout cannot exceed {} seconds",
                MAX_TIMEOUT_SECS
            )));
        }

        let mut standards = self.standards.clone();
        standards.sort();
        standards.dedup();

        let user_agent = self
            .user_agent
            .as_deref()
            .map(str::trim)
            .filter(|ua| !ua.is_empty())
            .unwrap_or(DEFAULT_USER_AGENT)
            .to_string();

        Ok(ScanPlan {
            start_url: canonicalize(&start),
            domain,
            standards,
            mode: self.mode,
            max_pages,
            max_depth,
            timeout: Duration::from_secs(self.timeout),
            verify_tls: self.verify_tls,
            user_agent,
        })
    }
}

fn validate_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoreError::config("URL must be a non-empty string"));
    }
    if trimmed.len() > MAX_URL_LENGTH {
        return Err(CoreError::config(format!(
            "URL exceeds maximum length of {} characters",
            MAX_URL_LENGTH
        )));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = Url::parse(&candidate).map_err(|e| CoreError::config(format!("Invalid URL format: {}", e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(CoreError::config(format!(
            "URL scheme '{}' is not allowed. Must be http or https",
            other
        ))),
    }
}

fn resolve_limit(name: &str, requested: Option<usize>, default: usize, ceiling: usize) -> Result<usize> {
    match requested {
        None => Ok(default),
        Some(0) => Err(CoreError::config(format!("{} must be positive", name))),
        Some(value) if value > ceiling => {
            warn!("{} of {} exceeds the safety ceiling, clamping to {}", name, value, ceiling);
            Ok(ceiling)
        }
        Some(value) => Ok(value),
    }
}

/// A validated request with every limit resolved
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPlan {
    /// Canonical start URL
    pub start_url: String,
    /// Lowercased start host, used for containment
    pub domain: String,
    pub standards: Vec<Standard>,
    pub mode: Mode,
    pub max_pages: usize,
    pub max_depth: usize,
    pub timeout: Duration,
    pub verify_tls: bool,
    pub user_agent: String,
}

impl ScanPlan {
    pub fn has_standard(&self, standard: Standard) -> bool {
        self.standards.contains(&standard)
    }
}

/// Engine tunables that are not part of a scan request
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub requests_per_second: f64,
    /// Bucket capacity; `None` means twice the rate
    pub burst: Option<f64>,
    pub acquire_timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub pool_size: usize,
    pub cert_port: u16,
    pub cert_timeout: Duration,
    pub security_txt_timeout: Duration,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 5.0,
            burst: None,
            acquire_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            pool_size: 10,
            cert_port: 443,
            cert_timeout: Duration::from_secs(5),
            security_txt_timeout: Duration::from_secs(5),
        }
    }
}

impl ScannerConfig {
    pub fn client_config(&self, plan: &ScanPlan) -> ClientConfig {
        ClientConfig {
            timeout: plan.timeout,
            verify_tls: plan.verify_tls,
            user_agent: plan.user_agent.clone(),
            max_retries: self.max_retries,
            retry_base_delay: self.retry_base_delay,
            pool_size: self.pool_size,
            ..ClientConfig::default()
        }
    }

    pub fn rate_limiter(&self) -> DomainRateLimiter {
        match self.burst {
            Some(capacity) => DomainRateLimiter::with_capacity(self.requests_per_second, capacity),
            None => DomainRateLimiter::new(self.requests_per_second),
        }
    }
}
