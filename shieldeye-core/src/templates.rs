//! Named scan presets bundling standards, mode, limits and transport settings.

use crate::config::{Mode, ScanRequest, Standard};
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanTemplate {
    /// Lookup key, e.g. `quick_gdpr`
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub standards: Vec<Standard>,
    #[serde(default)]
    pub mode: Mode,
    pub max_pages: usize,
    pub max_depth: usize,
    pub timeout: u64,
    pub verify_tls: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ScanTemplate {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CoreError::config(format!("Invalid scan template: {}", e)))
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// A request for `start_url` carrying every setting of this template
    pub fn to_request(&self, start_url: impl Into<String>) -> ScanRequest {
        self.apply(ScanRequest::new(start_url))
    }

    /// Overwrite the template-controlled fields of `request`, keeping its URL and user agent
    pub fn apply(&self, mut request: ScanRequest) -> ScanRequest {
        request.standards = self.standards.clone();
        request.mode = self.mode;
        request.max_pages = Some(self.max_pages);
        request.max_depth = Some(self.max_depth);
        request.timeout = self.timeout;
        request.verify_tls = self.verify_tls;
        request
    }
}

#[allow(clippy::too_many_arguments)]
fn preset(
    id: &str,
    name: &str,
    description: &str,
    standards: &[Standard],
    mode: Mode,
    (max_pages, max_depth): (usize, usize),
    timeout: u64,
    verify_tls: bool,
    tags: &[&str],
) -> ScanTemplate {
    ScanTemplate {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        standards: standards.to_vec(),
        mode,
        max_pages,
        max_depth,
        timeout,
        verify_tls,
        tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

/// Every built-in preset, in display order
pub fn builtin_templates() -> Vec<ScanTemplate> {
    use Mode::{AggressiveFull, QuickSafe};
    use Standard::{Gdpr, Iso27001, PciDss};

    vec![
        preset(
            "quick_gdpr",
            "Quick GDPR Compliance",
            "Fast GDPR compliance check for websites",
            &[Gdpr],
            QuickSafe,
            (10, 2),
            10,
            false,
            &["gdpr", "privacy", "quick"],
        ),
        preset(
            "full_gdpr",
            "Full GDPR Audit",
            "Comprehensive GDPR compliance audit",
            &[Gdpr],
            AggressiveFull,
            (100, 5),
            30,
            true,
            &["gdpr", "privacy", "comprehensive"],
        ),
        preset(
            "pci_dss_ecommerce",
            "PCI-DSS E-commerce",
            "PCI-DSS compliance for e-commerce sites",
            &[PciDss],
            AggressiveFull,
            (50, 4),
            20,
            true,
            &["pci-dss", "ecommerce", "payment"],
        ),
        preset(
            "iso27001_security",
            "ISO 27001 Security Audit",
            "ISO 27001 information security audit",
            &[Iso27001],
            AggressiveFull,
            (75, 4),
            25,
            true,
            &["iso27001", "security", "audit"],
        ),
        preset(
            "multi_compliance",
            "Multi-Standard Compliance",
            "Check against GDPR, PCI-DSS, and ISO 27001",
            &Standard::ALL,
            AggressiveFull,
            (100, 5),
            30,
            true,
            &["multi-standard", "comprehensive"],
        ),
        preset(
            "security_headers",
            "Security Headers Check",
            "Focus on HTTP security headers",
            &[],
            QuickSafe,
            (5, 1),
            10,
            false,
            &["headers", "security", "quick"],
        ),
        preset(
            "ssl_tls_audit",
            "SSL/TLS Security Audit",
            "Certificate and transport check on the first pages",
            &[],
            QuickSafe,
            (5, 1),
            15,
            true,
            &["ssl", "tls", "encryption"],
        ),
        preset(
            "cookie_privacy",
            "Cookie & Privacy Audit",
            "Focus on cookies and privacy compliance",
            &[Gdpr],
            QuickSafe,
            (20, 3),
            15,
            false,
            &["cookies", "privacy", "gdpr"],
        ),
        preset(
            "form_security",
            "Form Security Audit",
            "Check form security and data transmission",
            &[PciDss],
            AggressiveFull,
            (30, 3),
            20,
            true,
            &["forms", "security", "input"],
        ),
        preset(
            "api_security",
            "API Security Scan",
            "Security scan for REST APIs",
            &[Iso27001],
            QuickSafe,
            (10, 2),
            15,
            true,
            &["api", "security", "rest"],
        ),
        preset(
            "penetration_test_prep",
            "Penetration Test Preparation",
            "Pre-pentest reconnaissance and vulnerability identification",
            &Standard::ALL,
            AggressiveFull,
            (150, 6),
            30,
            true,
            &["pentest", "reconnaissance", "comprehensive"],
        ),
        preset(
            "continuous_monitoring",
            "Continuous Monitoring",
            "Lightweight scan for continuous security monitoring",
            &[Iso27001],
            QuickSafe,
            (15, 2),
            10,
            false,
            &["monitoring", "continuous", "lightweight"],
        ),
    ]
}

/// Look up a built-in preset. `Quick-GDPR` and `quick_gdpr` name the same one.
pub fn builtin_template(id: &str) -> Result<ScanTemplate> {
    let wanted = id.trim().to_ascii_lowercase().replace('-', "_");
    builtin_templates()
        .into_iter()
        .find(|t| t.id == wanted)
        .ok_or_else(|| {
            CoreError::config(format!(
                "Unknown scan template '{}'. Available: {}",
                id,
                builtin_templates()
                    .iter()
                    .map(|t| t.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })
}

/// Built-in presets carrying any of `tags`
pub fn templates_with_tags(tags: &[&str]) -> Vec<ScanTemplate> {
    builtin_templates()
        .into_iter()
        .filter(|t| tags.iter().any(|tag| t.has_tag(tag)))
        .collect()
}
