// Passive security and compliance checks for fetched pages

use crate::config::Standard;
use crate::model::{DomainFindings, Finding, Severity};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use shieldeye_scanner::{CertStatus, FetchedPage};
use std::sync::LazyLock;
use url::Url;

/// Headers checked on the domain's first response, with the severity used when missing
pub const SECURITY_HEADERS: [(&str, Severity); 5] = [
    ("Strict-Transport-Security", Severity::High),
    ("Content-Security-Policy", Severity::Medium),
    ("X-Content-Type-Options", Severity::Low),
    ("X-Frame-Options", Severity::Medium),
    ("Referrer-Policy", Severity::Low),
];

pub const SECURITY_TXT_PATH: &str = "/.well-known/security.txt";

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static FORM_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("form"));
static INPUT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("input"));
static ANCHOR_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("a"));
static SCRIPT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("script[src]"));
static GENERATOR_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("meta[name=\"generator\"]"));

static CSRF_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)csrf|xsrf|_token|authenticity_token|nonce|anti-forgery").expect("static regex")
});
static CSRF_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[a-f0-9]{32,}$").expect("static regex"));
static SENSITIVE_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)password|email").expect("static regex"));
static JQUERY_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"jquery[-/.]?v?(\d+\.\d+\.\d+)").expect("static regex"));
static PRIVACY_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)privacy policy").expect("static regex"));

/// Outcome of the `security.txt` lookup, performed before checks run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityTxtStatus {
    Found,
    Missing(u16),
    Unreachable(String),
}

/// Everything a check may look at. Checks never perform I/O themselves.
pub struct PageContext<'a> {
    pub page: &'a FetchedPage,
    pub document: &'a Html,
    pub security_txt: Option<&'a SecurityTxtStatus>,
}

/// Whether a check runs once per scan or on every page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Domain,
    Page,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Check {
    SecurityHeaders,
    Cookies,
    TechStack,
    Forms,
    Transport,
    PrivacyPolicy,
    PasswordAutocomplete,
    SecurityTxt,
}

impl Check {
    pub const ALL: [Check; 8] = [
        Check::SecurityHeaders,
        Check::Cookies,
        Check::TechStack,
        Check::PrivacyPolicy,
        Check::PasswordAutocomplete,
        Check::SecurityTxt,
        Check::Forms,
        Check::Transport,
    ];

    /// Result category the findings are filed under
    pub fn category(&self) -> &'static str {
        match self {
            Check::SecurityHeaders | Check::Transport => "headers",
            Check::Cookies => "cookies",
            Check::TechStack => "tech",
            Check::Forms => "forms",
            Check::PrivacyPolicy => "privacy",
            Check::PasswordAutocomplete => "pci",
            Check::SecurityTxt => "iso",
        }
    }

    pub fn scope(&self) -> Scope {
        match self {
            Check::Forms | Check::Transport => Scope::Page,
            _ => Scope::Domain,
        }
    }

    /// Standard that has to be requested for this check to run
    pub fn standard(&self) -> Option<Standard> {
        match self {
            Check::PrivacyPolicy => Some(Standard::Gdpr),
            Check::PasswordAutocomplete => Some(Standard::PciDss),
            Check::SecurityTxt => Some(Standard::Iso27001),
            _ => None,
        }
    }

    pub fn is_enabled(&self, standards: &[Standard]) -> bool {
        self.standard().is_none_or(|s| standards.contains(&s))
    }

    pub fn run(&self, ctx: &PageContext<'_>) -> Vec<Finding> {
        match self {
            Check::SecurityHeaders => check_security_headers(ctx.page),
            Check::Cookies => check_cookies(&ctx.page.set_cookie_headers()),
            Check::TechStack => check_tech_stack(ctx.document),
            Check::Forms => check_forms(ctx.document, &ctx.page.final_url),
            Check::Transport => check_transport(&ctx.page.final_url),
            Check::PrivacyPolicy => check_privacy_policy_link(ctx.document),
            Check::PasswordAutocomplete => check_pci_dss(ctx.document),
            Check::SecurityTxt => match ctx.security_txt {
                Some(status) => check_iso_27001(status),
                None => vec![Finding::low("Could not check for the presence of a security.txt file.")],
            },
        }
    }
}

/// Domain-wide checks enabled for `standards`, in report order
pub fn domain_checks(standards: &[Standard]) -> Vec<Check> {
    Check::ALL
        .into_iter()
        .filter(|c| c.scope() == Scope::Domain && c.is_enabled(standards))
        .collect()
}

pub fn page_checks() -> Vec<Check> {
    Check::ALL
        .into_iter()
        .filter(|c| c.scope() == Scope::Page)
        .collect()
}

/// Run `checks` and group their findings by category
pub fn run_checks(checks: &[Check], ctx: &PageContext<'_>) -> DomainFindings {
    let mut grouped = DomainFindings::new();
    for check in checks {
        grouped
            .entry(check.category().to_string())
            .or_default()
            .extend(check.run(ctx));
    }
    grouped
}

pub fn security_txt_url(page_url: &Url) -> Option<Url> {
    page_url.join(SECURITY_TXT_PATH).ok()
}

pub fn certificate_findings(hostname: &str, status: &CertStatus) -> Vec<Finding> {
    let finding = match status {
        CertStatus::Valid { not_after } => Finding::pass(format!(
            "The SSL certificate for '{}' is valid until {}.",
            hostname,
            not_after.date_naive()
        )),
        CertStatus::Expired { not_after } => Finding::high(format!(
            "The SSL certificate for '{}' expired on {}.",
            hostname,
            not_after.date_naive()
        )),
        CertStatus::VerificationFailed(_) => Finding::high(format!(
            "The SSL certificate for '{}' is invalid or expired (verification error).",
            hostname
        )),
        CertStatus::Unreachable(_) => Finding::high(format!(
            "Could not connect to server '{}' to verify the certificate.",
            hostname
        )),
        CertStatus::Other(message) => {
            Finding::high(format!("Could not verify SSL certificate: {}", message))
        }
    };
    vec![finding]
}

pub fn check_security_headers(page: &FetchedPage) -> Vec<Finding> {
    SECURITY_HEADERS
        .iter()
        .map(|(header, severity)| {
            if page.has_header(header) {
                Finding::pass(format!("Found header: '{}'.", header))
            } else {
                Finding::new(*severity, format!("Missing security header: '{}'.", header))
            }
        })
        .collect()
}

/// Cookie attributes, read from raw `Set-Cookie` values
pub fn check_cookies(set_cookie_headers: &[String]) -> Vec<Finding> {
    let mut findings = Vec::new();

    for header in set_cookie_headers {
        let mut parts = header.split(';');
        let Some(name) = parts
            .next()
            .and_then(|pair| pair.split('=').next())
            .map(str::trim)
            .filter(|n| !n.is_empty())
        else {
            continue;
        };

        let attributes: Vec<String> = parts.map(|p| p.trim().to_ascii_lowercase()).collect();
        let has = |attr: &str| {
            attributes
                .iter()
                .any(|a| a == attr || a.starts_with(&format!("{}=", attr)))
        };
        let label = format!("Cookie '{}'", name);

        findings.push(if has("secure") {
            Finding::pass(format!("{} has the 'Secure' flag.", label))
        } else {
            Finding::high(format!("{} does not have the 'Secure' flag.", label))
        });
        findings.push(if has("httponly") {
            Finding::pass(format!("{} has the 'HttpOnly' flag.", label))
        } else {
            Finding::medium(format!("{} does not have the 'HttpOnly' flag.", label))
        });
        findings.push(if has("samesite") {
            Finding::pass(format!("{} has the 'SameSite' attribute.", label))
        } else {
            Finding::medium(format!("{} does not have the 'SameSite' attribute.", label))
        });
    }

    if findings.is_empty() {
        return vec![Finding::pass("The page does not set cookies in this response.")];
    }
    findings
}

pub fn check_tech_stack(document: &Html) -> Vec<Finding> {
    let mut findings = Vec::new();

    if let Some(meta) = document.select(&GENERATOR_SELECTOR).next()
        && let Some(content) = meta.value().attr("content").map(str::trim)
        && !content.is_empty()
    {
        findings.push(generator_finding(content));
    }

    let jquery_src = document
        .select(&SCRIPT_SELECTOR)
        .filter_map(|s| s.value().attr("src"))
        .map(str::to_ascii_lowercase)
        .find(|src| src.contains("jquery"));

    if let Some(src) = jquery_src {
        match JQUERY_VERSION.captures(&src).and_then(|c| c.get(1)) {
            Some(version) => findings.push(Finding::low(format!(
                "Detected jQuery version {}. Verify if it has any known vulnerabilities (CVEs).",
                version.as_str()
            ))),
            None => findings.push(Finding::pass(
                "Detected jQuery library (could not determine specific version).",
            )),
        }
    }

    findings
}

/// The trailing token is the version when it starts with a digit; the rest names the product
fn generator_finding(content: &str) -> Finding {
    let tokens: Vec<&str> = content.split_whitespace().collect();
    match tokens.split_last() {
        Some((version, product))
            if !product.is_empty() && version.starts_with(|c: char| c.is_ascii_digit()) =>
        {
            Finding::low(format!(
                "Detected {} version {}. Check for updates regularly.",
                product.join(" "),
                version
            ))
        }
        _ => Finding::pass(format!(
            "Detected {} (could not determine specific version).",
            tokens.join(" ")
        )),
    }
}

fn input_type(input: &ElementRef<'_>) -> String {
    input.value().attr("type").unwrap_or("text").to_ascii_lowercase()
}

fn has_csrf_token(form: &ElementRef<'_>) -> bool {
    form.select(&INPUT_SELECTOR).any(|input| {
        let named = input
            .value()
            .attr("name")
            .is_some_and(|name| CSRF_NAME.is_match(name));
        let hidden_token = input_type(&input) == "hidden"
            && input
                .value()
                .attr("value")
                .is_some_and(|value| CSRF_VALUE.is_match(value));
        named || hidden_token
    })
}

pub fn check_forms(document: &Html, base_url: &Url) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut form_count = 0;

    for (i, form) in document.select(&FORM_SELECTOR).enumerate() {
        form_count += 1;
        let form_id = format!("Form #{}", i + 1);

        let action = form.value().attr("action").unwrap_or("").trim();
        let action_url = base_url.join(action).unwrap_or_else(|_| base_url.clone());
        if action_url.scheme() != "https" {
            findings.push(Finding::high(format!(
                "{} submits data to an insecure address.",
                form_id
            )));
        }

        if !has_csrf_token(&form) {
            let sensitive = form
                .select(&INPUT_SELECTOR)
                .any(|input| SENSITIVE_TYPE.is_match(&input_type(&input)));
            if sensitive {
                findings.push(Finding::medium(format!(
                    "{} with sensitive fields does not appear to have CSRF protection.",
                    form_id
                )));
            } else {
                findings.push(Finding::low(format!(
                    "{} does not appear to have CSRF protection.",
                    form_id
                )));
            }
        }
    }

    if form_count == 0 {
        return vec![Finding::pass("No forms found on the page.")];
    }
    findings
}

pub fn check_transport(final_url: &Url) -> Vec<Finding> {
    if final_url.scheme() == "https" {
        vec![Finding::pass("Page correctly uses HTTPS.")]
    } else {
        vec![Finding::high("Page does not automatically redirect to HTTPS.")]
    }
}

/// GDPR: a visible link to the privacy policy
pub fn check_privacy_policy_link(document: &Html) -> Vec<Finding> {
    let link = document.select(&ANCHOR_SELECTOR).find(|a| {
        a.value().attr("href").is_some() && PRIVACY_TEXT.is_match(&a.text().collect::<String>())
    });

    match link {
        Some(a) => vec![Finding::pass(format!(
            "Found a link to the privacy policy: '{}'",
            a.text().collect::<String>().trim()
        ))],
        None => vec![Finding::medium(
            "No direct link to the privacy policy was found on the main page. This is recommended under GDPR.",
        )],
    }
}

/// PCI-DSS: password fields must disable autocomplete
pub fn check_pci_dss(document: &Html) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut password_fields = 0;

    for form in document.select(&FORM_SELECTOR) {
        for input in form.select(&INPUT_SELECTOR) {
            if input_type(&input) != "password" {
                continue;
            }
            password_fields += 1;
            let autocomplete = input.value().attr("autocomplete").unwrap_or("on");
            if !autocomplete.trim().eq_ignore_ascii_case("off") {
                findings.push(Finding::medium(
                    "A password field was found without 'autocomplete=\"off\"', which is recommended by PCI-DSS.",
                ));
            }
        }
    }

    if password_fields == 0 {
        findings.push(Finding::pass("No password fields were found on the page."));
    } else if findings.is_empty() {
        findings.push(Finding::pass("All found password fields have autocomplete disabled."));
    }
    findings
}

/// ISO 27001: a reachable `security.txt`
pub fn check_iso_27001(status: &SecurityTxtStatus) -> Vec<Finding> {
    match status {
        SecurityTxtStatus::Found => vec![Finding::pass(
            "Found a security.txt file, which is good practice under ISO 27001.",
        )],
        SecurityTxtStatus::Missing(_) => vec![Finding::low(
            "Missing security.txt file. Consider adding one to facilitate contact regarding security matters.",
        )],
        SecurityTxtStatus::Unreachable(_) => vec![Finding::low(
            "Could not check for the presence of a security.txt file.",
        )],
    }
}
