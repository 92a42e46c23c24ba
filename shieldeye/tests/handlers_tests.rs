use shieldeye::commands::command_argument_builder;
use shieldeye::handlers::*;
use shieldeye_core::analysis::{SeverityWeights, analyze_results};
use shieldeye_core::config::{Mode, Standard};
use shieldeye_core::graph::SiteGraph;
use shieldeye_core::model::{
    DomainFindings, Finding, PageMeta, PageResult, SCHEMA_VERSION, ScanMetrics, ScanResult, ScanStatus,
};
use std::collections::BTreeMap;
use std::io::Write;
use tempfile::{NamedTempFile, tempdir};

fn scan_matches(args: &[&str]) -> clap::ArgMatches {
    let mut argv = vec!["shieldeye", "scan"];
    argv.extend_from_slice(args);
    let matches = command_argument_builder()
        .try_get_matches_from(argv)
        .expect("arguments should parse");
    let (name, sub) = matches.subcommand().expect("scan subcommand");
    assert_eq!(name, "scan");
    sub.clone()
}

fn sample_result() -> ScanResult {
    let mut page = PageResult::new();
    page.push("https", [Finding::pass("SSL certificate is valid.")]);
    page.push(
        "forms",
        [Finding::medium("Form #1 does not appear to have CSRF protection.")],
    );
    page.meta = Some(PageMeta {
        status_code: Some(200),
        response_time_ms: 42,
        content_type: Some("text/html".to_string()),
        error: false,
        error_message: None,
    });

    let mut domain = DomainFindings::new();
    domain.insert(
        "headers".to_string(),
        vec![Finding::high("Missing security header: 'Strict-Transport-Security'.")],
    );

    let mut pages = BTreeMap::new();
    pages.insert("https://site.com/".to_string(), page);

    let mut graph = SiteGraph::new();
    graph.add_node("https://site.com/");

    ScanResult {
        schema_version: SCHEMA_VERSION.to_string(),
        scan_id: "scan-1".to_string(),
        start_url: "https://site.com/".to_string(),
        standards: vec![Standard::Gdpr],
        mode: Mode::QuickSafe,
        status: ScanStatus::Completed,
        pages,
        domain_findings: Some(domain),
        graph,
        metrics: ScanMetrics {
            total_requests: 1,
            total_errors: 0,
            pages_scanned: 1,
        },
    }
}

#[test]
fn test_load_request_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut file = NamedTempFile::new()?;
    writeln!(
        file,
        r#"{{"start_url": "example.com", "standards": ["GDPR", "PCI-DSS"], "mode": "Aggressive/Full"}}"#
    )?;

    let request = load_request_file(file.path())?;
    assert_eq!(request.start_url, "example.com");
    assert_eq!(request.standards, vec![Standard::Gdpr, Standard::PciDss]);
    assert_eq!(request.mode, Mode::AggressiveFull);
    assert_eq!(request.timeout, 10);
    assert!(request.verify_tls);
    Ok(())
}

#[test]
fn test_load_request_file_invalid_json() -> Result<(), Box<dyn std::error::Error>> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "not json")?;
    assert!(load_request_file(file.path()).is_err());
    Ok(())
}

#[test]
fn test_load_request_file_missing() {
    let dir = tempdir().unwrap();
    let err = load_request_file(&dir.path().join("nope.json")).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to read scan request"));
}

#[test]
fn test_build_request_from_flags() {
    let args = scan_matches(&[
        "-u",
        "example.com",
        "-s",
        "gdpr",
        "-s",
        "ISO 27001",
        "-m",
        "aggressive",
        "--max-pages",
        "5",
        "-t",
        "20",
        "-k",
    ]);
    let request = build_request(&args).unwrap();

    assert_eq!(request.start_url, "example.com");
    assert_eq!(request.standards, vec![Standard::Gdpr, Standard::Iso27001]);
    assert_eq!(request.mode, Mode::AggressiveFull);
    assert_eq!(request.max_pages, Some(5));
    assert_eq!(request.max_depth, None);
    assert_eq!(request.timeout, 20);
    assert!(!request.verify_tls);
}

#[test]
fn test_build_request_flags_override_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, r#"{{"start_url": "https://site.com", "max_depth": 1}}"#)?;
    let path = file.path().to_str().unwrap().to_string();

    let args = scan_matches(&["-r", &path, "--max-depth", "3"]);
    let request = build_request(&args)?;
    assert_eq!(request.start_url, "https://site.com");
    assert_eq!(request.max_depth, Some(3));
    Ok(())
}

#[test]
fn test_build_request_rejects_invalid() {
    let args = scan_matches(&["-u", "ftp://site.com"]);
    assert!(build_request(&args).is_err());

    let args = scan_matches(&["-u", "site.com", "-t", "0"]);
    assert!(build_request(&args).is_err());

    let args = scan_matches(&["-u", "site.com", "-m", "turbo"]);
    assert!(build_request(&args).is_err());
}

#[test]
fn test_url_and_request_conflict() {
    let result = command_argument_builder().try_get_matches_from([
        "shieldeye",
        "scan",
        "-u",
        "site.com",
        "-r",
        "req.json",
    ]);
    assert!(result.is_err());

    let result = command_argument_builder().try_get_matches_from(["shieldeye", "scan"]);
    assert!(result.is_err());
}

#[test]
fn test_template_sets_defaults_and_flags_override() {
    let args = scan_matches(&["-u", "shop.site.com", "--template", "pci-dss-ecommerce"]);
    let request = build_request(&args).unwrap();
    assert_eq!(request.standards, vec![Standard::PciDss]);
    assert_eq!(request.mode, Mode::AggressiveFull);
    assert_eq!(request.max_pages, Some(50));
    assert_eq!(request.max_depth, Some(4));
    assert_eq!(request.timeout, 20);

    let args = scan_matches(&[
        "-u",
        "shop.site.com",
        "-T",
        "pci_dss_ecommerce",
        "--max-pages",
        "5",
        "-s",
        "GDPR",
    ]);
    let request = build_request(&args).unwrap();
    assert_eq!(request.max_pages, Some(5));
    assert_eq!(request.max_depth, Some(4));
    assert_eq!(request.standards, vec![Standard::Gdpr]);
}

#[test]
fn test_unknown_template_is_rejected() {
    let args = scan_matches(&["-u", "site.com", "--template", "turbo"]);
    let err = build_request(&args).unwrap_err().to_string();
    assert!(err.contains("Unknown scan template 'turbo'"));

    let result = command_argument_builder().try_get_matches_from([
        "shieldeye",
        "scan",
        "-r",
        "req.json",
        "-T",
        "quick_gdpr",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_templates_subcommand_and_listing() {
    let matches = command_argument_builder()
        .try_get_matches_from(["shieldeye", "templates", "--tag", "privacy"])
        .unwrap();
    let (name, sub) = matches.subcommand().unwrap();
    assert_eq!(name, "templates");
    let tags: Vec<&String> = sub.get_many::<String>("tag").unwrap().collect();
    assert_eq!(tags, vec!["privacy"]);

    colored::control::set_override(false);
    let listing = render_template_list(&shieldeye_core::builtin_templates()[..2]);
    assert!(listing.contains("quick_gdpr"));
    assert!(listing.contains("Quick GDPR Compliance"));
    assert!(listing.contains("10 pages, depth 2"));
    assert!(listing.contains("standards: GDPR"));
    assert!(!listing.contains("pci_dss_ecommerce"));
}

#[test]
fn test_rate_flag_feeds_scanner_config() {
    let args = scan_matches(&["-u", "site.com", "--rate", "0.5"]);
    assert_eq!(scanner_config(&args).requests_per_second, 0.5);

    let args = scan_matches(&["-u", "site.com"]);
    assert_eq!(scanner_config(&args).requests_per_second, 5.0);
}

#[test]
fn test_parse_standards() {
    let values = vec!["pci-dss".to_string(), "GDPR".to_string()];
    assert_eq!(
        parse_standards(&values).unwrap(),
        vec![Standard::PciDss, Standard::Gdpr]
    );

    let values = vec!["HIPAA".to_string()];
    let err = parse_standards(&values).unwrap_err();
    assert!(err.to_string().contains("Invalid standard"));
}

#[test]
fn test_render_text_report() {
    colored::control::set_override(false);
    let result = sample_result();
    let analysis = analyze_results(&result, &SeverityWeights::default());
    let report = render_text_report(&result, &analysis);

    assert!(report.contains("Target:    https://site.com/"));
    assert!(report.contains("Standards: GDPR"));
    assert!(report.contains("Domain-wide findings"));
    assert!(report.contains("HIGH     Missing security header: 'Strict-Transport-Security'."));
    assert!(report.contains("https://site.com/ [200 42ms]"));
    assert!(report.contains("MEDIUM   Form #1 does not appear to have CSRF protection."));
    assert!(report.contains("0 critical, 1 high, 1 medium, 0 low"));
    // 10 + 5 over one page
    assert!(report.contains("Score:     85/100"));
}

#[test]
fn test_render_json_report() {
    let result = sample_result();
    let json = render_json_report(&result).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["schema_version"], "1.0");
    assert_eq!(value["status"], "completed");
    assert_eq!(value["pages"]["https://site.com/"]["forms"]["findings"][0]["severity"], "medium");
    assert_eq!(value["domain_findings"]["headers"][0]["severity"], "high");
}

#[test]
fn test_write_report_creates_parent_dirs() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("reports").join("scan.txt");

    write_report(&path, "hello").unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
}
