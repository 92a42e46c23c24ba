use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::{ColoredString, Colorize};
use indicatif::{ProgressBar, ProgressStyle};
use shieldeye_core::analysis::{AnalysisResult, SeverityWeights, analyze_results};
use shieldeye_core::model::{Finding, PageResult, ScanResult, Severity};
use shieldeye_core::templates::{ScanTemplate, builtin_template, builtin_templates, templates_with_tags};
use shieldeye_core::{ProgressCallback, ScanRequest, Scanner, ScannerConfig, Standard};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over the flags when set.
pub fn init_logging(verbose: u8, quiet: bool) {
    let default = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn print_banner() {
    println!("{}", "═".repeat(60).bright_blue().bold());
    println!(
        "{}  {}",
        "  SHIELDEYE".bright_white().bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).bright_black()
    );
    println!("{}", "  security & compliance scanner".bright_black());
    println!("{}", "═".repeat(60).bright_blue().bold());
}

/// Load a JSON scan request from disk
pub fn load_request_file(path: &Path) -> Result<ScanRequest> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scan request {}", path.display()))?;
    let request = ScanRequest::from_json(&content)
        .with_context(|| format!("Failed to parse scan request {}", path.display()))?;
    Ok(request)
}

pub fn parse_standards<'a>(values: impl IntoIterator<Item = &'a String>) -> Result<Vec<Standard>> {
    values
        .into_iter()
        .map(|v| v.parse::<Standard>().map_err(anyhow::Error::from))
        .collect()
}

/// Merge a request file (if any) with command-line overrides and validate the result
pub fn build_request(args: &ArgMatches) -> Result<ScanRequest> {
    let mut request = match args.get_one::<PathBuf>("request") {
        Some(path) => load_request_file(path)?,
        None => {
            let url = args
                .get_one::<String>("url")
                .context("Either --url or --request must be provided")?;
            ScanRequest::new(url.clone())
        }
    };

    if let Some(name) = args.get_one::<String>("template") {
        let template = builtin_template(name)?;
        debug!("Applying scan template {}", template.id);
        request = template.apply(request);
    }

    if let Some(values) = args.get_many::<String>("standard") {
        request.standards = parse_standards(values)?;
    }
    if let Some(mode) = args.get_one::<String>("mode") {
        request.mode = mode.parse()?;
    }
    if let Some(max_pages) = args.get_one::<usize>("max-pages") {
        request.max_pages = Some(*max_pages);
    }
    if let Some(max_depth) = args.get_one::<usize>("max-depth") {
        request.max_depth = Some(*max_depth);
    }
    if let Some(timeout) = args.get_one::<u64>("timeout") {
        request.timeout = *timeout;
    }
    if args.get_flag("insecure") {
        request.verify_tls = false;
    }
    if let Some(user_agent) = args.get_one::<String>("user-agent") {
        request.user_agent = Some(user_agent.clone());
    }

    // Fail before any network activity
    request.validate()?;
    Ok(request)
}

pub fn scanner_config(args: &ArgMatches) -> ScannerConfig {
    let rate = args.get_one::<f64>("rate").copied().unwrap_or(5.0);
    ScannerConfig {
        requests_per_second: rate,
        ..ScannerConfig::default()
    }
}

fn severity_label(severity: Severity) -> ColoredString {
    let label = format!("{:<8}", severity.as_str().to_uppercase());
    match severity {
        Severity::Critical => label.bright_red().bold(),
        Severity::High => label.red(),
        Severity::Medium => label.yellow(),
        Severity::Low => label.blue(),
        Severity::Pass => label.green(),
    }
}

fn push_findings(report: &mut String, indent: &str, findings: &[Finding]) {
    for finding in findings {
        report.push_str(&format!(
            "{}{} {}\n",
            indent,
            severity_label(finding.severity),
            finding.message
        ));
    }
}

fn push_page(report: &mut String, url: &str, page: &PageResult) {
    let status = match &page.meta {
        Some(meta) if meta.error => "error".red().to_string(),
        Some(meta) => match meta.status_code {
            Some(code @ 200..=299) => code.to_string().green().to_string(),
            Some(code @ 300..=399) => code.to_string().cyan().to_string(),
            Some(code @ 400..=499) => code.to_string().yellow().to_string(),
            Some(code) => code.to_string().red().to_string(),
            None => "-".to_string(),
        },
        None => "-".to_string(),
    };
    let elapsed = page
        .meta
        .as_ref()
        .map(|m| format!(" {}ms", m.response_time_ms))
        .unwrap_or_default();

    report.push_str(&format!("\n  {} [{}{}]\n", url.bright_white().bold(), status, elapsed.bright_black()));
    for (category, findings) in &page.categories {
        if findings.findings.is_empty() {
            continue;
        }
        report.push_str(&format!("    {}\n", category.bright_cyan()));
        push_findings(report, "      ", &findings.findings);
    }
}

fn score_label(score: u32) -> ColoredString {
    let text = format!("{}/100", score);
    match score {
        80..=100 => text.green().bold(),
        50..=79 => text.yellow().bold(),
        _ => text.red().bold(),
    }
}

/// Human-readable report: domain findings, then each page, then the score
pub fn render_text_report(result: &ScanResult, analysis: &AnalysisResult) -> String {
    let mut report = String::new();
    let divider = "━".repeat(60);

    report.push_str(&format!("{}\n", divider));
    report.push_str(&format!("Target:    {}\n", result.start_url));
    report.push_str(&format!("Mode:      {}\n", result.mode));
    let standards: Vec<&str> = result.standards.iter().map(Standard::as_str).collect();
    report.push_str(&format!(
        "Standards: {}\n",
        if standards.is_empty() { "none".to_string() } else { standards.join(", ") }
    ));
    report.push_str(&format!(
        "Status:    {}  ({} pages, {} requests, {} errors)\n",
        result.status.as_str(),
        result.metrics.pages_scanned,
        result.metrics.total_requests,
        result.metrics.total_errors
    ));

    if let Some(domain) = &result.domain_findings {
        report.push_str(&format!("\n{}\n", "Domain-wide findings".bold()));
        for (category, findings) in domain {
            if findings.is_empty() {
                continue;
            }
            report.push_str(&format!("    {}\n", category.bright_cyan()));
            push_findings(&mut report, "      ", findings);
        }
    }

    report.push_str(&format!("\n{}\n", "Pages".bold()));
    for (url, page) in &result.pages {
        push_page(&mut report, url, page);
    }

    let counts = &analysis.summary_counts;
    report.push_str(&format!("\n{}\n", divider));
    report.push_str(&format!(
        "Summary:   {} critical, {} high, {} medium, {} low ({} unique)\n",
        counts.critical,
        counts.high,
        counts.medium,
        counts.low,
        analysis.findings.len()
    ));
    report.push_str(&format!("Score:     {}\n", score_label(analysis.score)));
    report
}

pub fn render_template_list(templates: &[ScanTemplate]) -> String {
    let mut out = String::new();
    for template in templates {
        let standards: Vec<&str> = template.standards.iter().map(Standard::as_str).collect();
        out.push_str(&format!(
            "{}  {}\n",
            format!("{:<24}", template.id).bright_cyan().bold(),
            template.name
        ));
        out.push_str(&format!("    {}\n", template.description.bright_black()));
        out.push_str(&format!(
            "    {} | {} pages, depth {} | timeout {}s | standards: {} | tags: {}\n",
            template.mode,
            template.max_pages,
            template.max_depth,
            template.timeout,
            if standards.is_empty() { "none".to_string() } else { standards.join(", ") },
            template.tags.join(", ")
        ));
    }
    out
}

pub fn handle_templates(args: &ArgMatches) -> Result<()> {
    let tags: Vec<&str> = args
        .get_many::<String>("tag")
        .map(|values| values.map(String::as_str).collect())
        .unwrap_or_default();
    let templates = if tags.is_empty() {
        builtin_templates()
    } else {
        templates_with_tags(&tags)
    };

    if templates.is_empty() {
        println!("No templates match the given tags.");
    } else {
        print!("{}", render_template_list(&templates));
    }
    Ok(())
}

pub fn render_json_report(result: &ScanResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("Failed to serialize scan result")
}

pub fn write_report(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write report to {}", path.display()))
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message("Starting scan...");
    pb
}

pub async fn handle_scan(args: &ArgMatches, quiet: bool) -> Result<()> {
    let request = build_request(args)?;
    let config = scanner_config(args);
    let format = args.get_one::<String>("format").map(String::as_str).unwrap_or("text");
    let output = args.get_one::<PathBuf>("output");

    let progress_bar = (!quiet).then(spinner);
    let progress: ProgressCallback = match &progress_bar {
        Some(pb) => {
            let pb = pb.clone();
            Arc::new(move |line: String| pb.set_message(line))
        }
        None => Arc::new(|_line: String| {}),
    };

    // Ctrl-C stops the crawl before its next page and still reports what was found
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing current page");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    let scanner = Scanner::with_config(&request, config)?
        .with_progress_callback(progress)
        .with_cancel_flag(cancel);
    debug!("Starting scan {}", scanner.scan_id());

    let result = scanner.run().await;
    if let Some(pb) = &progress_bar {
        pb.finish_and_clear();
    }
    let result = result?;

    let rendered = match format {
        "json" => render_json_report(&result)?,
        _ => {
            let analysis = analyze_results(&result, &SeverityWeights::default());
            render_text_report(&result, &analysis)
        }
    };

    match output {
        Some(path) => {
            write_report(path, &rendered)?;
            if !quiet {
                println!("{} Report saved to {}", "✓".green().bold(), path.display());
            }
        }
        None => print!("{}", rendered),
    }
    Ok(())
}
