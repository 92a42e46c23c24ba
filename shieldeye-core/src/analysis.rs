//! Turns a raw [`ScanResult`] into a deduplicated finding list and a 0-100 score.

use crate::config::Standard;
use crate::model::{ScanResult, Severity};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

/// Penalty per finding of each severity. `Pass` never costs anything.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeverityWeights {
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            critical: 20,
            high: 10,
            medium: 5,
            low: 2,
        }
    }
}

impl SeverityWeights {
    pub fn weight(&self, severity: Severity) -> u32 {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Pass => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FindingDetail {
    pub severity: Severity,
    pub message: String,
    pub category: String,
    pub standards: Vec<Standard>,
    /// URL the finding was observed on; the start URL for domain-wide findings
    pub location: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SummaryCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SummaryCounts {
    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low
    }

    fn bump(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
            Severity::Pass => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub findings: Vec<FindingDetail>,
    pub summary_counts: SummaryCounts,
    pub score: u32,
}

/// Standards a category speaks for. Generic categories count for every requested standard.
pub fn standards_for_category(category: &str, requested: &[Standard]) -> Vec<Standard> {
    let specific = match category.to_ascii_lowercase().as_str() {
        "privacy" => Some(Standard::Gdpr),
        "pci" => Some(Standard::PciDss),
        "iso" => Some(Standard::Iso27001),
        _ => None,
    };

    match specific {
        Some(standard) if requested.contains(&standard) => vec![standard],
        _ => requested.to_vec(),
    }
}

fn collect_findings(result: &ScanResult) -> Vec<FindingDetail> {
    let mut collected = Vec::new();

    if let Some(domain) = &result.domain_findings {
        for (category, findings) in domain {
            for finding in findings {
                collected.push(FindingDetail {
                    severity: finding.severity,
                    message: finding.message.clone(),
                    category: category.clone(),
                    standards: standards_for_category(category, &result.standards),
                    location: result.start_url.clone(),
                });
            }
        }
    }

    for (url, page) in &result.pages {
        for (category, finding) in page.all_findings() {
            collected.push(FindingDetail {
                severity: finding.severity,
                message: finding.message.clone(),
                category: category.to_string(),
                standards: standards_for_category(category, &result.standards),
                location: url.clone(),
            });
        }
    }

    collected
}

/// Penalty normalised by the square root of the page count, clamped to 0..=100
pub fn calculate_score(counts: &SummaryCounts, weights: &SeverityWeights, pages_scanned: usize) -> u32 {
    let penalty = counts.critical as f64 * f64::from(weights.critical)
        + counts.high as f64 * f64::from(weights.high)
        + counts.medium as f64 * f64::from(weights.medium)
        + counts.low as f64 * f64::from(weights.low);

    let normalization = (pages_scanned.max(1) as f64).sqrt().max(1.0);
    (100.0 - penalty / normalization).clamp(0.0, 100.0).trunc() as u32
}

pub fn analyze_results(result: &ScanResult, weights: &SeverityWeights) -> AnalysisResult {
    let all = collect_findings(result);
    if all.is_empty() {
        debug!("No findings present in results");
    }

    let mut seen = HashSet::new();
    let mut findings: Vec<FindingDetail> = all
        .into_iter()
        .filter(|f| seen.insert(f.message.clone()))
        .collect();
    // Stable, so first-seen order is kept within a severity
    findings.sort_by_key(|f| f.severity);

    let mut summary_counts = SummaryCounts::default();
    for finding in &findings {
        summary_counts.bump(finding.severity);
    }

    let score = calculate_score(&summary_counts, weights, result.metrics.pages_scanned);

    AnalysisResult {
        findings,
        summary_counts,
        score,
    }
}

/// Direction of the security posture between two analyses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improved,
    Degraded,
    Unchanged,
    Mixed,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Improved => "improved",
            Trend::Degraded => "degraded",
            Trend::Unchanged => "unchanged",
            Trend::Mixed => "mixed",
        }
    }
}

/// A finding present in both analyses whose severity moved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeverityShift {
    pub finding: FindingDetail,
    pub baseline_severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountChange {
    pub baseline: usize,
    pub current: usize,
    pub change: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisComparison {
    pub new_findings: Vec<FindingDetail>,
    pub resolved_findings: Vec<FindingDetail>,
    pub unchanged_findings: Vec<FindingDetail>,
    pub severity_shifts: Vec<SeverityShift>,
    pub baseline_score: u32,
    pub current_score: u32,
    pub score_change: i64,
    pub severity_changes: BTreeMap<Severity, CountChange>,
    pub trend: Trend,
    pub summary: String,
}

fn issue_index(analysis: &AnalysisResult) -> HashMap<(&str, &str), &FindingDetail> {
    analysis
        .findings
        .iter()
        .filter(|f| f.severity.is_issue())
        .map(|f| ((f.category.as_str(), f.message.as_str()), f))
        .collect()
}

fn count_of(counts: &SummaryCounts, severity: Severity) -> usize {
    match severity {
        Severity::Critical => counts.critical,
        Severity::High => counts.high,
        Severity::Medium => counts.medium,
        Severity::Low => counts.low,
        Severity::Pass => 0,
    }
}

fn comparison_summary(trend: Trend, new: usize, resolved: usize, score_change: i64) -> String {
    let mut parts = vec![format!("Security posture has {}.", trend.as_str())];
    if new > 0 {
        parts.push(format!("{} new issue(s) found.", new));
    }
    if resolved > 0 {
        parts.push(format!("{} issue(s) resolved.", resolved));
    }
    if score_change != 0 {
        let direction = if score_change > 0 { "increased" } else { "decreased" };
        parts.push(format!("Score {} by {} points.", direction, score_change.abs()));
    }
    parts.join(" ")
}

/// Compare two analyses of the same site. Findings are matched by category and
/// message; passes are ignored.
pub fn compare_analyses(baseline: &AnalysisResult, current: &AnalysisResult) -> AnalysisComparison {
    let before = issue_index(baseline);
    let after = issue_index(current);

    let mut new_findings = Vec::new();
    let mut unchanged_findings = Vec::new();
    let mut severity_shifts = Vec::new();
    for finding in current.findings.iter().filter(|f| f.severity.is_issue()) {
        match before.get(&(finding.category.as_str(), finding.message.as_str())) {
            None => new_findings.push(finding.clone()),
            Some(old) if old.severity == finding.severity => unchanged_findings.push(finding.clone()),
            Some(old) => severity_shifts.push(SeverityShift {
                finding: finding.clone(),
                baseline_severity: old.severity,
            }),
        }
    }

    let resolved_findings: Vec<FindingDetail> = baseline
        .findings
        .iter()
        .filter(|f| f.severity.is_issue())
        .filter(|f| !after.contains_key(&(f.category.as_str(), f.message.as_str())))
        .cloned()
        .collect();

    let severity_changes = [Severity::Critical, Severity::High, Severity::Medium, Severity::Low]
        .into_iter()
        .map(|severity| {
            let was = count_of(&baseline.summary_counts, severity);
            let now = count_of(&current.summary_counts, severity);
            let change = CountChange {
                baseline: was,
                current: now,
                change: now as i64 - was as i64,
            };
            (severity, change)
        })
        .collect();

    let score_change = i64::from(current.score) - i64::from(baseline.score);
    let (new, resolved) = (new_findings.len(), resolved_findings.len());
    let trend = match score_change {
        1.. => Trend::Improved,
        ..0 => Trend::Degraded,
        0 if resolved > new => Trend::Improved,
        0 if new > resolved => Trend::Degraded,
        _ if new == 0 && resolved == 0 => Trend::Unchanged,
        _ => Trend::Mixed,
    };

    info!(
        "Comparison: {} new, {} resolved, score change {:+}",
        new, resolved, score_change
    );

    AnalysisComparison {
        summary: comparison_summary(trend, new, resolved, score_change),
        new_findings,
        resolved_findings,
        unchanged_findings,
        severity_shifts,
        baseline_score: baseline.score,
        current_score: current.score,
        score_change,
        severity_changes,
        trend,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_is_normalised_and_clamped() {
        let weights = SeverityWeights::default();
        let counts = SummaryCounts {
            critical: 1,
            high: 1,
            medium: 0,
            low: 0,
        };
        assert_eq!(calculate_score(&counts, &weights, 1), 70);
        assert_eq!(calculate_score(&counts, &weights, 4), 85);
        assert_eq!(calculate_score(&counts, &weights, 0), 70);

        let counts = SummaryCounts {
            critical: 10,
            ..SummaryCounts::default()
        };
        assert_eq!(calculate_score(&counts, &weights, 1), 0);
        assert_eq!(calculate_score(&SummaryCounts::default(), &weights, 1), 100);
    }

    #[test]
    fn test_standards_for_category() {
        let requested = [Standard::Gdpr, Standard::PciDss];
        assert_eq!(standards_for_category("privacy", &requested), vec![Standard::Gdpr]);
        assert_eq!(standards_for_category("PCI", &requested), vec![Standard::PciDss]);
        assert_eq!(standards_for_category("headers", &requested), requested.to_vec());
        assert_eq!(standards_for_category("iso", &requested), requested.to_vec());
        assert!(standards_for_category("headers", &[]).is_empty());
    }
}
