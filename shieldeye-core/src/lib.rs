pub mod analysis;
pub mod config;
pub mod error;
pub mod graph;
pub mod metrics;
pub mod model;
pub mod scan;
pub mod security;
pub mod templates;

pub use analysis::{AnalysisComparison, AnalysisResult, SeverityWeights, Trend, analyze_results, compare_analyses};
pub use config::{Mode, ScanPlan, ScanRequest, ScannerConfig, Standard};
pub use error::CoreError;
pub use graph::{EdgeKind, SiteGraph};
pub use metrics::{MetricsCollector, MetricsSink, NoopMetrics};
pub use model::{Finding, PageResult, ScanResult, ScanStatus, Severity};
pub use scan::{ProgressCallback, Scanner, run_scan};
pub use templates::{ScanTemplate, builtin_template, builtin_templates};
