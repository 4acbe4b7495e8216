mod csv;
mod json;
mod text;

use chrono::Utc;
use rolling_stats::Stats;
use serde::Serialize;

use crate::pipeline::AnalysisPipeline;

pub use self::csv::CsvFormatter;
pub use self::json::JsonFormatter;
pub use self::text::TextFormatter;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

/// Per-cell outcome of an analysis run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellReport {
    pub cell: usize,
    pub good: bool,
    pub score: Option<f64>,
    pub p_root: Option<f64>,
    pub threshold: Option<f64>,
    /// Fraction of samples marked as spikes
    pub spike_fraction: Option<f64>,
    pub onset: Option<f64>,
    pub offset: Option<f64>,
    /// First failure recorded for the cell
    pub failure: Option<String>,
}

/// Collect one report per cell from whatever stages have run
pub fn build_reports(pipeline: &AnalysisPipeline) -> Vec<CellReport> {
    let flags = pipeline.quality_flags();
    let failures = pipeline.failures();
    let distributions = pipeline.distributions();
    let binarized = pipeline.binarized();
    let activity = pipeline.activity();

    (0..pipeline.recording().cell_count())
        .map(|cell| {
            let model = distributions.and_then(|d| d[cell].model());
            let window = activity.and_then(|a| a[cell].as_ref().ok());
            CellReport {
                cell,
                good: flags[cell],
                score: model.map(|m| m.score),
                p_root: model.map(|m| m.p_root),
                threshold: binarized.and_then(|b| b.thresholds[cell]),
                spike_fraction: binarized.map(|b| {
                    let train = &b.fast[cell];
                    let spikes = train.iter().filter(|&&s| s == 1).count();
                    spikes as f64 / train.len() as f64
                }),
                onset: window.map(|w| w.onset),
                offset: window.map(|w| w.offset),
                failure: failures
                    .iter()
                    .find(|f| f.cell == cell)
                    .map(|f| f.error.to_string()),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl StatsSummary {
    fn from_stats(stats: &Stats<f64>) -> Option<Self> {
        if stats.count == 0 {
            return None;
        }
        Some(Self {
            count: stats.count,
            mean: stats.mean,
            std_dev: stats.std_dev,
            min: stats.min,
            max: stats.max,
        })
    }
}

/// Aggregate view over all cell reports
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub cells: usize,
    pub good_cells: usize,
    pub score: Option<StatsSummary>,
    pub spike_fraction: Option<StatsSummary>,
    /// Onset statistics over good cells only
    pub onset: Option<StatsSummary>,
}

impl Summary {
    pub fn from_reports(reports: &[CellReport]) -> Self {
        let mut score: Stats<f64> = Stats::new();
        let mut spike_fraction: Stats<f64> = Stats::new();
        let mut onset: Stats<f64> = Stats::new();

        for report in reports {
            if let Some(s) = report.score {
                score.update(s);
            }
            if let Some(f) = report.spike_fraction {
                spike_fraction.update(f);
            }
            if report.good {
                if let Some(t) = report.onset {
                    onset.update(t);
                }
            }
        }

        Self {
            cells: reports.len(),
            good_cells: reports.iter().filter(|r| r.good).count(),
            score: StatsSummary::from_stats(&score),
            spike_fraction: StatsSummary::from_stats(&spike_fraction),
            onset: StatsSummary::from_stats(&onset),
        }
    }
}

pub trait Formatter: Send {
    fn format(&self, report: &CellReport) -> String;

    fn header(&self) -> Option<&'static str> {
        None
    }

    fn summary(&self, _summary: &Summary) -> Option<String> {
        None
    }
}

pub fn create_formatter(format: OutputFormat, verbose: bool) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter::new(verbose)),
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Csv => Box::new(CsvFormatter),
    }
}

pub fn iso8601_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn optional(value: Option<f64>, precision: usize, missing: &str) -> String {
    value.map_or(missing.to_string(), |v| format!("{:.*}", precision, v))
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(super) fn sample_report() -> CellReport {
        CellReport {
            cell: 3,
            good: true,
            score: Some(1.25),
            p_root: Some(0.4),
            threshold: Some(0.4),
            spike_fraction: Some(0.05),
            onset: Some(150.0),
            offset: Some(290.5),
            failure: None,
        }
    }

    #[test]
    fn test_summary() {
        let mut bad = sample_report();
        bad.cell = 4;
        bad.good = false;
        bad.score = Some(0.25);
        bad.onset = Some(10.0);
        let summary = Summary::from_reports(&[sample_report(), bad]);
        assert_eq!(summary.cells, 2);
        assert_eq!(summary.good_cells, 1);
        let score = summary.score.unwrap();
        assert_eq!(score.count, 2);
        assert!((score.mean - 0.75).abs() < 1e-12);
        // Onsets of excluded cells are ignored
        assert_eq!(summary.onset.unwrap().count, 1);
    }

    #[test]
    fn test_optional_formatting() {
        assert_eq!(optional(Some(1.23456), 2, "-"), "1.23");
        assert_eq!(optional(None, 2, "-"), "-");
    }
}
