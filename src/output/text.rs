use super::{CellReport, Formatter, Summary, optional};

pub struct TextFormatter {
    verbose: bool,
}

impl TextFormatter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl Formatter for TextFormatter {
    fn format(&self, report: &CellReport) -> String {
        let status = if report.good { "good" } else { "bad " };
        let line = format!(
            "Cell {:>4}: {} score: {:>6} spikes: {:>6}",
            report.cell,
            status,
            optional(report.score, 2, "-"),
            optional(report.spike_fraction.map(|f| 100.0 * f), 2, "-"),
        );
        if !self.verbose {
            return line;
        }

        let window = match (report.onset, report.offset) {
            (Some(onset), Some(offset)) => format!("{:.1}-{:.1} s", onset, offset),
            _ => "-".to_string(),
        };
        let mut line = format!(
            "{}% [p_root: {}, threshold: {}, activity: {}]",
            line,
            optional(report.p_root, 4, "-"),
            optional(report.threshold, 4, "-"),
            window
        );
        if let Some(failure) = &report.failure {
            line.push_str(&format!(" ({})", failure));
        }
        line
    }

    fn summary(&self, summary: &Summary) -> Option<String> {
        let percent = if summary.cells > 0 {
            100.0 * summary.good_cells as f64 / summary.cells as f64
        } else {
            0.0
        };
        let mut text = format!(
            "{} of {} good cells ({:.0}%)",
            summary.good_cells, summary.cells, percent
        );
        if let Some(score) = &summary.score {
            text.push_str(&format!(
                "\nScore: mean {:.2}, std {:.2}, range {:.2} to {:.2}",
                score.mean, score.std_dev, score.min, score.max
            ));
        }
        if let Some(onset) = &summary.onset {
            text.push_str(&format!(
                "\nActivity onset (good cells): mean {:.1} s, std {:.1} s",
                onset.mean, onset.std_dev
            ));
        }
        Some(text)
    }
}
