use super::{CellReport, Formatter, optional};

pub struct CsvFormatter;

impl Formatter for CsvFormatter {
    fn format(&self, report: &CellReport) -> String {
        let failure = report
            .failure
            .as_deref()
            .map_or(String::new(), |f| format!("\"{}\"", f.replace('"', "\"\"")));
        format!(
            "{},{},{},{},{},{},{},{},{}",
            report.cell,
            u8::from(report.good),
            optional(report.score, 4, ""),
            optional(report.p_root, 6, ""),
            optional(report.threshold, 6, ""),
            optional(report.spike_fraction, 6, ""),
            optional(report.onset, 2, ""),
            optional(report.offset, 2, ""),
            failure
        )
    }

    fn header(&self) -> Option<&'static str> {
        Some("cell,good,score,p_root,threshold,spike_fraction,onset_s,offset_s,failure")
    }
}
