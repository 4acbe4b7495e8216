use serde::Serialize;

use super::{CellReport, Formatter, Summary, iso8601_timestamp};

pub struct JsonFormatter;

#[derive(Serialize)]
struct Stamped<'a, T: Serialize> {
    ts: String,
    #[serde(flatten)]
    body: &'a T,
}

fn stamped<T: Serialize>(body: &T) -> String {
    let record = Stamped {
        ts: iso8601_timestamp(),
        body,
    };
    serde_json::to_string(&record).unwrap_or_else(|e| format!(r#"{{"error":"{}"}}"#, e))
}

impl Formatter for JsonFormatter {
    fn format(&self, report: &CellReport) -> String {
        stamped(report)
    }

    fn summary(&self, summary: &Summary) -> Option<String> {
        Some(stamped(summary))
    }
}
