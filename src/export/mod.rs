//! CSV rendering of filtered result sets

use crate::error::{AppError, Result};
use crate::models::LogHit;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

/// Column headers, in output order
pub const CSV_HEADER: [&str; 6] = [
    "Timestamp",
    "Level",
    "Endpoint",
    "User ID",
    "Message",
    "Response Time",
];

pub const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

/// Renders log hits as CSV with a fixed column layout
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvExporter;

impl CsvExporter {
    pub fn new() -> Self {
        Self
    }

    /// Header row followed by one row per hit, in the order given.
    ///
    /// Absent attributes render as empty cells.
    pub fn render(&self, hits: &[LogHit]) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(CSV_HEADER).map_err(export_error)?;

        for hit in hits {
            let entry = &hit.entry;
            writer
                .write_record([
                    entry
                        .timestamp
                        .to_rfc3339_opts(SecondsFormat::AutoSi, true),
                    entry.level.to_string(),
                    entry.endpoint.clone().unwrap_or_default(),
                    entry.user_id.clone().unwrap_or_default(),
                    entry.message.clone(),
                    entry
                        .response_time_ms
                        .map(|ms| ms.to_string())
                        .unwrap_or_default(),
                ])
                .map_err(export_error)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| AppError::Export(format!("Failed to flush CSV output: {}", e)))?;

        debug!(rows = hits.len(), bytes = bytes.len(), "Rendered CSV export");
        Ok(bytes)
    }
}

/// Attachment filename for an export produced at `now`
pub fn export_filename(now: DateTime<Utc>) -> String {
    format!("logs_export_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

fn export_error(e: csv::Error) -> AppError {
    AppError::Export(format!("Failed to write CSV row: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HttpMethod, LogEntry, LogLevel};
    use chrono::TimeZone;

    fn render(hits: &[LogHit]) -> String {
        String::from_utf8(CsvExporter::new().render(hits).unwrap()).unwrap()
    }

    #[test]
    fn test_header_only_for_empty_result() {
        assert_eq!(
            render(&[]),
            "Timestamp,Level,Endpoint,User ID,Message,Response Time\n"
        );
    }

    #[test]
    fn test_rows_and_empty_cells() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let hits: Vec<LogHit> = vec![
            LogEntry::new(ts, LogLevel::Error, "Payment failed, retrying")
                .with_request(HttpMethod::Post, "/api/payments", 502, 1200)
                .with_user("u42")
                .into(),
            LogEntry::new(ts, LogLevel::Warning, "Cache warm-up").into(),
        ];

        let output = render(&hits);
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            "2024-03-01T12:30:00Z,ERROR,/api/payments,u42,\"Payment failed, retrying\",1200"
        );
        assert_eq!(lines[2], "2024-03-01T12:30:00Z,WARNING,,,Cache warm-up,");
    }

    #[test]
    fn test_export_filename() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 5, 7).unwrap();
        assert_eq!(export_filename(now), "logs_export_20240301_090507.csv");
    }
}
