//! Worker report framing.
//!
//! ```text
//! EXEC_REPORT_START
//! STATUS: SUCCESS
//! DETAILS: 2 files processed
//! EXEC_REPORT_END
//! ```
//!
//! Anything outside a start/end pair is incidental diagnostic text. A missing,
//! unterminated, or status-less block parses as `UNKNOWN`.

use fss_core::ReportStatus;

pub const REPORT_START: &str = "EXEC_REPORT_START";
pub const REPORT_END: &str = "EXEC_REPORT_END";

const STATUS_PREFIX: &str = "STATUS:";
const DETAILS_PREFIX: &str = "DETAILS:";

/// Status and one-line summary produced by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub status: ReportStatus,
    pub details: String,
}

impl WorkerReport {
    pub fn new(status: ReportStatus, details: impl Into<String>) -> Self {
        Self {
            status,
            details: details.into(),
        }
    }

    pub fn success(details: impl Into<String>) -> Self {
        Self::new(ReportStatus::Success, details)
    }

    pub fn partial(details: impl Into<String>) -> Self {
        Self::new(ReportStatus::Partial, details)
    }

    pub fn error(details: impl Into<String>) -> Self {
        Self::new(ReportStatus::Error, details)
    }

    /// The report assumed when a worker produced nothing usable.
    pub fn unknown() -> Self {
        Self::new(ReportStatus::Unknown, "no report from worker")
    }

    /// Render the framed block, newline-terminated.
    pub fn render(&self) -> String {
        // Details must stay on one line or the block would not parse back.
        let details = self.details.replace(['\r', '\n'], " ");
        format!(
            "{REPORT_START}\n{STATUS_PREFIX} {}\n{DETAILS_PREFIX} {details}\n{REPORT_END}\n",
            self.status
        )
    }

    /// Extract the last complete report from a worker's captured output.
    pub fn parse(output: &str) -> Self {
        let mut found = None;
        let mut in_report = false;
        let mut status: Option<ReportStatus> = None;
        let mut details: Option<String> = None;

        for line in output.lines() {
            let line = line.trim_end();
            if line == REPORT_START {
                in_report = true;
                status = None;
                details = None;
            } else if line == REPORT_END {
                if in_report {
                    if let Some(status) = status.take() {
                        found = Some(Self::new(status, details.take().unwrap_or_default()));
                    }
                }
                in_report = false;
            } else if in_report {
                if let Some(value) = line.strip_prefix(STATUS_PREFIX) {
                    status = Some(ReportStatus::parse(value));
                } else if let Some(value) = line.strip_prefix(DETAILS_PREFIX) {
                    details = Some(value.trim().to_string());
                }
            }
        }

        found.unwrap_or_else(Self::unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_produces_framed_block() {
        let text = WorkerReport::success("2 files processed").render();
        assert_eq!(
            text,
            "EXEC_REPORT_START\nSTATUS: SUCCESS\nDETAILS: 2 files processed\nEXEC_REPORT_END\n"
        );
        assert_eq!(
            WorkerReport::parse(&text),
            WorkerReport::success("2 files processed")
        );
    }

    #[test]
    fn incidental_lines_are_ignored() {
        let output = "copying a.txt\nSTATUS: ERROR\nEXEC_REPORT_START\nnoise inside\nSTATUS: PARTIAL\nDETAILS: 1 files copied, 0 skipped, 1 errors\nEXEC_REPORT_END\ntrailing chatter\n";
        let report = WorkerReport::parse(output);
        assert_eq!(report.status, ReportStatus::Partial);
        assert_eq!(report.details, "1 files copied, 0 skipped, 1 errors");
    }

    #[test]
    fn empty_output_is_unknown() {
        assert_eq!(WorkerReport::parse("").status, ReportStatus::Unknown);
    }

    #[test]
    fn unterminated_block_is_unknown() {
        let report = WorkerReport::parse("EXEC_REPORT_START\nSTATUS: SUCCESS\nDETAILS: ok\n");
        assert_eq!(report.status, ReportStatus::Unknown);
    }

    #[test]
    fn block_without_status_is_unknown() {
        let report = WorkerReport::parse("EXEC_REPORT_START\nDETAILS: ok\nEXEC_REPORT_END\n");
        assert_eq!(report.status, ReportStatus::Unknown);
    }

    #[test]
    fn bogus_status_value_is_unknown() {
        let report =
            WorkerReport::parse("EXEC_REPORT_START\nSTATUS: GREAT\nDETAILS: hm\nEXEC_REPORT_END\n");
        assert_eq!(report.status, ReportStatus::Unknown);
        assert_eq!(report.details, "hm");
    }

    #[test]
    fn crlf_output_parses() {
        let report = WorkerReport::parse(
            "EXEC_REPORT_START\r\nSTATUS: ERROR\r\nDETAILS: boom\r\nEXEC_REPORT_END\r\n",
        );
        assert_eq!(report, WorkerReport::error("boom"));
    }

    #[test]
    fn multiline_details_are_flattened_on_render() {
        let text = WorkerReport::error("line one\nline two").render();
        assert_eq!(WorkerReport::parse(&text).details, "line one line two");
    }
}
