//! # Conversion Report
//!
//! Counter summary returned to the caller. Handled errors never escape the
//! engine; they land here as counters instead.

/// Outcome summary of one conversion run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionReport {
    pub tables_total: u64,
    pub tables_ok: u64,
    pub tables_partial: u64,
    pub tables_failed: u64,
    pub rows_written: u64,
    pub rows_skipped: u64,
    pub corrupt_pages: u64,
    pub elapsed_seconds: f64,
    pub cancelled: bool,
}

impl std::fmt::Display for ConversionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} tables ok ({} partial, {} failed), {} rows written, \
             {} rows skipped, {} corrupt pages, {:.1}s{}",
            self.tables_ok,
            self.tables_total,
            self.tables_partial,
            self.tables_failed,
            self.rows_written,
            self.rows_skipped,
            self.corrupt_pages,
            self.elapsed_seconds,
            if self.cancelled { ", cancelled" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_summarizes_counters() {
        let report = ConversionReport {
            tables_total: 73,
            tables_ok: 71,
            tables_partial: 1,
            tables_failed: 1,
            rows_written: 4370,
            rows_skipped: 3,
            corrupt_pages: 1,
            elapsed_seconds: 12.34,
            cancelled: false,
        };

        let text = report.to_string();

        assert!(text.contains("71/73 tables ok"));
        assert!(text.contains("4370 rows written"));
        assert!(text.contains("1 corrupt pages"));
        assert!(!text.contains("cancelled"));
    }

    #[test]
    fn display_marks_cancelled_runs() {
        let report = ConversionReport {
            cancelled: true,
            ..Default::default()
        };

        assert!(report.to_string().contains("cancelled"));
    }
}
