//! Attendance summaries: free-text search plus per-division and per-classroom counts.

use crate::ledger::AttendanceRow;
use serde::Serialize;
use std::collections::BTreeMap;

/// Aggregated view over a set of attendance rows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AttendanceReport {
    pub total: usize,
    pub by_division: BTreeMap<String, usize>,
    pub by_classroom: BTreeMap<String, usize>,
    pub rows: Vec<AttendanceRow>,
}

impl AttendanceReport {
    pub fn build(rows: Vec<AttendanceRow>) -> Self {
        let mut report = AttendanceReport {
            total: rows.len(),
            ..Default::default()
        };
        for row in &rows {
            *report.by_division.entry(row.division.clone()).or_default() += 1;
            *report.by_classroom.entry(row.classroom.clone()).or_default() += 1;
        }
        report.rows = rows;
        report
    }
}

impl AttendanceRow {
    fn fields(&self) -> [&str; 7] {
        [
            &self.roll_number,
            &self.prn,
            &self.first_name,
            &self.last_name,
            &self.division,
            &self.time,
            &self.classroom,
        ]
    }

    /// Case-insensitive substring match against any field.
    pub fn matches(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.fields()
            .iter()
            .any(|field| field.to_lowercase().contains(&term))
    }
}

/// Keep rows matching `term`; an empty or absent term keeps everything.
pub fn filter_rows(rows: Vec<AttendanceRow>, term: Option<&str>) -> Vec<AttendanceRow> {
    match term.map(str::trim).filter(|t| !t.is_empty()) {
        Some(term) => rows.into_iter().filter(|r| r.matches(term)).collect(),
        None => rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(first: &str, division: &str, classroom: &str) -> AttendanceRow {
        AttendanceRow {
            roll_number: "01".into(),
            prn: "PRN1".into(),
            first_name: first.into(),
            last_name: "Rao".into(),
            division: division.into(),
            time: "2024-03-05 09:15:00".into(),
            classroom: classroom.into(),
        }
    }

    fn sample() -> Vec<AttendanceRow> {
        vec![
            row("Asha", "A", "A101"),
            row("Bela", "A", "B202"),
            row("Chirag", "B", "A101"),
        ]
    }

    #[test]
    fn test_counts_by_division_and_classroom() {
        let report = AttendanceReport::build(sample());
        assert_eq!(report.total, 3);
        assert_eq!(report.by_division["A"], 2);
        assert_eq!(report.by_division["B"], 1);
        assert_eq!(report.by_classroom["A101"], 2);
        assert_eq!(report.by_classroom["B202"], 1);
    }

    #[test]
    fn test_search_is_case_insensitive_over_all_fields() {
        let hits = filter_rows(sample(), Some("asha"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].first_name, "Asha");

        let hits = filter_rows(sample(), Some("b202"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].first_name, "Bela");

        assert_eq!(filter_rows(sample(), Some("rao")).len(), 3);
        assert!(filter_rows(sample(), Some("zzz")).is_empty());
    }

    #[test]
    fn test_blank_search_keeps_everything() {
        assert_eq!(filter_rows(sample(), None).len(), 3);
        assert_eq!(filter_rows(sample(), Some("   ")).len(), 3);
    }

    #[test]
    fn test_report_serializes() {
        let json = serde_json::to_value(AttendanceReport::build(sample())).unwrap();
        assert_eq!(json["total"], 3);
        assert_eq!(json["by_division"]["A"], 2);
        assert_eq!(json["rows"][0]["FirstName"], "Asha");
    }
}
