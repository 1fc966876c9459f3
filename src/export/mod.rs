//! Exports of extracted records: spreadsheet, CSV, charts and PDF report.

pub mod charts;
pub mod report;
pub mod spreadsheet;

pub use charts::*;
pub use report::*;
pub use spreadsheet::*;

use serde::Serialize;
use thiserror::Error;

use crate::pipeline::fields::Record;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Spreadsheet error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("PDF generation failed: {0}")]
    Pdf(String),

    #[error("Table too large for export: {0}")]
    TooLarge(String),
}

/// Records laid out under a fixed header row. Every row has one cell per
/// header; cells missing from a record are empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn from_records(headers: Vec<String>, records: &[Record]) -> Self {
        let rows = records
            .iter()
            .map(|record| {
                headers
                    .iter()
                    .map(|h| record.get(h).unwrap_or_default().to_string())
                    .collect()
            })
            .collect();
        Self { headers, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column given its exact header, or (case-insensitively) the
    /// English part of a bilingual header.
    pub fn column(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.headers.iter().position(|h| h == name).or_else(|| {
            self.headers
                .iter()
                .position(|h| english_part(h).eq_ignore_ascii_case(name))
        })
    }

    /// Cells of one column, top to bottom.
    pub fn values(&self, column: usize) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .filter_map(move |row| row.get(column).map(String::as_str))
    }
}

/// `"Patient Name / اسم المريض"` → `"Patient Name"`. Headers without the
/// separator are returned whole.
pub fn english_part(header: &str) -> &str {
    header
        .split_once(" / ")
        .map_or(header, |(english, _)| english)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> Record {
        Record::from_entries(
            pairs
                .iter()
                .map(|(c, v)| (c.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn rows_follow_header_order() {
        let table = Table::from_records(
            vec!["b".into(), "a".into(), "c".into()],
            &[record(&[("a", "1"), ("b", "2")])],
        );
        assert_eq!(table.rows, vec![vec!["2", "1", ""]]);
    }

    #[test]
    fn column_lookup_by_header_or_english_part() {
        let table = Table::from_records(
            vec!["Gender / الجنس".into(), "age".into()],
            &[],
        );
        assert_eq!(table.column("Gender / الجنس"), Some(0));
        assert_eq!(table.column("gender"), Some(0));
        assert_eq!(table.column("age"), Some(1));
        assert_eq!(table.column("Outcome"), None);
    }

    #[test]
    fn english_part_of_headers() {
        assert_eq!(english_part("Date of Onset / تاريخ ظهور الاعراض"), "Date of Onset");
        assert_eq!(english_part("date_of_onset"), "date_of_onset");
    }

    #[test]
    fn values_walk_one_column() {
        let table = Table::from_records(
            vec!["x".into()],
            &[record(&[("x", "1")]), record(&[("x", "2")])],
        );
        assert_eq!(table.values(0).collect::<Vec<_>>(), vec!["1", "2"]);
    }
}
