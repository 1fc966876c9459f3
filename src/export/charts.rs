//! Chart data: value frequencies and the epidemic curve.

use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use super::Table;

/// Date layouts seen in handwritten and typed onset dates.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y/%m/%d"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bar {
    pub label: String,
    pub count: usize,
}

/// Counts of each distinct non-blank value of `column`, most frequent first
/// (ties by label). `None` when the column does not exist.
pub fn frequency(table: &Table, column: &str) -> Option<Vec<Bar>> {
    let col = table.column(column)?;
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in table.values(col).map(str::trim).filter(|v| !v.is_empty()) {
        *counts.entry(value).or_default() += 1;
    }

    let mut bars: Vec<Bar> = counts
        .into_iter()
        .map(|(label, count)| Bar {
            label: label.to_string(),
            count,
        })
        .collect();
    bars.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    Some(bars)
}

/// Cases per onset date, oldest first. Values that do not parse as a date
/// are skipped. `None` when the column does not exist.
pub fn date_distribution(table: &Table, column: &str) -> Option<Vec<(NaiveDate, usize)>> {
    let col = table.column(column)?;
    let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    let mut skipped = 0usize;

    for value in table.values(col).filter(|v| !v.trim().is_empty()) {
        match parse_date(value) {
            Some(date) => *counts.entry(date).or_default() += 1,
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        tracing::debug!(column, skipped, "Unparseable dates left out of distribution");
    }

    Some(counts.into_iter().collect())
}

/// Parse a date in any of the accepted layouts. A trailing time part
/// (`2024-03-01 00:00:00`, `2024-03-01T08:30:00`) is ignored.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }
    let date_part = value.split_whitespace().next()?;
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(column: &str, values: &[&str]) -> Table {
        Table {
            headers: vec![column.to_string()],
            rows: values.iter().map(|v| vec![v.to_string()]).collect(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn frequency_counts_and_orders() {
        let t = table("Gender / الجنس", &["Male", "Female", " Male ", "", "Male", "Female", "ذكر"]);
        let bars = frequency(&t, "Gender").unwrap();
        assert_eq!(
            bars,
            vec![
                Bar { label: "Male".into(), count: 3 },
                Bar { label: "Female".into(), count: 2 },
                Bar { label: "ذكر".into(), count: 1 },
            ]
        );
    }

    #[test]
    fn missing_column_is_none() {
        let t = table("age", &["1"]);
        assert!(frequency(&t, "Gender").is_none());
        assert!(date_distribution(&t, "Date of Onset").is_none());
    }

    #[test]
    fn parses_accepted_layouts() {
        let expected = date(2024, 3, 7);
        for raw in [
            "2024-03-07",
            "07/03/2024",
            "07-03-2024",
            "07.03.2024",
            "2024/03/07",
            " 2024-03-07 00:00:00 ",
            "2024-03-07T10:15:00",
        ] {
            assert_eq!(parse_date(raw), Some(expected), "{raw}");
        }
        assert_eq!(parse_date("last week"), None);
        assert_eq!(parse_date("31/02/2024"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn distribution_sorted_by_date_and_skips_garbage() {
        let t = table(
            "Date of Onset / تاريخ ظهور الاعراض",
            &["05/01/2024", "2024-01-03", "unknown", "", "2024-01-05"],
        );
        let curve = date_distribution(&t, "date of onset").unwrap();
        assert_eq!(curve, vec![(date(2024, 1, 3), 1), (date(2024, 1, 5), 2)]);
    }
}
