use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::catalog::{FieldCatalog, HeaderStyle};
use super::record::Record;

/// Per-column completeness status shown next to each extracted value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FieldStatus {
    #[serde(rename = "OK")]
    Ok,
    Missing,
}

impl FieldStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Missing => "Missing",
        }
    }
}

/// Reports required columns that are absent or blank. Never modifies records.
#[derive(Debug, Clone)]
pub struct Validator {
    required: Vec<String>,
}

impl Validator {
    /// `required` names fields by key, English label or header. They are
    /// checked in catalog order regardless of the order given.
    pub fn new(catalog: &FieldCatalog, style: HeaderStyle, required: &[String]) -> Self {
        let mut positions: Vec<usize> = required
            .iter()
            .filter_map(|name| {
                let pos = catalog.position(name);
                if pos.is_none() {
                    tracing::warn!(field = %name, "Required field not in catalog, ignored");
                }
                pos
            })
            .collect();
        positions.sort_unstable();
        positions.dedup();

        let required = positions
            .into_iter()
            .map(|pos| catalog.column_name(&catalog.fields()[pos], style))
            .collect();
        Self { required }
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// One message per missing required column; empty when complete.
    pub fn validate(&self, record: &Record) -> Vec<String> {
        self.required
            .iter()
            .filter(|column| is_blank(record.get(column)))
            .map(|column| format!("Missing required field: {column}"))
            .collect()
    }

    /// Status of each required column, in catalog order.
    pub fn field_status(&self, record: &Record) -> Vec<(String, FieldStatus)> {
        self.required
            .iter()
            .map(|column| {
                let status = if is_blank(record.get(column)) {
                    FieldStatus::Missing
                } else {
                    FieldStatus::Ok
                };
                (column.clone(), status)
            })
            .collect()
    }

    /// Issues keyed by 1-based record number; complete records are omitted.
    pub fn validate_batch(&self, records: &[Record]) -> BTreeMap<usize, Vec<String>> {
        records
            .iter()
            .enumerate()
            .filter_map(|(i, record)| {
                let issues = self.validate(record);
                (!issues.is_empty()).then_some((i + 1, issues))
            })
            .collect()
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}
