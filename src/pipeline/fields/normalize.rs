use super::catalog::{FieldCatalog, HeaderStyle};
use super::record::Record;

/// Cleans extracted values before validation and export. Every value is
/// trimmed; name columns are additionally title-cased. Applying it twice
/// gives the same record as applying it once.
#[derive(Debug, Clone)]
pub struct Normalizer {
    title_case: bool,
    name_columns: Vec<String>,
}

impl Normalizer {
    /// `name_fields` may be given as keys, English labels or headers; they are
    /// resolved to column names of `style`. Unknown names are ignored.
    pub fn new(
        catalog: &FieldCatalog,
        style: HeaderStyle,
        title_case: bool,
        name_fields: &[String],
    ) -> Self {
        let name_columns = name_fields
            .iter()
            .filter_map(|name| match catalog.position(name) {
                Some(pos) => Some(catalog.column_name(&catalog.fields()[pos], style)),
                None => {
                    tracing::warn!(field = %name, "Name field not in catalog, ignored");
                    None
                }
            })
            .collect();
        Self {
            title_case,
            name_columns,
        }
    }

    pub fn normalize(&self, record: &mut Record) {
        for (column, value) in record.values_mut() {
            let mut cleaned = value.trim().to_string();
            if self.title_case && self.name_columns.iter().any(|c| c == column) {
                cleaned = title_case(&cleaned);
            }
            *value = cleaned;
        }
    }

    pub fn normalized(&self, mut record: Record) -> Record {
        self.normalize(&mut record);
        record
    }
}

/// Upper-case a letter that follows a non-letter, lower-case the rest.
/// Scripts without case (Arabic) pass through unchanged.
pub fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut previous_is_letter = false;
    for c in value.chars() {
        if c.is_alphabetic() {
            if previous_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            out.push(c);
            previous_is_letter = false;
        }
    }
    out
}
