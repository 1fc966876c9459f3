//! Bilingual field catalog of the malaria investigation form.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// One question on the form, with its printed English and Arabic labels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldLabel {
    pub key: String,
    pub english: String,
    pub arabic: String,
    pub section: String,
}

impl FieldLabel {
    pub fn new(key: &str, english: &str, arabic: &str, section: &str) -> Self {
        Self {
            key: key.to_string(),
            english: english.to_string(),
            arabic: arabic.to_string(),
            section: section.to_string(),
        }
    }

    /// Column header used in exports: `"{english} / {arabic}"`.
    pub fn bilingual_header(&self) -> String {
        format!("{} / {}", self.english, self.arabic)
    }
}

/// How record columns are named.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HeaderStyle {
    /// Field key, e.g. `patient_name`.
    Key,
    /// `"Patient Name / اسم المريض"`.
    #[default]
    Bilingual,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CatalogError {
    #[error("Field catalog is empty")]
    Empty,

    #[error("Duplicate field key: {0}")]
    DuplicateKey(String),

    #[error("Duplicate column header: {0}")]
    DuplicateHeader(String),

    #[error("Field {0} has neither an English nor an Arabic label")]
    NoLabel(String),
}

/// Ordered, read-only list of form fields. Order is the export column order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct FieldCatalog {
    fields: Vec<FieldLabel>,
}

impl FieldCatalog {
    pub fn new(fields: Vec<FieldLabel>) -> Result<Self, CatalogError> {
        if fields.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut keys = HashSet::new();
        let mut headers = HashSet::new();
        for field in &fields {
            if !keys.insert(field.key.as_str()) {
                return Err(CatalogError::DuplicateKey(field.key.clone()));
            }
            let header = field.bilingual_header();
            if !headers.insert(header.clone()) {
                return Err(CatalogError::DuplicateHeader(header));
            }
            if field.english.trim().is_empty() && field.arabic.trim().is_empty() {
                return Err(CatalogError::NoLabel(field.key.clone()));
            }
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[FieldLabel] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&FieldLabel> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Position of a field named by key, English label or bilingual header.
    pub fn position(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.fields.iter().position(|f| {
            f.key == name || f.english.eq_ignore_ascii_case(name) || f.bilingual_header() == name
        })
    }

    pub fn column_name(&self, field: &FieldLabel, style: HeaderStyle) -> String {
        match style {
            HeaderStyle::Key => field.key.clone(),
            HeaderStyle::Bilingual => field.bilingual_header(),
        }
    }

    pub fn headers(&self, style: HeaderStyle) -> Vec<String> {
        self.fields
            .iter()
            .map(|f| self.column_name(f, style))
            .collect()
    }

    pub fn section_of(&self, key: &str) -> &str {
        self.get(key).map_or("General", |f| f.section.as_str())
    }
}

impl Default for FieldCatalog {
    /// Fields printed on the malaria case investigation form.
    fn default() -> Self {
        let fields = vec![
            // Patient information
            FieldLabel::new("patient_name", "Patient Name", "اسم المريض", "Patient Info"),
            FieldLabel::new("patient_id", "Patient ID", "رقم المريض", "Patient Info"),
            FieldLabel::new("nationality", "Nationality", "الجنسية", "Patient Info"),
            FieldLabel::new("age", "Age", "العمر", "Patient Info"),
            FieldLabel::new("gender", "Gender", "الجنس", "Patient Info"),
            // Contact and address
            FieldLabel::new("phone", "Phone", "رقم الهاتف", "Contact"),
            FieldLabel::new("address", "Address", "العنوان", "Contact"),
            // Clinical
            FieldLabel::new("date_of_onset", "Date of Onset", "تاريخ ظهور الاعراض", "Clinical"),
            FieldLabel::new("symptoms", "Symptoms", "الأعراض", "Clinical"),
            FieldLabel::new("fever", "Fever", "الحمى", "Clinical"),
            FieldLabel::new("chills", "Chills", "قشعريرة", "Clinical"),
            FieldLabel::new("diagnosis_date", "Diagnosis Date", "تاريخ التشخيص", "Clinical"),
            // Laboratory
            FieldLabel::new("malaria_test", "Malaria Test", "فحص الملاريا", "Laboratory"),
            FieldLabel::new("species", "Parasite Species", "نوع الطفيل", "Laboratory"),
            // Investigation
            FieldLabel::new("travel_history", "Travel History", "سفر", "Investigation"),
            FieldLabel::new("place_of_travel", "Place of Travel", "مكان السفر", "Investigation"),
            FieldLabel::new("contact_with_cases", "Contact with Cases", "مخالطة", "Investigation"),
            // Treatment
            FieldLabel::new("treatment_given", "Treatment", "العلاج", "Treatment"),
            FieldLabel::new("outcome", "Outcome", "النتيجة", "Treatment"),
        ];
        Self { fields }
    }
}
