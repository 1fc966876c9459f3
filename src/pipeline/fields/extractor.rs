//! Label-based field extraction from recognized form text.
//!
//! Every catalog field is looked up by its English or Arabic label. The value
//! is what follows the first delimiter after the label on the same line, or,
//! when the line has no delimiter (or nothing after it), the next non-empty
//! line. The first line carrying a label wins.
//!
//! Labels match as plain substrings (English case-insensitively). With label
//! boundaries on, English labels must also sit on word boundaries and a label
//! inside a longer label of another field on the same line is ignored.

use regex::Regex;

use super::catalog::{FieldCatalog, HeaderStyle};
use super::record::Record;
use crate::pipeline::types::Form;

/// Characters separating a printed label from its answer.
const DELIMITERS: &[char] = &[':', '：'];

struct CompiledField {
    column: String,
    patterns: Vec<Regex>,
}

/// A label occurrence on one line.
#[derive(Debug, Clone, Copy)]
struct Hit {
    field: usize,
    start: usize,
    end: usize,
}

impl Hit {
    fn len(&self) -> usize {
        self.end - self.start
    }

    /// Inside a strictly longer hit of another field, e.g. `الجنس` inside
    /// `الجنسية` or `Contact` inside `Contact with Cases`.
    fn is_shadowed_by(&self, other: &Hit) -> bool {
        other.field != self.field
            && other.start <= self.start
            && self.end <= other.end
            && other.len() > self.len()
    }
}

/// Extracts one [`Record`] per form. Label patterns are compiled once and
/// reused for every form.
pub struct FieldExtractor {
    fields: Vec<CompiledField>,
    label_boundaries: bool,
}

impl FieldExtractor {
    pub fn new(
        catalog: &FieldCatalog,
        style: HeaderStyle,
        label_boundaries: bool,
    ) -> Result<Self, regex::Error> {
        let fields = catalog
            .fields()
            .iter()
            .map(|field| {
                let mut patterns = Vec::with_capacity(2);
                if let Some(p) = english_pattern(&field.english, label_boundaries) {
                    patterns.push(Regex::new(&p)?);
                }
                if let Some(p) = arabic_pattern(&field.arabic) {
                    patterns.push(Regex::new(&p)?);
                }
                Ok(CompiledField {
                    column: catalog.column_name(field, style),
                    patterns,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self {
            fields,
            label_boundaries,
        })
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.column.as_str())
    }

    pub fn extract_form(&self, form: &Form) -> Record {
        self.extract(&form.text())
    }

    /// Extract every catalog field from `text`. The record always has one
    /// entry per field, in catalog order; unmatched fields are `""`.
    pub fn extract(&self, text: &str) -> Record {
        let lines: Vec<&str> = text.lines().collect();
        let mut values: Vec<Option<String>> = vec![None; self.fields.len()];
        let mut unresolved = self.fields.len();

        for (line_index, line) in lines.iter().enumerate() {
            if unresolved == 0 {
                break;
            }
            for hit in self.line_hits(line) {
                if values[hit.field].is_some() {
                    continue;
                }
                values[hit.field] = Some(value_after(&lines, line_index, hit.end));
                unresolved -= 1;
            }
        }

        Record::from_entries(
            self.fields
                .iter()
                .zip(values)
                .map(|(field, value)| (field.column.clone(), value.unwrap_or_default()))
                .collect(),
        )
    }

    /// Leftmost hit of each field present on `line`. Shadowed hits are
    /// dropped first when label boundaries are on.
    fn line_hits(&self, line: &str) -> Vec<Hit> {
        let all: Vec<Hit> = self
            .fields
            .iter()
            .enumerate()
            .flat_map(|(field, compiled)| {
                compiled.patterns.iter().flat_map(move |pattern| {
                    pattern.find_iter(line).map(move |m| Hit {
                        field,
                        start: m.start(),
                        end: m.end(),
                    })
                })
            })
            .collect();

        let mut kept: Vec<Hit> = Vec::new();
        for hit in &all {
            if self.label_boundaries && all.iter().any(|other| hit.is_shadowed_by(other)) {
                continue;
            }
            match kept.iter_mut().find(|k| k.field == hit.field) {
                Some(existing) if hit.start < existing.start => *existing = *hit,
                Some(_) => {}
                None => kept.push(*hit),
            }
        }
        kept
    }
}

fn english_pattern(label: &str, bounded: bool) -> Option<String> {
    let label = label.trim();
    let first = label.chars().next()?;
    let last = label.chars().last()?;
    let mut pattern = String::from("(?i)");
    if bounded && first.is_alphanumeric() {
        pattern.push_str(r"\b");
    }
    pattern.push_str(&regex::escape(label));
    if bounded && last.is_alphanumeric() {
        pattern.push_str(r"\b");
    }
    Some(pattern)
}

fn arabic_pattern(label: &str) -> Option<String> {
    let label = label.trim();
    (!label.is_empty()).then(|| regex::escape(label))
}

fn value_after(lines: &[&str], line_index: usize, label_end: usize) -> String {
    let rest = &lines[line_index][label_end..];
    if let Some(pos) = rest.find(DELIMITERS) {
        let delimiter_len = rest[pos..].chars().next().map_or(1, char::len_utf8);
        let value = clean_value(&rest[pos + delimiter_len..]);
        if !value.is_empty() {
            return value;
        }
    }
    next_non_empty(lines, line_index)
}

/// Answer printed below the question.
fn next_non_empty(lines: &[&str], line_index: usize) -> String {
    lines
        .iter()
        .skip(line_index + 1)
        .map(|l| l.trim())
        .find(|l| !l.is_empty())
        .map(clean_value)
        .unwrap_or_default()
}

fn clean_value(raw: &str) -> String {
    raw.trim_start_matches(|c: char| {
        c.is_whitespace() || matches!(c, ':' | '：' | '-' | '–' | '—' | '_' | '.' | '|' | '=')
    })
    .trim_end()
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fields::catalog::FieldLabel;
    use crate::pipeline::types::RecognizedPage;

    fn extractor(style: HeaderStyle) -> FieldExtractor {
        FieldExtractor::new(&FieldCatalog::default(), style, false).unwrap()
    }

    fn by_key(text: &str) -> Record {
        extractor(HeaderStyle::Key).extract(text)
    }

    fn bounded(text: &str) -> Record {
        FieldExtractor::new(&FieldCatalog::default(), HeaderStyle::Key, true)
            .unwrap()
            .extract(text)
    }

    #[test]
    fn one_entry_per_catalog_field() {
        let catalog = FieldCatalog::default();
        let record = by_key("nothing recognizable here");
        assert_eq!(record.len(), catalog.len());
        assert!(record.iter().all(|(_, v)| v.is_empty()));
        let columns: Vec<&str> = record.columns().collect();
        assert_eq!(columns, catalog.headers(HeaderStyle::Key));
    }

    #[test]
    fn english_label_with_colon() {
        let record = extractor(HeaderStyle::Bilingual).extract("Patient Name: John Smith");
        assert_eq!(record.get("Patient Name / اسم المريض"), Some("John Smith"));
    }

    #[test]
    fn english_match_is_case_insensitive() {
        let record = by_key("PATIENT NAME : john smith\nage:34");
        assert_eq!(record.get("patient_name"), Some("john smith"));
        assert_eq!(record.get("age"), Some("34"));
    }

    #[test]
    fn arabic_label_with_colon() {
        let record = by_key("اسم المريض: محمد أحمد");
        assert_eq!(record.get("patient_name"), Some("محمد أحمد"));
    }

    #[test]
    fn label_on_own_line_takes_next_non_empty_line() {
        let record = by_key("الجنس\n\nMale\nAge: 30");
        assert_eq!(record.get("gender"), Some("Male"));
        assert_eq!(record.get("age"), Some("30"));
    }

    #[test]
    fn empty_after_delimiter_falls_back_to_next_line() {
        let record = by_key("Gender:\n   \nFemale");
        assert_eq!(record.get("gender"), Some("Female"));
    }

    #[test]
    fn label_at_end_without_value_is_empty() {
        let record = by_key("Age: 40\nOutcome");
        assert_eq!(record.get("outcome"), Some(""));
    }

    #[test]
    fn either_language_gives_same_value() {
        let english = by_key("Nationality: Sudanese");
        let arabic = by_key("الجنسية: Sudanese");
        assert_eq!(english.get("nationality"), Some("Sudanese"));
        assert_eq!(english.get("nationality"), arabic.get("nationality"));

        let english = by_key("Gender\nMale");
        let arabic = by_key("الجنس\nMale");
        assert_eq!(english.get("gender"), arabic.get("gender"));
    }

    #[test]
    fn first_occurrence_wins() {
        let record = by_key("Age: 30\nAge: 31");
        assert_eq!(record.get("age"), Some("30"));
    }

    #[test]
    fn leading_punctuation_is_stripped() {
        let record = by_key("Phone :- 0912345678\nAddress: . Khartoum, Block 5");
        assert_eq!(record.get("phone"), Some("0912345678"));
        assert_eq!(record.get("address"), Some("Khartoum, Block 5"));
    }

    #[test]
    fn value_is_after_first_delimiter_following_label() {
        let record = by_key("Patient ID (file no.): 2024-117");
        assert_eq!(record.get("patient_id"), Some("2024-117"));
    }

    #[test]
    fn full_width_colon_is_a_delimiter() {
        let record = by_key("العمر：25");
        assert_eq!(record.get("age"), Some("25"));
    }

    #[test]
    fn longer_arabic_label_shadows_contained_one() {
        let record = bounded("الجنسية: سوداني\nالجنس: ذكر");
        assert_eq!(record.get("nationality"), Some("سوداني"));
        assert_eq!(record.get("gender"), Some("ذكر"));
    }

    #[test]
    fn shadowed_label_still_found_later_on_same_line() {
        let record = bounded("الجنسية: سوداني الجنس: ذكر");
        assert_eq!(record.get("nationality"), Some("سوداني الجنس: ذكر"));
        assert_eq!(record.get("gender"), Some("ذكر"));
    }

    #[test]
    fn travel_place_does_not_fill_travel_history() {
        let record = bounded("مكان السفر: كسلا");
        assert_eq!(record.get("place_of_travel"), Some("كسلا"));
        assert_eq!(record.get("travel_history"), Some(""));
    }

    #[test]
    fn english_labels_respect_word_boundaries() {
        let record = bounded("Stage: severe\nPage 2 of 4");
        assert_eq!(record.get("age"), Some(""));
        assert_eq!(bounded("AGE: 9").get("age"), Some("9"));
    }

    #[test]
    fn contained_labels_match_as_substrings_by_default() {
        let record = by_key("الجنسية: سوداني");
        assert_eq!(record.get("nationality"), Some("سوداني"));
        assert_eq!(record.get("gender"), Some("سوداني"));

        let record = by_key("مكان السفر: كسلا");
        assert_eq!(record.get("place_of_travel"), Some("كسلا"));
        assert_eq!(record.get("travel_history"), Some("كسلا"));

        assert_eq!(by_key("Stage: severe").get("age"), Some("severe"));
    }

    #[test]
    fn every_label_present_with_value_is_filled_by_default() {
        let catalog = FieldCatalog::default();
        let extractor = extractor(HeaderStyle::Key);
        let texts = [
            "الجنسية: سوداني",
            "مكان السفر: كسلا",
            "Contact with Cases: yes",
            "Date of Onset\n2024-01-03",
            "Stage: severe",
            "Diagnosis Date:\n\n2024-01-05",
            "nothing here",
            "Outcome",
        ];
        for text in texts {
            let record = extractor.extract(text);
            let lines: Vec<&str> = text.lines().collect();
            for field in catalog.fields() {
                let expected = [&field.english, &field.arabic]
                    .iter()
                    .filter(|label| !label.is_empty())
                    .any(|label| {
                        lines.iter().enumerate().any(|(i, line)| {
                            let lower = line.to_lowercase();
                            let needle = label.to_lowercase();
                            let Some(pos) = lower.find(&needle) else {
                                return false;
                            };
                            let rest = &lower[pos + needle.len()..];
                            let same_line = rest
                                .split_once([':', '：'])
                                .is_some_and(|(_, v)| !clean_value(v).is_empty());
                            same_line
                                || lines[i + 1..].iter().any(|l| !l.trim().is_empty())
                        })
                    });
                let value = record.get(&field.key).unwrap();
                assert_eq!(
                    !value.is_empty(),
                    expected,
                    "{} in {text:?} gave {value:?}",
                    field.key
                );
            }
        }
    }

    #[test]
    fn no_text_yields_all_empty() {
        let record = by_key("");
        assert_eq!(record.filled(), 0);
        assert_eq!(record.len(), FieldCatalog::default().len());
    }

    #[test]
    fn extract_form_spans_page_separator() {
        let form = Form {
            index: 1,
            pages: vec![
                RecognizedPage::recognized(1, "Outcome"),
                RecognizedPage::failed(2, "timeout"),
                RecognizedPage::recognized(3, "Recovered"),
            ],
        };
        let record = extractor(HeaderStyle::Key).extract_form(&form);
        assert_eq!(record.get("outcome"), Some("Recovered"));
    }

    #[test]
    fn catalog_without_arabic_label() {
        let catalog =
            FieldCatalog::new(vec![FieldLabel::new("ward", "Ward", "", "Hospital")]).unwrap();
        let extractor = FieldExtractor::new(&catalog, HeaderStyle::Key, false).unwrap();
        assert_eq!(extractor.extract("WARD: 3B").get("ward"), Some("3B"));
    }

    #[test]
    fn non_empty_iff_label_followed_by_delimiter_or_next_line() {
        let cases = [
            ("Age: 30", true),
            ("Age\n30", true),
            ("Age", false),
            ("Age:", false),
            ("Age\n\n   \n", false),
            ("العمر\n\n30", true),
            ("no label at all", false),
        ];
        for (text, expect_value) in cases {
            let record = by_key(text);
            let value = record.get("age").unwrap();
            assert_eq!(!value.is_empty(), expect_value, "text {text:?} gave {value:?}");
        }
    }
}
