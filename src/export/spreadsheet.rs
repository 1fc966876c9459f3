use std::io::Write;
use std::path::Path;

use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook};

use super::{ExportError, Table};

/// Worksheet name used when none is given.
pub const DEFAULT_SHEET_NAME: &str = "Malaria Data";

/// Excel limit on rows per sheet, header included.
const MAX_ROWS: usize = 1_048_576;

const MIN_COLUMN_WIDTH: f64 = 10.0;
const MAX_COLUMN_WIDTH: f64 = 50.0;

/// Render `table` as a single-sheet `.xlsx` workbook.
pub fn write_xlsx(table: &Table, sheet_name: &str) -> Result<Vec<u8>, ExportError> {
    if table.rows.len() + 1 > MAX_ROWS {
        return Err(ExportError::TooLarge(format!(
            "{} rows, sheet limit is {}",
            table.rows.len(),
            MAX_ROWS - 1
        )));
    }
    let columns = u16::try_from(table.headers.len())
        .map_err(|_| ExportError::TooLarge(format!("{} columns", table.headers.len())))?;

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(sheet_name)?;

    let header_format = Format::new()
        .set_bold()
        .set_text_wrap()
        .set_align(FormatAlign::Top)
        .set_background_color(Color::RGB(0xD7E4BC))
        .set_border(FormatBorder::Thin);

    for (col, header) in (0..columns).zip(&table.headers) {
        sheet.write_string_with_format(0, col, header, &header_format)?;
    }
    for (row_index, row) in table.rows.iter().enumerate() {
        // Bounded by MAX_ROWS above.
        let row_num = (row_index + 1) as u32;
        for (col, value) in (0..columns).zip(row) {
            if !value.is_empty() {
                sheet.write_string(row_num, col, value)?;
            }
        }
    }

    for col in 0..columns {
        sheet.set_column_width(col, column_width(table, usize::from(col)))?;
    }
    sheet.set_freeze_panes(1, 0)?;

    let bytes = workbook.save_to_buffer()?;
    tracing::debug!(
        rows = table.rows.len(),
        columns = table.headers.len(),
        bytes = bytes.len(),
        "Workbook written"
    );
    Ok(bytes)
}

/// Character width of the widest cell, clamped.
fn column_width(table: &Table, col: usize) -> f64 {
    let widest = std::iter::once(table.headers[col].as_str())
        .chain(table.values(col))
        .map(|s| s.chars().count())
        .max()
        .unwrap_or(0);
    (widest as f64 + 2.0).clamp(MIN_COLUMN_WIDTH, MAX_COLUMN_WIDTH)
}

/// Render `table` as UTF-8 CSV with a byte order mark, which spreadsheet
/// applications need to show Arabic text correctly.
pub fn write_csv(table: &Table) -> Result<Vec<u8>, ExportError> {
    let mut buf = Vec::new();
    buf.write_all("\u{feff}".as_bytes())?;

    let mut writer = csv::Writer::from_writer(buf);
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))
}

/// Write `bytes` to `path`, creating parent directories.
pub fn write_file(path: &Path, bytes: &[u8]) -> Result<(), ExportError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "Export written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table {
            headers: vec!["Patient Name / اسم المريض".into(), "Age / العمر".into()],
            rows: vec![
                vec!["John Smith".into(), "30".into()],
                vec!["محمد, أحمد".into(), String::new()],
            ],
        }
    }

    #[test]
    fn xlsx_is_a_zip_container() {
        let bytes = write_xlsx(&table(), DEFAULT_SHEET_NAME).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn xlsx_accepts_empty_table() {
        let empty = Table {
            headers: vec!["a".into()],
            rows: vec![],
        };
        assert!(write_xlsx(&empty, DEFAULT_SHEET_NAME).is_ok());
    }

    #[test]
    fn invalid_sheet_name_is_an_error() {
        let err = write_xlsx(&table(), "bad/name").unwrap_err();
        assert!(matches!(err, ExportError::Xlsx(_)));
    }

    #[test]
    fn column_width_is_clamped() {
        let t = Table {
            headers: vec!["a".into(), "b".into()],
            rows: vec![vec!["x".repeat(200), "y".into()]],
        };
        assert_eq!(column_width(&t, 0), MAX_COLUMN_WIDTH);
        assert_eq!(column_width(&t, 1), MIN_COLUMN_WIDTH);
    }

    #[test]
    fn csv_has_bom_header_and_quoted_cells() {
        let bytes = write_csv(&table()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let text = text.strip_prefix('\u{feff}').unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Patient Name / اسم المريض,Age / العمر"));
        assert_eq!(lines.next(), Some("John Smith,30"));
        assert_eq!(lines.next(), Some("\"محمد, أحمد\","));
    }

    #[test]
    fn write_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.csv");
        write_file(&path, b"a,b\n").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"a,b\n");
    }
}
