//! PDF investigation report: title, charts, paginated record table and a
//! footer on every page. A4 landscape, builtin Helvetica.

use std::io::BufWriter;

use chrono::NaiveDate;
use printpdf::*;

use super::charts::{date_distribution, frequency, Bar};
use super::{english_part, ExportError, Table};
use crate::config::{APP_NAME, COPYRIGHT, DEDICATION_TEXT};
use crate::pipeline::fields::{FieldCatalog, HeaderStyle};

const PAGE_WIDTH: f32 = 297.0;
const PAGE_HEIGHT: f32 = 210.0;
const MARGIN: f32 = 15.0;
const FOOTER_TOP: f32 = 14.0;

const TABLE_FONT_SIZE: f32 = 6.5;
const TABLE_ROW_HEIGHT: f32 = 5.0;
const TABLE_HEADER_HEIGHT: f32 = 9.0;

const CHART_HEIGHT: f32 = 62.0;
/// Bars beyond this are merged into the last one ("Other").
const MAX_CATEGORY_BARS: usize = 8;

/// Average Helvetica glyph width in mm per point of font size.
const GLYPH_MM_PER_PT: f32 = 0.19;

#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub title: String,
    pub intro: String,
    /// Column counted for the gender chart; skipped when absent or empty.
    pub gender_column: String,
    /// Column plotted as the epidemic curve; skipped when absent or empty.
    pub onset_column: String,
    pub generated_on: NaiveDate,
    pub footer: Vec<String>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            title: "Malaria Investigation Report".to_string(),
            intro: format!("Generated automatically by the {APP_NAME}."),
            gender_column: "Gender".to_string(),
            onset_column: "Date of Onset".to_string(),
            generated_on: chrono::Local::now().date_naive(),
            footer: vec![COPYRIGHT.to_string(), DEDICATION_TEXT.to_string()],
        }
    }
}

impl ReportOptions {
    /// Chart columns named the way `catalog` labels them under `style`.
    pub fn for_catalog(catalog: &FieldCatalog, style: HeaderStyle) -> Self {
        let mut options = Self::default();
        if let Some(field) = catalog.get("gender") {
            options.gender_column = catalog.column_name(field, style);
        }
        if let Some(field) = catalog.get("date_of_onset") {
            options.onset_column = catalog.column_name(field, style);
        }
        options
    }
}

/// Render the report. Returns PDF bytes.
pub fn render_report(table: &Table, options: &ReportOptions) -> Result<Vec<u8>, ExportError> {
    let _span = tracing::info_span!("render_report", rows = table.rows.len()).entered();

    let (doc, page1, layer1) = PdfDocument::new(
        latin1(&options.title),
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "Layer 1",
    );
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| ExportError::Pdf(format!("PDF font error: {e}")))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| ExportError::Pdf(format!("PDF font error: {e}")))?;

    let mut pages = Pages {
        doc: &doc,
        layer: doc.get_page(page1).get_layer(layer1),
        count: 1,
        font: &font,
        footer: &options.footer,
    };
    pages.draw_footer();

    let mut y = PAGE_HEIGHT - MARGIN - 5.0;

    // Title block
    pages.text(&options.title, 18.0, MARGIN, y, &bold);
    y -= 7.0;
    pages.text(
        &format!("Date: {}", options.generated_on.format("%Y-%m-%d")),
        9.0,
        MARGIN,
        y,
        &font,
    );
    y -= 6.0;
    for line in wrap_text(&options.intro, 150) {
        pages.text(&line, 10.0, MARGIN, y, &font);
        y -= 5.0;
    }
    pages.text(
        &format!("Forms: {}", table.rows.len()),
        10.0,
        MARGIN,
        y,
        &font,
    );
    y -= 8.0;

    // Charts side by side
    let gender = frequency(table, &options.gender_column)
        .filter(|bars| !bars.is_empty())
        .map(|bars| merge_tail(bars, MAX_CATEGORY_BARS));
    let curve = date_distribution(table, &options.onset_column)
        .filter(|points| !points.is_empty())
        .map(|points| {
            points
                .into_iter()
                .map(|(date, count)| Bar {
                    label: date.format("%d/%m").to_string(),
                    count,
                })
                .collect::<Vec<_>>()
        });

    if gender.is_some() || curve.is_some() {
        let bottom = y - CHART_HEIGHT;
        let half = (PAGE_WIDTH - 3.0 * MARGIN) / 2.0;
        if let Some(bars) = &gender {
            pages.bar_chart("Gender Distribution", bars, MARGIN, bottom, half, &bold);
        }
        if let Some(bars) = &curve {
            let x = if gender.is_some() { 2.0 * MARGIN + half } else { MARGIN };
            pages.bar_chart("Epi Curve - Cases Over Time", bars, x, bottom, half, &bold);
        }
        y = bottom - 10.0;
    }

    // Records table
    if !table.headers.is_empty() {
        let widths = column_widths(table.headers.len());
        let min_y = FOOTER_TOP + 4.0;

        if y - TABLE_HEADER_HEIGHT - TABLE_ROW_HEIGHT - 8.0 < min_y {
            pages.new_page();
            y = PAGE_HEIGHT - MARGIN;
        }
        pages.text("Patient Records", 13.0, MARGIN, y, &bold);
        y -= 6.0;
        y = pages.table_header(&table.headers, &widths, y, &bold);

        for row in &table.rows {
            if y - TABLE_ROW_HEIGHT < min_y {
                pages.new_page();
                y = pages.table_header(&table.headers, &widths, PAGE_HEIGHT - MARGIN, &bold);
            }
            y = pages.table_row(row, &widths, y);
        }
    }

    tracing::info!(pages = pages.count, "Report rendered");

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| ExportError::Pdf(format!("PDF save error: {e}")))?;
    buf.into_inner()
        .map_err(|e| ExportError::Pdf(format!("PDF buffer error: {e}")))
}

/// Current drawing target plus what every new page needs.
struct Pages<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    count: usize,
    font: &'a IndirectFontRef,
    footer: &'a [String],
}

impl Pages<'_> {
    fn new_page(&mut self) {
        let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.count += 1;
        self.draw_footer();
    }

    fn draw_footer(&self) {
        let mut y = FOOTER_TOP - 4.0;
        self.set_stroke(0.6);
        self.line(MARGIN, FOOTER_TOP, PAGE_WIDTH - MARGIN, FOOTER_TOP);
        for line in self.footer {
            self.text(line, 7.0, MARGIN, y, self.font);
            y -= 3.5;
        }
        self.text(
            &format!("Page {}", self.count),
            7.0,
            PAGE_WIDTH - MARGIN - 12.0,
            FOOTER_TOP - 4.0,
            self.font,
        );
    }

    fn text(&self, text: &str, size: f32, x: f32, y: f32, font: &IndirectFontRef) {
        self.layer.use_text(latin1(text), size, Mm(x), Mm(y), font);
    }

    fn set_fill(&self, r: f32, g: f32, b: f32) {
        self.layer
            .set_fill_color(Color::Rgb(Rgb::new(r, g, b, None)));
    }

    fn set_stroke(&self, grey: f32) {
        self.layer
            .set_outline_color(Color::Rgb(Rgb::new(grey, grey, grey, None)));
        self.layer.set_outline_thickness(0.5);
    }

    fn line(&self, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(x1), Mm(y1)), false),
                (Point::new(Mm(x2), Mm(y2)), false),
            ],
            is_closed: false,
        });
    }

    fn fill_rect(&self, x: f32, y: f32, width: f32, height: f32) {
        self.layer
            .add_rect(Rect::new(Mm(x), Mm(y), Mm(x + width), Mm(y + height)));
    }

    /// Vertical bar chart with its title above and labels below the axis.
    fn bar_chart(
        &self,
        title: &str,
        bars: &[Bar],
        x: f32,
        bottom: f32,
        width: f32,
        bold: &IndirectFontRef,
    ) {
        let label_band = 6.0;
        let plot_bottom = bottom + label_band;
        let plot_height = CHART_HEIGHT - label_band - 10.0;
        let max = bars.iter().map(|b| b.count).max().unwrap_or(0).max(1) as f32;
        let slot = width / bars.len().max(1) as f32;
        let bar_width = (slot * 0.7).min(20.0);
        // Show every n-th label when they would collide.
        let label_step = ((bars.len() as f32 * 9.0) / width).ceil().max(1.0) as usize;

        self.text(title, 10.0, x, bottom + CHART_HEIGHT - 4.0, bold);
        self.set_stroke(0.3);
        self.line(x, plot_bottom, x + width, plot_bottom);

        for (i, bar) in bars.iter().enumerate() {
            let height = plot_height * bar.count as f32 / max;
            let left = x + slot * i as f32 + (slot - bar_width) / 2.0;

            self.set_fill(0.25, 0.45, 0.70);
            self.fill_rect(left, plot_bottom, bar_width, height);
            self.set_fill(0.0, 0.0, 0.0);

            self.text(
                &bar.count.to_string(),
                6.0,
                left + bar_width / 2.0 - 1.0,
                plot_bottom + height + 1.0,
                self.font,
            );
            if i % label_step == 0 {
                let label = truncate(&bar.label, fit_chars(slot * label_step as f32, 6.0));
                self.text(&label, 6.0, left, bottom + 1.5, self.font);
            }
        }
    }

    /// Draw the shaded header row; returns the y of the first body row.
    fn table_header(&self, headers: &[String], widths: &[f32], top: f32, bold: &IndirectFontRef) -> f32 {
        let bottom = top - TABLE_HEADER_HEIGHT;
        let total: f32 = widths.iter().sum();

        self.set_fill(0.84, 0.89, 0.74);
        self.fill_rect(MARGIN, bottom, total, TABLE_HEADER_HEIGHT);
        self.set_fill(0.0, 0.0, 0.0);

        let mut x = MARGIN;
        for (header, width) in headers.iter().zip(widths) {
            let max = fit_chars(*width - 1.0, TABLE_FONT_SIZE);
            let lines = wrap_text(english_part(header), max);
            let mut y = top - 3.2;
            for line in lines.iter().take(2) {
                self.text(&truncate(line, max), TABLE_FONT_SIZE, x + 0.5, y, bold);
                y -= 2.8;
            }
            x += width;
        }
        self.set_stroke(0.4);
        self.line(MARGIN, bottom, MARGIN + total, bottom);
        bottom
    }

    /// Draw one body row below `top`; returns the next row's top.
    fn table_row(&self, row: &[String], widths: &[f32], top: f32) -> f32 {
        let bottom = top - TABLE_ROW_HEIGHT;
        let mut x = MARGIN;
        for (value, width) in row.iter().zip(widths) {
            let max = fit_chars(*width - 1.0, TABLE_FONT_SIZE);
            self.text(&truncate(value, max), TABLE_FONT_SIZE, x + 0.5, bottom + 1.5, self.font);
            x += width;
        }
        let total: f32 = widths.iter().sum();
        self.set_stroke(0.8);
        self.line(MARGIN, bottom, MARGIN + total, bottom);
        bottom
    }
}

/// Equal column widths across the printable width.
fn column_widths(columns: usize) -> Vec<f32> {
    let usable = PAGE_WIDTH - 2.0 * MARGIN;
    vec![usable / columns.max(1) as f32; columns]
}

/// Characters of `size`-pt Helvetica that fit in `width_mm`.
fn fit_chars(width_mm: f32, size: f32) -> usize {
    ((width_mm / (size * GLYPH_MM_PER_PT)).floor() as usize).max(1)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(1);
    let mut out: String = text.chars().take(keep).collect();
    out.push('.');
    out
}

/// Keep the `max - 1` most frequent bars and fold the rest into "Other".
fn merge_tail(mut bars: Vec<Bar>, max: usize) -> Vec<Bar> {
    if bars.len() <= max || max == 0 {
        return bars;
    }
    let rest: usize = bars.drain(max - 1..).map(|b| b.count).sum();
    bars.push(Bar {
        label: "Other".to_string(),
        count: rest,
    });
    bars
}

/// The builtin fonts only cover Latin-1. Runs of other characters (Arabic,
/// for one) become a single `?`.
fn latin1(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_run = false;
    for c in text.chars() {
        if (c as u32) <= 0xFF && !c.is_control() {
            out.push(c);
            in_run = false;
        } else if c.is_whitespace() {
            out.push(' ');
            in_run = false;
        } else if !in_run {
            out.push('?');
            in_run = true;
        }
    }
    out
}

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.chars().count() + word.chars().count() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
