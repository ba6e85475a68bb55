//! Landscape A4 PDF rendering of a monthly report.
//!
//! The first section lists every service in a table; a second section breaks
//! the hours of each service down per task, and is only added when at least
//! one service has tasks. Rows never straddle a page: when a row does not fit,
//! a new page is started and the table header is drawn again.
//!
//! Text uses the built-in Helvetica fonts, measured with their standard AFM
//! glyph widths. Anything outside printable ASCII is folded first.

use printpdf::path::PaintMode;
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
    Rect, Rgb,
};
use tracing::debug;

use crate::error::{AppError, Result};

use super::MonthlyReport;

const PAGE_WIDTH: f32 = 297.0;
const PAGE_HEIGHT: f32 = 210.0;
const MARGIN: f32 = 15.0;
const HEADER_HEIGHT: f32 = 10.0;
const GROUP_HEIGHT: f32 = 8.0;
const LINE_HEIGHT: f32 = 6.0;
const ROW_PADDING: f32 = 2.0;
const CELL_INSET: f32 = 1.5;
const PT_TO_MM: f32 = 0.3528;

const BODY_SIZE: f32 = 8.0;
const HEADER_SIZE: f32 = 9.0;

const HEADER_BG: (u8, u8, u8) = (52, 73, 94);
const WHITE: (u8, u8, u8) = (255, 255, 255);
const TEXT: (u8, u8, u8) = (50, 50, 50);
const ACCENT: (u8, u8, u8) = (52, 152, 219);
const STRIPE: (u8, u8, u8) = (240, 240, 240);
const BORDER: (u8, u8, u8) = (180, 180, 180);

#[derive(Debug, Clone, Copy, PartialEq)]
enum Align {
    Left,
    Center,
}

struct Column {
    title: &'static str,
    width: f32,
    align: Align,
}

/// Helvetica advance widths for ' '..='~', in 1/1000 em
#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

/// Helvetica-Bold advance widths for ' '..='~', in 1/1000 em
#[rustfmt::skip]
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

const SERVICE_COLUMNS: [Column; 7] = [
    Column { title: "Place", width: 40.0, align: Align::Left },
    Column { title: "Date", width: 25.0, align: Align::Center },
    Column { title: "Entry", width: 20.0, align: Align::Center },
    Column { title: "Break", width: 20.0, align: Align::Center },
    Column { title: "Exit", width: 20.0, align: Align::Center },
    Column { title: "Hours", width: 20.0, align: Align::Center },
    Column { title: "Observations", width: 120.0, align: Align::Left },
];

const TASK_COLUMNS: [Column; 4] = [
    Column { title: "Date", width: 25.0, align: Align::Center },
    Column { title: "Place", width: 45.0, align: Align::Left },
    Column { title: "Task description", width: 150.0, align: Align::Left },
    Column { title: "Hours", width: 20.0, align: Align::Center },
];

/// Render the report to PDF bytes
pub fn render(report: &MonthlyReport) -> Result<Vec<u8>> {
    let canvas = draw(report)?;
    debug!(pages = canvas.pages, month = %report.month, "PDF rendered");
    canvas.finish()
}

fn draw(report: &MonthlyReport) -> Result<Canvas> {
    let title = format!("Worked hours {} {}", report.owner, report.month);
    let mut canvas = Canvas::new(&title)?;
    let month_line = format!("Month: {}", report.month.label());

    canvas.title_block("Worked Hours Report", &month_line);
    let table = Table::new(&SERVICE_COLUMNS);
    table.header(&mut canvas);

    for (i, service) in report.services.iter().enumerate() {
        let cells = [
            service.place.clone(),
            service.date_display(),
            service.entry_time.format("%H:%M").to_string(),
            service.break_minutes.to_string(),
            service.exit_time.format("%H:%M").to_string(),
            format!("{:.2}", service.worked_hours),
            service.observations.clone(),
        ];
        table.row(&mut canvas, &cells, stripe(i));
    }

    let total = format!(
        "Total hours worked this month: {:.2} hours",
        report.total_hours
    );
    if !canvas.fits(15.0) {
        canvas.new_page();
    }
    canvas.y += 5.0;
    let right = table.left + table.width();
    let width = text_width(&total, 12.0, true);
    canvas.text(&total, 12.0, right - width, canvas.y + 6.0, true, ACCENT);
    canvas.y += 10.0;

    if report.has_subtasks() {
        canvas.new_page();
        canvas.title_block("Task Breakdown per Service", &month_line);
        let table = Table::new(&TASK_COLUMNS);
        table.header(&mut canvas);

        for service in report.services.iter().filter(|s| !s.subtasks.is_empty()) {
            let rows: Vec<[String; 4]> = service
                .subtasks
                .iter()
                .map(|task| {
                    [
                        service.date_display(),
                        service.place.clone(),
                        task.description.clone(),
                        format!("{:.1}", task.hours),
                    ]
                })
                .collect();
            let label = format!("Service: {} - {}", service.place, service.date_display());
            table.group(&mut canvas, &label, rows.first().map(|r| r.as_slice()));

            for (j, cells) in rows.iter().enumerate() {
                table.row(&mut canvas, cells, stripe(j));
            }
            canvas.y += 5.0;
        }
    }

    Ok(canvas)
}

fn stripe(index: usize) -> (u8, u8, u8) {
    if index % 2 == 0 {
        WHITE
    } else {
        STRIPE
    }
}

fn rgb((r, g, b): (u8, u8, u8)) -> Color {
    Color::Rgb(Rgb::new(
        f32::from(r) / 255.0,
        f32::from(g) / 255.0,
        f32::from(b) / 255.0,
        None,
    ))
}

/// Width of one character once folded, in mm
fn char_width(c: char, size: f32, bold: bool) -> f32 {
    let table = if bold {
        &HELVETICA_BOLD_WIDTHS
    } else {
        &HELVETICA_WIDTHS
    };
    let units = table[fold_char(c) as usize - ' ' as usize];
    f32::from(units) * size / 1000.0 * PT_TO_MM
}

/// Rendered width of `text`, in mm
fn text_width(text: &str, size: f32, bold: bool) -> f32 {
    text.chars().map(|c| char_width(c, size, bold)).sum()
}

/// Replace characters the built-in fonts cannot encode
fn pdf_text(text: &str) -> String {
    text.chars().map(fold_char).collect()
}

/// Map a character into printable ASCII
fn fold_char(c: char) -> char {
    match c {
        ' '..='~' => c,
        '\t' | '\n' | '\r' => ' ',
        'á' | 'à' | 'â' | 'ä' | 'ã' => 'a',
        'Á' | 'À' | 'Â' | 'Ä' | 'Ã' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ñ' => 'n',
        'Ñ' => 'N',
        'ç' => 'c',
        'Ç' => 'C',
        '–' | '—' => '-',
        '‘' | '’' => '\'',
        '“' | '”' => '"',
        _ => '?',
    }
}

/// Greedy word wrap into lines no wider than `max_width` mm.
/// Words longer than a line are split. Always returns at least one line.
fn wrap_text(text: &str, max_width: f32, size: f32, bold: bool) -> Vec<String> {
    let space = char_width(' ', size, bold);
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut line = String::new();
        let mut line_width = 0.0;
        for word in paragraph.split_whitespace() {
            let mut word = word.to_string();
            let mut word_width = text_width(&word, size, bold);
            while word_width > max_width {
                if !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                    line_width = 0.0;
                }
                let rest = word.split_off(split_point(&word, max_width, size, bold));
                lines.push(word);
                word = rest;
                word_width = text_width(&word, size, bold);
            }
            if word.is_empty() {
                continue;
            }
            if !line.is_empty() && line_width + space + word_width > max_width {
                lines.push(std::mem::take(&mut line));
                line_width = 0.0;
            }
            if !line.is_empty() {
                line.push(' ');
                line_width += space;
            }
            line.push_str(&word);
            line_width += word_width;
        }
        if !line.is_empty() {
            lines.push(line);
        }
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Byte offset of the longest prefix of `word` fitting in `max_width`,
/// never less than one character
fn split_point(word: &str, max_width: f32, size: f32, bold: bool) -> usize {
    let mut width = 0.0;
    for (i, c) in word.char_indices() {
        width += char_width(c, size, bold);
        if width > max_width {
            return if i == 0 { c.len_utf8() } else { i };
        }
    }
    word.len()
}

/// Drawing surface tracking the current page and a top-down cursor
struct Canvas {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    /// Distance from the top edge of the page, in mm
    y: f32,
    pages: usize,
}

impl Canvas {
    fn new(title: &str) -> Result<Self> {
        let (doc, page, layer) =
            PdfDocument::new(pdf_text(title), Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| AppError::report(format!("pdf font: {}", e)))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| AppError::report(format!("pdf font: {}", e)))?;
        let layer = doc.get_page(page).get_layer(layer);

        Ok(Self {
            doc,
            layer,
            regular,
            bold,
            y: MARGIN,
            pages: 1,
        })
    }

    fn new_page(&mut self) {
        let (page, layer) = self
            .doc
            .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = MARGIN;
        self.pages += 1;
    }

    fn fits(&self, height: f32) -> bool {
        self.y + height <= PAGE_HEIGHT - MARGIN
    }

    /// Rectangle with its top-left corner at (`x`, `top`)
    fn rect(&self, x: f32, top: f32, width: f32, height: f32, fill: Option<(u8, u8, u8)>) {
        let mode = match fill {
            Some(color) => {
                self.layer.set_fill_color(rgb(color));
                PaintMode::FillStroke
            }
            None => PaintMode::Stroke,
        };
        self.layer.set_outline_color(rgb(BORDER));
        self.layer.set_outline_thickness(0.5);
        let rect = Rect::new(
            Mm(x),
            Mm(PAGE_HEIGHT - top - height),
            Mm(x + width),
            Mm(PAGE_HEIGHT - top),
        )
        .with_mode(mode);
        self.layer.add_rect(rect);
    }

    /// Text with its baseline `baseline` mm below the top edge
    fn text(&self, text: &str, size: f32, x: f32, baseline: f32, bold: bool, color: (u8, u8, u8)) {
        let font = if bold { &self.bold } else { &self.regular };
        self.layer.set_fill_color(rgb(color));
        self.layer
            .use_text(pdf_text(text), size, Mm(x), Mm(PAGE_HEIGHT - baseline), font);
    }

    fn centered_text(&self, text: &str, size: f32, baseline: f32, bold: bool) {
        let x = ((PAGE_WIDTH - text_width(text, size, bold)) / 2.0).max(MARGIN);
        self.text(text, size, x, baseline, bold, TEXT);
    }

    fn title_block(&mut self, title: &str, subtitle: &str) {
        self.centered_text(title, 20.0, self.y + 10.0, true);
        self.centered_text(subtitle, 14.0, self.y + 20.0, false);
        self.y += 35.0;
    }

    fn finish(self) -> Result<Vec<u8>> {
        self.doc
            .save_to_bytes()
            .map_err(|e| AppError::report(format!("pdf: {}", e)))
    }
}

/// A horizontally centered table
struct Table<'a> {
    columns: &'a [Column],
    left: f32,
}

impl<'a> Table<'a> {
    fn new(columns: &'a [Column]) -> Self {
        let width: f32 = columns.iter().map(|c| c.width).sum();
        Self {
            columns,
            left: (PAGE_WIDTH - width) / 2.0,
        }
    }

    fn width(&self) -> f32 {
        self.columns.iter().map(|c| c.width).sum()
    }

    fn header(&self, canvas: &mut Canvas) {
        let mut x = self.left;
        for column in self.columns {
            canvas.rect(x, canvas.y, column.width, HEADER_HEIGHT, Some(HEADER_BG));
            let width = text_width(column.title, HEADER_SIZE, true);
            canvas.text(
                column.title,
                HEADER_SIZE,
                x + (column.width - width) / 2.0,
                canvas.y + 6.5,
                true,
                WHITE,
            );
            x += column.width;
        }
        canvas.y += HEADER_HEIGHT;
    }

    fn wrap_cells(&self, cells: &[String]) -> Vec<Vec<String>> {
        let max_lines = max_lines_per_row();
        self.columns
            .iter()
            .zip(cells)
            .map(|(column, text)| {
                let mut lines =
                    wrap_text(text, column.width - 2.0 * CELL_INSET, BODY_SIZE, false);
                if lines.len() > max_lines {
                    lines.truncate(max_lines);
                    if let Some(last) = lines.last_mut() {
                        let limit = column.width
                            - 2.0 * CELL_INSET
                            - text_width("...", BODY_SIZE, false);
                        while text_width(last, BODY_SIZE, false) > limit && last.pop().is_some() {}
                        last.push_str("...");
                    }
                }
                lines
            })
            .collect()
    }

    fn row_height(wrapped: &[Vec<String>]) -> f32 {
        let lines = wrapped.iter().map(Vec::len).max().unwrap_or(1);
        lines as f32 * LINE_HEIGHT + ROW_PADDING
    }

    fn ensure_room(&self, canvas: &mut Canvas, height: f32) {
        if !canvas.fits(height) {
            canvas.new_page();
            self.header(canvas);
        }
    }

    fn row(&self, canvas: &mut Canvas, cells: &[String], fill: (u8, u8, u8)) {
        let wrapped = self.wrap_cells(cells);
        let height = Self::row_height(&wrapped);
        self.ensure_room(canvas, height);

        let top = canvas.y;
        let mut x = self.left;
        for (column, lines) in self.columns.iter().zip(&wrapped) {
            canvas.rect(x, top, column.width, height, Some(fill));

            let block = lines.len() as f32 * LINE_HEIGHT;
            let offset = (height - block) / 2.0;
            for (i, line) in lines.iter().enumerate() {
                let line_x = match column.align {
                    Align::Left => x + CELL_INSET,
                    Align::Center => {
                        x + (column.width - text_width(line, BODY_SIZE, false)) / 2.0
                    }
                };
                let baseline = top + offset + i as f32 * LINE_HEIGHT + LINE_HEIGHT * 0.7;
                canvas.text(line, BODY_SIZE, line_x, baseline, false, TEXT);
            }
            x += column.width;
        }
        canvas.y += height;
    }

    /// Full-width label row introducing a group of rows. The label is kept on
    /// the same page as `first_row`.
    fn group(&self, canvas: &mut Canvas, label: &str, first_row: Option<&[String]>) {
        let first_height = match first_row {
            Some(cells) => Self::row_height(&self.wrap_cells(cells)),
            None => LINE_HEIGHT + ROW_PADDING,
        };
        self.ensure_room(canvas, GROUP_HEIGHT + first_height);
        canvas.rect(self.left, canvas.y, self.width(), GROUP_HEIGHT, None);
        canvas.text(
            label,
            HEADER_SIZE,
            self.left + CELL_INSET,
            canvas.y + 5.5,
            true,
            ACCENT,
        );
        canvas.y += GROUP_HEIGHT;
    }
}

/// Lines a single row may hold so it still fits on an empty page
fn max_lines_per_row() -> usize {
    let usable = PAGE_HEIGHT - 2.0 * MARGIN - HEADER_HEIGHT - ROW_PADDING;
    (usable / LINE_HEIGHT).floor() as usize
}
