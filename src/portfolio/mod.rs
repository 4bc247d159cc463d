//! Combined PDF portfolio of all summarized papers.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use printpdf::*;

use crate::error::PipelineError;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const WRAP_COLUMNS: usize = 90;

/// One chapter of the portfolio document.
#[derive(Debug, Clone)]
pub struct PortfolioEntry {
    pub title: String,
    pub body: String,
}

/// Writes `Portfolio.pdf` into the output directory, one chapter per entry.
pub fn build_portfolio(
    entries: &[PortfolioEntry],
    output_dir: &Path,
) -> Result<PathBuf, PipelineError> {
    if entries.is_empty() {
        return Err(PipelineError::Portfolio(
            "no summarized papers to compile".to_string(),
        ));
    }

    let (doc, first_page, first_layer) =
        PdfDocument::new("Portfolio", Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|err| PipelineError::Portfolio(format!("font error: {err}")))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|err| PipelineError::Portfolio(format!("font error: {err}")))?;

    let mut page_number = 0usize;
    let mut current = Some((first_page, first_layer));

    for entry in entries {
        let (page, layer_index) = current.take().unwrap_or_else(|| {
            doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1")
        });
        page_number += 1;
        let mut layer = doc.get_page(page).get_layer(layer_index);
        let mut y = chapter_header(&layer, &bold, &entry.title, page_number);

        for line in wrap_text(&entry.body, WRAP_COLUMNS) {
            if y < Mm(MARGIN) {
                let (next_page, next_layer) =
                    doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
                page_number += 1;
                layer = doc.get_page(next_page).get_layer(next_layer);
                y = chapter_header(&layer, &bold, &entry.title, page_number);
            }
            layer.use_text(&line, 10.0, Mm(MARGIN), y, &font);
            y -= Mm(5.0);
        }
    }

    let output_path = output_dir.join("Portfolio.pdf");
    let mut writer = BufWriter::new(File::create(&output_path)?);
    doc.save(&mut writer)
        .map_err(|err| PipelineError::Portfolio(format!("save error: {err}")))?;
    Ok(output_path)
}

fn chapter_header(
    layer: &PdfLayerReference,
    bold: &IndirectFontRef,
    title: &str,
    page_number: usize,
) -> Mm {
    layer.use_text("Portfolio", 12.0, Mm(MARGIN), Mm(PAGE_HEIGHT - 12.0), bold);
    layer.use_text(
        format!("Page {page_number}"),
        8.0,
        Mm(MARGIN),
        Mm(10.0),
        bold,
    );
    let mut y = Mm(PAGE_HEIGHT - 28.0);
    for line in wrap_text(title, WRAP_COLUMNS - 10) {
        layer.use_text(&line, 14.0, Mm(MARGIN), y, bold);
        y -= Mm(7.0);
    }
    y - Mm(5.0)
}

fn wrap_text(text: &str, columns: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            if !line.is_empty() && line.chars().count() + word.chars().count() + 1 > columns {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        }
        lines.push(line);
    }
    lines
}
