use printpdf::*;
use std::io::BufWriter;

use crate::{chunker, models::{ContentChunk, HistoryRecord}};

pub const TEXT_SEPARATOR: &str = "\n\n----------------------------------------\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Text,
    Markdown,
    Html,
    Pdf,
}

impl ExportFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" | "text" => Some(ExportFormat::Text),
            "md" | "markdown" => Some(ExportFormat::Markdown),
            "html" | "htm" => Some(ExportFormat::Html),
            "pdf" => Some(ExportFormat::Pdf),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Text => "txt",
            ExportFormat::Markdown => "md",
            ExportFormat::Html => "html",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Text => "text/plain; charset=utf-8",
            ExportFormat::Markdown => "text/markdown; charset=utf-8",
            ExportFormat::Html => "text/html; charset=utf-8",
            ExportFormat::Pdf => "application/pdf",
        }
    }
}

pub fn export(record: &HistoryRecord, format: ExportFormat) -> Result<Vec<u8>, String> {
    let chunks = chunker::chunk(&record.raw_text);
    let title = format!("{} - {}", record.params.product_name, record.params.content_type);
    match format {
        ExportFormat::Text => Ok(to_text(&chunks).into_bytes()),
        ExportFormat::Markdown => Ok(chunker::reassemble(&chunks).into_bytes()),
        ExportFormat::Html => Ok(to_html(&title, &chunks).into_bytes()),
        ExportFormat::Pdf => to_pdf(&title, &chunks),
    }
}

pub fn to_text(chunks: &[ContentChunk]) -> String {
    chunks
        .iter()
        .map(|c| format!("{}\n\n{}", c.title, c.body))
        .collect::<Vec<_>>()
        .join(TEXT_SEPARATOR)
}

pub fn to_html(title: &str, chunks: &[ContentChunk]) -> String {
    let sections: String = chunks
        .iter()
        .map(|c| {
            let paragraphs: String = c.body
                .split("\n\n")
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(|p| format!("<p>{}</p>\n", escape_html(p).replace('\n', "<br>\n")))
                .collect();
            format!("<section>\n<h3>{}</h3>\n{}</section>\n", escape_html(&c.title), paragraphs)
        })
        .collect();
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{}</body>\n</html>\n",
        escape_html(title),
        sections
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const TOP: f32 = 275.0;
const BOTTOM: f32 = 20.0;
const LINE_H: f32 = 5.5;
const WRAP_AT: usize = 90;

/// Text-only PDF, one page (or more when long) per chunk.
pub fn to_pdf(title: &str, chunks: &[ContentChunk]) -> Result<Vec<u8>, String> {
    let (doc, page, layer) = PdfDocument::new(truncate(title, 48), Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
    let font = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(|e| format!("{:?}", e))?;
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(|e| format!("{:?}", e))?;

    let cover = doc.get_page(page).get_layer(layer);
    cover.use_text(truncate(title, 80), 20.0, Mm(15.0), Mm(TOP), &bold);
    cover.use_text(format!("{} sections", chunks.len()), 10.0, Mm(15.0), Mm(TOP - 12.0), &font);

    for chunk in chunks {
        let (page, layer) = doc.add_page(Mm(PAGE_W), Mm(PAGE_H), truncate(&chunk.title, 32));
        let mut current = doc.get_page(page).get_layer(layer);
        current.use_text(truncate(&chunk.title, 80), 16.0, Mm(15.0), Mm(TOP), &bold);
        let mut y = TOP - 12.0;
        for line in wrap(&chunk.body, WRAP_AT) {
            if y < BOTTOM {
                let (page, layer) = doc.add_page(Mm(PAGE_W), Mm(PAGE_H), truncate(&chunk.title, 32));
                current = doc.get_page(page).get_layer(layer);
                y = TOP;
            }
            current.use_text(line, 10.0, Mm(15.0), Mm(y), &font);
            y -= LINE_H;
        }
    }

    let mut buf: Vec<u8> = Vec::new();
    {
        let mut writer = BufWriter::new(&mut buf);
        doc.save(&mut writer).map_err(|e| format!("{:?}", e))?;
    }
    Ok(buf)
}

/// Greedy word wrap; blank lines are kept as paragraph gaps.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for source in text.lines() {
        let mut line = String::new();
        for word in source.split_whitespace() {
            if !line.is_empty() && line.chars().count() + 1 + word.chars().count() > width {
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

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max { s.to_string() } else { format!("{}…", s.chars().take(max).collect::<String>()) }
}
