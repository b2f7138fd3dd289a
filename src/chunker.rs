//! Splits generated markdown into titled sections and joins them back.
//!
//! Raw text is the source of truth. Every edit goes chunk list in, chunk list
//! out, then through [`reassemble`].

use crate::models::ContentChunk;

pub const HEADING_MARKER: &str = "###";
pub const DEFAULT_TITLE: &str = "Generated Content";

/// True for a line that starts with `###` immediately followed by whitespace.
pub fn is_heading(line: &str) -> bool {
    line.strip_prefix(HEADING_MARKER)
        .and_then(|rest| rest.chars().next())
        .is_some_and(char::is_whitespace)
}

pub fn chunk(raw: &str) -> Vec<ContentChunk> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if !raw.lines().any(is_heading) {
        return vec![ContentChunk { id: 0, title: DEFAULT_TITLE.to_string(), body: trimmed.to_string() }];
    }

    segments(raw)
        .into_iter()
        .filter(|segment| !segment.trim().is_empty())
        .enumerate()
        .map(|(id, segment)| {
            let segment = segment.trim_start();
            let (first, rest) = segment.split_once('\n').unwrap_or((segment, ""));
            let title = match first.strip_prefix(HEADING_MARKER) {
                Some(text) if is_heading(first) => text,
                _ => first,
            };
            let title = title.trim().to_string();
            ContentChunk { id, title, body: rest.trim().to_string() }
        })
        .collect()
}

/// Cuts `raw` right before every heading line.
fn segments(raw: &str) -> Vec<&str> {
    let mut cuts = Vec::new();
    let mut offset = 0;
    for line in raw.split_inclusive('\n') {
        if offset > 0 && is_heading(line.trim_end_matches(['\r', '\n'])) {
            cuts.push(offset);
        }
        offset += line.len();
    }

    let mut out = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for cut in cuts {
        out.push(&raw[start..cut]);
        start = cut;
    }
    out.push(&raw[start..]);
    out
}

pub fn reassemble(chunks: &[ContentChunk]) -> String {
    chunks
        .iter()
        .map(|c| format!("{HEADING_MARKER} {}\n\n{}", c.title, c.body))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Chunk list with ids renumbered by position.
fn renumbered(chunks: Vec<ContentChunk>) -> Vec<ContentChunk> {
    chunks.into_iter().enumerate().map(|(id, c)| ContentChunk { id, ..c }).collect()
}

/// Fits `body` under an existing heading: a leading heading line is dropped
/// and any later heading line is demoted to `####`, so the text can never
/// start a new chunk.
pub fn sanitize_body(body: &str) -> String {
    let body = body.trim();
    let body = match body.split_once('\n') {
        Some((first, rest)) if is_heading(first) => rest.trim(),
        None if is_heading(body) => "",
        _ => body,
    };
    body.split_inclusive('\n')
        .map(|line| {
            if is_heading(line.trim_end_matches(['\r', '\n'])) {
                format!("#{line}")
            } else {
                line.to_string()
            }
        })
        .collect()
}

/// Replaces one chunk's body. `None` when the id does not exist.
/// An edit that leaves the body as it was returns `raw` untouched.
pub fn edit_chunk_body(raw: &str, id: usize, body: &str) -> Option<String> {
    let mut chunks = chunk(raw);
    let target = chunks.get_mut(id)?;
    let body = sanitize_body(body);
    if target.body == body {
        return Some(raw.to_string());
    }
    target.body = body;
    Some(reassemble(&chunks))
}

/// Like [`edit_chunk_body`], but only when the chunk at `id` still carries
/// `expected_title`. Used when applying a regeneration that finished after
/// other edits.
pub fn replace_chunk_body(raw: &str, id: usize, expected_title: &str, body: &str) -> Option<String> {
    let chunks = chunk(raw);
    if chunks.get(id)?.title != expected_title {
        return None;
    }
    edit_chunk_body(raw, id, body)
}

pub fn delete_chunk(raw: &str, id: usize) -> Option<String> {
    let mut chunks = chunk(raw);
    if id >= chunks.len() {
        return None;
    }
    chunks.remove(id);
    Some(reassemble(&renumbered(chunks)))
}
