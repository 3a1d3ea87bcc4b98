use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use pulldown_cmark::{html, Options, Parser};
use regex::Regex;
use tracing::info;

use crate::parser::chunk::Chunk;

const CHUNK_FILE_PREFIX: &str = "chunks";
const BOOST_SUFFIX: &str = "boost.json";
pub const MARKDOWN_REPORT: &str = "chunks.md";

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Render chunk markdown to HTML. Tables and strikethrough follow the docs site's dialect.
pub fn render_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(markdown, options);

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

pub fn chunk_file_name(timestamp: &str, boost: bool) -> String {
    if boost {
        format!("{}_{}_boost.json", CHUNK_FILE_PREFIX, timestamp)
    } else {
        format!("{}_{}.json", CHUNK_FILE_PREFIX, timestamp)
    }
}

/// Write the pretty-printed chunk array. Returns the file path.
pub fn write_json(chunks: &[Chunk], dir: &Path, timestamp: &str, boost: bool) -> Result<PathBuf> {
    let path = dir.join(chunk_file_name(timestamp, boost));
    let json = serde_json::to_string_pretty(chunks)?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {} chunks to {}", chunks.len(), path.display());
    Ok(path)
}

/// Human-readable dump of every chunk, one block each.
pub fn markdown_report(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    for chunk in chunks {
        // writing into a String cannot fail
        let _ = writeln!(out, "link: {}", chunk.link);
        let _ = writeln!(out, "tag_set: {}", chunk.tags.join(", "));
        let _ = writeln!(out, "image_urls: {}", chunk.image_urls.join(", "));
        let _ = writeln!(out, "tracking_id: {}", chunk.tracking_id);
        let _ = writeln!(out, "group_tracking_ids: {}", chunk.group_tracking_id);
        let _ = writeln!(out, "{}", chunk.html.trim_end());
        let _ = writeln!(out, "{}", "-".repeat(80));
        out.push('\n');
    }
    out
}

pub fn write_markdown(chunks: &[Chunk], dir: &Path) -> Result<PathBuf> {
    let path = dir.join(MARKDOWN_REPORT);
    std::fs::write(&path, markdown_report(chunks))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote chunk report to {}", path.display());
    Ok(path)
}

pub fn read_chunks(path: &Path) -> Result<Vec<Chunk>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read chunk file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse chunk file {}", path.display()))
}

/// Most recently modified `chunks*.json` in `dir`, skipping boosted variants.
pub fn latest_chunks_file(dir: &Path) -> Result<PathBuf> {
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(CHUNK_FILE_PREFIX) || !name.ends_with(".json") || name.ends_with(BOOST_SUFFIX) {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, entry.path()));
        }
    }
    newest
        .map(|(_, path)| path)
        .with_context(|| format!("No {}*.json file found in {}", CHUNK_FILE_PREFIX, dir.display()))
}

/// Words of a chunk's rendered text, markup excluded.
pub fn html_word_count(html: &str) -> usize {
    TAG_RE.replace_all(html, " ").split_whitespace().count()
}

/// Summary of a chunk file.
#[derive(Debug, PartialEq)]
pub struct ChunkStats {
    pub total: usize,
    pub average_words: f64,
    /// Chunks whose HTML opens with a heading element.
    pub heading_first: usize,
    pub smallest: Option<(usize, String)>,
    pub largest: Option<(usize, String)>,
}

impl ChunkStats {
    pub fn from_chunks(chunks: &[Chunk]) -> Self {
        let counts: Vec<(usize, &Chunk)> = chunks.iter().map(|c| (html_word_count(&c.html), c)).collect();
        let total_words: usize = counts.iter().map(|(n, _)| n).sum();
        let average_words = if chunks.is_empty() {
            0.0
        } else {
            total_words as f64 / chunks.len() as f64
        };
        let heading_first = chunks
            .iter()
            .filter(|c| c.html.trim_start().starts_with("<h"))
            .count();

        ChunkStats {
            total: chunks.len(),
            average_words,
            heading_first,
            smallest: counts
                .iter()
                .min_by_key(|(n, _)| *n)
                .map(|(n, c)| (*n, c.tracking_id.clone())),
            largest: counts
                .iter()
                .max_by_key(|(n, _)| *n)
                .map(|(n, c)| (*n, c.tracking_id.clone())),
        }
    }
}

// ── Tests ──
