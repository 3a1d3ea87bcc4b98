pub mod chunk;
pub mod cleaners;
pub mod driver;
pub mod headings;
pub mod sections;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::ChunkConfig;
use crate::crawl::Page;
use crate::output::render_html;
use chunk::Chunk;

const BATCH_SIZE: usize = 500;

/// Chunk one page and render every chunk's HTML.
pub fn process_page(page: &Page, config: &ChunkConfig) -> Result<Vec<Chunk>> {
    let mut chunks = driver::chunk_page(page, config).with_context(|| format!("Failed to chunk {}", page.url))?;
    for chunk in &mut chunks {
        chunk.html = render_html(&chunk.content);
    }
    Ok(chunks)
}

/// Chunk every page with status 200, in parallel batches. Output keeps crawl order.
pub fn process_pages(pages: &[Page], config: &ChunkConfig) -> Result<Vec<Chunk>> {
    let pb = ProgressBar::new(pages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut chunks = Vec::new();
    let mut skipped = 0usize;
    for batch in pages.chunks(BATCH_SIZE) {
        let results: Vec<Option<Result<Vec<Chunk>>>> = batch
            .par_iter()
            .map(|page| {
                if !page.is_ok() {
                    debug!("Skipping {} (status {})", page.url, page.status_code);
                    return None;
                }
                Some(process_page(page, config))
            })
            .collect();

        for result in results {
            match result {
                Some(page_chunks) => chunks.extend(page_chunks?),
                None => skipped += 1,
            }
        }
        pb.inc(batch.len() as u64);
    }

    pb.finish_and_clear();
    info!(
        "Chunked {} pages into {} chunks ({} skipped)",
        pages.len() - skipped,
        chunks.len(),
        skipped
    );
    Ok(chunks)
}

// ── Tests ──
