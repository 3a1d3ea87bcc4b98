use tracing::debug;

use super::chunk::{build_chunk, ends_with_heading, Built, Chunk, Frame};
use super::cleaners::remove_end_matter;
use super::headings::{AnchorHeadings, NestedAnchorHeadings, TOP_LEVEL};
use super::sections::{each_paragraph, split_paragraphs, split_sections, Section};
use crate::config::ChunkConfig;
use crate::crawl::Page;
use crate::error::ChunkError;

/// Heading-only sections fold into the next sibling that has a heading.
#[derive(Debug, Clone, PartialEq)]
enum MergeState {
    Normal,
    PendingMerge(String),
}

/// Chunk one page. Chunks come out in pre-order of the heading tree.
pub fn chunk_page(page: &Page, config: &ChunkConfig) -> Result<Vec<Chunk>, ChunkError> {
    let body = remove_end_matter(&page.markdown, &config.end_matter_markers);
    let sections = split_sections(&body, &AnchorHeadings, TOP_LEVEL)?;

    let mut chunks = Vec::new();
    walk(sections, &Frame::root(page), page, config, &mut chunks)?;
    debug!("{} -> {} chunks", page.url, chunks.len());
    Ok(chunks)
}

fn walk(
    sections: Vec<Section>,
    frame: &Frame,
    page: &Page,
    config: &ChunkConfig,
    out: &mut Vec<Chunk>,
) -> Result<(), ChunkError> {
    let mut state = MergeState::Normal;

    for mut section in sections {
        if section.has_heading() {
            if let MergeState::PendingMerge(prefix) = std::mem::replace(&mut state, MergeState::Normal) {
                let text = section.text.take().unwrap_or_default();
                section.text = Some(format!("{} - {}", prefix, text));
            }
        }

        let chunk = match build_chunk(&section, frame, page, config) {
            Built::Chunk(chunk) => chunk,
            Built::HeadingOnly(heading) => {
                if ends_with_heading(&frame.title, &heading) {
                    debug!("dropping repeated heading {:?} under {:?}", heading, frame.title);
                } else {
                    state = MergeState::PendingMerge(heading);
                }
                continue;
            }
            Built::Empty => continue,
        };

        if chunk.word_count() <= config.max_words || frame.depth >= config.max_depth {
            out.push(*chunk);
            continue;
        }

        let child = frame.child(&section);
        let nested = split_sections(
            section.body,
            &NestedAnchorHeadings::finer_than(section.level),
            section.level,
        )?;
        if nested.iter().any(Section::has_heading) {
            walk(nested, &child, page, config, out)?;
            continue;
        }

        // One group can still exceed the budget once the full title is added.
        let mut groups = split_paragraphs(&section, config.max_words);
        if groups.len() == 1 {
            groups = each_paragraph(&section);
        }
        if groups.len() <= 1 {
            out.push(*chunk);
        } else {
            debug!("{}: {} split into {} paragraph groups", page.url, child.title, groups.len());
            walk(groups, &child, page, config, out)?;
        }
    }

    if let MergeState::PendingMerge(heading) = state {
        debug!("trailing heading {:?} has no section to merge into", heading);
    }
    Ok(())
}

// ── Tests ──
