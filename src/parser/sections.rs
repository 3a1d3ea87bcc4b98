use std::fmt;

use super::headings::HeadingDetector;
use crate::error::ChunkError;

/// 1-based, inclusive position of a paragraph group among its section's paragraphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParagraphRange {
    pub first: usize,
    pub last: usize,
}

impl fmt::Display for ParagraphRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.first == self.last {
            write!(f, "{}", self.first)
        } else {
            write!(f, "{}-{}", self.first, self.last)
        }
    }
}

/// A contiguous slice of page markdown, optionally introduced by a heading.
#[derive(Debug, Clone, PartialEq)]
pub struct Section<'a> {
    /// Fragment link of the heading; `None` for leading content and paragraph groups.
    pub link: Option<String>,
    pub text: Option<String>,
    pub body: &'a str,
    /// Set only on paragraph groups.
    pub paragraphs: Option<ParagraphRange>,
    /// Heading depth; decides which finer level subdivides this section.
    pub level: usize,
}

impl<'a> Section<'a> {
    /// A heading-less section covering `body`.
    pub fn untitled(body: &'a str, level: usize) -> Self {
        Section {
            link: None,
            text: None,
            body,
            paragraphs: None,
            level,
        }
    }

    pub fn has_heading(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Partition `text` at the headings `detector` finds.
///
/// Content before the first heading becomes an untitled section when it is not blank.
/// Without any heading the whole (non-blank) text is a single untitled section.
pub fn split_sections<'a>(
    text: &'a str,
    detector: &dyn HeadingDetector,
    level: usize,
) -> Result<Vec<Section<'a>>, ChunkError> {
    let matches = detector.detect(text);
    let mut sections = Vec::with_capacity(matches.len() + 1);

    let leading_end = matches.first().map_or(text.len(), |m| m.span.start);
    let leading = text.get(..leading_end).ok_or_else(|| ChunkError::StructuralMismatch {
        start: 0,
        end: leading_end,
        len: text.len(),
        heading: String::new(),
    })?;
    if !leading.trim().is_empty() {
        sections.push(Section::untitled(leading, level));
    }

    for (i, m) in matches.iter().enumerate() {
        let start = m.span.start;
        let end = matches.get(i + 1).map_or(text.len(), |next| next.span.start);
        let mismatch = || ChunkError::StructuralMismatch {
            start,
            end,
            len: text.len(),
            heading: m.text.clone(),
        };

        if start >= end || text.get(m.span.clone()) != Some(m.raw.as_str()) {
            return Err(mismatch());
        }
        let body = text.get(start..end).ok_or_else(mismatch)?;

        sections.push(Section {
            link: Some(m.link.clone()),
            text: Some(m.text.clone()),
            body,
            paragraphs: None,
            level: m.level,
        });
    }

    Ok(sections)
}

/// Group the paragraphs of `section` into runs of at most `max_words` words.
///
/// Paragraphs are separated by blank lines outside fenced code blocks and are never
/// split; a paragraph larger than the budget forms its own group. Groups are
/// contiguous slices that together cover the section body. A zero budget puts
/// every paragraph in a group of its own.
pub fn split_paragraphs<'a>(section: &Section<'a>, max_words: usize) -> Vec<Section<'a>> {
    let body = section.body;
    let paragraphs = paragraph_spans(body);
    if paragraphs.is_empty() {
        return Vec::new();
    }
    let offset = section.paragraphs.map_or(0, |r| r.first - 1);

    // (first paragraph index, last paragraph index), 0-based
    let mut groups: Vec<(usize, usize)> = Vec::new();
    let mut words = 0;
    for (i, &(start, end)) in paragraphs.iter().enumerate() {
        let count = body[start..end].split_whitespace().count();
        match groups.last_mut() {
            Some(group) if words + count <= max_words => {
                group.1 = i;
                words += count;
            }
            _ => {
                groups.push((i, i));
                words = count;
            }
        }
    }

    let group_count = groups.len();
    groups
        .iter()
        .enumerate()
        .map(|(g, &(first, last))| {
            let start = if g == 0 { 0 } else { paragraphs[first].0 };
            let end = if g + 1 == group_count {
                body.len()
            } else {
                paragraphs[groups[g + 1].0].0
            };
            Section {
                link: None,
                text: None,
                body: &body[start..end],
                paragraphs: Some(ParagraphRange {
                    first: offset + first + 1,
                    last: offset + last + 1,
                }),
                level: section.level,
            }
        })
        .collect()
}

/// One group per paragraph.
pub fn each_paragraph<'a>(section: &Section<'a>) -> Vec<Section<'a>> {
    split_paragraphs(section, 0)
}

/// Byte spans of the non-blank paragraphs of `body`.
fn paragraph_spans(body: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut current: Option<(usize, usize)> = None;
    let mut in_fence = false;
    let mut pos = 0;

    for line in body.split_inclusive('\n') {
        let line_start = pos;
        pos += line.len();
        let trimmed = line.trim();

        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        }
        if trimmed.is_empty() && !in_fence {
            if let Some(span) = current.take() {
                spans.push(span);
            }
            continue;
        }
        let line_end = line_start + line.trim_end().len();
        match current.as_mut() {
            Some(span) => span.1 = line_end,
            None => current = Some((line_start, line_end)),
        }
    }
    if let Some(span) = current {
        spans.push(span);
    }
    spans
}

// ── Tests ──
