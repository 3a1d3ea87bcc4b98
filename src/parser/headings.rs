use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

/// Level assigned to the crawler's top-level anchor headings (they render as `##`).
pub const TOP_LEVEL: usize = 2;

// [](#fragment)
// Heading text
//
// Empty anchors stacked above the last one belong to its marker.
static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\A|\n)(?:\[\]\(#[^)\n]*\)\n)*\[\]\((#[^)\n]*)\)\n([^\n]*[^\s][^\n]*)").unwrap()
});

// ### [](#fragment)
// Heading text
static NESTED_ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\A|\n)(#{3,}) \[\]\((#[^)\n]*)\)\n([^\n]*[^\s][^\n]*)").unwrap()
});

/// One heading found in a markdown string.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadingMatch {
    /// Fragment link, e.g. `#install`.
    pub link: String,
    pub text: String,
    /// The matched marker and text line, exactly as they appear in the source.
    pub raw: String,
    /// Byte span of `raw` in the source.
    pub span: Range<usize>,
    pub level: usize,
}

/// Finds heading markers of one shape. Results are in document order and never overlap.
pub trait HeadingDetector {
    fn detect(&self, text: &str) -> Vec<HeadingMatch>;
}

/// Top-level sections: an empty link with a fragment on its own line, then the text line.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnchorHeadings;

impl HeadingDetector for AnchorHeadings {
    fn detect(&self, text: &str) -> Vec<HeadingMatch> {
        ANCHOR_RE
            .captures_iter(text)
            .filter_map(|caps| {
                let m = caps.get(0)?;
                Some(HeadingMatch {
                    link: caps[1].to_string(),
                    text: caps[2].trim().to_string(),
                    raw: m.as_str().to_string(),
                    span: m.range(),
                    level: TOP_LEVEL,
                })
            })
            .collect()
    }
}

/// Subsections: `###`-prefixed anchors, restricted to the shallowest level deeper than `parent`.
#[derive(Debug, Clone, Copy)]
pub struct NestedAnchorHeadings {
    parent: usize,
}

impl NestedAnchorHeadings {
    pub fn finer_than(parent: usize) -> Self {
        NestedAnchorHeadings { parent }
    }
}

impl HeadingDetector for NestedAnchorHeadings {
    fn detect(&self, text: &str) -> Vec<HeadingMatch> {
        let all: Vec<HeadingMatch> = NESTED_ANCHOR_RE
            .captures_iter(text)
            .filter_map(|caps| {
                let m = caps.get(0)?;
                Some(HeadingMatch {
                    link: caps[2].to_string(),
                    text: caps[3].trim().to_string(),
                    raw: m.as_str().to_string(),
                    span: m.range(),
                    level: caps[1].len(),
                })
            })
            .filter(|h| h.level > self.parent)
            .collect();

        let Some(next_level) = all.iter().map(|h| h.level).min() else {
            return all;
        };
        all.into_iter().filter(|h| h.level == next_level).collect()
    }
}
