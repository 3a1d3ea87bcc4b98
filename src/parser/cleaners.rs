//! String rewrites that repair the crawler's markdown dialect.
//!
//! Every rule is a pure `&str -> String` function. [`clean_section`] composes them
//! in the order the chunk builder relies on; [`remove_end_matter`] runs once per
//! page before sectioning.

use std::sync::LazyLock;

use regex::{Captures, Regex};

// [text \
// \
// more](url)
static BROKEN_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\]]*?\\\s*\n\s*\\\s*\n[^\]]*?)\]\(([^)]*)\)").unwrap()
});
static DOUBLE_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\\\s*\n\s*\\\s*\n\s*").unwrap());
static SINGLE_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*\\\s*\n\s*").unwrap());

// Stacked anchors collapse onto the last one.
static ANCHOR_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:(?:#{1,6} )?\[\]\(#[^)\n]*\)\n)*(#{1,6} )?\[\]\(#[^)\n]*\)\n([^\n]+)").unwrap()
});

static BLOCK_SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[ \t]*\n").unwrap());
static LINKS_ONLY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\[[^\]]+\]\([^)\s]+\)\s*){2,}$").unwrap()
});
static LINK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").unwrap());

static LINK_THEN_PERIOD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\[[^\]\n]*\]\([^)\n]*\))\n\.").unwrap());
static LINK_THEN_LOWERCASE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\[[^\]\n]*\]\([^)\n]*\))\n[ \t]*([a-z])").unwrap());
static LINK_THEN_SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\[[^\]\n]*\]\([^)\n]*\))\n (\S)").unwrap());

static STRAY_BOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(\[[^\]\n]*\]\([^)\n]*\))\n\s*\*\*").unwrap());

/// Section-level pipeline. Order matters: links are spread and repaired before
/// headings are normalized and micro-text is pulled back onto link lines.
pub fn clean_section(text: &str) -> String {
    let text = spread_multi_column_links(text);
    let text = repair_link_line_breaks(&text);
    let text = normalize_anchor_headings(&text);
    let text = trim_stray_bold(&text);
    trim_newlines_after_links(&text)
}

/// Collapse `\`+newline+`\`+newline inside link text to a single space.
pub fn repair_link_line_breaks(text: &str) -> String {
    BROKEN_LINK_RE
        .replace_all(text, |caps: &Captures| {
            let content = DOUBLE_BREAK_RE.replace_all(&caps[1], " ");
            format!("[{}]({})", content, &caps[2])
        })
        .into_owned()
}

/// `[](#frag)` + text line becomes `## text`; a hashed anchor keeps its level.
/// Empty anchors stacked directly above it are dropped.
pub fn normalize_anchor_headings(text: &str) -> String {
    ANCHOR_HEADING_RE
        .replace_all(text, |caps: &Captures| {
            let hashes = caps.get(1).map_or("## ", |m| m.as_str());
            format!("{}{}", hashes, caps[2].trim())
        })
        .into_owned()
}

/// Rewrite blank-line-delimited blocks made only of links into a bulleted list.
pub fn spread_multi_column_links(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for sep in BLOCK_SEPARATOR_RE.find_iter(text) {
        out.push_str(&spread_block(&text[last..sep.start()]));
        out.push_str(sep.as_str());
        last = sep.end();
    }
    out.push_str(&spread_block(&text[last..]));
    out
}

fn spread_block(block: &str) -> String {
    if !LINKS_ONLY_RE.is_match(block) {
        return block.to_string();
    }
    LINK_RE
        .captures_iter(block)
        .map(|caps| {
            let label = DOUBLE_BREAK_RE.replace_all(&caps[1], ": ");
            let label = SINGLE_BREAK_RE.replace_all(&label, " ");
            let label = label.replace("\\ \\ ", ": ");
            format!("- [{}]({})", label.trim(), &caps[2])
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Pull a link back onto the line of the micro-text the crawler split off.
pub fn trim_newlines_after_links(text: &str) -> String {
    let text = LINK_THEN_PERIOD_RE.replace_all(text, "$1.");
    let text = LINK_THEN_LOWERCASE_RE.replace_all(&text, "$1 $2");
    LINK_THEN_SPACE_RE.replace_all(&text, "$1 $2").into_owned()
}

/// `**[text](url)\n   **` becomes `**[text](url)**`.
pub fn trim_stray_bold(text: &str) -> String {
    STRAY_BOLD_RE.replace_all(text, "**$1**").into_owned()
}

/// Truncate at the earliest end-matter marker. The result is always trimmed.
pub fn remove_end_matter(text: &str, markers: &[String]) -> String {
    let cut = markers
        .iter()
        .filter_map(|m| text.find(m.as_str()))
        .min()
        .unwrap_or(text.len());
    text[..cut].trim().to_string()
}
