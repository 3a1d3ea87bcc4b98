use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use super::cleaners;
use super::sections::Section;
use crate::config::ChunkConfig;
use crate::crawl::Page;

static IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\(([^)\s]*?\.(?:png|webp))\)").unwrap());
static HEADING_LINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#{1,6}\s+(\S.*)$").unwrap());
static TRACKING_SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[#\s:/]").unwrap());
static DASH_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{2,}").unwrap());

/// A finished, indexable record in the ingestion API's shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Cleaned markdown; rendered into `html` by the orchestrator.
    #[serde(skip)]
    pub content: String,
    #[serde(rename = "chunk_html")]
    pub html: String,
    pub link: String,
    #[serde(rename = "tag_set")]
    pub tags: Vec<String>,
    pub image_urls: Vec<String>,
    pub tracking_id: String,
    #[serde(
        rename = "group_tracking_ids",
        serialize_with = "as_single_item",
        deserialize_with = "from_single_item"
    )]
    pub group_tracking_id: String,
    pub timestamp: String,
    pub metadata: ChunkMetadata,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub semantic_boost: Option<SemanticBoost>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fulltext_boost: Option<FulltextBoost>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub upsert_by_tracking_id: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub heading: Option<String>,
    pub page_title: String,
    pub page_description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticBoost {
    pub distance_factor: f64,
    pub phrase: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulltextBoost {
    pub boost_factor: f64,
    pub phrase: String,
}

impl Chunk {
    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }
}

fn as_single_item<S: Serializer>(id: &str, serializer: S) -> Result<S::Ok, S::Error> {
    [id].serialize(serializer)
}

fn from_single_item<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let ids = Vec::<String>::deserialize(deserializer)?;
    Ok(ids.into_iter().next().unwrap_or_default())
}

/// Where a section sits in the heading tree.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Titles of all enclosing headings joined by `": "`, rooted at the page title.
    pub title: String,
    /// Heading link inherited by untitled sections.
    pub link: String,
    pub depth: usize,
}

impl Frame {
    pub fn root(page: &Page) -> Self {
        Frame {
            title: page.title.clone(),
            link: String::new(),
            depth: 0,
        }
    }

    /// Frame for the sections `section` is split into.
    pub fn child(&self, section: &Section) -> Self {
        Frame {
            title: section_title(&self.title, section),
            link: section.link.clone().unwrap_or_else(|| self.link.clone()),
            depth: self.depth + 1,
        }
    }
}

/// Result of turning one section into a chunk.
#[derive(Debug, Clone)]
pub enum Built {
    Chunk(Box<Chunk>),
    /// The section cleaned down to its heading line. Carries the heading text.
    HeadingOnly(String),
    /// Nothing left after cleaning, e.g. a stray rule line.
    Empty,
}

pub fn build_chunk(section: &Section, frame: &Frame, page: &Page, config: &ChunkConfig) -> Built {
    let body = section.body.trim().trim_matches('-').trim();
    let cleaned = cleaners::clean_section(body);
    if cleaned.trim().is_empty() {
        return Built::Empty;
    }

    if !cleaned.contains('\n') {
        let line = cleaned.trim();
        let heading_line = HEADING_LINE_RE.captures(line).map(|c| c[1].trim().to_string());
        if heading_line.is_some() || line == frame.title {
            let heading = match &section.text {
                Some(t) if !t.is_empty() => t.clone(),
                _ => heading_line.unwrap_or_else(|| line.to_string()),
            };
            return Built::HeadingOnly(heading);
        }
    }

    let heading_title = section_title(&frame.title, section);
    let content = if section.has_heading() {
        replace_heading_line(&cleaned, &heading_title)
    } else {
        cleaned
    };

    let title = match section.paragraphs {
        Some(range) => format!("{} - ¶ {}", heading_title, range),
        None => heading_title.clone(),
    };

    let link = format!(
        "{}{}",
        page.url,
        section.link.as_deref().unwrap_or(&frame.link)
    );
    let mut tracking_id = tracking_id(&link, &config.root_url);
    if let Some(range) = section.paragraphs {
        tracking_id = format!("{}-{}", tracking_id, range);
    }

    let (semantic_boost, fulltext_boost) = if config.boost {
        let phrase = heading_title.trim_matches(|c| c == ':' || c == ' ').to_string();
        (
            Some(SemanticBoost {
                distance_factor: config.semantic_boost_distance_factor,
                phrase: phrase.clone(),
            }),
            Some(FulltextBoost {
                boost_factor: config.fulltext_boost_factor,
                phrase,
            }),
        )
    } else {
        (None, None)
    };

    Built::Chunk(Box::new(Chunk {
        image_urls: image_urls(&content),
        content,
        html: String::new(),
        link,
        tags: page.tags.clone(),
        tracking_id,
        group_tracking_id: tracking_id_for_page(page, config),
        timestamp: config.timestamp.clone(),
        metadata: ChunkMetadata {
            title,
            heading: section.text.clone().filter(|t| !t.is_empty()),
            page_title: page.title.clone(),
            page_description: page.description.clone(),
        },
        semantic_boost,
        fulltext_boost,
        upsert_by_tracking_id: None,
    }))
}

/// `"<ancestor>: <heading>"`, without repeating a heading the chain already ends with.
pub fn join_title(ancestor: &str, heading: &str) -> String {
    let heading = heading.trim();
    let joined = if heading.is_empty() {
        ancestor.to_string()
    } else if ancestor.is_empty() {
        heading.to_string()
    } else if ancestor == heading || ancestor.ends_with(&format!(": {}", heading)) {
        ancestor.to_string()
    } else {
        format!("{}: {}", ancestor, heading)
    };
    joined.trim_end_matches([':', ' ']).to_string()
}

/// True when `heading` is already the last segment of `title`.
pub fn ends_with_heading(title: &str, heading: &str) -> bool {
    title == heading || title.ends_with(&format!(": {}", heading))
}

fn section_title(ancestor: &str, section: &Section) -> String {
    join_title(ancestor, section.text.as_deref().unwrap_or(""))
}

/// Swap the leading heading line for `line`; prepend it when the content has none.
fn replace_heading_line(content: &str, line: &str) -> String {
    let (first, rest) = content.split_once('\n').unwrap_or((content, ""));
    if !HEADING_LINE_RE.is_match(first.trim()) {
        return format!("{}\n\n{}", line, content);
    }
    if rest.is_empty() {
        line.to_string()
    } else {
        format!("{}\n{}", line, rest)
    }
}

/// Slug identifying a URL for the indexing backend.
pub fn tracking_id(url: &str, root_url: &str) -> String {
    let path = url.strip_prefix(root_url).unwrap_or(url);
    let dashed = TRACKING_SEPARATOR_RE.replace_all(path, "-");
    let collapsed = DASH_RUN_RE.replace_all(&dashed, "-");
    collapsed.trim_matches('-').to_string()
}

pub fn tracking_id_for_page(page: &Page, config: &ChunkConfig) -> String {
    tracking_id(&page.url, &config.root_url)
}

/// Markdown image targets ending in `.png` or `.webp`, in document order.
pub fn image_urls(markdown: &str) -> Vec<String> {
    IMAGE_RE
        .captures_iter(markdown)
        .map(|c| c[1].to_string())
        .collect()
}

/// Path segments after `segment`, excluding the final path element, de-duplicated.
pub fn tags_from_url(url: &str, segment: &str) -> Vec<String> {
    let Ok(parsed) = Url::parse(url) else {
        return Vec::new();
    };
    let parts: Vec<&str> = parsed.path().split('/').collect();
    let Some(pos) = parts.iter().position(|p| *p == segment) else {
        return Vec::new();
    };
    let mut tags: Vec<String> = Vec::new();
    let end = parts.len().saturating_sub(1).max(pos + 1);
    for part in &parts[pos + 1..end] {
        if !part.is_empty() && !tags.iter().any(|t| t == part) {
            tags.push(part.to_string());
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::headings::TOP_LEVEL;

    fn page() -> Page {
        Page {
            url: "https://signoz.io/docs/instrumentation/javascript/".into(),
            title: "Javascript OpenTelemetry Instrumentation".into(),
            description: "Instrument JS apps".into(),
            markdown: String::new(),
            status_code: 200,
            tags: vec!["instrumentation".into()],
        }
    }

    fn headed<'a>(link: &str, text: &str, body: &'a str) -> Section<'a> {
        Section {
            link: Some(link.into()),
            text: Some(text.into()),
            body,
            paragraphs: None,
            level: TOP_LEVEL,
        }
    }

    fn expect_chunk(built: Built) -> Chunk {
        match built {
            Built::Chunk(chunk) => *chunk,
            other => panic!("expected a chunk, got {other:?}"),
        }
    }

    #[test]
    fn tracking_id_slug() {
        let root = "https://signoz.io/";
        assert_eq!(
            tracking_id("https://signoz.io/docs/install/docker/#install-signoz", root),
            "docs-install-docker-install-signoz"
        );
        assert_eq!(tracking_id("https://signoz.io/docs/a b:c/", root), "docs-a-b-c");
        assert_eq!(tracking_id("https://signoz.io/docs/x/#a---b", root), "docs-x-a-b");
    }

    #[test]
    fn tracking_id_deterministic_and_distinct() {
        let root = "https://signoz.io/";
        let urls = [
            "https://signoz.io/docs/install/",
            "https://signoz.io/docs/install/#docker",
            "https://signoz.io/docs/install/#kubernetes",
            "https://signoz.io/docs/userguide/logs/",
        ];
        let ids: Vec<String> = urls.iter().map(|u| tracking_id(u, root)).collect();
        let again: Vec<String> = urls.iter().map(|u| tracking_id(u, root)).collect();
        assert_eq!(ids, again);
        let mut unique = ids.clone();
        unique.dedup();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn tags_after_docs_segment() {
        assert_eq!(
            tags_from_url("https://signoz.io/docs/instrumentation/opentelemetry/javascript/", "docs"),
            vec!["instrumentation", "opentelemetry", "javascript"]
        );
        assert_eq!(
            tags_from_url("https://signoz.io/docs/a/a/b/page", "docs"),
            vec!["a", "b"]
        );
        assert!(tags_from_url("https://signoz.io/blog/post/", "docs").is_empty());
        assert!(tags_from_url("not a url", "docs").is_empty());
    }

    #[test]
    fn images_png_and_webp_only() {
        let md = "![a](/img/a.png) text ![b](/img/b.gif)\n![c](https://cdn.example.com/c.webp)";
        assert_eq!(image_urls(md), vec!["/img/a.png", "https://cdn.example.com/c.webp"]);
    }

    #[test]
    fn title_joining() {
        assert_eq!(join_title("Page", "Install"), "Page: Install");
        assert_eq!(join_title("Page: Install", "Install"), "Page: Install");
        assert_eq!(join_title("Page", ""), "Page");
        assert_eq!(join_title("", "Install"), "Install");
        assert_eq!(join_title("Page: ", ""), "Page");
    }

    #[test]
    fn heading_line_replaced_with_title() {
        let body = "\n[](#x)\nTitle X\n-------\n\nSome body text here.";
        let section = headed("#x", "Title X", body);
        let p = page();
        let chunk = expect_chunk(build_chunk(&section, &Frame::root(&p), &p, &ChunkConfig::default()));

        assert_eq!(
            chunk.content,
            "Javascript OpenTelemetry Instrumentation: Title X\n-------\n\nSome body text here."
        );
        assert_eq!(chunk.metadata.title, "Javascript OpenTelemetry Instrumentation: Title X");
        assert_eq!(chunk.link, "https://signoz.io/docs/instrumentation/javascript/#x");
        assert_eq!(chunk.tracking_id, "docs-instrumentation-javascript-x");
        assert_eq!(chunk.group_tracking_id, "docs-instrumentation-javascript");
        assert!(chunk.semantic_boost.is_none());
    }

    #[test]
    fn heading_only_section_detected() {
        let p = page();
        let section = headed("#a", "A", "\n[](#a)\nA\n------------\n");
        match build_chunk(&section, &Frame::root(&p), &p, &ChunkConfig::default()) {
            Built::HeadingOnly(h) => assert_eq!(h, "A"),
            other => panic!("expected heading-only, got {other:?}"),
        }
    }

    #[test]
    fn rule_only_section_is_empty() {
        let p = page();
        let section = Section::untitled("\n-----------\n", TOP_LEVEL);
        assert!(matches!(
            build_chunk(&section, &Frame::root(&p), &p, &ChunkConfig::default()),
            Built::Empty
        ));
    }

    #[test]
    fn line_equal_to_ancestor_title_is_heading_only() {
        let p = page();
        let section = Section::untitled("Javascript OpenTelemetry Instrumentation", TOP_LEVEL);
        assert!(matches!(
            build_chunk(&section, &Frame::root(&p), &p, &ChunkConfig::default()),
            Built::HeadingOnly(_)
        ));
    }

    #[test]
    fn single_line_of_prose_is_a_chunk() {
        let p = page();
        let section = headed("#b", "B", "B body text");
        let chunk = expect_chunk(build_chunk(&section, &Frame::root(&p), &p, &ChunkConfig::default()));
        assert_eq!(chunk.content, "Javascript OpenTelemetry Instrumentation: B\n\nB body text");
    }

    #[test]
    fn paragraph_group_title_and_tracking_id() {
        use crate::parser::sections::ParagraphRange;
        let p = page();
        let frame = Frame {
            title: "Javascript OpenTelemetry Instrumentation: Setup".into(),
            link: "#setup".into(),
            depth: 1,
        };
        let section = Section {
            link: None,
            text: None,
            body: "first paragraph\n\nsecond paragraph",
            paragraphs: Some(ParagraphRange { first: 3, last: 5 }),
            level: TOP_LEVEL,
        };
        let chunk = expect_chunk(build_chunk(&section, &frame, &p, &ChunkConfig::default()));
        assert_eq!(chunk.metadata.title, "Javascript OpenTelemetry Instrumentation: Setup - ¶ 3-5");
        assert_eq!(chunk.link, "https://signoz.io/docs/instrumentation/javascript/#setup");
        assert_eq!(chunk.tracking_id, "docs-instrumentation-javascript-setup-3-5");
        assert_eq!(chunk.content, "first paragraph\n\nsecond paragraph");
    }

    #[test]
    fn boosts_follow_title() {
        let p = page();
        let config = ChunkConfig {
            boost: true,
            ..ChunkConfig::default()
        };
        let section = headed("#x", "Install", "\n[](#x)\nInstall\n\nRun the installer.");
        let chunk = expect_chunk(build_chunk(&section, &Frame::root(&p), &p, &config));
        let semantic = chunk.semantic_boost.unwrap();
        let fulltext = chunk.fulltext_boost.unwrap();
        assert_eq!(semantic.distance_factor, 0.5);
        assert_eq!(semantic.phrase, "Javascript OpenTelemetry Instrumentation: Install");
        assert_eq!(fulltext.boost_factor, 5.0);
        assert_eq!(fulltext.phrase, semantic.phrase);
    }

    #[test]
    fn paragraph_group_boost_omits_range() {
        use crate::parser::sections::ParagraphRange;
        let p = page();
        let config = ChunkConfig {
            boost: true,
            ..ChunkConfig::default()
        };
        let frame = Frame {
            title: "Javascript OpenTelemetry Instrumentation: Setup".into(),
            link: "#setup".into(),
            depth: 1,
        };
        let section = Section {
            link: None,
            text: None,
            body: "second paragraph",
            paragraphs: Some(ParagraphRange { first: 2, last: 2 }),
            level: TOP_LEVEL,
        };
        let chunk = expect_chunk(build_chunk(&section, &frame, &p, &config));
        assert_eq!(chunk.metadata.title, "Javascript OpenTelemetry Instrumentation: Setup - ¶ 2");
        let semantic = chunk.semantic_boost.unwrap();
        assert_eq!(semantic.phrase, "Javascript OpenTelemetry Instrumentation: Setup");
        assert_eq!(chunk.fulltext_boost.unwrap().phrase, semantic.phrase);
    }

    #[test]
    fn serialized_in_ingestion_shape() {
        let p = page();
        let section = headed("#x", "Install", "\n[](#x)\nInstall\n\nRun ![s](/img/s.png).");
        let config = ChunkConfig::default().with_timestamp("2024-07-01_10-00-00");
        let mut chunk = expect_chunk(build_chunk(&section, &Frame::root(&p), &p, &config));
        chunk.html = "<p>Run</p>".into();

        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["chunk_html"], "<p>Run</p>");
        assert_eq!(json["tag_set"], serde_json::json!(["instrumentation"]));
        assert_eq!(json["image_urls"], serde_json::json!(["/img/s.png"]));
        assert_eq!(
            json["group_tracking_ids"],
            serde_json::json!(["docs-instrumentation-javascript"])
        );
        assert_eq!(json["timestamp"], "2024-07-01_10-00-00");
        assert_eq!(json["metadata"]["page_description"], "Instrument JS apps");
        assert!(json.get("content").is_none());
        assert!(json.get("semantic_boost").is_none());

        let back: Chunk = serde_json::from_value(json).unwrap();
        assert_eq!(back.group_tracking_id, chunk.group_tracking_id);
    }
}
