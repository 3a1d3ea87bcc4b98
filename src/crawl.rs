use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::ChunkConfig;
use crate::error::ChunkError;
use crate::parser::chunk::tags_from_url;

const CRAWL_FILE_PREFIX: &str = "crawl_results";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

static FILE_TIMESTAMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2}[T_]\d{2}-\d{2}-\d{2})").unwrap());

/// One crawled documentation page, ready for chunking.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub url: String,
    pub title: String,
    pub description: String,
    pub markdown: String,
    pub status_code: u16,
    pub tags: Vec<String>,
}

impl Page {
    pub fn is_ok(&self) -> bool {
        self.status_code == 200
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CrawlExport {
    Items(Vec<CrawlItem>),
    Wrapped { data: Vec<CrawlItem> },
}

#[derive(Debug, Deserialize)]
pub struct CrawlItem {
    #[serde(default)]
    pub markdown: String,
    #[serde(default)]
    pub metadata: CrawlMetadata,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlMetadata {
    pub og_url: Option<String>,
    #[serde(rename = "sourceURL")]
    pub source_url: Option<String>,
    pub og_title: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub page_status_code: Option<u16>,
}

impl CrawlItem {
    /// Resolve the item into a [`Page`]. `ogUrl`/`ogTitle` win over `sourceURL`/`title`.
    pub fn into_page(self, config: &ChunkConfig) -> Result<Page, ChunkError> {
        let meta = self.metadata;
        let url = meta
            .og_url
            .or(meta.source_url)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ChunkError::MissingField {
                field: "url",
                url: String::new(),
            })?;
        let title = meta
            .og_title
            .or(meta.title)
            .ok_or_else(|| ChunkError::MissingField {
                field: "title",
                url: url.clone(),
            })?;
        let status_code = meta.page_status_code.ok_or_else(|| ChunkError::MissingField {
            field: "pageStatusCode",
            url: url.clone(),
        })?;

        Ok(Page {
            tags: tags_from_url(&url, &config.tag_segment),
            url,
            title: title.trim().to_string(),
            description: meta.description.unwrap_or_default(),
            markdown: self.markdown,
            status_code,
        })
    }
}

/// Parse a crawl export into pages, in file order.
pub fn read_crawl_results(path: &Path, config: &ChunkConfig) -> Result<Vec<Page>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read crawl results {}", path.display()))?;
    let items = match serde_json::from_str::<CrawlExport>(&raw)
        .with_context(|| format!("Failed to parse crawl results {}", path.display()))?
    {
        CrawlExport::Items(items) => items,
        CrawlExport::Wrapped { data } => data,
    };
    debug!("{} crawl items in {}", items.len(), path.display());

    let pages = items
        .into_iter()
        .map(|item| item.into_page(config))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(pages)
}

/// Newest `crawl_results*.json` in `dir`. Names carry the timestamp, so the
/// lexicographically greatest wins.
pub fn latest_crawl_file(dir: &Path) -> Result<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(CRAWL_FILE_PREFIX) && n.ends_with(".json"))
        })
        .collect();
    candidates.sort();
    let latest = candidates
        .pop()
        .with_context(|| format!("No {}*.json file found in {}", CRAWL_FILE_PREFIX, dir.display()))?;
    info!("Using crawl file {}", latest.display());
    Ok(latest)
}

/// Batch timestamp embedded in a crawl file name, `T` normalized to `_`.
pub fn timestamp_from_filename(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    FILE_TIMESTAMP_RE
        .captures(name)
        .map(|c| c[1].replace('T', "_"))
}

/// File timestamp if present, else the current local time in the same format.
pub fn batch_timestamp(path: &Path) -> String {
    timestamp_from_filename(path)
        .unwrap_or_else(|| chrono::Local::now().format(TIMESTAMP_FORMAT).to_string())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = "tests/fixtures/crawl_results_2024-07-01_10-00-00.json";

    #[test]
    fn fixture_pages_in_file_order() {
        let pages = read_crawl_results(Path::new(FIXTURE), &ChunkConfig::default()).unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(
            pages[0].url,
            "https://signoz.io/docs/instrumentation/opentelemetry-javascript/"
        );
        assert_eq!(pages[0].title, "Javascript OpenTelemetry Instrumentation");
        assert_eq!(
            pages[0].tags,
            vec!["instrumentation", "opentelemetry-javascript"]
        );
        assert!(pages[0].is_ok());
        assert!(!pages[2].is_ok());
    }

    #[test]
    fn wrapped_export_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawl_results.json");
        std::fs::write(
            &path,
            r#"{"data":[{"markdown":"body","metadata":{"sourceURL":"https://signoz.io/docs/a/b","title":"B","pageStatusCode":200}}]}"#,
        )
        .unwrap();
        let pages = read_crawl_results(&path, &ChunkConfig::default()).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].url, "https://signoz.io/docs/a/b");
        assert_eq!(pages[0].description, "");
        assert_eq!(pages[0].tags, vec!["a"]);
    }

    #[test]
    fn og_fields_preferred() {
        let item: CrawlItem = serde_json::from_str(
            r#"{"markdown":"","metadata":{"ogUrl":"https://signoz.io/docs/x/","sourceURL":"https://signoz.io/docs/x","ogTitle":"OG","title":"Plain","pageStatusCode":200}}"#,
        )
        .unwrap();
        let page = item.into_page(&ChunkConfig::default()).unwrap();
        assert_eq!(page.url, "https://signoz.io/docs/x/");
        assert_eq!(page.title, "OG");
    }

    #[test]
    fn missing_title_names_url() {
        let item: CrawlItem = serde_json::from_str(
            r#"{"markdown":"","metadata":{"sourceURL":"https://signoz.io/docs/x","pageStatusCode":200}}"#,
        )
        .unwrap();
        let err = item.into_page(&ChunkConfig::default()).unwrap_err();
        assert_eq!(err.to_string(), "title not found for url: https://signoz.io/docs/x");
    }

    #[test]
    fn missing_status_is_error() {
        let item: CrawlItem = serde_json::from_str(
            r#"{"markdown":"","metadata":{"sourceURL":"https://signoz.io/docs/x","title":"X"}}"#,
        )
        .unwrap();
        assert!(matches!(
            item.into_page(&ChunkConfig::default()),
            Err(ChunkError::MissingField { field: "pageStatusCode", .. })
        ));
    }

    #[test]
    fn latest_file_by_name() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "crawl_results_2024-06-01_09-00-00.json",
            "crawl_results_2024-07-01_10-00-00.json",
            "chunks_2024-08-01_00-00-00.json",
        ] {
            std::fs::write(dir.path().join(name), "[]").unwrap();
        }
        let latest = latest_crawl_file(dir.path()).unwrap();
        assert!(latest.ends_with("crawl_results_2024-07-01_10-00-00.json"));
    }

    #[test]
    fn no_crawl_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(latest_crawl_file(dir.path()).is_err());
    }

    #[test]
    fn timestamp_from_name() {
        assert_eq!(
            timestamp_from_filename(Path::new("crawl_results_2024-07-01T10-00-00.json")).as_deref(),
            Some("2024-07-01_10-00-00")
        );
        assert_eq!(
            timestamp_from_filename(Path::new("out/crawl_results_2024-07-01_10-00-00.json")).as_deref(),
            Some("2024-07-01_10-00-00")
        );
        assert_eq!(timestamp_from_filename(Path::new("crawl_results.json")), None);
    }

    #[test]
    fn fallback_timestamp_has_batch_shape() {
        let ts = batch_timestamp(Path::new("crawl_results.json"));
        assert!(FILE_TIMESTAMP_RE.is_match(&ts));
    }
}
