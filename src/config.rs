use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::ChunkError;

const DEFAULT_CONFIG_NAME: &str = "chunker";
const ENV_PREFIX: &str = "CHUNKER";

pub const HELP_FOOTER: &str = "If you have any questions or need any help in setting things up, join our slack community and ping us in `#help` channel.";

/// Everything the chunking core reads. Passed explicitly into every call.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    pub max_words: usize,
    pub max_depth: usize,
    pub boost: bool,
    pub semantic_boost_distance_factor: f64,
    pub fulltext_boost_factor: f64,
    pub root_url: String,
    /// Crawl batch identifier, stamped on every chunk of one run.
    pub timestamp: String,
    /// Path segment after which URL segments become tags.
    pub tag_segment: String,
    pub end_matter_markers: Vec<String>,
    /// Base URL of the ingestion API used by `load`.
    pub api_base_url: String,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        ChunkConfig {
            max_words: 500,
            max_depth: 3,
            boost: false,
            semantic_boost_distance_factor: 0.5,
            fulltext_boost_factor: 5.0,
            root_url: "https://signoz.io/".to_string(),
            timestamp: String::new(),
            tag_segment: "docs".to_string(),
            end_matter_markers: vec![
                "[](#get-help)".to_string(),
                "[Prev".to_string(),
                HELP_FOOTER.to_string(),
            ],
            api_base_url: "https://api.trieve.ai".to_string(),
        }
    }
}

impl ChunkConfig {
    /// Layered load: defaults, then the config file, then `CHUNKER_*` env vars.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };
        let settings = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to read chunker configuration")?;

        let cfg: ChunkConfig = settings
            .try_deserialize()
            .context("Failed to parse chunker configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.max_words == 0 {
            return Err(ChunkError::InvalidConfig("max_words must be greater than 0".into()));
        }
        if self.root_url.trim().is_empty() {
            return Err(ChunkError::InvalidConfig("root_url must not be empty".into()));
        }
        if self.end_matter_markers.iter().any(|m| m.is_empty()) {
            return Err(ChunkError::InvalidConfig("end_matter_markers must not contain empty strings".into()));
        }
        Ok(())
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }
}
