use std::time::Duration;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, StatusCode};
use tracing::{info, warn};

use crate::parser::chunk::Chunk;

pub const BATCH_SIZE: usize = 120;
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;

const API_KEY_VAR: &str = "TRIEVE_API_KEY";
const DATASET_VAR_PREFIX: &str = "TRIEVE_DATASET_ID";

/// Where batches are sent.
#[derive(Debug, Clone)]
pub struct Target {
    pub base_url: String,
    /// Name of the environment variable the dataset id came from.
    pub dataset_name: String,
    pub dataset_id: String,
    pub api_key: String,
}

impl Target {
    /// Resolve the dataset and API key from the environment. The key is optional on dry runs.
    pub fn from_env(base_url: &str, dataset: Option<&str>, dry_run: bool) -> Result<Self> {
        let vars: Vec<(String, String)> = std::env::vars()
            .filter(|(k, _)| k.starts_with(DATASET_VAR_PREFIX))
            .collect();
        let (dataset_name, dataset_id) = choose_dataset(&vars, dataset)?;

        let api_key = match std::env::var(API_KEY_VAR) {
            Ok(key) => key,
            Err(_) if dry_run => String::new(),
            Err(_) => bail!("{} environment variable must be set", API_KEY_VAR),
        };

        Ok(Target {
            base_url: base_url.trim_end_matches('/').to_string(),
            dataset_name,
            dataset_id,
            api_key,
        })
    }

    fn chunk_endpoint(&self) -> String {
        format!("{}/api/chunk", self.base_url)
    }
}

/// Pick a `TRIEVE_DATASET_ID*` variable. `wanted` matches the full variable name or
/// its suffix (`boost` selects `TRIEVE_DATASET_ID_BOOST`); without it there must be exactly one.
pub fn choose_dataset(vars: &[(String, String)], wanted: Option<&str>) -> Result<(String, String)> {
    let mut names: Vec<&str> = vars.iter().map(|(k, _)| k.as_str()).collect();
    names.sort();

    let found = match wanted {
        Some(w) => {
            let suffixed = format!("{}_{}", DATASET_VAR_PREFIX, w.to_uppercase());
            vars.iter().find(|(k, _)| k == w || *k == suffixed)
        }
        None if vars.len() == 1 => vars.first(),
        None if vars.is_empty() => bail!("No {}* environment variable set", DATASET_VAR_PREFIX),
        None => bail!("Several datasets configured, choose one with --dataset: {}", names.join(", ")),
    };

    match found {
        Some((name, id)) if !id.is_empty() => Ok((name.clone(), id.clone())),
        Some((name, _)) => bail!("{} is empty", name),
        None => bail!(
            "Dataset {:?} not found among: {}",
            wanted.unwrap_or_default(),
            names.join(", ")
        ),
    }
}

/// Upload stats returned after completion.
#[derive(Debug, Default, PartialEq)]
pub struct LoadStats {
    pub batches: usize,
    pub chunks: usize,
}

/// Send `chunks` in sequential batches of [`BATCH_SIZE`].
pub async fn load_chunks(mut chunks: Vec<Chunk>, target: &Target, upsert: bool, dry_run: bool) -> Result<LoadStats> {
    for chunk in &mut chunks {
        chunk.upsert_by_tracking_id = Some(upsert);
    }
    let verb = if upsert { "upsert" } else { "create" };

    let client = Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .context("Failed to build HTTP client")?;

    let pb = ProgressBar::new(chunks.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let mut stats = LoadStats::default();
    for batch in chunks.chunks(BATCH_SIZE) {
        if dry_run {
            info!(
                "DRY RUN: would {} batch of {} chunks to {}",
                verb,
                batch.len(),
                target.dataset_name
            );
        } else {
            post_with_retry(&client, target, batch).await?;
            info!("{} batch of {} chunks to {}", verb, batch.len(), target.dataset_name);
        }
        stats.batches += 1;
        stats.chunks += batch.len();
        pb.inc(batch.len() as u64);
    }

    pb.finish_and_clear();
    Ok(stats)
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

async fn post_with_retry(client: &Client, target: &Target, batch: &[Chunk]) -> Result<()> {
    let mut attempt = 0;
    loop {
        let response = client
            .post(target.chunk_endpoint())
            .header("TR-Dataset", &target.dataset_id)
            .bearer_auth(&target.api_key)
            .json(batch)
            .send()
            .await
            .context("Chunk upload request failed")?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if !should_retry(status) || attempt == MAX_RETRIES {
            let body = response.text().await.unwrap_or_default();
            bail!("Chunk upload failed with status {}: {}", status, body);
        }

        let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
        warn!(
            "Upload got {} (attempt {}/{}), backing off {:.1}s",
            status,
            attempt + 1,
            MAX_RETRIES,
            backoff.as_secs_f64()
        );
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}

// ── Tests ──
