use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// TOML configuration file. Every field is optional; values present in the
/// file override the corresponding CLI arguments.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub data_dir: Option<String>,
    pub port: Option<u16>,
    pub content_cache_age_sec: Option<usize>,

    pub upstream: Option<UpstreamConfig>,
    pub sync: Option<SyncConfig>,
    pub transcoder: Option<TranscoderConfig>,
    pub background_jobs: Option<BackgroundJobsConfig>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {:?}", path))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {:?}", path))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamConfig {
    pub base_url: Option<String>,
    pub bearer_token: Option<String>,
    pub page_size: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    /// Category sub-filters the authoritative scan is partitioned across.
    pub category_filters: Option<Vec<String>>,
    /// Region names, chunked into `region_chunk_size` slices per partition.
    pub regions: Option<Vec<String>>,
    pub region_chunk_size: Option<usize>,
    pub status_filter: Option<String>,
    /// Lower bound of the authoritative scan, RFC 3339.
    pub full_scan_start: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    pub max_attempts: Option<u32>,
    pub base_delay_secs: Option<u64>,
    pub max_delay_secs: Option<u64>,
    pub lookback_minutes: Option<i64>,
    pub safety_margin_minutes: Option<i64>,
    pub item_delay_ms: Option<u64>,
    pub download_concurrency: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranscoderConfig {
    pub quality_min: Option<u8>,
    pub quality_max: Option<u8>,
    pub max_attempts: Option<u32>,
    pub forced_fit_quality: Option<u8>,
    pub default_budget_bytes: Option<u64>,
    pub cache_ttl_secs: Option<u64>,
    pub cache_max_entries: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackgroundJobsConfig {
    pub full_reconcile: Option<FullReconcileJobConfig>,
    pub delta_update: Option<DeltaUpdateJobConfig>,
    pub variant_sweep: Option<VariantSweepJobConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FullReconcileJobConfig {
    pub interval_hours: Option<u64>,
    pub startup_delay_minutes: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeltaUpdateJobConfig {
    pub interval_minutes: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VariantSweepJobConfig {
    pub interval_minutes: Option<u64>,
}
