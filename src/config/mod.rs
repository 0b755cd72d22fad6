mod file_config;

pub use file_config::{
    BackgroundJobsConfig, DeltaUpdateJobConfig, FileConfig, FullReconcileJobConfig, SyncConfig,
    TranscoderConfig, UpstreamConfig, VariantSweepJobConfig,
};

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};

use crate::retry::RetryConfig;
use crate::transcode::TranscodeSettings;
use crate::upstream::filter::{build_partitions, Partition};

/// Environment variable consulted when the config file carries no token.
pub const BEARER_TOKEN_ENV: &str = "UPSTREAM_BEARER_TOKEN";

/// CLI arguments that take part in config resolution. Mirrors the subset of
/// the CLI that the TOML file can override.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub data_dir: Option<PathBuf>,
    pub port: u16,
    pub content_cache_age_sec: usize,
    pub upstream_url: Option<String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            port: 3001,
            content_cache_age_sec: 3600,
            upstream_url: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub port: u16,
    pub content_cache_age_sec: usize,

    pub upstream: UpstreamSettings,
    pub sync: SyncSettings,
    pub transcoder: TranscoderSettings,
    pub background_jobs: BackgroundJobsSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file
    /// config. TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .or_else(|| cli.data_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("data_dir must be specified via --data-dir or in config file")
            })?;
        if !data_dir.exists() {
            bail!("Data directory does not exist: {:?}", data_dir);
        }
        if !data_dir.is_dir() {
            bail!("data_dir is not a directory: {:?}", data_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let content_cache_age_sec = file
            .content_cache_age_sec
            .unwrap_or(cli.content_cache_age_sec);

        let up_file = file.upstream.unwrap_or_default();
        let base_url = up_file
            .base_url
            .or_else(|| cli.upstream_url.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "upstream base URL must be specified via --upstream-url or in config file"
                )
            })?;
        let bearer_token = match up_file.bearer_token {
            Some(token) => token,
            None => std::env::var(BEARER_TOKEN_ENV).unwrap_or_default(),
        };
        let full_scan_start = up_file
            .full_scan_start
            .as_deref()
            .unwrap_or("2024-01-01T00:00:00Z")
            .parse::<DateTime<Utc>>()
            .context("parsing upstream.full_scan_start")?;
        let upstream = UpstreamSettings {
            base_url,
            bearer_token,
            page_size: up_file.page_size.unwrap_or(500).clamp(1, 500),
            request_timeout_secs: up_file.request_timeout_secs.unwrap_or(30),
            category_filters: up_file.category_filters.unwrap_or_default(),
            regions: up_file.regions.unwrap_or_default(),
            region_chunk_size: up_file.region_chunk_size.unwrap_or(15),
            status_filter: up_file.status_filter.unwrap_or_else(|| {
                "ContractStatus eq 'Available' and StandardStatus eq 'Active'".to_string()
            }),
            full_scan_start,
        };

        let sync_file = file.sync.unwrap_or_default();
        let sync_defaults = SyncSettings::default();
        let sync = SyncSettings {
            retry: RetryConfig {
                max_attempts: sync_file
                    .max_attempts
                    .unwrap_or(sync_defaults.retry.max_attempts),
                base_delay_secs: sync_file
                    .base_delay_secs
                    .unwrap_or(sync_defaults.retry.base_delay_secs),
                max_delay_secs: sync_file
                    .max_delay_secs
                    .unwrap_or(sync_defaults.retry.max_delay_secs),
            },
            lookback_minutes: sync_file
                .lookback_minutes
                .unwrap_or(sync_defaults.lookback_minutes),
            safety_margin_minutes: sync_file
                .safety_margin_minutes
                .unwrap_or(sync_defaults.safety_margin_minutes),
            item_delay_ms: sync_file
                .item_delay_ms
                .unwrap_or(sync_defaults.item_delay_ms),
            download_concurrency: sync_file
                .download_concurrency
                .unwrap_or(sync_defaults.download_concurrency)
                .max(1),
        };
        if sync.safety_margin_minutes >= sync.lookback_minutes {
            bail!(
                "sync.safety_margin_minutes ({}) must be smaller than sync.lookback_minutes ({})",
                sync.safety_margin_minutes,
                sync.lookback_minutes
            );
        }

        let tc_file = file.transcoder.unwrap_or_default();
        let tc_defaults = TranscoderSettings::default();
        let search_defaults = TranscodeSettings::default();
        let transcoder = TranscoderSettings {
            search: TranscodeSettings {
                quality_min: tc_file.quality_min.unwrap_or(search_defaults.quality_min),
                quality_max: tc_file.quality_max.unwrap_or(search_defaults.quality_max),
                max_attempts: tc_file.max_attempts.unwrap_or(search_defaults.max_attempts),
                forced_fit_quality: tc_file
                    .forced_fit_quality
                    .unwrap_or(search_defaults.forced_fit_quality),
            },
            default_budget_bytes: tc_file
                .default_budget_bytes
                .unwrap_or(tc_defaults.default_budget_bytes),
            cache_ttl_secs: tc_file.cache_ttl_secs.unwrap_or(tc_defaults.cache_ttl_secs),
            cache_max_entries: tc_file
                .cache_max_entries
                .unwrap_or(tc_defaults.cache_max_entries),
        };
        if transcoder.search.quality_min > transcoder.search.quality_max {
            bail!("transcoder.quality_min must not exceed transcoder.quality_max");
        }

        let jobs_file = file.background_jobs.unwrap_or_default();
        let jobs_defaults = BackgroundJobsSettings::default();

        let fr_file = jobs_file.full_reconcile.unwrap_or_default();
        let full_reconcile = FullReconcileJobSettings {
            interval_hours: fr_file
                .interval_hours
                .unwrap_or(jobs_defaults.full_reconcile.interval_hours),
            startup_delay_minutes: fr_file
                .startup_delay_minutes
                .unwrap_or(jobs_defaults.full_reconcile.startup_delay_minutes),
        };
        let du_file = jobs_file.delta_update.unwrap_or_default();
        let delta_update = DeltaUpdateJobSettings {
            interval_minutes: du_file
                .interval_minutes
                .unwrap_or(jobs_defaults.delta_update.interval_minutes),
        };
        let vs_file = jobs_file.variant_sweep.unwrap_or_default();
        let variant_sweep = VariantSweepJobSettings {
            interval_minutes: vs_file
                .interval_minutes
                .unwrap_or(jobs_defaults.variant_sweep.interval_minutes),
        };

        Ok(Self {
            data_dir,
            port,
            content_cache_age_sec,
            upstream,
            sync,
            transcoder,
            background_jobs: BackgroundJobsSettings {
                full_reconcile,
                delta_update,
                variant_sweep,
            },
        })
    }

    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join("images")
    }

    pub fn active_set_path(&self) -> PathBuf {
        self.data_dir.join("active_listings.json")
    }
}

/// Settings for the upstream catalog connection and the shape of the
/// authoritative scan.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub base_url: String,
    pub bearer_token: String,
    pub page_size: usize,
    pub request_timeout_secs: u64,
    pub category_filters: Vec<String>,
    pub regions: Vec<String>,
    pub region_chunk_size: usize,
    pub status_filter: String,
    pub full_scan_start: DateTime<Utc>,
}

impl UpstreamSettings {
    /// The fixed partition list the reconciler scans over.
    pub fn partitions(&self) -> Vec<Partition> {
        build_partitions(
            &self.category_filters,
            &self.regions,
            self.region_chunk_size,
            &self.status_filter,
        )
    }
}

/// Settings shared by the sync paths: retries, delta window margins and the
/// downloader's pacing.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub retry: RetryConfig,
    pub lookback_minutes: i64,
    pub safety_margin_minutes: i64,
    pub item_delay_ms: u64,
    pub download_concurrency: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            lookback_minutes: 8,
            safety_margin_minutes: 3,
            item_delay_ms: 100,
            download_concurrency: 1,
        }
    }
}

/// Settings for the transcoder and its variant cache.
#[derive(Debug, Clone)]
pub struct TranscoderSettings {
    pub search: TranscodeSettings,
    pub default_budget_bytes: u64,
    pub cache_ttl_secs: u64,
    pub cache_max_entries: usize,
}

impl Default for TranscoderSettings {
    fn default() -> Self {
        Self {
            search: TranscodeSettings::default(),
            default_budget_bytes: 100 * 1024,
            cache_ttl_secs: 3600,
            cache_max_entries: 256,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BackgroundJobsSettings {
    pub full_reconcile: FullReconcileJobSettings,
    pub delta_update: DeltaUpdateJobSettings,
    pub variant_sweep: VariantSweepJobSettings,
}

/// Settings for the full reconciliation job.
#[derive(Debug, Clone)]
pub struct FullReconcileJobSettings {
    pub interval_hours: u64,
    pub startup_delay_minutes: u64,
}

impl Default for FullReconcileJobSettings {
    fn default() -> Self {
        Self {
            interval_hours: 24,
            startup_delay_minutes: 1,
        }
    }
}

/// Settings for the delta update job.
#[derive(Debug, Clone)]
pub struct DeltaUpdateJobSettings {
    pub interval_minutes: u64,
}

impl Default for DeltaUpdateJobSettings {
    fn default() -> Self {
        Self {
            interval_minutes: 5,
        }
    }
}

/// Settings for the variant cache sweep job.
#[derive(Debug, Clone)]
pub struct VariantSweepJobSettings {
    pub interval_minutes: u64,
}

impl Default for VariantSweepJobSettings {
    fn default() -> Self {
        Self {
            interval_minutes: 10,
        }
    }
}
