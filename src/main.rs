use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use propmirror_server::background_jobs::jobs::{DeltaUpdateJob, FullReconcileJob, VariantSweepJob};
use propmirror_server::background_jobs::{create_scheduler, JobContext};
use propmirror_server::config;
use propmirror_server::server::{run_server, ServerState};
use propmirror_server::store::{ActiveSetStore, ImageStore};
use propmirror_server::transcode::VariantService;
use propmirror_server::upstream::{HttpListingSource, ListingSource};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

fn parse_dir(s: &str) -> Result<PathBuf, String> {
    let path = parse_path(s)?;
    if !path.exists() {
        return Err(format!("Directory does not exist: {}", s));
    }
    if !path.is_dir() {
        return Err(format!("Path is not a directory: {}", s));
    }
    Ok(path)
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding the mirror state (images/ and the active-listing
    /// snapshot). Can also be specified in the config file.
    #[clap(long, value_parser = parse_dir)]
    pub data_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The maximum age of served images in client caches, in seconds.
    #[clap(long, default_value_t = 3600)]
    pub content_cache_age_sec: usize,

    /// Base URL of the upstream catalog query endpoint.
    #[clap(long)]
    pub upstream_url: Option<String>,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            data_dir: args.data_dir.clone(),
            port: args.port,
            content_cache_age_sec: args.content_cache_age_sec,
            upstream_url: args.upstream_url.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  data_dir: {:?}", app_config.data_dir);
    info!("  upstream: {}", app_config.upstream.base_url);
    info!("  port: {}", app_config.port);
    if app_config.upstream.bearer_token.is_empty() {
        info!(
            "  no upstream bearer token configured (set {} or upstream.bearer_token)",
            config::BEARER_TOKEN_ENV
        );
    }

    let images = Arc::new(ImageStore::new(app_config.images_dir())?);
    let active_set = Arc::new(ActiveSetStore::new(app_config.active_set_path()));
    info!(
        "  {} active listings, {} stored images",
        active_set.len()?,
        images.total_files()?
    );

    let source: Arc<dyn ListingSource> =
        Arc::new(HttpListingSource::new(&app_config.upstream)?);
    let variants = Arc::new(VariantService::new(
        Arc::clone(&images),
        app_config.transcoder.clone(),
    ));

    // Set up the background job scheduler
    let shutdown_token = CancellationToken::new();
    let job_context = JobContext::new(
        shutdown_token.child_token(),
        Arc::clone(&source),
        Arc::clone(&images),
        Arc::clone(&active_set),
        variants.cache(),
        app_config.upstream.clone(),
        app_config.sync.clone(),
    );
    let (mut scheduler, scheduler_handle) =
        create_scheduler(shutdown_token.clone(), job_context);

    scheduler.register_job(Arc::new(FullReconcileJob::from_settings(
        &app_config.background_jobs.full_reconcile,
    )));
    scheduler.register_job(Arc::new(DeltaUpdateJob::from_settings(
        &app_config.background_jobs.delta_update,
    )));
    scheduler.register_job(Arc::new(VariantSweepJob::from_settings(
        &app_config.background_jobs.variant_sweep,
    )));
    info!("Job scheduler initialized with {} job(s)", scheduler.job_count());

    let server_state = ServerState::new(
        images,
        active_set,
        variants,
        Some(scheduler_handle),
    );

    info!("Ready to serve at port {}!", app_config.port);

    // Run HTTP server and job scheduler concurrently
    tokio::select! {
        result = run_server(server_state, app_config.port, app_config.content_cache_age_sec) => {
            info!("HTTP server stopped: {:?}", result);
            shutdown_token.cancel();
            result
        },
        _ = scheduler.run() => {
            info!("Scheduler stopped");
            Ok(())
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            shutdown_token.cancel();
            // Give the scheduler a moment to shut down gracefully
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        }
    }
}
