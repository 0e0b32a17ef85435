//! `almanac`: pulls every configured source, derives images once and writes
//! a snapshot plus its indexes.
//!
//! ```bash
//! almanac --config ./almanac.toml sync
//! almanac sync --dry-run
//! almanac reindex
//! ```

mod error;

use crate::error::{ErrorKind, Result};
use almanac_cache::{DownloadCache, FetcherHandle, HttpFetcher};
use almanac_config::{Config, Publish};
use almanac_library::{Context, sources};
use almanac_media::MediaPipeline;
use almanac_model::TagFilter;
use almanac_storage::BackendHandle;
use almanac_storage::backend::{LocalBackend, ReadOnlyBackend};
use clap::{Parser, Subcommand};
use exn::ResultExt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};
use url::Url;

#[derive(Parser)]
#[command(name = "almanac", version, about)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON). Defaults to `almanac.toml`
    /// in the platform config directory.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless `RUST_LOG` says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load every source and write a new snapshot and indexes
    Sync {
        /// Log uploads and output writes instead of performing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Rebuild the index documents from the last snapshot
    Reindex,
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry().with(filter).with(fmt::layer().with_target(false)).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = ?err, "{err}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let output = local("output", &config.paths.output)?;

    match cli.command {
        Command::Sync { dry_run } => {
            let (output, publish) = if dry_run {
                tracing::info!("Dry run: nothing will be uploaded or written");
                let output: BackendHandle = Arc::new(ReadOnlyBackend::new(output));
                let publish: BackendHandle = Arc::new(ReadOnlyBackend::new(publish_target(&config).await?));
                (output, publish)
            } else {
                (output, publish_target(&config).await?)
            };
            let ctx = context(&config, publish)?;
            let loaders = sources::loaders(&config.sources);
            let report = almanac_library::sync(Arc::new(ctx), loaders, &output).await.or_raise(|| ErrorKind::Sync)?;
            for name in report.fell_back() {
                tracing::warn!(source = name, "Source kept its previous data");
            }
        },
        Command::Reindex => {
            almanac_library::reindex(&output).await.or_raise(|| ErrorKind::Reindex)?;
        },
    }
    Ok(())
}

fn local(name: &'static str, root: &std::path::Path) -> Result<BackendHandle> {
    let backend = LocalBackend::new(name, root).or_raise(|| ErrorKind::Storage(name))?;
    Ok(Arc::new(backend))
}

async fn publish_target(config: &Config) -> Result<BackendHandle> {
    match &config.publish {
        Publish::Local { path } => local("publish", path),
        #[cfg(feature = "s3")]
        Publish::S3 {
            bucket,
            prefix,
            region,
            endpoint,
            key_id,
            key_secret,
            public_read,
        } => {
            let backend = almanac_storage::backend::S3Backend::new(
                "publish",
                bucket,
                prefix.clone(),
                region,
                endpoint.as_deref(),
                key_id,
                key_secret,
            )
            .await
            .or_raise(|| ErrorKind::Storage("publish"))?
            .with_public_read(*public_read);
            Ok(Arc::new(backend))
        },
        #[cfg(not(feature = "s3"))]
        Publish::S3 { .. } => {
            tracing::error!("S3 publishing requires the `s3` feature");
            exn::bail!(ErrorKind::Storage("publish"))
        },
    }
}

fn context(config: &Config, publish: BackendHandle) -> Result<Context> {
    let fetcher: FetcherHandle = Arc::new(
        HttpFetcher::new(&config.http.user_agent, Duration::from_secs(config.http.timeout_secs))
            .or_raise(|| ErrorKind::Client)?,
    );
    let mut cache = DownloadCache::new(fetcher.clone(), local("cache", &config.paths.cache)?);
    if let Some(base) = &config.media.source_base_url {
        cache = cache.with_base_url(Url::parse(base).or_raise(|| ErrorKind::Config)?);
    }
    let media = MediaPipeline::new(
        cache,
        publish,
        config.public_base_url.as_str(),
        config.media.variants.clone(),
        config.media.concurrency,
    );
    let content = local("content", &config.paths.content)?;
    Ok(Context::new(media, fetcher, content, TagFilter::new(&config.tags.deny)))
}
