//! `reel` command-line entry point.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reel_models::IdentityResolver;
use reel_pipeline::{metrics, MediaProducers, Pipeline, PipelineConfig, StageCache};
use reel_store::VideoStore;

#[derive(Debug, Parser)]
#[command(name = "reel", version, about = "Turn long videos into cached vertical highlight clips")]
struct Cli {
    /// SQLite database path (overrides REEL_DATABASE_PATH)
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every stage for a URL or local file and print the clip paths
    Process { source: String },
    /// Show which stages are cached for a source
    Status { source: String },
    /// Delete every cached record of a source
    Reset { source: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let cli = Cli::parse();

    let mut config = PipelineConfig::from_env();
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    config.validate()?;
    info!("Pipeline config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        metrics::init_prometheus(addr)?;
        info!(addr = %addr, "Serving Prometheus metrics");
    }

    let store = VideoStore::open(&config.database_path)
        .with_context(|| format!("opening {}", config.database_path.display()))?;
    let pipeline = Pipeline::new(StageCache::new(store), MediaProducers::from_config(&config))
        .with_resolver(IdentityResolver::new().with_content_hash(config.identity_content_hash))
        .with_max_clips(config.max_clips);

    match cli.command {
        Command::Process { source } => {
            let report = pipeline.run(&source).await?;
            for clip in &report.clips {
                if let Some(path) = &clip.clip_path {
                    println!("{}", path.display());
                }
                if let Some(caption) = &clip.caption {
                    println!("  {}", caption);
                }
            }
        }
        Command::Status { source } => {
            let (key, status) = pipeline.status(&source)?;
            println!("key         {}", key);
            println!("download    {}", done(status.downloaded));
            println!("transcribe  {}", done(status.transcribed));
            println!("highlights  {}", status.highlights);
            println!("clips       {}", status.cropped);
            if let Some(stage) = status.next_pending() {
                println!("next        {}", stage);
            }
        }
        Command::Reset { source } => {
            let (key, deleted) = pipeline.reset(&source)?;
            if deleted {
                println!("removed cached records for {}", key);
            } else {
                println!("nothing cached for {}", key);
            }
        }
    }

    Ok(())
}

fn done(complete: bool) -> &'static str {
    if complete {
        "done"
    } else {
        "pending"
    }
}

/// Colored output for dev, JSON when `LOG_FORMAT=json`. Logs go to stderr so
/// stdout only carries results.
fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("reel=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}
