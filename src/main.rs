use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use site_favicons::{
    config::{Config, LogFormat},
    database::{Database, repositories::SiteSeaOrmRepository},
    observability::init_tracing,
    services::{
        FaviconResolver, FaviconSettings, HttpFaviconResolver, ResolverSettings,
        SiteFaviconManager,
    },
};

#[derive(Parser)]
#[command(name = "site-favicons")]
#[command(version)]
#[command(about = "Discovers, caches and refreshes favicons for tenant sites")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Log level (overrides config file)
    #[arg(short = 'v', long)]
    log_level: Option<String>,

    /// Log output format (overrides config file)
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the favicon manager until interrupted (default)
    Run,
    /// Probe a single origin and report the icon it serves
    Resolve {
        /// Origin to probe, e.g. https://example.com
        origin: String,
    },
    /// Refresh every due site once, then exit
    Refresh,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_from_file(&cli.config)?;
    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }

    init_tracing(&config.logging.level, config.logging.format)?;
    info!("Starting site-favicons v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from: {}", cli.config);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Resolve { origin } => resolve(config, &origin).await,
        Command::Refresh => refresh(config).await,
    }
}

async fn build_manager(config: &Config) -> Result<SiteFaviconManager> {
    info!("Using database: {}", config.database.url);
    let database = Database::new(&config.database).await?;
    database.migrate().await?;

    let resolver = HttpFaviconResolver::new(ResolverSettings::from(&config.favicons))?;
    let repository = SiteSeaOrmRepository::new(database.connection());

    Ok(SiteFaviconManager::new(
        Arc::new(repository),
        Arc::new(resolver),
        FaviconSettings::from(&config.favicons),
    ))
}

async fn run(config: Config) -> Result<()> {
    let manager = build_manager(&config).await?;
    let shutdown = CancellationToken::new();

    let mut subscription = manager.subscribe();
    let event_logger = tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            info!(
                "Favicon updated for site {}: {}",
                event.site_id, event.favicon_url
            );
        }
    });

    manager.start(&shutdown);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    shutdown.cancel();
    manager.stop().await;
    event_logger.await?;
    Ok(())
}

async fn resolve(config: Config, origin: &str) -> Result<()> {
    let resolver = HttpFaviconResolver::new(ResolverSettings::from(&config.favicons))?;

    match resolver.resolve_asset(origin).await? {
        Some(asset) => {
            let source = if asset.source_url.starts_with("data:") {
                "inline data: URI"
            } else {
                asset.source_url.as_str()
            };
            println!("{source}");
            println!("  content type: {}", asset.content_type);
            println!("  size: {} bytes", asset.data.len());
        }
        None => println!("No favicon found for {origin}"),
    }
    Ok(())
}

async fn refresh(mut config: Config) -> Result<()> {
    config.favicons.scan_on_start = false;
    let manager = build_manager(&config).await?;
    let shutdown = CancellationToken::new();
    manager.start(&shutdown);

    let queued = manager.refresh_all().await;
    info!("Queued {} favicon fetches", queued);

    while !manager.is_idle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    manager.stop().await;
    info!("Favicon refresh complete");
    Ok(())
}
