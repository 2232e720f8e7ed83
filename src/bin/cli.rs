//! listwatch CLI
//!
//! Local entry point for creating watches and running checks.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use listwatch::{
    error::{AppError, Result},
    extract::ListDiffEngine,
    fetch::{
        BrowserPool, FetchOptions, FixtureFetcher, PageFetcher, RenderedFetcher, SmartFetcher,
        StaticFetcher,
    },
    models::{Config, SubscriptionStatus, WatchRequest},
    pipeline,
    selector::{PickReport, PickTarget, pick_element},
    services::{SubscriptionCheckCoordinator, advisor_from_config},
    storage::{LocalStorage, SubscriptionStore},
};
use scraper::Html;

/// listwatch - List Region Watcher
#[derive(Parser, Debug)]
#[command(
    name = "listwatch",
    version,
    about = "Watches list regions of web pages for new entries"
)]
struct Cli {
    /// Path to storage directory
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Path to config file (default: {storage_dir}/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start watching the region under a selector
    Watch {
        url: String,

        /// Selector of the list container
        #[arg(long)]
        selector: String,

        /// Display name (default: the page's domain)
        #[arg(long, default_value = "")]
        name: String,

        /// Minutes between checks
        #[arg(long)]
        interval: Option<u32>,
    },

    /// Check one subscription now
    Check { id: String },

    /// Check every due subscription
    Run,

    /// List subscriptions
    List {
        /// Only show subscriptions in this state (active, paused, broken)
        #[arg(long)]
        status: Option<String>,
    },

    /// Show recent check history
    History {
        id: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Generate a selector for an element on a page
    Pick {
        url: String,

        /// Pick the deepest element containing this text
        #[arg(long, conflicts_with = "href")]
        text: Option<String>,

        /// Pick the anchor with this href
        #[arg(long)]
        href: Option<String>,

        /// Climb this many ancestors from the picked element
        #[arg(long, default_value_t = 0)]
        up: usize,

        /// Read the page from a local file instead of fetching it
        #[arg(long)]
        html_file: Option<PathBuf>,
    },

    /// Pause scheduled checks
    Pause { id: String },

    /// Resume a paused subscription
    Resume { id: String },

    /// Validate configuration
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Config::load(path),
        None => {
            let path = cli.storage_dir.join("config.toml");
            if path.exists() {
                Ok(Config::load_or_default(&path))
            } else {
                Ok(Config::default())
            }
        }
    }
}

fn parse_status(status: &str) -> Result<SubscriptionStatus> {
    serde_json::from_value(serde_json::Value::String(status.to_lowercase()))
        .map_err(|_| AppError::validation(format!("unknown status: {status}")))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Static fetcher plus, when enabled, a rendering fallback over a browser pool.
fn build_fetcher(config: &Config) -> Result<(Arc<dyn PageFetcher>, Option<Arc<BrowserPool>>)> {
    let static_fetcher: Arc<dyn PageFetcher> = Arc::new(StaticFetcher::new(&config.fetch)?);
    let pool = browser_pool(config);

    let rendered = pool.as_ref().map(|pool| {
        Arc::new(RenderedFetcher::new(
            Arc::clone(pool),
            config.fetch.browser_timeout(),
            config.fetch.settle(),
        )) as Arc<dyn PageFetcher>
    });

    let fetcher = SmartFetcher::new(static_fetcher, rendered, config.content.clone());
    Ok((Arc::new(fetcher), pool))
}

#[cfg(feature = "chromium")]
fn browser_pool(config: &Config) -> Option<Arc<BrowserPool>> {
    if !config.fetch.enable_browser {
        return None;
    }
    let launcher = listwatch::fetch::ChromiumLauncher::new(&config.fetch, &config.pool);
    Some(Arc::new(BrowserPool::new(
        Arc::new(launcher),
        config.pool.clone(),
    )))
}

#[cfg(not(feature = "chromium"))]
fn browser_pool(config: &Config) -> Option<Arc<BrowserPool>> {
    if config.fetch.enable_browser {
        log::warn!("Browser rendering requested but this build has no chromium support");
    }
    None
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli)?;
    log::debug!("Using storage directory {}", cli.storage_dir.display());

    if let Command::Validate = cli.command {
        if let Err(e) = config.validate() {
            log::error!("Config validation failed: {}", e);
            return Err(e);
        }
        log::info!("✓ Config OK");
        return Ok(());
    }
    config.validate()?;

    let storage = Arc::new(LocalStorage::new(&cli.storage_dir));
    let (fetcher, pool) = build_fetcher(&config)?;
    if let Some(pool) = &pool {
        pool.init().await?;
    }

    let result = execute(cli.command, &config, fetcher, storage).await;

    if let Some(pool) = &pool {
        let stats = pool.stats().await;
        log::debug!(
            "Browser pool: {} launched, {} pages opened",
            stats.browsers_launched,
            stats.pages_opened
        );
        pool.shutdown().await;
    }
    result
}

async fn execute(
    command: Command,
    config: &Config,
    fetcher: Arc<dyn PageFetcher>,
    storage: Arc<LocalStorage>,
) -> Result<()> {
    let engine = ListDiffEngine::new(Arc::clone(&fetcher), config.extract.clone());
    let coordinator = || -> Result<SubscriptionCheckCoordinator> {
        Ok(SubscriptionCheckCoordinator::new(
            ListDiffEngine::new(Arc::clone(&fetcher), config.extract.clone()),
            storage.clone(),
            storage.clone(),
            advisor_from_config(&config.advisor)?,
            config.check.clone(),
        ))
    };

    match command {
        Command::Watch {
            url,
            selector,
            name,
            interval,
        } => {
            let request = WatchRequest {
                url,
                selector,
                name,
                check_interval_mins: interval,
            };
            let outcome = coordinator()?.initialize_watch(request).await?;
            print_json(&outcome)?;
            if !outcome.success {
                return Err(AppError::validation(outcome.error.unwrap_or_default()));
            }
        }

        Command::Check { id } => {
            let outcome = coordinator()?.check_subscription(&id).await?;
            print_json(&outcome)?;
        }

        Command::Run => {
            let summary =
                pipeline::run_due_checks(&coordinator()?, storage.as_ref(), &config.check).await?;
            print_json(&summary)?;
        }

        Command::List { status } => {
            let status = status.as_deref().map(parse_status).transpose()?;
            let subscriptions = storage.list_subscriptions(status).await?;
            for sub in &subscriptions {
                println!(
                    "{}  {:<7}  {:<7}  {}  ({})",
                    sub.id, sub.status, sub.render_type, sub.url, sub.name
                );
                if let Some(error) = &sub.error_message {
                    println!("    {error}");
                }
            }
            log::info!("{} subscriptions", subscriptions.len());
        }

        Command::History { id, limit } => {
            let rows = storage.list_history(&id, limit).await?;
            print_json(&rows)?;
        }

        Command::Pick {
            url,
            text,
            href,
            up,
            html_file,
        } => {
            let target = match (text, href) {
                (Some(text), _) => PickTarget::Text(text),
                (None, Some(href)) => PickTarget::Href(href),
                (None, None) => {
                    return Err(AppError::validation("pick needs --text or --href"));
                }
            };

            let engine = match html_file {
                Some(path) => ListDiffEngine::new(
                    Arc::new(FixtureFetcher::from_file(&url, path)?),
                    config.extract.clone(),
                ),
                None => engine,
            };
            let page = engine.fetch_page(&url, &FetchOptions::default()).await;
            if !page.success {
                return Err(AppError::validation(page.describe_error()));
            }

            let report = {
                let document = Html::parse_document(&page.content);
                let element = pick_element(&document, &target, up)
                    .ok_or_else(|| AppError::validation("no element matches the pick target"))?;
                PickReport::for_element(&document, element)
            };
            print_json(&report)?;

            let preview = engine.extract_list(&page.content, &url, &report.simplified);
            if preview.success {
                log::info!("Selector extracts {} URLs:", preview.urls.len());
                for url in preview.urls.iter().take(10) {
                    println!("  {url}");
                }
            } else {
                log::warn!(
                    "Selector extracts nothing: {}",
                    preview.error.unwrap_or_default()
                );
            }
        }

        Command::Pause { id } => {
            if coordinator()?.pause(&id).await? {
                log::info!("Paused {}", id);
            } else {
                log::warn!("{} is not active", id);
            }
        }

        Command::Resume { id } => {
            if coordinator()?.resume(&id).await? {
                log::info!("Resumed {}", id);
            } else {
                log::warn!("{} is not paused", id);
            }
        }

        Command::Validate => {}
    }

    Ok(())
}
