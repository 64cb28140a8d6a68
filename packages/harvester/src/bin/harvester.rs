//! Harvester CLI
//!
//! Crawls URLs through the validated proxy pool and queries the stored
//! corpus. Results are printed as JSON.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use harvester::{
    main_words, ContentType, Crawler, DiscoveryHistory, FileProxySource, HarvestConfig,
    HarvestContext, HarvestRequest, Harvester, HttpFetcher, HttpFileProbe, PageStore, ProxyPool,
    ProxyRecord, ProxyValidator, QueryEngine, QueryRequest, RefreshOutcome, SqliteStore,
};

#[derive(Parser)]
#[command(name = "harvester")]
#[command(about = "Proxy-validated crawler and local corpus search")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh proxies and crawl URLs
    Crawl {
        /// URL to crawl (repeatable)
        #[arg(long = "url")]
        urls: Vec<String>,

        /// File with one URL per line
        #[arg(long)]
        urls_file: Option<PathBuf>,
    },

    /// Query the stored pages
    Search {
        /// Search terms
        terms: Vec<String>,

        /// Free-text query, reduced to its main words
        #[arg(long)]
        query: Option<String>,

        /// Content type filter (repeatable)
        #[arg(long = "type")]
        types: Vec<ContentType>,

        /// Maximum results, 0 for unlimited
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Refresh the proxy pool and print the verified set
    Proxies,

    /// Create the page store schema
    Init,
}

#[derive(Serialize)]
struct ProxyResponse {
    outcome: String,
    proxies: Vec<ProxyRecord>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,harvester=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let cli = Cli::parse();
    let config = HarvestConfig::from_env().context("Failed to load configuration")?;
    tokio::fs::create_dir_all(config.data_dir())
        .await
        .with_context(|| format!("Failed to create {}", config.data_dir().display()))?;

    let ctx = HarvestContext::new(config);

    let cancel = ctx.cancel_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing in-flight work");
            cancel.cancel();
        }
    });

    match cli.command {
        Commands::Crawl { urls, urls_file } => crawl(&ctx, urls, urls_file).await,
        Commands::Search {
            terms,
            query,
            types,
            limit,
        } => search(&ctx, terms, query, types, limit).await,
        Commands::Proxies => proxies(&ctx).await,
        Commands::Init => {
            let store = open_store(&ctx).await?;
            let pages = store.count().await.context("Failed to count pages")?;
            print_json(&serde_json::json!({
                "database_url": ctx.config().database_url,
                "pages": pages,
            }))
        }
    }
}

async fn open_store(ctx: &HarvestContext) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::new(&ctx.config().database_url)
        .await
        .with_context(|| format!("Failed to open {}", ctx.config().database_url))?;
    Ok(Arc::new(store))
}

fn build_pool(ctx: &HarvestContext) -> ProxyPool {
    let config = ctx.config();
    ProxyPool::new(
        ProxyValidator::http(config.validator.clone()),
        Arc::new(FileProxySource::new(config.candidate_proxy_path())),
        config.pool.clone(),
    )
}

async fn crawl(
    ctx: &HarvestContext,
    mut urls: Vec<String>,
    urls_file: Option<PathBuf>,
) -> Result<()> {
    if let Some(path) = urls_file {
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        urls.extend(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string),
        );
    }

    let config = ctx.config();
    let store = open_store(ctx).await?;
    let crawler = Crawler::new(
        Arc::new(HttpFetcher::new(config.crawl.request_timeout())?),
        store.clone(),
        Arc::new(HttpFileProbe::new(config.crawl.file_check_timeout())?),
        config.crawl.clone(),
    );
    let harvester = Harvester::new(
        None,
        store,
        Arc::new(build_pool(ctx)),
        crawler,
        DiscoveryHistory::new(config.discovery_history_path()),
    );

    let report = harvester
        .run(ctx, HarvestRequest::urls(urls))
        .await
        .context("Harvest failed")?;

    match report {
        Some(report) => print_json(&report),
        None => print_json(&serde_json::json!({ "urls": [] })),
    }
}

async fn search(
    ctx: &HarvestContext,
    mut terms: Vec<String>,
    query: Option<String>,
    types: Vec<ContentType>,
    limit: Option<usize>,
) -> Result<()> {
    if let Some(query) = query {
        terms.extend(main_words(&query));
    }

    let mut request = QueryRequest::new()
        .with_terms(terms)
        .with_limit(limit.unwrap_or(ctx.config().query.default_limit));
    for content_type in types {
        request = request.with_content_type(content_type);
    }

    let engine = QueryEngine::new(open_store(ctx).await?, &ctx.config().query);
    let results = engine.search(ctx, &request).await;
    print_json(&results)
}

async fn proxies(ctx: &HarvestContext) -> Result<()> {
    let pool = build_pool(ctx);
    let outcome = pool.refresh(ctx).await.context("Proxy refresh failed")?;

    let outcome = match outcome {
        RefreshOutcome::KnownGood(n) => format!("known_good:{}", n),
        RefreshOutcome::Refilled(n) => format!("refilled:{}", n),
        RefreshOutcome::Exhausted => "exhausted".to_string(),
    };
    print_json(&ProxyResponse {
        outcome,
        proxies: pool.snapshot().proxies().to_vec(),
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
