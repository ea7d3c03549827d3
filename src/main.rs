//! Omnidict CLI - look a term up in several dictionaries at once.

use anyhow::{Context, Result};
use clap::Parser;
use omnidict::aggregator::{AggregateResult, Aggregator, LookupOptions};
use omnidict::config::Config;
use omnidict::console::{Console, plain_text};
use omnidict::dictionaries::{DictionaryRegistry, SourceId};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Multi-source dictionary lookup.
#[derive(Parser, Debug)]
#[command(name = "omnidict")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Word or phrase to look up.
    #[arg(required = true, num_args = 1..)]
    term: Vec<String>,

    /// Ignore cached entries and fetch every source again.
    #[arg(long)]
    refresh: bool,

    /// Only query these sources (defaults to the configured list).
    #[arg(long = "source", value_name = "ID")]
    sources: Vec<SourceId>,

    /// Strip markup from the output.
    #[arg(long, conflicts_with = "json")]
    plain: bool,

    /// Print the results as a JSON object keyed by source.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();
    let console = Console::new();

    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let sources = if args.sources.is_empty() {
        config.source_ids()?
    } else {
        args.sources.clone()
    };

    let registry = DictionaryRegistry::with_sources(&sources, &config.lookup)
        .context("Failed to set up dictionaries")?;
    let cache_dir = config.cache_dir()?;
    let aggregator = Aggregator::new(registry, &cache_dir, config.lookup.max_concurrent_lookups)
        .with_context(|| format!("Failed to open caches in {}", cache_dir.display()))?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let term = args.term.join(" ");
    let options = LookupOptions {
        force_refresh: args.refresh,
        cancel: Some(cancel),
    };
    let outcome = aggregator.lookup_with(&term, options).await;

    let printed = match outcome {
        Ok(results) => print_results(&console, &aggregator, &results, &args),
        Err(e) => Err(anyhow::Error::from(e).context(format!("Lookup for '{}' failed", term))),
    };

    aggregator.close().context("Failed to close caches")?;
    printed
}

fn print_results(
    console: &Console,
    aggregator: &Aggregator,
    results: &AggregateResult,
    args: &Args,
) -> Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }

    // The result map is unordered; print in configured order.
    for (id, name) in aggregator.source_names() {
        if let Some(html) = results.get(id) {
            let body = if args.plain {
                plain_text(html)
            } else {
                html.clone()
            };
            console.entry(name, &body);
        }
    }

    let hits: u64 = aggregator.cache_stats().values().map(|s| s.hits).sum();
    console.info(&console.muted(&format!(
        "{} sources, {} served from cache",
        results.len(),
        hits
    )));
    Ok(())
}
