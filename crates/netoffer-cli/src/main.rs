//! netoffer CLI - internet offer comparison
//!
//! Usage:
//!   netoffer search --street S --number N --city C --zip Z [--sort value] [--export]
//!   netoffer render --input response.json --street S --number N --city C --zip Z
//!   netoffer strategies
//!   netoffer providers

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use netoffer_core::{Address, CanonicalOffer, ConnectionType, Country, ProviderId, SearchCriteria};
use netoffer_providers::load_fixture_responses;
use netoffer_report::render_at;
use netoffer_search::{
    aggregate_with_outcomes, ProviderOutcome, RankingStrategy, SearchConfig, SearchOutcome, SearchPipeline,
    SearchSession,
};
use netoffer_storage::{ReportStore, StoredReport};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "netoffer")]
#[command(about = "Compare internet offers for an address and export them as an HTML report")]
struct Cli {
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Query the aggregation endpoint and print the ranked offers
    Search {
        #[command(flatten)]
        query: QueryArgs,

        /// Also write the HTML report
        #[arg(long)]
        export: bool,

        /// Report directory (default: NETOFFER_REPORTS_DIR or Downloads)
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Print the ranked result as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Build a report offline from a saved endpoint response
    Render {
        #[arg(long)]
        input: PathBuf,

        #[command(flatten)]
        query: QueryArgs,

        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// List ranking strategies
    Strategies,
    /// List providers and whether they are enabled
    Providers,
}

#[derive(Debug, Clone, Args)]
struct QueryArgs {
    #[arg(long)]
    street: String,

    #[arg(long)]
    number: String,

    #[arg(long)]
    city: String,

    #[arg(long)]
    zip: String,

    /// AT, DE or CH
    #[arg(long, default_value = "AT")]
    country: Country,

    /// fiber, dsl, cable or mobile
    #[arg(long)]
    connection: Option<ConnectionType>,

    /// true or false
    #[arg(long)]
    installation: Option<bool>,

    /// price, speed, value or none
    #[arg(long)]
    sort: Option<RankingStrategy>,
}

impl QueryArgs {
    fn criteria(&self) -> SearchCriteria {
        SearchCriteria {
            address: Address {
                street: self.street.trim().to_string(),
                number: self.number.trim().to_string(),
                city: self.city.trim().to_string(),
                zip: self.zip.trim().to_string(),
                country: self.country,
            },
            connection_type: self.connection,
            installation_service: self.installation,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RankedOutput<'a> {
    search_id: String,
    strategy: RankingStrategy,
    criteria: &'a SearchCriteria,
    offers: &'a [CanonicalOffer],
    outcomes: &'a BTreeMap<ProviderId, ProviderOutcome>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr).compact())
        .init();

    let config = SearchConfig::from_env();

    match cli.command {
        Commands::Search {
            query,
            export,
            out_dir,
            json,
        } => cmd_search(&config, &query, export, out_dir, json).await,
        Commands::Render { input, query, out_dir } => {
            let stored = cmd_render(&config, &input, &query, out_dir).await?;
            println!("report saved to {} ({} bytes)", stored.path.display(), stored.byte_size);
            Ok(())
        }
        Commands::Strategies => {
            for strategy in RankingStrategy::ALL {
                let marker = if strategy == config.default_sort { " (default)" } else { "" };
                println!("{:<6} {}{}", strategy.token(), strategy.display_name(), marker);
            }
            Ok(())
        }
        Commands::Providers => {
            let registry = config.load_registry()?;
            for provider in ProviderId::ALL {
                let state = if registry.is_enabled(provider) { "enabled" } else { "disabled" };
                println!("{:<12} {:<13} {}", provider.wire_key(), provider.display_name(), state);
            }
            Ok(())
        }
    }
}

async fn cmd_search(
    config: &SearchConfig,
    query: &QueryArgs,
    export: bool,
    out_dir: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let criteria = query.criteria();
    let pipeline = SearchPipeline::from_config(config)?;
    let outcome = pipeline
        .run(criteria.clone())
        .await
        .with_context(|| format!("searching offers for {}", criteria.address.formatted()))?;

    let mut session = SearchSession::new(query.sort.unwrap_or(config.default_sort));
    session.replace(outcome);
    let Some(outcome) = session.outcome() else {
        return Ok(());
    };

    if json {
        print_json(&RankedOutput {
            search_id: outcome.search_id.to_string(),
            strategy: session.strategy(),
            criteria: &criteria,
            offers: session.ranked(),
            outcomes: &outcome.outcomes,
        })?;
    } else {
        print_table(outcome, session.ranked(), session.strategy());
    }

    if export {
        let stored = export_report(config, &criteria, session.ranked(), out_dir).await?;
        eprintln!("report saved to {}", stored.path.display());
    }
    Ok(())
}

async fn cmd_render(
    config: &SearchConfig,
    input: &Path,
    query: &QueryArgs,
    out_dir: Option<PathBuf>,
) -> Result<StoredReport> {
    let responses = load_fixture_responses(input)?;
    let registry = config.load_registry()?;
    let aggregation = aggregate_with_outcomes(&responses, &registry);
    let strategy = query.sort.unwrap_or(config.default_sort);
    let ranked = netoffer_search::rank(&aggregation.offers, strategy);
    info!(input = %input.display(), offers = ranked.len(), %strategy, "rendering saved response");
    export_report(config, &query.criteria(), &ranked, out_dir).await
}

async fn export_report(
    config: &SearchConfig,
    criteria: &SearchCriteria,
    ranked: &[CanonicalOffer],
    out_dir: Option<PathBuf>,
) -> Result<StoredReport> {
    let document = render_at(criteria, ranked, chrono::Local::now().naive_local()).context("rendering report")?;
    let store = ReportStore::new(out_dir.unwrap_or_else(|| config.reports_dir.clone()));
    store
        .save(&document.file_name, document.content.as_bytes())
        .await
        .with_context(|| format!("saving report into {}", store.root().display()))
}

fn print_json(output: &RankedOutput<'_>) -> Result<()> {
    let text = serde_json::to_string_pretty(output).context("serializing ranked offers")?;
    println!("{text}");
    Ok(())
}

fn print_table(outcome: &SearchOutcome, ranked: &[CanonicalOffer], strategy: RankingStrategy) {
    println!("{}", outcome.criteria.address.formatted());
    println!("sorted by {strategy}, {} offers", ranked.len());
    for (index, offer) in ranked.iter().enumerate() {
        println!(
            "{:>3}. {:<13} {:<32} {:>5} Mbps  {:<6} €{:.2}/month",
            index + 1,
            offer.name_info().company.display_name(),
            offer.name_info().offer_name,
            offer.speed(),
            offer.connection_type().as_str(),
            offer.price()
        );
    }
    for (provider, provider_outcome) in &outcome.outcomes {
        match provider_outcome {
            ProviderOutcome::Absent => println!("  {provider}: no response"),
            ProviderOutcome::Responded {
                received,
                accepted,
                rejected,
            } => println!("  {provider}: {accepted}/{received} offers usable, {rejected} rejected"),
        }
    }
}
