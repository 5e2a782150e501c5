//! Aggregation, ranking and the search pipeline/session for netoffer.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use netoffer_core::{CanonicalOffer, ProviderId, SearchCriteria};
use netoffer_providers::{HttpOfferSource, OfferSource, ProviderRegistry, ProviderResponses, SourceError};
use netoffer_storage::{HttpClientConfig, OffersClient, ReportStore, RetryPolicy, DEFAULT_ENDPOINT};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "netoffer-search";

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub endpoint: String,
    pub http_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_retries: usize,
    pub user_agent: String,
    pub reports_dir: PathBuf,
    pub default_sort: RankingStrategy,
    pub workspace_root: PathBuf,
}

impl SearchConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str, default: u64| {
            var(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };
        let default_sort = match var("NETOFFER_DEFAULT_SORT") {
            Some(raw) => raw.parse().unwrap_or_else(|err| {
                warn!(error = %err, "ignoring NETOFFER_DEFAULT_SORT");
                RankingStrategy::default()
            }),
            None => RankingStrategy::default(),
        };

        Self {
            endpoint: var("NETOFFER_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            http_timeout_secs: parsed("NETOFFER_HTTP_TIMEOUT_SECS", 600),
            connect_timeout_secs: parsed("NETOFFER_CONNECT_TIMEOUT_SECS", 30),
            max_retries: parsed("NETOFFER_MAX_RETRIES", 2) as usize,
            user_agent: var("NETOFFER_USER_AGENT").unwrap_or_else(|| "netoffer/0.1".to_string()),
            reports_dir: var("NETOFFER_REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(ReportStore::default_root),
            default_sort,
            workspace_root: PathBuf::from("."),
        }
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            endpoint: self.endpoint.clone(),
            timeout: Duration::from_secs(self.http_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            retry: RetryPolicy {
                max_retries: self.max_retries,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// The registry file if present, otherwise every provider enabled.
    pub fn load_registry(&self) -> anyhow::Result<ProviderRegistry> {
        let path = self.workspace_root.join("providers.yaml");
        if !path.exists() {
            debug!(path = %path.display(), "no provider registry file, enabling all providers");
            return Ok(ProviderRegistry::default());
        }
        ProviderRegistry::load(&path)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RankingStrategy {
    #[default]
    PriceLowToHigh,
    SpeedHighToLow,
    BestValue,
    None,
}

impl RankingStrategy {
    pub const ALL: [RankingStrategy; 4] = [
        RankingStrategy::PriceLowToHigh,
        RankingStrategy::SpeedHighToLow,
        RankingStrategy::BestValue,
        RankingStrategy::None,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            RankingStrategy::PriceLowToHigh => "Price (Low to High)",
            RankingStrategy::SpeedHighToLow => "Speed (High to Low)",
            RankingStrategy::BestValue => "Best Value (Speed/Price)",
            RankingStrategy::None => "None",
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            RankingStrategy::PriceLowToHigh => "price",
            RankingStrategy::SpeedHighToLow => "speed",
            RankingStrategy::BestValue => "value",
            RankingStrategy::None => "none",
        }
    }
}

impl fmt::Display for RankingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown ranking strategy {0:?} (expected price, speed, value or none)")]
pub struct UnknownStrategy(String);

impl FromStr for RankingStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|r| r.token().eq_ignore_ascii_case(s) || r.display_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownStrategy(s.to_string()))
    }
}

/// Speed per euro; a non-positive price scores 0.0.
pub fn value_score(offer: &CanonicalOffer) -> f64 {
    let price = offer.price();
    if price <= Decimal::ZERO {
        return 0.0;
    }
    price
        .to_f64()
        .map(|p| f64::from(offer.speed()) / p)
        .unwrap_or(0.0)
}

/// Returns a newly ordered copy of `offers`. Stable: ties keep input order.
pub fn rank(offers: &[CanonicalOffer], strategy: RankingStrategy) -> Vec<CanonicalOffer> {
    let mut ranked = offers.to_vec();
    match strategy {
        RankingStrategy::PriceLowToHigh => ranked.sort_by(|a, b| a.price().cmp(&b.price())),
        RankingStrategy::SpeedHighToLow => ranked.sort_by(|a, b| b.speed().cmp(&a.speed())),
        RankingStrategy::BestValue => ranked.sort_by(|a, b| value_score(b).total_cmp(&value_score(a))),
        RankingStrategy::None => {}
    }
    ranked
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ProviderOutcome {
    Absent,
    Responded {
        received: usize,
        accepted: usize,
        rejected: usize,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    pub offers: Vec<CanonicalOffer>,
    pub outcomes: BTreeMap<ProviderId, ProviderOutcome>,
}

/// Normalizes every provider's records into one list, provider order then record order.
pub fn aggregate(responses: &ProviderResponses) -> Vec<CanonicalOffer> {
    aggregate_with_outcomes(responses, &ProviderRegistry::default()).offers
}

/// Like [`aggregate`], also reporting what each provider contributed.
///
/// Providers disabled in `registry` are treated as absent.
pub fn aggregate_with_outcomes(responses: &ProviderResponses, registry: &ProviderRegistry) -> Aggregation {
    let mut aggregation = Aggregation::default();

    for provider in ProviderId::ALL {
        let records = match responses.get(provider) {
            Some(records) if registry.is_enabled(provider) => records,
            Some(_) => {
                debug!(%provider, "provider disabled in registry, ignoring its offers");
                aggregation.outcomes.insert(provider, ProviderOutcome::Absent);
                continue;
            }
            None => {
                aggregation.outcomes.insert(provider, ProviderOutcome::Absent);
                continue;
            }
        };

        let undecodable = responses.undecodable(provider);
        let mut accepted = 0usize;
        let mut rejected = undecodable;
        for record in records {
            match record.normalize() {
                Ok(offer) => {
                    aggregation.offers.push(offer);
                    accepted += 1;
                }
                Err(err) => {
                    debug!(error = %err, "dropping provider offer");
                    rejected += 1;
                }
            }
        }

        aggregation.outcomes.insert(
            provider,
            ProviderOutcome::Responded {
                received: records.len() + undecodable,
                accepted,
                rejected,
            },
        );
    }

    aggregation
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("offer search failed: {0}")]
    Source(#[from] SourceError),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub search_id: Uuid,
    pub criteria: SearchCriteria,
    /// Aggregation order; rank before presenting.
    pub offers: Vec<CanonicalOffer>,
    pub outcomes: BTreeMap<ProviderId, ProviderOutcome>,
}

pub struct SearchPipeline {
    source: Box<dyn OfferSource>,
    registry: ProviderRegistry,
}

impl SearchPipeline {
    pub fn new(source: Box<dyn OfferSource>) -> Self {
        Self {
            source,
            registry: ProviderRegistry::default(),
        }
    }

    pub fn from_config(config: &SearchConfig) -> anyhow::Result<Self> {
        let client = OffersClient::new(config.http_client_config()).context("building offers client")?;
        let registry = config.load_registry()?;
        Ok(Self::new(Box::new(HttpOfferSource::new(client))).with_registry(registry))
    }

    pub fn with_registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Dispatch one search and aggregate the answers.
    ///
    /// Only a failed dispatch is an error; malformed provider records are dropped.
    pub async fn run(&self, criteria: SearchCriteria) -> Result<SearchOutcome, SearchError> {
        let search_id = Uuid::new_v4();
        let span = info_span!("offer_search", %search_id);
        self.run_with_id(search_id, criteria).instrument(span).await
    }

    async fn run_with_id(&self, search_id: Uuid, criteria: SearchCriteria) -> Result<SearchOutcome, SearchError> {
        let request = criteria.to_request();
        let responses = self.source.fetch(search_id, &request).await?;
        let Aggregation { offers, outcomes } = aggregate_with_outcomes(&responses, &self.registry);
        info!(offers = offers.len(), "offer search finished");
        Ok(SearchOutcome {
            search_id,
            criteria,
            offers,
            outcomes,
        })
    }
}

/// The latest search result plus the chosen strategy; the ranked view is
/// recomputed whenever either changes.
#[derive(Debug, Clone, Default)]
pub struct SearchSession {
    outcome: Option<SearchOutcome>,
    sequence: Option<u64>,
    strategy: RankingStrategy,
    ranked: Vec<CanonicalOffer>,
}

impl SearchSession {
    pub fn new(strategy: RankingStrategy) -> Self {
        Self {
            strategy,
            ..Default::default()
        }
    }

    pub fn strategy(&self) -> RankingStrategy {
        self.strategy
    }

    pub fn outcome(&self) -> Option<&SearchOutcome> {
        self.outcome.as_ref()
    }

    pub fn ranked(&self) -> &[CanonicalOffer] {
        &self.ranked
    }

    pub fn set_strategy(&mut self, strategy: RankingStrategy) {
        if strategy != self.strategy {
            self.strategy = strategy;
            self.recompute();
        }
    }

    /// Unconditionally installs `outcome` and forgets the last accepted sequence,
    /// so the next [`replace_if_newer`](Self::replace_if_newer) call starts a new ordering.
    pub fn replace(&mut self, outcome: SearchOutcome) {
        self.sequence = None;
        self.install(outcome);
    }

    /// Accepts `outcome` only if `sequence` is newer than the last accepted one.
    pub fn replace_if_newer(&mut self, sequence: u64, outcome: SearchOutcome) -> bool {
        if self.sequence.is_some_and(|current| sequence <= current) {
            debug!(sequence, search_id = %outcome.search_id, "ignoring stale search outcome");
            return false;
        }
        self.sequence = Some(sequence);
        self.install(outcome);
        true
    }

    fn install(&mut self, outcome: SearchOutcome) {
        self.outcome = Some(outcome);
        self.recompute();
    }

    fn recompute(&mut self) {
        self.ranked = match &self.outcome {
            Some(outcome) => rank(&outcome.offers, self.strategy),
            None => Vec::new(),
        };
    }
}
