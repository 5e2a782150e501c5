//! Provider payload models, normalizers and the offer-source contract.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use netoffer_core::{CanonicalOffer, ConnectionType, InvalidOffer, OffersRequest, ProviderId};
use netoffer_storage::{FetchError, OffersClient};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

mod byte_me;
mod ping_perfect;
mod servus_speed;
mod verbyn_dich;
mod web_wunder;

pub use byte_me::ByteMeOffer;
pub use ping_perfect::{PingPerfectOffer, PingPerfectPricing};
pub use servus_speed::{ServusSpeedOffer, ServusSpeedPricing};
pub use verbyn_dich::VerbynDichOffer;
pub use web_wunder::{AbsoluteVoucher, PercentageVoucher, WebWunderOffer, WebWunderProductInfo, WebWunderVoucher};

pub const CRATE_NAME: &str = "netoffer-providers";

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("{provider}: missing required field `{field}`")]
    MissingField {
        provider: ProviderId,
        field: &'static str,
    },
    #[error("{provider}: unknown connection type {value:?}")]
    UnknownConnectionType { provider: ProviderId, value: String },
    #[error("{provider}: record flagged invalid by the provider")]
    FlaggedInvalid { provider: ProviderId },
    #[error("{provider}: {source}")]
    Invalid {
        provider: ProviderId,
        #[source]
        source: InvalidOffer,
    },
}

/// One normalization function per provider payload shape.
pub trait NormalizeOffer {
    const PROVIDER: ProviderId;

    fn normalize(&self) -> Result<CanonicalOffer, NormalizeError>;
}

/// A provider-native offer record, tagged by the provider it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOffer {
    ServusSpeed(ServusSpeedOffer),
    ByteMe(ByteMeOffer),
    PingPerfect(PingPerfectOffer),
    VerbynDich(VerbynDichOffer),
    WebWunder(WebWunderOffer),
}

impl ProviderOffer {
    pub fn provider(&self) -> ProviderId {
        match self {
            ProviderOffer::ServusSpeed(_) => ServusSpeedOffer::PROVIDER,
            ProviderOffer::ByteMe(_) => ByteMeOffer::PROVIDER,
            ProviderOffer::PingPerfect(_) => PingPerfectOffer::PROVIDER,
            ProviderOffer::VerbynDich(_) => VerbynDichOffer::PROVIDER,
            ProviderOffer::WebWunder(_) => WebWunderOffer::PROVIDER,
        }
    }

    pub fn normalize(&self) -> Result<CanonicalOffer, NormalizeError> {
        match self {
            ProviderOffer::ServusSpeed(offer) => offer.normalize(),
            ProviderOffer::ByteMe(offer) => offer.normalize(),
            ProviderOffer::PingPerfect(offer) => offer.normalize(),
            ProviderOffer::VerbynDich(offer) => offer.normalize(),
            ProviderOffer::WebWunder(offer) => offer.normalize(),
        }
    }

    /// Decode one raw record into the shape of `provider`.
    pub fn decode(provider: ProviderId, value: JsonValue) -> Result<Self, serde_json::Error> {
        Ok(match provider {
            ProviderId::ServusSpeed => ProviderOffer::ServusSpeed(serde_json::from_value(value)?),
            ProviderId::ByteMe => ProviderOffer::ByteMe(serde_json::from_value(value)?),
            ProviderId::PingPerfect => ProviderOffer::PingPerfect(serde_json::from_value(value)?),
            ProviderId::VerbynDich => ProviderOffer::VerbynDich(serde_json::from_value(value)?),
            ProviderId::WebWunder => ProviderOffer::WebWunder(serde_json::from_value(value)?),
        })
    }
}

/// Maps provider-native connection strings onto the canonical enum.
///
/// Anything not listed is rejected: an offer with an unrecognized connection
/// type is excluded rather than guessed.
pub fn map_connection_type(raw: &str) -> Option<ConnectionType> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "DSL" | "VDSL" | "ADSL" => Some(ConnectionType::Dsl),
        "FIBER" | "FIBRE" | "GLASFASER" | "FTTH" => Some(ConnectionType::Fiber),
        "CABLE" | "KABEL" => Some(ConnectionType::Cable),
        "MOBILE" | "LTE" | "4G" | "5G" => Some(ConnectionType::Mobile),
        _ => None,
    }
}

pub(crate) fn require<T>(value: Option<T>, provider: ProviderId, field: &'static str) -> Result<T, NormalizeError> {
    value.ok_or(NormalizeError::MissingField { provider, field })
}

pub(crate) fn require_connection_type(
    raw: Option<&str>,
    provider: ProviderId,
) -> Result<ConnectionType, NormalizeError> {
    let raw = require(raw, provider, "connectionType")?;
    map_connection_type(raw).ok_or_else(|| NormalizeError::UnknownConnectionType {
        provider,
        value: raw.to_string(),
    })
}

pub(crate) fn invalid(provider: ProviderId) -> impl FnOnce(InvalidOffer) -> NormalizeError {
    move |source| NormalizeError::Invalid { provider, source }
}

pub(crate) fn cents(value: i64) -> Decimal {
    Decimal::new(value, 2)
}

pub(crate) fn positive_cents(value: Option<i64>) -> Option<Decimal> {
    value.filter(|v| *v > 0).map(cents)
}

pub(crate) fn to_u32(value: Option<i64>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok()).filter(|v| *v > 0)
}

/// Lenient field deserializers. Upstream payloads mix numbers, numeric
/// strings and yes/no flags; an unparseable value becomes `None`.
pub(crate) mod de {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn opt_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn opt_bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::Bool(b)) => Some(b),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "ja" | "1" => Some(true),
                "false" | "no" | "nein" | "0" => Some(false),
                _ => None,
            },
            Some(Value::Number(n)) => match n.as_i64() {
                Some(1) => Some(true),
                Some(0) => Some(false),
                _ => None,
            },
            _ => None,
        })
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::String(s)) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }

    /// Nested optional objects: a malformed sub-object is treated as absent.
    pub fn lenient<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(Option::<Value>::deserialize(d)?.and_then(|v| serde_json::from_value(v).ok()))
    }
}

/// `productInfo` block shared by the Servus Speed and Ping Perfect payloads.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInfo {
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub speed: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub contract_duration_in_months: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub connection_type: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub tv: Option<String>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub limit_from: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub max_age: Option<i64>,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid aggregation response JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("aggregation response is not a JSON object")]
    NotAnObject,
}

/// Per-provider results handed over by the request-dispatch collaborator.
///
/// A provider with no entry (or a `None` entry) did not respond.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderResponses {
    responses: BTreeMap<ProviderId, Option<Vec<ProviderOffer>>>,
    undecodable: BTreeMap<ProviderId, usize>,
}

impl ProviderResponses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, provider: ProviderId, offers: Option<Vec<ProviderOffer>>) {
        self.responses.insert(provider, offers);
    }

    /// Offers for `provider`, or `None` when the provider is absent.
    pub fn get(&self, provider: ProviderId) -> Option<&[ProviderOffer]> {
        self.responses.get(&provider).and_then(|o| o.as_deref())
    }

    /// Records of `provider` that could not be decoded into its payload shape.
    pub fn undecodable(&self, provider: ProviderId) -> usize {
        self.undecodable.get(&provider).copied().unwrap_or(0)
    }

    /// Decode an aggregation endpoint response body.
    ///
    /// Unknown keys are ignored. Records that do not decode are counted and
    /// dropped without affecting the rest of that provider's list.
    pub fn from_json_slice(body: &[u8]) -> Result<Self, DecodeError> {
        let value: JsonValue = serde_json::from_slice(body)?;
        Self::from_json_value(value)
    }

    pub fn from_json_value(value: JsonValue) -> Result<Self, DecodeError> {
        let JsonValue::Object(map) = value else {
            return Err(DecodeError::NotAnObject);
        };

        let mut out = Self::new();
        for (key, value) in map {
            let Some(provider) = ProviderId::from_wire_key(&key) else {
                debug!(key = %key, "ignoring unknown provider key");
                continue;
            };
            let records = match value {
                JsonValue::Null => {
                    out.insert(provider, None);
                    continue;
                }
                JsonValue::Array(records) => records,
                other => {
                    warn!(%provider, kind = json_kind(&other), "provider payload is not a list, treating as absent");
                    out.insert(provider, None);
                    continue;
                }
            };

            let mut offers = Vec::with_capacity(records.len());
            let mut failed = 0usize;
            for record in records {
                match ProviderOffer::decode(provider, record) {
                    Ok(offer) => offers.push(offer),
                    Err(err) => {
                        debug!(%provider, error = %err, "dropping undecodable provider record");
                        failed += 1;
                    }
                }
            }
            if failed > 0 {
                out.undecodable.insert(provider, failed);
            }
            out.insert(provider, Some(offers));
        }
        Ok(out)
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

pub fn load_fixture_responses(path: impl AsRef<Path>) -> anyhow::Result<ProviderResponses> {
    let path = path.as_ref();
    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    ProviderResponses::from_json_slice(&data).with_context(|| format!("parsing {}", path.display()))
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderRegistry {
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub key: ProviderId,
    pub enabled: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self {
            providers: ProviderId::ALL
                .into_iter()
                .map(|key| ProviderConfig {
                    key,
                    enabled: true,
                    notes: None,
                })
                .collect(),
        }
    }
}

impl ProviderRegistry {
    pub fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(text).context("parsing provider registry")
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Providers missing from the registry are enabled.
    pub fn is_enabled(&self, provider: ProviderId) -> bool {
        self.providers
            .iter()
            .find(|p| p.key == provider)
            .map(|p| p.enabled)
            .unwrap_or(true)
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Request-dispatch collaborator: resolves a search request into per-provider payloads.
#[async_trait]
pub trait OfferSource: Send + Sync {
    async fn fetch(&self, search_id: Uuid, request: &OffersRequest) -> Result<ProviderResponses, SourceError>;
}

/// Dispatches searches to the aggregation endpoint.
#[derive(Debug)]
pub struct HttpOfferSource {
    client: OffersClient,
}

impl HttpOfferSource {
    pub fn new(client: OffersClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OfferSource for HttpOfferSource {
    async fn fetch(&self, search_id: Uuid, request: &OffersRequest) -> Result<ProviderResponses, SourceError> {
        let response = self.client.fetch_offers(search_id, request).await?;
        Ok(ProviderResponses::from_json_slice(&response.body)?)
    }
}

/// Serves a previously captured response; used for offline rendering and tests.
#[derive(Debug, Clone)]
pub struct FixtureOfferSource {
    responses: ProviderResponses,
}

impl FixtureOfferSource {
    pub fn new(responses: ProviderResponses) -> Self {
        Self { responses }
    }
}

#[async_trait]
impl OfferSource for FixtureOfferSource {
    async fn fetch(&self, _search_id: Uuid, _request: &OffersRequest) -> Result<ProviderResponses, SourceError> {
        Ok(self.responses.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netoffer_core::{Address, Country, SearchCriteria};
    use serde_json::json;
    use std::path::PathBuf;

    fn workspace_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .canonicalize()
            .expect("workspace root")
    }

    fn sample_fixture_path() -> PathBuf {
        workspace_root().join("fixtures/responses/sample.json")
    }

    #[test]
    fn connection_type_aliases_map_to_canonical_values() {
        assert_eq!(map_connection_type("dsl"), Some(ConnectionType::Dsl));
        assert_eq!(map_connection_type(" VDSL "), Some(ConnectionType::Dsl));
        assert_eq!(map_connection_type("Glasfaser"), Some(ConnectionType::Fiber));
        assert_eq!(map_connection_type("fibre"), Some(ConnectionType::Fiber));
        assert_eq!(map_connection_type("Kabel"), Some(ConnectionType::Cable));
        assert_eq!(map_connection_type("5g"), Some(ConnectionType::Mobile));
    }

    #[test]
    fn unknown_connection_type_is_excluded() {
        assert_eq!(map_connection_type("SATELLITE"), None);
        assert_eq!(map_connection_type(""), None);

        let responses = ProviderResponses::from_json_value(json!({
            "webWunder": [{
                "productId": 7,
                "providerName": "WebWunder Sky",
                "productInfo": {"speed": 50, "monthlyCostInCent": 3999, "connectionType": "SATELLITE"}
            }]
        }))
        .unwrap();
        let offers = responses.get(ProviderId::WebWunder).unwrap();
        assert_eq!(
            offers[0].normalize().unwrap_err(),
            NormalizeError::UnknownConnectionType {
                provider: ProviderId::WebWunder,
                value: "SATELLITE".into()
            }
        );
    }

    #[test]
    fn decode_keeps_null_and_missing_providers_absent() {
        let responses = ProviderResponses::from_json_value(json!({
            "servusSpeed": null,
            "byteMe": [],
            "somethingElse": [{"x": 1}]
        }))
        .unwrap();
        assert!(responses.get(ProviderId::ServusSpeed).is_none());
        assert_eq!(responses.get(ProviderId::ByteMe).map(<[_]>::len), Some(0));
        assert!(responses.get(ProviderId::WebWunder).is_none());
    }

    #[test]
    fn undecodable_records_are_counted_not_fatal() {
        let responses = ProviderResponses::from_json_value(json!({
            "pingPerfect": [
                "not an object",
                {"providerName": "Ping 100", "productInfo": {"speed": 100, "connectionType": "DSL"},
                 "pricingDetails": {"monthlyCostInCent": 2500, "installationService": "yes"}}
            ]
        }))
        .unwrap();
        assert_eq!(responses.get(ProviderId::PingPerfect).unwrap().len(), 1);
        assert_eq!(responses.undecodable(ProviderId::PingPerfect), 1);
    }

    #[test]
    fn non_object_body_is_a_decode_error() {
        assert!(matches!(
            ProviderResponses::from_json_slice(b"[1,2,3]"),
            Err(DecodeError::NotAnObject)
        ));
        assert!(matches!(
            ProviderResponses::from_json_slice(b"{oops"),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn missing_required_fields_never_panic() {
        let empty_records = json!({
            "servusSpeed": [{}],
            "byteMe": [{}],
            "pingPerfect": [{}],
            "verbynDich": [{}],
            "webWunder": [{}]
        });
        let responses = ProviderResponses::from_json_value(empty_records).unwrap();
        for provider in ProviderId::ALL {
            let offers = responses.get(provider).unwrap();
            assert_eq!(offers.len(), 1);
            assert!(offers[0].normalize().is_err(), "{provider} accepted an empty record");
            assert_eq!(offers[0].provider(), provider);
        }
    }

    #[test]
    fn sample_fixture_normalizes_per_provider() {
        let responses = load_fixture_responses(sample_fixture_path()).unwrap();
        let valid = |p: ProviderId| {
            responses
                .get(p)
                .unwrap_or_default()
                .iter()
                .filter_map(|o| o.normalize().ok())
                .count()
        };
        assert_eq!(valid(ProviderId::ServusSpeed), 2);
        assert_eq!(valid(ProviderId::ByteMe), 2);
        assert_eq!(valid(ProviderId::PingPerfect), 1);
        assert_eq!(valid(ProviderId::VerbynDich), 1);
        assert_eq!(valid(ProviderId::WebWunder), 2);
        for provider in ProviderId::ALL {
            for offer in responses.get(provider).unwrap_or_default() {
                if let Ok(canonical) = offer.normalize() {
                    assert!(canonical.speed() > 0);
                    assert_eq!(canonical.provenance().provider, provider);
                }
            }
        }
    }

    #[test]
    fn registry_yaml_disables_providers() {
        let registry = ProviderRegistry::from_yaml_str(
            "providers:\n  - key: byteMe\n    enabled: false\n    notes: flaky csv export\n  - key: webWunder\n    enabled: true\n",
        )
        .unwrap();
        assert!(!registry.is_enabled(ProviderId::ByteMe));
        assert!(registry.is_enabled(ProviderId::WebWunder));
        assert!(registry.is_enabled(ProviderId::ServusSpeed));
        assert!(ProviderRegistry::default().providers.iter().all(|p| p.enabled));
    }

    #[test]
    fn workspace_registry_file_parses() {
        let registry = ProviderRegistry::load(workspace_root().join("providers.yaml")).unwrap();
        assert_eq!(registry.providers.len(), ProviderId::ALL.len());
    }

    #[tokio::test]
    async fn fixture_source_returns_captured_payload() {
        let responses = load_fixture_responses(sample_fixture_path()).unwrap();
        let source = FixtureOfferSource::new(responses.clone());
        let criteria = SearchCriteria::new(Address {
            street: "Main St".into(),
            number: "5".into(),
            city: "Vienna".into(),
            zip: "1010".into(),
            country: Country::Austria,
        });
        let fetched = source.fetch(Uuid::new_v4(), &criteria.to_request()).await.unwrap();
        assert_eq!(fetched, responses);
    }
}
