//! Canonical offer model and provenance types for netoffer.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "netoffer-core";

/// Upstream internet-offer providers reachable through the aggregation endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProviderId {
    ServusSpeed,
    ByteMe,
    PingPerfect,
    VerbynDich,
    WebWunder,
}

impl ProviderId {
    pub const ALL: [ProviderId; 5] = [
        ProviderId::ServusSpeed,
        ProviderId::ByteMe,
        ProviderId::PingPerfect,
        ProviderId::VerbynDich,
        ProviderId::WebWunder,
    ];

    /// Key under which the aggregation endpoint reports this provider's offers.
    pub fn wire_key(self) -> &'static str {
        match self {
            ProviderId::ServusSpeed => "servusSpeed",
            ProviderId::ByteMe => "byteMe",
            ProviderId::PingPerfect => "pingPerfect",
            ProviderId::VerbynDich => "verbynDich",
            ProviderId::WebWunder => "webWunder",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ProviderId::ServusSpeed => "Servus Speed",
            ProviderId::ByteMe => "ByteMe",
            ProviderId::PingPerfect => "Ping Perfect",
            ProviderId::VerbynDich => "VerbynDich",
            ProviderId::WebWunder => "WebWunder",
        }
    }

    pub fn from_wire_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.wire_key() == key)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionType {
    Fiber,
    Dsl,
    Cable,
    Mobile,
}

impl ConnectionType {
    pub const ALL: [ConnectionType; 4] = [
        ConnectionType::Fiber,
        ConnectionType::Dsl,
        ConnectionType::Cable,
        ConnectionType::Mobile,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionType::Fiber => "FIBER",
            ConnectionType::Dsl => "DSL",
            ConnectionType::Cable => "CABLE",
            ConnectionType::Mobile => "MOBILE",
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Parses the canonical names only (`fiber`, `DSL`, ...). Provider-native
/// spellings are mapped by the normalizers, not here.
impl FromStr for ConnectionType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseEnumError::new("connection type", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Country {
    Austria,
    Germany,
    Switzerland,
}

impl Country {
    pub const ALL: [Country; 3] = [Country::Austria, Country::Germany, Country::Switzerland];

    pub fn code(self) -> &'static str {
        match self {
            Country::Austria => "AT",
            Country::Germany => "DE",
            Country::Switzerland => "CH",
        }
    }

    /// Name the aggregation endpoint expects on the wire.
    pub fn wire_name(self) -> &'static str {
        match self {
            Country::Austria => "AUSTRIA",
            Country::Germany => "GERMANY",
            Country::Switzerland => "SWITZERLAND",
        }
    }

    pub fn presentable_name(self) -> &'static str {
        match self {
            Country::Austria => "Austria",
            Country::Germany => "Germany",
            Country::Switzerland => "Switzerland",
        }
    }
}

impl FromStr for Country {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| {
                c.code().eq_ignore_ascii_case(s)
                    || c.wire_name().eq_ignore_ascii_case(s)
                    || c.presentable_name().eq_ignore_ascii_case(s)
            })
            .ok_or_else(|| ParseEnumError::new("country", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub number: String,
    pub city: String,
    pub zip: String,
    pub country: Country,
}

impl Address {
    /// `"{street} {number}, {zip} {city}, {country}"`
    pub fn formatted(&self) -> String {
        format!(
            "{} {}, {} {}, {}",
            self.street,
            self.number,
            self.zip,
            self.city,
            self.country.presentable_name()
        )
    }
}

/// What the user asked for. Used for report headers and the wire request, never for ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub address: Address,
    pub connection_type: Option<ConnectionType>,
    pub installation_service: Option<bool>,
}

impl SearchCriteria {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            connection_type: None,
            installation_service: None,
        }
    }

    pub fn has_filters(&self) -> bool {
        self.connection_type.is_some() || self.installation_service.is_some()
    }

    pub fn to_request(&self) -> OffersRequest {
        OffersRequest {
            address: AddressRequest {
                street: self.address.street.clone(),
                number: self.address.number.clone(),
                city: self.address.city.clone(),
                zip: self.address.zip.clone(),
                country: self.address.country.wire_name().to_string(),
            },
            wants_fiber: self.connection_type == Some(ConnectionType::Fiber),
            installation: self.installation_service.unwrap_or(false),
            connection_type: self
                .connection_type
                .unwrap_or(ConnectionType::Dsl)
                .as_str()
                .to_string(),
        }
    }
}

/// Body POSTed to the aggregation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OffersRequest {
    pub address: AddressRequest,
    pub wants_fiber: bool,
    pub installation: bool,
    pub connection_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRequest {
    pub street: String,
    pub number: String,
    pub city: String,
    pub zip: String,
    pub country: String,
}

/// Which provider (and provider-native record) a canonical offer came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Provenance {
    pub provider: ProviderId,
    pub offer_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NameInfo {
    pub company: ProviderId,
    pub offer_name: String,
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceInfo {
    pub price: Decimal,
    pub monthly_price_after_2_years: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisclaimerInfo {
    /// Data volume in GB after which the connection is throttled.
    pub limit_from: Option<u32>,
    pub max_age: Option<u32>,
    pub min_order_value: Option<Decimal>,
}

impl DisclaimerInfo {
    pub fn is_empty(&self) -> bool {
        self.limit_from.is_none() && self.max_age.is_none() && self.min_order_value.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountInfo {
    pub absolute_discount: Option<Decimal>,
    /// Percentage, e.g. `10` for 10%.
    pub relative_discount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub how_often: u32,
}

impl DiscountInfo {
    pub fn absolute(amount: Decimal) -> Self {
        Self {
            absolute_discount: Some(amount),
            relative_discount: None,
            max_amount: None,
            how_often: 1,
        }
    }

    pub fn relative(percent: Decimal) -> Self {
        Self {
            absolute_discount: None,
            relative_discount: Some(percent),
            max_amount: None,
            how_often: 1,
        }
    }

    pub fn with_max_amount(mut self, max_amount: Option<Decimal>) -> Self {
        self.max_amount = max_amount;
        self
    }

    pub fn with_how_often(mut self, how_often: u32) -> Self {
        self.how_often = how_often.max(1);
        self
    }

    /// True when at least one discount amount is known and positive.
    pub fn is_concrete(&self) -> bool {
        let positive = |v: Option<Decimal>| v.is_some_and(|d| d > Decimal::ZERO);
        positive(self.absolute_discount) || positive(self.relative_discount)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidOffer {
    #[error("speed must be positive, got {0}")]
    NonPositiveSpeed(i64),
    #[error("speed {0} is out of range")]
    SpeedOutOfRange(i64),
    #[error("price must not be negative, got {0}")]
    NegativePrice(Decimal),
    #[error("offer name is empty")]
    EmptyOfferName,
}

/// Provider-agnostic offer used for ranking and rendering.
///
/// Constructed once per normalized provider record and never mutated; optional
/// attributes are attached through the consuming `with_*` builders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalOffer {
    name_info: NameInfo,
    speed: u32,
    connection_type: ConnectionType,
    price_info: PriceInfo,
    duration_in_months: Option<u32>,
    installation_service: Option<bool>,
    tv: Option<String>,
    disclaimer_info: Option<DisclaimerInfo>,
    discount_info: Option<DiscountInfo>,
}

impl CanonicalOffer {
    pub fn new(
        name_info: NameInfo,
        speed: i64,
        connection_type: ConnectionType,
        price_info: PriceInfo,
    ) -> Result<Self, InvalidOffer> {
        if speed <= 0 {
            return Err(InvalidOffer::NonPositiveSpeed(speed));
        }
        let speed = u32::try_from(speed).map_err(|_| InvalidOffer::SpeedOutOfRange(speed))?;
        if price_info.price < Decimal::ZERO {
            return Err(InvalidOffer::NegativePrice(price_info.price));
        }
        if name_info.offer_name.trim().is_empty() {
            return Err(InvalidOffer::EmptyOfferName);
        }
        Ok(Self {
            name_info,
            speed,
            connection_type,
            price_info,
            duration_in_months: None,
            installation_service: None,
            tv: None,
            disclaimer_info: None,
            discount_info: None,
        })
    }

    pub fn with_duration_in_months(mut self, months: Option<u32>) -> Self {
        self.duration_in_months = months.filter(|m| *m > 0);
        self
    }

    pub fn with_installation_service(mut self, installation_service: Option<bool>) -> Self {
        self.installation_service = installation_service;
        self
    }

    pub fn with_tv(mut self, tv: Option<String>) -> Self {
        self.tv = tv
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        self
    }

    pub fn with_disclaimer_info(mut self, info: Option<DisclaimerInfo>) -> Self {
        self.disclaimer_info = info.filter(|d| !d.is_empty());
        self
    }

    pub fn with_discount_info(mut self, info: Option<DiscountInfo>) -> Self {
        self.discount_info = info.map(|mut d| {
            d.how_often = d.how_often.max(1);
            d
        });
        self
    }

    pub fn name_info(&self) -> &NameInfo {
        &self.name_info
    }

    pub fn speed(&self) -> u32 {
        self.speed
    }

    pub fn connection_type(&self) -> ConnectionType {
        self.connection_type
    }

    pub fn price_info(&self) -> &PriceInfo {
        &self.price_info
    }

    pub fn price(&self) -> Decimal {
        self.price_info.price
    }

    pub fn duration_in_months(&self) -> Option<u32> {
        self.duration_in_months
    }

    pub fn installation_service(&self) -> Option<bool> {
        self.installation_service
    }

    pub fn tv(&self) -> Option<&str> {
        self.tv.as_deref()
    }

    pub fn disclaimer_info(&self) -> Option<&DisclaimerInfo> {
        self.disclaimer_info.as_ref()
    }

    pub fn discount_info(&self) -> Option<&DiscountInfo> {
        self.discount_info.as_ref()
    }

    pub fn provenance(&self) -> Provenance {
        Provenance {
            provider: self.name_info.company,
            offer_id: self.name_info.id.clone(),
        }
    }
}
