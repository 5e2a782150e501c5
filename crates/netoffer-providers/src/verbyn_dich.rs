use std::sync::OnceLock;

use netoffer_core::{CanonicalOffer, DiscountInfo, DisclaimerInfo, NameInfo, PriceInfo, ProviderId};
use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{de, invalid, map_connection_type, require, NormalizeError, NormalizeOffer};

/// VerbynDich only publishes a German marketing text per product; every
/// attribute except the product name is scraped out of `description`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerbynDichOffer {
    #[serde(default, deserialize_with = "de::opt_string")]
    pub product: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "de::opt_bool")]
    pub last: Option<bool>,
    #[serde(default, deserialize_with = "de::opt_bool")]
    pub valid: Option<bool>,
}

struct Patterns {
    price: Regex,
    connection: Regex,
    speed: Regex,
    price_after_24: Regex,
    duration: Regex,
    tv: Regex,
    limit_from: Regex,
    max_age: Regex,
    min_order: Regex,
    relative_discount: Regex,
    max_discount: Regex,
    recurring_discount: Regex,
    one_off_discount: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        price: Regex::new(r"(\d+)€ im Monat").expect("valid price regex"),
        connection: Regex::new(r"eine (\w+)-Verbindung").expect("valid connection regex"),
        speed: Regex::new(r"(\d+) Mbit/s").expect("valid speed regex"),
        price_after_24: Regex::new(r"Ab dem 24\. Monat beträgt der monatliche Preis (\d+)€")
            .expect("valid later price regex"),
        duration: Regex::new(r"Mindestvertragslaufzeit (?:beträgt )?(\d+) Monate").expect("valid duration regex"),
        tv: Regex::new(r"Fernsehsender enthalten ([^.]+)\.").expect("valid tv regex"),
        limit_from: Regex::new(r"(?i)ab (\d+)\s?GB").expect("valid limit regex"),
        max_age: Regex::new(r"unter (\d+) Jahre").expect("valid age regex"),
        min_order: Regex::new(r"Mindestbestellwert beträgt (\d+)€").expect("valid min order regex"),
        relative_discount: Regex::new(r"Rabatt von (\d+)% auf Ihre monatliche Rechnung(?: bis zum (\d+)\. Monat)?")
            .expect("valid relative discount regex"),
        max_discount: Regex::new(r"maximale Rabatt beträgt (\d+)€").expect("valid max discount regex"),
        recurring_discount: Regex::new(r"Rabatt von (\d+)€ auf Ihre monatliche Rechnung bis zum (\d+)\. Monat")
            .expect("valid recurring discount regex"),
        one_off_discount: Regex::new(r"einmaligen Rabatt von (\d+)€").expect("valid one-off discount regex"),
    })
}

fn capture_i64(re: &Regex, text: &str, group: usize) -> Option<i64> {
    re.captures(text)?.get(group)?.as_str().parse().ok()
}

fn capture_u32(re: &Regex, text: &str) -> Option<u32> {
    capture_i64(re, text, 1).and_then(|v| u32::try_from(v).ok()).filter(|v| *v > 0)
}

fn euros(value: Option<i64>) -> Option<Decimal> {
    value.filter(|v| *v > 0).map(Decimal::from)
}

fn parse_discount(text: &str) -> Option<DiscountInfo> {
    let p = patterns();

    if let Some(caps) = p.relative_discount.captures(text) {
        let percent = caps.get(1)?.as_str().parse::<i64>().ok().filter(|v| *v > 0)?;
        let months = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok()).unwrap_or(1);
        return Some(
            DiscountInfo::relative(Decimal::from(percent))
                .with_max_amount(euros(capture_i64(&p.max_discount, text, 1)))
                .with_how_often(months),
        );
    }

    if let Some(caps) = p.recurring_discount.captures(text) {
        let amount = euros(caps.get(1)?.as_str().parse().ok())?;
        let months = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok()).unwrap_or(1);
        return Some(DiscountInfo::absolute(amount).with_how_often(months));
    }

    euros(capture_i64(&p.one_off_discount, text, 1)).map(DiscountInfo::absolute)
}

impl NormalizeOffer for VerbynDichOffer {
    const PROVIDER: ProviderId = ProviderId::VerbynDich;

    fn normalize(&self) -> Result<CanonicalOffer, NormalizeError> {
        let provider = Self::PROVIDER;
        if self.valid == Some(false) {
            return Err(NormalizeError::FlaggedInvalid { provider });
        }

        let offer_name = require(self.product.clone(), provider, "product")?;
        let text = require(self.description.as_deref(), provider, "description")?;
        let p = patterns();

        let price = require(capture_i64(&p.price, text, 1), provider, "description.price")?;
        let speed = require(capture_i64(&p.speed, text, 1), provider, "description.speed")?;
        let raw_connection = require(
            p.connection.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str()),
            provider,
            "connectionType",
        )?;
        let connection_type =
            map_connection_type(raw_connection).ok_or_else(|| NormalizeError::UnknownConnectionType {
                provider,
                value: raw_connection.to_string(),
            })?;

        let tv = p
            .tv
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());

        let disclaimer = DisclaimerInfo {
            limit_from: capture_u32(&p.limit_from, text),
            max_age: capture_u32(&p.max_age, text),
            min_order_value: euros(capture_i64(&p.min_order, text, 1)),
        };

        Ok(CanonicalOffer::new(
            NameInfo {
                company: provider,
                offer_name,
                id: None,
            },
            speed,
            connection_type,
            PriceInfo {
                price: Decimal::from(price),
                monthly_price_after_2_years: euros(capture_i64(&p.price_after_24, text, 1)),
            },
        )
        .map_err(invalid(provider))?
        .with_duration_in_months(capture_u32(&p.duration, text))
        .with_tv(tv)
        .with_disclaimer_info(Some(disclaimer))
        .with_discount_info(parse_discount(text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netoffer_core::ConnectionType;

    fn offer(description: &str) -> VerbynDichOffer {
        VerbynDichOffer {
            product: Some("VerbynDich Premium".into()),
            description: Some(description.into()),
            last: Some(false),
            valid: Some(true),
        }
    }

    const FULL: &str = "Für nur 30€ im Monat erhalten Sie eine DSL-Verbindung mit einer Geschwindigkeit von 100 Mbit/s. \
        Mit diesem Angebot erhalten Sie einen Rabatt von 10% auf Ihre monatliche Rechnung bis zum 12. Monat. \
        Der maximale Rabatt beträgt 50€. Ab dem 24. Monat beträgt der monatliche Preis 40€. \
        Die Mindestvertragslaufzeit beträgt 24 Monate. Zusätzlich sind folgende Fernsehsender enthalten RobynTV+. \
        Ab 250GB pro Monat wird die Geschwindigkeit gedrosselt. \
        Dieses Angebot ist nur für Personen unter 27 Jahren verfügbar. Der Mindestbestellwert beträgt 20€.";

    #[test]
    fn extracts_every_attribute_from_description() {
        let canonical = offer(FULL).normalize().unwrap();

        assert_eq!(canonical.name_info().offer_name, "VerbynDich Premium");
        assert_eq!(canonical.price(), Decimal::from(30));
        assert_eq!(canonical.price_info().monthly_price_after_2_years, Some(Decimal::from(40)));
        assert_eq!(canonical.speed(), 100);
        assert_eq!(canonical.connection_type(), ConnectionType::Dsl);
        assert_eq!(canonical.duration_in_months(), Some(24));
        assert_eq!(canonical.tv(), Some("RobynTV+"));

        let disclaimer = canonical.disclaimer_info().unwrap();
        assert_eq!(disclaimer.limit_from, Some(250));
        assert_eq!(disclaimer.max_age, Some(27));
        assert_eq!(disclaimer.min_order_value, Some(Decimal::from(20)));

        let discount = canonical.discount_info().unwrap();
        assert_eq!(discount.relative_discount, Some(Decimal::from(10)));
        assert_eq!(discount.max_amount, Some(Decimal::from(50)));
        assert_eq!(discount.how_often, 12);
    }

    #[test]
    fn recurring_and_one_off_absolute_discounts() {
        let recurring = offer(
            "Für nur 45€ im Monat erhalten Sie eine Cable-Verbindung mit einer Geschwindigkeit von 500 Mbit/s. \
             Sie erhalten einen Rabatt von 5€ auf Ihre monatliche Rechnung bis zum 6. Monat.",
        )
        .normalize()
        .unwrap();
        let discount = recurring.discount_info().unwrap();
        assert_eq!(discount.absolute_discount, Some(Decimal::from(5)));
        assert_eq!(discount.how_often, 6);
        assert_eq!(recurring.connection_type(), ConnectionType::Cable);

        let one_off = offer(
            "Für nur 20€ im Monat erhalten Sie eine Fiber-Verbindung mit einer Geschwindigkeit von 50 Mbit/s. \
             Zusätzlich gibt es einen einmaligen Rabatt von 60€.",
        )
        .normalize()
        .unwrap();
        let discount = one_off.discount_info().unwrap();
        assert_eq!(discount.absolute_discount, Some(Decimal::from(60)));
        assert_eq!(discount.how_often, 1);
        assert!(one_off.disclaimer_info().is_none());
        assert!(one_off.tv().is_none());
    }

    #[test]
    fn flagged_invalid_records_are_rejected() {
        let mut record = offer(FULL);
        record.valid = Some(false);
        assert_eq!(
            record.normalize().unwrap_err(),
            NormalizeError::FlaggedInvalid {
                provider: ProviderId::VerbynDich
            }
        );
    }

    #[test]
    fn text_without_speed_is_invalid() {
        let err = offer("Für nur 30€ im Monat erhalten Sie eine DSL-Verbindung.")
            .normalize()
            .unwrap_err();
        assert_eq!(
            err,
            NormalizeError::MissingField {
                provider: ProviderId::VerbynDich,
                field: "description.speed"
            }
        );
    }

    #[test]
    fn unknown_connection_word_is_rejected() {
        let err = offer("Für nur 30€ im Monat erhalten Sie eine Satelliten-Verbindung mit 100 Mbit/s.")
            .normalize()
            .unwrap_err();
        assert!(matches!(err, NormalizeError::UnknownConnectionType { .. }), "got {err:?}");
    }
}
