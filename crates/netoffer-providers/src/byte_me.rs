use netoffer_core::{CanonicalOffer, DiscountInfo, DisclaimerInfo, NameInfo, PriceInfo, ProviderId};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{
    cents, de, invalid, positive_cents, require, require_connection_type, to_u32, NormalizeError, NormalizeOffer,
};

/// Flattened CSV row as relayed by the aggregation endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteMeOffer {
    #[serde(default, deserialize_with = "de::opt_string")]
    pub product_id: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub provider_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub speed: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub monthly_cost_in_cent: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub after_two_years_monthly_cost: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub duration_in_months: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub connection_type: Option<String>,
    #[serde(default, deserialize_with = "de::opt_bool")]
    pub installation_service: Option<bool>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub tv: Option<String>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub limit_from: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub max_age: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub voucher_type: Option<String>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub voucher_value: Option<i64>,
}

impl ByteMeOffer {
    /// `percentage` vouchers carry whole percent, `absolute` vouchers cents.
    fn discount(&self) -> Option<DiscountInfo> {
        let value = self.voucher_value.filter(|v| *v > 0)?;
        match self.voucher_type.as_deref()?.to_ascii_lowercase().as_str() {
            "percentage" => Some(DiscountInfo::relative(Decimal::from(value))),
            "absolute" => positive_cents(Some(value)).map(DiscountInfo::absolute),
            _ => None,
        }
    }
}

impl NormalizeOffer for ByteMeOffer {
    const PROVIDER: ProviderId = ProviderId::ByteMe;

    fn normalize(&self) -> Result<CanonicalOffer, NormalizeError> {
        let provider = Self::PROVIDER;
        let name_info = NameInfo {
            company: provider,
            offer_name: require(self.provider_name.clone(), provider, "providerName")?,
            id: self.product_id.clone(),
        };
        let speed = require(self.speed, provider, "speed")?;
        let connection_type = require_connection_type(self.connection_type.as_deref(), provider)?;
        let price = require(self.monthly_cost_in_cent, provider, "monthlyCostInCent")?;

        let disclaimer = DisclaimerInfo {
            limit_from: to_u32(self.limit_from),
            max_age: to_u32(self.max_age),
            min_order_value: None,
        };

        Ok(CanonicalOffer::new(
            name_info,
            speed,
            connection_type,
            PriceInfo {
                price: cents(price),
                monthly_price_after_2_years: positive_cents(self.after_two_years_monthly_cost),
            },
        )
        .map_err(invalid(provider))?
        .with_duration_in_months(to_u32(self.duration_in_months))
        .with_installation_service(self.installation_service)
        .with_tv(self.tv.clone())
        .with_disclaimer_info(Some(disclaimer))
        .with_discount_info(self.discount()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netoffer_core::ConnectionType;
    use serde_json::json;

    fn decode(value: serde_json::Value) -> ByteMeOffer {
        serde_json::from_value(value).expect("decode byteme record")
    }

    #[test]
    fn csv_strings_are_parsed() {
        let offer = decode(json!({
            "productId": "7701",
            "providerName": "ByteMe Cable 250",
            "speed": "250",
            "monthlyCostInCent": "4299",
            "afterTwoYearsMonthlyCost": "4999",
            "durationInMonths": "24",
            "connectionType": "Kabel",
            "installationService": "true",
            "tv": "",
            "limitFrom": "",
            "maxAge": "",
            "voucherType": "percentage",
            "voucherValue": "10"
        }))
        .normalize()
        .unwrap();

        assert_eq!(offer.name_info().id.as_deref(), Some("7701"));
        assert_eq!(offer.speed(), 250);
        assert_eq!(offer.connection_type(), ConnectionType::Cable);
        assert_eq!(offer.price(), Decimal::new(4299, 2));
        assert_eq!(offer.price_info().monthly_price_after_2_years, Some(Decimal::new(4999, 2)));
        assert_eq!(offer.installation_service(), Some(true));
        assert!(offer.tv().is_none());
        assert!(offer.disclaimer_info().is_none());
        let discount = offer.discount_info().unwrap();
        assert_eq!(discount.relative_discount, Some(Decimal::from(10)));
        assert!(discount.absolute_discount.is_none());
    }

    #[test]
    fn absolute_voucher_is_in_cents() {
        let offer = decode(json!({
            "providerName": "ByteMe DSL 50",
            "speed": 50,
            "monthlyCostInCent": 2499,
            "connectionType": "DSL",
            "installationService": false,
            "voucherType": "absolute",
            "voucherValue": 500
        }))
        .normalize()
        .unwrap();
        assert_eq!(offer.installation_service(), Some(false));
        assert_eq!(offer.discount_info().unwrap().absolute_discount, Some(Decimal::new(500, 2)));
    }

    #[test]
    fn unknown_voucher_type_is_ignored() {
        let offer = decode(json!({
            "providerName": "ByteMe DSL 16",
            "speed": 16,
            "monthlyCostInCent": 1499,
            "connectionType": "ADSL",
            "voucherType": "mystery",
            "voucherValue": 5
        }))
        .normalize()
        .unwrap();
        assert!(offer.discount_info().is_none());
    }

    #[test]
    fn missing_connection_type_is_invalid() {
        let err = decode(json!({"providerName": "ByteMe ?", "speed": 16, "monthlyCostInCent": 1499}))
            .normalize()
            .unwrap_err();
        assert_eq!(
            err,
            NormalizeError::MissingField {
                provider: ProviderId::ByteMe,
                field: "connectionType"
            }
        );
    }
}
