use netoffer_core::{CanonicalOffer, DisclaimerInfo, NameInfo, PriceInfo, ProviderId};
use serde::Deserialize;

use crate::{cents, de, invalid, require, require_connection_type, to_u32, NormalizeError, NormalizeOffer, ProductInfo};

/// Ping Perfect records carry no provider-native id.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingPerfectOffer {
    #[serde(default, deserialize_with = "de::opt_string")]
    pub provider_name: Option<String>,
    #[serde(default, deserialize_with = "de::lenient")]
    pub product_info: Option<ProductInfo>,
    #[serde(default, deserialize_with = "de::lenient")]
    pub pricing_details: Option<PingPerfectPricing>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingPerfectPricing {
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub monthly_cost_in_cent: Option<i64>,
    /// `"yes"` / `"no"` on the wire.
    #[serde(default, deserialize_with = "de::opt_bool")]
    pub installation_service: Option<bool>,
}

impl NormalizeOffer for PingPerfectOffer {
    const PROVIDER: ProviderId = ProviderId::PingPerfect;

    fn normalize(&self) -> Result<CanonicalOffer, NormalizeError> {
        let provider = Self::PROVIDER;
        let info = require(self.product_info.as_ref(), provider, "productInfo")?;
        let pricing = require(self.pricing_details.as_ref(), provider, "pricingDetails")?;

        let name_info = NameInfo {
            company: provider,
            offer_name: require(self.provider_name.clone(), provider, "providerName")?,
            id: None,
        };
        let speed = require(info.speed, provider, "productInfo.speed")?;
        let connection_type = require_connection_type(info.connection_type.as_deref(), provider)?;
        let price = require(pricing.monthly_cost_in_cent, provider, "pricingDetails.monthlyCostInCent")?;

        Ok(CanonicalOffer::new(
            name_info,
            speed,
            connection_type,
            PriceInfo {
                price: cents(price),
                monthly_price_after_2_years: None,
            },
        )
        .map_err(invalid(provider))?
        .with_duration_in_months(to_u32(info.contract_duration_in_months))
        .with_installation_service(pricing.installation_service)
        .with_tv(info.tv.clone())
        .with_disclaimer_info(Some(DisclaimerInfo {
            limit_from: to_u32(info.limit_from),
            max_age: to_u32(info.max_age),
            min_order_value: None,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netoffer_core::ConnectionType;
    use rust_decimal::Decimal;
    use serde_json::json;

    #[test]
    fn yes_no_installation_flag_is_mapped() {
        let offer: PingPerfectOffer = serde_json::from_value(json!({
            "providerName": "Ping LTE 40",
            "productInfo": {"speed": 40, "connectionType": "LTE", "maxAge": 25},
            "pricingDetails": {"monthlyCostInCent": 1999, "installationService": "no"}
        }))
        .unwrap();
        let offer = offer.normalize().unwrap();

        assert!(offer.name_info().id.is_none());
        assert_eq!(offer.connection_type(), ConnectionType::Mobile);
        assert_eq!(offer.installation_service(), Some(false));
        assert_eq!(offer.price(), Decimal::new(1999, 2));
        assert_eq!(offer.disclaimer_info().unwrap().max_age, Some(25));
        assert!(offer.discount_info().is_none());
    }

    #[test]
    fn malformed_product_info_is_missing() {
        let offer: PingPerfectOffer = serde_json::from_value(json!({
            "providerName": "Ping Broken",
            "productInfo": "speed=40",
            "pricingDetails": {"monthlyCostInCent": 1999}
        }))
        .unwrap();
        assert_eq!(
            offer.normalize().unwrap_err(),
            NormalizeError::MissingField {
                provider: ProviderId::PingPerfect,
                field: "productInfo"
            }
        );
    }
}
