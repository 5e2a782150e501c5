use netoffer_core::{CanonicalOffer, DiscountInfo, DisclaimerInfo, NameInfo, PriceInfo, ProviderId};
use serde::Deserialize;

use crate::{
    cents, de, invalid, positive_cents, require, require_connection_type, to_u32, NormalizeError, NormalizeOffer,
    ProductInfo,
};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServusSpeedOffer {
    #[serde(default, deserialize_with = "de::opt_string")]
    pub product_identifier: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub provider_name: Option<String>,
    #[serde(default, deserialize_with = "de::lenient")]
    pub product_info: Option<ProductInfo>,
    #[serde(default, deserialize_with = "de::lenient")]
    pub pricing_details: Option<ServusSpeedPricing>,
    /// One-off discount in cents.
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub discount: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServusSpeedPricing {
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub monthly_cost_in_cent: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_bool")]
    pub installation_service: Option<bool>,
}

impl NormalizeOffer for ServusSpeedOffer {
    const PROVIDER: ProviderId = ProviderId::ServusSpeed;

    fn normalize(&self) -> Result<CanonicalOffer, NormalizeError> {
        let provider = Self::PROVIDER;
        let info = require(self.product_info.as_ref(), provider, "productInfo")?;
        let pricing = require(self.pricing_details.as_ref(), provider, "pricingDetails")?;

        let name_info = NameInfo {
            company: provider,
            offer_name: require(self.provider_name.clone(), provider, "providerName")?,
            id: self.product_identifier.clone(),
        };
        let speed = require(info.speed, provider, "productInfo.speed")?;
        let connection_type = require_connection_type(info.connection_type.as_deref(), provider)?;
        let price = require(pricing.monthly_cost_in_cent, provider, "pricingDetails.monthlyCostInCent")?;

        let disclaimer = DisclaimerInfo {
            limit_from: to_u32(info.limit_from),
            max_age: to_u32(info.max_age),
            min_order_value: None,
        };

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
        .with_disclaimer_info(Some(disclaimer))
        .with_discount_info(positive_cents(self.discount).map(DiscountInfo::absolute)))
    }
}
