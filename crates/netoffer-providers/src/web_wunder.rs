use netoffer_core::{CanonicalOffer, DiscountInfo, DisclaimerInfo, NameInfo, PriceInfo, ProviderId};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{
    cents, de, invalid, positive_cents, require, require_connection_type, to_u32, NormalizeError, NormalizeOffer,
};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebWunderOffer {
    #[serde(default, deserialize_with = "de::opt_string")]
    pub product_id: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub provider_name: Option<String>,
    #[serde(default, deserialize_with = "de::lenient")]
    pub product_info: Option<WebWunderProductInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebWunderProductInfo {
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub speed: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub monthly_cost_in_cent: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub monthly_cost_in_cent_from25th_month: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub contract_duration_in_months: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub connection_type: Option<String>,
    #[serde(default, deserialize_with = "de::lenient")]
    pub voucher: Option<WebWunderVoucher>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WebWunderVoucher {
    PercentageVoucher(PercentageVoucher),
    AbsoluteVoucher(AbsoluteVoucher),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentageVoucher {
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub percentage: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub max_discount_in_cent: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbsoluteVoucher {
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub discount_in_cent: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub min_order_value_in_cent: Option<i64>,
}

impl WebWunderVoucher {
    fn discount(&self) -> Option<DiscountInfo> {
        match self {
            WebWunderVoucher::PercentageVoucher(v) => {
                let percent = v.percentage.filter(|p| *p > 0)?;
                Some(DiscountInfo::relative(Decimal::from(percent)).with_max_amount(positive_cents(v.max_discount_in_cent)))
            }
            WebWunderVoucher::AbsoluteVoucher(v) => positive_cents(v.discount_in_cent).map(DiscountInfo::absolute),
        }
    }

    fn min_order_value(&self) -> Option<Decimal> {
        match self {
            WebWunderVoucher::AbsoluteVoucher(v) => positive_cents(v.min_order_value_in_cent),
            WebWunderVoucher::PercentageVoucher(_) => None,
        }
    }
}

impl NormalizeOffer for WebWunderOffer {
    const PROVIDER: ProviderId = ProviderId::WebWunder;

    fn normalize(&self) -> Result<CanonicalOffer, NormalizeError> {
        let provider = Self::PROVIDER;
        let info = require(self.product_info.as_ref(), provider, "productInfo")?;

        let name_info = NameInfo {
            company: provider,
            offer_name: require(self.provider_name.clone(), provider, "providerName")?,
            id: self.product_id.clone(),
        };
        let speed = require(info.speed, provider, "productInfo.speed")?;
        let connection_type = require_connection_type(info.connection_type.as_deref(), provider)?;
        let price = require(info.monthly_cost_in_cent, provider, "productInfo.monthlyCostInCent")?;

        let voucher = info.voucher.as_ref();
        let disclaimer = DisclaimerInfo {
            limit_from: None,
            max_age: None,
            min_order_value: voucher.and_then(WebWunderVoucher::min_order_value),
        };

        Ok(CanonicalOffer::new(
            name_info,
            speed,
            connection_type,
            PriceInfo {
                price: cents(price),
                monthly_price_after_2_years: positive_cents(info.monthly_cost_in_cent_from25th_month),
            },
        )
        .map_err(invalid(provider))?
        .with_duration_in_months(to_u32(info.contract_duration_in_months))
        .with_disclaimer_info(Some(disclaimer))
        .with_discount_info(voucher.and_then(WebWunderVoucher::discount)))
    }
}
