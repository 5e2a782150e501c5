//! Self-contained HTML report for a ranked list of offers.

use askama::Template;
use chrono::NaiveDateTime;
use netoffer_core::{Address, CanonicalOffer, DiscountInfo, SearchCriteria};
use rust_decimal::Decimal;
use thiserror::Error;

pub const CRATE_NAME: &str = "netoffer-report";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("rendering report template: {0}")]
    Template(#[from] askama::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDocument {
    pub content: String,
    pub file_name: String,
}

#[derive(Debug, Clone)]
struct DetailRow {
    label: &'static str,
    value: String,
}

#[derive(Debug, Clone)]
struct OfferView {
    company: &'static str,
    offer_name: String,
    id: Option<String>,
    speed: u32,
    connection_type: &'static str,
    price: String,
    price_after_24_months: Option<String>,
    details: Vec<DetailRow>,
    discount: Option<String>,
}

#[derive(Template)]
#[template(path = "report.html")]
struct ReportTemplate {
    address: String,
    filters: Option<String>,
    offers: Vec<OfferView>,
    offer_count: usize,
    generated_on: Option<String>,
}

fn euros(amount: Decimal) -> String {
    format!("{amount:.2}")
}

fn detail(label: &'static str, value: String) -> DetailRow {
    DetailRow { label, value }
}

fn detail_rows(offer: &CanonicalOffer) -> Vec<DetailRow> {
    let mut rows = Vec::new();
    if let Some(months) = offer.duration_in_months() {
        rows.push(detail("Contract Duration", format!("{months} months")));
    }
    if let Some(included) = offer.installation_service() {
        let value = if included { "Included" } else { "Not included" };
        rows.push(detail("Installation Service", value.to_string()));
    }
    if let Some(tv) = offer.tv() {
        rows.push(detail("TV Package", tv.to_string()));
    }
    if let Some(disclaimer) = offer.disclaimer_info() {
        if let Some(gb) = disclaimer.limit_from {
            rows.push(detail("Speed Reduced After", format!("{gb} GB")));
        }
        if let Some(age) = disclaimer.max_age {
            rows.push(detail("Age Restriction", format!("Max {age} years")));
        }
        if let Some(min) = disclaimer.min_order_value {
            rows.push(detail("Minimum Order", format!("€{}", euros(min))));
        }
    }
    rows
}

/// `None` unless an absolute or relative amount is present and positive.
/// The absolute amount wins when both are set.
pub fn discount_text(discount: &DiscountInfo) -> Option<String> {
    if !discount.is_concrete() {
        return None;
    }
    let mut text = match discount.absolute_discount.filter(|d| *d > Decimal::ZERO) {
        Some(amount) => format!("Save €{}", euros(amount)),
        None => format!("Save {}%", discount.relative_discount?.normalize()),
    };

    if let Some(max) = discount.max_amount {
        text.push_str(&format!(" (max €{})", euros(max)));
    }
    if discount.how_often > 1 {
        text.push_str(&format!(" for {} months", discount.how_often));
    }
    Some(text)
}

/// `Connection: FIBER • Installation: Included`, or `None` without filters.
pub fn filters_line(criteria: &SearchCriteria) -> Option<String> {
    if !criteria.has_filters() {
        return None;
    }
    let mut parts = Vec::new();
    if let Some(connection) = criteria.connection_type {
        parts.push(format!("Connection: {connection}"));
    }
    if let Some(installation) = criteria.installation_service {
        let value = if installation { "Included" } else { "Not Included" };
        parts.push(format!("Installation: {value}"));
    }
    Some(parts.join(" • "))
}

fn offer_view(offer: &CanonicalOffer) -> OfferView {
    let name = offer.name_info();
    OfferView {
        company: name.company.display_name(),
        offer_name: name.offer_name.clone(),
        id: name.id.clone(),
        speed: offer.speed(),
        connection_type: offer.connection_type().as_str(),
        price: euros(offer.price()),
        price_after_24_months: offer.price_info().monthly_price_after_2_years.map(euros),
        details: detail_rows(offer),
        discount: offer.discount_info().and_then(discount_text),
    }
}

/// Strips characters that are unsafe in file names and turns whitespace runs into `-`.
fn file_name_part(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join("-")
}

/// `internet-offers-{street}-{number}-{city}.html`
pub fn report_file_name(address: &Address) -> String {
    format!(
        "internet-offers-{}-{}-{}.html",
        file_name_part(&address.street),
        file_name_part(&address.number),
        file_name_part(&address.city)
    )
}

/// Render `offers` in the given order. The footer carries no timestamp.
pub fn render(criteria: &SearchCriteria, offers: &[CanonicalOffer]) -> Result<ReportDocument, ReportError> {
    render_with(criteria, offers, None)
}

/// Like [`render`], stamping the footer with `generated_at`.
pub fn render_at(
    criteria: &SearchCriteria,
    offers: &[CanonicalOffer],
    generated_at: NaiveDateTime,
) -> Result<ReportDocument, ReportError> {
    render_with(criteria, offers, Some(generated_at))
}

fn render_with(
    criteria: &SearchCriteria,
    offers: &[CanonicalOffer],
    generated_at: Option<NaiveDateTime>,
) -> Result<ReportDocument, ReportError> {
    let template = ReportTemplate {
        address: criteria.address.formatted(),
        filters: filters_line(criteria),
        offers: offers.iter().map(offer_view).collect(),
        offer_count: offers.len(),
        generated_on: generated_at.map(|t| t.format("%b %d, %Y at %H:%M").to_string()),
    };
    Ok(ReportDocument {
        content: template.render()?,
        file_name: report_file_name(&criteria.address),
    })
}
