//! Import normalizer: raw rows → `ImportRecord`s with deterministic natural keys.
//!
//! Pure functions of their input; the batch coordinator counts failures here
//! as per-record errors, never as batch failures.

use crate::error::NormalizationError;
use crate::models::{ImportRecord, OrderStatus, RawRecord, SourceType, SourcingType};
use chrono::NaiveDate;

/// Normalize one raw import row.
///
/// Natural keys:
/// - channel-originated rows: `<channel>:<order_number>`
/// - spreadsheet rows without an order number: `row:<sku>|<size>|<date>|<cents>`
///
/// A row with no usable product reference is rejected; product auto-creation
/// is a catalog concern, not an import concern.
pub fn normalize(
    raw: &RawRecord,
    source_type: SourceType,
) -> Result<ImportRecord, NormalizationError> {
    let sku = required(raw, "sku")?;
    // An explicitly blank product_ref means the upstream mapper failed to
    // resolve the product; absence falls back to the sku.
    let product_ref = match raw.get("product_ref") {
        Some(v) if v.trim().is_empty() => {
            return Err(NormalizationError::UnresolvableProduct(sku))
        }
        Some(v) => v.trim().to_string(),
        None => sku.clone(),
    };

    let size = optional(raw, "size");
    let brand = optional(raw, "brand");
    let currency = optional(raw, "currency").unwrap_or_else(|| "EUR".to_string());

    let amount = match optional(raw, "amount") {
        Some(s) => Some(parse_amount(&s)?),
        None => None,
    };
    let purchase_price = match optional(raw, "purchase_price") {
        Some(s) => Some(parse_amount(&s)?),
        None => None,
    };
    let transaction_date = match optional(raw, "date") {
        Some(s) => Some(parse_date(&s)?),
        None => None,
    };

    let sourcing_type = match optional(raw, "sourcing_type") {
        Some(s) => s
            .parse::<SourcingType>()
            .map_err(|_| NormalizationError::MissingRequiredField("sourcing_type"))?,
        None => SourcingType::Physical,
    };

    let status = fold_status(optional(raw, "status").as_deref());

    let (natural_key, sale_channel) = match source_type.channel() {
        Some(channel) => {
            let order_number = required(raw, "order_number")?;
            (channel_key(channel, &order_number), Some(channel))
        }
        None => {
            // Channel-less rows key on content; amount and date are mandatory
            // because the key would otherwise not identify a transaction.
            let amount =
                amount.ok_or(NormalizationError::MissingRequiredField("amount"))?;
            let date = transaction_date
                .clone()
                .ok_or(NormalizationError::MissingRequiredField("date"))?;
            let key = row_key(&sku, size.as_deref(), &date, amount);
            (key, None)
        }
    };

    Ok(ImportRecord {
        natural_key,
        source_type,
        status,
        amount,
        currency,
        product_ref,
        sku,
        size,
        brand,
        sale_channel,
        transaction_date,
        purchase_price,
        sourcing_type,
    })
}

/// Natural key for a channel-reported order.
pub fn channel_key(channel: crate::models::Channel, order_number: &str) -> String {
    format!("{}:{}", channel.as_str(), order_number.trim())
}

/// Natural key for a spreadsheet row. The amount is fixed to integer cents so
/// `120`, `120.0` and `120,00` produce the same key.
pub fn row_key(sku: &str, size: Option<&str>, date: &str, amount: f64) -> String {
    format!(
        "row:{}|{}|{}|{}",
        sku.trim(),
        size.unwrap_or("").trim(),
        date,
        to_cents(amount)
    )
}

fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

fn required(raw: &RawRecord, field: &'static str) -> Result<String, NormalizationError> {
    match raw.get(field) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(NormalizationError::MissingRequiredField(field)),
    }
}

fn optional(raw: &RawRecord, field: &str) -> Option<String> {
    raw.get(field)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a money value. Accepts `120`, `120.50`, `120,50`, and trailing
/// currency symbols as they appear in the historical spreadsheet exports.
/// Negative amounts are rejected.
pub fn parse_amount(value: &str) -> Result<f64, NormalizationError> {
    let cleaned = value
        .trim()
        .trim_end_matches(['€', '$', '£'])
        .trim()
        .to_string();

    // European decimal comma: only when there is exactly one comma and no dot
    let cleaned = if cleaned.matches(',').count() == 1 && !cleaned.contains('.') {
        cleaned.replace(',', ".")
    } else {
        // "1,234.56" style thousands separators
        cleaned.replace(',', "")
    };

    let amount: f64 = cleaned
        .parse()
        .map_err(|_| NormalizationError::InvalidAmount(value.to_string()))?;
    if !amount.is_finite() || amount < 0.0 {
        return Err(NormalizationError::InvalidAmount(value.to_string()));
    }
    Ok(amount)
}

/// Parse a date into `YYYY-MM-DD`. Accepts plain dates, RFC 3339 timestamps,
/// and the `DD.MM.YYYY` form the old spreadsheets used.
pub fn parse_date(value: &str) -> Result<String, NormalizationError> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.format("%Y-%m-%d").to_string());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%d.%m.%Y") {
        return Ok(date.format("%Y-%m-%d").to_string());
    }
    if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(value) {
        return Ok(ts.date_naive().format("%Y-%m-%d").to_string());
    }
    Err(NormalizationError::InvalidDate(value.to_string()))
}

/// Fold channel-native order statuses onto the two-state ledger model.
/// Unknown strings fold to pending with a warning rather than failing the row.
fn fold_status(raw: Option<&str>) -> OrderStatus {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("completed" | "complete" | "shipped" | "delivered" | "sold" | "closed") => {
            OrderStatus::Completed
        }
        Some("pending" | "created" | "open" | "authorized") | None => OrderStatus::Pending,
        Some(other) => {
            log::warn!("Unknown order status {other:?}, treating as pending");
            OrderStatus::Pending
        }
    }
}
