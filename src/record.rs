//! # Payout Record
//!
//! The canonical output of an extraction and the rules for merging export
//! projections into it.
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("Field '{field}' cannot hold value {value}")]
    FieldTypeMismatch { field: String, value: String },
}

/// Identifier of a source document in the external document system.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct DocumentId(i64);

impl DocumentId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for DocumentId {
    type Error = i64;

    /// Only positive identifiers are valid.
    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value > 0 {
            Ok(DocumentId(value))
        } else {
            Err(value)
        }
    }
}

impl From<DocumentId> for i64 {
    fn from(value: DocumentId) -> Self {
        value.0
    }
}

impl Display for DocumentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single value produced by an export projection.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Textual form used for text fields.
    fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Bool(value) => Some(value.to_string()),
            FieldValue::Int(value) => Some(value.to_string()),
            // Reference numbers typed into Excel arrive as floats
            FieldValue::Float(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                Some(format!("{value:.0}"))
            }
            FieldValue::Float(value) => Some(value.to_string()),
            FieldValue::Text(value) => Some(value.clone()),
            FieldValue::Date(value) => Some(value.format("%Y-%m-%d").to_string()),
            FieldValue::Timestamp(value) if value.time() == NaiveTime::MIN => {
                Some(value.format("%Y-%m-%d").to_string())
            }
            FieldValue::Timestamp(value) => Some(value.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }

    fn as_amount(&self) -> Option<f64> {
        match self {
            FieldValue::Int(value) => Some(*value as f64),
            FieldValue::Float(value) => Some(*value),
            FieldValue::Text(value) => parse_amount(value),
            _ => None,
        }
    }

    fn as_count(&self) -> Option<i64> {
        match self {
            FieldValue::Int(value) => Some(*value),
            _ => self
                .as_amount()
                .filter(|value| value.fract() == 0.0 && value.abs() < i64::MAX as f64)
                .map(|value| value as i64),
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Null => write!(f, "NULL"),
            FieldValue::Text(value) => write!(f, "'{value}'"),
            other => write!(f, "{}", other.as_text().unwrap_or_default()),
        }
    }
}

/// Parses a number the way payout sheets print them: thousands separators,
/// a rupee sign and stray whitespace are ignored.
pub fn parse_amount(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, ',' | '₹') && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

/// Named values of one projected row, in projection order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Projection {
    fields: Vec<(String, FieldValue)>,
}

impl Projection {
    pub fn new(fields: Vec<(String, FieldValue)>) -> Self {
        Projection { fields }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, FieldValue)> for Projection {
    fn from_iter<T: IntoIterator<Item = (S, FieldValue)>>(iter: T) -> Self {
        Projection::new(iter.into_iter().map(|(name, value)| (name.into(), value)).collect())
    }
}

/// Canonical payout record of one settlement document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PayoutRecord {
    pub outlet_name: Option<String>,
    pub platform: Option<String>,
    pub period_start: Option<String>,
    pub period_end: Option<String>,
    pub settlement_date: Option<String>,
    pub total_orders: i64,
    pub gross_sales_amt: f64,
    pub restaurant_discount_amt: f64,
    pub platform_commission_amt: f64,
    pub taxes_tcs_tds_amt: f64,
    pub marketing_ads_amt: f64,
    pub final_payout_amt: f64,
    pub utr_number: Option<String>,
}

impl PayoutRecord {
    /// Names export columns may write to.
    pub const FIELDS: [&'static str; 13] = [
        "outlet_name",
        "platform",
        "period_start",
        "period_end",
        "settlement_date",
        "total_orders",
        "gross_sales_amt",
        "restaurant_discount_amt",
        "platform_commission_amt",
        "taxes_tcs_tds_amt",
        "marketing_ads_amt",
        "final_payout_amt",
        "utr_number",
    ];

    /// Merges a projection into the record. A non-null value overwrites the
    /// field, a null leaves it untouched, and names that are not record
    /// fields are ignored.
    pub fn merge(&mut self, projection: &Projection) -> Result<(), RecordError> {
        for (name, value) in projection.iter() {
            if value.is_null() {
                continue;
            }
            if !self.set(name, value)? {
                debug!(field = %name, "ignoring projected value with no record field");
            }
        }
        Ok(())
    }

    /// Writes one non-null value, returning false for unknown field names.
    pub fn set(&mut self, field: &str, value: &FieldValue) -> Result<bool, RecordError> {
        let mismatch = || RecordError::FieldTypeMismatch {
            field: field.to_owned(),
            value: value.to_string(),
        };
        let text = || value.as_text();
        let amount = || value.as_amount().ok_or_else(mismatch);

        match field {
            "outlet_name" => self.outlet_name = text(),
            "platform" => self.platform = text(),
            "period_start" => self.period_start = text(),
            "period_end" => self.period_end = text(),
            "settlement_date" => self.settlement_date = text(),
            "utr_number" => self.utr_number = text(),
            "total_orders" => self.total_orders = value.as_count().ok_or_else(mismatch)?,
            "gross_sales_amt" => self.gross_sales_amt = amount()?,
            "restaurant_discount_amt" => self.restaurant_discount_amt = amount()?,
            "platform_commission_amt" => self.platform_commission_amt = amount()?,
            "taxes_tcs_tds_amt" => self.taxes_tcs_tds_amt = amount()?,
            "marketing_ads_amt" => self.marketing_ads_amt = amount()?,
            "final_payout_amt" => self.final_payout_amt = amount()?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_projection_overwrites_overlapping_fields() {
        let mut record = PayoutRecord::default();
        record
            .merge(&Projection::from_iter([("final_payout_amt", FieldValue::Float(10.0))]))
            .unwrap();
        record
            .merge(&Projection::from_iter([("final_payout_amt", FieldValue::Float(20.0))]))
            .unwrap();
        assert_eq!(record.final_payout_amt, 20.0);
    }

    #[test]
    fn null_never_erases() {
        let mut record = PayoutRecord::default();
        record
            .merge(&Projection::from_iter([
                ("utr_number", FieldValue::Text("UTR123".to_string())),
                ("total_orders", FieldValue::Int(12)),
            ]))
            .unwrap();
        record
            .merge(&Projection::from_iter([
                ("utr_number", FieldValue::Null),
                ("total_orders", FieldValue::Null),
            ]))
            .unwrap();
        assert_eq!(record.utr_number.as_deref(), Some("UTR123"));
        assert_eq!(record.total_orders, 12);
    }

    #[test]
    fn disjoint_projections_are_combined() {
        let mut record = PayoutRecord::default();
        record
            .merge(&Projection::from_iter([("gross_sales_amt", FieldValue::Float(500.5))]))
            .unwrap();
        record
            .merge(&Projection::from_iter([
                ("period_start", FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())),
                ("unknown_column", FieldValue::Int(1)),
            ]))
            .unwrap();
        assert_eq!(record.gross_sales_amt, 500.5);
        assert_eq!(record.period_start.as_deref(), Some("2024-03-01"));
    }

    #[test]
    fn text_amounts_are_coerced() {
        let mut record = PayoutRecord::default();
        record
            .merge(&Projection::from_iter([
                ("final_payout_amt", FieldValue::Text("₹ 1,234.50".to_string())),
                ("total_orders", FieldValue::Text("42".to_string())),
                ("utr_number", FieldValue::Float(123456789012.0)),
            ]))
            .unwrap();
        assert_eq!(record.final_payout_amt, 1234.5);
        assert_eq!(record.total_orders, 42);
        assert_eq!(record.utr_number.as_deref(), Some("123456789012"));
    }

    #[test]
    fn uncoercible_values_are_rejected() {
        let mut record = PayoutRecord::default();
        let error = record
            .merge(&Projection::from_iter([("final_payout_amt", FieldValue::Text("n/a".to_string()))]))
            .unwrap_err();
        assert_eq!(
            error,
            RecordError::FieldTypeMismatch {
                field: "final_payout_amt".to_string(),
                value: "'n/a'".to_string(),
            }
        );
        assert!(record.set("total_orders", &FieldValue::Float(2.5)).is_err());
        assert!(record.set("gross_sales_amt", &FieldValue::Bool(true)).is_err());
    }

    #[test]
    fn timestamps_at_midnight_render_as_dates() {
        let midnight = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap().and_time(NaiveTime::MIN);
        let mut record = PayoutRecord::default();
        record.set("period_end", &FieldValue::Timestamp(midnight)).unwrap();
        assert_eq!(record.period_end.as_deref(), Some("2024-03-31"));
    }

    #[test]
    fn document_ids_are_positive() {
        assert_eq!(DocumentId::try_from(7).map(DocumentId::get), Ok(7));
        assert_eq!(DocumentId::try_from(0), Err(0));
        assert_eq!(DocumentId::try_from(-3), Err(-3));
    }

    #[test]
    fn record_serializes_every_field() {
        let json = serde_json::to_value(PayoutRecord::default()).unwrap();
        let object = json.as_object().unwrap();
        for field in PayoutRecord::FIELDS {
            assert!(object.contains_key(field), "missing {field}");
        }
    }
}
