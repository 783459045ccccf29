use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::LifecycleError;

/// Largest amount that fits a `NUMERIC(12, 2)` column.
const MAX_AMOUNT_UNITS: i64 = 10_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceType {
    HearingConciliation,
    HearingInstruction,
    DocumentCopy,
    Filing,
    Diligence,
    Other,
}

impl ServiceType {
    pub const ALL: [ServiceType; 6] = [
        ServiceType::HearingConciliation,
        ServiceType::HearingInstruction,
        ServiceType::DocumentCopy,
        ServiceType::Filing,
        ServiceType::Diligence,
        ServiceType::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceType::HearingConciliation => "hearing-conciliation",
            ServiceType::HearingInstruction => "hearing-instruction",
            ServiceType::DocumentCopy => "document-copy",
            ServiceType::Filing => "filing",
            ServiceType::Diligence => "diligence",
            ServiceType::Other => "other",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase().replace('_', "-");
        ServiceType::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == normalized)
            .ok_or_else(|| UnknownVariant::new("service type", value))
    }
}

/// Where a service takes place. Stored as JSONB on the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub state: String,
}

impl Location {
    pub fn new(city: &str, state: &str) -> Result<Self, LifecycleError> {
        let city = city.trim();
        if city.is_empty() {
            return Err(LifecycleError::Validation("location city must not be empty".into()));
        }
        let state = state.trim().to_uppercase();
        if state.len() != 2 || !state.chars().all(|ch| ch.is_ascii_alphabetic()) {
            return Err(LifecycleError::Validation(
                "location state must be a two-letter code".into(),
            ));
        }
        Ok(Self {
            city: city.to_string(),
            state,
        })
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({ "city": self.city, "state": self.state })
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    pub fn matches(&self, other: &Location) -> bool {
        self.state == other.state && self.city.eq_ignore_ascii_case(&other.city)
    }
}

/// Parses a form amount such as `500`, `500.00` or `500,00`.
pub fn parse_amount(field: &str, raw: &str) -> Result<Decimal, LifecycleError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(LifecycleError::Validation(format!("{field} is required")));
    }
    let candidate = if trimmed.contains(',') && !trimmed.contains('.') {
        trimmed.replace(',', ".")
    } else {
        trimmed.to_string()
    };
    let value = Decimal::from_str(&candidate)
        .map_err(|_| LifecycleError::Validation(format!("{field} must be a decimal amount")))?;
    normalize_amount(field, value)
}

/// Rejects negative, oversized or sub-cent amounts and fixes the scale at two places.
pub fn normalize_amount(field: &str, value: Decimal) -> Result<Decimal, LifecycleError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(LifecycleError::Validation(format!("{field} must not be negative")));
    }
    if value >= Decimal::new(MAX_AMOUNT_UNITS, 0) {
        return Err(LifecycleError::Validation(format!("{field} is too large")));
    }
    let mut normalized = value.normalize();
    if normalized.scale() > 2 {
        return Err(LifecycleError::Validation(format!(
            "{field} must have at most two decimal places"
        )));
    }
    normalized.rescale(2);
    Ok(normalized)
}

/// Accepts RFC 3339 timestamps as well as the `datetime-local` shapes browsers submit.
pub fn parse_datetime(field: &str, raw: &str) -> Result<NaiveDateTime, LifecycleError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(LifecycleError::Validation(format!("{field} is required")));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.naive_utc());
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(parsed);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        // date-only deadlines run until the end of that day
        let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default();
        return Ok(date.and_time(end_of_day));
    }
    Err(LifecycleError::Validation(format!("{field} must be a date-time such as 2026-01-31T14:30")))
}

pub fn parse_optional_datetime(
    field: &str,
    raw: Option<&str>,
) -> Result<Option<NaiveDateTime>, LifecycleError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_datetime(field, value).map(Some),
    }
}

pub fn optional_text(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_service_types_in_either_separator_style() {
        assert_eq!(
            "hearing-conciliation".parse::<ServiceType>(),
            Ok(ServiceType::HearingConciliation)
        );
        assert_eq!(
            "DOCUMENT_COPY".parse::<ServiceType>(),
            Ok(ServiceType::DocumentCopy)
        );
        assert!("courier".parse::<ServiceType>().is_err());
    }

    #[test]
    fn location_requires_two_letter_state() {
        let location = Location::new(" São Paulo ", "sp").unwrap();
        assert_eq!(location.city, "São Paulo");
        assert_eq!(location.state, "SP");
        assert!(Location::new("Recife", "PER").is_err());
        assert!(Location::new("  ", "PE").is_err());
    }

    #[test]
    fn amounts_are_fixed_at_two_places() {
        assert_eq!(parse_amount("value", "500").unwrap().to_string(), "500.00");
        assert_eq!(
            parse_amount("value", "199,9").unwrap().to_string(),
            "199.90"
        );
        assert!(parse_amount("value", "-1").is_err());
        assert!(parse_amount("value", "1.234").is_err());
        assert!(parse_amount("value", "abc").is_err());
        assert!(parse_amount("value", "").is_err());
    }

    #[test]
    fn datetimes_accept_browser_and_rfc3339_shapes() {
        let local = parse_datetime("date_time", "2026-11-02T09:30").unwrap();
        assert_eq!(local.to_string(), "2026-11-02 09:30:00");

        let zoned = parse_datetime("date_time", "2026-11-02T09:30:00-03:00").unwrap();
        assert_eq!(zoned.to_string(), "2026-11-02 12:30:00");

        let deadline = parse_optional_datetime("deadline", Some("2026-11-05")).unwrap();
        assert_eq!(deadline.unwrap().to_string(), "2026-11-05 23:59:59");

        assert_eq!(
            parse_optional_datetime("deadline", Some("  ")).unwrap(),
            None
        );
        assert!(parse_datetime("date_time", "tomorrow").is_err());
    }
}
