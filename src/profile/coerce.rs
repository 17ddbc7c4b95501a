//! Raw value coercion for profile fields
//!
//! Accepts JSON numbers or loosely formatted strings ("$5,000", "7%", "12k")
//! and returns a range-checked [`FieldValue`].

use serde_json::Value;

use super::{
    FieldValue, ProfileField, MAX_AGE, MAX_EXPECTED_RETURN, MAX_RETIREMENT_AGE, MIN_AGE,
    MIN_RETIREMENT_AGE,
};
use crate::error::ValidationError;
use crate::models::RiskTolerance;

/// Coerce a raw value into the typed value for `field`
pub fn coerce_field(field: ProfileField, raw: &Value) -> Result<FieldValue, ValidationError> {
    match field {
        ProfileField::Age => years(field, raw, MIN_AGE, MAX_AGE),
        ProfileField::RetirementAge => years(field, raw, MIN_RETIREMENT_AGE, MAX_RETIREMENT_AGE),
        ProfileField::MonthlyIncome | ProfileField::CurrentSavings | ProfileField::MonthlySavings => {
            amount(field, raw)
        }
        ProfileField::ExpectedReturn => rate(field, raw),
        ProfileField::RiskTolerance => risk(field, raw),
        ProfileField::FinancialGoals => text(field, raw),
    }
}

struct Parsed {
    value: f64,
    percent: bool,
}

fn parse_number(field: ProfileField, raw: &Value) -> Result<Parsed, ValidationError> {
    let parsed = match raw {
        Value::Number(n) => n.as_f64().map(|value| Parsed { value, percent: false }),
        Value::String(s) => parse_numeric_text(s),
        _ => None,
    };

    match parsed {
        Some(p) if p.value.is_finite() => Ok(p),
        _ => Err(ValidationError::format(field, format!("could not read {} as a number", raw))),
    }
}

/// "$1,250.50", "12k", "1.2m", "7%"
fn parse_numeric_text(text: &str) -> Option<Parsed> {
    let mut s = text.trim().to_lowercase().replace([',', '$', ' '], "");
    let mut percent = false;
    let mut multiplier = 1.0;

    if let Some(stripped) = s.strip_suffix('%') {
        s = stripped.to_string();
        percent = true;
    } else if let Some(stripped) = s.strip_suffix('k') {
        s = stripped.to_string();
        multiplier = 1_000.0;
    } else if let Some(stripped) = s.strip_suffix('m') {
        s = stripped.to_string();
        multiplier = 1_000_000.0;
    }

    s.parse::<f64>().ok().map(|value| Parsed {
        value: value * multiplier,
        percent,
    })
}

fn years(field: ProfileField, raw: &Value, min: u32, max: u32) -> Result<FieldValue, ValidationError> {
    let parsed = parse_number(field, raw)?;
    if parsed.percent || parsed.value.fract() != 0.0 {
        return Err(ValidationError::format(field, "must be a whole number of years"));
    }
    if parsed.value < f64::from(min) || parsed.value > f64::from(max) {
        return Err(ValidationError::range(
            field,
            format!("must be between {} and {}", min, max),
        ));
    }
    Ok(FieldValue::Years(parsed.value as u32))
}

fn amount(field: ProfileField, raw: &Value) -> Result<FieldValue, ValidationError> {
    let parsed = parse_number(field, raw)?;
    if parsed.percent {
        return Err(ValidationError::format(field, "must be a currency amount, not a percentage"));
    }
    if parsed.value < 0.0 {
        return Err(ValidationError::range(field, "must be zero or more"));
    }
    Ok(FieldValue::Amount(parsed.value))
}

/// Explicit percentages and bare numbers above 1 are read as percent;
/// bare numbers at or below 1 are already fractions.
fn rate(field: ProfileField, raw: &Value) -> Result<FieldValue, ValidationError> {
    let parsed = parse_number(field, raw)?;
    let fraction = if parsed.percent || parsed.value > 1.0 {
        parsed.value / 100.0
    } else {
        parsed.value
    };

    if !(0.0..=MAX_EXPECTED_RETURN).contains(&fraction) {
        return Err(ValidationError::range(
            field,
            format!("must be between 0% and {}%", MAX_EXPECTED_RETURN * 100.0),
        ));
    }
    Ok(FieldValue::Rate(fraction))
}

fn risk(field: ProfileField, raw: &Value) -> Result<FieldValue, ValidationError> {
    raw.as_str()
        .and_then(RiskTolerance::parse)
        .map(FieldValue::Risk)
        .ok_or_else(|| {
            ValidationError::format(field, "must be one of conservative, moderate, aggressive")
        })
}

fn text(field: ProfileField, raw: &Value) -> Result<FieldValue, ValidationError> {
    match raw.as_str().map(str::trim) {
        Some(s) if !s.is_empty() => Ok(FieldValue::Text(s.to_string())),
        _ => Err(ValidationError::format(field, "must be a non-empty description")),
    }
}
