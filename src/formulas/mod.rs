//! Formula library
//!
//! Pure time-value-of-money functions. Periods and rates must share a unit:
//! pass a monthly rate with a month count. Callers convert annual rates with
//! [`monthly_rate_from_annual`], never `annual / 12`.

use crate::error::DomainError;

/// Rates closer to zero than this use the zero-rate closed forms
const ZERO_RATE_EPSILON: f64 = 1e-12;

fn check_inputs(formula: &'static str, rate: f64, periods: f64) -> Result<(), DomainError> {
    if !rate.is_finite() || 1.0 + rate <= 0.0 {
        return Err(DomainError::new(formula, "rate_per_period", rate));
    }
    if !periods.is_finite() || periods < 0.0 {
        return Err(DomainError::new(formula, "periods", periods));
    }
    Ok(())
}

fn check_amount(formula: &'static str, parameter: &'static str, value: f64) -> Result<(), DomainError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(DomainError::new(formula, parameter, value))
    }
}

/// FV = pv · (1 + rate)^periods
pub fn future_value_lump_sum(pv: f64, rate_per_period: f64, periods: f64) -> Result<f64, DomainError> {
    const NAME: &str = "future_value_lump_sum";
    check_inputs(NAME, rate_per_period, periods)?;
    check_amount(NAME, "pv", pv)?;

    if rate_per_period.abs() < ZERO_RATE_EPSILON {
        return Ok(pv);
    }
    Ok(pv * (1.0 + rate_per_period).powf(periods))
}

/// FV = pmt · [(1 + rate)^periods − 1] / rate, or pmt · periods at zero rate
pub fn future_value_annuity(pmt: f64, rate_per_period: f64, periods: f64) -> Result<f64, DomainError> {
    const NAME: &str = "future_value_annuity";
    check_inputs(NAME, rate_per_period, periods)?;
    check_amount(NAME, "pmt", pmt)?;

    if rate_per_period.abs() < ZERO_RATE_EPSILON {
        return Ok(pmt * periods);
    }
    Ok(pmt * ((1.0 + rate_per_period).powf(periods) - 1.0) / rate_per_period)
}

/// PV = pmt · [1 − (1 + rate)^(−periods)] / rate, or pmt · periods at zero rate
pub fn present_value_annuity(pmt: f64, rate_per_period: f64, periods: f64) -> Result<f64, DomainError> {
    const NAME: &str = "present_value_annuity";
    check_inputs(NAME, rate_per_period, periods)?;
    check_amount(NAME, "pmt", pmt)?;

    if rate_per_period.abs() < ZERO_RATE_EPSILON {
        return Ok(pmt * periods);
    }
    Ok(pmt * (1.0 - (1.0 + rate_per_period).powf(-periods)) / rate_per_period)
}

/// real = nominal / (1 + inflation_rate)^periods
pub fn deflate(nominal: f64, inflation_rate: f64, periods: f64) -> Result<f64, DomainError> {
    const NAME: &str = "deflate";
    if !inflation_rate.is_finite() || 1.0 + inflation_rate <= 0.0 {
        return Err(DomainError::new(NAME, "inflation_rate", inflation_rate));
    }
    if !periods.is_finite() || periods < 0.0 {
        return Err(DomainError::new(NAME, "periods", periods));
    }
    check_amount(NAME, "nominal", nominal)?;

    Ok(nominal / (1.0 + inflation_rate).powf(periods))
}

/// Level payment that accumulates to `fv` (sinking fund), or fv / periods at zero rate
pub fn payment_for_future_value(fv: f64, rate_per_period: f64, periods: f64) -> Result<f64, DomainError> {
    const NAME: &str = "payment_for_future_value";
    check_inputs(NAME, rate_per_period, periods)?;
    check_amount(NAME, "fv", fv)?;
    if periods == 0.0 {
        return Err(DomainError::new(NAME, "periods", periods));
    }

    if rate_per_period.abs() < ZERO_RATE_EPSILON {
        return Ok(fv / periods);
    }
    Ok(fv * rate_per_period / ((1.0 + rate_per_period).powf(periods) - 1.0))
}

/// Effective monthly rate equivalent to an annual rate: (1 + annual)^(1/12) − 1
pub fn monthly_rate_from_annual(annual_rate: f64) -> Result<f64, DomainError> {
    if !annual_rate.is_finite() || 1.0 + annual_rate <= 0.0 {
        return Err(DomainError::new("monthly_rate_from_annual", "annual_rate", annual_rate));
    }
    Ok((1.0 + annual_rate).powf(1.0 / 12.0) - 1.0)
}
