//! Goal-based planning: required savings and income replacement

use super::{project_timeline, require_finite_non_negative, EngineAssumptions, Evaluation};
use crate::error::{DomainError, ValidationError};
use crate::formulas::{
    future_value_lump_sum, monthly_rate_from_annual, payment_for_future_value,
    present_value_annuity,
};
use crate::models::{IncomeReplacementInputs, RequiredSavingsInputs, TraceStep};
use crate::profile::{Profile, ProfileField};

pub const MAX_RETIREMENT_YEARS: u32 = 60;
pub const MAX_REPLACEMENT_RATIO: f64 = 1.5;

fn required(profile_value: Option<f64>, field: ProfileField) -> Result<f64, ValidationError> {
    profile_value.ok_or_else(|| ValidationError::required(field))
}

pub(super) fn required_savings_inputs(
    profile: &Profile,
    target_fund: f64,
) -> Result<RequiredSavingsInputs, ValidationError> {
    let target_fund = require_finite_non_negative("target_fund", target_fund)?;

    Ok(RequiredSavingsInputs {
        age: profile
            .age()
            .ok_or_else(|| ValidationError::required(ProfileField::Age))?,
        retirement_age: profile
            .retirement_age()
            .ok_or_else(|| ValidationError::required(ProfileField::RetirementAge))?,
        current_savings: required(profile.current_savings(), ProfileField::CurrentSavings)?,
        expected_return: required(profile.expected_return(), ProfileField::ExpectedReturn)?,
        target_fund,
    })
}

pub(super) fn income_replacement_inputs(
    profile: &Profile,
    replacement_ratio: f64,
    retirement_years: u32,
    assumptions: &EngineAssumptions,
) -> Result<IncomeReplacementInputs, ValidationError> {
    if !(replacement_ratio.is_finite() && replacement_ratio > 0.0 && replacement_ratio <= MAX_REPLACEMENT_RATIO) {
        return Err(ValidationError::range(
            "replacement_ratio",
            format!("must be greater than 0 and at most {}", MAX_REPLACEMENT_RATIO),
        ));
    }
    if retirement_years == 0 || retirement_years > MAX_RETIREMENT_YEARS {
        return Err(ValidationError::range(
            "retirement_years",
            format!("must be between 1 and {}", MAX_RETIREMENT_YEARS),
        ));
    }

    Ok(IncomeReplacementInputs {
        timeline: profile.timeline_inputs(assumptions.inflation_rate)?,
        monthly_income: required(profile.monthly_income(), ProfileField::MonthlyIncome)?,
        replacement_ratio,
        retirement_years,
        post_retirement_return: assumptions.post_retirement_return,
    })
}

pub(super) fn evaluate_required_savings(
    inputs: &RequiredSavingsInputs,
) -> Result<Evaluation, DomainError> {
    let mut eval = Evaluation::default();

    let years = inputs
        .retirement_age
        .checked_sub(inputs.age)
        .filter(|years| *years > 0)
        .ok_or_else(|| {
            DomainError::new("required_savings", "periods", 0.0).for_field(ProfileField::RetirementAge)
        })?;
    let periods = f64::from(years * 12);

    let monthly_rate = monthly_rate_from_annual(inputs.expected_return)
        .map_err(|e| e.for_field(ProfileField::ExpectedReturn))?;
    eval.trace.push(TraceStep::new(
        "monthly_rate_from_annual",
        &[("annual_rate", inputs.expected_return)],
        monthly_rate,
    ));

    let fv_from_savings = future_value_lump_sum(inputs.current_savings, monthly_rate, periods)
        .map_err(|e| e.for_field(ProfileField::CurrentSavings))?;
    eval.trace.push(TraceStep::new(
        "future_value_lump_sum",
        &[
            ("pv", inputs.current_savings),
            ("rate_per_period", monthly_rate),
            ("periods", periods),
        ],
        fv_from_savings,
    ));

    let gap = (inputs.target_fund - fv_from_savings).max(0.0);
    let required_monthly = if gap > 0.0 {
        let payment = payment_for_future_value(gap, monthly_rate, periods)?;
        eval.trace.push(TraceStep::new(
            "payment_for_future_value",
            &[
                ("fv", gap),
                ("rate_per_period", monthly_rate),
                ("periods", periods),
            ],
            payment,
        ));
        payment
    } else {
        0.0
    };

    eval.put("periods", periods);
    eval.put("monthly_rate", monthly_rate);
    eval.put("target_fund", inputs.target_fund);
    eval.put("fv_from_savings", fv_from_savings);
    eval.put("gap", gap);
    eval.put("required_monthly_savings", required_monthly);
    eval.put("already_sufficient", if gap > 0.0 { 0.0 } else { 1.0 });

    Ok(eval)
}

pub(super) fn evaluate_income_replacement(
    inputs: &IncomeReplacementInputs,
) -> Result<Evaluation, DomainError> {
    let mut eval = Evaluation::default();

    let desired_monthly_income = inputs.monthly_income * inputs.replacement_ratio;
    eval.trace.push(TraceStep::new(
        "product",
        &[
            ("monthly_income", inputs.monthly_income),
            ("replacement_ratio", inputs.replacement_ratio),
        ],
        desired_monthly_income,
    ));

    let post_rate = monthly_rate_from_annual(inputs.post_retirement_return)?;
    let retirement_periods = f64::from(inputs.retirement_years * 12);
    let required_fund = present_value_annuity(desired_monthly_income, post_rate, retirement_periods)?;
    eval.trace.push(TraceStep::new(
        "present_value_annuity",
        &[
            ("pmt", desired_monthly_income),
            ("rate_per_period", post_rate),
            ("periods", retirement_periods),
        ],
        required_fund,
    ));

    let projection = project_timeline(&inputs.timeline, Some("projection"), &mut eval.trace)?;
    let shortfall = (required_fund - projection.total).max(0.0);
    let funded_ratio = if required_fund > 0.0 {
        projection.total / required_fund
    } else {
        0.0
    };

    eval.put("desired_monthly_income", desired_monthly_income);
    eval.put("required_fund", required_fund);
    eval.put("projected_total", projection.total);
    eval.put("projected_real_value", projection.real_value);
    eval.put("shortfall", shortfall);
    eval.put("funded_ratio", funded_ratio);

    Ok(eval)
}

#[cfg(test)]
mod tests {
    use super::super::{CalculationEngine, EngineAssumptions};
    use crate::error::AdvisorError;
    use crate::profile::{ProfileField, ProfileStore};
    use approx::assert_relative_eq;
    use serde_json::json;

    fn store() -> ProfileStore {
        let mut store = ProfileStore::new();
        store
            .apply(&[
                (ProfileField::Age, json!(35)),
                (ProfileField::RetirementAge, json!(65)),
                (ProfileField::MonthlyIncome, json!(6000)),
                (ProfileField::CurrentSavings, json!(25000)),
                (ProfileField::MonthlySavings, json!(500)),
                (ProfileField::ExpectedReturn, json!(0.07)),
            ])
            .unwrap();
        store
    }

    fn engine() -> CalculationEngine {
        CalculationEngine::new(EngineAssumptions::default())
    }

    #[test]
    fn test_required_savings_reproduces_current_plan() {
        let engine = engine();
        let store = store();
        let projected = engine
            .compute_timeline(store.profile())
            .unwrap()
            .output("total")
            .unwrap();

        let result = engine
            .compute_required_savings(store.profile(), projected)
            .unwrap();
        assert_relative_eq!(
            result.output("required_monthly_savings").unwrap(),
            500.0,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_required_savings_when_already_sufficient() {
        let result = engine().compute_required_savings(store().profile(), 100_000.0).unwrap();
        assert_eq!(result.output("required_monthly_savings"), Some(0.0));
        assert_eq!(result.output("already_sufficient"), Some(1.0));
    }

    #[test]
    fn test_income_replacement_shortfall() {
        let result = engine()
            .compute_income_replacement(store().profile(), 0.8, 25)
            .unwrap();

        assert_eq!(result.output("desired_monthly_income"), Some(4800.0));
        let required_fund = result.output("required_fund").unwrap();
        let projected = result.output("projected_total").unwrap();
        let shortfall = result.output("shortfall").unwrap();
        assert!(required_fund > 0.0);
        assert_relative_eq!(shortfall, (required_fund - projected).max(0.0));
    }

    #[test]
    fn test_income_replacement_validates_arguments() {
        let engine = engine();
        let store = store();
        assert!(matches!(
            engine.compute_income_replacement(store.profile(), 0.0, 25),
            Err(AdvisorError::Validation(_))
        ));
        assert!(matches!(
            engine.compute_income_replacement(store.profile(), 0.8, 0),
            Err(AdvisorError::Validation(_))
        ));
    }
}
