//! Withdrawal sustainability

use super::{require_finite_non_negative, EngineAssumptions, Evaluation};
use crate::error::{DomainError, ValidationError};
use crate::formulas::monthly_rate_from_annual;
use crate::models::{
    Depletion, TraceStep, WithdrawalAssessment, WithdrawalInputs, WithdrawalOutcome,
};

/// Requests within this much of the rule amount count as sustainable
const SUSTAINABLE_TOLERANCE: f64 = 1e-9;

pub(super) fn inputs(
    fund_amount: f64,
    monthly_withdrawal: f64,
    withdrawal_rate_rule: f64,
    assumptions: &EngineAssumptions,
) -> Result<WithdrawalInputs, ValidationError> {
    let fund_amount = require_finite_non_negative("fund_amount", fund_amount)?;
    let monthly_withdrawal = require_finite_non_negative("monthly_withdrawal", monthly_withdrawal)?;
    if !(withdrawal_rate_rule.is_finite() && withdrawal_rate_rule > 0.0 && withdrawal_rate_rule <= 1.0) {
        return Err(ValidationError::range(
            "withdrawal_rate_rule",
            "must be greater than 0 and at most 1",
        ));
    }

    Ok(WithdrawalInputs {
        fund_amount,
        monthly_withdrawal,
        withdrawal_rate_rule,
        post_retirement_return: assumptions.post_retirement_return,
        depletion_cap_years: assumptions.depletion_cap_years,
    })
}

pub(super) fn evaluate(inputs: &WithdrawalInputs) -> Result<Evaluation, DomainError> {
    let mut eval = Evaluation::default();

    let sustainable_monthly = inputs.fund_amount * inputs.withdrawal_rate_rule / 12.0;
    eval.trace.push(TraceStep::new(
        "withdrawal_rule_amount",
        &[
            ("fund_amount", inputs.fund_amount),
            ("withdrawal_rate_rule", inputs.withdrawal_rate_rule),
        ],
        sustainable_monthly,
    ));

    eval.put("fund_amount", inputs.fund_amount);
    eval.put("monthly_withdrawal", inputs.monthly_withdrawal);
    eval.put("sustainable_monthly", sustainable_monthly);
    if inputs.fund_amount > 0.0 {
        eval.put(
            "annual_withdrawal_rate",
            inputs.monthly_withdrawal * 12.0 / inputs.fund_amount,
        );
    }

    let assessment = if inputs.monthly_withdrawal <= sustainable_monthly + SUSTAINABLE_TOLERANCE {
        eval.put("sustainable", 1.0);
        WithdrawalAssessment {
            outcome: WithdrawalOutcome::SustainableIndefinitely,
            sustainable_monthly,
            depletion: None,
        }
    } else {
        let monthly_rate = monthly_rate_from_annual(inputs.post_retirement_return)?;
        let depletion = months_until_depleted(inputs, monthly_rate);
        let cap_months = f64::from(inputs.depletion_cap_years) * 12.0;

        let traced_months = match depletion {
            Depletion::Months { months } => {
                eval.put("months_to_depletion", f64::from(months));
                eval.put("years_to_depletion", f64::from(months) / 12.0);
                f64::from(months)
            }
            Depletion::ExceedsCap { years } => {
                eval.put("depletion_capped_years", f64::from(years));
                cap_months
            }
        };
        eval.trace.push(TraceStep::new(
            "amortize_until_depleted",
            &[
                ("fund_amount", inputs.fund_amount),
                ("monthly_withdrawal", inputs.monthly_withdrawal),
                ("rate_per_period", monthly_rate),
                ("cap_months", cap_months),
            ],
            traced_months,
        ));

        eval.put("sustainable", 0.0);
        WithdrawalAssessment {
            outcome: WithdrawalOutcome::Depleting,
            sustainable_monthly,
            depletion: Some(depletion),
        }
    };

    eval.withdrawal = Some(assessment);
    Ok(eval)
}

/// Grow, withdraw, repeat until the balance is gone or the cap is reached
fn months_until_depleted(inputs: &WithdrawalInputs, monthly_rate: f64) -> Depletion {
    let cap_months = inputs.depletion_cap_years.saturating_mul(12);
    let mut balance = inputs.fund_amount;
    let mut months: u32 = 0;

    while balance > 0.0 {
        if months >= cap_months {
            return Depletion::ExceedsCap {
                years: inputs.depletion_cap_years,
            };
        }
        balance = balance * (1.0 + monthly_rate) - inputs.monthly_withdrawal;
        months += 1;
    }

    Depletion::Months { months }
}
