//! Calculation engine
//!
//! Composes formula-library calls into named calculations. Every calculation
//! first freezes its inputs into an [`InputsSnapshot`]; outputs and trace are
//! then a pure function of that snapshot, which is what makes replay possible.
//! Nothing here touches the stored profile or the history.

mod planning;
mod withdrawal;

use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

use crate::audit::snapshot_hash;
use crate::config::AdvisorConfig;
use crate::error::{DomainError, ValidationError};
use crate::formulas::{deflate, future_value_annuity, future_value_lump_sum, monthly_rate_from_annual};
use crate::models::{
    CalculationResult, CalculationType, InputsSnapshot, ScenarioDelta, TimelineInputs, TraceStep,
    WithdrawalAssessment,
};
use crate::profile::{Profile, ProfileField};
use crate::Result;

/// Partial field map applied on top of a base profile
pub type ScenarioOverrides = BTreeMap<ProfileField, Value>;

/// Economic assumptions copied into every snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineAssumptions {
    pub inflation_rate: f64,
    pub post_retirement_return: f64,
    pub withdrawal_rule: f64,
    pub depletion_cap_years: u32,
}

impl From<&AdvisorConfig> for EngineAssumptions {
    fn from(config: &AdvisorConfig) -> Self {
        Self {
            inflation_rate: config.inflation_rate,
            post_retirement_return: config.post_retirement_return,
            withdrawal_rule: config.withdrawal_rule,
            depletion_cap_years: config.depletion_cap_years,
        }
    }
}

impl Default for EngineAssumptions {
    fn default() -> Self {
        Self::from(&AdvisorConfig::default())
    }
}

/// Outputs of evaluating a snapshot, before they are stamped into a result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub outputs: BTreeMap<String, f64>,
    pub trace: Vec<TraceStep>,
    pub delta: Option<ScenarioDelta>,
    pub withdrawal: Option<WithdrawalAssessment>,
}

impl Evaluation {
    fn put(&mut self, name: &str, value: f64) {
        self.outputs.insert(name.to_string(), value);
    }
}

#[derive(Debug, Clone)]
pub struct CalculationEngine {
    assumptions: EngineAssumptions,
}

impl CalculationEngine {
    pub fn new(assumptions: EngineAssumptions) -> Self {
        Self { assumptions }
    }

    pub fn from_config(config: &AdvisorConfig) -> Self {
        Self::new(EngineAssumptions::from(config))
    }

    pub fn assumptions(&self) -> &EngineAssumptions {
        &self.assumptions
    }

    /// Accumulation projection to retirement (TIMELINE)
    pub fn compute_timeline(&self, profile: &Profile) -> Result<CalculationResult> {
        let inputs = profile.timeline_inputs(self.assumptions.inflation_rate)?;
        self.run(CalculationType::Timeline, InputsSnapshot::Timeline(inputs))
    }

    /// Re-run the timeline with `overrides` applied and report deltas (SCENARIO).
    /// Overrides are validated against profile rules before anything is computed.
    pub fn compute_scenario(
        &self,
        base_profile: &Profile,
        overrides: &ScenarioOverrides,
    ) -> Result<CalculationResult> {
        let edits: Vec<(ProfileField, Value)> = overrides
            .iter()
            .map(|(field, value)| (*field, value.clone()))
            .collect();
        let scenario_profile = base_profile.with_edits(&edits)?;

        let base = base_profile.timeline_inputs(self.assumptions.inflation_rate)?;
        let scenario = scenario_profile.timeline_inputs(self.assumptions.inflation_rate)?;

        self.run(
            CalculationType::Scenario,
            InputsSnapshot::Scenario { base, scenario },
        )
    }

    /// Sustainability of a monthly withdrawal from a fund (WITHDRAWAL)
    pub fn compute_withdrawal(
        &self,
        fund_amount: f64,
        monthly_withdrawal: f64,
        withdrawal_rate_rule: Option<f64>,
    ) -> Result<CalculationResult> {
        let inputs = withdrawal::inputs(
            fund_amount,
            monthly_withdrawal,
            withdrawal_rate_rule.unwrap_or(self.assumptions.withdrawal_rule),
            &self.assumptions,
        )?;
        self.run(CalculationType::Withdrawal, InputsSnapshot::Withdrawal(inputs))
    }

    /// Monthly contribution needed to reach `target_fund` at retirement
    pub fn compute_required_savings(
        &self,
        profile: &Profile,
        target_fund: f64,
    ) -> Result<CalculationResult> {
        let inputs = planning::required_savings_inputs(profile, target_fund)?;
        self.run(
            CalculationType::RequiredSavings,
            InputsSnapshot::RequiredSavings(inputs),
        )
    }

    /// Fund needed to replace `replacement_ratio` of income for `retirement_years`
    pub fn compute_income_replacement(
        &self,
        profile: &Profile,
        replacement_ratio: f64,
        retirement_years: u32,
    ) -> Result<CalculationResult> {
        let inputs = planning::income_replacement_inputs(
            profile,
            replacement_ratio,
            retirement_years,
            &self.assumptions,
        )?;
        self.run(
            CalculationType::IncomeReplacement,
            InputsSnapshot::IncomeReplacement(inputs),
        )
    }

    fn run(&self, calculation_type: CalculationType, snapshot: InputsSnapshot) -> Result<CalculationResult> {
        let evaluation = evaluate(&snapshot)?;
        let result = CalculationResult {
            id: Uuid::new_v4(),
            calculation_type,
            inputs_hash: snapshot_hash(&snapshot),
            inputs_snapshot: snapshot,
            outputs: evaluation.outputs,
            trace: evaluation.trace,
            delta: evaluation.delta,
            withdrawal: evaluation.withdrawal,
            created_at: Utc::now(),
        };

        info!(
            calculation_type = %result.calculation_type,
            result_id = %result.id,
            steps = result.trace.len(),
            "Calculation completed"
        );

        Ok(result)
    }
}

/// Evaluate a snapshot. Pure: the same snapshot always yields the same evaluation.
pub fn evaluate(snapshot: &InputsSnapshot) -> std::result::Result<Evaluation, DomainError> {
    match snapshot {
        InputsSnapshot::Timeline(inputs) => {
            let mut eval = Evaluation::default();
            let figures = project_timeline(inputs, None, &mut eval.trace)?;
            figures.write_outputs(&mut eval, "");
            eval.put("years_to_retirement", f64::from(inputs.retirement_age - inputs.age));
            Ok(eval)
        }
        InputsSnapshot::Scenario { base, scenario } => evaluate_scenario(base, scenario),
        InputsSnapshot::Withdrawal(inputs) => withdrawal::evaluate(inputs),
        InputsSnapshot::RequiredSavings(inputs) => planning::evaluate_required_savings(inputs),
        InputsSnapshot::IncomeReplacement(inputs) => planning::evaluate_income_replacement(inputs),
    }
}

//
// ================= Timeline =================
//

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TimelineFigures {
    pub periods: f64,
    pub monthly_rate: f64,
    pub fv_from_savings: f64,
    pub fv_from_contributions: f64,
    pub total: f64,
    pub real_value: f64,
}

impl TimelineFigures {
    fn write_outputs(&self, eval: &mut Evaluation, prefix: &str) {
        eval.put(&format!("{}periods", prefix), self.periods);
        eval.put(&format!("{}monthly_rate", prefix), self.monthly_rate);
        eval.put(&format!("{}fv_from_savings", prefix), self.fv_from_savings);
        eval.put(&format!("{}fv_from_contributions", prefix), self.fv_from_contributions);
        eval.put(&format!("{}total", prefix), self.total);
        eval.put(&format!("{}real_value", prefix), self.real_value);
    }
}

/// Map a formula's parameter back to the profile field it came from
fn blame(err: DomainError, rate_field: ProfileField, amount_field: ProfileField) -> DomainError {
    let field = match err.parameter {
        "rate_per_period" | "annual_rate" => rate_field,
        "periods" => ProfileField::RetirementAge,
        _ => amount_field,
    };
    err.for_field(field)
}

fn scoped(step: TraceStep, scope: Option<&str>) -> TraceStep {
    match scope {
        Some(scope) => step.with_scope(scope),
        None => step,
    }
}

pub(crate) fn project_timeline(
    inputs: &TimelineInputs,
    scope: Option<&str>,
    trace: &mut Vec<TraceStep>,
) -> std::result::Result<TimelineFigures, DomainError> {
    let years = inputs
        .retirement_age
        .checked_sub(inputs.age)
        .filter(|years| *years > 0)
        .ok_or_else(|| {
            DomainError::new(
                "project_timeline",
                "periods",
                f64::from(inputs.retirement_age) - f64::from(inputs.age),
            )
            .for_field(ProfileField::RetirementAge)
        })?;
    let periods = f64::from(years * 12);

    let monthly_rate = monthly_rate_from_annual(inputs.expected_return)
        .map_err(|e| e.for_field(ProfileField::ExpectedReturn))?;
    trace.push(scoped(
        TraceStep::new(
            "monthly_rate_from_annual",
            &[("annual_rate", inputs.expected_return)],
            monthly_rate,
        ),
        scope,
    ));

    let fv_from_savings = future_value_lump_sum(inputs.current_savings, monthly_rate, periods)
        .map_err(|e| blame(e, ProfileField::ExpectedReturn, ProfileField::CurrentSavings))?;
    trace.push(scoped(
        TraceStep::new(
            "future_value_lump_sum",
            &[
                ("pv", inputs.current_savings),
                ("rate_per_period", monthly_rate),
                ("periods", periods),
            ],
            fv_from_savings,
        ),
        scope,
    ));

    let fv_from_contributions = future_value_annuity(inputs.monthly_savings, monthly_rate, periods)
        .map_err(|e| blame(e, ProfileField::ExpectedReturn, ProfileField::MonthlySavings))?;
    trace.push(scoped(
        TraceStep::new(
            "future_value_annuity",
            &[
                ("pmt", inputs.monthly_savings),
                ("rate_per_period", monthly_rate),
                ("periods", periods),
            ],
            fv_from_contributions,
        ),
        scope,
    ));

    let total = fv_from_savings + fv_from_contributions;
    trace.push(scoped(
        TraceStep::new(
            "sum",
            &[
                ("fv_from_savings", fv_from_savings),
                ("fv_from_contributions", fv_from_contributions),
            ],
            total,
        ),
        scope,
    ));

    // Inflation is annual; deflate over the same monthly periods
    let monthly_inflation = monthly_rate_from_annual(inputs.inflation_rate)?;
    let real_value = deflate(total, monthly_inflation, periods)?;
    trace.push(scoped(
        TraceStep::new(
            "deflate",
            &[
                ("nominal", total),
                ("inflation_rate", monthly_inflation),
                ("periods", periods),
            ],
            real_value,
        ),
        scope,
    ));

    Ok(TimelineFigures {
        periods,
        monthly_rate,
        fv_from_savings,
        fv_from_contributions,
        total,
        real_value,
    })
}

//
// ================= Scenario =================
//

fn percent_change(delta: f64, base: f64) -> f64 {
    if base == 0.0 {
        0.0
    } else {
        delta / base * 100.0
    }
}

fn evaluate_scenario(
    base: &TimelineInputs,
    scenario: &TimelineInputs,
) -> std::result::Result<Evaluation, DomainError> {
    let mut eval = Evaluation::default();

    let base_figures = project_timeline(base, Some("base"), &mut eval.trace)?;
    let scenario_figures = project_timeline(scenario, Some("scenario"), &mut eval.trace)?;

    let delta_total = scenario_figures.total - base_figures.total;
    let delta_real = scenario_figures.real_value - base_figures.real_value;
    let delta = ScenarioDelta {
        total: delta_total,
        total_pct: percent_change(delta_total, base_figures.total),
        real_value: delta_real,
        real_value_pct: percent_change(delta_real, base_figures.real_value),
    };
    eval.trace.push(TraceStep::new(
        "difference",
        &[
            ("scenario_total", scenario_figures.total),
            ("base_total", base_figures.total),
        ],
        delta_total,
    ));

    scenario_figures.write_outputs(&mut eval, "");
    eval.put("base_total", base_figures.total);
    eval.put("base_real_value", base_figures.real_value);
    eval.put("delta_total", delta.total);
    eval.put("delta_total_pct", delta.total_pct);
    eval.put("delta_real_value", delta.real_value);
    eval.put("delta_real_value_pct", delta.real_value_pct);
    eval.delta = Some(delta);

    Ok(eval)
}

pub(crate) fn require_finite_non_negative(
    field: &str,
    value: f64,
) -> std::result::Result<f64, ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::format(field, "must be a finite number"));
    }
    if value < 0.0 {
        return Err(ValidationError::range(field, "must be zero or more"));
    }
    Ok(value)
}
