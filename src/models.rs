//! Core data models for the retirement advisor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

//
// ================= Enums =================
//

/// Interview phase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    PersonaBuilding,
    ProfileComplete,
    Interactive,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::PersonaBuilding => "persona_building",
            Phase::ProfileComplete => "profile_complete",
            Phase::Interactive => "interactive",
        })
    }
}

/// Intent produced by the external classifier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    Persona,
    Calculation,
    Scenario,
    Explanation,
    Advice,
    General,
}

impl Intent {
    pub const ALL: [Intent; 6] = [
        Intent::Persona,
        Intent::Calculation,
        Intent::Scenario,
        Intent::Explanation,
        Intent::Advice,
        Intent::General,
    ];

    /// Parse a classifier label. Unknown labels fall back to `General`.
    pub fn parse_lenient(label: &str) -> Intent {
        let normalized = label
            .trim()
            .trim_matches(|c: char| !c.is_ascii_alphanumeric())
            .to_ascii_uppercase();

        match normalized.as_str() {
            "PERSONA" | "PROFILE" | "PERSONA_UPDATE" => Intent::Persona,
            "CALCULATION" | "CALCULATE" => Intent::Calculation,
            "SCENARIO" | "WHAT_IF" => Intent::Scenario,
            "EXPLANATION" | "EXPLAIN" => Intent::Explanation,
            "ADVICE" => Intent::Advice,
            _ => Intent::General,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Intent::Persona => "PERSONA",
            Intent::Calculation => "CALCULATION",
            Intent::Scenario => "SCENARIO",
            Intent::Explanation => "EXPLANATION",
            Intent::Advice => "ADVICE",
            Intent::General => "GENERAL",
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskTolerance {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
}

impl RiskTolerance {
    /// Accepts the three canonical names plus low/medium/high
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "conservative" | "low" => Some(RiskTolerance::Conservative),
            "moderate" | "medium" | "balanced" => Some(RiskTolerance::Moderate),
            "aggressive" | "high" => Some(RiskTolerance::Aggressive),
            _ => None,
        }
    }
}

impl fmt::Display for RiskTolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskTolerance::Conservative => "conservative",
            RiskTolerance::Moderate => "moderate",
            RiskTolerance::Aggressive => "aggressive",
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalculationType {
    Timeline,
    Scenario,
    Withdrawal,
    RequiredSavings,
    IncomeReplacement,
}

impl fmt::Display for CalculationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CalculationType::Timeline => "timeline",
            CalculationType::Scenario => "scenario",
            CalculationType::Withdrawal => "withdrawal",
            CalculationType::RequiredSavings => "required_savings",
            CalculationType::IncomeReplacement => "income_replacement",
        })
    }
}

//
// ================= Input snapshots =================
//

/// Everything a timeline projection reads
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TimelineInputs {
    pub age: u32,
    pub retirement_age: u32,
    pub current_savings: f64,
    pub monthly_savings: f64,
    pub expected_return: f64,
    pub inflation_rate: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WithdrawalInputs {
    pub fund_amount: f64,
    pub monthly_withdrawal: f64,
    pub withdrawal_rate_rule: f64,
    pub post_retirement_return: f64,
    pub depletion_cap_years: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RequiredSavingsInputs {
    pub age: u32,
    pub retirement_age: u32,
    pub current_savings: f64,
    pub expected_return: f64,
    pub target_fund: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct IncomeReplacementInputs {
    pub timeline: TimelineInputs,
    pub monthly_income: f64,
    pub replacement_ratio: f64,
    pub retirement_years: u32,
    pub post_retirement_return: f64,
}

/// Copy of every value a calculation used. Outputs are a pure function of this.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputsSnapshot {
    Timeline(TimelineInputs),
    Scenario {
        base: TimelineInputs,
        scenario: TimelineInputs,
    },
    Withdrawal(WithdrawalInputs),
    RequiredSavings(RequiredSavingsInputs),
    IncomeReplacement(IncomeReplacementInputs),
}

//
// ================= Results =================
//

/// One formula invocation recorded for later explanation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceStep {
    pub formula_name: String,
    pub inputs: BTreeMap<String, f64>,
    pub output: f64,
    /// Which leg of a multi-part calculation produced the step ("base", "scenario")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TraceStep {
    pub fn new(formula_name: &str, inputs: &[(&str, f64)], output: f64) -> Self {
        Self {
            formula_name: formula_name.to_string(),
            inputs: inputs
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect(),
            output,
            scope: None,
        }
    }

    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = Some(scope.to_string());
        self
    }
}

/// Difference between a scenario and its base timeline
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScenarioDelta {
    pub total: f64,
    pub total_pct: f64,
    pub real_value: f64,
    pub real_value_pct: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalOutcome {
    SustainableIndefinitely,
    Depleting,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Depletion {
    /// Balance reaches zero after this many months
    Months { months: u32 },
    /// Balance still positive when the iteration cap was hit
    ExceedsCap { years: u32 },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WithdrawalAssessment {
    pub outcome: WithdrawalOutcome,
    pub sustainable_monthly: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depletion: Option<Depletion>,
}

/// Immutable computation record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationResult {
    pub id: Uuid,
    pub calculation_type: CalculationType,
    pub inputs_snapshot: InputsSnapshot,
    /// SHA-256 of the serialized snapshot
    pub inputs_hash: String,
    pub outputs: BTreeMap<String, f64>,
    pub trace: Vec<TraceStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<ScenarioDelta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub withdrawal: Option<WithdrawalAssessment>,
    pub created_at: DateTime<Utc>,
}

impl CalculationResult {
    pub fn output(&self, name: &str) -> Option<f64> {
        self.outputs.get(name).copied()
    }

    /// Projected fund a withdrawal analysis can draw on
    pub fn projected_fund(&self) -> Option<f64> {
        match self.calculation_type {
            CalculationType::Timeline | CalculationType::Scenario => self.output("total"),
            _ => None,
        }
    }
}
