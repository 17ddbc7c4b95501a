//! Profile store
//!
//! Holds the persona record and enforces field ranges plus the
//! `retirement_age > age` invariant. Edits are validated on a copy and
//! committed all-or-nothing.

mod coerce;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::error::ValidationError;
use crate::models::{RiskTolerance, TimelineInputs};

pub use coerce::coerce_field;

pub const MIN_AGE: u32 = 18;
pub const MAX_AGE: u32 = 100;
pub const MIN_RETIREMENT_AGE: u32 = 50;
pub const MAX_RETIREMENT_AGE: u32 = 80;
pub const MAX_EXPECTED_RETURN: f64 = 0.20;
pub const DEFAULT_FINANCIAL_GOALS: &str = "comfortable retirement";

/// Documented defaults used by "skip to calculation"
pub mod defaults {
    pub const AGE: u32 = 35;
    pub const RETIREMENT_AGE: u32 = 65;
    pub const MONTHLY_INCOME: f64 = 5_000.0;
    pub const CURRENT_SAVINGS: f64 = 25_000.0;
    pub const MONTHLY_SAVINGS: f64 = 500.0;
    pub const EXPECTED_RETURN: f64 = 0.07;
}

//
// ================= Fields =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    Age,
    RetirementAge,
    MonthlyIncome,
    CurrentSavings,
    MonthlySavings,
    ExpectedReturn,
    RiskTolerance,
    FinancialGoals,
}

impl ProfileField {
    pub const MANDATORY: [ProfileField; 6] = [
        ProfileField::Age,
        ProfileField::RetirementAge,
        ProfileField::MonthlyIncome,
        ProfileField::CurrentSavings,
        ProfileField::MonthlySavings,
        ProfileField::ExpectedReturn,
    ];

    pub fn is_mandatory(self) -> bool {
        !matches!(self, ProfileField::RiskTolerance | ProfileField::FinancialGoals)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProfileField::Age => "age",
            ProfileField::RetirementAge => "retirement_age",
            ProfileField::MonthlyIncome => "monthly_income",
            ProfileField::CurrentSavings => "current_savings",
            ProfileField::MonthlySavings => "monthly_savings",
            ProfileField::ExpectedReturn => "expected_return",
            ProfileField::RiskTolerance => "risk_tolerance",
            ProfileField::FinancialGoals => "financial_goals",
        }
    }
}

impl fmt::Display for ProfileField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileField {
    type Err = ValidationError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "age" | "current_age" => Ok(ProfileField::Age),
            "retirement_age" => Ok(ProfileField::RetirementAge),
            "monthly_income" | "income" => Ok(ProfileField::MonthlyIncome),
            "current_savings" | "savings" => Ok(ProfileField::CurrentSavings),
            "monthly_savings" => Ok(ProfileField::MonthlySavings),
            "expected_return" | "annual_return" => Ok(ProfileField::ExpectedReturn),
            "risk_tolerance" | "risk" => Ok(ProfileField::RiskTolerance),
            "financial_goals" | "goals" => Ok(ProfileField::FinancialGoals),
            other => Err(ValidationError::format(other, "is not a profile field")),
        }
    }
}

/// A coerced, range-checked value for one field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Years(u32),
    Amount(f64),
    Rate(f64),
    Risk(RiskTolerance),
    Text(String),
}

//
// ================= Profile =================
//

/// The persona record. Fields are private so every mutation passes validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    age: Option<u32>,
    retirement_age: Option<u32>,
    monthly_income: Option<f64>,
    current_savings: Option<f64>,
    monthly_savings: Option<f64>,
    expected_return: Option<f64>,
    risk_tolerance: RiskTolerance,
    financial_goals: String,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            age: None,
            retirement_age: None,
            monthly_income: None,
            current_savings: None,
            monthly_savings: None,
            expected_return: None,
            risk_tolerance: RiskTolerance::default(),
            financial_goals: DEFAULT_FINANCIAL_GOALS.to_string(),
        }
    }
}

impl Profile {
    pub fn age(&self) -> Option<u32> {
        self.age
    }

    pub fn retirement_age(&self) -> Option<u32> {
        self.retirement_age
    }

    pub fn monthly_income(&self) -> Option<f64> {
        self.monthly_income
    }

    pub fn current_savings(&self) -> Option<f64> {
        self.current_savings
    }

    pub fn monthly_savings(&self) -> Option<f64> {
        self.monthly_savings
    }

    pub fn expected_return(&self) -> Option<f64> {
        self.expected_return
    }

    pub fn risk_tolerance(&self) -> RiskTolerance {
        self.risk_tolerance
    }

    pub fn financial_goals(&self) -> &str {
        &self.financial_goals
    }

    pub fn is_set(&self, field: ProfileField) -> bool {
        match field {
            ProfileField::Age => self.age.is_some(),
            ProfileField::RetirementAge => self.retirement_age.is_some(),
            ProfileField::MonthlyIncome => self.monthly_income.is_some(),
            ProfileField::CurrentSavings => self.current_savings.is_some(),
            ProfileField::MonthlySavings => self.monthly_savings.is_some(),
            ProfileField::ExpectedReturn => self.expected_return.is_some(),
            ProfileField::RiskTolerance | ProfileField::FinancialGoals => true,
        }
    }

    /// True iff all six mandatory fields are set
    pub fn is_complete(&self) -> bool {
        ProfileField::MANDATORY.iter().all(|field| self.is_set(*field))
    }

    pub fn missing_mandatory(&self) -> Vec<ProfileField> {
        ProfileField::MANDATORY
            .iter()
            .copied()
            .filter(|field| !self.is_set(*field))
            .collect()
    }

    pub fn answered_mandatory_count(&self) -> usize {
        ProfileField::MANDATORY
            .iter()
            .filter(|field| self.is_set(**field))
            .count()
    }

    /// Numeric view of the field, if it has one
    pub fn numeric(&self, field: ProfileField) -> Option<f64> {
        match field {
            ProfileField::Age => self.age.map(f64::from),
            ProfileField::RetirementAge => self.retirement_age.map(f64::from),
            ProfileField::MonthlyIncome => self.monthly_income,
            ProfileField::CurrentSavings => self.current_savings,
            ProfileField::MonthlySavings => self.monthly_savings,
            ProfileField::ExpectedReturn => self.expected_return,
            ProfileField::RiskTolerance | ProfileField::FinancialGoals => None,
        }
    }

    /// Inputs for a timeline projection, failing on the first missing mandatory field
    pub fn timeline_inputs(&self, inflation_rate: f64) -> Result<TimelineInputs, ValidationError> {
        if let Some(field) = self.missing_mandatory().first() {
            return Err(ValidationError::required(*field));
        }
        let missing = |field: ProfileField| ValidationError::required(field);
        Ok(TimelineInputs {
            age: self.age.ok_or_else(|| missing(ProfileField::Age))?,
            retirement_age: self
                .retirement_age
                .ok_or_else(|| missing(ProfileField::RetirementAge))?,
            current_savings: self
                .current_savings
                .ok_or_else(|| missing(ProfileField::CurrentSavings))?,
            monthly_savings: self
                .monthly_savings
                .ok_or_else(|| missing(ProfileField::MonthlySavings))?,
            expected_return: self
                .expected_return
                .ok_or_else(|| missing(ProfileField::ExpectedReturn))?,
            inflation_rate,
        })
    }

    /// Returns a copy with every edit applied, or the first violation.
    /// The receiver is never modified.
    pub fn with_edits(&self, edits: &[(ProfileField, Value)]) -> Result<Profile, ValidationError> {
        let mut next = self.clone();
        for (field, raw) in edits {
            let value = coerce_field(*field, raw).map_err(|e| match (*field, next.age) {
                (ProfileField::RetirementAge, Some(age)) if age >= MAX_RETIREMENT_AGE && !e.is_format() => {
                    no_retirement_age(age)
                }
                _ => e,
            })?;
            next.assign(*field, value);
        }
        next.check_invariants(edits.iter().map(|(field, _)| *field))?;
        Ok(next)
    }

    fn assign(&mut self, field: ProfileField, value: FieldValue) {
        match (field, value) {
            (ProfileField::Age, FieldValue::Years(v)) => self.age = Some(v),
            (ProfileField::RetirementAge, FieldValue::Years(v)) => self.retirement_age = Some(v),
            (ProfileField::MonthlyIncome, FieldValue::Amount(v)) => self.monthly_income = Some(v),
            (ProfileField::CurrentSavings, FieldValue::Amount(v)) => self.current_savings = Some(v),
            (ProfileField::MonthlySavings, FieldValue::Amount(v)) => self.monthly_savings = Some(v),
            (ProfileField::ExpectedReturn, FieldValue::Rate(v)) => self.expected_return = Some(v),
            (ProfileField::RiskTolerance, FieldValue::Risk(v)) => self.risk_tolerance = v,
            (ProfileField::FinancialGoals, FieldValue::Text(v)) => self.financial_goals = v,
            (field, value) => {
                // coerce_field only produces the variant matching its field
                debug_assert!(false, "mismatched value {:?} for {}", value, field);
            }
        }
    }

    fn check_invariants(
        &self,
        mut touched: impl Iterator<Item = ProfileField>,
    ) -> Result<(), ValidationError> {
        if let (Some(age), Some(retirement_age)) = (self.age, self.retirement_age) {
            if retirement_age <= age {
                // Blame whichever side of the pair the edit touched, preferring retirement_age
                let field = if touched.any(|f| f == ProfileField::RetirementAge) {
                    ProfileField::RetirementAge
                } else {
                    ProfileField::Age
                };
                if field == ProfileField::RetirementAge && age >= MAX_RETIREMENT_AGE {
                    return Err(no_retirement_age(age));
                }
                return Err(ValidationError::invariant(
                    field,
                    format!(
                        "retirement age ({}) must be greater than current age ({})",
                        retirement_age, age
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// An age at or past the last allowed retirement age leaves nothing valid to enter
fn no_retirement_age(age: u32) -> ValidationError {
    ValidationError::invariant(
        ProfileField::RetirementAge,
        format!(
            "no valid retirement age exists for current age {}: it must be between {} and {} and greater than your age",
            age, MIN_RETIREMENT_AGE, MAX_RETIREMENT_AGE
        ),
    )
}

//
// ================= Store =================
//

/// Owns the session's profile; the only way to mutate it
#[derive(Debug, Clone, Default)]
pub struct ProfileStore {
    profile: Profile,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Coerce and validate one field, then commit it
    pub fn set_field(&mut self, name: &str, raw_value: &Value) -> Result<&Profile, ValidationError> {
        let field: ProfileField = name.parse()?;
        self.apply(&[(field, raw_value.clone())])
    }

    /// Commit several edits atomically: all of them or none
    pub fn apply(&mut self, edits: &[(ProfileField, Value)]) -> Result<&Profile, ValidationError> {
        let next = self.profile.with_edits(edits)?;
        debug!(
            fields = ?edits.iter().map(|(f, _)| f.as_str()).collect::<Vec<_>>(),
            "Profile updated"
        );
        self.profile = next;
        Ok(&self.profile)
    }

    pub fn is_complete(&self) -> bool {
        self.profile.is_complete()
    }

    /// Copy of the profile with unset mandatory fields filled from documented
    /// defaults. Fails only when a set age leaves no valid retirement age.
    pub fn with_defaults_for_missing(&self) -> Result<Profile, ValidationError> {
        let current = &self.profile;
        let mut edits: Vec<(ProfileField, Value)> = Vec::new();

        let age = match current.age {
            Some(age) => age,
            None => {
                edits.push((ProfileField::Age, Value::from(defaults::AGE)));
                defaults::AGE
            }
        };
        if current.retirement_age.is_none() {
            let retirement_age = defaults::RETIREMENT_AGE.max(age + 1);
            if retirement_age > MAX_RETIREMENT_AGE {
                return Err(no_retirement_age(age));
            }
            edits.push((ProfileField::RetirementAge, Value::from(retirement_age)));
        }
        if current.monthly_income.is_none() {
            edits.push((ProfileField::MonthlyIncome, Value::from(defaults::MONTHLY_INCOME)));
        }
        if current.current_savings.is_none() {
            edits.push((ProfileField::CurrentSavings, Value::from(defaults::CURRENT_SAVINGS)));
        }
        if current.monthly_savings.is_none() {
            edits.push((ProfileField::MonthlySavings, Value::from(defaults::MONTHLY_SAVINGS)));
        }
        if current.expected_return.is_none() {
            edits.push((ProfileField::ExpectedReturn, Value::from(defaults::EXPECTED_RETURN)));
        }

        current.with_edits(&edits)
    }

    /// Replace the stored profile with one produced by `with_edits` or
    /// `with_defaults_for_missing`
    pub fn replace(&mut self, profile: Profile) {
        self.profile = profile;
    }

    pub fn clear(&mut self) {
        self.profile = Profile::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn complete_store() -> ProfileStore {
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

    #[test]
    fn test_new_profile_defaults() {
        let store = ProfileStore::new();
        let profile = store.profile();
        assert!(!store.is_complete());
        assert_eq!(profile.risk_tolerance(), RiskTolerance::Moderate);
        assert_eq!(profile.financial_goals(), "comfortable retirement");
        assert_eq!(profile.missing_mandatory().len(), 6);
    }

    #[test]
    fn test_set_field_coerces_strings() {
        let mut store = ProfileStore::new();
        store.set_field("age", &json!("42")).unwrap();
        store.set_field("monthly_income", &json!("$7,500")).unwrap();
        store.set_field("expected_return", &json!("6.5%")).unwrap();

        let profile = store.profile();
        assert_eq!(profile.age(), Some(42));
        assert_eq!(profile.monthly_income(), Some(7500.0));
        assert!((profile.expected_return().unwrap() - 0.065).abs() < 1e-12);
    }

    #[test]
    fn test_retirement_age_must_exceed_age() {
        let mut store = complete_store();
        store
            .apply(&[
                (ProfileField::Age, json!(70)),
                (ProfileField::RetirementAge, json!(75)),
            ])
            .unwrap();

        // In range on its own, so only the cross-field check can reject it
        let err = store.set_field("retirement_age", &json!(69)).unwrap_err();
        assert_eq!(err.field, "retirement_age");
        assert_eq!(err.kind, crate::error::ValidationKind::Invariant);
        assert_eq!(store.profile().retirement_age(), Some(75));

        // Equal ages are rejected too
        let err = store.set_field("age", &json!(75)).unwrap_err();
        assert_eq!(err.kind, crate::error::ValidationKind::Invariant);
        assert_eq!(store.profile().age(), Some(70));
    }

    #[test]
    fn test_age_past_retirement_range_explains_rejection() {
        let mut store = ProfileStore::new();
        store.set_field("age", &json!(85)).unwrap();

        for attempt in [json!(82), json!(70)] {
            let err = store.set_field("retirement_age", &attempt).unwrap_err();
            assert_eq!(err.kind, crate::error::ValidationKind::Invariant);
            assert!(err.constraint.contains("no valid retirement age exists"), "{}", err.constraint);
        }
        assert_eq!(store.profile().retirement_age(), None);

        let err = store.with_defaults_for_missing().unwrap_err();
        assert!(err.constraint.contains("no valid retirement age exists"));

        // Unreadable input is still a format problem
        let err = store.set_field("retirement_age", &json!("soon")).unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_multi_field_edit_is_atomic() {
        let mut store = complete_store();
        let before = store.profile().clone();

        let result = store.apply(&[
            (ProfileField::MonthlySavings, json!(900)),
            (ProfileField::ExpectedReturn, json!(0.5)),
        ]);
        assert!(result.is_err());
        assert_eq!(store.profile(), &before);

        // Moving both ages together is fine even though either alone would fail
        store
            .apply(&[
                (ProfileField::Age, json!(70)),
                (ProfileField::RetirementAge, json!(75)),
            ])
            .unwrap();
        assert_eq!(store.profile().age(), Some(70));
    }

    #[test]
    fn test_range_checks() {
        let mut store = ProfileStore::new();
        assert!(store.set_field("age", &json!(17)).is_err());
        assert!(store.set_field("age", &json!(101)).is_err());
        assert!(store.set_field("retirement_age", &json!(49)).is_err());
        assert!(store.set_field("retirement_age", &json!(81)).is_err());
        assert!(store.set_field("current_savings", &json!(-1)).is_err());
        assert!(store.set_field("expected_return", &json!(0.25)).is_err());
        assert!(store.set_field("unknown_field", &json!(1)).is_err());
    }

    #[test]
    fn test_defaults_fill_only_missing_fields() {
        let mut store = ProfileStore::new();
        store.set_field("age", &json!(40)).unwrap();
        store.set_field("monthly_savings", &json!(1200)).unwrap();

        let filled = store.with_defaults_for_missing().unwrap();
        assert!(filled.is_complete());
        assert_eq!(filled.age(), Some(40));
        assert_eq!(filled.monthly_savings(), Some(1200.0));
        assert_eq!(filled.retirement_age(), Some(defaults::RETIREMENT_AGE));
        assert_eq!(filled.current_savings(), Some(defaults::CURRENT_SAVINGS));

        // Stored profile untouched
        assert!(!store.is_complete());
        assert_eq!(store.profile().retirement_age(), None);
    }

    #[test]
    fn test_defaults_respect_older_age() {
        let mut store = ProfileStore::new();
        store.set_field("age", &json!(70)).unwrap();
        let filled = store.with_defaults_for_missing().unwrap();
        assert_eq!(filled.retirement_age(), Some(71));

        store.set_field("age", &json!(85)).unwrap();
        assert!(store.with_defaults_for_missing().is_err());
    }

    #[test]
    fn test_timeline_inputs_requires_mandatory_fields() {
        let mut store = ProfileStore::new();
        store.set_field("age", &json!(30)).unwrap();
        let err = store.profile().timeline_inputs(0.03).unwrap_err();
        assert_eq!(err.field, "retirement_age");

        // Income is not a projection input but is still mandatory
        let mut without_income = complete_store().profile().clone();
        without_income.monthly_income = None;
        assert!(!without_income.is_complete());
        let err = without_income.timeline_inputs(0.03).unwrap_err();
        assert_eq!(err.field, "monthly_income");
        assert_eq!(err.kind, crate::error::ValidationKind::Required);

        let inputs = complete_store().profile().timeline_inputs(0.03).unwrap();
        assert_eq!(inputs.retirement_age, 65);
        assert_eq!(inputs.inflation_rate, 0.03);
    }

    #[test]
    fn test_field_name_aliases() {
        assert_eq!("current age".parse::<ProfileField>().unwrap(), ProfileField::Age);
        assert_eq!("Risk-Tolerance".parse::<ProfileField>().unwrap(), ProfileField::RiskTolerance);
        assert!("salary".parse::<ProfileField>().is_err());
    }
}
