//! Deterministic parameter extraction from free text
//!
//! Regex-based readers for amounts, percentages, profile edits, scenario
//! overrides and calculation parameters. Nothing here guesses: when a pattern
//! does not match, the caller gets `None` or an empty map.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::engine::ScenarioOverrides;
use crate::profile::{Profile, ProfileField};

lazy_static! {
    static ref NUMBER_RE: Regex = Regex::new(
        r"(?i)(\$)?\s?(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)\s?(thousand|million|mm|k|m)?\b\s?(%|percent)?"
    )
    .unwrap();

    // ---- profile edits ----
    static ref AGE_RE: Regex =
        Regex::new(r"(?i)(?:\bi'?m|\bi am|\bage(?:d)?(?:\s+is)?|\bturned)\s+(\d{2,3})\b").unwrap();
    static ref AGE_OLD_RE: Regex = Regex::new(r"(?i)\b(\d{2,3})\s*(?:years?|yrs?)[\s-]*old\b").unwrap();
    static ref RETIRE_AT_RE: Regex = Regex::new(
        r"(?i)\bretire(?:ment)?(?:\s+age)?\s+(?:at|by|to|of|is)\s+(?:age\s+)?(\d{2})\b"
    )
    .unwrap();
    static ref INCOME_RE: Regex = Regex::new(
        r"(?i)\b(?:income|earn|earning|make|making|salary|paid)\b[^\d$]{0,20}(\$?\s?[\d,.]+\s?(?:thousand|million|k|m)?)\s*(?:(?:a|per|each)\s+|/\s*)?(year|yr|annum|annually|month|monthly|mo)?\b"
    )
    .unwrap();
    static ref MONTHLY_SAVINGS_RE: Regex = Regex::new(
        r"(?i)\b(?:save|saving|contribute|contributing|put away|putting away|invest|investing)\s+(?:about\s+|around\s+)?(\$?\s?[\d,.]+\s?(?:thousand|k)?)\s*(?:(?:a|per|each|every)\s+|/\s*)?(month|monthly|mo|year|yearly|yr|annually)\b"
    )
    .unwrap();
    static ref CURRENT_SAVINGS_RE: Regex = Regex::new(
        r"(?i)(?:\bsaved(?:\s+up)?|\bcurrent savings(?:\s+(?:of|is|are|to))?|\bsavings\s+(?:of|is|are|to|total)|\bnest egg\s+(?:of|is))\s+(?:about\s+|around\s+)?(\$?\s?[\d,.]+\s?(?:thousand|million|mm|k|m)?)"
    )
    .unwrap();
    static ref SAVED_AFTER_RE: Regex = Regex::new(
        r"(?i)(\$\s?[\d,.]+\s?(?:thousand|million|mm|k|m)?)\s+(?:saved|in savings|put away)"
    )
    .unwrap();
    static ref RETURN_RE: Regex = Regex::new(
        r"(?i)\b(?:return|returns|growth|yield|earn(?:ing)?s?)\b[^\d]{0,20}(\d+(?:\.\d+)?\s?(?:%|percent))"
    )
    .unwrap();
    static ref RETURN_AFTER_RE: Regex = Regex::new(
        r"(?i)(\d+(?:\.\d+)?\s?(?:%|percent))\s+(?:annual\s+|yearly\s+|a year\s+)?(?:return|returns|growth|yield)"
    )
    .unwrap();
    static ref RISK_RE: Regex = Regex::new(r"(?i)\b(conservative|moderate|aggressive)\b").unwrap();

    // ---- scenarios ----
    static ref SAVE_DELTA_RE: Regex = Regex::new(
        r"(?i)\b(?:save|saving|contribute|invest|put (?:away|in))\s+(?:an?\s+)?(extra|additional)?\s*(\$?\s?[\d,.]+\s?k?)\s*(more|extra|additional|less|fewer)?"
    )
    .unwrap();
    static ref CHANGE_BY_RE: Regex = Regex::new(
        r"(?i)\b(increase|raise|boost|reduce|cut|lower|decrease)\s+(?:my\s+)?(?:monthly\s+)?(?:savings|contributions?)\s+(by|to)\s+(\$?\s?[\d,.]+\s?k?)"
    )
    .unwrap();

    // ---- calculation parameters ----
    static ref WITHDRAW_RE: Regex = Regex::new(
        r"(?i)\b(?:withdraw|withdrawing|take out|taking out|draw|drawing|spend|spending|live on|pull out)\b[^\d$]{0,15}(\$?\s?[\d,.]+\s?(?:thousand|k)?)\s*(?:(?:a|per|each|every)\s+|/\s*)?(month|monthly|mo|year|yearly|yr|annually)?\b"
    )
    .unwrap();
    static ref FUND_RE: Regex = Regex::new(
        r"(?i)\b(?:from|fund of|nest egg of|portfolio of|balance of)\s+(?:a\s+|my\s+)?(\$?\s?[\d,.]+\s?(?:thousand|million|mm|k|m)?)"
    )
    .unwrap();
    static ref WITHDRAWAL_MENTION_RE: Regex =
        Regex::new(r"(?i)\b(?:withdraw\w*|drawdown|draw down|take out|spend down|\d+(?:\.\d+)?\s?% rule)").unwrap();
    static ref TARGET_RE: Regex = Regex::new(
        r"(?i)\b(?:reach|target(?:\s+of)?|goal of|end up with|accumulate|retire with|have|need)\s+(?:a\s+)?(?:fund\s+of\s+|total\s+of\s+)?(\$\s?[\d,.]+\s?(?:thousand|million|mm|k|m)?|[\d,.]+\s?(?:thousand|million|mm|k|m)\b)"
    )
    .unwrap();
    static ref REQUIRED_SAVINGS_MENTION_RE: Regex = Regex::new(
        r"(?i)\bhow much\b.{0,30}\b(?:save|saving|contribute|put away)\b|\brequired (?:monthly )?savings\b"
    )
    .unwrap();
    static ref REPLACEMENT_RATIO_RE: Regex = Regex::new(
        r"(?i)(\d+(?:\.\d+)?)\s?(?:%|percent)\s+(?:of\s+)?(?:my\s+)?(?:current\s+)?(?:income|salary|pay)"
    )
    .unwrap();
    static ref REPLACEMENT_MENTION_RE: Regex =
        Regex::new(r"(?i)\b(?:replace|replacement|replacing)\b|\bincome in retirement\b").unwrap();
    static ref YEARS_RE: Regex = Regex::new(r"(?i)\b(?:for|over|lasting|last)\s+(\d{1,2})\s+years\b").unwrap();
}

/// Messages that drive the interview directly, checked before classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Skip,
    SkipToCalculation,
    StartOver,
}

pub fn control_command(text: &str) -> Option<ControlCommand> {
    let normalized: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");

    match normalized.as_str() {
        "skip" | "skip this" | "skip question" | "skip this question" | "next" | "pass" => {
            Some(ControlCommand::Skip)
        }
        "skip to calculation" | "skip to calculations" | "skip to the calculation"
        | "skip to analysis" | "skip to the analysis" | "just calculate" | "calculate now" => {
            Some(ControlCommand::SkipToCalculation)
        }
        "start over" | "restart" | "reset" | "start again" | "begin again" => {
            Some(ControlCommand::StartOver)
        }
        _ => None,
    }
}

//
// ================= Numbers =================
//

#[derive(Debug, Clone, PartialEq)]
pub struct NumberToken {
    pub value: f64,
    pub percent: bool,
    pub currency: bool,
    /// Matched text, suitable for re-coercion ("$5,000", "7%")
    pub raw: String,
}

pub fn number_tokens(text: &str) -> Vec<NumberToken> {
    NUMBER_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let digits = caps.get(2)?.as_str().replace(',', "");
            let base: f64 = digits.parse().ok()?;
            let multiplier = match caps.get(3).map(|m| m.as_str().to_lowercase()).as_deref() {
                Some("k") | Some("thousand") => 1_000.0,
                Some("m") | Some("mm") | Some("million") => 1_000_000.0,
                _ => 1.0,
            };
            let percent = caps.get(4).is_some();
            let raw = caps.get(0)?.as_str().trim().to_string();

            Some(NumberToken {
                value: base * multiplier,
                percent,
                currency: caps.get(1).is_some(),
                raw: if percent {
                    format!("{}%", digits)
                } else {
                    raw
                },
            })
        })
        .collect()
}

/// The only number in the text, if there is exactly one
pub fn single_number(text: &str) -> Option<NumberToken> {
    let mut tokens = number_tokens(text);
    if tokens.len() == 1 {
        tokens.pop()
    } else {
        None
    }
}

/// First non-percentage amount in the text
pub fn parse_amount(text: &str) -> Option<f64> {
    number_tokens(text)
        .into_iter()
        .find(|t| !t.percent)
        .map(|t| t.value)
}

fn capture_amount(re: &Regex, text: &str, group: usize) -> Option<f64> {
    re.captures(text)
        .and_then(|caps| caps.get(group))
        .and_then(|m| parse_amount(m.as_str()))
}

fn capture_percent(re: &Regex, text: &str) -> Option<Value> {
    let caps = re.captures(text)?;
    let token = number_tokens(caps.get(1)?.as_str()).into_iter().next()?;
    Some(Value::String(format!("{}%", token.value)))
}

fn is_annual(period: Option<&str>) -> bool {
    matches!(
        period.map(|p| p.to_lowercase()).as_deref(),
        Some("year") | Some("yearly") | Some("yr") | Some("annum") | Some("annually")
    )
}

fn per_month(amount: f64, period: Option<&str>) -> f64 {
    if is_annual(period) {
        amount / 12.0
    } else {
        amount
    }
}

fn number_value(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

//
// ================= Profile edits =================
//

/// Profile edits stated in the text. Annual income and savings are converted to monthly.
pub fn profile_edits(text: &str) -> Vec<(ProfileField, Value)> {
    let mut edits: BTreeMap<ProfileField, Value> = BTreeMap::new();

    if let Some(age) = AGE_OLD_RE
        .captures(text)
        .or_else(|| AGE_RE.captures(text))
        .and_then(|caps| caps.get(1))
    {
        edits.insert(ProfileField::Age, Value::String(age.as_str().to_string()));
    }

    if let Some(age) = RETIRE_AT_RE.captures(text).and_then(|caps| caps.get(1)) {
        edits.insert(ProfileField::RetirementAge, Value::String(age.as_str().to_string()));
    }

    if let Some(caps) = INCOME_RE.captures(text) {
        if let Some(amount) = caps.get(1).and_then(|m| parse_amount(m.as_str())) {
            let monthly = per_month(amount, caps.get(2).map(|m| m.as_str()));
            edits.insert(ProfileField::MonthlyIncome, number_value(monthly));
        }
    }

    if let Some(caps) = MONTHLY_SAVINGS_RE.captures(text) {
        if let Some(amount) = caps.get(1).and_then(|m| parse_amount(m.as_str())) {
            let monthly = per_month(amount, caps.get(2).map(|m| m.as_str()));
            edits.insert(ProfileField::MonthlySavings, number_value(monthly));
        }
    }

    if let Some(amount) = capture_amount(&CURRENT_SAVINGS_RE, text, 1)
        .or_else(|| capture_amount(&SAVED_AFTER_RE, text, 1))
    {
        edits.insert(ProfileField::CurrentSavings, number_value(amount));
    }

    if let Some(rate) = capture_percent(&RETURN_RE, text).or_else(|| capture_percent(&RETURN_AFTER_RE, text)) {
        edits.insert(ProfileField::ExpectedReturn, rate);
    }

    if let Some(risk) = RISK_RE.captures(text).and_then(|caps| caps.get(1)) {
        edits.insert(ProfileField::RiskTolerance, Value::String(risk.as_str().to_lowercase()));
    }

    edits.into_iter().collect()
}

/// Value for one field, picked out of a longer message
pub fn value_for(field: ProfileField, text: &str) -> Option<Value> {
    profile_edits(text)
        .into_iter()
        .find(|(f, _)| *f == field)
        .map(|(_, value)| value)
}

//
// ================= Scenarios =================
//

/// Overrides described by a what-if message. Relative changes to monthly
/// savings are resolved against `base`.
pub fn scenario_overrides(text: &str, base: &Profile) -> ScenarioOverrides {
    let mut overrides = ScenarioOverrides::new();
    let current_savings_rate = base.monthly_savings().unwrap_or(0.0);

    if let Some(caps) = CHANGE_BY_RE.captures(text) {
        let verb = caps.get(1).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
        let by = caps
            .get(2)
            .map(|m| m.as_str().eq_ignore_ascii_case("by"))
            .unwrap_or(false);
        if let Some(amount) = caps.get(3).and_then(|m| parse_amount(m.as_str())) {
            let decrease = matches!(verb.as_str(), "reduce" | "cut" | "lower" | "decrease");
            let target = match (by, decrease) {
                (true, false) => current_savings_rate + amount,
                (true, true) => current_savings_rate - amount,
                (false, _) => amount,
            };
            overrides.insert(ProfileField::MonthlySavings, number_value(target));
        }
    } else if let Some(caps) = SAVE_DELTA_RE.captures(text) {
        if let Some(amount) = caps.get(2).and_then(|m| parse_amount(m.as_str())) {
            let extra_before = caps.get(1).is_some();
            let after = caps.get(3).map(|m| m.as_str().to_lowercase());
            let target = match after.as_deref() {
                Some("less") | Some("fewer") => current_savings_rate - amount,
                Some(_) => current_savings_rate + amount,
                None if extra_before => current_savings_rate + amount,
                None => amount,
            };
            overrides.insert(ProfileField::MonthlySavings, number_value(target));
        }
    }

    if let Some(age) = RETIRE_AT_RE.captures(text).and_then(|caps| caps.get(1)) {
        overrides.insert(ProfileField::RetirementAge, Value::String(age.as_str().to_string()));
    }

    if let Some(rate) = capture_percent(&RETURN_RE, text).or_else(|| capture_percent(&RETURN_AFTER_RE, text)) {
        overrides.insert(ProfileField::ExpectedReturn, rate);
    }

    if let Some(amount) = capture_amount(&CURRENT_SAVINGS_RE, text, 1)
        .or_else(|| capture_amount(&SAVED_AFTER_RE, text, 1))
    {
        overrides.insert(ProfileField::CurrentSavings, number_value(amount));
    }

    overrides
}

//
// ================= Calculation parameters =================
//

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WithdrawalRequest {
    pub monthly_withdrawal: f64,
    pub fund_amount: Option<f64>,
}

pub fn mentions_withdrawal(text: &str) -> bool {
    WITHDRAWAL_MENTION_RE.is_match(text)
}

pub fn withdrawal_request(text: &str) -> Option<WithdrawalRequest> {
    let caps = WITHDRAW_RE.captures(text)?;
    let amount = parse_amount(caps.get(1)?.as_str())?;

    Some(WithdrawalRequest {
        monthly_withdrawal: per_month(amount, caps.get(2).map(|m| m.as_str())),
        fund_amount: capture_amount(&FUND_RE, text, 1),
    })
}

/// Target fund for a required-savings question ("how much should I save to reach $1M")
pub fn target_fund(text: &str) -> Option<f64> {
    if !REQUIRED_SAVINGS_MENTION_RE.is_match(text) {
        return None;
    }
    capture_amount(&TARGET_RE, text, 1)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplacementRequest {
    pub replacement_ratio: Option<f64>,
    pub retirement_years: Option<u32>,
}

pub fn replacement_request(text: &str) -> Option<ReplacementRequest> {
    let ratio = REPLACEMENT_RATIO_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|pct| pct / 100.0);

    if ratio.is_none() && !REPLACEMENT_MENTION_RE.is_match(text) {
        return None;
    }

    Some(ReplacementRequest {
        replacement_ratio: ratio,
        retirement_years: YEARS_RE
            .captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileStore;
    use serde_json::json;

    fn edits_map(text: &str) -> BTreeMap<ProfileField, Value> {
        profile_edits(text).into_iter().collect()
    }

    fn base_profile() -> Profile {
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
        store.profile().clone()
    }

    #[test]
    fn test_control_commands() {
        assert_eq!(control_command("Skip"), Some(ControlCommand::Skip));
        assert_eq!(
            control_command("skip to calculation!"),
            Some(ControlCommand::SkipToCalculation)
        );
        assert_eq!(control_command("  Start   over "), Some(ControlCommand::StartOver));
        assert_eq!(control_command("reset"), Some(ControlCommand::StartOver));
        assert_eq!(control_command("should I skip lunch to save more?"), None);
    }

    #[test]
    fn test_number_tokens() {
        let tokens = number_tokens("I have $1.2M and want 7% on top of 12k and 5,000");
        let values: Vec<f64> = tokens.iter().map(|t| t.value).collect();
        assert_eq!(values, vec![1_200_000.0, 7.0, 12_000.0, 5_000.0]);
        assert!(tokens[0].currency);
        assert!(tokens[1].percent);
        assert_eq!(tokens[1].raw, "7%");
    }

    #[test]
    fn test_single_number() {
        assert_eq!(single_number("about 42 I think").unwrap().value, 42.0);
        assert!(single_number("35 or 36").is_none());
        assert!(single_number("no idea").is_none());
        assert_eq!(parse_amount("roughly $3,500 a month"), Some(3_500.0));
    }

    #[test]
    fn test_profile_edits() {
        let edits = edits_map("I'm 40 and I want to retire at 60");
        assert_eq!(edits.get(&ProfileField::Age), Some(&json!("40")));
        assert_eq!(edits.get(&ProfileField::RetirementAge), Some(&json!("60")));

        let edits = edits_map("I earn $96,000 a year and save $800 per month");
        assert_eq!(edits.get(&ProfileField::MonthlyIncome), Some(&json!(8000.0)));
        assert_eq!(edits.get(&ProfileField::MonthlySavings), Some(&json!(800.0)));

        let edits = edits_map("I've got $50k saved, expecting a 6% return, fairly aggressive");
        assert_eq!(edits.get(&ProfileField::CurrentSavings), Some(&json!(50_000.0)));
        assert_eq!(edits.get(&ProfileField::ExpectedReturn), Some(&json!("6%")));
        assert_eq!(edits.get(&ProfileField::RiskTolerance), Some(&json!("aggressive")));
    }

    #[test]
    fn test_value_for_pending_field() {
        assert_eq!(
            value_for(ProfileField::Age, "I'm 35 and want to retire at 65"),
            Some(json!("35"))
        );
        assert_eq!(value_for(ProfileField::MonthlyIncome, "I'm 35"), None);
    }

    #[test]
    fn test_scenario_increment_and_absolute() {
        let base = base_profile();

        let overrides = scenario_overrides("What if I save $200 more per month?", &base);
        assert_eq!(overrides.get(&ProfileField::MonthlySavings), Some(&json!(700.0)));

        let overrides = scenario_overrides("what if I save an extra $100", &base);
        assert_eq!(overrides.get(&ProfileField::MonthlySavings), Some(&json!(600.0)));

        let overrides = scenario_overrides("What if I save $900?", &base);
        assert_eq!(overrides.get(&ProfileField::MonthlySavings), Some(&json!(900.0)));

        let overrides = scenario_overrides("cut my savings by $100", &base);
        assert_eq!(overrides.get(&ProfileField::MonthlySavings), Some(&json!(400.0)));
    }

    #[test]
    fn test_scenario_other_fields() {
        let base = base_profile();
        let overrides = scenario_overrides("what if I retire at 62 with an 8% return", &base);
        assert_eq!(overrides.get(&ProfileField::RetirementAge), Some(&json!("62")));
        assert_eq!(overrides.get(&ProfileField::ExpectedReturn), Some(&json!("8%")));
        assert!(!overrides.contains_key(&ProfileField::MonthlySavings));

        assert!(scenario_overrides("what do you think?", &base).is_empty());
    }

    #[test]
    fn test_withdrawal_request() {
        let request = withdrawal_request("Can I withdraw $4,000 a month from $1.2M?").unwrap();
        assert_eq!(request.monthly_withdrawal, 4_000.0);
        assert_eq!(request.fund_amount, Some(1_200_000.0));

        let request = withdrawal_request("what if I spend $60,000 per year").unwrap();
        assert_eq!(request.monthly_withdrawal, 5_000.0);
        assert_eq!(request.fund_amount, None);

        assert!(withdrawal_request("is withdrawing safe?").is_none());
        assert!(mentions_withdrawal("is the 4% rule safe?"));
    }

    #[test]
    fn test_target_fund() {
        assert_eq!(
            target_fund("How much do I need to save to reach $1.5 million?"),
            Some(1_500_000.0)
        );
        assert_eq!(target_fund("I want to reach $1M"), None);
    }

    #[test]
    fn test_replacement_request() {
        let request = replacement_request("I want to replace 80% of my income for 25 years").unwrap();
        assert_eq!(request.replacement_ratio, Some(0.8));
        assert_eq!(request.retirement_years, Some(25));

        let request = replacement_request("what about income replacement?").unwrap();
        assert_eq!(request.replacement_ratio, None);
        assert!(replacement_request("what is my total?").is_none());
    }
}
