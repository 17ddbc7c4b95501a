//! Natural-language responses
//!
//! `TemplateResponder` renders every [`TurnOutcome`] from its structured data
//! alone. `GeminiResponder` writes the free-form advice and small-talk replies
//! and drops back to the template whenever the model is unavailable.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::gemini::{GeminiClient, GenerationConfig};
use crate::interview::{Question, QUESTION_COUNT};
use crate::market::MarketSnapshot;
use crate::models::{
    CalculationResult, Depletion, InputsSnapshot, Intent, Phase, TimelineInputs, WithdrawalOutcome,
};
use crate::profile::Profile;
use crate::session::TurnOutcome;
use crate::Result;

/// Everything a responder may read for one reply
#[derive(Debug, Clone)]
pub struct ResponseContext<'a> {
    pub outcome: &'a TurnOutcome,
    pub phase: Phase,
    pub profile: &'a Profile,
    pub latest_result: Option<&'a CalculationResult>,
    pub user_text: Option<&'a str>,
    /// Recent transcript, already formatted
    pub conversation: String,
    pub market: Option<MarketSnapshot>,
}

#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, ctx: &ResponseContext<'_>) -> Result<String>;

    fn name(&self) -> &'static str;
}

//
// ================= Template =================
//

#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateResponder;

impl TemplateResponder {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, ctx: &ResponseContext<'_>) -> String {
        match ctx.outcome {
            TurnOutcome::AskQuestion { question } => ask(question),
            TurnOutcome::Rejected { error, question } => {
                with_question(format!("I couldn't use that: {}.", error.message), *question)
            }
            TurnOutcome::Deflected { question, .. } => with_question(
                "Let's finish your profile first so the numbers are right.".to_string(),
                Some(*question),
            ),
            TurnOutcome::Calculated {
                result,
                initial,
                baseline,
            } => {
                let mut out = String::new();
                if *initial {
                    out.push_str("Thanks, your profile is complete. Here is your starting projection.\n\n");
                }
                if let Some(baseline) = baseline {
                    out.push_str(&render_result(baseline));
                    out.push_str("\n\n");
                }
                out.push_str(&render_result(result));
                out
            }
            TurnOutcome::ProfileUpdated { fields, result } => {
                let names: Vec<String> = fields
                    .iter()
                    .map(|f| f.as_str().replace('_', " "))
                    .collect();
                let mut out = format!("Updated your {}.", names.join(" and "));
                if let Some(result) = result {
                    out.push_str("\n\n");
                    out.push_str(&render_result(result));
                }
                out
            }
            TurnOutcome::Explained { result } => render_trace(result),
            TurnOutcome::Conversation { intent, question } => {
                let body = match intent {
                    Intent::Advice => advice(ctx.profile),
                    _ => capabilities(ctx.phase),
                };
                with_question(body, *question)
            }
            TurnOutcome::NeedsDetail { hint, .. } => hint.to_string(),
            TurnOutcome::Reset { question } => with_question("Starting over.".to_string(), Some(*question)),
            TurnOutcome::Failed { error } => format!("I couldn't complete that: {}.", error.message),
        }
    }
}

#[async_trait]
impl Responder for TemplateResponder {
    async fn respond(&self, ctx: &ResponseContext<'_>) -> Result<String> {
        Ok(self.render(ctx))
    }

    fn name(&self) -> &'static str {
        "template"
    }
}

fn ask(question: &Question) -> String {
    let mut out = format!(
        "**Question {} of {}.** {}",
        question.index + 1,
        QUESTION_COUNT,
        question.prompt
    );
    if !question.mandatory {
        out.push_str(" (optional, say \"skip\" to move on)");
    }
    out
}

fn with_question(body: String, question: Option<&Question>) -> String {
    match question {
        Some(question) => format!("{}\n\n{}", body, ask(question)),
        None => body,
    }
}

fn capabilities(phase: Phase) -> String {
    match phase {
        Phase::PersonaBuilding => {
            "I'm here to build a retirement projection with you. A few questions first, \
             or say \"skip to calculation\" to use typical values."
                .to_string()
        }
        Phase::ProfileComplete | Phase::Interactive => {
            "I can project your savings, try what-if scenarios (\"what if I save $200 more\"), \
             check a withdrawal plan (\"can I withdraw $4,000 a month\") or work out what you \
             need to save for a target."
                .to_string()
        }
    }
}

fn advice(profile: &Profile) -> String {
    let mut tips = Vec::new();

    if let (Some(income), Some(saving)) = (profile.monthly_income(), profile.monthly_savings()) {
        if income > 0.0 {
            let rate = saving / income;
            let tip = if rate < 0.10 {
                format!(
                    "You are saving {} of your income. Working toward 15% makes a large difference over decades.",
                    percent(rate)
                )
            } else if rate < 0.15 {
                format!(
                    "You are saving {} of your income, close to the common 15% guideline.",
                    percent(rate)
                )
            } else {
                format!(
                    "You are saving {} of your income, above the common 15% guideline.",
                    percent(rate)
                )
            };
            tips.push(tip);
        }
    }

    if let Some(expected) = profile.expected_return() {
        if expected > 0.08 {
            tips.push(format!(
                "A {} return is optimistic. Try a scenario at 6% to see a more cautious outcome.",
                percent(expected)
            ));
        }
    }

    if tips.is_empty() {
        return "Once I know your income and savings I can compare them with common guidelines.".to_string();
    }
    tips.join(" ")
}

//
// ================= Results =================
//

/// Markdown summary of one result, built from its outputs and snapshot only
pub fn render_result(result: &CalculationResult) -> String {
    let value = |name: &str| result.output(name).unwrap_or(0.0);

    match &result.inputs_snapshot {
        InputsSnapshot::Timeline(inputs) => {
            let mut out = String::from("### Retirement Projection\n\n");
            out.push_str(&format!(
                "By age {} you could have **{}** (about **{}** in today's dollars).\n\n",
                inputs.retirement_age,
                money(value("total")),
                money(value("real_value"))
            ));
            out.push_str("| Source | Amount |\n|--------|--------|\n");
            out.push_str(&format!(
                "| Current savings ({}) | {} |\n",
                money(inputs.current_savings),
                money(value("fv_from_savings"))
            ));
            out.push_str(&format!(
                "| Contributions ({}/month for {} months) | {} |\n",
                money(inputs.monthly_savings),
                value("periods"),
                money(value("fv_from_contributions"))
            ));
            out.push_str(&format!("| **Total** | **{}** |\n\n", money(value("total"))));
            out.push_str(&assumptions_line(inputs));
            out
        }
        InputsSnapshot::Scenario { base, scenario } => {
            let mut out = String::from("### Scenario Comparison\n\n");
            let changes = scenario_changes(base, scenario);
            if !changes.is_empty() {
                out.push_str(&format!("Changes: {}.\n\n", changes.join("; ")));
            }
            out.push_str("| | Current plan | Scenario | Change |\n|---|---|---|---|\n");
            out.push_str(&format!(
                "| Projected total | {} | {} | {} ({}) |\n",
                money(value("base_total")),
                money(value("total")),
                signed_money(value("delta_total")),
                signed_percent(value("delta_total_pct"))
            ));
            out.push_str(&format!(
                "| In today's dollars | {} | {} | {} ({}) |\n",
                money(value("base_real_value")),
                money(value("real_value")),
                signed_money(value("delta_real_value")),
                signed_percent(value("delta_real_value_pct"))
            ));
            out
        }
        InputsSnapshot::Withdrawal(inputs) => {
            let mut out = String::from("### Withdrawal Check\n\n");
            out.push_str(&format!(
                "Withdrawing **{}/month** from **{}**. The {} rule supports up to {}/month.\n\n",
                money(inputs.monthly_withdrawal),
                money(inputs.fund_amount),
                percent(inputs.withdrawal_rate_rule),
                money(value("sustainable_monthly"))
            ));
            match result.withdrawal {
                Some(assessment) if assessment.outcome == WithdrawalOutcome::SustainableIndefinitely => {
                    out.push_str("That pace is **sustainable** under the rule.");
                }
                Some(assessment) => {
                    out.push_str("That pace is above the rule. ");
                    match assessment.depletion {
                        Some(Depletion::Months { months }) => out.push_str(&format!(
                            "With {} growth the fund runs out in about **{:.1} years** ({} months).",
                            percent(inputs.post_retirement_return),
                            f64::from(months) / 12.0,
                            months
                        )),
                        Some(Depletion::ExceedsCap { years }) => out.push_str(&format!(
                            "Even so, the fund lasts beyond {} years at {} growth.",
                            years,
                            percent(inputs.post_retirement_return)
                        )),
                        None => {}
                    }
                }
                None => {}
            }
            out
        }
        InputsSnapshot::RequiredSavings(inputs) => {
            let mut out = String::from("### Required Savings\n\n");
            if value("already_sufficient") > 0.0 {
                out.push_str(&format!(
                    "Your current savings alone grow to about **{}** by age {}, enough to reach **{}**.",
                    money(value("fv_from_savings")),
                    inputs.retirement_age,
                    money(inputs.target_fund)
                ));
            } else {
                out.push_str(&format!(
                    "To reach **{}** by age {} you need to save about **{}/month**. \
                     Current savings cover {} of it.",
                    money(inputs.target_fund),
                    inputs.retirement_age,
                    money(value("required_monthly_savings")),
                    money(value("fv_from_savings"))
                ));
            }
            out
        }
        InputsSnapshot::IncomeReplacement(inputs) => {
            let mut out = String::from("### Income Replacement\n\n");
            out.push_str(&format!(
                "Replacing {} of your income ({}/month) for {} years needs about **{}** at retirement.\n\n",
                percent(inputs.replacement_ratio),
                money(value("desired_monthly_income")),
                inputs.retirement_years,
                money(value("required_fund"))
            ));
            let shortfall = value("shortfall");
            if shortfall > 0.0 {
                out.push_str(&format!(
                    "Your projection reaches {}, a shortfall of **{}** ({} funded).",
                    money(value("projected_total")),
                    money(shortfall),
                    percent(value("funded_ratio"))
                ));
            } else {
                out.push_str(&format!(
                    "Your projection of {} covers it fully.",
                    money(value("projected_total"))
                ));
            }
            out
        }
    }
}

fn assumptions_line(inputs: &TimelineInputs) -> String {
    format!(
        "Assumes a {} annual return and {} inflation over {} years.",
        percent(inputs.expected_return),
        percent(inputs.inflation_rate),
        inputs.retirement_age.saturating_sub(inputs.age)
    )
}

fn scenario_changes(base: &TimelineInputs, scenario: &TimelineInputs) -> Vec<String> {
    let mut changes = Vec::new();
    if base.retirement_age != scenario.retirement_age {
        changes.push(format!(
            "retire at {} instead of {}",
            scenario.retirement_age, base.retirement_age
        ));
    }
    if base.monthly_savings != scenario.monthly_savings {
        changes.push(format!(
            "save {}/month instead of {}",
            money(scenario.monthly_savings),
            money(base.monthly_savings)
        ));
    }
    if base.current_savings != scenario.current_savings {
        changes.push(format!(
            "start from {} instead of {}",
            money(scenario.current_savings),
            money(base.current_savings)
        ));
    }
    if base.expected_return != scenario.expected_return {
        changes.push(format!(
            "{} return instead of {}",
            percent(scenario.expected_return),
            percent(base.expected_return)
        ));
    }
    if base.age != scenario.age {
        changes.push(format!("age {} instead of {}", scenario.age, base.age));
    }
    changes
}

/// Numbered list of every formula step behind a result
pub fn render_trace(result: &CalculationResult) -> String {
    let mut out = format!("### How the {} figure was calculated\n\n", result.calculation_type);

    for (i, step) in result.trace.iter().enumerate() {
        let inputs: Vec<String> = step
            .inputs
            .iter()
            .map(|(name, v)| format!("{} = {}", name, number(*v)))
            .collect();
        let scope = step
            .scope
            .as_deref()
            .map(|s| format!("[{}] ", s))
            .unwrap_or_default();
        out.push_str(&format!(
            "{}. {}`{}`({}) → {}\n",
            i + 1,
            scope,
            step.formula_name,
            inputs.join(", "),
            number(step.output)
        ));
    }

    out.push_str(&format!("\nInputs fingerprint: `{}`", result.inputs_hash));
    out
}

//
// ================= Number formatting =================
//

/// Whole dollars with thousands separators
pub fn money(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if rounded < 0.0 {
        format!("-${}", grouped)
    } else {
        format!("${}", grouped)
    }
}

fn signed_money(value: f64) -> String {
    if value > 0.0 {
        format!("+{}", money(value))
    } else {
        money(value)
    }
}

/// Fraction as a percentage with one decimal
pub fn percent(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}

/// Percentage points already scaled to 100
fn signed_percent(points: f64) -> String {
    format!("{:+.1}%", points)
}

fn number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else if value.abs() < 1.0 {
        format!("{:.6}", value)
    } else {
        format!("{:.2}", value)
    }
}

//
// ================= Gemini =================
//

const ADVISOR_PROMPT: &str = r#"You are a friendly retirement planning assistant.

Answer in at most three short paragraphs. Use only figures that appear in the
context; never invent projections or returns. When the user's profile is
incomplete, encourage them to finish the interview. You do not give tax or
legal advice."#;

/// Hosted responder for advice and general conversation
pub struct GeminiResponder {
    client: Arc<GeminiClient>,
    template: TemplateResponder,
}

impl GeminiResponder {
    pub fn new(client: Arc<GeminiClient>) -> Self {
        Self {
            client,
            template: TemplateResponder::new(),
        }
    }

    fn build_query(ctx: &ResponseContext<'_>, intent: Intent) -> String {
        let mut query = String::new();

        query.push_str(&format!("Interview phase: {}\nIntent: {}\n\n", ctx.phase, intent));
        if let Ok(profile) = serde_json::to_string(ctx.profile) {
            query.push_str(&format!("## Profile\n\n{}\n\n", profile));
        }
        if let Some(result) = ctx.latest_result {
            query.push_str(&format!("## Latest calculation\n\n{}\n\n", render_result(result)));
        }
        if let Some(market) = &ctx.market {
            query.push_str(&format!("## Market context\n\n{}\n\n", market.summary()));
        }
        if !ctx.conversation.is_empty() {
            query.push_str(&ctx.conversation);
            query.push('\n');
        }
        if let Some(text) = ctx.user_text {
            query.push_str(&format!("## Current message\n\n{}", text));
        }

        query
    }
}

#[async_trait]
impl Responder for GeminiResponder {
    async fn respond(&self, ctx: &ResponseContext<'_>) -> Result<String> {
        let TurnOutcome::Conversation { intent, question } = ctx.outcome else {
            return self.template.respond(ctx).await;
        };

        let query = Self::build_query(ctx, *intent);
        match self
            .client
            .generate(ADVISOR_PROMPT, &query, GenerationConfig::conversation())
            .await
        {
            Ok(reply) => Ok(with_question(reply.text.trim().to_string(), *question)),
            Err(e) => {
                warn!("Gemini responder unavailable, using template: {}", e);
                self.template.respond(ctx).await
            }
        }
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
