//! Session context
//!
//! One `Session` owns a profile, an interview state, a bounded calculation
//! history and a transcript. Every operation takes `&mut self`; nothing is
//! shared between sessions except the stateless engine assumptions.
//!
//! Operations never fail outward: user-facing problems come back as
//! rejected, deflected or failed [`TurnOutcome`]s.

mod manager;
mod outcome;

pub use manager::SessionManager;
pub use outcome::{
    CalculationRequest, TurnOutcome, TurnReply, DEFAULT_REPLACEMENT_RATIO, DEFAULT_RETIREMENT_YEARS,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{verify_reproducible, ReplayReport};
use crate::config::AdvisorConfig;
use crate::engine::CalculationEngine;
use crate::error::{AdvisorError, StateError, TurnError};
use crate::extract::{self, ControlCommand};
use crate::interview::{AnswerKind, InterviewEvent, InterviewState, Question};
use crate::memory::{CalculationHistory, Transcript, TranscriptMessage};
use crate::models::{CalculationResult, CalculationType, Intent, Phase};
use crate::profile::{coerce_field, Profile, ProfileField, ProfileStore};
use crate::router::{route, Handler};
use crate::Result;

const SCENARIO_HINT: &str =
    "Tell me what to change, for example \"what if I save $200 more per month\" or \"what if I retire at 62\".";
const WITHDRAWAL_HINT: &str =
    "How much would you like to withdraw each month? For example \"can I withdraw $4,000 a month\".";
const PROFILE_HINT: &str =
    "Which detail changed? For example \"I now earn $7,000 a month\" or \"I'm saving $800 a month\".";

/// Read-only view for the presentation layer
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub phase: Phase,
    pub interview: InterviewState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_question: Option<&'static Question>,
    pub profile: Profile,
    pub missing_fields: Vec<ProfileField>,
    pub calculation_count: usize,
}

#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    engine: CalculationEngine,
    profile: ProfileStore,
    interview: InterviewState,
    history: CalculationHistory,
    transcript: Transcript,
}

impl Session {
    pub fn new(id: Uuid, config: &AdvisorConfig) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            engine: CalculationEngine::from_config(config),
            profile: ProfileStore::new(),
            interview: InterviewState::new(),
            history: CalculationHistory::new(config.history_capacity),
            transcript: Transcript::new(config.transcript_capacity),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.interview.phase
    }

    pub fn interview(&self) -> &InterviewState {
        &self.interview
    }

    pub fn profile(&self) -> &Profile {
        self.profile.profile()
    }

    pub fn history(&self) -> &CalculationHistory {
        &self.history
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn pending_question(&self) -> Option<&'static Question> {
        self.interview.pending_question()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let profile = self.profile.profile();
        SessionSnapshot {
            session_id: self.id,
            created_at: self.created_at,
            phase: self.interview.phase,
            interview: self.interview,
            pending_question: self.interview.pending_question(),
            profile: profile.clone(),
            missing_fields: profile.missing_mandatory(),
            calculation_count: self.history.len(),
        }
    }

    pub fn record_user(&mut self, text: &str, intent: Option<Intent>) {
        self.transcript.push(TranscriptMessage::user(text, intent));
    }

    pub fn record_advisor(&mut self, text: &str) {
        self.transcript.push(TranscriptMessage::advisor(text));
    }

    //
    // ================= Interview =================
    //

    /// The pending question as an outcome
    pub fn ask_pending(&self) -> TurnOutcome {
        match self.interview.pending_question() {
            Some(question) => TurnOutcome::AskQuestion { question },
            None => TurnOutcome::Rejected {
                error: StateError::NoPendingQuestion.into(),
                question: None,
            },
        }
    }

    /// Answer the pending question. `field` must be the pending question's field.
    pub fn answer(&mut self, field: ProfileField, value: &Value) -> TurnOutcome {
        let Some(question) = self.interview.pending_question() else {
            return TurnOutcome::Rejected {
                error: StateError::NoPendingQuestion.into(),
                question: None,
            };
        };

        if question.field != field {
            return TurnOutcome::Rejected {
                error: StateError::UnexpectedQuestion {
                    expected: question.field,
                    received: field,
                }
                .into(),
                question: Some(question),
            };
        }

        if let Err(e) = self.profile.apply(&[(field, value.clone())]) {
            debug!(session_id = %self.id, field = %field, "Answer rejected: {}", e);
            return TurnOutcome::Rejected {
                error: e.into(),
                question: Some(question),
            };
        }

        let profile = self.profile.profile();
        let event = InterviewEvent::AnswerAccepted {
            answered_mandatory_count: profile.answered_mandatory_count(),
            profile_complete: profile.is_complete(),
        };
        if let Err(e) = self.interview.apply(event) {
            return TurnOutcome::Failed { error: e.into() };
        }

        info!(
            session_id = %self.id,
            field = %field,
            question = question.index,
            "Answer accepted"
        );

        if self.interview.phase == Phase::ProfileComplete {
            match self.deliver_initial_projection() {
                Ok(result) => TurnOutcome::Calculated {
                    result,
                    initial: true,
                    baseline: None,
                },
                Err(e) => self.failure(e),
            }
        } else {
            self.ask_pending()
        }
    }

    /// Skip the pending question; mandatory questions cannot be skipped
    pub fn skip(&mut self) -> TurnOutcome {
        let question = self.interview.pending_question();
        match self.interview.apply(InterviewEvent::QuestionSkipped) {
            Ok(_) => {
                debug!(session_id = %self.id, question = ?question.map(|q| q.index), "Question skipped");
                self.ask_pending()
            }
            Err(e) => TurnOutcome::Rejected {
                error: e.into(),
                question,
            },
        }
    }

    /// Fill missing mandatory fields from defaults and run the timeline.
    /// Nothing is committed unless the projection succeeds.
    pub fn skip_to_calculation(&mut self) -> TurnOutcome {
        let filled = match self.profile.with_defaults_for_missing() {
            Ok(profile) => profile,
            Err(e) => {
                return TurnOutcome::Rejected {
                    error: e.into(),
                    question: self.interview.pending_question(),
                }
            }
        };

        let result = match self.engine.compute_timeline(&filled) {
            Ok(result) => result,
            Err(e) => return self.failure(e),
        };

        let initial = self.interview.phase != Phase::Interactive;
        if let Err(e) = self.interview.apply(InterviewEvent::SkipToCalculation) {
            return TurnOutcome::Failed { error: e.into() };
        }
        self.profile.replace(filled);

        TurnOutcome::Calculated {
            result: self.history.record(result),
            initial,
            baseline: None,
        }
    }

    /// Back to the first question with an empty profile, history and transcript
    pub fn start_over(&mut self) -> TurnOutcome {
        if let Err(e) = self.interview.apply(InterviewEvent::StartOver) {
            return TurnOutcome::Failed { error: e.into() };
        }
        self.profile.clear();
        self.history.clear();
        self.transcript.clear();

        info!(session_id = %self.id, "Session reset");

        match self.interview.pending_question() {
            Some(question) => TurnOutcome::Reset { question },
            None => TurnOutcome::Failed {
                error: StateError::NoPendingQuestion.into(),
            },
        }
    }

    pub fn control(&mut self, command: ControlCommand) -> TurnOutcome {
        match command {
            ControlCommand::Skip => self.skip(),
            ControlCommand::SkipToCalculation => self.skip_to_calculation(),
            ControlCommand::StartOver => self.start_over(),
        }
    }

    /// Apply profile edits outside the interview; the timeline is re-run afterwards
    pub fn edit_profile(&mut self, edits: &[(ProfileField, Value)]) -> TurnOutcome {
        let phase = self.interview.phase;
        if phase == Phase::PersonaBuilding {
            return TurnOutcome::Rejected {
                error: StateError::NotAllowed {
                    operation: "profile edit",
                    phase,
                }
                .into(),
                question: self.interview.pending_question(),
            };
        }

        if let Err(e) = self.profile.apply(edits) {
            return TurnOutcome::Rejected {
                error: e.into(),
                question: None,
            };
        }

        let answered_mandatory_count = self.profile.profile().answered_mandatory_count();
        if let Err(e) = self
            .interview
            .apply(InterviewEvent::ProfileEdited { answered_mandatory_count })
        {
            return TurnOutcome::Failed { error: e.into() };
        }

        let result = match self.engine.compute_timeline(self.profile.profile()) {
            Ok(result) => Some(self.history.record(result)),
            Err(e) => {
                warn!(session_id = %self.id, "Timeline after profile edit failed: {}", e);
                None
            }
        };

        TurnOutcome::ProfileUpdated {
            fields: edits.iter().map(|(field, _)| *field).collect(),
            result,
        }
    }

    //
    // ================= Calculations =================
    //

    /// Run an explicit calculation. Refused while the interview is still running.
    pub fn request_calculation(&mut self, request: CalculationRequest) -> TurnOutcome {
        match self.interview.phase {
            Phase::PersonaBuilding => TurnOutcome::Rejected {
                error: StateError::NotAllowed {
                    operation: "calculation",
                    phase: Phase::PersonaBuilding,
                }
                .into(),
                question: self.interview.pending_question(),
            },
            Phase::ProfileComplete => {
                // The initial projection always comes first
                let baseline = match self.deliver_initial_projection() {
                    Ok(result) => result,
                    Err(e) => return self.failure(e),
                };
                if request == CalculationRequest::Timeline {
                    return TurnOutcome::Calculated {
                        result: baseline,
                        initial: true,
                        baseline: None,
                    };
                }
                match self.execute(request) {
                    TurnOutcome::Calculated { result, .. } => TurnOutcome::Calculated {
                        result,
                        initial: false,
                        baseline: Some(baseline),
                    },
                    other => other,
                }
            }
            Phase::Interactive => self.execute(request),
        }
    }

    /// Recompute a stored result from its snapshot
    pub fn replay(&self, result_id: Uuid) -> Result<ReplayReport> {
        let result = self
            .history
            .get(result_id)
            .ok_or(AdvisorError::CalculationNotFound(result_id))?;
        verify_reproducible(result)
    }

    fn deliver_initial_projection(&mut self) -> Result<Arc<CalculationResult>> {
        let result = self.engine.compute_timeline(self.profile.profile())?;
        let result = self.history.record(result);
        self.interview.apply(InterviewEvent::InitialResultDelivered)?;
        Ok(result)
    }

    fn execute(&mut self, request: CalculationRequest) -> TurnOutcome {
        let profile = self.profile.profile();
        let computed = match request {
            CalculationRequest::Timeline => self.engine.compute_timeline(profile),
            CalculationRequest::Scenario { overrides } => {
                if overrides.is_empty() {
                    return TurnOutcome::NeedsDetail {
                        calculation: Some(CalculationType::Scenario),
                        hint: SCENARIO_HINT,
                    };
                }
                self.engine.compute_scenario(profile, &overrides)
            }
            CalculationRequest::Withdrawal {
                monthly_withdrawal,
                fund_amount,
                withdrawal_rate_rule,
            } => {
                let fund = match fund_amount.or_else(|| self.history.latest_projected_fund()) {
                    Some(fund) => fund,
                    None => match self.fresh_projected_fund() {
                        Ok(fund) => fund,
                        Err(e) => return self.failure(e),
                    },
                };
                self.engine
                    .compute_withdrawal(fund, monthly_withdrawal, withdrawal_rate_rule)
            }
            CalculationRequest::RequiredSavings { target_fund } => {
                self.engine.compute_required_savings(profile, target_fund)
            }
            CalculationRequest::IncomeReplacement {
                replacement_ratio,
                retirement_years,
            } => self.engine.compute_income_replacement(
                profile,
                replacement_ratio.unwrap_or(DEFAULT_REPLACEMENT_RATIO),
                retirement_years.unwrap_or(DEFAULT_RETIREMENT_YEARS),
            ),
        };

        match computed {
            Ok(result) => TurnOutcome::Calculated {
                result: self.history.record(result),
                initial: false,
                baseline: None,
            },
            Err(e) => self.failure(e),
        }
    }

    fn fresh_projected_fund(&mut self) -> Result<f64> {
        let timeline = self.engine.compute_timeline(self.profile.profile())?;
        self.history
            .record(timeline)
            .projected_fund()
            .ok_or_else(|| StateError::NoCalculations.into())
    }

    fn failure(&self, error: AdvisorError) -> TurnOutcome {
        match error {
            AdvisorError::Validation(_) | AdvisorError::State(_) => TurnOutcome::Rejected {
                error: error.into(),
                question: self.interview.pending_question(),
            },
            other => {
                warn!(session_id = %self.id, "Calculation failed: {}", other);
                TurnOutcome::Failed {
                    error: TurnError::from(other),
                }
            }
        }
    }

    //
    // ================= Free text =================
    //

    /// Handle one classified message. Control commands are handled by the caller.
    pub fn process_turn(&mut self, text: &str, intent: Intent) -> TurnOutcome {
        // A readable answer to the pending question always wins
        if let Some(question) = self.interview.pending_question() {
            if let Some(outcome) = self.try_answer_text(question, text) {
                return outcome;
            }
        }

        let handler = route(self.interview.phase, intent);
        debug!(session_id = %self.id, intent = %intent, handler = ?handler, "Handling turn");

        match handler {
            Handler::PendingQuestion => match self.interview.pending_question() {
                Some(question) => TurnOutcome::Deflected { intent, question },
                None => self.ask_pending(),
            },
            Handler::PersonaUpdate => {
                let edits = extract::profile_edits(text);
                if edits.is_empty() {
                    TurnOutcome::NeedsDetail {
                        calculation: None,
                        hint: PROFILE_HINT,
                    }
                } else {
                    self.edit_profile(&edits)
                }
            }
            Handler::RunCalculation => match calculation_from_text(text) {
                Ok(request) => self.request_calculation(request),
                Err(needs_detail) => needs_detail,
            },
            Handler::RunScenario => {
                if extract::mentions_withdrawal(text) {
                    return match calculation_from_text(text) {
                        Ok(request) => self.request_calculation(request),
                        Err(needs_detail) => needs_detail,
                    };
                }
                let overrides = extract::scenario_overrides(text, self.profile.profile());
                self.request_calculation(CalculationRequest::Scenario { overrides })
            }
            Handler::Explain => match self.history.latest() {
                Some(result) => TurnOutcome::Explained {
                    result: Arc::clone(result),
                },
                None => TurnOutcome::Conversation {
                    intent,
                    question: self.interview.pending_question(),
                },
            },
            Handler::Advice | Handler::Passthrough => TurnOutcome::Conversation {
                intent,
                question: self.interview.pending_question(),
            },
        }
    }

    /// `Some` when the text carries a value for the pending question's field
    fn try_answer_text(&mut self, question: &'static Question, text: &str) -> Option<TurnOutcome> {
        let raw = Value::String(text.trim().to_string());
        match coerce_field(question.field, &raw) {
            Ok(_) => return Some(self.answer(question.field, &raw)),
            Err(e) if !e.is_format() => {
                return Some(TurnOutcome::Rejected {
                    error: e.into(),
                    question: Some(question),
                })
            }
            Err(_) => {}
        }

        let edits = extract::profile_edits(text);
        if let Some((_, value)) = edits.iter().find(|(field, _)| *field == question.field) {
            return Some(self.answer(question.field, value));
        }
        // A number stated for another field never answers this question
        if !edits.is_empty() {
            debug!(question = %question.field, "Text names other fields; not an answer");
            return None;
        }

        let value = numeric_answer(question, text)?;
        Some(self.answer(question.field, &value))
    }
}

/// The single number in `text`, read the way the question expects
fn numeric_answer(question: &Question, text: &str) -> Option<Value> {
    let token = extract::single_number(text)?;
    match question.kind {
        AnswerKind::Percent if token.percent => Some(Value::String(format!("{}%", token.value))),
        AnswerKind::Percent | AnswerKind::Years | AnswerKind::Currency if !token.percent => {
            serde_json::Number::from_f64(token.value).map(Value::Number)
        }
        _ => None,
    }
}

fn calculation_from_text(text: &str) -> std::result::Result<CalculationRequest, TurnOutcome> {
    if let Some(request) = extract::withdrawal_request(text) {
        return Ok(CalculationRequest::Withdrawal {
            monthly_withdrawal: request.monthly_withdrawal,
            fund_amount: request.fund_amount,
            withdrawal_rate_rule: None,
        });
    }
    if extract::mentions_withdrawal(text) {
        return Err(TurnOutcome::NeedsDetail {
            calculation: Some(CalculationType::Withdrawal),
            hint: WITHDRAWAL_HINT,
        });
    }
    if let Some(target_fund) = extract::target_fund(text) {
        return Ok(CalculationRequest::RequiredSavings { target_fund });
    }
    if let Some(request) = extract::replacement_request(text) {
        return Ok(CalculationRequest::IncomeReplacement {
            replacement_ratio: request.replacement_ratio,
            retirement_years: request.retirement_years,
        });
    }
    Ok(CalculationRequest::Timeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::models::WithdrawalOutcome;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn session() -> Session {
        Session::new(Uuid::new_v4(), &AdvisorConfig::default())
    }

    /// Answers the whole schedule for the 35/65 reference profile
    fn interviewed() -> (Session, Arc<CalculationResult>) {
        let mut session = session();
        let answers = [
            (ProfileField::Age, json!(35)),
            (ProfileField::RetirementAge, json!(65)),
            (ProfileField::MonthlyIncome, json!(6000)),
            (ProfileField::CurrentSavings, json!(25000)),
            (ProfileField::MonthlySavings, json!(500)),
            (ProfileField::RiskTolerance, json!("moderate")),
            (ProfileField::FinancialGoals, json!("travel")),
        ];
        for (field, value) in answers {
            assert!(matches!(
                session.answer(field, &value),
                TurnOutcome::AskQuestion { .. }
            ));
        }

        match session.answer(ProfileField::ExpectedReturn, &json!(0.07)) {
            TurnOutcome::Calculated { result, initial, .. } => {
                assert!(initial);
                (session, result)
            }
            other => panic!("expected initial projection, got {:?}", other),
        }
    }

    fn calculated(outcome: TurnOutcome) -> Arc<CalculationResult> {
        match outcome {
            TurnOutcome::Calculated { result, .. } => result,
            other => panic!("expected a calculation, got {:?}", other),
        }
    }

    #[test]
    fn test_full_interview_reaches_interactive() {
        let (session, result) = interviewed();

        assert_eq!(session.phase(), Phase::Interactive);
        assert!(session.pending_question().is_none());
        assert_eq!(session.history().len(), 1);
        assert_eq!(result.calculation_type, CalculationType::Timeline);
        assert_eq!(result.output("periods"), Some(360.0));

        let total = result.output("total").unwrap();
        assert!((770_000.0..780_000.0).contains(&total), "total {}", total);
        assert_relative_eq!(result.output("monthly_rate").unwrap(), 0.005654, epsilon = 1e-6);
    }

    #[test]
    fn test_calculation_intent_does_not_advance_interview() {
        let mut session = session();
        session.answer(ProfileField::Age, &json!(35));
        session.answer(ProfileField::RetirementAge, &json!(65));
        assert_eq!(session.interview().pending_question_index, 2);

        let outcome = session.process_turn("Calculate my retirement projection", Intent::Calculation);

        assert!(matches!(outcome, TurnOutcome::Deflected { .. }));
        assert_eq!(session.interview().pending_question_index, 2);
        assert_eq!(session.phase(), Phase::PersonaBuilding);
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_pending_question_wins_tie_break() {
        let mut session = session();

        // Looks like a calculation request but carries an age
        let outcome = session.process_turn("I'm 40, how much will I have?", Intent::Calculation);
        assert!(matches!(outcome, TurnOutcome::AskQuestion { question } if question.index == 1));
        assert_eq!(session.profile().age(), Some(40));
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_number_for_another_field_is_not_an_answer() {
        let mut session = session();

        let outcome = session.process_turn("I want to retire at 62", Intent::General);
        assert!(matches!(outcome, TurnOutcome::Conversation { .. }));
        assert_eq!(session.profile().age(), None);
        assert_eq!(session.interview().pending_question_index, 0);
    }

    #[test]
    fn test_calculation_with_other_field_does_not_advance_interview() {
        let mut session = session();
        session.answer(ProfileField::Age, &json!(35));
        session.answer(ProfileField::RetirementAge, &json!(65));

        let outcome =
            session.process_turn("Calculate what I'd have if I retire at 62", Intent::Calculation);

        assert!(matches!(outcome, TurnOutcome::Deflected { .. }));
        assert_eq!(session.interview().pending_question_index, 2);
        assert_eq!(session.profile().monthly_income(), None);
        assert_eq!(session.profile().retirement_age(), Some(65));
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_invalid_answer_stays_on_question() {
        let mut session = session();
        let outcome = session.process_turn("150", Intent::Persona);

        match outcome {
            TurnOutcome::Rejected { error, question } => {
                assert_eq!(error.category, ErrorCategory::Validation);
                assert_eq!(question.map(|q| q.index), Some(0));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(session.interview().pending_question_index, 0);
        assert_eq!(session.profile().age(), None);
    }

    #[test]
    fn test_retirement_age_invariant_rejected() {
        let mut session = session();
        session.answer(ProfileField::Age, &json!(60));
        let outcome = session.answer(ProfileField::RetirementAge, &json!(59));

        assert!(matches!(outcome, TurnOutcome::Rejected { .. }));
        assert_eq!(session.profile().retirement_age(), None);
        assert_eq!(session.interview().pending_question_index, 1);
    }

    #[test]
    fn test_answer_must_match_pending_field() {
        let mut session = session();
        let outcome = session.answer(ProfileField::MonthlyIncome, &json!(5000));

        match outcome {
            TurnOutcome::Rejected { error, .. } => assert_eq!(error.category, ErrorCategory::State),
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(session.profile().monthly_income(), None);
    }

    #[test]
    fn test_skip_rules() {
        let mut session = session();
        assert!(matches!(session.skip(), TurnOutcome::Rejected { .. }));
        assert_eq!(session.interview().pending_question_index, 0);

        for (field, value) in [
            (ProfileField::Age, json!(35)),
            (ProfileField::RetirementAge, json!(65)),
            (ProfileField::MonthlyIncome, json!(6000)),
            (ProfileField::CurrentSavings, json!(25000)),
            (ProfileField::MonthlySavings, json!(500)),
        ] {
            session.answer(field, &value);
        }

        // Risk tolerance and goals are optional
        assert!(matches!(session.skip(), TurnOutcome::AskQuestion { question } if question.index == 6));
        assert!(matches!(session.skip(), TurnOutcome::AskQuestion { question } if question.index == 7));
        assert_eq!(session.profile().financial_goals(), "comfortable retirement");
    }

    #[test]
    fn test_skip_to_calculation_uses_defaults() {
        let mut session = session();
        session.answer(ProfileField::Age, &json!(40));

        let result = calculated(session.skip_to_calculation());

        assert_eq!(session.phase(), Phase::Interactive);
        assert_eq!(session.profile().age(), Some(40));
        assert_eq!(session.profile().retirement_age(), Some(65));
        assert!(session.profile().is_complete());
        assert_eq!(result.output("periods"), Some(300.0));
    }

    #[test]
    fn test_request_calculation_refused_while_building() {
        let mut session = session();
        let outcome = session.request_calculation(CalculationRequest::Timeline);

        match outcome {
            TurnOutcome::Rejected { error, question } => {
                assert_eq!(error.category, ErrorCategory::State);
                assert_eq!(question.map(|q| q.index), Some(0));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_timeline_is_idempotent() {
        let (mut session, first) = interviewed();
        let second = calculated(session.request_calculation(CalculationRequest::Timeline));

        assert_ne!(first.id, second.id);
        assert_eq!(first.inputs_hash, second.inputs_hash);
        assert_eq!(first.outputs, second.outputs);
        assert_eq!(
            serde_json::to_string(&first.outputs).unwrap(),
            serde_json::to_string(&second.outputs).unwrap()
        );
    }

    #[test]
    fn test_scenario_from_text_reports_delta() {
        let (mut session, base) = interviewed();
        let result = calculated(session.process_turn("What if I save $200 more per month?", Intent::Scenario));

        assert_eq!(result.calculation_type, CalculationType::Scenario);
        let delta = result.delta.unwrap();

        let edited = session
            .profile()
            .with_edits(&[(ProfileField::MonthlySavings, json!(700))])
            .unwrap();
        let engine = CalculationEngine::from_config(&AdvisorConfig::default());
        let overridden = engine.compute_timeline(&edited).unwrap();

        assert_relative_eq!(
            delta.total,
            overridden.output("total").unwrap() - base.output("total").unwrap(),
            epsilon = 1e-6
        );
        assert!(delta.total > 0.0);
        // The stored profile is untouched by a scenario
        assert_eq!(session.profile().monthly_savings(), Some(500.0));
    }

    #[test]
    fn test_scenario_without_overrides_needs_detail() {
        let (mut session, _) = interviewed();
        let outcome = session.process_turn("what if things change?", Intent::Scenario);
        assert!(matches!(
            outcome,
            TurnOutcome::NeedsDetail { calculation: Some(CalculationType::Scenario), .. }
        ));
    }

    #[test]
    fn test_withdrawal_defaults_to_projected_fund() {
        let (mut session, base) = interviewed();
        let result = calculated(session.process_turn("Can I withdraw $3,000 a month?", Intent::Calculation));

        assert_eq!(result.calculation_type, CalculationType::Withdrawal);
        assert_eq!(result.output("fund_amount"), base.output("total"));
        assert_eq!(result.output("monthly_withdrawal"), Some(3000.0));
    }

    #[test]
    fn test_withdrawal_boundary_request() {
        let (mut session, _) = interviewed();
        let result = calculated(session.request_calculation(CalculationRequest::Withdrawal {
            monthly_withdrawal: 4000.0,
            fund_amount: Some(1_200_000.0),
            withdrawal_rate_rule: None,
        }));

        assert_eq!(
            result.withdrawal.map(|w| w.outcome),
            Some(WithdrawalOutcome::SustainableIndefinitely)
        );
    }

    #[test]
    fn test_persona_update_in_interactive() {
        let (mut session, _) = interviewed();
        let outcome = session.process_turn("I'm saving $800 a month now", Intent::Persona);

        match outcome {
            TurnOutcome::ProfileUpdated { fields, result } => {
                assert_eq!(fields, vec![ProfileField::MonthlySavings]);
                assert!(result.is_some());
            }
            other => panic!("expected profile update, got {:?}", other),
        }
        assert_eq!(session.phase(), Phase::Interactive);
        assert_eq!(session.profile().monthly_savings(), Some(800.0));

        // Invariant violations are rejected and nothing changes
        let outcome = session.process_turn("I want to retire at 30", Intent::Persona);
        assert!(matches!(outcome, TurnOutcome::Rejected { .. }));
        assert_eq!(session.profile().retirement_age(), Some(65));
    }

    #[test]
    fn test_explain_latest_result() {
        let (mut session, base) = interviewed();
        match session.process_turn("explain how you got that", Intent::Explanation) {
            TurnOutcome::Explained { result } => assert_eq!(result.id, base.id),
            other => panic!("expected explanation, got {:?}", other),
        }
    }

    #[test]
    fn test_start_over_clears_everything() {
        let (mut session, _) = interviewed();
        session.record_user("hello", None);

        let outcome = session.start_over();

        assert!(matches!(outcome, TurnOutcome::Reset { question } if question.index == 0));
        assert_eq!(session.phase(), Phase::PersonaBuilding);
        assert!(!session.profile().is_complete());
        assert!(session.history().is_empty());
        assert!(session.transcript().is_empty());
    }

    #[test]
    fn test_replay_recorded_result() {
        let (session, base) = interviewed();
        let report = session.replay(base.id).unwrap();
        assert!(report.is_reproducible());

        assert!(matches!(
            session.replay(Uuid::new_v4()),
            Err(AdvisorError::CalculationNotFound(_))
        ));
    }

    #[test]
    fn test_general_chat_keeps_question_pending() {
        let mut session = session();
        match session.process_turn("hello there", Intent::General) {
            TurnOutcome::Conversation { question, .. } => {
                assert_eq!(question.map(|q| q.index), Some(0))
            }
            other => panic!("expected conversation, got {:?}", other),
        }
    }
}
