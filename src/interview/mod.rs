//! Interview state machine
//!
//! Owns the conversation phase and the pointer into the question schedule.
//! Every (phase, event) pair is handled in one exhaustive table; pairs that
//! are not legal return a `StateError` and leave the state untouched.

pub mod questions;

use serde::Serialize;
use tracing::info;

use crate::error::StateError;
use crate::models::Phase;
use crate::profile::ProfileField;

pub use questions::{question_at, question_for, AnswerKind, Question, QUESTION_COUNT, SCHEDULE};

/// Something the session observed that may move the interview forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterviewEvent {
    /// The pending question was answered and the profile updated
    AnswerAccepted {
        answered_mandatory_count: usize,
        profile_complete: bool,
    },
    QuestionSkipped,
    /// Missing mandatory fields were filled from defaults
    SkipToCalculation,
    /// The first timeline result has been produced and handed to the caller
    InitialResultDelivered,
    ProfileEdited { answered_mandatory_count: usize },
    StartOver,
}

impl InterviewEvent {
    fn name(&self) -> &'static str {
        match self {
            InterviewEvent::AnswerAccepted { .. } => "answer",
            InterviewEvent::QuestionSkipped => "skip",
            InterviewEvent::SkipToCalculation => "skip to calculation",
            InterviewEvent::InitialResultDelivered => "initial result",
            InterviewEvent::ProfileEdited { .. } => "profile edit",
            InterviewEvent::StartOver => "start over",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Transition {
    pub from: Phase,
    pub to: Phase,
    pub pending_question_index: usize,
}

impl Transition {
    pub fn changed_phase(&self) -> bool {
        self.from != self.to
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct InterviewState {
    pub phase: Phase,
    pub pending_question_index: usize,
    pub answered_mandatory_count: usize,
}

impl Default for InterviewState {
    fn default() -> Self {
        Self {
            phase: Phase::PersonaBuilding,
            pending_question_index: 0,
            answered_mandatory_count: 0,
        }
    }
}

impl InterviewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The question awaiting an answer, if the interview is still running
    pub fn pending_question(&self) -> Option<&'static Question> {
        match self.phase {
            Phase::PersonaBuilding => question_at(self.pending_question_index),
            Phase::ProfileComplete | Phase::Interactive => None,
        }
    }

    /// Apply `event`. On error the state is unchanged.
    pub fn apply(&mut self, event: InterviewEvent) -> Result<Transition, StateError> {
        let from = self.phase;
        let not_allowed = || StateError::NotAllowed {
            operation: event.name(),
            phase: from,
        };

        let next = match (from, event) {
            // ---- persona building ----
            (
                Phase::PersonaBuilding,
                InterviewEvent::AnswerAccepted {
                    answered_mandatory_count,
                    profile_complete,
                },
            ) => {
                self.pending_question()
                    .ok_or(StateError::NoPendingQuestion)?;
                InterviewState {
                    phase: if profile_complete {
                        Phase::ProfileComplete
                    } else {
                        Phase::PersonaBuilding
                    },
                    pending_question_index: self.pending_question_index + 1,
                    answered_mandatory_count,
                }
            }
            (Phase::PersonaBuilding, InterviewEvent::QuestionSkipped) => {
                let question = self
                    .pending_question()
                    .ok_or(StateError::NoPendingQuestion)?;
                if question.mandatory {
                    return Err(StateError::MandatoryQuestion {
                        field: question.field,
                    });
                }
                InterviewState {
                    pending_question_index: self.pending_question_index + 1,
                    ..*self
                }
            }
            (
                Phase::PersonaBuilding | Phase::ProfileComplete | Phase::Interactive,
                InterviewEvent::SkipToCalculation,
            ) => InterviewState {
                phase: Phase::Interactive,
                pending_question_index: QUESTION_COUNT,
                answered_mandatory_count: ProfileField::MANDATORY.len(),
            },
            (Phase::PersonaBuilding, InterviewEvent::InitialResultDelivered) => return Err(not_allowed()),
            (Phase::PersonaBuilding, InterviewEvent::ProfileEdited { .. }) => return Err(not_allowed()),

            // ---- profile complete ----
            (Phase::ProfileComplete, InterviewEvent::InitialResultDelivered) => InterviewState {
                phase: Phase::Interactive,
                ..*self
            },
            (Phase::ProfileComplete | Phase::Interactive, InterviewEvent::AnswerAccepted { .. })
            | (Phase::ProfileComplete | Phase::Interactive, InterviewEvent::QuestionSkipped) => {
                return Err(StateError::NoPendingQuestion)
            }
            (Phase::ProfileComplete, InterviewEvent::ProfileEdited { answered_mandatory_count }) => {
                InterviewState {
                    answered_mandatory_count,
                    ..*self
                }
            }

            // ---- interactive ----
            (Phase::Interactive, InterviewEvent::InitialResultDelivered) => return Err(not_allowed()),
            (Phase::Interactive, InterviewEvent::ProfileEdited { answered_mandatory_count }) => {
                InterviewState {
                    answered_mandatory_count,
                    ..*self
                }
            }

            // ---- any ----
            (_, InterviewEvent::StartOver) => InterviewState::default(),
        };

        *self = next;
        let transition = Transition {
            from,
            to: self.phase,
            pending_question_index: self.pending_question_index,
        };

        if transition.changed_phase() {
            info!(
                from = %transition.from,
                to = %transition.to,
                event = event.name(),
                "Interview phase changed"
            );
        }

        Ok(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answered(count: usize, complete: bool) -> InterviewEvent {
        InterviewEvent::AnswerAccepted {
            answered_mandatory_count: count,
            profile_complete: complete,
        }
    }

    #[test]
    fn test_initial_state() {
        let state = InterviewState::new();
        assert_eq!(state.phase, Phase::PersonaBuilding);
        assert_eq!(state.pending_question().unwrap().field, ProfileField::Age);
    }

    #[test]
    fn test_full_interview_reaches_profile_complete_on_last_answer() {
        let mut state = InterviewState::new();
        let mut mandatory = 0;

        for index in 0..QUESTION_COUNT {
            let question = state.pending_question().unwrap();
            assert_eq!(question.index, index);

            if question.mandatory {
                mandatory += 1;
                let complete = mandatory == ProfileField::MANDATORY.len();
                let t = state.apply(answered(mandatory, complete)).unwrap();
                assert_eq!(t.changed_phase(), complete);
            } else {
                state.apply(InterviewEvent::QuestionSkipped).unwrap();
            }
        }

        assert_eq!(state.phase, Phase::ProfileComplete);
        assert!(state.pending_question().is_none());

        state.apply(InterviewEvent::InitialResultDelivered).unwrap();
        assert_eq!(state.phase, Phase::Interactive);
    }

    #[test]
    fn test_mandatory_question_cannot_be_skipped() {
        let mut state = InterviewState::new();
        let err = state.apply(InterviewEvent::QuestionSkipped).unwrap_err();
        assert_eq!(
            err,
            StateError::MandatoryQuestion {
                field: ProfileField::Age
            }
        );
        assert_eq!(state, InterviewState::new());
    }

    #[test]
    fn test_skip_to_calculation_goes_straight_to_interactive() {
        let mut state = InterviewState::new();
        state.apply(answered(1, false)).unwrap();

        let t = state.apply(InterviewEvent::SkipToCalculation).unwrap();
        assert_eq!(t.to, Phase::Interactive);
        assert_eq!(state.answered_mandatory_count, 6);
    }

    #[test]
    fn test_initial_result_only_from_profile_complete() {
        let mut state = InterviewState::new();
        assert!(matches!(
            state.apply(InterviewEvent::InitialResultDelivered),
            Err(StateError::NotAllowed { .. })
        ));
    }

    #[test]
    fn test_profile_edits_rejected_while_building() {
        let mut state = InterviewState::new();
        assert!(state
            .apply(InterviewEvent::ProfileEdited {
                answered_mandatory_count: 1
            })
            .is_err());
    }

    #[test]
    fn test_start_over_from_any_phase() {
        let mut state = InterviewState::new();
        state.apply(InterviewEvent::SkipToCalculation).unwrap();
        state
            .apply(InterviewEvent::ProfileEdited {
                answered_mandatory_count: 6,
            })
            .unwrap();
        assert_eq!(state.phase, Phase::Interactive);

        state.apply(InterviewEvent::StartOver).unwrap();
        assert_eq!(state, InterviewState::default());
    }

    #[test]
    fn test_answers_rejected_once_interactive() {
        let mut state = InterviewState::new();
        state.apply(InterviewEvent::SkipToCalculation).unwrap();
        assert_eq!(
            state.apply(answered(6, true)).unwrap_err(),
            StateError::NoPendingQuestion
        );
    }
}
