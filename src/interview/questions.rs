//! Fixed interview question schedule

use serde::Serialize;

use crate::profile::ProfileField;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    Years,
    Currency,
    Percent,
    Choice,
    Text,
}

impl AnswerKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, AnswerKind::Years | AnswerKind::Currency | AnswerKind::Percent)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Question {
    pub index: usize,
    pub field: ProfileField,
    pub prompt: &'static str,
    pub kind: AnswerKind,
    pub mandatory: bool,
    /// Suggested replies for button-style front ends
    pub quick_options: &'static [&'static str],
}

pub const QUESTION_COUNT: usize = 8;

pub static SCHEDULE: [Question; QUESTION_COUNT] = [
    Question {
        index: 0,
        field: ProfileField::Age,
        prompt: "How old are you?",
        kind: AnswerKind::Years,
        mandatory: true,
        quick_options: &["25", "35", "45", "55"],
    },
    Question {
        index: 1,
        field: ProfileField::RetirementAge,
        prompt: "At what age would you like to retire?",
        kind: AnswerKind::Years,
        mandatory: true,
        quick_options: &["55", "60", "65", "67"],
    },
    Question {
        index: 2,
        field: ProfileField::MonthlyIncome,
        prompt: "What is your monthly income before tax?",
        kind: AnswerKind::Currency,
        mandatory: true,
        quick_options: &["$3,000", "$5,000", "$8,000", "$12,000"],
    },
    Question {
        index: 3,
        field: ProfileField::CurrentSavings,
        prompt: "How much have you saved for retirement so far?",
        kind: AnswerKind::Currency,
        mandatory: true,
        quick_options: &["$0", "$10,000", "$50,000", "$150,000"],
    },
    Question {
        index: 4,
        field: ProfileField::MonthlySavings,
        prompt: "How much do you put toward retirement each month?",
        kind: AnswerKind::Currency,
        mandatory: true,
        quick_options: &["$200", "$500", "$1,000", "$2,000"],
    },
    Question {
        index: 5,
        field: ProfileField::RiskTolerance,
        prompt: "How would you describe your investment risk tolerance?",
        kind: AnswerKind::Choice,
        mandatory: false,
        quick_options: &["conservative", "moderate", "aggressive"],
    },
    Question {
        index: 6,
        field: ProfileField::FinancialGoals,
        prompt: "What does a good retirement look like for you?",
        kind: AnswerKind::Text,
        mandatory: false,
        quick_options: &["comfortable retirement", "travel", "early retirement"],
    },
    Question {
        index: 7,
        field: ProfileField::ExpectedReturn,
        prompt: "What annual return do you expect on your investments?",
        kind: AnswerKind::Percent,
        mandatory: true,
        quick_options: &["4%", "6%", "7%", "8%"],
    },
];

pub fn question_at(index: usize) -> Option<&'static Question> {
    SCHEDULE.get(index)
}

pub fn question_for(field: ProfileField) -> &'static Question {
    // Every profile field has exactly one question
    &SCHEDULE[SCHEDULE
        .iter()
        .position(|q| q.field == field)
        .unwrap_or_default()]
}
