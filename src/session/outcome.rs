//! Turn outcomes and calculation requests

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::TurnError;
use crate::interview::Question;
use crate::models::{CalculationResult, CalculationType, Intent, Phase};
use crate::profile::ProfileField;

/// Default share of current income to replace in retirement
pub const DEFAULT_REPLACEMENT_RATIO: f64 = 0.8;
pub const DEFAULT_RETIREMENT_YEARS: u32 = 25;

/// Explicit calculation request from the presentation layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CalculationRequest {
    Timeline,
    Scenario {
        overrides: BTreeMap<ProfileField, Value>,
    },
    Withdrawal {
        monthly_withdrawal: f64,
        #[serde(default)]
        fund_amount: Option<f64>,
        #[serde(default)]
        withdrawal_rate_rule: Option<f64>,
    },
    RequiredSavings {
        target_fund: f64,
    },
    IncomeReplacement {
        #[serde(default)]
        replacement_ratio: Option<f64>,
        #[serde(default)]
        retirement_years: Option<u32>,
    },
}

impl CalculationRequest {
    pub fn calculation_type(&self) -> CalculationType {
        match self {
            CalculationRequest::Timeline => CalculationType::Timeline,
            CalculationRequest::Scenario { .. } => CalculationType::Scenario,
            CalculationRequest::Withdrawal { .. } => CalculationType::Withdrawal,
            CalculationRequest::RequiredSavings { .. } => CalculationType::RequiredSavings,
            CalculationRequest::IncomeReplacement { .. } => CalculationType::IncomeReplacement,
        }
    }
}

/// Structured result of one turn. Carries everything a responder needs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnOutcome {
    AskQuestion {
        question: &'static Question,
    },
    /// Input was refused; the pending question (if any) is asked again
    Rejected {
        error: TurnError,
        #[serde(skip_serializing_if = "Option::is_none")]
        question: Option<&'static Question>,
    },
    /// A request arrived before the profile was complete
    Deflected {
        intent: Intent,
        question: &'static Question,
    },
    Calculated {
        result: Arc<CalculationResult>,
        /// First projection after the profile was completed
        initial: bool,
        /// Initial projection produced on the way to `result`
        #[serde(skip_serializing_if = "Option::is_none")]
        baseline: Option<Arc<CalculationResult>>,
    },
    ProfileUpdated {
        fields: Vec<ProfileField>,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Arc<CalculationResult>>,
    },
    Explained {
        result: Arc<CalculationResult>,
    },
    /// Advice or general chat; text comes from the responder
    Conversation {
        intent: Intent,
        #[serde(skip_serializing_if = "Option::is_none")]
        question: Option<&'static Question>,
    },
    NeedsDetail {
        calculation: Option<CalculationType>,
        hint: &'static str,
    },
    Reset {
        question: &'static Question,
    },
    Failed {
        error: TurnError,
    },
}

impl TurnOutcome {
    pub fn result(&self) -> Option<&Arc<CalculationResult>> {
        match self {
            TurnOutcome::Calculated { result, .. } | TurnOutcome::Explained { result } => Some(result),
            TurnOutcome::ProfileUpdated { result, .. } => result.as_ref(),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&TurnError> {
        match self {
            TurnOutcome::Rejected { error, .. } | TurnOutcome::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// What the session manager hands back for every turn
#[derive(Debug, Clone, Serialize)]
pub struct TurnReply {
    pub session_id: Uuid,
    pub phase: Phase,
    pub message: String,
    pub outcome: TurnOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_question: Option<&'static Question>,
}
