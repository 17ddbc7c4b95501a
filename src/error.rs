//! Error types for the retirement advisor
//!
//! Three user-recoverable categories (validation, domain, state) plus the
//! failures of external collaborators, which never escape a session turn.

use serde::Serialize;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::models::Phase;
use crate::profile::ProfileField;

/// Result type alias for advisor operations
pub type Result<T> = std::result::Result<T, AdvisorError>;

//
// ================= Validation =================
//

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValidationKind {
    /// The raw value could not be read as the field's type
    Format,
    /// The value was read but falls outside the allowed range
    Range,
    /// The value breaks a cross-field invariant
    Invariant,
    /// A required value is missing
    Required,
}

/// A field failed validation. Always recoverable; shown to the user as-is.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{field}: {constraint}")]
pub struct ValidationError {
    pub field: String,
    pub kind: ValidationKind,
    pub constraint: String,
}

impl ValidationError {
    pub fn new(field: impl fmt::Display, kind: ValidationKind, constraint: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            kind,
            constraint: constraint.into(),
        }
    }

    pub fn format(field: impl fmt::Display, constraint: impl Into<String>) -> Self {
        Self::new(field, ValidationKind::Format, constraint)
    }

    pub fn range(field: impl fmt::Display, constraint: impl Into<String>) -> Self {
        Self::new(field, ValidationKind::Range, constraint)
    }

    pub fn invariant(field: impl fmt::Display, constraint: impl Into<String>) -> Self {
        Self::new(field, ValidationKind::Invariant, constraint)
    }

    pub fn required(field: impl fmt::Display) -> Self {
        Self::new(field, ValidationKind::Required, "is required but has not been provided")
    }

    pub fn is_format(&self) -> bool {
        self.kind == ValidationKind::Format
    }
}

//
// ================= Domain =================
//

/// A formula was asked to evaluate outside its numeric domain.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("could not compute {formula}: {parameter} = {value} is outside the valid domain{}", field_suffix(.field))]
pub struct DomainError {
    pub formula: &'static str,
    pub parameter: &'static str,
    pub value: f64,
    /// Profile field the offending parameter came from, when known
    pub field: Option<String>,
}

fn field_suffix(field: &Option<String>) -> String {
    match field {
        Some(field) => format!(" (check {})", field),
        None => String::new(),
    }
}

impl DomainError {
    pub fn new(formula: &'static str, parameter: &'static str, value: f64) -> Self {
        Self {
            formula,
            parameter,
            value,
            field: None,
        }
    }

    /// Attach the profile field the bad parameter was derived from
    pub fn for_field(mut self, field: impl fmt::Display) -> Self {
        self.field = Some(field.to_string());
        self
    }
}

//
// ================= State =================
//

/// An operation was requested in a phase that forbids it.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StateError {
    #[error("{operation} is not available while the interview is in the {phase} phase")]
    NotAllowed { operation: &'static str, phase: Phase },

    #[error("{field} is required and cannot be skipped")]
    MandatoryQuestion { field: ProfileField },

    #[error("expected an answer for {expected}, received {received}")]
    UnexpectedQuestion {
        expected: ProfileField,
        received: ProfileField,
    },

    #[error("there is no pending interview question")]
    NoPendingQuestion,

    #[error("no calculations have been run yet")]
    NoCalculations,
}

//
// ================= Aggregate =================
//

#[derive(Error, Debug)]
pub enum AdvisorError {

    // =============================
    // Core Errors
    // =============================

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Calculation not found: {0}")]
    CalculationNotFound(Uuid),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // Collaborator Errors
    // =============================

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Market data error: {0}")]
    MarketData(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

//
// ================= Turn errors =================
//

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Domain,
    State,
    Internal,
}

/// Serializable error carried inside a turn outcome
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TurnError {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl From<ValidationError> for TurnError {
    fn from(err: ValidationError) -> Self {
        Self {
            category: ErrorCategory::Validation,
            message: err.to_string(),
            field: Some(err.field),
        }
    }
}

impl From<DomainError> for TurnError {
    fn from(err: DomainError) -> Self {
        Self {
            category: ErrorCategory::Domain,
            message: err.to_string(),
            field: err.field,
        }
    }
}

impl From<StateError> for TurnError {
    fn from(err: StateError) -> Self {
        Self {
            category: ErrorCategory::State,
            message: err.to_string(),
            field: None,
        }
    }
}

impl From<AdvisorError> for TurnError {
    fn from(err: AdvisorError) -> Self {
        match err {
            AdvisorError::Validation(e) => e.into(),
            AdvisorError::Domain(e) => e.into(),
            AdvisorError::State(e) => e.into(),
            other => Self {
                category: ErrorCategory::Internal,
                message: other.to_string(),
                field: None,
            },
        }
    }
}
