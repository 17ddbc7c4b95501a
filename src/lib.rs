//! Retirement Advisor
//!
//! A guided retirement-planning conversation that:
//! - Interviews the user into a validated savings profile
//! - Runs deterministic, fully traced projections (timeline, scenario, withdrawal)
//! - Keeps every result reproducible from its input snapshot
//! - Treats the language model as an optional classifier and narrator only
//!
//! TURN FLOW:
//! INPUT → CONTROL? → CLASSIFY → ROUTE → {PROFILE | ENGINE} → RESPOND

pub mod api;
pub mod audit;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod formulas;
pub mod gemini;
pub mod interview;
pub mod market;
pub mod memory;
pub mod models;
pub mod profile;
pub mod responder;
pub mod router;
pub mod session;

pub use error::{AdvisorError, Result};

// Re-export common types
pub use models::*;
pub use session::{CalculationRequest, SessionManager, TurnOutcome, TurnReply};
