//! Intent router
//!
//! Deterministic (phase, intent) lookup. Deflects early calculation requests
//! back into the interview and never fails.

use serde::Serialize;
use tracing::debug;

use crate::models::{Intent, Phase};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Handler {
    /// Treat the message as an answer to the pending question
    PendingQuestion,
    PersonaUpdate,
    RunCalculation,
    RunScenario,
    Explain,
    Advice,
    Passthrough,
}

pub fn route(phase: Phase, intent: Intent) -> Handler {
    let handler = match (phase, intent) {
        // The pending question always wins while building the persona
        (Phase::PersonaBuilding, Intent::Persona)
        | (Phase::PersonaBuilding, Intent::Calculation)
        | (Phase::PersonaBuilding, Intent::Scenario) => Handler::PendingQuestion,
        (Phase::PersonaBuilding, Intent::Explanation) => Handler::Passthrough,
        (Phase::PersonaBuilding, Intent::Advice) => Handler::Advice,
        (Phase::PersonaBuilding, Intent::General) => Handler::Passthrough,

        // Whatever arrives first after completion triggers the initial projection
        (Phase::ProfileComplete, _) => Handler::RunCalculation,

        (Phase::Interactive, Intent::Persona) => Handler::PersonaUpdate,
        (Phase::Interactive, Intent::Calculation) => Handler::RunCalculation,
        (Phase::Interactive, Intent::Scenario) => Handler::RunScenario,
        (Phase::Interactive, Intent::Explanation) => Handler::Explain,
        (Phase::Interactive, Intent::Advice) => Handler::Advice,
        (Phase::Interactive, Intent::General) => Handler::Passthrough,
    };

    debug!(phase = %phase, intent = %intent, handler = ?handler, "Routed turn");
    handler
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculation_deflected_while_building() {
        assert_eq!(
            route(Phase::PersonaBuilding, Intent::Calculation),
            Handler::PendingQuestion
        );
        assert_eq!(
            route(Phase::PersonaBuilding, Intent::Scenario),
            Handler::PendingQuestion
        );
    }

    #[test]
    fn test_profile_complete_always_calculates() {
        for intent in Intent::ALL {
            assert_eq!(route(Phase::ProfileComplete, intent), Handler::RunCalculation);
        }
    }

    #[test]
    fn test_interactive_table() {
        let expected = [
            (Intent::Persona, Handler::PersonaUpdate),
            (Intent::Calculation, Handler::RunCalculation),
            (Intent::Scenario, Handler::RunScenario),
            (Intent::Explanation, Handler::Explain),
            (Intent::Advice, Handler::Advice),
            (Intent::General, Handler::Passthrough),
        ];
        for (intent, handler) in expected {
            assert_eq!(route(Phase::Interactive, intent), handler);
        }
    }

    #[test]
    fn test_unknown_label_fails_open() {
        let unknown = Intent::parse_lenient("PORTFOLIO_REBALANCE");
        assert_eq!(route(Phase::Interactive, unknown), Handler::Passthrough);
        assert_eq!(
            route(Phase::Interactive, Intent::parse_lenient("scenario")),
            Handler::RunScenario
        );
    }
}
