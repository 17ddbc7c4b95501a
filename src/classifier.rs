//! Intent classification
//!
//! `KeywordClassifier` works offline from static keyword lists;
//! `GeminiClassifier` asks the hosted model for a single label. Both only
//! produce an [`Intent`]; failures are absorbed by the session manager.

use async_trait::async_trait;
use std::sync::Arc;

use crate::gemini::{GeminiClient, GenerationConfig};
use crate::models::{Intent, Phase};
use crate::Result;

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str, phase_hint: Phase) -> Result<Intent>;

    fn name(&self) -> &'static str;
}

/// Static keyword lists
const SCENARIO_KEYWORDS: &[&str] = &[
    "what if", "what happens if", "suppose", "instead", "scenario", "compare",
    "if i save", "if i retire", "if i invest", "more per month", "extra",
    "additional", "increase my", "reduce my", "cut my",
];

const CALCULATION_KEYWORDS: &[&str] = &[
    "calculate", "compute", "how much will", "how much would", "project", "timeline",
    "withdraw", "how long will", "how long would", "last", "% rule", "need to save",
    "should i save to", "replace", "total", "run the numbers", "show me", "results",
    "analysis",
];

const EXPLANATION_KEYWORDS: &[&str] = &[
    "explain", "why", "how did you", "how was", "how is that", "what does", "what is",
    "mean", "break down", "breakdown", "the math", "formula",
];

const ADVICE_KEYWORDS: &[&str] = &[
    "should i", "advice", "recommend", "suggest", "tips", "improve", "better",
    "best way", "on track", "enough",
];

const PERSONA_KEYWORDS: &[&str] = &[
    "i'm", "i am", "years old", "my age", "i earn", "my income", "i make", "my salary",
    "i save", "i've saved", "i have saved", "my savings", "change my", "update my",
    "actually", "now earn", "got a raise",
];

/// Ties resolve in this order
const PRIORITY: [(Intent, &[&str]); 5] = [
    (Intent::Scenario, SCENARIO_KEYWORDS),
    (Intent::Explanation, EXPLANATION_KEYWORDS),
    (Intent::Calculation, CALCULATION_KEYWORDS),
    (Intent::Advice, ADVICE_KEYWORDS),
    (Intent::Persona, PERSONA_KEYWORDS),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify_text(text: &str, phase_hint: Phase) -> Intent {
        let text = text.to_lowercase();

        let mut best: Option<(Intent, usize)> = None;
        for (intent, keywords) in PRIORITY {
            let score = keywords.iter().filter(|kw| text.contains(**kw)).count();
            if score > best.map(|(_, s)| s).unwrap_or(0) {
                best = Some((intent, score));
            }
        }

        match best {
            Some((intent, _)) => intent,
            // A bare value while the interview runs is an answer
            None if phase_hint == Phase::PersonaBuilding && text.chars().any(|c| c.is_ascii_digit()) => {
                Intent::Persona
            }
            None => Intent::General,
        }
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, text: &str, phase_hint: Phase) -> Result<Intent> {
        Ok(Self::classify_text(text, phase_hint))
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

const CLASSIFIER_PROMPT: &str = r#"You classify messages sent to a retirement planning assistant.

Reply with exactly one label and nothing else:
PERSONA - the user states or changes personal details (age, income, savings, retirement age, return, risk)
CALCULATION - the user asks for a projection, withdrawal check, required savings or income replacement
SCENARIO - the user asks a what-if question that changes one or more inputs
EXPLANATION - the user asks how a number was derived or what a term means
ADVICE - the user asks for recommendations
GENERAL - anything else"#;

/// Hosted classifier backed by Gemini
pub struct GeminiClassifier {
    client: Arc<GeminiClient>,
}

impl GeminiClassifier {
    pub fn new(client: Arc<GeminiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Classifier for GeminiClassifier {
    async fn classify(&self, text: &str, phase_hint: Phase) -> Result<Intent> {
        let query = format!("Interview phase: {}\nMessage: {}", phase_hint, text);
        let reply = self
            .client
            .generate(CLASSIFIER_PROMPT, &query, GenerationConfig::classification())
            .await?;

        Ok(Intent::parse_lenient(&reply.text))
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
