//! Session registry
//!
//! Sessions live behind their own mutex so turns within a session are
//! serialized while different sessions proceed independently.

use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{CalculationRequest, Session, SessionSnapshot, TurnOutcome, TurnReply};
use crate::audit::ReplayReport;
use crate::classifier::{Classifier, GeminiClassifier, KeywordClassifier};
use crate::config::AdvisorConfig;
use crate::error::AdvisorError;
use crate::extract;
use crate::gemini::GeminiClient;
use crate::market::{HttpMarketData, MarketDataProvider, MarketSnapshot};
use crate::models::{CalculationResult, Intent, Phase};
use crate::profile::ProfileField;
use crate::responder::{GeminiResponder, Responder, ResponseContext, TemplateResponder};
use crate::Result;

/// Transcript messages handed to the responder
const CONTEXT_MESSAGES: usize = 10;

pub struct SessionManager {
    config: AdvisorConfig,
    classifier: Arc<dyn Classifier>,
    responder: Arc<dyn Responder>,
    market: Option<Arc<dyn MarketDataProvider>>,
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<Session>>>>,
}

impl SessionManager {
    pub fn new(
        config: AdvisorConfig,
        classifier: Arc<dyn Classifier>,
        responder: Arc<dyn Responder>,
    ) -> Self {
        info!(
            classifier = classifier.name(),
            responder = responder.name(),
            "Session manager ready"
        );
        Self {
            config,
            classifier,
            responder,
            market: None,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Keyword classifier and template responder; no network access
    pub fn offline(config: AdvisorConfig) -> Self {
        Self::new(
            config,
            Arc::new(KeywordClassifier::new()),
            Arc::new(TemplateResponder::new()),
        )
    }

    /// Hosted collaborators when `GEMINI_API_KEY` / `MARKET_DATA_BASE_URL` are set
    /// (`GEMINI_MODEL_URL` overrides the model endpoint),
    /// offline ones otherwise
    pub fn from_env(config: AdvisorConfig) -> Result<Self> {
        let manager = match env::var("GEMINI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => {
                let mut client = GeminiClient::new(key)?;
                if let Ok(url) = env::var("GEMINI_MODEL_URL") {
                    info!(%url, "Using custom model endpoint");
                    client = client.with_base_url(url);
                }
                let client = Arc::new(client);
                Self::new(
                    config,
                    Arc::new(GeminiClassifier::new(Arc::clone(&client))),
                    Arc::new(GeminiResponder::new(client)),
                )
            }
            _ => {
                warn!("GEMINI_API_KEY not set, using keyword classifier and template responses");
                Self::offline(config)
            }
        };

        match env::var("MARKET_DATA_BASE_URL") {
            Ok(url) if !url.trim().is_empty() => {
                Ok(manager.with_market_data(Arc::new(HttpMarketData::new(url)?)))
            }
            _ => Ok(manager),
        }
    }

    pub fn with_market_data(mut self, provider: Arc<dyn MarketDataProvider>) -> Self {
        info!(provider = provider.name(), "Market data enabled");
        self.market = Some(provider);
        self
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    //
    // ================= Registry =================
    //

    /// Open a session; the reply carries the first question
    pub async fn create_session(&self) -> TurnReply {
        let id = Uuid::new_v4();
        let mut session = Session::new(id, &self.config);
        let outcome = session.ask_pending();
        let reply = self.reply(&mut session, outcome, None).await;

        self.sessions
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(session)));
        info!(session_id = %id, "Session created");

        reply
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn remove_session(&self, id: Uuid) -> Result<()> {
        match self.sessions.write().await.remove(&id) {
            Some(_) => {
                info!(session_id = %id, "Session closed");
                Ok(())
            }
            None => Err(AdvisorError::SessionNotFound(id)),
        }
    }

    pub async fn snapshot(&self, id: Uuid) -> Result<SessionSnapshot> {
        let handle = self.session(id).await?;
        let session = handle.lock().await;
        Ok(session.snapshot())
    }

    pub async fn history(&self, id: Uuid) -> Result<Vec<Arc<CalculationResult>>> {
        let handle = self.session(id).await?;
        let session = handle.lock().await;
        Ok(session.history().iter().cloned().collect())
    }

    pub async fn replay(&self, id: Uuid, result_id: Uuid) -> Result<ReplayReport> {
        let handle = self.session(id).await?;
        let session = handle.lock().await;
        session.replay(result_id)
    }

    async fn session(&self, id: Uuid) -> Result<Arc<Mutex<Session>>> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(AdvisorError::SessionNotFound(id))
    }

    //
    // ================= Turns =================
    //

    /// Free-text turn: control commands, then classification, then the session
    pub async fn handle_message(&self, id: Uuid, text: &str) -> Result<TurnReply> {
        let handle = self.session(id).await?;
        let mut session = handle.lock().await;

        let outcome = match extract::control_command(text) {
            Some(command) => {
                debug!(session_id = %id, ?command, "Control command");
                session.record_user(text, None);
                session.control(command)
            }
            None => {
                let intent = self.classify(text, session.phase()).await;
                session.record_user(text, Some(intent));
                session.process_turn(text, intent)
            }
        };

        Ok(self.reply(&mut session, outcome, Some(text)).await)
    }

    /// Structured answer. Without `field` the pending question's field is used.
    pub async fn answer(&self, id: Uuid, field: Option<ProfileField>, value: &Value) -> Result<TurnReply> {
        let handle = self.session(id).await?;
        let mut session = handle.lock().await;

        let outcome = match field.or_else(|| session.pending_question().map(|q| q.field)) {
            Some(field) => session.answer(field, value),
            None => session.ask_pending(),
        };
        Ok(self.reply(&mut session, outcome, None).await)
    }

    pub async fn skip(&self, id: Uuid) -> Result<TurnReply> {
        self.run(id, Session::skip).await
    }

    pub async fn skip_to_calculation(&self, id: Uuid) -> Result<TurnReply> {
        self.run(id, Session::skip_to_calculation).await
    }

    pub async fn start_over(&self, id: Uuid) -> Result<TurnReply> {
        self.run(id, Session::start_over).await
    }

    pub async fn request_calculation(&self, id: Uuid, request: CalculationRequest) -> Result<TurnReply> {
        self.run(id, move |session| session.request_calculation(request))
            .await
    }

    async fn run<F>(&self, id: Uuid, operation: F) -> Result<TurnReply>
    where
        F: FnOnce(&mut Session) -> TurnOutcome + Send,
    {
        let handle = self.session(id).await?;
        let mut session = handle.lock().await;
        let outcome = operation(&mut *session);
        Ok(self.reply(&mut session, outcome, None).await)
    }

    /// Never fails: errors and timeouts degrade to GENERAL
    async fn classify(&self, text: &str, phase: Phase) -> Intent {
        let timeout = self.config.classifier_timeout;
        match tokio::time::timeout(timeout, self.classifier.classify(text, phase)).await {
            Ok(Ok(intent)) => intent,
            Ok(Err(e)) => {
                warn!(classifier = self.classifier.name(), "Classifier failed, using GENERAL: {}", e);
                Intent::General
            }
            Err(_) => {
                warn!(
                    classifier = self.classifier.name(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Classifier timed out, using GENERAL"
                );
                Intent::General
            }
        }
    }

    async fn market_context(&self) -> Option<MarketSnapshot> {
        let provider = self.market.as_ref()?;
        match provider.snapshot().await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(provider = provider.name(), "Market data unavailable: {}", e);
                None
            }
        }
    }

    async fn reply(&self, session: &mut Session, outcome: TurnOutcome, user_text: Option<&str>) -> TurnReply {
        let market = if matches!(outcome, TurnOutcome::Conversation { .. }) {
            self.market_context().await
        } else {
            None
        };

        let message = {
            let ctx = ResponseContext {
                outcome: &outcome,
                phase: session.phase(),
                profile: session.profile(),
                latest_result: session.history().latest().map(|r| r.as_ref()),
                user_text,
                conversation: session.transcript().formatted_context(CONTEXT_MESSAGES),
                market,
            };
            match self.responder.respond(&ctx).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(responder = self.responder.name(), "Responder failed, using template: {}", e);
                    TemplateResponder::new().render(&ctx)
                }
            }
        };

        session.record_advisor(&message);

        TurnReply {
            session_id: session.id(),
            phase: session.phase(),
            message,
            outcome,
            pending_question: session.pending_question(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::StaticMarketData;
    use crate::models::CalculationType;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::time::Duration;

    struct FailingClassifier;

    #[async_trait]
    impl Classifier for FailingClassifier {
        async fn classify(&self, _text: &str, _phase_hint: Phase) -> Result<Intent> {
            Err(AdvisorError::Classifier("unavailable".to_string()))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    struct SlowClassifier;

    #[async_trait]
    impl Classifier for SlowClassifier {
        async fn classify(&self, _text: &str, _phase_hint: Phase) -> Result<Intent> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Intent::Calculation)
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    /// Replies with the market source it was given
    struct MarketEcho;

    #[async_trait]
    impl Responder for MarketEcho {
        async fn respond(&self, ctx: &ResponseContext<'_>) -> Result<String> {
            Ok(ctx
                .market
                .as_ref()
                .map(|m| m.source.clone())
                .unwrap_or_default())
        }

        fn name(&self) -> &'static str {
            "echo"
        }
    }

    async fn interviewed(manager: &SessionManager) -> Uuid {
        let id = manager.create_session().await.session_id;
        for text in ["35", "65", "$6,000", "25000", "500", "skip", "skip"] {
            let reply = manager.handle_message(id, text).await.unwrap();
            assert_eq!(reply.phase, Phase::PersonaBuilding, "after {:?}", text);
        }
        id
    }

    #[tokio::test]
    async fn test_create_session_asks_first_question() {
        let manager = SessionManager::offline(AdvisorConfig::default());
        let reply = manager.create_session().await;

        assert_eq!(reply.phase, Phase::PersonaBuilding);
        assert_eq!(reply.pending_question.map(|q| q.index), Some(0));
        assert!(reply.message.contains("Question 1 of 8"));
        assert_eq!(manager.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_conversation_to_interactive() {
        let manager = SessionManager::offline(AdvisorConfig::default());
        let id = interviewed(&manager).await;

        let reply = manager.handle_message(id, "7%").await.unwrap();
        assert_eq!(reply.phase, Phase::Interactive);
        assert!(matches!(reply.outcome, TurnOutcome::Calculated { initial: true, .. }));
        assert!(reply.message.contains("Retirement Projection"));

        let reply = manager
            .handle_message(id, "What if I save $200 more per month?")
            .await
            .unwrap();
        let result = reply.outcome.result().unwrap();
        assert_eq!(result.calculation_type, CalculationType::Scenario);
        assert!(result.delta.unwrap().total > 0.0);

        let history = manager.history(id).await.unwrap();
        assert_eq!(history.len(), 2);
        let report = manager.replay(id, history[1].id).await.unwrap();
        assert!(report.is_reproducible());
    }

    #[tokio::test]
    async fn test_calculation_request_during_interview_is_deflected() {
        let manager = SessionManager::offline(AdvisorConfig::default());
        let id = manager.create_session().await.session_id;
        manager.handle_message(id, "35").await.unwrap();
        manager.handle_message(id, "65").await.unwrap();

        let reply = manager
            .handle_message(id, "calculate my retirement projection")
            .await
            .unwrap();

        assert!(matches!(reply.outcome, TurnOutcome::Deflected { .. }));
        assert_eq!(reply.pending_question.map(|q| q.index), Some(2));
        assert!(manager.history(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_classifier_failure_degrades_to_general() {
        let manager = SessionManager::new(
            AdvisorConfig::default(),
            Arc::new(FailingClassifier),
            Arc::new(TemplateResponder::new()),
        );
        let id = manager.create_session().await.session_id;

        let reply = manager.handle_message(id, "hello").await.unwrap();
        assert!(matches!(
            reply.outcome,
            TurnOutcome::Conversation { intent: Intent::General, .. }
        ));
    }

    #[tokio::test]
    async fn test_classifier_timeout_degrades_to_general() {
        let config = AdvisorConfig {
            classifier_timeout: Duration::from_millis(20),
            ..AdvisorConfig::default()
        };
        let manager = SessionManager::new(
            config,
            Arc::new(SlowClassifier),
            Arc::new(TemplateResponder::new()),
        );
        let id = manager.create_session().await.session_id;

        let reply = manager.handle_message(id, "hello").await.unwrap();
        assert!(matches!(
            reply.outcome,
            TurnOutcome::Conversation { intent: Intent::General, .. }
        ));
    }

    #[tokio::test]
    async fn test_market_context_only_for_conversation() {
        let snapshot = MarketSnapshot {
            as_of: Utc::now(),
            savings_rate: Some(0.04),
            inflation_rate: None,
            index_name: None,
            index_level: None,
            source: "fixture".to_string(),
        };
        let manager = SessionManager::new(
            AdvisorConfig::default(),
            Arc::new(KeywordClassifier::new()),
            Arc::new(MarketEcho),
        )
        .with_market_data(Arc::new(StaticMarketData::new(snapshot)));

        let created = manager.create_session().await;
        assert_eq!(created.message, "");

        let reply = manager
            .handle_message(created.session_id, "hello there")
            .await
            .unwrap();
        assert_eq!(reply.message, "fixture");
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let manager = SessionManager::offline(AdvisorConfig::default());
        let first = manager.create_session().await.session_id;
        let second = manager.create_session().await.session_id;

        manager.handle_message(first, "42").await.unwrap();

        assert_eq!(manager.snapshot(first).await.unwrap().profile.age(), Some(42));
        assert_eq!(manager.snapshot(second).await.unwrap().profile.age(), None);
    }

    #[tokio::test]
    async fn test_start_over_and_unknown_session() {
        let manager = SessionManager::offline(AdvisorConfig::default());
        let id = interviewed(&manager).await;

        let reply = manager.handle_message(id, "start over").await.unwrap();
        assert!(matches!(reply.outcome, TurnOutcome::Reset { .. }));
        let snapshot = manager.snapshot(id).await.unwrap();
        assert_eq!(snapshot.interview.pending_question_index, 0);
        assert!(snapshot.profile.age().is_none());

        manager.remove_session(id).await.unwrap();
        assert!(matches!(
            manager.handle_message(id, "hi").await,
            Err(AdvisorError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_structured_answer_uses_pending_field() {
        let manager = SessionManager::offline(AdvisorConfig::default());
        let id = manager.create_session().await.session_id;

        let reply = manager.answer(id, None, &Value::from(30)).await.unwrap();
        assert_eq!(reply.pending_question.map(|q| q.index), Some(1));

        let reply = manager
            .request_calculation(id, CalculationRequest::Timeline)
            .await
            .unwrap();
        assert!(matches!(reply.outcome, TurnOutcome::Rejected { .. }));
    }
}
