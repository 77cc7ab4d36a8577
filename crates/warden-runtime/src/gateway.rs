//! Chat pipeline.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, instrument, warn};
use warden_core::{ClientIdentity, Clock, ConversationId, GatewayError};
use warden_guardrails::{
    MessageVerdict, RejectReason, ScreeningDecision, ScreeningPolicy, Validator,
    validate_conversation_id,
};
use warden_llm::prompts::build_context;
use warden_llm::{CompletionOptions, CompletionService};
use warden_memory::{ConversationState, ConversationStore};
use warden_ratelimit::{AdmissionController, RateStats};

use crate::relay::{RelayContext, StreamOrchestrator};
use crate::summarize::SummaryQueue;

/// Retry hint returned when the rate store cannot be read.
const FAIL_CLOSED_RETRY: Duration = Duration::from_secs(60);

/// Collaborators the gateway drives.
pub struct GatewayDeps {
    /// Per-identity admission.
    pub admission: Arc<AdmissionController>,
    /// Conversation history.
    pub store: Arc<dyn ConversationStore>,
    /// Token source.
    pub completion: Arc<dyn CompletionService>,
    /// Summarization hand-off.
    pub summaries: Arc<dyn SummaryQueue>,
    /// Time source for turn timestamps.
    pub clock: Arc<dyn Clock>,
}

/// Pipeline tunables.
#[derive(Clone, Copy, Debug)]
pub struct GatewayConfig {
    /// Maximum message length in characters.
    pub max_message_chars: usize,
    /// Screening thresholds.
    pub screening: ScreeningPolicy,
    /// Options for chat completions.
    pub completion: CompletionOptions,
    /// Summarize when the turn count reaches a multiple of this.
    pub summarize_threshold: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_message_chars: warden_guardrails::validator::MAX_MESSAGE_CHARS,
            screening: ScreeningPolicy::default(),
            completion: CompletionOptions::default(),
            summarize_threshold: 10,
        }
    }
}

/// Entry point for chat requests.
pub struct ChatGateway {
    admission: Arc<AdmissionController>,
    store: Arc<dyn ConversationStore>,
    completion: Arc<dyn CompletionService>,
    clock: Arc<dyn Clock>,
    validator: Validator,
    config: GatewayConfig,
    orchestrator: StreamOrchestrator,
}

impl ChatGateway {
    /// Wire a gateway from its collaborators.
    pub fn new(deps: GatewayDeps, config: GatewayConfig) -> Self {
        let orchestrator = StreamOrchestrator::new(
            deps.store.clone(),
            deps.summaries,
            deps.clock.clone(),
            config.summarize_threshold,
        );
        Self {
            admission: deps.admission,
            store: deps.store,
            completion: deps.completion,
            clock: deps.clock,
            validator: Validator::new(config.max_message_chars),
            config,
            orchestrator,
        }
    }

    /// Validator used for incoming messages.
    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Run one chat request and return its event stream.
    ///
    /// Every error is raised before any token is produced; later failures
    /// travel in-band as error frames.
    #[instrument(skip(self, identity, body), fields(client_id = %identity))]
    pub async fn handle(
        &self,
        identity: &ClientIdentity,
        body: &Value,
    ) -> Result<ReceiverStream<Bytes>, GatewayError> {
        let received_at = self.clock.now_ms();
        self.admit(identity).await?;

        let conversation_id = validate_conversation_id(&body["conversationId"])
            .map_err(|e| reject(identity, GatewayError::from(e)))?;

        let accepted = match self.validator.validate_message(&body["message"]) {
            MessageVerdict::Rejected(e) => return Err(reject(identity, e.into())),
            MessageVerdict::Accepted(accepted) => accepted,
        };

        match self.config.screening.evaluate(&accepted) {
            ScreeningDecision::Allow => {}
            ScreeningDecision::Flag(reasons) => {
                metrics::counter!("screening_flags_total").increment(1);
                info!(
                    client_id = %identity,
                    %conversation_id,
                    score = accepted.score,
                    patterns = ?accepted.matched_patterns,
                    ?reasons,
                    "message flagged for monitoring"
                );
            }
            ScreeningDecision::Reject(reason) => {
                let label = match reason {
                    RejectReason::Score => "score",
                    RejectReason::EncodingAttack => "encoding",
                };
                metrics::counter!("screening_rejections_total", "reason" => label).increment(1);
                warn!(
                    client_id = %identity,
                    %conversation_id,
                    score = accepted.score,
                    patterns = ?accepted.matched_patterns,
                    reason = label,
                    category = "security",
                    "message rejected by screening"
                );
                return Err(GatewayError::SecurityRejection {
                    score: accepted.score,
                    patterns: accepted.matched_patterns,
                    encoding_attack: reason == RejectReason::EncodingAttack,
                });
            }
        }

        let state = self
            .store
            .get_state(&conversation_id)
            .await
            .map_err(|e| upstream(identity, e.into()))?;
        let context = build_context(state.summary(), &state.turns, &accepted.sanitized);

        let tokens = self
            .completion
            .complete(&context, &self.config.completion)
            .await
            .map_err(|e| upstream(identity, e.into()))?;

        Ok(self.orchestrator.relay(
            tokens,
            RelayContext {
                client_id: identity.clone(),
                conversation_id,
                user_message: accepted.sanitized,
                received_at,
                prior_turns: state.turns,
            },
        ))
    }

    async fn admit(&self, identity: &ClientIdentity) -> Result<(), GatewayError> {
        match self.admission.check(identity).await {
            Ok(decision) if decision.allowed => Ok(()),
            Ok(decision) => {
                warn!(
                    window = ?decision.exceeded.map(|w| w.as_str()),
                    category = "rate_limit",
                    "rate limit exceeded"
                );
                Err(GatewayError::RateLimitExceeded {
                    window: decision.exceeded.map(|w| w.to_string()),
                    retry_after: decision.retry_after.unwrap_or(Duration::from_secs(1)),
                })
            }
            Err(e) => {
                error!(error = %e, category = "rate_limit", "rate store unavailable, failing closed");
                Err(GatewayError::fail_closed(FAIL_CLOSED_RETRY))
            }
        }
    }

    /// State of a conversation, by raw id.
    pub async fn conversation(&self, raw_id: &str) -> Result<ConversationState, GatewayError> {
        let id = parse_id(raw_id)?;
        Ok(self.store.get_state(&id).await?)
    }

    /// Forget a conversation, by raw id.
    pub async fn clear(&self, raw_id: &str) -> Result<(), GatewayError> {
        let id = parse_id(raw_id)?;
        self.store.clear(&id).await?;
        info!(conversation_id = %id, "conversation cleared");
        Ok(())
    }

    /// Caller's current admission usage.
    pub async fn stats(&self, identity: &ClientIdentity) -> Result<RateStats, GatewayError> {
        self.admission
            .stats(identity)
            .await
            .map_err(|e| GatewayError::Upstream(e.to_string()))
    }
}

fn parse_id(raw: &str) -> Result<ConversationId, GatewayError> {
    Ok(validate_conversation_id(&Value::String(raw.to_owned()))?)
}

fn reject(identity: &ClientIdentity, err: GatewayError) -> GatewayError {
    warn!(client_id = %identity, category = %err.category(), error = %err, "request rejected");
    err
}

fn upstream(identity: &ClientIdentity, err: GatewayError) -> GatewayError {
    error!(client_id = %identity, category = %err.category(), error = %err, "upstream failure");
    err
}
