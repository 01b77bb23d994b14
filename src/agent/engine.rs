use std::sync::Arc;

use thiserror::Error;
use tokio::time::Instant;

use crate::models::{LanguageModel, ModelRequest, SamplingParams, Turn, TurnRole, DEFAULT_MODEL};
use crate::session::{AgentMessage, ContentPart, LatencyMetrics, MessageMetrics, Role, UsageMetrics};
use crate::settings::EffectiveSettings;
use crate::storage::{AuditLog, AuditRecord, DETAILS_MAX_CHARS, Outcome, truncate_details};
use crate::telemetry;

/// Reply text used when the model returns nothing.
pub const SILENT_REPLY: &str = "The Oracle remains silent.";
/// Audit target recorded for failed remote calls.
pub const REMOTE_SERVICE: &str = "gemini-api";

#[derive(Debug, Error)]
pub enum ConverseError {
    /// Network, API or decoding failure from the remote model.
    #[error(transparent)]
    RemoteCall(anyhow::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSettings {
    pub model: String,
    pub sampling: SamplingParams,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self { model: DEFAULT_MODEL.to_string(), sampling: SamplingParams::default() }
    }
}

impl From<&EffectiveSettings> for ConversationSettings {
    fn from(eff: &EffectiveSettings) -> Self {
        Self { model: eff.model.clone(), sampling: eff.sampling }
    }
}

/// Turns one user utterance plus caller-owned history into one assistant reply.
///
/// Stateless apart from its collaborators; concurrent calls are allowed and
/// only meet at the audit log.
pub struct ConversationService {
    model: Arc<dyn LanguageModel>,
    audit: Arc<AuditLog>,
    settings: ConversationSettings,
}

impl ConversationService {
    pub fn new(model: Arc<dyn LanguageModel>, audit: Arc<AuditLog>, settings: ConversationSettings) -> Self {
        Self { model, audit, settings }
    }

    pub fn audit(&self) -> &Arc<AuditLog> { &self.audit }

    pub fn settings(&self) -> &ConversationSettings { &self.settings }

    #[tracing::instrument(skip(self, history, user_input, persona), fields(history_len = history.len()))]
    pub async fn converse(
        &self,
        session_id: &str,
        agent_id: &str,
        history: &[AgentMessage],
        user_input: &str,
        persona: &str,
    ) -> Result<AgentMessage, ConverseError> {
        let start = Instant::now();

        self.audit.record(AuditRecord::new(
            "user",
            "send_message",
            format!("Agent:{}", agent_id),
            Outcome::Success,
            truncate_details(user_input, DETAILS_MAX_CHARS),
        ));

        let req = ModelRequest {
            model: self.settings.model.clone(),
            turns: build_turns(history, user_input, persona),
            sampling: self.settings.sampling,
        };

        let resp = match self.model.generate(req).await {
            Ok(resp) => resp,
            Err(e) => {
                let details = e.to_string();
                tracing::warn!(error = %details, "model call failed");
                self.audit.record(AuditRecord::new("system", "api_call", REMOTE_SERVICE, Outcome::Failure, details));
                telemetry::record_conversation(Outcome::Failure, start.elapsed());
                return Err(ConverseError::RemoteCall(e));
            }
        };

        let elapsed = start.elapsed();
        let text = if resp.text.is_empty() { SILENT_REPLY.to_string() } else { resp.text };
        let latency = LatencyMetrics::estimate(elapsed.as_millis() as u64);
        let usage = UsageMetrics::estimate(user_input, &text);

        let mut reply = AgentMessage::new(Role::Assistant, vec![ContentPart::text(text.clone())]);
        reply.agent_id = Some(agent_id.to_string());
        reply.model_used = Some(self.settings.model.clone());
        reply.metrics = Some(MessageMetrics { latency, usage });

        self.audit.record(AuditRecord::new(
            agent_id,
            "generate_response",
            "user",
            Outcome::Success,
            truncate_details(&text, DETAILS_MAX_CHARS),
        ));
        telemetry::record_conversation(Outcome::Success, elapsed);
        telemetry::record_estimated_tokens(usage.input_tokens, usage.output_tokens);
        tracing::info!(total_ms = latency.total_ms, output_tokens = usage.output_tokens, "reply generated");

        Ok(reply)
    }
}

/// History mapped to model turns (`assistant` becomes `model`, everything
/// else `user`), followed by the persona-wrapped user input.
pub fn build_turns(history: &[AgentMessage], user_input: &str, persona: &str) -> Vec<Turn> {
    let mut turns: Vec<Turn> = history
        .iter()
        .map(|msg| Turn {
            role: if msg.role == Role::Assistant { TurnRole::Model } else { TurnRole::User },
            text: msg.flatten_text(),
        })
        .collect();
    turns.push(Turn {
        role: TurnRole::User,
        text: format!("[System Persona: {}]\nUser: {}", persona, user_input),
    });
    turns
}
