use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
    Code,
    Programmatic,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: Modality,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ContentPart {
    pub fn text(value: impl Into<String>) -> Self {
        Self { kind: Modality::Text, value: Value::String(value.into()), mime_type: None, description: None }
    }

    /// Plain-text rendering of the part. Strings pass through, anything else
    /// is serialized as JSON.
    pub fn as_text(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LatencyMetrics {
    pub total_ms: u64,
    pub api_call_ms: u64,
    pub processing_ms: u64,
}

impl LatencyMetrics {
    /// Splits a measured total into a fixed 80% API / 20% processing estimate.
    pub fn estimate(total_ms: u64) -> Self {
        let api_call_ms = total_ms * 80 / 100;
        Self { total_ms, api_call_ms, processing_ms: total_ms - api_call_ms }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetrics {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub compute_units: u32,
}

pub const ESTIMATED_COST_USD: f64 = 0.0001;

impl UsageMetrics {
    /// Rough token estimate: one token per four characters.
    pub fn estimate(input: &str, output: &str) -> Self {
        Self {
            input_tokens: estimate_tokens(input),
            output_tokens: estimate_tokens(output),
            cost_usd: ESTIMATED_COST_USD,
            compute_units: 1,
        }
    }
}

pub fn estimate_tokens(text: &str) -> u64 {
    text.chars().count() as u64 / 4
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct MessageMetrics {
    pub latency: LatencyMetrics,
    pub usage: UsageMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentMessage {
    /// Opaque and caller-chosen for history; a v4 UUID for messages minted here.
    pub id: String,
    pub role: Role,
    pub content: Vec<ContentPart>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MessageMetrics>,
}

impl AgentMessage {
    pub fn new(role: Role, content: Vec<ContentPart>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            timestamp: Utc::now(),
            agent_id: None,
            model_used: None,
            metrics: None,
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentPart::text(text)])
    }

    /// All parts flattened into one string, in order.
    pub fn flatten_text(&self) -> String {
        self.content.iter().map(ContentPart::as_text).collect::<Vec<_>>().join("\n")
    }
}
