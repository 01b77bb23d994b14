use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self { temperature: 0.7, top_p: 0.95, top_k: 64 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelRequest {
    pub model: String,
    pub turns: Vec<Turn>,
    pub sampling: SamplingParams,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ModelResponse {
    pub text: String,
    pub model: String,
}

/// A remote generative model. One call, one response; no retries.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, req: ModelRequest) -> anyhow::Result<ModelResponse>;
}

/// `GEMINI_API_KEY`, falling back to `API_KEY`.
pub fn api_key_from_env() -> Option<String> {
    std::env::var("GEMINI_API_KEY").or_else(|_| std::env::var("API_KEY")).ok()
}

#[derive(Clone)]
pub struct GeminiClient {
    pub base_url: String,
    pub api_key: Option<String>,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self { base_url: base_url.into(), api_key, http: reqwest::Client::new() }
    }

    pub fn from_env() -> Self {
        let base_url = std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        Self::new(base_url, api_key_from_env())
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url.trim_end_matches('/'), model)
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<WireContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct WireContent<'a> {
    role: TurnRole,
    parts: Vec<WirePart<'a>>,
}

#[derive(Debug, Serialize)]
struct WirePart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect::<String>())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, req: ModelRequest) -> anyhow::Result<ModelResponse> {
        let url = self.endpoint(&req.model);
        let body = GenerateContentRequest {
            contents: req
                .turns
                .iter()
                .map(|t| WireContent { role: t.role, parts: vec![WirePart { text: &t.text }] })
                .collect(),
            generation_config: GenerationConfig {
                temperature: req.sampling.temperature,
                top_p: req.sampling.top_p,
                top_k: req.sampling.top_k,
            },
        };
        tracing::debug!(model = %req.model, turns = req.turns.len(), "sending generateContent request");
        let mut rb = self.http.post(url).json(&body);
        if let Some(key) = &self.api_key {
            rb = rb.header("x-goog-api-key", key);
        }
        let resp = rb.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            anyhow::bail!("model call failed: {} {}", status, detail.trim());
        }
        let v: GenerateContentResponse = resp.json().await?;
        Ok(ModelResponse { text: v.text(), model: v.model_version.unwrap_or(req.model) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::{HeaderMap, StatusCode, Uri}, routing::post};
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    const MODELS_ROUTE: &str = "/v1beta/models/*rest";

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn request() -> ModelRequest {
        ModelRequest {
            model: "gemini-test".into(),
            turns: vec![
                Turn { role: TurnRole::User, text: "hi".into() },
                Turn { role: TurnRole::Model, text: "hello".into() },
                Turn { role: TurnRole::User, text: "[System Persona: calm]\nUser: how are you".into() },
            ],
            sampling: SamplingParams::default(),
        }
    }

    #[tokio::test]
    async fn sends_contents_and_generation_config() {
        let seen: Arc<Mutex<Option<(String, Value, Option<String>)>>> = Arc::default();
        let sink = seen.clone();
        let router = Router::new().route(
            MODELS_ROUTE,
            post(move |uri: Uri, headers: HeaderMap, Json(body): Json<Value>| {
                let sink = sink.clone();
                async move {
                    let key = headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()).map(String::from);
                    *sink.lock().unwrap() = Some((uri.path().to_string(), body, key));
                    Json(json!({
                        "candidates": [{"content": {"role": "model", "parts": [{"text": "I am "}, {"text": "fine"}]}}],
                        "modelVersion": "gemini-test-001"
                    }))
                }
            }),
        );
        let base = spawn(router).await;
        let client = GeminiClient::new(base, Some("secret".into()));
        let resp = client.generate(request()).await.unwrap();
        assert_eq!(resp.text, "I am fine");
        assert_eq!(resp.model, "gemini-test-001");

        let (path, body, key) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(path, "/v1beta/models/gemini-test:generateContent");
        assert_eq!(key.as_deref(), Some("secret"));
        assert_eq!(body["contents"].as_array().unwrap().len(), 3);
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][2]["parts"][0]["text"], "[System Persona: calm]\nUser: how are you");
        assert_eq!(body["generationConfig"]["topK"], 64);
        assert!((body["generationConfig"]["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert!((body["generationConfig"]["topP"].as_f64().unwrap() - 0.95).abs() < 1e-6);
    }

    #[tokio::test]
    async fn missing_candidates_yield_empty_text() {
        let router = Router::new().route(
            MODELS_ROUTE,
            post(|| async { Json(json!({"promptFeedback": {"blockReason": "SAFETY"}})) }),
        );
        let client = GeminiClient::new(spawn(router).await, None);
        let resp = client.generate(request()).await.unwrap();
        assert!(resp.text.is_empty());
        assert_eq!(resp.model, "gemini-test");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let router = Router::new().route(
            MODELS_ROUTE,
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "quota exhausted") }),
        );
        let client = GeminiClient::new(spawn(router).await, None);
        let err = client.generate(request()).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("429"), "{}", msg);
        assert!(msg.contains("quota exhausted"), "{}", msg);
    }

    #[tokio::test]
    async fn malformed_body_is_an_error() {
        let router = Router::new().route(
            MODELS_ROUTE,
            post(|| async { "not json" }),
        );
        let client = GeminiClient::new(spawn(router).await, None);
        assert!(client.generate(request()).await.is_err());
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        let client = GeminiClient::new("http://example.test/", None);
        assert_eq!(client.endpoint("m"), "http://example.test/v1beta/models/m:generateContent");
    }
}
