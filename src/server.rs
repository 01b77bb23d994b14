use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing::{get, post}};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};

use crate::agent::{AgentCatalog, AgentConfiguration, ConversationService, ConverseError};
use crate::session::AgentMessage;
use crate::storage::{AuditLogEntry, AuditSummary};

/// Entries shown in the dashboard's recent-activity panel.
pub const DASHBOARD_RECENT: usize = 6;
const DEFAULT_SESSION: &str = "main-session";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ConversationService>,
    pub catalog: Arc<AgentCatalog>,
    pub metrics: Option<PrometheusHandle>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

fn error(status: StatusCode, msg: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (status, Json(ErrorBody { error: msg.into() }))
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorBody>)>;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn list_agents(State(state): State<AppState>) -> Json<Vec<AgentConfiguration>> {
    Json(state.catalog.list().to_vec())
}

async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<AgentConfiguration> {
    state
        .catalog
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, format!("unknown agent: {}", id)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseBody {
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
    #[serde(default)]
    pub history: Vec<AgentMessage>,
    pub input: String,
}

async fn converse(
    State(state): State<AppState>,
    Json(body): Json<ConverseBody>,
) -> ApiResult<AgentMessage> {
    if body.input.trim().is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "input must not be empty"));
    }
    let agent = match body.agent_id.as_deref() {
        Some(id) => state.catalog.get(id),
        None => state.catalog.default_agent(),
    }
    .ok_or_else(|| error(StatusCode::NOT_FOUND, format!("unknown agent: {}", body.agent_id.as_deref().unwrap_or("<default>"))))?;

    let session_id = body.session_id.as_deref().unwrap_or(DEFAULT_SESSION);
    state
        .service
        .converse(session_id, &agent.agent_id, &body.history, &body.input, &agent.persona)
        .await
        .map(Json)
        .map_err(|e| match e {
            ConverseError::RemoteCall(inner) => {
                tracing::error!("converse failed for agent {}: {}", agent.agent_id, inner);
                error(StatusCode::BAD_GATEWAY, inner.to_string())
            }
        })
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

async fn list_audit(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Json<Vec<AuditLogEntry>> {
    let audit = state.service.audit();
    let entries = match query.limit {
        Some(n) => audit.recent(n),
        None => audit.list(),
    };
    Json(entries)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DashboardResponse {
    pub summary: AuditSummary,
    pub recent: Vec<AuditLogEntry>,
}

async fn dashboard(State(state): State<AppState>) -> Json<DashboardResponse> {
    let audit = state.service.audit();
    Json(DashboardResponse { summary: audit.summary(), recent: audit.recent(DASHBOARD_RECENT) })
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .route("/v1/agents", get(list_agents))
        .route("/v1/agents/:id", get(get_agent))
        .route("/v1/converse", post(converse))
        .route("/v1/audit", get(list_audit))
        .route("/v1/dashboard", get(dashboard))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("oracle gateway listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ConversationSettings;
    use crate::models::{LanguageModel, ModelRequest, ModelResponse};
    use crate::storage::{AuditLog, Outcome};
    use async_trait::async_trait;
    use serde_json::{Value, json};

    struct EchoModel;

    #[async_trait]
    impl LanguageModel for EchoModel {
        async fn generate(&self, req: ModelRequest) -> anyhow::Result<ModelResponse> {
            let last = req.turns.last().map(|t| t.text.clone()).unwrap_or_default();
            if last.contains("fail") {
                anyhow::bail!("model call failed: 503 Service Unavailable");
            }
            Ok(ModelResponse { text: format!("echo {} turns", req.turns.len()), model: req.model })
        }
    }

    async fn spawn_app() -> (String, Arc<AuditLog>) {
        let audit = Arc::new(AuditLog::new());
        let service = ConversationService::new(Arc::new(EchoModel), audit.clone(), ConversationSettings::default());
        let state = AppState {
            service: Arc::new(service),
            catalog: Arc::new(AgentCatalog::with_default_agents()),
            metrics: None,
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        (format!("http://{}", addr), audit)
    }

    #[tokio::test]
    async fn health_and_agents() {
        let (base, _) = spawn_app().await;
        let client = reqwest::Client::new();
        let v: Value = client.get(format!("{}/health", base)).send().await.unwrap().json().await.unwrap();
        assert_eq!(v["status"], "ok");

        let agents: Value = client.get(format!("{}/v1/agents", base)).send().await.unwrap().json().await.unwrap();
        assert_eq!(agents.as_array().unwrap().len(), 3);
        assert_eq!(agents[0]["agentId"], "oracle-prime");

        let one = client.get(format!("{}/v1/agents/creative-spark", base)).send().await.unwrap();
        assert_eq!(one.status(), 200);
        let missing = client.get(format!("{}/v1/agents/ghost", base)).send().await.unwrap();
        assert_eq!(missing.status(), 404);

        let metrics = client.get(format!("{}/metrics", base)).send().await.unwrap();
        assert_eq!(metrics.status(), 404);
    }

    #[tokio::test]
    async fn converse_returns_assistant_message() {
        let (base, audit) = spawn_app().await;
        let client = reqwest::Client::new();
        let body = json!({
            "agentId": "data-miner",
            "history": [{
                "id": "user-1712345678901",
                "role": "user",
                "content": [{"type": "text", "value": "earlier"}],
                "timestamp": chrono::Utc::now()
            }],
            "input": "numbers please"
        });
        let resp = client.post(format!("{}/v1/converse", base)).json(&body).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        let msg: AgentMessage = resp.json().await.unwrap();
        assert_eq!(msg.flatten_text(), "echo 2 turns");
        assert_eq!(msg.agent_id.as_deref(), Some("data-miner"));
        assert!(msg.metrics.is_some());
        assert_ne!(msg.id, "user-1712345678901");

        let logs = audit.list();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].target, "Agent:data-miner");
    }

    #[tokio::test]
    async fn converse_rejects_blank_input_and_unknown_agent() {
        let (base, audit) = spawn_app().await;
        let client = reqwest::Client::new();
        let blank = client.post(format!("{}/v1/converse", base)).json(&json!({"input": "   "})).send().await.unwrap();
        assert_eq!(blank.status(), 400);
        let unknown = client
            .post(format!("{}/v1/converse", base))
            .json(&json!({"agentId": "ghost", "input": "hi"}))
            .send()
            .await
            .unwrap();
        assert_eq!(unknown.status(), 404);
        assert!(audit.is_empty());
    }

    #[tokio::test]
    async fn remote_failure_maps_to_bad_gateway() {
        let (base, audit) = spawn_app().await;
        let client = reqwest::Client::new();
        let resp = client.post(format!("{}/v1/converse", base)).json(&json!({"input": "please fail"})).send().await.unwrap();
        assert_eq!(resp.status(), 502);
        let err: ErrorBody = resp.json().await.unwrap();
        assert!(err.error.contains("503"));

        let logs = audit.list();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].outcome, Outcome::Failure);
        assert_eq!(logs[0].action, "api_call");
        assert_eq!(logs[1].target, "Agent:oracle-prime");
    }

    #[tokio::test]
    async fn audit_and_dashboard_views() {
        let (base, _) = spawn_app().await;
        let client = reqwest::Client::new();
        for i in 0..4 {
            let input = if i == 3 { "fail now".to_string() } else { format!("msg {}", i) };
            client.post(format!("{}/v1/converse", base)).json(&json!({"input": input})).send().await.unwrap();
        }
        let all: Vec<AuditLogEntry> = client.get(format!("{}/v1/audit", base)).send().await.unwrap().json().await.unwrap();
        assert_eq!(all.len(), 8);
        let two: Vec<AuditLogEntry> = client.get(format!("{}/v1/audit?limit=2", base)).send().await.unwrap().json().await.unwrap();
        assert_eq!(two.len(), 2);
        assert_eq!(two[0].log_id, all[0].log_id);

        let dash: DashboardResponse = client.get(format!("{}/v1/dashboard", base)).send().await.unwrap().json().await.unwrap();
        assert_eq!(dash.summary.total, 8);
        assert_eq!(dash.summary.failures, 1);
        assert_eq!(dash.recent.len(), DASHBOARD_RECENT);
    }
}
