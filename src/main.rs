use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use oracle_gateway::models::{GeminiClient, api_key_from_env};
use oracle_gateway::server::{self, AppState};
use oracle_gateway::settings::{EffectiveSettings, GatewaySettings, ModelParams, resolve_effective_settings};
use oracle_gateway::{AgentCatalog, AgentMessage, AuditLog, AuditLogEntry, ConversationService, ConversationSettings, telemetry};

#[derive(Debug, Parser)]
#[command(name = "oracle_gateway")]
#[command(about = "Audited conversation gateway for hosted generative models", long_about = None)]
struct Cli {
    /// JSON config file (lowest-precedence layer above built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Model identifier override
    #[arg(long, global = true)]
    model: Option<String>,
    #[arg(long, global = true)]
    temperature: Option<f32>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Start {
        #[arg(long, default_value = "127.0.0.1:7171")]
        listen: String,
    },
    /// Send one message and print the reply with its audit trail
    Ask {
        #[arg(long, default_value = "oracle-prime")]
        agent: String,
        text: String,
    },
    /// List the built-in agent personas
    Agents,
}

impl Cli {
    fn settings(&self) -> anyhow::Result<EffectiveSettings> {
        let file = match &self.config {
            Some(path) => GatewaySettings::from_file(path)?,
            None => GatewaySettings::default(),
        };
        let env = GatewaySettings::from_env()?;
        let cli = GatewaySettings {
            model: self.model.clone(),
            model_params: self.temperature.map(|t| ModelParams { temperature: Some(t), ..Default::default() }),
            ..Default::default()
        };
        Ok(resolve_effective_settings(&file, &env, &cli))
    }
}

fn build_service(settings: &EffectiveSettings) -> ConversationService {
    let client = GeminiClient::new(settings.api_base_url.clone(), api_key_from_env());
    if client.api_key.is_none() {
        tracing::warn!("GEMINI_API_KEY not set; remote calls will likely be rejected");
    }
    let audit = Arc::new(AuditLog::with_capacity(settings.audit_capacity));
    ConversationService::new(Arc::new(client), audit, ConversationSettings::from(settings))
}

/// Stdout lines for `ask`: the reply when there is one, then the audit trail.
fn ask_report(agent_name: &str, reply: Option<&AgentMessage>, audit: &[AuditLogEntry]) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(reply) = reply {
        lines.push(format!("{}: {}", agent_name, reply.flatten_text()));
        if let Some(m) = reply.metrics {
            lines.push(format!("latency {}ms (api {}ms) | ~{} in / ~{} out tokens", m.latency.total_ms, m.latency.api_call_ms, m.usage.input_tokens, m.usage.output_tokens));
        }
    }
    lines.push("--- audit ---".to_string());
    for entry in audit {
        lines.push(format!("{} {:<8} {:<18} {:<22} {:<8} {}", entry.timestamp.format("%H:%M:%S"), entry.actor, entry.action, entry.target, entry.outcome.as_str(), entry.details));
    }
    lines
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let catalog = AgentCatalog::with_default_agents();
    match &cli.command {
        Commands::Start { listen } => {
            let addr: SocketAddr = listen.parse()?;
            let settings = cli.settings()?;
            tracing::info!(model = %settings.model, audit_capacity = settings.audit_capacity, "starting gateway");
            let metrics = match telemetry::install_prometheus() {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::warn!("metrics exporter disabled: {}", e);
                    None
                }
            };
            let state = AppState {
                service: Arc::new(build_service(&settings)),
                catalog: Arc::new(catalog),
                metrics,
            };
            server::serve(addr, state).await?;
        }
        Commands::Ask { agent, text } => {
            if text.trim().is_empty() {
                anyhow::bail!("message must not be empty");
            }
            let persona = catalog
                .get(agent)
                .ok_or_else(|| anyhow::anyhow!("unknown agent: {}", agent))?;
            let service = build_service(&cli.settings()?);
            let result = service.converse("cli-session", &persona.agent_id, &[], text, &persona.persona).await;
            for line in ask_report(&persona.name, result.as_ref().ok(), &service.audit().list()) {
                println!("{}", line);
            }
            // anyhow reports the failure on exit.
            result?;
        }
        Commands::Agents => {
            for a in catalog.list() {
                println!("{:<16} {:<16} {}", a.agent_id, a.name, a.description);
            }
        }
    }
    Ok(())
}
