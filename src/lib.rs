//! Conversation gateway for a hosted generative model, with a bounded
//! in-memory audit trail.

pub mod agent;
pub mod models;
pub mod server;
pub mod session;
pub mod settings;
pub mod storage;
pub mod telemetry;

pub use agent::{AgentCatalog, AgentConfiguration, ConversationService, ConversationSettings, ConverseError};
pub use session::AgentMessage;
pub use storage::{AuditLog, AuditLogEntry, AuditRecord, Outcome};
