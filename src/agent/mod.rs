pub mod catalog;
pub mod engine;

pub use catalog::{AgentCatalog, AgentConfiguration};
pub use engine::{ConversationService, ConversationSettings, ConverseError};
