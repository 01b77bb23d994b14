use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfiguration {
    pub agent_id: String,
    pub name: String,
    pub description: String,
    pub persona: String,
    pub icon: String,
}

impl AgentConfiguration {
    pub fn new(agent_id: &str, name: &str, description: &str, persona: &str, icon: &str) -> Self {
        Self {
            agent_id: agent_id.into(),
            name: name.into(),
            description: description.into(),
            persona: persona.into(),
            icon: icon.into(),
        }
    }
}

/// Read-only persona catalog, kept in registration order.
#[derive(Debug, Clone, Default)]
pub struct AgentCatalog {
    agents: Vec<AgentConfiguration>,
}

impl AgentCatalog {
    pub fn new() -> Self { Self { agents: Vec::new() } }

    pub fn with_default_agents() -> Self {
        let mut c = Self::new();
        c.register(AgentConfiguration::new(
            "oracle-prime",
            "Oracle Prime",
            "The core intelligence of the Universe OS.",
            "You are the supreme intelligence. Knowledgeable, wise, and authoritative. You speak with clarity and depth.",
            "fa-eye",
        ));
        c.register(AgentConfiguration::new(
            "data-miner",
            "Quant Analyzer",
            "Specializes in numerical data and patterns.",
            "You are a cold, efficient data analyst. You prioritize facts, figures, and logical structures over narrative.",
            "fa-microchip",
        ));
        c.register(AgentConfiguration::new(
            "creative-spark",
            "Lumina",
            "The creative and visionary module.",
            "You are an inspiring creative partner. You think outside the box and use poetic, imaginative language.",
            "fa-wand-magic-sparkles",
        ));
        c
    }

    /// Registers an agent, replacing any existing entry with the same id in place.
    pub fn register(&mut self, agent: AgentConfiguration) {
        match self.agents.iter_mut().find(|a| a.agent_id == agent.agent_id) {
            Some(existing) => *existing = agent,
            None => self.agents.push(agent),
        }
    }

    pub fn get(&self, agent_id: &str) -> Option<&AgentConfiguration> {
        self.agents.iter().find(|a| a.agent_id == agent_id)
    }

    pub fn list(&self) -> &[AgentConfiguration] { &self.agents }

    pub fn default_agent(&self) -> Option<&AgentConfiguration> { self.agents.first() }
}
