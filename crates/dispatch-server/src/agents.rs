//! Loads the agent registry from a TOML file, the same
//! read-if-present-else-default shape `DispatchConfig::load` uses.

use dispatch_agents::AgentRegistration;
use std::path::Path;

#[derive(Debug, serde::Deserialize)]
struct RegistryFile {
    #[serde(default)]
    agents: Vec<AgentRegistration>,
}

pub fn load_registry(path: impl AsRef<Path>) -> anyhow::Result<Vec<AgentRegistration>> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::warn!(path = %path.display(), "agent registry file not found, starting with an empty registry");
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)?;
    let file: RegistryFile = toml::from_str(&raw)?;
    Ok(file.agents)
}
