use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")] Config(String),

    #[error("Tool '{name}' not found in registry. Available tools: {}", .available.join(", "))] UnknownTool {
        name: String,
        available: Vec<String>,
    },

    #[error("Unknown provider: {name}. Available providers: {}", .available.join(", "))] UnknownProvider {
        name: String,
        available: Vec<String>,
    },

    #[error(
        "Missing dependency for {provider} provider: requires the '{feature}' capability. {enable_hint}"
    )] MissingDependency {
        provider: String,
        feature: String,
        enable_hint: String,
    },

    #[error("Connection pool error: {0}")] Pool(String),

    #[error("Persistence error: {0}")] Persistence(String),

    #[error("Serialization error: {0}")] Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")] Io(#[from] std::io::Error),
}

pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tool_lists_available() {
        let err = AgentError::UnknownTool {
            name: "grep".to_string(),
            available: vec!["bash".to_string(), "edit".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'grep'"));
        assert!(msg.contains("bash, edit"));
    }

    #[test]
    fn test_missing_dependency_carries_hint() {
        let err = AgentError::MissingDependency {
            provider: "google".to_string(),
            feature: "google".to_string(),
            enable_hint: "Enable the 'google' capability in the deployment config".to_string(),
        };
        assert!(err.to_string().contains("Enable the 'google' capability"));
    }
}
