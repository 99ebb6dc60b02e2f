//! Static provider table with availability gating.
//!
//! Optional provider support is expressed as a fixed table of variants, each
//! carrying a capability gate checked through an injectable probe, instead of
//! discovering implementations at runtime by name. An unavailable provider
//! fails only its own path with actionable remediation.

use crate::core::{AgentError, AgentResult};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Google,
    Ollama,
    Azure,
    OpenRouter,
    Doubao,
}

impl Provider {
    pub const ALL: &'static [Provider] = &[
        Provider::OpenAi,
        Provider::Anthropic,
        Provider::Google,
        Provider::Ollama,
        Provider::Azure,
        Provider::OpenRouter,
        Provider::Doubao,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
            Provider::Ollama => "ollama",
            Provider::Azure => "azure",
            Provider::OpenRouter => "openrouter",
            Provider::Doubao => "doubao",
        }
    }

    /// Capability gate controlling this provider.
    ///
    /// Azure, OpenRouter and Doubao ride on the OpenAI-compatible transport,
    /// so they share its gate.
    pub fn feature(&self) -> &'static str {
        match self {
            Provider::OpenAi | Provider::Azure | Provider::OpenRouter | Provider::Doubao => {
                "openai"
            }
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
            Provider::Ollama => "ollama",
        }
    }

    /// Remediation text attached to `MissingDependency`
    pub fn enable_hint(&self) -> &'static str {
        match self.feature() {
            "openai" => "Enable the 'openai' capability in the deployment configuration",
            "anthropic" => "Enable the 'anthropic' capability in the deployment configuration",
            "google" => "Enable the 'google' capability in the deployment configuration",
            _ => "Enable the 'ollama' capability in the deployment configuration",
        }
    }

    /// Resolve a provider by name, listing known names on mismatch
    pub fn from_name(name: &str) -> AgentResult<Provider> {
        Provider::ALL
            .iter()
            .copied()
            .find(|p| p.name() == name)
            .ok_or_else(|| AgentError::UnknownProvider {
                name: name.to_string(),
                available: Provider::ALL.iter().map(|p| p.name().to_string()).collect(),
            })
    }

    /// Fail with `MissingDependency` when the provider's gate is off
    pub fn ensure_available(&self, probe: &dyn AvailabilityProbe) -> AgentResult<()> {
        if probe.is_enabled(self.feature()) {
            Ok(())
        } else {
            Err(AgentError::MissingDependency {
                provider: self.name().to_string(),
                feature: self.feature().to_string(),
                enable_hint: self.enable_hint().to_string(),
            })
        }
    }
}

/// Answers whether a provider capability is enabled in this deployment
pub trait AvailabilityProbe: Send + Sync {
    fn is_enabled(&self, feature: &str) -> bool;
}

/// Probe backed by a fixed set of enabled capabilities
pub struct StaticProbe {
    enabled: HashSet<String>,
}

impl StaticProbe {
    /// All capabilities enabled
    pub fn all() -> Self {
        Self {
            enabled: Provider::ALL
                .iter()
                .map(|p| p.feature().to_string())
                .collect(),
        }
    }

    /// Only the given capabilities enabled
    pub fn with(features: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            enabled: features.into_iter().map(Into::into).collect(),
        }
    }
}

impl AvailabilityProbe for StaticProbe {
    fn is_enabled(&self, feature: &str) -> bool {
        self.enabled.contains(feature)
    }
}

static DEFAULT_PROBE: Lazy<StaticProbe> = Lazy::new(StaticProbe::all);

/// Process default probe: every built-in capability enabled
pub fn default_probe() -> &'static StaticProbe {
    &DEFAULT_PROBE
}

/// Providers whose capability gate is on
pub fn available_providers(probe: &dyn AvailabilityProbe) -> Vec<Provider> {
    Provider::ALL
        .iter()
        .copied()
        .filter(|p| probe.is_enabled(p.feature()))
        .collect()
}

/// Providers whose capability gate is off, with their enable hints
pub fn missing_providers(probe: &dyn AvailabilityProbe) -> HashMap<String, String> {
    Provider::ALL
        .iter()
        .filter(|p| !probe.is_enabled(p.feature()))
        .map(|p| (p.name().to_string(), p.enable_hint().to_string()))
        .collect()
}

/// Summary of provider availability for diagnostics
#[derive(Debug, Clone)]
pub struct DependencyReport {
    pub available_providers: Vec<String>,
    pub missing_providers: Vec<String>,
    pub enable_hints: HashMap<String, String>,
    pub total_providers: usize,
}

pub fn dependency_report(probe: &dyn AvailabilityProbe) -> DependencyReport {
    let available: Vec<String> = available_providers(probe)
        .iter()
        .map(|p| p.name().to_string())
        .collect();
    let hints = missing_providers(probe);
    let mut missing: Vec<String> = hints.keys().cloned().collect();
    missing.sort();

    DependencyReport {
        available_providers: available,
        missing_providers: missing,
        enable_hints: hints,
        total_providers: Provider::ALL.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_known_and_unknown() {
        assert_eq!(Provider::from_name("anthropic").unwrap(), Provider::Anthropic);

        let err = Provider::from_name("bedrock").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("bedrock"));
        assert!(msg.contains("openai"));
        assert!(msg.contains("doubao"));
    }

    #[test]
    fn test_ensure_available_with_default_probe() {
        for provider in Provider::ALL {
            provider.ensure_available(default_probe()).unwrap();
        }
    }

    #[test]
    fn test_missing_dependency_fails_only_that_provider() {
        let probe = StaticProbe::with(["openai", "anthropic"]);

        Provider::OpenAi.ensure_available(&probe).unwrap();
        Provider::Azure.ensure_available(&probe).unwrap(); // shares the openai gate
        let err = Provider::Google.ensure_available(&probe).unwrap_err();
        assert!(matches!(err, AgentError::MissingDependency { .. }));
        assert!(err.to_string().contains("'google' capability"));
    }

    #[test]
    fn test_dependency_report_counts() {
        let probe = StaticProbe::with(["anthropic"]);
        let report = dependency_report(&probe);

        assert_eq!(report.available_providers, vec!["anthropic"]);
        assert_eq!(report.missing_providers.len(), 6);
        assert!(report.missing_providers.contains(&"google".to_string()));
        assert_eq!(report.total_providers, 7);
        assert!(report.enable_hints.contains_key("openai"));
    }
}
