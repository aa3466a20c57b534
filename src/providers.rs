//! Registry of third-party identity providers.
//!
//! Built once at startup from a JSON file and injected into the token
//! controller. Provider protocol handling lives elsewhere; a completed
//! federated login ends in `TokenController::create_exchange` and the one-shot
//! `exchange` endpoint.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Configuration of a single identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Registry key, e.g. `"github"`
    pub name: String,
    /// Human-readable label shown on login pages
    #[serde(default)]
    pub display_name: Option<String>,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Public view of a provider. Never carries secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderSummary {
    pub name: String,
    pub display_name: String,
}

#[derive(Debug)]
pub enum ProviderError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    EmptyName,
    Duplicate(String),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::Io(e) => write!(f, "failed to read providers file: {}", e),
            ProviderError::Parse(e) => write!(f, "invalid providers file: {}", e),
            ProviderError::EmptyName => write!(f, "provider name cannot be empty"),
            ProviderError::Duplicate(name) => write!(f, "duplicate provider: {}", name),
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProviderError::Io(e) => Some(e),
            ProviderError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

/// Identity providers keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, ProviderConfig>,
}

impl ProviderRegistry {
    pub fn new(configs: Vec<ProviderConfig>) -> Result<Self, ProviderError> {
        let mut providers = BTreeMap::new();
        for config in configs {
            if config.name.trim().is_empty() {
                return Err(ProviderError::EmptyName);
            }
            if providers.contains_key(&config.name) {
                return Err(ProviderError::Duplicate(config.name));
            }
            providers.insert(config.name.clone(), config);
        }
        Ok(Self { providers })
    }

    /// Load a JSON array of provider configurations.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ProviderError> {
        let content = std::fs::read_to_string(path).map_err(ProviderError::Io)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, ProviderError> {
        let configs: Vec<ProviderConfig> =
            serde_json::from_str(json).map_err(ProviderError::Parse)?;
        Self::new(configs)
    }

    /// Public views of every provider, sorted by name.
    pub fn summaries(&self) -> Vec<ProviderSummary> {
        self.providers
            .values()
            .map(|p| ProviderSummary {
                name: p.name.clone(),
                display_name: p.display_name.clone().unwrap_or_else(|| p.name.clone()),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROVIDERS: &str = r#"[
        {
            "name": "github",
            "display_name": "GitHub",
            "client_id": "gh-id",
            "client_secret": "gh-secret",
            "authorize_url": "https://github.com/login/oauth/authorize",
            "token_url": "https://github.com/login/oauth/access_token",
            "scopes": ["read:user"]
        },
        {
            "name": "gitlab",
            "client_id": "gl-id",
            "authorize_url": "https://gitlab.com/oauth/authorize",
            "token_url": "https://gitlab.com/oauth/token"
        }
    ]"#;

    #[test]
    fn test_load_sorted_by_name() {
        let registry = ProviderRegistry::from_json(PROVIDERS).unwrap();

        assert_eq!(registry.len(), 2);
        let names: Vec<String> = registry.summaries().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["github", "gitlab"]);
    }

    #[test]
    fn test_summaries_hide_secrets() {
        let registry = ProviderRegistry::from_json(PROVIDERS).unwrap();
        let json = serde_json::to_string(&registry.summaries()).unwrap();

        assert!(!json.contains("gh-secret"));
        assert!(json.contains("GitHub"));
        // Falls back to the name without a display name
        assert!(json.contains(r#""display_name":"gitlab""#));
    }

    #[test]
    fn test_rejects_duplicates_and_empty_names() {
        let dup = r#"[
            {"name": "a", "client_id": "1", "authorize_url": "u", "token_url": "t"},
            {"name": "a", "client_id": "2", "authorize_url": "u", "token_url": "t"}
        ]"#;
        assert!(matches!(
            ProviderRegistry::from_json(dup),
            Err(ProviderError::Duplicate(name)) if name == "a"
        ));

        let empty = r#"[{"name": " ", "client_id": "1", "authorize_url": "u", "token_url": "t"}]"#;
        assert!(matches!(
            ProviderRegistry::from_json(empty),
            Err(ProviderError::EmptyName)
        ));

        assert!(matches!(
            ProviderRegistry::from_json("{"),
            Err(ProviderError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ProviderRegistry::from_file("/nonexistent/providers.json"),
            Err(ProviderError::Io(_))
        ));
    }
}
