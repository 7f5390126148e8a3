//! External collaborators consulted before a session is opened:
//! credential resolution and the model catalog.

use async_trait::async_trait;

use crate::config::{CredentialConfig, ModelCatalogConfig};

/// Value of `GOOGLE_KEY` meaning "each user supplies their own key".
/// Per-user keys are stored elsewhere, so the relay treats it as absent.
const USER_PROVIDED: &str = "user_provided";

/// Credential material for the upstream service.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Developer API key, sent as the `key` query parameter.
    ApiKey(String),
    /// OAuth access token minted from a service account, sent as a bearer token.
    AccessToken(String),
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::ApiKey(_) => f.write_str("ApiKey(..)"),
            Credential::AccessToken(_) => f.write_str("AccessToken(..)"),
        }
    }
}

/// Supplies credential material, or explains why none is available.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self) -> Result<Credential, String>;
}

/// Supplies the default model and the list of models on offer.
pub trait ModelCatalog: Send + Sync {
    fn default_model(&self) -> Result<String, String>;

    fn list_models(&self) -> Vec<String>;

    fn supports(&self, model: &str) -> bool {
        self.list_models().iter().any(|m| m == model)
    }
}

/// Resolves credentials from the config file and the process environment.
pub struct ConfigCredentialResolver {
    config: CredentialConfig,
}

impl ConfigCredentialResolver {
    pub fn new(config: CredentialConfig) -> Self {
        Self { config }
    }

    fn usable(value: Option<String>) -> Option<String> {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty() && v != USER_PROVIDED)
    }
}

#[async_trait]
impl CredentialResolver for ConfigCredentialResolver {
    async fn resolve(&self) -> Result<Credential, String> {
        if let Some(key) = Self::usable(self.config.api_key.clone()) {
            return Ok(Credential::ApiKey(key));
        }
        if let Some(key) = Self::usable(std::env::var(&self.config.api_key_env).ok()) {
            return Ok(Credential::ApiKey(key));
        }
        if let Some(token) = Self::usable(std::env::var(&self.config.access_token_env).ok()) {
            return Ok(Credential::AccessToken(token));
        }
        Err(format!(
            "no API key configured and neither {} nor {} is set",
            self.config.api_key_env, self.config.access_token_env
        ))
    }
}

/// Catalog backed by the `models` config section.
pub struct StaticModelCatalog {
    config: ModelCatalogConfig,
}

impl StaticModelCatalog {
    pub fn new(config: ModelCatalogConfig) -> Self {
        Self { config }
    }
}

impl ModelCatalog for StaticModelCatalog {
    fn default_model(&self) -> Result<String, String> {
        let model = self.config.default_model.trim();
        if model.is_empty() {
            return Err("no default model configured".to_string());
        }
        Ok(model.to_string())
    }

    fn list_models(&self) -> Vec<String> {
        let mut models = self.config.available.clone();
        if !models.contains(&self.config.default_model) && !self.config.default_model.is_empty() {
            models.insert(0, self.config.default_model.clone());
        }
        models
    }
}
