//! Provider factory - resolves a provider identifier to a backend instance.
//!
//! Unknown identifiers cannot exist (the id is an enum) and a missing
//! credential fails construction with `ExtractionError::Configuration`,
//! never first use.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{ExtractionError, Result};
use crate::providers::openai::OpenAiProvider;
use crate::security::SecretString;
use crate::traits::provider::Provider;

/// The closed set of configurable backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderId {
    /// gpt-4o-mini - the cheap/fast tier
    #[serde(rename = "openai-mini")]
    OpenAiMini,

    /// gpt-4o - the stronger tier
    #[serde(rename = "openai")]
    OpenAi,

    /// Any OpenAI-compatible endpoint (OpenRouter, local inference, ...)
    #[serde(rename = "compatible")]
    Compatible,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAiMini => "openai-mini",
            ProviderId::OpenAi => "openai",
            ProviderId::Compatible => "compatible",
        }
    }

    /// Environment variable holding the backend credential.
    fn credential_var(&self) -> &'static str {
        match self {
            ProviderId::OpenAiMini | ProviderId::OpenAi => "OPENAI_API_KEY",
            ProviderId::Compatible => "COMPAT_API_KEY",
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            ProviderId::OpenAiMini => "gpt-4o-mini",
            ProviderId::OpenAi => "gpt-4o",
            ProviderId::Compatible => "gpt-4o-mini",
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds providers from identifiers, failing fast on missing credentials.
#[derive(Default)]
pub struct ProviderFactory {
    /// Base URL override applied to every resolved provider
    base_url: Option<String>,
}

impl ProviderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Resolve a provider from the environment.
    ///
    /// Returns `ExtractionError::Configuration` when the credential
    /// environment variable is absent.
    pub fn resolve(&self, id: ProviderId) -> Result<Arc<dyn Provider>> {
        let key = self.credential(id)?;
        let mut provider = OpenAiProvider::new(id.as_str(), key, id.default_model());
        if let Some(url) = &self.base_url {
            provider = provider.with_base_url(url.clone());
        }
        Ok(Arc::new(provider))
    }

    /// Resolve every id, failing on the first missing credential. Used at
    /// engine construction so a misconfigured tier surfaces before any
    /// work starts.
    pub fn resolve_all(&self, ids: &[ProviderId]) -> Result<Vec<Arc<dyn Provider>>> {
        ids.iter().map(|id| self.resolve(*id)).collect()
    }

    fn credential(&self, id: ProviderId) -> Result<SecretString> {
        let var = id.credential_var();
        std::env::var(var)
            .map(SecretString::from)
            .map_err(|_| ExtractionError::Configuration(format!("{var} not set for provider {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credential_fails_construction() {
        // COMPAT_API_KEY is not set in the test environment
        std::env::remove_var("COMPAT_API_KEY");
        let factory = ProviderFactory::new();
        let Err(err) = factory.resolve(ProviderId::Compatible) else {
            panic!("resolve succeeded without COMPAT_API_KEY");
        };
        assert!(matches!(err, ExtractionError::Configuration(_)));
        assert!(err.to_string().contains("COMPAT_API_KEY"));
    }

    #[test]
    fn test_provider_id_serde_matches_display() {
        for id in [ProviderId::OpenAiMini, ProviderId::OpenAi, ProviderId::Compatible] {
            let json = serde_json::to_string(&id).unwrap();
            assert_eq!(json, format!("\"{}\"", id.as_str()));
            let back: ProviderId = serde_json::from_str(&json).unwrap();
            assert_eq!(back, id);
        }
    }
}
