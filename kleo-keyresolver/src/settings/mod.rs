//! Configuration consumed by the resolver.
mod expiry;
pub use expiry::*;
mod keyserver;
pub use keyserver::*;

use kleo_keycache::{Protocol, Validity};
use serde::{Deserialize, Serialize};

use crate::errors::SettingsError;

/// Resolution policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResolverSettings {
    /// The protocol that wins if both resolve everything.
    #[serde(default)]
    pub preferred_protocol: Protocol,
    #[serde(default = "default_minimum_validity")]
    pub minimum_validity: Validity,
    #[serde(default)]
    pub allow_mixed_protocols: bool,
    #[serde(default)]
    pub expiry: ExpiryCheckerSettings,
    #[serde(default)]
    pub keyserver: Option<KeyserverConfig>,
}

fn default_minimum_validity() -> Validity {
    Validity::Marginal
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            preferred_protocol: Protocol::Unknown,
            minimum_validity: default_minimum_validity(),
            allow_mixed_protocols: false,
            expiry: ExpiryCheckerSettings::default(),
            keyserver: None,
        }
    }
}

impl ResolverSettings {
    /// Parses a JSON settings document.
    ///
    /// Missing entries take their defaults. A configured keyserver is validated.
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: ResolverSettings = serde_json::from_str(json)?;
        if let Some(keyserver) = &settings.keyserver {
            keyserver.validate()?;
        }
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
