use serde::{Deserialize, Serialize};
use serde_with::formats::CommaSeparator;
use serde_with::{serde_as, StringWithSeparator};

use crate::errors::SettingsError;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyserverAuthentication {
    #[default]
    Anonymous,
    /// Log in with the credentials of the current Windows user.
    ActiveDirectory,
    Password,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyserverConnection {
    #[default]
    Default,
    Plain,
    UseStartTls,
    TunnelThroughTls,
}

/// An LDAP keyserver used to look up missing certificates.
#[serde_as]
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeyserverConfig {
    pub host: String,
    /// `None` selects the default port of the connection type.
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub authentication: KeyserverAuthentication,
    #[serde(default)]
    pub connection: KeyserverConnection,
    #[serde(default)]
    pub ldap_base_dn: String,
    /// Extra flags passed on to the directory manager.
    #[serde_as(as = "StringWithSeparator::<CommaSeparator, String>")]
    #[serde(default)]
    pub additional_flags: Vec<String>,
}

impl KeyserverConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.host.trim().is_empty() {
            return Err(SettingsError::EmptyHost);
        }
        if self.port == Some(0) {
            return Err(SettingsError::InvalidPort(0));
        }
        if self.authentication == KeyserverAuthentication::Password && self.user.is_empty() {
            return Err(SettingsError::MissingUser);
        }
        Ok(())
    }

    /// The port to connect to.
    pub fn effective_port(&self) -> u16 {
        match (self.port, self.connection) {
            (Some(port), _) => port,
            (None, KeyserverConnection::TunnelThroughTls) => 636,
            (None, _) => 389,
        }
    }
}
