use kleo_keycache::errors::MailboxError;
use kleo_keycache::Protocol;

/// Caller-bug diagnostics recorded by the resolver.
///
/// These do not abort a resolution run; they are collected and reported
/// alongside the result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("Failed to parse sender: {0}")]
    InvalidSender(String),
    #[error("Failed to parse recipient: {0}")]
    InvalidRecipient(String),
    #[error("Failed to parse override address: {0}")]
    InvalidOverrideAddress(String),
    #[error("Override key {identifier} for {address} is not a {protocol} key")]
    OverrideProtocolMismatch {
        address: String,
        identifier: String,
        protocol: Protocol,
    },
}

impl InputError {
    pub(crate) fn sender(address: &str, err: &MailboxError) -> Self {
        Self::InvalidSender(format!("{address} ({err})"))
    }

    pub(crate) fn recipient(address: &str, err: &MailboxError) -> Self {
        Self::InvalidRecipient(format!("{address} ({err})"))
    }

    pub(crate) fn override_address(address: &str, err: &MailboxError) -> Self {
        Self::InvalidOverrideAddress(format!("{address} ({err})"))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Keyserver host must not be empty")]
    EmptyHost,
    #[error("Password authentication requires a user name")]
    MissingUser,
    #[error("Invalid keyserver port: {0}")]
    InvalidPort(u16),
}
