#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Address is empty")]
    Empty,
    #[error("Address has no addr-spec: {0}")]
    NoAddrSpec(String),
    #[error("Address has an unterminated angle bracket: {0}")]
    UnbalancedBrackets(String),
    #[error("Address contains an invalid character {1:?}: {0}")]
    InvalidCharacter(String, char),
    #[error("Address has an invalid domain: {0}")]
    InvalidDomain(String),
}

#[derive(Debug, thiserror::Error)]
pub enum KeyCacheError {
    #[error("Failed to list keys: {0}")]
    ListKeys(String),
    #[error("Failed to list groups: {0}")]
    ListGroups(String),
}
