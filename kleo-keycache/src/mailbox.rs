//! Mailbox normalization.
//!
//! Every lookup keyed by an e-mail address goes through
//! [`addr_spec_from_string`], so that `Alice <Alice@Example.com>` and
//! `alice@example.com` land on the same entry.

use crate::errors::MailboxError;

/// Extracts the lower-cased addr-spec (`local@domain`) from an address.
///
/// Accepts a bare address or a name-addr of the form `Display Name <local@domain>`.
/// If several bracket pairs are present the last one is used, so quoted
/// display names that contain brackets do not confuse the parser.
///
/// The function is idempotent: normalizing a normalized address returns it unchanged.
pub fn addr_spec_from_string(address: &str) -> Result<String, MailboxError> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(MailboxError::Empty);
    }

    let candidate = match trimmed.rfind('<') {
        Some(open) => {
            let rest = &trimmed[open + 1..];
            let close = rest
                .find('>')
                .ok_or_else(|| MailboxError::UnbalancedBrackets(address.to_owned()))?;
            rest[..close].trim()
        }
        None if trimmed.contains('>') => {
            return Err(MailboxError::UnbalancedBrackets(address.to_owned()))
        }
        None => trimmed,
    };

    validate_addr_spec(address, candidate)?;
    Ok(candidate.to_lowercase())
}

/// Same as [`addr_spec_from_string`] but discards the failure reason.
pub fn normalize(address: &str) -> Option<String> {
    addr_spec_from_string(address).ok()
}

fn validate_addr_spec(original: &str, candidate: &str) -> Result<(), MailboxError> {
    if let Some(c) = candidate
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || matches!(c, '<' | '>' | ',' | ';'))
    {
        return Err(MailboxError::InvalidCharacter(original.to_owned(), c));
    }

    let mut parts = candidate.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(MailboxError::NoAddrSpec(original.to_owned()));
    };
    if local.is_empty() || domain.is_empty() {
        return Err(MailboxError::NoAddrSpec(original.to_owned()));
    }
    if domain.split('.').any(str::is_empty) {
        return Err(MailboxError::InvalidDomain(original.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoted_display_name_with_brackets() {
        let addr = addr_spec_from_string("\"Bob <the builder>\" <Bob@Example.COM>").unwrap();
        assert_eq!(addr, "bob@example.com");
    }

    #[test]
    fn test_rejects_dangling_bracket() {
        assert!(matches!(
            addr_spec_from_string("bob@example.com>"),
            Err(MailboxError::UnbalancedBrackets(_))
        ));
        assert!(matches!(
            addr_spec_from_string("Bob <bob@example.com"),
            Err(MailboxError::UnbalancedBrackets(_))
        ));
    }
}
