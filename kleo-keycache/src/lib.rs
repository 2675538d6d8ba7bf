//! Certificate model and certificate store used by the kleo key resolver.
//!
//! The crate exposes the immutable [`Key`] and [`KeyGroup`] types, the
//! [`CertificateStore`] lookup contract the resolver is written against, and
//! [`KeyCache`], a lazily populated in-memory implementation of that contract.

pub mod compliance;
pub mod errors;
pub mod format;
mod group;
mod key;
pub mod mailbox;
mod store;

pub use group::*;
pub use key::*;
pub use store::*;

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Defines a lower-case hexadecimal identifier newtype.
///
/// Input is normalized on construction: surrounding whitespace and an
/// optional `0x` prefix are stripped and the value is lower-cased.
macro_rules! hex_string_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        #[derive(Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Default)]
        $(#[$meta])*
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl AsRef<str>) -> Self {
                Self(crate::normalize_hex_identifier(value.as_ref()))
            }

            /// Indicates if the identifier is non-empty and purely hexadecimal.
            pub fn is_valid(&self) -> bool {
                crate::is_hex_identifier(&self.0)
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<String> for $name {
            fn from(v: String) -> Self {
                Self::new(v)
            }
        }

        impl From<&str> for $name {
            fn from(v: &str) -> Self {
                Self::new(v)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        #[cfg(feature = "sql")]
        impl rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> Result<rusqlite::types::ToSqlOutput, rusqlite::Error> {
                self.0.to_sql()
            }
        }

        #[cfg(feature = "sql")]
        impl rusqlite::types::FromSql for $name {
            fn column_result(value: rusqlite::types::ValueRef<'_>) -> rusqlite::types::FromSqlResult<Self> {
                Ok(Self::new(value.as_str()?))
            }
        }
    };
}

hex_string_id!(
    /// A certificate fingerprint in lower-case hexadecimal format.
    Fingerprint
);

hex_string_id!(
    /// A 64-bit key id in lower-case hexadecimal format.
    ///
    /// The key id is the trailing 16 hex digits of the fingerprint.
    KeyId
);

impl Fingerprint {
    /// Returns the key id derived from this fingerprint.
    pub fn key_id(&self) -> KeyId {
        KeyId(trailing_chars(&self.0, KEY_ID_HEX_LEN).to_owned())
    }
}

const KEY_ID_HEX_LEN: usize = 16;

/// Returns at most the last `count` characters of `value`.
pub(crate) fn trailing_chars(value: &str, count: usize) -> &str {
    if count == 0 {
        return "";
    }
    match value.char_indices().rev().nth(count - 1) {
        Some((start, _)) => &value[start..],
        None => value,
    }
}

pub(crate) fn normalize_hex_identifier(value: &str) -> String {
    let trimmed = value.trim();
    let stripped = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    stripped.to_ascii_lowercase()
}

pub(crate) fn is_hex_identifier(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    // hex::decode requires an even number of digits; a leading zero keeps odd ids decodable.
    if value.len() % 2 == 1 {
        return hex::decode(format!("0{value}")).is_ok();
    }
    hex::decode(value).is_ok()
}

/// `UnixTimestamp` represents a point in time as seconds since the unix epoch.
#[derive(Ord, PartialOrd, PartialEq, Eq, Hash, Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct UnixTimestamp(pub u64);

impl UnixTimestamp {
    /// Creates new unix timestamp.
    pub fn new(unix_time: u64) -> Self {
        Self(unix_time)
    }
    /// Creates unix timestamp with the zero value.
    ///
    /// A zero value means "not set", e.g. a key without expiration.
    pub fn zero() -> Self {
        Self(0)
    }
    /// Indicates if the timestamp is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
    /// Returns the raw number of seconds.
    pub fn value(&self) -> u64 {
        self.0
    }
    /// Returns the current local time.
    pub fn now() -> Self {
        std::time::SystemTime::now()
            .duration_since(std::time::SystemTime::UNIX_EPOCH)
            .map_or(UnixTimestamp::default(), |duration| {
                UnixTimestamp::new(duration.as_secs())
            })
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
