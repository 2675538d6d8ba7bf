use std::fmt::{Display, Formatter};
use std::sync::Arc;

use derive_more::derive::TryFrom;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::{mailbox, Fingerprint, KeyId, UnixTimestamp};

const CAPABILITY_SIGN: u8 = 1;
const CAPABILITY_ENCRYPT: u8 = 1 << 1;
const CAPABILITY_CERTIFY: u8 = 1 << 2;
const CAPABILITY_AUTHENTICATE: u8 = 1 << 3;

/// The cryptographic protocol a certificate belongs to.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "openpgp")]
    OpenPGP,
    /// S/MIME.
    #[serde(rename = "cms")]
    CMS,
    /// Any protocol, or not decided yet.
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl Protocol {
    /// Returns true for `OpenPGP` and `CMS`.
    pub fn is_concrete(self) -> bool {
        self != Protocol::Unknown
    }

    /// Returns the other concrete protocol.
    ///
    /// `Unknown` maps to itself.
    pub fn other(self) -> Protocol {
        match self {
            Protocol::OpenPGP => Protocol::CMS,
            Protocol::CMS => Protocol::OpenPGP,
            Protocol::Unknown => Protocol::Unknown,
        }
    }

    /// Indicates if a key of protocol `other` satisfies a filter of `self`.
    ///
    /// `Unknown` accepts every protocol.
    pub fn accepts(self, other: Protocol) -> bool {
        self == Protocol::Unknown || self == other
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::OpenPGP => f.write_str("OpenPGP"),
            Protocol::CMS => f.write_str("S/MIME"),
            Protocol::Unknown => f.write_str("Any"),
        }
    }
}

/// Validity of a user id, ordered from least to most trusted.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize_repr,
    Deserialize_repr,
    TryFrom,
)]
#[try_from(repr)]
#[repr(u8)]
pub enum Validity {
    #[default]
    Unknown = 0,
    Undefined = 1,
    Never = 2,
    Marginal = 3,
    Full = 4,
    Ultimate = 5,
}

/// What a key is going to be used for in a lookup.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyUsage {
    #[default]
    AnyUsage,
    Sign,
    Encrypt,
    Certify,
    Authenticate,
}

/// Capabilities of a (sub)key as a bit map.
#[derive(Debug, Default, Serialize, Deserialize, Eq, PartialEq, Hash, Clone, Copy)]
pub struct Capabilities(u8);

impl Display for Capabilities {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (flag, letter) in [
            (CAPABILITY_SIGN, 's'),
            (CAPABILITY_ENCRYPT, 'e'),
            (CAPABILITY_CERTIFY, 'c'),
            (CAPABILITY_AUTHENTICATE, 'a'),
        ] {
            if self.0 & flag > 0 {
                write!(f, "{letter}")?;
            }
        }
        Ok(())
    }
}

impl<T: Into<u8>> From<T> for Capabilities {
    fn from(value: T) -> Self {
        Self(value.into())
    }
}

impl Capabilities {
    /// No capability.
    pub const NONE: Capabilities = Capabilities(0);
    pub const SIGN: Capabilities = Capabilities(CAPABILITY_SIGN);
    pub const ENCRYPT: Capabilities = Capabilities(CAPABILITY_ENCRYPT);
    pub const CERTIFY: Capabilities = Capabilities(CAPABILITY_CERTIFY);
    pub const AUTHENTICATE: Capabilities = Capabilities(CAPABILITY_AUTHENTICATE);

    /// Returns the bitmap as u8.
    #[must_use]
    pub fn to_u8(&self) -> u8 {
        self.0
    }
    #[must_use]
    pub fn can_sign(&self) -> bool {
        (self.0 & CAPABILITY_SIGN) > 0
    }
    #[must_use]
    pub fn can_encrypt(&self) -> bool {
        (self.0 & CAPABILITY_ENCRYPT) > 0
    }
    #[must_use]
    pub fn can_certify(&self) -> bool {
        (self.0 & CAPABILITY_CERTIFY) > 0
    }
    #[must_use]
    pub fn can_authenticate(&self) -> bool {
        (self.0 & CAPABILITY_AUTHENTICATE) > 0
    }
    /// Indicates whether the capabilities cover the usage.
    ///
    /// `AnyUsage` is covered by every bitmap, including the empty one.
    #[must_use]
    pub fn supports(&self, usage: KeyUsage) -> bool {
        match usage {
            KeyUsage::AnyUsage => true,
            KeyUsage::Sign => self.can_sign(),
            KeyUsage::Encrypt => self.can_encrypt(),
            KeyUsage::Certify => self.can_certify(),
            KeyUsage::Authenticate => self.can_authenticate(),
        }
    }
    pub fn set_sign(&mut self) {
        self.0 |= CAPABILITY_SIGN;
    }
    pub fn set_encrypt(&mut self) {
        self.0 |= CAPABILITY_ENCRYPT;
    }
    pub fn set_certify(&mut self) {
        self.0 |= CAPABILITY_CERTIFY;
    }
    pub fn set_authenticate(&mut self) {
        self.0 |= CAPABILITY_AUTHENTICATE;
    }
    /// Returns the union of both bitmaps.
    #[must_use]
    pub fn union(self, other: Capabilities) -> Capabilities {
        Capabilities(self.0 | other.0)
    }
}

impl std::ops::BitOr for Capabilities {
    type Output = Capabilities;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

/// A user identity on a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserId {
    /// Display name, may be empty.
    pub name: String,
    /// The e-mail address as stored on the certificate.
    pub email: String,
    pub validity: Validity,
    #[serde(default)]
    pub revoked: bool,
    #[serde(default)]
    pub invalid: bool,
}

impl UserId {
    pub fn new(name: impl Into<String>, email: impl Into<String>, validity: Validity) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            validity,
            revoked: false,
            invalid: false,
        }
    }

    /// The normalized e-mail address of this user id, if it has one.
    pub fn addr_spec(&self) -> Option<String> {
        mailbox::normalize(&self.email)
    }

    /// Indicates if the user id is neither revoked nor invalid.
    pub fn is_usable(&self) -> bool {
        !self.revoked && !self.invalid
    }
}

/// A subkey (or the primary key) of a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subkey {
    pub fingerprint: Fingerprint,
    pub capabilities: Capabilities,
    #[serde(default)]
    pub revoked: bool,
    #[serde(default)]
    pub expired: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub invalid: bool,
    /// Indicates if the subkey is approved for the `de-vs` compliance mode.
    #[serde(default)]
    pub is_de_vs: bool,
    /// Zero if the subkey does not expire.
    #[serde(default)]
    pub expiration_time: UnixTimestamp,
}

impl Subkey {
    pub fn new(fingerprint: impl Into<Fingerprint>, capabilities: Capabilities) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            capabilities,
            revoked: false,
            expired: false,
            disabled: false,
            invalid: false,
            is_de_vs: false,
            expiration_time: UnixTimestamp::zero(),
        }
    }

    /// Indicates if the subkey is usable at all.
    pub fn is_usable(&self) -> bool {
        !self.revoked && !self.expired && !self.disabled && !self.invalid
    }
}

#[derive(Debug, PartialEq, Eq)]
struct KeyData {
    protocol: Protocol,
    fingerprint: Fingerprint,
    user_ids: Vec<UserId>,
    subkeys: Vec<Subkey>,
    revoked: bool,
    expired: bool,
    disabled: bool,
    invalid: bool,
    has_secret: bool,
    creation_time: UnixTimestamp,
    expiration_time: UnixTimestamp,
    issuer_name: Option<String>,
}

/// An immutable certificate.
///
/// Cloning is cheap, the key data is shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key(Arc<KeyData>);

impl Key {
    /// Starts building a key with the given protocol and primary fingerprint.
    pub fn builder(protocol: Protocol, fingerprint: impl Into<Fingerprint>) -> KeyBuilder {
        KeyBuilder::new(protocol, fingerprint)
    }

    pub fn protocol(&self) -> Protocol {
        self.0.protocol
    }

    /// Returns the fingerprint of the primary key.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.0.fingerprint
    }

    /// Returns the key id of the primary key.
    pub fn key_id(&self) -> KeyId {
        self.0.fingerprint.key_id()
    }

    pub fn user_ids(&self) -> &[UserId] {
        &self.0.user_ids
    }

    /// Returns the first user id, which is the primary one.
    pub fn primary_user_id(&self) -> Option<&UserId> {
        self.0.user_ids.first()
    }

    pub fn subkeys(&self) -> &[Subkey] {
        &self.0.subkeys
    }

    pub fn is_revoked(&self) -> bool {
        self.0.revoked
    }

    pub fn is_expired(&self) -> bool {
        self.0.expired
    }

    pub fn is_disabled(&self) -> bool {
        self.0.disabled
    }

    pub fn is_invalid(&self) -> bool {
        self.0.invalid
    }

    /// Indicates if the secret key material is available.
    pub fn has_secret(&self) -> bool {
        self.0.has_secret
    }

    pub fn creation_time(&self) -> UnixTimestamp {
        self.0.creation_time
    }

    /// Zero if the key does not expire.
    pub fn expiration_time(&self) -> UnixTimestamp {
        self.0.expiration_time
    }

    /// The issuer of an S/MIME certificate.
    pub fn issuer_name(&self) -> Option<&str> {
        self.0.issuer_name.as_deref()
    }

    /// Indicates if the key is revoked, expired, disabled or invalid.
    pub fn is_bad(&self) -> bool {
        self.0.revoked || self.0.expired || self.0.disabled || self.0.invalid
    }

    /// Capabilities of all usable subkeys combined.
    pub fn capabilities(&self) -> Capabilities {
        self.0
            .subkeys
            .iter()
            .filter(|subkey| subkey.is_usable())
            .fold(Capabilities::NONE, |acc, subkey| {
                acc.union(subkey.capabilities)
            })
    }

    pub fn can_sign(&self) -> bool {
        self.capabilities().can_sign()
    }

    pub fn can_encrypt(&self) -> bool {
        self.capabilities().can_encrypt()
    }

    pub fn can_certify(&self) -> bool {
        self.capabilities().can_certify()
    }

    pub fn can_authenticate(&self) -> bool {
        self.capabilities().can_authenticate()
    }

    /// Indicates if at least one usable subkey supports the usage.
    pub fn can_use(&self, usage: KeyUsage) -> bool {
        self.capabilities().supports(usage)
    }

    /// Indicates if a usable user id of this key has the given normalized address.
    pub fn has_mailbox(&self, mailbox: &str) -> bool {
        self.0
            .user_ids
            .iter()
            .any(|uid| uid.is_usable() && uid.addr_spec().as_deref() == Some(mailbox))
    }

    /// Highest validity among the usable user ids with the given normalized address.
    pub fn validity_for_mailbox(&self, mailbox: &str) -> Option<Validity> {
        self.0
            .user_ids
            .iter()
            .filter(|uid| uid.is_usable() && uid.addr_spec().as_deref() == Some(mailbox))
            .map(|uid| uid.validity)
            .max()
    }

    /// Indicates if the identifier names this key.
    ///
    /// Accepts the primary fingerprint, a subkey fingerprint or the primary key id,
    /// in any case and with an optional `0x` prefix. Malformed identifiers never match.
    pub fn matches_identifier(&self, identifier: &str) -> bool {
        let id = KeyId::new(identifier);
        if !id.is_valid() {
            return false;
        }
        id.as_str() == self.0.fingerprint.as_str()
            || id == self.key_id()
            || self
                .0
                .subkeys
                .iter()
                .any(|subkey| subkey.fingerprint.as_str() == id.as_str())
    }
}

/// Builder for [`Key`].
#[derive(Debug)]
pub struct KeyBuilder {
    data: KeyData,
}

impl KeyBuilder {
    pub fn new(protocol: Protocol, fingerprint: impl Into<Fingerprint>) -> Self {
        Self {
            data: KeyData {
                protocol,
                fingerprint: fingerprint.into(),
                user_ids: Vec::new(),
                subkeys: Vec::new(),
                revoked: false,
                expired: false,
                disabled: false,
                invalid: false,
                has_secret: false,
                creation_time: UnixTimestamp::zero(),
                expiration_time: UnixTimestamp::zero(),
                issuer_name: None,
            },
        }
    }

    pub fn user_id(mut self, user_id: UserId) -> Self {
        self.data.user_ids.push(user_id);
        self
    }

    /// Adds a user id with the given address and validity.
    pub fn email(mut self, name: &str, email: &str, validity: Validity) -> Self {
        self.data.user_ids.push(UserId::new(name, email, validity));
        self
    }

    pub fn subkey(mut self, subkey: Subkey) -> Self {
        self.data.subkeys.push(subkey);
        self
    }

    /// Adds a usable subkey with the given capabilities.
    ///
    /// The first subkey reuses the primary fingerprint, later ones derive
    /// a distinct fingerprint from it.
    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        let fingerprint = if self.data.subkeys.is_empty() {
            self.data.fingerprint.clone()
        } else {
            Fingerprint::new(format!(
                "{}{:02x}",
                self.data.fingerprint,
                self.data.subkeys.len()
            ))
        };
        self.data.subkeys.push(Subkey::new(fingerprint, capabilities));
        self
    }

    pub fn revoked(mut self, revoked: bool) -> Self {
        self.data.revoked = revoked;
        self
    }

    pub fn expired(mut self, expired: bool) -> Self {
        self.data.expired = expired;
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.data.disabled = disabled;
        self
    }

    pub fn invalid(mut self, invalid: bool) -> Self {
        self.data.invalid = invalid;
        self
    }

    pub fn has_secret(mut self, has_secret: bool) -> Self {
        self.data.has_secret = has_secret;
        self
    }

    /// Marks every subkey added so far as `de-vs` compliant.
    pub fn de_vs(mut self, is_de_vs: bool) -> Self {
        for subkey in &mut self.data.subkeys {
            subkey.is_de_vs = is_de_vs;
        }
        self
    }

    pub fn creation_time(mut self, time: UnixTimestamp) -> Self {
        self.data.creation_time = time;
        self
    }

    pub fn expiration_time(mut self, time: UnixTimestamp) -> Self {
        self.data.expiration_time = time;
        self
    }

    pub fn issuer_name(mut self, issuer: impl Into<String>) -> Self {
        self.data.issuer_name = Some(issuer.into());
        self
    }

    pub fn build(self) -> Key {
        Key(Arc::new(self.data))
    }
}
