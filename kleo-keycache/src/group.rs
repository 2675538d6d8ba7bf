use serde::{Deserialize, Serialize};

use crate::{Key, KeyUsage, Protocol};

/// Where a group definition comes from.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupSource {
    /// Defined with `group` in the GnuPG configuration.
    GnuPGConfig,
    /// Managed by the application.
    ApplicationConfig,
    #[default]
    Unknown,
}

/// A named, ordered set of certificates used as a single recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyGroup {
    pub id: String,
    pub name: String,
    pub keys: Vec<Key>,
    pub source: GroupSource,
}

impl KeyGroup {
    pub fn new(name: impl Into<String>, keys: Vec<Key>, source: GroupSource) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            keys,
            source,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Indicates if every member supports the usage.
    ///
    /// An empty group supports nothing but `AnyUsage`.
    pub fn can_use(&self, usage: KeyUsage) -> bool {
        if usage == KeyUsage::AnyUsage {
            return true;
        }
        !self.keys.is_empty() && self.keys.iter().all(|key| key.can_use(usage))
    }

    /// The protocol shared by all members, `Unknown` if mixed or empty.
    pub fn protocol(&self) -> Protocol {
        let mut protocols = self.keys.iter().map(Key::protocol);
        match protocols.next() {
            Some(first) if protocols.all(|protocol| protocol == first) => first,
            _ => Protocol::Unknown,
        }
    }

    /// Indicates if the group matches the protocol filter.
    pub fn has_protocol(&self, protocol: Protocol) -> bool {
        protocol == Protocol::Unknown || self.protocol() == protocol
    }
}
