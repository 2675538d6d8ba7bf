use std::collections::BTreeMap;
use std::sync::Arc;

use kleo_keycache::compliance::{CompliancePolicy, NoCompliance};
use kleo_keycache::{mailbox, CertificateStore, Key, KeyUsage, Protocol, Validity};

use super::{AddressKeyMap, ResolutionOutcome, ResolutionResult, Solution};
use crate::errors::InputError;

/// The concrete protocols, in the order they are attempted.
pub const PROTOCOLS: [Protocol; 2] = [Protocol::OpenPGP, Protocol::CMS];

/// Forced key choices: protocol, then address, then fingerprints or key ids.
///
/// Entries under `Protocol::Unknown` apply to whatever protocol the named key has.
pub type OverrideKeys = BTreeMap<Protocol, BTreeMap<String, Vec<String>>>;

/// Decides which certificates to sign and encrypt a message with.
///
/// The resolver is configured once per message, resolved once, and then
/// discarded. It keeps a reference to the certificate store for its whole
/// lifetime; pass a [`KeyIndex`](kleo_keycache::KeyIndex) snapshot to make
/// all lookups of one run see the same key listing.
pub struct KeyResolverCore<'a, S: CertificateStore + ?Sized> {
    store: &'a S,
    compliance: Arc<dyn CompliancePolicy>,
    encrypt: bool,
    sign: bool,
    format: Protocol,
    preferred_protocol: Protocol,
    minimum_validity: Validity,
    allow_mixed: bool,
    sender: Option<String>,
    recipients: Vec<String>,
    signing_keys: BTreeMap<Protocol, Vec<Key>>,
    encryption_keys: BTreeMap<Protocol, AddressKeyMap>,
    overrides: OverrideKeys,
    fatal_errors: Vec<InputError>,
}

impl<S: CertificateStore + ?Sized> std::fmt::Debug for KeyResolverCore<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyResolverCore")
            .field("encrypt", &self.encrypt)
            .field("sign", &self.sign)
            .field("format", &self.format)
            .field("sender", &self.sender)
            .field("recipients", &self.recipients)
            .finish_non_exhaustive()
    }
}

impl<'a, S: CertificateStore + ?Sized> KeyResolverCore<'a, S> {
    /// Creates a resolver.
    ///
    /// `format` restricts the result to one protocol; `Protocol::Unknown` allows both.
    pub fn new(store: &'a S, encrypt: bool, sign: bool, format: Protocol) -> Self {
        Self {
            store,
            compliance: Arc::new(NoCompliance),
            encrypt,
            sign,
            format,
            preferred_protocol: Protocol::Unknown,
            minimum_validity: Validity::Marginal,
            allow_mixed: false,
            sender: None,
            recipients: Vec::new(),
            signing_keys: BTreeMap::new(),
            encryption_keys: PROTOCOLS
                .into_iter()
                .map(|protocol| (protocol, AddressKeyMap::new()))
                .collect(),
            overrides: OverrideKeys::new(),
            fatal_errors: Vec::new(),
        }
    }

    /// Uses the given compliance policy for all acceptability checks.
    pub fn with_compliance(mut self, compliance: Arc<dyn CompliancePolicy>) -> Self {
        self.compliance = compliance;
        self
    }

    pub fn set_compliance(&mut self, compliance: Arc<dyn CompliancePolicy>) {
        self.compliance = compliance;
    }

    /// Sets the author of the message.
    ///
    /// When signing, the normalized address is used to look up signing keys.
    /// When encrypting, the sender is also added as a recipient.
    pub fn set_sender(&mut self, address: &str) {
        let normalized = match mailbox::addr_spec_from_string(address) {
            Ok(normalized) => normalized,
            Err(err) => {
                tracing::warn!("failed to parse sender {address:?}: {err}");
                self.fatal_errors.push(InputError::sender(address, &err));
                return;
            }
        };
        if self.sign {
            self.sender = Some(normalized);
        }
        self.add_recipients(&[address]);
    }

    /// Adds recipients that need encryption keys.
    ///
    /// Does nothing unless encryption is requested. Addresses that cannot be
    /// parsed are recorded as fatal errors and skipped.
    pub fn add_recipients<T: AsRef<str>>(&mut self, addresses: &[T]) {
        if !self.encrypt {
            return;
        }
        for address in addresses {
            let address = address.as_ref();
            let normalized = match mailbox::addr_spec_from_string(address) {
                Ok(normalized) => normalized,
                Err(err) => {
                    tracing::warn!("failed to parse recipient {address:?}: {err}");
                    self.fatal_errors.push(InputError::recipient(address, &err));
                    continue;
                }
            };
            if !self.recipients.contains(&normalized) {
                self.recipients.push(normalized.clone());
            }
            for protocol in PROTOCOLS {
                self.encryption_keys
                    .entry(protocol)
                    .or_default()
                    .entry(&normalized);
            }
        }
    }

    /// Same as [`Self::add_recipients`].
    pub fn set_recipients<T: AsRef<str>>(&mut self, addresses: &[T]) {
        self.add_recipients(addresses);
    }

    /// Sets the signing keys explicitly.
    ///
    /// Each key is filed under its own protocol, which disables automatic
    /// signing key lookup for that protocol. Unknown identifiers are ignored.
    pub fn set_signing_keys<T: AsRef<str>>(&mut self, identifiers: &[T]) {
        if !self.sign {
            return;
        }
        for identifier in identifiers {
            let identifier = identifier.as_ref();
            let Some(key) = self.store.find_by_key_id_or_fingerprint(identifier) else {
                tracing::debug!("signing key {identifier} not found");
                continue;
            };
            if !key.protocol().is_concrete() {
                continue;
            }
            self.signing_keys.entry(key.protocol()).or_default().push(key);
        }
    }

    /// Sets keys that must be used for specific recipients.
    ///
    /// Replaces previously set overrides. Addresses are normalized; entries
    /// whose address normalizes to the same mailbox are merged.
    pub fn set_override_keys(&mut self, overrides: &OverrideKeys) {
        self.overrides.clear();
        for (protocol, by_address) in overrides {
            for (address, identifiers) in by_address {
                let normalized = match mailbox::addr_spec_from_string(address) {
                    Ok(normalized) => normalized,
                    Err(err) => {
                        tracing::warn!("failed to parse override address {address:?}: {err}");
                        self.fatal_errors
                            .push(InputError::override_address(address, &err));
                        continue;
                    }
                };
                self.overrides
                    .entry(*protocol)
                    .or_default()
                    .entry(normalized)
                    .or_default()
                    .extend(identifiers.iter().cloned());
            }
        }
    }

    /// The protocol that wins if both protocols resolve everything.
    pub fn set_preferred_protocol(&mut self, protocol: Protocol) {
        self.preferred_protocol = protocol;
    }

    /// User ids below this validity do not qualify a key for encryption.
    pub fn set_minimum_validity(&mut self, validity: Validity) {
        self.minimum_validity = validity;
    }

    /// Allows solutions where recipients use different protocols.
    pub fn set_allow_mixed_protocols(&mut self, allow: bool) {
        self.allow_mixed = allow;
    }

    /// The normalized sender address, set only if signing is requested.
    pub fn normalized_sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    /// The normalized recipients, including the sender when encrypting.
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    pub fn is_signing(&self) -> bool {
        self.sign
    }

    pub fn is_encrypting(&self) -> bool {
        self.encrypt
    }

    /// Caller-bug diagnostics collected so far.
    pub fn fatal_errors(&self) -> &[InputError] {
        &self.fatal_errors
    }

    /// All signing keys, `OpenPGP` first.
    pub fn signing_keys(&self) -> Vec<Key> {
        self.signing_keys.values().flatten().cloned().collect()
    }

    pub fn signing_keys_for(&self, protocol: Protocol) -> &[Key] {
        self.signing_keys
            .get(&protocol)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Encryption keys per protocol and address.
    pub fn encryption_keys(&self) -> &BTreeMap<Protocol, AddressKeyMap> {
        &self.encryption_keys
    }

    pub fn encryption_keys_for(&self, protocol: Protocol) -> Option<&AddressKeyMap> {
        self.encryption_keys.get(&protocol)
    }

    /// Recipients that have no encryption key for the protocol yet.
    pub fn unresolved_recipients(&self, protocol: Protocol) -> Vec<String> {
        self.encryption_keys
            .get(&protocol)
            .map(AddressKeyMap::unresolved)
            .unwrap_or_default()
    }

    /// Runs the resolution.
    pub fn resolve(&mut self) -> ResolutionResult {
        if !self.sign && !self.encrypt {
            return ResolutionResult::trivial(self.fatal_errors.clone());
        }
        tracing::debug!(
            sign = self.sign,
            encrypt = self.encrypt,
            format = %self.format,
            recipients = self.recipients.len(),
            "starting key resolution"
        );

        self.resolve_overrides();

        let mut complete = BTreeMap::new();
        for protocol in self.attempted_protocols() {
            self.resolve_sign(protocol);
            self.resolve_enc(protocol);
            complete.insert(protocol, self.is_complete(protocol));
        }
        let pgp_only = complete.get(&Protocol::OpenPGP).copied().unwrap_or(false);
        let cms_only = complete.get(&Protocol::CMS).copied().unwrap_or(false);
        tracing::debug!(pgp_only, cms_only, "protocols attempted");

        let chosen = match (pgp_only, cms_only) {
            (true, true) if self.preferred_protocol == Protocol::CMS => Some(Protocol::CMS),
            (true, _) => Some(Protocol::OpenPGP),
            (false, true) => Some(Protocol::CMS),
            (false, false) => None,
        };
        if let Some(protocol) = chosen {
            return self.finish_single_protocol(protocol);
        }

        let gaps = self.gaps();
        let missing_signing_keys = self.missing_signing_keys();
        let needs_review = !gaps.is_empty()
            || !self.allow_mixed
            || (self.sign && !missing_signing_keys.is_empty());

        if needs_review {
            tracing::debug!(gaps = ?gaps, missing = ?missing_signing_keys, "resolution needs review");
            return self.finish_review(missing_signing_keys);
        }

        tracing::debug!("resolved with mixed protocols");
        ResolutionResult {
            outcome: ResolutionOutcome::MixedProtocolsResolved,
            solution: self.mixed_solution(),
            alternative: Solution::default(),
            fatal_errors: self.fatal_errors.clone(),
        }
    }

    fn attempted_protocols(&self) -> Vec<Protocol> {
        PROTOCOLS
            .into_iter()
            .filter(|protocol| self.format.accepts(*protocol))
            .collect()
    }

    fn has_signing_keys(&self, protocol: Protocol) -> bool {
        self.signing_keys
            .get(&protocol)
            .is_some_and(|keys| !keys.is_empty())
    }

    fn is_complete(&self, protocol: Protocol) -> bool {
        self.unresolved_recipients(protocol).is_empty()
            && (!self.sign || self.has_signing_keys(protocol))
    }

    /// Recipients that no attempted protocol has a key for.
    fn gaps(&self) -> Vec<String> {
        let attempted = self.attempted_protocols();
        self.recipients
            .iter()
            .filter(|address| {
                attempted.iter().all(|protocol| {
                    self.encryption_keys
                        .get(protocol)
                        .and_then(|map| map.get(address))
                        .map_or(true, Vec::is_empty)
                })
            })
            .cloned()
            .collect()
    }

    fn missing_signing_keys(&self) -> Vec<Protocol> {
        if !self.sign {
            return Vec::new();
        }
        self.attempted_protocols()
            .into_iter()
            .filter(|protocol| !self.has_signing_keys(*protocol))
            .collect()
    }

    /// The protocol to present first if the user has to decide.
    fn review_protocol(&self) -> Protocol {
        match (self.format, self.preferred_protocol) {
            (Protocol::CMS, _) | (Protocol::Unknown, Protocol::CMS) => Protocol::CMS,
            _ => Protocol::OpenPGP,
        }
    }

    fn finish_single_protocol(&mut self, protocol: Protocol) -> ResolutionResult {
        tracing::debug!(%protocol, "resolved with a single protocol");
        let alternative = if self.format.accepts(protocol.other()) {
            self.single_protocol_solution(protocol.other())
        } else {
            Solution::default()
        };
        self.signing_keys.retain(|p, _| *p == protocol);
        self.encryption_keys.retain(|p, _| *p == protocol);
        ResolutionResult {
            outcome: ResolutionOutcome::AllResolved(protocol),
            solution: self.single_protocol_solution(protocol),
            alternative,
            fatal_errors: self.fatal_errors.clone(),
        }
    }

    fn finish_review(&self, missing_signing_keys: Vec<Protocol>) -> ResolutionResult {
        let preferred = self.review_protocol();
        let both_attempted = self.attempted_protocols().len() == PROTOCOLS.len();
        let (solution, alternative) = if self.allow_mixed && both_attempted {
            (
                self.mixed_solution(),
                self.single_protocol_solution(preferred),
            )
        } else if both_attempted {
            (
                self.single_protocol_solution(preferred),
                self.single_protocol_solution(preferred.other()),
            )
        } else {
            (self.single_protocol_solution(preferred), Solution::default())
        };
        ResolutionResult {
            outcome: ResolutionOutcome::NeedsReview {
                unresolved_openpgp: self.unresolved_recipients(Protocol::OpenPGP),
                unresolved_cms: self.unresolved_recipients(Protocol::CMS),
                missing_signing_keys,
            },
            solution,
            alternative,
            fatal_errors: self.fatal_errors.clone(),
        }
    }

    fn single_protocol_solution(&self, protocol: Protocol) -> Solution {
        Solution {
            protocol,
            signing_keys: self.signing_keys_for(protocol).to_vec(),
            encryption_keys: self
                .encryption_keys
                .get(&protocol)
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// Picks keys per recipient from the preferred protocol, falling back to the other one.
    fn mixed_solution(&self) -> Solution {
        let preferred = self.review_protocol();
        let lookup = |protocol: Protocol, address: &str| {
            self.encryption_keys
                .get(&protocol)
                .and_then(|map| map.get(address))
                .filter(|keys| !keys.is_empty())
                .cloned()
        };
        let encryption_keys: AddressKeyMap = self
            .recipients
            .iter()
            .map(|address| {
                let keys = lookup(preferred, address)
                    .or_else(|| lookup(preferred.other(), address))
                    .unwrap_or_default();
                (address.clone(), keys)
            })
            .collect();
        let signing_keys = self.signing_keys();

        let protocol = {
            let mut protocols = signing_keys
                .iter()
                .chain(encryption_keys.keys())
                .map(Key::protocol);
            match protocols.next() {
                Some(first) if protocols.all(|protocol| protocol == first) => first,
                _ => Protocol::Unknown,
            }
        };
        Solution {
            protocol,
            signing_keys,
            encryption_keys,
        }
    }

    fn resolve_overrides(&mut self) {
        if !self.encrypt {
            return;
        }
        for (protocol, by_address) in &self.overrides {
            if protocol.is_concrete() && !self.format.accepts(*protocol) {
                continue;
            }
            for (address, identifiers) in by_address {
                for identifier in identifiers {
                    let Some(key) = self.store.find_by_key_id_or_fingerprint(identifier) else {
                        tracing::debug!("override key {identifier} for {address} not found");
                        continue;
                    };
                    if !self.recipients.contains(address) {
                        tracing::debug!("override for {address} which is not a recipient");
                        continue;
                    }
                    let target = if *protocol == Protocol::Unknown {
                        key.protocol()
                    } else {
                        *protocol
                    };
                    if !target.is_concrete() || !self.format.accepts(target) {
                        continue;
                    }
                    if key.protocol() != target {
                        let err = InputError::OverrideProtocolMismatch {
                            address: address.clone(),
                            identifier: identifier.clone(),
                            protocol: target,
                        };
                        tracing::warn!("{err}");
                        self.fatal_errors.push(err);
                        continue;
                    }
                    self.encryption_keys
                        .entry(target)
                        .or_default()
                        .entry(address)
                        .push(key);
                }
            }
        }
    }

    fn resolve_sign(&mut self, protocol: Protocol) {
        if self.signing_keys.contains_key(&protocol) {
            // Set explicitly.
            return;
        }
        let Some(sender) = self.sender.as_deref() else {
            return;
        };
        let candidates = self
            .store
            .find_best_by_mailbox(sender, protocol, KeyUsage::Sign)
            .map(|key| vec![key])
            .or_else(|| {
                self.store
                    .find_group(sender, protocol, KeyUsage::Sign)
                    .map(|group| group.keys)
            })
            .unwrap_or_default();
        if candidates.is_empty() {
            tracing::debug!(%protocol, "no signing key for {sender}");
            return;
        }
        if !candidates
            .iter()
            .all(|key| key.protocol() == protocol && self.is_acceptable_signing_key(key))
        {
            tracing::debug!(%protocol, "rejecting signing keys for {sender}");
            return;
        }
        self.signing_keys.insert(protocol, candidates);
    }

    fn resolve_enc(&mut self, protocol: Protocol) {
        let pending = self.unresolved_recipients(protocol);
        for address in pending {
            let keys = self.resolve_recipient(&address, protocol);
            if keys.is_empty() {
                tracing::debug!(%protocol, "no encryption key for {address}");
                continue;
            }
            self.encryption_keys
                .entry(protocol)
                .or_default()
                .insert(&address, keys);
        }
    }

    fn resolve_recipient(&self, address: &str, protocol: Protocol) -> Vec<Key> {
        if let Some(key) = self
            .store
            .find_best_by_mailbox(address, protocol, KeyUsage::Encrypt)
        {
            if key.protocol() == protocol && self.is_acceptable_encryption_key(&key, Some(address))
            {
                return vec![key];
            }
            return Vec::new();
        }
        let Some(group) = self.store.find_group(address, protocol, KeyUsage::Encrypt) else {
            return Vec::new();
        };
        if !group
            .keys
            .iter()
            .all(|key| key.protocol() == protocol && self.is_acceptable_encryption_key(key, None))
        {
            tracing::debug!(%protocol, "rejecting group {} with unacceptable members", group.name);
            return Vec::new();
        }
        group.keys
    }

    fn is_compliant(&self, key: &Key) -> bool {
        !self.compliance.is_active() || self.compliance.is_compliant(key)
    }

    /// A key the sender may sign with.
    pub fn is_acceptable_signing_key(&self, key: &Key) -> bool {
        !key.is_bad() && key.can_sign() && key.has_secret() && self.is_compliant(key)
    }

    /// A key that may be used to encrypt.
    ///
    /// With an address, the key must also carry a user id for it with at
    /// least the minimum validity.
    pub fn is_acceptable_encryption_key(&self, key: &Key, address: Option<&str>) -> bool {
        if key.is_bad() || !key.can_encrypt() || !self.is_compliant(key) {
            return false;
        }
        let Some(address) = address else {
            return true;
        };
        key.validity_for_mailbox(address)
            .is_some_and(|validity| validity >= self.minimum_validity)
    }
}
