use std::sync::Arc;

use kleo_keycache::compliance::CompliancePolicy;
use kleo_keycache::format::compare_keys_for_display;
use kleo_keycache::{CertificateStore, KeyUsage, Protocol, Validity};

use crate::errors::InputError;
use crate::resolver::{
    AddressKeyMap, KeyResolverCore, OverrideKeys, ResolutionOutcome, ResolutionResult, Solution,
};
use crate::settings::ResolverSettings;

/// What the reviewer gets to see.
#[derive(Debug, Clone, Copy)]
pub struct ReviewRequest<'r> {
    pub outcome: &'r ResolutionOutcome,
    /// The proposed solution, with unresolved groups expanded.
    pub solution: &'r Solution,
    /// A solution with the other protocol, possibly empty.
    pub alternative: &'r Solution,
    /// The normalized sender, if signing.
    pub sender: Option<&'r str>,
    pub sign: bool,
    pub encrypt: bool,
    /// Set if the caller asked for approval although everything resolved.
    pub forced: bool,
    pub fatal_errors: &'r [InputError],
}

/// The decision of a reviewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    /// Use these keys.
    Accept(Solution),
    /// Send without encryption, signing as proposed.
    SendUnencrypted,
    Cancel,
}

/// The human step of key resolution, usually a dialog.
pub trait Reviewer {
    fn review(&mut self, request: &ReviewRequest<'_>) -> ReviewDecision;
}

impl<F> Reviewer for F
where
    F: FnMut(&ReviewRequest<'_>) -> ReviewDecision,
{
    fn review(&mut self, request: &ReviewRequest<'_>) -> ReviewDecision {
        self(request)
    }
}

/// Final result of [`KeyResolver::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResolution {
    Resolved {
        solution: Solution,
        /// The user chose to send the message without encryption.
        send_unencrypted: bool,
    },
    Canceled,
}

impl KeyResolution {
    pub fn is_canceled(&self) -> bool {
        matches!(self, KeyResolution::Canceled)
    }

    pub fn solution(&self) -> Option<&Solution> {
        match self {
            KeyResolution::Resolved { solution, .. } => Some(solution),
            KeyResolution::Canceled => None,
        }
    }
}

/// Runs the resolution engine and asks a [`Reviewer`] when a human has to decide.
///
/// ```
/// use kleo_keyresolver::{KeyResolution, KeyResolver, ReviewDecision, ReviewRequest};
/// use kleo_keyresolver::kleo_keycache::{KeyCache, Protocol};
///
/// let cache = KeyCache::from_keys(Vec::new(), Vec::new());
/// let store = cache.snapshot();
/// let mut resolver = KeyResolver::new(store.as_ref(), true, false, Protocol::Unknown);
/// resolver.set_recipients(&["bob@example.com"]);
/// fn cancel(_: &ReviewRequest<'_>) -> ReviewDecision {
///     ReviewDecision::Cancel
/// }
/// let resolution = resolver.start(false, &mut cancel);
/// assert_eq!(resolution, KeyResolution::Canceled);
/// ```
pub struct KeyResolver<'a, S: CertificateStore + ?Sized> {
    store: &'a S,
    core: KeyResolverCore<'a, S>,
}

impl<S: CertificateStore + ?Sized> std::fmt::Debug for KeyResolver<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyResolver")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<'a, S: CertificateStore + ?Sized> KeyResolver<'a, S> {
    pub fn new(store: &'a S, encrypt: bool, sign: bool, format: Protocol) -> Self {
        Self {
            store,
            core: KeyResolverCore::new(store, encrypt, sign, format),
        }
    }

    /// Applies the protocol and validity policy of the settings.
    pub fn with_settings(mut self, settings: &ResolverSettings) -> Self {
        self.core.set_preferred_protocol(settings.preferred_protocol);
        self.core.set_minimum_validity(settings.minimum_validity);
        self.core
            .set_allow_mixed_protocols(settings.allow_mixed_protocols);
        self
    }

    pub fn with_compliance(mut self, compliance: Arc<dyn CompliancePolicy>) -> Self {
        self.core.set_compliance(compliance);
        self
    }

    pub fn set_sender(&mut self, address: &str) {
        self.core.set_sender(address);
    }

    pub fn set_recipients<T: AsRef<str>>(&mut self, addresses: &[T]) {
        self.core.set_recipients(addresses);
    }

    pub fn set_signing_keys<T: AsRef<str>>(&mut self, identifiers: &[T]) {
        self.core.set_signing_keys(identifiers);
    }

    pub fn set_override_keys(&mut self, overrides: &OverrideKeys) {
        self.core.set_override_keys(overrides);
    }

    pub fn set_preferred_protocol(&mut self, protocol: Protocol) {
        self.core.set_preferred_protocol(protocol);
    }

    pub fn set_minimum_validity(&mut self, validity: Validity) {
        self.core.set_minimum_validity(validity);
    }

    pub fn set_allow_mixed_protocols(&mut self, allow: bool) {
        self.core.set_allow_mixed_protocols(allow);
    }

    pub fn core(&self) -> &KeyResolverCore<'a, S> {
        &self.core
    }

    /// Fills empty recipient entries with the members of a matching group.
    ///
    /// Only recipients without a direct key match are expanded, and only with
    /// groups whose members are all usable for encryption. Members are sorted
    /// for display.
    pub fn expand_unresolved_groups(&self, solution: &mut Solution) {
        let protocol = solution.protocol;
        for (address, keys) in solution.encryption_keys.iter_mut() {
            if !keys.is_empty() {
                continue;
            }
            if self
                .store
                .find_best_by_mailbox(address, protocol, KeyUsage::Encrypt)
                .is_some()
            {
                continue;
            }
            let Some(group) = self.store.find_group(address, protocol, KeyUsage::Encrypt) else {
                continue;
            };
            let usable = !group.is_empty()
                && group.keys.iter().all(|key| {
                    protocol.accepts(key.protocol()) && !key.is_bad() && key.can_encrypt()
                });
            if !usable {
                tracing::debug!("not expanding group {} for {address}", group.name);
                continue;
            }
            let mut members = group.keys;
            members.sort_by(compare_keys_for_display);
            *keys = members;
        }
    }

    /// Resolves the keys, asking the reviewer if necessary.
    ///
    /// With `show_approval` the reviewer is asked even if everything resolved.
    pub fn start<R: Reviewer + ?Sized>(
        &mut self,
        show_approval: bool,
        reviewer: &mut R,
    ) -> KeyResolution {
        if !self.core.is_signing() && !self.core.is_encrypting() {
            return KeyResolution::Resolved {
                solution: Solution::default(),
                send_unencrypted: false,
            };
        }

        let ResolutionResult {
            outcome,
            mut solution,
            mut alternative,
            fatal_errors,
        } = self.core.resolve();
        if !fatal_errors.is_empty() {
            tracing::warn!("key resolution reported {} input errors", fatal_errors.len());
        }

        if outcome.is_resolved() && !show_approval {
            return KeyResolution::Resolved {
                solution,
                send_unencrypted: false,
            };
        }

        self.expand_unresolved_groups(&mut solution);
        self.expand_unresolved_groups(&mut alternative);

        let request = ReviewRequest {
            outcome: &outcome,
            solution: &solution,
            alternative: &alternative,
            sender: self.core.normalized_sender(),
            sign: self.core.is_signing(),
            encrypt: self.core.is_encrypting(),
            forced: show_approval && outcome.is_resolved(),
            fatal_errors: &fatal_errors,
        };
        match reviewer.review(&request) {
            ReviewDecision::Accept(solution) => KeyResolution::Resolved {
                solution,
                send_unencrypted: false,
            },
            ReviewDecision::SendUnencrypted => {
                tracing::debug!("user chose to send unencrypted");
                KeyResolution::Resolved {
                    solution: Solution {
                        encryption_keys: AddressKeyMap::new(),
                        ..solution
                    },
                    send_unencrypted: true,
                }
            }
            ReviewDecision::Cancel => {
                tracing::debug!("key resolution canceled");
                KeyResolution::Canceled
            }
        }
    }
}
